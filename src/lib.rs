//! lb-monitor watches for partial load balancer outages.
//!
//! A hostname served by several load balancers may resolve to many
//! addresses. If only some of them stop accepting connections, a health
//! check against the hostname itself will usually still pass. This crate
//! finds *every* address a hostname can resolve to, and probes each one.
//!
//! It uses the following terminology:
//! * An [address_set::AddressSet] maps each discovered address to the
//!   nameservers which reported it.
//! * A [resolver::Resolver] turns a hostname into an address set. The
//!   [resolvers::authority::AuthorityResolver] asks each authoritative
//!   nameserver directly; the [resolvers::system::SystemResolver] performs a
//!   plain lookup.
//! * A [probe::Prober] connects to every address concurrently.
//! * A [monitor::Monitor] repeats resolve-then-probe for one hostname on an
//!   interval, emitting the number of unreachable ("borked") addresses as a
//!   gauge.
//!
//! # DTrace probes
//!
//! With the `"probes"` feature (enabled by default), the following USDT
//! probes fire during each poll cycle:
//!
//! - `resolve-start`: Fires before resolving a hostname.
//! - `resolve-done`: Fires after resolving, with the number of addresses.
//! - `resolve-failed`: Fires when resolution fails, with the reason.
//! - `probe-start`: Fires before connecting to an address.
//! - `probe-done`: Fires after successfully connecting to an address.
//! - `probe-failed`: Fires after failing to connect, with the reason.
//! - `cycle-done`: Fires after reporting, with the probed and borked counts.
//!
//! Probes are zero-cost unless they are explicitly enabled, by tracing the
//! program with the `dtrace(1)` command-line tool. They must be registered
//! with `usdt::register_probes` before they can fire.

// Public API
pub mod address_set;
pub mod config;
pub mod host;
pub mod metrics;
pub mod monitor;
pub mod probe;
pub mod report;
pub mod resolver;
pub mod supervisor;
pub mod telemetry;
pub mod transport;

// Necessary for implementation
mod backoff;
mod join;
#[cfg(test)]
mod test_utils;

// Default implementations of generic interfaces
pub mod connectors;
pub mod resolvers;

/// USDT probes for tracing each poll cycle.
#[cfg(feature = "probes")]
#[usdt::provider(provider = "lb_monitor")]
mod probes {
    /// Fires right before resolving a hostname.
    fn resolve__start(host: &str) {}

    /// Fires when a hostname resolves, with the number of unique addresses.
    fn resolve__done(host: &str, addresses: u64) {}

    /// Fires when resolution fails, with a string identifying the reason.
    fn resolve__failed(host: &str, reason: &str) {}

    /// Fires right before attempting a connection, with the address we're
    /// connecting to.
    fn probe__start(host: &str, addr: &str) {}

    /// Fires just after successfully making a connection.
    fn probe__done(host: &str, addr: &str) {}

    /// Fires just after failing to make a connection, with a string
    /// identifying the reason.
    fn probe__failed(host: &str, addr: &str, reason: &str) {}

    /// Fires once a cycle has been reported.
    fn cycle__done(host: &str, probed: u64, borked: u64) {}
}
