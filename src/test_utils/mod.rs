//! Utilities to help with testing lb-monitor

use crate::metrics::MetricsSink;
use crate::probe::{Connector, ProbeError};
use crate::report::{ErrorReport, ErrorSink};
use crate::transport::{ExchangeError, Transport};

use async_trait::async_trait;
use hickory_resolver::error::ResolveError;
use hickory_resolver::proto::rr::{rdata, Name, RData, RecordType};
use hickory_server::authority::{AuthorityObject, Catalog, ZoneType};
use hickory_server::proto::rr::{LowerName, Record, RecordSet, RrKey};
use hickory_server::server::ServerFuture;
use hickory_server::store::in_memory::InMemoryAuthority;
use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{event, Level};

/// How a [ScriptedConnector] treats a connection attempt.
#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    Accept,
    Refuse,
    /// Never completes; only the probe timeout ends the attempt.
    Hang,
    /// Accepts after the given delay.
    Delay(Duration),
}

/// A test-only connector which behaves per-address as instructed.
pub struct ScriptedConnector {
    default: Behavior,
    overrides: HashMap<IpAddr, Behavior>,
    attempts: Mutex<Vec<SocketAddr>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(default: Behavior) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
            attempts: Mutex::new(vec![]),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, address: IpAddr, behavior: Behavior) -> Self {
        self.overrides.insert(address, behavior);
        self
    }

    /// Every address a connection was attempted to, in order.
    pub fn attempts(&self) -> Vec<SocketAddr> {
        self.attempts.lock().unwrap().clone()
    }

    /// The largest number of attempts observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, address: SocketAddr) -> Result<(), ProbeError> {
        self.attempts.lock().unwrap().push(address);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let behavior = self
            .overrides
            .get(&address.ip())
            .copied()
            .unwrap_or(self.default);
        match behavior {
            Behavior::Accept => Ok(()),
            Behavior::Refuse => Err(ProbeError::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused,
            ))),
            Behavior::Hang => futures::future::pending().await,
            Behavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

fn name(s: &str) -> Name {
    let mut name = Name::from_utf8(s).unwrap();
    name.set_fqdn(true);
    name
}

pub fn a(address: &str) -> RData {
    RData::A(rdata::A(address.parse().unwrap()))
}

pub fn aaaa(address: &str) -> RData {
    RData::AAAA(rdata::AAAA(address.parse().unwrap()))
}

pub fn ns(target: &str) -> RData {
    RData::NS(rdata::NS(name(target)))
}

pub fn cname(target: &str) -> RData {
    RData::CNAME(rdata::CNAME(name(target)))
}

enum Scripted {
    Answer(Vec<RData>),
    Timeout,
}

type Question = (SocketAddr, String, RecordType);

/// A test-only DNS transport which answers from a script.
///
/// Questions without a scripted answer fail.
#[derive(Default)]
pub struct ScriptedTransport {
    script: HashMap<Question, Scripted>,
    queries: Mutex<Vec<Question>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(
        mut self,
        server: SocketAddr,
        question: &str,
        record_type: RecordType,
        answers: Vec<RData>,
    ) -> Self {
        self.script.insert(
            (server, name(question).to_utf8(), record_type),
            Scripted::Answer(answers),
        );
        self
    }

    pub fn time_out(mut self, server: SocketAddr, question: &str, record_type: RecordType) -> Self {
        self.script.insert(
            (server, name(question).to_utf8(), record_type),
            Scripted::Timeout,
        );
        self
    }

    /// Every question asked, in order.
    pub fn queries(&self) -> Vec<Question> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn exchange(
        &self,
        server: SocketAddr,
        name: &Name,
        record_type: RecordType,
    ) -> Result<Vec<RData>, ExchangeError> {
        let question = (server, name.to_utf8(), record_type);
        self.queries.lock().unwrap().push(question.clone());
        match self.script.get(&question) {
            Some(Scripted::Answer(answers)) => Ok(answers.clone()),
            Some(Scripted::Timeout) => Err(ExchangeError::Timeout {
                server,
                timeout: Duration::from_secs(5),
            }),
            None => Err(ExchangeError::Failed {
                server,
                source: ResolveError::from(format!("no scripted answer for {question:?}")),
            }),
        }
    }
}

/// Records every gauge value emitted.
#[derive(Default)]
pub struct RecordingMetrics {
    values: Mutex<Vec<(String, u64)>>,
}

impl RecordingMetrics {
    pub fn values(&self) -> Vec<(String, u64)> {
        self.values.lock().unwrap().clone()
    }
}

impl MetricsSink for RecordingMetrics {
    fn gauge(&self, name: &str, value: u64) {
        self.values.lock().unwrap().push((name.to_string(), value));
    }
}

/// Records every error reported.
#[derive(Default)]
pub struct RecordingErrors {
    reports: Mutex<Vec<ErrorReport>>,
}

impl RecordingErrors {
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl ErrorSink for RecordingErrors {
    async fn report(&self, report: ErrorReport) {
        self.reports.lock().unwrap().push(report);
    }
}

//
// In-process DNS servers
//

fn soa_record(name: &str) -> (RrKey, RecordSet) {
    (
        RrKey::new(LowerName::from_str(name).unwrap(), RecordType::SOA),
        Record::from_rdata(
            Name::from_utf8(name).unwrap(),
            0,
            RData::SOA(rdata::SOA::new(
                Name::from_utf8(name).unwrap(),
                Name::from_utf8(name).unwrap(),
                0,
                0,
                0,
                0,
                0,
            )),
        )
        .into(),
    )
}

// Configuring a DNS server with hickory is a mess of configuration options.
//
// This builder serves a single zone from a list of (name, rdata) pairs.
pub struct ZoneBuilder {
    origin: String,
    records: Vec<(String, RData)>,
}

impl ZoneBuilder {
    pub fn new(origin: impl ToString) -> Self {
        Self {
            origin: origin.to_string(),
            records: vec![],
        }
    }

    pub fn record(mut self, name: impl ToString, rdata: RData) -> Self {
        self.records.push((name.to_string(), rdata));
        self
    }

    fn build_authority(&self) -> Box<dyn AuthorityObject> {
        let mut records = BTreeMap::from([soa_record(&self.origin)]);
        for (name, rdata) in &self.records {
            let name = Name::from_utf8(name).unwrap();
            let record_type = rdata.record_type();
            records
                .entry(RrKey::new(LowerName::new(&name), record_type))
                .or_insert_with(|| RecordSet::new(&name, record_type, 0))
                .insert(Record::from_rdata(name.clone(), 60, rdata.clone()), 0);
        }

        Box::new(Arc::new(
            InMemoryAuthority::new(
                Name::from_utf8(&self.origin).unwrap(),
                records,
                ZoneType::Primary,
                true,
            )
            .unwrap(),
        ))
    }

    async fn serve(self, socket: tokio::net::UdpSocket) {
        let mut catalog = Catalog::new();
        catalog.upsert(
            LowerName::from_str(&self.origin).unwrap(),
            self.build_authority(),
        );

        let mut server = ServerFuture::new(catalog);
        server.register_socket(socket);
        tokio::task::spawn(async move {
            server.block_until_done().await.unwrap();
        });
    }

    pub async fn run(self, bind: &str) -> SocketAddr {
        let socket = tokio::net::UdpSocket::bind(bind).await.unwrap();
        let addr = socket.local_addr().unwrap();
        event!(Level::DEBUG, ?addr, "New DNS server on address");
        self.serve(socket).await;
        addr
    }
}
