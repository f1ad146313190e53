//! Interface for monitored hostnames
use std::sync::Arc;

/// Describes the name of a monitored host
#[derive(Clone, Debug, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct Hostname(pub Arc<str>);

impl Hostname {
    pub fn new(s: impl ToString) -> Self {
        Self(Arc::from(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the name of the gauge tracking borked addresses for this host.
    ///
    /// Dots are replaced with underscores so each hostname occupies a single
    /// segment below `prefix`.
    pub fn metric_name(&self, prefix: &str) -> String {
        format!("{prefix}.{}", self.0.replace('.', "_"))
    }
}

impl std::fmt::Display for Hostname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Hostname {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&'_ str> for Hostname {
    fn from(s: &'_ str) -> Self {
        Self(Arc::from(s))
    }
}

impl std::borrow::Borrow<str> for Hostname {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for Hostname {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}
