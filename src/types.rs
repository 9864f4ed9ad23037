//! Data structures shared by the inspector, the aggregator and the
//! Marco transport.
//!
//! A [`Container`] is a read-only snapshot taken once per poll.  The
//! port table is keyed by [`ExposedPort`], which orders by port number,
//! so walking a container's ports is deterministic from one poll to the
//! next.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Domain key → reachable addresses, rebuilt from scratch on every poll.
pub type BackendMapping = BTreeMap<String, Vec<String>>;

/// A running container as seen by the agent for a single poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    pub labels: HashMap<String, String>,
    pub ports: BTreeMap<ExposedPort, Vec<HostBinding>>,
}

impl Container {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
impl Container {
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_port(mut self, port: ExposedPort, bindings: Vec<HostBinding>) -> Self {
        self.ports.insert(port, bindings);
        self
    }
}

/// A container-side port specification such as `80/tcp`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExposedPort {
    pub port: u16,
    pub protocol: String,
}

#[cfg(test)]
impl ExposedPort {
    pub fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: "tcp".into(),
        }
    }
}

impl FromStr for ExposedPort {
    type Err = std::num::ParseIntError;

    /// Parses `"<port>/<protocol>"`.  A bare port number is read as TCP.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (port, protocol) = match s.split_once('/') {
            Some((port, protocol)) => (port, protocol),
            None => (s, "tcp"),
        };
        Ok(Self {
            port: port.trim().parse()?,
            protocol: protocol.to_string(),
        })
    }
}

impl fmt::Display for ExposedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

/// One host-side publication of a container port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostBinding {
    pub host_ip: String,
    pub host_port: String,
}

impl HostBinding {
    pub fn new(host_ip: impl Into<String>, host_port: impl Into<String>) -> Self {
        Self {
            host_ip: host_ip.into(),
            host_port: host_port.into(),
        }
    }
}

/// One entry of the JSON body pushed to Marco.
///
/// Field names are capitalised on the wire (`Type`, `Domain`, `List`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Backend {
    #[serde(rename = "Type")]
    pub kind: String,
    pub domain: String,
    pub list: Vec<String>,
}
