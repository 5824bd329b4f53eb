use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::RegistryError;

/// What the cluster should be doing with a graph instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wanted {
    Running,
    Stopping,
    Terminating,
    Unknown,
}

impl fmt::Display for Wanted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Wanted::Running => "running",
            Wanted::Stopping => "stopping",
            Wanted::Terminating => "terminating",
            Wanted::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl FromStr for Wanted {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Wanted::Running),
            "stopping" => Ok(Wanted::Stopping),
            "terminating" => Ok(Wanted::Terminating),
            "unknown" => Ok(Wanted::Unknown),
            other => Err(RegistryError::InvalidWanted(other.to_string())),
        }
    }
}

/// A graph instance's registered intent, as stored under
/// `flo.<namespace>.graph.<type>.<name>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    #[serde(rename = "type")]
    pub graph_type: String,
    pub name: String,
    pub wanted: Wanted,
    /// Base64-encoded opaque bytes, serialized/deserialized transparently.
    #[serde(with = "base64_bytes")]
    pub config: Vec<u8>,
}

impl Registration {
    pub fn new(graph_type: impl Into<String>, name: impl Into<String>, wanted: Wanted, config: Vec<u8>) -> Self {
        Self {
            graph_type: graph_type.into(),
            name: name.into(),
            wanted,
            config,
        }
    }

    pub fn unmarshal_config<T: serde::de::DeserializeOwned>(&self) -> Result<T, RegistryError> {
        Ok(serde_json::from_slice(&self.config)?)
    }

    pub fn key(&self, namespace: &str) -> String {
        registration_key(namespace, &self.graph_type, &self.name)
    }
}

pub fn registration_key(namespace: &str, graph_type: &str, name: &str) -> String {
    format!("flo.{namespace}.graph.{graph_type}.{name}")
}

mod base64_bytes {
    use super::BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        BASE64
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Emitted by a registry watch: the current entries, then live updates.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Put(Registration),
    Delete { graph_type: String, name: String },
    Error(String),
}
