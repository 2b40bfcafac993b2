// ── PLC transport seam ──
//
// The industrial protocol itself lives behind these traits. The client only
// needs to dial, read a node, write a node, and hang up.

use std::fmt;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::address::NodeAddress;

/// A scalar held by a PLC node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlcValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PlcValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
        }
    }
}

impl fmt::Display for PlcValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for PlcValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for PlcValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for PlcValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PlcValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for PlcValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Where and as whom to dial.
#[derive(Debug, Clone)]
pub struct PlcEndpoint {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

/// What a transport reports when a call fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFault {
    /// The server answered with a protocol status code.
    #[error("{name} (0x{code:08X})")]
    Status { code: u32, name: String },

    /// Anything else: refused dial, dropped socket, timeout.
    #[error("{0}")]
    Other(String),
}

/// Dials sessions to one kind of PLC endpoint.
#[async_trait]
pub trait PlcTransport: Send + Sync {
    async fn connect(&self, endpoint: &PlcEndpoint) -> Result<Box<dyn PlcSession>, TransportFault>;
}

/// An established session.
#[async_trait]
pub trait PlcSession: Send + Sync {
    async fn read_value(&self, node: &NodeAddress) -> Result<PlcValue, TransportFault>;

    async fn write_value(&self, node: &NodeAddress, value: &PlcValue) -> Result<(), TransportFault>;

    async fn disconnect(&self) -> Result<(), TransportFault>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn values_deserialize_untagged() {
        let v: Vec<PlcValue> = serde_json::from_str(r#"[3, 1.5, true, "OFF"]"#).unwrap();
        assert_eq!(
            v,
            vec![
                PlcValue::Int(3),
                PlcValue::Float(1.5),
                PlcValue::Bool(true),
                PlcValue::Text("OFF".into()),
            ]
        );
    }

    #[test]
    fn status_fault_shows_name_and_code() {
        let fault = TransportFault::Status {
            code: 0x8034_0000,
            name: "BadNodeIdUnknown".into(),
        };
        assert_eq!(fault.to_string(), "BadNodeIdUnknown (0x80340000)");
    }
}
