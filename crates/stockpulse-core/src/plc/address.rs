use std::fmt;
use std::str::FromStr;

use crate::error::PlcError;

/// A validated `ns=<namespace>;s=<identifier>` node address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    namespace: String,
    identifier: String,
}

impl NodeAddress {
    /// Validate and split `address`. Pure: never touches the network.
    pub fn parse(address: &str) -> Result<Self, PlcError> {
        let invalid = || PlcError::InvalidAddress {
            address: address.to_owned(),
        };

        let (ns, s) = address.split_once(';').ok_or_else(invalid)?;
        let namespace = ns.strip_prefix("ns=").ok_or_else(invalid)?;
        let identifier = s.strip_prefix("s=").ok_or_else(invalid)?;

        if namespace.is_empty() || identifier.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            namespace: namespace.to_owned(),
            identifier: identifier.to_owned(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl FromStr for NodeAddress {
    type Err = PlcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ns={};s={}", self.namespace, self.identifier)
    }
}
