use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use uuid::Uuid;

/// Per-connection identifier used for log correlation.
///
/// Never appears on the wire; the registry is keyed by [`ChatAddr`].
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnId(String);

impl ConnId {
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A client's network address — the sole correlation key for both the
/// connection registry and the message log.
///
/// Holds the peer IP without the port, so every connection from one host
/// maps to the same key.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatAddr(String);

impl ChatAddr {
    /// Derive the address from a peer socket address.
    pub fn from_peer(peer: &SocketAddr) -> Self {
        Self(peer.ip().to_string())
    }

    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChatAddr {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl AsRef<str> for ChatAddr {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
