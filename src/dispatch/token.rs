use crate::constants::TOKEN_PREFIX;
use crate::error::DispatchError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Opaque handle naming a registered handler.
///
/// Tokens are issued in increasing order and never reused by the registry
/// that issued them, so ordering tokens orders handlers by registration.
/// The wire form is `ID_<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DispatchToken(u64);

impl DispatchToken {
    /// Build a token from its raw counter value.
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DispatchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{TOKEN_PREFIX}{}", self.0)
    }
}

impl FromStr for DispatchToken {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(TOKEN_PREFIX)
            .and_then(|id| id.parse::<u64>().ok())
            .map(Self)
            .ok_or_else(|| DispatchError::InvalidToken(s.to_string()))
    }
}

impl Serialize for DispatchToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DispatchToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
