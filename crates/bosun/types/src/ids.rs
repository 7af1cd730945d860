//! Strongly-typed identifiers for Bosun entities
//!
//! Service names and instance ids are opaque strings handed out by the
//! infrastructure; server-group versions are monotonically increasing
//! sequence numbers, so their natural ordering is creation order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical name of a managed service
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ServiceName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Sequence number of a server group (one immutable version of a service)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ServerGroupVersion(u32);

impl ServerGroupVersion {
    pub const fn new(sequence: u32) -> Self {
        Self(sequence)
    }

    pub const fn sequence(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ServerGroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{:03}", self.0)
    }
}

impl From<u32> for ServerGroupVersion {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Error parsing a server-group version
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid server group version: {0:?}")]
pub struct ParseVersionError(String);

impl FromStr for ServerGroupVersion {
    type Err = ParseVersionError;

    /// Accepts both `7` and the displayed `v007` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('v').unwrap_or(s);
        digits
            .parse::<u32>()
            .map(Self)
            .map_err(|_| ParseVersionError(s.to_string()))
    }
}

/// Identifier of a running instance inside a server group
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for InstanceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Reference returned by the pipeline engine for a submitted task or pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionRef(String);

impl ExecutionRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering_is_creation_order() {
        let mut versions = vec![
            ServerGroupVersion::new(12),
            ServerGroupVersion::new(3),
            ServerGroupVersion::new(7),
        ];
        versions.sort();
        assert_eq!(
            versions.iter().map(|v| v.sequence()).collect::<Vec<_>>(),
            vec![3, 7, 12]
        );
    }

    #[test]
    fn test_version_parse_accepts_display_form() {
        let v: ServerGroupVersion = "v007".parse().unwrap();
        assert_eq!(v, ServerGroupVersion::new(7));
        assert_eq!(v.to_string(), "v007");
        assert_eq!("42".parse::<ServerGroupVersion>().unwrap().sequence(), 42);
        assert!("vx".parse::<ServerGroupVersion>().is_err());
    }
}
