//! Managed service definitions
//!
//! A `Service` is the immutable catalog entry for one deployable component of
//! the fleet. Runtime knobs (enabled, safe to update) live in
//! [`crate::ServiceSettings`] instead.

use crate::ids::ServiceName;
use serde::{Deserialize, Serialize};

/// Role a service plays for the orchestrator itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Runs pipeline executions; old versions are reaped by active execution count
    PipelineRunner,
    /// Runs image bake jobs; old versions are reaped by running bake jobs
    ImageBaker,
    /// Holds infrastructure caches that can be flushed
    CacheStore,
    /// Any other service
    #[default]
    Standard,
}

/// Whether logs can be collected from a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogCapability {
    Collectable,
    #[default]
    Unsupported,
}

/// Catalog entry for a managed service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Canonical service name
    pub name: ServiceName,

    /// Type tag
    #[serde(default)]
    pub kind: ServiceKind,

    /// Deployment priority (higher = deployed first)
    #[serde(default)]
    pub priority: u32,

    /// Must already be running before any staged rollout can be orchestrated
    #[serde(default)]
    pub required_to_bootstrap: bool,

    /// Destroying a server group may destroy data
    #[serde(default)]
    pub stateful: bool,

    /// Log collection capability
    #[serde(default)]
    pub log_capability: LogCapability,
}

impl Service {
    pub fn new(name: impl Into<ServiceName>, priority: u32) -> Self {
        Self {
            name: name.into(),
            kind: ServiceKind::Standard,
            priority,
            required_to_bootstrap: false,
            stateful: false,
            log_capability: LogCapability::Unsupported,
        }
    }

    pub fn with_kind(mut self, kind: ServiceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn bootstrap(mut self) -> Self {
        self.required_to_bootstrap = true;
        self
    }

    pub fn stateful(mut self) -> Self {
        self.stateful = true;
        self
    }

    pub fn with_log_collection(mut self) -> Self {
        self.log_capability = LogCapability::Collectable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_flags() {
        let service = Service::new("store", 10)
            .with_kind(ServiceKind::CacheStore)
            .bootstrap()
            .stateful();

        assert_eq!(service.name.as_str(), "store");
        assert!(service.required_to_bootstrap);
        assert!(service.stateful);
        assert_eq!(service.log_capability, LogCapability::Unsupported);
        assert_eq!(service.kind, ServiceKind::CacheStore);
    }

    #[test]
    fn test_deserialize_defaults() {
        let service: Service = serde_json::from_str(r#"{"name": "gate"}"#).unwrap();
        assert_eq!(service.kind, ServiceKind::Standard);
        assert_eq!(service.priority, 0);
        assert!(!service.required_to_bootstrap);
    }
}
