//! Live deployment state snapshots

use crate::ids::{InstanceId, ServerGroupVersion, ServiceName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Load balancer state in front of a service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerDetails {
    pub exists: bool,
}

/// Snapshot of what is currently running for one service
///
/// Produced fresh by every query and never refreshed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningServiceDetails {
    pub service: ServiceName,

    /// Known server-group versions and their member instances
    #[serde(default)]
    pub instances: BTreeMap<ServerGroupVersion, BTreeSet<InstanceId>>,

    /// Newest version currently taking traffic, if any
    #[serde(default)]
    pub latest_enabled_version: Option<ServerGroupVersion>,

    #[serde(default)]
    pub load_balancer: LoadBalancerDetails,
}

impl RunningServiceDetails {
    /// Nothing deployed and no load balancer
    pub fn empty(service: impl Into<ServiceName>) -> Self {
        Self {
            service: service.into(),
            instances: BTreeMap::new(),
            latest_enabled_version: None,
            load_balancer: LoadBalancerDetails::default(),
        }
    }

    pub fn with_version<I>(mut self, version: u32, instances: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<InstanceId>,
    {
        self.instances.insert(
            ServerGroupVersion::new(version),
            instances.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn with_latest_enabled(mut self, version: u32) -> Self {
        self.latest_enabled_version = Some(ServerGroupVersion::new(version));
        self
    }

    pub fn with_load_balancer(mut self) -> Self {
        self.load_balancer.exists = true;
        self
    }

    /// Known versions, oldest first
    pub fn versions(&self) -> Vec<ServerGroupVersion> {
        self.instances.keys().copied().collect()
    }

    pub fn version_count(&self) -> usize {
        self.instances.len()
    }

    pub fn has_load_balancer(&self) -> bool {
        self.load_balancer.exists
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_are_ascending() {
        let details = RunningServiceDetails::empty("orca")
            .with_version(5, ["i-5"])
            .with_version(1, ["i-1a", "i-1b"])
            .with_version(3, Vec::<&str>::new());

        let versions: Vec<u32> = details.versions().iter().map(|v| v.sequence()).collect();
        assert_eq!(versions, vec![1, 3, 5]);
        assert_eq!(details.version_count(), 3);
        assert!(!details.has_load_balancer());
        assert!(details.latest_enabled_version.is_none());
    }
}
