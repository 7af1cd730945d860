//! Runtime settings and resolved configuration
//!
//! These are produced by the external configuration resolver and are
//! read-only for the orchestrator.

use crate::ids::ServiceName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-service runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Whether the service should be deployed at all
    pub enabled: bool,

    /// Whether an in-place staged rollout is permitted
    pub safe_to_update: bool,

    /// Artifact (image) to deploy
    #[serde(default)]
    pub artifact: Option<String>,

    /// Port the service listens on
    #[serde(default)]
    pub port: Option<u16>,

    /// Address the service is reachable at
    #[serde(default)]
    pub address: Option<String>,
}

impl ServiceSettings {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            safe_to_update: true,
            artifact: None,
            port: None,
            address: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::enabled()
        }
    }

    pub fn not_safe_to_update(mut self) -> Self {
        self.safe_to_update = false;
        self
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }
}

/// Settings for every service in one deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default)]
    pub services: BTreeMap<ServiceName, ServiceSettings>,
}

impl RuntimeSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, name: impl Into<ServiceName>, settings: ServiceSettings) -> Self {
        self.services.insert(name.into(), settings);
        self
    }

    pub fn service_settings(&self, name: &ServiceName) -> Option<&ServiceSettings> {
        self.services.get(name)
    }
}

/// A staged configuration artifact, ready to be mounted by a server group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSource {
    /// Identifier of the staged artifact (secret, bucket object, ...)
    pub id: String,

    /// Where the artifact is mounted inside the instance
    pub mount_path: String,
}

impl ConfigSource {
    pub fn new(id: impl Into<String>, mount_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mount_path: mount_path.into(),
        }
    }
}

/// Runtime settings plus the rendered profiles for each service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedConfiguration {
    pub runtime_settings: RuntimeSettings,

    /// Rendered profile files keyed by service, then by file name
    #[serde(default)]
    pub profiles: BTreeMap<ServiceName, BTreeMap<String, String>>,
}

impl ResolvedConfiguration {
    pub fn new(runtime_settings: RuntimeSettings) -> Self {
        Self {
            runtime_settings,
            profiles: BTreeMap::new(),
        }
    }

    pub fn with_profile(
        mut self,
        service: impl Into<ServiceName>,
        file_name: impl Into<String>,
        contents: impl Into<String>,
    ) -> Self {
        self.profiles
            .entry(service.into())
            .or_default()
            .insert(file_name.into(), contents.into());
        self
    }

    pub fn service_settings(&self, name: &ServiceName) -> Option<&ServiceSettings> {
        self.runtime_settings.service_settings(name)
    }

    pub fn profiles_for(&self, name: &ServiceName) -> Option<&BTreeMap<String, String>> {
        self.profiles.get(name)
    }
}
