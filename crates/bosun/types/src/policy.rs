//! Retention and rollout policy

use crate::service::Service;
use serde::{Deserialize, Serialize};

/// Default number of newest server groups kept around for rollback
pub const DEFAULT_MAX_REMAINING_VERSIONS: u32 = 2;

/// How many server-group versions survive a rollout or a reap pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_max_remaining_versions")]
    pub max_remaining_versions: u32,
}

fn default_max_remaining_versions() -> u32 {
    DEFAULT_MAX_REMAINING_VERSIONS
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_remaining_versions: DEFAULT_MAX_REMAINING_VERSIONS,
        }
    }
}

impl RetentionPolicy {
    pub fn new(max_remaining_versions: u32) -> Self {
        Self {
            max_remaining_versions,
        }
    }

    /// A policy that keeps nothing would delete the serving version
    pub fn is_valid(&self) -> bool {
        self.max_remaining_versions > 0
    }

    pub fn keep(&self) -> usize {
        self.max_remaining_versions as usize
    }
}

/// Parameters of a staged server-group rollout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutParameters {
    /// Server groups left after the rollout; `None` keeps all of them
    pub max_remaining: Option<u32>,

    /// Whether the previous server group is scaled down after cut-over
    pub scale_down: bool,
}

impl RolloutParameters {
    /// Stateful services keep every prior server group running, since
    /// destroying one may destroy data.
    pub fn for_service(service: &Service, retention: &RetentionPolicy) -> Self {
        if service.stateful {
            Self {
                max_remaining: None,
                scale_down: false,
            }
        } else {
            Self {
                max_remaining: Some(retention.max_remaining_versions),
                scale_down: true,
            }
        }
    }
}
