//! Pipeline engine payloads
//!
//! Task and pipeline definitions submitted to the execution engine, and the
//! status values it reports back. The engine itself is external; these types
//! only fix the contract.

use crate::ids::{ExecutionRef, ServiceName};
use crate::policy::RolloutParameters;
use serde::{Deserialize, Serialize};

/// What a submitted reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionKind {
    /// One-off task
    Task,
    /// Multi-stage pipeline
    Pipeline,
}

/// Engine-reported execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    NotStarted,
    Running,
    Paused,
    Succeeded,
    Failed,
    Canceled,
    Terminal,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded
                | ExecutionStatus::Failed
                | ExecutionStatus::Canceled
                | ExecutionStatus::Terminal
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Succeeded)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Response to a task or pipeline submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    #[serde(rename = "ref")]
    pub reference: ExecutionRef,
}

impl Submission {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: ExecutionRef::new(reference),
        }
    }
}

/// Number of in-flight pipeline executions held by one runner instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveExecutions {
    pub count: u32,
}

/// Status of one image bake job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BakeStatus {
    Running,
    Completed,
    Canceled,
}

/// Operation inside a one-off task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TaskOperation {
    #[serde(rename_all = "camelCase")]
    UpsertLoadBalancer {
        service: ServiceName,
        load_balancer_name: String,
        listener_port: Option<u16>,
    },
}

/// One-off task definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub application: String,
    pub description: String,
    pub job: Vec<TaskOperation>,
}

/// Which server group a stage acts on, resolved by the engine at run time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerGroupTarget {
    /// The newest enabled server group
    Current,
    /// The server group enabled before the current one
    Previous,
}

/// Stage of a multi-stage pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StageDefinition {
    /// Red/black deploy of a new server group
    #[serde(rename_all = "camelCase")]
    DeployServerGroup {
        ref_id: String,
        service: ServiceName,
        artifact: Option<String>,
        configs: Vec<String>,
        strategy: String,
        max_remaining_asgs: Option<u32>,
        scale_down: bool,
    },

    #[serde(rename_all = "camelCase")]
    EnableServerGroup {
        ref_id: String,
        requisite_stage_ref_ids: Vec<String>,
        service: ServiceName,
        target: ServerGroupTarget,
    },

    #[serde(rename_all = "camelCase")]
    DisableServerGroup {
        ref_id: String,
        requisite_stage_ref_ids: Vec<String>,
        service: ServiceName,
        target: ServerGroupTarget,
    },
}

/// Multi-stage pipeline definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDefinition {
    pub application: String,
    pub name: String,
    pub stages: Vec<StageDefinition>,
    pub limit_concurrent: bool,
}

impl PipelineDefinition {
    /// Rollout parameters of the first deploy stage, if the pipeline has one
    pub fn rollout_parameters(&self) -> Option<RolloutParameters> {
        self.stages.iter().find_map(|stage| match stage {
            StageDefinition::DeployServerGroup {
                max_remaining_asgs,
                scale_down,
                ..
            } => Some(RolloutParameters {
                max_remaining: *max_remaining_asgs,
                scale_down: *scale_down,
            }),
            _ => None,
        })
    }
}
