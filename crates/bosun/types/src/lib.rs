//! Bosun Core Types
//!
//! Shared data model for the deployment orchestration core: services and
//! their runtime settings, live server-group snapshots, severity-classified
//! problems, retention policy and the pipeline definitions handed to the
//! execution engine.
//!
//! Nothing in this crate performs I/O. Collaborator contracts and the
//! orchestration logic live in `bosun-deploy`.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod action;
pub mod ids;
pub mod pipeline;
pub mod policy;
pub mod problem;
pub mod running;
pub mod service;
pub mod settings;

pub use action::RemoteAction;
pub use ids::{ExecutionRef, InstanceId, ParseVersionError, ServerGroupVersion, ServiceName};
pub use pipeline::{
    ActiveExecutions, BakeStatus, ExecutionKind, ExecutionStatus, PipelineDefinition,
    ServerGroupTarget, StageDefinition, Submission, TaskDefinition, TaskOperation,
};
pub use policy::{RetentionPolicy, RolloutParameters};
pub use problem::{Problem, ProblemSet, Severity};
pub use running::{LoadBalancerDetails, RunningServiceDetails};
pub use service::{LogCapability, Service, ServiceKind};
pub use settings::{ConfigSource, ResolvedConfiguration, RuntimeSettings, ServiceSettings};
