//! Contracts of the external collaborators the orchestrator calls
//!
//! Configuration staging, provisioning, the pipeline engine, log collection,
//! tunnel scripting and cache flushing are all black boxes. The orchestrator
//! only decides which of them to call, in what order, and how to classify
//! their failures. In-memory implementations live in [`crate::memory`].

use crate::error::Result;
use async_trait::async_trait;
use bosun_types::{
    ActiveExecutions, BakeStatus, ConfigSource, ExecutionKind, ExecutionRef, ExecutionStatus,
    PipelineDefinition, ResolvedConfiguration, RunningServiceDetails, RuntimeSettings,
    ServerGroupVersion, Service, ServiceSettings, Submission, TaskDefinition,
};
use std::collections::HashMap;

/// Stages rendered profiles where a server group can mount them
#[async_trait]
pub trait ConfigStager: Send + Sync {
    async fn stage(
        &self,
        service: &Service,
        resolved: &ResolvedConfiguration,
    ) -> Result<Vec<ConfigSource>>;
}

/// Reads live deployment state
#[async_trait]
pub trait RunningStateInspector: Send + Sync {
    /// Fresh snapshot of the server groups of `service`
    async fn running_service_details(
        &self,
        service: &Service,
        settings: &RuntimeSettings,
    ) -> Result<RunningServiceDetails>;
}

/// Talks to the infrastructure directly, bypassing the pipeline engine
#[async_trait]
pub trait InfrastructureProvisioner: Send + Sync {
    /// Idempotently create or update the deployment of `service`
    async fn ensure_running(
        &self,
        service: &Service,
        resolved: &ResolvedConfiguration,
        configs: &[ConfigSource],
        safe_to_update: bool,
    ) -> Result<()>;

    /// Destroy one server group of `service`
    async fn delete_version(
        &self,
        service: &Service,
        settings: &ServiceSettings,
        version: ServerGroupVersion,
    ) -> Result<()>;
}

/// Client of the pipeline execution engine
#[async_trait]
pub trait PipelineEngineClient: Send + Sync {
    /// Submit a one-off task
    async fn submit_task(&self, task: &TaskDefinition) -> Result<Submission>;

    /// Submit a multi-stage pipeline
    async fn orchestrate(&self, pipeline: &PipelineDefinition) -> Result<Submission>;

    /// Current status of a submitted task or pipeline
    async fn execution_status(
        &self,
        kind: ExecutionKind,
        reference: &ExecutionRef,
    ) -> Result<ExecutionStatus>;

    /// Status of every bake job, keyed by `<job>@<instance>`
    async fn all_bake_status(&self) -> Result<HashMap<String, BakeStatus>>;

    /// In-flight executions per runner, keyed by `<runner>@<instance>`
    async fn active_executions(&self) -> Result<HashMap<String, ActiveExecutions>>;
}

/// Collects logs from services tagged [`bosun_types::LogCapability::Collectable`]
#[async_trait]
pub trait LogCollector: Send + Sync {
    async fn collect_logs(&self, service: &Service, settings: &RuntimeSettings) -> Result<()>;
}

/// Produces the shell command that opens a tunnel to a service
pub trait ConnectionScripter: Send + Sync {
    fn connect_command(&self, service: &Service, settings: &RuntimeSettings) -> Result<String>;
}

/// Flushes keys of the infrastructure cache
#[async_trait]
pub trait CacheFlusher: Send + Sync {
    /// Delete every key matching `pattern`; returns the number removed
    async fn flush_key_space(
        &self,
        service: &Service,
        settings: &RuntimeSettings,
        pattern: &str,
    ) -> Result<u64>;
}
