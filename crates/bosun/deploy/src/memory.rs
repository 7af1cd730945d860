//! In-memory implementations of the collaborator traits
//!
//! These are suitable for development and testing. Every call is recorded
//! so tests can assert on what the orchestrator did, and failures can be
//! injected per service.

use crate::collaborators::{
    CacheFlusher, ConfigStager, ConnectionScripter, InfrastructureProvisioner, LogCollector,
    PipelineEngineClient, RunningStateInspector,
};
use crate::error::{DeployError, Result};
use async_trait::async_trait;
use bosun_types::{
    ActiveExecutions, BakeStatus, ConfigSource, ExecutionKind, ExecutionRef, ExecutionStatus,
    PipelineDefinition, Problem, ResolvedConfiguration, RunningServiceDetails, RuntimeSettings,
    ServerGroupVersion, Service, ServiceName, ServiceSettings, StageDefinition, Submission,
    TaskDefinition, TaskOperation,
};
use dashmap::{DashMap, DashSet};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Append-only call record that preserves call order
struct CallLog<T> {
    seq: AtomicU64,
    entries: DashMap<u64, T>,
}

impl<T: Clone> CallLog<T> {
    fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
            entries: DashMap::new(),
        }
    }

    fn record(&self, entry: T) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(seq, entry);
    }

    fn snapshot(&self) -> Vec<T> {
        let mut entries: Vec<(u64, T)> = self
            .entries
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, entry)| entry).collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// In-memory fleet: answers running-state queries and provisions directly
pub struct InMemoryInfrastructure {
    running: DashMap<ServiceName, RunningServiceDetails>,
    inspections: CallLog<ServiceName>,
    ensure_calls: CallLog<(ServiceName, bool)>,
    deletions: CallLog<(ServiceName, ServerGroupVersion)>,
    ensure_failures: DashMap<ServiceName, Problem>,
    delete_failures: DashMap<(ServiceName, ServerGroupVersion), Problem>,
    inspection_failures: DashMap<ServiceName, Problem>,
    panics: DashSet<ServiceName>,
}

impl InMemoryInfrastructure {
    pub fn new() -> Self {
        Self {
            running: DashMap::new(),
            inspections: CallLog::new(),
            ensure_calls: CallLog::new(),
            deletions: CallLog::new(),
            ensure_failures: DashMap::new(),
            delete_failures: DashMap::new(),
            inspection_failures: DashMap::new(),
            panics: DashSet::new(),
        }
    }

    /// Replace the running state of a service
    pub fn set_running(&self, details: RunningServiceDetails) {
        self.running.insert(details.service.clone(), details);
    }

    pub fn running(&self, service: &ServiceName) -> Option<RunningServiceDetails> {
        self.running.get(service).map(|d| d.clone())
    }

    pub fn fail_ensure_running(&self, service: impl Into<ServiceName>, problem: Problem) {
        self.ensure_failures.insert(service.into(), problem);
    }

    pub fn fail_delete(&self, service: impl Into<ServiceName>, version: u32, problem: Problem) {
        self.delete_failures
            .insert((service.into(), ServerGroupVersion::new(version)), problem);
    }

    pub fn fail_inspection(&self, service: impl Into<ServiceName>, problem: Problem) {
        self.inspection_failures.insert(service.into(), problem);
    }

    /// Make `ensure_running` panic for `service`
    pub fn panic_on_ensure_running(&self, service: impl Into<ServiceName>) {
        self.panics.insert(service.into());
    }

    pub fn inspected_services(&self) -> Vec<ServiceName> {
        self.inspections.snapshot()
    }

    pub fn ensure_running_calls(&self) -> Vec<(ServiceName, bool)> {
        self.ensure_calls.snapshot()
    }

    pub fn deleted_versions(&self) -> Vec<(ServiceName, ServerGroupVersion)> {
        self.deletions.snapshot()
    }

    /// Number of mutating calls received
    pub fn mutation_count(&self) -> usize {
        self.ensure_calls.len() + self.deletions.len()
    }
}

impl Default for InMemoryInfrastructure {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunningStateInspector for InMemoryInfrastructure {
    async fn running_service_details(
        &self,
        service: &Service,
        _settings: &RuntimeSettings,
    ) -> Result<RunningServiceDetails> {
        self.inspections.record(service.name.clone());
        if let Some(problem) = self.inspection_failures.get(&service.name) {
            return Err(problem.clone().into());
        }
        Ok(self
            .running
            .get(&service.name)
            .map(|d| d.clone())
            .unwrap_or_else(|| RunningServiceDetails::empty(service.name.clone())))
    }
}

#[async_trait]
impl InfrastructureProvisioner for InMemoryInfrastructure {
    async fn ensure_running(
        &self,
        service: &Service,
        _resolved: &ResolvedConfiguration,
        _configs: &[ConfigSource],
        safe_to_update: bool,
    ) -> Result<()> {
        self.ensure_calls
            .record((service.name.clone(), safe_to_update));
        if self.panics.contains(&service.name) {
            panic!("provisioner crashed while deploying {}", service.name);
        }
        if let Some(problem) = self.ensure_failures.get(&service.name) {
            return Err(problem.clone().into());
        }

        let mut entry = self
            .running
            .entry(service.name.clone())
            .or_insert_with(|| RunningServiceDetails::empty(service.name.clone()));
        let next = entry
            .versions()
            .last()
            .map(|v| v.sequence() + 1)
            .unwrap_or(1);
        let details = entry.value().clone().with_version(next, [format!("{}-v{next}", service.name)]);
        *entry = details.with_latest_enabled(next);
        Ok(())
    }

    async fn delete_version(
        &self,
        service: &Service,
        _settings: &ServiceSettings,
        version: ServerGroupVersion,
    ) -> Result<()> {
        self.deletions.record((service.name.clone(), version));
        if let Some(problem) = self.delete_failures.get(&(service.name.clone(), version)) {
            return Err(problem.clone().into());
        }
        if let Some(mut details) = self.running.get_mut(&service.name) {
            details.instances.remove(&version);
        }
        Ok(())
    }
}

fn pipeline_service(pipeline: &PipelineDefinition) -> Option<ServiceName> {
    pipeline.stages.first().map(|stage| match stage {
        StageDefinition::DeployServerGroup { service, .. }
        | StageDefinition::EnableServerGroup { service, .. }
        | StageDefinition::DisableServerGroup { service, .. } => service.clone(),
    })
}

fn task_service(task: &TaskDefinition) -> Option<ServiceName> {
    task.job.first().map(|op| match op {
        TaskOperation::UpsertLoadBalancer { service, .. } => service.clone(),
    })
}

/// In-memory pipeline engine
///
/// Submissions succeed immediately unless a status script or a per-service
/// failure is configured.
pub struct InMemoryPipelineEngine {
    seq: AtomicU64,
    tasks: CallLog<TaskDefinition>,
    pipelines: CallLog<PipelineDefinition>,
    scripted: DashMap<ExecutionRef, VecDeque<ExecutionStatus>>,
    queries: DashMap<ExecutionRef, usize>,
    execution_failures: DashMap<ServiceName, ExecutionStatus>,
    submission_failures: DashMap<ServiceName, Problem>,
    bakes: DashMap<String, BakeStatus>,
    active: DashMap<String, ActiveExecutions>,
    fail_usage: AtomicBool,
}

impl InMemoryPipelineEngine {
    pub fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
            tasks: CallLog::new(),
            pipelines: CallLog::new(),
            scripted: DashMap::new(),
            queries: DashMap::new(),
            execution_failures: DashMap::new(),
            submission_failures: DashMap::new(),
            bakes: DashMap::new(),
            active: DashMap::new(),
            fail_usage: AtomicBool::new(false),
        }
    }

    /// Statuses returned for `reference`, in order; the last one repeats
    pub fn script_statuses(&self, reference: &ExecutionRef, statuses: Vec<ExecutionStatus>) {
        self.scripted.insert(reference.clone(), statuses.into());
    }

    /// Executions submitted for `service` end with `status`
    pub fn fail_executions_for(&self, service: impl Into<ServiceName>, status: ExecutionStatus) {
        self.execution_failures.insert(service.into(), status);
    }

    /// Submissions for `service` are rejected with `problem`
    pub fn reject_submissions_for(&self, service: impl Into<ServiceName>, problem: Problem) {
        self.submission_failures.insert(service.into(), problem);
    }

    pub fn set_bake_status(&self, key: impl Into<String>, status: BakeStatus) {
        self.bakes.insert(key.into(), status);
    }

    pub fn set_active_executions(&self, key: impl Into<String>, count: u32) {
        self.active.insert(key.into(), ActiveExecutions { count });
    }

    /// Make usage queries fail
    pub fn fail_usage_queries(&self) {
        self.fail_usage.store(true, Ordering::SeqCst);
    }

    pub fn submitted_tasks(&self) -> Vec<TaskDefinition> {
        self.tasks.snapshot()
    }

    pub fn submitted_pipelines(&self) -> Vec<PipelineDefinition> {
        self.pipelines.snapshot()
    }

    pub fn status_queries(&self, reference: &ExecutionRef) -> usize {
        self.queries.get(reference).map(|q| *q).unwrap_or(0)
    }

    fn submit(&self, prefix: &str, service: Option<ServiceName>) -> Result<Submission> {
        if let Some(service) = &service {
            if let Some(problem) = self.submission_failures.get(service) {
                return Err(problem.clone().into());
            }
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let submission = Submission::new(format!("/{prefix}/{seq}"));
        if let Some(status) = service.and_then(|s| self.execution_failures.get(&s).map(|f| *f)) {
            self.script_statuses(&submission.reference, vec![ExecutionStatus::Running, status]);
        }
        Ok(submission)
    }
}

impl Default for InMemoryPipelineEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineEngineClient for InMemoryPipelineEngine {
    async fn submit_task(&self, task: &TaskDefinition) -> Result<Submission> {
        self.tasks.record(task.clone());
        self.submit("tasks", task_service(task))
    }

    async fn orchestrate(&self, pipeline: &PipelineDefinition) -> Result<Submission> {
        self.pipelines.record(pipeline.clone());
        self.submit("pipelines", pipeline_service(pipeline))
    }

    async fn execution_status(
        &self,
        _kind: ExecutionKind,
        reference: &ExecutionRef,
    ) -> Result<ExecutionStatus> {
        *self.queries.entry(reference.clone()).or_insert(0) += 1;
        match self.scripted.get_mut(reference) {
            Some(mut statuses) => {
                let status = if statuses.len() > 1 {
                    statuses.pop_front()
                } else {
                    statuses.front().copied()
                };
                Ok(status.unwrap_or(ExecutionStatus::Succeeded))
            }
            None => Ok(ExecutionStatus::Succeeded),
        }
    }

    async fn all_bake_status(&self) -> Result<HashMap<String, BakeStatus>> {
        if self.fail_usage.load(Ordering::SeqCst) {
            return Err(DeployError::collaborator("bake status unavailable"));
        }
        Ok(self
            .bakes
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect())
    }

    async fn active_executions(&self) -> Result<HashMap<String, ActiveExecutions>> {
        if self.fail_usage.load(Ordering::SeqCst) {
            return Err(DeployError::collaborator("execution counts unavailable"));
        }
        Ok(self
            .active
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect())
    }
}

/// Config stager that records which services were staged
pub struct RecordingConfigStager {
    staged: CallLog<ServiceName>,
    failures: DashMap<ServiceName, Problem>,
}

impl RecordingConfigStager {
    pub fn new() -> Self {
        Self {
            staged: CallLog::new(),
            failures: DashMap::new(),
        }
    }

    pub fn fail_for(&self, service: impl Into<ServiceName>, problem: Problem) {
        self.failures.insert(service.into(), problem);
    }

    pub fn staged_services(&self) -> Vec<ServiceName> {
        self.staged.snapshot()
    }
}

impl Default for RecordingConfigStager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStager for RecordingConfigStager {
    async fn stage(
        &self,
        service: &Service,
        _resolved: &ResolvedConfiguration,
    ) -> Result<Vec<ConfigSource>> {
        self.staged.record(service.name.clone());
        if let Some(problem) = self.failures.get(&service.name) {
            return Err(problem.clone().into());
        }
        Ok(vec![ConfigSource::new(
            format!("{}-profile", service.name),
            format!("/opt/{}/config", service.name),
        )])
    }
}

/// Log collector that records which services were collected
pub struct RecordingLogCollector {
    collected: CallLog<ServiceName>,
    failures: DashMap<ServiceName, Problem>,
}

impl RecordingLogCollector {
    pub fn new() -> Self {
        Self {
            collected: CallLog::new(),
            failures: DashMap::new(),
        }
    }

    pub fn fail_for(&self, service: impl Into<ServiceName>, problem: Problem) {
        self.failures.insert(service.into(), problem);
    }

    pub fn collected_services(&self) -> Vec<ServiceName> {
        self.collected.snapshot()
    }
}

impl Default for RecordingLogCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogCollector for RecordingLogCollector {
    async fn collect_logs(&self, service: &Service, _settings: &RuntimeSettings) -> Result<()> {
        self.collected.record(service.name.clone());
        match self.failures.get(&service.name) {
            Some(problem) => Err(problem.clone().into()),
            None => Ok(()),
        }
    }
}

/// Scripts an ssh port forward to each service's configured port
#[derive(Debug, Clone)]
pub struct SshTunnelScripter {
    host: String,
}

impl SshTunnelScripter {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

impl ConnectionScripter for SshTunnelScripter {
    fn connect_command(&self, service: &Service, settings: &RuntimeSettings) -> Result<String> {
        let service_settings = settings
            .service_settings(&service.name)
            .ok_or_else(|| DeployError::MissingSettings(service.name.clone()))?;
        let port = service_settings.port.ok_or_else(|| {
            DeployError::collaborator(format!("no port configured for {}", service.name))
        })?;
        let address = service_settings.address.as_deref().unwrap_or("localhost");
        Ok(format!("ssh -N -L {port}:{address}:{port} {}", self.host))
    }
}

/// Key space of an in-memory cache store
pub struct InMemoryCacheFlusher {
    keys: DashSet<String>,
    failures: DashMap<ServiceName, Problem>,
}

impl InMemoryCacheFlusher {
    pub fn new() -> Self {
        Self {
            keys: DashSet::new(),
            failures: DashMap::new(),
        }
    }

    pub fn insert_keys<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        for key in keys {
            self.keys.insert(key.into());
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.keys.iter().map(|k| k.clone()).collect();
        keys.sort();
        keys
    }

    /// Flushes through `service` fail with `problem`
    pub fn fail_for(&self, service: impl Into<ServiceName>, problem: Problem) {
        self.failures.insert(service.into(), problem);
    }
}

impl Default for InMemoryCacheFlusher {
    fn default() -> Self {
        Self::new()
    }
}

/// Glob match supporting a single trailing `*`
fn matches_pattern(key: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

#[async_trait]
impl CacheFlusher for InMemoryCacheFlusher {
    async fn flush_key_space(
        &self,
        service: &Service,
        _settings: &RuntimeSettings,
        pattern: &str,
    ) -> Result<u64> {
        if let Some(problem) = self.failures.get(&service.name) {
            return Err(problem.clone().into());
        }
        let before = self.keys.len();
        self.keys.retain(|key| !matches_pattern(key, pattern));
        Ok((before - self.keys.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_running_adds_versions() {
        let infra = InMemoryInfrastructure::new();
        let service = Service::new("gate", 1);
        let resolved = ResolvedConfiguration::default();

        infra.ensure_running(&service, &resolved, &[], true).await.unwrap();
        infra.ensure_running(&service, &resolved, &[], true).await.unwrap();

        let running = infra.running(&service.name).unwrap();
        assert_eq!(
            running.versions(),
            vec![ServerGroupVersion::new(1), ServerGroupVersion::new(2)]
        );
        assert_eq!(running.latest_enabled_version, Some(ServerGroupVersion::new(2)));
        assert_eq!(infra.mutation_count(), 2);
    }

    #[tokio::test]
    async fn test_scripted_status_repeats_last() {
        let engine = InMemoryPipelineEngine::new();
        let reference = ExecutionRef::new("/pipelines/x");
        engine.script_statuses(&reference, vec![ExecutionStatus::Running, ExecutionStatus::Failed]);

        let kind = ExecutionKind::Pipeline;
        assert_eq!(engine.execution_status(kind, &reference).await.unwrap(), ExecutionStatus::Running);
        assert_eq!(engine.execution_status(kind, &reference).await.unwrap(), ExecutionStatus::Failed);
        assert_eq!(engine.execution_status(kind, &reference).await.unwrap(), ExecutionStatus::Failed);
        assert_eq!(engine.status_queries(&reference), 3);
    }

    #[tokio::test]
    async fn test_flush_matches_prefix() {
        let flusher = InMemoryCacheFlusher::new();
        flusher.insert_keys(["infrastructure-cache:a", "infrastructure-cache:b", "sessions:1"]);

        let removed = flusher
            .flush_key_space(
                &Service::new("redis", 1),
                &RuntimeSettings::new(),
                "infrastructure-cache:*",
            )
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(flusher.keys(), vec!["sessions:1".to_string()]);
    }

    #[test]
    fn test_tunnel_command() {
        let settings = RuntimeSettings::new()
            .with_service("deck", ServiceSettings::enabled().with_port(9000));
        let command = SshTunnelScripter::new("bastion")
            .connect_command(&Service::new("deck", 1), &settings)
            .unwrap();
        assert_eq!(command, "ssh -N -L 9000:localhost:9000 bastion");

        let err = SshTunnelScripter::new("bastion")
            .connect_command(&Service::new("gate", 1), &settings)
            .unwrap_err();
        assert!(matches!(err, DeployError::MissingSettings(_)));
    }
}
