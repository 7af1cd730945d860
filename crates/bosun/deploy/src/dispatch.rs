//! Carrying out a single work item

use crate::collaborators::{ConfigStager, InfrastructureProvisioner, PipelineEngineClient};
use crate::error::Result;
use crate::events::{DeployEvent, DeployEvents};
use crate::monitor::PipelineMonitor;
use crate::pipeline::PipelineBuilder;
use crate::planner::{DispatchMode, WorkItem};
use bosun_types::{ResolvedConfiguration, RetentionPolicy};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Executes work items against the provisioner or the pipeline engine
#[derive(Clone)]
pub struct Dispatcher {
    stager: Arc<dyn ConfigStager>,
    provisioner: Arc<dyn InfrastructureProvisioner>,
    engine: Arc<dyn PipelineEngineClient>,
    monitor: Arc<dyn PipelineMonitor>,
    builder: Arc<dyn PipelineBuilder>,
    retention: RetentionPolicy,
    events: DeployEvents,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stager: Arc<dyn ConfigStager>,
        provisioner: Arc<dyn InfrastructureProvisioner>,
        engine: Arc<dyn PipelineEngineClient>,
        monitor: Arc<dyn PipelineMonitor>,
        builder: Arc<dyn PipelineBuilder>,
        retention: RetentionPolicy,
        events: DeployEvents,
    ) -> Self {
        Self {
            stager,
            provisioner,
            engine,
            monitor,
            builder,
            retention,
            events,
        }
    }

    /// Run `item` to completion
    pub async fn dispatch(&self, item: WorkItem, resolved: Arc<ResolvedConfiguration>) -> Result<()> {
        self.events.emit(DeployEvent::ServiceDispatched {
            service: item.service.name.clone(),
            mode: item.mode,
        });

        match item.mode {
            DispatchMode::Manual => self.manual(&item, &resolved).await,
            DispatchMode::StagedRollout => self.staged_rollout(&item, &resolved).await,
            DispatchMode::StagedRollback => self.staged_rollback(&item).await,
        }
    }

    #[instrument(skip_all, fields(service = %item.service.name))]
    async fn manual(&self, item: &WorkItem, resolved: &ResolvedConfiguration) -> Result<()> {
        self.events
            .message(format!("Manually deploying {}", item.service.name));
        let configs = self.stager.stage(&item.service, resolved).await?;
        self.provisioner
            .ensure_running(&item.service, resolved, &configs, item.settings.safe_to_update)
            .await
    }

    #[instrument(skip_all, fields(service = %item.service.name))]
    async fn staged_rollout(&self, item: &WorkItem, resolved: &ResolvedConfiguration) -> Result<()> {
        // Uses the plan-time snapshot; a load balancer created since then is
        // upserted again, which the engine treats as a no-op.
        if !item.running.has_load_balancer() {
            self.events
                .message(format!("Upserting {} load balancer", item.service.name));
            let task = self.builder.upsert_load_balancer(&item.service, &item.settings);
            let submission = self.engine.submit_task(&task).await?;
            debug!(reference = %submission.reference, "Submitted load balancer task");
            self.monitor.await_task(&submission.reference).await?;
        }

        self.events
            .message(format!("Deploying {} via red/black", item.service.name));
        let configs = self.stager.stage(&item.service, resolved).await?;
        let pipeline =
            self.builder
                .deploy_pipeline(&item.service, &item.settings, &configs, &self.retention);
        let submission = self.engine.orchestrate(&pipeline).await?;
        info!(reference = %submission.reference, "Submitted deploy pipeline");
        self.monitor.await_pipeline(&submission.reference).await
    }

    #[instrument(skip_all, fields(service = %item.service.name))]
    async fn staged_rollback(&self, item: &WorkItem) -> Result<()> {
        self.events
            .message(format!("Rolling back {} via red/black", item.service.name));
        let pipeline = self.builder.rollback_pipeline(&item.service);
        let submission = self.engine.orchestrate(&pipeline).await?;
        info!(reference = %submission.reference, "Submitted rollback pipeline");
        self.monitor.await_pipeline(&submission.reference).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::memory::{InMemoryInfrastructure, InMemoryPipelineEngine, RecordingConfigStager};
    use crate::monitor::PollingMonitor;
    use crate::pipeline::RedBlackPipelineBuilder;
    use bosun_types::{
        RunningServiceDetails, RuntimeSettings, Service, ServiceName, ServiceSettings,
        StageDefinition,
    };

    struct Fixture {
        infra: Arc<InMemoryInfrastructure>,
        engine: Arc<InMemoryPipelineEngine>,
        stager: Arc<RecordingConfigStager>,
        dispatcher: Dispatcher,
    }

    fn fixture() -> Fixture {
        let infra = Arc::new(InMemoryInfrastructure::new());
        let engine = Arc::new(InMemoryPipelineEngine::new());
        let stager = Arc::new(RecordingConfigStager::new());
        let monitor = Arc::new(PollingMonitor::new(
            engine.clone(),
            MonitorConfig {
                poll_interval_ms: 1,
                timeout_secs: 5,
            },
        ));
        let dispatcher = Dispatcher::new(
            stager.clone(),
            infra.clone(),
            engine.clone(),
            monitor,
            Arc::new(RedBlackPipelineBuilder::new()),
            RetentionPolicy::default(),
            DeployEvents::new(),
        );
        Fixture {
            infra,
            engine,
            stager,
            dispatcher,
        }
    }

    fn item(service: Service, mode: DispatchMode, running: RunningServiceDetails) -> WorkItem {
        WorkItem {
            service,
            settings: ServiceSettings::enabled(),
            mode,
            running,
        }
    }

    fn resolved() -> Arc<ResolvedConfiguration> {
        Arc::new(ResolvedConfiguration::new(
            RuntimeSettings::new().with_service("gate", ServiceSettings::enabled()),
        ))
    }

    #[tokio::test]
    async fn test_manual_stages_then_provisions() {
        let f = fixture();
        f.dispatcher
            .dispatch(
                item(Service::new("redis", 1), DispatchMode::Manual, RunningServiceDetails::empty("redis")),
                resolved(),
            )
            .await
            .unwrap();

        assert_eq!(f.stager.staged_services(), vec![ServiceName::new("redis")]);
        assert_eq!(f.infra.ensure_running_calls(), vec![(ServiceName::new("redis"), true)]);
        assert_eq!(f.engine.submitted_pipelines().len(), 0);
    }

    #[tokio::test]
    async fn test_rollout_creates_missing_load_balancer_first() {
        let f = fixture();
        let running = RunningServiceDetails::empty("gate")
            .with_version(1, ["i-1"])
            .with_latest_enabled(1);
        f.dispatcher
            .dispatch(item(Service::new("gate", 1), DispatchMode::StagedRollout, running), resolved())
            .await
            .unwrap();

        assert_eq!(f.engine.submitted_tasks().len(), 1);
        let pipelines = f.engine.submitted_pipelines();
        assert_eq!(pipelines.len(), 1);
        assert!(matches!(
            pipelines[0].stages[0],
            StageDefinition::DeployServerGroup {
                max_remaining_asgs: Some(2),
                scale_down: true,
                ..
            }
        ));
        assert!(f.infra.ensure_running_calls().is_empty());
    }

    #[tokio::test]
    async fn test_rollout_skips_existing_load_balancer() {
        let f = fixture();
        let running = RunningServiceDetails::empty("gate")
            .with_version(1, ["i-1"])
            .with_latest_enabled(1)
            .with_load_balancer();
        f.dispatcher
            .dispatch(item(Service::new("gate", 1), DispatchMode::StagedRollout, running), resolved())
            .await
            .unwrap();

        assert!(f.engine.submitted_tasks().is_empty());
        assert_eq!(f.engine.submitted_pipelines().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_pipeline_fails_the_item() {
        let f = fixture();
        f.engine
            .fail_executions_for("deck", bosun_types::ExecutionStatus::Terminal);
        let running = RunningServiceDetails::empty("deck")
            .with_version(1, ["i-1"])
            .with_version(2, ["i-2"]);
        let err = f
            .dispatcher
            .dispatch(item(Service::new("deck", 1), DispatchMode::StagedRollback, running), resolved())
            .await
            .unwrap_err();
        assert_eq!(err.severity(), bosun_types::Severity::Fatal);
        assert_eq!(f.engine.submitted_pipelines()[0].name, "Rollback deck");
    }

    #[tokio::test]
    async fn test_failed_load_balancer_task_stops_rollout() {
        let f = fixture();
        f.engine
            .fail_executions_for("gate", bosun_types::ExecutionStatus::Terminal);
        let running = RunningServiceDetails::empty("gate")
            .with_version(1, ["i-1"])
            .with_latest_enabled(1);

        let result = f
            .dispatcher
            .dispatch(item(Service::new("gate", 1), DispatchMode::StagedRollout, running), resolved())
            .await;

        assert!(result.is_err());
        assert_eq!(f.engine.submitted_tasks().len(), 1);
        assert!(f.engine.submitted_pipelines().is_empty());
        assert!(f.stager.staged_services().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_submission_keeps_its_severity() {
        let f = fixture();
        f.engine
            .reject_submissions_for("deck", bosun_types::Problem::warning("engine is draining"));
        let running = RunningServiceDetails::empty("deck")
            .with_version(1, ["i-1"])
            .with_version(2, ["i-2"]);

        let err = f
            .dispatcher
            .dispatch(item(Service::new("deck", 1), DispatchMode::StagedRollback, running), resolved())
            .await
            .unwrap_err();

        assert_eq!(err.severity(), bosun_types::Severity::Warning);
        let problem = err.into_problem(&ServiceName::new("deck"));
        assert_eq!(problem.message, "engine is draining");
        assert_eq!(f.engine.submitted_pipelines().len(), 1);
        assert_eq!(f.engine.status_queries(&bosun_types::ExecutionRef::new("/pipelines/0")), 0);
    }
}
