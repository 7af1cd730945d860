//! Pipeline and task definitions submitted to the pipeline engine

use bosun_types::{
    ConfigSource, PipelineDefinition, RetentionPolicy, RolloutParameters, ServerGroupTarget,
    Service, ServiceSettings, StageDefinition, TaskDefinition, TaskOperation,
};

/// Application name every definition is submitted under
pub const APPLICATION: &str = "bosun";

/// Builds engine definitions for staged work
pub trait PipelineBuilder: Send + Sync {
    /// Task that creates the load balancer of `service`
    fn upsert_load_balancer(&self, service: &Service, settings: &ServiceSettings)
        -> TaskDefinition;

    /// Pipeline rolling out a new server group of `service`
    fn deploy_pipeline(
        &self,
        service: &Service,
        settings: &ServiceSettings,
        configs: &[ConfigSource],
        retention: &RetentionPolicy,
    ) -> PipelineDefinition;

    /// Pipeline moving traffic back to the previous server group
    fn rollback_pipeline(&self, service: &Service) -> PipelineDefinition;
}

/// Red/black pipelines: a new server group takes traffic before the old one
/// is disabled
#[derive(Debug, Clone, Default)]
pub struct RedBlackPipelineBuilder;

impl RedBlackPipelineBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineBuilder for RedBlackPipelineBuilder {
    fn upsert_load_balancer(
        &self,
        service: &Service,
        settings: &ServiceSettings,
    ) -> TaskDefinition {
        TaskDefinition {
            application: APPLICATION.to_string(),
            description: format!("Upsert load balancer for {}", service.name),
            job: vec![TaskOperation::UpsertLoadBalancer {
                service: service.name.clone(),
                load_balancer_name: service.name.to_string(),
                listener_port: settings.port,
            }],
        }
    }

    fn deploy_pipeline(
        &self,
        service: &Service,
        settings: &ServiceSettings,
        configs: &[ConfigSource],
        retention: &RetentionPolicy,
    ) -> PipelineDefinition {
        let rollout = RolloutParameters::for_service(service, retention);
        PipelineDefinition {
            application: APPLICATION.to_string(),
            name: format!("Deploy {}", service.name),
            stages: vec![StageDefinition::DeployServerGroup {
                ref_id: "deploy".to_string(),
                service: service.name.clone(),
                artifact: settings.artifact.clone(),
                configs: configs.iter().map(|c| c.id.clone()).collect(),
                strategy: "redblack".to_string(),
                max_remaining_asgs: rollout.max_remaining,
                scale_down: rollout.scale_down,
            }],
            limit_concurrent: true,
        }
    }

    fn rollback_pipeline(&self, service: &Service) -> PipelineDefinition {
        PipelineDefinition {
            application: APPLICATION.to_string(),
            name: format!("Rollback {}", service.name),
            stages: vec![
                StageDefinition::EnableServerGroup {
                    ref_id: "enable".to_string(),
                    requisite_stage_ref_ids: Vec::new(),
                    service: service.name.clone(),
                    target: ServerGroupTarget::Previous,
                },
                StageDefinition::DisableServerGroup {
                    ref_id: "disable".to_string(),
                    requisite_stage_ref_ids: vec!["enable".to_string()],
                    service: service.name.clone(),
                    target: ServerGroupTarget::Current,
                },
            ],
            limit_concurrent: true,
        }
    }
}
