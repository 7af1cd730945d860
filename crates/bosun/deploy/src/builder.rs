//! Builder for [`Deployer`]
//!
//! Every collaborator must be supplied. The monitor and pipeline builder
//! default to polling and red/black respectively.

use crate::catalog::ServiceCatalog;
use crate::collaborators::{
    CacheFlusher, ConfigStager, ConnectionScripter, InfrastructureProvisioner, LogCollector,
    PipelineEngineClient, RunningStateInspector,
};
use crate::config::DeployerConfig;
use crate::deployer::Deployer;
use crate::dispatch::Dispatcher;
use crate::error::{DeployError, Result};
use crate::events::DeployEvents;
use crate::executor::TaskExecutor;
use crate::monitor::{PipelineMonitor, PollingMonitor};
use crate::pipeline::{PipelineBuilder, RedBlackPipelineBuilder};
use crate::planner::DeploymentPlanner;
use crate::reaper::VersionReaper;
use std::sync::Arc;

/// Builder for constructing a [`Deployer`] with all dependencies
pub struct DeployerBuilder {
    catalog: ServiceCatalog,
    config: DeployerConfig,
    inspector: Option<Arc<dyn RunningStateInspector>>,
    provisioner: Option<Arc<dyn InfrastructureProvisioner>>,
    stager: Option<Arc<dyn ConfigStager>>,
    engine: Option<Arc<dyn PipelineEngineClient>>,
    log_collector: Option<Arc<dyn LogCollector>>,
    scripter: Option<Arc<dyn ConnectionScripter>>,
    cache_flusher: Option<Arc<dyn CacheFlusher>>,
    monitor: Option<Arc<dyn PipelineMonitor>>,
    pipeline_builder: Option<Arc<dyn PipelineBuilder>>,
    events: Option<DeployEvents>,
}

impl DeployerBuilder {
    pub fn new(catalog: ServiceCatalog) -> Self {
        Self {
            catalog,
            config: DeployerConfig::default(),
            inspector: None,
            provisioner: None,
            stager: None,
            engine: None,
            log_collector: None,
            scripter: None,
            cache_flusher: None,
            monitor: None,
            pipeline_builder: None,
            events: None,
        }
    }

    pub fn with_config(mut self, config: DeployerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn RunningStateInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn with_provisioner(mut self, provisioner: Arc<dyn InfrastructureProvisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn with_config_stager(mut self, stager: Arc<dyn ConfigStager>) -> Self {
        self.stager = Some(stager);
        self
    }

    pub fn with_pipeline_engine(mut self, engine: Arc<dyn PipelineEngineClient>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_log_collector(mut self, collector: Arc<dyn LogCollector>) -> Self {
        self.log_collector = Some(collector);
        self
    }

    pub fn with_connection_scripter(mut self, scripter: Arc<dyn ConnectionScripter>) -> Self {
        self.scripter = Some(scripter);
        self
    }

    pub fn with_cache_flusher(mut self, flusher: Arc<dyn CacheFlusher>) -> Self {
        self.cache_flusher = Some(flusher);
        self
    }

    /// Replace the default polling monitor
    pub fn with_monitor(mut self, monitor: Arc<dyn PipelineMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Replace the default red/black pipelines
    pub fn with_pipeline_builder(mut self, builder: Arc<dyn PipelineBuilder>) -> Self {
        self.pipeline_builder = Some(builder);
        self
    }

    /// Publish on an existing event stream
    pub fn with_events(mut self, events: DeployEvents) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<Deployer> {
        self.config.validate()?;

        let inspector = required(self.inspector, "inspector")?;
        let provisioner = required(self.provisioner, "provisioner")?;
        let stager = required(self.stager, "config_stager")?;
        let engine = required(self.engine, "pipeline_engine")?;
        let log_collector = required(self.log_collector, "log_collector")?;
        let scripter = required(self.scripter, "connection_scripter")?;
        let cache_flusher = required(self.cache_flusher, "cache_flusher")?;

        let events = self.events.unwrap_or_default();
        let monitor = self.monitor.unwrap_or_else(|| {
            Arc::new(PollingMonitor::new(engine.clone(), self.config.monitor.clone()))
        });
        let pipeline_builder = self
            .pipeline_builder
            .unwrap_or_else(|| Arc::new(RedBlackPipelineBuilder::new()));

        let dispatcher = Dispatcher::new(
            stager,
            provisioner.clone(),
            engine.clone(),
            monitor,
            pipeline_builder,
            self.config.retention,
            events.clone(),
        );
        let reaper = VersionReaper::new(
            inspector.clone(),
            provisioner,
            self.config.retention,
            events.clone(),
        );

        Ok(Deployer {
            catalog: self.catalog,
            planner: DeploymentPlanner::new(inspector),
            executor: TaskExecutor::new(),
            dispatcher,
            reaper,
            engine,
            log_collector,
            scripter,
            cache_flusher,
            events,
            config: self.config,
        })
    }
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| DeployError::InvalidConfig(format!("{name} required")))
}
