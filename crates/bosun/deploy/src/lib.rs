//! Bosun Deployment Orchestration
//!
//! Deploys, rolls back and garbage-collects versioned server groups of a
//! fleet of services. Every service is classified once, dispatched as its own
//! concurrent unit of work, and judged together with its siblings after all
//! of them have finished.
//!
//! ## Architectural Boundaries
//!
//! - collaborators own: configuration staging, provisioning, the pipeline
//!   engine, log collection, tunnel scripting, cache flushing
//! - `bosun-deploy` owns: which collaborator to call for each service, in
//!   what order, and how their failures add up
//!
//! ## Usage
//!
//! ```no_run
//! use bosun_deploy::memory::{
//!     InMemoryCacheFlusher, InMemoryInfrastructure, InMemoryPipelineEngine,
//!     RecordingConfigStager, RecordingLogCollector, SshTunnelScripter,
//! };
//! use bosun_deploy::{DeployerBuilder, ServiceCatalog};
//! use bosun_types::{ResolvedConfiguration, RuntimeSettings, Service, ServiceSettings};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let infra = Arc::new(InMemoryInfrastructure::new());
//! let catalog = ServiceCatalog::new(vec![
//!     Service::new("redis", 100).bootstrap(),
//!     Service::new("gate", 10),
//! ]);
//!
//! let deployer = DeployerBuilder::new(catalog)
//!     .with_inspector(infra.clone())
//!     .with_provisioner(infra)
//!     .with_config_stager(Arc::new(RecordingConfigStager::new()))
//!     .with_pipeline_engine(Arc::new(InMemoryPipelineEngine::new()))
//!     .with_log_collector(Arc::new(RecordingLogCollector::new()))
//!     .with_connection_scripter(Arc::new(SshTunnelScripter::new("bastion")))
//!     .with_cache_flusher(Arc::new(InMemoryCacheFlusher::new()))
//!     .build()?;
//!
//! let settings = RuntimeSettings::new()
//!     .with_service("redis", ServiceSettings::enabled())
//!     .with_service("gate", ServiceSettings::enabled());
//! let report = deployer
//!     .deploy(&[], ResolvedConfiguration::new(settings))
//!     .await?;
//! println!("{} services dispatched", report.outcome.outcomes.len());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod builder;
pub mod catalog;
pub mod collaborators;
pub mod config;
pub mod deployer;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod executor;
pub mod memory;
pub mod monitor;
pub mod pipeline;
pub mod planner;
pub mod reaper;
pub mod telemetry;

pub use builder::DeployerBuilder;
pub use catalog::ServiceCatalog;
pub use collaborators::{
    CacheFlusher, ConfigStager, ConnectionScripter, InfrastructureProvisioner, LogCollector,
    PipelineEngineClient, RunningStateInspector,
};
pub use config::{DeployerConfig, MonitorConfig};
pub use deployer::{DeployReport, Deployer, RollbackReport};
pub use dispatch::Dispatcher;
pub use error::{DeployError, Result};
pub use events::{DeployEvent, DeployEventEnvelope, DeployEvents};
pub use executor::{AggregateOutcome, TaskExecutor, TaskOutcome, WorkUnit};
pub use monitor::{PipelineMonitor, PollingMonitor};
pub use pipeline::{PipelineBuilder, RedBlackPipelineBuilder};
pub use planner::{
    classify_deploy, classify_rollback, Classification, DeploymentPlanner, DispatchMode, Plan,
    PlanEntry, PlanSummary, SkipReason, WorkItem,
};
pub use reaper::{
    ActiveExecutionUsage, BakeJobUsage, ReapFailure, ReapReport, ReapSelection, UsageSource,
    VersionReaper,
};
pub use telemetry::init_tracing;
