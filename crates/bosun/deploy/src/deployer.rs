//! Deployer - entry point for orchestration operations
//!
//! Ties the catalog, planner, executor, dispatcher and reaper together.
//! Construct one with [`crate::DeployerBuilder`].

use crate::catalog::ServiceCatalog;
use crate::collaborators::{CacheFlusher, ConnectionScripter, LogCollector, PipelineEngineClient};
use crate::config::DeployerConfig;
use crate::dispatch::Dispatcher;
use crate::error::{DeployError, Result};
use crate::events::{DeployEvent, DeployEventEnvelope, DeployEvents};
use crate::executor::{AggregateOutcome, TaskExecutor, WorkUnit};
use crate::planner::{DeploymentPlanner, Plan, PlanEntry, PlanSummary};
use crate::reaper::{ActiveExecutionUsage, BakeJobUsage, ReapReport, UsageSource, VersionReaper};
use bosun_types::{
    LogCapability, Problem, RemoteAction, ResolvedConfiguration, RuntimeSettings, ServiceKind,
    ServiceName,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

/// Result of a deploy call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployReport {
    pub plan: Vec<PlanSummary>,
    pub outcome: AggregateOutcome,
    pub reaps: Vec<ReapReport>,
}

/// Result of a rollback call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackReport {
    pub plan: Vec<PlanSummary>,
    pub outcome: AggregateOutcome,
}

/// Orchestrates deploys, rollbacks and the auxiliary fleet operations
pub struct Deployer {
    pub(crate) catalog: ServiceCatalog,
    pub(crate) planner: DeploymentPlanner,
    pub(crate) executor: TaskExecutor,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) reaper: VersionReaper,
    pub(crate) engine: Arc<dyn PipelineEngineClient>,
    pub(crate) log_collector: Arc<dyn LogCollector>,
    pub(crate) scripter: Arc<dyn ConnectionScripter>,
    pub(crate) cache_flusher: Arc<dyn CacheFlusher>,
    pub(crate) events: DeployEvents,
    pub(crate) config: DeployerConfig,
}

impl Deployer {
    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &DeployerConfig {
        &self.config
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<DeployEventEnvelope> {
        self.events.subscribe()
    }

    /// Deploy `requested` (all services when empty)
    ///
    /// Every planned service is dispatched concurrently. Once all of them
    /// have finished, a batch whose worst problem exceeds the failure
    /// threshold fails the call with every problem attached. On success the
    /// version-accumulating services are reaped.
    #[instrument(skip(self, resolved), fields(requested = requested.len()))]
    pub async fn deploy(
        &self,
        requested: &[ServiceName],
        resolved: ResolvedConfiguration,
    ) -> Result<DeployReport> {
        let services = self.catalog.prioritized(requested)?;
        let settings = resolved.runtime_settings.clone();

        self.events.stage("Deploying services");
        let plan = self.planner.plan_deploy(&services, &settings).await?;
        let summary = plan.summary();

        let units = self.work_units(plan, Arc::new(resolved));
        self.events.message("Waiting on deployments to complete");
        let outcome = self.run(units).await?;

        let reaps = self.reap_accumulating_services(&settings).await;

        info!(
            dispatched = outcome.outcomes.len(),
            reaped = reaps.iter().map(|r| r.deleted.len()).sum::<usize>(),
            "Deploy finished"
        );
        Ok(DeployReport {
            plan: summary,
            outcome,
            reaps,
        })
    }

    /// Roll `requested` back to their previous server groups
    ///
    /// Fails before dispatching anything if any candidate has fewer than
    /// two server groups.
    #[instrument(skip(self, resolved), fields(requested = requested.len()))]
    pub async fn rollback(
        &self,
        requested: &[ServiceName],
        resolved: ResolvedConfiguration,
    ) -> Result<RollbackReport> {
        let services = self.catalog.prioritized(requested)?;
        let settings = resolved.runtime_settings.clone();

        self.events
            .stage("Checking if it is safe to roll back all services");
        let plan = self.planner.plan_rollback(&services, &settings).await?;
        let summary = plan.summary();

        self.events.stage("Rolling back all updatable services");
        let units = self.work_units(plan, Arc::new(resolved));
        self.events.message("Waiting on rollbacks to complete");
        let outcome = self.run(units).await?;

        Ok(RollbackReport {
            plan: summary,
            outcome,
        })
    }

    /// Collect logs from every requested service that supports it
    #[instrument(skip(self, settings), fields(requested = requested.len()))]
    pub async fn collect_logs(
        &self,
        requested: &[ServiceName],
        settings: &RuntimeSettings,
    ) -> Result<()> {
        for service in self.catalog.prioritized(requested)? {
            match service.log_capability {
                LogCapability::Collectable => {
                    self.log_collector.collect_logs(&service, settings).await?;
                }
                LogCapability::Unsupported => {
                    warn!(service = %service.name, "Skipping log collection");
                    self.events
                        .message(format!("{} cannot have logs collected", service.name));
                }
            }
        }
        Ok(())
    }

    /// Flush the infrastructure cache keys; returns the number removed
    #[instrument(skip_all)]
    pub async fn flush_infrastructure_caches(&self, settings: &RuntimeSettings) -> Result<u64> {
        let flushed = match self.catalog.by_kind(ServiceKind::CacheStore) {
            Some(service) => {
                self.cache_flusher
                    .flush_key_space(service, settings, &self.config.cache.key_pattern)
                    .await
            }
            None => Err(DeployError::collaborator("no cache store service in the catalog")),
        };

        match flushed {
            Ok(count) => {
                info!(count, "Flushed infrastructure cache");
                Ok(count)
            }
            Err(e) => {
                let cause = match e {
                    DeployError::Problem(problem) => problem.message,
                    other => other.to_string(),
                };
                Err(Problem::fatal(format!("Failed to flush cache: {cause}")).into())
            }
        }
    }

    /// Script that opens tunnels to the requested services, in request order
    pub fn connect_command(
        &self,
        requested: &[ServiceName],
        settings: &RuntimeSettings,
    ) -> Result<RemoteAction> {
        let commands = self
            .catalog
            .resolve(requested)?
            .iter()
            .map(|service| self.scripter.connect_command(service, settings))
            .collect::<Result<Vec<_>>>()?;

        Ok(RemoteAction {
            script: format!("#!/bin/bash\n{}", commands.join(" &\n")),
            script_description: self.config.connect.script_description.clone(),
            auto_run: false,
        })
    }

    fn work_units(&self, plan: Plan, resolved: Arc<ResolvedConfiguration>) -> Vec<WorkUnit> {
        for entry in plan.entries() {
            if let PlanEntry::Skipped { service, reason } = entry {
                self.events.emit(DeployEvent::ServiceSkipped {
                    service: service.clone(),
                    reason: *reason,
                });
            }
        }

        plan.into_work_items()
            .into_iter()
            .map(|item| {
                let dispatcher = self.dispatcher.clone();
                let resolved = resolved.clone();
                let service = item.service.name.clone();
                WorkUnit::new(service, async move { dispatcher.dispatch(item, resolved).await })
            })
            .collect()
    }

    async fn run(&self, units: Vec<WorkUnit>) -> Result<AggregateOutcome> {
        let outcome = self.executor.run_all(units).await;
        for task in &outcome.outcomes {
            self.events.emit(DeployEvent::ServiceFinished {
                service: task.service.clone(),
                severity: task.severity(),
            });
        }
        outcome.raise_if_exceeds(self.config.failure_threshold)
    }

    /// Reap pipeline runners and image bakers
    ///
    /// Best effort: a failed pass is logged and left for the next deploy.
    async fn reap_accumulating_services(&self, settings: &RuntimeSettings) -> Vec<ReapReport> {
        let sources: [(ServiceKind, Box<dyn UsageSource>); 2] = [
            (
                ServiceKind::PipelineRunner,
                Box::new(ActiveExecutionUsage::new(self.engine.clone())),
            ),
            (
                ServiceKind::ImageBaker,
                Box::new(BakeJobUsage::new(self.engine.clone())),
            ),
        ];

        let mut reports = Vec::new();
        for (kind, source) in sources {
            let Some(service) = self.catalog.by_kind(kind) else {
                continue;
            };
            let enabled = settings
                .service_settings(&service.name)
                .map(|s| s.enabled)
                .unwrap_or(false);
            if !enabled {
                continue;
            }

            match self.reaper.reap(service, settings, source.as_ref()).await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(service = %service.name, "Reap pass failed: {}", e),
            }
        }
        reports
    }
}
