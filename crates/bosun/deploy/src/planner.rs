//! Deployment planning
//!
//! Decides, per service and in priority order, whether it is skipped,
//! provisioned directly (`Manual`) or driven through the pipeline engine
//! (`StagedRollout` / `StagedRollback`). Classification is a pure function of
//! the catalog flags, runtime settings and the plan-time running snapshot.
//! The snapshot is not re-validated before the work item executes.

use crate::collaborators::RunningStateInspector;
use crate::error::{DeployError, Result};
use bosun_types::{
    RunningServiceDetails, RuntimeSettings, Service, ServiceName, ServiceSettings,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// How a work item is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Directly through the infrastructure provisioner
    Manual,
    /// Red/black deploy through the pipeline engine
    StagedRollout,
    /// Rollback pipeline through the pipeline engine
    StagedRollback,
}

impl std::fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DispatchMode::Manual => "manual",
            DispatchMode::StagedRollout => "staged rollout",
            DispatchMode::StagedRollback => "staged rollback",
        };
        f.write_str(name)
    }
}

/// Why a service gets no work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    /// Bootstrap services are already running and have nothing to roll back to
    RequiredToBootstrap,
    NotSafeToUpdate,
}

/// Outcome of classifying one service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "detail")]
pub enum Classification {
    Skip(SkipReason),
    Dispatch(DispatchMode),
}

/// Classify a service for deployment
pub fn classify_deploy(
    service: &Service,
    settings: &ServiceSettings,
    running: &RunningServiceDetails,
) -> Classification {
    if !settings.enabled {
        return Classification::Skip(SkipReason::Disabled);
    }

    if service.required_to_bootstrap || !settings.safe_to_update {
        return Classification::Dispatch(DispatchMode::Manual);
    }

    // A staged rollout needs an existing server group to roll against.
    match running.latest_enabled_version {
        None => Classification::Dispatch(DispatchMode::Manual),
        Some(_) => Classification::Dispatch(DispatchMode::StagedRollout),
    }
}

/// Classify a service for rollback
pub fn classify_rollback(service: &Service, settings: &ServiceSettings) -> Classification {
    if !settings.enabled {
        Classification::Skip(SkipReason::Disabled)
    } else if service.required_to_bootstrap {
        Classification::Skip(SkipReason::RequiredToBootstrap)
    } else if !settings.safe_to_update {
        Classification::Skip(SkipReason::NotSafeToUpdate)
    } else {
        Classification::Dispatch(DispatchMode::StagedRollback)
    }
}

/// A unit of per-service work, consumed once by the executor
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub service: Service,
    pub settings: ServiceSettings,
    pub mode: DispatchMode,
    /// Snapshot taken at plan time
    pub running: RunningServiceDetails,
}

/// One line of a plan
#[derive(Debug, Clone)]
pub enum PlanEntry {
    Skipped {
        service: ServiceName,
        reason: SkipReason,
    },
    Dispatch(WorkItem),
}

/// Serializable summary of a plan entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub service: ServiceName,
    pub classification: Classification,
}

/// Ordered plan for one deploy or rollback call
#[derive(Debug, Clone, Default)]
pub struct Plan {
    entries: Vec<PlanEntry>,
}

impl Plan {
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn summary(&self) -> Vec<PlanSummary> {
        self.entries
            .iter()
            .map(|entry| match entry {
                PlanEntry::Skipped { service, reason } => PlanSummary {
                    service: service.clone(),
                    classification: Classification::Skip(*reason),
                },
                PlanEntry::Dispatch(item) => PlanSummary {
                    service: item.service.name.clone(),
                    classification: Classification::Dispatch(item.mode),
                },
            })
            .collect()
    }

    /// Consume the plan, keeping only the work to dispatch
    pub fn into_work_items(self) -> Vec<WorkItem> {
        self.entries
            .into_iter()
            .filter_map(|entry| match entry {
                PlanEntry::Dispatch(item) => Some(item),
                PlanEntry::Skipped { .. } => None,
            })
            .collect()
    }

    pub fn dispatch_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, PlanEntry::Dispatch(_)))
            .count()
    }
}

/// Builds deploy and rollback plans
pub struct DeploymentPlanner {
    inspector: Arc<dyn RunningStateInspector>,
}

impl DeploymentPlanner {
    pub fn new(inspector: Arc<dyn RunningStateInspector>) -> Self {
        Self { inspector }
    }

    /// Plan a deploy of `services`, which must already be in priority order
    #[instrument(skip_all, fields(services = services.len()))]
    pub async fn plan_deploy(
        &self,
        services: &[Service],
        settings: &RuntimeSettings,
    ) -> Result<Plan> {
        let mut entries = Vec::with_capacity(services.len());

        for service in services {
            let service_settings = settings_for(settings, service)?;
            if !service_settings.enabled {
                debug!(service = %service.name, "Service disabled, skipping");
                entries.push(PlanEntry::Skipped {
                    service: service.name.clone(),
                    reason: SkipReason::Disabled,
                });
                continue;
            }

            let running = self
                .inspector
                .running_service_details(service, settings)
                .await?;

            match classify_deploy(service, service_settings, &running) {
                Classification::Skip(reason) => entries.push(PlanEntry::Skipped {
                    service: service.name.clone(),
                    reason,
                }),
                Classification::Dispatch(mode) => {
                    debug!(service = %service.name, mode = %mode, "Planned deploy");
                    entries.push(PlanEntry::Dispatch(WorkItem {
                        service: service.clone(),
                        settings: service_settings.clone(),
                        mode,
                        running,
                    }));
                }
            }
        }

        Ok(Plan { entries })
    }

    /// Plan a rollback of `services`
    ///
    /// Every rollback candidate is validated while the plan is built: if one
    /// of them has fewer than two server groups the whole call fails, no plan
    /// is returned and nothing is dispatched.
    #[instrument(skip_all, fields(services = services.len()))]
    pub async fn plan_rollback(
        &self,
        services: &[Service],
        settings: &RuntimeSettings,
    ) -> Result<Plan> {
        let mut entries = Vec::with_capacity(services.len());
        for service in services {
            let service_settings = settings_for(settings, service)?;
            match classify_rollback(service, service_settings) {
                Classification::Dispatch(mode) => {
                    let running = self
                        .inspector
                        .running_service_details(service, settings)
                        .await?;
                    if running.version_count() < 2 {
                        return Err(DeployError::precondition(
                            &service.name,
                            format!(
                                "has {} server group(s) - there is nothing to roll back to",
                                running.version_count()
                            ),
                        ));
                    }
                    debug!(service = %service.name, mode = %mode, "Planned rollback");
                    entries.push(PlanEntry::Dispatch(WorkItem {
                        service: service.clone(),
                        settings: service_settings.clone(),
                        mode,
                        running,
                    }));
                }
                Classification::Skip(reason) => entries.push(PlanEntry::Skipped {
                    service: service.name.clone(),
                    reason,
                }),
            }
        }

        Ok(Plan { entries })
    }
}

fn settings_for<'a>(settings: &'a RuntimeSettings, service: &Service) -> Result<&'a ServiceSettings> {
    settings
        .service_settings(&service.name)
        .ok_or_else(|| DeployError::MissingSettings(service.name.clone()))
}
