//! Fork-join execution of per-service work
//!
//! Every unit is spawned up front and every unit is awaited, even after a
//! sibling has failed. Failures are only judged once the whole batch has
//! drained.

use crate::error::{DeployError, Result};
use bosun_types::{Problem, ProblemSet, Severity, ServiceName};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// A future doing the work for one service
pub struct WorkUnit {
    pub service: ServiceName,
    future: BoxFuture<'static, Result<()>>,
}

impl WorkUnit {
    pub fn new<F>(service: ServiceName, future: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            service,
            future: future.boxed(),
        }
    }
}

impl std::fmt::Debug for WorkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkUnit")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

/// Result of one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub service: ServiceName,
    /// `None` when the unit succeeded
    pub problem: Option<Problem>,
}

impl TaskOutcome {
    pub fn succeeded(service: ServiceName) -> Self {
        Self {
            service,
            problem: None,
        }
    }

    pub fn failed(service: ServiceName, problem: Problem) -> Self {
        Self {
            service,
            problem: Some(problem),
        }
    }

    pub fn severity(&self) -> Severity {
        self.problem
            .as_ref()
            .map(|p| p.severity)
            .unwrap_or(Severity::None)
    }

    pub fn is_success(&self) -> bool {
        self.problem.is_none()
    }
}

/// Outcomes of a whole batch, in submission order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateOutcome {
    pub outcomes: Vec<TaskOutcome>,
    pub problems: ProblemSet,
}

impl AggregateOutcome {
    fn from_outcomes(outcomes: Vec<TaskOutcome>) -> Self {
        let problems = outcomes
            .iter()
            .filter_map(|o| o.problem.clone())
            .collect();
        Self { outcomes, problems }
    }

    /// Maximum severity across every unit
    pub fn severity(&self) -> Severity {
        self.problems.max_severity()
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn succeeded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Fail with every collected problem when the worst exceeds `threshold`
    pub fn raise_if_exceeds(self, threshold: Severity) -> Result<Self> {
        if self.problems.exceeds(threshold) {
            return Err(DeployError::Aggregate {
                threshold,
                problems: self.problems,
            });
        }
        Ok(self)
    }
}

/// Runs work units concurrently and joins on all of them
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskExecutor;

impl TaskExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run every unit to completion
    ///
    /// A unit that returns an error contributes that error's severity; a unit
    /// that panics contributes a fatal problem. Neither cancels its siblings.
    pub async fn run_all(&self, units: Vec<WorkUnit>) -> AggregateOutcome {
        let services: Vec<ServiceName> = units.iter().map(|u| u.service.clone()).collect();
        let mut slots: Vec<Option<TaskOutcome>> = vec![None; units.len()];
        let mut set = JoinSet::new();

        for (index, unit) in units.into_iter().enumerate() {
            let WorkUnit { service, future } = unit;
            set.spawn(async move {
                let result = AssertUnwindSafe(future).catch_unwind().await;
                let outcome = match result {
                    Ok(Ok(())) => TaskOutcome::succeeded(service),
                    Ok(Err(err)) => {
                        let problem = err.into_problem(&service);
                        TaskOutcome::failed(service, problem)
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        let problem = DeployError::TaskPanicked {
                            service: service.clone(),
                            message,
                        }
                        .into_problem(&service);
                        TaskOutcome::failed(service, problem)
                    }
                };
                (index, outcome)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    match &outcome.problem {
                        Some(problem) => {
                            warn!(service = %outcome.service, severity = %problem.severity, "Task failed: {}", problem.message)
                        }
                        None => debug!(service = %outcome.service, "Task completed"),
                    }
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(outcome);
                    }
                }
                Err(err) => warn!("Task did not complete: {}", err),
            }
        }

        let outcomes = slots
            .into_iter()
            .zip(services)
            .map(|(slot, service)| {
                slot.unwrap_or_else(|| {
                    let problem = Problem::fatal("task was cancelled before completing")
                        .for_service(service.clone());
                    TaskOutcome::failed(service, problem)
                })
            })
            .collect();

        AggregateOutcome::from_outcomes(outcomes)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
