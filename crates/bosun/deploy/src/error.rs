//! Deployment error types

use bosun_types::{
    ExecutionRef, ExecutionStatus, Problem, ProblemSet, Severity, ServiceName,
};
use thiserror::Error;

/// Deployment errors
#[derive(Debug, Error)]
pub enum DeployError {
    /// A collaborator reported a problem with an explicit severity
    #[error("{0}")]
    Problem(Problem),

    #[error("Precondition failed for {service}: {reason}")]
    Precondition { service: ServiceName, reason: String },

    #[error("{} problem(s) exceeded {threshold}: {problems}", .problems.len())]
    Aggregate {
        threshold: Severity,
        problems: ProblemSet,
    },

    #[error("Unknown service: {0}")]
    UnknownService(ServiceName),

    #[error("No runtime settings for service {0}")]
    MissingSettings(ServiceName),

    #[error("Execution {reference} finished with status {status}")]
    ExecutionFailed {
        reference: ExecutionRef,
        status: ExecutionStatus,
    },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Task for {service} panicked: {message}")]
    TaskPanicked { service: ServiceName, message: String },

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for deployment operations
pub type Result<T> = std::result::Result<T, DeployError>;

impl DeployError {
    /// Severity this error contributes when it is a unit's outcome
    ///
    /// Only an explicit [`DeployError::Problem`] can be softer than fatal.
    pub fn severity(&self) -> Severity {
        match self {
            DeployError::Problem(problem) => problem.severity,
            DeployError::Aggregate { problems, .. } => problems.max_severity(),
            _ => Severity::Fatal,
        }
    }

    /// Convert into a problem attributed to `service`
    pub fn into_problem(self, service: &ServiceName) -> Problem {
        match self {
            DeployError::Problem(problem) if problem.service.is_some() => problem,
            DeployError::Problem(problem) => problem.for_service(service.clone()),
            other => Problem::new(other.severity(), other.to_string()).for_service(service.clone()),
        }
    }

    pub fn precondition(service: &ServiceName, reason: impl Into<String>) -> Self {
        DeployError::Precondition {
            service: service.clone(),
            reason: reason.into(),
        }
    }

    pub fn collaborator(message: impl std::fmt::Display) -> Self {
        DeployError::Collaborator(message.to_string())
    }
}

impl From<Problem> for DeployError {
    fn from(problem: Problem) -> Self {
        DeployError::Problem(problem)
    }
}
