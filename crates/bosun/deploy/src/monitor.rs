//! Blocking until submitted work reaches a terminal state

use crate::collaborators::PipelineEngineClient;
use crate::config::MonitorConfig;
use crate::error::{DeployError, Result};
use async_trait::async_trait;
use bosun_types::{ExecutionKind, ExecutionRef};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Waits on executions submitted to the pipeline engine
///
/// Returns once the execution succeeded. A failed, cancelled or
/// timed-out execution is an error.
#[async_trait]
pub trait PipelineMonitor: Send + Sync {
    async fn await_task(&self, reference: &ExecutionRef) -> Result<()>;

    async fn await_pipeline(&self, reference: &ExecutionRef) -> Result<()>;
}

/// Polls the engine for status at a fixed interval
pub struct PollingMonitor {
    engine: Arc<dyn PipelineEngineClient>,
    config: MonitorConfig,
}

impl PollingMonitor {
    pub fn new(engine: Arc<dyn PipelineEngineClient>, config: MonitorConfig) -> Self {
        Self { engine, config }
    }

    #[instrument(skip(self), fields(reference = %reference))]
    async fn await_execution(&self, kind: ExecutionKind, reference: &ExecutionRef) -> Result<()> {
        let poll = async {
            loop {
                let status = self.engine.execution_status(kind, reference).await?;
                if status.is_terminal() {
                    return if status.is_success() {
                        debug!(status = %status, "Execution finished");
                        Ok(())
                    } else {
                        warn!(status = %status, "Execution did not succeed");
                        Err(DeployError::ExecutionFailed {
                            reference: reference.clone(),
                            status,
                        })
                    };
                }
                tokio::time::sleep(self.config.poll_interval()).await;
            }
        };

        tokio::time::timeout(self.config.timeout(), poll)
            .await
            .map_err(|_| DeployError::Timeout {
                operation: format!("{kind:?} {reference}").to_lowercase(),
            })?
    }
}

#[async_trait]
impl PipelineMonitor for PollingMonitor {
    async fn await_task(&self, reference: &ExecutionRef) -> Result<()> {
        self.await_execution(ExecutionKind::Task, reference).await
    }

    async fn await_pipeline(&self, reference: &ExecutionRef) -> Result<()> {
        self.await_execution(ExecutionKind::Pipeline, reference).await
    }
}
