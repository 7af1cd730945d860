//! Progress events of deploy and rollback calls
//!
//! Stage and message events replace the free-text daemon task log: every
//! stage change and notable step is published on a broadcast stream any
//! number of observers can subscribe to.

use crate::planner::{DispatchMode, SkipReason};
use bosun_types::{ServerGroupVersion, ServiceName, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Channel capacity for the event stream
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Something that happened during an orchestration call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeployEvent {
    StageStarted {
        name: String,
    },
    Message {
        text: String,
    },
    ServiceSkipped {
        service: ServiceName,
        reason: SkipReason,
    },
    ServiceDispatched {
        service: ServiceName,
        mode: DispatchMode,
    },
    ServiceFinished {
        service: ServiceName,
        severity: Severity,
    },
    VersionReaped {
        service: ServiceName,
        version: ServerGroupVersion,
    },
}

/// Event with identity and time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployEventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: DeployEvent,
}

/// Broadcast stream of [`DeployEvent`]s
#[derive(Debug, Clone)]
pub struct DeployEvents {
    tx: broadcast::Sender<DeployEventEnvelope>,
}

impl DeployEvents {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeployEventEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn emit(&self, event: DeployEvent) {
        let envelope = DeployEventEnvelope {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        };
        // No subscribers is fine
        let _ = self.tx.send(envelope);
    }

    pub fn stage(&self, name: impl Into<String>) {
        let name = name.into();
        tracing::info!(stage = %name, "Stage started");
        self.emit(DeployEvent::StageStarted { name });
    }

    pub fn message(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::info!("{}", text);
        self.emit(DeployEvent::Message { text });
    }
}

impl Default for DeployEvents {
    fn default() -> Self {
        Self::new()
    }
}
