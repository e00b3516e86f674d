use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// One audit trail entry. Persistence of these records is an external
/// concern; the core only hands them to the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub entity_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_values: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_values: Option<Value>,
    pub summary: String,
    pub actor_user_id: Option<Uuid>,
    pub actor_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
    pub recorded_at: DateTime<Utc>,
}

/// Fire-and-forget audit sink. Logging failures must never fail or block the
/// transaction that produced the record, so `log` uses a non-blocking send
/// and swallows every error.
#[derive(Debug, Clone)]
pub struct AuditSink {
    sender: mpsc::Sender<AuditRecord>,
}

impl AuditSink {
    pub fn new(sender: mpsc::Sender<AuditRecord>) -> Self {
        Self { sender }
    }

    pub fn log(&self, record: AuditRecord) {
        if let Err(e) = self.sender.try_send(record) {
            warn!(error = %e, "Dropping audit record");
        }
    }
}

/// Builds an audit channel plus its drain task. The drain writes records to
/// the `audit` tracing target, which is where an external collector picks
/// them up.
pub fn channel(buffer: usize) -> (AuditSink, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(buffer);
    let handle = tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            match serde_json::to_string(&record) {
                Ok(json) => info!(target: "audit", %json, "audit"),
                Err(e) => warn!(error = %e, "Failed to serialize audit record"),
            }
        }
    });
    (AuditSink::new(tx), handle)
}
