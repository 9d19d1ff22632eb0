//! Best-effort audit trail for orchestration actions.
//!
//! The orchestrator records who did what to which deployment. Audit failures
//! must never fail the underlying operation: callers log the returned error
//! at `warn` and move on.

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

/// Sink for audit events. `record` returns a `Result` so failures are
/// explicit at the call site rather than swallowed inside the sink.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, action: &str, actor: Uuid, subject: Uuid, metadata: Option<Value>) -> anyhow::Result<()>;
}

/// Default sink: structured log lines on the `audit` target.
pub struct TracingAuditSink;

#[async_trait::async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, action: &str, actor: Uuid, subject: Uuid, metadata: Option<Value>) -> anyhow::Result<()> {
        info!(target: "audit", action, %actor, %subject, metadata = ?metadata, "audit event");
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Recording sink for assertions, optionally failing every call.
    #[derive(Default)]
    pub struct RecordingAuditSink {
        pub events: Mutex<Vec<(String, Uuid, Uuid)>>,
        pub fail: bool,
    }

    impl RecordingAuditSink {
        pub fn failing() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait::async_trait]
    impl AuditSink for RecordingAuditSink {
        async fn record(&self, action: &str, actor: Uuid, subject: Uuid, _metadata: Option<Value>) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("audit sink unavailable");
            }
            self.events.lock().unwrap().push((action.to_string(), actor, subject));
            Ok(())
        }
    }
}
