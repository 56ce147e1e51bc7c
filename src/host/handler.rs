//! Routes host commands onto the scheduling orchestrator.

use crate::error::{DrowseError, Result};
use crate::host::contract::{CommandEnvelope, CommandName, EVENT_VERSION, ResponseEnvelope};
use crate::schedule::{Orchestrator, SourceSpec, format_remaining};
use std::sync::Arc;
use tracing::info;

/// Dispatches [`CommandEnvelope`]s to an [`Orchestrator`].
#[derive(Clone)]
pub struct CommandRouter {
    orchestrator: Arc<Orchestrator>,
}

impl CommandRouter {
    /// Create a router over `orchestrator`.
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// The orchestrator commands are routed to.
    #[must_use]
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Route a command envelope to the appropriate handler.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid envelopes or payloads and for any
    /// scheduling failure; the bridge turns it into an error response.
    pub async fn route(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope
            .validate()
            .map_err(|e| DrowseError::Host(e.to_string()))?;

        match envelope.command {
            CommandName::HostPing => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({"pong": true}),
            )),
            CommandName::HostVersion => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({
                    "contract_version": EVENT_VERSION,
                    "version": env!("CARGO_PKG_VERSION"),
                }),
            )),
            CommandName::Schedule => self.handle_schedule(envelope).await,
            CommandName::Cancel => self.handle_cancel(envelope).await,
            CommandName::Status => self.handle_status(envelope).await,
            CommandName::RuntimeStop => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({"stopping": true}),
            )),
        }
    }

    async fn handle_schedule(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let source: SourceSpec = serde_json::from_value(envelope.payload.clone())
            .map_err(|e| DrowseError::Host(format!("invalid schedule payload: {e}")))?;
        let descriptor = self.orchestrator.schedule(source).await?;
        info!(request_id = %envelope.request_id, id = %descriptor.id, "schedule accepted");

        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({
                "message": descriptor.describe(),
                "schedule": descriptor,
            }),
        ))
    }

    async fn handle_cancel(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let was_scheduled = self.orchestrator.current_state().is_scheduled();
        self.orchestrator.cancel().await?;
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"cancelled": was_scheduled}),
        ))
    }

    async fn handle_status(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        self.orchestrator.expire_if_fired().await;
        let state = self.orchestrator.current_state();
        let countdown = self.orchestrator.countdown().snapshot();
        let pending = self.orchestrator.pending_notifications().await;
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({
                "state": state,
                "countdown": {
                    "running": countdown.is_running(),
                    "remaining": format_remaining(countdown.remaining()),
                },
                "pending_notifications": pending,
            }),
        ))
    }
}
