//! Stdin/stdout JSON bridge.
//!
//! Reads newline-delimited JSON `CommandEnvelope` messages, routes them
//! through a [`CommandRouter`], and writes `ResponseEnvelope` and
//! `EventEnvelope` messages as newline-delimited JSON.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::error::{DrowseError, Result};
use crate::host::contract::{
    CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope, events,
};
use crate::host::handler::CommandRouter;
use crate::schedule::{Orchestrator, format_remaining};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

type SharedWriter<W> = Arc<Mutex<W>>;

/// Run the bridge on the process's stdin and stdout.
///
/// # Errors
///
/// Returns an error when stdin or stdout fail.
pub async fn run_stdio_bridge(router: CommandRouter) -> Result<()> {
    run_bridge(
        router,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Run the bridge until `reader` reaches EOF or `runtime.stop` is received.
///
/// State and countdown changes are forwarded as events on a background task
/// sharing `writer` with the response path.
///
/// # Errors
///
/// Returns an error when reading or writing fails.
pub async fn run_bridge<R, W>(router: CommandRouter, reader: R, writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = Arc::new(Mutex::new(writer));
    let shutdown = CancellationToken::new();

    let event_handle = tokio::spawn(forward_events(
        Arc::clone(router.orchestrator()),
        Arc::clone(&writer),
        shutdown.clone(),
    ));

    let reader_result = run_reader(&router, reader, &writer).await;

    shutdown.cancel();
    let _ = event_handle.await;

    let mut w = writer.lock().await;
    w.shutdown()
        .await
        .map_err(|e| DrowseError::Host(format!("failed to close output: {e}")))?;

    reader_result
}

async fn run_reader<R, W>(router: &CommandRouter, mut reader: R, writer: &SharedWriter<W>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| DrowseError::Host(format!("failed to read command: {e}")))?;

        if bytes_read == 0 {
            tracing::info!("input closed (EOF); shutting down bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: CommandEnvelope = match serde_json::from_str(trimmed) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw_line = %trimmed,
                    "failed to parse command envelope"
                );
                let response = ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                );
                write_json(writer, &response).await?;
                continue;
            }
        };

        let is_stop = envelope.command == CommandName::RuntimeStop;

        let response = match router.route(&envelope).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(
                    request_id = %envelope.request_id,
                    command = envelope.command.as_str(),
                    error = %e,
                    "command failed"
                );
                ResponseEnvelope::error(envelope.request_id.clone(), e.to_string())
            }
        };
        write_json(writer, &response).await?;

        if is_stop {
            tracing::info!("runtime.stop received; shutting down bridge");
            break;
        }
    }

    Ok(())
}

async fn forward_events<W>(
    orchestrator: Arc<Orchestrator>,
    writer: SharedWriter<W>,
    shutdown: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    let mut state_rx = orchestrator.subscribe();
    let mut countdown_rx = orchestrator.countdown().subscribe();
    let mut last_display = None;

    loop {
        let event = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                match serde_json::to_value(&state) {
                    Ok(payload) => EventEnvelope::new(events::SCHEDULE_STATE, payload),
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize state event; skipping");
                        continue;
                    }
                }
            }
            changed = countdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let countdown = *countdown_rx.borrow_and_update();
                let display = (countdown.is_running(), format_remaining(countdown.remaining()));
                if last_display.as_ref() == Some(&display) {
                    continue;
                }
                let payload = serde_json::json!({
                    "running": display.0,
                    "remaining": display.1,
                });
                last_display = Some(display);
                EventEnvelope::new(events::COUNTDOWN, payload)
            }
        };

        if let Err(e) = write_json(&writer, &event).await {
            tracing::warn!(error = %e, "failed to write event; stopping event forwarder");
            break;
        }
    }
}

async fn write_json<W, T>(writer: &SharedWriter<W>, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let mut json = serde_json::to_string(value)
        .map_err(|e| DrowseError::Host(format!("failed to serialize envelope: {e}")))?;
    json.push('\n');

    let mut w = writer.lock().await;
    w.write_all(json.as_bytes())
        .await
        .map_err(|e| DrowseError::Host(format!("failed to write output: {e}")))?;
    w.flush()
        .await
        .map_err(|e| DrowseError::Host(format!("failed to flush output: {e}")))?;
    Ok(())
}
