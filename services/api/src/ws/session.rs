//! Manages the WebSocket connection lifecycle for one discussion.

use super::protocol::{ClientMessage, ServerMessage};
use crate::{models::RosterEntry, state::AppState};
use anyhow::{Result, anyhow, bail};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use crossfire_core::{
    engine::{DiscussionEngine, SessionUpdate},
    random::StdRandom,
    runtime::{SessionHandle, SessionRuntime},
    transcript::Contribution,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
///
/// The first client message must be `init`. Once it arrives a fresh engine is
/// spawned on its own task and this function shuttles messages between the
/// socket and that task until the discussion finishes or the client leaves.
#[instrument(name = "ws_session", skip_all, fields(session_id, topic))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    tracing::Span::current().record("session_id", session_id.to_string());
    info!("New WebSocket connection. Awaiting initialization...");

    let (mut socket_tx, mut socket_rx) = socket.split();

    let init = match socket_rx.next().await {
        Some(Ok(Message::Text(text))) => parse_init(&text),
        Some(Ok(_)) => Err(anyhow!("First message was not a text `init` message.")),
        Some(Err(e)) => Err(anyhow!("Failed to read init message: {e}")),
        None => {
            info!("Client disconnected before sending init message.");
            return;
        }
    };
    let (topic, job_title) = match init {
        Ok(fields) => fields,
        Err(e) => {
            // If initialization fails, send an error and terminate.
            error!("Session initialization failed: {:?}", e);
            let _ = send_msg(
                &mut socket_tx,
                ServerMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };
    tracing::Span::current().record("topic", topic.as_str());

    let engine = DiscussionEngine::new(
        topic.clone(),
        job_title.clone(),
        state.roster.as_ref().clone(),
        state.config.engine.clone(),
        Box::new(StdRandom::from_entropy()),
    );
    let (handle, updates_rx, runtime) = SessionRuntime::spawn(engine, state.generator.clone());

    let initialized = ServerMessage::Initialized {
        session_id,
        topic: topic.clone(),
        job_title: job_title.clone(),
        roster: state.roster.members().iter().map(RosterEntry::from).collect(),
        max_rounds: state.config.engine.scheduler.max_rounds,
    };
    if send_msg(&mut socket_tx, initialized).await.is_err() {
        error!("Failed to send Initialized message to client.");
        return;
    }

    let outcome = run_discussion(
        &state,
        &mut socket_tx,
        socket_rx,
        handle,
        updates_rx,
        &topic,
        &job_title,
    )
    .await;
    if let Err(e) = outcome {
        warn!(error = ?e, "Discussion ended early.");
    }

    // The handle and update receiver are gone by now, so the runtime winds down.
    if let Err(e) = runtime.await {
        error!(error = ?e, "Discussion task panicked.");
    }
    info!("WebSocket connection closed and discussion terminated.");
}

/// Parses the `init` message, returning `(topic, job_title)`.
fn parse_init(text: &str) -> Result<(String, String)> {
    match serde_json::from_str::<ClientMessage>(text)? {
        ClientMessage::Init { topic, job_title } => {
            let topic = topic.trim().to_string();
            let job_title = job_title.trim().to_string();
            if topic.is_empty() || job_title.is_empty() {
                bail!("`topic` and `job_title` must not be empty");
            }
            Ok((topic, job_title))
        }
        _ => bail!("First message must be `init`"),
    }
}

/// The event loop for an active discussion.
///
/// Client messages become engine inputs; engine updates become server messages.
/// When the engine reports `Finished` the transcript is graded and the loop ends.
async fn run_discussion(
    state: &AppState,
    socket_tx: &mut SplitSink<WebSocket, Message>,
    mut socket_rx: SplitStream<WebSocket>,
    handle: SessionHandle,
    mut updates_rx: mpsc::UnboundedReceiver<SessionUpdate>,
    topic: &str,
    job_title: &str,
) -> Result<()> {
    loop {
        tokio::select! {
            msg = socket_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => match msg.into_input() {
                        Some(input) => {
                            if handle.send(input).await.is_err() {
                                warn!("Discussion task is gone; closing connection.");
                                break;
                            }
                        }
                        None => warn!("Ignoring repeated `init` message."),
                    },
                    Err(e) => {
                        warn!(error = %e, "Ignoring malformed client message.");
                        send_msg(socket_tx, ServerMessage::Error {
                            message: format!("Malformed message: {e}"),
                        }).await?;
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client closed the connection.");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Error receiving from client WebSocket: {:?}", e);
                    break;
                }
            },
            update = updates_rx.recv() => {
                let Some(update) = update else { break };
                let finished = match &update {
                    SessionUpdate::Finished { transcript, interruptions, .. } => {
                        Some((transcript.clone(), *interruptions))
                    }
                    _ => None,
                };
                send_msg(socket_tx, update.into()).await?;
                if let Some((transcript, interruptions)) = finished {
                    send_feedback(state, socket_tx, topic, job_title, &transcript, interruptions).await?;
                    break;
                }
            },
        }
    }
    Ok(())
}

async fn send_feedback(
    state: &AppState,
    socket_tx: &mut SplitSink<WebSocket, Message>,
    topic: &str,
    job_title: &str,
    transcript: &[Contribution],
    interruptions: u32,
) -> Result<()> {
    let msg = match state
        .feedback_service
        .generate_feedback(topic, job_title, transcript, interruptions)
        .await
    {
        Ok(feedback) => {
            info!(score = feedback.overall_score, "Feedback generated");
            ServerMessage::Feedback { feedback }
        }
        Err(e) => {
            error!(error = ?e, "Feedback generation failed");
            ServerMessage::Error {
                message: "Feedback generation failed".to_string(),
            }
        }
    };
    send_msg(socket_tx, msg).await
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_init_trims_fields() {
        let (topic, job_title) =
            parse_init(r#"{"type":"init","topic":"  新品定价 ","job_title":"产品经理"}"#).unwrap();
        assert_eq!(topic, "新品定价");
        assert_eq!(job_title, "产品经理");
    }

    #[test]
    fn test_parse_init_rejects_other_messages() {
        assert!(parse_init(r#"{"type":"submit"}"#).is_err());
        assert!(parse_init(r#"{"type":"init","topic":" ","job_title":"产品经理"}"#).is_err());
        assert!(parse_init("not json").is_err());
    }
}
