//! Routes validated client commands to the registry and streams answers back.

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::registry::Registry;
use crate::session::Answer;

use super::protocol::{ClientCommand, InboundMessage, ServerMessage};

/// Per-connection state shared by every command arriving on one socket.
pub(crate) struct ConnectionContext {
    pub connection_id: String,
    pub tx: mpsc::Sender<ServerMessage>,
    pub registry: Arc<Registry>,
    /// Cancelled when the socket goes away; stops this connection's answers.
    pub cancel: CancellationToken,
}

/// Decode one text frame and dispatch it. Bad frames are logged and dropped.
pub(crate) async fn handle_text(ctx: &ConnectionContext, text: &str) -> Option<JoinHandle<()>> {
    let message = match InboundMessage::decode(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(connection = %ctx.connection_id, "Malformed message: {}", e);
            return None;
        }
    };
    match message.into_command() {
        Some(cmd) => dispatch_client_message(ctx, cmd).await,
        None => {
            debug!(connection = %ctx.connection_id, "Ignoring message without a usable action or id");
            None
        }
    }
}

/// Apply `cmd`. A question returns the handle of the task streaming its answer.
pub(crate) async fn dispatch_client_message(
    ctx: &ConnectionContext,
    cmd: ClientCommand,
) -> Option<JoinHandle<()>> {
    match cmd {
        ClientCommand::Start { id, model, system } => {
            ctx.registry
                .start(&id, model.as_deref(), system.as_deref())
                .await;
            None
        }
        ClientCommand::Question { id, prompt } => {
            let Some(session) = ctx.registry.get(&id).await else {
                warn!(connection = %ctx.connection_id, conversation = %id, "Question for unknown conversation");
                return None;
            };
            // Claim the slot before spawning so a back-to-back duplicate is dropped
            let answer = session.ask(&prompt);
            Some(tokio::spawn(stream_answer(
                id,
                answer,
                ctx.tx.clone(),
                ctx.cancel.clone(),
            )))
        }
        ClientCommand::End { id } => {
            ctx.registry.remove(&id).await;
            None
        }
    }
}

async fn stream_answer(
    id: String,
    mut answer: Answer,
    tx: mpsc::Sender<ServerMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(conversation = %id, "Connection closed, abandoning answer");
                break;
            }
            next = answer.next() => {
                let Some(result) = next else { break };
                if tx.send(ServerMessage::answer(&id, &result)).await.is_err() {
                    debug!(conversation = %id, "Outbound channel closed, abandoning answer");
                    break;
                }
            }
        }
    }
}
