//! Conversation Session
//!
//! One session per logical chat. A session owns its generation config, the
//! provider-issued context buffer, and a single-flight slot:
//!
//! - `Idle` - ready to accept a prompt
//! - `Generating` - one answer is streaming; further prompts are dropped
//!
//! The slot is claimed synchronously inside [`Session::ask`] and released when
//! the final chunk is observed, when the answer stream ends for any other
//! reason, or when the consumer drops the stream early.

use futures::stream::{self, BoxStream, Stream, StreamExt};
use ollama_client::{GenerationConfig, IncrementalResult, OllamaClient};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// No generation holds the slot.
const IDLE: u64 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Generating,
}

pub struct Session {
    id: String,
    config: GenerationConfig,
    client: OllamaClient,
    context: RwLock<Vec<i64>>,
    /// Ticket of the generation holding the slot, or `IDLE`.
    active: AtomicU64,
    next_ticket: AtomicU64,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(id: impl Into<String>, config: GenerationConfig, client: OllamaClient) -> Self {
        Self {
            id: id.into(),
            config,
            client,
            context: RwLock::new(Vec::new()),
            active: AtomicU64::new(IDLE),
            next_ticket: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn state(&self) -> SessionState {
        if self.active.load(Ordering::Acquire) == IDLE {
            SessionState::Idle
        } else {
            SessionState::Generating
        }
    }

    /// Snapshot of the context buffer that the next prompt will carry.
    pub async fn context(&self) -> Vec<i64> {
        self.context.read().await.clone()
    }

    /// Ask the model. While another answer is still streaming this returns
    /// an empty stream and the prompt is dropped.
    pub fn ask(self: &Arc<Self>, prompt: &str) -> Answer {
        let Some(ticket) = self.try_begin() else {
            debug!(conversation = %self.id, "Generation already in progress, dropping prompt");
            return Answer::empty();
        };
        debug!(conversation = %self.id, ticket, "Session -> Generating");

        let session = self.clone();
        let prompt = prompt.to_string();
        let cancel = self.cancel.child_token();
        let generation = stream::once(async move {
            let context = session.context().await;
            session
                .client
                .generate(&session.config, &prompt, &context, cancel)
        })
        .flatten();

        let session = self.clone();
        let results = generation.then(move |result| {
            let session = session.clone();
            async move {
                if let IncrementalResult::Final(end) = &result {
                    *session.context.write().await = end.context.clone();
                    session.finish(ticket);
                }
                result
            }
        });

        Answer {
            inner: Some(results.boxed()),
            guard: Some(GenerationGuard {
                session: self.clone(),
                ticket,
            }),
        }
    }

    /// Abort the in-flight provider read, if any. Later prompts end
    /// immediately, so this is only for tearing the relay down.
    pub fn cancel_generation(&self) {
        self.cancel.cancel();
    }

    fn try_begin(&self) -> Option<u64> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.active
            .compare_exchange(IDLE, ticket, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ticket)
    }

    /// Release the slot if `ticket` still holds it. Releasing twice is harmless.
    fn finish(&self, ticket: u64) {
        if self
            .active
            .compare_exchange(ticket, IDLE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!(conversation = %self.id, ticket, "Session -> Idle");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("model", &self.config.model)
            .field("state", &self.state())
            .finish()
    }
}

/// Returns the session to `Idle` however the answer stream goes away.
struct GenerationGuard {
    session: Arc<Session>,
    ticket: u64,
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.session.finish(self.ticket);
    }
}

/// The incremental results of one prompt, in provider order.
///
/// Dropping it part-way releases the provider stream and the session slot.
pub struct Answer {
    inner: Option<BoxStream<'static, IncrementalResult>>,
    guard: Option<GenerationGuard>,
}

impl Answer {
    fn empty() -> Self {
        Self {
            inner: None,
            guard: None,
        }
    }
}

impl Stream for Answer {
    type Item = IncrementalResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match inner.poll_next_unpin(cx) {
            Poll::Ready(None) => {
                this.inner = None;
                this.guard = None;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}
