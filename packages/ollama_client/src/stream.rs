//! Pull-based generate stream.
//!
//! The request is not sent until the first poll. Every end condition (final
//! chunk, closed body, unparsable line, transport error, cancellation) simply
//! ends the stream; nothing is surfaced to the consumer as an error. Dropping
//! the stream drops the in-flight response and releases the connection.

use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::{RequestBuilder, Response};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ndjson::{LineBuffer, is_blank};
use crate::types::IncrementalResult;

/// Lazy, finite, non-restartable sequence of [`IncrementalResult`]s.
pub struct GenerationStream {
    inner: BoxStream<'static, IncrementalResult>,
}

impl GenerationStream {
    pub(crate) fn new(request: RequestBuilder, cancel: CancellationToken) -> Self {
        let reader = ChunkReader {
            phase: Phase::Connecting(request),
            lines: LineBuffer::default(),
            cancel,
        };
        let inner = stream::unfold(reader, |mut reader| async move {
            let item = reader.next_result().await?;
            Some((item, reader))
        })
        .boxed();
        Self { inner }
    }

    /// A stream that ends immediately.
    pub fn empty() -> Self {
        Self {
            inner: stream::empty().boxed(),
        }
    }
}

impl Stream for GenerationStream {
    type Item = IncrementalResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

enum Phase {
    Connecting(RequestBuilder),
    Reading(Response),
    Finished,
}

struct ChunkReader {
    phase: Phase,
    lines: LineBuffer,
    cancel: CancellationToken,
}

impl ChunkReader {
    async fn next_result(&mut self) -> Option<IncrementalResult> {
        loop {
            while let Some(line) = self.lines.next_line() {
                if is_blank(&line) {
                    continue;
                }
                return self.decode(&line);
            }

            match std::mem::replace(&mut self.phase, Phase::Finished) {
                Phase::Finished => return None,

                Phase::Connecting(request) => {
                    if self.cancel.is_cancelled() {
                        debug!("Generation cancelled before the request was sent");
                        return None;
                    }
                    let response = match self.cancel.run_until_cancelled(request.send()).await {
                        Some(Ok(response)) => response,
                        Some(Err(e)) => {
                            warn!("Generate request failed: {}", e);
                            return None;
                        }
                        None => {
                            debug!("Generation cancelled while connecting");
                            return None;
                        }
                    };
                    if !response.status().is_success() {
                        warn!("Provider answered generate with status {}", response.status());
                        return None;
                    }
                    self.phase = Phase::Reading(response);
                }

                Phase::Reading(mut response) => {
                    if self.cancel.is_cancelled() {
                        debug!("Generation cancelled, releasing provider stream");
                        return None;
                    }
                    match self.cancel.run_until_cancelled(response.chunk()).await {
                        Some(Ok(Some(bytes))) => {
                            self.lines.push(&bytes);
                            self.phase = Phase::Reading(response);
                        }
                        Some(Ok(None)) => {
                            debug!("Provider closed the generate stream");
                            let rest = self.lines.take_rest()?;
                            return self.decode(&rest);
                        }
                        Some(Err(e)) => {
                            warn!("Error reading generate stream: {}", e);
                            return None;
                        }
                        None => {
                            debug!("Generation cancelled mid-stream");
                            return None;
                        }
                    }
                }
            }
        }
    }

    /// Unparsable lines end the stream the same way a closed body does.
    fn decode(&mut self, line: &[u8]) -> Option<IncrementalResult> {
        match IncrementalResult::from_line(line) {
            Some(result) => {
                if result.is_done() {
                    self.finish();
                }
                Some(result)
            }
            None => {
                debug!(
                    "Unparsable chunk from provider, ending stream: {}",
                    String::from_utf8_lossy(line)
                );
                self.finish();
                None
            }
        }
    }

    fn finish(&mut self) {
        self.phase = Phase::Finished;
        self.lines = LineBuffer::default();
    }
}
