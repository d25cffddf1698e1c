use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{error::ChannelError, types::Chat};

const FLUSH_BYTE_THRESHOLD: usize = 200;
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Low-level primitive a streaming-capable adapter implements: place a
/// placeholder message and repeatedly edit it in place. This is the seam
/// [`StreamingSender`] drives; it is deliberately narrower than [`crate::Channel`]
/// so an adapter can reuse the same flush/backoff machinery regardless of its
/// wire format.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn send_placeholder(&self, chat: &Chat) -> Result<String, ChannelError>;
    async fn edit(&self, chat: &Chat, message_id: &str, text: &str) -> Result<(), ChannelError>;
}

/// Drives the progressive-edit delivery of a stream of text deltas.
///
/// Shares a `disabled` flag with the owning channel so `supports_streaming()`
/// can go false after repeated flush failures.
pub struct StreamingSender {
    flush_interval: Duration,
    max_message_bytes: usize,
    disabled: Arc<AtomicBool>,
}

impl StreamingSender {
    pub fn new(flush_interval: Duration, max_message_bytes: usize, disabled: Arc<AtomicBool>) -> Self {
        Self { flush_interval, max_message_bytes, disabled }
    }

    pub async fn run<T, S>(&self, ctx: CancellationToken, transport: &T, chat: &Chat, deltas: S) -> Result<(), ChannelError>
    where
        T: StreamTransport,
        S: Stream<Item = String> + Unpin,
    {
        let message_id = transport.send_placeholder(chat).await?;
        let mut deltas = Box::pin(deltas);
        let mut buffer = String::new();
        let mut since_flush = 0usize;
        let mut consecutive_failures = 0u32;
        let mut overflow = false;
        let mut overflow_logged = false;
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.tick().await; // first tick fires immediately; consume it

        loop {
            if self.disabled.load(Ordering::SeqCst) {
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    self.flush(transport, chat, &message_id, &buffer, &mut consecutive_failures).await;
                    return Ok(());
                }
                next = deltas.next() => {
                    match next {
                        Some(delta) => {
                            if overflow {
                                continue;
                            }
                            if buffer.len() + delta.len() > self.max_message_bytes {
                                overflow = true;
                                if !overflow_logged {
                                    warn!(max = self.max_message_bytes, "stream buffer would overflow, dropping further deltas");
                                    overflow_logged = true;
                                }
                                self.flush(transport, chat, &message_id, &buffer, &mut consecutive_failures).await;
                                continue;
                            }
                            buffer.push_str(&delta);
                            since_flush += delta.len();
                            if since_flush >= FLUSH_BYTE_THRESHOLD {
                                since_flush = 0;
                                self.flush(transport, chat, &message_id, &buffer, &mut consecutive_failures).await;
                            }
                        }
                        None => {
                            self.flush(transport, chat, &message_id, &buffer, &mut consecutive_failures).await;
                            return Ok(());
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.flush(transport, chat, &message_id, &buffer, &mut consecutive_failures).await;
                }
            }
        }
    }

    async fn flush<T: StreamTransport>(
        &self,
        transport: &T,
        chat: &Chat,
        message_id: &str,
        buffer: &str,
        consecutive_failures: &mut u32,
    ) {
        let truncated = truncate_utf8(buffer, self.max_message_bytes);

        match transport.edit(chat, message_id, truncated).await {
            Ok(()) | Err(ChannelError::NotModified) => {
                *consecutive_failures = 0;
            }
            Err(ChannelError::RateLimited { retry_after_ms }) => {
                tokio::time::sleep(Duration::from_millis(retry_after_ms)).await;
                match transport.edit(chat, message_id, truncated).await {
                    Ok(()) | Err(ChannelError::NotModified) => *consecutive_failures = 0,
                    Err(e) => {
                        warn!(error = %e, "stream flush retry after rate limit failed");
                        self.record_failure(consecutive_failures);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "stream flush failed");
                self.record_failure(consecutive_failures);
            }
        }
    }

    fn record_failure(&self, consecutive_failures: &mut u32) {
        *consecutive_failures += 1;
        if *consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            self.disabled.store(true, Ordering::SeqCst);
        }
    }
}

fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut i = max_bytes;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    &s[..i]
}
