//! The fan-out hub: holds the subscriber set, batches decoded messages at a
//! fixed cadence, and evicts subscribers whose writes fail or time out —
//! without ever queueing per-subscriber or blocking the flush loop on a
//! single slow subscriber.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use radar_protocol::message::{BatchEnvelope, OutboundMessage};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio_util::sync::CancellationToken;

pub const MAX_SUBSCRIBERS: usize = 100;

/// A write that hasn't completed within this long is treated as a failure
/// and evicts the subscriber, matching the valid flush-interval ceiling —
/// a subscriber that can't keep up with even the slowest configured cadence
/// isn't keeping up at all.
const WRITE_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    #[error("too many subscribers (limit is {max})")]
    TooManySubscribers { max: usize },
}

type SubscriberId = u64;

/// One connected WebSocket subscriber. `sink` is `None` between slot
/// reservation and the upgraded socket being attached; the flush loop
/// treats that as "not yet ready to write", not as a failure.
struct Subscriber {
    sink: AsyncMutex<Option<SplitSink<WebSocket, WsMessage>>>,
}

/// Holds the subscriber set and the pending-message buffer. Cloned cheaply
/// (an `Arc` wrapper) so the orchestrator, HTTP layer, and flush task can
/// all share one hub.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<Inner>,
}

struct Inner {
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
    next_id: AtomicU64,
    pending: tokio::sync::Mutex<Vec<OutboundMessage>>,
    flush_interval: Duration,
    stop: CancellationToken,
}

impl Hub {
    pub fn new(flush_interval: Duration) -> Self {
        Hub {
            inner: Arc::new(Inner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                pending: tokio::sync::Mutex::new(Vec::new()),
                flush_interval,
                stop: CancellationToken::new(),
            }),
        }
    }

    /// Enqueues a decoded message for the next flush. Never blocks on I/O.
    pub async fn publish(&self, message: OutboundMessage) {
        self.inner.pending.lock().await.push(message);
    }

    /// Atomically checks capacity and reserves a subscriber slot, returning
    /// its id. Must be called — and must succeed — before a WebSocket
    /// upgrade is accepted, so a full hub can still be answered with an
    /// HTTP rejection instead of completing the handshake and only then
    /// discovering there was no room.
    pub async fn reserve_slot(&self) -> Result<SubscriberId, HubError> {
        let mut subscribers = self.inner.subscribers.write().await;
        if subscribers.len() >= MAX_SUBSCRIBERS {
            return Err(HubError::TooManySubscribers {
                max: MAX_SUBSCRIBERS,
            });
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        subscribers.insert(
            id,
            Subscriber {
                sink: AsyncMutex::new(None),
            },
        );
        Ok(id)
    }

    /// Attaches an upgraded socket to a previously reserved slot and runs
    /// the read side until the socket errors, closes, or the subscriber is
    /// evicted by a failed flush write. The write side is driven entirely
    /// by [`Hub::flush_once`]; this method never writes except to send a
    /// close frame on the way out.
    pub async fn attach_socket(
        &self,
        id: SubscriberId,
        socket: WebSocket,
        log_sink: Arc<dyn radar_ui_log::LogSink>,
    ) {
        let (socket_tx, mut socket_rx) = socket.split();
        {
            let subscribers = self.inner.subscribers.read().await;
            match subscribers.get(&id) {
                Some(sub) => *sub.sink.lock().await = Some(socket_tx),
                // The reservation was evicted (e.g. a shutdown raced the
                // upgrade) before the socket could be attached.
                None => return,
            }
        }
        tracing::info!(subscriber_id = id, "subscriber connected");

        loop {
            match socket_rx.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Ok(radar_protocol::InboundMessage::Logs { logs }) =
                        serde_json::from_str(&text)
                    {
                        log_sink.write_logs(&logs);
                    }
                }
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => break,
            }
        }
        self.evict(id).await;
    }

    /// Removes a subscriber and best-effort closes its transport.
    /// Idempotent: evicting an already-gone id is a no-op.
    async fn evict(&self, id: SubscriberId) {
        let removed = self.inner.subscribers.write().await.remove(&id);
        if let Some(sub) = removed {
            if let Some(mut sink) = sub.sink.lock().await.take() {
                let _ = sink.send(WsMessage::Close(None)).await;
            }
            tracing::info!(subscriber_id = id, "subscriber evicted");
        }
    }

    /// One flush: swap the pending buffer, serialize once, write directly
    /// to each subscriber's socket under a read lock with a bounded
    /// per-write timeout, then evict anyone whose write failed or timed
    /// out. Returns the number of messages flushed (0 if the buffer was
    /// empty).
    pub async fn flush_once(&self) -> usize {
        let pending = {
            let mut guard = self.inner.pending.lock().await;
            if guard.is_empty() {
                return 0;
            }
            std::mem::take(&mut *guard)
        };
        let count = pending.len();

        let envelope = BatchEnvelope::new(pending);
        let Ok(json) = envelope.to_json() else {
            tracing::warn!("failed to serialize batch envelope");
            return 0;
        };

        let mut failed = Vec::new();
        {
            let subscribers = self.inner.subscribers.read().await;
            for (id, sub) in subscribers.iter() {
                let mut sink = sub.sink.lock().await;
                let Some(socket_tx) = sink.as_mut() else {
                    // Reserved but not yet attached; nothing to write to.
                    continue;
                };
                let write = socket_tx.send(WsMessage::Text(json.clone().into()));
                match tokio::time::timeout(WRITE_TIMEOUT, write).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) | Err(_) => failed.push(*id),
                }
            }
        }

        for id in failed {
            self.evict(id).await;
        }

        tracing::debug!(messages = count, "flush tick");
        count
    }

    /// Runs the flush ticker until [`Hub::shutdown`] is signaled. Always
    /// performs one final flush before returning.
    pub async fn run_flush_loop(&self) {
        let mut ticker = tokio::time::interval(self.inner.flush_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush_once().await;
                }
                () = self.inner.stop.cancelled() => {
                    self.flush_once().await;
                    break;
                }
            }
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.stop.clone()
    }

    /// Stops the flush loop, then closes every subscriber and clears the
    /// set. Safe to call concurrently with [`Hub::run_flush_loop`].
    pub async fn shutdown(&self) {
        self.inner.stop.cancel();
        let mut subscribers = self.inner.subscribers.write().await;
        for (id, sub) in subscribers.drain() {
            if let Some(mut socket_tx) = sub.sink.lock().await.take() {
                let _ = socket_tx.send(WsMessage::Close(None)).await;
            }
            tracing::info!(subscriber_id = id, "subscriber closed on shutdown");
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().await.len()
    }
}
