//! Wires the capturer, frame/message decoder, and fan-out hub together and
//! owns the shutdown sequence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use radar_protocol::frame::parse_packet;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::hub::Hub;
use crate::stats::Stats;

/// Number of consecutive parse errors between throttled warnings.
const PARSE_ERROR_WARN_EVERY: u64 = 100;

/// Owns the counters the dashboard and logs read from.
pub struct Orchestrator {
    hub: Hub,
    stats: Arc<Stats>,
    parse_errors_since_warn: AtomicU64,
}

impl Orchestrator {
    pub fn new(hub: Hub, stats: Arc<Stats>) -> Self {
        Orchestrator {
            hub,
            stats,
            parse_errors_since_warn: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> Arc<Stats> {
        self.stats.clone()
    }

    /// Builds the packet handler registered with the capturer. Parses the
    /// frame, decodes every command with a non-null message, and forwards
    /// decoded messages to the hub via an unbounded channel (the capture
    /// thread itself must never await).
    pub fn packet_handler(self: &Arc<Self>) -> (radar_capture::PacketHandler, DecodeWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = self.clone();

        let handler: radar_capture::PacketHandler = Box::new(move |payload: &[u8]| {
            orchestrator.stats.bytes_received.fetch_add(
                payload.len() as u64,
                Ordering::Relaxed,
            );
            match parse_packet(payload) {
                Ok(packet) => {
                    for command in packet.commands {
                        if let Some(message) = command.message {
                            let _ = tx.send(message);
                        }
                    }
                }
                Err(err) => {
                    orchestrator.note_parse_error(&err);
                }
            }
        });

        (handler, DecodeWorker { hub: self.hub.clone(), rx, stats: self.stats.clone() })
    }

    fn note_parse_error(&self, err: &radar_protocol::FrameError) {
        self.stats.parse_errors.fetch_add(1, Ordering::Relaxed);
        let since = self.parse_errors_since_warn.fetch_add(1, Ordering::Relaxed) + 1;
        if since % PARSE_ERROR_WARN_EVERY == 0 {
            tracing::warn!(count = since, last_error = %err, "parse errors in the last batch");
        }
    }
}

/// Runs on the async runtime: drains decoded messages from the capture
/// thread's channel and publishes them to the hub, converting each into the
/// outbound envelope shape.
pub struct DecodeWorker {
    hub: Hub,
    rx: mpsc::UnboundedReceiver<radar_protocol::Message>,
    stats: Arc<Stats>,
}

impl DecodeWorker {
    pub async fn run(mut self, stop: CancellationToken) {
        loop {
            tokio::select! {
                maybe_message = self.rx.recv() => {
                    match maybe_message {
                        Some(message) => {
                            self.stats.messages_processed.fetch_add(1, Ordering::Relaxed);
                            self.hub.publish(message.into()).await;
                        }
                        None => break,
                    }
                }
                () = stop.cancelled() => break,
            }
        }
    }
}
