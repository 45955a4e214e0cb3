//! Cross-context bridge.
//!
//! The low-latency side appends, the full-capability side drains on a fixed
//! cadence. A drain swaps the whole queue for an empty one, so each message is
//! seen exactly once and messages come out in enqueue order.

mod poller;

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub use poller::Poller;

/// Append-only queue drained in bulk.
#[derive(Debug)]
pub struct Bridge<T> {
    queue: Mutex<Vec<T>>,
}

impl<T> Default for Bridge<T> {
    fn default() -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Bridge<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message. The critical section is a single push.
    pub fn enqueue(&self, message: T) {
        self.queue.lock().push(message);
    }

    /// Takes every queued message, oldest first.
    pub fn drain(&self) -> Vec<T> {
        std::mem::take(&mut *self.queue.lock())
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// Request to play a named effect on the full-capability side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeMessage {
    pub sequence: u64,
    pub target: String,
    pub volume: f64,
    pub pitch: f64,
    /// Milliseconds since the bridge was created.
    pub timestamp_ms: u64,
    pub namespace: String,
}

/// Effect bridge that numbers and timestamps its messages.
#[derive(Debug)]
pub struct EffectBridge {
    queue: Bridge<BridgeMessage>,
    next_sequence: AtomicU64,
    epoch: Instant,
}

impl Default for EffectBridge {
    fn default() -> Self {
        Self {
            queue: Bridge::new(),
            next_sequence: AtomicU64::new(1),
            epoch: Instant::now(),
        }
    }
}

impl EffectBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an effect request and returns its sequence number.
    pub fn request(&self, namespace: &str, target: &str, volume: f64, pitch: f64) -> u64 {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        self.queue.enqueue(BridgeMessage {
            sequence,
            target: target.to_string(),
            volume,
            pitch,
            timestamp_ms: u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX),
            namespace: namespace.to_string(),
        });
        sequence
    }

    pub fn drain(&self) -> Vec<BridgeMessage> {
        self.queue.drain()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Drains the queue into `sink` and returns how many messages were played.
    pub fn deliver(&self, sink: &dyn EffectSink) -> usize {
        let messages = self.drain();
        for message in &messages {
            sink.play_effect(
                &message.target,
                message.volume,
                message.pitch,
                &message.namespace,
            );
        }
        messages.len()
    }
}

/// Full-capability consumer of effect requests.
pub trait EffectSink: Send + Sync {
    fn play_effect(&self, name: &str, volume: f64, pitch: f64, namespace: &str);
}

/// Sink that logs each request and keeps it for inspection.
#[derive(Debug, Default)]
pub struct EffectLog {
    played: Mutex<Vec<PlayedEffect>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayedEffect {
    pub name: String,
    pub volume: f64,
    pub pitch: f64,
    pub namespace: String,
}

impl EffectLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Vec<PlayedEffect> {
        self.played.lock().clone()
    }
}

impl EffectSink for EffectLog {
    fn play_effect(&self, name: &str, volume: f64, pitch: f64, namespace: &str) {
        tracing::info!(effect = name, volume, pitch, namespace, "play effect");
        self.played.lock().push(PlayedEffect {
            name: name.to_string(),
            volume,
            pitch,
            namespace: namespace.to_string(),
        });
    }
}
