//! Per-session log fan-out.
//!
//! Tool execution and app startup publish progress events keyed by a
//! routing identifier (normally the session id); WebSocket subscribers
//! receive them as JSON frames. Publication is synchronous, never
//! blocks, and never fails the caller - a run must not be able to die
//! because nobody is listening.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub timestamp: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Routing-id -> broadcast channel map. Constructed once at process
/// start and injected wherever log emission is needed.
#[derive(Default)]
pub struct LogHub {
    channels: Mutex<HashMap<String, broadcast::Sender<LogEvent>>>,
}

impl LogHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events for a routing id, creating the channel on
    /// first use.
    pub fn subscribe(&self, route: &str) -> broadcast::Receiver<LogEvent> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(route.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish an event. A route with no subscribers is a no-op; its
    /// channel entry is pruned so the map does not grow unbounded.
    pub fn publish(
        &self,
        route: &str,
        kind: &str,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) {
        let event = LogEvent {
            kind: kind.to_string(),
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
            session_id: route.to_string(),
            data,
        };

        let mut channels = self.channels.lock().unwrap();
        if let Some(sender) = channels.get(route) {
            if sender.send(event).is_err() {
                // All receivers dropped.
                channels.remove(route);
            }
        }
    }

    pub fn subscriber_count(&self, route: &str) -> usize {
        self.channels
            .lock()
            .unwrap()
            .get(route)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}
