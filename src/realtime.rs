//! Push channel for device and recording events
//!
//! Stores and the connection monitor publish [`RealtimeEvent`]s on a
//! [`RealtimeHub`]; the HTTP layer streams them to clients and the
//! [`RealtimeNotifier`] turns them into user notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::models::{DeviceStatus, RecordingType};
use crate::notify::{Notification, NotificationLevel, NotificationSink};

/// Number of updates the notifier keeps for display
const MAX_RETAINED_UPDATES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PanicAlert,
    RecordingStart,
    DeviceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl RealtimeEvent {
    pub fn panic_alert(device_id: &str, message: &str) -> Self {
        Self {
            kind: EventKind::PanicAlert,
            device_id: device_id.to_string(),
            timestamp: Utc::now(),
            data: serde_json::json!({ "message": message }),
        }
    }

    pub fn recording_start(device_id: &str, recording_id: &str, recording_type: RecordingType) -> Self {
        Self {
            kind: EventKind::RecordingStart,
            device_id: device_id.to_string(),
            timestamp: Utc::now(),
            data: serde_json::json!({
                "recording_id": recording_id,
                "type": recording_type.as_str(),
            }),
        }
    }

    pub fn device_status(device_id: &str, status: DeviceStatus) -> Self {
        Self {
            kind: EventKind::DeviceStatus,
            device_id: device_id.to_string(),
            timestamp: Utc::now(),
            data: serde_json::json!({ "status": status.as_str() }),
        }
    }

    /// Level and text shown to the user for this event
    pub fn to_notification(&self) -> Notification {
        match self.kind {
            EventKind::PanicAlert => {
                let detail = self
                    .data
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("device in emergency mode");
                Notification::new(
                    NotificationLevel::Error,
                    format!("Panic alert from {}: {}", self.device_id, detail),
                )
            }
            EventKind::RecordingStart => {
                let kind = self
                    .data
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("new");
                Notification::new(
                    NotificationLevel::Info,
                    format!("Recording started: {} recording on {}", kind, self.device_id),
                )
            }
            EventKind::DeviceStatus => {
                let online = self.data.get("status").and_then(|s| s.as_str()) == Some("online");
                Notification::new(
                    NotificationLevel::Success,
                    format!(
                        "Device {} {}",
                        self.device_id,
                        if online { "connected" } else { "disconnected" }
                    ),
                )
            }
        }
    }
}

/// In-process broadcast channel; cloning shares the channel
#[derive(Debug, Clone)]
pub struct RealtimeHub {
    sender: broadcast::Sender<RealtimeEvent>,
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: RealtimeEvent) {
        log::debug!("realtime event {:?} for device {}", event.kind, event.device_id);
        // Events published while nobody listens are dropped
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.sender.subscribe()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[derive(Debug, Default)]
struct NotifierState {
    updates: VecDeque<RealtimeEvent>,
    unread: usize,
}

/// Surfaces realtime events as notifications and keeps a short history
pub struct RealtimeNotifier {
    sink: Arc<dyn NotificationSink>,
    state: Mutex<NotifierState>,
}

impl RealtimeNotifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(NotifierState::default()),
        }
    }

    pub fn handle(&self, event: RealtimeEvent) {
        self.sink.notify(event.to_notification());
        if let Ok(mut state) = self.state.lock() {
            state.updates.push_front(event);
            state.updates.truncate(MAX_RETAINED_UPDATES);
            state.unread = (state.unread + 1).min(MAX_RETAINED_UPDATES);
        }
    }

    /// Most recent updates, newest first
    pub fn updates(&self) -> Vec<RealtimeEvent> {
        self.state
            .lock()
            .map(|s| s.updates.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn unread_count(&self) -> usize {
        self.state.lock().map(|s| s.unread).unwrap_or(0)
    }

    pub fn mark_all_read(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.unread = 0;
        }
    }

    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.updates.clear();
            state.unread = 0;
        }
    }

    /// Consume events from the hub until it is dropped
    pub fn spawn(self: Arc<Self>, hub: &RealtimeHub) -> JoinHandle<()> {
        let mut rx = hub.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => self.handle(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("Realtime notifier lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
