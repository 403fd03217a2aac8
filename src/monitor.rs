//! Connection monitor: polls connectivity and drives the automatic panic recording
//!
//! The monitor is `Idle` until [`ConnectionMonitor::start`], then `Watching`.
//! Losing connectivity (platform offline, no reachable endpoint, or a platform
//! state that cannot be read) moves it to `PanicTriggered` and creates a single `panic`
//! recording; the flag clears when the internet comes back, when the recording's
//! duration elapses, or on [`ConnectionMonitor::stop_panic_mode`].

use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::MonitorConfig;
use crate::constants::generate_local_id;
use crate::models::{ConnectionStatus, Device, DeviceStatus, NewRecording, Recording, RecordingType};
use crate::notify::{Notification, NotificationSink};
use crate::probe::{check_connection_status, NetworkInfo, ReachabilityProbe};
use crate::realtime::{RealtimeEvent, RealtimeHub};
use crate::registry::DeviceRegistry;
use crate::store::RecordingStore;

pub const REASON_AIRPLANE_MODE: &str = "Airplane mode enabled";
pub const REASON_NO_CONNECTION: &str = "No internet connection";
pub const REASON_DEVICE_OFFLINE: &str = "Device offline";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Watching,
    PanicTriggered,
}

/// Platform connectivity edges delivered to [`ConnectionMonitor::listen`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
    NetworkChanged,
}

/// Recording produced by an automatic trigger
#[derive(Debug, Clone, PartialEq)]
pub struct PanicRecording {
    pub recording: Recording,
    /// False when the recording only exists in memory because the backend failed
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Monitoring is disabled; nothing was checked
    Idle,
    Unchanged,
    Triggered(PanicRecording),
    /// Connectivity is still lost but the panic recording already exists
    AlreadyTriggered,
    Cleared,
}

struct Shared {
    monitoring: bool,
    triggered: bool,
    status: ConnectionStatus,
    poll_task: Option<JoinHandle<()>>,
    auto_clear: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

struct MonitorInner {
    registry: Arc<dyn DeviceRegistry>,
    store: Arc<dyn RecordingStore>,
    probe: Arc<dyn ReachabilityProbe>,
    net: Arc<dyn NetworkInfo>,
    sink: Arc<dyn NotificationSink>,
    events: OnceLock<RealtimeHub>,
    user_id: String,
    poll_interval: Duration,
    panic_duration: Duration,
    shared: Mutex<Shared>,
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        let shared = self.shared.get_mut().unwrap_or_else(PoisonError::into_inner);
        for handle in [
            shared.poll_task.take(),
            shared.auto_clear.take(),
            shared.listener.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

/// Cheap to clone; clones share one state machine
#[derive(Clone)]
pub struct ConnectionMonitor {
    inner: Arc<MonitorInner>,
}

impl ConnectionMonitor {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        store: Arc<dyn RecordingStore>,
        probe: Arc<dyn ReachabilityProbe>,
        net: Arc<dyn NetworkInfo>,
        sink: Arc<dyn NotificationSink>,
        config: &MonitorConfig,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                registry,
                store,
                probe,
                net,
                sink,
                events: OnceLock::new(),
                user_id: user_id.into(),
                poll_interval: config.poll_interval(),
                panic_duration: config.panic_duration(),
                shared: Mutex::new(Shared {
                    monitoring: false,
                    triggered: false,
                    status: ConnectionStatus::assumed_online(),
                    poll_task: None,
                    auto_clear: None,
                    listener: None,
                }),
            }),
        }
    }

    /// Publish a `panic_alert` event on every trigger. Clones share the hub;
    /// only the first hub set is kept.
    pub fn with_events(self, hub: RealtimeHub) -> Self {
        if self.inner.events.set(hub).is_err() {
            log::warn!("Connection monitor already publishes to a realtime hub, ignoring another");
        }
        self
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.inner.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn downgrade(&self) -> Weak<MonitorInner> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<MonitorInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn state(&self) -> MonitorState {
        let shared = self.shared();
        match (shared.monitoring, shared.triggered) {
            (false, _) => MonitorState::Idle,
            (true, false) => MonitorState::Watching,
            (true, true) => MonitorState::PanicTriggered,
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.shared().monitoring
    }

    pub fn is_panic_triggered(&self) -> bool {
        self.shared().triggered
    }

    /// Last known status
    pub fn connection_status(&self) -> ConnectionStatus {
        self.shared().status
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.shared().status = status;
    }

    /// Begin periodic checks; the first check runs one interval after start
    pub fn start(&self) {
        let mut shared = self.shared();
        if shared.monitoring {
            return;
        }
        shared.monitoring = true;

        let weak = self.downgrade();
        let period = self.inner.poll_interval;
        shared.poll_task = Some(tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(monitor) = Self::upgrade(&weak) else {
                    break;
                };
                monitor.tick().await;
            }
        }));
        log::info!(
            "Connection monitoring started (interval {}s)",
            period.as_secs_f64()
        );
    }

    /// Back to `Idle`: polling and any pending auto-clear are cancelled
    pub fn stop(&self) {
        let mut shared = self.shared();
        if let Some(handle) = shared.poll_task.take() {
            handle.abort();
        }
        if let Some(handle) = shared.auto_clear.take() {
            handle.abort();
        }
        let was_monitoring = shared.monitoring;
        shared.monitoring = false;
        shared.triggered = false;
        drop(shared);
        if was_monitoring {
            log::info!("Connection monitoring stopped");
        }
    }

    /// [`stop`](Self::stop) plus the connectivity event listener
    pub fn shutdown(&self) {
        self.stop();
        if let Some(handle) = self.shared().listener.take() {
            handle.abort();
        }
    }

    /// One polling cycle
    pub async fn tick(&self) -> TickOutcome {
        if !self.is_monitoring() {
            return TickOutcome::Idle;
        }
        let status =
            check_connection_status(self.inner.probe.as_ref(), self.inner.net.as_ref()).await;
        self.set_status(status);
        self.evaluate(status).await
    }

    /// Apply the trigger rules to an already computed status
    pub async fn evaluate(&self, status: ConnectionStatus) -> TickOutcome {
        let reason = if status.airplane_mode {
            Some(REASON_AIRPLANE_MODE)
        } else if !status.wifi && !status.mobile_data && !status.has_internet {
            Some(REASON_NO_CONNECTION)
        } else {
            None
        };

        match reason {
            Some(reason) => match self.trigger_panic_mode(reason).await {
                Some(panic) => TickOutcome::Triggered(panic),
                None => TickOutcome::AlreadyTriggered,
            },
            None if status.has_internet && self.is_panic_triggered() => {
                log::info!("Connection restored, clearing automatic panic mode");
                self.stop_panic_mode();
                TickOutcome::Cleared
            }
            None => TickOutcome::Unchanged,
        }
    }

    /// Platform reported it went offline
    pub async fn handle_offline(&self) -> Option<PanicRecording> {
        self.set_status(ConnectionStatus::offline());
        if !self.is_monitoring() {
            return None;
        }
        log::warn!("Platform went offline");
        self.trigger_panic_mode(REASON_DEVICE_OFFLINE).await
    }

    /// Platform reported it is back online; refresh the status
    pub async fn handle_online(&self) -> ConnectionStatus {
        log::info!("Platform back online, re-checking connectivity");
        self.refresh().await
    }

    /// Link type changed; refresh the status
    pub async fn handle_network_change(&self) -> ConnectionStatus {
        log::debug!("Network change detected, re-checking connectivity");
        self.refresh().await
    }

    async fn refresh(&self) -> ConnectionStatus {
        let status =
            check_connection_status(self.inner.probe.as_ref(), self.inner.net.as_ref()).await;
        self.set_status(status);
        status
    }

    /// Create the automatic panic recording. Returns `None` when already triggered.
    ///
    /// Never fails: if the registry or the store cannot be reached, the returned
    /// recording is synthesized locally and a warning notification is emitted.
    pub async fn trigger_panic_mode(&self, reason: &str) -> Option<PanicRecording> {
        let status = {
            let mut shared = self.shared();
            if shared.triggered {
                return None;
            }
            shared.triggered = true;
            shared.status
        };

        log::warn!("Automatic panic mode triggered: {}", reason);
        self.inner
            .sink
            .notify(Notification::error(format!("Panic mode activated: {}", reason)));

        let duration_secs = self.inner.panic_duration.as_secs() as i64;
        let location_data = serde_json::json!({
            "reason": reason,
            "automatic": true,
            "connection_status": status,
            "timestamp": Utc::now().to_rfc3339(),
        });

        let panic = match self.inner.registry.list().await {
            Ok(devices) => {
                let device = active_device(&devices)
                    .cloned()
                    .unwrap_or_else(|| Device::local_placeholder(&self.inner.user_id));
                let data = NewRecording {
                    device_id: device.id.clone(),
                    recording_type: RecordingType::Panic,
                    location_data: Some(location_data.clone()),
                    duration: Some(duration_secs),
                    size: Some(0),
                };
                match self.inner.store.create(data, None).await {
                    Ok(recording) => {
                        log::info!(
                            "Automatic panic recording {} created ({}s)",
                            recording.id,
                            duration_secs
                        );
                        PanicRecording {
                            recording,
                            persisted: true,
                        }
                    }
                    Err(e) => {
                        log::error!("Failed to persist automatic panic recording: {}", e);
                        self.local_recording(&device.id, location_data, duration_secs)
                    }
                }
            }
            Err(e) => {
                log::error!("Failed to list devices for automatic panic recording: {}", e);
                let device = Device::local_placeholder(&self.inner.user_id);
                self.local_recording(&device.id, location_data, duration_secs)
            }
        };

        if !panic.persisted {
            self.inner.sink.notify(Notification::warning(
                "Panic recording kept on this device only; backend unavailable",
            ));
        }

        if let Some(hub) = self.inner.events.get() {
            hub.publish(RealtimeEvent::panic_alert(&panic.recording.device_id, reason));
        }

        self.schedule_auto_clear();
        Some(panic)
    }

    fn local_recording(
        &self,
        device_id: &str,
        location_data: serde_json::Value,
        duration_secs: i64,
    ) -> PanicRecording {
        PanicRecording {
            recording: Recording {
                id: generate_local_id("local"),
                device_id: device_id.to_string(),
                user_id: self.inner.user_id.clone(),
                recording_type: RecordingType::Panic,
                file_path: None,
                location_data: Some(location_data),
                duration: Some(duration_secs),
                size: Some(0),
                created_at: Utc::now(),
                is_downloaded: false,
            },
            persisted: false,
        }
    }

    fn schedule_auto_clear(&self) {
        let mut shared = self.shared();
        // Cleared while the recording was being created
        if !shared.triggered {
            return;
        }
        if let Some(handle) = shared.auto_clear.take() {
            handle.abort();
        }
        let weak = self.downgrade();
        let duration = self.inner.panic_duration;
        shared.auto_clear = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(monitor) = Self::upgrade(&weak) {
                log::info!("Automatic panic recording reached its duration");
                monitor.clear_triggered(true);
            }
        }));
    }

    /// Clear the panic flag and cancel the auto-clear timer. Returns whether it was set.
    pub fn stop_panic_mode(&self) -> bool {
        self.clear_triggered(false)
    }

    fn clear_triggered(&self, from_timer: bool) -> bool {
        let was_triggered = {
            let mut shared = self.shared();
            let was = shared.triggered;
            shared.triggered = false;
            if let Some(handle) = shared.auto_clear.take() {
                // The timer task must not abort itself mid-notification
                if !from_timer {
                    handle.abort();
                }
            }
            was
        };
        if was_triggered {
            self.inner
                .sink
                .notify(Notification::success("Automatic panic mode disabled"));
        }
        was_triggered
    }

    /// Consume platform connectivity events until the sender is dropped
    pub fn listen(&self, mut rx: mpsc::Receiver<ConnectivityEvent>) {
        let weak = self.downgrade();
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(monitor) = Self::upgrade(&weak) else {
                    break;
                };
                match event {
                    ConnectivityEvent::Offline => {
                        monitor.handle_offline().await;
                    }
                    ConnectivityEvent::Online => {
                        monitor.handle_online().await;
                    }
                    ConnectivityEvent::NetworkChanged => {
                        monitor.handle_network_change().await;
                    }
                }
            }
        });
        if let Some(previous) = self.shared().listener.replace(handle) {
            previous.abort();
        }
    }
}

/// First online device, else the first one listed
fn active_device(devices: &[Device]) -> Option<&Device> {
    devices
        .iter()
        .find(|d| d.status == DeviceStatus::Online)
        .or_else(|| devices.first())
}

/// Turn changes of the platform online flag and link type into [`ConnectivityEvent`]s.
/// Ends when the receiver is dropped.
pub fn spawn_platform_watcher(
    net: Arc<dyn NetworkInfo>,
    period: Duration,
    tx: mpsc::Sender<ConnectivityEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_online = net.platform_online().ok();
        let mut last_type = net.network_type().ok().flatten();
        let mut interval = interval_at(Instant::now() + period, period);
        loop {
            interval.tick().await;
            let online = match net.platform_online() {
                Ok(online) => online,
                Err(e) => {
                    log::debug!("Platform watcher could not read online state: {}", e);
                    continue;
                }
            };
            let network_type = net.network_type().ok().flatten();

            let event = if last_online != Some(online) {
                Some(if online {
                    ConnectivityEvent::Online
                } else {
                    ConnectivityEvent::Offline
                })
            } else if online && network_type != last_type {
                Some(ConnectivityEvent::NetworkChanged)
            } else {
                None
            };
            last_online = Some(online);
            last_type = network_type;

            if let Some(event) = event {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        }
    })
}
