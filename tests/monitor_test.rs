//! # Connection Monitor Tests
//!
//! Drive the monitor's state machine with a scripted reachability probe and
//! in-memory device/recording stores.
//!
//! ```bash
//! cargo test --test monitor_test
//! ```

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use common::{device, FakeNet, FakeRegistry, FakeStore, ScriptedProbe};
use panic_guard::config::MonitorConfig;
use panic_guard::constants::LOCAL_DEVICE_ID;
use panic_guard::models::{ConnectionStatus, DeviceStatus, RecordingType};
use panic_guard::monitor::{
    ConnectionMonitor, ConnectivityEvent, MonitorState, TickOutcome, REASON_AIRPLANE_MODE,
    REASON_DEVICE_OFFLINE, REASON_NO_CONNECTION,
};
use panic_guard::probe::NetworkType;
use panic_guard::notify::{MemorySink, NotificationLevel};
use panic_guard::realtime::{EventKind, RealtimeHub};

struct Harness {
    monitor: ConnectionMonitor,
    registry: Arc<FakeRegistry>,
    store: Arc<FakeStore>,
    probe: Arc<ScriptedProbe>,
    net: Arc<FakeNet>,
    sink: Arc<MemorySink>,
}

/// Polling every hour keeps the background task out of the way of manual ticks
fn manual_config() -> MonitorConfig {
    MonitorConfig {
        poll_interval_secs: 3600,
        ..MonitorConfig::default()
    }
}

fn harness(config: MonitorConfig, hub: Option<RealtimeHub>) -> Harness {
    let registry = Arc::new(FakeRegistry::with_devices(vec![
        device("phone-1", DeviceStatus::Offline),
        device("phone-2", DeviceStatus::Online),
    ]));
    let store = Arc::new(FakeStore::default());
    let probe = Arc::new(ScriptedProbe::new(true));
    let net = Arc::new(FakeNet::new(true, None));
    let sink = Arc::new(MemorySink::new());
    let mut monitor = ConnectionMonitor::new(
        registry.clone(),
        store.clone(),
        probe.clone(),
        net.clone(),
        sink.clone(),
        &config,
        "test-user",
    );
    if let Some(hub) = hub {
        monitor = monitor.with_events(hub);
    }
    Harness {
        monitor,
        registry,
        store,
        probe,
        net,
        sink,
    }
}

#[tokio::test]
async fn test_three_failed_ticks_trigger_exactly_once() {
    let h = harness(manual_config(), None);
    h.monitor.start();
    h.probe.set(false);

    let first = h.monitor.tick().await;
    assert!(matches!(first, TickOutcome::Triggered(ref p) if p.persisted));
    assert_eq!(h.monitor.tick().await, TickOutcome::AlreadyTriggered);
    assert_eq!(h.monitor.tick().await, TickOutcome::AlreadyTriggered);

    assert_eq!(h.monitor.state(), MonitorState::PanicTriggered);
    let recordings = h.store.all();
    assert_eq!(recordings.len(), 1);
    let panic = &recordings[0];
    assert_eq!(panic.recording_type, RecordingType::Panic);
    assert_eq!(panic.duration, Some(3600));
    assert_eq!(panic.size, Some(0));
    // Online device wins over the first listed one
    assert_eq!(panic.device_id, "phone-2");

    let data = panic.location_data.as_ref().unwrap();
    assert_eq!(data["automatic"], true);
    // Platform online but nothing reachable is classified as airplane mode
    assert_eq!(data["reason"], REASON_AIRPLANE_MODE);
    assert!(data["connection_status"].is_object());
    assert!(data["timestamp"].is_string());

    assert_eq!(h.sink.count_level(NotificationLevel::Error), 1);
    h.monitor.shutdown();
}

#[tokio::test]
async fn test_unreachable_probe_triggers_whatever_the_link_type() {
    for network_type in [
        None,
        Some(NetworkType::Wifi),
        Some(NetworkType::Ethernet),
        Some(NetworkType::Cellular),
    ] {
        let h = harness(manual_config(), None);
        *h.net.network_type.lock().unwrap() = network_type;
        h.monitor.start();
        h.probe.set(false);

        assert!(
            matches!(h.monitor.tick().await, TickOutcome::Triggered(_)),
            "{:?}",
            network_type
        );
        assert_eq!(h.monitor.tick().await, TickOutcome::AlreadyTriggered);
        assert_eq!(h.monitor.tick().await, TickOutcome::AlreadyTriggered);
        assert_eq!(h.monitor.state(), MonitorState::PanicTriggered);
        assert_eq!(h.store.count(), 1, "{:?}", network_type);

        let status = h.monitor.connection_status();
        assert!(!status.has_internet);
        assert!(status.airplane_mode);

        h.probe.set(true);
        assert_eq!(h.monitor.tick().await, TickOutcome::Cleared);
        assert_eq!(h.monitor.state(), MonitorState::Watching);
        h.monitor.shutdown();
    }
}

#[tokio::test]
async fn test_unreadable_platform_state_counts_as_lost() {
    let h = harness(manual_config(), None);
    h.net.broken.store(true, Ordering::SeqCst);
    h.monitor.start();

    let panic = match h.monitor.tick().await {
        TickOutcome::Triggered(panic) => panic,
        other => panic!("expected a trigger, got {:?}", other),
    };
    assert_eq!(h.monitor.connection_status(), ConnectionStatus::check_failed());
    let data = panic.recording.location_data.unwrap();
    assert_eq!(data["reason"], REASON_NO_CONNECTION);
    assert_eq!(h.monitor.state(), MonitorState::PanicTriggered);

    // Readable again and reachable: the panic clears
    h.net.broken.store(false, Ordering::SeqCst);
    assert_eq!(h.monitor.tick().await, TickOutcome::Cleared);
    h.monitor.shutdown();
}

#[tokio::test]
async fn test_trigger_is_idempotent() {
    let h = harness(manual_config(), None);
    assert!(h.monitor.trigger_panic_mode("manual").await.is_some());
    assert!(h.monitor.trigger_panic_mode("manual").await.is_none());
    assert_eq!(h.store.count(), 1);
}

#[tokio::test]
async fn test_stop_then_good_tick_does_not_retrigger() {
    let h = harness(manual_config(), None);
    h.monitor.start();
    h.probe.set(false);
    h.monitor.tick().await;
    assert!(h.monitor.is_panic_triggered());

    assert!(h.monitor.stop_panic_mode());
    assert!(!h.monitor.stop_panic_mode());
    assert_eq!(h.sink.count_level(NotificationLevel::Success), 1);

    h.probe.set(true);
    assert_eq!(h.monitor.tick().await, TickOutcome::Unchanged);
    assert_eq!(h.monitor.state(), MonitorState::Watching);
    assert_eq!(h.store.count(), 1);
}

#[tokio::test]
async fn test_restored_connection_clears_and_new_loss_triggers_again() {
    let h = harness(manual_config(), None);
    h.monitor.start();

    h.probe.set(false);
    assert!(matches!(h.monitor.tick().await, TickOutcome::Triggered(_)));

    h.probe.set(true);
    assert_eq!(h.monitor.tick().await, TickOutcome::Cleared);
    assert_eq!(h.monitor.state(), MonitorState::Watching);

    h.probe.set(false);
    assert!(matches!(h.monitor.tick().await, TickOutcome::Triggered(_)));
    assert_eq!(h.store.count(), 2);
}

#[tokio::test]
async fn test_platform_offline_counts_as_airplane_mode() {
    let h = harness(manual_config(), None);
    h.monitor.start();
    h.net.online.store(false, Ordering::SeqCst);

    let outcome = h.monitor.tick().await;
    assert!(matches!(outcome, TickOutcome::Triggered(_)));
    assert!(h.monitor.connection_status().airplane_mode);
}

#[tokio::test]
async fn test_tick_while_idle_does_nothing() {
    let h = harness(manual_config(), None);
    h.probe.set(false);
    assert_eq!(h.monitor.tick().await, TickOutcome::Idle);
    assert_eq!(h.probe.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.count(), 0);
}

#[tokio::test]
async fn test_registry_unreachable_returns_local_recording() {
    let h = harness(manual_config(), None);
    h.registry.unreachable.store(true, Ordering::SeqCst);

    let panic = h
        .monitor
        .trigger_panic_mode("No internet connection")
        .await
        .expect("first trigger returns a recording");
    assert!(!panic.persisted);
    assert_eq!(panic.recording.recording_type, RecordingType::Panic);
    assert_eq!(panic.recording.device_id, LOCAL_DEVICE_ID);
    assert_eq!(panic.recording.duration, Some(3600));
    assert!(panic.recording.id.starts_with("local_"));
    assert_eq!(h.store.count(), 0);
    assert_eq!(h.sink.count_level(NotificationLevel::Warning), 1);
}

#[tokio::test]
async fn test_store_unreachable_returns_local_recording() {
    let h = harness(manual_config(), None);
    h.store.unreachable.store(true, Ordering::SeqCst);

    let panic = h.monitor.trigger_panic_mode("Airplane mode enabled").await.unwrap();
    assert!(!panic.persisted);
    assert_eq!(panic.recording.device_id, "phone-2");
    assert!(h.monitor.is_panic_triggered());
}

#[tokio::test]
async fn test_no_devices_uses_local_placeholder() {
    let h = harness(manual_config(), None);
    h.registry.devices.lock().unwrap().clear();

    let panic = h.monitor.trigger_panic_mode("Device offline").await.unwrap();
    assert!(panic.persisted);
    assert_eq!(panic.recording.device_id, LOCAL_DEVICE_ID);
}

#[tokio::test]
async fn test_offline_event_triggers_only_while_monitoring() {
    let h = harness(manual_config(), None);

    assert!(h.monitor.handle_offline().await.is_none());
    assert_eq!(h.monitor.connection_status(), ConnectionStatus::offline());
    assert_eq!(h.store.count(), 0);

    h.monitor.start();
    let panic = h.monitor.handle_offline().await.unwrap();
    let data = panic.recording.location_data.unwrap();
    assert_eq!(data["reason"], REASON_DEVICE_OFFLINE);
    assert_eq!(data["connection_status"]["airplane_mode"], true);
}

#[tokio::test]
async fn test_online_event_refreshes_status() {
    let h = harness(manual_config(), None);
    h.monitor.handle_offline().await;
    assert!(h.monitor.connection_status().airplane_mode);

    let status = h.monitor.handle_online().await;
    assert!(status.has_internet);
    assert!(!status.airplane_mode);
    assert_eq!(h.monitor.connection_status(), status);
}

#[tokio::test]
async fn test_listener_consumes_connectivity_events() {
    let h = harness(manual_config(), None);
    h.monitor.start();
    let (tx, rx) = mpsc::channel(4);
    h.monitor.listen(rx);

    tx.send(ConnectivityEvent::Offline).await.unwrap();
    for _ in 0..50 {
        if h.store.count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(h.store.count(), 1);
    h.monitor.shutdown();
}

#[tokio::test]
async fn test_panic_alert_is_published() {
    let hub = RealtimeHub::new(8);
    let mut rx = hub.subscribe();
    let h = harness(manual_config(), Some(hub));

    h.monitor.trigger_panic_mode("Airplane mode enabled").await.unwrap();
    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::PanicAlert);
    assert_eq!(event.device_id, "phone-2");
}

#[tokio::test]
async fn test_events_attached_after_clone_reach_all_clones() {
    let hub = RealtimeHub::new(8);
    let mut rx = hub.subscribe();
    let h = harness(manual_config(), None);
    let api_handle = h.monitor.clone();
    let monitor = h.monitor.clone().with_events(hub);

    // A second hub is ignored
    let other = RealtimeHub::new(8);
    let mut other_rx = other.subscribe();
    let monitor = monitor.with_events(other);

    api_handle.trigger_panic_mode("manual").await.unwrap();
    assert_eq!(rx.recv().await.unwrap().kind, EventKind::PanicAlert);
    assert!(other_rx.try_recv().is_err());
    assert!(monitor.is_panic_triggered());
}

#[tokio::test(start_paused = true)]
async fn test_polling_task_triggers_once_across_ticks() {
    let config = MonitorConfig {
        poll_interval_secs: 3,
        ..MonitorConfig::default()
    };
    let h = harness(config, None);
    h.probe.set(false);
    h.monitor.start();

    // Ticks at 3s, 6s and 9s
    tokio::time::sleep(Duration::from_millis(9500)).await;
    assert_eq!(h.probe.calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.store.count(), 1);
    assert_eq!(h.monitor.state(), MonitorState::PanicTriggered);
    h.monitor.stop();
}

#[tokio::test(start_paused = true)]
async fn test_auto_clear_after_recording_duration() {
    let config = MonitorConfig {
        poll_interval_secs: 3600,
        panic_duration_secs: 10,
        ..MonitorConfig::default()
    };
    let h = harness(config, None);
    h.monitor.start();
    h.monitor.trigger_panic_mode("manual").await.unwrap();
    assert!(h.monitor.is_panic_triggered());

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(!h.monitor.is_panic_triggered());
    assert_eq!(h.sink.count_level(NotificationLevel::Success), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_polling_and_timer() {
    let config = MonitorConfig {
        poll_interval_secs: 3,
        panic_duration_secs: 10,
        ..MonitorConfig::default()
    };
    let h = harness(config, None);
    h.probe.set(false);
    h.monitor.start();
    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(h.store.count(), 1);

    h.monitor.stop();
    assert_eq!(h.monitor.state(), MonitorState::Idle);
    let calls = h.probe.calls.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.probe.calls.load(Ordering::SeqCst), calls);
    // The aborted auto-clear timer never fires its notification
    assert_eq!(h.sink.count_level(NotificationLevel::Success), 0);
    assert_eq!(h.store.count(), 1);
}
