//! # SQLite Store Tests
//!
//! Device registry, recording store and subscription store against a
//! temporary database and object directory.
//!
//! ```bash
//! cargo test --test store_test
//! ```

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;

use panic_guard::db::{create_test_connection_in_temporary_file, init_database_schema, query_metadata};
use panic_guard::error::StoreError;
use panic_guard::models::{
    Blob, DevicePatch, DeviceStatus, DeviceType, NewDevice, NewRecording, PlanType, RecordingPatch,
    RecordingType, SubscriptionStatus,
};
use panic_guard::realtime::{EventKind, RealtimeHub};
use panic_guard::registry::{DeviceRegistry, SqliteDeviceRegistry};
use panic_guard::storage::ObjectStorage;
use panic_guard::store::{RecordingStore, SqliteRecordingStore};
use panic_guard::subscription::{
    days_remaining, is_active, SqliteSubscriptionStore, SubscriptionStore, FREE_TRIAL_DAYS,
};
use panic_guard::EXPECTED_DB_VERSION;

async fn setup() -> (SqlitePool, tempfile::TempDir) {
    let (pool, guard) = create_test_connection_in_temporary_file().await.unwrap();
    init_database_schema(&pool).await.unwrap();
    (pool, guard)
}

fn new_device(name: &str) -> NewDevice {
    NewDevice {
        name: name.to_string(),
        device_type: DeviceType::Phone,
        is_third_party: false,
        third_party_email: None,
        records_password: None,
        recording_time_limit: None,
    }
}

fn recording_store(pool: &SqlitePool, dir: &tempfile::TempDir) -> SqliteRecordingStore {
    SqliteRecordingStore::new(
        pool.clone(),
        "user-1",
        ObjectStorage::new(dir.path().join("objects")),
        "http://localhost:3000",
    )
}

#[tokio::test]
async fn test_schema_is_stamped_and_reinit_is_safe() {
    let (pool, _guard) = setup().await;
    assert_eq!(
        query_metadata(&pool, "version").await.unwrap().as_deref(),
        Some(EXPECTED_DB_VERSION)
    );
    init_database_schema(&pool).await.unwrap();

    panic_guard::db::upsert_metadata(&pool, "version", "999").await.unwrap();
    let err = init_database_schema(&pool).await.unwrap_err();
    assert!(err.to_string().contains("Unsupported database version"));
}

#[tokio::test]
async fn test_device_lifecycle() {
    let (pool, _guard) = setup().await;
    let hub = RealtimeHub::new(8);
    let mut events = hub.subscribe();
    let registry = SqliteDeviceRegistry::new(pool.clone(), "user-1").with_events(hub);

    let created = registry.create(new_device("My phone")).await.unwrap();
    assert_eq!(created.status, DeviceStatus::Offline);
    assert!(created.last_seen.is_none());

    let listed = registry.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, created.id);

    let updated = registry
        .update(
            &created.id,
            DevicePatch {
                name: Some("Work laptop".to_string()),
                device_type: Some(DeviceType::Pc),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Work laptop");
    assert_eq!(updated.device_type, DeviceType::Pc);

    registry
        .set_status(&created.id, DeviceStatus::Online)
        .await
        .unwrap();
    let online = registry.list().await.unwrap().remove(0);
    assert_eq!(online.status, DeviceStatus::Online);
    assert!(online.last_seen.is_some());

    let event = events.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::DeviceStatus);
    assert_eq!(event.device_id, created.id);

    registry.delete(&created.id).await.unwrap();
    assert!(registry.list().await.unwrap().is_empty());
    assert!(matches!(
        registry.delete(&created.id).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_devices_are_scoped_to_owner() {
    let (pool, _guard) = setup().await;
    let mine = SqliteDeviceRegistry::new(pool.clone(), "user-1");
    let theirs = SqliteDeviceRegistry::new(pool.clone(), "user-2");

    let device = mine.create(new_device("phone")).await.unwrap();
    assert!(theirs.list().await.unwrap().is_empty());
    assert!(matches!(
        theirs.set_status(&device.id, DeviceStatus::Online).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_empty_device_name_is_rejected() {
    let (pool, _guard) = setup().await;
    let registry = SqliteDeviceRegistry::new(pool, "user-1");
    assert!(matches!(
        registry.create(new_device("  ")).await,
        Err(StoreError::Invalid(_))
    ));
}

#[tokio::test]
async fn test_create_with_blob_uploads_before_insert() {
    let (pool, guard) = setup().await;
    let hub = RealtimeHub::new(8);
    let mut events = hub.subscribe();
    let store = recording_store(&pool, &guard).with_events(hub);

    let recording = store
        .create(
            NewRecording::new("phone-1", RecordingType::Video),
            Some(Blob::new(&b"webm bytes"[..], "video/webm")),
        )
        .await
        .unwrap();

    let file_path = recording.file_path.clone().unwrap();
    assert!(file_path.starts_with("user-1/Video_"));
    assert!(file_path.ends_with(".webm"));
    assert_eq!(recording.size, Some(10));
    assert_eq!(store.storage().get(&file_path).await.unwrap(), b"webm bytes");

    let event = events.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::RecordingStart);
    assert_eq!(event.data["recording_id"], recording.id.as_str());

    let fetched = store.get(&recording.id).await.unwrap();
    assert_eq!(fetched.id, recording.id);
    assert_eq!(fetched.file_path, recording.file_path);
    assert_eq!(fetched.recording_type, RecordingType::Video);
}

#[tokio::test]
async fn test_empty_blob_gives_metadata_only_row() {
    let (pool, guard) = setup().await;
    let store = recording_store(&pool, &guard);

    let recording = store
        .create(
            NewRecording::new("phone-1", RecordingType::Audio),
            Some(Blob::new(Vec::new(), "audio/webm")),
        )
        .await
        .unwrap();
    assert!(recording.file_path.is_none());

    assert!(matches!(
        store
            .attach_file(&recording.id, Blob::new(Vec::new(), "audio/webm"))
            .await,
        Err(StoreError::Invalid(_))
    ));
    assert!(store.get(&recording.id).await.unwrap().file_path.is_none());
}

#[tokio::test]
async fn test_upload_failure_degrades_to_metadata_only() {
    let (pool, guard) = setup().await;
    // Object root is a regular file, so every upload fails
    let root = guard.path().join("not-a-dir");
    std::fs::write(&root, b"").unwrap();
    let store = SqliteRecordingStore::new(
        pool.clone(),
        "user-1",
        ObjectStorage::new(&root),
        "http://localhost:3000",
    );

    let recording = store
        .create(
            NewRecording::new("phone-1", RecordingType::Video),
            Some(Blob::new(&b"data"[..], "video/webm")),
        )
        .await
        .unwrap();
    assert!(recording.file_path.is_none());
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_panic_recording_on_placeholder_device() {
    let (pool, guard) = setup().await;
    let store = recording_store(&pool, &guard);

    let mut data = NewRecording::new("local-device", RecordingType::Panic);
    data.duration = Some(3600);
    data.size = Some(0);
    data.location_data = Some(json!({ "reason": "Device offline", "automatic": true }));
    let recording = store.create(data, None).await.unwrap();

    let fetched = store.get(&recording.id).await.unwrap();
    assert_eq!(fetched.duration, Some(3600));
    assert_eq!(fetched.location_data.unwrap()["automatic"], true);
}

#[tokio::test]
async fn test_attach_update_and_delete() {
    let (pool, guard) = setup().await;
    let store = recording_store(&pool, &guard);

    let recording = store
        .create(NewRecording::new("phone-1", RecordingType::Panic), None)
        .await
        .unwrap();
    let attached = store
        .attach_file(&recording.id, Blob::new(&b"panic video"[..], "video/webm"))
        .await
        .unwrap();
    let file_path = attached.file_path.clone().unwrap();
    assert_eq!(attached.size, Some(11));

    let updated = store
        .update(
            &recording.id,
            RecordingPatch {
                is_downloaded: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.is_downloaded);
    assert_eq!(updated.file_path.as_deref(), Some(file_path.as_str()));

    store.delete(&recording.id).await.unwrap();
    assert!(!store.storage().exists(&file_path).await.unwrap());
    assert!(matches!(
        store.get(&recording.id).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.attach_file("missing", Blob::new(&b"x"[..], "video/webm")).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_download_url_grants_time_limited_access() {
    let (pool, guard) = setup().await;
    let store = recording_store(&pool, &guard);

    let recording = store
        .create(
            NewRecording::new("phone-1", RecordingType::Audio),
            Some(Blob::new(&b"opus"[..], "audio/webm")),
        )
        .await
        .unwrap();
    let file_path = recording.file_path.unwrap();

    let url = store.download_url(&file_path).await.unwrap();
    let token = url
        .strip_prefix("http://localhost:3000/api/files/")
        .expect("url under the public base");
    let (path, data) = store.open_download(token).await.unwrap();
    assert_eq!(path, file_path);
    assert_eq!(data, b"opus");

    assert!(matches!(
        store.open_download("dl_unknown").await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.download_url("user-1/missing.webm").await,
        Err(StoreError::NotFound(_))
    ));

    let expired = recording_store(&pool, &guard).with_url_ttl(chrono::Duration::seconds(-1));
    let url = expired.download_url(&file_path).await.unwrap();
    let token = url.rsplit('/').next().unwrap();
    assert!(matches!(
        expired.open_download(token).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_subscription_trial_and_upgrade() {
    let (pool, _guard) = setup().await;
    let subscriptions = SqliteSubscriptionStore::new(pool, "user-1");
    assert!(subscriptions.get().await.unwrap().is_none());
    assert!(matches!(
        subscriptions.set_status(SubscriptionStatus::Cancelled).await,
        Err(StoreError::NotFound(_))
    ));

    let trial = subscriptions.ensure_trial().await.unwrap();
    assert_eq!(trial.plan_type, PlanType::FreeTrial);
    let now = Utc::now();
    assert!(is_active(Some(&trial), now));
    assert_eq!(days_remaining(Some(&trial), now), FREE_TRIAL_DAYS);

    // A second call keeps the existing row
    let again = subscriptions.ensure_trial().await.unwrap();
    assert_eq!(again.id, trial.id);

    let upgraded = subscriptions.upgrade().await.unwrap();
    assert_eq!(upgraded.id, trial.id);
    assert_eq!(upgraded.plan_type, PlanType::Monthly);
    assert_eq!(upgraded.status, SubscriptionStatus::Active);
    let remaining = days_remaining(Some(&upgraded), Utc::now());
    assert!((28..=31).contains(&remaining));

    let cancelled = subscriptions
        .set_status(SubscriptionStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
    assert!(!is_active(Some(&cancelled), Utc::now()));
    assert_eq!(subscriptions.get().await.unwrap(), Some(cancelled));
}

#[tokio::test]
async fn test_upgrade_without_subscription_creates_one() {
    let (pool, _guard) = setup().await;
    let subscriptions = SqliteSubscriptionStore::new(pool, "user-1");
    let upgraded = subscriptions.upgrade().await.unwrap();
    assert_eq!(upgraded.plan_type, PlanType::Monthly);
    let stored = subscriptions.get().await.unwrap().unwrap();
    assert_eq!(stored.id, upgraded.id);
    assert_eq!(stored.plan_type, PlanType::Monthly);
}
