//! Wiring of the stores, the realtime hub and the hardware backends for one process

use fs2::FileExt;
use sqlx::sqlite::SqlitePool;
use std::fs::File;
use std::sync::Arc;

use crate::capture::ffmpeg::FfmpegMediaDevices;
use crate::capture::location::{HttpReverseGeocoder, StaticGeolocation};
use crate::capture::CaptureOrchestrator;
use crate::config::AppConfig;
use crate::db;
use crate::error::DynError;
use crate::monitor::ConnectionMonitor;
use crate::notify::NotificationSink;
use crate::probe::{HttpProbe, SystemNetworkInfo};
use crate::realtime::RealtimeHub;
use crate::registry::SqliteDeviceRegistry;
use crate::serve::AppState;
use crate::storage::ObjectStorage;
use crate::store::SqliteRecordingStore;
use crate::subscription::SqliteSubscriptionStore;

pub struct AppContext {
    pub config: AppConfig,
    pub pool: SqlitePool,
    pub hub: RealtimeHub,
    pub registry: Arc<SqliteDeviceRegistry>,
    pub store: Arc<SqliteRecordingStore>,
    pub subscriptions: Arc<SqliteSubscriptionStore>,
}

impl AppContext {
    /// Create the data directory, open the database and build the stores
    pub async fn open(config: AppConfig) -> Result<Self, DynError> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            format!(
                "Failed to create data directory '{}': {}",
                config.data_dir.display(),
                e
            )
        })?;

        let pool = db::open_and_init(&config.database_path()).await?;
        let hub = RealtimeHub::default();
        let registry = SqliteDeviceRegistry::new(pool.clone(), config.user_id.clone())
            .with_events(hub.clone());
        let store = SqliteRecordingStore::new(
            pool.clone(),
            config.user_id.clone(),
            ObjectStorage::new(config.storage_dir()),
            config.public_base_url(),
        )
        .with_events(hub.clone());
        let subscriptions = SqliteSubscriptionStore::new(pool.clone(), config.user_id.clone());

        Ok(Self {
            config,
            pool,
            hub,
            registry: Arc::new(registry),
            store: Arc::new(store),
            subscriptions: Arc::new(subscriptions),
        })
    }

    /// Monitor probing the configured URLs and reading interface state from sysfs
    pub fn monitor(&self, sink: Arc<dyn NotificationSink>) -> ConnectionMonitor {
        let probe = HttpProbe::new(
            self.config.monitor.probe_urls.clone(),
            self.config.monitor.probe_timeout(),
        );
        ConnectionMonitor::new(
            self.registry.clone(),
            self.store.clone(),
            Arc::new(probe),
            Arc::new(SystemNetworkInfo::new()),
            sink,
            &self.config.monitor,
            self.config.user_id.clone(),
        )
        .with_events(self.hub.clone())
    }

    /// Orchestrator recording through ffmpeg with the configured fixed position
    pub fn orchestrator(&self, sink: Arc<dyn NotificationSink>) -> CaptureOrchestrator {
        CaptureOrchestrator::new(
            Arc::new(FfmpegMediaDevices::new(&self.config.capture)),
            Arc::new(StaticGeolocation::from_config(&self.config.capture)),
            Arc::new(HttpReverseGeocoder::new(&self.config.geocoder)),
            self.registry.clone(),
            self.store.clone(),
            sink,
        )
    }

    pub fn api_state(&self, monitor: Option<ConnectionMonitor>) -> Arc<AppState> {
        Arc::new(AppState {
            registry: self.registry.clone(),
            store: self.store.clone(),
            subscriptions: self.subscriptions.clone(),
            hub: self.hub.clone(),
            monitor,
        })
    }
}

/// Exclusive lock file under the data directory; held until the returned file is dropped
pub fn acquire_lock(config: &AppConfig, name: &str) -> Result<File, DynError> {
    std::fs::create_dir_all(&config.data_dir)?;
    let lock_path = config.lock_path(name);
    let lock_file = File::create(&lock_path)
        .map_err(|e| format!("Failed to create lock file '{}': {}", lock_path.display(), e))?;
    lock_file.try_lock_exclusive().map_err(|_| {
        format!(
            "Another instance is already running '{}'. Lock file: {}",
            name,
            lock_path.display()
        )
    })?;
    Ok(lock_file)
}
