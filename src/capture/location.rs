//! Position watch with best-effort reverse geocoding

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::{CaptureConfig, GeocoderConfig};
use crate::error::CaptureError;
use crate::notify::{Notification, NotificationSink};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    pub maximum_age: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(5),
            maximum_age: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            timestamp: Utc::now(),
        }
    }
}

/// Latest position and, once resolved, its human-readable label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationFix {
    pub position: Position,
    pub address: Option<String>,
}

/// Cancels a position watch
pub trait WatchHandle: Send {
    fn clear(&mut self);
}

pub struct PositionWatch {
    pub handle: Box<dyn WatchHandle>,
    /// Errors are per-fix failures; the watch keeps running after them
    pub updates: mpsc::Receiver<Result<Position, String>>,
}

pub trait Geolocation: Send + Sync {
    fn watch_position(&self, options: WatchOptions) -> Result<PositionWatch, CaptureError>;
}

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<String, String>;
}

/// Label used when no address is available
pub fn coordinates_label(latitude: f64, longitude: f64) -> String {
    format!("{:.6}, {:.6}", latitude, longitude)
}

/// Address for a position, falling back to the raw coordinates
pub async fn resolve_label(geocoder: &dyn ReverseGeocoder, latitude: f64, longitude: f64) -> String {
    match geocoder.reverse(latitude, longitude).await {
        Ok(address) if !address.trim().is_empty() => address,
        Ok(_) => coordinates_label(latitude, longitude),
        Err(e) => {
            log::warn!("Reverse geocoding failed: {}", e);
            coordinates_label(latitude, longitude)
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(rename = "localityInfo")]
    locality_info: Option<LocalityInfo>,
}

#[derive(Debug, Deserialize)]
struct LocalityInfo {
    #[serde(default)]
    administrative: Vec<AdministrativeArea>,
}

#[derive(Debug, Deserialize)]
struct AdministrativeArea {
    name: Option<String>,
}

/// Client for a BigDataCloud-style reverse geocoding endpoint
pub struct HttpReverseGeocoder {
    client: reqwest::Client,
    url: String,
    language: String,
    timeout: Duration,
}

impl HttpReverseGeocoder {
    pub fn new(config: &GeocoderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            language: config.language.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

#[async_trait]
impl ReverseGeocoder for HttpReverseGeocoder {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<String, String> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("localityLanguage", self.language.clone()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("geocoder returned {}", response.status()));
        }

        let body: GeocodeResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid response: {}", e))?;

        // First three administrative levels, most general first
        let address = body
            .locality_info
            .map(|info| {
                info.administrative
                    .iter()
                    .take(3)
                    .filter_map(|area| area.name.as_deref())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();

        Ok(address.trim().to_string())
    }
}

struct TaskWatchHandle(Option<JoinHandle<()>>);

impl WatchHandle for TaskWatchHandle {
    fn clear(&mut self) {
        if let Some(task) = self.0.take() {
            task.abort();
        }
    }
}

/// Reports a fixed, configured position at a regular interval
pub struct StaticGeolocation {
    position: Option<(f64, f64)>,
    interval: Duration,
}

impl StaticGeolocation {
    pub fn new(latitude: f64, longitude: f64, interval: Duration) -> Self {
        Self {
            position: Some((latitude, longitude)),
            interval,
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            position: config.latitude.zip(config.longitude),
            interval: Duration::from_secs(config.location_interval_secs.max(1)),
        }
    }
}

impl Geolocation for StaticGeolocation {
    fn watch_position(&self, options: WatchOptions) -> Result<PositionWatch, CaptureError> {
        let Some((latitude, longitude)) = self.position else {
            return Err(CaptureError::Acquisition(
                "no position source configured".to_string(),
            ));
        };
        // A fixed source never goes stale; report well inside the timeout
        let period = self
            .interval
            .max(options.maximum_age)
            .min(options.timeout / 2);
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if tx.send(Ok(Position::new(latitude, longitude))).await.is_err() {
                    break;
                }
            }
        });
        Ok(PositionWatch {
            handle: Box::new(TaskWatchHandle(Some(task))),
            updates: rx,
        })
    }
}

/// A running location watch. Dropping it clears the watch.
pub struct LocationCapture {
    handle: Box<dyn WatchHandle>,
    cleared: bool,
    tracker: JoinHandle<()>,
    fix: watch::Receiver<Option<LocationFix>>,
    started_at: Instant,
}

impl LocationCapture {
    pub fn start(
        geolocation: &dyn Geolocation,
        geocoder: Arc<dyn ReverseGeocoder>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, CaptureError> {
        let options = WatchOptions::default();
        let PositionWatch {
            handle,
            mut updates,
        } = geolocation.watch_position(options)?;

        let (tx, rx) = watch::channel(None);
        let tracker = tokio::spawn(async move {
            // One notification per stall; cleared by the next fix
            let mut stalled = false;
            loop {
                let update = match tokio::time::timeout(options.timeout, updates.recv()).await {
                    Ok(Some(update)) => update,
                    Ok(None) => break,
                    Err(_) => {
                        if !stalled {
                            log::warn!("No position within {:?}", options.timeout);
                            sink.notify(Notification::error("Failed to get location"));
                            stalled = true;
                        }
                        continue;
                    }
                };
                match update {
                    Ok(position) => {
                        stalled = false;
                        log::debug!(
                            "Location updated: {:.6}, {:.6}",
                            position.latitude,
                            position.longitude
                        );
                        tx.send_replace(Some(LocationFix {
                            position,
                            address: None,
                        }));
                        let label =
                            resolve_label(geocoder.as_ref(), position.latitude, position.longitude)
                                .await;
                        tx.send_modify(|fix| {
                            if let Some(fix) = fix.as_mut() {
                                // A newer fix may have arrived while geocoding
                                if fix.position == position {
                                    fix.address = Some(label);
                                }
                            }
                        });
                    }
                    Err(e) => {
                        log::warn!("Location error: {}", e);
                        sink.notify(Notification::error("Failed to get location"));
                    }
                }
            }
        });

        Ok(Self {
            handle,
            cleared: false,
            tracker,
            fix: rx,
            started_at: Instant::now(),
        })
    }

    pub fn current(&self) -> Option<LocationFix> {
        self.fix.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<LocationFix>> {
        self.fix.clone()
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Clear the watch and stop geocoding. Safe to call more than once.
    pub fn release(&mut self) {
        if !self.cleared {
            self.handle.clear();
            self.tracker.abort();
            self.cleared = true;
            log::debug!("Location watch cleared");
        }
    }
}

impl Drop for LocationCapture {
    fn drop(&mut self) {
        self.release();
    }
}
