//! Capture orchestrator: panic mode and the individual camera, audio and location features
//!
//! Each capture lives in its own slot of a [`CaptureArena`] and owns disjoint
//! resources, so stopping one never touches another. Slots release their hardware
//! when emptied or dropped.

pub mod ffmpeg;
pub mod location;
pub mod media;

use clap::ValueEnum;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::constants::DEFAULT_DEVICE_ID;
use crate::error::CaptureError;
use crate::models::{NewRecording, Recording, RecordingType};
use crate::notify::{Notification, NotificationSink};
use crate::registry::DeviceRegistry;
use crate::store::RecordingStore;
use location::{Geolocation, LocationCapture, LocationFix, ReverseGeocoder};
use media::{CaptureKind, MediaCapture, MediaDevices, SavedArtifact};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Camera,
    Audio,
    Location,
}

impl Feature {
    pub fn recording_type(self) -> RecordingType {
        match self {
            Feature::Camera => RecordingType::Video,
            Feature::Audio => RecordingType::Audio,
            Feature::Location => RecordingType::Location,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Feature::Camera => "Camera",
            Feature::Audio => "Audio",
            Feature::Location => "Location",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActiveFeatures {
    pub camera: bool,
    pub audio: bool,
    pub location: bool,
}

impl ActiveFeatures {
    pub fn all() -> Self {
        Self {
            camera: true,
            audio: true,
            location: true,
        }
    }

    pub fn get(&self, feature: Feature) -> bool {
        match feature {
            Feature::Camera => self.camera,
            Feature::Audio => self.audio,
            Feature::Location => self.location,
        }
    }

    fn set(&mut self, feature: Feature, on: bool) {
        match feature {
            Feature::Camera => self.camera = on,
            Feature::Audio => self.audio = on,
            Feature::Location => self.location = on,
        }
    }
}

/// One slot per capture resource
#[derive(Default)]
pub struct CaptureArena {
    video: Option<MediaCapture>,
    audio: Option<MediaCapture>,
    location: Option<LocationCapture>,
}

impl CaptureArena {
    fn media_slot(&mut self, feature: Feature) -> Option<&mut Option<MediaCapture>> {
        match feature {
            Feature::Camera => Some(&mut self.video),
            Feature::Audio => Some(&mut self.audio),
            Feature::Location => None,
        }
    }

    pub fn is_occupied(&self, feature: Feature) -> bool {
        match feature {
            Feature::Camera => self.video.is_some(),
            Feature::Audio => self.audio.is_some(),
            Feature::Location => self.location.is_some(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none() && self.location.is_none()
    }
}

pub struct CaptureOrchestrator {
    media: Arc<dyn MediaDevices>,
    geolocation: Arc<dyn Geolocation>,
    geocoder: Arc<dyn ReverseGeocoder>,
    registry: Arc<dyn DeviceRegistry>,
    store: Arc<dyn RecordingStore>,
    sink: Arc<dyn NotificationSink>,
    arena: CaptureArena,
    features: ActiveFeatures,
    panic_active: bool,
    /// Capture currently bound to the preview
    preview: Option<CaptureKind>,
    /// Creation of the current panic session's recording
    panic_recording: Option<JoinHandle<Option<Recording>>>,
    pending: Vec<JoinHandle<Option<Recording>>>,
    saved: Vec<SavedArtifact>,
}

impl CaptureOrchestrator {
    pub fn new(
        media: Arc<dyn MediaDevices>,
        geolocation: Arc<dyn Geolocation>,
        geocoder: Arc<dyn ReverseGeocoder>,
        registry: Arc<dyn DeviceRegistry>,
        store: Arc<dyn RecordingStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            media,
            geolocation,
            geocoder,
            registry,
            store,
            sink,
            arena: CaptureArena::default(),
            features: ActiveFeatures::default(),
            panic_active: false,
            preview: None,
            panic_recording: None,
            pending: Vec::new(),
            saved: Vec::new(),
        }
    }

    pub fn is_panic_active(&self) -> bool {
        self.panic_active
    }

    pub fn active_features(&self) -> ActiveFeatures {
        self.features
    }

    pub fn arena(&self) -> &CaptureArena {
        &self.arena
    }

    pub fn preview(&self) -> Option<CaptureKind> {
        self.preview
    }

    pub fn saved_artifacts(&self) -> &[SavedArtifact] {
        &self.saved
    }

    /// Latest position, if location is being tracked
    pub fn location(&self) -> Option<LocationFix> {
        self.arena.location.as_ref().and_then(LocationCapture::current)
    }

    pub fn location_updates(&self) -> Option<watch::Receiver<Option<LocationFix>>> {
        self.arena.location.as_ref().map(LocationCapture::subscribe)
    }

    /// Seconds since the capture behind `feature` started
    pub fn duration_secs(&self, feature: Feature) -> Option<u64> {
        match feature {
            Feature::Camera => self.arena.video.as_ref().map(MediaCapture::elapsed_secs),
            Feature::Audio => self.arena.audio.as_ref().map(MediaCapture::elapsed_secs),
            Feature::Location => self.arena.location.as_ref().map(LocationCapture::elapsed_secs),
        }
    }

    /// Start panic mode, or stop it if already active. Returns the new state.
    ///
    /// Starting opens video+audio and location concurrently; if either fails,
    /// whatever did start is released and the panic flag is rolled back.
    pub async fn toggle_panic(&mut self) -> Result<bool, CaptureError> {
        if self.panic_active {
            self.deactivate_panic().await;
            return Ok(false);
        }

        self.panic_active = true;
        self.features = ActiveFeatures::all();

        // Panic mode takes over the camera and location slots
        self.stop_feature(Feature::Camera).await;
        self.stop_feature(Feature::Location).await;
        self.features = ActiveFeatures::all();

        let (video, location) = tokio::join!(
            MediaCapture::open(self.media.as_ref(), CaptureKind::VideoWithAudio),
            async {
                LocationCapture::start(
                    self.geolocation.as_ref(),
                    self.geocoder.clone(),
                    self.sink.clone(),
                )
            }
        );

        let (video, location) = match (video, location) {
            (Ok(video), Ok(location)) => (video, location),
            // A half that did start is released when dropped here
            (Err(err), _) | (_, Err(err)) => {
                log::error!("Failed to activate panic mode: {}", err);
                self.panic_active = false;
                self.features = ActiveFeatures {
                    audio: self.arena.audio.is_some(),
                    ..ActiveFeatures::default()
                };
                self.sink
                    .notify(Notification::error("Failed to activate panic mode"));
                return Err(err);
            }
        };

        self.arena.video = Some(video);
        self.arena.location = Some(location);
        self.preview = Some(CaptureKind::VideoWithAudio);

        self.panic_recording = Some(self.spawn_create(RecordingType::Panic));
        self.sink.notify(Notification::success(
            "Panic mode activated, recording evidence",
        ));
        log::warn!("Panic mode activated");
        Ok(true)
    }

    async fn deactivate_panic(&mut self) {
        self.panic_active = false;
        let artifacts = self.stop_all().await;
        self.sink.notify(Notification::info("Panic mode disabled"));
        log::info!("Panic mode disabled");

        let Some(creation) = self.panic_recording.take() else {
            return;
        };
        let Some(video) = artifacts
            .into_iter()
            .find(|a| a.kind == CaptureKind::VideoWithAudio)
        else {
            self.pending.push(creation);
            return;
        };

        let recording = match creation.await {
            Ok(Some(recording)) => recording,
            _ => {
                log::warn!("No panic recording to attach {} to", video.file_name);
                return;
            }
        };

        match self.store.attach_file(&recording.id, video.to_blob()).await {
            Ok(updated) => log::info!(
                "Attached {} to panic recording {}",
                video.file_name,
                updated.id
            ),
            Err(e) => {
                log::warn!("Failed to upload panic video: {}", e);
                self.sink.notify(Notification::warning(
                    "Panic video kept on this device; upload failed",
                ));
            }
        }
    }

    /// Turn a single feature on or off. Returns the new state.
    pub async fn toggle_feature(&mut self, feature: Feature) -> Result<bool, CaptureError> {
        if self.features.get(feature) {
            self.stop_feature(feature).await;
            self.sink
                .notify(Notification::success(format!("{} disabled", feature.label())));
            return Ok(false);
        }

        self.features.set(feature, true);
        if let Err(e) = self.start_feature(feature).await {
            log::error!("Failed to enable {}: {}", feature.label(), e);
            self.features.set(feature, false);
            self.sink.notify(Notification::error(format!(
                "Failed to enable {}",
                feature.label()
            )));
            return Err(e);
        }

        let creation = self.spawn_create(feature.recording_type());
        self.pending.push(creation);
        self.sink
            .notify(Notification::success(format!("{} enabled", feature.label())));
        Ok(true)
    }

    async fn start_feature(&mut self, feature: Feature) -> Result<(), CaptureError> {
        match feature {
            Feature::Location => {
                let capture = LocationCapture::start(
                    self.geolocation.as_ref(),
                    self.geocoder.clone(),
                    self.sink.clone(),
                )?;
                self.arena.location = Some(capture);
            }
            Feature::Camera | Feature::Audio => {
                let kind = if feature == Feature::Camera {
                    CaptureKind::VideoOnly
                } else {
                    CaptureKind::AudioOnly
                };
                let capture = MediaCapture::open(self.media.as_ref(), kind).await?;
                let previous = self
                    .arena
                    .media_slot(feature)
                    .and_then(|slot| slot.replace(capture));
                if let Some(previous) = previous {
                    self.finish_media(previous).await;
                }
                if feature == Feature::Camera {
                    self.preview = Some(kind);
                }
            }
        }
        Ok(())
    }

    /// Stop one feature's capture. Stopping an idle feature is a no-op.
    pub async fn stop_feature(&mut self, feature: Feature) -> Option<SavedArtifact> {
        self.features.set(feature, false);
        match feature {
            Feature::Location => {
                if let Some(mut capture) = self.arena.location.take() {
                    capture.release();
                }
                None
            }
            Feature::Camera | Feature::Audio => {
                let mut capture = self.arena.media_slot(feature)?.take()?;
                // Hardware goes first, before any draining
                capture.release();
                if feature == Feature::Camera {
                    self.preview = None;
                }
                self.finish_media(capture).await
            }
        }
    }

    async fn finish_media(&mut self, capture: MediaCapture) -> Option<SavedArtifact> {
        let kind = capture.kind();
        match capture.finish().await {
            Ok(artifact) => {
                log::info!(
                    "Saved {} ({} bytes, {}s)",
                    artifact.file_name,
                    artifact.data.len(),
                    artifact.duration_secs
                );
                self.sink.notify(Notification::success(format!(
                    "{} saved ({:.2} MB)",
                    artifact.file_name,
                    artifact.data.len() as f64 / 1024.0 / 1024.0
                )));
                self.saved.push(artifact.clone());
                Some(artifact)
            }
            Err(e) => {
                log::error!("{:?} capture produced no artifact: {}", kind, e);
                self.sink.notify(Notification::error(e.to_string()));
                None
            }
        }
    }

    /// Stop every capture and clear transient state
    pub async fn stop_all(&mut self) -> Vec<SavedArtifact> {
        // Release all hardware before draining any recorder
        if let Some(video) = self.arena.video.as_mut() {
            video.release();
        }
        if let Some(audio) = self.arena.audio.as_mut() {
            audio.release();
        }
        if let Some(mut location) = self.arena.location.take() {
            location.release();
        }
        self.preview = None;
        self.features = ActiveFeatures::default();

        let mut artifacts = Vec::new();
        for feature in [Feature::Camera, Feature::Audio] {
            if let Some(artifact) = self.stop_feature(feature).await {
                artifacts.push(artifact);
            }
        }
        artifacts
    }

    /// Wait for fire-and-forget recording creations to finish
    pub async fn flush_pending(&mut self) -> Vec<Recording> {
        let mut created = Vec::new();
        for handle in self.pending.drain(..) {
            if let Ok(Some(recording)) = handle.await {
                created.push(recording);
            }
        }
        created
    }

    /// Stop everything, then flush pending recordings
    pub async fn shutdown(&mut self) -> Vec<SavedArtifact> {
        let artifacts = if self.panic_active {
            let before = self.saved.len();
            self.deactivate_panic().await;
            self.saved[before..].to_vec()
        } else {
            self.stop_all().await
        };
        self.flush_pending().await;
        artifacts
    }

    /// Write a saved artifact into `dir` under its file name
    pub async fn save_artifact_to(
        &self,
        artifact: &SavedArtifact,
        dir: &Path,
    ) -> Result<PathBuf, std::io::Error> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&artifact.file_name);
        tokio::fs::write(&path, &artifact.data).await?;
        log::info!("Downloaded {} to {}", artifact.file_name, path.display());
        Ok(path)
    }

    fn spawn_create(&self, recording_type: RecordingType) -> JoinHandle<Option<Recording>> {
        let registry = self.registry.clone();
        let store = self.store.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let device_id = match registry.list().await {
                Ok(devices) => devices
                    .first()
                    .map(|d| d.id.clone())
                    .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string()),
                Err(e) => {
                    log::warn!("Could not list devices, using {}: {}", DEFAULT_DEVICE_ID, e);
                    DEFAULT_DEVICE_ID.to_string()
                }
            };
            match store
                .create(NewRecording::new(device_id, recording_type), None)
                .await
            {
                Ok(recording) => {
                    log::info!("Created {} recording {}", recording_type.as_str(), recording.id);
                    Some(recording)
                }
                Err(e) => {
                    log::error!("Failed to create {} recording: {}", recording_type.as_str(), e);
                    sink.notify(Notification::error(format!(
                        "Failed to start {} recording",
                        recording_type.as_str()
                    )));
                    None
                }
            }
        })
    }
}
