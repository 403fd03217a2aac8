//! In-memory collaborators shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use panic_guard::capture::location::{
    Geolocation, Position, PositionWatch, ReverseGeocoder, WatchHandle, WatchOptions,
};
use panic_guard::capture::media::{MediaConstraints, MediaDevices, MediaSession, TrackHandle};
use panic_guard::error::{CaptureError, StoreError};
use panic_guard::models::{
    Blob, Device, DevicePatch, DeviceStatus, DeviceType, NewDevice, NewRecording, Recording,
    RecordingPatch,
};
use panic_guard::probe::{NetworkInfo, NetworkType, ReachabilityProbe};
use panic_guard::registry::DeviceRegistry;
use panic_guard::store::RecordingStore;

pub fn device(id: &str, status: DeviceStatus) -> Device {
    Device {
        id: id.to_string(),
        user_id: "test-user".to_string(),
        name: format!("Device {}", id),
        device_type: DeviceType::Phone,
        is_third_party: false,
        third_party_email: None,
        records_password: None,
        recording_time_limit: None,
        status,
        last_seen: None,
        created_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct FakeRegistry {
    pub devices: Mutex<Vec<Device>>,
    pub unreachable: AtomicBool,
}

impl FakeRegistry {
    pub fn with_devices(devices: Vec<Device>) -> Self {
        Self {
            devices: Mutex::new(devices),
            unreachable: AtomicBool::new(false),
        }
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("registry offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceRegistry for FakeRegistry {
    async fn list(&self) -> Result<Vec<Device>, StoreError> {
        self.check()?;
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn create(&self, data: NewDevice) -> Result<Device, StoreError> {
        self.check()?;
        let mut created = device(&uuid::Uuid::new_v4().to_string(), DeviceStatus::Offline);
        created.name = data.name;
        created.device_type = data.device_type;
        self.devices.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: &str, patch: DevicePatch) -> Result<Device, StoreError> {
        self.check()?;
        let mut devices = self.devices.lock().unwrap();
        let device = devices
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if let Some(name) = patch.name {
            device.name = name;
        }
        Ok(device.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.check()?;
        self.devices.lock().unwrap().retain(|d| d.id != id);
        Ok(())
    }

    async fn set_status(&self, id: &str, status: DeviceStatus) -> Result<(), StoreError> {
        self.check()?;
        let mut devices = self.devices.lock().unwrap();
        let device = devices
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        device.status = status;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub recordings: Mutex<Vec<Recording>>,
    /// (recording id, bytes) of every attached file
    pub attached: Mutex<Vec<(String, usize)>>,
    pub unreachable: AtomicBool,
}

impl FakeStore {
    pub fn count(&self) -> usize {
        self.recordings.lock().unwrap().len()
    }

    pub fn all(&self) -> Vec<Recording> {
        self.recordings.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordingStore for FakeStore {
    async fn list(&self) -> Result<Vec<Recording>, StoreError> {
        self.check()?;
        Ok(self.all())
    }

    async fn create(&self, data: NewRecording, blob: Option<Blob>) -> Result<Recording, StoreError> {
        self.check()?;
        let recording = Recording {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: data.device_id,
            user_id: "test-user".to_string(),
            recording_type: data.recording_type,
            file_path: blob
                .filter(|b| !b.is_empty())
                .map(|_| "test-user/file.webm".to_string()),
            location_data: data.location_data,
            duration: data.duration,
            size: data.size,
            created_at: Utc::now(),
            is_downloaded: false,
        };
        self.recordings.lock().unwrap().push(recording.clone());
        Ok(recording)
    }

    async fn update(&self, id: &str, patch: RecordingPatch) -> Result<Recording, StoreError> {
        self.check()?;
        let mut recordings = self.recordings.lock().unwrap();
        let recording = recordings
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if patch.file_path.is_some() {
            recording.file_path = patch.file_path;
        }
        Ok(recording.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.check()?;
        self.recordings.lock().unwrap().retain(|r| r.id != id);
        Ok(())
    }

    async fn attach_file(&self, id: &str, blob: Blob) -> Result<Recording, StoreError> {
        self.check()?;
        if blob.is_empty() {
            return Err(StoreError::Invalid("empty".to_string()));
        }
        self.attached
            .lock()
            .unwrap()
            .push((id.to_string(), blob.len()));
        self.update(
            id,
            RecordingPatch {
                file_path: Some(format!("test-user/{}.webm", id)),
                ..Default::default()
            },
        )
        .await
    }

    async fn download_url(&self, file_path: &str) -> Result<String, StoreError> {
        self.check()?;
        Ok(format!("http://localhost/files/{}", file_path))
    }
}

pub struct ScriptedProbe {
    pub reachable: AtomicBool,
    pub calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReachabilityProbe for ScriptedProbe {
    async fn probe(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reachable.load(Ordering::SeqCst)
    }
}

pub struct FakeNet {
    pub online: AtomicBool,
    pub network_type: Mutex<Option<NetworkType>>,
    /// Every platform query fails while set
    pub broken: AtomicBool,
}

impl FakeNet {
    pub fn new(online: bool, network_type: Option<NetworkType>) -> Self {
        Self {
            online: AtomicBool::new(online),
            network_type: Mutex::new(network_type),
            broken: AtomicBool::new(false),
        }
    }

    fn check(&self) -> io::Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no /sys/class/net"));
        }
        Ok(())
    }
}

impl NetworkInfo for FakeNet {
    fn platform_online(&self) -> io::Result<bool> {
        self.check()?;
        Ok(self.online.load(Ordering::SeqCst))
    }

    fn network_type(&self) -> io::Result<Option<NetworkType>> {
        self.check()?;
        Ok(*self.network_type.lock().unwrap())
    }
}

struct FakeTrack {
    live: Arc<AtomicBool>,
    sender: Option<mpsc::Sender<Bytes>>,
}

impl TrackHandle for FakeTrack {
    fn stop(&mut self) {
        self.live.store(false, Ordering::SeqCst);
        self.sender = None;
    }
}

/// Camera and microphone that emit a fixed set of chunks per opened session
pub struct FakeMedia {
    pub chunks: Vec<Bytes>,
    pub supported: bool,
    pub fail: AtomicBool,
    /// Live flag and constraints of every opened session, in open order
    pub opened: Mutex<Vec<(Arc<AtomicBool>, MediaConstraints)>>,
}

impl FakeMedia {
    pub fn new(chunks: Vec<&'static [u8]>) -> Self {
        Self {
            chunks: chunks.into_iter().map(Bytes::from_static).collect(),
            supported: true,
            fail: AtomicBool::new(false),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    /// Live flag of the n-th opened session
    pub fn live(&self, index: usize) -> bool {
        self.opened.lock().unwrap()[index].0.load(Ordering::SeqCst)
    }

    pub fn live_count(&self) -> usize {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .filter(|(live, _)| live.load(Ordering::SeqCst))
            .count()
    }
}

#[async_trait]
impl MediaDevices for FakeMedia {
    fn is_type_supported(&self, _mime_type: &str) -> bool {
        self.supported
    }

    async fn open(&self, constraints: &MediaConstraints) -> Result<MediaSession, CaptureError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CaptureError::Acquisition("permission denied".to_string()));
        }
        let (tx, rx) = mpsc::channel(self.chunks.len().max(1));
        for chunk in &self.chunks {
            tx.try_send(chunk.clone()).unwrap();
        }
        let live = Arc::new(AtomicBool::new(true));
        self.opened
            .lock()
            .unwrap()
            .push((live.clone(), constraints.clone()));
        Ok(MediaSession {
            track: Box::new(FakeTrack {
                live,
                sender: Some(tx),
            }),
            chunks: rx,
        })
    }
}

struct FakeWatch {
    cleared: Arc<AtomicBool>,
    sender: Option<mpsc::Sender<Result<Position, String>>>,
}

impl WatchHandle for FakeWatch {
    fn clear(&mut self) {
        self.cleared.store(true, Ordering::SeqCst);
        self.sender = None;
    }
}

/// Reports the given positions once, then stays silent until cleared
pub struct FakeGeolocation {
    pub positions: Vec<(f64, f64)>,
    pub fail: AtomicBool,
    pub watches: Mutex<Vec<Arc<AtomicBool>>>,
}

impl FakeGeolocation {
    pub fn new(positions: Vec<(f64, f64)>) -> Self {
        Self {
            positions,
            fail: AtomicBool::new(false),
            watches: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        let geolocation = Self::new(Vec::new());
        geolocation.fail.store(true, Ordering::SeqCst);
        geolocation
    }

    pub fn active_watches(&self) -> usize {
        self.watches
            .lock()
            .unwrap()
            .iter()
            .filter(|cleared| !cleared.load(Ordering::SeqCst))
            .count()
    }
}

impl Geolocation for FakeGeolocation {
    fn watch_position(&self, _options: WatchOptions) -> Result<PositionWatch, CaptureError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CaptureError::Acquisition("location permission denied".to_string()));
        }
        let (tx, rx) = mpsc::channel(self.positions.len().max(1));
        for (lat, lng) in &self.positions {
            tx.try_send(Ok(Position::new(*lat, *lng))).unwrap();
        }
        let cleared = Arc::new(AtomicBool::new(false));
        self.watches.lock().unwrap().push(cleared.clone());
        Ok(PositionWatch {
            handle: Box::new(FakeWatch {
                cleared,
                sender: Some(tx),
            }),
            updates: rx,
        })
    }
}

pub struct DownGeocoder;

#[async_trait]
impl ReverseGeocoder for DownGeocoder {
    async fn reverse(&self, _latitude: f64, _longitude: f64) -> Result<String, String> {
        Err("geocoder unreachable".to_string())
    }
}

pub struct FixedGeocoder(pub &'static str);

#[async_trait]
impl ReverseGeocoder for FixedGeocoder {
    async fn reverse(&self, _latitude: f64, _longitude: f64) -> Result<String, String> {
        Ok(self.0.to_string())
    }
}
