//! Camera and microphone capture

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::CaptureError;
use crate::models::{Blob, RecordingType};

pub const VIDEO_MIME: &str = "video/webm";
pub const AUDIO_MIME: &str = "audio/webm;codecs=opus";

/// How long a stopped recorder may take to hand over its last chunks
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
    pub facing_mode: String,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            facing_mode: "user".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaConstraints {
    pub video: Option<VideoConstraints>,
    pub audio: Option<AudioConstraints>,
}

/// The three media captures the app knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureKind {
    /// Used by panic mode
    VideoWithAudio,
    VideoOnly,
    AudioOnly,
}

impl CaptureKind {
    pub fn constraints(self) -> MediaConstraints {
        match self {
            CaptureKind::VideoWithAudio => MediaConstraints {
                video: Some(VideoConstraints::default()),
                audio: Some(AudioConstraints::default()),
            },
            CaptureKind::VideoOnly => MediaConstraints {
                video: Some(VideoConstraints::default()),
                audio: None,
            },
            CaptureKind::AudioOnly => MediaConstraints {
                video: None,
                audio: Some(AudioConstraints::default()),
            },
        }
    }

    /// Container requested from the recorder
    pub fn mime_type(self) -> &'static str {
        match self {
            CaptureKind::VideoWithAudio | CaptureKind::VideoOnly => VIDEO_MIME,
            CaptureKind::AudioOnly => AUDIO_MIME,
        }
    }

    /// Content type of the finished artifact
    pub fn content_type(self) -> &'static str {
        match self {
            CaptureKind::VideoWithAudio | CaptureKind::VideoOnly => "video/webm",
            CaptureKind::AudioOnly => "audio/webm",
        }
    }

    pub fn recording_type(self) -> RecordingType {
        match self {
            CaptureKind::VideoWithAudio | CaptureKind::VideoOnly => RecordingType::Video,
            CaptureKind::AudioOnly => RecordingType::Audio,
        }
    }

    fn file_prefix(self) -> &'static str {
        match self {
            CaptureKind::VideoWithAudio => "video_com_audio",
            CaptureKind::VideoOnly => "video",
            CaptureKind::AudioOnly => "audio",
        }
    }

    /// Download file name, e.g. `video_2024-05-01T10-00-00.webm`
    pub fn file_name(self, at: &DateTime<Utc>) -> String {
        format!("{}_{}.webm", self.file_prefix(), at.format("%Y-%m-%dT%H-%M-%S"))
    }
}

/// A live hardware track. `stop` must release the device before returning.
pub trait TrackHandle: Send {
    fn stop(&mut self);
}

/// An opened device: its track plus the encoded chunks it produces.
/// The chunk channel closes once the track is stopped.
pub struct MediaSession {
    pub track: Box<dyn TrackHandle>,
    pub chunks: mpsc::Receiver<Bytes>,
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;
    async fn open(&self, constraints: &MediaConstraints) -> Result<MediaSession, CaptureError>;
}

/// Finished capture kept in memory for local download
#[derive(Debug, Clone)]
pub struct SavedArtifact {
    pub id: String,
    pub kind: CaptureKind,
    pub file_name: String,
    pub data: Bytes,
    pub duration_secs: u64,
    pub created_at: DateTime<Utc>,
}

impl SavedArtifact {
    pub fn recording_type(&self) -> RecordingType {
        self.kind.recording_type()
    }

    pub fn to_blob(&self) -> Blob {
        Blob::new(self.data.clone(), self.kind.content_type())
    }
}

/// Join buffered chunks into one artifact body
pub fn concat_chunks(chunks: &[Bytes]) -> Bytes {
    let total = chunks.iter().map(Bytes::len).sum();
    let mut out = BytesMut::with_capacity(total);
    for chunk in chunks {
        out.extend_from_slice(chunk);
    }
    out.freeze()
}

/// A running media capture: the device track and the task buffering its output.
/// Dropping it stops the track.
pub struct MediaCapture {
    kind: CaptureKind,
    track: Box<dyn TrackHandle>,
    released: bool,
    buffer: Arc<Mutex<Vec<Bytes>>>,
    recorder: Option<JoinHandle<()>>,
    started_at: Instant,
}

impl MediaCapture {
    /// Verify the container and open the device
    pub async fn open(media: &dyn MediaDevices, kind: CaptureKind) -> Result<Self, CaptureError> {
        if !media.is_type_supported(kind.mime_type()) {
            return Err(CaptureError::Unsupported(kind.mime_type().to_string()));
        }
        let session = media.open(&kind.constraints()).await?;
        Ok(Self::record(kind, session))
    }

    fn record(kind: CaptureKind, session: MediaSession) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let recorder_buffer = buffer.clone();
        let mut chunks = session.chunks;
        let recorder = tokio::spawn(async move {
            while let Some(chunk) = chunks.recv().await {
                if chunk.is_empty() {
                    continue;
                }
                recorder_buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(chunk);
            }
        });
        log::debug!("{:?} capture started", kind);
        Self {
            kind,
            track: session.track,
            released: false,
            buffer,
            recorder: Some(recorder),
            started_at: Instant::now(),
        }
    }

    pub fn kind(&self) -> CaptureKind {
        self.kind
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Stop the hardware track. Safe to call more than once.
    pub fn release(&mut self) {
        if !self.released {
            self.track.stop();
            self.released = true;
            log::debug!("{:?} track released", self.kind);
        }
    }

    /// Release the device, drain the recorder and build the artifact
    pub async fn finish(mut self) -> Result<SavedArtifact, CaptureError> {
        self.release();
        let duration_secs = self.elapsed_secs();

        if let Some(mut recorder) = self.recorder.take() {
            match tokio::time::timeout(DRAIN_GRACE, &mut recorder).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(CaptureError::Recorder(e.to_string()));
                }
                Err(_) => {
                    log::warn!("{:?} recorder did not drain in time", self.kind);
                    recorder.abort();
                }
            }
        }

        let chunks = std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner));
        let data = concat_chunks(&chunks);
        if data.is_empty() {
            return Err(CaptureError::EmptyArtifact(self.kind.recording_type()));
        }

        let created_at = Utc::now();
        Ok(SavedArtifact {
            id: format!("{}_{}", self.kind.recording_type().as_str(), created_at.timestamp_millis()),
            kind: self.kind,
            file_name: self.kind.file_name(&created_at),
            data,
            duration_secs,
            created_at,
        })
    }
}

impl Drop for MediaCapture {
    fn drop(&mut self) {
        self.release();
        if let Some(recorder) = self.recorder.take() {
            recorder.abort();
        }
    }
}
