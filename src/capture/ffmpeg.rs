//! Capture backend that records through an ffmpeg child process writing WebM to stdout

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;

use super::media::{MediaConstraints, MediaDevices, MediaSession, TrackHandle, AUDIO_MIME, VIDEO_MIME};
use crate::config::CaptureConfig;
use crate::error::CaptureError;

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Time ffmpeg gets to finalize the file after `q` before it is killed
const STOP_GRACE: Duration = Duration::from_secs(2);

pub struct FfmpegMediaDevices {
    ffmpeg_path: String,
    video_device: String,
    audio_device: String,
}

impl FfmpegMediaDevices {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            video_device: config.video_device.clone(),
            audio_device: config.audio_device.clone(),
        }
    }

    /// ffmpeg arguments for the requested tracks
    pub fn build_args(&self, constraints: &MediaConstraints) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];

        if let Some(video) = &constraints.video {
            args.extend([
                "-f".into(),
                "v4l2".into(),
                "-video_size".into(),
                format!("{}x{}", video.width, video.height),
                "-i".into(),
                self.video_device.clone(),
            ]);
        }
        if let Some(audio) = &constraints.audio {
            args.extend(["-f".into(), "alsa".into(), "-i".into(), self.audio_device.clone()]);
            if audio.noise_suppression {
                args.extend(["-af".into(), "afftdn".into()]);
            }
        }

        if constraints.video.is_some() {
            args.extend([
                "-c:v".into(),
                "libvpx".into(),
                "-deadline".into(),
                "realtime".into(),
                "-b:v".into(),
                "1M".into(),
            ]);
        }
        if constraints.audio.is_some() {
            args.extend(["-c:a".into(), "libopus".into()]);
        } else {
            args.push("-an".into());
        }

        args.extend(["-f".into(), "webm".into(), "pipe:1".into()]);
        args
    }
}

struct FfmpegTrack {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl FfmpegTrack {
    fn kill(child: &mut Child) {
        if let Err(e) = child.start_kill() {
            log::warn!("Failed to kill ffmpeg: {}", e);
        }
    }
}

impl TrackHandle for FfmpegTrack {
    /// Ask ffmpeg to quit with `q` so it flushes the last cluster and closes
    /// the WebM stream; it is killed if it has not exited after the grace period
    fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        let (Some(mut stdin), Ok(runtime)) =
            (self.stdin.take(), tokio::runtime::Handle::try_current())
        else {
            Self::kill(&mut child);
            return;
        };

        runtime.spawn(async move {
            if let Err(e) = stdin.write_all(b"q\n").await {
                log::debug!("ffmpeg stdin closed before quit request: {}", e);
            }
            drop(stdin);
            match tokio::time::timeout(STOP_GRACE, child.wait()).await {
                Ok(Ok(status)) => log::debug!("ffmpeg exited with {}", status),
                Ok(Err(e)) => log::warn!("Failed to wait for ffmpeg: {}", e),
                Err(_) => {
                    log::warn!("ffmpeg did not quit within {:?}, killing it", STOP_GRACE);
                    Self::kill(&mut child);
                }
            }
        });
    }
}

impl Drop for FfmpegTrack {
    fn drop(&mut self) {
        // Not stopped gracefully: kill outright
        if let Some(mut child) = self.child.take() {
            Self::kill(&mut child);
        }
    }
}

#[async_trait]
impl MediaDevices for FfmpegMediaDevices {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_type == VIDEO_MIME || mime_type == AUDIO_MIME
    }

    async fn open(&self, constraints: &MediaConstraints) -> Result<MediaSession, CaptureError> {
        if constraints.video.is_some() && !Path::new(&self.video_device).exists() {
            return Err(CaptureError::Acquisition(format!(
                "camera {} not found",
                self.video_device
            )));
        }

        let args = self.build_args(constraints);
        log::debug!("Starting {} {}", self.ffmpeg_path, args.join(" "));

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::Acquisition(format!("failed to start ffmpeg: {}", e)))?;

        let stdin = child.stdin.take();
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::Acquisition("ffmpeg stdout unavailable".to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("Error reading ffmpeg output: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(MediaSession {
            track: Box::new(FfmpegTrack {
                child: Some(child),
                stdin,
            }),
            chunks: rx,
        })
    }
}
