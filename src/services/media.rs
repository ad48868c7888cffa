//! Media tooling capabilities: stream probing, audio extraction and
//! subtitle extraction/conversion via ffmpeg/ffprobe subprocesses.
//!
//! Every subprocess invocation holds a permit on the shared ffmpeg
//! semaphore so concurrent jobs cannot oversubscribe the host.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::Result;
use crate::core::tracks::{AudioTrack, SubtitleKind, SubtitleTrack, is_image_based_codec};
use crate::error::SubWatchError;

/// Probed streams of a media container.
#[derive(Debug, Clone, Default)]
pub struct MediaInfo {
    /// Audio streams.
    pub audio_tracks: Vec<AudioTrack>,
    /// Subtitle streams.
    pub subtitle_tracks: Vec<SubtitleTrack>,
}

/// Media tool capability consumed by the job pipeline.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Enumerate audio and subtitle streams.
    async fn probe(&self, path: &Path) -> MediaInfo;

    /// Extract mono PCM WAV at the given sample rate.
    async fn extract_wav(
        &self,
        video: &Path,
        wav: &Path,
        stream_index: Option<i64>,
        sample_rate: u32,
    ) -> Result<()>;

    /// Extract an embedded subtitle stream to SRT.
    async fn extract_subtitle(&self, video: &Path, stream_index: i64, out: &Path) -> Result<()>;

    /// Convert an external subtitle file to SRT.
    async fn convert_subtitle(&self, input: &Path, out: &Path) -> Result<()>;

    /// Container duration in seconds, when the container reports one.
    async fn duration_seconds(&self, path: &Path) -> Option<f64>;
}

/// ffmpeg/ffprobe subprocess implementation.
pub struct FfmpegTool {
    semaphore: Arc<Semaphore>,
}

impl FfmpegTool {
    /// Create a tool gated by the given subprocess semaphore.
    pub fn new(semaphore: Arc<Semaphore>) -> Self {
        Self { semaphore }
    }

    async fn run_ffmpeg(&self, args: &[&str]) -> Result<()> {
        let _permit = self.semaphore.acquire().await.map_err(|_| {
            SubWatchError::media_tool("ffmpeg semaphore closed")
        })?;
        let status = Command::new("ffmpeg")
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| SubWatchError::media_tool(format!("ffmpeg spawn failed: {}", e)))?;
        if !status.success() {
            return Err(SubWatchError::media_tool(format!(
                "ffmpeg exited with {}",
                status
            )));
        }
        Ok(())
    }

    async fn run_ffprobe(&self, args: &[&str]) -> Result<String> {
        let _permit = self.semaphore.acquire().await.map_err(|_| {
            SubWatchError::media_tool("ffmpeg semaphore closed")
        })?;
        let output = Command::new("ffprobe")
            .args(args)
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| SubWatchError::media_tool(format!("ffprobe spawn failed: {}", e)))?;
        if !output.status.success() {
            return Err(SubWatchError::media_tool(format!(
                "ffprobe exited with {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Parse `ffprobe -show_streams -of json` output into tracks. Total over
/// arbitrary JSON: missing or oddly-typed fields become `None`.
pub fn parse_probe_output(json: &str) -> MediaInfo {
    let Ok(data) = serde_json::from_str::<Value>(json) else {
        return MediaInfo::default();
    };
    let mut info = MediaInfo::default();
    let Some(streams) = data.get("streams").and_then(Value::as_array) else {
        return info;
    };
    for stream in streams {
        let codec_type = stream.get("codec_type").and_then(Value::as_str);
        let index = stream.get("index").and_then(Value::as_i64).unwrap_or(-1);
        let tags = stream.get("tags");
        let language = tags
            .and_then(|t| t.get("language"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let title = tags
            .and_then(|t| t.get("title"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let codec = stream
            .get("codec_name")
            .and_then(Value::as_str)
            .map(str::to_string);
        let disposition = stream.get("disposition");
        let is_default = disposition
            .and_then(|d| d.get("default"))
            .and_then(Value::as_i64)
            .unwrap_or(0)
            != 0;
        let is_forced = disposition
            .and_then(|d| d.get("forced"))
            .and_then(Value::as_i64)
            .unwrap_or(0)
            != 0;

        match codec_type {
            Some("audio") => {
                let channels = stream.get("channels").and_then(Value::as_i64);
                info.audio_tracks.push(AudioTrack {
                    index,
                    language,
                    title,
                    codec,
                    channels,
                    is_default,
                    is_forced,
                });
            }
            Some("subtitle") => {
                let is_image_based = codec
                    .as_deref()
                    .map(is_image_based_codec)
                    .unwrap_or(false);
                info.subtitle_tracks.push(SubtitleTrack {
                    index,
                    language,
                    title,
                    codec,
                    is_default,
                    is_forced,
                    is_image_based,
                    kind: SubtitleKind::Embedded,
                    path: None,
                });
            }
            _ => {}
        }
    }
    info
}

#[async_trait]
impl MediaToolkit for FfmpegTool {
    async fn probe(&self, path: &Path) -> MediaInfo {
        let path = path.to_string_lossy().to_string();
        match self
            .run_ffprobe(&["-v", "error", "-show_streams", "-of", "json", &path])
            .await
        {
            Ok(output) => parse_probe_output(&output),
            Err(e) => {
                log::warn!("probe failed for {}: {}", path, e);
                MediaInfo::default()
            }
        }
    }

    async fn extract_wav(
        &self,
        video: &Path,
        wav: &Path,
        stream_index: Option<i64>,
        sample_rate: u32,
    ) -> Result<()> {
        let video = video.to_string_lossy().to_string();
        let wav = wav.to_string_lossy().to_string();
        let map = match stream_index {
            Some(index) => format!("0:{}", index),
            None => "0:a:0".to_string(),
        };
        let rate = sample_rate.to_string();
        self.run_ffmpeg(&[
            "-y", "-i", &video, "-map", &map, "-ac", "1", "-ar", &rate, &wav,
        ])
        .await
    }

    async fn extract_subtitle(&self, video: &Path, stream_index: i64, out: &Path) -> Result<()> {
        let video = video.to_string_lossy().to_string();
        let out = out.to_string_lossy().to_string();
        let map = format!("0:{}", stream_index);
        self.run_ffmpeg(&["-y", "-i", &video, "-map", &map, "-c:s", "srt", &out])
            .await
    }

    async fn convert_subtitle(&self, input: &Path, out: &Path) -> Result<()> {
        let input = input.to_string_lossy().to_string();
        let out = out.to_string_lossy().to_string();
        self.run_ffmpeg(&["-y", "-i", &input, "-c:s", "srt", &out])
            .await
    }

    async fn duration_seconds(&self, path: &Path) -> Option<f64> {
        let path = path.to_string_lossy().to_string();
        let output = self
            .run_ffprobe(&[
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
                &path,
            ])
            .await
            .ok()?;
        output.trim().parse().ok()
    }
}
