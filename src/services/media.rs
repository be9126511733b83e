//! Модуль для работы с FFmpeg
//!
//! Извлечение аудио, определение длительности видео и сборка итогового
//! файла. Все вызовы синхронные и блокируют поток до завершения процесса,
//! но не дольше заданного лимита.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use log::{debug, info};

use crate::error::{DubError, Result};
use crate::utils::process::output_with_timeout;

/// Проверка наличия ffmpeg и ffprobe в PATH
pub fn ensure_ffmpeg() -> Result<(PathBuf, PathBuf)> {
    let ffmpeg = which::which("ffmpeg")
        .map_err(|e| DubError::Media(format!("ffmpeg not found in PATH: {}", e)))?;
    let ffprobe = which::which("ffprobe")
        .map_err(|e| DubError::Media(format!("ffprobe not found in PATH: {}", e)))?;
    debug!("Using {} and {}", ffmpeg.display(), ffprobe.display());
    Ok((ffmpeg, ffprobe))
}

fn run_ffmpeg(command: &mut Command, limit: Duration) -> std::result::Result<(), String> {
    let output = output_with_timeout(command, "ffmpeg", limit).map_err(|e| match e {
        DubError::Io(e) => format!("Failed to run ffmpeg: {}", e),
        other => other.to_string(),
    })?;

    if !output.status.success() {
        return Err(format!(
            "FFmpeg command failed with status {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(())
}

/// Извлечение аудио из видео в PCM WAV с заданной частотой и каналами
pub fn extract_audio(
    video_path: &Path,
    output_path: &Path,
    sample_rate: u32,
    channels: u16,
    limit: Duration,
) -> Result<()> {
    info!("Extracting audio from {}", video_path.display());
    run_ffmpeg(
        Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(video_path)
            .arg("-vn") // Отключаем видео
            .args(["-acodec", "pcm_s16le"])
            .arg("-ar")
            .arg(sample_rate.to_string())
            .arg("-ac")
            .arg(channels.to_string())
            .arg("-y")
            .arg(output_path),
        limit,
    )
    .map_err(DubError::NoAudio)
}

/// Разбор вывода ffprobe вида `12.345000`; `N/A` и пустой вывод
/// означают отсутствие значения
pub fn parse_duration(output: &str) -> Option<f64> {
    output
        .lines()
        .map(str::trim)
        .filter_map(|line| line.parse::<f64>().ok())
        .find(|duration| duration.is_finite() && *duration > 0.0)
}

fn ffprobe_entry(video_path: &Path, select_video: bool, entry: &str, limit: Duration) -> Result<Option<f64>> {
    let mut command = Command::new("ffprobe");
    command.args(["-v", "error"]);
    if select_video {
        command.args(["-select_streams", "v:0"]);
    }
    command
        .args(["-show_entries", entry, "-of", "default=noprint_wrappers=1:nokey=1"])
        .arg(video_path);
    let output = output_with_timeout(&mut command, "ffprobe", limit).map_err(|e| match e {
        DubError::Io(e) => DubError::Media(format!("Failed to run ffprobe: {}", e)),
        other => other,
    })?;

    if !output.status.success() {
        return Err(DubError::Media(format!(
            "FFprobe command failed with status {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(parse_duration(&String::from_utf8_lossy(&output.stdout)))
}

/// Длительность видео в секундах: сначала по видеопотоку, затем по
/// контейнеру. `None`, если ffprobe не сообщил длительность.
pub fn probe_duration(video_path: &Path, limit: Duration) -> Result<Option<f64>> {
    if let Some(duration) = ffprobe_entry(video_path, true, "stream=duration", limit)? {
        return Ok(Some(duration));
    }
    debug!("Video stream has no duration, falling back to container duration");
    ffprobe_entry(video_path, false, "format=duration", limit)
}

/// Замена звуковой дорожки: видеопоток копируется, звук кодируется в AAC
pub fn mux(video_path: &Path, audio_path: &Path, output_path: &Path, limit: Duration) -> Result<()> {
    info!("Merging {} into {}", audio_path.display(), output_path.display());
    run_ffmpeg(
        Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(video_path)
            .arg("-i")
            .arg(audio_path)
            .args(["-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-c:a", "aac", "-y"])
            .arg(output_path),
        limit,
    )
    .map_err(DubError::Media)
}

/// Операции с контейнером, нужные конвейеру
pub trait MediaTool: Send + Sync {
    fn extract_audio(&self, video_path: &Path, output_path: &Path, sample_rate: u32, channels: u16) -> Result<()>;

    fn probe_duration(&self, video_path: &Path) -> Result<Option<f64>>;

    fn mux(&self, video_path: &Path, audio_path: &Path, output_path: &Path) -> Result<()>;
}

/// Реализация через ffmpeg/ffprobe из PATH; каждый запуск ограничен `timeout`
#[derive(Debug, Clone)]
pub struct FfmpegMedia {
    timeout: Duration,
}

impl FfmpegMedia {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl MediaTool for FfmpegMedia {
    fn extract_audio(&self, video_path: &Path, output_path: &Path, sample_rate: u32, channels: u16) -> Result<()> {
        extract_audio(video_path, output_path, sample_rate, channels, self.timeout)
    }

    fn probe_duration(&self, video_path: &Path) -> Result<Option<f64>> {
        probe_duration(video_path, self.timeout)
    }

    fn mux(&self, video_path: &Path, audio_path: &Path, output_path: &Path) -> Result<()> {
        mux(video_path, audio_path, output_path, self.timeout)
    }
}
