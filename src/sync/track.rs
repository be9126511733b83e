//! # Track Conformer
//!
//! Последний проход по всей собранной дорожке: длинная дорожка целиком
//! сжимается до длины видео, короткая дополняется тишиной в конце.
//! Отдельные сегменты заново не выравниваются.

use log::{debug, info, warn};

use crate::audio::buffer::{ms_to_frames, AudioBuffer};
use crate::audio::tempo::tempo_filter_from_config;
use crate::config::SyncConfig;
use crate::sync::conformer::{ConformStatus, DurationConformer};

#[derive(Debug, Clone, PartialEq)]
pub enum TrackConformance {
    /// Длины совпадают в пределах допуска
    Unchanged,
    /// Дорожка сжата целиком
    Compressed(ConformStatus),
    /// В конец добавлена тишина
    Padded { pad_ms: u64 },
    /// Длительность видео неизвестна или некорректна
    Skipped(String),
}

pub struct TrackConformer {
    conformer: DurationConformer,
    tolerance_ms: u64,
}

impl TrackConformer {
    /// `conformer` должен работать без собственного допуска по
    /// коэффициенту: решение о no-op принимается здесь в миллисекундах.
    pub fn new(conformer: DurationConformer, tolerance_ms: u64) -> Self {
        Self {
            conformer,
            tolerance_ms,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            DurationConformer::new(tempo_filter_from_config(config), 0.0),
            config.track_tolerance_ms,
        )
    }

    pub fn conform(&self, track: &AudioBuffer, video_secs: f64) -> (AudioBuffer, TrackConformance) {
        if !video_secs.is_finite() || video_secs <= 0.0 {
            warn!(
                "degraded: video duration {} is unusable, track length left at {} ms",
                video_secs,
                track.duration_ms()
            );
            return (
                track.clone(),
                TrackConformance::Skipped(format!("invalid video duration {}", video_secs)),
            );
        }

        let track_ms = track.duration_ms();
        let video_ms = (video_secs * 1000.0).round() as u64;

        if track_ms.abs_diff(video_ms) <= self.tolerance_ms {
            debug!("Track {} ms matches video {} ms", track_ms, video_ms);
            return (track.clone(), TrackConformance::Unchanged);
        }

        if track_ms > video_ms {
            info!("Track is {} ms, video is {} ms: compressing whole track", track_ms, video_ms);
            let outcome = self.conformer.conform(track, video_secs);
            return (outcome.buffer, TrackConformance::Compressed(outcome.status));
        }

        let pad_ms = video_ms - track_ms;
        info!("Track is {} ms, video is {} ms: padding {} ms of silence", track_ms, video_ms, pad_ms);
        let padded = track.padded_to_frames(ms_to_frames(video_ms, track.sample_rate()));
        (padded, TrackConformance::Padded { pad_ms })
    }
}
