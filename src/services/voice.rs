//! # Voice Analysis
//!
//! Определение пола говорящего и перевод синтезированного голоса в
//! мужской регистр.
//!
//! Встроенные реализации работают по оценке основного тона (F0)
//! автокорреляцией: медианная F0 ниже порога считается мужским голосом,
//! а смена высоты выполняется ресемплингом с последующей коррекцией
//! темпа обратно к исходной длительности.

use async_trait::async_trait;
use log::debug;

use crate::audio::buffer::AudioBuffer;
use crate::audio::resample::resample_by_ratio;
use crate::audio::tempo::{TempoFilter, WsolaTempo, MAX_STAGE_FACTOR, MIN_STAGE_FACTOR};
use crate::config::VoiceConfig;
use crate::error::{DubError, Result};

/// Нижняя граница поиска F0 (C2)
const F0_MIN_HZ: f32 = 65.4;
/// Верхняя граница поиска F0 (C5)
const F0_MAX_HZ: f32 = 523.3;
const FRAME_MS: u64 = 40;
const HOP_MS: u64 = 20;
const SILENCE_RMS: f32 = 0.01;
const VOICING_THRESHOLD: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

#[async_trait]
pub trait GenderClassifier: Send + Sync {
    async fn classify(&self, audio: &AudioBuffer) -> Result<Gender>;
}

#[async_trait]
pub trait PitchConverter: Send + Sync {
    /// Возвращает новый буфер примерно той же длительности
    async fn convert(&self, audio: &AudioBuffer) -> Result<AudioBuffer>;
}

/// Оценки F0 (Гц) по озвученным кадрам
pub fn estimate_f0(audio: &AudioBuffer) -> Vec<f32> {
    let sample_rate = audio.sample_rate();
    if sample_rate == 0 {
        return Vec::new();
    }
    let mono = audio.to_mono();
    let frame = (FRAME_MS * sample_rate as u64 / 1000) as usize;
    let hop = (HOP_MS * sample_rate as u64 / 1000).max(1) as usize;
    let min_lag = (sample_rate as f32 / F0_MAX_HZ).floor().max(1.0) as usize;
    let max_lag = (sample_rate as f32 / F0_MIN_HZ).ceil() as usize;

    if frame <= max_lag || mono.len() < frame {
        return Vec::new();
    }

    let mut estimates = Vec::new();
    let mut start = 0;
    while start + frame <= mono.len() {
        let window = &mono[start..start + frame];
        start += hop;

        let energy: f32 = window.iter().map(|s| s * s).sum();
        let rms = (energy / frame as f32).sqrt();
        if rms < SILENCE_RMS {
            continue;
        }

        let mut best_lag = 0;
        let mut best_corr = 0.0f32;
        for lag in min_lag..=max_lag {
            let corr: f32 = window[..frame - lag]
                .iter()
                .zip(&window[lag..])
                .map(|(a, b)| a * b)
                .sum();
            if corr > best_corr {
                best_corr = corr;
                best_lag = lag;
            }
        }

        if best_lag > 0 && best_corr / energy >= VOICING_THRESHOLD {
            estimates.push(sample_rate as f32 / best_lag as f32);
        }
    }
    estimates
}

fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    Some(values[values.len() / 2])
}

/// Классификатор по медианной F0
#[derive(Debug, Clone)]
pub struct PitchGenderClassifier {
    male_threshold_hz: f32,
}

impl PitchGenderClassifier {
    pub fn new(male_threshold_hz: f32) -> Self {
        Self { male_threshold_hz }
    }

    pub fn from_config(config: &VoiceConfig) -> Self {
        Self::new(config.male_f0_threshold_hz)
    }

    fn classify_blocking(&self, audio: &AudioBuffer) -> Result<Gender> {
        let mut f0 = estimate_f0(audio);
        let median_f0 = median(&mut f0)
            .ok_or_else(|| DubError::VoiceAdaptation("no voiced frames to classify".to_string()))?;
        let gender = if median_f0 < self.male_threshold_hz {
            Gender::Male
        } else {
            Gender::Female
        };
        debug!(
            "Median F0 {:.1} Hz over {} frames -> {}",
            median_f0,
            f0.len(),
            gender.as_str()
        );
        Ok(gender)
    }
}

#[async_trait]
impl GenderClassifier for PitchGenderClassifier {
    async fn classify(&self, audio: &AudioBuffer) -> Result<Gender> {
        let classifier = self.clone();
        let audio = audio.clone();
        tokio::task::spawn_blocking(move || classifier.classify_blocking(&audio))
            .await
            .map_err(|e| DubError::VoiceAdaptation(format!("classifier task failed: {}", e)))?
    }
}

/// Сдвиг F0 к `target_f0_hz`: ресемплинг в `f0 / target` раз меняет
/// высоту и длину, затем темп возвращает исходную длину.
#[derive(Debug, Clone)]
pub struct ResamplePitchConverter {
    target_f0_hz: f32,
    tempo: WsolaTempo,
}

impl ResamplePitchConverter {
    pub fn new(target_f0_hz: f32, tempo: WsolaTempo) -> Self {
        Self { target_f0_hz, tempo }
    }

    pub fn from_config(config: &VoiceConfig) -> Self {
        Self::new(config.target_male_f0_hz, WsolaTempo::default())
    }

    fn convert_blocking(&self, audio: &AudioBuffer) -> Result<AudioBuffer> {
        let f0 = estimate_f0(audio);
        if f0.is_empty() {
            return Err(DubError::VoiceAdaptation("no voiced frames to convert".to_string()));
        }
        let mean_f0 = f0.iter().sum::<f32>() / f0.len() as f32;
        let pitch_factor = ((self.target_f0_hz / mean_f0) as f64).clamp(MIN_STAGE_FACTOR, MAX_STAGE_FACTOR);

        debug!(
            "Shifting pitch from {:.1} Hz towards {:.1} Hz (factor {:.3})",
            mean_f0, self.target_f0_hz, pitch_factor
        );

        if (pitch_factor - 1.0).abs() < 0.01 {
            return Ok(audio.clone());
        }

        let shifted = resample_by_ratio(audio, 1.0 / pitch_factor)?;
        let restored = self.tempo.apply(&shifted, 1.0 / pitch_factor)?;
        Ok(restored)
    }
}

#[async_trait]
impl PitchConverter for ResamplePitchConverter {
    async fn convert(&self, audio: &AudioBuffer) -> Result<AudioBuffer> {
        let converter = self.clone();
        let audio = audio.clone();
        tokio::task::spawn_blocking(move || converter.convert_blocking(&audio))
            .await
            .map_err(|e| DubError::VoiceAdaptation(format!("converter task failed: {}", e)))?
    }
}
