//! # Tempo Filters
//!
//! Одна ступень изменения темпа без изменения высоты тона. Каждая
//! реализация работает только в диапазоне `[0.5, 2.0]`; более сильные
//! изменения собираются из цепочки ступеней (см. `sync::speed_plan`).
//!
//! - [`WsolaTempo`] - WSOLA (Waveform Similarity Overlap-Add) в памяти
//! - [`FfmpegTempo`] - фильтр `atempo` внешнего ffmpeg

use std::process::Command;
use std::time::Duration;

use log::debug;

use crate::audio::buffer::AudioBuffer;
use crate::audio::format;
use crate::config::{SyncConfig, TempoBackend};
use crate::error::{DubError, Result};
use crate::utils::process::output_with_timeout;

/// Минимальный коэффициент одной ступени
pub const MIN_STAGE_FACTOR: f64 = 0.5;
/// Максимальный коэффициент одной ступени
pub const MAX_STAGE_FACTOR: f64 = 2.0;

const RANGE_SLACK: f64 = 1e-9;

/// Ступень изменения темпа.
///
/// `factor > 1.0` ускоряет речь (буфер становится короче),
/// `factor < 1.0` замедляет. Реализации возвращают новый буфер.
pub trait TempoFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, buffer: &AudioBuffer, factor: f64) -> Result<AudioBuffer>;
}

fn check_stage_factor(factor: f64) -> Result<()> {
    if !factor.is_finite()
        || factor < MIN_STAGE_FACTOR - RANGE_SLACK
        || factor > MAX_STAGE_FACTOR + RANGE_SLACK
    {
        return Err(DubError::TimeStretching(format!(
            "Tempo factor {} is outside [{}, {}]",
            factor, MIN_STAGE_FACTOR, MAX_STAGE_FACTOR
        )));
    }
    Ok(())
}

/// Выбирает реализацию по конфигурации
pub fn tempo_filter_from_config(config: &SyncConfig) -> Box<dyn TempoFilter> {
    match config.tempo_backend {
        TempoBackend::Wsola => Box::new(WsolaTempo::new(config.wsola_frame_ms, config.wsola_search_ms)),
        TempoBackend::Ffmpeg => Box::new(FfmpegTempo::new(Duration::from_secs(config.tempo_timeout_secs))),
    }
}

/// WSOLA: окна Ханна с перекрытием 50%, каждое следующее окно сдвигается
/// в пределах окна поиска к позиции наибольшей корреляции с естественным
/// продолжением предыдущего.
///
/// Длина результата всегда `round(frames / factor)`.
#[derive(Debug, Clone)]
pub struct WsolaTempo {
    frame_ms: u32,
    search_ms: u32,
}

impl Default for WsolaTempo {
    fn default() -> Self {
        Self::new(40, 10)
    }
}

/// Шаг по семплам при подсчете корреляции
const CORR_STRIDE: usize = 4;
/// Шаг перебора сдвига
const SEARCH_STEP: usize = 2;

impl WsolaTempo {
    pub fn new(frame_ms: u32, search_ms: u32) -> Self {
        Self {
            frame_ms: frame_ms.max(1),
            search_ms,
        }
    }

    fn frame_len(&self, sample_rate: u32) -> usize {
        let len = (self.frame_ms as u64 * sample_rate as u64 / 1000) as usize;
        // четная длина, чтобы шаг был ровно половиной окна
        (len.max(32) + 1) & !1
    }

    fn stretch(&self, buffer: &AudioBuffer, factor: f64) -> AudioBuffer {
        let in_frames = buffer.frame_count();
        let out_frames = (in_frames as f64 / factor).round() as usize;
        let n = self.frame_len(buffer.sample_rate());

        if in_frames < n {
            return naive_stretch(buffer, out_frames);
        }

        let hop = n / 2;
        let tolerance = (self.search_ms as u64 * buffer.sample_rate() as u64 / 1000) as usize;
        let guide = buffer.to_mono();
        let planar = buffer.to_planar();
        let window: Vec<f32> = (0..n)
            .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos())
            .collect();

        let mut output = vec![vec![0.0f32; out_frames + n]; planar.len()];
        let mut norm = vec![0.0f32; out_frames + n];

        let mut prev_pos: Option<usize> = None;
        let mut k = 0usize;
        while k * hop < out_frames {
            let nominal = (k as f64 * hop as f64 * factor).round() as usize;
            let pos = match prev_pos {
                None => 0,
                Some(prev) => best_offset(&guide, prev + hop, nominal, tolerance, hop, in_frames),
            };

            let out_start = k * hop;
            for (i, &w) in window.iter().enumerate() {
                let src = pos + i;
                if src < in_frames {
                    for (channel, source) in output.iter_mut().zip(&planar) {
                        channel[out_start + i] += source[src] * w;
                    }
                }
                norm[out_start + i] += w;
            }

            prev_pos = Some(pos);
            k += 1;
        }

        for channel in output.iter_mut() {
            for (sample, &weight) in channel.iter_mut().zip(&norm) {
                if weight > 1e-3 {
                    *sample /= weight;
                }
            }
            channel.truncate(out_frames);
        }

        AudioBuffer::from_planar(&output, buffer.sample_rate())
    }
}

/// Позиция в окрестности `nominal`, наиболее похожая на `target`
fn best_offset(
    guide: &[f32],
    target: usize,
    nominal: usize,
    tolerance: usize,
    len: usize,
    in_frames: usize,
) -> usize {
    let last = in_frames.saturating_sub(1);
    let nominal = nominal.min(last);
    if tolerance == 0 || target + len > in_frames {
        return nominal;
    }

    let lo = nominal.saturating_sub(tolerance);
    let hi = (nominal + tolerance).min(in_frames.saturating_sub(len));
    if lo > hi {
        return nominal;
    }

    let mut best = nominal.min(hi).max(lo);
    let mut best_score = f32::MIN;
    let mut candidate = lo;
    while candidate <= hi {
        let mut score = 0.0f32;
        let mut i = 0;
        while i < len {
            score += guide[target + i] * guide[candidate + i];
            i += CORR_STRIDE;
        }
        if score > best_score {
            best_score = score;
            best = candidate;
        }
        candidate += SEARCH_STEP;
    }
    best
}

/// Для буферов короче окна: прореживание или повтор кадров
fn naive_stretch(buffer: &AudioBuffer, out_frames: usize) -> AudioBuffer {
    let in_frames = buffer.frame_count();
    let ch = buffer.channels() as usize;
    if in_frames == 0 {
        return AudioBuffer::silence_frames(out_frames, buffer.sample_rate(), buffer.channels());
    }
    let step = in_frames as f64 / out_frames.max(1) as f64;
    let source = buffer.samples();
    let mut samples = Vec::with_capacity(out_frames * ch);
    for i in 0..out_frames {
        let src = ((i as f64 * step) as usize).min(in_frames - 1);
        samples.extend_from_slice(&source[src * ch..(src + 1) * ch]);
    }
    AudioBuffer::new(samples, buffer.sample_rate(), buffer.channels())
}

impl TempoFilter for WsolaTempo {
    fn name(&self) -> &'static str {
        "wsola"
    }

    fn apply(&self, buffer: &AudioBuffer, factor: f64) -> Result<AudioBuffer> {
        check_stage_factor(factor)?;
        if buffer.sample_rate() == 0 {
            return Err(DubError::TimeStretching("Buffer has zero sample rate".to_string()));
        }
        Ok(self.stretch(buffer, factor))
    }
}

/// Фильтр `atempo` через ffmpeg; буфер проходит через WAV во временной
/// директории, своей для каждого вызова. Зависший процесс завершается
/// по истечении `timeout`.
#[derive(Debug, Clone)]
pub struct FfmpegTempo {
    ffmpeg_bin: String,
    timeout: Duration,
}

impl FfmpegTempo {
    pub fn new(timeout: Duration) -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            timeout,
        }
    }
}

impl TempoFilter for FfmpegTempo {
    fn name(&self) -> &'static str {
        "ffmpeg-atempo"
    }

    fn apply(&self, buffer: &AudioBuffer, factor: f64) -> Result<AudioBuffer> {
        check_stage_factor(factor)?;

        let temp_dir = tempfile::tempdir()?;
        let input_path = temp_dir.path().join("tempo_in.wav");
        let output_path = temp_dir.path().join("tempo_out.wav");
        format::encode_wav(buffer, &input_path)?;

        let filter = format!("atempo={:.6}", factor);
        debug!("Running {} with filter {}", self.ffmpeg_bin, filter);

        let output = output_with_timeout(
            Command::new(&self.ffmpeg_bin)
                .arg("-v")
                .arg("error")
                .arg("-i")
                .arg(&input_path)
                .arg("-filter:a")
                .arg(&filter)
                .arg("-acodec")
                .arg("pcm_s16le")
                .arg("-y")
                .arg(&output_path),
            "ffmpeg atempo",
            self.timeout,
        )
        .map_err(|e| match e {
            DubError::Io(e) => DubError::TimeStretching(format!("Failed to run ffmpeg: {}", e)),
            other => other,
        })?;

        if !output.status.success() {
            return Err(DubError::TimeStretching(format!(
                "ffmpeg atempo failed with status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        format::decode_wav_file(&output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(ms: u64, sample_rate: u32, channels: u16) -> AudioBuffer {
        let frames = crate::audio::buffer::ms_to_frames(ms, sample_rate);
        let mut samples = Vec::with_capacity(frames * channels as usize);
        for i in 0..frames {
            let s = (2.0 * std::f32::consts::PI * 200.0 * i as f32 / sample_rate as f32).sin() * 0.5;
            for _ in 0..channels {
                samples.push(s);
            }
        }
        AudioBuffer::new(samples, sample_rate, channels)
    }

    #[test]
    fn test_wsola_output_length() {
        let filter = WsolaTempo::default();
        let input = tone(2500, 16_000, 1);

        let faster = filter.apply(&input, 1.25).unwrap();
        assert_eq!(faster.frame_count(), 32_000);
        assert_eq!(faster.duration_ms(), 2000);

        let slower = filter.apply(&input, 0.5).unwrap();
        assert_eq!(slower.duration_ms(), 5000);
    }

    #[test]
    fn test_wsola_keeps_channels_and_level() {
        let filter = WsolaTempo::default();
        let input = tone(1000, 24_000, 2);
        let output = filter.apply(&input, 1.5).unwrap();

        assert_eq!(output.channels(), 2);
        assert_eq!(output.sample_rate(), 24_000);
        let peak = output.samples().iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.3 && peak < 0.6, "peak {}", peak);
    }

    #[test]
    fn test_wsola_short_buffer() {
        let filter = WsolaTempo::default();
        let input = AudioBuffer::new(vec![0.1; 100], 16_000, 1);
        let output = filter.apply(&input, 2.0).unwrap();
        assert_eq!(output.frame_count(), 50);
    }

    #[test]
    fn test_rejects_factor_outside_stage_range() {
        let filter = WsolaTempo::default();
        let input = tone(100, 16_000, 1);
        assert!(matches!(filter.apply(&input, 2.5), Err(DubError::TimeStretching(_))));
        assert!(matches!(filter.apply(&input, 0.25), Err(DubError::TimeStretching(_))));
    }

    #[test]
    fn test_backend_selection() {
        let mut config = SyncConfig::default();
        assert_eq!(tempo_filter_from_config(&config).name(), "wsola");
        config.tempo_backend = TempoBackend::Ffmpeg;
        assert_eq!(tempo_filter_from_config(&config).name(), "ffmpeg-atempo");
    }
}
