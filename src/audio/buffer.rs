//! # Audio Buffer
//!
//! PCM-буфер в памяти: чередующиеся (interleaved) семплы f32 в диапазоне
//! [-1.0, 1.0], частота дискретизации и количество каналов.
//!
//! Все преобразования возвращают новый буфер; исходный остается
//! нетронутым, и вызывающий код сам решает, выбросить ли его.

use crate::error::{DubError, Result};

/// Переводит миллисекунды в количество кадров с округлением
pub fn ms_to_frames(ms: u64, sample_rate: u32) -> usize {
    ((ms as f64) * sample_rate as f64 / 1000.0).round() as usize
}

/// Переводит количество кадров в миллисекунды с округлением
pub fn frames_to_ms(frames: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    ((frames as f64) * 1000.0 / sample_rate as f64).round() as u64
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// Создает буфер из чередующихся семплов.
    ///
    /// Хвост, не образующий полный кадр, отбрасывается.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn empty(sample_rate: u32, channels: u16) -> Self {
        Self::new(Vec::new(), sample_rate, channels)
    }

    /// Тишина заданной длительности в миллисекундах
    pub fn silence(duration_ms: u64, sample_rate: u32, channels: u16) -> Self {
        Self::silence_frames(ms_to_frames(duration_ms, sample_rate), sample_rate, channels)
    }

    pub fn silence_frames(frames: usize, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Длительность в миллисекундах, округленная до целого
    pub fn duration_ms(&self) -> u64 {
        frames_to_ms(self.frame_count(), self.sample_rate)
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Совпадают ли частота и число каналов
    pub fn same_format(&self, other: &AudioBuffer) -> bool {
        self.sample_rate == other.sample_rate && self.channels == other.channels
    }

    /// Дописывает семплы другого буфера того же формата
    pub fn append(&mut self, other: &AudioBuffer) -> Result<()> {
        if !self.same_format(other) {
            return Err(DubError::AudioProcessing(format!(
                "Cannot append {} Hz/{} ch audio to {} Hz/{} ch buffer",
                other.sample_rate, other.channels, self.sample_rate, self.channels
            )));
        }
        self.samples.extend_from_slice(&other.samples);
        Ok(())
    }

    /// Фрагмент `[start_ms, end_ms)`, ограниченный длиной буфера
    pub fn slice_ms(&self, start_ms: u64, end_ms: u64) -> AudioBuffer {
        let total = self.frame_count();
        let start = ms_to_frames(start_ms, self.sample_rate).min(total);
        let end = ms_to_frames(end_ms, self.sample_rate).clamp(start, total);
        let ch = self.channels as usize;
        AudioBuffer::new(
            self.samples[start * ch..end * ch].to_vec(),
            self.sample_rate,
            self.channels,
        )
    }

    /// Первые `frames` кадров (или весь буфер, если он короче)
    pub fn truncated_to_frames(&self, frames: usize) -> AudioBuffer {
        let ch = self.channels as usize;
        let end = frames.min(self.frame_count()) * ch;
        AudioBuffer::new(self.samples[..end].to_vec(), self.sample_rate, self.channels)
    }

    /// Копия, дополненная тишиной до `frames` кадров (никогда не обрезает)
    pub fn padded_to_frames(&self, frames: usize) -> AudioBuffer {
        let mut samples = self.samples.clone();
        let ch = self.channels as usize;
        if frames * ch > samples.len() {
            samples.resize(frames * ch, 0.0);
        }
        AudioBuffer::new(samples, self.sample_rate, self.channels)
    }

    /// Сведение в моно усреднением каналов
    pub fn to_mono(&self) -> Vec<f32> {
        let ch = self.channels as usize;
        if ch == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect()
    }

    /// Разделение на каналы (planar)
    pub fn to_planar(&self) -> Vec<Vec<f32>> {
        let ch = self.channels as usize;
        let mut planar = vec![Vec::with_capacity(self.frame_count()); ch];
        for frame in self.samples.chunks_exact(ch) {
            for (c, &s) in frame.iter().enumerate() {
                planar[c].push(s);
            }
        }
        planar
    }

    /// Сборка буфера из каналов одинаковой длины
    pub fn from_planar(planar: &[Vec<f32>], sample_rate: u32) -> AudioBuffer {
        let channels = planar.len().max(1);
        let frames = planar.iter().map(Vec::len).min().unwrap_or(0);
        let mut samples = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            for channel in planar {
                samples.push(channel[i]);
            }
        }
        AudioBuffer::new(samples, sample_rate, channels as u16)
    }
}
