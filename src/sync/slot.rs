//! # Slot Placer
//!
//! Размещает озвучку одного сегмента в его временном окне. Длинная речь
//! только сжимается, короткая дополняется тишиной; растягивание короткой
//! речи на всё окно никогда не выполняется.

use log::{debug, warn};

use crate::audio::buffer::{ms_to_frames, AudioBuffer};
use crate::segment::Segment;
use crate::sync::conformer::{ConformStatus, DurationConformer};

/// Окно `[start, end)` сегмента в итоговой дорожке
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub target_duration_ms: u64,
}

impl Slot {
    pub fn from_segment(segment: &Segment) -> Self {
        let start_ms = (segment.start.max(0.0) * 1000.0).round() as u64;
        let target_duration_ms = (segment.duration().max(0.0) * 1000.0).round() as u64;
        Self {
            index: segment.index,
            start_ms,
            end_ms: start_ms + target_duration_ms,
            target_duration_ms,
        }
    }
}

/// Результат синтеза речи для сегмента
#[derive(Debug, Clone)]
pub enum SynthesisOutcome {
    Audio(AudioBuffer),
    Failed(String),
}

impl SynthesisOutcome {
    /// Пустой буфер считается неудачным синтезом
    pub fn usable_audio(&self) -> Option<&AudioBuffer> {
        match self {
            SynthesisOutcome::Audio(buffer) if !buffer.is_empty() => Some(buffer),
            _ => None,
        }
    }
}

/// Как было заполнено окно
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementKind {
    /// Речи нет, всё окно заполнено тишиной
    Silence { reason: String },
    /// Речь длиннее окна и была сжата
    Compressed { status: ConformStatus },
    /// Речь помещается, остаток окна заполнен тишиной
    Padded { pad_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct Placement {
    /// Аудио для добавления в дорожку
    pub audio: AudioBuffer,
    /// Сколько миллисекунд дорожки заняло окно
    pub consumed_ms: u64,
    pub kind: PlacementKind,
}

pub struct SlotPlacer<'a> {
    conformer: &'a DurationConformer,
    sample_rate: u32,
    channels: u16,
}

impl<'a> SlotPlacer<'a> {
    /// `sample_rate` и `channels` задают формат дорожки; входные буферы
    /// должны быть уже приведены к нему.
    pub fn new(conformer: &'a DurationConformer, sample_rate: u32, channels: u16) -> Self {
        Self {
            conformer,
            sample_rate,
            channels,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn place(&self, speech: &SynthesisOutcome, slot: &Slot) -> Placement {
        let target_ms = slot.target_duration_ms;

        let buffer = match speech.usable_audio() {
            Some(buffer) => buffer,
            None => {
                let reason = match speech {
                    SynthesisOutcome::Failed(reason) => reason.clone(),
                    SynthesisOutcome::Audio(_) => "synthesized audio is empty".to_string(),
                };
                warn!(
                    "degraded: segment {} has no speech ({}), filling {} ms with silence",
                    slot.index, reason, target_ms
                );
                return Placement {
                    audio: AudioBuffer::silence(target_ms, self.sample_rate, self.channels),
                    consumed_ms: target_ms,
                    kind: PlacementKind::Silence { reason },
                };
            }
        };

        let tts_ms = buffer.duration_ms();
        let target_frames = ms_to_frames(target_ms, buffer.sample_rate());

        // переполнение решается по кадрам: доли миллисекунды тоже не влезают в слот
        if buffer.frame_count() > target_frames {
            debug!(
                "Segment {}: speech {} ms overruns slot {} ms, compressing",
                slot.index, tts_ms, target_ms
            );
            let mut outcome = self.conformer.conform(buffer, target_ms as f64 / 1000.0);
            if outcome.status == ConformStatus::Unchanged {
                // перебор в пределах допуска скорости: хвост отрезается
                outcome.buffer = outcome.buffer.truncated_to_frames(target_frames);
            }
            let consumed_ms = outcome.buffer.duration_ms();
            if consumed_ms != target_ms {
                debug!(
                    "Segment {}: compressed to {} ms (slot {} ms), residue left for track pass",
                    slot.index, consumed_ms, target_ms
                );
            }
            return Placement {
                audio: outcome.buffer,
                consumed_ms,
                kind: PlacementKind::Compressed {
                    status: outcome.status,
                },
            };
        }

        let audio = buffer.padded_to_frames(target_frames);
        let pad_ms = target_ms.saturating_sub(tts_ms);
        debug!(
            "Segment {}: speech {} ms fits slot {} ms, padding {} ms",
            slot.index, tts_ms, target_ms, pad_ms
        );
        Placement {
            audio,
            consumed_ms: target_ms,
            kind: PlacementKind::Padded { pad_ms },
        }
    }
}
