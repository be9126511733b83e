//! # Timeline Assembler
//!
//! Собирает дубляжную дорожку строго по порядку сегментов:
//! `перевод -> синтез -> (адаптация голоса) -> размещение`.
//!
//! Позиция в дорожке (`cursor_ms`) не хранится как общее изменяемое
//! состояние: [`place_step`] получает курсор и возвращает новый, а
//! [`Track`] только накапливает готовые фрагменты.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc::Sender;

use crate::audio::buffer::{frames_to_ms, AudioBuffer};
use crate::audio::format::encode_wav;
use crate::audio::resample::convert_format;
use crate::config::AudioConfig;
use crate::error::{DubError, Result};
use crate::progress::{send_progress, ProgressUpdate};
use crate::segment::Segment;
use crate::services::tts::{synthesize_segment, SpeechSynthesizer};
use crate::sync::conformer::DurationConformer;
use crate::sync::slot::{PlacementKind, Slot, SlotPlacer, SynthesisOutcome};
use crate::sync::voice::{AdaptStatus, VoiceAdapter};

/// Упорядоченная последовательность фрагментов без временных меток;
/// позиция фрагмента определяется суммарной длиной предыдущих.
#[derive(Debug, Clone)]
pub struct Track {
    chunks: Vec<AudioBuffer>,
    sample_rate: u32,
    channels: u16,
}

impl Track {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            chunks: Vec::new(),
            sample_rate,
            channels: channels.max(1),
        }
    }

    pub fn push(&mut self, chunk: AudioBuffer) -> Result<()> {
        if chunk.sample_rate() != self.sample_rate || chunk.channels() != self.channels {
            return Err(DubError::AudioProcessing(format!(
                "Track is {} Hz/{} ch, got a {} Hz/{} ch chunk",
                self.sample_rate,
                self.channels,
                chunk.sample_rate(),
                chunk.channels()
            )));
        }
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
        Ok(())
    }

    pub fn frame_count(&self) -> usize {
        self.chunks.iter().map(AudioBuffer::frame_count).sum()
    }

    pub fn duration_ms(&self) -> u64 {
        frames_to_ms(self.frame_count(), self.sample_rate)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Склеивает фрагменты в один буфер
    pub fn into_buffer(self) -> AudioBuffer {
        let ch = self.channels as usize;
        let mut samples = Vec::with_capacity(self.frame_count() * ch);
        for chunk in self.chunks {
            samples.extend(chunk.into_samples());
        }
        AudioBuffer::new(samples, self.sample_rate, self.channels)
    }
}

/// Результат одного шага сборки
#[derive(Debug, Clone)]
pub struct TimelineStep {
    /// Фрагменты для добавления в дорожку по порядку
    pub chunks: Vec<AudioBuffer>,
    /// Вставленная перед слотом тишина (мс)
    pub gap_ms: u64,
    pub kind: PlacementKind,
    /// Новая позиция курсора
    pub cursor_ms: u64,
}

/// Чистый шаг: тишина до начала слота (если курсор отстает) и
/// заполнение слота. Перекрытие с предыдущим сегментом не исправляется.
pub fn place_step(cursor_ms: u64, slot: &Slot, speech: &SynthesisOutcome, placer: &SlotPlacer) -> TimelineStep {
    let mut chunks = Vec::with_capacity(2);
    let gap_ms = slot.start_ms.saturating_sub(cursor_ms);
    if gap_ms > 0 {
        chunks.push(AudioBuffer::silence(gap_ms, placer.sample_rate(), placer.channels()));
    } else if slot.start_ms < cursor_ms {
        debug!(
            "Segment {} starts at {} ms, track is already at {} ms; overlap kept",
            slot.index, slot.start_ms, cursor_ms
        );
    }

    let placement = placer.place(speech, slot);
    let cursor_ms = cursor_ms + gap_ms + placement.consumed_ms;
    chunks.push(placement.audio);

    TimelineStep {
        chunks,
        gap_ms,
        kind: placement.kind,
        cursor_ms,
    }
}

/// Итог обработки одного сегмента
#[derive(Debug, Clone)]
pub struct SegmentReport {
    pub index: usize,
    pub gap_ms: u64,
    pub kind: PlacementKind,
    pub voice: Option<AdaptStatus>,
}

impl SegmentReport {
    /// Сегмент озвучен тишиной вместо речи
    pub fn is_silent(&self) -> bool {
        matches!(self.kind, PlacementKind::Silence { .. })
    }
}

#[derive(Debug, Clone)]
pub struct AssembledTrack {
    pub buffer: AudioBuffer,
    pub reports: Vec<SegmentReport>,
}

pub struct TimelineAssembler {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voice: Option<VoiceAdapter>,
    conformer: DurationConformer,
    audio: AudioConfig,
    language: String,
    timeout: Duration,
    segment_dir: Option<PathBuf>,
}

impl TimelineAssembler {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        conformer: DurationConformer,
        audio: AudioConfig,
        language: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            synthesizer,
            voice: None,
            conformer,
            audio,
            language: language.to_string(),
            timeout,
            segment_dir: None,
        }
    }

    pub fn with_voice_adapter(mut self, adapter: VoiceAdapter) -> Self {
        self.voice = Some(adapter);
        self
    }

    /// Сохранять размещенное аудио каждого сегмента в `dir`
    pub fn with_segment_dir(mut self, dir: PathBuf) -> Self {
        self.segment_dir = Some(dir);
        self
    }

    /// Синтез и приведение речи к формату дорожки
    async fn synthesize(&self, segment: &Segment) -> SynthesisOutcome {
        let outcome = synthesize_segment(
            self.synthesizer.as_ref(),
            &segment.translated_text,
            &self.language,
            self.timeout,
        )
        .await;

        match outcome {
            SynthesisOutcome::Audio(buffer) => {
                match convert_format(&buffer, self.audio.sample_rate, self.audio.channels) {
                    Ok(converted) => SynthesisOutcome::Audio(converted),
                    Err(e) => SynthesisOutcome::Failed(format!("cannot convert synthesized audio: {}", e)),
                }
            }
            failed => failed,
        }
    }

    fn save_segment(&self, index: usize, chunks: &[AudioBuffer]) {
        let Some(dir) = &self.segment_dir else {
            return;
        };
        if let Some(placed) = chunks.last() {
            let path = dir.join(format!("segment_{:04}.wav", index));
            if let Err(e) = encode_wav(placed, &path) {
                warn!("Could not save segment {} to {}: {}", index, path.display(), e);
            }
        }
    }

    /// Собирает дорожку из сегментов.
    ///
    /// `original` - исходная речь, по ней определяется голос говорящего.
    /// Ошибка возвращается только при несовпадении форматов внутри
    /// дорожки; сбои сервисов заменяются тишиной.
    pub async fn assemble(
        &self,
        segments: &[Segment],
        original: &AudioBuffer,
        progress: &Option<Sender<ProgressUpdate>>,
    ) -> Result<AssembledTrack> {
        let mut ordered: Vec<&Segment> = segments.iter().collect();
        ordered.sort_by_key(|segment| segment.index);

        let placer = SlotPlacer::new(&self.conformer, self.audio.sample_rate, self.audio.channels);
        let mut track = Track::new(self.audio.sample_rate, self.audio.channels);
        let mut reports = Vec::with_capacity(ordered.len());
        let mut cursor_ms = 0u64;
        let total = ordered.len();

        for (position, segment) in ordered.into_iter().enumerate() {
            send_progress(
                progress,
                ProgressUpdate::Synthesizing {
                    current: position + 1,
                    total,
                },
            )
            .await;

            let slot = Slot::from_segment(segment);
            let mut speech = self.synthesize(segment).await;

            let mut voice_status = None;
            if let (Some(adapter), SynthesisOutcome::Audio(buffer)) = (&self.voice, &speech) {
                let adapted = adapter.adapt(buffer, original, &slot).await;
                voice_status = Some(adapted.status);
                speech = SynthesisOutcome::Audio(adapted.buffer);
            }

            let step = place_step(cursor_ms, &slot, &speech, &placer);
            debug!(
                "Segment {}: gap {} ms, slot [{}, {}) ms, cursor {} -> {} ms",
                segment.index, step.gap_ms, slot.start_ms, slot.end_ms, cursor_ms, step.cursor_ms
            );
            self.save_segment(segment.index, &step.chunks);

            for chunk in step.chunks {
                track.push(chunk)?;
            }
            cursor_ms = step.cursor_ms;
            reports.push(SegmentReport {
                index: segment.index,
                gap_ms: step.gap_ms,
                kind: step.kind,
                voice: voice_status,
            });
        }

        let silent = reports.iter().filter(|r| r.is_silent()).count();
        info!(
            "Assembled {} segments into {} ms of audio ({} filled with silence)",
            reports.len(),
            track.duration_ms(),
            silent
        );

        Ok(AssembledTrack {
            buffer: track.into_buffer(),
            reports,
        })
    }
}
