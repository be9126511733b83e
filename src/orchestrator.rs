//! # Dubbing Orchestrator
//!
//! Последовательность одного прогона:
//! извлечение аудио -> распознавание -> замена идиом -> пакетный перевод ->
//! сборка дорожки -> подгонка под длину видео -> сборка видео.
//!
//! Фатальные ошибки (нет аудио, нет речи, сбой извлечения или сборки
//! видео) прерывают прогон без выходного файла и логируются как `error!`.
//! Остальные сбои заменяются запасным вариантом на месте и логируются
//! как `warn!("degraded: ...")`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::mpsc::Sender;

use crate::audio::format::{decode_wav_file, encode_wav};
use crate::config::DubConfig;
use crate::error::{DubError, Result};
use crate::progress::{send_progress, ProgressUpdate};
use crate::segment::{segments_from_transcription, Segment};
use crate::services::idioms::IdiomReplacer;
use crate::services::media::{FfmpegMedia, MediaTool};
use crate::services::transcription::{Transcriber, WhisperApiTranscriber};
use crate::services::translation::{translate_batch, OpenAiTranslator, Translator};
use crate::services::tts::{OpenAiSynthesizer, SpeechSynthesizer};
use crate::services::voice::{GenderClassifier, PitchConverter, PitchGenderClassifier, ResamplePitchConverter};
use crate::services::with_timeout;
use crate::sync::conformer::DurationConformer;
use crate::sync::timeline::{SegmentReport, TimelineAssembler};
use crate::sync::track::{TrackConformance, TrackConformer};
use crate::sync::voice::VoiceAdapter;
use crate::utils::temp::RunWorkspace;

/// Внешние сервисы прогона
#[derive(Clone)]
pub struct DubServices {
    pub transcriber: Arc<dyn Transcriber>,
    pub translator: Arc<dyn Translator>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub classifier: Arc<dyn GenderClassifier>,
    pub converter: Arc<dyn PitchConverter>,
    pub media: Arc<dyn MediaTool>,
}

impl DubServices {
    /// OpenAI для речи и текста, встроенный анализ голоса, ffmpeg
    pub fn from_config(config: &DubConfig) -> Result<Self> {
        if config.services.openai_api_key.is_empty() {
            return Err(DubError::Config(
                "OpenAI API key is not set (services.openai_api_key or OPENAI_API_KEY)".to_string(),
            ));
        }
        Ok(Self {
            transcriber: Arc::new(WhisperApiTranscriber::new(&config.services)?),
            translator: Arc::new(OpenAiTranslator::new(&config.services)?),
            synthesizer: Arc::new(OpenAiSynthesizer::new(&config.services)?),
            classifier: Arc::new(PitchGenderClassifier::from_config(&config.voice)),
            converter: Arc::new(ResamplePitchConverter::from_config(&config.voice)),
            media: Arc::new(FfmpegMedia::new(config.services.media_timeout())),
        })
    }
}

/// Итог успешного прогона
#[derive(Debug, Clone)]
pub struct DubReport {
    pub output_path: PathBuf,
    pub segments: Vec<SegmentReport>,
    /// Длина собранной дорожки до финальной подгонки
    pub assembled_ms: u64,
    /// Длина итоговой дорожки
    pub final_ms: u64,
    pub video_duration_secs: Option<f64>,
    pub track: TrackConformance,
}

impl DubReport {
    pub fn silent_segments(&self) -> usize {
        self.segments.iter().filter(|s| s.is_silent()).count()
    }
}

pub struct DubbingEngine {
    config: DubConfig,
    services: DubServices,
    idioms: IdiomReplacer,
    progress: Option<Sender<ProgressUpdate>>,
}

/// Выполняет блокирующую операцию вне асинхронного потока
async fn blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| DubError::Other(anyhow::anyhow!("blocking task failed: {}", e)))?
}

impl DubbingEngine {
    pub fn new(config: DubConfig, services: DubServices) -> Self {
        let idioms = IdiomReplacer::load_or_identity(config.idioms_path.as_deref());
        Self {
            config,
            services,
            idioms,
            progress: None,
        }
    }

    pub fn with_idioms(mut self, idioms: IdiomReplacer) -> Self {
        self.idioms = idioms;
        self
    }

    pub fn with_progress(mut self, sender: Sender<ProgressUpdate>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Дублирует `input` на язык `language` и записывает `output`
    pub async fn dub(&self, input: &Path, language: &str, output: &Path) -> Result<DubReport> {
        send_progress(&self.progress, ProgressUpdate::Started).await;

        match self.run(input, language, output).await {
            Ok(report) => {
                info!(
                    "Dubbed {} segments ({} silent) into {}",
                    report.segments.len(),
                    report.silent_segments(),
                    report.output_path.display()
                );
                send_progress(&self.progress, ProgressUpdate::Finished).await;
                Ok(report)
            }
            Err(e) => {
                error!("Dubbing failed: {}", e);
                send_progress(&self.progress, ProgressUpdate::Failed(e.to_string())).await;
                Err(e)
            }
        }
    }

    async fn run(&self, input: &Path, language: &str, output: &Path) -> Result<DubReport> {
        self.config.validate()?;
        let workspace = RunWorkspace::new(self.config.keep_temp_files)?;
        let timeout = self.config.services.request_timeout();
        let audio = &self.config.audio;

        // 1. Извлечение аудио
        send_progress(&self.progress, ProgressUpdate::ExtractingAudio).await;
        let original_path = workspace.file("original.wav");
        {
            let media = self.services.media.clone();
            let (video, wav) = (input.to_path_buf(), original_path.clone());
            let (rate, channels) = (audio.sample_rate, audio.channels);
            blocking(move || media.extract_audio(&video, &wav, rate, channels))
                .await
                .map_err(|e| match e {
                    DubError::NoAudio(reason) => DubError::NoAudio(reason),
                    other => DubError::NoAudio(other.to_string()),
                })?;
        }
        let original = decode_wav_file(&original_path).map_err(|e| DubError::NoAudio(e.to_string()))?;
        if original.is_empty() {
            return Err(DubError::NoAudio("extracted audio track is empty".to_string()));
        }
        info!("Extracted {} ms of audio", original.duration_ms());

        // 2. Распознавание речи
        send_progress(&self.progress, ProgressUpdate::Transcribing).await;
        let transcribed = with_timeout(
            "transcription",
            timeout,
            self.services.transcriber.transcribe(&original_path),
        )
        .await?;
        let mut segments = segments_from_transcription(transcribed);
        if segments.is_empty() {
            return Err(DubError::NoSpeech);
        }
        info!("Transcribed {} segments", segments.len());

        // 3. Замена идиом и перевод
        self.normalize(&mut segments);
        send_progress(&self.progress, ProgressUpdate::Translating { total: segments.len() }).await;
        let texts: Vec<String> = segments.iter().map(|s| s.normalized_text.clone()).collect();
        let translated = translate_batch(
            self.services.translator.clone(),
            &texts,
            language,
            self.config.services.max_concurrent_requests,
            timeout,
        )
        .await;
        for (segment, text) in segments.iter_mut().zip(translated) {
            segment.translated_text = text;
        }

        // 4. Сборка дорожки
        let mut assembler = TimelineAssembler::new(
            self.services.synthesizer.clone(),
            DurationConformer::from_config(&self.config.sync),
            audio.clone(),
            language,
            timeout,
        );
        if self.config.voice.enabled {
            assembler = assembler.with_voice_adapter(VoiceAdapter::new(
                self.services.classifier.clone(),
                self.services.converter.clone(),
                timeout,
            ));
        }
        if self.config.keep_temp_files {
            assembler = assembler.with_segment_dir(workspace.subdir("segments")?);
        }
        let assembled = assembler.assemble(&segments, &original, &self.progress).await?;
        let assembled_ms = assembled.buffer.duration_ms();

        // 5. Подгонка под длину видео
        send_progress(&self.progress, ProgressUpdate::ConformingTrack).await;
        let video_duration_secs = {
            let media = self.services.media.clone();
            let video = input.to_path_buf();
            match blocking(move || media.probe_duration(&video)).await {
                Ok(duration) => duration,
                Err(e) => {
                    warn!("degraded: could not probe video duration: {}", e);
                    None
                }
            }
        };
        let (track, track_status) = match video_duration_secs {
            Some(video_secs) => TrackConformer::from_config(&self.config.sync).conform(&assembled.buffer, video_secs),
            None => {
                warn!("degraded: video duration unavailable, track length left at {} ms", assembled_ms);
                (
                    assembled.buffer,
                    TrackConformance::Skipped("video duration unavailable".to_string()),
                )
            }
        };

        // 6. Сборка видео
        send_progress(&self.progress, ProgressUpdate::Muxing).await;
        let dubbed_path = workspace.file("dubbed.wav");
        encode_wav(&track, &dubbed_path)?;
        {
            let media = self.services.media.clone();
            let (video, wav, out) = (input.to_path_buf(), dubbed_path.clone(), output.to_path_buf());
            let result = blocking(move || media.mux(&video, &wav, &out)).await;
            if let Err(e) = result {
                if output.exists() {
                    if let Err(cleanup) = std::fs::remove_file(output) {
                        warn!("Failed to remove partial output {}: {}", output.display(), cleanup);
                    }
                }
                return Err(match e {
                    DubError::Media(reason) => DubError::Media(reason),
                    other => DubError::Media(other.to_string()),
                });
            }
        }

        Ok(DubReport {
            output_path: output.to_path_buf(),
            segments: assembled.reports,
            assembled_ms,
            final_ms: track.duration_ms(),
            video_duration_secs,
            track: track_status,
        })
    }

    fn normalize(&self, segments: &mut [Segment]) {
        for segment in segments.iter_mut() {
            segment.normalized_text = self.idioms.replace(&segment.original_text);
            segment.translated_text = segment.normalized_text.clone();
        }
    }
}
