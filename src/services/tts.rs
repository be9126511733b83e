//! # Speech Synthesis
//!
//! Синтез речи для сегмента. Пустой текст и любые сбои сервиса
//! превращаются в `SynthesisOutcome::Failed`, а не в ошибку.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info};
use serde::Serialize;

use crate::audio::buffer::AudioBuffer;
use crate::audio::format::decode_audio_bytes;
use crate::config::ServiceConfig;
use crate::error::{DubError, Result};
use crate::services::with_timeout;
pub use crate::sync::slot::SynthesisOutcome;

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Возвращает декодированную речь в произвольном формате
    async fn synthesize(&self, text: &str, language: &str) -> Result<AudioBuffer>;
}

/// Параметры запроса к API OpenAI TTS
#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// Синтез через OpenAI TTS, ответ в MP3 декодируется symphonia
pub struct OpenAiSynthesizer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    voice: String,
}

impl OpenAiSynthesizer {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.tts_model.clone(),
            voice: config.tts_voice.clone(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSynthesizer {
    async fn synthesize(&self, text: &str, _language: &str) -> Result<AudioBuffer> {
        let request_body = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "mp3",
        };

        info!("Отправка TTS запроса для текста: '{}'", text);
        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Ошибка API OpenAI TTS (статус {}): {}", status, error_text);
            return Err(DubError::Synthesis(format!("Ошибка API ({}): {}", status, error_text)));
        }

        let audio_data = response.bytes().await?;
        debug!("Получен аудио-ответ от API OpenAI TTS: {} байт", audio_data.len());
        decode_audio_bytes(&audio_data, Some("mp3"))
    }
}

/// Синтез одного сегмента с ограничением по времени.
///
/// Одна попытка на вызов, без повторов.
pub async fn synthesize_segment(
    synthesizer: &dyn SpeechSynthesizer,
    text: &str,
    language: &str,
    timeout: Duration,
) -> SynthesisOutcome {
    if text.trim().is_empty() {
        return SynthesisOutcome::Failed("empty text".to_string());
    }

    match with_timeout("speech synthesis", timeout, synthesizer.synthesize(text, language)).await {
        Ok(buffer) if buffer.is_empty() => SynthesisOutcome::Failed("synthesized audio is empty".to_string()),
        Ok(buffer) => SynthesisOutcome::Audio(buffer),
        Err(e) => SynthesisOutcome::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSynth {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl SpeechSynthesizer for CountingSynth {
        async fn synthesize(&self, _text: &str, _language: &str) -> Result<AudioBuffer> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(AudioBuffer::silence(300, 24_000, 1))
        }
    }

    fn synth(delay_ms: u64) -> CountingSynth {
        CountingSynth {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(delay_ms),
        }
    }

    #[tokio::test]
    async fn test_blank_text_fails_without_request() {
        let synth = synth(0);
        let outcome = synthesize_segment(&synth, "   \n", "es", Duration::from_secs(1)).await;
        assert!(matches!(outcome, SynthesisOutcome::Failed(_)));
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_synthesis() {
        let synth = synth(0);
        let outcome = synthesize_segment(&synth, "hola", "es", Duration::from_secs(1)).await;
        match outcome {
            SynthesisOutcome::Audio(buffer) => assert_eq!(buffer.duration_ms(), 300),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_failure() {
        let synth = synth(5_000);
        let outcome = synthesize_segment(&synth, "hola", "es", Duration::from_millis(20)).await;
        match outcome {
            SynthesisOutcome::Failed(reason) => assert!(reason.contains("timed out"), "{}", reason),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
