//! Speech-to-text via the Whisper transcription endpoint.

use std::path::Path;

use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::config::ServiceConfig;
use crate::error::{DubError, Result};
use crate::segment::TranscribedSegment;

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Timestamped segments in seconds, in the order the service returned them
    async fn transcribe(&self, audio_path: &Path) -> Result<Vec<TranscribedSegment>>;
}

// verbose_json response; only the fields we use
#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    segments: Vec<TranscribedSegment>,
}

pub struct WhisperApiTranscriber {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    language: String,
}

impl WhisperApiTranscriber {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.transcription_model.clone(),
            language: config.transcription_language.clone(),
        })
    }
}

fn parse_verbose_json(body: &str) -> Result<Vec<TranscribedSegment>> {
    let parsed: VerboseTranscription = serde_json::from_str(body)?;
    Ok(parsed.segments)
}

#[async_trait]
impl Transcriber for WhisperApiTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<Vec<TranscribedSegment>> {
        let audio = tokio::fs::read(audio_path).await?;
        info!(
            "Transcribing {} ({} bytes) with {}",
            audio_path.display(),
            audio.len(),
            self.model
        );

        let file_name = audio_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());
        let file_part = Part::bytes(audio).file_name(file_name).mime_str("audio/wav")?;

        let mut form = Form::new()
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
            .part("file", file_part);
        if !self.language.is_empty() {
            form = form.text("language", self.language.clone());
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!("Transcription API error: HTTP {}, body: {}", status, body);
            return Err(DubError::Transcription(format!("HTTP {}: {}", status, body)));
        }

        let segments = parse_verbose_json(&body)?;
        debug!("Received {} segments from transcription API", segments.len());
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verbose_json_segments() {
        let body = r#"{
            "task": "transcribe",
            "language": "english",
            "duration": 5.2,
            "text": "Hello there. General Kenobi.",
            "segments": [
                {"id": 0, "seek": 0, "start": 0.0, "end": 1.84, "text": " Hello there.", "tokens": [1, 2]},
                {"id": 1, "seek": 0, "start": 2.5, "end": 4.1, "text": " General Kenobi.", "tokens": [3]}
            ]
        }"#;
        let segments = parse_verbose_json(body).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].start, 2.5);
        assert_eq!(segments[1].text, " General Kenobi.");
    }

    #[test]
    fn test_parse_without_segments() {
        assert!(parse_verbose_json(r#"{"text": ""}"#).unwrap().is_empty());
    }
}
