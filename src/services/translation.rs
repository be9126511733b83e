//! Machine translation of segment texts.
//!
//! `translate_batch` is the only concurrent fan-out of the pipeline: one
//! task per text, bounded by a semaphore, results gathered back by index.
//! Any failed item keeps its input text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::config::ServiceConfig;
use crate::error::{DubError, Result};
use crate::services::with_timeout;

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String>;
}

// Chat message structure for OpenAI API
#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

// OpenAI API request
#[derive(Debug, Serialize)]
struct TranslationRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

// OpenAI API response
#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// Translator backed by the chat completions endpoint
pub struct OpenAiTranslator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiTranslator {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.translation_model.clone(),
        })
    }
}

#[async_trait]
impl Translator for OpenAiTranslator {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String> {
        // Create system message with translation instructions
        let system_message = format!(
            "You are a professional translator for video dubbing. \
            Translate the user's text from its original language into the language with code '{}'. \
            Keep the translation natural and about the same length as the original. \
            ONLY include the translated text in your response.",
            target_language
        );

        let request = TranslationRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system_message,
                },
                Message {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            temperature: 0.3,
        };

        debug!("Sending translation request to OpenAI API");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("OpenAI API error: HTTP {}, body: {}", status, error_text);
            return Err(DubError::Translation(format!("HTTP {}: {}", status, error_text)));
        }

        let completion: ChatCompletion = response.json().await?;
        let translated = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .unwrap_or_default();

        if translated.is_empty() {
            return Err(DubError::Translation("empty translation in response".to_string()));
        }
        Ok(translated)
    }
}

/// Translate every text concurrently; the output has the same length and
/// order as `texts`. Failed or timed out items keep their input text.
pub async fn translate_batch(
    translator: Arc<dyn Translator>,
    texts: &[String],
    target_language: &str,
    max_concurrent: usize,
    timeout: Duration,
) -> Vec<String> {
    info!("Translating {} segments to {}", texts.len(), target_language);

    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut handles = Vec::with_capacity(texts.len());

    for (index, text) in texts.iter().enumerate() {
        let translator = translator.clone();
        let semaphore = semaphore.clone();
        let text = text.clone();
        let language = target_language.to_string();

        handles.push(tokio::spawn(async move {
            if text.trim().is_empty() {
                return (index, Ok(text));
            }
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return (index, Err(DubError::Translation(e.to_string()))),
            };
            let result = with_timeout("translation", timeout, translator.translate(&text, &language)).await;
            (index, result)
        }));
    }

    let mut translated: Vec<Option<String>> = vec![None; texts.len()];
    for joined in futures::future::join_all(handles).await {
        match joined {
            Ok((index, Ok(text))) => translated[index] = Some(text),
            Ok((index, Err(e))) => {
                warn!("degraded: segment {} translation failed, keeping source text: {}", index, e);
            }
            Err(e) => warn!("degraded: translation task panicked: {}", e),
        }
    }

    translated
        .into_iter()
        .zip(texts)
        .map(|(result, original)| result.unwrap_or_else(|| original.clone()))
        .collect()
}
