//! Внешние сервисы конвейера: распознавание речи, замена идиом, перевод,
//! синтез речи, анализ голоса и работа с контейнером через ffmpeg.
//!
//! Каждый сервис описан трейтом, чтобы ядро синхронизации можно было
//! проверять на подставных реализациях.

pub mod idioms;
pub mod media;
pub mod transcription;
pub mod translation;
pub mod tts;
pub mod voice;

use std::future::Future;
use std::time::Duration;

use crate::error::{DubError, Result};

/// Ограничивает внешний вызов по времени; истечение превращается в
/// `DubError::Timeout`.
pub async fn with_timeout<T, F>(stage: &str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(DubError::Timeout {
            stage: stage.to_string(),
            secs: limit.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: Result<()> = with_timeout("synthesis", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(DubError::Timeout { ref stage, .. }) if stage == "synthesis"));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result() {
        let result = with_timeout("translation", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
