//! Модуль конфигурации библиотеки videodub
//!
//! Этот модуль содержит структуры и перечисления для настройки конвейера дубляжа.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DubError, Result};

/// Формат итоговой дорожки
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Частота дискретизации дорожки (Гц)
    pub sample_rate: u32,
    /// Количество каналов дорожки
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            channels: 1,
        }
    }
}

/// Реализация ступени изменения темпа
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TempoBackend {
    /// Встроенный WSOLA, работает в памяти
    Wsola,
    /// Фильтр `atempo` из ffmpeg
    Ffmpeg,
}

impl Default for TempoBackend {
    fn default() -> Self {
        Self::Wsola
    }
}

/// Настройки синхронизации по времени
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Реализация изменения темпа
    pub tempo_backend: TempoBackend,
    /// Коэффициент скорости считается равным 1.0 в пределах этого допуска
    pub speed_epsilon: f64,
    /// Допуск сравнения длины дорожки с длиной видео (мс)
    pub track_tolerance_ms: u64,
    /// Длина окна WSOLA (мс)
    pub wsola_frame_ms: u32,
    /// Окно поиска сдвига WSOLA (мс)
    pub wsola_search_ms: u32,
    /// Лимит времени одного вызова ffmpeg `atempo` (сек)
    pub tempo_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tempo_backend: TempoBackend::default(),
            speed_epsilon: 1e-6,
            track_tolerance_ms: 1,
            wsola_frame_ms: 40,
            wsola_search_ms: 10,
            tempo_timeout_secs: 60,
        }
    }
}

/// Настройки адаптации голоса
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceConfig {
    /// Включить определение пола и смену высоты голоса
    pub enabled: bool,
    /// Медианная F0 ниже этого порога считается мужским голосом
    pub male_f0_threshold_hz: f32,
    /// Целевая F0 при переводе голоса в мужской
    pub target_male_f0_hz: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            male_f0_threshold_hz: 165.0,
            target_male_f0_hz: 110.0,
        }
    }
}

/// Настройки внешних сервисов
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// API ключ для OpenAI
    pub openai_api_key: String,
    /// Базовый URL API
    pub openai_base_url: String,
    /// Модель распознавания речи
    pub transcription_model: String,
    /// Язык исходной речи
    pub transcription_language: String,
    /// Модель перевода
    pub translation_model: String,
    /// Модель TTS
    pub tts_model: String,
    /// Голос TTS
    pub tts_voice: String,
    /// Максимальное количество одновременных запросов перевода
    pub max_concurrent_requests: usize,
    /// Таймаут одного внешнего вызова (сек)
    pub request_timeout_secs: u64,
    /// Лимит времени одного запуска ffmpeg/ffprobe (сек)
    pub media_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            transcription_model: "whisper-1".to_string(),
            transcription_language: "en".to_string(),
            translation_model: "gpt-4o-mini".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            max_concurrent_requests: 8,
            request_timeout_secs: 60,
            media_timeout_secs: 600,
        }
    }
}

impl ServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn media_timeout(&self) -> Duration {
        Duration::from_secs(self.media_timeout_secs)
    }
}

/// Конфигурация конвейера
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DubConfig {
    pub audio: AudioConfig,
    pub sync: SyncConfig,
    pub voice: VoiceConfig,
    pub services: ServiceConfig,
    /// JSON-файл с идиомами `[{ "idiom": ..., "meaning": ... }]`
    pub idioms_path: Option<PathBuf>,
    /// Не удалять временные файлы прогона
    pub keep_temp_files: bool,
}

impl DubConfig {
    /// Загрузить конфигурацию из JSON-файла
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            DubError::Config(format!("Failed to read {}: {}", path.as_ref().display(), e))
        })?;
        let config: DubConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Взять ключ API из `OPENAI_API_KEY`, если он не задан в файле
    pub fn apply_env(mut self) -> Self {
        if self.services.openai_api_key.is_empty() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                self.services.openai_api_key = key;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(DubError::Config("audio.sample_rate must be positive".to_string()));
        }
        if self.audio.channels == 0 {
            return Err(DubError::Config("audio.channels must be positive".to_string()));
        }
        if self.services.request_timeout_secs == 0 {
            return Err(DubError::Config(
                "services.request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.services.max_concurrent_requests == 0 {
            return Err(DubError::Config(
                "services.max_concurrent_requests must be positive".to_string(),
            ));
        }
        if self.services.media_timeout_secs == 0 {
            return Err(DubError::Config("services.media_timeout_secs must be positive".to_string()));
        }
        if self.sync.tempo_timeout_secs == 0 {
            return Err(DubError::Config("sync.tempo_timeout_secs must be positive".to_string()));
        }
        if self.sync.wsola_frame_ms == 0 {
            return Err(DubError::Config("sync.wsola_frame_ms must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = DubConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.audio.sample_rate, 24_000);
        assert_eq!(config.sync.tempo_backend, TempoBackend::Wsola);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "audio": {{ "sample_rate": 16000 }}, "sync": {{ "tempo_backend": "ffmpeg" }} }}"#
        )
        .unwrap();

        let config = DubConfig::from_file(file.path()).unwrap();
        assert_eq!(config.audio.sample_rate, 16_000);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.sync.tempo_backend, TempoBackend::Ffmpeg);
        assert_eq!(config.services.tts_model, "tts-1");
    }

    #[test]
    fn test_validate_rejects_zero_rate() {
        let mut config = DubConfig::default();
        config.audio.sample_rate = 0;
        assert!(matches!(config.validate(), Err(DubError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_unbounded_media_calls() {
        let mut config = DubConfig::default();
        config.services.media_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(DubError::Config(_))));

        let mut config = DubConfig::default();
        config.sync.tempo_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(DubError::Config(_))));
    }
}
