//! Модуль обработки ошибок библиотеки videodub
//!
//! Ошибки делятся на три группы: ошибки входных данных (операция
//! пропускается), сбои внешних сервисов (подставляется запасной вариант)
//! и фатальные ошибки, после которых прогон останавливается без выходного файла.

use thiserror::Error;

/// Ошибки библиотеки videodub
#[derive(Debug, Error)]
pub enum DubError {
    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка HTTP запроса
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ошибка WAV-кодирования
    #[error("WAV encoding error: {0}")]
    WavEncoding(#[from] hound::Error),

    /// Ошибка WAV-декодирования
    #[error("WAV decoding error: {0}")]
    WavDecoding(hound::Error),

    /// Ошибка обработки аудио
    #[error("Audio processing error: {0}")]
    AudioProcessing(String),

    /// Ошибка изменения темпа
    #[error("Time-stretching error: {0}")]
    TimeStretching(String),

    /// Ошибка ресемплинга
    #[error("Resampling error: {0}")]
    Resampling(String),

    /// Ошибка распознавания речи
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// Ошибка перевода
    #[error("Translation error: {0}")]
    Translation(String),

    /// Ошибка синтеза речи
    #[error("Speech synthesis error: {0}")]
    Synthesis(String),

    /// Ошибка определения пола или смены высоты голоса
    #[error("Voice adaptation error: {0}")]
    VoiceAdaptation(String),

    /// Ошибка ffmpeg/ffprobe
    #[error("Media error: {0}")]
    Media(String),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Config(String),

    /// Внешний вызов не уложился в отведенное время
    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: String, secs: u64 },

    /// Не удалось извлечь аудио из видео
    #[error("Failed to extract audio: {0}")]
    NoAudio(String),

    /// Речь не обнаружена
    #[error("No speech detected")]
    NoSpeech,

    /// Другая ошибка
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DubError {
    /// Фатальные ошибки прерывают прогон целиком; остальные
    /// обрабатываются запасным вариантом на месте вызова.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DubError::NoAudio(_) | DubError::NoSpeech | DubError::Media(_) | DubError::Config(_)
        )
    }
}

/// Тип Result для библиотеки videodub
pub type Result<T> = std::result::Result<T, DubError>;
