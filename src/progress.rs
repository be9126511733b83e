//! # Progress
//!
//! Человекочитаемые сообщения о ходе дубляжа. Получатель необязателен:
//! без него обновления просто не отправляются.

use std::fmt;

use tokio::sync::mpsc::Sender;

/// Обновление прогресса для отправки клиенту
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// Началась обработка
    Started,
    /// Извлечение аудио из видео
    ExtractingAudio,
    /// Распознавание речи
    Transcribing,
    /// Пакетный перевод сегментов
    Translating {
        /// Количество сегментов
        total: usize,
    },
    /// Синтез и размещение сегмента
    Synthesizing {
        /// Текущий сегмент (с единицы)
        current: usize,
        /// Общее количество сегментов
        total: usize,
    },
    /// Подгонка длины дорожки под длину видео
    ConformingTrack,
    /// Сборка итогового видео
    Muxing,
    /// Обработка завершена
    Finished,
    /// Обработка прервана
    Failed(String),
}

impl fmt::Display for ProgressUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "Starting"),
            Self::ExtractingAudio => write!(f, "Extracting audio"),
            Self::Transcribing => write!(f, "Transcribing speech"),
            Self::Translating { total } => write!(f, "Translating {} segments", total),
            Self::Synthesizing { current, total } => {
                write!(f, "Dubbing segment {}/{}", current, total)
            }
            Self::ConformingTrack => write!(f, "Matching track length to video"),
            Self::Muxing => write!(f, "Merging audio into video"),
            Self::Finished => write!(f, "Done"),
            Self::Failed(reason) => write!(f, "Failed: {}", reason),
        }
    }
}

/// Асинхронно отправляет обновление прогресса
pub async fn send_progress(sender: &Option<Sender<ProgressUpdate>>, update: ProgressUpdate) {
    if let Some(sender) = sender {
        let _ = sender.send(update).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_progress_delivers_in_order() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let sender = Some(tx);

        send_progress(&sender, ProgressUpdate::Started).await;
        send_progress(&sender, ProgressUpdate::Synthesizing { current: 1, total: 2 }).await;

        assert_eq!(rx.recv().await, Some(ProgressUpdate::Started));
        assert_eq!(
            rx.recv().await,
            Some(ProgressUpdate::Synthesizing { current: 1, total: 2 })
        );
    }

    #[test]
    fn test_send_progress_without_receiver() {
        tokio_test::block_on(send_progress(&None, ProgressUpdate::Finished));
    }

    #[test]
    fn test_display() {
        let update = ProgressUpdate::Synthesizing { current: 3, total: 7 };
        assert_eq!(update.to_string(), "Dubbing segment 3/7");
    }
}
