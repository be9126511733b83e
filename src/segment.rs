//! Сегменты речи: одна распознанная фраза с временными метками и
//! текстом на каждом этапе текстовой обработки.

use log::warn;
use serde::{Deserialize, Serialize};

/// Сегмент в том виде, в котором его возвращает распознавание речи
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscribedSegment {
    /// Начальное время в секундах
    pub start: f64,
    /// Конечное время в секундах
    pub end: f64,
    /// Распознанный текст
    pub text: String,
}

/// Сегмент, проходящий через текстовый конвейер
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Порядковый номер (с нуля)
    pub index: usize,
    /// Начальное время в секундах
    pub start: f64,
    /// Конечное время в секундах
    pub end: f64,
    /// Исходный текст
    pub original_text: String,
    /// Текст после замены идиом
    pub normalized_text: String,
    /// Переведенный текст; при сбое перевода совпадает с `normalized_text`
    pub translated_text: String,
}

impl Segment {
    pub fn new(index: usize, start: f64, end: f64, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            index,
            start,
            end,
            normalized_text: text.clone(),
            translated_text: text.clone(),
            original_text: text,
        }
    }

    /// Длительность в секундах
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Превращает результат распознавания в упорядоченный список сегментов.
///
/// Сегменты с `end <= start`, отрицательным началом или нечисловыми
/// метками отбрасываются; остальные сортируются по `start` и нумеруются
/// заново.
pub fn segments_from_transcription(transcribed: Vec<TranscribedSegment>) -> Vec<Segment> {
    let mut valid: Vec<TranscribedSegment> = transcribed
        .into_iter()
        .filter(|seg| {
            let ok = seg.start.is_finite() && seg.end.is_finite() && seg.start >= 0.0 && seg.end > seg.start;
            if !ok {
                warn!(
                    "Dropping segment with invalid timestamps [{}, {}): '{}'",
                    seg.start, seg.end, seg.text
                );
            }
            ok
        })
        .collect();

    valid.sort_by(|a, b| a.start.total_cmp(&b.start));

    valid
        .into_iter()
        .enumerate()
        .map(|(index, seg)| Segment::new(index, seg.start, seg.end, seg.text.trim()))
        .collect()
}
