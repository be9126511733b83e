//! # Voice Adapter
//!
//! Необязательный шаг между синтезом и размещением: если исходный
//! говорящий на участке сегмента определен как мужчина, синтезированный
//! голос переводится в мужской регистр.
//!
//! Любой сбой классификации или конвертации логируется и оставляет
//! синтезированный буфер без изменений.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::audio::buffer::AudioBuffer;
use crate::services::voice::{Gender, GenderClassifier, PitchConverter};
use crate::services::with_timeout;
use crate::sync::slot::Slot;

/// Что произошло с буфером
#[derive(Debug, Clone, PartialEq)]
pub enum AdaptStatus {
    /// Голос переведен в мужской регистр
    Converted,
    /// Классификатор не требует изменений
    KeptOriginal(Gender),
    /// Адаптация не выполнялась
    Skipped(String),
    /// Сбой классификации или конвертации, буфер не изменен
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct VoiceAdaptation {
    pub buffer: AudioBuffer,
    pub status: AdaptStatus,
}

pub struct VoiceAdapter {
    classifier: Arc<dyn GenderClassifier>,
    converter: Arc<dyn PitchConverter>,
    timeout: Duration,
}

impl VoiceAdapter {
    pub fn new(
        classifier: Arc<dyn GenderClassifier>,
        converter: Arc<dyn PitchConverter>,
        timeout: Duration,
    ) -> Self {
        Self {
            classifier,
            converter,
            timeout,
        }
    }

    /// Адаптирует `speech` по участку `original` в окне слота.
    ///
    /// Длительность результата может отличаться от входной; размещение
    /// работает с новой длительностью.
    pub async fn adapt(&self, speech: &AudioBuffer, original: &AudioBuffer, slot: &Slot) -> VoiceAdaptation {
        let end_ms = slot.end_ms.min(original.duration_ms());
        if slot.start_ms >= end_ms {
            debug!(
                "Segment {}: original audio window [{}, {}) ms is empty, skipping voice adaptation",
                slot.index, slot.start_ms, end_ms
            );
            return VoiceAdaptation {
                buffer: speech.clone(),
                status: AdaptStatus::Skipped("original window is empty".to_string()),
            };
        }

        let reference = original.slice_ms(slot.start_ms, end_ms);
        let gender = match with_timeout("gender classification", self.timeout, self.classifier.classify(&reference)).await {
            Ok(gender) => gender,
            Err(e) => return self.degraded(speech, slot, e.to_string()),
        };

        if gender != Gender::Male {
            debug!("Segment {}: speaker is {}, voice kept", slot.index, gender.as_str());
            return VoiceAdaptation {
                buffer: speech.clone(),
                status: AdaptStatus::KeptOriginal(gender),
            };
        }

        match with_timeout("pitch conversion", self.timeout, self.converter.convert(speech)).await {
            Ok(converted) => {
                debug!(
                    "Segment {}: voice converted, {} ms -> {} ms",
                    slot.index,
                    speech.duration_ms(),
                    converted.duration_ms()
                );
                VoiceAdaptation {
                    buffer: converted,
                    status: AdaptStatus::Converted,
                }
            }
            Err(e) => self.degraded(speech, slot, e.to_string()),
        }
    }

    fn degraded(&self, speech: &AudioBuffer, slot: &Slot, reason: String) -> VoiceAdaptation {
        warn!(
            "degraded: segment {} voice adaptation failed, keeping synthesized voice: {}",
            slot.index, reason
        );
        VoiceAdaptation {
            buffer: speech.clone(),
            status: AdaptStatus::Failed(reason),
        }
    }
}
