//! # Duration Conformer
//!
//! Приводит длительность буфера к целевой цепочкой ступеней темпа
//! (каждая в `[0.5, 2.0]`), не меняя высоту тона.
//!
//! Ошибки никогда не пробрасываются: неверная цель означает пропуск,
//! сбой ступени оставляет результат последней успешной ступени.
//! Входной буфер не изменяется, результат всегда новый буфер.

use log::{debug, info, warn};

use crate::audio::buffer::AudioBuffer;
use crate::audio::tempo::{tempo_filter_from_config, TempoFilter};
use crate::config::SyncConfig;
use crate::sync::speed_plan::SpeedPlan;

/// Чем закончилась подгонка длительности
#[derive(Debug, Clone, PartialEq)]
pub enum ConformStatus {
    /// Длительность уже совпадает с целью
    Unchanged,
    /// Применены все ступени
    Adjusted { stages: usize },
    /// Подгонка не выполнялась
    Skipped(String),
    /// Цепочка оборвалась на ступени `applied`
    Partial {
        applied: usize,
        planned: usize,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct ConformOutcome {
    pub buffer: AudioBuffer,
    pub status: ConformStatus,
}

impl ConformOutcome {
    fn untouched(buffer: &AudioBuffer, status: ConformStatus) -> Self {
        Self {
            buffer: buffer.clone(),
            status,
        }
    }
}

pub struct DurationConformer {
    filter: Box<dyn TempoFilter>,
    epsilon: f64,
}

impl DurationConformer {
    pub fn new(filter: Box<dyn TempoFilter>, epsilon: f64) -> Self {
        Self {
            filter,
            epsilon: epsilon.abs(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(tempo_filter_from_config(config), config.speed_epsilon)
    }

    /// Сжимает или растягивает `buffer` до `target_secs`
    pub fn conform(&self, buffer: &AudioBuffer, target_secs: f64) -> ConformOutcome {
        if !target_secs.is_finite() || target_secs <= 0.0 {
            info!("Skipping duration adjustment: target duration {}s is not positive", target_secs);
            return ConformOutcome::untouched(
                buffer,
                ConformStatus::Skipped(format!("non-positive target duration {}", target_secs)),
            );
        }

        let current_secs = buffer.duration_secs();
        if current_secs <= 0.0 {
            info!("Skipping duration adjustment: buffer is empty");
            return ConformOutcome::untouched(buffer, ConformStatus::Skipped("empty buffer".to_string()));
        }

        let speed_factor = current_secs / target_secs;
        if (speed_factor - 1.0).abs() <= self.epsilon {
            debug!("Speed factor {:.4} is within tolerance, no adjustment", speed_factor);
            return ConformOutcome::untouched(buffer, ConformStatus::Unchanged);
        }

        let plan = match SpeedPlan::decompose(speed_factor) {
            Some(plan) => plan,
            None => {
                return ConformOutcome::untouched(
                    buffer,
                    ConformStatus::Skipped(format!("invalid speed factor {}", speed_factor)),
                );
            }
        };

        info!(
            "Adjusting {:.3}s -> {:.3}s (factor {:.4}, stages {:?}) with {}",
            current_secs,
            target_secs,
            speed_factor,
            plan.stages(),
            self.filter.name()
        );

        let planned = plan.stages().len();
        let mut current = buffer.clone();
        for (applied, &stage) in plan.stages().iter().enumerate() {
            match self.filter.apply(&current, stage) {
                Ok(next) => current = next,
                Err(e) => {
                    warn!(
                        "degraded: tempo stage {}/{} (factor {:.4}) failed, keeping previous audio: {}",
                        applied + 1,
                        planned,
                        stage,
                        e
                    );
                    return ConformOutcome {
                        buffer: current,
                        status: ConformStatus::Partial {
                            applied,
                            planned,
                            reason: e.to_string(),
                        },
                    };
                }
            }
        }

        ConformOutcome {
            buffer: current,
            status: ConformStatus::Adjusted { stages: planned },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tempo::WsolaTempo;
    use crate::error::{DubError, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Ступень, которая отказывает начиная с вызова `fail_from`
    struct FlakyTempo {
        calls: Arc<AtomicUsize>,
        fail_from: usize,
    }

    impl TempoFilter for FlakyTempo {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn apply(&self, buffer: &AudioBuffer, factor: f64) -> Result<AudioBuffer> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.fail_from {
                return Err(DubError::TimeStretching("filter crashed".to_string()));
            }
            WsolaTempo::default().apply(buffer, factor)
        }
    }

    fn conformer() -> DurationConformer {
        DurationConformer::new(Box::new(WsolaTempo::default()), 1e-3)
    }

    #[test]
    fn test_compresses_to_target() {
        let input = AudioBuffer::silence(2500, 16_000, 1);
        let outcome = conformer().conform(&input, 2.0);

        assert_eq!(outcome.status, ConformStatus::Adjusted { stages: 1 });
        assert_eq!(outcome.buffer.duration_ms(), 2000);
        assert_eq!(input.duration_ms(), 2500);
    }

    #[test]
    fn test_extreme_ratio_uses_chain() {
        let input = AudioBuffer::silence(5000, 16_000, 1);
        let outcome = conformer().conform(&input, 1.0);

        assert_eq!(outcome.status, ConformStatus::Adjusted { stages: 3 });
        assert!((outcome.buffer.duration_ms() as i64 - 1000).abs() <= 1);
    }

    #[test]
    fn test_identity_passes_through() {
        let input = AudioBuffer::silence(1000, 16_000, 1);
        let outcome = conformer().conform(&input, 1.0);
        assert_eq!(outcome.status, ConformStatus::Unchanged);
        assert_eq!(outcome.buffer, input);
    }

    #[test]
    fn test_non_positive_target_is_noop() {
        let input = AudioBuffer::silence(1000, 16_000, 1);
        for target in [0.0, -2.0, f64::NAN] {
            let outcome = conformer().conform(&input, target);
            assert!(matches!(outcome.status, ConformStatus::Skipped(_)));
            assert_eq!(outcome.buffer, input);
        }
    }

    #[test]
    fn test_stage_failure_keeps_previous_state() {
        let calls = Arc::new(AtomicUsize::new(0));
        let conformer = DurationConformer::new(
            Box::new(FlakyTempo {
                calls: calls.clone(),
                fail_from: 1,
            }),
            1e-3,
        );
        let input = AudioBuffer::silence(5000, 16_000, 1);
        let outcome = conformer.conform(&input, 1.0);

        assert!(matches!(
            outcome.status,
            ConformStatus::Partial { applied: 1, planned: 3, .. }
        ));
        // первая ступень 2.0 успела примениться
        assert_eq!(outcome.buffer.duration_ms(), 2500);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_first_stage_failure_returns_input() {
        let conformer = DurationConformer::new(
            Box::new(FlakyTempo {
                calls: Arc::new(AtomicUsize::new(0)),
                fail_from: 0,
            }),
            1e-3,
        );
        let input = AudioBuffer::silence(3000, 16_000, 1);
        let outcome = conformer.conform(&input, 2.0);
        assert!(matches!(outcome.status, ConformStatus::Partial { applied: 0, .. }));
        assert_eq!(outcome.buffer, input);
    }
}
