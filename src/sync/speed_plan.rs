//! Разложение общего коэффициента скорости на цепочку ступеней,
//! каждая из которых лежит в `[0.5, 2.0]`.

use crate::audio::tempo::{MAX_STAGE_FACTOR, MIN_STAGE_FACTOR};

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedPlan {
    speed_factor: f64,
    stages: Vec<f64>,
}

impl SpeedPlan {
    /// Строит цепочку для `speed_factor = current / target`.
    ///
    /// Пока остаток больше 2.0, отщепляется ступень 2.0; пока меньше 0.5,
    /// отщепляется 0.5; остаток становится последней ступенью.
    /// Для неположительных и нечисловых коэффициентов возвращает `None`.
    pub fn decompose(speed_factor: f64) -> Option<Self> {
        if !speed_factor.is_finite() || speed_factor <= 0.0 {
            return None;
        }

        let mut stages = Vec::new();
        let mut remaining = speed_factor;

        while remaining > MAX_STAGE_FACTOR {
            stages.push(MAX_STAGE_FACTOR);
            remaining /= MAX_STAGE_FACTOR;
        }
        while remaining < MIN_STAGE_FACTOR {
            stages.push(MIN_STAGE_FACTOR);
            remaining /= MIN_STAGE_FACTOR;
        }
        stages.push(remaining);

        Some(Self {
            speed_factor,
            stages,
        })
    }

    pub fn speed_factor(&self) -> f64 {
        self.speed_factor
    }

    pub fn stages(&self) -> &[f64] {
        &self.stages
    }

    /// Произведение всех ступеней
    pub fn product(&self) -> f64 {
        self.stages.iter().product()
    }
}
