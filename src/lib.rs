//! # videodub
//!
//! Дубляж видео на другой язык с сохранением исходного тайминга: речь
//! распознается, нормализуется, переводится, синтезируется заново и
//! собирается в дорожку, совпадающую по времени с исходными сегментами и
//! по длине с видео.

pub mod audio;
pub mod config;
pub mod error;
pub mod logger;
pub mod orchestrator;
pub mod progress;
pub mod segment;
pub mod services;
pub mod sync;
pub mod utils;

pub use config::DubConfig;
pub use error::{DubError, Result};
pub use orchestrator::{DubReport, DubServices, DubbingEngine};
pub use progress::ProgressUpdate;
pub use segment::Segment;
