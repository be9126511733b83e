//! # Audio
//!
//! PCM-буферы в памяти, чтение и запись файлов, ресемплинг и изменение
//! темпа без изменения высоты тона.

pub mod buffer;
pub mod format;
pub mod resample;
pub mod tempo;

pub use buffer::{frames_to_ms, ms_to_frames, AudioBuffer};
pub use tempo::{FfmpegTempo, TempoFilter, WsolaTempo};
