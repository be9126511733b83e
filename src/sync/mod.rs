//! # Sync
//!
//! Ядро синхронизации: подгонка длительности, размещение сегментов в
//! слотах, адаптация голоса, сборка дорожки и финальная подгонка под
//! длину видео.

pub mod conformer;
pub mod slot;
pub mod speed_plan;
pub mod timeline;
pub mod track;
pub mod voice;

pub use conformer::{ConformOutcome, ConformStatus, DurationConformer};
pub use slot::{Placement, PlacementKind, Slot, SlotPlacer, SynthesisOutcome};
pub use speed_plan::SpeedPlan;
pub use timeline::{place_step, AssembledTrack, SegmentReport, TimelineAssembler, TimelineStep, Track};
pub use track::{TrackConformance, TrackConformer};
pub use voice::{AdaptStatus, VoiceAdaptation, VoiceAdapter};

#[cfg(test)]
mod tests {
    mod fakes;
    mod test_timeline;
    mod test_track;
}
