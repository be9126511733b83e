use std::sync::Arc;
use std::time::Duration;

use super::fakes::{segment, tone, tone_frames, FixedClassifier, LengtheningConverter, ScriptedSynthesizer, RATE};
use crate::audio::buffer::{ms_to_frames, AudioBuffer};
use crate::config::{AudioConfig, SyncConfig};
use crate::services::voice::Gender;
use crate::sync::conformer::{ConformStatus, DurationConformer};
use crate::sync::slot::{PlacementKind, Slot, SlotPlacer, SynthesisOutcome};
use crate::sync::timeline::{place_step, TimelineAssembler, Track};
use crate::sync::track::{TrackConformance, TrackConformer};
use crate::sync::voice::{AdaptStatus, VoiceAdapter};

fn conformer() -> DurationConformer {
    DurationConformer::from_config(&SyncConfig::default())
}

fn assembler(synth: Arc<ScriptedSynthesizer>) -> TimelineAssembler {
    TimelineAssembler::new(
        synth,
        conformer(),
        AudioConfig::default(),
        "es",
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn test_two_segment_scenario() {
    // видео 5 с, сегменты [0, 2) и [3, 5), речь 2500 и 1000 мс
    let synth = Arc::new(ScriptedSynthesizer::new(&[("uno", 2500), ("dos", 1000)]));
    let segments = vec![segment(0, 0.0, 2.0, "uno"), segment(1, 3.0, 5.0, "dos")];
    let original = AudioBuffer::silence(5000, RATE, 1);

    let assembled = assembler(synth).assemble(&segments, &original, &None).await.unwrap();

    assert_eq!(assembled.reports.len(), 2);
    assert_eq!(assembled.reports[0].gap_ms, 0);
    assert_eq!(
        assembled.reports[0].kind,
        PlacementKind::Compressed {
            status: ConformStatus::Adjusted { stages: 1 }
        }
    );
    assert_eq!(assembled.reports[1].gap_ms, 1000);
    assert_eq!(assembled.reports[1].kind, PlacementKind::Padded { pad_ms: 1000 });
    assert_eq!(assembled.buffer.duration_ms(), 5000);

    let (conformed, status) = TrackConformer::from_config(&SyncConfig::default()).conform(&assembled.buffer, 5.0);
    assert_eq!(status, TrackConformance::Unchanged);
    assert_eq!(conformed, assembled.buffer);

    // пауза между сегментами - тишина
    let gap = assembled.buffer.slice_ms(2000, 3000);
    assert!(gap.samples().iter().all(|&s| s == 0.0));
    // речь второго сегмента не растянута, за ней тишина
    let speech = assembled.buffer.slice_ms(3000, 4000);
    assert_eq!(speech, tone(1000, RATE, 1));
    assert!(assembled.buffer.slice_ms(4000, 5000).samples().iter().all(|&s| s == 0.0));
}

#[tokio::test]
async fn test_failed_synthesis_fills_slot_and_continues() {
    let synth = Arc::new(ScriptedSynthesizer::new(&[("first", 800), ("third", 500)]));
    let segments = vec![
        segment(0, 0.5, 1.5, "first"),
        segment(1, 2.0, 3.25, "second"),
        segment(2, 4.0, 5.0, "third"),
    ];
    let original = AudioBuffer::silence(5000, RATE, 1);

    let assembled = assembler(synth.clone()).assemble(&segments, &original, &None).await.unwrap();

    assert!(assembled.reports[1].is_silent());
    assert!(!assembled.reports[2].is_silent());
    assert_eq!(synth.request_count(), 3);
    assert_eq!(assembled.buffer.duration_ms(), 5000);
    assert!(assembled.buffer.slice_ms(2000, 3250).samples().iter().all(|&s| s == 0.0));
}

#[tokio::test]
async fn test_blank_translation_skips_synthesis_and_voice() {
    let synth = Arc::new(ScriptedSynthesizer::new(&[("hola", 400)]));
    let classifier = Arc::new(FixedClassifier::new(Gender::Male));
    let adapter = VoiceAdapter::new(
        classifier.clone(),
        Arc::new(LengtheningConverter { extra_ms: 0 }),
        Duration::from_secs(5),
    );
    let mut blank = segment(0, 0.0, 1.0, "hola");
    blank.translated_text = "   ".to_string();
    let segments = vec![blank];
    let original = AudioBuffer::silence(1000, RATE, 1);

    let assembled = assembler(synth.clone())
        .with_voice_adapter(adapter)
        .assemble(&segments, &original, &None)
        .await
        .unwrap();

    assert!(assembled.reports[0].is_silent());
    assert_eq!(assembled.reports[0].voice, None);
    assert_eq!(synth.request_count(), 0);
    assert_eq!(classifier.call_count(), 0);
    assert_eq!(assembled.buffer.duration_ms(), 1000);
}

#[tokio::test]
async fn test_voice_conversion_length_is_remeasured() {
    let synth = Arc::new(ScriptedSynthesizer::new(&[("hola", 1000)]));
    let adapter = VoiceAdapter::new(
        Arc::new(FixedClassifier::new(Gender::Male)),
        Arc::new(LengtheningConverter { extra_ms: 500 }),
        Duration::from_secs(5),
    );
    let segments = vec![segment(0, 0.0, 2.0, "hola")];
    let original = tone(2000, RATE, 1);

    let assembled = assembler(synth)
        .with_voice_adapter(adapter)
        .assemble(&segments, &original, &None)
        .await
        .unwrap();

    assert_eq!(assembled.reports[0].voice, Some(AdaptStatus::Converted));
    assert_eq!(assembled.reports[0].kind, PlacementKind::Padded { pad_ms: 500 });
    assert_eq!(assembled.buffer.duration_ms(), 2000);
}

#[tokio::test]
async fn test_synthesized_audio_is_converted_to_track_format() {
    let synth = Arc::new(ScriptedSynthesizer::with_format(&[("hola", 1000)], 16_000, 2));
    let segments = vec![segment(0, 0.25, 1.75, "hola")];
    let original = AudioBuffer::silence(2000, RATE, 1);

    let assembled = assembler(synth).assemble(&segments, &original, &None).await.unwrap();

    assert_eq!(assembled.buffer.sample_rate(), RATE);
    assert_eq!(assembled.buffer.channels(), 1);
    assert_eq!(assembled.buffer.duration_ms(), 1750);
    assert_eq!(assembled.reports[0].kind, PlacementKind::Padded { pad_ms: 500 });
}

#[tokio::test]
async fn test_segments_are_placed_by_index() {
    let synth = Arc::new(ScriptedSynthesizer::new(&[("a", 500), ("b", 500)]));
    // порядок во входном списке не совпадает с индексами
    let segments = vec![segment(1, 2.0, 3.0, "b"), segment(0, 0.0, 1.0, "a")];
    let original = AudioBuffer::silence(3000, RATE, 1);

    let assembled = assembler(synth.clone()).assemble(&segments, &original, &None).await.unwrap();

    assert_eq!(assembled.reports[0].index, 0);
    assert_eq!(assembled.reports[1].index, 1);
    assert_eq!(assembled.reports[1].gap_ms, 1000);
    assert_eq!(*synth.requests.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn test_progress_reports_each_segment() {
    let synth = Arc::new(ScriptedSynthesizer::new(&[("a", 100), ("b", 100)]));
    let segments = vec![segment(0, 0.0, 1.0, "a"), segment(1, 1.0, 2.0, "b")];
    let original = AudioBuffer::silence(2000, RATE, 1);
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);

    assembler(synth).assemble(&segments, &original, &Some(tx)).await.unwrap();

    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update.to_string());
    }
    assert_eq!(updates, vec!["Dubbing segment 1/2", "Dubbing segment 2/2"]);
}

#[tokio::test]
async fn test_segment_files_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let synth = Arc::new(ScriptedSynthesizer::new(&[("a", 300)]));
    let segments = vec![segment(0, 0.5, 1.0, "a")];
    let original = AudioBuffer::silence(1000, RATE, 1);

    assembler(synth)
        .with_segment_dir(dir.path().to_path_buf())
        .assemble(&segments, &original, &None)
        .await
        .unwrap();

    assert!(dir.path().join("segment_0000.wav").exists());
}

#[test]
fn test_gap_before_first_segment() {
    let conformer = conformer();
    let placer = SlotPlacer::new(&conformer, RATE, 1);
    let slot = Slot::from_segment(&segment(0, 1.5, 2.5, "x"));
    let speech = SynthesisOutcome::Audio(tone(1000, RATE, 1));

    let step = place_step(0, &slot, &speech, &placer);

    assert_eq!(step.gap_ms, 1500);
    assert_eq!(step.chunks.len(), 2);
    assert_eq!(step.chunks[0].duration_ms(), 1500);
    assert!(step.chunks[0].samples().iter().all(|&s| s == 0.0));
    assert_eq!(step.cursor_ms, 2500);
}

#[test]
fn test_overlap_is_passed_through() {
    let conformer = conformer();
    let placer = SlotPlacer::new(&conformer, RATE, 1);
    let slot = Slot::from_segment(&segment(3, 2.0, 3.0, "x"));
    let speech = SynthesisOutcome::Audio(tone(500, RATE, 1));

    let step = place_step(2600, &slot, &speech, &placer);

    assert_eq!(step.gap_ms, 0);
    assert_eq!(step.chunks.len(), 1);
    assert_eq!(step.cursor_ms, 3600);
}

#[test]
fn test_slot_is_filled_exactly() {
    let conformer = conformer();
    let placer = SlotPlacer::new(&conformer, RATE, 1);
    let slot = Slot::from_segment(&segment(0, 0.0, 1.2, "x"));

    for tts_ms in [0, 1, 250, 1199, 1200, 1201, 1800, 2400, 5000] {
        let speech = SynthesisOutcome::Audio(tone(tts_ms, RATE, 1));
        let step = place_step(0, &slot, &speech, &placer);
        let frames: usize = step.chunks.iter().map(AudioBuffer::frame_count).sum();
        let expected = ms_to_frames(1200, RATE) as i64;
        assert!((frames as i64 - expected).abs() <= 1, "tts {} ms -> {} frames", tts_ms, frames);
        assert_eq!(step.cursor_ms, 1200);
    }

    // доли миллисекунды сверх слота (1200 мс = 28_800 кадров)
    for tts_frames in [28_799, 28_801, 28_811, 28_819] {
        let speech = SynthesisOutcome::Audio(tone_frames(tts_frames, RATE, 1));
        let step = place_step(0, &slot, &speech, &placer);
        let frames: usize = step.chunks.iter().map(AudioBuffer::frame_count).sum();
        assert_eq!(frames, 28_800, "tts {} frames", tts_frames);
        assert_eq!(step.cursor_ms, 1200);
    }
}

#[test]
fn test_track_length_follows_cursor_with_fractional_overruns() {
    let conformer = conformer();
    let placer = SlotPlacer::new(&conformer, RATE, 1);
    let slots = [
        Slot::from_segment(&segment(0, 0.0, 1.0, "a")),
        Slot::from_segment(&segment(1, 1.5, 2.5, "b")),
        Slot::from_segment(&segment(2, 3.0, 4.0, "c")),
    ];

    let mut track = Track::new(RATE, 1);
    let mut cursor_ms = 0;
    for slot in &slots {
        // каждая реплика длиннее слота на 11 кадров (< 0.5 мс)
        let speech = SynthesisOutcome::Audio(tone_frames(24_011, RATE, 1));
        let step = place_step(cursor_ms, slot, &speech, &placer);
        for chunk in step.chunks {
            track.push(chunk).unwrap();
        }
        cursor_ms = step.cursor_ms;
    }

    assert_eq!(cursor_ms, 4000);
    assert_eq!(track.frame_count(), ms_to_frames(4000, RATE));
}

#[test]
fn test_short_speech_is_never_stretched() {
    let conformer = conformer();
    let placer = SlotPlacer::new(&conformer, RATE, 1);
    let slot = Slot::from_segment(&segment(0, 0.0, 3.0, "x"));

    for tts_ms in [100, 1000, 2999] {
        let speech = tone(tts_ms, RATE, 1);
        let step = place_step(0, &slot, &SynthesisOutcome::Audio(speech.clone()), &placer);
        let placed = &step.chunks[0];
        let speech_frames = speech.frame_count();

        assert_eq!(&placed.samples()[..speech_frames], speech.samples());
        assert!(placed.samples()[speech_frames..].iter().all(|&s| s == 0.0));
        assert!(matches!(step.kind, PlacementKind::Padded { .. }));
    }
}

#[test]
fn test_track_accumulates_and_rejects_foreign_format() {
    let mut track = Track::new(RATE, 1);
    track.push(AudioBuffer::silence(250, RATE, 1)).unwrap();
    track.push(tone(750, RATE, 1)).unwrap();
    track.push(AudioBuffer::empty(RATE, 1)).unwrap();
    assert!(track.push(AudioBuffer::silence(100, 16_000, 1)).is_err());

    assert_eq!(track.chunk_count(), 2);
    assert_eq!(track.duration_ms(), 1000);
    let buffer = track.into_buffer();
    assert_eq!(buffer.duration_ms(), 1000);
    assert_eq!(buffer.slice_ms(250, 1000), tone(750, RATE, 1));
}
