//! # Audio Format Handling
//!
//! Модуль для кодирования и декодирования аудио.
//!
//! ## Основные возможности
//!
//! - Чтение WAV через `hound` (16/24/32-бит целые и 32-бит float)
//! - Декодирование MP3/AAC/WAV из памяти через `symphonia` (ответы TTS)
//! - Запись PCM 16-бит WAV, который понимают ffmpeg и ffprobe
//!
//! Каналы сохраняются как есть; сведением формата к формату дорожки
//! занимается модуль `resample`.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::buffer::AudioBuffer;
use crate::error::{DubError, Result};

/// Читает WAV-файл целиком.
///
/// # Ошибки
///
/// * `DubError::WavDecoding` - файл не открывается или поврежден
/// * `DubError::AudioProcessing` - неподдерживаемая разрядность
pub fn decode_wav_file<P: AsRef<Path>>(file_path: P) -> Result<AudioBuffer> {
    let reader = WavReader::open(file_path.as_ref()).map_err(DubError::WavDecoding)?;
    read_wav(reader)
}

fn read_wav<R: std::io::Read>(mut reader: WavReader<R>) -> Result<AudioBuffer> {
    let spec = reader.spec();

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0).map_err(DubError::WavDecoding))
            .collect::<Result<Vec<f32>>>()?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0).map_err(DubError::WavDecoding))
            .collect::<Result<Vec<f32>>>()?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2_147_483_648.0).map_err(DubError::WavDecoding))
            .collect::<Result<Vec<f32>>>()?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map_err(DubError::WavDecoding))
            .collect::<Result<Vec<f32>>>()?,
        _ => {
            return Err(DubError::AudioProcessing(format!(
                "Unsupported WAV format: {:?}, {} bits",
                spec.sample_format, spec.bits_per_sample
            )));
        }
    };

    Ok(AudioBuffer::new(samples, spec.sample_rate, spec.channels))
}

/// Записывает буфер в WAV (PCM 16-бит)
pub fn encode_wav<P: AsRef<Path>>(buffer: &AudioBuffer, output_path: P) -> Result<()> {
    let spec = WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(output_path.as_ref(), spec)?;
    for &sample in buffer.samples() {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;

    debug!(
        "Saved WAV file: {} ({} frames, {} Hz, {} ch)",
        output_path.as_ref().display(),
        buffer.frame_count(),
        buffer.sample_rate(),
        buffer.channels()
    );
    Ok(())
}

/// Декодирует сжатое аудио (MP3, AAC, WAV) из памяти.
///
/// `extension` служит подсказкой для определения формата.
/// Поврежденные пакеты пропускаются с предупреждением.
pub fn decode_audio_bytes(data: &[u8], extension: Option<&str>) -> Result<AudioBuffer> {
    if data.is_empty() {
        return Err(DubError::AudioProcessing("Empty audio data".to_string()));
    }

    let cursor = Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let format_opts = FormatOptions {
        enable_gapless: true,
        ..Default::default()
    };

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &MetadataOptions::default())
        .map_err(|e| DubError::AudioProcessing(format!("Failed to probe audio format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DubError::AudioProcessing("No audio track found".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DubError::AudioProcessing(format!("Failed to create decoder: {}", e)))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(DubError::AudioProcessing(format!("Failed to read packet: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                sample_buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(sample_buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => {
                return Err(DubError::AudioProcessing(format!("Decoding failed: {}", e)));
            }
        }
    }

    if sample_rate == 0 || channels == 0 {
        return Err(DubError::AudioProcessing(
            "Decoded stream has no sample rate or channel layout".to_string(),
        ));
    }

    debug!(
        "Decoded {} samples at {} Hz, {} ch",
        samples.len(),
        sample_rate,
        channels
    );
    Ok(AudioBuffer::new(samples, sample_rate, channels))
}

/// Декодирует аудиофайл: WAV читается через `hound`, остальное через `symphonia`
pub fn decode_audio_file<P: AsRef<Path>>(file_path: P) -> Result<AudioBuffer> {
    let path = file_path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("wav") => decode_wav_file(path),
        other => {
            let data = std::fs::read(path)?;
            decode_audio_bytes(&data, other)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sine(freq: f32, ms: u64, sample_rate: u32) -> AudioBuffer {
        let frames = crate::audio::buffer::ms_to_frames(ms, sample_rate);
        let samples = (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect();
        AudioBuffer::new(samples, sample_rate, 1)
    }

    #[test]
    fn test_wav_encode_decode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let buffer = sine(440.0, 100, 16_000);

        encode_wav(&buffer, &path).unwrap();
        let decoded = decode_audio_file(&path).unwrap();

        assert_eq!(decoded.sample_rate(), 16_000);
        assert_eq!(decoded.channels(), 1);
        assert_eq!(decoded.frame_count(), buffer.frame_count());
        for (a, b) in buffer.samples().iter().zip(decoded.samples()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_wav_bytes_through_symphonia() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let buffer = AudioBuffer::new(vec![0.25, -0.25].repeat(800), 8000, 2);
        encode_wav(&buffer, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let decoded = decode_audio_bytes(&bytes, Some("wav")).unwrap();
        assert_eq!(decoded.channels(), 2);
        assert_eq!(decoded.sample_rate(), 8000);
        assert_eq!(decoded.duration_ms(), 100);
    }

    #[test]
    fn test_empty_bytes_rejected() {
        assert!(decode_audio_bytes(&[], Some("mp3")).is_err());
    }

    #[test]
    fn test_missing_wav_file() {
        let dir = tempdir().unwrap();
        let result = decode_wav_file(dir.path().join("missing.wav"));
        assert!(matches!(result, Err(DubError::WavDecoding(_))));
    }
}
