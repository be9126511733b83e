//! # Resampling
//!
//! Приведение буферов к формату дорожки: пересведение каналов и смена
//! частоты дискретизации через `rubato` (Sinc-интерполяция).

use log::debug;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::audio::buffer::AudioBuffer;
use crate::error::{DubError, Result};

const CHUNK_SIZE: usize = 1024;

/// Приводит буфер к заданной частоте и числу каналов
pub fn convert_format(buffer: &AudioBuffer, sample_rate: u32, channels: u16) -> Result<AudioBuffer> {
    let remixed = remix_channels(buffer, channels);
    if remixed.sample_rate() == sample_rate {
        return Ok(remixed);
    }
    debug!(
        "Resampling {} frames from {} Hz to {} Hz",
        remixed.frame_count(),
        remixed.sample_rate(),
        sample_rate
    );
    let ratio = sample_rate as f64 / remixed.sample_rate() as f64;
    let planar = resample_planar(&remixed.to_planar(), ratio)?;
    Ok(AudioBuffer::from_planar(&planar, sample_rate))
}

/// Меняет число кадров в `ratio` раз, не меняя заявленной частоты.
///
/// При воспроизведении на исходной частоте это меняет и длительность,
/// и высоту тона.
pub fn resample_by_ratio(buffer: &AudioBuffer, ratio: f64) -> Result<AudioBuffer> {
    if !(ratio.is_finite() && ratio > 0.0) {
        return Err(DubError::Resampling(format!("Invalid resample ratio {}", ratio)));
    }
    let planar = resample_planar(&buffer.to_planar(), ratio)?;
    Ok(AudioBuffer::from_planar(&planar, buffer.sample_rate()))
}

fn remix_channels(buffer: &AudioBuffer, channels: u16) -> AudioBuffer {
    let channels = channels.max(1);
    if buffer.channels() == channels {
        return buffer.clone();
    }
    let mono = buffer.to_mono();
    let mut samples = Vec::with_capacity(mono.len() * channels as usize);
    for s in mono {
        for _ in 0..channels {
            samples.push(s);
        }
    }
    AudioBuffer::new(samples, buffer.sample_rate(), channels)
}

fn resample_planar(planar: &[Vec<f32>], ratio: f64) -> Result<Vec<Vec<f32>>> {
    let channels = planar.len();
    let frames = planar.first().map(Vec::len).unwrap_or(0);
    if channels == 0 || frames == 0 {
        return Ok(vec![Vec::new(); channels]);
    }

    let expected = (frames as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_SIZE, channels)
        .map_err(|e| DubError::Resampling(format!("Failed to create resampler: {}", e)))?;

    let delay = resampler.output_delay();
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];

    let mut pos = 0;
    while frames - pos >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let chunk: Vec<&[f32]> = planar.iter().map(|c| &c[pos..pos + needed]).collect();
        let processed = resampler
            .process(&chunk, None)
            .map_err(|e| DubError::Resampling(e.to_string()))?;
        append_planar(&mut output, processed);
        pos += needed;
    }

    if pos < frames {
        let chunk: Vec<&[f32]> = planar.iter().map(|c| &c[pos..]).collect();
        let processed = resampler
            .process_partial(Some(chunk.as_slice()), None)
            .map_err(|e| DubError::Resampling(e.to_string()))?;
        append_planar(&mut output, processed);
    }

    // Выталкиваем задержку фильтра
    while output[0].len() < expected + delay {
        let processed = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| DubError::Resampling(e.to_string()))?;
        if processed[0].is_empty() {
            break;
        }
        append_planar(&mut output, processed);
    }

    for channel in output.iter_mut() {
        let skip = delay.min(channel.len());
        channel.drain(..skip);
        channel.resize(expected, 0.0);
    }

    Ok(output)
}

fn append_planar(output: &mut [Vec<f32>], processed: Vec<Vec<f32>>) {
    for (dst, src) in output.iter_mut().zip(processed) {
        dst.extend(src);
    }
}
