//! PCM primitives: sample conversion, chunk assembly, decoding of
//! arbitrary audio bytes and sample-rate conversion.

pub mod encoder;
pub mod mixer;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{Result, TtsStudioError};

/// Convert raw little-endian 16-bit mono PCM bytes into f32 samples in
/// [-1.0, 1.0].
pub fn pcm_bytes_to_f32(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32768.0)
        .collect()
}

/// Convert f32 samples back into little-endian 16-bit PCM bytes.
///
/// Samples are clamped to [-1.0, 1.0] first; negative and positive halves
/// scale asymmetrically to cover the full i16 range without overflow.
pub fn f32_to_pcm_bytes(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let sample = sample.clamp(-1.0, 1.0);
        let value = if sample < 0.0 {
            (sample * 32768.0) as i16
        } else {
            (sample * 32767.0) as i16
        };
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Concatenate per-chunk PCM byte sequences in chunk order.
///
/// All chunks share the synthesizer's fixed format (16-bit mono at one
/// sample rate), so assembly is pure byte concatenation; the total length
/// is the sum of the chunk lengths.
pub fn assemble_pcm_chunks(chunks: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = chunks.iter().map(Vec::len).sum();
    let mut assembled = Vec::with_capacity(total);
    for chunk in chunks {
        assembled.extend_from_slice(chunk);
    }
    assembled
}

/// Decode arbitrary encoded audio bytes (WAV, MP3, AAC, ...) into mono f32
/// samples and their sample rate. Multichannel sources are folded to mono
/// by averaging.
pub fn decode_audio_bytes(data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let cursor = std::io::Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let format_opts = FormatOptions {
        enable_gapless: false,
        ..Default::default()
    };

    let probed = symphonia::default::get_probe()
        .format(&Hint::new(), mss, &format_opts, &MetadataOptions::default())
        .map_err(|e| TtsStudioError::AudioProcessing(format!("unrecognized audio format: {e}")))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| TtsStudioError::AudioProcessing("no audio track found".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| TtsStudioError::AudioProcessing(format!("failed to create decoder: {e}")))?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(44_100);

    let mut pcm_data = Vec::new();

    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let channels = spec.channels.count();

                let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                sample_buf.copy_planar_ref(decoded);
                let samples = sample_buf.samples();

                if channels > 1 {
                    let frames_per_channel = samples.len() / channels;
                    for frame in 0..frames_per_channel {
                        let mut sum = 0.0;
                        for ch in 0..channels {
                            sum += samples[ch * frames_per_channel + frame];
                        }
                        pcm_data.push(sum / channels as f32);
                    }
                } else {
                    pcm_data.extend_from_slice(samples);
                }
            }
            Err(e) => {
                // Skip the bad packet and keep decoding.
                log::warn!("failed to decode audio packet: {e}");
                continue;
            }
        }
    }

    if pcm_data.is_empty() {
        return Err(TtsStudioError::AudioProcessing(
            "audio decoded to zero samples".to_string(),
        ));
    }

    log::info!(
        "decoded {} samples at {} Hz from {} input bytes",
        pcm_data.len(),
        sample_rate,
        data.len()
    );
    Ok((pcm_data, sample_rate))
}

/// Resample mono f32 samples from one rate to another with a windowed-sinc
/// resampler. Returns the input untouched when the rates already match.
pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let block_size = 1024;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, block_size, 1)
        .map_err(|e| TtsStudioError::AudioProcessing(format!("resampler init failed: {e}")))?;

    let expected = (input.len() as f64 * ratio).round() as usize;
    let mut output = Vec::with_capacity(expected + block_size);

    let mut idx = 0;
    while idx < input.len() {
        let end = (idx + block_size).min(input.len());
        let mut block = input[idx..end].to_vec();
        // The resampler wants full blocks; zero-pad the final one.
        block.resize(block_size, 0.0);

        let frames = vec![block];
        let processed = resampler
            .process(&frames, None)
            .map_err(|e| TtsStudioError::AudioProcessing(format!("resampling failed: {e}")))?;
        output.extend_from_slice(&processed[0]);

        idx = end;
    }

    if output.len() > expected {
        output.truncate(expected);
    }
    Ok(output)
}
