//! Background-track mixing.
//!
//! The background is decoded from whatever container the user uploaded,
//! resampled to the speech rate, looped by modular indexing to cover the
//! whole speech duration, scaled by the configured volume and added onto
//! the speech. Every output sample is clamped so the container encode can
//! never wrap around.

use crate::audio;
use crate::config::SAMPLE_RATE;
use crate::error::{Result, TtsStudioError};

/// Mix speech PCM with an encoded background track.
///
/// The output has exactly as many samples as the speech input: the
/// background loops to fill, the speech is never trimmed or looped.
/// `volume` is clamped to [0.0, 1.0].
pub fn mix_with_background(speech_pcm: &[u8], background: &[u8], volume: f32) -> Result<Vec<u8>> {
    let speech = audio::pcm_bytes_to_f32(speech_pcm);

    let (bg_samples, bg_rate) = audio::decode_audio_bytes(background)?;
    let bg_samples = audio::resample(&bg_samples, bg_rate, SAMPLE_RATE)?;
    if bg_samples.is_empty() {
        return Err(TtsStudioError::AudioProcessing(
            "background track decoded to zero samples".to_string(),
        ));
    }

    log::info!(
        "mixing {} speech samples with a {}-sample background loop at volume {:.2}",
        speech.len(),
        bg_samples.len(),
        volume
    );

    let mixed = mix_samples(&speech, &bg_samples, volume);
    Ok(audio::f32_to_pcm_bytes(&mixed))
}

/// Additive mix with clipping protection.
pub(crate) fn mix_samples(speech: &[f32], background: &[f32], volume: f32) -> Vec<f32> {
    let volume = volume.clamp(0.0, 1.0);
    let bg_len = background.len();

    speech
        .iter()
        .enumerate()
        .map(|(i, &sample)| (sample + background[i % bg_len] * volume).clamp(-1.0, 1.0))
        .collect()
}
