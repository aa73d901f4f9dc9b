//! Container encoding for the final audio.
//!
//! WAV framing always works: a 44-byte canonical header in front of the
//! raw PCM. MP3 is best-effort through a local ffmpeg; when ffmpeg is
//! missing or fails, the WAV bytes are returned instead so the caller
//! always gets a playable download.

use std::io::Cursor;
use std::process::Command;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::{Result, TtsStudioError};

/// MP3 bitrate handed to the encoder.
const MP3_BITRATE: &str = "128k";

/// Wrap raw 16-bit mono PCM into a WAV container.
///
/// The output is the canonical 44-byte header (PCM format 1, one channel,
/// 16 bits per sample) followed by the data, so its total size is always
/// `44 + pcm.len()`.
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for chunk in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Encode raw PCM as MP3, falling back to the WAV container when no
/// encoder is available. Never fails because of a missing encoder.
pub fn pcm_to_mp3(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    match encode_mp3_with_ffmpeg(pcm, sample_rate) {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            log::warn!("MP3 encoding unavailable ({e}), falling back to WAV container");
            pcm_to_wav(pcm, sample_rate)
        }
    }
}

fn encode_mp3_with_ffmpeg(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    which::which("ffmpeg")
        .map_err(|_| TtsStudioError::AudioProcessing("ffmpeg not found in PATH".to_string()))?;

    let dir = tempfile::tempdir()?;
    let wav_path = dir.path().join("speech.wav");
    let mp3_path = dir.path().join("speech.mp3");

    std::fs::write(&wav_path, pcm_to_wav(pcm, sample_rate)?)?;

    let status = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(&wav_path)
        .arg("-codec:a")
        .arg("libmp3lame")
        .arg("-b:a")
        .arg(MP3_BITRATE)
        .arg(&mp3_path)
        .status()?;

    if !status.success() {
        return Err(TtsStudioError::AudioProcessing(format!(
            "ffmpeg exited with status {status}"
        )));
    }

    Ok(std::fs::read(&mp3_path)?)
}
