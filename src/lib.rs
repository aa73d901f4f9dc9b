//! tts-studio: Vietnamese text-to-speech generation with the Gemini API.
//!
//! The pipeline turns raw text into downloadable audio: rule-based
//! normalization, optional AI refinement, chunked speech synthesis with
//! pacing and key rotation, PCM assembly, optional background-music
//! mixing and WAV/MP3 container encoding. Progress is reported through an
//! observer so a UI can show percentages and log lines.
//!
//! ```rust,ignore
//! use tts_studio::{config::VoiceConfig, TtsStudio};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let studio = TtsStudio::new(Default::default())?;
//!     let audio = studio
//!         .generate_speech("UBND tỉnh thông báo lịch nghỉ lễ 2/9.", &VoiceConfig::default(), None)
//!         .await?;
//!     std::fs::write("speech.wav", &audio.wav)?;
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod gemini;
pub mod keys;
pub mod progress;
pub mod text;

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tokio_util::sync::CancellationToken;

use crate::audio::{assemble_pcm_chunks, encoder, mixer};
use crate::config::{
    ReadingMode, TtsStudioConfig, VoiceConfig, ANALYSIS_SAFETY_DELAY_MS, DRAFT_SAFETY_DELAY_MS,
    SAMPLE_RATE, VOICE_SAMPLE_MAX_SECONDS,
};
use crate::error::{Result, TtsStudioError};
use crate::gemini::client::GeminiClient;
use crate::gemini::retry::{self, RetryPolicy};
use crate::gemini::VoiceProfile;
use crate::keys::store::{HttpKeyStore, KeyStore};
use crate::keys::KeyPool;
use crate::progress::{
    DefaultProgressReporter, ProcessStep, ProgressObserver, ProgressReporter, ProgressTracker,
};
use crate::text::{chunker, normalizer, refiner};

/// Background music uploaded by the user, in any common container.
#[derive(Debug, Clone)]
pub struct BackgroundTrack {
    pub data: Vec<u8>,
    /// Mix volume in [0.0, 1.0]
    pub volume: f32,
}

impl BackgroundTrack {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            volume: config::DEFAULT_BACKGROUND_VOLUME,
        }
    }
}

/// Result of one generation request.
#[derive(Debug, Clone)]
pub struct GeneratedAudio {
    /// Raw 16-bit mono PCM at [`SAMPLE_RATE`]
    pub pcm: Vec<u8>,
    /// WAV container around the PCM
    pub wav: Vec<u8>,
    /// MP3 encoding, or the WAV bytes when no encoder is available
    pub mp3: Vec<u8>,
    pub sample_rate: u32,
    /// How many chunks the text was synthesized in
    pub chunk_count: usize,
    /// The text that was actually spoken, after normalization/refinement
    pub spoken_text: String,
}

/// The studio facade driving the generation pipeline.
pub struct TtsStudio {
    config: TtsStudioConfig,
    client: GeminiClient,
    store: Arc<dyn KeyStore>,
    progress_tracker: Option<ProgressTracker>,
    cancel: CancellationToken,
}

impl TtsStudio {
    pub fn new(config: TtsStudioConfig) -> Result<Self> {
        let store = Arc::new(HttpKeyStore::new(config.store_base_url.clone()));
        Self::with_key_store(config, store)
    }

    /// Studio over a custom key store implementation.
    pub fn with_key_store(config: TtsStudioConfig, store: Arc<dyn KeyStore>) -> Result<Self> {
        Ok(Self {
            config,
            client: GeminiClient::new()?,
            store,
            progress_tracker: None,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_progress_reporter(
        config: TtsStudioConfig,
        reporter: Box<dyn ProgressReporter>,
    ) -> Result<Self> {
        let mut studio = Self::new(config)?;
        studio.progress_tracker = Some(ProgressTracker::with_reporter(reporter));
        Ok(studio)
    }

    pub fn set_progress_reporter(&mut self, reporter: Box<dyn ProgressReporter>) {
        match &mut self.progress_tracker {
            Some(tracker) => tracker.set_reporter(reporter),
            None => self.progress_tracker = Some(ProgressTracker::with_reporter(reporter)),
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> Option<usize> {
        match &mut self.progress_tracker {
            Some(tracker) => tracker.add_observer(observer),
            None => {
                let mut reporter = DefaultProgressReporter::new();
                let id = reporter.add_observer(observer);
                self.progress_tracker =
                    Some(ProgressTracker::with_reporter(Box::new(reporter)));
                Some(id)
            }
        }
    }

    /// Token the caller can use to cancel in-flight generation. Cancelling
    /// stops before the next chunk dispatch or pacing delay; PCM already
    /// assembled is simply dropped.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn load_key_pool(&self) -> KeyPool {
        let keys = match self.store.load_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                log::warn!("failed to load managed keys ({e}), using fallback key only");
                Vec::new()
            }
        };
        KeyPool::new(
            keys,
            self.config.user_id.clone(),
            self.config.fallback_api_key.clone(),
        )
    }

    /// Generate speech for `raw_text`, optionally mixed with a background
    /// track, and return PCM plus WAV and best-effort MP3 containers.
    ///
    /// Chunks are synthesized strictly sequentially with pacing delays in
    /// between; a chunk that still fails after retries aborts the whole
    /// request with a classified error and no partial audio.
    pub async fn generate_speech(
        &self,
        raw_text: &str,
        voice: &VoiceConfig,
        background: Option<&BackgroundTrack>,
    ) -> Result<GeneratedAudio> {
        let trimmed = raw_text.trim();
        if trimmed.is_empty() {
            return Err(TtsStudioError::Configuration(
                "no text to synthesize".to_string(),
            ));
        }

        log::info!("starting speech generation for {} chars", trimmed.chars().count());
        let tracker = self.progress_tracker.as_ref();
        let policy = RetryPolicy::from_config(&self.config);

        // 1. Rule-based normalization
        if let Some(t) = tracker {
            t.set_step(ProcessStep::TextNormalization);
        }
        let normalized = normalizer::normalize(trimmed);
        if let Some(t) = tracker {
            t.update_step_progress(100.0, None);
        }

        let mut pool = self.load_key_pool().await;
        if pool.is_empty() {
            return Err(TtsStudioError::NoApiKey);
        }

        // 2. Best-effort AI refinement for long/administrative text
        if let Some(t) = tracker {
            t.set_step(ProcessStep::TextRefinement);
        }
        let spoken = if refiner::needs_refinement(&normalized, self.config.long_text_threshold) {
            let prompt = refiner::build_refine_prompt(&normalized);
            let client = &self.client;
            let refined = retry::run_with_retry(
                &mut pool,
                self.store.as_ref(),
                &policy,
                &self.cancel,
                |key| {
                    let prompt = prompt.clone();
                    async move { client.generate_text(&prompt, &key).await }
                },
            )
            .await;

            match refined {
                Ok(candidate) => refiner::accept_refinement(&normalized, &candidate),
                Err(TtsStudioError::Cancelled) => return Err(TtsStudioError::Cancelled),
                Err(e) => {
                    log::warn!("text refinement failed ({e}), using normalized text");
                    normalized.clone()
                }
            }
        } else {
            normalized.clone()
        };
        if let Some(t) = tracker {
            t.update_step_progress(100.0, None);
        }

        // 3. Chunking
        let chunks = chunker::split_into_chunks(
            &spoken,
            self.config.single_segment_threshold,
            self.config.chunk_char_limit,
        );
        if chunks.is_empty() {
            return Err(TtsStudioError::Configuration(
                "text is empty after normalization".to_string(),
            ));
        }
        if chunks.len() > 1 {
            if let Some(t) = tracker {
                t.notify(format!(
                    "Đã chia nhỏ văn bản thành {} đoạn để xử lý an toàn...",
                    chunks.len()
                ));
            }
        }

        // 4. Sequential chunk synthesis with pacing and key rotation
        if let Some(t) = tracker {
            t.set_step(ProcessStep::SpeechGeneration);
        }
        let total_chars = spoken.chars().count();
        let pacing = retry::inter_chunk_delay(total_chars);
        let total = chunks.len();
        let mut pcm_chunks: Vec<Vec<u8>> = Vec::with_capacity(total);

        for (i, chunk) in chunks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(TtsStudioError::Cancelled);
            }

            if i > 0 {
                if let Some(t) = tracker {
                    t.notify(format!(
                        "Đang tạo độ trễ {:.1} giây giữa các đoạn ({}/{})...",
                        pacing.as_secs_f32(),
                        i + 1,
                        total
                    ));
                }
                retry::wait_or_cancel(&self.cancel, pacing).await?;
            }

            let client = &self.client;
            let pcm = retry::run_with_retry(
                &mut pool,
                self.store.as_ref(),
                &policy,
                &self.cancel,
                |key| async move { client.synthesize(chunk, voice, &key).await },
            )
            .await
            .map_err(|e| {
                log::error!("chunk {}/{} failed: {}", i + 1, total, e);
                e
            })?;

            log::info!("chunk {}/{} synthesized ({} PCM bytes)", i + 1, total, pcm.len());
            pcm_chunks.push(pcm);

            if let Some(t) = tracker {
                let percent = (i + 1) as f32 / total as f32 * 100.0;
                t.update_step_progress(
                    percent,
                    Some(format!("Tạo giọng nói: {}/{} đoạn", i + 1, total)),
                );
            }
        }

        // 5. Assembly in chunk order
        let pcm = assemble_pcm_chunks(&pcm_chunks);

        // 6. Optional background mixing; decode failure keeps the speech
        let pcm = match background {
            Some(track) => {
                if let Some(t) = tracker {
                    t.set_step(ProcessStep::AudioMixing);
                    t.notify("Đang trộn nhạc nền...");
                }
                match mixer::mix_with_background(&pcm, &track.data, track.volume) {
                    Ok(mixed) => mixed,
                    Err(e) => {
                        log::warn!("background mixing failed ({e}), keeping unmixed speech");
                        pcm
                    }
                }
            }
            None => pcm,
        };

        // 7. Container encoding
        if let Some(t) = tracker {
            t.set_step(ProcessStep::Encoding);
        }
        let wav = encoder::pcm_to_wav(&pcm, SAMPLE_RATE)?;
        let mp3 = encoder::pcm_to_mp3(&pcm, SAMPLE_RATE)?;

        // 8. Usage reporting: characters consumed by this request
        if let Some(user_id) = &self.config.user_id {
            if let Err(e) = self.store.record_usage(user_id, trimmed.chars().count()).await {
                log::warn!("usage report failed: {e}");
            }
        }

        if let Some(t) = tracker {
            t.complete();
        }
        log::info!("speech generation finished: {} PCM bytes in {} chunks", pcm.len(), total);

        Ok(GeneratedAudio {
            pcm,
            wav,
            mp3,
            sample_rate: SAMPLE_RATE,
            chunk_count: total,
            spoken_text: spoken,
        })
    }

    /// Draft content for a reading mode from a short user request.
    pub async fn draft_content(&self, request: &str, mode: ReadingMode) -> Result<String> {
        // Safety delay keeps bursts of drafting clicks under the rate limit.
        retry::wait_or_cancel(
            &self.cancel,
            std::time::Duration::from_millis(DRAFT_SAFETY_DELAY_MS),
        )
        .await?;

        let prompt = format!("{}\n\nYêu cầu: {}", mode.prompt(), request);
        let mut pool = self.load_key_pool().await;
        if pool.is_empty() {
            return Err(TtsStudioError::NoApiKey);
        }

        let policy = RetryPolicy::from_config(&self.config);
        let client = &self.client;
        retry::run_with_retry(
            &mut pool,
            self.store.as_ref(),
            &policy,
            &self.cancel,
            |key| {
                let prompt = prompt.clone();
                async move { client.generate_text(&prompt, &key).await }
            },
        )
        .await
    }

    /// Analyze an uploaded voice sample into a structured profile.
    ///
    /// At most the first 20 seconds of the sample are submitted.
    pub async fn analyze_voice_sample(&self, audio_bytes: &[u8]) -> Result<VoiceProfile> {
        let (sample_base64, duration) = prepare_voice_sample(audio_bytes)?;
        log::info!("analyzing a {duration:.1}s voice sample");

        retry::wait_or_cancel(
            &self.cancel,
            std::time::Duration::from_millis(ANALYSIS_SAFETY_DELAY_MS),
        )
        .await?;

        let mut pool = self.load_key_pool().await;
        if pool.is_empty() {
            return Err(TtsStudioError::NoApiKey);
        }

        let policy = RetryPolicy::from_config(&self.config);
        let client = &self.client;
        retry::run_with_retry(
            &mut pool,
            self.store.as_ref(),
            &policy,
            &self.cancel,
            |key| {
                let sample = sample_base64.clone();
                async move { client.analyze_voice(&sample, &key).await }
            },
        )
        .await
    }

    /// Whether a contributed API key is accepted by the generative API.
    pub async fn validate_api_key(&self, api_key: &str) -> bool {
        self.client.validate_api_key(api_key).await
    }
}

/// Decode an uploaded sample, keep at most the first 20 seconds, and
/// return it as base64-encoded WAV plus the kept duration in seconds.
fn prepare_voice_sample(audio_bytes: &[u8]) -> Result<(String, f32)> {
    let (samples, sample_rate) = audio::decode_audio_bytes(audio_bytes)?;
    let max_samples = (VOICE_SAMPLE_MAX_SECONDS * sample_rate as f32) as usize;
    let kept = &samples[..samples.len().min(max_samples)];

    let wav = encoder::pcm_to_wav(&audio::f32_to_pcm_bytes(kept), sample_rate)?;
    let duration = kept.len() as f32 / sample_rate as f32;
    Ok((BASE64.encode(&wav), duration))
}

/// One-call convenience API: synthesize `text` with a prebuilt voice and a
/// single API key, no store and no background track.
pub async fn text_to_speech(text: &str, voice_name: &str, api_key: &str) -> Result<GeneratedAudio> {
    let config = TtsStudioConfig {
        fallback_api_key: api_key.to_string(),
        ..TtsStudioConfig::default()
    };
    let voice = VoiceConfig {
        voice_name: voice_name.to_string(),
        ..VoiceConfig::default()
    };

    let studio = TtsStudio::new(config)?;
    studio.generate_speech(text, &voice, None).await
}

/// Same as [`text_to_speech`], with progress reporting.
pub async fn text_to_speech_with_progress(
    text: &str,
    voice_name: &str,
    api_key: &str,
    reporter: Box<dyn ProgressReporter>,
) -> Result<GeneratedAudio> {
    let config = TtsStudioConfig {
        fallback_api_key: api_key.to_string(),
        ..TtsStudioConfig::default()
    };
    let voice = VoiceConfig {
        voice_name: voice_name.to_string(),
        ..VoiceConfig::default()
    };

    let studio = TtsStudio::with_progress_reporter(config, reporter)?;
    studio.generate_speech(text, &voice, None).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::f32_to_pcm_bytes;

    #[test]
    fn test_voice_sample_is_trimmed_to_twenty_seconds() {
        // 21 s of silence at a small rate keeps the fixture light.
        let sample_rate = 2_000u32;
        let samples = vec![0.0f32; (21 * sample_rate) as usize];
        let wav = encoder::pcm_to_wav(&f32_to_pcm_bytes(&samples), sample_rate).unwrap();

        let (encoded, duration) = prepare_voice_sample(&wav).unwrap();
        assert!((duration - 20.0).abs() < 0.01, "kept {duration}s");
        assert!(!encoded.is_empty());

        let decoded = BASE64.decode(encoded).unwrap();
        assert_eq!(&decoded[0..4], b"RIFF");
    }

    #[test]
    fn test_short_voice_sample_is_kept_whole() {
        let sample_rate = 2_000u32;
        let samples = vec![0.0f32; (3 * sample_rate) as usize];
        let wav = encoder::pcm_to_wav(&f32_to_pcm_bytes(&samples), sample_rate).unwrap();

        let (_, duration) = prepare_voice_sample(&wav).unwrap();
        assert!((duration - 3.0).abs() < 0.01);
    }
}
