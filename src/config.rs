//! Configuration types for the tts-studio library.
//!
//! Holds the generation settings supplied by the UI (voice, reading mode,
//! background volume) and the calibrated pipeline constants. The constants
//! are tunable; the defaults come from the latest calibration of the
//! production pipeline.

use serde::{Deserialize, Serialize};

/// Sample rate of the PCM stream produced by the speech API (Hz).
pub const SAMPLE_RATE: u32 = 24_000;

/// Texts at or above this length (in characters) go through the AI
/// refinement pass before synthesis.
pub const LONG_TEXT_THRESHOLD: usize = 500;

/// Texts up to this length (in characters) are synthesized as a single
/// segment to keep one continuous voice timbre.
pub const SINGLE_SEGMENT_THRESHOLD: usize = 4_000;

/// Character budget per chunk on the multi-chunk path.
pub const CHUNK_CHAR_LIMIT: usize = 600;

/// Bounded retry count per chunk or text-generation call.
pub const MAX_RETRIES: u32 = 3;

/// Wait between retry attempts, in milliseconds.
pub const RETRY_DELAY_MS: u64 = 5_000;

/// Base pacing delay between consecutive chunk calls, in milliseconds.
pub const PACING_BASE_MS: u64 = 1_200;

/// Upper bound of the length-scaled pacing delay, in milliseconds.
pub const PACING_MAX_MS: u64 = 3_000;

/// Safety delay before a content-drafting call, in milliseconds.
pub const DRAFT_SAFETY_DELAY_MS: u64 = 2_000;

/// Safety delay before a voice-analysis call, in milliseconds.
pub const ANALYSIS_SAFETY_DELAY_MS: u64 = 3_000;

/// Longest slice of an uploaded voice sample submitted for analysis, seconds.
pub const VOICE_SAMPLE_MAX_SECONDS: f32 = 20.0;

/// Default mix volume for an uploaded background track.
pub const DEFAULT_BACKGROUND_VOLUME: f32 = 0.3;

/// Prebuilt Gemini voices exposed by the studio.
pub const GEMINI_VOICES: &[&str] = &["Zephyr", "Puck", "Charon", "Kore", "Fenrir"];

/// TTS provider behind a voice configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TtsProvider {
    /// Gemini native speech generation
    Gemini,
}

impl Default for TtsProvider {
    fn default() -> Self {
        Self::Gemini
    }
}

/// Emotional register requested for a reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum VoiceEmotion {
    Neutral,
    Happy,
    Sad,
    Angry,
    Serious,
    Emotional,
    Whisper,
}

impl Default for VoiceEmotion {
    fn default() -> Self {
        Self::Neutral
    }
}

impl VoiceEmotion {
    /// Reading-style instruction for this emotion, woven into the prompt
    /// that precedes the synthesized text. Empty for the neutral register.
    pub fn style_instruction(&self) -> &'static str {
        match self {
            Self::Neutral => "",
            Self::Happy => "Đọc với giọng vui tươi, hào hứng.",
            Self::Sad => "Đọc với giọng buồn, trầm lắng.",
            Self::Angry => "Đọc với giọng gay gắt, dứt khoát.",
            Self::Serious => "Đọc với giọng nghiêm túc, trang trọng.",
            Self::Emotional => "Đọc với giọng truyền cảm, da diết.",
            Self::Whisper => "Đọc với giọng thì thầm, nhẹ nhàng.",
        }
    }
}

/// Reference to a custom voice built from an analyzed sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClonedVoiceRef {
    /// Identifier of the cloned voice record
    pub id: String,
    /// Display name
    pub name: String,
    /// Detailed reading-style description produced by voice analysis
    pub description: String,
}

/// Voice settings for one generation request.
///
/// Immutable for the duration of a call; every chunk of a request is
/// synthesized with the same `voice_name` so the timbre never shifts
/// mid-audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    /// Provider backing this voice
    #[serde(default)]
    pub provider: TtsProvider,
    /// Prebuilt voice identifier (see [`GEMINI_VOICES`])
    pub voice_name: String,
    /// Speaking speed multiplier (1.0 = natural)
    pub speed: f32,
    /// Pitch shift request (0.0 = natural)
    pub pitch: f32,
    /// Emotional register
    #[serde(default)]
    pub emotion: VoiceEmotion,
    /// Custom voice reference, when reading with a cloned voice
    #[serde(default)]
    pub cloned_voice: Option<ClonedVoiceRef>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            provider: TtsProvider::Gemini,
            voice_name: "Kore".to_string(),
            speed: 1.0,
            pitch: 0.0,
            emotion: VoiceEmotion::Neutral,
            cloned_voice: None,
        }
    }
}

/// Content type being drafted, with its drafting instruction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadingMode {
    News,
    Story,
    Poetry,
    Prose,
    Advertisement,
    Condolence,
    Wedding,
    Speech,
    MovieReview,
}

impl ReadingMode {
    /// Drafting instruction prepended to the user's request.
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::News => "Viết một bản tin thời sự ngắn gọn, khách quan và chuyên nghiệp về: ",
            Self::Story => "Viết một câu chuyện ngắn truyền cảm hứng về chủ đề: ",
            Self::Poetry => "Sáng tác một bài thơ lục bát hoặc thơ tự do về chủ đề: ",
            Self::Prose => "Viết một đoạn văn tản văn sâu sắc về chủ đề: ",
            Self::Advertisement => {
                "Viết kịch bản quảng cáo thu hút, hào hứng, kêu gọi mua hàng cho: "
            }
            Self::Condolence => "Viết một lời chia buồn chân thành, trang trọng cho: ",
            Self::Wedding => "Viết một bài phát biểu dẫn chương trình đám cưới lãng mạn cho: ",
            Self::Speech => "Viết một bài diễn thuyết hùng hồn về chủ đề: ",
            Self::MovieReview => "Viết một kịch bản review phim chuyên nghiệp cho: ",
        }
    }
}

/// Library configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsStudioConfig {
    /// Base URL of the key-value persistence service
    pub store_base_url: String,
    /// Identifier of the requesting user, for dedicated-key lookup and
    /// usage reporting. `None` runs unauthenticated on shared keys only.
    pub user_id: Option<String>,
    /// Process-level fallback API key, used when no managed key is eligible
    pub fallback_api_key: String,
    /// Maximum text length synthesized as a single segment (characters)
    pub single_segment_threshold: usize,
    /// Character budget per chunk on the multi-chunk path
    pub chunk_char_limit: usize,
    /// Text length at which the AI refinement pass kicks in (characters)
    pub long_text_threshold: usize,
    /// Retries per chunk or text-generation call
    pub max_retries: u32,
    /// Wait between retry attempts (milliseconds)
    pub retry_delay_ms: u64,
}

impl Default for TtsStudioConfig {
    fn default() -> Self {
        Self {
            store_base_url: "http://localhost:3000".to_string(),
            user_id: None,
            fallback_api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
            single_segment_threshold: SINGLE_SEGMENT_THRESHOLD,
            chunk_char_limit: CHUNK_CHAR_LIMIT,
            long_text_threshold: LONG_TEXT_THRESHOLD,
            max_retries: MAX_RETRIES,
            retry_delay_ms: RETRY_DELAY_MS,
        }
    }
}
