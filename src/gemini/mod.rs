//! Integration with the Gemini generative API: text drafting/refinement,
//! speech synthesis, voice analysis, and the retry/key-rotation
//! orchestration around those calls.

pub mod client;
pub mod retry;

use serde::{Deserialize, Serialize};

/// Structured result of analyzing an uploaded voice sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceProfile {
    /// "Nam" or "Nữ"
    pub gender: String,
    /// Regional accent: "Bắc", "Trung", "Nam" or "Khác"
    pub region: String,
    /// Five-word summary of the tone
    pub tone_summary: String,
    /// Suggested Vietnamese display name for the voice
    pub suggested_name: String,
    /// Two-line reading-style description
    pub description: String,
}
