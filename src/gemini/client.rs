//! HTTP client for the Gemini generative API.
//!
//! Three semantic operations are consumed: text completion (drafting and
//! refinement), speech synthesis (text in, base64 PCM out) and audio
//! analysis (base64 sample in, structured JSON out). Errors surface as
//! message strings and are classified in [`crate::error`].

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::VoiceConfig;
use crate::error::{Result, TtsStudioError};
use crate::gemini::VoiceProfile;

/// Base URL of the generative API.
pub const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used for drafting, refinement and analysis.
pub const TEXT_MODEL: &str = "gemini-3-flash-preview";

/// Model used for native speech generation.
pub const TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";

/// Request timeout. Speech responses for long chunks are slow.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[allow(dead_code)]
    mime_type: Option<String>,
    data: Option<String>,
}

/// Client for the generative API.
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Client against a different endpoint (testing, proxies).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let mut client = Self::new()?;
        client.base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(client)
    }

    async fn post_generate(
        &self,
        model: &str,
        api_key: &str,
        body: Value,
    ) -> Result<GenerateContentResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|e| format!("failed to read error body: {e}"));
            log::error!("Gemini API error (status {status}): {error_text}");
            return Err(TtsStudioError::classify_api_error(&format!(
                "{} {}",
                status.as_u16(),
                error_text
            )));
        }

        Ok(response.json().await?)
    }

    /// One text-completion round-trip.
    pub async fn generate_text(&self, prompt: &str, api_key: &str) -> Result<String> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });
        let response = self.post_generate(TEXT_MODEL, api_key, body).await?;
        extract_text(response)
    }

    /// Synthesize one chunk of text with the configured voice.
    ///
    /// Returns raw little-endian 16-bit mono PCM at 24 kHz, decoded from
    /// the base64 payload of the response.
    pub async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceConfig,
        api_key: &str,
    ) -> Result<Vec<u8>> {
        let spoken = apply_reading_style(text, voice);
        let body = json!({
            "contents": [{ "parts": [{ "text": spoken }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": voice.voice_name }
                    }
                }
            }
        });
        let response = self.post_generate(TTS_MODEL, api_key, body).await?;
        extract_audio(response)
    }

    /// Analyze a voice sample (base64 WAV) into a structured profile.
    pub async fn analyze_voice(&self, wav_base64: &str, api_key: &str) -> Result<VoiceProfile> {
        let instruction = "Hãy phân tích âm thanh này và trả về JSON: \
             gender (Nam/Nữ), \
             region (Bắc/Trung/Nam/Khác), \
             toneSummary (tóm tắt tông giọng trong 5 từ), \
             suggestedName (tên tiếng Việt phù hợp), \
             description (mô tả chi tiết 2 dòng).";

        let body = json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "data": wav_base64, "mimeType": "audio/wav" } },
                    { "text": instruction }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "gender": { "type": "STRING" },
                        "region": { "type": "STRING" },
                        "toneSummary": { "type": "STRING" },
                        "suggestedName": { "type": "STRING" },
                        "description": { "type": "STRING" }
                    },
                    "required": ["gender", "region", "toneSummary", "suggestedName", "description"]
                }
            }
        });

        let response = self.post_generate(TEXT_MODEL, api_key, body).await?;
        let text = extract_text(response)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Whether a key is accepted by the API, probed with a minimal request.
    pub async fn validate_api_key(&self, api_key: &str) -> bool {
        match self.generate_text("hi", api_key).await {
            Ok(text) => !text.trim().is_empty(),
            Err(_) => false,
        }
    }
}

/// Prefix the text with reading-style directives when the voice settings
/// ask for something beyond the neutral default. The synthesis call itself
/// only knows the prebuilt voice name; emotion, pace and cloned-voice
/// character are conveyed through the prompt.
fn apply_reading_style(text: &str, voice: &VoiceConfig) -> String {
    let mut directives: Vec<String> = Vec::new();

    if let Some(cloned) = &voice.cloned_voice {
        directives.push(format!(
            "Đọc theo phong cách giọng sau: {}.",
            cloned.description.trim().trim_end_matches('.')
        ));
    }

    let emotion = voice.emotion.style_instruction();
    if !emotion.is_empty() {
        directives.push(emotion.to_string());
    }

    if voice.speed > 1.05 {
        directives.push("Đọc với nhịp độ nhanh, dứt khoát.".to_string());
    } else if voice.speed < 0.95 {
        directives.push("Đọc chậm rãi, rõ ràng từng từ.".to_string());
    }

    if voice.pitch > 0.05 {
        directives.push("Đọc với tông giọng cao hơn bình thường.".to_string());
    } else if voice.pitch < -0.05 {
        directives.push("Đọc với tông giọng trầm hơn bình thường.".to_string());
    }

    if directives.is_empty() {
        text.to_string()
    } else {
        format!("{}\n\n{}", directives.join(" "), text)
    }
}

fn block_reason(response: &GenerateContentResponse) -> Option<String> {
    if let Some(feedback) = &response.prompt_feedback {
        if let Some(reason) = &feedback.block_reason {
            return Some(reason.clone());
        }
    }
    response.candidates.first().and_then(|c| {
        c.finish_reason
            .as_deref()
            .filter(|r| *r == "SAFETY" || *r == "PROHIBITED_CONTENT" || *r == "BLOCKLIST")
            .map(|r| r.to_string())
    })
}

pub(crate) fn extract_text(response: GenerateContentResponse) -> Result<String> {
    if let Some(reason) = block_reason(&response) {
        return Err(TtsStudioError::ContentBlocked(reason));
    }

    let text: String = response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(TtsStudioError::Api(
            "AI không phản hồi nội dung văn bản.".to_string(),
        ));
    }
    Ok(text)
}

pub(crate) fn extract_audio(response: GenerateContentResponse) -> Result<Vec<u8>> {
    if let Some(reason) = block_reason(&response) {
        return Err(TtsStudioError::ContentBlocked(reason));
    }

    let payload = response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .and_then(|content| {
            content
                .parts
                .iter()
                .find_map(|p| p.inline_data.as_ref().and_then(|d| d.data.clone()))
        })
        .ok_or_else(|| TtsStudioError::Api("AI không phản hồi dữ liệu âm thanh.".to_string()))?;

    BASE64
        .decode(payload.as_bytes())
        .map_err(|e| TtsStudioError::Api(format!("invalid base64 audio payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{VoiceEmotion, GEMINI_VOICES};

    fn parse(json: &str) -> GenerateContentResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response = parse(
            r#"{"candidates":[{"content":{"parts":[{"text":"Xin "},{"text":"chào"}]}}]}"#,
        );
        assert_eq!(extract_text(response).unwrap(), "Xin chào");
    }

    #[test]
    fn test_extract_text_empty_response_is_an_error() {
        let response = parse(r#"{"candidates":[]}"#);
        assert!(matches!(
            extract_text(response),
            Err(TtsStudioError::Api(_))
        ));
    }

    #[test]
    fn test_safety_block_is_classified() {
        let response = parse(
            r#"{"candidates":[{"content":{"parts":[]},"finishReason":"SAFETY"}]}"#,
        );
        assert!(matches!(
            extract_text(response),
            Err(TtsStudioError::ContentBlocked(_))
        ));
    }

    #[test]
    fn test_prompt_feedback_block_is_classified() {
        let response = parse(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);
        assert!(matches!(
            extract_audio(response),
            Err(TtsStudioError::ContentBlocked(_))
        ));
    }

    #[test]
    fn test_extract_audio_decodes_base64() {
        let payload = BASE64.encode([1u8, 2, 3, 4]);
        let json = format!(
            r#"{{"candidates":[{{"content":{{"parts":[{{"inlineData":{{"mimeType":"audio/pcm","data":"{payload}"}}}}]}}}}]}}"#
        );
        let response = parse(&json);
        assert_eq!(extract_audio(response).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_extract_audio_missing_payload() {
        let response = parse(r#"{"candidates":[{"content":{"parts":[{"text":"no audio"}]}}]}"#);
        let err = extract_audio(response).unwrap_err();
        assert!(matches!(err, TtsStudioError::Api(_)));
        assert!(err.to_string().contains("âm thanh"));
    }

    #[test]
    fn test_neutral_voice_leaves_text_untouched() {
        let voice = VoiceConfig::default();
        assert_eq!(apply_reading_style("xin chào", &voice), "xin chào");
    }

    #[test]
    fn test_style_directives_are_prefixed() {
        let voice = VoiceConfig {
            emotion: VoiceEmotion::Serious,
            speed: 1.3,
            ..VoiceConfig::default()
        };
        let styled = apply_reading_style("xin chào", &voice);
        assert!(styled.starts_with("Đọc với giọng nghiêm túc"));
        assert!(styled.ends_with("xin chào"));
    }

    #[test]
    fn test_default_voice_is_a_known_prebuilt() {
        let voice = VoiceConfig::default();
        assert!(GEMINI_VOICES.contains(&voice.voice_name.as_str()));
    }
}
