//! Error types for the tts-studio library.
//!
//! The external generative API does not guarantee a structured error shape,
//! so API failures are classified from the raw message string into the
//! categories the retry loop understands.

use thiserror::Error;

/// Errors produced by the tts-studio pipeline.
#[derive(Debug, Error)]
pub enum TtsStudioError {
    /// HTTP transport error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Quota exhausted or request throttled by the API
    #[error("quota exhausted: {0}")]
    RateLimited(String),

    /// The API reported itself overloaded or unavailable
    #[error("service overloaded: {0}")]
    ServerBusy(String),

    /// The presented credential was rejected
    #[error("invalid API key: {0}")]
    AuthFailure(String),

    /// The API refused the content itself
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// Any other API-reported failure
    #[error("API error: {0}")]
    Api(String),

    /// No usable credential at any tier of the key pool
    #[error("no usable API key available")]
    NoApiKey,

    /// Key-value store error
    #[error("key store error: {0}")]
    KeyStore(String),

    /// Audio decoding/processing error
    #[error("audio processing error: {0}")]
    AudioProcessing(String),

    /// WAV encoding error
    #[error("WAV encoding error: {0}")]
    WavEncoding(#[from] hound::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The generation was cancelled by the caller
    #[error("generation cancelled")]
    Cancelled,
}

/// Result type for the tts-studio library.
pub type Result<T> = std::result::Result<T, TtsStudioError>;

/// Maximum length of a raw message carried into an unclassified error.
const RAW_MESSAGE_LIMIT: usize = 150;

impl TtsStudioError {
    /// Classify a raw error message from the generative API.
    ///
    /// The API surfaces failures as free-form strings, so classification is
    /// substring matching on status codes and well-known phrases. Anything
    /// unrecognized becomes [`TtsStudioError::Api`] with the message
    /// truncated.
    pub fn classify_api_error(raw: &str) -> Self {
        let lower = raw.to_lowercase();

        if lower.contains("429") || lower.contains("resource exhausted") || lower.contains("quota")
        {
            return Self::RateLimited(truncate(raw));
        }
        if lower.contains("500") || lower.contains("503") || lower.contains("overloaded") {
            return Self::ServerBusy(truncate(raw));
        }
        if lower.contains("400")
            || lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
        {
            return Self::AuthFailure(truncate(raw));
        }
        if lower.contains("safety") || lower.contains("blocked") || lower.contains("prohibited") {
            return Self::ContentBlocked(truncate(raw));
        }

        Self::Api(truncate(raw))
    }

    /// Whether the retry orchestrator may retry after this error.
    ///
    /// Rate limits and transient server failures retry with pacing; auth
    /// failures retry with a different credential. Content blocks and
    /// unclassified failures never retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::ServerBusy(_) | Self::AuthFailure(_)
        )
    }

    /// Whether this error proves the presented credential itself is bad.
    ///
    /// Only confirmed auth failures invalidate a key; a rate limit says
    /// nothing about the key's validity.
    pub fn invalidates_key(&self) -> bool {
        matches!(self, Self::AuthFailure(_))
    }

    /// Short user-facing message for this failure, in the product's language.
    pub fn user_message(&self) -> String {
        match self {
            Self::RateLimited(_) => {
                "❌ HẾT HẠN MỨC (QUOTA EXHAUSTED): Tài khoản đã đạt giới hạn yêu cầu. \
                 Hệ thống sẽ tự động thử lại sau vài giây."
                    .to_string()
            }
            Self::ServerBusy(_) => {
                "⚠️ MÁY CHỦ QUÁ TẢI: Máy chủ AI đang bận. Đang thử lại...".to_string()
            }
            Self::AuthFailure(_) => {
                "❌ KEY KHÔNG HỢP LỆ: API Key đã bị từ chối. Đang chuyển sang Key khác...".to_string()
            }
            Self::ContentBlocked(_) => {
                "🚫 NỘI DUNG BỊ TỪ CHỐI: AI không thể đọc nội dung này. \
                 Vui lòng chỉnh sửa lại văn bản."
                    .to_string()
            }
            Self::NoApiKey => {
                "❌ KHÔNG CÓ API KEY: Hệ thống chưa có Key khả dụng. \
                 Vui lòng liên hệ quản trị viên."
                    .to_string()
            }
            Self::Cancelled => "Đã hủy tạo âm thanh.".to_string(),
            other => format!("❗ LỖI: {}", truncate(&other.to_string())),
        }
    }
}

fn truncate(raw: &str) -> String {
    if raw.chars().count() <= RAW_MESSAGE_LIMIT {
        raw.to_string()
    } else {
        raw.chars().take(RAW_MESSAGE_LIMIT).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_classification() {
        let err = TtsStudioError::classify_api_error("429 RESOURCE EXHAUSTED: quota exceeded");
        assert!(matches!(err, TtsStudioError::RateLimited(_)));
        assert!(err.is_retryable());
        assert!(!err.invalidates_key());
    }

    #[test]
    fn test_server_busy_classification() {
        let err = TtsStudioError::classify_api_error("503 Service Unavailable: model overloaded");
        assert!(matches!(err, TtsStudioError::ServerBusy(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_auth_failure_classification() {
        let err = TtsStudioError::classify_api_error("API key not valid. Please pass a valid key.");
        assert!(matches!(err, TtsStudioError::AuthFailure(_)));
        assert!(err.is_retryable());
        assert!(err.invalidates_key());
    }

    #[test]
    fn test_content_block_classification() {
        let err = TtsStudioError::classify_api_error("Candidate was blocked due to SAFETY");
        assert!(matches!(err, TtsStudioError::ContentBlocked(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unclassified_is_truncated() {
        let raw = "x".repeat(500);
        let err = TtsStudioError::classify_api_error(&raw);
        match err {
            TtsStudioError::Api(msg) => assert_eq!(msg.chars().count(), 150),
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn test_user_messages_are_nonempty() {
        let errors = [
            TtsStudioError::RateLimited("429".into()),
            TtsStudioError::ServerBusy("503".into()),
            TtsStudioError::AuthFailure("401".into()),
            TtsStudioError::ContentBlocked("safety".into()),
            TtsStudioError::NoApiKey,
            TtsStudioError::Cancelled,
            TtsStudioError::Api("boom".into()),
        ];
        for err in errors {
            assert!(!err.user_message().is_empty());
        }
    }
}
