//! AI-assisted text refinement.
//!
//! Long or administrative text gets one extra model pass that fixes
//! spelling, expands abbreviations the static dictionary misses and adds
//! punctuation for natural pauses. The step is best-effort: any failure
//! falls back to the normalized text and never fails the pipeline.

use crate::text::normalizer;

/// Whether the refinement pass should run for this (normalized) text.
///
/// Short casual text skips the extra round-trip to bound cost; long text
/// and administrative documents benefit the most from it.
pub fn needs_refinement(text: &str, long_text_threshold: usize) -> bool {
    text.chars().count() >= long_text_threshold || normalizer::has_administrative_markers(text)
}

/// Build the refinement prompt for the generative API.
///
/// The instruction pins the model to corrections only: no summarizing, no
/// omissions, no commentary, all names and numbers preserved.
pub fn build_refine_prompt(text: &str) -> String {
    format!(
        "Bạn là biên tập viên văn bản tiếng Việt. Hãy sửa lỗi chính tả, \
         viết đầy đủ các từ viết tắt còn lại và thêm dấu câu để tạo nhịp \
         nghỉ tự nhiên khi đọc thành tiếng. Giữ nguyên toàn bộ thông tin, \
         tên riêng, con số và bố cục. Không tóm tắt, không lược bỏ, không \
         thêm lời bình. Chỉ trả về văn bản đã sửa.\n\nVăn bản:\n{text}"
    )
}

/// Pick the refined candidate when it is usable, the original otherwise.
///
/// An empty or whitespace-only response means the model returned nothing
/// worth keeping.
pub fn accept_refinement(original: &str, candidate: &str) -> String {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        log::warn!("refinement returned empty text, keeping original");
        original.to_string()
    } else {
        candidate.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LONG_TEXT_THRESHOLD;

    #[test]
    fn test_short_casual_text_skips_refinement() {
        assert!(!needs_refinement("hôm nay trời đẹp", LONG_TEXT_THRESHOLD));
    }

    #[test]
    fn test_long_text_is_refined() {
        let text = "a".repeat(LONG_TEXT_THRESHOLD);
        assert!(needs_refinement(&text, LONG_TEXT_THRESHOLD));
    }

    #[test]
    fn test_administrative_text_is_refined_regardless_of_length() {
        let text = "Ủy ban nhân dân tỉnh ban hành quyết định số 15";
        assert!(text.chars().count() < LONG_TEXT_THRESHOLD);
        assert!(needs_refinement(text, LONG_TEXT_THRESHOLD));
    }

    #[test]
    fn test_prompt_carries_the_text() {
        let prompt = build_refine_prompt("nội dung cần sửa");
        assert!(prompt.contains("nội dung cần sửa"));
        assert!(prompt.contains("Không tóm tắt"));
    }

    #[test]
    fn test_empty_candidate_falls_back() {
        assert_eq!(accept_refinement("gốc", "   "), "gốc");
        assert_eq!(accept_refinement("gốc", "đã sửa"), "đã sửa");
    }
}
