//! Splitting normalized text into synthesis-safe chunks.
//!
//! Short texts stay whole: one segment means one continuous voice timbre,
//! which is the default and preferred path. Longer texts are cut at
//! sentence boundaries and packed greedily under a character budget.

/// Split `text` into ordered chunks for synthesis.
///
/// Texts of at most `single_segment_threshold` characters come back as a
/// single chunk. Longer texts are split into sentence-like fragments
/// (boundaries: `.` `!` `?` and newline) which are then packed greedily up
/// to `per_chunk_limit` characters without ever splitting a fragment. A
/// fragment longer than the limit becomes one oversized chunk rather than
/// being cut mid-sentence.
///
/// Re-joining the chunks reproduces the input's content: nothing is lost
/// or duplicated.
pub fn split_into_chunks(
    text: &str,
    single_segment_threshold: usize,
    per_chunk_limit: usize,
) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if trimmed.chars().count() <= single_segment_threshold {
        return vec![trimmed.to_string()];
    }

    let fragments = split_sentences(trimmed);

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for fragment in fragments {
        let fragment_len = fragment.chars().count();
        if current_len > 0 && current_len + fragment_len > per_chunk_limit {
            chunks.push(current.trim().to_string());
            current = String::new();
            current_len = 0;
        }
        current.push_str(&fragment);
        current_len += fragment_len;
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks.retain(|c| !c.is_empty());
    chunks
}

/// Cut text into sentence-like fragments, each carrying its trailing
/// boundary punctuation.
fn split_sentences(text: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut in_boundary = false;

    for c in text.chars() {
        let is_boundary = matches!(c, '.' | '!' | '?' | '\n');
        if in_boundary && !is_boundary {
            fragments.push(std::mem::take(&mut current));
        }
        current.push(c);
        in_boundary = is_boundary;
    }
    if !current.is_empty() {
        fragments.push(current);
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CHUNK_CHAR_LIMIT, SINGLE_SEGMENT_THRESHOLD};

    fn non_whitespace(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let text = "Xin chào các bạn. Hôm nay trời đẹp quá!";
        assert!(text.chars().count() < 100);
        let chunks = split_into_chunks(text, SINGLE_SEGMENT_THRESHOLD, CHUNK_CHAR_LIMIT);
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_long_text_splits_under_limit() {
        let sentence = "Đây là một câu văn có độ dài vừa phải để kiểm tra. ";
        let text = sentence.repeat(100);
        assert!(text.chars().count() > SINGLE_SEGMENT_THRESHOLD);

        let chunks = split_into_chunks(&text, SINGLE_SEGMENT_THRESHOLD, CHUNK_CHAR_LIMIT);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(
                chunk.chars().count() <= CHUNK_CHAR_LIMIT,
                "chunk of {} chars exceeds limit",
                chunk.chars().count()
            );
        }
    }

    #[test]
    fn test_chunks_cover_input_exactly_once() {
        let sentence = "Một câu nữa để ghép vào văn bản dài. ";
        let text = sentence.repeat(150);
        let chunks = split_into_chunks(&text, SINGLE_SEGMENT_THRESHOLD, CHUNK_CHAR_LIMIT);

        let rejoined = chunks.join(" ");
        assert_eq!(non_whitespace(&rejoined), non_whitespace(&text));
    }

    #[test]
    fn test_oversized_sentence_stays_whole() {
        let giant = "a".repeat(900);
        let text = format!("Câu mở đầu. {giant}. Câu kết thúc.");
        let chunks = split_into_chunks(&text, 100, CHUNK_CHAR_LIMIT);

        assert!(chunks.iter().any(|c| c.chars().count() > CHUNK_CHAR_LIMIT));
        let rejoined = chunks.join(" ");
        assert_eq!(non_whitespace(&rejoined), non_whitespace(&text));
    }

    #[test]
    fn test_never_splits_mid_word() {
        let word = "trường";
        let text = format!("{} ", word).repeat(800);
        let chunks = split_into_chunks(&text, SINGLE_SEGMENT_THRESHOLD, CHUNK_CHAR_LIMIT);
        for chunk in chunks {
            for token in chunk.split_whitespace() {
                assert_eq!(token, word);
            }
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(split_into_chunks("", SINGLE_SEGMENT_THRESHOLD, CHUNK_CHAR_LIMIT).is_empty());
        assert!(split_into_chunks("   ", SINGLE_SEGMENT_THRESHOLD, CHUNK_CHAR_LIMIT).is_empty());
    }

    #[test]
    fn test_boundary_punctuation_is_kept() {
        let text = "Câu một! Câu hai? Câu ba.".repeat(300);
        let chunks = split_into_chunks(&text, SINGLE_SEGMENT_THRESHOLD, CHUNK_CHAR_LIMIT);
        let rejoined = chunks.join("");
        assert_eq!(
            rejoined.matches('!').count(),
            text.matches('!').count()
        );
        assert_eq!(
            rejoined.matches('?').count(),
            text.matches('?').count()
        );
    }
}
