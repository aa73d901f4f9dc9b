//! Rule-based Vietnamese text normalization for speech synthesis.
//!
//! Expands abbreviations, dates, units and symbols into their spoken form
//! and regularizes punctuation so the synthesized reading pauses naturally.
//! The transformation is pure, never fails on arbitrary input, and is
//! idempotent: `normalize(normalize(x)) == normalize(x)`.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Common Vietnamese abbreviations and their spoken expansions.
///
/// Entries ending in a literal period (TP., Q., TS., ...) consume the period
/// and therefore match without a trailing word boundary.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("HĐND", "Hội đồng nhân dân"),
    ("UBND", "Ủy ban nhân dân"),
    ("UBMTTQ", "Ủy ban Mặt trận Tổ quốc"),
    ("UBMT", "Ủy ban Mặt trận"),
    ("MTTQ", "Mặt trận Tổ quốc"),
    ("TW", "Trung ương"),
    ("TƯ", "Trung ương"),
    ("BCH", "Ban chấp hành"),
    ("TP.", "Thành phố"),
    ("TP", "Thành phố"),
    ("TT.", "Thị trấn"),
    ("Q.", "Quận"),
    ("H.", "Huyện"),
    ("X.", "Xã"),
    ("P.", "Phường"),
    ("VN", "Việt Nam"),
    ("VNĐ", "Việt Nam Đồng"),
    ("CSGT", "Cảnh sát giao thông"),
    ("BHXH", "Bảo hiểm xã hội"),
    ("BHYT", "Bảo hiểm y tế"),
    ("Đ/c", "Đồng chí"),
    ("TS.", "Tiến sĩ"),
    ("ThS.", "Thạc sĩ"),
    ("BS.", "Bác sĩ"),
    ("GS.", "Giáo sư"),
    ("NSND", "Nghệ sĩ nhân dân"),
    ("NSƯT", "Nghệ sĩ ưu tú"),
    ("THPT", "Trung học phổ thông"),
    ("THCS", "Trung học cơ sở"),
    ("ĐH", "Đại học"),
    ("CĐ", "Cao đẳng"),
    ("GTVT", "Giao thông vận tải"),
    ("TN&MT", "Tài nguyên và Môi trường"),
    ("KH&ĐT", "Kế hoạch và Đầu tư"),
    ("LĐTBXH", "Lao động thương binh và xã hội"),
    ("CNTT", "Công nghệ thông tin"),
    ("GDP", "Tổng sản phẩm nội địa"),
    ("WTO", "Tổ chức thương mại thế giới"),
    ("WHO", "Tổ chức y tế thế giới"),
    ("BTC", "Ban tổ chức"),
    ("BQL", "Ban quản lý"),
    ("HTX", "Hợp tác xã"),
    ("KCN", "Khu công nghiệp"),
    ("CCN", "Cụm công nghiệp"),
    ("BĐS", "Bất động sản"),
    ("GTGT", "Giá trị gia tăng"),
    ("VAT", "Thuế giá trị gia tăng"),
];

/// Measurement units read aloud when they directly follow a number.
const UNIT_READINGS: &[(&str, &str)] = &[
    ("kwh", "ki lô oát giờ"),
    ("vnđ", "Việt Nam đồng"),
    ("usd", "đô la Mỹ"),
    ("km2", "ki lô mét vuông"),
    ("kg", "ki lô gam"),
    ("km", "ki lô mét"),
    ("cm", "xăng ti mét"),
    ("mm", "mi li mét"),
    ("ml", "mi li lít"),
    ("m2", "mét vuông"),
    ("m3", "mét khối"),
    ("ha", "héc ta"),
    ("kw", "ki lô oát"),
    ("°c", "độ C"),
    ("đ", "đồng"),
    ("g", "gam"),
    ("m", "mét"),
    ("l", "lít"),
];

/// Frequent administrative misspellings and their corrections.
const SPELLING_FIXES: &[(&str, &str)] = &[
    ("sát nhập", "sáp nhập"),
    ("chuẩn đoán", "chẩn đoán"),
    ("qui định", "quy định"),
    ("qui hoạch", "quy hoạch"),
    ("qui chế", "quy chế"),
    ("xử lí", "xử lý"),
    ("bổ xung", "bổ sung"),
];

static ABBREVIATION_PATTERNS: Lazy<Vec<(Regex, String)>> = Lazy::new(|| {
    // Longest-first so UBMTTQ wins over UBMT, TP. over TP.
    let mut entries: Vec<&(&str, &str)> = ABBREVIATIONS.iter().collect();
    entries.sort_by_key(|(abbr, _)| std::cmp::Reverse(abbr.chars().count()));

    entries
        .into_iter()
        .map(|(abbr, expansion)| {
            let escaped = regex::escape(abbr);
            // Entries ending in '.' consume the period, so no trailing
            // boundary, and the expansion gets a trailing space (TP.HCM ->
            // "Thành phố HCM"; whitespace collapse removes extras).
            // Diacritic-bearing entries stay case-sensitive: with Unicode
            // (?i), TƯ would swallow the common word "tư".
            let mut pattern = String::new();
            if abbr.is_ascii() {
                pattern.push_str("(?i)");
            }
            pattern.push_str(r"\b");
            pattern.push_str(&escaped);
            let replacement = if abbr.ends_with('.') {
                format!("{expansion} ")
            } else {
                pattern.push_str(r"\b");
                expansion.to_string()
            };
            (Regex::new(&pattern).unwrap(), replacement)
        })
        .collect()
});

static SPELLING_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    SPELLING_FIXES
        .iter()
        .map(|(wrong, right)| {
            let pattern = format!(r"\b{}\b", regex::escape(wrong));
            (Regex::new(&pattern).unwrap(), *right)
        })
        .collect()
});

static UNIT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    // UNIT_READINGS is ordered longest-first, so the alternation prefers
    // the longest unit (km2 before km before m).
    let alternation = UNIT_READINGS
        .iter()
        .map(|(unit, _)| regex::escape(unit))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)(\d)\s*({alternation})\b")).unwrap()
});

static DATE_FULL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:ngày\s+)?(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());
static DATE_SHORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:ngày\s+)?(\d{1,2})/(\d{1,2})\b").unwrap());

static PERCENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d)\s*%").unwrap());
static PLUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d)\s*\+\s*(\d)").unwrap());
static TIMES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d)\s*[×*]\s*(\d)").unwrap());
static DIVIDE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d)\s*÷\s*(\d)").unwrap());
static EQUALS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d)\s*=\s*(\d)").unwrap());
static GREATER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d)\s*>\s*(\d)").unwrap());
static LESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d)\s*<\s*(\d)").unwrap());

static SPACE_BEFORE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([.,!?;:])").unwrap());
// No space after sentence punctuation. Digits are excluded so decimal
// numbers (3.5 / 3,5) and runs of dots (ellipsis) survive untouched.
static MISSING_SPACE_AFTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([.!?;:,])([^\s\d.!?;:,"'”’)\]…])"#).unwrap());

static DASH_BETWEEN_WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+[-–—]+\s+").unwrap());
static DASH_LINE_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*[-–—]+\s*").unwrap());
static DASH_INLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^\s\d-])[-–—]([^\s\d-])").unwrap());

static LEADING_PAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\s,]+").unwrap());

const ZERO_WIDTH: &[char] = &['\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}'];

/// Normalize raw text into its spoken form.
///
/// Applies, in order: Unicode canonicalization, digit-adjacent symbol
/// expansion, date and unit expansion, spelling fixes, abbreviation
/// expansion, punctuation spacing, dash-to-pause conversion and whitespace
/// collapsing. Each rule is idempotent when reapplied.
pub fn normalize(text: &str) -> String {
    let text = canonicalize(text);
    let text = expand_symbols(&text);
    let text = expand_dates(&text);
    let text = expand_units(&text);
    let text = fix_spelling(&text);
    let text = expand_abbreviations(&text);
    let text = normalize_punctuation(&text);
    let text = soften_dashes(&text);
    collapse_whitespace(&text)
}

fn canonicalize(text: &str) -> String {
    text.nfc().filter(|c| !ZERO_WIDTH.contains(c)).collect()
}

/// Repeatedly apply a digit-adjacent replacement until the text is stable.
/// A single `replace_all` pass misses overlaps like "1+2+3", where the
/// shared digit is consumed by the first match.
fn replace_until_stable(re: &Regex, text: String, replacement: &str) -> String {
    let mut current = text;
    loop {
        let next = re.replace_all(&current, replacement).into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

fn expand_symbols(text: &str) -> String {
    let text = replace_until_stable(&PERCENT, text.to_string(), "${1} phần trăm");
    let text = replace_until_stable(&PLUS, text, "${1} cộng ${2}");
    let text = replace_until_stable(&TIMES, text, "${1} nhân ${2}");
    let text = replace_until_stable(&DIVIDE, text, "${1} chia ${2}");
    let text = replace_until_stable(&EQUALS, text, "${1} bằng ${2}");
    let text = replace_until_stable(&GREATER, text, "${1} lớn hơn ${2}");
    replace_until_stable(&LESS, text, "${1} nhỏ hơn ${2}")
}

fn expand_dates(text: &str) -> String {
    let text = DATE_FULL.replace_all(text, "ngày ${1} tháng ${2} năm ${3}");
    DATE_SHORT
        .replace_all(&text, "ngày ${1} tháng ${2}")
        .into_owned()
}

fn expand_units(text: &str) -> String {
    UNIT_PATTERN
        .replace_all(text, |caps: &regex::Captures| {
            let unit = caps[2].to_lowercase();
            let reading = UNIT_READINGS
                .iter()
                .find(|(u, _)| *u == unit)
                .map(|(_, r)| *r)
                .unwrap_or("");
            format!("{} {}", &caps[1], reading)
        })
        .into_owned()
}

fn fix_spelling(text: &str) -> String {
    let mut result = text.to_string();
    for (re, replacement) in SPELLING_PATTERNS.iter() {
        result = re.replace_all(&result, *replacement).into_owned();
    }
    result
}

fn expand_abbreviations(text: &str) -> String {
    let mut result = text.to_string();
    for (re, expansion) in ABBREVIATION_PATTERNS.iter() {
        result = re.replace_all(&result, expansion.as_str()).into_owned();
    }
    result
}

fn normalize_punctuation(text: &str) -> String {
    let text = SPACE_BEFORE_PUNCT.replace_all(text, "${1}");
    MISSING_SPACE_AFTER
        .replace_all(&text, "${1} ${2}")
        .into_owned()
}

/// A dash used as a list marker or word separator is read as a pause, not
/// as negation, so it becomes a comma. Dashes adjacent to digits (ranges,
/// negative numbers) are left alone; a dash opening the whole text has
/// nothing to pause after and is dropped.
fn soften_dashes(text: &str) -> String {
    let text = DASH_BETWEEN_WORDS.replace_all(text, ", ").into_owned();
    let text = DASH_LINE_START.replace_all(&text, "").into_owned();
    let text = replace_until_stable(&DASH_INLINE, text, "${1}, ${2}");
    LEADING_PAUSE.replace(&text, "").into_owned()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether the text still carries administrative markers that warrant the
/// AI refinement pass. Checked against the normalized text, so the markers
/// are the expanded phrases.
pub fn has_administrative_markers(text: &str) -> bool {
    static ADMIN_MARKERS: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)(ủy ban nhân dân|hội đồng nhân dân|nghị định|thông tư|quyết định số|công văn|kính gửi|căn cứ|tờ trình)",
        )
        .unwrap()
    });
    ADMIN_MARKERS.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expands_ubnd() {
        let result = normalize("UBND tỉnh thông báo");
        assert!(result.contains("Ủy ban nhân dân"));
        assert!(!result.contains("UBND"));
    }

    #[test]
    fn test_longest_abbreviation_wins() {
        let result = normalize("UBMTTQ họp sáng nay");
        assert!(result.starts_with("Ủy ban Mặt trận Tổ quốc"));
    }

    #[test]
    fn test_dotted_abbreviation_consumes_period() {
        assert_eq!(normalize("TP.HCM"), "Thành phố HCM");
        assert_eq!(normalize("TS. Nam phát biểu"), "Tiến sĩ Nam phát biểu");
    }

    #[test]
    fn test_case_insensitive_ascii_abbreviations() {
        assert!(normalize("ubnd xã").contains("Ủy ban nhân dân"));
    }

    #[test]
    fn test_diacritic_abbreviations_do_not_eat_common_words() {
        // "tư" is an ordinary word; only the uppercase abbreviation expands.
        assert_eq!(normalize("tư nhân"), "tư nhân");
        assert!(normalize("TƯ Đảng").contains("Trung ương"));
    }

    #[test]
    fn test_percent_expansion() {
        assert_eq!(normalize("tăng 5% so với"), "tăng 5 phần trăm so với");
    }

    #[test]
    fn test_arithmetic_chain() {
        assert_eq!(normalize("1+2+3"), "1 cộng 2 cộng 3");
    }

    #[test]
    fn test_full_date() {
        assert_eq!(
            normalize("khai mạc 15/3/2024 tại Huế"),
            "khai mạc ngày 15 tháng 3 năm 2024 tại Huế"
        );
    }

    #[test]
    fn test_short_date_and_existing_prefix() {
        assert_eq!(normalize("ngày 2/9"), "ngày 2 tháng 9");
        assert_eq!(normalize("2/9"), "ngày 2 tháng 9");
    }

    #[test]
    fn test_unit_after_number() {
        assert_eq!(normalize("nặng 5kg"), "nặng 5 ki lô gam");
        assert_eq!(normalize("quãng đường 12 km"), "quãng đường 12 ki lô mét");
        // The unit must directly follow a digit.
        assert_eq!(normalize("đi xe kg"), "đi xe kg");
    }

    #[test]
    fn test_spelling_fixes() {
        assert_eq!(normalize("theo qui định mới"), "theo quy định mới");
        assert_eq!(normalize("sát nhập hai xã"), "sáp nhập hai xã");
    }

    #[test]
    fn test_punctuation_spacing() {
        assert_eq!(normalize("xin chào .Bạn khỏe không?"), "xin chào. Bạn khỏe không?");
        // Decimal separators stay intact.
        assert_eq!(normalize("đạt 3,5 điểm"), "đạt 3,5 điểm");
    }

    #[test]
    fn test_dash_becomes_pause() {
        assert_eq!(normalize("Hà Nội - Huế"), "Hà Nội, Huế");
        assert_eq!(normalize("- Thứ nhất: đổi mới"), "Thứ nhất: đổi mới");
        // A list dash mid-text keeps its pause as a comma.
        assert_eq!(
            normalize("cần chuẩn bị\n- hồ sơ\n- giấy tờ"),
            "cần chuẩn bị, hồ sơ, giấy tờ"
        );
        // Digit-adjacent dashes are ranges or signs, not pauses.
        assert_eq!(normalize("giai đoạn 2021-2025"), "giai đoạn 2021-2025");
    }

    #[test]
    fn test_whitespace_collapse() {
        assert_eq!(normalize("  xin   chào \n bạn "), "xin chào bạn");
    }

    #[test]
    fn test_strips_zero_width_characters() {
        assert_eq!(normalize("xin\u{200B} chào"), "xin chào");
    }

    #[test]
    fn test_idempotence() {
        let samples = [
            "UBND tỉnh thông báo",
            "TP.HCM ngày 15/3/2024, nhiệt độ 35°C - nắng nóng",
            "Giá tăng 5% lên 120000đ/kg theo qui định",
            "- Thứ nhất: HĐND họp\n- Thứ hai: UBMTTQ tổng kết",
            "1+2=3 và 10>5",
            "Đ/c Nam (BCH) phát biểu trước 200 người",
        ];
        for sample in samples {
            let once = normalize(sample);
            let twice = normalize(&once);
            assert_eq!(once, twice, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn test_never_panics_on_odd_input() {
        for input in ["", " ", "...", "---", "%%%", "///", "\u{FEFF}", "5/"] {
            let _ = normalize(input);
        }
    }

    #[test]
    fn test_administrative_markers() {
        assert!(has_administrative_markers(&normalize("UBND tỉnh ra quyết định số 15")));
        assert!(!has_administrative_markers("hôm nay trời đẹp quá"));
    }
}
