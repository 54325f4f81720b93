//! 모델 출력 텍스트 정규화
//!
//! 모델이 생성한 원문 텍스트는 저장소에 그대로 들어가면 안 됩니다.
//! 1. 백슬래시 제거
//! 2. 문자/숫자/공백/기본 문장부호(`.,!?'"-`) 외 문자 제거
//! 3. 연속 공백을 하나로
//! 4. 양끝 공백 제거

use std::sync::OnceLock;

use regex::Regex;

fn disallowed_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[^\w\s.,!?'"\-]"#).expect("valid regex"))
}

fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// 텍스트 정규화
pub fn normalize_text(text: &str) -> String {
    let text = text.replace('\\', "");
    let text = disallowed_chars().replace_all(&text, "");
    let text = whitespace_runs().replace_all(&text, " ");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_backslashes_and_symbols() {
        assert_eq!(normalize_text(r"Head\nDiameter **(B)**"), "HeadnDiameter B");
        assert_eq!(normalize_text("10° <mm>"), "10 mm");
    }

    #[test]
    fn test_keeps_basic_punctuation() {
        assert_eq!(normalize_text("Width, A' - \"outer\"."), "Width, A' - \"outer\".");
        assert_eq!(normalize_text("G_1?"), "G_1?");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(normalize_text("  Total\t\tLength \n of  bolt "), "Total Length of bolt");
    }

    #[test]
    fn test_keeps_unicode_letters() {
        assert_eq!(normalize_text("나비 너트 #1"), "나비 너트 1");
    }
}
