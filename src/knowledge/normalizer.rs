//! Text Normalizer - 추출 텍스트 정제
//!
//! PDF에서 뽑은 원문에서 페이지 번호, 저작권 문구, URL, HTML 태그,
//! 반복 기호, 비ASCII 문자를 제거하고 공백을 정리합니다.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static PAGE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Page\s*\d+\s*(of)?\s*\d*").expect("valid regex"));

static COPYRIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"©\s*\d{4}\s*.*").expect("valid regex"));

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(www\.|https?://)\S+").expect("valid regex"));

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// 연속 반복 시 제거하는 기호
const REPEATABLE_SYMBOLS: &str = "@#-*)(=+|\\/&%$^!~`{}[]:;\"',.?";

// 기호마다 `x{2,}` 대안을 만들어 선형 시간 엔진으로 처리
static REPEATED_SYMBOL: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = REPEATABLE_SYMBOLS
        .chars()
        .map(|c| format!("{}{{2,}}", regex::escape(&c.to_string())))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&pattern).expect("valid regex")
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

static NON_ASCII: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\x00-\x7F]+").expect("valid regex"));

/// 원문 텍스트 정제
///
/// 순서가 중요합니다: NFKC 정규화가 먼저 전각 문자/합자를 ASCII로 바꾸고,
/// 비ASCII 제거는 `©` 패턴 처리 이후, 공백 정리 직전에 수행됩니다.
pub fn clean_text(text: &str) -> String {
    let text: String = text.nfkc().collect();
    let text = PAGE_MARKER.replace_all(&text, "");
    let text = COPYRIGHT.replace_all(&text, "");
    let text = URL.replace_all(&text, "");
    let text = HTML_TAG.replace_all(&text, "");
    let text = remove_repeated_symbols(&text);
    let text = NON_ASCII.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, " ");
    text.trim().to_string()
}

/// 같은 기호가 2번 이상 연속된 구간 제거 (`----`, `***`, `@@`)
fn remove_repeated_symbols(text: &str) -> String {
    REPEATED_SYMBOL.replace_all(text, "").into_owned()
}

/// 코퍼스 파일을 읽어 정제 후 저장
pub fn clean_corpus_file(input: &Path, output: &Path) -> Result<usize> {
    let corpus = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read corpus: {:?}", input))?;

    let cleaned = clean_text(&corpus);

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
    }

    std::fs::write(output, &cleaned)
        .with_context(|| format!("Failed to write cleaned corpus: {:?}", output))?;

    tracing::info!(
        "Cleaned corpus {:?} -> {:?} ({} -> {} bytes)",
        input,
        output,
        corpus.len(),
        cleaned.len()
    );

    Ok(cleaned.len())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_page_marker_and_dashes_removed() {
        let cleaned = clean_text("Intro text Page 3 of 10 ---- more text");
        assert!(!cleaned.contains("Page 3 of 10"));
        assert!(!cleaned.contains("----"));
        assert_eq!(cleaned, "Intro text more text");
    }

    #[test]
    fn test_page_header_from_extractor() {
        let cleaned = clean_text("\n--- Page 1 ---\nScaler Academy offers a Data Science program");
        assert_eq!(cleaned, "Scaler Academy offers a Data Science program");
    }

    #[test]
    fn test_urls_and_tags_removed() {
        let cleaned = clean_text("Visit <b>https://scaler.com/courses</b> or www.scaler.com today");
        assert_eq!(cleaned, "Visit or today");
    }

    #[test]
    fn test_copyright_line_removed() {
        let cleaned = clean_text("Curriculum overview\n© 2024 Scaler. All rights reserved.\nNext");
        assert_eq!(cleaned, "Curriculum overview Next");
    }

    #[test]
    fn test_single_symbols_kept() {
        let cleaned = clean_text("Fees: 3.5 lakh, payable in 2 parts.");
        assert_eq!(cleaned, "Fees: 3.5 lakh, payable in 2 parts.");
    }

    #[test]
    fn test_repeated_symbols_removed() {
        assert_eq!(clean_text("Wait... what?? ***Done***"), "Wait what Done");
    }

    #[test]
    fn test_non_ascii_and_nfkc() {
        // 전각 문자는 NFKC로 ASCII가 되고, 한글은 제거됨
        assert_eq!(clean_text("ＡＢＣ 안녕 data"), "ABC data");
        // 합자(ﬁ) 분해
        assert_eq!(clean_text("ﬁnance"), "finance");
    }

    #[test]
    fn test_mixed_symbol_runs() {
        // 서로 다른 기호가 붙어 있으면 반복이 아님
        assert_eq!(clean_text("a -- b -+ c //// d \\\\ e"), "a b -+ c d e");
        assert_eq!(clean_text("x ((y)) {{z}}"), "x y z");
    }

    #[test]
    fn test_large_corpus() {
        let corpus = "Scaler offers a program, with mentors. ---- Page 4 of 9\n".repeat(60_000);
        assert!(corpus.len() > 3_000_000);

        let cleaned = clean_text(&corpus);
        assert!(!cleaned.contains("----"));
        assert!(!cleaned.contains("Page"));
        assert!(cleaned.starts_with("Scaler offers a program, with mentors. Scaler offers"));
        assert_eq!(
            cleaned.matches("Scaler offers a program, with mentors.").count(),
            60_000
        );
    }

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(clean_text("  a\n\n\tb   c  "), "a b c");
    }

    #[test]
    fn test_clean_corpus_file() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("corpus.txt");
        let output = dir.path().join("out/cleaned.txt");
        std::fs::write(&input, "Hello Page 2 world ====").unwrap();

        let written = clean_corpus_file(&input, &output).unwrap();
        let cleaned = std::fs::read_to_string(&output).unwrap();
        assert_eq!(cleaned, "Hello world");
        assert_eq!(written, cleaned.len());
    }
}
