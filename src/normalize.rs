//! CJK-aware text normalization for reStructuredText sources.
//!
//! Mixed Chinese/English prose drifts: full-width punctuation slips in,
//! spaces appear between Chinese characters, and Latin words or numbers get
//! glued to Chinese text. [`normalize_text`] rewrites a document into one
//! canonical form:
//!
//! ```text
//! 你好，世界！        →  你好,世界!
//! 测试test内容        →  测试 test 内容
//! 第3章  共 12页      →  第 3 章共 12 页
//! ```
//!
//! ## Rules, in order
//!
//! 1. CRLF, doubled CRLF (`\r\r\n`) and lone CR line endings become LF.
//! 2. Full-width punctuation is replaced by its half-width equivalent
//!    ([`PUNCTUATION`]).
//! 3. Horizontal whitespace between two characters on one line is rewritten
//!    according to the character classes on either side:
//!    CJK·CJK → nothing, Latin·Latin → one space, CJK·Latin and CJK·digit
//!    (either order) → exactly one space, inserted when missing.
//! 4. Two or more blank lines collapse into one.
//! 5. The document is trimmed and ends with a single newline.
//!
//! Rule 3 is a single left-to-right pass over whitespace runs rather than a
//! chain of regex substitutions: overlapping matches such as `中 文 字` are
//! handled in one go, which is what makes the whole transform idempotent.

use crate::document::{self, DocumentError};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Full-width punctuation and its half-width replacement.
pub const PUNCTUATION: &[(char, char)] = &[
    ('。', '.'),
    ('，', ','),
    ('（', '('),
    ('）', ')'),
    ('、', ','),
    ('！', '!'),
    ('：', ':'),
    ('“', '"'),
    ('”', '"'),
    ('；', ';'),
    ('？', '?'),
];

/// Any run of carriage returns, with or without a trailing `\n`.
///
/// `\r\r\n` (a file converted to CRLF twice) and a lone `\r` (classic Mac
/// line ending) both become a single `\n`, so no `\r` survives the first
/// pass.
static LINE_ENDINGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r+\n?").expect("valid regex"));

/// A newline followed by two or more blank (or whitespace-only) lines.
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Cjk,
    Latin,
    Digit,
    Other,
}

fn classify(c: char) -> CharClass {
    match c {
        '\u{4e00}'..='\u{9fa5}' => CharClass::Cjk,
        c if c.is_ascii_alphabetic() => CharClass::Latin,
        c if c.is_ascii_digit() => CharClass::Digit,
        _ => CharClass::Other,
    }
}

fn is_horizontal_space(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// How many spaces belong between `before` and `after`, or `None` to keep
/// the original run untouched.
fn spacing_between(before: CharClass, after: CharClass, run_len: usize) -> Option<usize> {
    use CharClass::*;
    match (before, after) {
        (Cjk, Cjk) => Some(0),
        (Latin, Latin) if run_len > 0 => Some(1),
        (Cjk, Latin) | (Latin, Cjk) | (Cjk, Digit) | (Digit, Cjk) => Some(1),
        _ => None,
    }
}

/// Replace full-width punctuation with half-width equivalents.
pub fn replace_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| {
            PUNCTUATION
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| *to)
                .unwrap_or(c)
        })
        .collect()
}

/// Apply the CJK/Latin/digit spacing rules.
pub fn fix_spacing(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        i += 1;

        if is_horizontal_space(c) || i >= chars.len() {
            continue;
        }

        // Measure the whitespace run following `c`.
        let run_start = i;
        while i < chars.len() && is_horizontal_space(chars[i]) {
            i += 1;
        }
        let run_len = i - run_start;

        let Some(&next) = chars.get(i) else {
            // Trailing whitespace at end of input: keep it, the final trim
            // takes care of it.
            out.extend(&chars[run_start..i]);
            break;
        };

        match spacing_between(classify(c), classify(next), run_len) {
            Some(n) => out.extend(std::iter::repeat_n(' ', n)),
            None => out.extend(&chars[run_start..i]),
        }
    }

    out
}

/// Collapse runs of two or more blank lines into a single blank line.
pub fn collapse_blank_lines(text: &str) -> String {
    BLANK_LINES.replace_all(text, "\n\n").into_owned()
}

/// Turn every CR-based line ending into `\n`.
pub fn normalize_line_endings(text: &str) -> String {
    LINE_ENDINGS.replace_all(text, "\n").into_owned()
}

/// Normalize document text. Pure and idempotent.
pub fn normalize_text(text: &str) -> String {
    let text = normalize_line_endings(text);
    let text = replace_punctuation(&text);
    let text = fix_spacing(&text);
    let text = collapse_blank_lines(&text);
    finish(&text)
}

/// Trim the document and terminate it with exactly one newline.
pub fn finish(text: &str) -> String {
    let mut out = text.trim().to_string();
    out.push('\n');
    out
}

/// Normalize a document file in place.
///
/// Returns `true` when the file content changed. Unreadable, non-UTF-8, or
/// empty files are errors and are never written.
pub fn normalize_file(path: &Path) -> Result<bool, DocumentError> {
    let original = document::read_text(path)?;
    let normalized = normalize_text(&original);
    if normalized == original {
        return Ok(false);
    }
    document::write_atomic(path, &normalized)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // =========================================================================
    // Punctuation
    // =========================================================================

    #[test]
    fn punctuation_between_cjk_gets_no_spacing() {
        assert_eq!(normalize_text("你好，世界！"), "你好,世界!\n");
    }

    #[test]
    fn punctuation_full_table() {
        assert_eq!(
            replace_punctuation("。，（）、！：“”；？"),
            ".,(),!:\"\";?"
        );
    }

    #[test]
    fn ascii_punctuation_untouched() {
        assert_eq!(replace_punctuation("a, b. (c)"), "a, b. (c)");
    }

    // =========================================================================
    // Spacing
    // =========================================================================

    #[test]
    fn mixed_script_spacing() {
        assert_eq!(normalize_text("测试test内容"), "测试 test 内容\n");
    }

    #[test]
    fn cjk_runs_lose_spaces() {
        assert_eq!(fix_spacing("中 文  字"), "中文字");
    }

    #[test]
    fn latin_runs_collapse_to_one_space() {
        assert_eq!(fix_spacing("hello    world"), "hello world");
        assert_eq!(fix_spacing("a \t b"), "a b");
    }

    #[test]
    fn latin_words_are_not_split() {
        assert_eq!(fix_spacing("helloworld"), "helloworld");
    }

    #[test]
    fn cjk_latin_existing_spaces_collapse_to_one() {
        assert_eq!(fix_spacing("使用   Sphinx   构建"), "使用 Sphinx 构建");
    }

    #[test]
    fn cjk_digit_spacing() {
        assert_eq!(fix_spacing("第3章"), "第 3 章");
        assert_eq!(fix_spacing("共  12页"), "共 12 页");
    }

    #[test]
    fn digits_and_latin_untouched() {
        assert_eq!(fix_spacing("abc123"), "abc123");
        assert_eq!(fix_spacing("v1   2"), "v1   2");
    }

    #[test]
    fn indentation_is_preserved() {
        let text = "列表:\n\n    中文 内容\n    - item  one\n";
        assert_eq!(fix_spacing(text), "列表:\n\n    中文内容\n    - item one\n");
    }

    #[test]
    fn newlines_are_not_spacing() {
        assert_eq!(fix_spacing("中\n文"), "中\n文");
    }

    #[test]
    fn punctuation_neighbours_untouched() {
        assert_eq!(fix_spacing("中文 , 文字"), "中文 , 文字");
    }

    // =========================================================================
    // Blank lines and trailing newline
    // =========================================================================

    #[test]
    fn three_blank_lines_collapse_to_one() {
        assert_eq!(normalize_text("a\n\n\n\nb"), "a\n\nb\n");
    }

    #[test]
    fn whitespace_only_lines_count_as_blank() {
        assert_eq!(collapse_blank_lines("a\n  \n\t\n\nb"), "a\n\nb");
    }

    #[test]
    fn single_blank_line_kept() {
        assert_eq!(normalize_text("a\n\nb\n"), "a\n\nb\n");
    }

    #[test]
    fn leading_and_trailing_whitespace_trimmed() {
        assert_eq!(normalize_text("\n\n  title\n\n\n"), "title\n");
    }

    #[test]
    fn crlf_becomes_lf() {
        assert_eq!(normalize_text("a\r\n\r\n\r\nb\r\n"), "a\n\nb\n");
    }

    #[test]
    fn doubled_and_lone_carriage_returns_become_lf() {
        assert_eq!(normalize_line_endings("a\r\r\nb"), "a\nb");
        assert_eq!(normalize_line_endings("a\rb\r"), "a\nb\n");
        assert_eq!(normalize_text("文中a\n\r\r\n，"), "文中 a\n\n,\n");
    }

    // =========================================================================
    // Idempotence
    // =========================================================================

    #[test]
    fn idempotent_on_samples() {
        let samples = [
            "你好，世界！",
            "测试test内容",
            "中 文 字 和 English words  here",
            "第3章 共 12页\n\n\n\n结束。",
            "标题\n====\n\n.. image:: /_static/cat.png\n\n正文 text，（注释）",
            "   \n\n",
            "a\tb\t\t中\t文",
            "混合 mixed 1 2 3 数字",
            "文中a\n\r\r\n，",
            "a\r\r\r\nb\rc\r",
            "\r\n\r\r\n中\r文",
        ];
        for s in samples {
            let once = normalize_text(s);
            let twice = normalize_text(&once);
            assert_eq!(once, twice, "not idempotent for {s:?}");
        }
    }

    // =========================================================================
    // File variant
    // =========================================================================

    #[test]
    fn normalize_file_rewrites_in_place() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.rst");
        fs::write(&path, "你好，世界！\n\n\n\n测试test内容").unwrap();

        assert!(normalize_file(&path).unwrap());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "你好,世界!\n\n测试 test 内容\n"
        );
        assert!(!normalize_file(&path).unwrap());
    }

    #[test]
    fn normalize_file_rejects_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.rst");
        fs::write(&path, "").unwrap();
        assert!(matches!(
            normalize_file(&path),
            Err(DocumentError::Empty(_))
        ));
    }

    #[test]
    fn normalize_file_rejects_non_utf8_and_leaves_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gbk.rst");
        let bytes = [0xc4u8, 0xe3, 0xba, 0xc3, 0xff];
        fs::write(&path, bytes).unwrap();
        assert!(matches!(
            normalize_file(&path),
            Err(DocumentError::Decode(_))
        ));
        assert_eq!(fs::read(&path).unwrap(), bytes);
    }
}
