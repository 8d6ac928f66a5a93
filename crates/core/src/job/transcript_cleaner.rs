use std::sync::OnceLock;

use regex::Regex;

fn annotation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[.*?\]").expect("valid regex"))
}

fn whitespace_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[ \t]+").expect("valid regex"))
}

/// Removes bracketed annotations (`[MUSIC]`, `[_BEG_]`, `[_TT_42]`, ...)
/// from raw recognizer output.
///
/// Each `[` is matched to the nearest following `]`. Runs of spaces left
/// behind collapse to one space and the result is trimmed, so cleaning is
/// idempotent.
pub fn strip_annotations(raw: &str) -> String {
    let stripped = annotation_pattern().replace_all(raw, "");
    let collapsed = whitespace_pattern().replace_all(&stripped, " ");
    collapsed.trim().to_string()
}
