//! Script normalization.

use regex::Regex;
use std::sync::LazyLock;

static HORIZONTAL_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("Valid horizontal whitespace regex"));

static PADDED_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" ?\n ?").expect("Valid padded newline regex"));

static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("Valid blank line regex"));

/// Normalize a script so segment offsets are stable.
///
/// Line endings become `\n`, runs of spaces and tabs become one space,
/// spaces around line breaks are dropped, three or more line breaks become
/// one blank line, and the result is trimmed. Every other character is kept
/// verbatim.
///
/// # Examples
///
/// ```
/// use lumiere_script::normalize_script;
///
/// assert_eq!(normalize_script("  Hello,\t\tworld!\r\n\r\n\r\nBye  "), "Hello, world!\n\nBye");
/// ```
pub fn normalize_script(script: &str) -> String {
    let unified = script.replace("\r\n", "\n").replace('\r', "\n");
    let collapsed = HORIZONTAL_RUN.replace_all(&unified, " ");
    let tight = PADDED_NEWLINE.replace_all(&collapsed, "\n");
    let bounded = BLANK_RUN.replace_all(&tight, "\n\n");
    bounded.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_unicode_verbatim() {
        assert_eq!(normalize_script("Café 🎬  déjà vu"), "Café 🎬 déjà vu");
    }

    #[test]
    fn test_lone_carriage_returns() {
        assert_eq!(normalize_script("a\rb\r\rc"), "a\nb\n\nc");
    }

    #[test]
    fn test_whitespace_only_is_empty() {
        assert!(normalize_script(" \t\r\n \n").is_empty());
    }
}
