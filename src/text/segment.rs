use super::normalize::normalize;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static PARAGRAPH_BREAK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("valid paragraph break regex"));

/// Unit used when cutting text into separate messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Separator {
    Line,
    #[default]
    Paragraph,
}

impl Separator {
    pub fn label(&self) -> &'static str {
        match self {
            Separator::Line => "line",
            Separator::Paragraph => "paragraph",
        }
    }
}

impl fmt::Display for Separator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Normalizes `text` and cuts it into non-blank segments.
///
/// Line segments are returned as they appear; paragraph segments have their
/// inner line breaks folded into single spaces.
pub fn split_text(text: &str, separator: Separator) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let normalized = normalize(text);

    match separator {
        Separator::Line => normalized
            .split('\n')
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect(),
        Separator::Paragraph => PARAGRAPH_BREAK_REGEX
            .split(&normalized)
            .filter(|para| !para.trim().is_empty())
            .map(|para| para.replace('\n', " ").trim().to_string())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_paragraphs_and_folds_inner_lines() {
        assert_eq!(
            split_text("Para one.\n\nPara two line1\nline2", Separator::Paragraph),
            vec!["Para one.", "Para two line1 line2"]
        );
    }

    #[test]
    fn splits_lines_and_drops_blank_ones() {
        assert_eq!(
            split_text("first\n\n  second\r\n\u{200B}\nthird  ", Separator::Line),
            vec!["first", " second", "third"]
        );
    }

    #[test]
    fn empty_and_blank_input_yield_nothing() {
        assert!(split_text("", Separator::Line).is_empty());
        assert!(split_text(" \n\t\n ", Separator::Paragraph).is_empty());
        assert!(split_text("\u{00A0}\r\n", Separator::Line).is_empty());
    }

    #[test]
    fn segments_are_never_blank() {
        let text = "a\n\t\nb\n\n\n\n \u{2003}\n\nc\n";
        for separator in [Separator::Line, Separator::Paragraph] {
            for segment in split_text(text, separator) {
                assert!(!segment.trim().is_empty(), "{separator}: {segment:?}");
            }
        }
    }

    #[test]
    fn separator_uses_lowercase_names() {
        let parsed: Separator = serde_json::from_str("\"line\"").expect("parse separator");
        assert_eq!(parsed, Separator::Line);
        assert_eq!(
            serde_json::to_string(&Separator::Paragraph).expect("serialize separator"),
            "\"paragraph\""
        );
    }
}
