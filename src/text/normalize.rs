use crate::logging::{record_text_pipeline, PipelineStepRecord, TextPipelineRecord};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

// No-break, figure, narrow, thin, hair, punctuation, medium math and ideographic spaces.
const SPECIAL_SPACES: &str = r"[\x{00A0}\x{2007}\x{202F}\x{2009}\x{200A}\x{2008}\x{205F}\x{3000}]";
// Zero-width space/non-joiner/joiner, word joiner, BOM, left-to-right and right-to-left marks.
const ZERO_WIDTH: &str = r"[\x{200B}\x{200C}\x{200D}\x{2060}\x{FEFF}\x{200E}\x{200F}]";
const DOUBLE_QUOTES: &str = r"[\x{201C}\x{201D}\x{201E}\x{201F}\x{00AB}\x{00BB}]";
const SINGLE_QUOTES: &str = r"[\x{2018}\x{2019}\x{201A}\x{201B}\x{2039}\x{203A}]";
const DASHES: &str = r"[\x{2014}\x{2013}\x{2212}\x{2012}\x{2015}]";
const BULLETS: &str = r"[\x{2022}\x{2023}\x{25E6}\x{25CF}\x{25CB}\x{25A0}\x{25A1}\x{25AA}\x{25AB}\x{25B8}\x{25B9}\x{25BA}\x{25BB}\x{00B7}\x{2219}\x{2043}\x{29BE}\x{29BF}]";

static SPECIAL_SPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(SPECIAL_SPACES).expect("valid special space regex"));
static ZERO_WIDTH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ZERO_WIDTH).expect("valid zero-width regex"));
static DOUBLE_QUOTE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DOUBLE_QUOTES).expect("valid double quote regex"));
static SINGLE_QUOTE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(SINGLE_QUOTES).expect("valid single quote regex"));
static DASH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DASHES).expect("valid dash regex"));
static BULLET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(BULLETS).expect("valid bullet regex"));
// A run of three or more newlines, counting lines that hold nothing but spaces as empty.
static BLANK_RUN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(?: *\n){2,}").expect("valid blank line run regex"));
static SPACE_RUN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" {2,}").expect("valid space collapse regex"));
static SPACE_BEFORE_NEWLINE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" +\n").expect("valid space before newline regex"));

static NEEDS_NORMALIZATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = [
        SPECIAL_SPACES,
        ZERO_WIDTH,
        DOUBLE_QUOTES,
        SINGLE_QUOTES,
        DASHES,
        BULLETS,
        r"\r",
        r"\n{3,}",
        r" {2,}",
    ]
    .join("|");
    Regex::new(&pattern).expect("valid normalization detector regex")
});

/// Runs the cleanup steps in order, keeping a per-step record when DEBUG
/// logging is on.
struct Pipeline {
    current: String,
    steps: Option<Vec<PipelineStepRecord>>,
}

impl Pipeline {
    fn new(input: &str) -> Self {
        let steps = if tracing::level_enabled!(tracing::Level::DEBUG) {
            Some(Vec::new())
        } else {
            None
        };
        Self {
            current: input.to_string(),
            steps,
        }
    }

    fn step(mut self, name: &'static str, apply: impl FnOnce(&str) -> String) -> Self {
        let next = apply(&self.current);
        if let Some(ref mut logged_steps) = self.steps {
            logged_steps.push(PipelineStepRecord::new(
                name,
                self.current.clone(),
                next.clone(),
                None,
            ));
        }
        self.current = next;
        self
    }

    fn finish(self, input: &str) -> String {
        if let Some(logged_steps) = self.steps {
            record_text_pipeline(TextPipelineRecord::new(
                input.to_string(),
                self.current.clone(),
                logged_steps,
            ));
        }
        self.current
    }
}

/// Cleans pasted text into plain, predictable characters.
///
/// Steps run in a fixed order because later ones rely on the canonical forms
/// produced by earlier ones (for example, blank-line capping only sees `\n`
/// once line endings are unified). The result is idempotent.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    Pipeline::new(text)
        .step("unicode_nfkc", |s| s.nfkc().collect())
        .step("special_spaces", |s| replace(&SPECIAL_SPACE_REGEX, s, " "))
        .step("zero_width", strip_zero_width)
        .step("quotes", |s| {
            let doubles = replace(&DOUBLE_QUOTE_REGEX, s, "\"");
            replace(&SINGLE_QUOTE_REGEX, &doubles, "'")
        })
        .step("dashes", |s| replace(&DASH_REGEX, s, "-"))
        .step("bullets", |s| replace(&BULLET_REGEX, s, "-"))
        .step("line_endings", normalize_line_endings)
        .step("blank_lines", |s| replace(&BLANK_RUN_REGEX, s, "\n\n"))
        .step("collapse_spaces", |s| replace(&SPACE_RUN_REGEX, s, " "))
        .step("trailing_spaces", |s| {
            replace(&SPACE_BEFORE_NEWLINE_REGEX, s, "\n")
        })
        .step("trim_whitespace", |s| s.trim().to_string())
        .finish(text)
}

/// Fast pre-check used to decide whether a paste is worth reporting as
/// changed.
///
/// Looks at the raw input only. Differences that come purely from Unicode
/// compatibility folding or from trimming the ends are not detected, so a
/// `false` here does not guarantee `normalize(text) == text`.
pub fn needs_normalization(text: &str) -> bool {
    !text.is_empty() && NEEDS_NORMALIZATION_REGEX.is_match(text)
}

/// Summary of how much a normalization pass changed.
///
/// Lengths and positions are counted in UTF-16 code units so that figures
/// match what a browser-side caller measures for the same strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationStats {
    /// Negative when normalization made the text longer.
    pub chars_removed: i64,
    pub chars_changed: usize,
    pub lines_reduced: usize,
}

pub fn normalization_stats(original: &str, normalized: &str) -> NormalizationStats {
    let original_units: Vec<u16> = original.encode_utf16().collect();
    let normalized_units: Vec<u16> = normalized.encode_utf16().collect();

    let longest = original_units.len().max(normalized_units.len());
    let chars_changed = (0..longest)
        .filter(|&i| original_units.get(i) != normalized_units.get(i))
        .count();

    let original_lines = original.split('\n').count();
    let normalized_lines = normalized.split('\n').count();

    NormalizationStats {
        chars_removed: original_units.len() as i64 - normalized_units.len() as i64,
        chars_changed,
        lines_reduced: original_lines.saturating_sub(normalized_lines),
    }
}

fn replace(regex: &Regex, input: &str, replacement: &str) -> String {
    regex.replace_all(input, replacement).into_owned()
}

// Removing a joiner can leave a base letter directly before a combining
// mark, so the text is recomposed whenever something was dropped.
fn strip_zero_width(input: &str) -> String {
    if !ZERO_WIDTH_REGEX.is_match(input) {
        return input.to_string();
    }
    ZERO_WIDTH_REGEX
        .replace_all(input, "")
        .nfkc()
        .collect()
}

fn normalize_line_endings(input: &str) -> String {
    if input.contains('\r') {
        input.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        input.to_string()
    }
}
