use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use std::fmt;
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    registry::LookupSpan,
};

pub const PIPELINE_TARGET: &str = "cleanpaste::text_pipeline";
const MAX_DIFF_CHARS: usize = 4096;
const PREVIEW_CHAR_LIMIT: usize = 120;
const TARGET_GUTTER_WIDTH: usize = 26;
const TIMESTAMP_FORMAT: &[FormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Input, output and per-step snapshots of one normalization pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPipelineRecord {
    pub input: String,
    pub output: String,
    pub steps: Vec<PipelineStepRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStepRecord {
    pub name: String,
    pub before: String,
    pub after: String,
    pub applied: bool,
    pub change_count: Option<usize>,
}

impl TextPipelineRecord {
    pub fn new(input: String, output: String, steps: Vec<PipelineStepRecord>) -> Self {
        Self {
            input,
            output,
            steps,
        }
    }

    pub fn changed_steps(&self) -> usize {
        self.steps.iter().filter(|step| step.applied).count()
    }

    pub fn render_pretty(&self, use_color: bool) -> String {
        let mut lines = vec![format!(
            "┌─ normalize ({} of {} steps changed the text)",
            self.changed_steps(),
            self.steps.len()
        )];
        lines.push(format!("│ in  : {}", preview(&self.input, use_color)));

        for step in self.steps.iter().filter(|step| step.applied) {
            lines.extend(step.render_lines(use_color).into_iter().map(|l| format!("│ {l}")));
        }

        lines.push(format!("│ out : {}", preview(&self.output, use_color)));
        lines.push("└─".to_string());
        lines.join("\n")
    }
}

impl PipelineStepRecord {
    pub fn new(
        name: impl Into<String>,
        before: String,
        after: String,
        change_count: Option<usize>,
    ) -> Self {
        let applied = before != after;
        Self {
            name: name.into(),
            before,
            after,
            applied,
            change_count,
        }
    }

    fn render_lines(&self, use_color: bool) -> Vec<String> {
        let header = match self.change_count {
            Some(count) if count > 0 => format!("• {} ×{}", self.name, count),
            _ => format!("• {}", self.name),
        };

        let mut lines = vec![header];
        match self.char_diff(use_color) {
            Some(diff) => lines.push(format!("  {diff}")),
            None => {
                lines.push(format!("  - {}", preview(&self.before, use_color)));
                lines.push(format!("  + {}", preview(&self.after, use_color)));
            }
        }
        lines
    }

    // Most steps swap or drop single characters, so a per-character diff
    // shows exactly what moved.
    fn char_diff(&self, use_color: bool) -> Option<String> {
        if self.before.len() + self.after.len() > MAX_DIFF_CHARS {
            return None;
        }

        let diff = TextDiff::from_chars(&self.before, &self.after);
        let mut rendered = String::new();
        for change in diff.iter_all_changes() {
            let fragment = escape_fragment(change.value());
            let styled = match (change.tag(), use_color) {
                (ChangeTag::Equal, true) => fragment.dimmed().to_string(),
                (ChangeTag::Delete, true) => fragment.red().strikethrough().to_string(),
                (ChangeTag::Insert, true) => fragment.green().to_string(),
                (ChangeTag::Equal, false) => fragment,
                (ChangeTag::Delete, false) => format!("[-{fragment}]"),
                (ChangeTag::Insert, false) => format!("[+{fragment}]"),
            };
            rendered.push_str(&styled);
        }
        Some(rendered)
    }
}

/// Makes whitespace and invisible code points readable in log output.
pub fn escape_fragment(value: &str) -> String {
    let mut rendered = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\n' => rendered.push('⏎'),
            '\r' => rendered.push('␍'),
            '\t' => rendered.push('⇥'),
            '\u{00A0}' => rendered.push('⍽'),
            c if c.is_control() || is_invisible(c) => {
                rendered.push_str(&format!("\\u{{{:04X}}}", c as u32))
            }
            c => rendered.push(c),
        }
    }
    rendered
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}'..='\u{200F}' | '\u{2060}' | '\u{FEFF}' | '\u{2007}'..='\u{200A}' | '\u{202F}' | '\u{205F}' | '\u{3000}'
    )
}

fn preview(value: &str, use_color: bool) -> String {
    let mut shown: String = value.chars().take(PREVIEW_CHAR_LIMIT).collect();
    if value.chars().count() > PREVIEW_CHAR_LIMIT {
        shown.push('…');
    }
    let escaped = escape_fragment(&shown);
    if use_color {
        escaped.cyan().to_string()
    } else {
        escaped
    }
}

#[derive(Debug, Default)]
struct PipelineEventVisitor {
    pipeline_json: Option<String>,
}

impl tracing::field::Visit for PipelineEventVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "pipeline_json" {
            self.pipeline_json = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, _field: &tracing::field::Field, _value: &dyn fmt::Debug) {}
}

/// Compact single-line formatter that expands normalization records into a
/// boxed diff.
#[derive(Debug, Default)]
pub struct TextPipelineFormatter;

impl TextPipelineFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl<S, N> FormatEvent<S, N> for TextPipelineFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let use_color = writer.has_ansi_escapes();

        write_prefix(&mut writer, metadata, use_color)?;

        if metadata.target() == PIPELINE_TARGET {
            let mut visitor = PipelineEventVisitor::default();
            event.record(&mut visitor);
            if let Some(json) = visitor.pipeline_json {
                return match serde_json::from_str::<TextPipelineRecord>(&json) {
                    Ok(record) => writeln!(writer, "\n{}", record.render_pretty(use_color)),
                    Err(err) => writeln!(writer, "unreadable pipeline record: {err}"),
                };
            }
        }

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Emits `record` on the pipeline target when DEBUG logging is enabled.
pub fn record_text_pipeline(record: TextPipelineRecord) {
    if !tracing::level_enabled!(Level::DEBUG) {
        return;
    }
    match serde_json::to_string(&record) {
        Ok(json) => tracing::event!(
            target: PIPELINE_TARGET,
            Level::DEBUG,
            pipeline_json = json.as_str(),
            applied_steps = record.changed_steps(),
            "normalize"
        ),
        Err(err) => tracing::event!(
            target: PIPELINE_TARGET,
            Level::DEBUG,
            "normalize (record not serializable: {err})"
        ),
    }
}

fn write_prefix(
    writer: &mut Writer<'_>,
    metadata: &tracing::Metadata<'_>,
    use_color: bool,
) -> fmt::Result {
    let timestamp = OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .format(&TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| "0000-00-00 00:00:00".to_string());
    let level = format!("{:>5}", metadata.level());
    let target = format!("{:<width$}", metadata.target(), width = TARGET_GUTTER_WIDTH);

    if use_color {
        write!(
            writer,
            "{} {} {}: ",
            timestamp.dimmed(),
            color_level(&level, *metadata.level()),
            target.blue().dimmed()
        )
    } else {
        write!(writer, "{timestamp} {level} {target}: ")
    }
}

fn color_level(text: &str, level: Level) -> String {
    match level {
        Level::ERROR => text.red().bold().to_string(),
        Level::WARN => text.yellow().bold().to_string(),
        Level::INFO => text.green().to_string(),
        Level::DEBUG => text.cyan().to_string(),
        Level::TRACE => text.dimmed().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_invisible_characters() {
        assert_eq!(
            escape_fragment("a\u{00A0}b\u{200B}c\r\n"),
            "a⍽b\\u{200B}c␍⏎"
        );
    }

    #[test]
    fn renders_only_applied_steps() {
        let record = TextPipelineRecord::new(
            "a  b".to_string(),
            "a b".to_string(),
            vec![
                PipelineStepRecord::new("dashes", "a  b".into(), "a  b".into(), None),
                PipelineStepRecord::new("collapse_spaces", "a  b".into(), "a b".into(), None),
            ],
        );

        assert_eq!(record.changed_steps(), 1);
        let rendered = record.render_pretty(false);
        assert!(rendered.contains("1 of 2 steps"));
        assert!(rendered.contains("• collapse_spaces"));
        assert!(!rendered.contains("• dashes"));
        assert!(rendered.contains("[- ]"));
    }
}
