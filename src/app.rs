use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfigManager};
use crate::dispatch::{DeliverySink, DispatchOutcome, Dispatcher, Progress};
use crate::input::TextInjector;
use crate::status::StatusWriter;
use crate::text::{
    needs_normalization, normalization_stats, normalize, remove_whatsapp_metadata,
    NormalizationStats,
};

/// What happened to one paste.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasteReport {
    /// The cleaned text that was inserted or split into messages.
    pub text: String,
    /// Lengths are UTF-16 code units, like `stats`.
    pub original_len: usize,
    pub normalized_len: usize,
    pub was_normalized: bool,
    pub line_by_line: bool,
    /// False when single-shot insertion found no input to type into.
    pub delivered: bool,
    pub stats: NormalizationStats,
    pub outcome: Option<DispatchOutcome>,
}

/// Cleans `text` according to `config` and delivers it through `sink`.
///
/// Returns `None` when the paste is left alone: cleanup is disabled or there
/// is no text. Multi-line text goes through `dispatcher` as separate messages
/// when line-by-line mode is on; everything else is inserted once.
pub async fn handle_paste<S: DeliverySink>(
    config: &Config,
    dispatcher: &Dispatcher,
    text: &str,
    sink: &mut S,
) -> Option<PasteReport> {
    if !config.enabled {
        debug!("Cleanup disabled, leaving paste untouched");
        return None;
    }
    if text.is_empty() {
        return None;
    }

    let normalized = clean_text(config, text);
    let stats = normalization_stats(text, &normalized);
    let was_normalized = needs_normalization(text);
    if was_normalized {
        info!(
            "🧹 Text normalized: {} -> {} characters ({} changed)",
            utf16_len(text),
            utf16_len(&normalized),
            stats.chars_changed
        );
    }

    let line_by_line = config.line_by_line_enabled && normalized.contains('\n');
    let mut delivered = true;
    let outcome = if line_by_line {
        let outcome = dispatcher
            .start(&normalized, &config.dispatch_config(), sink)
            .await;
        Some(outcome)
    } else {
        match sink.locate_target() {
            Some(mut target) => sink.insert(&mut target, &normalized),
            None => {
                error!("Could not find an input to paste into");
                delivered = false;
            }
        }
        None
    };

    Some(PasteReport {
        original_len: utf16_len(text),
        normalized_len: utf16_len(&normalized),
        was_normalized,
        line_by_line,
        delivered,
        stats,
        outcome,
        text: normalized,
    })
}

// Same unit as `NormalizationStats`.
fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Metadata stripping (when enabled) followed by normalization.
pub fn clean_text(config: &Config, text: &str) -> String {
    if config.remove_metadata {
        let stripped = remove_whatsapp_metadata(text);
        debug!("Chat metadata removed");
        normalize(&stripped)
    } else {
        normalize(text)
    }
}

/// Wraps a sink so progress also lands in the status file.
struct StatusSink<'a, S> {
    inner: &'a mut S,
    status_writer: Option<&'a StatusWriter>,
}

impl<S: DeliverySink> DeliverySink for StatusSink<'_, S> {
    type Target = S::Target;

    fn locate_target(&mut self) -> Option<S::Target> {
        self.inner.locate_target()
    }

    fn insert(&mut self, target: &mut S::Target, text: &str) {
        self.inner.insert(target, text);
    }

    fn trigger_send(&mut self, target: &mut S::Target) -> bool {
        self.inner.trigger_send(target)
    }

    fn on_progress(&mut self, progress: Progress) {
        info!("Sending {}/{}... (Ctrl+C to cancel)", progress.current, progress.total);
        if let Some(writer) = self.status_writer {
            if let Err(err) = writer.set_progress(&progress) {
                warn!("Failed to update send status: {}", err);
            }
        }
        self.inner.on_progress(progress);
    }

    fn on_terminal(&mut self, sent: usize, cancelled: bool) {
        if let Some(writer) = self.status_writer {
            if let Err(err) = writer.set_finished(sent, cancelled) {
                warn!("Failed to update send status: {}", err);
            }
        }
        self.inner.on_terminal(sent, cancelled);
    }
}

pub struct CleanPasteApp<S = TextInjector> {
    config_manager: ConfigManager,
    current_config: Config,
    sink: S,
    status_writer: Option<StatusWriter>,
    dispatcher: Dispatcher,
    paste_count: usize,
}

impl CleanPasteApp<TextInjector> {
    pub fn new(config_manager: ConfigManager) -> Result<Self> {
        Self::with_sink(config_manager, TextInjector::new())
    }

    /// Pastes the clipboard into the focused window.
    ///
    /// A single-shot paste whose typing failed is reported as not delivered.
    /// Otherwise the cleaned text replaces the clipboard when configured.
    pub async fn paste_clipboard(&mut self) -> Result<Option<PasteReport>> {
        let text = self.sink.read_clipboard()?;
        let Some(mut report) = self.paste_text(&text).await else {
            return Ok(None);
        };

        if report.outcome.is_none() {
            if let Some(err) = self.sink.take_insert_error() {
                error!("Paste was not typed: {}", err);
                report.delivered = false;
            }
        }

        if self.current_config.auto_copy_clipboard && report.delivered && !report.line_by_line {
            if let Err(err) = self.sink.copy_to_clipboard(&report.text) {
                warn!("Failed to copy cleaned text to clipboard: {}", err);
            }
        }

        Ok(Some(report))
    }
}

impl<S: DeliverySink> CleanPasteApp<S> {
    pub fn with_sink(config_manager: ConfigManager, sink: S) -> Result<Self> {
        let config = config_manager.get();
        let status_writer = build_status_writer(&config)?;

        Ok(Self {
            config_manager,
            current_config: config,
            sink,
            status_writer,
            dispatcher: Dispatcher::new(),
            paste_count: 0,
        })
    }

    /// Handle for cancelling or watching runs from another task.
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    pub fn config(&self) -> &Config {
        &self.current_config
    }

    pub fn config_manager(&self) -> &ConfigManager {
        &self.config_manager
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub async fn paste_text(&mut self, text: &str) -> Option<PasteReport> {
        if self.dispatcher.is_running() {
            warn!("Still sending the previous paste, ignoring");
            return None;
        }

        if let Some(writer) = &self.status_writer {
            if let Err(err) = writer.clear() {
                warn!("Failed to reset send status: {}", err);
            }
        }

        let mut sink = StatusSink {
            inner: &mut self.sink,
            status_writer: self.status_writer.as_ref(),
        };
        let report = handle_paste(&self.current_config, &self.dispatcher, text, &mut sink).await?;

        self.paste_count += 1;
        debug!(?report, paste_count = self.paste_count, "Paste processed");
        Some(report)
    }

    pub fn paste_count(&self) -> usize {
        self.paste_count
    }

    pub fn reset_paste_count(&mut self) {
        self.paste_count = 0;
    }

    pub fn apply_config_update(&mut self, new_config: Config) -> Result<()> {
        if new_config == self.current_config {
            debug!("Config unchanged; ignoring update");
            return Ok(());
        }

        if self.dispatcher.is_running() {
            warn!("Skipping config refresh while sending");
            return Ok(());
        }

        self.status_writer = build_status_writer(&new_config)?;
        self.current_config = new_config;

        info!("Configuration updated");
        debug!(?self.current_config, "Config state after update");
        Ok(())
    }
}

fn build_status_writer(config: &Config) -> Result<Option<StatusWriter>> {
    if config.status_file {
        StatusWriter::new().map(Some)
    } else {
        Ok(None)
    }
}
