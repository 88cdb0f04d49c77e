use crate::dispatch::DeliverySink;
use anyhow::{Context, Result};
use arboard::Clipboard;
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("keyboard backend unavailable: {0}")]
    Backend(String),
    #[error("failed to type text: {0}")]
    Typing(String),
    #[error("failed to press {key}: {reason}")]
    KeyPress { key: &'static str, reason: String },
}

/// One keyboard action needed to type a piece of text into a chat input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingStep<'a> {
    Text(&'a str),
    /// Shift+Enter: a line break that does not submit the message.
    SoftBreak,
}

/// Plain Enter submits in most chat inputs, so line breaks inside one
/// message are typed as Shift+Enter.
pub fn typing_steps(text: &str) -> Vec<TypingStep<'_>> {
    let mut steps = Vec::new();
    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            steps.push(TypingStep::SoftBreak);
        }
        if !line.is_empty() {
            steps.push(TypingStep::Text(line));
        }
    }
    steps
}

/// Marker for "the window that currently has keyboard focus".
#[derive(Debug)]
pub struct FocusedInput;

/// Types text into the focused window and presses Enter to send it.
pub struct TextInjector {
    enigo: Option<Enigo>,
    clipboard: Option<Clipboard>,
    pending_error: Option<InjectError>,
}

impl Default for TextInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl TextInjector {
    pub fn new() -> Self {
        Self {
            enigo: None,
            clipboard: None,
            pending_error: None,
        }
    }

    pub fn read_clipboard(&mut self) -> Result<String> {
        self.clipboard()?
            .get_text()
            .context("Clipboard does not hold text")
    }

    pub fn copy_to_clipboard(&mut self, text: &str) -> Result<()> {
        self.clipboard()?
            .set_text(text)
            .context("Failed to write text to clipboard")?;
        debug!("Cleaned text copied to clipboard");
        Ok(())
    }

    /// Takes the error left by the last insert, if it failed.
    ///
    /// Line-by-line runs consume it in `trigger_send`; single-shot pastes
    /// never send, so the caller checks here instead.
    pub fn take_insert_error(&mut self) -> Option<InjectError> {
        self.pending_error.take()
    }

    // Only the most recent insert decides whether the next send goes out.
    fn record_insert(&mut self, result: Result<(), InjectError>) {
        self.pending_error = match result {
            Ok(()) => None,
            Err(err) => {
                warn!("Typing into focused window failed: {}", err);
                Some(err)
            }
        };
    }

    fn clipboard(&mut self) -> Result<&mut Clipboard> {
        if self.clipboard.is_none() {
            self.clipboard = Some(Clipboard::new().context("Failed to initialize clipboard")?);
        }
        self.clipboard
            .as_mut()
            .context("Clipboard not initialized")
    }

    fn keyboard(&mut self) -> Result<&mut Enigo, InjectError> {
        if self.enigo.is_none() {
            let enigo = Enigo::new(&Settings::default())
                .map_err(|err| InjectError::Backend(err.to_string()))?;
            self.enigo = Some(enigo);
        }
        self.enigo
            .as_mut()
            .ok_or_else(|| InjectError::Backend("not initialized".to_string()))
    }

    fn type_text(&mut self, text: &str) -> Result<(), InjectError> {
        let enigo = self.keyboard()?;
        for step in typing_steps(text) {
            match step {
                TypingStep::Text(chunk) => enigo
                    .text(chunk)
                    .map_err(|err| InjectError::Typing(err.to_string()))?,
                TypingStep::SoftBreak => {
                    press(enigo, Key::Shift, Direction::Press, "Shift")?;
                    let pressed = press(enigo, Key::Return, Direction::Click, "Shift+Enter");
                    press(enigo, Key::Shift, Direction::Release, "Shift")?;
                    pressed?;
                }
            }
        }
        Ok(())
    }
}

fn press(
    enigo: &mut Enigo,
    key: Key,
    direction: Direction,
    name: &'static str,
) -> Result<(), InjectError> {
    enigo
        .key(key, direction)
        .map_err(|err| InjectError::KeyPress {
            key: name,
            reason: err.to_string(),
        })
}

impl DeliverySink for TextInjector {
    type Target = FocusedInput;

    fn locate_target(&mut self) -> Option<FocusedInput> {
        match self.keyboard() {
            Ok(_) => Some(FocusedInput),
            Err(err) => {
                error!("No input to type into: {}", err);
                None
            }
        }
    }

    fn insert(&mut self, _target: &mut FocusedInput, text: &str) {
        let result = self.type_text(text);
        self.record_insert(result);
    }

    // A failed insert is reported here, so nothing half-typed gets sent.
    fn trigger_send(&mut self, _target: &mut FocusedInput) -> bool {
        if let Some(err) = self.pending_error.take() {
            error!("Not sending after failed insert: {}", err);
            return false;
        }

        let enigo = match self.keyboard() {
            Ok(enigo) => enigo,
            Err(err) => {
                error!("Cannot send message: {}", err);
                return false;
            }
        };

        match press(enigo, Key::Return, Direction::Click, "Enter") {
            Ok(()) => true,
            Err(err) => {
                error!("Cannot send message: {}", err);
                false
            }
        }
    }
}
