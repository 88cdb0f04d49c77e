use crate::dispatch::Progress;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Writes line-by-line progress to a small text file so a bar widget or
/// tray script can show it.
pub struct StatusWriter {
    status_file: PathBuf,
}

impl StatusWriter {
    pub fn new() -> Result<Self> {
        let config_dir = directories::ProjectDirs::from("", "", "cleanpaste-rs")
            .context("Failed to get config directory")?
            .config_dir()
            .to_path_buf();

        fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(Self::at(config_dir.join("send_status")))
    }

    pub fn at(status_file: impl Into<PathBuf>) -> Self {
        Self {
            status_file: status_file.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.status_file
    }

    pub fn set_progress(&self, progress: &Progress) -> Result<()> {
        self.write(&format!("sending {}/{}", progress.current, progress.total))
    }

    pub fn set_finished(&self, sent: usize, cancelled: bool) -> Result<()> {
        if cancelled {
            self.write(&format!("cancelled after {sent}"))
        } else {
            self.write(&format!("sent {sent}"))
        }
    }

    /// Removes the file so a widget reading it shows nothing while idle.
    pub fn clear(&self) -> Result<()> {
        if self.status_file.exists() {
            fs::remove_file(&self.status_file).context("Failed to remove send status file")?;
            tracing::debug!("Removed send status file");
        }
        Ok(())
    }

    pub fn read(&self) -> Option<String> {
        fs::read_to_string(&self.status_file)
            .ok()
            .map(|content| content.trim().to_string())
    }

    fn write(&self, status: &str) -> Result<()> {
        fs::write(&self.status_file, status).context("Failed to write send status")?;
        tracing::debug!("Send status: {}", status);
        Ok(())
    }
}
