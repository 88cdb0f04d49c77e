use crate::dispatch::DispatchConfig;
use crate::text::Separator;
use anyhow::{anyhow, Context, Result};
use jsonc_parser::{parse_to_serde_value, ParseOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::time;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub line_by_line_enabled: bool,

    #[serde(default = "default_line_by_line_delay_ms")]
    pub line_by_line_delay_ms: u64,

    #[serde(default)]
    pub line_by_line_separator: Separator,

    #[serde(default = "default_line_by_line_max_segments")]
    pub line_by_line_max_segments: usize,

    #[serde(default)]
    pub remove_metadata: bool,

    #[serde(default = "default_auto_copy_clipboard")]
    pub auto_copy_clipboard: bool,

    #[serde(default = "default_status_file")]
    pub status_file: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_line_by_line_delay_ms() -> u64 {
    800
}

fn default_line_by_line_max_segments() -> usize {
    10
}

fn default_auto_copy_clipboard() -> bool {
    true
}

fn default_status_file() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            line_by_line_enabled: false,
            line_by_line_delay_ms: default_line_by_line_delay_ms(),
            line_by_line_separator: Separator::default(),
            line_by_line_max_segments: default_line_by_line_max_segments(),
            remove_metadata: false,
            auto_copy_clipboard: default_auto_copy_clipboard(),
            status_file: default_status_file(),
        }
    }
}

impl Config {
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig::new(
            self.line_by_line_separator,
            self.line_by_line_delay_ms,
            self.line_by_line_max_segments,
        )
    }
}

#[derive(Clone)]
pub struct ConfigManager {
    inner: Arc<ConfigManagerInner>,
}

struct ConfigManagerInner {
    config: RwLock<Config>,
    config_path: PathBuf,
    change_tx: watch::Sender<Config>,
    watcher_active: AtomicBool,
}

impl ConfigManager {
    pub fn load() -> Result<Self> {
        let config_dir = directories::ProjectDirs::from("", "", "cleanpaste-rs")
            .context("Failed to get config directory")?
            .config_dir()
            .to_path_buf();

        fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        let jsonc_path = config_dir.join("config.jsonc");
        let legacy_path = config_dir.join("config.json");

        if !jsonc_path.exists() && legacy_path.exists() {
            let config = Self::read_config_from_disk(&legacy_path)?;
            Self::write_config_file(&jsonc_path, &config)?;
            tracing::info!(
                "Migrated legacy config to JSONC: {:?} -> {:?}",
                legacy_path,
                jsonc_path
            );
        }

        Self::load_from(jsonc_path)
    }

    /// Loads the config at `config_path`, writing defaults there when the
    /// file does not exist yet.
    pub fn load_from(config_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = config_path.into();

        let config = if config_path.exists() {
            Self::read_config_from_disk(&config_path)?
        } else {
            let default_config = Config::default();
            Self::write_config_file(&config_path, &default_config)?;
            tracing::info!("Created default config at: {:?}", config_path);
            default_config
        };

        tracing::info!("Loaded config from: {:?}", config_path);

        let (change_tx, _) = watch::channel(config.clone());

        Ok(Self {
            inner: Arc::new(ConfigManagerInner {
                config: RwLock::new(config),
                config_path,
                change_tx,
                watcher_active: AtomicBool::new(false),
            }),
        })
    }

    pub fn start_watching(&self) {
        if self.inner.watcher_active.swap(true, Ordering::SeqCst) {
            return;
        }

        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let mut last_state = Self::file_state(&inner.config_path);
            let mut ticker = time::interval(Duration::from_millis(500));

            loop {
                ticker.tick().await;

                let current_state = Self::file_state(&inner.config_path);
                if current_state == last_state {
                    continue;
                }

                last_state = current_state;

                match Self::read_config_from_disk(&inner.config_path) {
                    Ok(new_config) => {
                        let mut guard = inner.config.write().expect("config lock poisoned");
                        if *guard != new_config {
                            let old_config = guard.clone();
                            *guard = new_config.clone();
                            drop(guard);

                            if inner.change_tx.send(new_config.clone()).is_ok() {
                                tracing::info!("Reloaded config from: {:?}", inner.config_path);
                                tracing::debug!(
                                    ?old_config,
                                    ?new_config,
                                    "Config watcher applied update"
                                );
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!("Failed to reload config: {err}");
                    }
                }
            }
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<Config> {
        self.inner.change_tx.subscribe()
    }

    pub fn get(&self) -> Config {
        self.inner
            .config
            .read()
            .expect("config lock poisoned")
            .clone()
    }

    pub fn path(&self) -> &Path {
        &self.inner.config_path
    }

    /// Replaces the current config, persists it and notifies subscribers.
    pub fn save(&self, config: Config) -> Result<()> {
        Self::write_config_file(&self.inner.config_path, &config)?;

        {
            let mut guard = self.inner.config.write().expect("config lock poisoned");
            *guard = config.clone();
        }

        self.inner.change_tx.send_replace(config);

        tracing::info!("Saved config to: {:?}", self.inner.config_path);
        Ok(())
    }

    fn read_config_from_disk(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {:?}", path))?;
        Self::parse_config(&content)
    }

    fn write_config_file(path: &Path, config: &Config) -> Result<()> {
        let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
        fs::write(path, json).with_context(|| format!("Failed to write config file at {:?}", path))
    }

    fn parse_config(content: &str) -> Result<Config> {
        let value = parse_to_serde_value(content, &ParseOptions::default())
            .context("Failed to parse config as JSONC")?
            .ok_or_else(|| anyhow!("Config file did not contain a JSON value"))?;
        serde_json::from_value(value).context("Failed to deserialize config")
    }

    fn file_state(path: &Path) -> Option<(SystemTime, u64)> {
        let metadata = fs::metadata(path).ok()?;
        let modified = metadata.modified().ok()?;
        Some((modified, metadata.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_jsonc_with_defaults() {
        let content = r#"{
            // send each paragraph separately
            "line_by_line_enabled": true,
            "line_by_line_separator": "line",
            "line_by_line_delay_ms": 1200
        }"#;

        let config = ConfigManager::parse_config(content).expect("parse config");
        assert!(config.enabled);
        assert!(config.line_by_line_enabled);
        assert_eq!(config.line_by_line_separator, Separator::Line);
        assert_eq!(config.line_by_line_delay_ms, 1200);
        assert_eq!(config.line_by_line_max_segments, 10);
        assert!(!config.remove_metadata);
    }

    #[test]
    fn rejects_unknown_separator() {
        let err = ConfigManager::parse_config(r#"{ "line_by_line_separator": "word" }"#)
            .unwrap_err();
        assert!(err.to_string().contains("deserialize"));
    }

    #[test]
    fn creates_defaults_and_persists_saves() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.jsonc");

        let manager = ConfigManager::load_from(&path).expect("load config");
        assert!(path.exists());
        assert_eq!(manager.get(), Config::default());

        let mut rx = manager.subscribe();
        let updated = Config {
            remove_metadata: true,
            line_by_line_max_segments: 7,
            ..Config::default()
        };
        manager.save(updated.clone()).expect("save config");

        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(*rx.borrow_and_update(), updated);

        let reloaded = ConfigManager::load_from(&path).expect("reload config");
        assert_eq!(reloaded.get(), updated);
    }

    #[test]
    fn dispatch_config_is_clamped() {
        let config = Config {
            line_by_line_delay_ms: 10,
            line_by_line_max_segments: 50,
            ..Config::default()
        };
        let dispatch = config.dispatch_config();
        assert_eq!(dispatch.delay, Duration::from_millis(300));
        assert_eq!(dispatch.max_segments, 20);
        assert_eq!(dispatch.separator, Separator::Paragraph);
    }
}
