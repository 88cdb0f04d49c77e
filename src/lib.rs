pub mod app;
pub mod config;
pub mod dispatch;
pub mod input;
pub mod logging;
pub mod status;
pub mod text;

pub use app::{clean_text, handle_paste, CleanPasteApp, PasteReport};
pub use config::{Config, ConfigManager};
pub use dispatch::{DeliverySink, DispatchConfig, DispatchOutcome, Dispatcher, Progress, StopReason};
pub use status::StatusWriter;
