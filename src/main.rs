use anyhow::{Context, Result};
use cleanpaste_rs::{
    clean_text, logging::TextPipelineFormatter, text::normalization_stats, CleanPasteApp,
    ConfigManager, Dispatcher, PasteReport,
};
use std::env;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Time to switch focus to the chat window before typing starts.
const FOCUS_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cleanpaste_rs=info,cleanpaste=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .event_format(TextPipelineFormatter::new()),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|arg| arg == "--stdin") {
        return run_stdin_mode().await;
    }

    let config_manager = ConfigManager::load()?;
    let config = config_manager.get();
    info!("✅ Configuration loaded from {:?}", config_manager.path());
    info!("   Cleanup enabled: {}", config.enabled);
    info!(
        "   Line-by-line: {} (by {}, {}ms apart, max {})",
        config.line_by_line_enabled,
        config.line_by_line_separator,
        config.line_by_line_delay_ms,
        config.line_by_line_max_segments
    );
    info!("   Remove chat metadata: {}", config.remove_metadata);

    let mut app = CleanPasteApp::new(config_manager)?;

    if args.iter().any(|arg| arg == "--paste") {
        return run_paste_once(&mut app).await;
    }

    run_interactive(app).await
}

/// Reads text from stdin and writes the cleaned version to stdout.
async fn run_stdin_mode() -> Result<()> {
    let config = ConfigManager::load()?.get();

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read stdin")?;

    let cleaned = clean_text(&config, &input);
    let stats = normalization_stats(&input, &cleaned);
    info!(
        "Removed {} characters, changed {}, {} fewer lines",
        stats.chars_removed, stats.chars_changed, stats.lines_reduced
    );

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(cleaned.as_bytes())
        .await
        .context("Failed to write stdout")?;
    stdout.flush().await.context("Failed to flush stdout")?;
    Ok(())
}

async fn run_paste_once(app: &mut CleanPasteApp) -> Result<()> {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    spawn_cancel_handler(app.dispatcher(), shutdown_tx);

    info!("Switch to the chat window, pasting in {}s", FOCUS_GRACE.as_secs());
    tokio::select! {
        _ = tokio::time::sleep(FOCUS_GRACE) => {}
        _ = &mut shutdown_rx => {
            info!("Paste aborted");
            return Ok(());
        }
    }

    match app.paste_clipboard().await? {
        Some(report) => log_report(&report),
        None => info!("Nothing to paste"),
    }
    Ok(())
}

async fn run_interactive(mut app: CleanPasteApp) -> Result<()> {
    info!("🧪 Press Enter to paste the cleaned clipboard, Ctrl+C to cancel or quit");

    app.config_manager().start_watching();
    let mut config_rx = app.config_manager().subscribe();

    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    spawn_cancel_handler(app.dispatcher(), shutdown_tx);

    let mut reader = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = reader.next_line() => {
                match line {
                    Ok(Some(_)) => {
                        info!("Pasting in {}s", FOCUS_GRACE.as_secs());
                        tokio::time::sleep(FOCUS_GRACE).await;
                        match app.paste_clipboard().await {
                            Ok(Some(report)) => log_report(&report),
                            Ok(None) => info!("Nothing to paste"),
                            Err(e) => error!("Paste failed: {:#}", e),
                        }
                        info!("Session pastes: {}", app.paste_count());
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("Error reading input: {}", e);
                        break;
                    }
                }
            }
            result = config_rx.changed() => {
                match result {
                    Ok(()) => {
                        let updated = config_rx.borrow_and_update().clone();
                        if let Err(err) = app.apply_config_update(updated) {
                            warn!("Failed to apply config update: {}", err);
                        }
                    }
                    Err(_) => {
                        info!("Configuration watcher closed");
                        break;
                    }
                }
            }
            _ = &mut shutdown_rx => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("🛑 Shutting down cleanpaste-rs");
    Ok(())
}

/// Ctrl+C cancels an active run; when idle it requests shutdown.
fn spawn_cancel_handler(dispatcher: Dispatcher, shutdown_tx: oneshot::Sender<()>) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
            if dispatcher.is_running() {
                info!("Cancelling line-by-line send");
                dispatcher.cancel();
                continue;
            }
            let _ = shutdown_tx.send(());
            return;
        }
    });
}

fn log_report(report: &PasteReport) {
    match report.outcome {
        Some(outcome) => info!(
            "Sent {} message(s){} ({})",
            outcome.sent,
            if outcome.cancelled { ", cancelled" } else { "" },
            outcome.stop
        ),
        None if report.delivered => info!("Pasted {} characters", report.normalized_len),
        None => warn!("Paste was not delivered"),
    }
}
