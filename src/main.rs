mod agent;
mod app;
mod archive;
mod config;
mod error;
mod event;
mod preview;
mod session;
mod theme;

use agent::client::AgentClient;
use agent::AgentBridge;
use app::VibeApp;
use config::Config;
use eframe::egui;
use std::fs;
use std::path::Path;
use std::sync::{mpsc, Mutex};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "VIBEDIT_LOG";

// Logs go to ~/.vibedit/vibedit.log; stderr belongs to the windowing stack.
fn init_tracing(app_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(app_dir)?;
    let log_file = fs::File::create(app_dir.join("vibedit.log"))?;
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let app_dir = config::app_dir();
    if let Err(err) = init_tracing(&app_dir) {
        eprintln!("vibedit: logging disabled: {err}");
    }

    let config = Config::load(&app_dir)?;
    tracing::info!(api = %config.api_base_url, "starting vibedit");

    let (tx, rx) = mpsc::channel();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("vibedit-runtime")
        .build()?;

    let client = AgentClient::new(&config)?;
    let bridge = runtime.block_on(async { AgentBridge::new(client, tx) })?;

    let app = VibeApp::new(rx, bridge, config);
    let _runtime = runtime;

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([1024.0, 640.0])
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        "Vibe Editor",
        native_options,
        Box::new(move |_creation_context| Ok(Box::new(app))),
    )?;

    Ok(())
}
