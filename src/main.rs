pub mod mqtt;
pub mod persistence;
pub mod ui;

use color_eyre::eyre::{eyre, Result};
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::mqtt::session_manager::SessionManager;
use crate::mqtt::transport::MqttTransport;
use crate::persistence::settings_store::SettingsStore;
use crate::ui::DashboardUi;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let settings_store = SettingsStore::new();
    let stored = settings_store.load().await;
    if stored.is_some() {
        info!("Loaded stored broker settings");
    }

    let (session_tx, session_rx) = mpsc::channel(100);
    let (view_tx, view_rx) = mpsc::channel(100);

    let manager = SessionManager::new(
        Box::new(MqttTransport),
        settings_store,
        session_tx.clone(),
        view_tx,
    );
    let _session_handle = tokio::spawn(manager.run(session_rx));

    info!("Starting dashboard UI");
    let native_options = eframe::NativeOptions::default();
    eframe::run_native(
        "Smart IoT Monitor",
        native_options,
        Box::new(move |cc| Ok(Box::new(DashboardUi::new(cc, view_rx, session_tx, stored)))),
    )
    .map_err(|e| eyre!("UI error: {}", e))?;

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
