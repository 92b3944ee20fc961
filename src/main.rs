use anyhow::Result;
use radarscope::config::AppConfig;
use radarscope::device::{DeviceApi, HttpDevice};
use radarscope::session::{self, Session};
use radarscope::settings::SettingsSync;
use radarscope::ui::{self, UiHandle};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = AppConfig::from_env();

    tracing::info!(
        "Starting radarscope against {} (log: {:?})",
        config.device_url,
        config.log_name
    );

    let device: Arc<dyn DeviceApi> = Arc::new(HttpDevice::new(&config.device_url));
    let (ui, ui_rx) = UiHandle::channel();
    let ui_task = ui::spawn_ui_logger(ui_rx);

    let settings = SettingsSync::new(
        Arc::clone(&device),
        ui.clone(),
        Duration::from_millis(config.debounce_ms),
    );
    settings.load().await;

    let live_task = session::spawn_live_poll(
        Arc::clone(&device),
        ui.clone(),
        Duration::from_millis(config.live_poll_ms),
    );

    let mut session = Session::new(
        Arc::clone(&device),
        ui.clone(),
        config.log_name.clone(),
        config.chunk_limit,
    );

    if session.log_name.is_empty() {
        session.refresh_status().await;
        session.refresh_logs().await;
    } else if let Some(data) = session.load_chunk().await {
        tracing::info!(
            "decoded {} sample(s), {} left motion span(s), {} right motion span(s)",
            data.sample_count,
            data.motion_left.len(),
            data.motion_right.len()
        );
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    live_task.abort();
    ui_task.abort();
    Ok(())
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn"));
    let _ = fmt().with_env_filter(env_filter).try_init();
}
