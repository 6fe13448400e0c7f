use anyhow::Context;
use clap::Parser;
use pi_gatt_server::domain::settings::{MediaEndpointSettings, Settings, SettingsService};
use pi_gatt_server::infrastructure::bluez::BluezConnector;
use pi_gatt_server::infrastructure::logging::init_logger;
use pi_gatt_server::infrastructure::thermal::ThermalZoneSensor;
use pi_gatt_server::GattServer;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, info_span, warn};

#[derive(Parser, Debug)]
#[command(name = "pi_gatt_server", version, about = "BLE GATT peripheral for BlueZ")]
struct Cli {
    /// Settings file (default: <config dir>/pi-gatt-server/settings.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// Override the adapter object path, e.g. /org/bluez/hci1
    #[arg(long)]
    adapter: Option<String>,

    /// Register the media endpoint stub even if the settings omit it
    #[arg(long)]
    media_endpoint: bool,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(level) = &self.log_level {
            settings.log_settings.level = level.clone();
        }
        if let Some(adapter) = &self.adapter {
            settings.adapter_path = adapter.clone();
        }
        if self.media_endpoint && settings.media_endpoint.is_none() {
            settings.media_endpoint = Some(MediaEndpointSettings::default());
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let settings_service = SettingsService::new(cli.config.clone())?;
    let settings_path = settings_service.path().to_path_buf();
    let load_error = settings_service.load_error().map(|e| format!("{:#}", e));
    let corrections = settings_service.corrections().to_vec();
    let mut settings = settings_service.into_settings();
    cli.apply(&mut settings);

    let _logging_guard = init_logger(&settings.log_settings)?;
    info!("Settings: {}", settings_path.display());
    if let Some(e) = load_error {
        warn!("Using default settings ({}: {})", settings_path.display(), e);
    }
    for correction in corrections {
        warn!("Settings: {}", correction);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run(settings))
}

async fn run(settings: Settings) -> anyhow::Result<ExitCode> {
    let connector = Arc::new(BluezConnector::new(
        settings.adapter_path.clone(),
        info_span!("bluez", adapter = %settings.adapter_path),
    ));
    let sensor = Arc::new(ThermalZoneSensor::new(&settings.sensor_path));
    let server = GattServer::new(settings, connector, sensor);

    if let Err(e) = server.start().await {
        error!("Startup failed: {}", e);
        server.stop().await;
        return Ok(ExitCode::FAILURE);
    }

    wait_for_shutdown().await?;
    info!("Shutting down");
    server.stop().await;
    Ok(ExitCode::SUCCESS)
}

/// Resolve on SIGINT or SIGTERM.
async fn wait_for_shutdown() -> anyhow::Result<()> {
    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for SIGINT")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}
