//! biomon - realtime ECG / EMG / heart rate monitor.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Realtime biosignal monitor
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via BIOMON_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Feed the pipeline from the built-in simulator instead of the database
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    biomon_telemetry::init_logging()?;

    info!("Starting biomon v{}", env!("CARGO_PKG_VERSION"));

    let mut config = biomon_app::AppConfig::load(args.config.as_deref())?;
    if args.simulate {
        config.mode = biomon_app::OperatingMode::Simulated;
    }
    info!(mode = ?config.mode, database_url = %config.database_url, "Configuration loaded");

    let app = biomon_app::Application::new(config)?;
    app.run().await?;

    Ok(())
}
