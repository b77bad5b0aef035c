use std::process::ExitCode;

use hearth_core::config::{EngineConfig, LoadOptions, LogFormat};

fn init_logging(config: &EngineConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        LogFormat::Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logging respects the configured level and format; a broken config
    // file still gets default logging so the error itself is visible.
    match EngineConfig::load(LoadOptions::default()) {
        Ok(config) => init_logging(&config),
        Err(_) => init_logging(&EngineConfig::default()),
    }

    hearth_cli::run().await
}
