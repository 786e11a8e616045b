use clap::Parser;
use copyvault::cli::{self, Cli, Commands};
use copyvault::config::{AppConfig, LoggingConfig};
use copyvault::error::Result;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::CheckConfig => {
            init_logging_simple();
            cli::check_config(&cli.config_dir)?;
        }
        Commands::Simulate {
            rounds,
            gain_bps,
            checkpoint_out,
        } => {
            let config = match AppConfig::load_from(&cli.config_dir) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!(
                        "Warning: could not load config from {} ({}), using defaults",
                        cli.config_dir.display(),
                        e
                    );
                    AppConfig::default_config()
                }
            };
            let _guard = init_logging(&config.logging);
            info!("Starting paper session: {} round(s), {} bps/round", rounds, gain_bps);
            if let Err(e) =
                cli::simulate(&config, *rounds, *gain_bps, checkpoint_out.as_deref()).await
            {
                warn!("Paper session failed: {}", e);
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Console (text or JSON) plus an optional daily-rolling file layer
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},copyvault=debug", logging.level)));

    let log_dir = std::env::var("COPYVAULT_LOG_DIR")
        .ok()
        .or_else(|| logging.dir.clone());

    // `rolling::daily` panics if it cannot create its file, so check writability first
    let (file_layer, guard) = match log_dir {
        Some(dir) if std::fs::create_dir_all(&dir).is_ok() => {
            let test_path = std::path::Path::new(&dir).join(".copyvault_write_test");
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&test_path)
            {
                Ok(_) => {
                    let _ = std::fs::remove_file(&test_path);
                    let file_appender = tracing_appender::rolling::daily(&dir, "copyvault.log");
                    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                    let layer = tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true);
                    (Some(layer), Some(guard))
                }
                Err(e) => {
                    eprintln!(
                        "Warning: Could not write to log directory {} ({}), file logging disabled",
                        dir, e
                    );
                    (None, None)
                }
            }
        }
        Some(dir) => {
            eprintln!(
                "Warning: Could not create log directory {}, file logging disabled",
                dir
            );
            (None, None)
        }
        None => (None, None),
    };

    let console_layer = (!logging.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
    });
    let json_layer = logging.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    guard
}

fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .try_init();
}
