use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::error::{Result, VaultError};
use crate::simulation::{run_paper_session, SimulationParams};

#[derive(Parser)]
#[command(name = "copyvault")]
#[command(version = "0.1.0")]
#[command(about = "Round-based copy-trading vault engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml plus <COPYVAULT_ENV>.toml)
    #[arg(short, long, default_value = "config", env = "COPYVAULT_CONFIG_DIR")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load, validate and print the effective configuration
    CheckConfig,
    /// Run an in-memory paper session and print each settlement as JSON
    Simulate {
        /// Number of rounds to settle
        #[arg(long, default_value = "3")]
        rounds: u32,
        /// Position gain per round in basis points
        #[arg(long, default_value = "500")]
        gain_bps: u32,
        /// Write the final state checkpoint to this file
        #[arg(long)]
        checkpoint_out: Option<PathBuf>,
    },
}

/// Load and validate configuration, printing it as TOML
pub fn check_config(config_dir: &Path) -> Result<AppConfig> {
    let config = AppConfig::load_from(config_dir)?;
    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("  - {}", error);
        }
        return Err(VaultError::Validation(format!(
            "{} configuration problem(s) in {}",
            errors.len(),
            config_dir.display()
        )));
    }

    let rendered = toml::to_string_pretty(&config)
        .map_err(|e| anyhow::anyhow!("failed to render config: {}", e))?;
    println!("{}", rendered);
    Ok(config)
}

/// Run the paper session and print settlements, one JSON document per line
pub async fn simulate(
    config: &AppConfig,
    rounds: u32,
    gain_bps: u32,
    checkpoint_out: Option<&Path>,
) -> Result<()> {
    let params = SimulationParams {
        rounds,
        gain_bps,
        ..Default::default()
    };
    let report = run_paper_session(config, &params).await?;

    for settlement in &report.settlements {
        println!("{}", serde_json::to_string(settlement)?);
    }
    println!("{}", serde_json::to_string(&report.snapshot)?);

    if let Some(path) = checkpoint_out {
        report.checkpoint.save_to(path)?;
    }
    Ok(())
}
