//! Slimeworks Interactive App
//!
//! Renders the trail field into a window and maps keys to play/pause,
//! single-step and randomization.

mod viewer;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use slime_core::DriverSettings;
use slime_params::SimulationConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML file with `settings` and `config` sections
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Random seed for agent placement and randomization
    #[arg(short, long)]
    seed: Option<u64>,

    #[arg(long)]
    agents: Option<u32>,

    /// Square field edge length, texels
    #[arg(long)]
    size: Option<u32>,

    /// Start paused
    #[arg(long)]
    paused: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub settings: DriverSettings,
    pub config: SimulationConfig,
}

/// Load the config file if any, apply flag overrides and validate the result
fn app_config(cli: &Cli) -> Result<AppConfig> {
    let mut app = match &cli.config {
        Some(path) => {
            log::info!("Loading configuration from {}", path.display());
            serde_yaml::from_str(&std::fs::read_to_string(path)?)?
        }
        None => AppConfig::default(),
    };

    if let Some(seed) = cli.seed {
        app.settings.seed = seed;
    }
    if let Some(agents) = cli.agents {
        app.settings.agent_count = agents;
    }
    if let Some(size) = cli.size {
        app.settings.field_size = [size, size];
    }
    app.settings.validate()?;
    Ok(app)
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let app = app_config(&cli)?;

    log::info!(
        "Starting slimeworks viewer: {}x{} field, {} agents, seed {}",
        app.settings.field_size[0],
        app.settings.field_size[1],
        app.settings.agent_count,
        app.settings.seed
    );

    pollster::block_on(viewer::run_viewer(app, !cli.paused))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_overrides_apply() {
        let cli = Cli::parse_from(["slime-app", "--agents", "500", "--size", "96", "--seed", "3"]);
        let app = app_config(&cli).unwrap();
        assert_eq!(app.settings.agent_count, 500);
        assert_eq!(app.settings.field_size, [96, 96]);
        assert_eq!(app.settings.seed, 3);
    }

    #[test]
    fn zero_agents_or_size_is_an_error() {
        let cli = Cli::parse_from(["slime-app", "--agents", "0"]);
        assert!(app_config(&cli).is_err());

        let cli = Cli::parse_from(["slime-app", "--size", "0"]);
        let err = app_config(&cli).unwrap_err();
        assert!(err.to_string().contains("field_size"), "{}", err);
    }
}
