//! Application entry point for the grove growth animation viewer.
//!
//! Parses the command line, installs logging and hands the window over to
//! [`Viewer`], which hosts the choreography engine.

mod host;
mod surface;
mod viewer;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use grove_core::EngineConfig;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use viewer::Viewer;

#[derive(Debug, Parser)]
#[command(name = "grove_anim")]
#[command(about = "Seed-to-fruit growth animation, repeated a fixed number of times")]
struct Args {
    /// JSON engine configuration; missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of growth cycles before the tree comes to rest.
    #[arg(long)]
    cycles: Option<u32>,

    /// Number of generated crown leaves.
    #[arg(long)]
    leaves: Option<usize>,

    /// Seed for leaf placement and timing jitter.
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    /// Loads the config file (if any) and applies command-line overrides.
    fn resolve_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(cycles) = self.cycles {
            config.max_cycles = cycles;
        }
        if let Some(leaves) = self.leaves {
            config.leaf_count = leaves;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("grove_core=info,grove_anim=info"));
    fmt().with_env_filter(filter).with_target(true).compact().init();

    let config = Args::parse().resolve_config()?;
    info!(
        cycles = config.max_cycles,
        leaves = config.leaf_count,
        seed = ?config.seed,
        "starting grove viewer"
    );

    eframe::run_native(
        "Grove",
        eframe::NativeOptions::default(),
        Box::new(|cc| Ok(Box::new(Viewer::new(cc.egui_ctx.clone(), config)?))),
    )
    .map_err(|err| anyhow::anyhow!("viewer failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_arguments() {
        let args = Args::try_parse_from(["grove_anim"]).unwrap();
        let config = args.resolve_config().unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let args =
            Args::try_parse_from(["grove_anim", "--cycles", "3", "--leaves", "8", "--seed", "42"])
                .unwrap();
        let config = args.resolve_config().unwrap();

        assert_eq!(config.max_cycles, 3);
        assert_eq!(config.leaf_count, 8);
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let args = Args::try_parse_from(["grove_anim", "--cycles", "0"]).unwrap();
        assert!(args.resolve_config().is_err());

        assert!(Args::try_parse_from(["grove_anim", "--leaves", "many"]).is_err());
    }

    #[test]
    fn missing_config_file_is_reported() {
        let args =
            Args::try_parse_from(["grove_anim", "--config", "/nonexistent/grove.json"]).unwrap();
        let err = args.resolve_config().unwrap_err();
        assert!(err.to_string().contains("/nonexistent/grove.json"));
    }

    #[test]
    fn config_file_is_overridden_by_flags() {
        let path = std::env::temp_dir().join(format!("grove-args-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "max_cycles": 4, "leaf_count": 6 }"#).unwrap();

        let args = Args::try_parse_from([
            "grove_anim",
            "--config",
            path.to_str().unwrap(),
            "--leaves",
            "10",
        ])
        .unwrap();
        let config = args.resolve_config().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.max_cycles, 4);
        assert_eq!(config.leaf_count, 10);
    }
}
