//! Command line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;

use crate::dataset::SplitConfig;

pub const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

#[derive(Parser, Debug)]
#[command(author, version, about = "Bank customer churn prediction service", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(short, long, action = ArgAction::Count, global = true, help = "Verbose level")]
    pub verbose: u8,

    #[arg(
        long,
        env = "CHURN_DATA_PATH",
        default_value = "resources/Churn_Modelling.csv",
        global = true,
        help = "Churn dataset CSV"
    )]
    pub data_path: PathBuf,

    #[arg(
        long,
        env = "CHURN_MODELS_DIR",
        default_value = "models",
        global = true,
        help = "Directory holding one <key>.json artifact per model"
    )]
    pub models_dir: PathBuf,

    #[arg(
        long,
        env = "CHURN_FONT_PATH",
        default_value = DEFAULT_FONT_PATH,
        global = true,
        help = "TrueType font used for chart text"
    )]
    pub font_path: PathBuf,

    #[arg(
        long,
        env = "CHURN_TEST_SIZE",
        default_value_t = 0.3,
        global = true,
        help = "Share of each class held out for evaluation"
    )]
    pub test_size: f64,

    #[arg(long, env = "CHURN_SEED", default_value_t = 10, global = true, help = "Split and model seed")]
    pub seed: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve predictions and reports over HTTP.
    Serve {
        #[arg(long, env = "CHURN_BIND", default_value = "127.0.0.1:8000")]
        bind: SocketAddr,
    },
    /// Fit every model and write the artifacts.
    Train,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    pub fn settings(&self) -> Settings {
        Settings {
            data_path: self.data_path.clone(),
            models_dir: self.models_dir.clone(),
            font_path: Some(self.font_path.clone()),
            split: SplitConfig {
                test_size: self.test_size,
                seed: self.seed,
            },
        }
    }
}

/// Resolved, immutable settings shared by the pipeline and the server.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub data_path: PathBuf,
    pub models_dir: PathBuf,
    pub font_path: Option<PathBuf>,
    pub split: SplitConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_split() {
        let cli = Cli::try_parse_from(["churn-analytics", "train"]).unwrap();
        assert_eq!(cli.command, Command::Train);
        assert_eq!(cli.log_level(), LevelFilter::Info);
        let settings = cli.settings();
        assert_eq!(settings.split, SplitConfig::default());
        assert_eq!(settings.models_dir, PathBuf::from("models"));
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "churn-analytics",
            "-vv",
            "--test-size",
            "0.25",
            "--seed",
            "3",
            "serve",
            "--bind",
            "0.0.0.0:9000",
        ])
        .unwrap();
        assert_eq!(cli.log_level(), LevelFilter::Trace);
        assert_eq!(cli.settings().split, SplitConfig { test_size: 0.25, seed: 3 });
        assert_eq!(
            cli.command,
            Command::Serve {
                bind: "0.0.0.0:9000".parse().unwrap()
            }
        );
    }
}
