use anyhow::Context;
use clap::Parser;
use env_logger::{Builder, Env};
use log::{debug, info};

use churn_analytics::config::{Cli, Command};
use churn_analytics::dataset::load_dataset;
use churn_analytics::error::TrainingError;
use churn_analytics::registry::ModelRegistry;
use churn_analytics::server::{self, AppState};
use churn_analytics::training::train_all;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env = Env::new().filter("CHURN_LOG");
    Builder::new()
        .filter(Some("churn_analytics"), cli.log_level())
        .parse_env(env)
        .init();
    debug!("Arguments {:#?}", cli);

    let settings = cli.settings();
    match cli.command {
        Command::Serve { bind } => {
            let registry = ModelRegistry::load(&settings.models_dir)
                .with_context(|| format!("loading models from {}", settings.models_dir.display()))?;
            info!("{} models ready", registry.len());
            server::serve(bind, AppState::new(registry, settings))
                .await
                .context("http server stopped")?;
        }
        Command::Train => {
            let data_path = settings.data_path.clone();
            let models_dir = settings.models_dir.clone();
            let split = settings.split;
            let paths = tokio::task::spawn_blocking(move || -> Result<_, TrainingError> {
                let dataset = load_dataset(&data_path)?;
                train_all(&dataset, &split, &models_dir)
            })
            .await??;
            info!("trained {} models into {}", paths.len(), settings.models_dir.display());
        }
    }
    Ok(())
}
