// Runs one molecular optimization experiment with the default driver
// settings, optionally overridden by the JSON file named in CHEMIST_CONFIG.

use anyhow::{bail, Context};
use chem_engine::run_experiment;
use chem_types::ExperimentConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "CHEMIST_CONFIG";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
}

fn load_config() -> anyhow::Result<ExperimentConfig> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => {
            let path = PathBuf::from(path);
            info!(path = %path.display(), "loading configuration");
            ExperimentConfig::from_json_file(&path)
                .with_context(|| format!("failed to read configuration {}", path.display()))
        }
        None => Ok(ExperimentConfig::new("run_chemist")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = load_config()?;
    let (run_dir, report) = run_experiment(config)
        .await
        .context("experiment could not start")?;

    if let Some(err) = &report.error {
        bail!(
            "experiment failed after {} evaluations: {}",
            report.submitted,
            err
        );
    }

    match &report.best {
        Some(best) => info!(
            value = best.value,
            smiles = %best.molecule,
            evaluations = report.submitted,
            log = %run_dir.log_path().display(),
            "optimum found"
        ),
        None => info!(log = %run_dir.log_path().display(), "no evaluation succeeded"),
    }
    Ok(())
}
