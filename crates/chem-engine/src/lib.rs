//! # chem-engine
//!
//! Runs Chemist experiments: the driver state machine, per-run artifacts and
//! visualization of the optimal molecule.

pub mod artifacts;
pub mod engine;
pub mod render;

pub use artifacts::RunDirectory;
pub use chem_optimizer::Reporter;
pub use engine::{DriverState, ExperimentDriver, ExperimentReport};
pub use render::{synthesis_dot, DotRenderer, GraphvizRenderer, MoleculeRenderer};

use chem_types::{ChemResult, ExperimentConfig};
use tracing::info;

/// Run a configured experiment end to end.
///
/// Creates the run directory under `config.output_root`, logs to its `log`
/// file and visualizes the optimum when graphviz is installed. Configuration
/// and data errors are returned before anything runs; failures during the
/// run are reported through [`ExperimentReport::state`].
pub async fn run_experiment(
    config: ExperimentConfig,
) -> ChemResult<(RunDirectory, ExperimentReport)> {
    config.validate()?;
    let run_dir = RunDirectory::create(&config.output_root, config.created_at)?;
    info!(path = %run_dir.path().display(), "run directory ready");

    let reporter = Reporter::to_file(run_dir.log_path())?;
    let mut driver = ExperimentDriver::from_config(config, reporter)?;
    match GraphvizRenderer::detect() {
        Some(renderer) => {
            driver = driver.with_renderer(Box::new(renderer), run_dir.visualization_stem());
        }
        None => info!("graphviz not found, the optimal molecule will not be visualized"),
    }

    let report = driver.run().await;
    Ok((run_dir, report))
}
