use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config_error;
use crate::errors::ChemResult;

/// Unique experiment run identifier
pub type RunId = Uuid;

pub const DEFAULT_NUM_WORKERS: usize = 1;
pub const DEFAULT_BUDGET: usize = 100;
pub const DEFAULT_DATA_DIR: &str = "chembl-data";
pub const DEFAULT_OBJECTIVE: &str = "logp";

/// Distribution of simulated evaluation durations, in virtual time units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeDistribution {
    Constant { value: f64 },
    Uniform { low: f64, high: f64 },
    HalfNormal { sigma: f64 },
    Exponential { mean: f64 },
}

impl Default for TimeDistribution {
    fn default() -> Self {
        Self::Constant { value: 1.0 }
    }
}

impl TimeDistribution {
    pub fn validate(&self) -> ChemResult<()> {
        let ok = match *self {
            Self::Constant { value } => value.is_finite() && value > 0.0,
            Self::Uniform { low, high } => {
                low.is_finite() && high.is_finite() && low > 0.0 && high >= low
            }
            Self::HalfNormal { sigma } => sigma.is_finite() && sigma > 0.0,
            Self::Exponential { mean } => mean.is_finite() && mean > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(config_error!("invalid time distribution: {self:?}"))
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Constant { .. } => "const",
            Self::Uniform { .. } => "uniform",
            Self::HalfNormal { .. } => "halfnormal",
            Self::Exponential { .. } => "exponential",
        }
    }
}

/// How evaluations are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerMode {
    /// Durations drawn from a [`TimeDistribution`] on a virtual clock.
    #[default]
    Synthetic,
    /// Evaluations run on blocking tokio tasks; durations are real.
    Real,
}

/// What a worker pool does with a submission when every slot is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Hold the evaluation until a slot frees up.
    #[default]
    Queue,
    /// Fail the submission with a capacity error.
    Reject,
}

/// Budget accounting for evaluations that fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// A failed candidate still costs one evaluation.
    #[default]
    ConsumeBudget,
    /// A failed candidate gives its evaluation back to the budget.
    RefundBudget,
}

/// Top-level configuration for an optimization experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub id: RunId,
    pub name: String,

    /// Number of concurrent evaluation slots.
    pub num_workers: usize,

    /// Total number of evaluations allowed.
    pub budget: usize,

    pub time_distribution: TimeDistribution,
    pub worker_mode: WorkerMode,
    pub overflow_policy: OverflowPolicy,
    pub failure_policy: FailurePolicy,

    /// Multi-fidelity evaluation is not supported by this driver.
    pub multi_fidelity: bool,

    /// Objective name, resolved by `chem_props::objective_by_name`.
    pub objective: String,

    /// Directory holding candidate files.
    pub data_dir: PathBuf,

    /// Dataset name inside `data_dir`. Empty means the built-in sample pool.
    pub dataset: String,

    /// Which optimizer to use: "random" or "bandit".
    pub strategy: String,

    /// Exploration probability for the bandit strategy.
    pub exploration_weight: f64,

    /// Seed for duration sampling and optimizer randomness.
    pub seed: u64,

    /// Directory under which the per-run experiment directory is created.
    pub output_root: PathBuf,

    pub created_at: DateTime<Utc>,
}

impl ExperimentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            num_workers: DEFAULT_NUM_WORKERS,
            budget: DEFAULT_BUDGET,
            time_distribution: TimeDistribution::default(),
            worker_mode: WorkerMode::Synthetic,
            overflow_policy: OverflowPolicy::Queue,
            failure_policy: FailurePolicy::ConsumeBudget,
            multi_fidelity: false,
            objective: DEFAULT_OBJECTIVE.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            dataset: String::new(),
            strategy: "bandit".to_string(),
            exploration_weight: 0.3,
            seed: 42,
            output_root: PathBuf::from("."),
            created_at: Utc::now(),
        }
    }

    /// Load a configuration from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> ChemResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn with_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn with_budget(mut self, n: usize) -> Self {
        self.budget = n;
        self
    }

    pub fn with_time_distribution(mut self, distribution: TimeDistribution) -> Self {
        self.time_distribution = distribution;
        self
    }

    pub fn with_worker_mode(mut self, mode: WorkerMode) -> Self {
        self.worker_mode = mode;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_objective(mut self, objective: &str) -> Self {
        self.objective = objective.to_string();
        self
    }

    pub fn with_strategy(mut self, strategy: &str, exploration_weight: f64) -> Self {
        self.strategy = strategy.to_string();
        self.exploration_weight = exploration_weight;
        self
    }

    pub fn with_data_source(mut self, data_dir: impl Into<PathBuf>, dataset: &str) -> Self {
        self.data_dir = data_dir.into();
        self.dataset = dataset.to_string();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    /// Check every option before the experiment starts running.
    pub fn validate(&self) -> ChemResult<()> {
        if self.num_workers < 1 {
            return Err(config_error!("num_workers must be at least 1"));
        }
        if self.budget < 1 {
            return Err(config_error!("budget must be at least 1"));
        }
        if self.multi_fidelity {
            return Err(config_error!("multi-fidelity evaluation is not supported"));
        }
        if !(0.0..=1.0).contains(&self.exploration_weight) {
            return Err(config_error!(
                "exploration_weight must lie in [0, 1], got {}",
                self.exploration_weight
            ));
        }
        self.time_distribution.validate()
    }

    /// Human-readable data source identifier.
    pub fn data_source(&self) -> String {
        if self.dataset.is_empty() {
            "builtin".to_string()
        } else {
            self.data_dir.join(&self.dataset).display().to_string()
        }
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self::new("chemist")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ChemError;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = ExperimentConfig::default();
        assert_eq!(config.num_workers, DEFAULT_NUM_WORKERS);
        assert_eq!(config.budget, DEFAULT_BUDGET);
        assert_eq!(config.time_distribution.name(), "const");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_workers_and_budget() {
        let config = ExperimentConfig::default().with_workers(0);
        assert!(matches!(config.validate(), Err(ChemError::Config(_))));

        let config = ExperimentConfig::default().with_budget(0);
        assert!(matches!(config.validate(), Err(ChemError::Config(_))));
    }

    #[test]
    fn rejects_multi_fidelity() {
        let mut config = ExperimentConfig::default();
        config.multi_fidelity = true;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("multi-fidelity"));
    }

    #[test]
    fn rejects_bad_distributions() {
        for distribution in [
            TimeDistribution::Constant { value: 0.0 },
            TimeDistribution::Uniform { low: 2.0, high: 1.0 },
            TimeDistribution::HalfNormal { sigma: -1.0 },
            TimeDistribution::Exponential { mean: f64::NAN },
        ] {
            let config = ExperimentConfig::default().with_time_distribution(distribution);
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn json_overrides_keep_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"num_workers": 4, "budget": 12, "time_distribution": {{"kind": "uniform", "low": 0.5, "high": 2.0}}}}"#
        )
        .unwrap();

        let config = ExperimentConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.budget, 12);
        assert_eq!(
            config.time_distribution,
            TimeDistribution::Uniform { low: 0.5, high: 2.0 }
        );
        assert_eq!(config.objective, DEFAULT_OBJECTIVE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn data_source_identifier() {
        let config = ExperimentConfig::default();
        assert_eq!(config.data_source(), "builtin");

        let config = config.with_data_source("chembl-data", "chembl_sample.csv");
        assert!(config.data_source().ends_with("chembl_sample.csv"));
    }
}
