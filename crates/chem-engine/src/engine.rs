// Experiment driver: owns the budget and best result, feeds the optimizer
// from the worker pool until the budget is spent.

use chem_data::CandidatePool;
use chem_optimizer::{
    optimizer_by_name, BestResult, BestTracker, Budget, DomainTranslator, DurationSampler,
    Evaluation, FunctionCaller, MolFunctionCaller, Optimizer, PoolTranslator, Reporter,
    SyntheticWorkerManager, TokioWorkerManager, WorkerManager,
};
use chem_props::objective_by_name;
use chem_types::{
    internal_error, ChemError, ChemResult, ExperimentConfig, FailurePolicy, ProcessedPoint, RunId,
    WorkerError, WorkerMode,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::render::MoleculeRenderer;

/// Lifecycle of an experiment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    Initializing,
    Running,
    Draining,
    Finalizing,
    Done,
    Failed,
}

/// Outcome of [`ExperimentDriver::run`].
#[derive(Debug, Clone)]
pub struct ExperimentReport {
    pub run_id: RunId,
    pub state: DriverState,
    pub best: Option<BestResult>,
    /// Evaluations charged against the budget.
    pub submitted: usize,
    pub budget: usize,
    /// Successful evaluations.
    pub completed: usize,
    pub failed: usize,
    /// Every delivered evaluation, in delivery order.
    pub history: Vec<Evaluation>,
    /// Pool clock at the end of the run.
    pub elapsed: f64,
    /// `false` when the run stopped before draining its evaluations.
    pub complete: bool,
    /// The optimizer ran out of candidates before the budget was spent.
    pub pool_exhausted: bool,
    pub visualization: Option<PathBuf>,
    pub error: Option<String>,
}

impl ExperimentReport {
    pub fn is_done(&self) -> bool {
        self.state == DriverState::Done
    }
}

/// Drives one optimization experiment to completion.
pub struct ExperimentDriver {
    config: ExperimentConfig,
    caller: Arc<dyn FunctionCaller>,
    optimizer: Box<dyn Optimizer>,
    workers: Box<dyn WorkerManager>,
    reporter: Reporter,
    renderer: Option<Box<dyn MoleculeRenderer>>,
    render_stem: Option<PathBuf>,
    state: DriverState,
    budget: Budget,
    best: BestTracker,
    history: Vec<Evaluation>,
    retry: VecDeque<ProcessedPoint>,
    completed: usize,
    failed: usize,
    pool_exhausted: bool,
    visualization: Option<PathBuf>,
}

impl ExperimentDriver {
    pub fn new(
        config: ExperimentConfig,
        caller: Arc<dyn FunctionCaller>,
        optimizer: Box<dyn Optimizer>,
        workers: Box<dyn WorkerManager>,
        reporter: Reporter,
    ) -> Self {
        let budget = Budget::new(config.budget);
        Self {
            config,
            caller,
            optimizer,
            workers,
            reporter,
            renderer: None,
            render_stem: None,
            state: DriverState::Initializing,
            budget,
            best: BestTracker::new(),
            history: Vec::new(),
            retry: VecDeque::new(),
            completed: 0,
            failed: 0,
            pool_exhausted: false,
            visualization: None,
        }
    }

    /// Build every component from configuration. The config is validated
    /// first; an invalid config never reaches `Running`.
    pub fn from_config(config: ExperimentConfig, reporter: Reporter) -> ChemResult<Self> {
        config.validate()?;

        let objective = objective_by_name(&config.objective)?;
        let pool = Arc::new(CandidatePool::load(&config.data_dir, &config.dataset)?);
        info!(
            source = %config.data_source(),
            candidates = pool.len(),
            "candidate pool loaded"
        );

        let translator = Arc::new(PoolTranslator::new(pool));
        let candidates = translator.processed_points();
        let translator: Arc<dyn DomainTranslator> = translator;
        let caller: Arc<dyn FunctionCaller> = Arc::new(
            MolFunctionCaller::new(objective, translator).with_reporter(reporter.clone()),
        );

        let optimizer = optimizer_by_name(
            &config.strategy,
            candidates,
            config.exploration_weight,
            config.seed,
        )?;

        let workers: Box<dyn WorkerManager> = match config.worker_mode {
            WorkerMode::Synthetic => Box::new(
                SyntheticWorkerManager::new(
                    config.num_workers,
                    Arc::clone(&caller),
                    DurationSampler::new(config.time_distribution.clone(), config.seed)?,
                )
                .with_overflow_policy(config.overflow_policy),
            ),
            WorkerMode::Real => Box::new(
                TokioWorkerManager::new(config.num_workers, Arc::clone(&caller))
                    .with_overflow_policy(config.overflow_policy),
            ),
        };

        Ok(Self::new(config, caller, optimizer, workers, reporter))
    }

    /// Visualize the optimal molecule with `renderer`, writing next to `stem`.
    pub fn with_renderer(mut self, renderer: Box<dyn MoleculeRenderer>, stem: PathBuf) -> Self {
        self.renderer = Some(renderer);
        self.render_stem = Some(stem);
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub async fn run(mut self) -> ExperimentReport {
        info!(
            run_id = %self.config.id,
            workers = self.config.num_workers,
            budget = self.config.budget,
            strategy = %self.optimizer.name(),
            pool = %self.workers.name(),
            "starting experiment"
        );
        self.reporter.writeln(format!(
            "Experiment {} ({}): objective {}, {} {} worker(s), budget {}, {} time distribution.",
            self.config.name,
            self.config.id,
            self.config.objective,
            self.config.num_workers,
            self.workers.name(),
            self.config.budget,
            self.config.time_distribution.name(),
        ));

        self.state = DriverState::Running;
        let outcome = match self.run_loop().await {
            Ok(()) => self.finalize(),
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            self.fail(&e);
            return self.into_report(Some(e.to_string()));
        }
        self.into_report(None)
    }

    fn keep_running(&self) -> bool {
        !self.budget.is_exhausted()
            || (self.config.failure_policy == FailurePolicy::RefundBudget
                && self.workers.outstanding() > 0)
    }

    async fn run_loop(&mut self) -> ChemResult<()> {
        while self.keep_running() {
            self.fill_capacity()?;

            if self.workers.outstanding() == 0 {
                if !self.retry.is_empty() {
                    return Err(WorkerError::CapacityExceeded {
                        num_workers: self.workers.num_workers(),
                    }
                    .into());
                }
                if self.budget.is_exhausted() {
                    break;
                }
                self.pool_exhausted = true;
                info!(
                    submitted = self.budget.submitted(),
                    "optimizer has no candidates left"
                );
                self.reporter.writeln(format!(
                    "Candidate pool exhausted after {} evaluations.",
                    self.budget.submitted()
                ));
                break;
            }

            if self.collect()? == 0 {
                self.workers.wait_for_completion().await?;
            }
        }

        self.state = DriverState::Draining;
        debug!(outstanding = self.workers.outstanding(), "draining");
        while self.workers.outstanding() > 0 {
            if self.collect()? == 0 {
                self.workers.wait_for_completion().await?;
            }
        }
        Ok(())
    }

    /// Submit as many points as there are free workers and budget.
    fn fill_capacity(&mut self) -> ChemResult<()> {
        let free = self.workers.free_slots().min(self.budget.remaining());
        if free == 0 {
            return Ok(());
        }

        let mut batch: Vec<ProcessedPoint> = Vec::with_capacity(free);
        while batch.len() < free {
            match self.retry.pop_front() {
                Some(point) => batch.push(point),
                None => break,
            }
        }
        if batch.len() < free {
            batch.extend(self.optimizer.propose(free - batch.len()));
        }

        let mut pending = batch.into_iter();
        while let Some(point) = pending.next() {
            match self.workers.submit(point.clone()) {
                Ok(ticket) => {
                    if !self.budget.try_consume() {
                        return Err(internal_error!(
                            "{} accepted with no budget left",
                            ticket
                        ));
                    }
                    debug!(ticket = %ticket, point = %point, "submitted");
                }
                Err(e) if e.is_capacity_exceeded() => {
                    debug!(point = %point, "worker pool full, retrying later");
                    self.retry.push_back(point);
                    self.retry.extend(pending);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Observe everything the pool has finished. Returns how many arrived.
    fn collect(&mut self) -> ChemResult<usize> {
        let finished = self.workers.poll()?;
        let n = finished.len();
        for evaluation in finished {
            self.observe(evaluation)?;
        }
        Ok(n)
    }

    fn observe(&mut self, evaluation: Evaluation) -> ChemResult<()> {
        match (evaluation.value, &evaluation.error) {
            (Some(value), None) => {
                let molecule = self.caller.raw_of(&evaluation.point)?;
                self.completed += 1;
                self.optimizer.observe(&evaluation.point, value);
                if self
                    .best
                    .observe(&evaluation.point, molecule.clone(), value, evaluation.ticket)
                {
                    info!(ticket = %evaluation.ticket, value, smiles = %molecule, "new best");
                    self.reporter.writeln(format!(
                        "New best {:.5} from {} at t={:.3}.",
                        value,
                        molecule,
                        self.workers.now()
                    ));
                }
            }
            (_, error) => {
                self.failed += 1;
                self.optimizer.observe_failure(&evaluation.point);
                let message = error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no result".to_string());
                warn!(
                    ticket = %evaluation.ticket,
                    point = %evaluation.point,
                    error = %message,
                    "evaluation failed"
                );
                if self.config.failure_policy == FailurePolicy::RefundBudget {
                    self.budget.refund();
                }
            }
        }
        self.history.push(evaluation);
        Ok(())
    }

    fn finalize(&mut self) -> ChemResult<()> {
        self.state = DriverState::Finalizing;
        self.reporter.writeln(format!(
            "Evaluations: {} succeeded, {} failed, {} of {} budget used.",
            self.completed,
            self.failed,
            self.budget.submitted(),
            self.budget.total()
        ));

        match self.best.best() {
            Some(best) => {
                let best = best.clone();
                self.reporter
                    .writeln(format!("Optimum value found: {:.5}", best.value));
                self.reporter
                    .writeln(format!("Optimum molecule: {}", best.molecule));
                self.reporter.writeln(format!(
                    "Synthesis path: {}",
                    best.molecule.synthesis_path()
                ));
                self.visualize(&best);
            }
            None => {
                warn!("no evaluation succeeded");
                self.reporter
                    .writeln("No evaluation succeeded; there is no optimum to report.");
            }
        }

        self.reporter.flush()?;
        self.state = DriverState::Done;
        info!(
            submitted = self.budget.submitted(),
            completed = self.completed,
            failed = self.failed,
            elapsed = self.workers.now(),
            "experiment done"
        );
        Ok(())
    }

    fn visualize(&mut self, best: &BestResult) {
        let (Some(renderer), Some(stem)) = (&self.renderer, &self.render_stem) else {
            self.reporter
                .writeln("Install graphviz to visualize the optimal molecule.");
            return;
        };
        match renderer.render(&best.molecule, stem) {
            Ok(path) => {
                self.reporter.writeln(format!(
                    "Optimal molecule visualized in {}.",
                    path.display()
                ));
                self.visualization = Some(path);
            }
            Err(e) => {
                warn!(renderer = %renderer.name(), error = %e, "visualization failed");
                self.reporter
                    .writeln(format!("Could not visualize the optimal molecule: {e}"));
            }
        }
    }

    fn fail(&mut self, err: &ChemError) {
        self.state = DriverState::Failed;
        error!(error = %err, submitted = self.budget.submitted(), "experiment failed");
        self.reporter.writeln(format!("Experiment failed: {err}"));
        if let Some(best) = self.best.best() {
            self.reporter.writeln(format!(
                "Best value before failure (incomplete): {:.5} for {}",
                best.value, best.molecule
            ));
        }
        if let Err(e) = self.reporter.flush() {
            warn!(error = %e, "could not flush reporter");
        }
    }

    fn into_report(self, error: Option<String>) -> ExperimentReport {
        let complete = self.state == DriverState::Done;
        ExperimentReport {
            run_id: self.config.id,
            state: self.state,
            elapsed: self.workers.now(),
            best: self.best.into_best(),
            submitted: self.budget.submitted(),
            budget: self.budget.total(),
            completed: self.completed,
            failed: self.failed,
            history: self.history,
            complete,
            pool_exhausted: self.pool_exhausted,
            visualization: self.visualization,
            error,
        }
    }
}
