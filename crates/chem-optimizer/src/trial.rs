//! Evaluation tracking, budget accounting and best-result bookkeeping.

use chem_types::{EvaluationError, Molecule, ProcessedPoint};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle returned by a worker pool for one accepted evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluationStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// One candidate evaluation, from submission to delivered result.
///
/// Times are in the worker pool's clock: virtual units for synthetic pools,
/// seconds since pool creation for real ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub ticket: Ticket,
    pub point: ProcessedPoint,
    pub status: EvaluationStatus,
    pub submitted_at: f64,
    pub started_at: Option<f64>,
    pub completed_at: Option<f64>,
    pub worker: Option<usize>,
    pub value: Option<f64>,
    pub error: Option<EvaluationError>,
}

impl Evaluation {
    pub fn new(ticket: Ticket, point: ProcessedPoint, submitted_at: f64) -> Self {
        Self {
            ticket,
            point,
            status: EvaluationStatus::Queued,
            submitted_at,
            started_at: None,
            completed_at: None,
            worker: None,
            value: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self, worker: usize, at: f64) {
        self.status = EvaluationStatus::Running;
        self.worker = Some(worker);
        self.started_at = Some(at);
    }

    pub fn mark_completed(&mut self, value: f64, at: f64) {
        self.status = EvaluationStatus::Completed;
        self.completed_at = Some(at);
        self.value = Some(value);
    }

    pub fn mark_failed(&mut self, error: EvaluationError, at: f64) {
        self.status = EvaluationStatus::Failed;
        self.completed_at = Some(at);
        self.error = Some(error);
    }

    /// Record an evaluation outcome at time `at`.
    pub fn finish(&mut self, outcome: Result<f64, EvaluationError>, at: f64) {
        match outcome {
            Ok(value) => self.mark_completed(value, at),
            Err(error) => self.mark_failed(error, at),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == EvaluationStatus::Completed
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            EvaluationStatus::Completed | EvaluationStatus::Failed
        )
    }

    /// Time spent on a worker.
    pub fn duration(&self) -> Option<f64> {
        Some(self.completed_at? - self.started_at?)
    }
}

/// Evaluation budget owned by the experiment driver.
///
/// `submitted` counts evaluations charged against the budget and never
/// exceeds `total`. `attempts` counts every accepted submission, including
/// ones whose charge was later refunded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    total: usize,
    submitted: usize,
    attempts: usize,
}

impl Budget {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            submitted: 0,
            attempts: 0,
        }
    }

    /// Charge one evaluation. Returns `false` when the budget is spent.
    pub fn try_consume(&mut self) -> bool {
        if self.submitted >= self.total {
            return false;
        }
        self.submitted += 1;
        self.attempts += 1;
        true
    }

    /// Give back the charge of one failed evaluation.
    pub fn refund(&mut self) {
        self.submitted = self.submitted.saturating_sub(1);
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn submitted(&self) -> usize {
        self.submitted
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn remaining(&self) -> usize {
        self.total - self.submitted
    }

    pub fn is_exhausted(&self) -> bool {
        self.submitted >= self.total
    }
}

/// Best observation of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct BestResult {
    pub point: ProcessedPoint,
    pub molecule: Molecule,
    pub value: f64,
    pub ticket: Ticket,
    /// Position of this observation among all successful observations.
    pub observed_seq: usize,
}

/// Tracks the maximum over successful observations; ties keep the earliest.
#[derive(Debug, Clone, Default)]
pub struct BestTracker {
    best: Option<BestResult>,
    observations: usize,
}

impl BestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful observation. Returns `true` if it became the best.
    pub fn observe(
        &mut self,
        point: &ProcessedPoint,
        molecule: Molecule,
        value: f64,
        ticket: Ticket,
    ) -> bool {
        let seq = self.observations;
        self.observations += 1;

        let improved = match &self.best {
            None => true,
            Some(current) => value > current.value,
        };
        if improved {
            self.best = Some(BestResult {
                point: point.clone(),
                molecule,
                value,
                ticket,
                observed_seq: seq,
            });
        }
        improved
    }

    pub fn best(&self) -> Option<&BestResult> {
        self.best.as_ref()
    }

    pub fn into_best(self) -> Option<BestResult> {
        self.best
    }

    pub fn observations(&self) -> usize {
        self.observations
    }
}
