//! Worker pools that run evaluations and hand back completions.

use async_trait::async_trait;
use chem_types::{
    config_error, internal_error, ChemResult, EvaluationError, OverflowPolicy, ProcessedPoint,
    TimeDistribution, WorkerError,
};
use rand::distributions::Uniform;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp, Normal};
use std::any::Any;
use std::collections::{BTreeSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::caller::FunctionCaller;
use crate::trial::{Evaluation, Ticket};

/// Scheduling layer between the experiment driver and the function caller.
///
/// At most `num_workers` evaluations run at any time. Completions are handed
/// out by [`poll`](WorkerManager::poll) in completion order, which is not
/// submission order.
#[async_trait]
pub trait WorkerManager: Send {
    fn num_workers(&self) -> usize;

    /// Evaluations currently occupying a worker.
    fn in_flight(&self) -> usize;

    /// Accepted evaluations waiting for a worker.
    fn queued(&self) -> usize {
        0
    }

    /// Evaluations accepted but not yet handed out by `poll`.
    fn outstanding(&self) -> usize {
        self.in_flight() + self.queued()
    }

    /// Submissions that would start immediately.
    fn free_slots(&self) -> usize {
        self.num_workers().saturating_sub(self.outstanding())
    }

    /// Current time on the pool's clock.
    fn now(&self) -> f64;

    fn submit(&mut self, point: ProcessedPoint) -> ChemResult<Ticket>;

    /// Completed evaluations not yet handed out. Never blocks.
    fn poll(&mut self) -> ChemResult<Vec<Evaluation>>;

    /// Return once at least one evaluation is ready for `poll`.
    async fn wait_for_completion(&mut self) -> ChemResult<()>;

    fn name(&self) -> &str;
}

/// Source of simulated evaluation durations.
#[derive(Debug, Clone)]
pub struct DurationSampler {
    source: DurationSource,
}

#[derive(Debug, Clone)]
enum DurationSource {
    Constant(f64),
    Uniform(Uniform<f64>, ChaCha8Rng),
    /// Absolute value of a centered normal draw.
    HalfNormal(Normal<f64>, ChaCha8Rng),
    Exponential(Exp<f64>, ChaCha8Rng),
    Scripted { durations: Vec<f64>, cursor: usize },
}

impl DurationSampler {
    /// Build a seeded sampler. Parameters a distribution cannot be built
    /// from are a configuration error.
    pub fn new(distribution: TimeDistribution, seed: u64) -> ChemResult<Self> {
        distribution.validate()?;
        let rng = ChaCha8Rng::seed_from_u64(seed);
        let source = match distribution {
            TimeDistribution::Constant { value } => DurationSource::Constant(value),
            TimeDistribution::Uniform { low, high } => {
                DurationSource::Uniform(Uniform::new_inclusive(low, high), rng)
            }
            TimeDistribution::HalfNormal { sigma } => {
                let normal = Normal::new(0.0, sigma)
                    .map_err(|e| config_error!("half-normal sigma {}: {}", sigma, e))?;
                DurationSource::HalfNormal(normal, rng)
            }
            TimeDistribution::Exponential { mean } => {
                let exp = Exp::new(1.0 / mean)
                    .map_err(|e| config_error!("exponential mean {}: {}", mean, e))?;
                DurationSource::Exponential(exp, rng)
            }
        };
        Ok(Self { source })
    }

    /// Replay fixed durations in order, cycling when exhausted.
    pub fn scripted(durations: Vec<f64>) -> Self {
        Self {
            source: DurationSource::Scripted {
                durations,
                cursor: 0,
            },
        }
    }

    pub fn sample(&mut self) -> f64 {
        match &mut self.source {
            DurationSource::Constant(value) => *value,
            DurationSource::Uniform(uniform, rng) => uniform.sample(rng),
            DurationSource::HalfNormal(normal, rng) => normal.sample(rng).abs(),
            DurationSource::Exponential(exp, rng) => exp.sample(rng),
            DurationSource::Scripted { durations, cursor } => {
                if durations.is_empty() {
                    return 0.0;
                }
                let d = durations[*cursor % durations.len()];
                *cursor += 1;
                d
            }
        }
    }
}

/// Text carried by a caught panic.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "evaluation panicked".to_string())
}

struct Scheduled {
    finish_at: f64,
    outcome: Result<f64, EvaluationError>,
    evaluation: Evaluation,
}

/// Worker pool on a virtual clock.
///
/// Each evaluation is computed when it starts on a worker and delivered at
/// `start + duration`, durations coming from a [`DurationSampler`]. The
/// clock only moves in [`wait_for_completion`](WorkerManager::wait_for_completion).
/// Equal completion times are delivered in ticket order. A panicking
/// evaluation is reported as [`WorkerError::TaskFailed`].
pub struct SyntheticWorkerManager {
    num_workers: usize,
    overflow: OverflowPolicy,
    caller: Arc<dyn FunctionCaller>,
    sampler: DurationSampler,
    clock: f64,
    next_ticket: u64,
    free_workers: BTreeSet<usize>,
    running: Vec<Scheduled>,
    queue: VecDeque<Evaluation>,
    /// Completions held back by a failed `poll`.
    undelivered: Vec<Evaluation>,
}

impl SyntheticWorkerManager {
    pub fn new(
        num_workers: usize,
        caller: Arc<dyn FunctionCaller>,
        sampler: DurationSampler,
    ) -> Self {
        Self {
            num_workers,
            overflow: OverflowPolicy::default(),
            caller,
            sampler,
            clock: 0.0,
            next_ticket: 0,
            free_workers: (0..num_workers).collect(),
            running: Vec::with_capacity(num_workers),
            queue: VecDeque::new(),
            undelivered: Vec::new(),
        }
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    fn start(&mut self, mut evaluation: Evaluation, at: f64) -> ChemResult<()> {
        let worker = self
            .free_workers
            .pop_first()
            .ok_or_else(|| internal_error!("no free worker for {}", evaluation.ticket))?;
        let caller = &self.caller;
        let point = &evaluation.point;
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| caller.evaluate(point))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                self.free_workers.insert(worker);
                return Err(WorkerError::TaskFailed {
                    message: panic_message(payload),
                }
                .into());
            }
        };
        let duration = self.sampler.sample();
        evaluation.mark_running(worker, at);
        tracing::trace!(ticket = %evaluation.ticket, worker, at, duration, "evaluation started");
        self.running.push(Scheduled {
            finish_at: at + duration,
            outcome,
            evaluation,
        });
        Ok(())
    }

    fn next_due(&self) -> Option<usize> {
        self.running
            .iter()
            .enumerate()
            .filter(|(_, s)| s.finish_at <= self.clock)
            .min_by(|(_, a), (_, b)| {
                a.finish_at
                    .total_cmp(&b.finish_at)
                    .then(a.evaluation.ticket.cmp(&b.evaluation.ticket))
            })
            .map(|(i, _)| i)
    }
}

#[async_trait]
impl WorkerManager for SyntheticWorkerManager {
    fn num_workers(&self) -> usize {
        self.num_workers
    }

    fn in_flight(&self) -> usize {
        self.running.len()
    }

    fn queued(&self) -> usize {
        self.queue.len()
    }

    fn outstanding(&self) -> usize {
        self.running.len() + self.queue.len() + self.undelivered.len()
    }

    fn now(&self) -> f64 {
        self.clock
    }

    fn submit(&mut self, point: ProcessedPoint) -> ChemResult<Ticket> {
        if self.free_workers.is_empty() && self.overflow == OverflowPolicy::Reject {
            return Err(WorkerError::CapacityExceeded {
                num_workers: self.num_workers,
            }
            .into());
        }

        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        let evaluation = Evaluation::new(ticket, point, self.clock);

        if self.free_workers.is_empty() {
            tracing::trace!(ticket = %ticket, "all workers busy, queued");
            self.queue.push_back(evaluation);
        } else {
            self.start(evaluation, self.clock)?;
        }
        Ok(ticket)
    }

    fn poll(&mut self) -> ChemResult<Vec<Evaluation>> {
        let mut done = std::mem::take(&mut self.undelivered);
        let mut first_error = None;
        while let Some(i) = self.next_due() {
            let Scheduled {
                finish_at,
                outcome,
                mut evaluation,
            } = self.running.swap_remove(i);
            if let Some(worker) = evaluation.worker {
                self.free_workers.insert(worker);
            }
            evaluation.finish(outcome, finish_at);
            if let Some(next) = self.queue.pop_front() {
                if let Err(e) = self.start(next, finish_at) {
                    first_error.get_or_insert(e);
                }
            }
            done.push(evaluation);
        }
        match first_error {
            Some(e) => {
                self.undelivered = done;
                Err(e)
            }
            None => Ok(done),
        }
    }

    async fn wait_for_completion(&mut self) -> ChemResult<()> {
        if !self.undelivered.is_empty() || self.next_due().is_some() {
            return Ok(());
        }
        let next = self
            .running
            .iter()
            .map(|s| s.finish_at)
            .min_by(f64::total_cmp)
            .ok_or_else(|| internal_error!("wait_for_completion with no evaluations in flight"))?;
        self.clock = next;
        Ok(())
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chem_types::{ChemError, Fingerprint, Molecule, ObjectiveError};
    use std::f64::consts::PI;

    /// Scores a point by its index; index 13 fails and index 99 panics.
    struct IndexCaller;

    impl FunctionCaller for IndexCaller {
        fn evaluate(&self, point: &ProcessedPoint) -> Result<f64, EvaluationError> {
            if point.index == 99 {
                panic!("objective overflowed");
            }
            if point.index == 13 {
                return Err(ObjectiveError::InvalidMolecule {
                    smiles: "X".into(),
                    message: "unlucky".into(),
                }
                .into());
            }
            Ok(point.index as f64)
        }

        fn raw_of(&self, point: &ProcessedPoint) -> ChemResult<Molecule> {
            Ok(Molecule::new(format!("C{}", point.index)))
        }
    }

    fn point(index: usize) -> ProcessedPoint {
        ProcessedPoint::new(index, Fingerprint::default())
    }

    fn manager(workers: usize, sampler: DurationSampler) -> SyntheticWorkerManager {
        SyntheticWorkerManager::new(workers, Arc::new(IndexCaller), sampler)
    }

    #[tokio::test]
    async fn queue_overflow_respects_worker_limit() {
        let mut wm = manager(2, DurationSampler::new(TimeDistribution::default(), 0).unwrap());
        for i in 0..3 {
            wm.submit(point(i)).unwrap();
            assert!(wm.in_flight() <= 2);
        }
        assert_eq!(wm.in_flight(), 2);
        assert_eq!(wm.queued(), 1);
        assert_eq!(wm.free_slots(), 0);
        assert!(wm.poll().unwrap().is_empty());

        wm.wait_for_completion().await.unwrap();
        assert_eq!(wm.now(), 1.0);
        let done = wm.poll().unwrap();
        let tickets: Vec<u64> = done.iter().map(|e| e.ticket.0).collect();
        assert_eq!(tickets, vec![0, 1]);
        assert_eq!(wm.in_flight(), 1);

        wm.wait_for_completion().await.unwrap();
        let last = wm.poll().unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].started_at, Some(1.0));
        assert_eq!(last[0].completed_at, Some(2.0));
        assert_eq!(wm.outstanding(), 0);
    }

    #[tokio::test]
    async fn reject_overflow_is_capacity_error() {
        let mut wm = manager(1, DurationSampler::new(TimeDistribution::default(), 0).unwrap())
            .with_overflow_policy(OverflowPolicy::Reject);
        wm.submit(point(0)).unwrap();
        let err = wm.submit(point(1)).unwrap_err();
        assert!(err.is_capacity_exceeded());
        assert_eq!(wm.in_flight(), 1);

        wm.wait_for_completion().await.unwrap();
        wm.poll().unwrap();
        assert_eq!(wm.submit(point(1)).unwrap(), Ticket(1));
    }

    #[tokio::test]
    async fn completions_arrive_out_of_submission_order() {
        let mut wm = manager(2, DurationSampler::scripted(vec![3.0, 1.0]));
        wm.submit(point(0)).unwrap();
        wm.submit(point(1)).unwrap();

        wm.wait_for_completion().await.unwrap();
        let first = wm.poll().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].ticket, Ticket(1));
        assert_eq!(wm.now(), 1.0);

        wm.wait_for_completion().await.unwrap();
        let second = wm.poll().unwrap();
        assert_eq!(second[0].ticket, Ticket(0));
        assert_eq!(second[0].value, Some(0.0));
        assert_eq!(wm.now(), 3.0);
    }

    #[tokio::test]
    async fn freed_worker_slots_are_reused() {
        let mut wm = manager(2, DurationSampler::scripted(vec![1.0, 5.0, 1.0]));
        wm.submit(point(0)).unwrap();
        wm.submit(point(1)).unwrap();
        wm.wait_for_completion().await.unwrap();
        let done = wm.poll().unwrap();
        assert_eq!(done[0].worker, Some(0));

        wm.submit(point(2)).unwrap();
        wm.wait_for_completion().await.unwrap();
        let done = wm.poll().unwrap();
        assert_eq!(done[0].ticket, Ticket(2));
        assert_eq!(done[0].worker, Some(0));
    }

    #[tokio::test]
    async fn failures_are_delivered_as_completions() {
        let mut wm = manager(1, DurationSampler::new(TimeDistribution::default(), 0).unwrap());
        wm.submit(point(13)).unwrap();
        wm.wait_for_completion().await.unwrap();
        let done = wm.poll().unwrap();
        assert!(!done[0].is_success());
        assert!(matches!(done[0].error, Some(EvaluationError::Objective(_))));
    }

    #[tokio::test]
    async fn panicking_evaluation_is_task_failure() {
        let mut wm = manager(1, DurationSampler::new(TimeDistribution::default(), 0).unwrap());
        let err = wm.submit(point(99)).unwrap_err();
        match err {
            ChemError::Worker(WorkerError::TaskFailed { message }) => {
                assert!(message.contains("overflowed"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(wm.in_flight(), 0);
        assert_eq!(wm.free_slots(), 1);
        assert_eq!(wm.submit(point(2)).unwrap(), Ticket(1));
    }

    #[tokio::test]
    async fn panic_in_queued_start_keeps_finished_completion() {
        let mut wm = manager(1, DurationSampler::new(TimeDistribution::default(), 0).unwrap());
        wm.submit(point(4)).unwrap();
        wm.submit(point(99)).unwrap();
        assert_eq!(wm.queued(), 1);

        wm.wait_for_completion().await.unwrap();
        assert!(wm.poll().is_err());
        assert_eq!(wm.outstanding(), 1);

        wm.wait_for_completion().await.unwrap();
        let kept = wm.poll().unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].value, Some(4.0));
        assert_eq!(wm.outstanding(), 0);
    }

    #[tokio::test]
    async fn wait_with_nothing_in_flight_errors() {
        let mut wm = manager(1, DurationSampler::new(TimeDistribution::default(), 0).unwrap());
        assert!(wm.wait_for_completion().await.is_err());
    }

    #[test]
    fn sampled_durations_are_non_negative() {
        let distributions = [
            TimeDistribution::Uniform { low: 0.5, high: 2.0 },
            TimeDistribution::HalfNormal { sigma: 1.0 },
            TimeDistribution::Exponential { mean: 2.0 },
        ];
        for distribution in distributions {
            let mut sampler = DurationSampler::new(distribution.clone(), 11).unwrap();
            let samples: Vec<f64> = (0..2000).map(|_| sampler.sample()).collect();
            assert!(samples.iter().all(|d| d.is_finite() && *d >= 0.0));
            let mean = samples.iter().sum::<f64>() / samples.len() as f64;
            let expected = match distribution {
                TimeDistribution::Uniform { low, high } => (low + high) / 2.0,
                TimeDistribution::HalfNormal { sigma } => sigma * (2.0 / PI).sqrt(),
                TimeDistribution::Exponential { mean } => mean,
                TimeDistribution::Constant { value } => value,
            };
            assert!(
                (mean - expected).abs() < expected * 0.15,
                "{}: mean {mean} vs {expected}",
                distribution.name()
            );
        }
    }

    #[test]
    fn invalid_distribution_is_config_error() {
        let bad = [
            TimeDistribution::HalfNormal { sigma: -1.0 },
            TimeDistribution::Exponential { mean: 0.0 },
            TimeDistribution::Uniform { low: 3.0, high: 1.0 },
            TimeDistribution::Uniform { low: 1.0, high: f64::INFINITY },
        ];
        for distribution in bad {
            let err = DurationSampler::new(distribution, 0).unwrap_err();
            assert!(matches!(err, ChemError::Config(_)));
        }
    }

    #[test]
    fn seeded_sampler_is_reproducible() {
        let dist = TimeDistribution::Exponential { mean: 1.0 };
        let mut a = DurationSampler::new(dist.clone(), 5).unwrap();
        let mut b = DurationSampler::new(dist, 5).unwrap();
        for _ in 0..10 {
            assert_eq!(a.sample(), b.sample());
        }
    }
}
