//! Worker pool running evaluations on tokio's blocking thread pool.

use async_trait::async_trait;
use chem_types::{
    internal_error, ChemResult, EvaluationError, OverflowPolicy, ProcessedPoint, WorkerError,
};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::caller::FunctionCaller;
use crate::trial::{Evaluation, Ticket};
use crate::workers::{panic_message, WorkerManager};

/// Message sent back by a finished blocking task. `Err` carries a panic.
struct Finished {
    ticket: Ticket,
    outcome: Result<Result<f64, EvaluationError>, String>,
    at: f64,
}

/// Runs each evaluation in `spawn_blocking`, timing it on the wall clock.
///
/// Must be used from within a tokio runtime.
pub struct TokioWorkerManager {
    num_workers: usize,
    overflow: OverflowPolicy,
    caller: Arc<dyn FunctionCaller>,
    started: Instant,
    next_ticket: u64,
    free_workers: BTreeSet<usize>,
    running: HashMap<Ticket, Evaluation>,
    queue: VecDeque<Evaluation>,
    tx: mpsc::UnboundedSender<Finished>,
    rx: mpsc::UnboundedReceiver<Finished>,
    ready: Vec<Finished>,
    /// Completions held back by a failed `poll`.
    undelivered: Vec<Evaluation>,
}

impl TokioWorkerManager {
    pub fn new(num_workers: usize, caller: Arc<dyn FunctionCaller>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            num_workers,
            overflow: OverflowPolicy::default(),
            caller,
            started: Instant::now(),
            next_ticket: 0,
            free_workers: (0..num_workers).collect(),
            running: HashMap::new(),
            queue: VecDeque::new(),
            tx,
            rx,
            ready: Vec::new(),
            undelivered: Vec::new(),
        }
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    fn start(&mut self, mut evaluation: Evaluation) -> ChemResult<()> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|e| WorkerError::TaskFailed {
                message: format!("no tokio runtime: {e}"),
            })?;
        let worker = self
            .free_workers
            .pop_first()
            .ok_or_else(|| internal_error!("no free worker for {}", evaluation.ticket))?;
        evaluation.mark_running(worker, self.now());

        let ticket = evaluation.ticket;
        let point = evaluation.point.clone();
        let caller = Arc::clone(&self.caller);
        let tx = self.tx.clone();
        let started = self.started;
        handle.spawn_blocking(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| caller.evaluate(&point)))
                .map_err(panic_message);
            // The receiver only goes away with the manager itself.
            let _ = tx.send(Finished {
                ticket,
                outcome,
                at: started.elapsed().as_secs_f64(),
            });
        });

        tracing::trace!(ticket = %ticket, worker, "evaluation spawned");
        self.running.insert(ticket, evaluation);
        Ok(())
    }

    /// Free the finished evaluation's worker and hand it to the next queued
    /// evaluation. A panicked task yields no evaluation, only its error.
    fn complete(&mut self, finished: Finished) -> (Option<Evaluation>, ChemResult<()>) {
        let Some(mut evaluation) = self.running.remove(&finished.ticket) else {
            let err = WorkerError::UnknownTicket {
                ticket: finished.ticket.0,
            };
            return (None, Err(err.into()));
        };
        if let Some(worker) = evaluation.worker {
            self.free_workers.insert(worker);
        }
        let mut result: ChemResult<()> = Ok(());
        let evaluation = match finished.outcome {
            Ok(outcome) => {
                evaluation.finish(outcome, finished.at);
                Some(evaluation)
            }
            Err(message) => {
                result = Err(WorkerError::TaskFailed { message }.into());
                None
            }
        };
        if let Some(next) = self.queue.pop_front() {
            if let Err(e) = self.start(next) {
                result = result.and(Err(e));
            }
        }
        (evaluation, result)
    }
}

#[async_trait]
impl WorkerManager for TokioWorkerManager {
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
        self.started.elapsed().as_secs_f64()
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
        let evaluation = Evaluation::new(ticket, point, self.now());
        if self.free_workers.is_empty() {
            self.queue.push_back(evaluation);
        } else {
            self.start(evaluation)?;
        }
        Ok(ticket)
    }

    fn poll(&mut self) -> ChemResult<Vec<Evaluation>> {
        while let Ok(finished) = self.rx.try_recv() {
            self.ready.push(finished);
        }
        let mut ready = std::mem::take(&mut self.ready);
        ready.sort_by(|a, b| a.at.total_cmp(&b.at).then(a.ticket.cmp(&b.ticket)));

        let mut done = std::mem::take(&mut self.undelivered);
        let mut first_error = None;
        for finished in ready {
            let (evaluation, result) = self.complete(finished);
            done.extend(evaluation);
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
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
        if !self.ready.is_empty() || !self.undelivered.is_empty() {
            return Ok(());
        }
        if self.running.is_empty() {
            return Err(internal_error!(
                "wait_for_completion with no evaluations in flight"
            ));
        }
        match self.rx.recv().await {
            Some(finished) => {
                self.ready.push(finished);
                Ok(())
            }
            None => Err(WorkerError::ChannelClosed {
                in_flight: self.running.len(),
            }
            .into()),
        }
    }

    fn name(&self) -> &str {
        "tokio"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chem_types::{Fingerprint, Molecule};
    use std::time::Duration;

    /// Sleeps `index` milliseconds, then scores the index. Index 99 panics.
    struct SleepyCaller;

    impl FunctionCaller for SleepyCaller {
        fn evaluate(&self, point: &ProcessedPoint) -> Result<f64, EvaluationError> {
            if point.index == 99 {
                panic!("worker blew up");
            }
            std::thread::sleep(Duration::from_millis(point.index as u64));
            Ok(point.index as f64)
        }

        fn raw_of(&self, point: &ProcessedPoint) -> ChemResult<Molecule> {
            Ok(Molecule::new(format!("C{}", point.index)))
        }
    }

    fn point(index: usize) -> ProcessedPoint {
        ProcessedPoint::new(index, Fingerprint::default())
    }

    async fn drain(wm: &mut TokioWorkerManager) -> Vec<Evaluation> {
        let mut all = Vec::new();
        while wm.outstanding() > 0 {
            wm.wait_for_completion().await.unwrap();
            all.extend(wm.poll().unwrap());
            assert!(wm.in_flight() <= wm.num_workers());
        }
        all
    }

    #[tokio::test]
    async fn runs_all_submissions_within_worker_limit() {
        let mut wm = TokioWorkerManager::new(2, Arc::new(SleepyCaller));
        for i in [30, 5, 10, 1] {
            wm.submit(point(i)).unwrap();
            assert!(wm.in_flight() <= 2);
        }
        assert_eq!(wm.queued(), 2);

        let done = drain(&mut wm).await;
        assert_eq!(done.len(), 4);
        assert!(done.iter().all(|e| e.is_success()));
        let mut values: Vec<f64> = done.iter().filter_map(|e| e.value).collect();
        values.sort_by(f64::total_cmp);
        assert_eq!(values, vec![1.0, 5.0, 10.0, 30.0]);
    }

    #[tokio::test]
    async fn short_evaluations_overtake_long_ones() {
        let mut wm = TokioWorkerManager::new(2, Arc::new(SleepyCaller));
        wm.submit(point(200)).unwrap();
        wm.submit(point(1)).unwrap();

        wm.wait_for_completion().await.unwrap();
        let first = wm.poll().unwrap();
        assert_eq!(first[0].ticket, Ticket(1));
        drain(&mut wm).await;
    }

    #[tokio::test]
    async fn reject_policy_when_busy() {
        let mut wm = TokioWorkerManager::new(1, Arc::new(SleepyCaller))
            .with_overflow_policy(OverflowPolicy::Reject);
        wm.submit(point(5)).unwrap();
        assert!(wm.submit(point(6)).unwrap_err().is_capacity_exceeded());
        drain(&mut wm).await;
    }

    #[tokio::test]
    async fn panicking_evaluation_is_task_failure() {
        let mut wm = TokioWorkerManager::new(1, Arc::new(SleepyCaller));
        wm.submit(point(99)).unwrap();
        wm.wait_for_completion().await.unwrap();
        let err = wm.poll().unwrap_err();
        assert!(err.to_string().contains("worker blew up"));
    }

    #[tokio::test]
    async fn completions_batched_with_a_panic_are_kept() {
        let mut wm = TokioWorkerManager::new(2, Arc::new(SleepyCaller));
        wm.submit(point(99)).unwrap();
        wm.submit(point(1)).unwrap();
        wm.wait_for_completion().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let err = wm.poll().unwrap_err();
        assert!(err.to_string().contains("worker blew up"));
        assert_eq!(wm.in_flight(), 0);
        assert_eq!(wm.free_slots(), 1);
        assert_eq!(wm.outstanding(), 1);

        wm.wait_for_completion().await.unwrap();
        let kept = wm.poll().unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].ticket, Ticket(1));
        assert_eq!(kept[0].value, Some(1.0));
        assert_eq!(wm.outstanding(), 0);
    }
}
