//! # chem-optimizer
//!
//! Evaluation orchestration for Chemist.
//!
//! Provides the molecule <-> processed-point translation layer and the
//! function caller wrapping objectives, optimizer strategies behind a
//! propose/observe contract, evaluation and budget bookkeeping, and worker
//! pools that run evaluations on a virtual clock or on tokio blocking tasks.

mod caller;
mod real;
mod reporter;
mod search;
mod trial;
mod workers;

pub use caller::{DomainTranslator, FunctionCaller, MolFunctionCaller, PoolTranslator};
pub use real::TokioWorkerManager;
pub use reporter::{MemoryLog, Reporter};
pub use search::{optimizer_by_name, BanditSearch, Optimizer, RandomSearch, STRATEGY_NAMES};
pub use trial::{BestResult, BestTracker, Budget, Evaluation, EvaluationStatus, Ticket};
pub use workers::{DurationSampler, SyntheticWorkerManager, WorkerManager};
