use thiserror::Error;

/// Main error type for the Chemist system
#[derive(Error, Debug)]
pub enum ChemError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    #[error("Objective evaluation error: {0}")]
    Objective(#[from] ObjectiveError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Renderer unavailable: {0}")]
    RendererUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<EvaluationError> for ChemError {
    fn from(err: EvaluationError) -> Self {
        match err {
            EvaluationError::Translation(e) => ChemError::Translation(e),
            EvaluationError::Objective(e) => ChemError::Objective(e),
        }
    }
}

/// Failures mapping between molecules and the optimizer's encoding
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslationError {
    #[error("candidate index {index} is outside the pool of {pool_size} molecules")]
    IndexOutOfBounds { index: usize, pool_size: usize },

    #[error("fingerprint of candidate {index} does not match the pool entry")]
    FingerprintMismatch { index: usize },

    #[error("molecule {smiles} is not part of the candidate pool")]
    NotInPool { smiles: String },
}

/// Failures raised by an objective function
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ObjectiveError {
    #[error("invalid molecule {smiles}: {message}")]
    InvalidMolecule { smiles: String, message: String },

    #[error("objective produced a non-finite value for {smiles}")]
    NonFinite { smiles: String },

    #[error("unknown objective: {name}")]
    UnknownObjective { name: String },
}

/// A single failed evaluation, either side of the translate-then-score pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("translation failed: {0}")]
    Translation(TranslationError),

    #[error("objective failed: {0}")]
    Objective(ObjectiveError),
}

impl From<TranslationError> for EvaluationError {
    fn from(err: TranslationError) -> Self {
        EvaluationError::Translation(err)
    }
}

impl From<ObjectiveError> for EvaluationError {
    fn from(err: ObjectiveError) -> Self {
        EvaluationError::Objective(err)
    }
}

/// Worker pool errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkerError {
    #[error("all {num_workers} worker slots are busy and the pool rejects overflow")]
    CapacityExceeded { num_workers: usize },

    #[error("unknown evaluation ticket: {ticket}")]
    UnknownTicket { ticket: u64 },

    #[error("worker channel closed with {in_flight} evaluations in flight")]
    ChannelClosed { in_flight: usize },

    #[error("worker task failed: {message}")]
    TaskFailed { message: String },
}

/// Candidate data errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Data source not found: {path}")]
    SourceNotFound { path: String },

    #[error("Data loading failed: {message}")]
    LoadingFailed { message: String },

    #[error("Data source {source_name} contains no usable molecules")]
    Empty { source_name: String },
}

/// Result type alias for Chemist operations
pub type ChemResult<T> = Result<T, ChemError>;

impl ChemError {
    /// Whether the error is a capacity rejection the driver may retry.
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, ChemError::Worker(WorkerError::CapacityExceeded { .. }))
    }
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::ChemError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::ChemError::Config(format!($($arg)*))
    };
}
