use crate::core::disk::FileId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Out of space: requested {requested} blocks, {free} free")]
    OutOfSpace { requested: usize, free: usize },

    #[error("Unknown file: {0}")]
    UnknownFile(FileId),

    #[error("File already registered: {0}")]
    DuplicateFile(FileId),

    #[error("Cannot allocate a zero-sized file")]
    ZeroSizedFile,

    #[error("Invalid block ID: {0}")]
    InvalidBlockId(usize),

    #[error("Stalled criticality at step {step}: fragmentation {fragmentation:.4} not relieved")]
    StalledCriticality { step: u64, fragmentation: f64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Disk invariant violated: {0}")]
    InvariantViolation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SimError {
    /// Per-step anomalies are skipped and counted; everything else is fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SimError::OutOfSpace { .. }
                | SimError::UnknownFile(_)
                | SimError::StalledCriticality { .. }
        )
    }
}

impl From<validator::ValidationErrors> for SimError {
    fn from(errors: validator::ValidationErrors) -> Self {
        SimError::InvalidConfiguration(errors.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
