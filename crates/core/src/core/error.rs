use thiserror::Error;

/// Every failure the engine can report.
///
/// Configuration and context-contract errors are raised before any simulation
/// happens. `NumericDomain` signals a logic defect inside a run and is never
/// recovered from.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid prior: {0}")]
    Prior(String),

    #[error("context contract violated: {0}")]
    ContextContract(String),

    #[error("numeric domain error: {0}")]
    NumericDomain(String),

    #[error("archive i/o: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub(crate) fn contract(msg: impl Into<String>) -> Self {
        Self::ContextContract(msg.into())
    }
}
