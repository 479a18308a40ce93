//! Crate error taxonomy.
//!
//! Component-level operations catch their own failures and degrade (null
//! vector, skipped entity, in-memory-only persistence). These variants exist
//! so the degradation sites can tell the failure classes apart, not so errors
//! can escape a sweep.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StrataError>;

#[derive(Debug, Error)]
pub enum StrataError {
    /// Content rejected by the admissibility filter. Not user-facing.
    #[error("content rejected: {0}")]
    Validation(String),

    /// The remote embedding call failed at the transport/HTTP level.
    #[error("embedding transport failure: {0}")]
    Transport(String),

    /// The remote embedding call returned a 2xx body we could not interpret.
    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    /// The persistence collaborator failed; the engine continues in-memory.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Configuration rejected at construction time.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Local model load or inference failure.
    #[error("embedding failure: {0}")]
    Embedding(String),
}

impl StrataError {
    /// Transport-class failures are retryable; everything else is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_is_retryable() {
        assert!(StrataError::Transport("timeout".into()).is_retryable());
        assert!(!StrataError::MalformedResponse("no data".into()).is_retryable());
        assert!(!StrataError::Validation("empty".into()).is_retryable());
    }
}
