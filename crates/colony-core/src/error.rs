use thiserror::Error;

/// The five error kinds surfaced across the simulation core (§7).
///
/// `Internal` should be unreachable in a correctly driven simulator; its
/// presence here is a defect, not a normal control-flow path.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("{0}")]
    SessionBusy(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Short machine-readable label used as `result` in audit entries.
    pub fn label(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "not_found",
            CoreError::InvalidState(_) => "invalid_state",
            CoreError::SessionBusy(_) => "session_busy",
            CoreError::InvalidRequest(_) => "invalid_request",
            CoreError::Internal(_) => "internal",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
