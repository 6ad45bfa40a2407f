use thiserror::Error;

pub type Result<T, E = PortalError> = std::result::Result<T, E>;

/// Failures surfaced by the wallet and ledger layers.
///
/// Every variant is terminal: callers log it and fall back to the previous
/// local state. Nothing here is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortalError {
    #[error("no wallet provider configured")]
    ProviderMissing,
    #[error("connection request rejected: {0}")]
    UserRejected(String),
    #[error("ledger read unavailable: {0}")]
    ReadUnavailable(String),
    #[error("wave submission failed: {0}")]
    WriteFailed(String),
}

impl PortalError {
    pub fn read(err: impl std::fmt::Display) -> Self {
        PortalError::ReadUnavailable(err.to_string())
    }

    pub fn write(err: impl std::fmt::Display) -> Self {
        PortalError::WriteFailed(err.to_string())
    }

    pub fn rejected(reason: impl std::fmt::Display) -> Self {
        PortalError::UserRejected(reason.to_string())
    }
}
