use std::fmt;

/// Normalized failure of a single HTTP round trip.
///
/// `status` is `None` when no response was received at all (connection
/// refused, timeout, DNS). `data` carries the raw error body when the server
/// sent one.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportFailure {
    pub status: Option<u16>,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {status}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for TransportFailure {}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A job-scoped operation got a missing or sentinel id. No request was sent.
    #[error("Invalid job id: {0:?}")]
    InvalidIdentifier(String),

    /// The server answered but reported `success: false`.
    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportFailure),
}

/// Reject ids that cannot key a status or delete request.
pub fn validate_job_id(id: &str) -> Result<&str, CoreError> {
    if crate::types::is_valid_job_id(id) {
        Ok(id)
    } else {
        Err(CoreError::InvalidIdentifier(id.to_string()))
    }
}
