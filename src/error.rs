use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to the directory service.
///
/// The enum is `Clone` so a failed shared future can hand the same error to
/// every coalesced caller.
#[derive(Error, Debug, Clone)]
pub enum DirectoryError {
    /// The requested entity does not exist (HTTP 404).
    ///
    /// Chain traversal treats this as the normal top-of-hierarchy signal;
    /// everywhere else it surfaces to the caller.
    #[error("resource not found")]
    NotFound,

    /// Any other non-success HTTP status on an individual operation.
    #[error("operation failed ({status}): {message}")]
    Operation {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Service-provided error message, or the raw body when none exists.
        message: String,
    },

    /// The batched call itself failed: network error, non-success status on
    /// the batch endpoint, a malformed envelope, or a missing response id.
    /// Applies uniformly to every request folded into that batch.
    #[error("batch call failed: {0}")]
    Batch(String),

    /// The external credential collaborator could not supply a bearer token.
    #[error("token acquisition failed: {0}")]
    Token(String),

    /// Connection-level failure of a direct (non-batched) call, before any
    /// HTTP status exists.
    #[error("transport error: {0}")]
    Transport(String),

    /// A success payload that does not match the expected schema.
    #[error("malformed payload: {0}")]
    Decode(String),

    /// Rejected client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DirectoryError {
    /// Classify an individual operation's HTTP status into an error.
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        if status == StatusCode::NOT_FOUND {
            DirectoryError::NotFound
        } else {
            DirectoryError::Operation {
                status,
                message: message.into(),
            }
        }
    }

    /// Returns true for the sentinel kind that terminates chain traversal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DirectoryError::NotFound)
    }

    /// Returns true if the failure applied to a whole batch rather than a
    /// single operation.
    pub fn is_batch_failure(&self) -> bool {
        matches!(self, DirectoryError::Batch(_))
    }
}
