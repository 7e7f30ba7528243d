use serde::Serialize;
use std::fmt;

/// Coarse classification shared by every error produced by the command
/// layer.
///
/// Crate-level error enums stay specific (one variant per failure reason);
/// [`ErrorKind`] is what a host uses to decide how to surface a failure and
/// whether resubmitting can ever help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The request is malformed and must be fixed before resubmitting.
    BadInput,
    /// A signature, token or claim could not be authenticated.
    Unauthenticated,
    /// The authenticated actor may not perform the operation.
    Unauthorized,
    /// A referenced policy, commitment, event or object does not exist.
    NotFound,
    /// A well-formed request was rejected by a business rule.
    OperationForbidden,
    /// Storage or encoding failure inside the command layer.
    Internal,
    /// Failure that originates outside the command layer (e.g. a DID
    /// resolver).
    External,
}

impl ErrorKind {
    /// Returns `true` when the same request may succeed if retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Internal | ErrorKind::External)
    }

    /// Stable string form, used in logs and wire-level error responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadInput => "BAD_INPUT",
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::OperationForbidden => "OPERATION_FORBIDDEN",
            ErrorKind::Internal => "INTERNAL",
            ErrorKind::External => "EXTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every error type of the command layer so that errors from
/// different crates can be classified uniformly.
pub trait Classify {
    /// The [`ErrorKind`] of this error.
    fn kind(&self) -> ErrorKind;
}
