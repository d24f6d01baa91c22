//! Closed error taxonomy surfaced to callers of the engine.
//!
//! Collaborators (HTTP client, config store) speak `anyhow`; everything that
//! leaves the engine is a [`ClassifiedError`] so callers branch on
//! [`ErrorKind`] instead of matching message text.

use std::fmt;

use thiserror::Error;

/// The fixed set of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport or connectivity failure talking to the backend.
    BackendUnavailable,
    /// The backend reported the job as failed.
    JobFailed,
    /// The backend reported the job as cancelled.
    JobCancelled,
    /// Terminal success but no usable text, or a required field is absent.
    OutputMissing,
    /// Text present but not parseable into the expected shape.
    OutputMalformed,
    /// The job did not reach a terminal status before the deadline.
    Timeout,
    /// The caller cancelled the request while it was waiting.
    Cancelled,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::BackendUnavailable,
        ErrorKind::JobFailed,
        ErrorKind::JobCancelled,
        ErrorKind::OutputMissing,
        ErrorKind::OutputMalformed,
        ErrorKind::Timeout,
        ErrorKind::Cancelled,
    ];

    /// Stable snake_case name, used in logs and machine-readable output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::JobFailed => "job_failed",
            ErrorKind::JobCancelled => "job_cancelled",
            ErrorKind::OutputMissing => "output_missing",
            ErrorKind::OutputMalformed => "output_malformed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure mapped onto one [`ErrorKind`], with a diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendUnavailable, message)
    }

    pub fn job_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::JobFailed, message)
    }

    pub fn output_missing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutputMissing, message)
    }

    pub fn output_malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutputMalformed, message)
    }
}

/// Map any failure onto a [`ClassifiedError`].
///
/// Errors that already are classified pass through unchanged; everything
/// else is a backend failure, with the whole context chain kept as message.
pub fn classify(err: anyhow::Error) -> ClassifiedError {
    match err.downcast::<ClassifiedError>() {
        Ok(classified) => classified,
        Err(other) => ClassifiedError::backend_unavailable(format!("{other:#}")),
    }
}
