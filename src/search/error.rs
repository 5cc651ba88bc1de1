//! Search index error types
//!
//! Every failure is either worth retrying (timeouts, lock contention, I/O) or a
//! permanent rejection (malformed document, bad query). Publishing only retries
//! the former.

use thiserror::Error;

/// Category of index error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Permanent error (malformed document, schema mismatch)
    Permanent,
    /// Transient error (timeout, lock held, temporarily unavailable)
    Transient,
}

/// Errors that can occur during search index operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    /// The index could not take the write right now
    #[error("Index temporarily unavailable: {0}")]
    Transient(String),

    /// The index rejected the request; retrying will not help
    #[error("Index rejected request: {0}")]
    Permanent(String),
}

impl IndexError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Build an error from a message, categorized by its content
    pub fn from_message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match categorize_message(&msg) {
            ErrorCategory::Transient => Self::Transient(msg),
            ErrorCategory::Permanent => Self::Permanent(msg),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transient(_) => ErrorCategory::Transient,
            Self::Permanent(_) => ErrorCategory::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }
}

impl From<tantivy::TantivyError> for IndexError {
    fn from(err: tantivy::TantivyError) -> Self {
        use tantivy::TantivyError;

        match err {
            TantivyError::LockFailure(..) | TantivyError::IoError(_) | TantivyError::ErrorInThread(_) => {
                Self::Transient(err.to_string())
            }
            other => Self::from_message(other.to_string()),
        }
    }
}

/// Categorize an error based on its message
pub fn categorize_message(message: &str) -> ErrorCategory {
    let message = message.to_lowercase();

    if message.contains("timeout")
        || message.contains("timed out")
        || message.contains("connection")
        || message.contains("would block")
        || message.contains("try again")
        || message.contains("unavailable")
        || message.contains("lock")
    {
        return ErrorCategory::Transient;
    }

    ErrorCategory::Permanent
}
