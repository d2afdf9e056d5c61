//! Conversion of table/cursor outcomes into the host's error channel.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use vtbridge_error::{ErrorCode, Result, VtabError};

/// An error as the host sees it: a result code and a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    pub code: ErrorCode,
    pub message: String,
}

impl HostError {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code as i32)
    }
}

impl std::error::Error for HostError {}

impl From<VtabError> for HostError {
    fn from(err: VtabError) -> Self {
        Self {
            code: err.error_code(),
            message: err.to_string(),
        }
    }
}

impl From<&VtabError> for HostError {
    fn from(err: &VtabError) -> Self {
        Self {
            code: err.error_code(),
            message: err.to_string(),
        }
    }
}

/// Result of a host entry point.
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Run a table or cursor callback, turning a panic into
/// [`VtabError::Internal`] when `catch_panics` is set.
pub(crate) fn guarded<T>(catch_panics: bool, f: impl FnOnce() -> Result<T>) -> Result<T> {
    if !catch_panics {
        return f();
    }
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(VtabError::internal(format!(
            "virtual table callback panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
