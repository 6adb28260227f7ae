use std::fmt;

use crate::status_code::{self, StatusCode, status_code_t};

/// Outcome of an operation: a code plus an optional message.
///
/// `Status` is `Clone` because a single completion (one object read, one
/// object write) is reported to every waiter queued on it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Status {
    code: status_code_t,
    message: Option<String>,
}

impl Status {
    pub fn new(code: status_code_t) -> Self {
        Self {
            code,
            message: None,
        }
    }

    pub fn with_message(code: status_code_t, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(msg.into()),
        }
    }

    /// The success status.
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn code(&self) -> status_code_t {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::OK
    }

    /// Render as `"Meta::Busy(3019) commit in flight"`.
    pub fn describe(&self) -> String {
        let name = status_code::to_string(self.code);
        match &self.message {
            Some(msg) => format!("{}({}) {}", name, self.code, msg),
            None => format!("{}({})", name, self.code),
        }
    }

    /// Convert into a `Result`, treating an OK code as success.
    pub fn into_result(self) -> crate::Result<()> {
        if self.is_ok() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl std::error::Error for Status {}

impl From<status_code_t> for Status {
    fn from(code: status_code_t) -> Self {
        Self::new(code)
    }
}

impl<T> From<crate::Result<T>> for Status {
    fn from(result: crate::Result<T>) -> Self {
        match result {
            Ok(_) => Status::ok(),
            Err(status) => status,
        }
    }
}

/// Result type across the metadata server; the error is always a [`Status`].
pub type Result<T> = std::result::Result<T, Status>;

pub fn make_error<T>(code: status_code_t) -> Result<T> {
    Err(Status::new(code))
}

pub fn make_error_msg<T>(code: status_code_t, msg: impl Into<String>) -> Result<T> {
    Err(Status::with_message(code, msg))
}
