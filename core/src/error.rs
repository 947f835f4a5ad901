//! Fault types shared by the controller and the service boundary
//!
//! A fault is anything that stops an action from completing: a local
//! validation failure or a failed call to the simulator service. Faults
//! carry a human-readable message and, when known, the source line that
//! caused them.

use thiserror::Error;

/// 1-based source line number
pub type Line = u32;

/// Errors produced while executing a controller action
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// Detected locally, never sent to the service
    #[error("{message}")]
    Validation { message: String },

    /// The service call failed or answered with a non-success status
    #[error("{message}")]
    Service { message: String, line: Option<Line> },
}

impl Fault {
    pub fn validation(message: impl Into<String>) -> Self {
        Fault::Validation {
            message: message.into(),
        }
    }

    pub fn service(message: impl Into<String>, line: Option<Line>) -> Self {
        Fault::Service {
            message: message.into(),
            line,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Fault::Validation { message } | Fault::Service { message, .. } => message,
        }
    }

    /// Source line of the fault
    ///
    /// Prefers the structured line reported by the service and falls back
    /// to scanning the message text.
    pub fn line(&self) -> Option<Line> {
        match self {
            Fault::Validation { .. } => None,
            Fault::Service { message, line } => line.or_else(|| extract_line_number(message)),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Fault::Validation { .. })
    }
}

/// Pull a line reference such as `Line 12` or `Runtime line 7` out of a
/// free-text message.
///
/// The match is case-insensitive and takes the first reference found. Any
/// other message format yields `None`.
pub fn extract_line_number(message: &str) -> Option<Line> {
    let lower = message.to_ascii_lowercase();
    let mut rest = lower.as_str();

    while let Some(pos) = rest.find("line") {
        let after = &rest[pos + "line".len()..];
        let digits_start = after.trim_start_matches(|c: char| c.is_whitespace());
        let skipped_ws = after.len() - digits_start.len();

        if skipped_ws > 0 {
            let digits: String = digits_start
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(line) = digits.parse::<Line>() {
                return Some(line);
            }
        }

        rest = after;
    }

    None
}

/// The session task has gone away
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,
}
