use std::fmt;

use tokio::sync::oneshot;

use super::events::FaultReport;
use super::state::{HaltReason, SessionSnapshot};
use crate::error::Line;
use crate::report::SessionReport;
use crate::types::FlagConfiguration;

/// User intent sent to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Assemble,
    Step,
    /// Run until a halt; with a target line this is run-to-cursor
    Run { target: Option<Line> },
    Pause,
    /// Halt and rewind: reset the service and reassemble the current source
    Stop,
    Reset,
    EditMemory(String),
    ToggleBreakpoint(Line),
    ClearBreakpoints,
    UpdateSource(String),
    SetFlags(FlagConfiguration),
    SetSpeed(u8),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Assemble => "assemble",
            Action::Step => "step",
            Action::Run { target: None } => "run",
            Action::Run { target: Some(_) } => "run_to_cursor",
            Action::Pause => "pause",
            Action::Stop => "stop",
            Action::Reset => "reset",
            Action::EditMemory(_) => "edit_memory",
            Action::ToggleBreakpoint(_) => "toggle_breakpoint",
            Action::ClearBreakpoints => "clear_breakpoints",
            Action::UpdateSource(_) => "update_source",
            Action::SetFlags(_) => "set_flags",
            Action::SetSpeed(_) => "set_speed",
        }
    }
}

/// How an action ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// A run ended
    Halted(HaltReason),
    /// Precondition failed; state untouched
    Rejected(String),
    Faulted(FaultReport),
}

impl Outcome {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Outcome::Rejected(reason.into())
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Outcome::Rejected(_))
    }

    pub fn fault(&self) -> Option<&FaultReport> {
        match self {
            Outcome::Faulted(report) => Some(report),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Done => write!(f, "done"),
            Outcome::Halted(reason) => write!(f, "halted: {}", reason),
            Outcome::Rejected(reason) => write!(f, "rejected: {}", reason),
            Outcome::Faulted(report) => write!(f, "{} {}", report.context, report.describe()),
        }
    }
}

/// Message delivered to the session task
#[derive(Debug)]
pub(crate) enum Request {
    Action {
        action: Action,
        reply: oneshot::Sender<Outcome>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Report {
        reply: oneshot::Sender<SessionReport>,
    },
}
