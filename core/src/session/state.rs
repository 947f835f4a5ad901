use std::fmt;

use serde::Serialize;

use crate::error::Line;

/// Why the run loop is active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    None,
    Run,
    RunToCursor,
}

/// Execution session state
///
/// Created idle and not assembled. Only the controller and its run loop
/// write to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    /// Last assemble succeeded and the service reported the program ready
    pub assembled: bool,
    /// The run loop is issuing steps
    pub running: bool,
    pub run_mode: RunMode,
    /// Line most recently executed
    pub active_line: Option<Line>,
    /// Line the service will execute next; halt decisions use this one
    pub next_line: Option<Line>,
    /// Line of the last fault, cleared by the next successful action
    pub error_line: Option<Line>,
    /// A step reported the end of the program
    pub completed: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        match (self.assembled, self.running) {
            (_, true) => Phase::Running,
            (true, false) if self.completed => Phase::Completed,
            (true, false) => Phase::Idle,
            (false, false) => Phase::NotAssembled,
        }
    }
}

/// Coarse state machine view of [`SessionState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    NotAssembled,
    /// Assembled and ready, including after a pause
    Idle,
    Running,
    /// The program ran to its end; needs a stop, reset or assemble
    Completed,
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "line", rename_all = "snake_case")]
pub enum HaltReason {
    Breakpoint(Line),
    CursorReached(Line),
    Completed,
    Paused,
    Stopped,
    StepLimit,
    Shutdown,
}

impl HaltReason {
    pub fn line(&self) -> Option<Line> {
        match self {
            HaltReason::Breakpoint(line) | HaltReason::CursorReached(line) => Some(*line),
            _ => None,
        }
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::Breakpoint(line) => write!(f, "breakpoint at line {}", line),
            HaltReason::CursorReached(line) => write!(f, "reached line {}", line),
            HaltReason::Completed => write!(f, "program complete"),
            HaltReason::Paused => write!(f, "paused"),
            HaltReason::Stopped => write!(f, "stopped"),
            HaltReason::StepLimit => write!(f, "step limit reached"),
            HaltReason::Shutdown => write!(f, "session shut down"),
        }
    }
}

/// Last status bar message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusLine {
    pub text: String,
    pub is_error: bool,
}

/// Read-only copy of everything a UI needs to draw the debugger chrome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub phase: Phase,
    pub breakpoints: Vec<Line>,
    pub line_count: Line,
    /// Source text of `state.next_line`, trimmed
    pub next_source: Option<String>,
    pub status: StatusLine,
    pub speed: u8,
}
