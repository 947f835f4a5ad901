//! Events published to the UI
//!
//! The controller never draws anything. It publishes status changes,
//! console lines, fault reports and the service's presentation fragments,
//! and whoever renders the debugger subscribes.

use std::collections::VecDeque;

use serde::Serialize;
use tokio::sync::broadcast;

use super::state::{HaltReason, StatusLine};
use crate::error::{Fault, Line};
use crate::types::{Fragments, SimState};

const INDICATOR_IDLE: &str = "Mode: AT89C51";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Info,
    Warn,
    Error,
}

/// One line of the debug console
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleLine {
    pub level: ConsoleLevel,
    pub text: String,
}

/// A fault as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaultReport {
    /// What was being attempted, e.g. "Run failed."
    pub context: String,
    pub message: String,
    pub line: Option<Line>,
}

impl FaultReport {
    pub fn new(context: impl Into<String>, fault: &Fault) -> Self {
        Self {
            context: context.into(),
            message: fault.message().to_string(),
            line: fault.line(),
        }
    }

    /// Message with the line appended, as shown in the error box
    pub fn describe(&self) -> String {
        match self.line {
            Some(line) => format!("{} (line {})", self.message, line),
            None => self.message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Status(StatusLine),
    /// Secondary status text describing the simulator position
    Indicator { text: String },
    Console(ConsoleLine),
    /// Presentation fragments, forwarded untouched
    Render { fragments: Fragments, animate: bool },
    Stepped {
        line: Option<Line>,
        command: Option<String>,
    },
    Halted(HaltReason),
    Fault(FaultReport),
}

/// Publishes events and remembers what the report needs
///
/// Sending never blocks. With no subscribers events are dropped; slow
/// subscribers may lag.
#[derive(Debug)]
pub struct EventSink {
    tx: broadcast::Sender<SessionEvent>,
    status: StatusLine,
    indicator: String,
    console: VecDeque<ConsoleLine>,
    console_limit: usize,
    panels: Fragments,
}

impl EventSink {
    pub fn new(tx: broadcast::Sender<SessionEvent>, console_limit: usize) -> Self {
        Self {
            tx,
            status: StatusLine::default(),
            indicator: INDICATOR_IDLE.to_string(),
            console: VecDeque::new(),
            console_limit,
            panels: Fragments::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn status(&mut self, text: impl Into<String>) {
        self.set_status(text.into(), false);
    }

    pub fn error_status(&mut self, text: impl Into<String>) {
        self.set_status(text.into(), true);
    }

    fn set_status(&mut self, text: String, is_error: bool) {
        self.status = StatusLine { text, is_error };
        self.publish(SessionEvent::Status(self.status.clone()));
    }

    pub fn current_status(&self) -> &StatusLine {
        &self.status
    }

    /// Update the indicator from the simulator position
    pub fn indicate(&mut self, sim: &SimState) {
        let mut text = format!(
            "{} | IP {}/{}",
            INDICATOR_IDLE, sim.run_index, sim.instruction_count
        );
        if let Some(line) = sim.next_source_line {
            text.push_str(&format!(" | Next Ln {}", line));
        }
        self.set_indicator(text);
    }

    pub fn reset_indicator(&mut self) {
        self.set_indicator(INDICATOR_IDLE.to_string());
    }

    fn set_indicator(&mut self, text: String) {
        if self.indicator != text {
            self.indicator = text.clone();
            self.publish(SessionEvent::Indicator { text });
        }
    }

    pub fn indicator(&self) -> &str {
        &self.indicator
    }

    pub fn log(&mut self, level: ConsoleLevel, text: impl Into<String>) {
        let line = ConsoleLine {
            level,
            text: text.into(),
        };
        if self.console_limit > 0 {
            if self.console.len() == self.console_limit {
                self.console.pop_front();
            }
            self.console.push_back(line.clone());
        }
        self.publish(SessionEvent::Console(line));
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.log(ConsoleLevel::Info, text);
    }

    pub fn warn(&mut self, text: impl Into<String>) {
        self.log(ConsoleLevel::Warn, text);
    }

    pub fn clear_console(&mut self) {
        self.console.clear();
    }

    pub fn console(&self) -> impl Iterator<Item = &ConsoleLine> {
        self.console.iter()
    }

    /// Forward fragments and keep the latest copy of each panel
    pub fn render(&mut self, fragments: Fragments, animate: bool) {
        if fragments.is_empty() {
            return;
        }
        for (key, value) in &fragments {
            self.panels.insert(key.clone(), value.clone());
        }
        self.publish(SessionEvent::Render { fragments, animate });
    }

    pub fn panels(&self) -> &Fragments {
        &self.panels
    }

    pub fn stepped(&self, line: Option<Line>, command: Option<String>) {
        self.publish(SessionEvent::Stepped { line, command });
    }

    pub fn halted(&self, reason: HaltReason) {
        self.publish(SessionEvent::Halted(reason));
    }

    pub fn fault(&mut self, report: &FaultReport) {
        self.error_status(report.context.clone());
        self.log(ConsoleLevel::Error, format!("ERROR: {}", report.message));
        self.publish(SessionEvent::Fault(report.clone()));
    }
}
