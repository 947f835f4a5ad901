//! Session report export
//!
//! A JSON document capturing the debugger as the user sees it: status,
//! source, breakpoints, console history and the last rendered panels.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::Line;
use crate::session::{ConsoleLine, RunMode, SessionState, StatusLine};
use crate::types::Fragments;

pub const SIMULATOR_NAME: &str = "HexLogic AT89C51";
pub const SOURCE_LANGUAGE: &str = "8051-asm";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub generated_at: DateTime<Utc>,
    pub simulator: String,
    pub status: ReportStatus,
    pub code: ReportCode,
    pub breakpoints: Vec<Line>,
    pub debug_console: Vec<ConsoleLine>,
    /// Last copy of every panel the service rendered
    pub panels: Fragments,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportStatus {
    pub text: String,
    pub extra: String,
    pub is_error: bool,
    pub assembled: bool,
    pub is_running: bool,
    pub run_mode: RunMode,
    pub active_line: Option<Line>,
    pub next_line: Option<Line>,
    pub error_line: Option<Line>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportCode {
    pub language: String,
    pub source: String,
}

impl SessionReport {
    pub(crate) fn capture<'a>(
        state: &SessionState,
        status: &StatusLine,
        indicator: &str,
        source: &str,
        breakpoints: Vec<Line>,
        console: impl Iterator<Item = &'a ConsoleLine>,
        panels: &Fragments,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            simulator: SIMULATOR_NAME.to_string(),
            status: ReportStatus {
                text: status.text.clone(),
                extra: indicator.to_string(),
                is_error: status.is_error,
                assembled: state.assembled,
                is_running: state.running,
                run_mode: state.run_mode,
                active_line: state.active_line,
                next_line: state.next_line,
                error_line: state.error_line,
            },
            code: ReportCode {
                language: SOURCE_LANGUAGE.to_string(),
                source: source.to_string(),
            },
            breakpoints,
            debug_console: console.cloned().collect(),
            panels: panels.clone(),
        }
    }

    /// `hexlogic-output-<timestamp>.json`, with `:` and `.` made file-safe
    pub fn default_file_name(&self) -> String {
        let stamp = self
            .generated_at
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        format!("hexlogic-output-{}.json", stamp)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize session report")
    }

    /// Write the report into `target`
    ///
    /// A directory receives a file with the default name. Returns the path
    /// written.
    pub fn write_to(&self, target: &Path) -> Result<PathBuf> {
        let path = if target.is_dir() {
            target.join(self.default_file_name())
        } else {
            target.to_path_buf()
        };
        std::fs::write(&path, self.to_json()?)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConsoleLevel;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> SessionReport {
        let mut state = SessionState::new();
        state.assembled = true;
        state.next_line = Some(4);
        let console = vec![ConsoleLine {
            level: ConsoleLevel::Warn,
            text: "Breakpoint hit at L4.".into(),
        }];
        let mut panels = Fragments::new();
        panels.insert("memory".into(), json!("<table/>"));

        SessionReport::capture(
            &state,
            &StatusLine {
                text: "Paused at breakpoint line 4.".into(),
                is_error: false,
            },
            "Mode: AT89C51 | IP 2/9 | Next Ln 4",
            "MOV A,#1\nNOP\n",
            vec![4],
            console.iter(),
            &panels,
        )
    }

    #[test]
    fn test_report_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["simulator"], "HexLogic AT89C51");
        assert_eq!(value["code"]["language"], "8051-asm");
        assert_eq!(value["status"]["run_mode"], "none");
        assert_eq!(value["status"]["next_line"], 4);
        assert_eq!(value["status"]["error_line"], serde_json::Value::Null);
        assert_eq!(value["breakpoints"], json!([4]));
        assert_eq!(value["debug_console"][0]["level"], "warn");
        assert_eq!(value["panels"]["memory"], "<table/>");
    }

    #[test]
    fn test_default_file_name() {
        let mut report = sample();
        report.generated_at = Utc.with_ymd_and_hms(2024, 5, 1, 13, 45, 10).unwrap();
        assert_eq!(
            report.default_file_name(),
            "hexlogic-output-2024-05-01T13-45-10-000Z.json"
        );
    }

    #[test]
    fn test_write_into_directory() {
        let dir = std::env::temp_dir().join(format!("hexlogic-report-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let report = sample();
        let path = report.write_to(&dir).unwrap();
        assert_eq!(path, dir.join(report.default_file_name()));

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["code"]["source"], "MOV A,#1\nNOP\n");

        std::fs::remove_dir_all(&dir).ok();
    }
}
