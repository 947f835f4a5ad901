//! Scripted service for controller tests
//!
//! Plays a fixed program: assembling positions it before the first line and
//! every step executes the next line of the script. Faults can be queued
//! per call kind, and steps can be held open to simulate a request that is
//! still in flight.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::json;
use tokio::sync::{Notify, Semaphore};

use super::ExecutionService;
use crate::error::{Fault, Line};
use crate::memory_edit::MemoryEdit;
use crate::types::{FlagConfiguration, ServiceResponse, SimState, StepReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Assemble,
    Step,
    Reset,
    EditMemory,
}

/// Everything the controller asked for, in order
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    pub calls: Vec<CallKind>,
    pub sources: Vec<String>,
    pub flags: Vec<FlagConfiguration>,
    pub edits: Vec<MemoryEdit>,
}

impl CallLog {
    pub fn count(&self, kind: CallKind) -> usize {
        self.calls.iter().filter(|&&call| call == kind).count()
    }
}

#[derive(Debug)]
struct Script {
    lines: Vec<Line>,
    cursor: usize,
    loaded: bool,
    failures: VecDeque<(CallKind, Fault)>,
    log: CallLog,
}

/// Holds steps until the test lets them through
#[derive(Debug, Clone)]
pub struct StepGate {
    pub entered: Arc<Notify>,
    pub permits: Arc<Semaphore>,
}

impl StepGate {
    /// Let `n` held steps complete
    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedService {
    script: Arc<Mutex<Script>>,
    gate: Option<StepGate>,
}

impl ScriptedService {
    /// A program that executes `lines` in order and then ends
    pub fn new(lines: &[Line]) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                lines: lines.to_vec(),
                cursor: 0,
                loaded: false,
                failures: VecDeque::new(),
                log: CallLog::default(),
            })),
            gate: None,
        }
    }

    /// A program that loops over `lines` forever
    pub fn endless(lines: &[Line]) -> Self {
        let repeated: Vec<Line> = lines
            .iter()
            .copied()
            .cycle()
            .take(lines.len() * 10_000)
            .collect();
        Self::new(&repeated)
    }

    pub fn gated(mut self) -> (Self, StepGate) {
        let gate = StepGate {
            entered: Arc::new(Notify::new()),
            permits: Arc::new(Semaphore::new(0)),
        };
        self.gate = Some(gate.clone());
        (self, gate)
    }

    /// Make the next call of `kind` fail with `fault`
    pub fn fail_next(&self, kind: CallKind, fault: Fault) {
        self.lock().failures.push_back((kind, fault));
    }

    /// Copy of the calls made so far
    pub fn log(&self) -> CallLog {
        self.lock().log.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }
}

impl Script {
    fn take_failure(&mut self, kind: CallKind) -> Option<Fault> {
        let idx = self.failures.iter().position(|(k, _)| *k == kind)?;
        self.failures.remove(idx).map(|(_, fault)| fault)
    }

    fn state(&self) -> SimState {
        SimState {
            run_index: self.cursor as u64,
            instruction_count: self.lines.len() as u64,
            ready: self.loaded,
            next_source_line: if self.loaded {
                self.lines.get(self.cursor).copied()
            } else {
                None
            },
        }
    }

    fn respond(&self, step: Option<StepReport>) -> ServiceResponse {
        let mut response = ServiceResponse {
            state: Some(self.state()),
            step,
            ..Default::default()
        };
        response
            .fragments
            .insert("memory".into(), json!(format!("<memory run_index={}/>", self.cursor)));
        response
    }
}

impl ExecutionService for ScriptedService {
    async fn assemble(
        &mut self,
        source: &str,
        flags: &FlagConfiguration,
    ) -> Result<ServiceResponse, Fault> {
        let mut script = self.lock();
        script.log.calls.push(CallKind::Assemble);
        script.log.sources.push(source.to_string());
        script.log.flags.push(flags.clone());
        if let Some(fault) = script.take_failure(CallKind::Assemble) {
            script.loaded = false;
            return Err(fault);
        }
        script.cursor = 0;
        script.loaded = true;
        let mut response = script.respond(None);
        response
            .fragments
            .insert("assembler".into(), json!("<listing/>"));
        Ok(response)
    }

    async fn step_once(&mut self) -> Result<ServiceResponse, Fault> {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            if let Ok(permit) = gate.permits.acquire().await {
                permit.forget();
            }
        }

        let mut script = self.lock();
        script.log.calls.push(CallKind::Step);
        if let Some(fault) = script.take_failure(CallKind::Step) {
            return Err(fault);
        }
        if !script.loaded {
            return Err(Fault::service("No program loaded", None));
        }

        let executed = script.cursor;
        let source_line = script.lines.get(executed).copied();
        script.cursor = (executed + 1).min(script.lines.len());
        let next_source_line = script.lines.get(script.cursor).copied();

        let step = StepReport {
            done: next_source_line.is_none(),
            executed_index: Some(executed as u64),
            next_index: script.cursor as u64,
            source_line,
            source_command: source_line.map(|line| format!("OP{}", line)),
            next_source_line,
        };
        Ok(script.respond(Some(step)))
    }

    async fn reset(&mut self) -> Result<ServiceResponse, Fault> {
        let mut script = self.lock();
        script.log.calls.push(CallKind::Reset);
        if let Some(fault) = script.take_failure(CallKind::Reset) {
            return Err(fault);
        }
        script.cursor = 0;
        script.loaded = false;
        Ok(script.respond(None))
    }

    async fn edit_memory(&mut self, edit: &MemoryEdit) -> Result<ServiceResponse, Fault> {
        let mut script = self.lock();
        script.log.calls.push(CallKind::EditMemory);
        script.log.edits.push(edit.clone());
        if let Some(fault) = script.take_failure(CallKind::EditMemory) {
            return Err(fault);
        }
        Ok(script.respond(None))
    }
}
