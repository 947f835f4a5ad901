//! Execution control state machine
//!
//! Every action validates itself against the current state, performs at
//! most a couple of service calls, and leaves the session in a well-defined
//! state whatever happens. Faults are reported through the event sink and
//! returned as [`Outcome::Faulted`]; they never propagate further.

use tracing::{debug, info, warn};

use super::command::{Action, Outcome};
use super::events::{EventSink, FaultReport};
use super::run_loop::Interrupts;
use super::state::{RunMode, SessionSnapshot, SessionState};
use crate::config::{RunConfig, MAX_SPEED, MIN_SPEED};
use crate::error::{Fault, Line};
use crate::memory_edit;
use crate::registry::Registry;
use crate::report::SessionReport;
use crate::service::ExecutionService;
use crate::types::{FlagConfiguration, ServiceResponse, StepReport};

pub const ALREADY_RUNNING: &str = "Execution already running. Use Pause or Stop.";
pub const EMPTY_SOURCE: &str = "Code editor is empty.";
pub const PROGRAM_COMPLETE: &str = "Program execution complete. Stop or reset to run again.";
pub const NOT_RUNNING: &str = "Execution is not running.";
pub const NOTHING_TO_STOP: &str = "Nothing to stop.";

pub struct Controller<S> {
    pub(super) service: S,
    pub(super) state: SessionState,
    pub(super) registry: Registry,
    pub(super) flags: FlagConfiguration,
    pub(super) run: RunConfig,
    pub(super) events: EventSink,
}

impl<S: ExecutionService> Controller<S> {
    pub fn new(service: S, run: RunConfig, events: EventSink) -> Self {
        Self {
            service,
            state: SessionState::new(),
            registry: Registry::default(),
            flags: FlagConfiguration::new(),
            run,
            events,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.registry.replace_source(source);
        self
    }

    pub fn with_flags(mut self, flags: FlagConfiguration) -> Self {
        self.flags = flags;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn flags(&self) -> &FlagConfiguration {
        &self.flags
    }

    pub fn speed(&self) -> u8 {
        self.run.speed
    }

    /* ===================== Dispatch ===================== */

    /// Apply one action while no run is in progress
    ///
    /// `Run` executes the loop to a halt without accepting interruptions;
    /// the session task uses [`Controller::run_interruptible`] instead.
    pub async fn apply(&mut self, action: Action) -> Outcome {
        debug!(action = action.name(), "applying action");
        match action {
            Action::Assemble => self.assemble().await,
            Action::Step => self.step().await,
            Action::Run { target } => self.run(target).await,
            Action::Pause => self.pause(),
            Action::Stop => self.stop().await,
            Action::Reset => self.reset().await,
            Action::EditMemory(input) => self.edit_memory(&input).await,
            Action::ToggleBreakpoint(line) => self.toggle_breakpoint(line),
            Action::ClearBreakpoints => self.clear_breakpoints(),
            Action::UpdateSource(text) => self.update_source(text),
            Action::SetFlags(flags) => self.set_flags(flags),
            Action::SetSpeed(speed) => self.set_speed(speed),
        }
    }

    /* ===================== Network Actions ===================== */

    pub async fn assemble(&mut self) -> Outcome {
        if self.state.running {
            return self.reject(ALREADY_RUNNING);
        }
        if self.registry.document().is_blank() {
            return self.refuse(EMPTY_SOURCE);
        }

        self.state.error_line = None;
        self.events.status("Assembling...");

        let result = self
            .service
            .assemble(self.registry.source(), &self.flags)
            .await;

        match result {
            Ok(response) => {
                self.finish_assemble(response);
                info!(ready = self.state.assembled, next_line = ?self.state.next_line, "assembled");
                self.events.clear_console();
                self.events.info("Assemble finished successfully.");
                self.events.status("Assemble completed.");
                Outcome::Done
            }
            Err(fault) => {
                self.state.assembled = false;
                Outcome::Faulted(self.surface("Assemble failed.", &fault))
            }
        }
    }

    pub async fn step(&mut self) -> Outcome {
        if self.state.running {
            return self.reject(ALREADY_RUNNING);
        }
        if !self.state.assembled {
            return self.refuse("Assemble code before stepping.");
        }
        if self.state.completed {
            return self.reject(PROGRAM_COMPLETE);
        }

        self.state.error_line = None;
        self.events.status("Stepping...");

        match self.service.step_once().await {
            Ok(response) => {
                match self.apply_response(response, true) {
                    Some(step) if step.done => {
                        self.apply_step(&step);
                        self.announce_completion();
                    }
                    Some(step) => {
                        self.apply_step(&step);
                        let line = step
                            .source_line
                            .map_or_else(|| "?".to_string(), |line| line.to_string());
                        self.events.status(format!("Stepped to line {}.", line));
                    }
                    None => self.events.status("Stepped."),
                }
                Outcome::Done
            }
            Err(fault) => Outcome::Faulted(self.surface("Step failed.", &fault)),
        }
    }

    /// Run to a halt; `target` turns this into run-to-cursor
    pub async fn run(&mut self, target: Option<Line>) -> Outcome {
        if let Err(outcome) = self.begin_run(target) {
            return outcome;
        }
        self.drive(target, &mut Interrupts::none()).await
    }

    /// Halt the run loop after the in-flight step settles
    pub fn pause(&mut self) -> Outcome {
        if !self.state.running {
            self.events.status(NOT_RUNNING);
            return Outcome::rejected(NOT_RUNNING);
        }

        self.state.running = false;
        self.state.run_mode = RunMode::None;
        info!("run paused");
        self.events.status("Execution paused.");
        self.events.warn("Execution paused.");
        Outcome::Done
    }

    /// Halt, reset the service and reassemble the current source
    pub async fn stop(&mut self) -> Outcome {
        let was_running = self.state.running;
        self.stop_with(was_running).await
    }

    pub(super) async fn stop_with(&mut self, was_running: bool) -> Outcome {
        self.state.running = false;
        self.state.run_mode = RunMode::None;

        if !self.state.assembled {
            self.events.status(NOTHING_TO_STOP);
            return Outcome::rejected(NOTHING_TO_STOP);
        }

        self.state.error_line = None;
        self.events.status("Stopping execution...");

        match self.service.reset().await {
            Ok(response) => self.events.render(response.fragments, false),
            Err(fault) => {
                self.state.assembled = false;
                return Outcome::Faulted(self.surface("Stop failed.", &fault));
            }
        }

        // The service is unloaded now, so nothing is left to step
        if self.registry.document().is_blank() {
            self.state.assembled = false;
            self.state.completed = false;
            self.state.active_line = None;
            self.state.next_line = None;
            let fault = Fault::validation(EMPTY_SOURCE);
            return Outcome::Faulted(self.surface("Stop failed.", &fault));
        }

        let result = self
            .service
            .assemble(self.registry.source(), &self.flags)
            .await;

        match result {
            Ok(response) => {
                self.finish_assemble(response);
                info!(ready = self.state.assembled, "stopped and reassembled");
                self.events.status("Execution stopped.");
                if was_running {
                    self.events.warn("Execution stopped and rewound to program start.");
                } else {
                    self.events.warn("Program rewound to start.");
                }
                Outcome::Done
            }
            Err(fault) => {
                self.state.assembled = false;
                Outcome::Faulted(self.surface("Stop failed.", &fault))
            }
        }
    }

    /// Clear everything, local state included even if the service call fails
    pub async fn reset(&mut self) -> Outcome {
        self.events.status("Resetting simulator...");

        let result = self.service.reset().await;

        self.state = SessionState::new();
        self.registry.clear_breakpoints();
        self.events.reset_indicator();

        match result {
            Ok(response) => {
                self.events.render(response.fragments, false);
                self.events.clear_console();
                self.events.info("Simulator reset.");
                self.events.status("Simulator reset.");
                info!("simulator reset");
                Outcome::Done
            }
            Err(fault) => {
                let report = FaultReport::new("Reset failed.", &fault);
                warn!(message = %report.message, "reset failed, local state cleared anyway");
                self.events.fault(&report);
                Outcome::Faulted(report)
            }
        }
    }

    pub async fn edit_memory(&mut self, input: &str) -> Outcome {
        let edit = match memory_edit::parse(input) {
            Ok(edit) => edit,
            Err(fault) => return Outcome::Faulted(self.surface(memory_edit::INVALID_FORMAT, &fault)),
        };

        self.state.error_line = None;
        self.events.status("Applying memory edit...");

        match self.service.edit_memory(&edit).await {
            Ok(response) => {
                self.apply_response(response, true);
                debug!(writes = edit.len(), "memory edited");
                self.events.status("Memory updated.");
                self.events.info(format!("Memory edit applied: {}", input.trim()));
                Outcome::Done
            }
            Err(fault) => Outcome::Faulted(self.surface("Memory edit failed.", &fault)),
        }
    }

    /* ===================== Local Actions ===================== */

    pub fn toggle_breakpoint(&mut self, line: Line) -> Outcome {
        if self.registry.toggle_breakpoint(line) {
            self.events.info(format!("Breakpoint set at L{}.", line));
        } else {
            self.events.info(format!("Breakpoint removed at L{}.", line));
        }
        Outcome::Done
    }

    pub fn clear_breakpoints(&mut self) -> Outcome {
        self.registry.clear_breakpoints();
        self.events.warn("All breakpoints cleared.");
        Outcome::Done
    }

    /// Replace the source text; takes effect on the next assemble
    pub fn update_source(&mut self, text: String) -> Outcome {
        self.registry.replace_source(text);
        Outcome::Done
    }

    pub fn set_flags(&mut self, flags: FlagConfiguration) -> Outcome {
        self.flags = flags;
        Outcome::Done
    }

    pub fn set_speed(&mut self, speed: u8) -> Outcome {
        if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
            return Outcome::rejected(format!(
                "Speed must be between {} and {}.",
                MIN_SPEED, MAX_SPEED
            ));
        }
        self.run.speed = speed;
        Outcome::Done
    }

    /* ===================== Queries ===================== */

    pub fn snapshot(&mut self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state.clone(),
            phase: self.state.phase(),
            breakpoints: self.registry.sorted_breakpoints(),
            line_count: self.registry.document().line_count(),
            next_source: self
                .state
                .next_line
                .and_then(|line| self.registry.document().line(line))
                .map(|text| text.trim().to_string()),
            status: self.events.current_status().clone(),
            speed: self.run.speed,
        }
    }

    pub fn report(&mut self) -> SessionReport {
        let breakpoints = self.registry.sorted_breakpoints();
        SessionReport::capture(
            &self.state,
            self.events.current_status(),
            self.events.indicator(),
            self.registry.source(),
            breakpoints,
            self.events.console(),
            self.events.panels(),
        )
    }

    /* ===================== Internals ===================== */

    /// Check run preconditions and enter the running state
    pub(super) fn begin_run(&mut self, target: Option<Line>) -> Result<(), Outcome> {
        if self.state.running {
            self.events.error_status(ALREADY_RUNNING);
            return Err(Outcome::rejected(ALREADY_RUNNING));
        }
        if !self.state.assembled {
            return Err(self.refuse("Assemble code before running."));
        }
        if self.state.completed {
            return Err(self.reject(PROGRAM_COMPLETE));
        }

        self.state.error_line = None;
        self.registry.reconcile();
        self.state.running = true;
        self.state.run_mode = match target {
            Some(_) => RunMode::RunToCursor,
            None => RunMode::Run,
        };

        info!(?target, breakpoints = self.registry.breakpoints().len(), "run started");
        match target {
            Some(line) => self.events.status(format!("Running toward line {}...", line)),
            None => self.events.status("Running..."),
        }
        Ok(())
    }

    fn finish_assemble(&mut self, response: ServiceResponse) {
        let sim = response.state.unwrap_or_default();
        self.state.assembled = sim.ready;
        self.state.completed = false;
        self.state.active_line = None;
        self.events.render(response.fragments, false);
        self.events.indicate(&sim);
        self.state.next_line = sim.next_source_line;
    }

    /// Forward fragments and pick up the reported next line
    pub(super) fn apply_response(
        &mut self,
        response: ServiceResponse,
        animate: bool,
    ) -> Option<StepReport> {
        let ServiceResponse {
            state,
            step,
            fragments,
        } = response;

        self.events.render(fragments, animate);
        if let Some(sim) = state {
            self.events.indicate(&sim);
            self.state.next_line = sim.next_source_line;
        }
        step
    }

    pub(super) fn apply_step(&mut self, step: &StepReport) {
        if let Some(line) = step.source_line {
            self.state.active_line = Some(line);
        }
        self.state.next_line = step.next_source_line;
        self.state.error_line = None;
        if step.done {
            self.state.completed = true;
        }

        debug!(line = ?step.source_line, next = ?step.next_source_line, done = step.done, "stepped");
        self.events
            .stepped(step.source_line, step.source_command.clone());

        if step.source_line.is_some() || step.source_command.is_some() {
            let line = step
                .source_line
                .map_or_else(|| "L?".to_string(), |line| format!("L{}", line));
            let command = step.source_command.as_deref().unwrap_or("");
            self.events.info(format!("STEP {} -> {}", line, command));
        }
    }

    pub(super) fn announce_completion(&mut self) {
        info!("program execution complete");
        self.events.status("Program execution complete.");
        self.events.info("Execution completed.");
    }

    /// Report a fault and remember its line
    pub(super) fn surface(&mut self, context: &str, fault: &Fault) -> FaultReport {
        let report = FaultReport::new(context, fault);
        warn!(context, message = %report.message, line = ?report.line, "action faulted");
        self.state.error_line = report.line;
        self.events.fault(&report);
        report
    }

    /// Local precondition failure shown like a fault
    fn refuse(&mut self, message: &str) -> Outcome {
        Outcome::Faulted(self.surface(message, &Fault::validation(message)))
    }

    pub(super) fn reject(&mut self, reason: &str) -> Outcome {
        self.events.error_status(reason);
        Outcome::rejected(reason)
    }
}
