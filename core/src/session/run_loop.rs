//! Run loop
//!
//! Issues steps one at a time. Between steps it waits out the speed delay
//! while still serving the session inbox, so a pause, stop or breakpoint
//! toggle lands before the next step is issued. A step already in flight is
//! always allowed to settle and its result is applied.

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::command::{Action, Outcome, Request};
use super::controller::{Controller, ALREADY_RUNNING};
use super::state::{HaltReason, RunMode};
use crate::error::Line;
use crate::registry::BreakpointSet;
use crate::service::ExecutionService;
use crate::types::StepReport;

/// Decide whether the run stops after `step`
///
/// Only the line the service will execute next is considered. The cursor
/// target wins over a breakpoint on the same line.
pub fn evaluate_halt(
    step: &StepReport,
    target: Option<Line>,
    breakpoints: &BreakpointSet,
) -> Option<HaltReason> {
    let next = step.next_source_line?;
    if target == Some(next) {
        return Some(HaltReason::CursorReached(next));
    }
    if breakpoints.contains(next) {
        return Some(HaltReason::Breakpoint(next));
    }
    None
}

/* ===================== Interrupts ===================== */

/// Stop or reset received mid-run, executed once the loop has exited
#[derive(Debug)]
pub(crate) enum Deferred {
    Stop(oneshot::Sender<Outcome>),
    Reset(oneshot::Sender<Outcome>),
}

enum Wake {
    Elapsed,
    Shutdown,
    Request(Request),
}

/// Where a run can be interrupted from
///
/// A direct [`Controller::run`] has no inbox and no shutdown token, so it
/// only ever halts on its own.
pub(crate) struct Interrupts<'a> {
    inbox: Option<&'a mut mpsc::Receiver<Request>>,
    shutdown: Option<&'a CancellationToken>,
    deferred: Vec<Deferred>,
}

impl<'a> Interrupts<'a> {
    pub(crate) fn none() -> Self {
        Self {
            inbox: None,
            shutdown: None,
            deferred: Vec::new(),
        }
    }

    pub(crate) fn new(
        inbox: &'a mut mpsc::Receiver<Request>,
        shutdown: &'a CancellationToken,
    ) -> Self {
        Self {
            inbox: Some(inbox),
            shutdown: Some(shutdown),
            deferred: Vec::new(),
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.is_some_and(|token| token.is_cancelled())
    }

    fn defer(&mut self, deferred: Deferred) {
        self.deferred.push(deferred);
    }

    fn into_deferred(self) -> Vec<Deferred> {
        self.deferred
    }

    async fn wait(&mut self, deadline: Instant) -> Wake {
        let shutdown = self.shutdown;
        tokio::select! {
            biased;
            _ = cancelled(shutdown) => Wake::Shutdown,
            request = next_request(&mut self.inbox) => Wake::Request(request),
            _ = sleep_until(deadline) => Wake::Elapsed,
        }
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Next inbound request; pends forever once the channel is gone
async fn next_request(inbox: &mut Option<&mut mpsc::Receiver<Request>>) -> Request {
    let received = match inbox.as_mut() {
        Some(rx) => rx.recv().await,
        None => None,
    };
    match received {
        Some(request) => request,
        None => {
            *inbox = None;
            std::future::pending().await
        }
    }
}

/* ===================== Loop ===================== */

impl<S: ExecutionService> Controller<S> {
    /// Run while serving `inbox`, then execute anything deferred
    ///
    /// The run's own reply is sent as soon as the loop exits, before a
    /// deferred stop or reset goes out to the service.
    pub(crate) async fn run_interruptible(
        &mut self,
        target: Option<Line>,
        reply: oneshot::Sender<Outcome>,
        inbox: &mut mpsc::Receiver<Request>,
        shutdown: &CancellationToken,
    ) {
        let mut interrupts = Interrupts::new(inbox, shutdown);
        let outcome = match self.begin_run(target) {
            Ok(()) => self.drive(target, &mut interrupts).await,
            Err(outcome) => outcome,
        };
        let _ = reply.send(outcome);

        for deferred in interrupts.into_deferred() {
            match deferred {
                Deferred::Stop(reply) => {
                    let outcome = self.stop_with(true).await;
                    let _ = reply.send(outcome);
                }
                Deferred::Reset(reply) => {
                    let outcome = self.reset().await;
                    let _ = reply.send(outcome);
                }
            }
        }
    }

    pub(super) async fn drive(
        &mut self,
        target: Option<Line>,
        interrupts: &mut Interrupts<'_>,
    ) -> Outcome {
        let limit = self.run.step_limit();
        let mut steps: u64 = 0;
        let mut halt: Option<HaltReason> = None;

        let outcome = loop {
            if !self.state.running {
                break Outcome::Halted(halt.unwrap_or(HaltReason::Paused));
            }
            if interrupts.is_shutdown() {
                self.state.running = false;
                break Outcome::Halted(HaltReason::Shutdown);
            }
            if limit.is_some_and(|max| steps >= max) {
                self.state.running = false;
                warn!(steps, "run hit the step limit");
                self.events
                    .status(format!("Run stopped after {} steps without a halt.", steps));
                self.events.warn(format!("Step limit of {} reached.", steps));
                break Outcome::Halted(HaltReason::StepLimit);
            }

            steps += 1;
            let response = match self.service.step_once().await {
                Ok(response) => response,
                Err(fault) => {
                    self.state.running = false;
                    self.state.run_mode = RunMode::None;
                    break Outcome::Faulted(self.surface("Run failed.", &fault));
                }
            };

            if let Some(step) = self.apply_response(response, true) {
                self.apply_step(&step);

                if step.done {
                    self.state.running = false;
                    self.announce_completion();
                    break Outcome::Halted(HaltReason::Completed);
                }

                if let Some(reason) = evaluate_halt(&step, target, self.registry.breakpoints()) {
                    self.state.running = false;
                    self.announce_halt(reason);
                    break Outcome::Halted(reason);
                }
            }

            let deadline = Instant::now() + self.run.step_delay();
            while self.state.running {
                match interrupts.wait(deadline).await {
                    Wake::Elapsed => break,
                    Wake::Shutdown => {
                        info!("shutdown requested during run");
                        self.state.running = false;
                        halt = Some(HaltReason::Shutdown);
                    }
                    Wake::Request(request) => {
                        if let Some(reason) = self.interrupt(request, interrupts).await {
                            halt = Some(reason);
                        }
                    }
                }
            }
        };

        self.state.run_mode = RunMode::None;
        if let Outcome::Halted(reason) = &outcome {
            debug!(?reason, steps, "run halted");
            self.events.halted(*reason);
        }
        outcome
    }

    /// Serve one request that arrived mid-run
    ///
    /// Returns the halt reason when the request ends the run.
    async fn interrupt(
        &mut self,
        request: Request,
        interrupts: &mut Interrupts<'_>,
    ) -> Option<HaltReason> {
        let (action, reply) = match request {
            Request::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
                return None;
            }
            Request::Report { reply } => {
                let _ = reply.send(self.report());
                return None;
            }
            Request::Action { action, reply } => (action, reply),
        };

        debug!(action = action.name(), "action received during run");
        let (outcome, halt) = match action {
            Action::Pause => (self.pause(), Some(HaltReason::Paused)),
            Action::Stop => {
                self.halt_for_rewind();
                interrupts.defer(Deferred::Stop(reply));
                return Some(HaltReason::Stopped);
            }
            Action::Reset => {
                self.halt_for_rewind();
                interrupts.defer(Deferred::Reset(reply));
                return Some(HaltReason::Stopped);
            }
            Action::Assemble | Action::Step | Action::Run { .. } => {
                (self.reject(ALREADY_RUNNING), None)
            }
            Action::EditMemory(input) => (self.edit_memory(&input).await, None),
            Action::ToggleBreakpoint(line) => (self.toggle_breakpoint(line), None),
            Action::ClearBreakpoints => (self.clear_breakpoints(), None),
            Action::UpdateSource(text) => (self.update_source(text), None),
            Action::SetFlags(flags) => (self.set_flags(flags), None),
            Action::SetSpeed(speed) => (self.set_speed(speed), None),
        };

        let _ = reply.send(outcome);
        halt
    }

    fn halt_for_rewind(&mut self) {
        self.state.running = false;
        self.state.run_mode = RunMode::None;
    }

    fn announce_halt(&mut self, reason: HaltReason) {
        info!(?reason, "run halted");
        match reason {
            HaltReason::CursorReached(line) => {
                self.events
                    .status(format!("Run-to-cursor reached line {}.", line));
                self.events.warn(format!("Run-to-cursor stop at L{}.", line));
            }
            HaltReason::Breakpoint(line) => {
                self.events
                    .status(format!("Paused at breakpoint line {}.", line));
                self.events.warn(format!("Breakpoint hit at L{}.", line));
            }
            _ => {}
        }
    }
}
