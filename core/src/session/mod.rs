//! Execution session
//!
//! A session owns one [`Controller`] on a dedicated task. Callers talk to it
//! through a cloneable [`SessionHandle`]: every action is a message with a
//! reply, and everything the UI draws arrives as [`SessionEvent`]s on a
//! broadcast channel. Because the task is the only writer, actions are
//! applied strictly one after another, and a running program keeps serving
//! the inbox between steps.

mod command;
mod controller;
mod events;
mod run_loop;
mod state;

#[cfg(test)]
mod tests;

pub use command::{Action, Outcome};
pub use controller::{
    Controller, ALREADY_RUNNING, EMPTY_SOURCE, NOTHING_TO_STOP, NOT_RUNNING, PROGRAM_COMPLETE,
};
pub use events::{ConsoleLevel, ConsoleLine, EventSink, FaultReport, SessionEvent};
pub use run_loop::evaluate_halt;
pub use state::{HaltReason, Phase, RunMode, SessionSnapshot, SessionState, StatusLine};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{Config, SessionConfig};
use crate::error::{Line, SessionError};
use crate::report::SessionReport;
use crate::service::ExecutionService;
use crate::types::FlagConfiguration;
use command::Request;

/// Build a controller and its event channel from configuration
pub fn build_controller<S: ExecutionService>(
    service: S,
    config: &Config,
) -> (Controller<S>, broadcast::Sender<SessionEvent>) {
    let (events_tx, _) = broadcast::channel(config.session.event_buffer.max(1));
    let sink = EventSink::new(events_tx.clone(), config.session.console_history);
    (
        Controller::new(service, config.run.clone(), sink),
        events_tx,
    )
}

/// Start a session task for `service` with `source` loaded
pub fn start<S>(service: S, config: &Config, source: impl Into<String>) -> SessionHandle
where
    S: ExecutionService + 'static,
{
    let (controller, events) = build_controller(service, config);
    spawn(controller.with_source(source), events, &config.session).0
}

/// Move `controller` onto its own task
pub fn spawn<S>(
    controller: Controller<S>,
    events: broadcast::Sender<SessionEvent>,
    config: &SessionConfig,
) -> (SessionHandle, JoinHandle<()>)
where
    S: ExecutionService + 'static,
{
    let (tx, inbox) = mpsc::channel(config.command_buffer.max(1));
    let shutdown = CancellationToken::new();

    let task = tokio::spawn(serve(controller, inbox, shutdown.clone()));

    let handle = SessionHandle {
        tx,
        events,
        shutdown,
    };
    (handle, task)
}

async fn serve<S: ExecutionService>(
    mut controller: Controller<S>,
    mut inbox: mpsc::Receiver<Request>,
    shutdown: CancellationToken,
) {
    info!("session started");

    loop {
        let request = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            request = inbox.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        match request {
            Request::Action {
                action: Action::Run { target },
                reply,
            } => {
                controller
                    .run_interruptible(target, reply, &mut inbox, &shutdown)
                    .await;
            }
            Request::Action { action, reply } => {
                let outcome = controller.apply(action).await;
                let _ = reply.send(outcome);
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(controller.snapshot());
            }
            Request::Report { reply } => {
                let _ = reply.send(controller.report());
            }
        }
    }

    debug!("session inbox closed");
    info!("session stopped");
}

/* ===================== Handle ===================== */

/// Cloneable handle to a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Request>,
    events: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Send an action and wait for its outcome
    ///
    /// A `Run` resolves only when the run halts.
    pub async fn send(&self, action: Action) -> Result<Outcome, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Action { action, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn assemble(&self) -> Result<Outcome, SessionError> {
        self.send(Action::Assemble).await
    }

    pub async fn step(&self) -> Result<Outcome, SessionError> {
        self.send(Action::Step).await
    }

    pub async fn run(&self) -> Result<Outcome, SessionError> {
        self.send(Action::Run { target: None }).await
    }

    pub async fn run_to_cursor(&self, line: Line) -> Result<Outcome, SessionError> {
        self.send(Action::Run { target: Some(line) }).await
    }

    pub async fn pause(&self) -> Result<Outcome, SessionError> {
        self.send(Action::Pause).await
    }

    pub async fn stop(&self) -> Result<Outcome, SessionError> {
        self.send(Action::Stop).await
    }

    pub async fn reset(&self) -> Result<Outcome, SessionError> {
        self.send(Action::Reset).await
    }

    pub async fn edit_memory(&self, input: impl Into<String>) -> Result<Outcome, SessionError> {
        self.send(Action::EditMemory(input.into())).await
    }

    pub async fn toggle_breakpoint(&self, line: Line) -> Result<Outcome, SessionError> {
        self.send(Action::ToggleBreakpoint(line)).await
    }

    pub async fn clear_breakpoints(&self) -> Result<Outcome, SessionError> {
        self.send(Action::ClearBreakpoints).await
    }

    pub async fn update_source(&self, text: impl Into<String>) -> Result<Outcome, SessionError> {
        self.send(Action::UpdateSource(text.into())).await
    }

    pub async fn set_flags(&self, flags: FlagConfiguration) -> Result<Outcome, SessionError> {
        self.send(Action::SetFlags(flags)).await
    }

    pub async fn set_speed(&self, speed: u8) -> Result<Outcome, SessionError> {
        self.send(Action::SetSpeed(speed)).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Snapshot { reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn report(&self) -> Result<SessionReport, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Report { reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Ask the session task to exit; a run in progress halts first
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Wait until the session task has exited
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}
