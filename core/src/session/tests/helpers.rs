//! Shared fixtures for session tests

use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::{Config, RunConfig};
use crate::service::scripted::ScriptedService;
use crate::session::{
    self, Controller, Outcome, SessionEvent, SessionHandle, SessionSnapshot,
};

/// Fourteen lines so breakpoints up to line 14 survive reconciliation
pub const PROGRAM: &str = "\
; blink
ORG 0000h
MOV A, #01h
MOV P1, A
RL A
MOV P1, A
RL A
MOV P1, A
RL A
MOV P1, A
SJMP $
NOP
NOP
END";

/// 40ms between run steps, capped at 1000 steps
pub fn fast_run() -> RunConfig {
    RunConfig {
        speed: 10,
        min_delay_ms: 0,
        max_steps: 1000,
    }
}

pub fn test_config() -> Config {
    Config {
        run: fast_run(),
        ..Config::default()
    }
}

pub fn controller(
    service: ScriptedService,
) -> (Controller<ScriptedService>, broadcast::Receiver<SessionEvent>) {
    let (controller, events) = session::build_controller(service, &test_config());
    let rx = events.subscribe();
    (controller.with_source(PROGRAM), rx)
}

/// Controller with the program already assembled
pub async fn assembled(service: ScriptedService) -> Controller<ScriptedService> {
    let (mut controller, _rx) = controller(service);
    assert_eq!(controller.assemble().await, Outcome::Done);
    controller
}

pub fn spawn(service: ScriptedService) -> SessionHandle {
    session::start(service, &test_config(), PROGRAM)
}

/// Everything published so far
pub fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn statuses(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Status(status) => Some(status.text.clone()),
            _ => None,
        })
        .collect()
}

/// Poll snapshots until `ready` holds
pub async fn wait_for(
    handle: &SessionHandle,
    ready: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = handle.snapshot().await.unwrap();
            if ready(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session never reached the expected state")
}

pub async fn wait_until_running(handle: &SessionHandle) -> SessionSnapshot {
    wait_for(handle, |snapshot| snapshot.state.running).await
}
