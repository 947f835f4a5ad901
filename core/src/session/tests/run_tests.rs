//! Run loop behavior without interruptions

use super::helpers::{assembled, controller, drain};
use crate::error::Fault;
use crate::service::scripted::{CallKind, ScriptedService};
use crate::session::{HaltReason, Outcome, Phase, RunMode, SessionEvent, PROGRAM_COMPLETE};

#[tokio::test]
async fn test_run_halts_at_first_breakpoint() {
    let service = ScriptedService::new(&[2, 5, 7, 9, 12]);
    let mut controller = assembled(service.clone()).await;
    controller.toggle_breakpoint(5);
    controller.toggle_breakpoint(9);

    let outcome = controller.run(None).await;

    assert_eq!(outcome, Outcome::Halted(HaltReason::Breakpoint(5)));
    let state = controller.state();
    assert!(!state.running);
    assert_eq!(state.run_mode, RunMode::None);
    assert_eq!(state.active_line, Some(2));
    assert_eq!(state.next_line, Some(5));
    assert_eq!(service.log().count(CallKind::Step), 1);
    assert_eq!(
        controller.events().current_status().text,
        "Paused at breakpoint line 5."
    );
}

#[tokio::test]
async fn test_run_resumes_to_next_breakpoint() {
    let service = ScriptedService::new(&[2, 5, 7, 9, 12]);
    let mut controller = assembled(service).await;
    controller.toggle_breakpoint(5);
    controller.toggle_breakpoint(9);

    controller.run(None).await;
    let outcome = controller.run(None).await;

    assert_eq!(outcome, Outcome::Halted(HaltReason::Breakpoint(9)));
    assert_eq!(controller.state().active_line, Some(7));
}

#[tokio::test]
async fn test_breakpoint_on_entry_line_does_not_halt_immediately() {
    let service = ScriptedService::new(&[2, 5, 7]);
    let mut controller = assembled(service.clone()).await;
    controller.toggle_breakpoint(2);

    let outcome = controller.run(None).await;

    assert_eq!(outcome, Outcome::Halted(HaltReason::Completed));
    assert_eq!(service.log().count(CallKind::Step), 3);
}

#[tokio::test]
async fn test_run_to_cursor_stops_at_target() {
    let service = ScriptedService::new(&[2, 5, 7, 9, 12]);
    let mut controller = assembled(service).await;
    controller.toggle_breakpoint(9);

    let outcome = controller.run(Some(7)).await;

    assert_eq!(outcome, Outcome::Halted(HaltReason::CursorReached(7)));
    assert_eq!(controller.state().next_line, Some(7));
    assert_eq!(controller.state().run_mode, RunMode::None);
    assert_eq!(
        controller.events().current_status().text,
        "Run-to-cursor reached line 7."
    );
}

#[tokio::test]
async fn test_breakpoints_stay_active_during_run_to_cursor() {
    let service = ScriptedService::new(&[2, 5, 7, 9, 12]);
    let mut controller = assembled(service).await;
    controller.toggle_breakpoint(5);
    controller.toggle_breakpoint(9);

    let outcome = controller.run(Some(7)).await;
    assert_eq!(outcome, Outcome::Halted(HaltReason::Breakpoint(5)));
    assert_eq!(controller.state().next_line, Some(5));

    let outcome = controller.run(Some(7)).await;
    assert_eq!(outcome, Outcome::Halted(HaltReason::CursorReached(7)));
    assert_eq!(controller.state().active_line, Some(5));
    assert_eq!(controller.state().next_line, Some(7));
}

#[tokio::test]
async fn test_run_to_completion() {
    let service = ScriptedService::new(&[2, 5, 7]);
    let (mut controller, mut rx) = controller(service);
    controller.assemble().await;

    let outcome = controller.run(None).await;

    assert_eq!(outcome, Outcome::Halted(HaltReason::Completed));
    assert_eq!(controller.state().phase(), Phase::Completed);
    assert_eq!(controller.run(None).await, Outcome::rejected(PROGRAM_COMPLETE));

    let events = drain(&mut rx);
    let stepped: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Stepped { line, .. } => *line,
            _ => None,
        })
        .collect();
    assert_eq!(stepped, vec![2, 5, 7]);
    assert!(events
        .iter()
        .any(|event| *event == SessionEvent::Halted(HaltReason::Completed)));
}

#[tokio::test]
async fn test_run_requires_assembly() {
    let service = ScriptedService::new(&[2]);
    let (mut controller, _rx) = controller(service.clone());

    let outcome = controller.run(None).await;

    assert_eq!(
        outcome.fault().map(|r| r.message.as_str()),
        Some("Assemble code before running.")
    );
    assert!(!controller.state().running);
    assert_eq!(service.log().count(CallKind::Step), 0);
}

#[tokio::test]
async fn test_run_fault_stops_run_and_keeps_assembly() {
    let service = ScriptedService::new(&[2, 5, 7, 9]);
    let mut controller = assembled(service.clone()).await;
    controller.step().await;

    service.fail_next(
        CallKind::Step,
        Fault::service("Runtime line 5: `DIV AB` -> divide by zero", None),
    );
    let outcome = controller.run(None).await;

    let report = outcome.fault().expect("expected a fault");
    assert_eq!(report.context, "Run failed.");
    assert_eq!(report.line, Some(5));

    let state = controller.state();
    assert!(!state.running);
    assert_eq!(state.run_mode, RunMode::None);
    assert!(state.assembled);
    assert_eq!(state.error_line, Some(5));
}

#[tokio::test]
async fn test_run_gives_up_at_step_limit() {
    let service = ScriptedService::endless(&[3, 4, 5]);
    let (controller, _rx) = controller(service.clone());
    let mut controller = controller;
    controller.run.max_steps = 4;
    controller.assemble().await;

    let outcome = controller.run(None).await;

    assert_eq!(outcome, Outcome::Halted(HaltReason::StepLimit));
    assert_eq!(service.log().count(CallKind::Step), 4);
    assert!(!controller.state().running);
    assert_eq!(controller.state().phase(), Phase::Idle);
}

#[tokio::test]
async fn test_breakpoints_past_end_are_pruned_before_run() {
    let service = ScriptedService::new(&[2, 40, 5]);
    let mut controller = assembled(service).await;
    controller.toggle_breakpoint(40);

    let outcome = controller.run(None).await;

    assert_eq!(outcome, Outcome::Halted(HaltReason::Completed));
    assert!(controller.registry().breakpoints().is_empty());
}
