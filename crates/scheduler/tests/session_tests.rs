//! Session controller behaviour: change detection, share tokens, restore.

mod common;

use std::time::Duration;

use common::{drain, FakeChannel};
use scadlive_core::session::SessionState;
use scadlive_core::JobKind;
use scadlive_events::JobEventPayload;
use scadlive_scheduler::{SchedulerConfig, SchedulerContext, SessionController};
use tokio::time::sleep;

fn config() -> SchedulerConfig {
    SchedulerConfig {
        render_delay: Duration::from_millis(500),
        syntax_delay: Duration::from_millis(100),
        ..SchedulerConfig::default()
    }
}

fn initial() -> SessionState {
    SessionState::default_with_source("cube(10);")
}

#[tokio::test(start_paused = true)]
async fn semantic_change_schedules_both_jobs() {
    let channel = FakeChannel::new();
    let ctx = SchedulerContext::new(channel.clone());
    let mut events = ctx.events.subscribe();
    let mut controller = SessionController::spawn(initial(), &config(), vec![], ctx);

    assert!(controller.update(|s| s.source.content = "sphere(5);".into(), true));
    sleep(Duration::from_secs(2)).await;

    let started: Vec<JobKind> = drain(&mut events)
        .into_iter()
        .filter(|e| e.payload == JobEventPayload::Started)
        .map(|e| e.kind)
        .collect();
    assert_eq!(started, vec![JobKind::SyntaxCheck, JobKind::Render]);

    let tasks = channel.invocations();
    assert_eq!(tasks.len(), 2);
    assert!(tasks
        .iter()
        .all(|t| t.inputs()[0] == ("input.scad".to_string(), "sphere(5);".to_string())));
}

#[tokio::test(start_paused = true)]
async fn formatting_only_change_does_not_schedule() {
    let channel = FakeChannel::new();
    let ctx = SchedulerContext::new(channel.clone());
    let mut controller = SessionController::spawn(initial(), &config(), vec![], ctx);

    assert!(controller.update(|s| s.source.content = "cube(1);".into(), true));
    sleep(Duration::from_secs(2)).await;
    assert_eq!(channel.invocations().len(), 2);

    assert!(!controller.update(
        |s| s.source.content = "// tweak\ncube(1);   ".into(),
        true
    ));
    sleep(Duration::from_secs(2)).await;
    assert_eq!(channel.invocations().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn disallowed_run_records_change_without_scheduling() {
    let channel = FakeChannel::new();
    let ctx = SchedulerContext::new(channel.clone());
    let mut controller = SessionController::spawn(initial(), &config(), vec![], ctx);

    assert!(controller.update(|s| s.set_feature("roof", true), false));
    sleep(Duration::from_secs(2)).await;
    assert!(channel.invocations().is_empty());

    // Same state again: no change, still nothing scheduled.
    assert!(!controller.state_changed(true));
}

#[tokio::test(start_paused = true)]
async fn render_now_skips_debounce() {
    let channel = FakeChannel::new();
    let ctx = SchedulerContext::new(channel.clone());
    let controller = SessionController::spawn(initial(), &config(), vec!["BOSL2".into()], ctx);

    controller.render_now();
    sleep(Duration::from_millis(1)).await;

    let tasks = channel.invocations();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].output_paths(), ["out.stl"]);
    assert_eq!(tasks[0].auxiliary_mounts(), ["BOSL2"]);
    controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn share_and_restore_round_trip() {
    let channel = FakeChannel::new();
    let mut controller =
        SessionController::spawn(initial(), &config(), vec![], SchedulerContext::new(channel.clone()));
    controller.update(
        |s| {
            s.source.content = "cylinder(h = 3);".into();
            s.parameters.insert("h".into(), "3".into());
        },
        false,
    );
    let token = controller.share_token().expect("token");
    let shared = controller.state();

    let mut other =
        SessionController::spawn(initial(), &config(), vec![], SchedulerContext::new(channel.clone()));
    assert!(other.restore(&format!("#{token}")));
    assert_eq!(other.state(), shared);
    assert_eq!(other.subscribe_state().borrow().parameters["h"], "3");
}

#[tokio::test(start_paused = true)]
async fn malformed_token_falls_back_to_initial_state() {
    let channel = FakeChannel::new();
    let mut controller =
        SessionController::spawn(initial(), &config(), vec![], SchedulerContext::new(channel));
    controller.update(|s| s.source.content = "sphere(1);".into(), false);

    assert!(!controller.restore("%7Bnot-json"));
    assert_eq!(controller.state(), initial());
}
