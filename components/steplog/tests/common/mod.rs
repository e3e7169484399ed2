#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use steplog::cli::session::Session;
use steplog::helpers::{clock::FixedClock, load_config::Config};
use steplog::platform::in_memory::{InMemoryPlatform, StepLogFixture};
use steplog::platform::models::{Condition, ContainerState, Definition, Pod, RunRecord};
use steplog::prompt::scripted::ScriptedPrompt;
use tokio_util::sync::CancellationToken;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

/// Configuration with fast polling and without step prefixes.
pub fn config() -> Config {
    let mut config = Config::default();
    config.general.namespace = "ns".to_string();
    config.logs.poll_interval_ms = 10;
    config.logs.prefix = false;
    config
}

pub fn session(platform: Arc<InMemoryPlatform>, prompt: Arc<ScriptedPrompt>) -> Session {
    Session::new(
        platform,
        prompt,
        Arc::new(FixedClock(now())),
        config(),
        CancellationToken::new(),
    )
}

pub fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Definition `task` in `ns`, with `taskrun1` (5 minutes ago) and `taskrun2`
/// (3 minutes ago). Both runs share one finished pod with two steps.
pub fn two_runs() -> InMemoryPlatform {
    let created = now() - Duration::hours(1);
    InMemoryPlatform::new()
        .with_definition(Definition::new("task", "ns"))
        .with_run(
            RunRecord::new("taskrun1", "ns", created)
                .for_definition("task")
                .started(now() - Duration::minutes(5))
                .with_pod("pod")
                .with_condition(Condition::Succeeded),
        )
        .with_run(
            RunRecord::new("taskrun2", "ns", created)
                .for_definition("task")
                .started(now() - Duration::minutes(3))
                .with_pod("pod")
                .with_condition(Condition::Succeeded),
        )
        .with_pod(
            Pod::new("pod", "ns")
                .with_container("step1", ContainerState::Terminated)
                .with_container("step2", ContainerState::Terminated),
        )
        .with_step_log("pod", "step1", StepLogFixture::lines(["step1 log"]))
        .with_step_log("pod", "step2", StepLogFixture::lines(["step2 log"]))
}
