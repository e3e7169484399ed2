mod common;

use common::{args, config, session, two_runs};
use std::sync::Arc;
use steplog::cli::session::LogsRequest;
use steplog::platform::in_memory::{InMemoryPlatform, StepLogFixture};
use steplog::platform::models::{Condition, ContainerState, Pod, RunRecord};
use steplog::prompt::scripted::{Key, ScriptedPrompt};
use steplog::writer::sink::Output;
use std::time::Duration;

fn request(names: &[&str]) -> LogsRequest {
    LogsRequest::new(&config(), args(names))
}

#[tokio::test]
async fn named_run_is_streamed_directly() {
    let prompt = Arc::new(ScriptedPrompt::silent());
    let session = session(Arc::new(two_runs()), Arc::clone(&prompt));
    let (mut output, out, _) = Output::captured();

    session
        .taskrun_logs(&request(&["taskrun1"]), &mut output)
        .await
        .unwrap();

    assert_eq!(out.contents(), "step1 log\nstep2 log\n");
    assert!(prompt.shown().is_empty());
}

#[tokio::test]
async fn runs_across_the_namespace_are_offered() {
    let prompt = Arc::new(ScriptedPrompt::new([vec![Key::Down, Key::Enter]]));
    let session = session(Arc::new(two_runs()), Arc::clone(&prompt));
    let (mut output, out, _) = Output::captured();

    session.taskrun_logs(&request(&[]), &mut output).await.unwrap();

    assert_eq!(out.contents(), "step1 log\nstep2 log\n");
    assert_eq!(prompt.shown()[0].title, "Select taskrun:");
    assert_eq!(prompt.shown()[0].options.len(), 2);
}

#[tokio::test]
async fn empty_namespace_is_an_error() {
    let session = session(Arc::new(InMemoryPlatform::new()), Arc::new(ScriptedPrompt::silent()));
    let (mut output, _, _) = Output::captured();

    let err = session.taskrun_logs(&request(&[]), &mut output).await.unwrap_err();
    assert_eq!(err.to_string(), "No taskruns found");

    let err = session
        .taskrun_logs(&request(&["a", "b"]), &mut output)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "too many arguments");
}

#[tokio::test]
async fn step_failures_do_not_hide_other_steps() {
    let now = common::now();
    let platform = InMemoryPlatform::new()
        .with_run(
            RunRecord::new("run", "ns", now)
                .with_pod("pod")
                .with_condition(Condition::Failed),
        )
        .with_pod(
            Pod::new("pod", "ns")
                .with_init_container("step-credential-init", ContainerState::Terminated)
                .with_container("step-one", ContainerState::Terminated)
                .with_container("step-two", ContainerState::Terminated),
        )
        .with_step_log("pod", "step-credential-init", StepLogFixture::lines(["init"]))
        .with_step_log(
            "pod",
            "step-one",
            StepLogFixture::Unavailable("container logs were rotated".into()),
        )
        .with_step_log("pod", "step-two", StepLogFixture::lines(["two"]));
    let session = session(Arc::new(platform), Arc::new(ScriptedPrompt::silent()));
    let (mut output, out, err) = Output::captured();

    let mut request = request(&["run"]);
    request.prefix = true;
    session.taskrun_logs(&request, &mut output).await.unwrap();

    assert_eq!(out.contents(), "[two] two\n");
    assert!(err.contents().starts_with("failed to open log of step one: "));
}

#[tokio::test]
async fn all_steps_include_init_containers() {
    let now = common::now();
    let platform = InMemoryPlatform::new()
        .with_run(
            RunRecord::new("run", "ns", now)
                .with_pod("pod")
                .with_condition(Condition::Succeeded),
        )
        .with_pod(
            Pod::new("pod", "ns")
                .with_init_container("step-credential-init", ContainerState::Terminated)
                .with_container("step-one", ContainerState::Terminated),
        )
        .with_step_log("pod", "step-credential-init", StepLogFixture::lines(["init"]))
        .with_step_log("pod", "step-one", StepLogFixture::lines(["one"]));
    let session = session(Arc::new(platform), Arc::new(ScriptedPrompt::silent()));
    let (mut output, out, _) = Output::captured();

    let mut request = request(&["run"]);
    request.all_steps = true;
    session.taskrun_logs(&request, &mut output).await.unwrap();

    assert_eq!(out.contents(), "init\none\n");
}

#[tokio::test]
async fn follow_waits_for_a_pending_run() {
    let now = common::now();
    let platform = Arc::new(
        InMemoryPlatform::new()
            .with_run(RunRecord::new("run", "ns", now))
            .with_step_log("pod", "step-one", StepLogFixture::lines(["one"])),
    );

    let driver = {
        let platform = Arc::clone(&platform);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            platform.add_pod(
                Pod::new("pod", "ns").with_container("step-one", ContainerState::Terminated),
            );
            platform.set_run_pod("run", "pod");
            platform.set_run_condition("run", Condition::Succeeded);
        })
    };

    let session = session(platform, Arc::new(ScriptedPrompt::silent()));
    let (mut output, out, err) = Output::captured();
    let mut request = request(&["run"]);
    request.follow = true;
    session.taskrun_logs(&request, &mut output).await.unwrap();
    driver.await.unwrap();

    assert_eq!(out.contents(), "one\n");
    assert!(err.contents().is_empty());
}
