mod common;

use common::{config, session};
use std::sync::Arc;
use std::time::Duration;
use steplog::cli::session::StartRequest;
use steplog::merger::run_request::Overrides;
use steplog::platform::in_memory::InMemoryPlatform;
use steplog::platform::models::{Definition, DefinitionRef, Label, ParamValue, RunRecord, RunSpec};
use steplog::prompt::scripted::ScriptedPrompt;
use steplog::starter::run_starter::DefinitionSource;
use steplog::writer::sink::Output;

fn platform() -> Arc<InMemoryPlatform> {
    Arc::new(
        InMemoryPlatform::new()
            .with_definition(Definition::new("task", "ns"))
            .with_clock(common::now()),
    )
}

#[tokio::test]
async fn start_submits_once_and_prints_the_hint() {
    let platform = platform();
    let session = session(Arc::clone(&platform), Arc::new(ScriptedPrompt::silent()));
    let (mut output, out, _) = Output::captured();

    let mut request = StartRequest::new(&config(), "task");
    request.show_log = false;
    request.timeout = Duration::from_secs(60);
    request.overrides = Overrides {
        input_resources: vec!["source=git-main".into()],
        output_resources: vec!["image=registry".into()],
        params: vec!["mode=fast".into(), "targets=a,b".into()],
        labels: vec!["team=ci".into()],
        service_account: Some("builder".into()),
    };
    session.start_task(&request, &mut output).await.unwrap();

    assert_eq!(
        out.contents(),
        "Taskrun started: task-run-00001\n\nIn order to track the taskrun progress run:\nsteplog taskrun logs task-run-00001 -f -n ns\n"
    );

    let created = platform.created_runs();
    assert_eq!(created.len(), 1);
    let run = &created[0];
    assert_eq!(run.generate_name, "task-run-");
    assert_eq!(run.definition, DefinitionRef::Named("task".into()));
    assert_eq!(run.timeout, Duration::from_secs(60));
    assert_eq!(run.spec.input_resources[0].resource_ref, "git-main");
    assert_eq!(run.spec.output_resources[0].name, "image");
    assert_eq!(
        run.spec.params[1].value,
        ParamValue::Array(vec!["a".into(), "b".into()])
    );
    assert_eq!(run.spec.service_account.as_deref(), Some("builder"));
    assert!(run.labels.contains(&Label {
        key: "team".into(),
        value: "ci".into(),
    }));
}

#[tokio::test]
async fn invalid_tokens_are_rejected_before_submission() {
    let platform = platform();
    let session = session(Arc::clone(&platform), Arc::new(ScriptedPrompt::silent()));
    let (mut output, out, _) = Output::captured();

    let mut request = StartRequest::new(&config(), "task");
    request.overrides.labels = vec!["nolabel".into()];
    let err = session.start_task(&request, &mut output).await.unwrap_err();

    assert!(err.to_string().contains("nolabel"));
    assert!(out.contents().is_empty());
    assert!(platform.created_runs().is_empty());
}

#[tokio::test]
async fn missing_task_is_reported() {
    let platform = platform();
    let session = session(Arc::clone(&platform), Arc::new(ScriptedPrompt::silent()));
    let (mut output, _, _) = Output::captured();

    let request = StartRequest::new(&config(), "notexist");
    let err = session.start_task(&request, &mut output).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "task name notexist does not exist in namespace ns"
    );
    assert!(platform.created_runs().is_empty());
}

#[tokio::test]
async fn json_definition_file_reuses_the_last_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("build.json");
    std::fs::write(
        &path,
        r#"{"apiVersion": "tekton.dev/v1alpha1", "kind": "Task",
            "metadata": {"name": "build"},
            "spec": {"steps": [{"name": "compile"}, {"name": "test"}]}}"#,
    )
    .unwrap();

    let previous = RunRecord::new("build-run-old", "ns", common::now())
        .for_definition("build")
        .with_spec(RunSpec {
            service_account: Some("builder".into()),
            ..RunSpec::default()
        });
    let platform = Arc::new(
        InMemoryPlatform::new()
            .with_run(previous)
            .with_clock(common::now()),
    );
    let session = session(Arc::clone(&platform), Arc::new(ScriptedPrompt::silent()));
    let (mut output, out, _) = Output::captured();

    let mut request = StartRequest::new(&config(), DefinitionSource::File(path));
    request.last = true;
    request.show_log = false;
    session.start_task(&request, &mut output).await.unwrap();

    assert!(out.contents().starts_with("Taskrun started: build-run-00001\n"));
    let created = platform.created_runs();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].generate_name, "build-run-");
    assert_eq!(created[0].spec.service_account.as_deref(), Some("builder"));
    let DefinitionRef::Inline(inline) = &created[0].definition else {
        panic!("expected an inline definition");
    };
    assert_eq!(inline.steps, ["compile", "test"]);
}
