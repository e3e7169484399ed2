// Local crates
use crate::helpers::clock::Clock;
use crate::lister::run_lister::{ListError, RunLister};
use crate::merger::{
    keyed_merger::MergeError,
    run_request::{Overrides, build_run_request},
};
use crate::platform::{
    client::{Platform, PlatformError},
    convert::inline_definition,
    models::{DefinitionRef, InlineDefinition, RunRecord},
};
use crate::streamer::{
    coordinator::{LogStreamCoordinator, StreamError},
    models::StreamOptions,
};
use crate::writer::{log_writer::LogWriter, sink::Output};

// External crates
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Failures of `task start`. Nothing has been submitted when one of these is returned,
/// except for [`StartError::Stream`].
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// The named definition is not on the platform.
    #[error("task name {name} does not exist in namespace {namespace}")]
    DefinitionMissing {
        /// Definition name.
        name: String,
        /// Namespace that was searched.
        namespace: String,
    },
    /// The definition document could not be read or decoded.
    #[error("unable to read task file {}: {message}", path.display())]
    DefinitionFile {
        /// Document path as given.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },
    /// An override token is malformed.
    #[error(transparent)]
    Merge(#[from] MergeError),
    /// `--last` found no previous run.
    #[error(transparent)]
    List(#[from] ListError),
    /// The platform rejected a call, e.g. the submission itself.
    #[error(transparent)]
    Platform(#[from] PlatformError),
    /// The new run could not be followed.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Where the definition of a new run comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionSource {
    /// A definition stored on the platform.
    Named(String),
    /// A YAML or JSON definition document, sent inline with the run.
    File(PathBuf),
}

impl fmt::Display for DefinitionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl From<&str> for DefinitionSource {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

/// Read a definition document and make sure it names itself.
async fn read_definition(path: &Path) -> Result<InlineDefinition, StartError> {
    let failed = |message: String| StartError::DefinitionFile {
        path: path.to_path_buf(),
        message,
    };

    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| failed(e.to_string()))?;
    let inline = inline_definition(&raw).map_err(|e| failed(e.to_string()))?;
    if inline.name.is_empty() {
        return Err(failed("metadata.name is missing".to_string()));
    }
    Ok(inline)
}

/// What to start and how to report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOptions {
    /// Definition to run.
    pub definition: DefinitionSource,
    /// Namespace the run is created in.
    pub namespace: String,
    /// Raw `key=value` tokens from the command line.
    pub overrides: Overrides,
    /// Seed bindings, parameters and service account from the newest run.
    pub last: bool,
    /// Follow the new run's logs instead of printing how to.
    pub show_log: bool,
    /// Run timeout submitted with the request.
    pub timeout: Duration,
    /// Prefix followed lines with their step name.
    pub prefix: bool,
    /// Follow-mode polling interval.
    pub poll_interval: Duration,
}

/// Creates a run of a definition and optionally follows it.
pub struct RunStarter {
    platform: Arc<dyn Platform>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for RunStarter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunStarter").finish_non_exhaustive()
    }
}

impl RunStarter {
    /// Starter submitting to `platform`; `cancel` stops a followed run.
    pub fn new(
        platform: Arc<dyn Platform>,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            platform,
            clock,
            cancel,
        }
    }

    /// Submit one new run of `options.definition` and return the platform's record.
    ///
    /// Override tokens are validated before anything is submitted. Submission happens
    /// once and is never retried.
    #[instrument(
        name = "steplog_starter::start",
        target = "starter::run_starter",
        level = "debug",
        skip_all,
        fields(definition = %options.definition, namespace = %options.namespace, last = options.last)
    )]
    pub async fn start(
        &self,
        options: &StartOptions,
        output: &mut Output,
    ) -> Result<RunRecord, StartError> {
        let namespace = options.namespace.as_str();

        let definition = match &options.definition {
            DefinitionSource::Named(name) => {
                self.check_exists(name, namespace).await?;
                DefinitionRef::Named(name.clone())
            }
            DefinitionSource::File(path) => DefinitionRef::Inline(read_definition(path).await?),
        };

        let template = if options.last {
            let lister = RunLister::new(Arc::clone(&self.platform), Arc::clone(&self.clock), namespace);
            let previous = lister.last(definition.name()).await?;
            tracing::debug!(previous = %previous.name, "Seeding request from previous run");
            Some(previous.spec)
        } else {
            None
        };

        let request = build_run_request(
            definition,
            namespace,
            template.as_ref(),
            &options.overrides,
            options.timeout,
        )?;

        let created = self.platform.create_run(&request).await?;
        tracing::info!(run = %created.name, "Run created");
        output.say(&format!("Taskrun started: {}", created.name));

        if !options.show_log {
            output.say(&format!(
                "\nIn order to track the taskrun progress run:\nsteplog taskrun logs {} -f -n {}",
                created.name, namespace
            ));
            return Ok(created);
        }

        output.say("Waiting for logs to be available...");
        let coordinator = LogStreamCoordinator::new(
            Arc::clone(&self.platform),
            namespace,
            StreamOptions {
                follow: true,
                all_steps: false,
                poll_interval: options.poll_interval,
            },
            self.cancel.clone(),
        );
        let stream = coordinator.open(&created.name).await?;
        LogWriter::new(options.prefix).drain(stream, output).await;

        Ok(created)
    }

    async fn check_exists(&self, name: &str, namespace: &str) -> Result<(), StartError> {
        match self.platform.get_definition(name, namespace).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => Err(StartError::DefinitionMissing {
                name: name.to_string(),
                namespace: namespace.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::clock::FixedClock;
    use crate::platform::in_memory::{InMemoryPlatform, StepLogFixture};
    use crate::platform::models::{
        Condition, ContainerState, Definition, DefinitionRef, Param, ParamValue, Pod,
        ResourceBinding, RunSpec,
    };
    use chrono::{DateTime, TimeZone, Utc};
    use std::io::Write;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn options(overrides: Overrides, last: bool, show_log: bool) -> StartOptions {
        StartOptions {
            definition: "task".into(),
            namespace: "ns".into(),
            overrides,
            last,
            show_log,
            timeout: Duration::from_secs(3600),
            prefix: false,
            poll_interval: Duration::from_millis(10),
        }
    }

    fn starter(platform: Arc<InMemoryPlatform>) -> RunStarter {
        RunStarter::new(platform, Arc::new(FixedClock(now())), CancellationToken::new())
    }

    fn previous() -> RunRecord {
        RunRecord::new("task-run-old", "ns", now())
            .for_definition("task")
            .with_spec(RunSpec {
                input_resources: vec![ResourceBinding {
                    name: "source".into(),
                    resource_ref: "git".into(),
                }],
                output_resources: vec![],
                params: vec![Param {
                    name: "mode".into(),
                    value: ParamValue::String("fast".into()),
                }],
                service_account: Some("builder".into()),
            })
    }

    #[tokio::test]
    async fn prints_follow_hint_without_showlog() {
        let platform = Arc::new(
            InMemoryPlatform::new()
                .with_definition(Definition::new("task", "ns"))
                .with_clock(now()),
        );
        let (mut output, out, _) = Output::captured();
        let overrides = Overrides {
            params: vec!["words=cat,dog".into()],
            labels: vec!["team=ci".into()],
            ..Overrides::default()
        };

        let created = starter(Arc::clone(&platform))
            .start(&options(overrides, false, false), &mut output)
            .await
            .unwrap();

        assert_eq!(created.name, "task-run-00001");
        assert_eq!(
            out.contents(),
            "Taskrun started: task-run-00001\n\nIn order to track the taskrun progress run:\nsteplog taskrun logs task-run-00001 -f -n ns\n"
        );
        let requests = platform.created_runs();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].definition, DefinitionRef::Named("task".into()));
        assert_eq!(
            requests[0].spec.params[0].value,
            ParamValue::Array(vec!["cat".into(), "dog".into()])
        );
        assert_eq!(created.labels.get("team").map(String::as_str), Some("ci"));
    }

    #[tokio::test]
    async fn last_seeds_from_previous_run() {
        let platform = Arc::new(
            InMemoryPlatform::new()
                .with_definition(Definition::new("task", "ns"))
                .with_run(previous()),
        );
        let (mut output, _, _) = Output::captured();
        let overrides = Overrides {
            params: vec!["mode=slow".into()],
            ..Overrides::default()
        };

        starter(Arc::clone(&platform))
            .start(&options(overrides, true, false), &mut output)
            .await
            .unwrap();

        let spec = &platform.created_runs()[0].spec;
        assert_eq!(spec.input_resources[0].resource_ref, "git");
        assert_eq!(spec.params[0].value, ParamValue::String("slow".into()));
        assert_eq!(spec.service_account.as_deref(), Some("builder"));
    }

    #[tokio::test]
    async fn failures_before_submission() {
        let platform = Arc::new(InMemoryPlatform::new().with_definition(Definition::new("task", "ns")));
        let (mut output, _, _) = Output::captured();

        let missing = StartOptions {
            definition: "nope".into(),
            ..options(Overrides::default(), false, false)
        };
        let err = starter(Arc::clone(&platform))
            .start(&missing, &mut output)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "task name nope does not exist in namespace ns");

        let bad = Overrides {
            input_resources: vec!["badtoken".into()],
            ..Overrides::default()
        };
        let err = starter(Arc::clone(&platform))
            .start(&options(bad, false, false), &mut output)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid input format for resource parameter: badtoken"
        );

        let err = starter(Arc::clone(&platform))
            .start(&options(Overrides::default(), true, false), &mut output)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "no taskruns related to task task found in namespace ns"
        );
        assert!(platform.created_runs().is_empty());
    }

    #[tokio::test]
    async fn create_error_is_surfaced_verbatim() {
        let platform = Arc::new(
            InMemoryPlatform::new()
                .with_definition(Definition::new("task", "ns"))
                .with_create_error("admission webhook denied the request"),
        );
        let (mut output, out, _) = Output::captured();

        let err = starter(platform)
            .start(&options(Overrides::default(), false, false), &mut output)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "admission webhook denied the request");
        assert!(out.contents().is_empty());
    }

    #[tokio::test]
    async fn showlog_follows_the_new_run() {
        let platform = Arc::new(
            InMemoryPlatform::new()
                .with_definition(Definition::new("task", "ns"))
                .with_pod(
                    Pod::new("task-run-00001-pod", "ns")
                        .with_container("step-build", ContainerState::Terminated),
                )
                .with_step_log(
                    "task-run-00001-pod",
                    "step-build",
                    StepLogFixture::lines(["built"]),
                ),
        );

        let driver = {
            let platform = Arc::clone(&platform);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                platform.set_run_pod("task-run-00001", "task-run-00001-pod");
                platform.set_run_condition("task-run-00001", Condition::Succeeded);
            })
        };

        let (mut output, out, err) = Output::captured();
        starter(Arc::clone(&platform))
            .start(&options(Overrides::default(), false, true), &mut output)
            .await
            .unwrap();
        driver.await.unwrap();

        assert_eq!(
            out.contents(),
            "Taskrun started: task-run-00001\nWaiting for logs to be available...\nbuilt\n"
        );
        assert!(err.contents().is_empty());
    }

    #[tokio::test]
    async fn definition_file_is_sent_inline() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "metadata:\n  name: build\nspec:\n  steps:\n    - name: compile\n      image: rust"
        )
        .unwrap();
        // no definition is stored on the platform
        let platform = Arc::new(InMemoryPlatform::new());
        let (mut output, out, _) = Output::captured();

        let file_options = StartOptions {
            definition: DefinitionSource::File(file.path().to_path_buf()),
            ..options(Overrides::default(), false, false)
        };
        let created = starter(Arc::clone(&platform))
            .start(&file_options, &mut output)
            .await
            .unwrap();

        assert_eq!(created.name, "build-run-00001");
        assert!(out.contents().starts_with("Taskrun started: build-run-00001\n"));
        let requests = platform.created_runs();
        let DefinitionRef::Inline(inline) = &requests[0].definition else {
            panic!("expected an inline definition");
        };
        assert_eq!(inline.steps, ["compile"]);
        assert_eq!(inline.spec["steps"][0]["image"], "rust");
    }

    #[tokio::test]
    async fn unreadable_definition_files() {
        let platform = Arc::new(InMemoryPlatform::new());
        let (mut output, _, _) = Output::captured();
        let dir = tempfile::tempdir().unwrap();

        let absent = dir.path().join("absent.yaml");
        let err = starter(Arc::clone(&platform))
            .start(
                &StartOptions {
                    definition: DefinitionSource::File(absent.clone()),
                    ..options(Overrides::default(), false, false)
                },
                &mut output,
            )
            .await
            .unwrap_err();
        assert!(
            err.to_string()
                .starts_with(&format!("unable to read task file {}: ", absent.display()))
        );

        let unnamed = dir.path().join("unnamed.yaml");
        std::fs::write(&unnamed, "spec:\n  steps: []\n").unwrap();
        let err = starter(Arc::clone(&platform))
            .start(
                &StartOptions {
                    definition: DefinitionSource::File(unnamed.clone()),
                    ..options(Overrides::default(), false, false)
                },
                &mut output,
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!(
                "unable to read task file {}: metadata.name is missing",
                unnamed.display()
            )
        );
        assert!(platform.created_runs().is_empty());
    }
}
