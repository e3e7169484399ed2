//! Seeded in-memory platform.
//!
//! Mirrors the platform's observable behavior closely enough for the resolver and
//! streaming pipeline to be exercised end to end: not-found messages use the
//! platform's wording, containers that have not started refuse to open, and state
//! can be changed while a stream is in flight.

// Local crates
use crate::platform::{
    client::{Platform, PlatformError, StepLog},
    models::{
        Condition, ContainerState, Definition, DefinitionRef, LabelSelector, Pod, RunRecord,
        RunRequest,
    },
};

// External crates
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Log content served for one container.
#[derive(Debug, Clone)]
pub enum StepLogFixture {
    /// Lines served immediately, then end-of-stream.
    Lines(Vec<String>),
    /// Each line served `delay` after the previous one.
    Delayed {
        /// Lines to serve.
        lines: Vec<String>,
        /// Pause before each line.
        delay: Duration,
    },
    /// Lines served, then a read error.
    Broken {
        /// Lines served before the failure.
        lines: Vec<String>,
        /// Message of the read error.
        error: String,
    },
    /// Opening the source fails.
    Unavailable(String),
}

impl StepLogFixture {
    /// [`StepLogFixture::Lines`] from anything string-like.
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Lines(lines.into_iter().map(Into::into).collect())
    }
}

/// A step source that was opened, in the order it was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedStep {
    /// Pod name.
    pub pod: String,
    /// Container name.
    pub container: String,
    /// Whether the source was opened in follow mode.
    pub follow: bool,
}

#[derive(Debug, Default)]
struct State {
    definitions: Vec<Definition>,
    runs: Vec<RunRecord>,
    pods: Vec<Pod>,
    logs: HashMap<(String, String), StepLogFixture>,
    opened: Vec<OpenedStep>,
    created: Vec<RunRequest>,
    create_error: Option<String>,
    now: Option<DateTime<Utc>>,
}

/// In-memory [`Platform`] with builder-style seeding.
#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    state: Mutex<State>,
}

impl InMemoryPlatform {
    /// An empty platform.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed a definition.
    pub fn with_definition(self, definition: Definition) -> Self {
        self.state().definitions.push(definition);
        self
    }

    /// Seed a run.
    pub fn with_run(self, run: RunRecord) -> Self {
        self.state().runs.push(run);
        self
    }

    /// Seed a pod.
    pub fn with_pod(self, pod: Pod) -> Self {
        self.state().pods.push(pod);
        self
    }

    /// Serve `fixture` as the log of `container` in `pod`.
    pub fn with_step_log(self, pod: &str, container: &str, fixture: StepLogFixture) -> Self {
        self.state()
            .logs
            .insert((pod.to_string(), container.to_string()), fixture);
        self
    }

    /// Make the next `create_run` fail with `message`.
    pub fn with_create_error(self, message: &str) -> Self {
        self.state().create_error = Some(message.to_string());
        self
    }

    /// Creation timestamp stamped onto created runs.
    pub fn with_clock(self, now: DateTime<Utc>) -> Self {
        self.state().now = Some(now);
        self
    }

    /// Update the condition of a seeded run.
    pub fn set_run_condition(&self, run: &str, condition: Condition) {
        if let Some(record) = self.state().runs.iter_mut().find(|r| r.name == run) {
            record.condition = condition;
        }
    }

    /// Assign a pod to a seeded run.
    pub fn set_run_pod(&self, run: &str, pod: &str) {
        if let Some(record) = self.state().runs.iter_mut().find(|r| r.name == run) {
            record.pod_name = Some(pod.to_string());
        }
    }

    /// Add a pod after construction, as the platform does once a run is scheduled.
    pub fn add_pod(&self, pod: Pod) {
        self.state().pods.push(pod);
    }

    /// Move one container of a seeded pod to `state`.
    pub fn set_container_state(&self, pod: &str, container: &str, state: ContainerState) {
        let mut guard = self.state();
        let Some(found) = guard.pods.iter_mut().find(|p| p.name == pod) else {
            return;
        };
        if let Some(c) = found.containers.iter_mut().find(|c| c.name == container) {
            c.state = state;
        }
    }

    /// Step sources opened so far.
    pub fn opened_steps(&self) -> Vec<OpenedStep> {
        self.state().opened.clone()
    }

    /// Requests submitted through `create_run`.
    pub fn created_runs(&self) -> Vec<RunRequest> {
        self.state().created.clone()
    }
}

fn not_found(kind: &str, name: &str) -> PlatformError {
    PlatformError::NotFound(format!("{kind} \"{name}\" not found"))
}

fn serve(fixture: StepLogFixture) -> StepLog {
    let encode = |lines: Vec<String>| -> Vec<std::io::Result<Bytes>> {
        lines
            .into_iter()
            .map(|line| Ok(Bytes::from(format!("{line}\n"))))
            .collect()
    };

    match fixture {
        StepLogFixture::Lines(lines) => futures::stream::iter(encode(lines)).boxed(),
        StepLogFixture::Delayed { lines, delay } => async_stream::stream! {
            for chunk in encode(lines) {
                tokio::time::sleep(delay).await;
                yield chunk;
            }
        }
        .boxed(),
        StepLogFixture::Broken { lines, error } => {
            let mut chunks = encode(lines);
            chunks.push(Err(std::io::Error::other(error)));
            futures::stream::iter(chunks).boxed()
        }
        StepLogFixture::Unavailable(_) => futures::stream::empty().boxed(),
    }
}

#[async_trait]
impl Platform for InMemoryPlatform {
    async fn list_definitions(&self, namespace: &str) -> Result<Vec<String>, PlatformError> {
        Ok(self
            .state()
            .definitions
            .iter()
            .filter(|d| d.namespace == namespace)
            .map(|d| d.name.clone())
            .collect())
    }

    async fn get_definition(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Definition, PlatformError> {
        self.state()
            .definitions
            .iter()
            .find(|d| d.name == name && d.namespace == namespace)
            .cloned()
            .ok_or_else(|| not_found("tasks.tekton.dev", name))
    }

    async fn list_runs(
        &self,
        namespace: &str,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<RunRecord>, PlatformError> {
        Ok(self
            .state()
            .runs
            .iter()
            .filter(|r| r.namespace == namespace)
            .filter(|r| selector.is_none_or(|s| s.matches(&r.labels)))
            .cloned()
            .collect())
    }

    async fn get_run(&self, name: &str, namespace: &str) -> Result<RunRecord, PlatformError> {
        self.state()
            .runs
            .iter()
            .find(|r| r.name == name && r.namespace == namespace)
            .cloned()
            .ok_or_else(|| not_found("taskruns.tekton.dev", name))
    }

    async fn create_run(&self, request: &RunRequest) -> Result<RunRecord, PlatformError> {
        let mut state = self.state();
        if let Some(message) = state.create_error.take() {
            return Err(PlatformError::Api(message));
        }

        let name = format!("{}{:05}", request.generate_name, state.created.len() + 1);
        let mut record = RunRecord::new(
            name,
            request.namespace.clone(),
            state.now.unwrap_or_else(Utc::now),
        )
        .with_spec(request.spec.clone());
        if let DefinitionRef::Named(definition) = &request.definition {
            record = record.for_definition(definition);
        }
        for label in &request.labels {
            record.labels.insert(label.key.clone(), label.value.clone());
        }

        state.created.push(request.clone());
        state.runs.push(record.clone());
        Ok(record)
    }

    async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, PlatformError> {
        self.state()
            .pods
            .iter()
            .find(|p| p.name == name && p.namespace == namespace)
            .cloned()
            .ok_or_else(|| not_found("pods", name))
    }

    async fn open_step_log(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        follow: bool,
    ) -> Result<StepLog, PlatformError> {
        let mut state = self.state();
        let found = state
            .pods
            .iter()
            .find(|p| p.name == pod && p.namespace == namespace)
            .ok_or_else(|| not_found("pods", pod))?;

        if found
            .container(container)
            .is_some_and(|c| c.state == ContainerState::Waiting)
        {
            return Err(PlatformError::OpenLog {
                pod: pod.to_string(),
                container: container.to_string(),
                message: "is waiting to start".to_string(),
            });
        }

        let fixture = state
            .logs
            .get(&(pod.to_string(), container.to_string()))
            .cloned()
            .unwrap_or(StepLogFixture::Lines(Vec::new()));

        state.opened.push(OpenedStep {
            pod: pod.to_string(),
            container: container.to_string(),
            follow,
        });

        if let StepLogFixture::Unavailable(message) = fixture {
            return Err(PlatformError::OpenLog {
                pod: pod.to_string(),
                container: container.to_string(),
                message,
            });
        }

        Ok(serve(fixture))
    }
}
