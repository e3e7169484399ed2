//! Data model shared with the orchestration platform.
//!
//! Definitions, run records and pods are owned by the platform and only read here.
//! A [`RunRequest`] is the one thing this crate builds and submits.

// External crates
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Label linking a run to the definition it was created from.
pub const DEFINITION_LABEL: &str = "tekton.dev/task";

/// Label set attached to platform objects.
pub type Labels = BTreeMap<String, String>;

/// A named, namespaced template describing ordered steps and declared slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    /// Definition name, unique per namespace.
    pub name: String,
    /// Namespace the definition lives in.
    pub namespace: String,
    /// Step names in execution order.
    pub steps: Vec<String>,
    /// Declared input resource slots.
    pub inputs: Vec<ResourceDeclaration>,
    /// Declared output resource slots.
    pub outputs: Vec<ResourceDeclaration>,
    /// Declared parameters.
    pub params: Vec<ParamSpec>,
    /// Set by the platform on creation.
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl Definition {
    /// An empty definition.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }
}

/// A declared input or output resource slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDeclaration {
    /// Slot name.
    pub name: String,
    /// Resource kind the slot accepts, such as `git`.
    pub resource_type: String,
}

/// A declared parameter and its optional default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Used when a run supplies no value.
    pub default: Option<ParamValue>,
}

/// Parameter payload: a single string, or a list when the user passed `a,b,c`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// A plain value.
    String(String),
    /// A comma-separated list.
    Array(Vec<String>),
}

impl ParamValue {
    /// Interpret a raw override payload. A comma makes the value a list.
    pub fn parse(raw: &str) -> Self {
        if raw.contains(',') {
            Self::Array(raw.split(',').map(str::to_string).collect())
        } else {
            Self::String(raw.to_string())
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(value) => f.write_str(value),
            Self::Array(values) => f.write_str(&values.join(",")),
        }
    }
}

/// Binds a declared resource slot to a concrete platform resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBinding {
    /// Declared slot being bound.
    pub name: String,
    /// Name of the bound platform resource.
    pub resource_ref: String,
}

/// A resolved parameter for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// Declared parameter name.
    pub name: String,
    /// Value passed to the run.
    pub value: ParamValue,
}

/// A single label entry, kept in insertion order while a request is being built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Label key.
    pub key: String,
    /// Label value.
    pub value: String,
}

/// The part of a run that can be reused as a template for the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    /// Bindings for the declared inputs.
    pub input_resources: Vec<ResourceBinding>,
    /// Bindings for the declared outputs.
    pub output_resources: Vec<ResourceBinding>,
    /// Parameter values.
    pub params: Vec<Param>,
    /// Identity the run executes as.
    pub service_account: Option<String>,
}

/// Where the steps of a new run come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefinitionRef {
    /// Reference to a definition stored on the platform.
    Named(String),
    /// Steps carried inline in the request.
    Inline(InlineDefinition),
}

impl DefinitionRef {
    /// Name new runs are derived from.
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Inline(inline) => &inline.name,
        }
    }
}

impl From<&str> for DefinitionRef {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

/// A definition read from a document rather than from the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineDefinition {
    /// `metadata.name` of the document.
    pub name: String,
    /// Step names, in order.
    pub steps: Vec<String>,
    /// The document's `spec`, submitted untouched.
    pub spec: serde_json::Value,
}

/// Desired state of a new run. Built once, submitted once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Prefix the platform appends a random suffix to.
    pub generate_name: String,
    /// Namespace the run is created in.
    pub namespace: String,
    /// Steps the run executes.
    pub definition: DefinitionRef,
    /// Bindings, params and service account.
    pub spec: RunSpec,
    /// Labels in the order they were supplied.
    pub labels: Vec<Label>,
    /// How long the platform lets the run execute.
    pub timeout: Duration,
}

/// Completion condition of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    /// Not started.
    #[default]
    Pending,
    /// Started, not finished.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with a failure.
    Failed,
}

impl Condition {
    /// Succeeded or failed.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// The platform's view of a submitted run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Platform-assigned run name.
    pub name: String,
    /// Namespace the run lives in.
    pub namespace: String,
    /// Set by the platform on creation.
    pub creation_timestamp: DateTime<Utc>,
    /// Set once the platform starts the run.
    pub start_time: Option<DateTime<Utc>>,
    /// Pod executing the steps, once one is assigned.
    pub pod_name: Option<String>,
    /// Latest completion condition.
    pub condition: Condition,
    /// Labels on the run.
    pub labels: Labels,
    /// Name of the definition the run was created from.
    pub definition: Option<String>,
    /// Bindings, params and service account the run was created with.
    pub spec: RunSpec,
}

impl RunRecord {
    /// A pending run with no pod and an empty spec.
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        creation_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            creation_timestamp,
            start_time: None,
            pod_name: None,
            condition: Condition::Pending,
            labels: Labels::new(),
            definition: None,
            spec: RunSpec::default(),
        }
    }

    /// Attach the run to a definition, both by reference and by label.
    pub fn for_definition(mut self, definition: &str) -> Self {
        self.definition = Some(definition.to_string());
        self.labels
            .insert(DEFINITION_LABEL.to_string(), definition.to_string());
        self
    }

    /// Mark the run as started at `at`.
    pub fn started(mut self, at: DateTime<Utc>) -> Self {
        self.start_time = Some(at);
        self
    }

    /// Assign the pod executing the run.
    pub fn with_pod(mut self, pod: &str) -> Self {
        self.pod_name = Some(pod.to_string());
        self
    }

    /// Replace the completion condition.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    /// Replace the reusable part of the run.
    pub fn with_spec(mut self, spec: RunSpec) -> Self {
        self.spec = spec;
        self
    }

    /// Start time, or creation time for runs that have not started yet.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.start_time.unwrap_or(self.creation_timestamp)
    }
}

/// Equality filter on a single label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSelector {
    /// Label key to compare.
    pub key: String,
    /// Required label value.
    pub value: String,
}

impl LabelSelector {
    /// Selector matching every run created from `definition`.
    pub fn definition(definition: &str) -> Self {
        Self {
            key: DEFINITION_LABEL.to_string(),
            value: definition.to_string(),
        }
    }

    /// Whether `labels` carries the selected key with the selected value.
    pub fn matches(&self, labels: &Labels) -> bool {
        labels.get(&self.key).is_some_and(|v| v == &self.value)
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Lifecycle phase reported for a pod.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    /// Accepted, some containers not created yet.
    #[default]
    Pending,
    /// At least one container is running.
    Running,
    /// Every container exited successfully.
    Succeeded,
    /// Every container exited and at least one failed.
    Failed,
    /// The node could not be reached.
    Unknown,
}

impl PodPhase {
    /// No container of a finished pod will start anymore.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Container lifecycle as far as log streaming cares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    /// Created but not started, or not created yet.
    #[default]
    Waiting,
    /// Executing.
    Running,
    /// Exited, successfully or not.
    Terminated,
}

/// One container of a pod. `init` marks platform-injected setup containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Container name as reported by the pod.
    pub name: String,
    /// Injected by the platform before the steps.
    pub init: bool,
    /// Current lifecycle state.
    pub state: ContainerState,
}

/// The pod backing a run. Containers are kept in execution order, init containers first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    /// Pod name.
    pub name: String,
    /// Namespace the pod lives in.
    pub namespace: String,
    /// Reported lifecycle phase.
    pub phase: PodPhase,
    /// Init containers first, then step containers.
    pub containers: Vec<Container>,
}

impl Pod {
    /// A pending pod without containers.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            phase: PodPhase::Pending,
            containers: Vec::new(),
        }
    }

    /// Replace the reported phase.
    pub fn with_phase(mut self, phase: PodPhase) -> Self {
        self.phase = phase;
        self
    }

    /// Append an init container after the existing ones.
    pub fn with_init_container(mut self, name: &str, state: ContainerState) -> Self {
        let at = self.containers.iter().take_while(|c| c.init).count();
        self.containers.insert(
            at,
            Container {
                name: name.to_string(),
                init: true,
                state,
            },
        );
        self
    }

    /// Append a step container.
    pub fn with_container(mut self, name: &str, state: ContainerState) -> Self {
        self.containers.push(Container {
            name: name.to_string(),
            init: false,
            state,
        });
        self
    }

    /// Look a container up by name.
    pub fn container(&self, name: &str) -> Option<&Container> {
        self.containers.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_value_splits_on_comma() {
        assert_eq!(ParamValue::parse("a"), ParamValue::String("a".into()));
        assert_eq!(
            ParamValue::parse("cat,foo,bar"),
            ParamValue::Array(vec!["cat".into(), "foo".into(), "bar".into()])
        );
        assert_eq!(ParamValue::parse("cat,foo,bar").to_string(), "cat,foo,bar");
    }

    #[test]
    fn init_containers_stay_ahead_of_steps() {
        let pod = Pod::new("pod", "ns")
            .with_container("step-build", ContainerState::Waiting)
            .with_init_container("step-create-dir", ContainerState::Terminated)
            .with_init_container("step-git-source", ContainerState::Terminated);

        let names: Vec<_> = pod.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["step-create-dir", "step-git-source", "step-build"]);
    }

    #[test]
    fn selector_matches_definition_label() {
        let run = RunRecord::new("run", "ns", Utc::now()).for_definition("task");
        assert!(LabelSelector::definition("task").matches(&run.labels));
        assert!(!LabelSelector::definition("other").matches(&run.labels));
        assert_eq!(LabelSelector::definition("task").to_string(), "tekton.dev/task=task");
    }
}
