//! Conversions between the platform's JSON documents and the internal data model.
//!
//! The wire structs mirror only the fields this crate reads or writes. Every field is
//! defaulted so partially populated objects (a run without status, a pod still being
//! scheduled) decode instead of failing. Reading is total once the document parses.

// Local crates
use crate::platform::models::{
    Condition, Container, ContainerState, Definition, DefinitionRef, InlineDefinition, Labels,
    Param, ParamSpec,
    ParamValue, Pod, PodPhase, ResourceBinding, ResourceDeclaration, RunRecord, RunRequest,
    RunSpec,
};

// External crates
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub(crate) const API_VERSION: &str = "tekton.dev/v1alpha1";
pub(crate) const RUN_KIND: &str = "TaskRun";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ObjectMeta {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(crate) name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(crate) generate_name: String,
    pub(crate) namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) creation_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Labels::is_empty")]
    pub(crate) labels: Labels,
}

/// `kubectl get ... -o json` on a collection.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct List<T> {
    #[serde(default)]
    pub(crate) items: Vec<T>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct NamedRef {
    pub(crate) name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WireBinding {
    pub(crate) name: String,
    pub(crate) resource_ref: NamedRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireParam {
    pub(crate) name: String,
    pub(crate) value: ParamValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WireBindings {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) resources: Vec<WireBinding>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) params: Vec<WireParam>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WireStep {
    pub(crate) name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WireRunSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) task_ref: Option<NamedRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) task_spec: Option<serde_json::Value>,
    pub(crate) inputs: WireBindings,
    pub(crate) outputs: WireBindings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) service_account_name: Option<String>,
    /// Older API versions call it `serviceAccount`.
    #[serde(skip_serializing)]
    pub(crate) service_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WireCondition {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    pub(crate) status: String,
    pub(crate) reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WireRunStatus {
    pub(crate) pod_name: Option<String>,
    pub(crate) start_time: Option<DateTime<Utc>>,
    pub(crate) conditions: Vec<WireCondition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WireRun {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(crate) api_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(crate) kind: String,
    pub(crate) metadata: ObjectMeta,
    pub(crate) spec: WireRunSpec,
    #[serde(skip_serializing)]
    pub(crate) status: WireRunStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WireDeclaration {
    pub(crate) name: String,
    #[serde(rename = "type")]
    pub(crate) resource_type: String,
    pub(crate) default: Option<ParamValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WireDeclarations {
    pub(crate) resources: Vec<WireDeclaration>,
    pub(crate) params: Vec<WireDeclaration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WireDefinitionSpec {
    pub(crate) steps: Vec<WireStep>,
    pub(crate) inputs: WireDeclarations,
    pub(crate) outputs: WireDeclarations,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WireDefinition {
    pub(crate) metadata: ObjectMeta,
    pub(crate) spec: WireDefinitionSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WireContainerState {
    pub(crate) running: Option<serde_json::Value>,
    pub(crate) terminated: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WireContainerStatus {
    pub(crate) name: String,
    pub(crate) state: WireContainerState,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WirePodSpec {
    pub(crate) init_containers: Vec<WireStep>,
    pub(crate) containers: Vec<WireStep>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WirePodStatus {
    pub(crate) phase: String,
    pub(crate) init_container_statuses: Vec<WireContainerStatus>,
    pub(crate) container_statuses: Vec<WireContainerStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WirePod {
    pub(crate) metadata: ObjectMeta,
    pub(crate) spec: WirePodSpec,
    pub(crate) status: WirePodStatus,
}

/// A definition document as users write it: metadata plus a free-form spec.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct DefinitionDocument {
    pub(crate) metadata: ObjectMeta,
    pub(crate) spec: serde_json::Value,
}

/// Decode a YAML or JSON definition document. JSON parses as YAML, so one decoder
/// covers both.
pub(crate) fn inline_definition(raw: &str) -> Result<InlineDefinition, serde_yaml::Error> {
    let document: DefinitionDocument = serde_yaml::from_str(raw)?;
    let steps = document
        .spec
        .get("steps")
        .and_then(serde_json::Value::as_array)
        .map(|steps| {
            steps
                .iter()
                .filter_map(|step| step.get("name").and_then(serde_json::Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(InlineDefinition {
        name: document.metadata.name,
        steps,
        spec: document.spec,
    })
}

fn bindings(wire: Vec<WireBinding>) -> Vec<ResourceBinding> {
    wire.into_iter()
        .map(|b| ResourceBinding {
            name: b.name,
            resource_ref: b.resource_ref.name,
        })
        .collect()
}

fn wire_bindings(bindings: &[ResourceBinding]) -> Vec<WireBinding> {
    bindings
        .iter()
        .map(|b| WireBinding {
            name: b.name.clone(),
            resource_ref: NamedRef {
                name: b.resource_ref.clone(),
            },
        })
        .collect()
}

/// The `Succeeded` condition: `True`/`False` are terminal, `Unknown` means running.
fn condition(conditions: &[WireCondition], started: bool) -> Condition {
    match conditions.iter().find(|c| c.kind == "Succeeded") {
        Some(c) if c.status == "True" => Condition::Succeeded,
        Some(c) if c.status == "False" => Condition::Failed,
        Some(_) => Condition::Running,
        None if started => Condition::Running,
        None => Condition::Pending,
    }
}

fn container_state(state: &WireContainerState) -> ContainerState {
    if state.terminated.is_some() {
        ContainerState::Terminated
    } else if state.running.is_some() {
        ContainerState::Running
    } else {
        ContainerState::Waiting
    }
}

fn phase(raw: &str) -> PodPhase {
    match raw {
        "Pending" => PodPhase::Pending,
        "Running" => PodPhase::Running,
        "Succeeded" => PodPhase::Succeeded,
        "Failed" => PodPhase::Failed,
        _ => PodPhase::Unknown,
    }
}

impl From<WireRun> for RunRecord {
    fn from(wire: WireRun) -> Self {
        let definition = wire
            .spec
            .task_ref
            .map(|r| r.name)
            .filter(|name| !name.is_empty());
        let started = wire.status.start_time.is_some();

        Self {
            name: wire.metadata.name,
            namespace: wire.metadata.namespace,
            creation_timestamp: wire.metadata.creation_timestamp.unwrap_or_default(),
            start_time: wire.status.start_time,
            pod_name: wire.status.pod_name.filter(|name| !name.is_empty()),
            condition: condition(&wire.status.conditions, started),
            labels: wire.metadata.labels,
            definition,
            spec: RunSpec {
                input_resources: bindings(wire.spec.inputs.resources),
                output_resources: bindings(wire.spec.outputs.resources),
                params: wire
                    .spec
                    .inputs
                    .params
                    .into_iter()
                    .map(|p| Param {
                        name: p.name,
                        value: p.value,
                    })
                    .collect(),
                service_account: wire
                    .spec
                    .service_account_name
                    .or(wire.spec.service_account)
                    .filter(|sa| !sa.is_empty()),
            },
        }
    }
}

impl From<&RunRequest> for WireRun {
    fn from(request: &RunRequest) -> Self {
        let (task_ref, task_spec) = match &request.definition {
            DefinitionRef::Named(name) => (Some(NamedRef { name: name.clone() }), None),
            DefinitionRef::Inline(inline) => (None, Some(inline.spec.clone())),
        };

        let mut labels = Labels::new();
        for label in &request.labels {
            labels.insert(label.key.clone(), label.value.clone());
        }

        Self {
            api_version: API_VERSION.to_string(),
            kind: RUN_KIND.to_string(),
            metadata: ObjectMeta {
                generate_name: request.generate_name.clone(),
                namespace: request.namespace.clone(),
                labels,
                ..ObjectMeta::default()
            },
            spec: WireRunSpec {
                task_ref,
                task_spec,
                inputs: WireBindings {
                    resources: wire_bindings(&request.spec.input_resources),
                    params: request
                        .spec
                        .params
                        .iter()
                        .map(|p| WireParam {
                            name: p.name.clone(),
                            value: p.value.clone(),
                        })
                        .collect(),
                },
                outputs: WireBindings {
                    resources: wire_bindings(&request.spec.output_resources),
                    params: Vec::new(),
                },
                service_account_name: request.spec.service_account.clone(),
                service_account: None,
                timeout: Some(format!("{}s", request.timeout.as_secs())),
            },
            status: WireRunStatus::default(),
        }
    }
}

fn declarations(wire: Vec<WireDeclaration>) -> Vec<ResourceDeclaration> {
    wire.into_iter()
        .map(|d| ResourceDeclaration {
            name: d.name,
            resource_type: d.resource_type,
        })
        .collect()
}

impl From<WireDefinition> for Definition {
    fn from(wire: WireDefinition) -> Self {
        Self {
            name: wire.metadata.name,
            namespace: wire.metadata.namespace,
            steps: wire.spec.steps.into_iter().map(|s| s.name).collect(),
            inputs: declarations(wire.spec.inputs.resources),
            outputs: declarations(wire.spec.outputs.resources),
            params: wire
                .spec
                .inputs
                .params
                .into_iter()
                .map(|p| ParamSpec {
                    name: p.name,
                    default: p.default,
                })
                .collect(),
            creation_timestamp: wire.metadata.creation_timestamp,
        }
    }
}

impl From<WirePod> for Pod {
    fn from(wire: WirePod) -> Self {
        let state_of = |statuses: &[WireContainerStatus], name: &str| {
            statuses
                .iter()
                .find(|s| s.name == name)
                .map(|s| container_state(&s.state))
                .unwrap_or_default()
        };

        let init = wire.spec.init_containers.iter().map(|c| Container {
            name: c.name.clone(),
            init: true,
            state: state_of(&wire.status.init_container_statuses, &c.name),
        });
        let regular = wire.spec.containers.iter().map(|c| Container {
            name: c.name.clone(),
            init: false,
            state: state_of(&wire.status.container_statuses, &c.name),
        });
        let containers = init.chain(regular).collect();

        Self {
            name: wire.metadata.name,
            namespace: wire.metadata.namespace,
            phase: phase(&wire.status.phase),
            containers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::models::Label;
    use std::time::Duration;

    #[test]
    fn decodes_run_with_status() {
        let raw = r#"{
            "metadata": {
                "name": "taskrun1",
                "namespace": "ns",
                "creationTimestamp": "2026-03-01T08:00:00Z",
                "labels": {"tekton.dev/task": "task"}
            },
            "spec": {
                "taskRef": {"name": "task"},
                "inputs": {
                    "resources": [{"name": "source", "resourceRef": {"name": "git"}}],
                    "params": [{"name": "words", "value": ["a", "b"]}]
                },
                "serviceAccount": "builder"
            },
            "status": {
                "podName": "taskrun1-pod-abcde",
                "startTime": "2026-03-01T08:55:00Z",
                "conditions": [{"type": "Succeeded", "status": "Unknown", "reason": "Running"}]
            }
        }"#;
        let run: RunRecord = serde_json::from_str::<WireRun>(raw).unwrap().into();

        assert_eq!(run.name, "taskrun1");
        assert_eq!(run.definition.as_deref(), Some("task"));
        assert_eq!(run.pod_name.as_deref(), Some("taskrun1-pod-abcde"));
        assert_eq!(run.condition, Condition::Running);
        assert_eq!(run.spec.input_resources[0].resource_ref, "git");
        assert_eq!(
            run.spec.params[0].value,
            ParamValue::Array(vec!["a".into(), "b".into()])
        );
        assert_eq!(run.spec.service_account.as_deref(), Some("builder"));
    }

    #[test]
    fn run_without_status_is_pending() {
        let run: RunRecord =
            serde_json::from_str::<WireRun>(r#"{"metadata": {"name": "r", "namespace": "ns"}}"#)
                .unwrap()
                .into();
        assert_eq!(run.condition, Condition::Pending);
        assert_eq!(run.pod_name, None);
    }

    #[test]
    fn encodes_request() {
        let request = RunRequest {
            generate_name: "task-run-".into(),
            namespace: "ns".into(),
            definition: DefinitionRef::Named("task".into()),
            spec: RunSpec {
                params: vec![Param {
                    name: "mode".into(),
                    value: ParamValue::String("fast".into()),
                }],
                service_account: Some("builder".into()),
                ..RunSpec::default()
            },
            labels: vec![Label {
                key: "team".into(),
                value: "ci".into(),
            }],
            timeout: Duration::from_secs(3600),
        };

        let json = serde_json::to_value(WireRun::from(&request)).unwrap();
        assert_eq!(json["apiVersion"], "tekton.dev/v1alpha1");
        assert_eq!(json["kind"], "TaskRun");
        assert_eq!(json["metadata"]["generateName"], "task-run-");
        assert_eq!(json["metadata"]["labels"]["team"], "ci");
        assert_eq!(json["spec"]["taskRef"]["name"], "task");
        assert_eq!(json["spec"]["inputs"]["params"][0]["value"], "fast");
        assert_eq!(json["spec"]["serviceAccountName"], "builder");
        assert_eq!(json["spec"]["timeout"], "3600s");
        assert!(json.get("status").is_none());
    }

    #[test]
    fn decodes_pod_with_init_containers_first() {
        let raw = r#"{
            "metadata": {"name": "pod", "namespace": "ns"},
            "spec": {
                "initContainers": [{"name": "step-credential-initializer"}],
                "containers": [{"name": "step-build"}, {"name": "step-push"}]
            },
            "status": {
                "phase": "Running",
                "initContainerStatuses": [
                    {"name": "step-credential-initializer", "state": {"terminated": {"exitCode": 0}}}
                ],
                "containerStatuses": [
                    {"name": "step-build", "state": {"running": {}}},
                    {"name": "step-push", "state": {"waiting": {"reason": "PodInitializing"}}}
                ]
            }
        }"#;
        let pod: Pod = serde_json::from_str::<WirePod>(raw).unwrap().into();

        assert_eq!(pod.phase, PodPhase::Running);
        let summary: Vec<_> = pod
            .containers
            .iter()
            .map(|c| (c.name.as_str(), c.init, c.state))
            .collect();
        assert_eq!(
            summary,
            [
                ("step-credential-initializer", true, ContainerState::Terminated),
                ("step-build", false, ContainerState::Running),
                ("step-push", false, ContainerState::Waiting),
            ]
        );
    }

    #[test]
    fn decodes_definition() {
        let raw = r#"{
            "metadata": {"name": "task", "namespace": "ns"},
            "spec": {
                "steps": [{"name": "build"}],
                "inputs": {
                    "resources": [{"name": "source", "type": "git"}],
                    "params": [{"name": "mode", "default": "fast"}]
                }
            }
        }"#;
        let definition: Definition = serde_json::from_str::<WireDefinition>(raw).unwrap().into();
        assert_eq!(definition.steps, ["build"]);
        assert_eq!(definition.inputs[0].resource_type, "git");
        assert_eq!(
            definition.params[0].default,
            Some(ParamValue::String("fast".into()))
        );
    }

    #[test]
    fn inline_definition_from_yaml_document() {
        let raw = "\
apiVersion: tekton.dev/v1alpha1
kind: Task
metadata:
  name: build
spec:
  steps:
    - name: compile
      image: rust:1.89
      command: [cargo, build]
    - name: package
      image: alpine
";
        let inline = inline_definition(raw).unwrap();
        assert_eq!(inline.name, "build");
        assert_eq!(inline.steps, ["compile", "package"]);
        assert_eq!(inline.spec["steps"][0]["image"], "rust:1.89");

        let from_json = inline_definition(r#"{"metadata": {"name": "build"}, "spec": {}}"#).unwrap();
        assert_eq!(from_json.name, "build");
        assert!(from_json.steps.is_empty());

        assert!(inline_definition("metadata: [unclosed").is_err());
    }

    #[test]
    fn inline_request_carries_the_spec_instead_of_a_reference() {
        let inline = inline_definition(
            "metadata:\n  name: build\nspec:\n  steps:\n    - name: compile\n      image: rust\n",
        )
        .unwrap();
        let request = RunRequest {
            generate_name: "build-run-".into(),
            namespace: "ns".into(),
            definition: DefinitionRef::Inline(inline),
            spec: RunSpec::default(),
            labels: Vec::new(),
            timeout: Duration::from_secs(60),
        };

        let json = serde_json::to_value(WireRun::from(&request)).unwrap();
        assert!(json["spec"].get("taskRef").is_none());
        assert_eq!(json["spec"]["taskSpec"]["steps"][0]["name"], "compile");
        assert_eq!(json["spec"]["taskSpec"]["steps"][0]["image"], "rust");
        assert_eq!(json["metadata"]["generateName"], "build-run-");
    }
}
