//! [`Platform`] backed by the `kubectl` binary.
//!
//! Every call spawns one `kubectl` process and decodes its JSON output through
//! [`crate::platform::convert`]. Errors printed by `kubectl` are surfaced as-is,
//! minus the `Error from server (Reason): ` decoration.

// Local crates
use crate::platform::{
    client::{Platform, PlatformError, StepLog},
    convert::{List, WireDefinition, WirePod, WireRun},
    models::{Definition, LabelSelector, Pod, RunRecord, RunRequest},
};

// External crates
use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStderr, Command};
use tokio_util::io::ReaderStream;
use tracing::instrument;

const DEFINITIONS: &str = "tasks.tekton.dev";
const RUNS: &str = "taskruns.tekton.dev";
const PODS: &str = "pods";

/// Runs `kubectl` once per call, with `-o json` for reads and writes.
#[derive(Debug, Clone)]
pub struct KubectlPlatform {
    binary: String,
    context: Option<String>,
}

/// What `kubectl` printed on failure, split into the server reason and the message.
fn classify(stderr: &str) -> PlatformError {
    let stderr = stderr.trim();
    match split_server_error(stderr) {
        (Some("NotFound"), message) => PlatformError::NotFound(message.to_string()),
        (_, "") => PlatformError::Api("kubectl failed without an error message".to_string()),
        (_, message) => PlatformError::Api(message.to_string()),
    }
}

/// `Error from server (NotFound): pods "x" not found` -> `(Some("NotFound"), "pods \"x\" not found")`
fn split_server_error(stderr: &str) -> (Option<&str>, &str) {
    let Some(rest) = stderr.strip_prefix("Error from server (") else {
        return (None, stderr);
    };
    match rest.split_once("): ") {
        Some((reason, message)) => (Some(reason), message.trim()),
        None => (None, stderr),
    }
}

async fn read_stderr(stderr: Option<ChildStderr>) -> String {
    let mut message = String::new();
    if let Some(mut stderr) = stderr {
        if let Err(e) = stderr.read_to_string(&mut message).await {
            tracing::debug!(error = %e, "Failed to read kubectl stderr");
        }
    }
    message
}

impl KubectlPlatform {
    /// Use `binary`, and `--context` when `context` is set.
    pub fn new(binary: &str, context: Option<&str>) -> Self {
        Self {
            binary: binary.to_string(),
            context: context.map(str::to_string),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.binary);
        if let Some(context) = &self.context {
            command.arg("--context").arg(context);
        }
        command
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Run `kubectl args...` to completion, feeding `input` on stdin when given.
    #[instrument(
        name = "steplog_kubectl::exec",
        target = "platform::kubectl",
        level = "trace",
        skip(self, input)
    )]
    async fn exec(&self, args: &[&str], input: Option<Vec<u8>>) -> Result<Vec<u8>, PlatformError> {
        let mut command = self.command(args);
        command.stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = command.spawn()?;
        if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin.write_all(&input).await?;
            // closing stdin lets `kubectl create -f -` proceed
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let err = classify(&String::from_utf8_lossy(&output.stderr));
            tracing::debug!(status = %output.status, error = %err, "kubectl failed");
            return Err(err);
        }
        Ok(output.stdout)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        kind: &'static str,
        args: &[&str],
    ) -> Result<T, PlatformError> {
        let stdout = self.exec(args, None).await?;
        serde_json::from_slice(&stdout).map_err(|e| PlatformError::Decode {
            kind,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl Platform for KubectlPlatform {
    async fn list_definitions(&self, namespace: &str) -> Result<Vec<String>, PlatformError> {
        let list: List<WireDefinition> = self
            .get_json("task list", &["get", DEFINITIONS, "-n", namespace, "-o", "json"])
            .await?;
        Ok(list.items.into_iter().map(|d| d.metadata.name).collect())
    }

    async fn get_definition(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Definition, PlatformError> {
        let wire: WireDefinition = self
            .get_json("task", &["get", DEFINITIONS, name, "-n", namespace, "-o", "json"])
            .await?;
        Ok(wire.into())
    }

    async fn list_runs(
        &self,
        namespace: &str,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<RunRecord>, PlatformError> {
        let selector = selector.map(ToString::to_string);
        let mut args = vec!["get", RUNS, "-n", namespace, "-o", "json"];
        if let Some(selector) = selector.as_deref() {
            args.extend(["-l", selector]);
        }

        let list: List<WireRun> = self.get_json("taskrun list", &args).await?;
        Ok(list.items.into_iter().map(RunRecord::from).collect())
    }

    async fn get_run(&self, name: &str, namespace: &str) -> Result<RunRecord, PlatformError> {
        let wire: WireRun = self
            .get_json("taskrun", &["get", RUNS, name, "-n", namespace, "-o", "json"])
            .await?;
        Ok(wire.into())
    }

    async fn create_run(&self, request: &RunRequest) -> Result<RunRecord, PlatformError> {
        let body = serde_json::to_vec(&WireRun::from(request)).map_err(|e| {
            PlatformError::Decode {
                kind: "taskrun",
                message: e.to_string(),
            }
        })?;

        let stdout = self
            .exec(
                &["create", "-n", &request.namespace, "-f", "-", "-o", "json"],
                Some(body),
            )
            .await?;
        let wire: WireRun = serde_json::from_slice(&stdout).map_err(|e| PlatformError::Decode {
            kind: "taskrun",
            message: e.to_string(),
        })?;
        Ok(wire.into())
    }

    async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, PlatformError> {
        let wire: WirePod = self
            .get_json("pod", &["get", PODS, name, "-n", namespace, "-o", "json"])
            .await?;
        Ok(wire.into())
    }

    /// Spawns `kubectl logs`. Resolves once the first chunk arrives or the process ends,
    /// so a container that cannot be read fails here rather than mid-stream. Dropping
    /// the returned stream kills the process.
    #[instrument(
        name = "steplog_kubectl::logs",
        target = "platform::kubectl",
        level = "debug",
        skip(self)
    )]
    async fn open_step_log(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        follow: bool,
    ) -> Result<StepLog, PlatformError> {
        let mut args = vec!["logs", pod, "-c", container, "-n", namespace];
        if follow {
            args.push("-f");
        }

        let mut child = self.command(&args).stdin(Stdio::null()).spawn()?;
        let stderr = child.stderr.take();
        let Some(stdout) = child.stdout.take() else {
            return Err(PlatformError::Api("kubectl stdout was not captured".to_string()));
        };
        let mut chunks = ReaderStream::new(stdout);

        let first = match chunks.next().await {
            Some(chunk) => chunk?,
            None => {
                let status = child.wait().await?;
                if status.success() {
                    return Ok(futures::stream::empty().boxed());
                }
                let stderr_text = read_stderr(stderr).await;
                let (_, message) = split_server_error(stderr_text.trim());
                return Err(PlatformError::OpenLog {
                    pod: pod.to_string(),
                    container: container.to_string(),
                    message: message.to_string(),
                });
            }
        };

        let stream = async_stream::try_stream! {
            yield first;
            while let Some(chunk) = chunks.next().await {
                yield chunk?;
            }
            let status = child.wait().await?;
            if !status.success() {
                let message = read_stderr(stderr).await;
                Err::<(), _>(std::io::Error::other(message.trim().to_string()))?;
            }
        };
        Ok(stream.boxed())
    }
}
