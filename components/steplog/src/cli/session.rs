//! Command implementations, independent of argument parsing and of the real terminal.
//!
//! A [`Session`] carries the collaborators (platform, prompt, clock) and the loaded
//! configuration. The binary builds one over `kubectl` and the terminal; tests build
//! one over the in-memory platform and a scripted prompt.

// Local crates
use crate::helpers::{clock::Clock, load_config::Config};
use crate::merger::run_request::Overrides;
use crate::platform::client::Platform;
use crate::prompt::prompt::Prompt;
use crate::resolver::run_resolver::{ResolveOptions, ResolvedRun, RunResolver};
use crate::starter::run_starter::{DefinitionSource, RunStarter, StartOptions};
use crate::streamer::{coordinator::LogStreamCoordinator, models::StreamOptions};
use crate::writer::{
    log_writer::{DrainSummary, LogWriter},
    sink::Output,
};

// External crates
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Everything `task logs` / `taskrun logs` needs, with configuration defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogsRequest {
    /// Positional arguments as typed.
    pub names: Vec<String>,
    /// Namespace searched for runs.
    pub namespace: String,
    /// Most runs offered in the prompt.
    pub limit: i64,
    /// Skip the prompt and pick the newest run.
    pub last: bool,
    /// Keep streaming until the run finishes.
    pub follow: bool,
    /// Include init containers.
    pub all_steps: bool,
    /// Prefix lines with the step name when several steps are shown.
    pub prefix: bool,
}

impl LogsRequest {
    /// A request for `names` with every flag taken from `config`.
    pub fn new(config: &Config, names: Vec<String>) -> Self {
        Self {
            names,
            namespace: config.general.namespace.clone(),
            limit: config.logs.limit,
            last: false,
            follow: config.logs.follow,
            all_steps: config.logs.all_steps,
            prefix: config.logs.prefix,
        }
    }
}

/// Everything `task start` needs, with configuration defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    /// Stored definition name or definition file.
    pub definition: DefinitionSource,
    /// Namespace the run is created in.
    pub namespace: String,
    /// Raw `key=value` overrides from the command line.
    pub overrides: Overrides,
    /// Seed the run from the newest run of the definition.
    pub last: bool,
    /// Follow the new run instead of printing the hint.
    pub show_log: bool,
    /// Execution limit submitted with the run.
    pub timeout: Duration,
    /// Step-name prefixing for followed logs.
    pub prefix: bool,
}

impl StartRequest {
    /// A request for `definition` with every flag taken from `config`.
    pub fn new(config: &Config, definition: impl Into<DefinitionSource>) -> Self {
        Self {
            definition: definition.into(),
            namespace: config.general.namespace.clone(),
            overrides: Overrides::default(),
            last: false,
            show_log: config.start.show_log,
            timeout: Duration::from_secs(config.start.timeout_seconds),
            prefix: config.logs.prefix,
        }
    }
}

/// Collaborators and configuration shared by every command.
pub struct Session {
    platform: Arc<dyn Platform>,
    prompt: Arc<dyn Prompt>,
    clock: Arc<dyn Clock>,
    config: Config,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// A session over the given collaborators. `cancel` aborts prompts and streams.
    pub fn new(
        platform: Arc<dyn Platform>,
        prompt: Arc<dyn Prompt>,
        clock: Arc<dyn Clock>,
        config: Config,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            platform,
            prompt,
            clock,
            config,
            cancel,
        }
    }

    /// Configuration the session was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn resolver(&self, request: &LogsRequest) -> RunResolver {
        RunResolver::new(
            Arc::clone(&self.platform),
            Arc::clone(&self.prompt),
            Arc::clone(&self.clock),
            ResolveOptions {
                namespace: request.namespace.clone(),
                limit: request.limit,
                last: request.last,
            },
        )
    }

    /// `task logs [TASK] [TASKRUN]`
    #[instrument(
        name = "steplog_session::task_logs",
        target = "cli::session",
        level = "debug",
        skip_all,
        fields(args = request.names.len())
    )]
    pub async fn task_logs(&self, request: &LogsRequest, output: &mut Output) -> Result<()> {
        let resolved = self.resolver(request).resolve(&request.names, output).await?;
        match resolved {
            Some(resolved) => self.stream(&resolved, request, output).await.map(|_| ()),
            None => Ok(()),
        }
    }

    /// `taskrun logs [TASKRUN]`
    #[instrument(
        name = "steplog_session::taskrun_logs",
        target = "cli::session",
        level = "debug",
        skip_all,
        fields(args = request.names.len())
    )]
    pub async fn taskrun_logs(&self, request: &LogsRequest, output: &mut Output) -> Result<()> {
        let resolved = self.resolver(request).resolve_run(&request.names).await?;
        match resolved {
            Some(resolved) => self.stream(&resolved, request, output).await.map(|_| ()),
            None => Ok(()),
        }
    }

    /// `task start TASK`
    #[instrument(
        name = "steplog_session::start_task",
        target = "cli::session",
        level = "debug",
        skip_all,
        fields(definition = %request.definition)
    )]
    pub async fn start_task(&self, request: &StartRequest, output: &mut Output) -> Result<()> {
        let starter = RunStarter::new(
            Arc::clone(&self.platform),
            Arc::clone(&self.clock),
            self.cancel.clone(),
        );
        let options = StartOptions {
            definition: request.definition.clone(),
            namespace: request.namespace.clone(),
            overrides: request.overrides.clone(),
            last: request.last,
            show_log: request.show_log,
            timeout: request.timeout,
            prefix: request.prefix,
            poll_interval: self.config.logs.poll_interval(),
        };
        starter.start(&options, output).await?;
        Ok(())
    }

    async fn stream(
        &self,
        resolved: &ResolvedRun,
        request: &LogsRequest,
        output: &mut Output,
    ) -> Result<DrainSummary> {
        tracing::debug!(
            definition = ?resolved.definition,
            run = %resolved.run,
            "Streaming run"
        );
        let coordinator = LogStreamCoordinator::new(
            Arc::clone(&self.platform),
            &request.namespace,
            StreamOptions {
                follow: request.follow,
                all_steps: request.all_steps,
                poll_interval: self.config.logs.poll_interval(),
            },
            self.cancel.clone(),
        );
        let stream = coordinator.open(&resolved.run).await?;
        Ok(LogWriter::new(request.prefix).drain(stream, output).await)
    }
}
