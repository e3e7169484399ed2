//! Narrows what the user typed down to exactly one run.
//!
//! | positional args | behavior                                                      |
//! |-----------------|---------------------------------------------------------------|
//! | none            | pick a definition interactively, then pick one of its runs   |
//! | definition      | check it exists, then pick one of its runs                    |
//! | definition, run | use both as given; the run is checked when it is streamed     |
//! | more            | [`ResolveError::TooManyArguments`]                            |
//!
//! Picking a run: with `last`, the newest run is used directly. Otherwise runs are
//! listed newest first; none prints a notice, one is taken without asking, several
//! are offered in a prompt.

// Local crates
use crate::helpers::clock::Clock;
use crate::lister::run_lister::{ListError, RunLister, check_limit};
use crate::platform::client::{Platform, PlatformError};
use crate::prompt::prompt::{Prompt, PromptError, SELECT_TASK, SELECT_TASKRUN};
use crate::writer::sink::Output;

// External crates
use std::sync::Arc;
use tracing::instrument;

/// Why arguments could not be narrowed to a run.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// More than two positional arguments.
    #[error("too many arguments")]
    TooManyArguments,
    /// The namespace has no runs at all.
    #[error("No taskruns found")]
    NoRuns,
    /// Listing or the limit check failed.
    #[error(transparent)]
    List(#[from] ListError),
    /// A named run could not be looked up.
    #[error(transparent)]
    Platform(#[from] PlatformError),
    /// The prompt failed for a reason other than cancellation.
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// The run to stream, and the definition it was found through (if any).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRun {
    /// Set when the run was reached through a definition.
    pub definition: Option<String>,
    /// Run name.
    pub run: String,
}

/// Resolution settings taken from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Namespace searched.
    pub namespace: String,
    /// Most runs listed in a prompt.
    pub limit: i64,
    /// Take the newest run instead of listing.
    pub last: bool,
}

/// Narrows positional arguments down to one run, prompting when ambiguous.
pub struct RunResolver {
    platform: Arc<dyn Platform>,
    prompt: Arc<dyn Prompt>,
    lister: RunLister,
    options: ResolveOptions,
}

impl std::fmt::Debug for RunResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunResolver")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// A cancelled prompt ends resolution quietly.
fn chosen(answer: Result<usize, PromptError>) -> Result<Option<usize>, ResolveError> {
    match answer {
        Ok(index) => Ok(Some(index)),
        Err(PromptError::Cancelled) => {
            tracing::debug!("Prompt cancelled, nothing selected");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

impl RunResolver {
    /// Build a resolver. Its lister shares `platform` and `clock`.
    pub fn new(
        platform: Arc<dyn Platform>,
        prompt: Arc<dyn Prompt>,
        clock: Arc<dyn Clock>,
        options: ResolveOptions,
    ) -> Self {
        let lister = RunLister::new(Arc::clone(&platform), clock, &options.namespace);
        Self {
            platform,
            prompt,
            lister,
            options,
        }
    }

    /// Resolve `[definition] [run]`.
    ///
    /// `Ok(None)` means a notice was already written to `output` (or the prompt was
    /// cancelled) and there is nothing to stream.
    #[instrument(
        name = "steplog_resolver::resolve",
        target = "resolver::run_resolver",
        level = "debug",
        skip(self, output),
        fields(namespace = %self.options.namespace, last = self.options.last)
    )]
    pub async fn resolve(
        &self,
        args: &[String],
        output: &mut Output,
    ) -> Result<Option<ResolvedRun>, ResolveError> {
        check_limit(self.options.limit)?;

        let definition = match args {
            [] => match self.choose_definition(output).await? {
                Some(definition) => definition,
                None => return Ok(None),
            },
            [definition] => {
                self.platform
                    .get_definition(definition, &self.options.namespace)
                    .await?;
                definition.clone()
            }
            [definition, run] => {
                return Ok(Some(ResolvedRun {
                    definition: Some(definition.clone()),
                    run: run.clone(),
                }));
            }
            _ => return Err(ResolveError::TooManyArguments),
        };

        let run = self.choose_run(&definition, output).await?;
        Ok(run.map(|run| ResolvedRun {
            definition: Some(definition),
            run,
        }))
    }

    /// Resolve `[run]` without going through a definition.
    #[instrument(
        name = "steplog_resolver::resolve_run",
        target = "resolver::run_resolver",
        level = "debug",
        skip(self),
        fields(namespace = %self.options.namespace)
    )]
    pub async fn resolve_run(&self, args: &[String]) -> Result<Option<ResolvedRun>, ResolveError> {
        check_limit(self.options.limit)?;

        match args {
            [] => {}
            [run] => {
                return Ok(Some(ResolvedRun {
                    definition: None,
                    run: run.clone(),
                }));
            }
            _ => return Err(ResolveError::TooManyArguments),
        }

        let runs = self.lister.list(None, self.options.limit).await?;
        let index = match runs.len() {
            0 => return Err(ResolveError::NoRuns),
            1 => 0,
            _ => {
                let labels = self.lister.describe_all(&runs);
                match chosen(self.prompt.select(SELECT_TASKRUN, &labels).await)? {
                    Some(index) => index,
                    None => return Ok(None),
                }
            }
        };

        Ok(runs.into_iter().nth(index).map(|run| ResolvedRun {
            definition: None,
            run: run.name,
        }))
    }

    async fn choose_definition(&self, output: &mut Output) -> Result<Option<String>, ResolveError> {
        let names = self
            .platform
            .list_definitions(&self.options.namespace)
            .await?;

        if names.is_empty() {
            output.notice(&format!(
                "No tasks found in namespace: {}",
                self.options.namespace
            ));
            return Ok(None);
        }

        let index = chosen(self.prompt.select(SELECT_TASK, &names).await)?;
        Ok(index.and_then(|i| names.into_iter().nth(i)))
    }

    async fn choose_run(
        &self,
        definition: &str,
        output: &mut Output,
    ) -> Result<Option<String>, ResolveError> {
        if self.options.last {
            let run = self.lister.last(definition).await?;
            tracing::debug!(run = %run.name, "Using newest run");
            return Ok(Some(run.name));
        }

        let runs = self
            .lister
            .list(Some(definition), self.options.limit)
            .await?;

        match runs.len() {
            0 => {
                output.notice(&format!("No taskruns found for task: {definition}"));
                Ok(None)
            }
            1 => Ok(runs.into_iter().next().map(|run| run.name)),
            _ => {
                let labels = self.lister.describe_all(&runs);
                let index = chosen(self.prompt.select(SELECT_TASKRUN, &labels).await)?;
                Ok(index.and_then(|i| runs.into_iter().nth(i)).map(|run| run.name))
            }
        }
    }
}
