// Local crates
use crate::helpers::{age::humanize, clock::Clock};
use crate::platform::{
    client::{Platform, PlatformError},
    models::{LabelSelector, RunRecord},
};

// External crates
use std::sync::Arc;
use tracing::instrument;

/// Listing failures.
#[derive(Debug, thiserror::Error)]
pub enum ListError {
    /// A zero or negative limit.
    #[error("limit was {0} but must be a positive number")]
    InvalidLimit(i64),
    /// `--last` found nothing for the definition.
    #[error("no taskruns related to task {definition} found in namespace {namespace}")]
    NoRunsFor {
        /// Definition searched.
        definition: String,
        /// Namespace searched.
        namespace: String,
    },
    /// The platform could not list runs.
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Lists runs newest-first and renders them for selection.
pub struct RunLister {
    platform: Arc<dyn Platform>,
    clock: Arc<dyn Clock>,
    namespace: String,
}

impl std::fmt::Debug for RunLister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLister")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Reject non-positive limits, echoing the offending value.
pub fn check_limit(limit: i64) -> Result<usize, ListError> {
    if limit <= 0 {
        return Err(ListError::InvalidLimit(limit));
    }
    Ok(usize::try_from(limit).unwrap_or(usize::MAX))
}

/// Newest first by start time, creation time breaking ties.
fn newest_first(runs: &mut [RunRecord]) {
    runs.sort_by(|a, b| {
        b.started_at()
            .cmp(&a.started_at())
            .then_with(|| b.creation_timestamp.cmp(&a.creation_timestamp))
    });
}

impl RunLister {
    /// A lister over runs in `namespace`. `clock` dates the descriptions.
    pub fn new(platform: Arc<dyn Platform>, clock: Arc<dyn Clock>, namespace: &str) -> Self {
        Self {
            platform,
            clock,
            namespace: namespace.to_string(),
        }
    }

    /// Runs of `definition` (every run in the namespace when `None`), newest first,
    /// truncated to `limit`.
    #[instrument(
        name = "steplog_lister::list",
        target = "lister::run_lister",
        level = "debug",
        skip(self),
        fields(namespace = %self.namespace)
    )]
    pub async fn list(
        &self,
        definition: Option<&str>,
        limit: i64,
    ) -> Result<Vec<RunRecord>, ListError> {
        let limit = check_limit(limit)?;
        let selector = definition.map(LabelSelector::definition);

        let mut runs = self
            .platform
            .list_runs(&self.namespace, selector.as_ref())
            .await?;
        newest_first(&mut runs);
        runs.truncate(limit);

        tracing::debug!(found = runs.len(), "Runs listed");
        Ok(runs)
    }

    /// The single newest run of `definition`.
    #[instrument(
        name = "steplog_lister::last",
        target = "lister::run_lister",
        level = "debug",
        skip(self),
        fields(namespace = %self.namespace)
    )]
    pub async fn last(&self, definition: &str) -> Result<RunRecord, ListError> {
        let selector = LabelSelector::definition(definition);
        let mut runs = self
            .platform
            .list_runs(&self.namespace, Some(&selector))
            .await?;
        newest_first(&mut runs);

        runs.into_iter().next().ok_or_else(|| ListError::NoRunsFor {
            definition: definition.to_string(),
            namespace: self.namespace.clone(),
        })
    }

    /// `"{name} started {age}"`, e.g. `taskrun2 started 3 minutes ago`.
    pub fn describe(&self, run: &RunRecord) -> String {
        format!(
            "{} started {}",
            run.name,
            humanize(run.started_at(), self.clock.now())
        )
    }

    /// [`Self::describe`] for each run, keeping order.
    pub fn describe_all(&self, runs: &[RunRecord]) -> Vec<String> {
        runs.iter().map(|run| self.describe(run)).collect()
    }
}
