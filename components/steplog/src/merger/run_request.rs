// Local crates
use crate::merger::keyed_merger::{MergeError, merge};
use crate::platform::models::{DefinitionRef, Label, RunRequest, RunSpec};

// External crates
use std::time::Duration;
use tracing::instrument;

/// Raw `key=value` tokens supplied on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// `-i name=resource`
    pub input_resources: Vec<String>,
    /// `-o name=resource`
    pub output_resources: Vec<String>,
    /// `-p key=value`
    pub params: Vec<String>,
    /// `-l key=value`
    pub labels: Vec<String>,
    /// Replaces the service account when non-empty.
    pub service_account: Option<String>,
}

/// Build the request for a new run of `definition`, named after it.
///
/// `template` seeds bindings, parameters and the service account (the "last run as
/// template" path). Labels always start empty. Nothing is submitted here; an invalid
/// override token fails the whole build.
#[instrument(
    name = "steplog_merger::build_run_request",
    target = "merger::run_request",
    level = "debug",
    skip_all,
    fields(definition = %definition.name(), namespace = %namespace, seeded = template.is_some())
)]
pub fn build_run_request(
    definition: DefinitionRef,
    namespace: &str,
    template: Option<&RunSpec>,
    overrides: &Overrides,
    timeout: Duration,
) -> Result<RunRequest, MergeError> {
    let seed = template.cloned().unwrap_or_default();

    let spec = RunSpec {
        input_resources: merge(seed.input_resources, &overrides.input_resources)?,
        output_resources: merge(seed.output_resources, &overrides.output_resources)?,
        params: merge(seed.params, &overrides.params)?,
        service_account: match overrides.service_account.as_deref() {
            Some(account) if !account.is_empty() => Some(account.to_string()),
            _ => seed.service_account,
        },
    };
    let labels = merge(Vec::<Label>::new(), &overrides.labels)?;

    tracing::debug!(
        inputs = spec.input_resources.len(),
        outputs = spec.output_resources.len(),
        params = spec.params.len(),
        labels = labels.len(),
        "Run request built"
    );

    Ok(RunRequest {
        generate_name: format!("{}-run-", definition.name()),
        namespace: namespace.to_string(),
        definition,
        spec,
        labels,
        timeout,
    })
}
