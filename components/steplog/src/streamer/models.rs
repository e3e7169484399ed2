// Local crates
use crate::platform::models::Pod;

// External crates
use serde::Serialize;
use std::time::Duration;

/// Prefix the platform puts in front of step container names.
pub const STEP_PREFIX: &str = "step-";

/// One step's log-producing unit, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepSource {
    /// Display name, without the platform's `step-` prefix.
    pub name: String,
    /// Container to read the log from.
    pub container: String,
    /// Zero-based position among the streamed steps.
    pub ordinal: usize,
    /// Platform-injected setup step.
    pub init: bool,
}

/// One line of output from one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    /// Display name of the step.
    pub step: String,
    /// Line content without the trailing newline.
    pub line: String,
}

/// What to stream and how to wait for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Keep streaming until the run reaches a terminal condition.
    pub follow: bool,
    /// Include platform-injected setup steps.
    pub all_steps: bool,
    /// Delay between platform polls while waiting in follow mode.
    pub poll_interval: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            follow: false,
            all_steps: false,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Steps of `pod` in execution order, init steps dropped unless `all_steps`.
///
/// Ordinals count every container so they stay stable whether or not init steps
/// are shown.
pub fn step_sources(pod: &Pod, all_steps: bool) -> Vec<StepSource> {
    pod.containers
        .iter()
        .enumerate()
        .filter(|(_, c)| all_steps || !c.init)
        .map(|(ordinal, c)| StepSource {
            name: c
                .name
                .strip_prefix(STEP_PREFIX)
                .unwrap_or(&c.name)
                .to_string(),
            container: c.name.clone(),
            ordinal,
            init: c.init,
        })
        .collect()
}
