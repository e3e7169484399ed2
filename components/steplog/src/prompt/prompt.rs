// External crates
use async_trait::async_trait;

/// Title shown when choosing a definition.
pub const SELECT_TASK: &str = "Select task:";
/// Title shown when choosing a run.
pub const SELECT_TASKRUN: &str = "Select taskrun:";

/// Why no option was chosen.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// The user (or a shutdown) abandoned the prompt. Not reported as an error.
    #[error("prompt cancelled")]
    Cancelled,
    /// A scripted prompt ran out of answers.
    #[error("no scripted answer for prompt {0:?}")]
    Unscripted(String),
    /// The terminal could not be used.
    #[error("prompt i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Interactive single-select over a list of options.
///
/// Implementations block until the user picks an entry and return its index into
/// `options`.
#[async_trait]
pub trait Prompt: Send + Sync {
    /// Ask the user to pick one of `options`.
    async fn select(&self, title: &str, options: &[String]) -> Result<usize, PromptError>;
}
