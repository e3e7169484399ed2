//! Single-select prompt on the controlling terminal.

// Local crates
use crate::prompt::prompt::{Prompt, PromptError};

// External crates
use async_trait::async_trait;
use dialoguer::{Select, console::Term, theme::ColorfulTheme};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Arrow-key list drawn on stderr with `dialoguer`.
///
/// The list blocks a worker thread until a choice is made. The cancellation token is
/// raced against it so a shutdown abandons the prompt immediately.
#[derive(Debug, Clone)]
pub struct TerminalPrompt {
    cancel: CancellationToken,
}

impl TerminalPrompt {
    /// Prompt that gives up once `cancel` fires.
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

/// Ctrl+C in raw mode surfaces as an interrupted read.
fn prompt_error(err: dialoguer::Error) -> PromptError {
    match err {
        dialoguer::Error::IO(e) if e.kind() == std::io::ErrorKind::Interrupted => {
            PromptError::Cancelled
        }
        dialoguer::Error::IO(e) => PromptError::Io(e),
    }
}

/// `None` is what Esc or `q` return.
fn chosen(answer: Result<Option<usize>, dialoguer::Error>) -> Result<usize, PromptError> {
    answer.map_err(prompt_error)?.ok_or(PromptError::Cancelled)
}

#[async_trait]
impl Prompt for TerminalPrompt {
    #[instrument(
        name = "steplog_prompt::terminal",
        target = "prompt::terminal",
        level = "debug",
        skip(self, options),
        fields(options = options.len())
    )]
    async fn select(&self, title: &str, options: &[String]) -> Result<usize, PromptError> {
        let title = title.trim_end_matches(':').to_string();
        let options = options.to_vec();

        let answer = tokio::task::spawn_blocking(move || {
            Select::with_theme(&ColorfulTheme::default())
                .with_prompt(title)
                .items(&options)
                .default(0)
                .interact_on_opt(&Term::stderr())
        });

        tokio::select! {
            _ = self.cancel.cancelled() => Err(PromptError::Cancelled),
            joined = answer => chosen(joined.map_err(std::io::Error::other)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_and_interrupt_cancel() {
        assert!(matches!(chosen(Ok(None)), Err(PromptError::Cancelled)));

        let interrupted = dialoguer::Error::IO(std::io::Error::from(std::io::ErrorKind::Interrupted));
        assert!(matches!(chosen(Err(interrupted)), Err(PromptError::Cancelled)));
    }

    #[test]
    fn choice_and_terminal_failures() {
        assert_eq!(chosen(Ok(Some(2))).unwrap(), 2);

        let detached = dialoguer::Error::IO(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "not a terminal",
        ));
        let err = chosen(Err(detached)).unwrap_err();
        assert_eq!(err.to_string(), "prompt i/o failed: not a terminal");
    }
}
