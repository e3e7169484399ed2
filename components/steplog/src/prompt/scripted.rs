//! Prompt driven by a fixed key sequence, for tests and non-interactive callers.

// Local crates
use crate::prompt::prompt::{Prompt, PromptError};

// External crates
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Keys understood by the virtual single-select list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Move the cursor up one option.
    Up,
    /// Move the cursor down one option.
    Down,
    /// Pick the option under the cursor.
    Enter,
    /// Abandon the prompt, like Ctrl+C.
    Interrupt,
}

/// What a prompt displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shown {
    /// Title line.
    pub title: String,
    /// Options, in display order.
    pub options: Vec<String>,
}

/// Replays one key script per `select` call.
///
/// The cursor starts on the first option and clamps at both ends. `Enter` picks the
/// option under the cursor, `Interrupt` cancels.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    scripts: Mutex<VecDeque<Vec<Key>>>,
    shown: Mutex<Vec<Shown>>,
}

impl ScriptedPrompt {
    /// A prompt answering the n-th `select` with the n-th script.
    pub fn new<I>(scripts: I) -> Self
    where
        I: IntoIterator<Item = Vec<Key>>,
    {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            shown: Mutex::new(Vec::new()),
        }
    }

    /// A prompt that must never be shown.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Every prompt shown so far, in order.
    pub fn shown(&self) -> Vec<Shown> {
        self.shown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Prompt for ScriptedPrompt {
    async fn select(&self, title: &str, options: &[String]) -> Result<usize, PromptError> {
        self.shown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Shown {
                title: title.to_string(),
                options: options.to_vec(),
            });

        let script = self
            .scripts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .ok_or_else(|| PromptError::Unscripted(title.to_string()))?;

        let last = options.len().saturating_sub(1);
        let mut cursor = 0usize;
        for key in script {
            match key {
                Key::Up => cursor = cursor.saturating_sub(1),
                Key::Down => cursor = (cursor + 1).min(last),
                Key::Enter => return Ok(cursor),
                Key::Interrupt => return Err(PromptError::Cancelled),
            }
        }
        Err(PromptError::Cancelled)
    }
}
