// External crates
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Process-wide cooperative cancellation, built on top of a `CancellationToken`.
///
/// - Each component receives a child token through `.token()`.
/// - `.trigger()` (or Ctrl+C once `.listen_for_interrupt()` is running) cancels all of them.
/// - Components observe it with `tokio::select!` on `token.cancelled()` while blocked on
///   a prompt, a step source or a poll interval.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// A fresh, untriggered shutdown.
    #[instrument(
        name = "steplog_shutdown::create",
        target = "helpers::shutdown",
        level = "trace"
    )]
    pub fn new() -> Self {
        tracing::trace!("Creating shutdown token");
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Returns a child token for a component.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Cancel every token handed out by this `Shutdown`.
    #[instrument(
        name = "steplog_shutdown::trigger",
        target = "helpers::shutdown",
        level = "trace",
        skip_all
    )]
    pub fn trigger(&self) {
        tracing::trace!("Shutdown triggered, cancelling component tokens");
        self.token.cancel();
    }

    /// Whether `trigger` was called or Ctrl+C was received.
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn a task that triggers shutdown on Ctrl+C.
    #[instrument(
        name = "steplog_shutdown::listen",
        target = "helpers::shutdown",
        level = "trace",
        skip_all
    )]
    pub fn listen_for_interrupt(&self) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.token.cancelled() => {}
                res = signal::ctrl_c() => {
                    match res {
                        Ok(()) => tracing::debug!("Ctrl+C signal detected, shutting down"),
                        Err(e) => tracing::warn!(error = %e, "Failed to listen for Ctrl+C signal"),
                    }
                    shutdown.trigger();
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_cancels_child_tokens() {
        let shutdown = Shutdown::new();
        let first = shutdown.token();
        let second = shutdown.token();
        assert!(!first.is_cancelled());

        shutdown.trigger();

        first.cancelled().await;
        assert!(second.is_cancelled());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn child_cancellation_does_not_propagate_up() {
        let shutdown = Shutdown::new();
        let child = shutdown.token();
        child.cancel();

        assert!(!shutdown.is_triggered());
        assert!(!shutdown.token().is_cancelled());
    }
}
