// Local crates
use crate::streamer::{coordinator::LogStream, models::LogEvent};
use crate::writer::sink::Output;

// External crates
use std::io::Write;
use tracing::instrument;

/// Counts of what a [`LogWriter::drain`] call rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Log lines written to the out half.
    pub lines: usize,
    /// Errors written to the err half.
    pub errors: usize,
}

/// Renders an opened run to the user's output.
#[derive(Debug, Clone, Copy)]
pub struct LogWriter {
    prefix: bool,
}

impl LogWriter {
    /// With `prefix`, lines are written as `[step] line` whenever more than one step is
    /// being streamed.
    pub fn new(prefix: bool) -> Self {
        Self { prefix }
    }

    /// Consume both channels of `stream` until both are closed.
    ///
    /// Events keep their arrival order. Errors go to the error half as they arrive,
    /// with no ordering relative to events. Write failures are logged and skipped.
    #[instrument(
        name = "steplog_writer::drain",
        target = "writer::log_writer",
        level = "debug",
        skip_all,
        fields(run = %stream.run, prefix = self.prefix)
    )]
    pub async fn drain(&self, stream: LogStream, output: &mut Output) -> DrainSummary {
        let LogStream {
            mut events,
            mut errors,
            steps,
            ..
        } = stream;

        let mut summary = DrainSummary::default();
        let mut events_open = true;
        let mut errors_open = true;

        while events_open || errors_open {
            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        let prefixed = self.prefix && steps.get().is_some_and(|s| s.len() > 1);
                        if let Err(e) = write_event(&mut output.out, &event, prefixed) {
                            tracing::warn!(error = %e, "Failed to write log line");
                        }
                        summary.lines += 1;
                    }
                    None => events_open = false,
                },
                err = errors.recv(), if errors_open => match err {
                    Some(err) => {
                        output.notice(&err.to_string());
                        summary.errors += 1;
                    }
                    None => errors_open = false,
                },
            }
        }

        if let Err(e) = output.out.flush() {
            tracing::warn!(error = %e, "Failed to flush output");
        }
        tracing::debug!(lines = summary.lines, errors = summary.errors, "Stream drained");
        summary
    }
}

fn write_event(out: &mut dyn Write, event: &LogEvent, prefixed: bool) -> std::io::Result<()> {
    if prefixed {
        writeln!(out, "[{}] {}", event.step, event.line)
    } else {
        writeln!(out, "{}", event.line)
    }
}
