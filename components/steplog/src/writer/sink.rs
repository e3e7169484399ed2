// External crates
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// User-facing output: log lines and results on `out`, notices and errors on `err`.
pub struct Output {
    /// Log lines and command results.
    pub out: Box<dyn Write + Send>,
    /// Notices and errors.
    pub err: Box<dyn Write + Send>,
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output").finish_non_exhaustive()
    }
}

impl Output {
    /// An output over two writers.
    pub fn new(out: impl Write + Send + 'static, err: impl Write + Send + 'static) -> Self {
        Self {
            out: Box::new(out),
            err: Box::new(err),
        }
    }

    /// The process stdout and stderr.
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }

    /// An output whose two halves can be read back, plus handles to both.
    pub fn captured() -> (Self, SharedBuffer, SharedBuffer) {
        let out = SharedBuffer::default();
        let err = SharedBuffer::default();
        (Self::new(out.clone(), err.clone()), out, err)
    }

    /// Write a result line on the output half. Failures are logged, not returned.
    pub fn say(&mut self, message: &str) {
        if let Err(e) = writeln!(self.out, "{message}") {
            tracing::warn!(error = %e, "Failed to write output");
        }
    }

    /// Write a notice line on the error half. Failures are logged, not returned.
    pub fn notice(&mut self, message: &str) {
        if let Err(e) = writeln!(self.err, "{message}") {
            tracing::warn!(error = %e, "Failed to write notice");
        }
    }
}

/// In-memory `Write` target shared between an [`Output`] and whoever inspects it.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captured_halves_are_separate() {
        let (mut output, out, err) = Output::captured();
        writeln!(output.out, "step1 log").unwrap();
        output.notice("No taskruns found");

        assert_eq!(out.contents(), "step1 log\n");
        assert_eq!(err.contents(), "No taskruns found\n");
    }
}
