//! Turns one run into an ordered stream of log lines plus a parallel error stream.
//!
//! [`LogStreamCoordinator::open`] looks the run up and hands the rest to a producer
//! task, which resolves the backing pod, enumerates the steps and reads them strictly
//! one after the other: the source of step `k + 1` is not opened before the source of
//! step `k` has ended. Per-step failures go to the error channel and the producer moves
//! on. Both channels close when the producer is done, or promptly after cancellation.

// Local crates
use crate::platform::{
    client::{Platform, PlatformError, StepLog},
    models::{ContainerState, Pod, RunRecord},
};
use crate::streamer::{
    async_read::AsyncReadExt,
    models::{LogEvent, StepSource, StreamOptions, step_sources},
};

// External crates
use std::sync::{Arc, OnceLock};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::{io::StreamReader, sync::CancellationToken};
use tracing::instrument;

const EVENT_BUFFER: usize = 256;
const ERROR_BUFFER: usize = 16;

/// Failures while streaming a run. Only [`StreamError::RunUnavailable`] aborts
/// [`LogStreamCoordinator::open`]; the rest arrive on the error channel.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The run itself could not be read. The platform message is part of the text,
    /// so it is not chained as a source as well.
    #[error("Unable to get Taskrun: {0}")]
    RunUnavailable(PlatformError),
    /// The run has no readable pod.
    #[error("pod for taskrun {run} not available yet: {cause}")]
    PodUnavailable {
        /// Run name.
        run: String,
        /// Why the pod could not be read.
        cause: String,
    },
    /// A step's log source could not be opened.
    #[error("failed to open log of step {step}: {source}")]
    StepOpen {
        /// Display name of the step.
        step: String,
        /// Platform failure.
        #[source]
        source: PlatformError,
    },
    /// A step's log source failed mid-read.
    #[error("failed to read log of step {step}: {source}")]
    StepRead {
        /// Display name of the step.
        step: String,
        /// Read failure.
        #[source]
        source: std::io::Error,
    },
}

/// Receiving side of an opened run.
#[derive(Debug)]
pub struct LogStream {
    /// Name of the run being streamed.
    pub run: String,
    /// Log lines in step order.
    pub events: mpsc::Receiver<LogEvent>,
    /// Failures that did not stop the stream.
    pub errors: mpsc::Receiver<StreamError>,
    pub(crate) steps: Arc<OnceLock<Vec<StepSource>>>,
}

impl LogStream {
    /// Steps being streamed. Set before the first event is sent, so a consumer that
    /// has received an event always sees them.
    pub fn steps(&self) -> Option<&[StepSource]> {
        self.steps.get().map(Vec::as_slice)
    }
}

/// Opens runs and feeds their step logs, one step at a time.
pub struct LogStreamCoordinator {
    platform: Arc<dyn Platform>,
    namespace: String,
    options: StreamOptions,
    cancel: CancellationToken,
}

impl std::fmt::Debug for LogStreamCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStreamCoordinator")
            .field("namespace", &self.namespace)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl LogStreamCoordinator {
    /// A coordinator for runs in `namespace`. `cancel` stops every stream it opened.
    pub fn new(
        platform: Arc<dyn Platform>,
        namespace: &str,
        options: StreamOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            platform,
            namespace: namespace.to_string(),
            options,
            cancel,
        }
    }

    /// Look `run` up and start streaming it in the background.
    ///
    /// Only a missing run fails here. Everything after that (pod resolution included)
    /// is reported on the error channel of the returned stream.
    #[instrument(
        name = "steplog_streamer::open",
        target = "streamer::coordinator",
        level = "debug",
        skip(self),
        fields(namespace = %self.namespace, follow = self.options.follow)
    )]
    pub async fn open(&self, run: &str) -> Result<LogStream, StreamError> {
        let record = self
            .platform
            .get_run(run, &self.namespace)
            .await
            .map_err(StreamError::RunUnavailable)?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (error_tx, error_rx) = mpsc::channel(ERROR_BUFFER);
        let steps = Arc::new(OnceLock::new());

        let producer = Producer {
            platform: Arc::clone(&self.platform),
            namespace: self.namespace.clone(),
            options: self.options,
            cancel: self.cancel.clone(),
            events: event_tx,
            errors: error_tx,
            steps: Arc::clone(&steps),
        };
        tokio::spawn(producer.run(record));

        Ok(LogStream {
            run: run.to_string(),
            events: event_rx,
            errors: error_rx,
            steps,
        })
    }
}

/// Where a step stands before its source is (re)opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepState {
    Started,
    Pending,
    /// The run finished without ever starting the step.
    NeverRan,
}

struct Producer {
    platform: Arc<dyn Platform>,
    namespace: String,
    options: StreamOptions,
    cancel: CancellationToken,
    events: mpsc::Sender<LogEvent>,
    errors: mpsc::Sender<StreamError>,
    steps: Arc<OnceLock<Vec<StepSource>>>,
}

impl Producer {
    #[instrument(
        name = "steplog_streamer::produce",
        target = "streamer::coordinator",
        level = "debug",
        skip_all,
        fields(run = %run.name)
    )]
    async fn run(self, run: RunRecord) {
        let run_name = run.name.clone();
        let pod = match self.resolve_pod(run).await {
            Some(Ok(pod)) => pod,
            Some(Err(err)) => {
                self.report(err).await;
                return;
            }
            None => return,
        };

        let sources = step_sources(&pod, self.options.all_steps);
        tracing::debug!(pod = %pod.name, steps = sources.len(), "Steps enumerated");
        let _ = self.steps.set(sources.clone());

        for source in &sources {
            if self.cancel.is_cancelled() || self.events.is_closed() {
                break;
            }
            self.stream_step(&run_name, &pod.name, source).await;
        }

        tracing::debug!(cancelled = self.cancel.is_cancelled(), "Producer finished");
    }

    /// `None` means cancelled while waiting.
    async fn resolve_pod(&self, mut run: RunRecord) -> Option<Result<Pod, StreamError>> {
        loop {
            let may_wait = self.options.follow && !run.condition.is_terminal();

            match run.pod_name.as_deref() {
                Some(pod_name) => match self.platform.get_pod(pod_name, &self.namespace).await {
                    Ok(pod) => return Some(Ok(pod)),
                    // the pod object can lag behind the run in follow mode
                    Err(err) if may_wait && err.is_not_found() => {}
                    Err(err) => {
                        return Some(Err(StreamError::PodUnavailable {
                            run: run.name.clone(),
                            cause: err.to_string(),
                        }));
                    }
                },
                None if may_wait => {}
                None => {
                    return Some(Err(StreamError::PodUnavailable {
                        run: run.name.clone(),
                        cause: "no pod assigned".to_string(),
                    }));
                }
            }

            tracing::trace!(run = %run.name, "Waiting for pod");
            if !self.pause().await {
                return None;
            }
            run = match self.platform.get_run(&run.name, &self.namespace).await {
                Ok(run) => run,
                Err(err) => return Some(Err(StreamError::RunUnavailable(err))),
            };
        }
    }

    async fn stream_step(&self, run: &str, pod: &str, source: &StepSource) {
        loop {
            if self.options.follow && !self.await_start(run, pod, source).await {
                return;
            }

            let opened = tokio::select! {
                _ = self.cancel.cancelled() => return,
                opened = self.platform.open_step_log(
                    &self.namespace,
                    pod,
                    &source.container,
                    self.options.follow,
                ) => opened,
            };

            let log = match opened {
                Ok(log) => log,
                Err(err) => {
                    if self.options.follow {
                        match self.step_state(run, pod, source).await {
                            StepState::Pending => {
                                if !self.pause().await {
                                    return;
                                }
                                continue;
                            }
                            StepState::NeverRan => return,
                            StepState::Started => {}
                        }
                    }
                    self.report(StreamError::StepOpen {
                        step: source.name.clone(),
                        source: err,
                    })
                    .await;
                    return;
                }
            };

            if let Err(err) = self.pump(source, log).await {
                self.report(StreamError::StepRead {
                    step: source.name.clone(),
                    source: err,
                })
                .await;
                return;
            }

            if !self.options.follow || self.cancel.is_cancelled() {
                return;
            }
            // a source that ended before its container started gets re-opened
            if self.step_state(run, pod, source).await != StepState::Pending {
                return;
            }
            tracing::trace!(step = %source.name, "Source ended before step started");
            if !self.pause().await {
                return;
            }
        }
    }

    /// Wait until the step's container leaves `Waiting`. Returns `false` when the step
    /// should be skipped or streaming was cancelled.
    async fn await_start(&self, run: &str, pod: &str, source: &StepSource) -> bool {
        loop {
            match self.step_state(run, pod, source).await {
                StepState::Started => return true,
                StepState::NeverRan => {
                    tracing::debug!(step = %source.name, "Run finished before step started, skipping");
                    return false;
                }
                StepState::Pending => {
                    if !self.pause().await {
                        return false;
                    }
                }
            }
        }
    }

    /// Lookup failures count as `Started` so the open attempt surfaces the real error.
    async fn step_state(&self, run: &str, pod: &str, source: &StepSource) -> StepState {
        let Ok(pod) = self.platform.get_pod(pod, &self.namespace).await else {
            return StepState::Started;
        };
        let waiting = pod
            .container(&source.container)
            .is_some_and(|c| c.state == ContainerState::Waiting);
        if !waiting {
            return StepState::Started;
        }
        // the run condition can trail the pod after a failed step
        if pod.phase.is_finished() {
            return StepState::NeverRan;
        }

        match self.platform.get_run(run, &self.namespace).await {
            Ok(record) if record.condition.is_terminal() => StepState::NeverRan,
            Ok(_) => StepState::Pending,
            Err(_) => StepState::Started,
        }
    }

    /// Forward every line of `log` as an event, in the order it was produced.
    async fn pump(&self, source: &StepSource, log: StepLog) -> std::io::Result<()> {
        let reader = StreamReader::new(log)
            .read_until_future(Box::pin(self.cancel.clone().cancelled_owned()));
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut lines = 0usize;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let event = LogEvent {
                step: source.name.clone(),
                line: decode_line(&buf),
            };
            if self.events.send(event).await.is_err() {
                tracing::debug!("Event receiver dropped");
                break;
            }
            lines += 1;
        }

        tracing::debug!(step = %source.name, lines, "Step source drained");
        Ok(())
    }

    async fn report(&self, err: StreamError) {
        tracing::debug!(error = %err, "Stream error");
        let _ = self.errors.send(err).await;
    }

    /// Sleep one poll interval. Returns `false` if cancelled first.
    async fn pause(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.options.poll_interval) => true,
        }
    }
}

/// Strip the line terminator and replace invalid UTF-8.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
