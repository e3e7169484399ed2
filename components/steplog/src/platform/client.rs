//! Capabilities consumed from the orchestration platform.
//!
//! Everything in this crate talks to the platform through [`Platform`], so the
//! resolver and the streaming pipeline run unchanged against the in-memory
//! platform in tests and against `kubectl` in production.

// Local crates
use crate::platform::models::{Definition, LabelSelector, Pod, RunRecord, RunRequest};

// External crates
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// Byte stream produced by one step's log source.
pub type StepLog = BoxStream<'static, std::io::Result<Bytes>>;

/// Platform error handling
/// - `NotFound` and `Api` carry the platform's own message and display it verbatim.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The object does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Any other rejection by the platform.
    #[error("{0}")]
    Api(String),
    /// A step log could not be opened.
    #[error("container {container} in pod {pod}: {message}")]
    OpenLog {
        /// Pod the container belongs to.
        pod: String,
        /// Container whose log was requested.
        container: String,
        /// Platform message.
        message: String,
    },
    /// A platform document did not have the expected shape.
    #[error("malformed {kind} document: {message}")]
    Decode {
        /// Document kind, such as `taskrun`.
        kind: &'static str,
        /// Decoder message.
        message: String,
    },
    /// Talking to the platform failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PlatformError {
    /// Whether the platform reported the object as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// CRUD and log access against the orchestration platform.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Names of every definition in `namespace`.
    async fn list_definitions(&self, namespace: &str) -> Result<Vec<String>, PlatformError>;

    /// One definition by name.
    async fn get_definition(&self, name: &str, namespace: &str)
    -> Result<Definition, PlatformError>;

    /// Runs in `namespace`, optionally restricted to those matching `selector`.
    async fn list_runs(
        &self,
        namespace: &str,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<RunRecord>, PlatformError>;

    /// One run by name.
    async fn get_run(&self, name: &str, namespace: &str) -> Result<RunRecord, PlatformError>;

    /// Submit a new run. Called once per request, never retried.
    async fn create_run(&self, request: &RunRequest) -> Result<RunRecord, PlatformError>;

    /// The pod with its containers in execution order.
    async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, PlatformError>;

    /// Open the log of one container. With `follow`, the stream stays open until the
    /// container terminates.
    async fn open_step_log(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        follow: bool,
    ) -> Result<StepLog, PlatformError>;
}
