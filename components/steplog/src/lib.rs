//! steplog resolves task runs, streams their step logs in order and starts new runs.

/// Command-line surface and the session that runs each command.
pub mod cli;
/// Configuration, clocks, relative ages and shutdown.
pub mod helpers;
/// Tracing subscriber setup.
pub mod instrumentation;
/// Listing and describing task runs.
pub mod lister;
/// Key-based merging and run request construction.
pub mod merger;
/// The cluster seam: trait, models and the kubectl and in-memory clients.
pub mod platform;
/// Interactive single-choice selection.
pub mod prompt;
/// Turning command arguments into one task run.
pub mod resolver;
/// Production wiring for a single command.
pub mod runtime;
/// Creating a task run and optionally following its logs.
pub mod starter;
/// Sequential step log streaming.
pub mod streamer;
/// Rendering log events to the output sinks.
pub mod writer;
