/// Cancel-aware readers.
pub mod async_read;
pub mod coordinator;
/// Step sources and log events.
pub mod models;
