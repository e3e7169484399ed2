/// Drains event channels into an `Output`.
pub mod log_writer;
/// Output sinks for log lines and notices.
pub mod sink;
