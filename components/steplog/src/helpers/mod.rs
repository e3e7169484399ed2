/// Relative durations such as "5 minutes ago".
pub mod age;
/// Injectable current time.
pub mod clock;
/// Layered configuration.
pub mod load_config;
/// Ctrl+C driven cancellation.
pub mod shutdown;
