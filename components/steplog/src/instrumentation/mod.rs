/// Subscriber layers and the panic hook.
pub mod tracing;
