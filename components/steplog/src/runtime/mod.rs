/// Entry point used by `main`.
pub mod runtime;
