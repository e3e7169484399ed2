/// The `Platform` trait and its errors.
pub mod client;
/// Wire documents exchanged with kubectl.
pub mod convert;
/// Seeded platform used by tests.
pub mod in_memory;
pub mod kubectl;
pub mod models;
