pub mod keyed_merger;
/// Building the run to create from a template and overrides.
pub mod run_request;
