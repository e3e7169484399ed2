pub mod run_resolver;
