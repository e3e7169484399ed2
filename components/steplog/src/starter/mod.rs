/// Starting runs from a named definition or a definition file.
pub mod run_starter;
