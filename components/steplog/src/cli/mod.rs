/// clap definitions.
pub mod cli;
pub mod session;
