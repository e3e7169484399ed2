/// The `Prompt` trait.
pub mod prompt;
/// Key-scripted prompt for tests.
pub mod scripted;
pub mod terminal;
