//! `steplog` command-line entry point.

use steplog::{cli, instrumentation};

#[tokio::main]
async fn main() {
    instrumentation::tracing::init_panic_handler();

    // Main entrypoint simply delegates control to CLI layer.
    // The CLI parses user commands, loads configuration and installs tracing before
    // calling into the matching command.
    let code = match cli::cli::run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e:?}");
            1
        }
    };

    // a prompt abandoned on shutdown can still hold a blocking terminal read
    std::process::exit(code);
}
