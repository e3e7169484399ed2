// Local crates
use crate::{
    cli::{
        cli::{Commands, TaskCommands, TaskrunCommands},
        session::Session,
    },
    helpers::{clock::SystemClock, load_config::Config, shutdown::Shutdown},
    instrumentation,
    platform::kubectl::KubectlPlatform,
    prompt::terminal::TerminalPrompt,
    writer::sink::Output,
};

// External crates
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::instrument;

/// Wire the production collaborators together and run one command.
#[instrument(
    name = "steplog_runtime::run",
    target = "runtime::runtime",
    level = "debug",
    skip_all
)]
pub async fn run_command(config_path: PathBuf, command: Commands) -> Result<()> {
    let cfg = Config::load(&config_path)?;
    let _guard = instrumentation::tracing::init_tracing(&cfg.tracing)?;

    // Ctrl+C cancels prompts, waits and open step sources
    let shutdown = Shutdown::new();
    shutdown.listen_for_interrupt();

    let platform = Arc::new(KubectlPlatform::new(
        &cfg.platform.kubectl,
        cfg.platform.context.as_deref(),
    ));
    let prompt = Arc::new(TerminalPrompt::new(shutdown.token()));
    let session = Session::new(
        platform,
        prompt,
        Arc::new(SystemClock),
        cfg.clone(),
        shutdown.token(),
    );
    let mut output = Output::stdio();

    tracing::debug!(namespace = %cfg.general.namespace, "Session ready");

    let result = match command {
        Commands::Task {
            command: TaskCommands::Logs(args),
        } => {
            session
                .task_logs(&args.into_request(&cfg), &mut output)
                .await
        }
        Commands::Task {
            command: TaskCommands::Start(args),
        } => {
            match args.into_request(&cfg) {
                Ok(request) => session.start_task(&request, &mut output).await,
                Err(err) => Err(err),
            }
        }
        Commands::Taskrun {
            command: TaskrunCommands::Logs(args),
        } => {
            session
                .taskrun_logs(&args.into_request(&cfg), &mut output)
                .await
        }
        Commands::Validate | Commands::Version => Ok(()),
    };

    // stop the interrupt listener
    shutdown.trigger();
    result
}
