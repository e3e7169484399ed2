// Local crates
use crate::cli::session::{LogsRequest, StartRequest};
use crate::helpers::load_config::Config;
use crate::merger::run_request::Overrides;
use crate::runtime;
use crate::starter::run_starter::DefinitionSource;

// External crates
use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "steplog",
    long_about = "steplog finds task runs on the cluster and streams the logs of their steps, in step order.",
    about = "Stream the step logs of task runs",
    version,
    after_help = "\
    EXAMPLES:
        steplog task logs build -n ci --last
        steplog taskrun logs build-run-x7k2p -f
        steplog task start build -p mode=fast -i source=git-main --showlog
        steplog task start -f ./build-task.yaml --showlog=false
        steplog validate --config ./steplog.toml"
)]
/// Top-level arguments.
pub struct Cli {
    /// Configuration file (defaults to ~/.config/steplog/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Work with tasks
    Task {
        /// Task subcommand.
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Work with task runs
    Taskrun {
        /// Taskrun subcommand.
        #[command(subcommand)]
        command: TaskrunCommands,
    },

    /// Load the configuration and print the effective values
    Validate,

    /// Display version information
    Version,
}

/// Commands on tasks.
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Show the logs of a run of a task
    Logs(TaskLogsArgs),
    /// Start a run of a task
    Start(TaskStartArgs),
}

/// Commands on task runs.
#[derive(Subcommand, Debug)]
pub enum TaskrunCommands {
    /// Show the logs of a task run
    Logs(TaskrunLogsArgs),
}

/// Flags shared by the log commands. Unset flags fall back to the configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct LogFlags {
    /// Namespace to use
    #[arg(short, long)]
    namespace: Option<String>,

    /// Show logs of init steps as well
    #[arg(short, long)]
    all: bool,

    /// Stream live logs until the run finishes
    #[arg(short, long)]
    follow: bool,

    /// Number of runs offered for selection
    #[arg(long, allow_negative_numbers = true)]
    limit: Option<i64>,

    /// Do not prefix lines with the step name
    #[arg(long)]
    no_prefix: bool,
}

/// Show the logs of a run of a task
#[derive(Args, Debug, Clone)]
pub struct TaskLogsArgs {
    /// [TASK] [TASKRUN]
    #[arg(value_name = "NAME")]
    names: Vec<String>,

    /// Show logs of the newest run of the task
    #[arg(short = 'L', long)]
    last: bool,

    #[command(flatten)]
    flags: LogFlags,
}

/// Show the logs of a task run
#[derive(Args, Debug, Clone)]
pub struct TaskrunLogsArgs {
    /// [TASKRUN]
    #[arg(value_name = "NAME")]
    names: Vec<String>,

    #[command(flatten)]
    flags: LogFlags,
}

/// Start a run of a task
#[derive(Args, Debug, Clone)]
pub struct TaskStartArgs {
    /// Task to run
    #[arg(required_unless_present = "filename")]
    name: Option<String>,

    /// File containing a task definition, sent inline with the run
    #[arg(short = 'f', long)]
    filename: Option<PathBuf>,

    /// Namespace to use
    #[arg(short, long)]
    namespace: Option<String>,

    /// Input resource binding, name=resource
    #[arg(short = 'i', long = "inputresource")]
    input_resources: Vec<String>,

    /// Output resource binding, name=resource
    #[arg(short = 'o', long = "outputresource")]
    output_resources: Vec<String>,

    /// Parameter, key=value or key=value1,value2
    #[arg(short = 'p', long = "param")]
    params: Vec<String>,

    /// Label, key=value
    #[arg(short = 'l', long = "label")]
    labels: Vec<String>,

    /// Service account for the run
    #[arg(short = 's', long = "serviceaccount")]
    service_account: Option<String>,

    /// Reuse bindings, parameters and service account of the newest run
    #[arg(short = 'L', long)]
    last: bool,

    /// Follow the logs of the new run
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    showlog: Option<bool>,

    /// Run timeout in seconds
    #[arg(short = 't', long)]
    timeout: Option<u64>,

    /// Do not prefix lines with the step name
    #[arg(long)]
    no_prefix: bool,
}

impl LogFlags {
    fn apply(&self, mut request: LogsRequest) -> LogsRequest {
        if let Some(namespace) = &self.namespace {
            request.namespace = namespace.clone();
        }
        if let Some(limit) = self.limit {
            request.limit = limit;
        }
        request.follow |= self.follow;
        request.all_steps |= self.all;
        request.prefix &= !self.no_prefix;
        request
    }
}

impl TaskLogsArgs {
    /// Fold the flags over the configured defaults.
    pub fn into_request(self, config: &Config) -> LogsRequest {
        let mut request = self.flags.apply(LogsRequest::new(config, self.names));
        request.last = self.last;
        request
    }
}

impl TaskrunLogsArgs {
    /// Fold the flags over the configured defaults.
    pub fn into_request(self, config: &Config) -> LogsRequest {
        self.flags.apply(LogsRequest::new(config, self.names))
    }
}

impl TaskStartArgs {
    /// A positional task name wins over `--filename`.
    pub fn into_request(self, config: &Config) -> Result<StartRequest> {
        let definition = match (self.name, self.filename) {
            (Some(name), _) => DefinitionSource::Named(name),
            (None, Some(path)) => DefinitionSource::File(path),
            (None, None) => bail!("Either a task name or a --filename parameter must be supplied"),
        };
        let mut request = StartRequest::new(config, definition);
        if let Some(namespace) = self.namespace {
            request.namespace = namespace;
        }
        request.overrides = Overrides {
            input_resources: self.input_resources,
            output_resources: self.output_resources,
            params: self.params,
            labels: self.labels,
            service_account: self.service_account,
        };
        request.last = self.last;
        if let Some(show_log) = self.showlog {
            request.show_log = show_log;
        }
        if let Some(timeout) = self.timeout {
            request.timeout = Duration::from_secs(timeout);
        }
        request.prefix &= !self.no_prefix;
        Ok(request)
    }
}

/// Entry function for CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(Config::default_path);

    match cli.command {
        Commands::Validate => validate_config(config_path)?,
        Commands::Version => show_version(),
        command => runtime::runtime::run_command(config_path, command).await?,
    }

    Ok(())
}

//
// ------------------------ Command Implementations ------------------------------
//

/// Validate configuration file
fn validate_config(config: PathBuf) -> Result<()> {
    println!("Validating configuration file: {:?}", config);
    let cfg = Config::load(&config)?;
    println!("Configuration valid:\n{}", toml::to_string_pretty(&cfg)?);
    Ok(())
}

/// Show version information
fn show_version() {
    println!("steplog {}", env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Commands {
        Cli::try_parse_from(std::iter::once("steplog").chain(args.iter().copied()))
            .unwrap()
            .command
    }

    #[test]
    fn task_logs_flags_override_config() {
        let Commands::Task {
            command: TaskCommands::Logs(args),
        } = parse(&["task", "logs", "build", "run-1", "-n", "ci", "-L", "-f", "--limit", "2", "--no-prefix"])
        else {
            panic!("expected task logs");
        };

        let request = args.into_request(&Config::default());
        assert_eq!(request.names, ["build", "run-1"]);
        assert_eq!(request.namespace, "ci");
        assert_eq!(request.limit, 2);
        assert!(request.last && request.follow && !request.prefix && !request.all_steps);
    }

    #[test]
    fn negative_limit_reaches_the_resolver() {
        let Commands::Taskrun {
            command: TaskrunCommands::Logs(args),
        } = parse(&["taskrun", "logs", "--limit", "-1"])
        else {
            panic!("expected taskrun logs");
        };
        let request = args.into_request(&Config::default());
        assert_eq!(request.limit, -1);
        assert_eq!(request.namespace, "default");
        assert!(request.names.is_empty());
    }

    #[test]
    fn task_start_collects_repeated_overrides() {
        let Commands::Task {
            command: TaskCommands::Start(args),
        } = parse(&[
            "task", "start", "build", "-i", "source=git", "-p", "a=1", "-p", "b=x,y", "-l",
            "team=ci", "-s", "builder", "--showlog", "false", "-t", "60",
        ])
        else {
            panic!("expected task start");
        };

        let request = args.into_request(&Config::default()).unwrap();
        assert_eq!(request.definition, DefinitionSource::Named("build".into()));
        assert_eq!(request.overrides.input_resources, ["source=git"]);
        assert_eq!(request.overrides.params, ["a=1", "b=x,y"]);
        assert_eq!(request.overrides.labels, ["team=ci"]);
        assert_eq!(request.overrides.service_account.as_deref(), Some("builder"));
        assert!(!request.show_log);
        assert_eq!(request.timeout, Duration::from_secs(60));
    }

    #[test]
    fn bare_showlog_means_true() {
        let Commands::Task {
            command: TaskCommands::Start(args),
        } = parse(&["task", "start", "build", "--showlog"])
        else {
            panic!("expected task start");
        };
        let mut config = Config::default();
        config.start.show_log = false;
        assert!(args.into_request(&config).unwrap().show_log);
    }

    #[test]
    fn start_from_file_needs_no_name() {
        let Commands::Task {
            command: TaskCommands::Start(args),
        } = parse(&["task", "start", "-f", "task.yaml", "-n", "ci"])
        else {
            panic!("expected task start");
        };
        let request = args.into_request(&Config::default()).unwrap();
        assert_eq!(request.definition, DefinitionSource::File("task.yaml".into()));
        assert_eq!(request.namespace, "ci");

        let Commands::Task {
            command: TaskCommands::Start(args),
        } = parse(&["task", "start", "build", "--filename", "task.yaml"])
        else {
            panic!("expected task start");
        };
        let request = args.into_request(&Config::default()).unwrap();
        assert_eq!(request.definition, DefinitionSource::Named("build".into()));

        assert!(Cli::try_parse_from(["steplog", "task", "start"]).is_err());
    }
}
