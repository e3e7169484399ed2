// External crates
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

/// Prefix of environment variables overriding configuration values, e.g.
/// `STEPLOG__GENERAL__NAMESPACE=ci`.
const ENV_PREFIX: &str = "STEPLOG";

/// Settings shared by every command.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeneralConfig {
    /// Namespace used when `--namespace` is not given.
    pub namespace: String,
}

/// Effective steplog configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Shared settings.
    pub general: GeneralConfig,
    /// Defaults for the log commands.
    pub logs: LogsConfig,
    /// Defaults for `task start`.
    pub start: StartConfig,
    /// How the cluster is reached.
    pub platform: PlatformConfig,
    /// Diagnostic logging.
    pub tracing: TracingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig {
                namespace: "default".to_string(),
            },
            logs: LogsConfig {
                limit: 5,
                follow: false,
                all_steps: false,
                prefix: true,
                poll_interval_ms: 500,
            },
            start: StartConfig {
                timeout_seconds: 3600,
                show_log: true,
            },
            platform: PlatformConfig {
                kubectl: "kubectl".to_string(),
                context: None,
            },
            tracing: TracingConfig {
                level: "warn".to_string(),
                log_dir: None,
                json: false,
            },
        }
    }
}

impl Config {
    /// Load configuration: built-in defaults, then the TOML file at `path` if it
    /// exists, then `STEPLOG__*` environment variables.
    #[instrument(
        name = "steplog_config::load",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            "Loading steplog configuration"
        );

        let defaults = config::Config::try_from(&Self::default())
            .context("Failed to build default configuration")?;

        let layered = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::from(path_ref).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build();

        let config: Config = match layered.and_then(|c| c.try_deserialize()) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                return Err(e)
                    .with_context(|| format!("Failed to load config file at {:?}", path_ref));
            }
        };

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            namespace = %config.general.namespace,
            "steplog configuration loaded successfully"
        );
        Ok(config)
    }

    /// `steplog/config.toml` under the platform config directory
    /// (`~/.config` on Linux), or the working directory when there is none.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("steplog")
            .join("config.toml")
    }
}

/// Defaults for `task logs` and `taskrun logs`.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogsConfig {
    /// How many runs the interactive selector offers.
    pub limit: i64,
    /// Follow live logs by default.
    pub follow: bool,
    /// Include platform-injected setup steps.
    pub all_steps: bool,
    /// Prefix lines with their step name when more than one step is shown.
    pub prefix: bool,
    /// Delay between checks while waiting for a step or a pod in follow mode.
    pub poll_interval_ms: u64,
}

impl LogsConfig {
    /// `poll_interval_ms` as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Defaults for `task start`.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StartConfig {
    /// Run timeout when `--timeout` is not given.
    pub timeout_seconds: u64,
    /// Follow the new run when `--showlog` is not given.
    pub show_log: bool,
}

/// How the cluster is reached.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlatformConfig {
    /// kubectl binary used to reach the cluster.
    pub kubectl: String,
    /// kubeconfig context, the current one when unset.
    pub context: Option<String>,
}

/// Diagnostic logging, separate from the streamed step logs.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TracingConfig {
    /// Default filter when `STEPLOG_LOG` is unset.
    pub level: String,
    /// Directory for rolling diagnostic log files. Stderr only when unset.
    pub log_dir: Option<PathBuf>,
    /// Write the log files as JSON.
    pub json: bool,
}
