use crate::core::errors::{Result, TeamError};
use crate::failure::ExceptionHandler;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Environment variable overriding the default team size
pub const ENV_NUM_THREADS: &str = "PARTEAM_NUM_THREADS";
/// Environment variable overriding the default exception model
pub const ENV_EXCEPTION_MODEL: &str = "PARTEAM_EXCEPTION_MODEL";

const DEFAULT_THREAD_NAME_PREFIX: &str = "parteam";
const DEFAULT_MAX_LOOP_ITERATIONS: usize = 1 << 24;

/// How a region treats a worker whose body fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceptionModel {
    /// Failures behave like unhandled faults: logged, never captured or raised
    #[default]
    Default,
    /// Failures are passed to the installed exception handler on the failing thread
    Handle,
    /// Failures are captured and raised from the region as one aggregated error
    Propagate,
}

impl fmt::Display for ExceptionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Default => "default",
            Self::Handle => "handle",
            Self::Propagate => "propagate",
        };
        f.write_str(name)
    }
}

impl FromStr for ExceptionModel {
    type Err = TeamError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "handle" => Ok(Self::Handle),
            "propagate" => Ok(Self::Propagate),
            other => Err(TeamError::configuration_field(
                format!("unknown exception model '{}'", other),
                "exception_model",
            )),
        }
    }
}

/// Whether a region runs with a full team or a single worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParallelMode {
    #[default]
    Concurrent,
    Serial,
}

/// Process-wide team configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamConfig {
    /// Number of workers spawned by a concurrent region
    pub team_size: usize,
    /// Exception model applied to regions that do not override it
    pub exception_model: ExceptionModel,
    /// Prefix of worker thread names
    pub thread_name_prefix: String,
    /// Worker stack size in bytes, platform default when unset
    pub stack_size: Option<usize>,
    /// Maximum number of values one dynamic loop cycle may enumerate
    pub max_loop_iterations: usize,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            team_size: default_team_size(),
            exception_model: ExceptionModel::Default,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            stack_size: None,
            max_loop_iterations: DEFAULT_MAX_LOOP_ITERATIONS,
        }
    }
}

impl TeamConfig {
    /// Create a new builder for TeamConfig
    pub fn builder() -> TeamConfigBuilder {
        TeamConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.team_size == 0 {
            return Err(TeamError::configuration_field(
                "team_size must be greater than 0",
                "team_size",
            ));
        }
        if self.thread_name_prefix.contains('\0') {
            return Err(TeamError::configuration_field(
                "thread_name_prefix must not contain NUL bytes",
                "thread_name_prefix",
            ));
        }
        if self.stack_size == Some(0) {
            return Err(TeamError::configuration_field(
                "stack_size must be greater than 0 when set",
                "stack_size",
            ));
        }
        if self.max_loop_iterations == 0 {
            return Err(TeamError::configuration_field(
                "max_loop_iterations must be greater than 0",
                "max_loop_iterations",
            ));
        }
        Ok(())
    }

    /// Defaults overlaid with `PARTEAM_NUM_THREADS` and `PARTEAM_EXCEPTION_MODEL`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_NUM_THREADS) {
            config.team_size = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| {
                    TeamError::configuration_field(
                        format!("{} must be a positive integer, got '{}'", ENV_NUM_THREADS, raw),
                        "team_size",
                    )
                })?;
        }
        if let Some(raw) = lookup(ENV_EXCEPTION_MODEL) {
            config.exception_model = raw.parse()?;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Builder for TeamConfig
pub struct TeamConfigBuilder {
    config: TeamConfig,
}

impl TeamConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: TeamConfig::default(),
        }
    }

    pub fn team_size(mut self, team_size: usize) -> Self {
        self.config.team_size = team_size;
        self
    }

    pub fn exception_model(mut self, model: ExceptionModel) -> Self {
        self.config.exception_model = model;
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = Some(bytes);
        self
    }

    pub fn max_loop_iterations(mut self, limit: usize) -> Self {
        self.config.max_loop_iterations = limit;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<TeamConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for TeamConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    static ref DEFAULT_TEAM_SIZE: usize = num_cpus::get().max(1);

    static ref SETTINGS: RwLock<TeamConfig> = RwLock::new(match TeamConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            warn!("Ignoring environment overrides: {}", e);
            TeamConfig::default()
        }
    });

    static ref EXCEPTION_HANDLER: RwLock<Option<ExceptionHandler>> = RwLock::new(None);
}

/// Hardware-detected team size
pub fn default_team_size() -> usize {
    *DEFAULT_TEAM_SIZE
}

/// Snapshot of the process-wide configuration
pub fn settings() -> TeamConfig {
    SETTINGS.read().clone()
}

/// Validate and install a whole configuration
pub fn configure(config: TeamConfig) -> Result<()> {
    config.validate()?;
    debug!(team_size = config.team_size, model = %config.exception_model, "Team configuration replaced");
    *SETTINGS.write() = config;
    Ok(())
}

/// Set the process-wide team size; values below 1 restore the hardware default
pub fn set_global_team_size(team_size: usize) {
    let team_size = if team_size < 1 {
        default_team_size()
    } else {
        team_size
    };
    SETTINGS.write().team_size = team_size;
}

pub fn global_team_size() -> usize {
    SETTINGS.read().team_size
}

pub fn set_exception_model(model: ExceptionModel) {
    SETTINGS.write().exception_model = model;
}

pub fn exception_model() -> ExceptionModel {
    SETTINGS.read().exception_model
}

/// Install (or clear) the handler used by regions running the `Handle` model
pub fn set_exception_handler(handler: Option<ExceptionHandler>) {
    *EXCEPTION_HANDLER.write() = handler;
}

pub fn exception_handler() -> Option<ExceptionHandler> {
    EXCEPTION_HANDLER.read().clone()
}
