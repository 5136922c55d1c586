//! Configuration loading
//!
//! Settings are layered, later sources winning:
//!
//! 1. Built-in defaults
//! 2. `molscript.toml` in the working directory (or the explicit path given
//!    to the builder or in `MOLSCRIPT_CONFIG_PATH`, which must exist)
//! 3. Environment variables prefixed `MOLSCRIPT_`, with `__` between
//!    nesting levels: `MOLSCRIPT_INTERPRETER__MAX_SCRIPT_LEVELS=20`
//!
//! A `.env` file is read first so its variables take part in step 3.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "molscript";
const CONFIG_PATH_ENV: &str = "MOLSCRIPT_CONFIG_PATH";
const ENV_PREFIX: &str = "MOLSCRIPT";

/* ===================== Settings ===================== */

/// Interpreter behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterSettings {
    /// Maximum nested script levels (scripts, functions, try blocks)
    pub max_script_levels: usize,
    /// Record executed statements in the history log
    pub history_enabled: bool,
    pub history_max: usize,
    /// Reject gotos that leave their enclosing block, even when balanced
    pub goto_strict: bool,
    /// Send each statement to the host status stream before running it
    pub echo_commands: bool,
    /// How often a paused script wakes to look for interrupts
    pub pause_poll_ms: u64,
}

impl Default for InterpreterSettings {
    fn default() -> Self {
        Self {
            max_script_levels: 10,
            history_enabled: true,
            history_max: 1000,
            goto_strict: false,
            echo_commands: false,
            pause_poll_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelSettings {
    /// Worker threads for fork batches; 0 runs them sequentially
    pub worker_threads: usize,
}

impl Default for ParallelSettings {
    fn default() -> Self {
        Self { worker_threads: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub interpreter: InterpreterSettings,
    pub parallel: ParallelSettings,
    pub logging: LoggingSettings,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load with the default search
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    fn validate(&self) -> Result<()> {
        if self.interpreter.max_script_levels == 0 {
            bail!("interpreter.max_script_levels must be at least 1");
        }
        if self.interpreter.history_max == 0 {
            bail!("interpreter.history_max must be at least 1");
        }
        if self.interpreter.pause_poll_ms == 0 {
            bail!("interpreter.pause_poll_ms must be at least 1");
        }
        Ok(())
    }
}

/* ===================== Builder ===================== */

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    skip_env: bool,
}

impl ConfigBuilder {
    /// Explicit config file; it must exist
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Ignore `.env` and `MOLSCRIPT_*` variables
    pub fn skip_env(mut self, skip: bool) -> Self {
        self.skip_env = skip;
        self
    }

    pub fn build(self) -> Result<Config> {
        if !self.skip_env {
            dotenvy::dotenv().ok();
        }

        let explicit = self.config_path.or_else(|| {
            if self.skip_env {
                None
            } else {
                std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from)
            }
        });

        let mut layers = config::Config::builder().add_source(
            config::Config::try_from(&Config::default()).context("Failed to encode defaults")?,
        );
        layers = match &explicit {
            Some(path) => layers.add_source(config::File::from(path.as_path()).required(true)),
            None => layers.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };
        if !self.skip_env {
            layers = layers.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: Config = layers
            .build()
            .with_context(|| match &explicit {
                Some(path) => format!("Failed to read config file {}", path.display()),
                None => "Failed to assemble configuration".to_string(),
            })?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }
}
