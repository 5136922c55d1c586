use crate::config::Config;
use crate::interpreter::host::memory::PropertyRow;
use crate::interpreter::types::{CompiledScript, Value};
use crate::interpreter::{
    Interpreter, MemoryHost, ParallelExecutor, RunOptions, RunReport, RunStatus, SequentialExecutor, TokioExecutor,
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "molscript")]
#[command(about = "MolScript - run compiled molecular-visualization scripts", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a compiled script (JSON)
    Run {
        /// Compiled script file
        script: PathBuf,

        /// Particle table: a JSON array of property objects
        #[arg(short = 'p', long = "particles")]
        particles: Option<PathBuf>,

        /// Do not record executed statements in the history
        #[arg(long = "no-history")]
        no_history: bool,
    },

    /// Syntax-check a compiled script without running commands
    Check {
        /// Compiled script file
        script: PathBuf,
    },
}

/// Run the CLI by parsing process arguments
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli)
}

/// Run the CLI with provided arguments
pub fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli)
}

fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Load configuration first so config errors show before anything runs
    let config = Config::builder().config_path(cli.config.clone()).build()?;
    init_logging(&config.logging.level);
    debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Run {
            script,
            particles,
            no_history,
        } => {
            let compiled = load_script(&script)?;
            let mut host = MemoryHost::new();
            if let Some(path) = particles {
                host = host.with_particles(load_particles(&path)?);
            }
            let host = Arc::new(host);

            let mut settings = config.interpreter.clone();
            if no_history {
                settings.history_enabled = false;
            }
            let mut interp = Interpreter::builder(host.clone())
                .settings(settings)
                .executor(build_executor(config.parallel.worker_threads)?)
                .build();

            let result = interp.run(compiled, RunOptions::default());
            for line in host.output_lines() {
                println!("{}", line);
            }
            for line in host.status_messages() {
                eprintln!("{}", line);
            }
            let report = result.map_err(|e| anyhow!(e.full_message()))?;
            summarize(&report);
        }

        Commands::Check { script } => {
            let compiled = load_script(&script)?;
            let host = Arc::new(MemoryHost::new());
            let mut interp = Interpreter::builder(host)
                .settings(config.interpreter.clone())
                .build();
            interp
                .check(compiled)
                .map_err(|e| anyhow!(e.full_message()))?;
            println!("{}: OK", script.display());
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // a second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_executor(worker_threads: usize) -> Result<Arc<dyn ParallelExecutor>> {
    if worker_threads == 0 {
        return Ok(Arc::new(SequentialExecutor));
    }
    let executor = TokioExecutor::new(worker_threads).context("Failed to start fork worker pool")?;
    Ok(Arc::new(executor))
}

fn summarize(report: &RunReport) {
    match report.status {
        RunStatus::Completed => info!(bindings = report.bindings.len(), "run completed"),
        RunStatus::Exited => info!("run stopped by exit"),
        RunStatus::Cancelled => info!("run cancelled"),
    }
}

fn load_script(path: &Path) -> Result<CompiledScript> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid compiled script {}", path.display()))
}

fn load_particles(path: &Path) -> Result<Vec<PropertyRow>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let rows: Vec<serde_json::Map<String, JsonValue>> =
        serde_json::from_str(&text).with_context(|| format!("Invalid particle table {}", path.display()))?;

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            row.into_iter()
                .map(|(name, raw)| {
                    let value = json_to_value(&raw)
                        .ok_or_else(|| anyhow!("particle {}: unsupported value for '{}'", i + 1, name))?;
                    Ok((name.to_lowercase(), value))
                })
                .collect()
        })
        .collect()
}

fn json_to_value(raw: &JsonValue) -> Option<Value> {
    match raw {
        JsonValue::Bool(b) => Some(Value::Bool(*b)),
        JsonValue::Number(n) => n.as_i64().map(Value::Int).or_else(|| n.as_f64().map(Value::Float)),
        JsonValue::String(s) => Some(Value::Str(s.clone())),
        JsonValue::Array(items) => items.iter().map(json_to_value).collect::<Option<Vec<_>>>().map(Value::List),
        JsonValue::Null | JsonValue::Object(_) => None,
    }
}
