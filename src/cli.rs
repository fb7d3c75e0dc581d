use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::{EngineConfig, CONFIG_PATH_ENV};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::executor::Value;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Cadence - a suspendable interpreter for guest scripts", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate a script file and print its value as JSON
    Run {
        /// Script to evaluate
        file: PathBuf,

        /// Seed a global binding (name=json), repeatable
        #[arg(short = 'd', long = "define")]
        define: Vec<String>,
    },

    /// Evaluate an inline snippet and print its value as JSON
    Eval {
        /// Source code
        code: String,

        /// Seed a global binding (name=json), repeatable
        #[arg(short = 'd', long = "define")]
        define: Vec<String>,
    },

    /// Print the instrumented program and scope tree as JSON
    Compile {
        /// Script to compile
        file: PathBuf,
    },
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

/// Install the global `tracing` subscriber; `RUST_LOG` wins over config
pub fn init_logging(config: &EngineConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    // A subscriber may already be installed by an embedding host
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parse `name=json`; values that are not JSON are taken as strings
pub fn parse_define(raw: &str) -> Result<(String, Value)> {
    let (name, json) = raw
        .split_once('=')
        .with_context(|| format!("Invalid --define '{}', expected name=json", raw))?;
    let name = name.trim();
    if !crate::executor::scope::is_valid_name(name) {
        anyhow::bail!("Invalid --define name '{}'", name);
    }
    let value = match serde_json::from_str::<serde_json::Value>(json) {
        Ok(parsed) => Value::from_json(&parsed),
        Err(_) => Value::from(json),
    };
    Ok((name.to_string(), value))
}

/// Internal function that handles CLI commands
async fn run_cli_with_args(cli: Cli) -> Result<()> {
    if let Some(config_path) = &cli.config {
        std::env::set_var(CONFIG_PATH_ENV, config_path);
    }

    // Eagerly load and validate configuration before executing any command
    let config = EngineConfig::builder()
        .config_path(cli.config.as_ref().map(PathBuf::from))
        .build()?;
    init_logging(&config);

    match cli.command {
        Commands::Run { file, define } => {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            evaluate(config, &source, &define).await?;
        }

        Commands::Eval { code, define } => {
            evaluate(config, &code, &define).await?;
        }

        Commands::Compile { file } => {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let unit = crate::compiler::compile(&source)?;
            println!("{}", serde_json::to_string_pretty(&*unit)?);
        }
    }

    Ok(())
}

async fn evaluate(config: EngineConfig, source: &str, defines: &[String]) -> Result<()> {
    let mut builder = Engine::builder().config(config);
    for raw in defines {
        let (name, value) = parse_define(raw)?;
        builder = builder.define(name, value);
    }
    let engine = builder.build();

    match engine.run(source).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value.to_json())?);
            Ok(())
        }
        Err(EngineError::Uncaught(failure)) => {
            eprintln!("{}", failure);
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
