#![deny(unsafe_code)]

//! funclab CLI: list, navigate and invoke the callables of a source file.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use funclab_config::LabConfig;
use funclab_core::{
    ArgumentSpec, Engine, ExecuteRequest, ExecutionOutcome, FunctionDescriptor, coerce, extract,
    locate,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// funclab: call any function in a TypeScript/JavaScript file with ad hoc arguments.
#[derive(Parser)]
#[command(name = "funclab", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "funclab.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the callables declared in a source file.
    Extract {
        file: PathBuf,

        /// Print descriptors as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Execute an entry (`name` or `Class.member`) with raw arguments.
    Run {
        file: PathBuf,

        entry: String,

        /// Raw argument text, one per parameter in order.
        #[arg(short = 'a', long = "arg", allow_hyphen_values = true)]
        args: Vec<String>,

        /// Comma-separated arguments for a returned function.
        #[arg(long = "then", allow_hyphen_values = true)]
        then: Option<String>,

        /// Define the whole file instead of only the entry's declaration.
        #[arg(long)]
        whole_file: bool,

        /// Host timeout in seconds (0 disables; defaults to the config).
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Print the line where an entry is declared.
    Goto { file: PathBuf, entry: String },

    /// Coerce raw text the way argument fields are coerced.
    Coerce {
        raw: String,

        /// Declared type of the receiving parameter.
        #[arg(short = 't', long = "type", default_value = "any")]
        declared: String,

        /// Print JSON instead of JavaScript source.
        #[arg(long)]
        json: bool,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = load_config(&cli.config).await;

    let configured = loaded
        .as_ref()
        .map(|(config, _)| config.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    let filter = match cli.verbose {
        0 => configured,
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let (config, from_file) = loaded?;
    if !from_file {
        info!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    match cli.command {
        Commands::Extract { file, json } => cmd_extract(&file, json).await?,
        Commands::Run {
            file,
            entry,
            args,
            then,
            whole_file,
            timeout,
        } => {
            let options = RunOptions {
                args,
                then,
                whole_file,
                timeout: timeout.map_or_else(|| config.host.timeout(), timeout_from_secs),
            };
            cmd_run(&config, &file, &entry, options).await?
        }
        Commands::Goto { file, entry } => cmd_goto(&file, &entry).await?,
        Commands::Coerce {
            raw,
            declared,
            json,
        } => cmd_coerce(&raw, &declared, json)?,
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
    }

    Ok(())
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

async fn read_descriptors(file: &Path) -> Result<(String, Vec<FunctionDescriptor>)> {
    let source = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let descriptors = extract(&source, &file.display().to_string())?;
    Ok((source, descriptors))
}

async fn cmd_extract(file: &Path, json: bool) -> Result<()> {
    let (_, descriptors) = read_descriptors(file).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }
    for d in &descriptors {
        println!(
            "{:>5}-{:<5} {:<28} {}",
            d.span.start_line,
            d.span.end_line,
            d.kind,
            d.signature()
        );
    }
    info!(file = %file.display(), count = descriptors.len(), "Extraction complete");
    Ok(())
}

struct RunOptions {
    args: Vec<String>,
    then: Option<String>,
    whole_file: bool,
    timeout: Option<Duration>,
}

async fn cmd_run(config: &LabConfig, file: &Path, entry: &str, options: RunOptions) -> Result<()> {
    let (source, descriptors) = read_descriptors(file).await?;
    let Some(descriptor) = descriptors.iter().find(|d| d.name == entry) else {
        bail!("no callable named '{entry}' in {}", file.display());
    };

    let source_text = if options.whole_file {
        source
    } else {
        descriptor.source_text.clone()
    };
    let mut request = ExecuteRequest::new(source_text, entry).with_async(descriptor.is_async);
    for (i, raw) in options.args.into_iter().enumerate() {
        let declared = descriptor
            .parameters
            .get(i)
            .or_else(|| descriptor.parameters.last().filter(|p| p.rest))
            .map_or(funclab_core::descriptor::UNTYPED, |p| p.ty.as_str());
        request = request.with_argument(ArgumentSpec::new(raw, declared));
    }
    if let Some(then) = options.then {
        request = request.with_follow_up(then);
    }

    let engine = Engine::from_config(config);
    let started = Instant::now();
    let outcome = match options.timeout {
        Some(limit) => match tokio::time::timeout(limit, engine.execute(request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(entry, timeout_secs = limit.as_secs(), "Execution timed out");
                ExecutionOutcome::failure(
                    format!("timed out after {}s", limit.as_secs()),
                    started.elapsed().as_secs_f64() * 1000.0,
                )
            }
        },
        None => engine.execute(request).await,
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn cmd_goto(file: &Path, entry: &str) -> Result<()> {
    let (_, descriptors) = read_descriptors(file).await?;
    match locate(&descriptors, entry) {
        Some(line) => {
            println!("{line}");
            Ok(())
        }
        None => bail!("no callable named '{entry}' in {}", file.display()),
    }
}

fn cmd_coerce(raw: &str, declared: &str, json: bool) -> Result<()> {
    let value = coerce(raw, declared);
    if json {
        println!("{}", serde_json::to_string_pretty(&value.to_json())?);
    } else {
        println!("{value}");
    }
    Ok(())
}

fn cmd_config(config_path: &Path, config: &LabConfig, show: bool) -> Result<()> {
    if show {
        let toml_str =
            toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {e}"))?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

/// Load the config file, or defaults when it does not exist. The flag tells
/// whether a file was read.
async fn load_config(path: &Path) -> Result<(LabConfig, bool)> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        let config = LabConfig::load(path)
            .await
            .with_context(|| format!("invalid configuration at {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((LabConfig::default(), false))
    }
}
