//! Runcell CLI
//!
//! A command-line tool for compiling and running code through the Runcell
//! dispatcher.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use runcell::{Config, EXAMPLE_CONFIG, ExecutionRequest, Runner};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "runcell")]
#[command(about = "A tool for dispatching code to compilers and interpreters")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: runcell.toml)
        #[arg(short, long, default_value = "runcell.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a program (compile if needed, then execute)
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (e.g., cpp, python)
        #[arg(short, long)]
        language: String,

        /// File fed to the program's stdin (default: empty input)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Time limit in seconds for each phase
        #[arg(short, long, value_parser = parse_time_limit)]
        time_limit: Option<Duration>,

        /// Maximum bytes kept from each of stdout and stderr
        #[arg(long, value_parser = parse_output_cap)]
        output_cap: Option<usize>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// List available languages
    Languages,

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            source,
            language,
            input,
            time_limit,
            output_cap,
            json,
        } => {
            run_execute(
                config,
                &source,
                language,
                input.as_deref(),
                time_limit,
                output_cap,
                json,
            )
            .await
        }
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn run_execute(
    config: Config,
    source: &Path,
    language: String,
    input: Option<&Path>,
    time_limit: Option<Duration>,
    output_cap: Option<usize>,
    json: bool,
) -> Result<()> {
    let source_text = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let input_text = match input {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .context("failed to read input file")?,
        None => String::new(),
    };

    let limits = config.limits().with_overrides(time_limit, output_cap);

    let runner = Runner::new(config);
    let request = ExecutionRequest::new(language, source_text).with_input(input_text);

    info!(language = %request.language, "running program");
    let outcome = runner.execute_with_limits(&request, &limits).await;

    if json {
        let rendered =
            serde_json::to_string_pretty(&outcome).context("failed to serialize outcome")?;
        println!("{rendered}");
    } else {
        print!("{}", outcome.stdout);
        if !outcome.stderr.is_empty() {
            eprintln!("{}", outcome.stderr);
        }
    }

    // Log execution info via tracing (stderr), keeping stdout clean for piping
    info!(
        status = ?outcome.status,
        failure_kind = ?outcome.failure_kind,
        elapsed = format_args!("{:.3}s", outcome.elapsed.as_secs_f64()),
        exit_code = outcome.exit_code,
        "{}",
        outcome.message()
    );

    // Exit with appropriate code
    if outcome.succeeded {
        Ok(())
    } else {
        std::process::exit(outcome.exit_code.filter(|code| *code != 0).unwrap_or(1));
    }
}

/// Parse a positive, finite number of seconds
fn parse_time_limit(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if secs <= 0.0 {
        return Err(format!("time limit must be positive, got {s}"));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{e}"))
}

/// Parse a nonzero byte count
fn parse_output_cap(s: &str) -> Result<usize, String> {
    match s.parse::<usize>().map_err(|e| format!("{e}"))? {
        0 => Err("output cap must be at least 1 byte".to_owned()),
        bytes => Ok(bytes),
    }
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    let mut languages: Vec<_> = config.languages.iter().collect();
    languages.sort_by_key(|(id, _)| *id);

    for (id, lang) in languages {
        let lang_type = if lang.is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        println!("  {:<15} {} ({})", id, lang.name, lang_type);
    }
}

fn show_config(config: &Config) {
    println!("Limits:");
    println!("  Time limit: {}s", config.time_limit);
    println!("  Output cap: {} bytes", config.output_cap);
    println!("  Max file size: {} bytes", config.max_file_size);
    println!(
        "  Max concurrent executions: {}",
        config.max_concurrent_executions
    );
    println!();
    println!("Workspace root: {}", config.workspace_root().display());
    println!();
    println!("Languages configured: {}", config.languages.len());
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
