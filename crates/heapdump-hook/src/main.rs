//! heapdump-hook CLI
//!
//! Runs the Alertmanager webhook that captures heap dumps, and offers a few
//! commands for inspecting its dedup state and naming convention.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use heapdump_hook::dedup::within_window;
use heapdump_hook::{FileStore, HookConfig, ServerState, StateStore, SuccessCriterion};

/// Alertmanager webhook that captures one heap dump per instance per dedup window
#[derive(Parser)]
#[command(name = "heapdump-hook")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server
    Serve {
        /// Address to bind to
        #[arg(long, env = "HEAPDUMP_ADDR", default_value = "0.0.0.0:8060")]
        addr: String,

        #[command(flatten)]
        opts: ConfigArgs,
    },
    /// Show the persisted dedup record
    State {
        #[command(flatten)]
        opts: ConfigArgs,
    },
    /// Show which container an instance name resolves to
    CheckTarget {
        /// Instance label value (e.g. iems-goeu-job-59cb8dbcd4-c68tb)
        instance: String,

        #[command(flatten)]
        opts: ConfigArgs,
    },
}

/// Configuration file plus per-field overrides.
#[derive(Args)]
struct ConfigArgs {
    /// Path to JSON config file
    #[arg(long, env = "HEAPDUMP_CONFIG")]
    config: Option<PathBuf>,

    /// File holding the dedup record
    #[arg(long, env = "HEAPDUMP_STATE_FILE")]
    state_file: Option<PathBuf>,

    /// Heap dump script
    #[arg(long, env = "HEAPDUMP_SCRIPT")]
    script: Option<PathBuf>,

    /// Namespace passed to the heap dump script
    #[arg(long, env = "HEAPDUMP_NAMESPACE")]
    namespace: Option<String>,

    /// Dedup window in seconds
    #[arg(long, env = "HEAPDUMP_WINDOW_SECS")]
    window_secs: Option<u64>,

    /// How a script run is judged successful
    #[arg(long, value_enum, env = "HEAPDUMP_SUCCESS_CRITERION")]
    success_criterion: Option<SuccessCriterion>,
}

impl ConfigArgs {
    fn load(self) -> Result<HookConfig> {
        let mut config = match &self.config {
            Some(path) => HookConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => HookConfig::default(),
        };

        if let Some(state_file) = self.state_file {
            config.state_file = state_file;
        }
        if let Some(script) = self.script {
            config.script_path = script;
        }
        if let Some(namespace) = self.namespace {
            config.namespace = namespace;
        }
        if let Some(window_secs) = self.window_secs {
            config.dedup_window_secs = window_secs;
        }
        if let Some(criterion) = self.success_criterion {
            config.success_criterion = criterion;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("heapdump_hook=debug,tower_http=debug,info")
        } else {
            EnvFilter::new("heapdump_hook=info,tower_http=info,warn")
        }
    });

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match cli.command {
        Commands::Serve { addr, opts } => run_serve_command(&addr, opts.load()?).await,
        Commands::State { opts } => run_state_command(&opts.load()?).await,
        Commands::CheckTarget { instance, opts } => {
            run_check_target_command(&instance, &opts.load()?);
            Ok(())
        }
    }
}

async fn run_serve_command(addr: &str, config: HookConfig) -> Result<()> {
    println!("{}", "═".repeat(60).cyan());
    println!("{}", "HEAP DUMP WEBHOOK".cyan().bold());
    println!("{}", "═".repeat(60).cyan());
    println!();
    println!("  Address:    {}", addr.green());
    println!("  Alert:      {}", config.alert_name.green());
    println!("  Namespace:  {}", config.namespace.green());
    println!("  Script:     {}", config.script_path.display());
    println!("  State file: {}", config.state_file.display());
    println!("  Window:     {}s", config.dedup_window_secs);
    println!();

    let state = Arc::new(ServerState::from_config(config).await);
    heapdump_hook::run_server(state, addr)
        .await
        .context("Webhook server failed")
}

async fn run_state_command(config: &HookConfig) -> Result<()> {
    let store = FileStore::new(&config.state_file);
    let record = store
        .load()
        .await
        .with_context(|| format!("Failed to read {}", config.state_file.display()))?;

    if record.is_empty() {
        println!("No handled alerts in {}", config.state_file.display());
        return Ok(());
    }

    let now = Utc::now();
    let window = config.dedup_window();
    for (key, last) in &record {
        let age_mins = (now - *last).num_minutes();
        let state = if within_window(*last, now, window) {
            "suppressed".yellow()
        } else {
            "eligible".green()
        };
        println!("{key:<48} {} ({age_mins}m ago) {state}", last.to_rfc3339());
    }
    Ok(())
}

fn run_check_target_command(instance: &str, config: &HookConfig) {
    match config.target.resolve(instance) {
        Some(target) => println!("{} -> {}", instance, target.to_string().green()),
        None => println!(
            "{} -> {} (expected prefixes {:?}, {} segments)",
            instance,
            "no match".red(),
            config.target.prefixes,
            config.target.segments
        ),
    }
}
