//! platform-migrate CLI - Inspect transfer configurations and state files.

use clap::{Parser, Subcommand};
use platform_migrate::resource::{Group, Status};
use platform_migrate::transfer::report_entries;
use platform_migrate::{CacheHandle, Config, MigrateError, TransferState};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "platform-migrate")]
#[command(about = "Resumable cross-platform data migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "transfer.yaml")]
    config: PathBuf,

    /// Path to state file for resume capability
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and show the transfer plan
    Validate,

    /// Show the status of a transfer from its state file
    Status {
        /// Only list resources with this status (repeatable)
        #[arg(long = "status", value_parser = parse_status)]
        statuses: Vec<Status>,
    },
}

fn parse_status(s: &str) -> Result<Status, String> {
    s.parse::<Status>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    match &cli.command {
        Commands::Validate => validate(&cli),
        Commands::Status { statuses } => status(&cli, statuses),
    }
}

fn validate(cli: &Cli) -> Result<(), MigrateError> {
    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let types = config.transfer.resource_types()?;
    let root = config.transfer.root_scope()?;
    let hash = config.hash();

    if cli.output_json {
        let plan: Vec<serde_json::Value> = Group::ALL
            .iter()
            .map(|group| {
                let group_types: Vec<&str> = group
                    .types()
                    .iter()
                    .filter(|t| types.contains(*t))
                    .map(|t| t.as_str())
                    .collect();
                serde_json::json!({ "group": group.as_str(), "types": group_types })
            })
            .collect();
        let output = serde_json::json!({
            "valid": true,
            "config_hash": hash,
            "source": config.source.r#type,
            "destination": config.destination.r#type,
            "root": root,
            "plan": plan,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Configuration valid");
    println!("  Source:      {} ({})", config.source.r#type, config.source.endpoint);
    println!(
        "  Destination: {} ({})",
        config.destination.r#type, config.destination.endpoint
    );
    println!("  Config hash: {}", hash);
    if let Some(root) = root {
        println!("  Scoped to:   {} {}", root.resource_type, root.id);
    }
    println!("\nTransfer plan:");
    for group in Group::ALL {
        let group_types: Vec<&str> = group
            .types()
            .iter()
            .filter(|t| types.contains(*t))
            .map(|t| t.as_str())
            .collect();
        if !group_types.is_empty() {
            println!("  {:<10} {}", group.as_str(), group_types.join(" -> "));
        }
    }
    Ok(())
}

fn status(cli: &Cli, statuses: &[Status]) -> Result<(), MigrateError> {
    let path = cli
        .state_file
        .as_ref()
        .ok_or_else(|| MigrateError::Config("--state-file is required for status".into()))?;
    let state = TransferState::load(path)?;
    info!("Loaded state from {:?}", path);

    let cache = CacheHandle::from_snapshot(state.cache.clone());
    let entries = report_entries(&cache, statuses);
    let counters = cache.status_counters();

    if cli.output_json {
        let output = serde_json::json!({
            "run_id": state.run_id,
            "status": state.status,
            "started_at": state.started_at,
            "completed_at": state.completed_at,
            "batches": state.batches,
            "errors": state.errors,
            "warnings": state.warnings,
            "counters": counters,
            "resources": entries,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Run {}: {}", state.run_id, state.status);
    println!("  Started:   {}", state.started_at);
    if let Some(completed_at) = state.completed_at {
        println!("  Finished:  {}", completed_at);
    }
    println!("  Batches:   {}", state.batches);
    println!("  Errors:    {}", state.errors.len());
    println!("  Warnings:  {}", state.warnings.len());

    for (resource_type, counts) in &counters {
        let parts: Vec<String> = counts
            .iter()
            .map(|(status, count)| format!("{}={}", status, count))
            .collect();
        println!("  {:<10} {}", resource_type.as_str(), parts.join(" "));
    }

    if !entries.is_empty() {
        println!("\nResources:");
        for entry in &entries {
            if entry.message.is_empty() {
                println!("  {:<10} {:<24} {}", entry.resource.as_str(), entry.id, entry.status);
            } else {
                println!(
                    "  {:<10} {:<24} {} ({})",
                    entry.resource.as_str(),
                    entry.id,
                    entry.status,
                    entry.message
                );
            }
        }
    }

    for error in &state.errors {
        println!("  error: [{}] {} {}", error.group, error.id, error.message);
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
