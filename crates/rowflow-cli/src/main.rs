//! rowflow CLI: validate, explain, and run YAML pipelines.

use clap::{Parser, Subcommand};
use rowflow_core::prelude::{EngineConfig, ErrorPolicy};
use rowflow_exec::{Engine, PipelineResult};
use rowflow_planner::{explain, parse_yaml_pipeline, PipelineConfig};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rowflow")]
#[command(about = "rowflow: streaming row pipelines on bounded row sets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a pipeline from a YAML file
    Run {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,

        #[command(flatten)]
        overrides: Overrides,

        /// Print the run result as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Validate a pipeline YAML file (syntax and graph checks)
    Validate {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,
    },

    /// Show the units and row sets a pipeline expands into
    Explain {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Command-line settings; these win over the pipeline file and the environment.
#[derive(clap::Args, Debug, Default)]
struct Overrides {
    /// Records buffered per row set
    #[arg(long)]
    rowset_capacity: Option<usize>,

    /// Blocking put timeout (ms)
    #[arg(long)]
    put_timeout_ms: Option<u64>,

    /// Single-input retry wait (ms)
    #[arg(long)]
    get_timeout_ms: Option<u64>,

    /// Default round-robin block size
    #[arg(long)]
    round_robin_block_rows: Option<usize>,

    /// Keep unaffected branches running after a unit fails
    #[arg(long)]
    continue_on_error: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            pipeline,
            overrides,
            json,
        } => match run_pipeline(&pipeline, &overrides, json) {
            Ok(true) => {}
            Ok(false) => std::process::exit(1),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        Commands::Validate { pipeline } => {
            if let Err(e) = validate_pipeline(&pipeline) {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
            println!("✓ Pipeline is valid");
        }
        Commands::Explain {
            pipeline,
            overrides,
        } => {
            if let Err(e) = explain_pipeline(&pipeline, &overrides) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

/// Returns whether the run succeeded.
fn run_pipeline(
    pipeline_path: &PathBuf,
    overrides: &Overrides,
    json: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let yaml_content = fs::read_to_string(pipeline_path)?;
    let parsed = parse_yaml_pipeline(&yaml_content)?;
    let config = resolve_config(&parsed.config, overrides);
    config.validate()?;

    tracing::info!(
        pipeline = %parsed.graph.name,
        steps = parsed.graph.steps.len(),
        capacity = config.rowset_capacity,
        "starting pipeline"
    );
    let engine = Engine::new(config);
    let result = engine.run(&parsed.graph)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }
    Ok(result.is_success())
}

fn print_summary(result: &PipelineResult) {
    if result.is_success() {
        println!("✓ Pipeline executed successfully");
    } else if let Some(err) = &result.first_error {
        println!("✗ Pipeline failed: {}", err);
    } else {
        println!("✗ Pipeline stopped before completion");
    }
    println!("  Duration: {}ms", result.manifest.duration_ms());
    println!("  Graph hash: {}", result.manifest.graph_hash.to_hex());
    println!();
    println!(
        "  {:<24} {:>8} {:>10} {:>10} {:>10} {:>7}",
        "unit", "state", "read", "written", "rejected", "errors"
    );
    for unit in &result.units {
        println!(
            "  {:<24} {:>8} {:>10} {:>10} {:>10} {:>7}",
            unit.unit.to_string(),
            unit.state.to_string(),
            unit.read,
            unit.written,
            unit.rejected,
            unit.errors
        );
    }
    let totals = result.totals();
    println!(
        "  {:<24} {:>8} {:>10} {:>10} {:>10} {:>7}",
        "total", "", totals.read, totals.written, totals.rejected, totals.errors
    );
}

fn validate_pipeline(pipeline_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let yaml_content = fs::read_to_string(pipeline_path)?;
    let _ = parse_yaml_pipeline(&yaml_content)?;
    Ok(())
}

fn explain_pipeline(
    pipeline_path: &PathBuf,
    overrides: &Overrides,
) -> Result<(), Box<dyn std::error::Error>> {
    let yaml_content = fs::read_to_string(pipeline_path)?;
    let parsed = parse_yaml_pipeline(&yaml_content)?;
    let config = resolve_config(&parsed.config, overrides);
    print!("{}", explain(&parsed.graph, &config)?);
    Ok(())
}

/// defaults < environment < pipeline file < command line
fn resolve_config(doc: &PipelineConfig, overrides: &Overrides) -> EngineConfig {
    let mut config = EngineConfig::from_env();
    apply_pipeline_config(&mut config, doc);
    apply_cli_overrides(&mut config, overrides);
    config
}

fn apply_pipeline_config(cfg: &mut EngineConfig, doc: &PipelineConfig) {
    if let Some(v) = doc.rowset_capacity {
        cfg.rowset_capacity = v;
    }
    if let Some(v) = doc.put_timeout_ms {
        cfg.put_timeout_ms = v;
    }
    if let Some(v) = doc.get_timeout_ms {
        cfg.get_timeout_ms = v;
    }
    if let Some(v) = doc.round_robin_block_rows {
        cfg.round_robin_block_rows = v;
    }
    if let Some(v) = doc.error_policy {
        cfg.error_policy = v;
    }
}

fn apply_cli_overrides(cfg: &mut EngineConfig, cli: &Overrides) {
    if let Some(v) = cli.rowset_capacity {
        cfg.rowset_capacity = v;
    }
    if let Some(v) = cli.put_timeout_ms {
        cfg.put_timeout_ms = v;
    }
    if let Some(v) = cli.get_timeout_ms {
        cfg.get_timeout_ms = v;
    }
    if let Some(v) = cli.round_robin_block_rows {
        cfg.round_robin_block_rows = v;
    }
    if cli.continue_on_error {
        cfg.error_policy = ErrorPolicy::ContinueOnError;
    }
}
