//! Annotator CLI: annotate text and write a VRT corpus file.
//!
//! Usage:
//!   annotator run --input text.txt [--config path] [--output-dir dir] [--encode]
//!   annotator check [--config path]
//!   annotator engines

use annotator::{
    default_registry, vrt_path, write_vrt, AnnotatorConfig, BridgeCommand, CorpusEncoder,
    CwbEncoder, Orchestrator, RunPlan,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "annotator",
    version,
    about = "Multi-engine linguistic annotation producing VRT corpora"
)]
struct Cli {
    /// Log pipeline progress
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate a text file and write the VRT output
    Run {
        /// Path to the configuration file (YAML or JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Text file to annotate
        #[arg(long)]
        input: PathBuf,
        /// Override the configured output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Process the input in chunks of this many paragraphs
        #[arg(long)]
        chunk_paragraphs: Option<usize>,
        /// Encode the written file with the CWB tools
        #[arg(long)]
        encode: bool,
    },
    /// Validate the configuration and the engine plan without running it
    Check {
        /// Path to the configuration file (YAML or JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List available engines and their processing steps
    Engines,
}

fn load_config(path: Option<PathBuf>) -> Result<AnnotatorConfig, String> {
    let path = path.unwrap_or_else(AnnotatorConfig::default_path);
    AnnotatorConfig::load(&path).map_err(|e| e.to_string())
}

/// Group blank-line separated paragraphs into chunks
fn chunk_paragraphs(text: &str, per_chunk: usize) -> Vec<String> {
    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    paragraphs
        .chunks(per_chunk.max(1))
        .map(|group| group.join("\n\n"))
        .collect()
}

async fn cmd_run(
    config: Option<PathBuf>,
    input: &Path,
    output_dir: Option<PathBuf>,
    chunk_size: Option<usize>,
    encode: bool,
) -> i32 {
    let mut config = match load_config(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if let Some(dir) = output_dir {
        config.paths.output_dir = dir;
    }
    let plan = match RunPlan::from_config(&config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let text = match std::fs::read_to_string(input) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: failed to read {}: {}", input.display(), e);
            return 1;
        }
    };

    let orchestrator = Orchestrator::new(default_registry(Arc::new(config.bridge.command())));
    let result = match chunk_size {
        Some(n) => orchestrator.run_chunked(&plan, &chunk_paragraphs(&text, n)).await,
        None => orchestrator.run(&plan, &text).await,
    };
    let output = match result {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let path = vrt_path(&config.paths.output_dir, config.corpus_name.trim());
    if let Err(e) = write_vrt(&path, &output.lines) {
        eprintln!("Error: {}", e);
        return 1;
    }
    println!(
        "Wrote {} tokens to {}",
        output.lines.next_index(),
        path.display()
    );

    if encode {
        let encoder = CwbEncoder::from_config(&config);
        if let Err(e) = encoder.encode(&path, &output.ptags, &output.stags).await {
            eprintln!("Error: {}", e);
            return 1;
        }
        println!("Encoded corpus '{}'", encoder.corpus_name);
    }
    0
}

fn cmd_check(config: Option<PathBuf>) -> i32 {
    let config = match load_config(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let plan = match RunPlan::from_config(&config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let orchestrator = Orchestrator::new(default_registry(Arc::new(config.bridge.command())));
    if let Err(e) = orchestrator.validate(&plan) {
        eprintln!("Error: {}", e);
        return 1;
    }

    println!("Configuration OK for corpus '{}'", config.corpus_name.trim());
    for (i, job) in plan.jobs().iter().enumerate() {
        let role = if i == 0 { "segment" } else { "augment" };
        println!(
            "  {}. {:<8} {:<8} {}",
            i + 1,
            job.engine,
            role,
            job.steps.join(", ")
        );
    }
    if plan.refine_segmenter {
        println!("  segmenting engine re-runs pretokenized for its layers");
    }
    0
}

fn cmd_engines() -> i32 {
    let registry = default_registry(Arc::new(BridgeCommand::default()));
    println!("{:<8}  {:<22}  STEPS", "ID", "NAME");
    println!("{}", "-".repeat(72));
    for engine in registry.engines() {
        let steps: Vec<&str> = engine.capabilities().iter().map(|c| c.step).collect();
        println!("{:<8}  {:<22}  {}", engine.id(), engine.name(), steps.join(", "));
    }
    0
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "annotator=info"
    } else {
        "annotator=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let code = match cli.command {
        Commands::Run {
            config,
            input,
            output_dir,
            chunk_paragraphs,
            encode,
        } => cmd_run(config, &input, output_dir, chunk_paragraphs, encode).await,
        Commands::Check { config } => cmd_check(config),
        Commands::Engines => cmd_engines(),
    };
    std::process::exit(code);
}
