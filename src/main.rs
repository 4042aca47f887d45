//! dagrecovery CLI
//!
//! Imports files into a local block repository, encodes DAGs for
//! recoverability and repairs them after block loss.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         dagrecovery                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │    Path      │───▶│   Strategy   │───▶│  Retention   │       │
//! │  │   Resolver   │    │   (encode)   │    │    Swap      │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! │          └──────────── FsDagStore / FsPinSet ──────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dagrecovery::adapters::{FsDagStore, FsPinSet, LinkPathResolver};
use dagrecovery::domain::ports::RetentionManager;
use dagrecovery::importer::Importer;
use dagrecovery::response::{
    AddResponse, EncodeResponse, OutputFormat, RecoverResponse, Render, SwapResponse,
};
use dagrecovery::{ContentId, EncodeOrchestrator, EncodeRequest, RecoveryConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// dagrecovery - Erasure-coded recoverability for merkle-DAGs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Repository directory
    #[arg(long, env = "DAGRECOVERY_REPO", default_value = ".dagrecovery", global = true)]
    repo: PathBuf,

    /// YAML configuration file
    #[arg(long, env = "DAGRECOVERY_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    /// Output encoding
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    enc: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a file as a chunked DAG and pin it
    Add {
        /// File to import
        file: PathBuf,
    },

    /// Encode a DAG for recoverability and move the pin to the encoded root
    Encode {
        /// Path to encode; read from stdin when omitted
        path: Option<String>,

        /// Number of lost blocks per group that can be recovered
        #[arg(short = 'r', long)]
        recoverability: Option<u32>,

        /// Encoding strategy (reed-solomon, entangle)
        #[arg(short = 's', long = "encode-strategy")]
        encode_strategy: Option<String>,
    },

    /// Rebuild missing blocks below an encoded root
    Recover {
        /// Encoded root
        cid: String,
    },

    /// Retry moving the pin from an original root to its encoded root
    SwapRetention {
        /// Encoded root to pin
        encoded: String,

        /// Original root to unpin
        original: String,
    },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = load_config(args.config.as_deref())?;
    debug!(repo = %args.repo.display(), ?config, "Starting");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let dag = Arc::new(
        FsDagStore::open(&args.repo)
            .with_context(|| format!("Failed to open repository {}", args.repo.display()))?,
    );
    let pins = Arc::new(FsPinSet::open(&args.repo)?);

    let output = match args.command {
        Command::Add { file } => {
            let importer = Importer::from_config(dag.clone(), &config)?;
            let reader = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let imported = importer.import_reader(reader).await?;
            pins.add_recursive(&imported.root).await?;
            info!(root = %imported.root, blocks = imported.blocks, "Added");

            AddResponse {
                cid: imported.root.to_string(),
                size: imported.bytes,
            }
            .render(args.enc)?
        }

        Command::Encode {
            path,
            recoverability,
            encode_strategy,
        } => {
            let path = match path {
                Some(path) => path,
                None => read_path_from_stdin().await?,
            };
            let mut request = EncodeRequest::with_config(path, &config);
            if let Some(r) = recoverability {
                request = request.recoverability(r);
            }
            if let Some(strategy) = encode_strategy {
                request = request.strategy(strategy);
            }

            let resolver = Arc::new(LinkPathResolver::new(dag.clone()));
            let orchestrator = EncodeOrchestrator::new(dag, resolver, pins, config)?;
            let result = orchestrator.encode(request, &cancel).await?;

            EncodeResponse::new(&result.encoded_root).render(args.enc)?
        }

        Command::Recover { cid } => {
            let root: ContentId = cid.parse()?;
            let resolver = Arc::new(LinkPathResolver::new(dag.clone()));
            let orchestrator = EncodeOrchestrator::new(dag, resolver, pins, config)?;
            let report = orchestrator.recover(&root, &cancel).await?;

            RecoverResponse {
                restored: report.restored.iter().map(ToString::to_string).collect(),
                intact: report.intact,
            }
            .render(args.enc)?
        }

        Command::SwapRetention { encoded, original } => {
            let encoded: ContentId = encoded.parse()?;
            let original: ContentId = original.parse()?;
            let resolver = Arc::new(LinkPathResolver::new(dag.clone()));
            let orchestrator = EncodeOrchestrator::new(dag, resolver, pins, config)?;
            let was_retained = orchestrator.swap_retention(&encoded, &original).await?;

            SwapResponse {
                pinned: encoded.to_string(),
                unpinned: was_retained.then(|| original.to_string()),
            }
            .render(args.enc)?
        }
    };

    println!("{}", output);
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn load_config(path: Option<&Path>) -> anyhow::Result<RecoveryConfig> {
    match path {
        Some(path) => RecoveryConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display())),
        None => Ok(RecoveryConfig::default()),
    }
}

async fn read_path_from_stdin() -> anyhow::Result<String> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read path from stdin")?;
    let path = input.trim();
    if path.is_empty() {
        bail!("No path given on the command line or stdin");
    }
    Ok(path.to_string())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // stdout carries command output only
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
