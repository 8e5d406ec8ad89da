//! PharmaKG — AI enrichment of the drug/target knowledge graph.
//! Entry point for the `pharmakg` command-line tool.

mod config;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pharmakg_enrich::EnrichmentPipeline;
use pharmakg_llm::build_backend;
use pharmakg_store::{GraphStore, MemoryGraphStore};

use crate::config::{Config, StoreBackend, StoreConfig};

#[derive(Parser)]
#[command(name = "pharmakg", version, about = "Classify drug-target edges and predict downstream cascades")]
struct Cli {
    /// Config file (default: $PHARMAKG_CONFIG or ./pharmakg.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify one target, or several as a sequential batch
    Classify {
        drug: String,
        #[arg(required = true)]
        targets: Vec<String>,
        /// Free-text context added to the prompt
        #[arg(long)]
        context: Option<String>,
        /// Reclassify even if a classification is stored
        #[arg(long)]
        force: bool,
    },
    /// Predict the downstream effect cascade of a drug on a target
    Cascade {
        drug: String,
        target: String,
        /// 1 = direct effects only, up to 3
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=3))]
        depth: Option<u8>,
        #[arg(long)]
        context: Option<String>,
        /// Predict again even if a cascade is stored
        #[arg(long)]
        force: bool,
    },
    /// Show what the graph holds for a pair
    Status { drug: String, target: String },
}

async fn build_store(cfg: &StoreConfig) -> anyhow::Result<Arc<dyn GraphStore>> {
    match cfg.backend {
        StoreBackend::Memory => {
            warn!("Using the in-memory store; results are not kept after exit");
            let store = match &cfg.seed_file {
                Some(path) => MemoryGraphStore::from_seed_file(path)
                    .await
                    .with_context(|| format!("loading seed file {path}"))?,
                None => MemoryGraphStore::new(),
            };
            Ok(Arc::new(store))
        }
        #[cfg(feature = "neo4j")]
        StoreBackend::Neo4j => {
            use pharmakg_store::{Neo4jConfig, Neo4jGraphStore};
            let store = Neo4jGraphStore::connect(Neo4jConfig {
                uri: cfg.uri.clone(),
                username: cfg.username.clone(),
                password: cfg.resolved_password(),
                database: cfg.database.clone(),
                ..Neo4jConfig::default()
            })
            .await?;
            info!("Connected to Neo4j at {}", cfg.uri);
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "neo4j"))]
        StoreBackend::Neo4j => {
            anyhow::bail!("store.backend = \"neo4j\" requires building with `--features neo4j`")
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pharmakg=debug,info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_else(|e| {
            warn!("{e}");
            warn!("Falling back to default configuration.");
            Config::default()
        }),
    };
    info!(
        "Configuration loaded. Provider: {:?}, model: {}, store: {:?}",
        config.llm.provider, config.llm.model, config.store.backend
    );

    let backend = build_backend(config.llm.backend_config())?;
    let store = build_store(&config.store).await?;
    let enrichment = config.enrichment_config(backend.is_local());
    let pipeline = EnrichmentPipeline::new(store, backend, enrichment);
    info!(
        predicted_by = %pipeline.config().predicted_by,
        delay_ms = pipeline.config().inter_call_delay.as_millis() as u64,
        "Enrichment pipeline ready"
    );

    match cli.command {
        Command::Classify { drug, targets, context, force } => {
            if let [target] = targets.as_slice() {
                let result = pipeline.classify(&drug, target, context.as_deref(), force).await?;
                print_json(&result)?;
            } else {
                let result = pipeline
                    .batch_classify(&drug, &targets, context.as_deref(), force)
                    .await;
                print_json(&result)?;
            }
        }
        Command::Cascade { drug, target, depth, context, force } => {
            let depth = depth.unwrap_or(config.enrichment.default_cascade_depth);
            let result = pipeline
                .predict_cascade(&drug, &target, depth, context.as_deref(), force)
                .await?;
            print_json(&result)?;
        }
        Command::Status { drug, target } => {
            print_json(&pipeline.status(&drug, &target).await?)?;
        }
    }

    Ok(())
}
