//! # studyrag CLI
//!
//! Command-line front end for the studyrag pipeline. Loads a TOML
//! configuration, wires the embedding, vector-store, and generation
//! capabilities together, and exposes the indexing and query entry
//! points.
//!
//! ## Usage
//!
//! ```bash
//! studyrag --config ./studyrag.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `studyrag index <file>` | Index content items from a JSON file |
//! | `studyrag reindex <file>` | Delete stale vectors, then index the updated items |
//! | `studyrag query "<text>"` | Ask a question over the indexed content |
//! | `studyrag similar "<text>"` | Find similar passages without generation |
//! | `studyrag stats` | Show vector counts, dimension, and namespaces |
//! | `studyrag delete <content-id>` | Remove all vectors for a content id |

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use studyrag::config::{load_config, Config};
use studyrag::embedding::{EmbeddingService, RestEmbeddingClient};
use studyrag::generation::RestGenerationClient;
use studyrag::indexer::ContentIndexer;
use studyrag::models::{ContentItem, RagQuery};
use studyrag::rag::RagService;
use studyrag::store::memory::MemoryVectorStore;
use studyrag::store::rest::RestVectorStore;
use studyrag::store::VectorStore;
use studyrag::Result;

/// studyrag — RAG pipeline for educational content.
#[derive(Parser)]
#[command(
    name = "studyrag",
    about = "Index educational content and answer questions grounded in it",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./studyrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index content items from a JSON file (one item or an array).
    Index {
        file: PathBuf,
        /// Override the configured chunk size.
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Override the configured chunk overlap.
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },
    /// Re-index content items, replacing any previously indexed vectors.
    Reindex { file: PathBuf },
    /// Answer a question grounded in the indexed content.
    Query {
        text: String,
        /// Restrict retrieval to one subject.
        #[arg(long)]
        subject: Option<String>,
        /// Number of chunks to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
        /// Minimum mean similarity required before generating.
        #[arg(long)]
        confidence_threshold: Option<f32>,
    },
    /// Find similar passages without invoking generation.
    Similar {
        text: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Show index statistics.
    Stats,
    /// Delete all indexed vectors for a content id.
    Delete { content_id: String },
}

fn build_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    match config.vector.backend.as_str() {
        "rest" => Ok(Arc::new(RestVectorStore::new(
            &config.vector,
            config.embedding.dims,
        )?)),
        _ => Ok(Arc::new(MemoryVectorStore::new(config.embedding.dims))),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;

    let embedder = Arc::new(EmbeddingService::new(
        Arc::new(RestEmbeddingClient::new(&config.embedding)?),
        config.embedding.batch_size,
    ));
    let store = build_store(&config)?;

    match cli.command {
        Commands::Index {
            file,
            chunk_size,
            chunk_overlap,
        } => {
            let items = read_items(&file)?;
            let indexer = ContentIndexer::new(embedder, store, config.vector.namespace.clone());
            let report = indexer
                .index_batch(
                    &items,
                    chunk_size.unwrap_or(config.chunking.chunk_size),
                    chunk_overlap.unwrap_or(config.chunking.chunk_overlap),
                )
                .await;
            print_json(&report);
        }
        Commands::Reindex { file } => {
            let items = read_items(&file)?;
            let indexer = ContentIndexer::new(embedder, store, config.vector.namespace.clone());
            for item in &items {
                let report = indexer
                    .reindex_with(&item.id, item, config.chunking.clone())
                    .await?;
                print_json(&report);
            }
        }
        Commands::Query {
            text,
            subject,
            top_k,
            confidence_threshold,
        } => {
            let generator = Arc::new(RestGenerationClient::new(&config.generation)?);
            let service =
                RagService::new(embedder, store, generator, config.vector.namespace.clone());
            let mut request = RagQuery::new(text);
            request.subject = subject;
            request.top_k = top_k.unwrap_or(config.retrieval.top_k);
            request.confidence_threshold =
                confidence_threshold.unwrap_or(config.retrieval.confidence_threshold);
            let response = service.query(&request).await?;
            print_json(&response);
        }
        Commands::Similar { text, top_k } => {
            let generator = Arc::new(RestGenerationClient::new(&config.generation)?);
            let service =
                RagService::new(embedder, store, generator, config.vector.namespace.clone());
            let results = service
                .find_similar(&text, top_k.unwrap_or(config.retrieval.top_k), None)
                .await?;
            print_json(&results);
        }
        Commands::Stats => {
            let stats = store.stats(None).await?;
            print_json(&stats);
        }
        Commands::Delete { content_id } => {
            let indexer = ContentIndexer::new(embedder, store, config.vector.namespace.clone());
            indexer.delete_index(&content_id).await?;
            println!("deleted index for {}", content_id);
        }
    }

    Ok(())
}

/// Read one content item or an array of them from a JSON file.
fn read_items(path: &PathBuf) -> Result<Vec<ContentItem>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        studyrag::RagError::Configuration(format!(
            "failed to read content file {}: {}",
            path.display(),
            e
        ))
    })?;
    if let Ok(items) = serde_json::from_str::<Vec<ContentItem>>(&content) {
        return Ok(items);
    }
    serde_json::from_str::<ContentItem>(&content)
        .map(|item| vec![item])
        .map_err(|e| {
            studyrag::RagError::Configuration(format!("failed to parse content file: {}", e))
        })
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("failed to serialize output: {}", e),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            if e.is_retryable() {
                eprintln!("(transient failure, retrying may succeed)");
            }
            ExitCode::FAILURE
        }
    }
}
