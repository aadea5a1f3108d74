use chrono::Utc;
use clap::{Parser, Subcommand};
use doc_qa_core::{
    ingest_folder, AnswerComposer, ContributionStore, HashedTokenEmbedder, HttpGenerativeModel,
    IngestionOptions, ModerationDecision, QueryService, RankingConfig, SearchOptions,
    SearchOrchestrator,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "doc-qa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the index, metadata, and contribution files.
    #[arg(long, default_value = "./doc-qa-data")]
    data_dir: PathBuf,

    /// Generative model endpoint URL.
    #[arg(long, default_value = "http://localhost:11434/api/generate")]
    model_url: String,

    /// Generative model name.
    #[arg(long, default_value = "llama3")]
    model: String,

    /// API key for the model endpoint, if it requires one.
    #[arg(long, env = "DOC_QA_API_KEY")]
    api_key: Option<String>,

    /// Per-call timeout for the model endpoint, in seconds.
    #[arg(long, default_value = "60")]
    model_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a folder of PDFs and rebuild the search index.
    Ingest {
        /// Folder scanned recursively for PDF files.
        #[arg(long)]
        folder: PathBuf,
        /// Chunk size in characters.
        #[arg(long, default_value = "1000")]
        chunk_size: usize,
        /// Overlap between consecutive chunks, in characters.
        #[arg(long, default_value = "200")]
        chunk_overlap: usize,
    },
    /// Ask a question against the indexed documents and contributions.
    Ask {
        /// The question text.
        #[arg(long)]
        question: String,
        /// Maximum number of passages in the answer context.
        #[arg(long, default_value = "5")]
        max_results: usize,
        /// Minimum cosine similarity for a document chunk to qualify.
        #[arg(long, default_value = "0.3")]
        similarity_threshold: f32,
    },
    /// Submit a community contribution (starts as pending).
    Contribute {
        /// The knowledge snippet.
        #[arg(long)]
        text: String,
        /// Name or handle of the submitter.
        #[arg(long)]
        submitted_by: String,
    },
    /// Review a contribution: approve or reject, optionally set a rating.
    Moderate {
        /// Contribution id.
        #[arg(long)]
        id: Uuid,
        /// Decision: approve or reject.
        #[arg(long)]
        decision: ModerationDecision,
        /// Quality rating in [0, 5], applied after the decision.
        #[arg(long)]
        rating: Option<f32>,
    },
    /// List contributions.
    Contributions {
        /// Include pending and rejected entries, not just approved ones.
        #[arg(long, default_value_t = false)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let Cli {
        command,
        data_dir,
        model_url,
        model,
        api_key,
        model_timeout_secs,
    } = Cli::parse();
    let index_path = data_dir.join("index.json");
    let meta_path = data_dir.join("metadata.json");
    let contributions_path = data_dir.join("contributions.json");

    match command {
        Command::Ingest {
            folder,
            chunk_size,
            chunk_overlap,
        } => {
            let embedder = HashedTokenEmbedder::default();
            let options = IngestionOptions {
                chunk_size,
                chunk_overlap,
            };

            info!(folder = %folder.display(), "ingesting pdf folder");
            let report = ingest_folder(&folder, &embedder, options, &index_path, &meta_path)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            for skipped in &report.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
            }

            if report.chunk_count == 0 {
                println!("0 chunks ingested (all files were skipped or empty)");
            } else {
                println!(
                    "{} chunks from {} documents indexed at {}",
                    report.chunk_count,
                    report.document_count,
                    Utc::now().to_rfc3339()
                );
            }
        }
        Command::Ask {
            question,
            max_results,
            similarity_threshold,
        } => {
            let generative = HttpGenerativeModel::new(
                &model_url,
                model,
                api_key,
                Duration::from_secs(model_timeout_secs),
            )
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let service = build_service(
                generative,
                &contributions_path,
                max_results,
                similarity_threshold,
            )?;
            if let Err(error) = service.orchestrator().load_index(&index_path, &meta_path) {
                warn!(error = %error, "index not loaded");
            }

            let response = service.ask(&question).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Contribute { text, submitted_by } => {
            let store = open_store(&contributions_path)?;
            let entry = store
                .submit(text, submitted_by)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("submitted contribution {} (status: pending)", entry.id);
        }
        Command::Moderate {
            id,
            decision,
            rating,
        } => {
            let store = open_store(&contributions_path)?;
            let entry = store
                .moderate(id, decision)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("contribution {} is now {:?}", entry.id, entry.status);

            if let Some(rating) = rating {
                let rated = store
                    .rate(id, rating)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
                println!("contribution {} rated {:.1}/5.0", rated.id, rated.rating);
            }
        }
        Command::Contributions { all } => {
            let store = open_store(&contributions_path)?;
            for entry in store.list(all) {
                println!(
                    "{} [{:?}] rating={:.1} by={} at={}\n  {}",
                    entry.id,
                    entry.status,
                    entry.rating,
                    entry.submitted_by,
                    entry.created_at.to_rfc3339(),
                    entry.text
                );
            }
        }
    }

    Ok(())
}

fn build_service(
    model: HttpGenerativeModel,
    contributions_path: &Path,
    max_results: usize,
    similarity_threshold: f32,
) -> anyhow::Result<QueryService<HashedTokenEmbedder, HttpGenerativeModel>> {
    let store = open_store(contributions_path)?;
    let orchestrator = SearchOrchestrator::new(
        HashedTokenEmbedder::default(),
        store,
        RankingConfig::default(),
    );

    let composer =
        AnswerComposer::new(model).map_err(|error| anyhow::anyhow!(error.to_string()))?;

    let options = SearchOptions {
        max_results,
        similarity_threshold,
        ..SearchOptions::default()
    };
    Ok(QueryService::new(orchestrator, composer, options))
}

fn open_store(path: &Path) -> anyhow::Result<Arc<ContributionStore>> {
    let store =
        ContributionStore::open(path).map_err(|error| anyhow::anyhow!(error.to_string()))?;
    Ok(Arc::new(store))
}
