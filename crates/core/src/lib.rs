pub mod chunking;
pub mod composer;
pub mod contributions;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod service;

pub use chunking::{chunk_pages, normalize_whitespace, ChunkingConfig};
pub use composer::{AnswerComposer, GenerativeModel, HttpGenerativeModel};
pub use contributions::{ContributionStore, ScoredContribution};
pub use embeddings::{Embedder, HashedTokenEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{ContributionError, EmbeddingError, IngestError, QueryError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use index::{IndexLock, ScoredChunk, SearchIndex};
pub use ingest::{discover_pdf_files, ingest_folder, IngestionReport, SkippedPdf};
pub use models::{
    ChunkMeta, ChunkRecord, Contribution, ContributionStatus, IngestionOptions,
    ModerationDecision, QueryResponse, RankedPassage, RankingConfig, ResultOrigin,
    RetrievedContext, SearchOptions, SourceRef,
};
pub use orchestrator::{composite_score, SearchOrchestrator};
pub use service::QueryService;
