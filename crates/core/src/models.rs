use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bounded text segment cut from a source document. The atomic unit of
/// retrieval; `embedding` is empty until the embedding stage fills it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub text: String,
    pub source_file: String,
    pub page_number: Option<u32>,
    pub chunk_index: u64,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl ChunkRecord {
    pub fn meta(&self) -> ChunkMeta {
        ChunkMeta {
            text: self.text.clone(),
            source_file: self.source_file.clone(),
            page_number: self.page_number,
            chunk_index: self.chunk_index,
        }
    }
}

/// Persisted metadata record, stored at the same ordinal position as the
/// chunk's vector in the index file. The two files are rebuilt together and
/// never partially updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMeta {
    pub text: String,
    pub source_file: String,
    pub page_number: Option<u32>,
    pub chunk_index: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContributionStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationDecision {
    Approve,
    Reject,
}

impl ModerationDecision {
    pub fn target_status(self) -> ContributionStatus {
        match self {
            ModerationDecision::Approve => ContributionStatus::Approved,
            ModerationDecision::Reject => ContributionStatus::Rejected,
        }
    }
}

impl std::str::FromStr for ModerationDecision {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "approve" | "approved" => Ok(ModerationDecision::Approve),
            "reject" | "rejected" => Ok(ModerationDecision::Reject),
            other => Err(format!("unknown moderation decision: {other}")),
        }
    }
}

/// A community-submitted knowledge snippet. Never physically deleted;
/// rejection is a status transition so the audit history survives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contribution {
    pub id: Uuid,
    pub text: String,
    pub submitted_by: String,
    pub status: ContributionStatus,
    pub rating: f32,
    pub created_at: DateTime<Utc>,
}

impl Contribution {
    pub fn new(text: impl Into<String>, submitted_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            submitted_by: submitted_by.into(),
            status: ContributionStatus::Pending,
            rating: 0.0,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResultOrigin {
    Document,
    Contribution,
}

/// Citation entry returned alongside the answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub name: String,
    pub page: Option<u32>,
    pub origin: ResultOrigin,
    pub similarity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
}

/// A merged, ranked candidate. Transient: produced per query and discarded
/// after the response is assembled.
#[derive(Debug, Clone)]
pub struct RankedPassage {
    pub text: String,
    pub source: SourceRef,
    pub similarity: f64,
    pub composite: f64,
    pub origin: ResultOrigin,
}

/// Bounded context block plus citations, ready for the answer composer.
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub context_block: String,
    pub sources: Vec<SourceRef>,
}

/// Response envelope for the query entrypoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub sources: Vec<SourceRef>,
    pub processing_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub max_results: usize,
    pub similarity_threshold: f32,
    pub contribution_limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 5,
            similarity_threshold: 0.3,
            contribution_limit: 5,
        }
    }
}

/// Merge/rank policy knobs. The defaults are documented policy choices, not
/// discovered optima; callers may tune them.
#[derive(Debug, Clone, Copy)]
pub struct RankingConfig {
    /// Weight of cosine similarity in the composite score.
    pub similarity_weight: f64,
    /// Weight of the normalized quality rating in the composite score.
    pub rating_weight: f64,
    /// Trust discount applied to contribution-sourced candidates.
    pub contribution_origin_factor: f64,
    /// Rating at or above which a contribution earns full trust.
    pub high_confidence_rating: f32,
    /// Composite scores within this band are treated as ties; document
    /// origin wins the tie, then higher rating.
    pub epsilon: f64,
    /// Word-overlap ratio at or above which two passages are duplicates.
    pub dedup_overlap: f64,
    /// Maximum total characters in the assembled context block.
    pub context_char_budget: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            similarity_weight: 0.8,
            rating_weight: 0.2,
            contribution_origin_factor: 0.9,
            high_confidence_rating: 4.5,
            epsilon: 0.02,
            dedup_overlap: 0.9,
            context_char_budget: 6_000,
        }
    }
}
