use crate::contributions::ContributionStore;
use crate::embeddings::Embedder;
use crate::error::QueryError;
use crate::index::SearchIndex;
use crate::models::{
    RankedPassage, RankingConfig, ResultOrigin, RetrievedContext, SearchOptions, SourceRef,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Blends cosine similarity with provenance trust. Document chunks carry
/// full trust (their rating term is 1.0); contributions bring their own
/// moderated rating, discounted unless the rating clears the
/// high-confidence bar.
pub fn composite_score(
    similarity: f64,
    origin: ResultOrigin,
    rating: Option<f32>,
    config: &RankingConfig,
) -> f64 {
    let (normalized_rating, origin_factor) = match origin {
        ResultOrigin::Document => (1.0, 1.0),
        ResultOrigin::Contribution => {
            let rating = rating.unwrap_or(0.0);
            let factor = if rating >= config.high_confidence_rating {
                1.0
            } else {
                config.contribution_origin_factor
            };
            ((rating / 5.0) as f64, factor)
        }
    };

    similarity * config.similarity_weight
        + normalized_rating * config.rating_weight * origin_factor
}

/// Merges document hits and contribution hits into one ranked, deduplicated
/// candidate list and assembles the bounded context block. Holds the index
/// as an immutable value behind a swappable reference: a rebuild installs a
/// whole new index, concurrent readers see either the old one or the new
/// one in full.
pub struct SearchOrchestrator<E: Embedder> {
    embedder: E,
    index: RwLock<Option<Arc<SearchIndex>>>,
    contributions: Arc<ContributionStore>,
    ranking: RankingConfig,
}

impl<E: Embedder> SearchOrchestrator<E> {
    pub fn new(embedder: E, contributions: Arc<ContributionStore>, ranking: RankingConfig) -> Self {
        Self {
            embedder,
            index: RwLock::new(None),
            contributions,
            ranking,
        }
    }

    /// Atomically swaps in a freshly built index.
    pub fn install_index(&self, index: SearchIndex) {
        let mut slot = self
            .index
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(Arc::new(index));
    }

    /// Loads persisted artifacts and swaps them in.
    pub fn load_index(&self, index_path: &Path, meta_path: &Path) -> Result<(), QueryError> {
        let index = SearchIndex::load(index_path, meta_path)?;
        self.install_index(index);
        Ok(())
    }

    fn current_index(&self) -> Result<Arc<SearchIndex>, QueryError> {
        let slot = self
            .index
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.clone()
            .ok_or_else(|| QueryError::IndexNotFound("no index loaded".to_string()))
    }

    pub fn retrieve(
        &self,
        question: &str,
        opts: SearchOptions,
    ) -> Result<RetrievedContext, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::Request("question is empty".to_string()));
        }

        let index = self.current_index()?;
        let query_vector = self.embedder.embed(question)?;

        // Over-fetch so the threshold filter and dedup still leave enough
        // candidates to fill max_results.
        let fetch = opts.max_results.saturating_mul(2).max(opts.max_results);
        let document_hits = index.search(&query_vector, fetch);

        let mut passages: Vec<RankedPassage> = document_hits
            .into_iter()
            .filter(|hit| hit.similarity >= opts.similarity_threshold)
            .map(|hit| {
                let similarity = hit.similarity as f64;
                RankedPassage {
                    composite: composite_score(
                        similarity,
                        ResultOrigin::Document,
                        None,
                        &self.ranking,
                    ),
                    source: SourceRef {
                        name: hit.meta.source_file.clone(),
                        page: hit.meta.page_number,
                        origin: ResultOrigin::Document,
                        similarity,
                        rating: None,
                    },
                    text: hit.meta.text,
                    similarity,
                    origin: ResultOrigin::Document,
                }
            })
            .collect();

        for scored in self.contributions.query(question, opts.contribution_limit) {
            let rating = scored.contribution.rating;
            passages.push(RankedPassage {
                composite: composite_score(
                    scored.score,
                    ResultOrigin::Contribution,
                    Some(rating),
                    &self.ranking,
                ),
                source: SourceRef {
                    name: "community contribution".to_string(),
                    page: None,
                    origin: ResultOrigin::Contribution,
                    similarity: scored.score,
                    rating: Some(rating),
                },
                text: scored.contribution.text,
                similarity: scored.score,
                origin: ResultOrigin::Contribution,
            });
        }

        if passages.is_empty() {
            return Err(QueryError::NoRelevantContent);
        }

        passages.sort_by(|left, right| right.composite.total_cmp(&left.composite));
        epsilon_tiebreak(&mut passages, self.ranking.epsilon);
        let passages = dedup_passages(passages, self.ranking.dedup_overlap);

        Ok(assemble_context(
            passages,
            opts.max_results,
            self.ranking.context_char_budget,
        ))
    }
}

/// Within an epsilon band of composite score the ordering is decided by
/// provenance trust instead: document origin first, then higher rating.
/// Candidates outside the band never move relative to each other.
fn epsilon_tiebreak(passages: &mut [RankedPassage], epsilon: f64) {
    let len = passages.len();
    for _ in 0..len {
        let mut swapped = false;
        for i in 1..len {
            let within_band = (passages[i - 1].composite - passages[i].composite).abs() <= epsilon;
            if within_band && prefer(&passages[i], &passages[i - 1]) {
                passages.swap(i - 1, i);
                swapped = true;
            }
        }
        if !swapped {
            break;
        }
    }
}

fn prefer(candidate: &RankedPassage, incumbent: &RankedPassage) -> bool {
    match (candidate.origin, incumbent.origin) {
        (ResultOrigin::Document, ResultOrigin::Contribution) => true,
        (ResultOrigin::Contribution, ResultOrigin::Document) => false,
        _ => {
            candidate.source.rating.unwrap_or(0.0) > incumbent.source.rating.unwrap_or(0.0)
        }
    }
}

/// Drops passages that repeat a fact already covered by a higher-ranked one.
/// Near-identical means normalized containment either way, or a word-overlap
/// coefficient at or above the configured threshold.
fn dedup_passages(passages: Vec<RankedPassage>, overlap_threshold: f64) -> Vec<RankedPassage> {
    let mut kept: Vec<RankedPassage> = Vec::with_capacity(passages.len());
    let mut kept_norms: Vec<String> = Vec::with_capacity(passages.len());

    for passage in passages {
        let norm = normalize_for_dedup(&passage.text);
        let duplicate = kept_norms
            .iter()
            .any(|existing| is_near_duplicate(existing, &norm, overlap_threshold));
        if !duplicate {
            kept_norms.push(norm);
            kept.push(passage);
        }
    }

    kept
}

fn normalize_for_dedup(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_near_duplicate(left: &str, right: &str, threshold: f64) -> bool {
    if left.is_empty() || right.is_empty() {
        return false;
    }
    if left.contains(right) || right.contains(left) {
        return true;
    }

    let left_words: HashSet<&str> = left.split_whitespace().collect();
    let right_words: HashSet<&str> = right.split_whitespace().collect();
    let smaller = left_words.len().min(right_words.len());
    if smaller == 0 {
        return false;
    }
    let intersection = left_words.intersection(&right_words).count();
    intersection as f64 / smaller as f64 >= threshold
}

fn assemble_context(
    passages: Vec<RankedPassage>,
    max_results: usize,
    char_budget: usize,
) -> RetrievedContext {
    let mut blocks = Vec::new();
    let mut sources = Vec::new();
    let mut used = 0usize;

    for (position, passage) in passages.into_iter().take(max_results).enumerate() {
        let header = match passage.origin {
            ResultOrigin::Document => match passage.source.page {
                Some(page) => format!(
                    "DOCUMENT #{} ({}, page {}):",
                    position + 1,
                    passage.source.name,
                    page
                ),
                None => format!("DOCUMENT #{} ({}):", position + 1, passage.source.name),
            },
            ResultOrigin::Contribution => format!(
                "COMMUNITY CONTRIBUTION #{} (rating {:.1}/5.0):",
                position + 1,
                passage.source.rating.unwrap_or(0.0)
            ),
        };

        let block = format!("{header}\n{}", passage.text);
        // The budget respects the generative model's input limit; the
        // top-ranked passage is always included. Counted in characters,
        // matching the chunker's window sizing.
        let block_chars = block.chars().count();
        if !blocks.is_empty() && used + block_chars > char_budget {
            break;
        }
        used += block_chars;
        blocks.push(block);
        sources.push(passage.source);
    }

    RetrievedContext {
        context_block: blocks.join("\n\n"),
        sources,
    }
}
