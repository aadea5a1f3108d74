use crate::chunking::content_tokens;
use crate::error::ContributionError;
use crate::models::{Contribution, ContributionStatus, ModerationDecision};
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;
use uuid::Uuid;

const MIN_LEXICAL_SCORE: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct ScoredContribution {
    pub contribution: Contribution,
    pub score: f64,
}

/// Community-submitted snippets, moderated before they become retrievable.
/// Backed by a single JSON file; writes serialize through the lock and
/// persist atomically, reads never block each other.
pub struct ContributionStore {
    path: PathBuf,
    entries: RwLock<Vec<Contribution>>,
    strip_punctuation: Regex,
}

impl ContributionStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ContributionError> {
        let path = path.into();
        let entries = if path.exists() {
            serde_json::from_slice(&fs::read(&path)?)?
        } else {
            Vec::new()
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            strip_punctuation: Regex::new(r"[^\w\s]")?,
        })
    }

    /// Inserts a new snippet with status pending. It stays invisible to
    /// `query` until a moderator approves it.
    pub fn submit(
        &self,
        text: impl Into<String>,
        submitted_by: impl Into<String>,
    ) -> Result<Contribution, ContributionError> {
        let contribution = Contribution::new(text, submitted_by);
        let mut entries = self.write_lock();
        entries.push(contribution.clone());
        self.persist(&entries)?;
        Ok(contribution)
    }

    /// Status transition by moderation. Re-reviewing an already reviewed
    /// contribution is allowed as long as the decision actually changes the
    /// status; re-applying the identical decision is rejected so a double
    /// submit from the moderation UI cannot masquerade as a new review.
    pub fn moderate(
        &self,
        id: Uuid,
        decision: ModerationDecision,
    ) -> Result<Contribution, ContributionError> {
        let mut entries = self.write_lock();
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| ContributionError::NotFound(id.to_string()))?;

        let target = decision.target_status();
        if entry.status == target {
            return Err(ContributionError::InvalidTransition(format!(
                "contribution {id} is already {:?}",
                entry.status
            )));
        }

        entry.status = target;
        let updated = entry.clone();
        self.persist(&entries)?;
        Ok(updated)
    }

    /// Updates the quality rating, clamped to [0, 5].
    pub fn rate(&self, id: Uuid, rating: f32) -> Result<Contribution, ContributionError> {
        let mut entries = self.write_lock();
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| ContributionError::NotFound(id.to_string()))?;

        entry.rating = rating.clamp(0.0, 5.0);
        let updated = entry.clone();
        self.persist(&entries)?;
        Ok(updated)
    }

    /// Bulk moderation helper: flips every pending contribution to approved.
    /// Returns the number of entries changed.
    pub fn approve_all_pending(&self) -> Result<usize, ContributionError> {
        let mut entries = self.write_lock();
        let mut changed = 0;
        for entry in entries.iter_mut() {
            if entry.status == ContributionStatus::Pending {
                entry.status = ContributionStatus::Approved;
                changed += 1;
            }
        }
        if changed > 0 {
            self.persist(&entries)?;
        }
        Ok(changed)
    }

    /// Lexical retrieval over approved entries only. Scores combine word
    /// overlap (Jaccard), partial-word containment, and phrase containment;
    /// results below a small floor are dropped, the rest sorted by score
    /// then rating.
    pub fn query(&self, text: &str, limit: usize) -> Vec<ScoredContribution> {
        let query_norm = self.normalize(text);
        if query_norm.is_empty() || limit == 0 {
            return Vec::new();
        }

        let entries = self.read_lock();
        let mut scored: Vec<ScoredContribution> = entries
            .iter()
            .filter(|entry| entry.status == ContributionStatus::Approved)
            .filter_map(|entry| {
                let score = lexical_similarity(&query_norm, &self.normalize(&entry.text));
                if score > MIN_LEXICAL_SCORE {
                    Some(ScoredContribution {
                        contribution: entry.clone(),
                        score,
                    })
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then(right.contribution.rating.total_cmp(&left.contribution.rating))
        });
        scored.truncate(limit);
        scored
    }

    /// Approved contributions by rating, best first.
    pub fn top_rated(&self, limit: usize) -> Vec<Contribution> {
        let entries = self.read_lock();
        let mut approved: Vec<Contribution> = entries
            .iter()
            .filter(|entry| entry.status == ContributionStatus::Approved)
            .cloned()
            .collect();
        approved.sort_by(|left, right| right.rating.total_cmp(&left.rating));
        approved.truncate(limit);
        approved
    }

    pub fn list(&self, include_unreviewed: bool) -> Vec<Contribution> {
        let entries = self.read_lock();
        entries
            .iter()
            .filter(|entry| include_unreviewed || entry.status == ContributionStatus::Approved)
            .cloned()
            .collect()
    }

    fn normalize(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        let stripped = self.strip_punctuation.replace_all(&lowered, " ");
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn persist(&self, entries: &[Contribution]) -> Result<(), ContributionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, Vec<Contribution>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Contribution>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Lightweight lexical match over normalized text. Good enough for a small,
/// moderation-reviewed corpus; no vectors involved.
fn lexical_similarity(query: &str, candidate: &str) -> f64 {
    let query_words: HashSet<String> = content_tokens(query).into_iter().collect();
    let candidate_words: HashSet<String> = content_tokens(candidate).into_iter().collect();
    if query_words.is_empty() || candidate_words.is_empty() {
        return 0.0;
    }

    let intersection = query_words.intersection(&candidate_words).count() as f64;
    let union = query_words.union(&candidate_words).count() as f64;
    let jaccard = intersection / union;

    let partial_matches = query_words
        .iter()
        .filter(|query_word| {
            query_word.len() > 3
                && candidate_words.iter().any(|candidate_word| {
                    candidate_word.len() > 3
                        && (candidate_word.contains(query_word.as_str())
                            || query_word.contains(candidate_word.as_str()))
                })
        })
        .count() as f64;
    let partial = partial_matches / query_words.len().max(candidate_words.len()) as f64;

    let phrase = if query.len() > 10 && (candidate.contains(query) || query.contains(candidate)) {
        0.5
    } else {
        0.0
    };

    (jaccard * 0.6 + partial * 0.3 + phrase * 0.1).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ContributionStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ContributionStore::open(dir.path().join("contributions.json")).expect("open");
        (dir, store)
    }

    #[test]
    fn only_approved_contributions_are_retrievable() {
        let (_dir, store) = store();

        let approved = store
            .submit("Latte art requires properly steamed milk.", "alice")
            .expect("submit");
        store
            .submit("Latte art also needs a steady pour.", "bob")
            .expect("submit");

        store
            .moderate(approved.id, ModerationDecision::Approve)
            .expect("moderate");
        store.rate(approved.id, 4.0).expect("rate");

        let hits = store.query("how do I pour latte art", 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].contribution.id, approved.id);
    }

    #[test]
    fn moderating_unknown_id_is_not_found() {
        let (_dir, store) = store();
        let result = store.moderate(Uuid::new_v4(), ModerationDecision::Approve);
        assert!(matches!(result, Err(ContributionError::NotFound(_))));
    }

    #[test]
    fn repeating_the_same_decision_is_an_invalid_transition() {
        let (_dir, store) = store();
        let entry = store.submit("text", "alice").expect("submit");

        store
            .moderate(entry.id, ModerationDecision::Approve)
            .expect("first review");
        let repeat = store.moderate(entry.id, ModerationDecision::Approve);
        assert!(matches!(
            repeat,
            Err(ContributionError::InvalidTransition(_))
        ));

        // Flipping the decision is a legitimate re-review.
        let flipped = store
            .moderate(entry.id, ModerationDecision::Reject)
            .expect("re-review");
        assert_eq!(flipped.status, ContributionStatus::Rejected);
    }

    #[test]
    fn rejection_keeps_the_record() {
        let (_dir, store) = store();
        let entry = store.submit("wrong advice", "mallory").expect("submit");
        store
            .moderate(entry.id, ModerationDecision::Reject)
            .expect("reject");

        let all = store.list(true);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, ContributionStatus::Rejected);
        assert!(store.query("wrong advice", 5).is_empty());
    }

    #[test]
    fn ratings_are_clamped() {
        let (_dir, store) = store();
        let entry = store.submit("text", "alice").expect("submit");
        let rated = store.rate(entry.id, 9.0).expect("rate");
        assert_eq!(rated.rating, 5.0);
    }

    #[test]
    fn store_round_trips_through_its_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("contributions.json");

        let first = ContributionStore::open(&path).expect("open");
        let entry = first.submit("Cold brew steeps overnight.", "alice").expect("submit");
        first
            .moderate(entry.id, ModerationDecision::Approve)
            .expect("approve");

        let reopened = ContributionStore::open(&path).expect("reopen");
        let all = reopened.list(true);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, entry.id);
        assert_eq!(all[0].status, ContributionStatus::Approved);
    }

    #[test]
    fn approve_all_pending_flips_only_pending_entries() {
        let (_dir, store) = store();
        let a = store.submit("first", "alice").expect("submit");
        store.submit("second", "bob").expect("submit");
        store
            .moderate(a.id, ModerationDecision::Reject)
            .expect("reject");

        let changed = store.approve_all_pending().expect("bulk approve");
        assert_eq!(changed, 1);

        let all = store.list(true);
        let rejected = all.iter().find(|entry| entry.id == a.id).expect("entry");
        assert_eq!(rejected.status, ContributionStatus::Rejected);
    }

    #[test]
    fn query_ranks_better_lexical_matches_first() {
        let (_dir, store) = store();
        let close = store
            .submit("Espresso extraction should take 25 to 30 seconds.", "alice")
            .expect("submit");
        let far = store
            .submit("Espresso cups hold about 60 milliliters.", "bob")
            .expect("submit");
        store.approve_all_pending().expect("approve");
        store.rate(close.id, 3.0).expect("rate");
        store.rate(far.id, 5.0).expect("rate");

        let hits = store.query("how long should espresso extraction take", 5);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].contribution.id, close.id);
    }
}
