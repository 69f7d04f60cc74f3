//! Multi-source lead aggregation
//!
//! Handles from the liked-by, followed-by and commented-by streams are
//! merged into one deduplicated candidate set. Insertion is idempotent
//! and first-come-first-served across sources up to the `max_leads`
//! ceiling; the canonical lexicographic ordering is applied only when
//! the set is handed downstream, so batching and output stay
//! reproducible even though insertion order varies run to run.

use parking_lot::RwLock;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::sources::comments::CommentRecord;

/// Deduplicated pool of candidate handles awaiting enrichment.
pub struct CandidateSet {
    seen: RwLock<HashSet<String>>,
    max_leads: usize,
}

impl CandidateSet {
    pub fn new(max_leads: usize) -> Self {
        Self {
            seen: RwLock::new(HashSet::new()),
            max_leads,
        }
    }

    /// Inserts a handle (case-normalized). Returns true if the set
    /// changed. Once the set is full, further insertions are ignored.
    pub fn insert(&self, handle: &str) -> bool {
        let normalized = handle.trim().to_lowercase();
        if normalized.is_empty() {
            return false;
        }
        let mut seen = self.seen.write();
        if seen.len() >= self.max_leads {
            debug!(handle = %normalized, max = self.max_leads, "Candidate cap reached, ignoring");
            return false;
        }
        seen.insert(normalized)
    }

    pub fn len(&self) -> usize {
        self.seen.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.read().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_leads
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.seen.read().contains(&handle.trim().to_lowercase())
    }

    /// Members in canonical sorted order for deterministic downstream
    /// batching and output.
    pub fn sorted_handles(&self) -> Vec<String> {
        let mut handles: Vec<String> = self.seen.read().iter().cloned().collect();
        handles.sort();
        handles
    }
}

/// Merges the per-source outputs into one candidate set. Sources are
/// consumed in arrival order; duplicates across sources collapse to one
/// membership.
pub fn aggregate_candidates(
    max_leads: usize,
    likers: &[String],
    followers: &[String],
    comments: &[CommentRecord],
) -> CandidateSet {
    let candidates = CandidateSet::new(max_leads);

    for handle in likers {
        candidates.insert(handle);
    }
    for handle in followers {
        candidates.insert(handle);
    }
    // The comment source derives a handle per record
    for comment in comments {
        candidates.insert(&comment.username);
    }

    info!(
        candidates = candidates.len(),
        max = max_leads,
        capped = candidates.is_full(),
        "Aggregated leads"
    );
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(username: &str) -> CommentRecord {
        CommentRecord {
            media_id: "m".into(),
            username: username.into(),
            text: String::new(),
            likes: 0,
            created_at: 0,
        }
    }

    #[test]
    fn test_insert_is_idempotent_across_sources() {
        let candidates = aggregate_candidates(
            100,
            &["alice".into(), "bob".into()],
            &["alice".into()],
            &[comment("alice")],
        );
        // Same handle from three sources counts once
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_case_normalization() {
        let set = CandidateSet::new(10);
        assert!(set.insert("Alice"));
        assert!(!set.insert("ALICE"));
        assert!(!set.insert(" alice "));
        assert_eq!(set.sorted_handles(), vec!["alice"]);
    }

    #[test]
    fn test_empty_handles_ignored() {
        let set = CandidateSet::new(10);
        assert!(!set.insert(""));
        assert!(!set.insert("   "));
        assert!(set.is_empty());
    }

    #[test]
    fn test_cap_is_arrival_order_not_alphabetical() {
        // 3 unique handles arriving in reverse alphabetical order with
        // a cap of 2: membership is the first two arrivals, the sort is
        // applied only to the output ordering.
        let candidates = aggregate_candidates(
            2,
            &["zoe".into(), "yuri".into(), "abe".into()],
            &[],
            &[],
        );
        assert_eq!(candidates.len(), 2);
        assert!(candidates.contains("zoe"));
        assert!(candidates.contains("yuri"));
        assert!(!candidates.contains("abe"));
        assert_eq!(candidates.sorted_handles(), vec!["yuri", "zoe"]);
    }

    #[test]
    fn test_cap_with_many_unique_handles() {
        let incoming: Vec<String> = (0..600).map(|i| format!("user{:03}", i)).collect();
        let candidates = aggregate_candidates(500, &incoming, &[], &[]);
        assert_eq!(candidates.len(), 500);
        assert!(candidates.is_full());
        // First arrivals won membership
        assert!(candidates.contains("user000"));
        assert!(!candidates.contains("user599"));
    }

    #[test]
    fn test_duplicate_insert_does_not_consume_cap() {
        let set = CandidateSet::new(2);
        assert!(set.insert("alice"));
        assert!(!set.insert("alice"));
        assert!(set.insert("bob"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_sorted_handles_are_lexicographic() {
        let set = CandidateSet::new(10);
        for handle in ["delta", "alpha", "charlie", "bravo"] {
            set.insert(handle);
        }
        assert_eq!(
            set.sorted_handles(),
            vec!["alpha", "bravo", "charlie", "delta"]
        );
    }
}
