use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Question metadata held until every expected answer has been seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingParent {
    pub tags: Option<Vec<String>>,
    pub title: Option<String>,
    pub expected_answers: u32,
    pub seen_answers: u32,
}

/// What an answer inherits from its question.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedParent {
    pub tags: Option<Vec<String>>,
    pub title: Option<String>,
}

/// Joins answers to the tags and title of their question.
///
/// Entries exist only while `seen_answers < expected_answers`, so memory is bounded by
/// the number of open questions rather than the size of the dump. The open entries are
/// saved with checkpoints so a resumed stream can still join answers to earlier questions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParentTracker {
    pending: FxHashMap<u64, PendingParent>,
}

impl ParentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the question is now tracked. Questions without answers never are.
    pub fn observe_question(
        &mut self,
        id: u64,
        tags: Option<Vec<String>>,
        title: Option<String>,
        expected_answers: u32,
    ) -> bool {
        if expected_answers == 0 {
            return false;
        }
        self.pending.insert(
            id,
            PendingParent {
                tags,
                title,
                expected_answers,
                seen_answers: 0,
            },
        );
        true
    }

    /// Counts one answer against `parent_id` and returns the question's tags and title.
    ///
    /// Not idempotent: each answer row must be resolved exactly once. The entry is
    /// evicted by the call that sees the last expected answer.
    pub fn resolve_answer(&mut self, parent_id: u64) -> Option<ResolvedParent> {
        let entry = self.pending.get_mut(&parent_id)?;
        entry.seen_answers += 1;

        if entry.seen_answers >= entry.expected_answers {
            let done = self.pending.remove(&parent_id)?;
            debug!(parent_id, answers = done.seen_answers, "All answers seen, evicting");
            return Some(ResolvedParent {
                tags: done.tags,
                title: done.title,
            });
        }

        Some(ResolvedParent {
            tags: entry.tags.clone(),
            title: entry.title.clone(),
        })
    }

    pub fn get(&self, id: u64) -> Option<&PendingParent> {
        self.pending.get(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    /// Number of questions still waiting for answers
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Option<Vec<String>> {
        Some(list.iter().map(|t| t.to_string()).collect())
    }

    #[test]
    fn zero_answer_questions_are_not_tracked() {
        let mut tracker = ParentTracker::new();
        assert!(!tracker.observe_question(1, tags(&["a"]), None, 0));
        assert!(tracker.is_empty());
        assert_eq!(tracker.resolve_answer(1), None);
    }

    #[test]
    fn resolve_returns_question_metadata() {
        let mut tracker = ParentTracker::new();
        tracker.observe_question(1, tags(&["python", "xml"]), Some("How?".into()), 2);

        let resolved = tracker.resolve_answer(1).unwrap();
        assert_eq!(resolved.tags, tags(&["python", "xml"]));
        assert_eq!(resolved.title.as_deref(), Some("How?"));

        let entry = tracker.get(1).unwrap();
        assert_eq!(entry.seen_answers, 1);
        assert_eq!(entry.expected_answers, 2);
    }

    #[test]
    fn evicted_after_expected_answers() {
        let mut tracker = ParentTracker::new();
        tracker.observe_question(10, tags(&["a"]), Some("T".into()), 3);

        for _ in 0..2 {
            assert!(tracker.resolve_answer(10).is_some());
            assert!(tracker.contains(10));
        }
        let last = tracker.resolve_answer(10).unwrap();
        assert_eq!(last.title.as_deref(), Some("T"));
        assert!(!tracker.contains(10));
        assert!(tracker.is_empty());
    }

    #[test]
    fn extra_answers_after_eviction_are_unresolved() {
        let mut tracker = ParentTracker::new();
        tracker.observe_question(5, None, None, 1);
        assert!(tracker.resolve_answer(5).is_some());
        assert_eq!(tracker.resolve_answer(5), None);
    }

    #[test]
    fn unknown_parent_does_not_mutate() {
        let mut tracker = ParentTracker::new();
        tracker.observe_question(1, None, None, 1);
        assert_eq!(tracker.resolve_answer(99), None);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn questions_are_independent() {
        let mut tracker = ParentTracker::new();
        tracker.observe_question(1, tags(&["a"]), None, 1);
        tracker.observe_question(2, tags(&["b"]), None, 2);

        assert_eq!(tracker.resolve_answer(2).unwrap().tags, tags(&["b"]));
        assert_eq!(tracker.resolve_answer(1).unwrap().tags, tags(&["a"]));
        assert_eq!(tracker.len(), 1);
        assert!(tracker.contains(2));
    }

    #[test]
    fn open_entries_survive_bincode() {
        let mut tracker = ParentTracker::new();
        tracker.observe_question(1, tags(&["python"]), Some("How?".into()), 2);
        tracker.observe_question(2, None, None, 1);
        tracker.resolve_answer(1);

        let bytes = bincode::serialize(&tracker).unwrap();
        let mut restored: ParentTracker = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored, tracker);

        let last = restored.resolve_answer(1).unwrap();
        assert_eq!(last.tags, tags(&["python"]));
        assert!(!restored.contains(1));
        assert_eq!(restored.len(), 1);
    }

    #[test]
    fn reobserving_resets_counts() {
        let mut tracker = ParentTracker::new();
        tracker.observe_question(1, None, Some("old".into()), 2);
        tracker.resolve_answer(1);
        tracker.observe_question(1, None, Some("new".into()), 2);
        assert_eq!(tracker.get(1).unwrap().seen_answers, 0);
        assert_eq!(tracker.resolve_answer(1).unwrap().title.as_deref(), Some("new"));
    }
}
