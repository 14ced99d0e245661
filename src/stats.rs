use crate::checkpoint::CheckpointStats;

/// Counters collected while a stream is driven.
///
/// A stream has exactly one consumer, so these are plain integers.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamStats {
    rows_seen: u64,
    records_parsed: u64,
    skipped_resume: u64,
    skipped_post_type: u64,
    dropped_no_text: u64,
    dropped_tags: u64,
    unresolved_parents: u64,
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_seen(&mut self) -> u64 {
        self.rows_seen += 1;
        self.rows_seen
    }

    pub fn inc_parsed(&mut self) -> u64 {
        self.records_parsed += 1;
        self.records_parsed
    }

    pub fn inc_skipped_resume(&mut self) {
        self.skipped_resume += 1;
    }

    pub fn inc_skipped_post_type(&mut self) {
        self.skipped_post_type += 1;
    }

    pub fn inc_dropped_no_text(&mut self) {
        self.dropped_no_text += 1;
    }

    pub fn inc_dropped_tags(&mut self) {
        self.dropped_tags += 1;
    }

    pub fn inc_unresolved_parents(&mut self) {
        self.unresolved_parents += 1;
    }

    /// Rows visited, emitted or not
    pub fn seen(&self) -> u64 {
        self.rows_seen
    }

    /// Records emitted
    pub fn parsed(&self) -> u64 {
        self.records_parsed
    }

    pub fn skipped_resume(&self) -> u64 {
        self.skipped_resume
    }

    pub fn skipped_post_type(&self) -> u64 {
        self.skipped_post_type
    }

    pub fn dropped_no_text(&self) -> u64 {
        self.dropped_no_text
    }

    pub fn dropped_tags(&self) -> u64 {
        self.dropped_tags
    }

    pub fn unresolved_parents(&self) -> u64 {
        self.unresolved_parents
    }

    /// Convert to checkpoint stats for persistence
    pub fn to_checkpoint(&self) -> CheckpointStats {
        CheckpointStats {
            rows_seen: self.rows_seen,
            records_parsed: self.records_parsed,
        }
    }
}
