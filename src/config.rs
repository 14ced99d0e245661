use crate::models::ContentType;
use crate::resume::ResumeFrom;
use rustc_hash::FxHashSet;

/// Value of `meta.source` on every emitted record
pub const SOURCE_NAME: &str = "StackExchange";

/// Progress log interval (one info event every N parsed records)
pub const PROGRESS_INTERVAL: u64 = 10_000;

/// Buffer size for the underlying file reader
pub const READ_BUFFER_SIZE: usize = 128 * 1024;

/// Bump when the checkpoint layout changes
pub const CHECKPOINT_VERSION: u32 = 2;

/// Default checkpoint interval in emitted records
pub const CHECKPOINT_INTERVAL: u64 = 50_000;

/// Options recognized by [`crate::stream::RecordStream`].
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub content_type: ContentType,
    /// Collapse newline runs to a single `\n` when true, to a single space when false.
    pub keep_newlines: bool,
    /// Only emit posts carrying at least one of these tags. `None` disables filtering.
    pub only_tags: Option<FxHashSet<String>>,
    pub resume_from: Option<ResumeFrom>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            content_type: ContentType::PostTitle,
            keep_newlines: true,
            only_tags: None,
            resume_from: None,
        }
    }
}

impl StreamConfig {
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            ..Self::default()
        }
    }

    pub fn with_keep_newlines(mut self, keep: bool) -> Self {
        self.keep_newlines = keep;
        self
    }

    /// An empty tag list means "no filtering", same as never calling this.
    pub fn with_only_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: FxHashSet<String> = tags
            .into_iter()
            .map(Into::into)
            .filter(|t| !t.is_empty())
            .collect();
        self.only_tags = if set.is_empty() { None } else { Some(set) };
        self
    }

    pub fn with_resume_from(mut self, resume_from: ResumeFrom) -> Self {
        self.resume_from = Some(resume_from);
        self
    }
}
