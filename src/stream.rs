use crate::config::{StreamConfig, PROGRESS_INTERVAL, SOURCE_NAME};
use crate::crossref::CrossReference;
use crate::html;
use crate::models::{
    CommentMeta, ContentType, OutputRecord, PostMeta, PostType, RecordDetails, RecordMeta,
    SourceKind, TagMeta,
};
use crate::parser::{DumpEvent, DumpReader, Row};
use crate::resume::ResumeFilter;
use crate::stats::StreamStats;
use crate::tags;
use crate::tracker::ParentTracker;
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, error, info, trace, warn};

/// Lazily turns one dump file into [`OutputRecord`]s.
///
/// Each call to `next` reads rows until one is admitted or the input ends; nothing is
/// buffered ahead. Dropping the stream closes the file.
pub struct RecordStream<R: BufRead> {
    reader: DumpReader<R>,
    config: StreamConfig,
    kind: SourceKind,
    community: String,
    file_type: String,
    tracker: ParentTracker,
    resume: Option<ResumeFilter>,
    xref: Option<CrossReference>,
    stats: StreamStats,
    last_row_id: Option<u64>,
    error: Option<anyhow::Error>,
    finished: bool,
}

impl RecordStream<BufReader<File>> {
    /// Opens a decompressed dump and checks its root element against the content type.
    pub fn open(path: impl AsRef<Path>, community: &str, config: StreamConfig) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            bail!(
                "Cannot find file {}. Please check the path name and try again",
                path.display()
            );
        }
        if path.extension().and_then(|e| e.to_str()) != Some("xml") {
            bail!(
                "File {} does not end in '.xml'. Please check the path name and try again",
                path.display()
            );
        }

        let file_type = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let reader = DumpReader::open(path)?;
        info!("Streaming {} from: {}", config.content_type, path.display());

        Self::with_reader(reader, community, &file_type, config)
            .with_context(|| format!("Failed to start stream over {}", path.display()))
    }
}

impl<R: BufRead> RecordStream<R> {
    pub fn from_reader(
        inner: R,
        community: &str,
        file_type: &str,
        config: StreamConfig,
    ) -> Result<Self> {
        Self::with_reader(DumpReader::from_reader(inner), community, file_type, config)
    }

    fn with_reader(
        mut reader: DumpReader<R>,
        community: &str,
        file_type: &str,
        config: StreamConfig,
    ) -> Result<Self> {
        let kind = config.content_type.source_kind();

        match reader.next_event()? {
            Some(DumpEvent::Open(root)) if root == kind.root_tag() => {}
            Some(DumpEvent::Open(root)) => bail!(
                "Input file is not a StackExchange {} file (root element <{}>, expected <{}>)",
                kind_file_name(kind),
                root,
                kind.root_tag()
            ),
            _ => bail!("Input file has no root element"),
        }

        if config.only_tags.is_some() && kind != SourceKind::Posts {
            warn!(
                content_type = %config.content_type,
                "Tags are only available for posts, tag filter will not be applied"
            );
        }

        let resume = config.resume_from.map(ResumeFilter::new);

        Ok(Self {
            reader,
            config,
            kind,
            community: community.to_string(),
            file_type: file_type.to_string(),
            tracker: ParentTracker::new(),
            resume,
            xref: None,
            stats: StreamStats::new(),
            last_row_id: None,
            error: None,
            finished: false,
        })
    }

    /// Attaches the second document used by `all_text` and `comments_both`.
    pub fn with_cross_reference(mut self, xref: CrossReference) -> Self {
        self.xref = Some(xref);
        self
    }

    /// Seeds the parent join with questions left open by an earlier run, so answers
    /// after a resume point still find their question's tags and title.
    pub fn with_tracker(mut self, tracker: ParentTracker) -> Self {
        if !tracker.is_empty() {
            info!(open_questions = tracker.len(), "Restored open questions");
        }
        self.tracker = tracker;
        self
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn tracker(&self) -> &ParentTracker {
        &self.tracker
    }

    /// Id of the last row past the resume point, whether or not it was emitted.
    ///
    /// Together with [`RecordStream::tracker`] this is the state a checkpoint needs.
    pub fn last_row_id(&self) -> Option<u64> {
        self.last_row_id
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Set when the stream ended because of malformed XML or an I/O failure.
    pub fn error(&self) -> Option<&anyhow::Error> {
        self.error.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self) {
        self.finished = true;
        info!(
            seen = self.stats.seen(),
            parsed = self.stats.parsed(),
            open_questions = self.tracker.len(),
            "Stream finished"
        );
    }

    fn process_row(&mut self, row: Row) -> Option<OutputRecord> {
        if let Some(filter) = self.resume.as_mut() {
            if !filter.admits(&row) {
                self.stats.inc_skipped_resume();
                return None;
            }
        }

        let id = match row.get_id("Id") {
            Some(id) => id,
            None => {
                debug!("Row without a usable Id");
                self.stats.inc_dropped_no_text();
                return None;
            }
        };
        self.last_row_id = Some(id);

        match self.kind {
            SourceKind::Posts => self.process_post(id, row),
            SourceKind::Comments => self.process_comment(id, row),
            SourceKind::Tags => self.process_tag(id, row),
        }
    }

    fn process_post(&mut self, id: u64, mut row: Row) -> Option<OutputRecord> {
        let post_type = PostType::from_id(row.get_u32("PostTypeId").unwrap_or(0));
        let title = row.take("Title").filter(|t| !t.is_empty());
        let own_tags = tags::decode(row.get("Tags"));
        let answer_count = row.get_u32("AnswerCount").unwrap_or(0);

        let mut meta = PostMeta {
            post_type: post_type.id(),
            date: row.take("CreationDate"),
            last_activity_date: row.take("LastActivityDate"),
            accepted_answer_id: row.get_id("AcceptedAnswerId"),
            score: row.get_i64("Score").unwrap_or(0),
            view_count: row.get_count("ViewCount"),
            answer_count,
            comment_count: row.get_u32("CommentCount").unwrap_or(0),
            favorite_count: row.get_u32("FavoriteCount").unwrap_or(0),
            ..PostMeta::default()
        };

        // A question's own tags decide the filter and are handed to its answers, but
        // only answers report them in `parentTags`.
        let filter_tags = match post_type {
            PostType::Question => {
                self.tracker
                    .observe_question(id, own_tags.clone(), title.clone(), answer_count);
                meta.title = title.clone();
                own_tags
            }
            PostType::Answer => {
                let parent_id = row.get_id("ParentId");
                meta.parent_id = parent_id;
                match parent_id.and_then(|p| self.tracker.resolve_answer(p)) {
                    Some(parent) => {
                        meta.parent_tags = parent.tags;
                        meta.parent_title = parent.title;
                    }
                    None => {
                        debug!(id, parent_id, "Answer without a tracked question");
                        self.stats.inc_unresolved_parents();
                    }
                }
                meta.parent_tags.clone()
            }
            PostType::Other(t) => {
                trace!(id, post_type = t, "Skipping post type");
                self.stats.inc_skipped_post_type();
                return None;
            }
        };

        let body = row.take("Body").filter(|b| !b.is_empty());
        let raw = match self.config.content_type {
            ContentType::PostTitle => title,
            ContentType::PostBody => body,
            ContentType::PostBoth => join_title_body(title, body),
            ContentType::AllText => {
                let comments = self
                    .xref
                    .as_ref()
                    .map(|x| x.comments_for(id))
                    .unwrap_or(&[]);
                append_comments(join_title_body(title, body), comments)
            }
            _ => None,
        };

        let Some(raw) = raw else {
            debug!(id, "No text for content type");
            self.stats.inc_dropped_no_text();
            return None;
        };

        if !self.tags_admitted(filter_tags.as_deref()) {
            debug!(id, "Dropped by tag filter");
            self.stats.inc_dropped_tags();
            return None;
        }

        self.assemble(id, raw, RecordDetails::Post(meta))
    }

    fn process_comment(&mut self, id: u64, mut row: Row) -> Option<OutputRecord> {
        let post_id = row.get_id("PostId");
        let text = row.take("Text").filter(|t| !t.is_empty());

        let parent_title = match (&self.xref, post_id) {
            (Some(xref), Some(pid)) => xref.title_for(pid).map(str::to_string),
            _ => None,
        };

        let raw = match self.config.content_type {
            ContentType::Comments => text,
            ContentType::CommentsBoth => match (&parent_title, text) {
                (Some(title), Some(text)) => Some(format!("{}\n{}", title, text)),
                (None, text) => text,
                // A title alone is not a comment.
                (Some(_), None) => None,
            },
            _ => None,
        };

        let Some(raw) = raw else {
            debug!(id, "Comment without text");
            self.stats.inc_dropped_no_text();
            return None;
        };

        let meta = CommentMeta {
            post_id,
            date: row.take("CreationDate"),
            user_id: row.get_i64("UserId"),
            parent_title,
            score: row.get_i64("Score").unwrap_or(0),
        };

        self.assemble(id, raw, RecordDetails::Comment(meta))
    }

    fn process_tag(&mut self, id: u64, mut row: Row) -> Option<OutputRecord> {
        let Some(name) = row.take("TagName").filter(|n| !n.is_empty()) else {
            self.stats.inc_dropped_no_text();
            return None;
        };

        let meta = TagMeta {
            count: row.get_count("Count"),
            excerpt_post_id: row.get_id("ExcerptPostId"),
            wiki_post_id: row.get_id("WikiPostId"),
        };

        self.assemble(id, name, RecordDetails::Tag(meta))
    }

    /// Posts pass when no filter is set or one of their tags is in the filter set.
    fn tags_admitted(&self, tags: Option<&[String]>) -> bool {
        let Some(only) = &self.config.only_tags else {
            return true;
        };
        match tags {
            Some(tags) => tags.iter().any(|t| only.contains(t)),
            None => false,
        }
    }

    fn assemble(&mut self, id: u64, raw: String, details: RecordDetails) -> Option<OutputRecord> {
        let text = html::normalize(&raw, self.config.keep_newlines);
        if text.is_empty() {
            debug!(id, "Text empty after markup removal");
            self.stats.inc_dropped_no_text();
            return None;
        }

        Some(OutputRecord {
            html: raw,
            text,
            meta: RecordMeta {
                source: SOURCE_NAME,
                community: self.community.clone(),
                file_type: self.file_type.clone(),
                id,
                details,
            },
        })
    }
}

impl<R: BufRead> Iterator for RecordStream<R> {
    type Item = OutputRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let event = match self.reader.next_event() {
                Ok(Some(event)) => event,
                Ok(None) => {
                    self.finish();
                    return None;
                }
                Err(e) => {
                    error!(
                        seen = self.stats.seen(),
                        position = self.reader.position(),
                        "Stream stopped: {:#}",
                        e
                    );
                    self.error = Some(e);
                    self.finish();
                    return None;
                }
            };

            let row = match event {
                DumpEvent::Row(row) => row,
                DumpEvent::Close(_) => {
                    self.finish();
                    return None;
                }
                DumpEvent::Open(_) => continue,
            };

            let seen = self.stats.inc_seen();
            trace!(seen, "Fetching child element");

            if let Some(record) = self.process_row(row) {
                let parsed = self.stats.inc_parsed();
                if parsed % PROGRESS_INTERVAL == 0 {
                    info!(parsed, seen, "Stream progress");
                }
                return Some(record);
            }
        }
    }
}

/// Community name from the dump layout `<community>/Posts.xml`.
pub fn community_from_path(path: &Path) -> Option<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    absolute
        .parent()?
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}

fn kind_file_name(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Posts => "Posts.xml",
        SourceKind::Comments => "Comments.xml",
        SourceKind::Tags => "Tags.xml",
    }
}

/// `T\nB` when both are present, whichever exists otherwise.
pub fn join_title_body(title: Option<String>, body: Option<String>) -> Option<String> {
    match (title, body) {
        (Some(t), Some(b)) => {
            let mut out = String::with_capacity(t.len() + 1 + b.len());
            out.push_str(&t);
            out.push('\n');
            out.push_str(&b);
            Some(out)
        }
        (Some(t), None) => Some(t),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// Appends comment texts, each on its own line. Comments alone do not make a post.
pub fn append_comments(text: Option<String>, comments: &[String]) -> Option<String> {
    let mut text = text?;
    for comment in comments {
        text.push('\n');
        text.push_str(comment);
    }
    Some(text)
}
