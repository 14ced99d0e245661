use crate::config::PROGRESS_INTERVAL;
use crate::models::{PostType, SourceKind};
use crate::parser::{DumpEvent, DumpReader};
use anyhow::{bail, Context, Result};
use indicatif::ProgressBar;
use rustc_hash::FxHashMap;
use std::io::BufRead;
use std::path::Path;
use tracing::info;

/// Lookups into a second dump file, loaded fully before the main stream starts.
///
/// Only the fields needed for joins are kept: comment texts per post (from Comments.xml)
/// and question titles plus answer parents (from Posts.xml).
#[derive(Debug, Default)]
pub struct CrossReference {
    comments_by_post: FxHashMap<u64, Vec<String>>,
    titles: FxHashMap<u64, String>,
    answer_parents: FxHashMap<u64, u64>,
}

impl CrossReference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_comments(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading comments from: {}", path.display());
        let reader = DumpReader::open(path)?;
        Self::build(reader, SourceKind::Comments)
            .with_context(|| format!("Failed to load comments from: {}", path.display()))
    }

    pub fn load_posts(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading post titles from: {}", path.display());
        let reader = DumpReader::open(path)?;
        Self::build(reader, SourceKind::Posts)
            .with_context(|| format!("Failed to load posts from: {}", path.display()))
    }

    pub fn comments_from_reader<R: BufRead>(reader: R) -> Result<Self> {
        Self::build(DumpReader::from_reader(reader), SourceKind::Comments)
    }

    pub fn posts_from_reader<R: BufRead>(reader: R) -> Result<Self> {
        Self::build(DumpReader::from_reader(reader), SourceKind::Posts)
    }

    fn build<R: BufRead>(mut reader: DumpReader<R>, kind: SourceKind) -> Result<Self> {
        let mut xref = Self::new();
        let pb = ProgressBar::new_spinner();
        let mut rows = 0u64;

        while let Some(event) = reader.next_event()? {
            match event {
                DumpEvent::Open(root) => {
                    if root != kind.root_tag() {
                        bail!(
                            "Expected a <{}> document for cross-referencing, found <{}>",
                            kind.root_tag(),
                            root
                        );
                    }
                }
                DumpEvent::Row(mut row) => {
                    rows += 1;
                    if rows % PROGRESS_INTERVAL == 0 {
                        pb.tick();
                    }
                    let Some(id) = row.get_id("Id") else {
                        continue;
                    };
                    match kind {
                        SourceKind::Comments => {
                            if let (Some(post_id), Some(text)) =
                                (row.get_id("PostId"), row.take("Text"))
                            {
                                if !text.is_empty() {
                                    xref.add_comment(post_id, text);
                                }
                            }
                        }
                        SourceKind::Posts => {
                            match row.get_u32("PostTypeId").map(PostType::from_id) {
                                Some(PostType::Question) => {
                                    if let Some(title) =
                                        row.take("Title").filter(|t| !t.is_empty())
                                    {
                                        xref.add_title(id, title);
                                    }
                                }
                                Some(PostType::Answer) => {
                                    if let Some(parent) = row.get_id("ParentId") {
                                        xref.add_answer(id, parent);
                                    }
                                }
                                _ => {}
                            }
                        }
                        SourceKind::Tags => {}
                    }
                }
                DumpEvent::Close(_) => break,
            }
        }

        pb.finish_and_clear();

        info!(
            rows,
            posts_with_comments = xref.comments_by_post.len(),
            titles = xref.titles.len(),
            answers = xref.answer_parents.len(),
            "Cross-reference loaded"
        );

        Ok(xref)
    }

    pub fn add_comment(&mut self, post_id: u64, text: impl Into<String>) {
        self.comments_by_post
            .entry(post_id)
            .or_default()
            .push(text.into());
    }

    pub fn add_title(&mut self, post_id: u64, title: impl Into<String>) {
        self.titles.insert(post_id, title.into());
    }

    pub fn add_answer(&mut self, answer_id: u64, parent_id: u64) {
        self.answer_parents.insert(answer_id, parent_id);
    }

    /// Comment texts on a post in dump order; empty when there are none.
    pub fn comments_for(&self, post_id: u64) -> &[String] {
        self.comments_by_post
            .get(&post_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Title of a question, or of the question an answer belongs to.
    pub fn title_for(&self, post_id: u64) -> Option<&str> {
        if let Some(title) = self.titles.get(&post_id) {
            return Some(title.as_str());
        }
        let parent = self.answer_parents.get(&post_id)?;
        self.titles.get(parent).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.comments_by_post.is_empty() && self.titles.is_empty() && self.answer_parents.is_empty()
    }
}
