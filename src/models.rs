use anyhow::{bail, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Which dump file a stream reads, identified by its root element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Posts,
    Comments,
    Tags,
}

impl SourceKind {
    pub fn root_tag(self) -> &'static str {
        match self {
            SourceKind::Posts => "posts",
            SourceKind::Comments => "comments",
            SourceKind::Tags => "tags",
        }
    }
}

/// Which text fields are assembled into a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// Post `Title` only
    PostTitle,
    /// Post `Body` only
    PostBody,
    /// Title and body joined by a newline
    PostBoth,
    /// Title and body followed by every comment on the post
    AllText,
    /// Comment `Text`
    Comments,
    /// Parent post title followed by the comment text
    CommentsBoth,
    /// `TagName` from Tags.xml
    TagNames,
}

impl ContentType {
    pub const ALL: [ContentType; 7] = [
        ContentType::PostTitle,
        ContentType::PostBody,
        ContentType::PostBoth,
        ContentType::AllText,
        ContentType::Comments,
        ContentType::CommentsBoth,
        ContentType::TagNames,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::PostTitle => "post_title",
            ContentType::PostBody => "post_body",
            ContentType::PostBoth => "post_both",
            ContentType::AllText => "all_text",
            ContentType::Comments => "comments",
            ContentType::CommentsBoth => "comments_both",
            ContentType::TagNames => "tags",
        }
    }

    pub fn source_kind(self) -> SourceKind {
        match self {
            ContentType::PostTitle
            | ContentType::PostBody
            | ContentType::PostBoth
            | ContentType::AllText => SourceKind::Posts,
            ContentType::Comments | ContentType::CommentsBoth => SourceKind::Comments,
            ContentType::TagNames => SourceKind::Tags,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        match ContentType::ALL.iter().find(|c| c.as_str() == lowered) {
            Some(c) => Ok(*c),
            None => {
                let names: Vec<&str> = ContentType::ALL.iter().map(|c| c.as_str()).collect();
                bail!(
                    "Unrecognized content type '{}'. Acceptable content types: {}",
                    s,
                    names.join(", ")
                )
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostType {
    Question,
    Answer,
    /// Wiki excerpts, tag wikis, moderator nominations and the like
    Other(u32),
}

impl PostType {
    pub fn from_id(id: u32) -> Self {
        match id {
            1 => PostType::Question,
            2 => PostType::Answer,
            other => PostType::Other(other),
        }
    }

    pub fn id(self) -> u32 {
        match self {
            PostType::Question => 1,
            PostType::Answer => 2,
            PostType::Other(id) => id,
        }
    }
}

/// The unit handed to the caller: original fragment, normalized text and metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    pub html: String,
    pub text: String,
    pub meta: RecordMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMeta {
    pub source: &'static str,
    pub community: String,
    pub file_type: String,
    pub id: u64,
    #[serde(flatten)]
    pub details: RecordDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordDetails {
    Post(PostMeta),
    Comment(CommentMeta),
    Tag(TagMeta),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMeta {
    pub post_type: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_answer_id: Option<u64>,
    pub score: i64,
    pub view_count: u64,
    pub answer_count: u32,
    pub comment_count: u32,
    pub favorite_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_title: Option<String>,
    pub score: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagMeta {
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt_post_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wiki_post_id: Option<u64>,
}

impl RecordMeta {
    pub fn post(&self) -> Option<&PostMeta> {
        match &self.details {
            RecordDetails::Post(p) => Some(p),
            _ => None,
        }
    }

    pub fn comment(&self) -> Option<&CommentMeta> {
        match &self.details {
            RecordDetails::Comment(c) => Some(c),
            _ => None,
        }
    }

    pub fn tag(&self) -> Option<&TagMeta> {
        match &self.details {
            RecordDetails::Tag(t) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_parses_known_names() {
        assert_eq!("post_title".parse::<ContentType>().unwrap(), ContentType::PostTitle);
        assert_eq!("POST_BOTH".parse::<ContentType>().unwrap(), ContentType::PostBoth);
        assert_eq!(" all_text ".parse::<ContentType>().unwrap(), ContentType::AllText);
        assert_eq!("tags".parse::<ContentType>().unwrap(), ContentType::TagNames);
    }

    #[test]
    fn content_type_rejects_unknown() {
        let err = "post_summary".parse::<ContentType>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("post_summary"));
        assert!(msg.contains("comments_both"));
    }

    #[test]
    fn content_type_display_matches_parse() {
        for ct in ContentType::ALL {
            assert_eq!(ct.to_string().parse::<ContentType>().unwrap(), ct);
        }
    }

    #[test]
    fn content_type_source_kinds() {
        assert_eq!(ContentType::AllText.source_kind(), SourceKind::Posts);
        assert_eq!(ContentType::CommentsBoth.source_kind(), SourceKind::Comments);
        assert_eq!(ContentType::TagNames.source_kind().root_tag(), "tags");
    }

    #[test]
    fn post_type_ids() {
        assert_eq!(PostType::from_id(1), PostType::Question);
        assert_eq!(PostType::from_id(2), PostType::Answer);
        assert_eq!(PostType::from_id(5), PostType::Other(5));
        assert_eq!(PostType::Other(7).id(), 7);
    }

    #[test]
    fn record_serializes_camel_case_and_omits_absent() {
        let record = OutputRecord {
            html: "<p>Hi</p>".to_string(),
            text: "Hi".to_string(),
            meta: RecordMeta {
                source: "StackExchange",
                community: "ai.stackexchange.com".to_string(),
                file_type: "Posts".to_string(),
                id: 2,
                details: RecordDetails::Post(PostMeta {
                    post_type: 2,
                    parent_id: Some(1),
                    parent_tags: Some(vec!["python".to_string()]),
                    ..PostMeta::default()
                }),
            },
        };

        let json = serde_json::to_value(&record).unwrap();
        let meta = &json["meta"];
        assert_eq!(meta["source"], "StackExchange");
        assert_eq!(meta["fileType"], "Posts");
        assert_eq!(meta["id"], 2);
        assert_eq!(meta["postType"], 2);
        assert_eq!(meta["parentId"], 1);
        assert_eq!(meta["parentTags"][0], "python");
        assert!(meta.get("tags").is_none());
        assert!(meta.get("title").is_none());
    }
}
