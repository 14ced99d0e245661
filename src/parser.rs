use crate::config::READ_BUFFER_SIZE;
use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

const ROW_TAG: &[u8] = b"row";

/// Attributes of a single `<row/>` element. Lives for one loop iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    attrs: FxHashMap<String, String>,
}

impl Row {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Like [`Row::get`] but treats an empty attribute as missing.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn take(&mut self, key: &str) -> Option<String> {
        self.attrs.remove(key)
    }

    /// Parses an identifier attribute. Unparseable values are logged and treated as missing.
    pub fn get_id(&self, key: &str) -> Option<u64> {
        let raw = self.get_non_empty(key)?;
        match raw.trim().parse::<u64>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(field = key, value = raw, "Unparseable identifier");
                None
            }
        }
    }

    /// Numeric counters default to zero when missing or malformed.
    pub fn get_count(&self, key: &str) -> u64 {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0)
    }

    /// Small numeric fields (`PostTypeId`, per-post counts). Out-of-range values are missing.
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.trim().parse::<u32>().ok())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.trim().parse::<i64>().ok())
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            attrs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DumpEvent {
    /// The document root (`posts`, `comments`, `tags`, ...)
    Open(String),
    Row(Row),
    Close(String),
}

/// Element-by-element walk over a StackExchange dump.
///
/// Only the current element is held in memory; its buffer is reused for the next one.
/// The underlying reader is owned, so the file handle closes when this is dropped.
pub struct DumpReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    depth: usize,
}

impl DumpReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open dump file: {}", path.display()))?;
        Ok(Self::from_reader(BufReader::with_capacity(
            READ_BUFFER_SIZE,
            file,
        )))
    }
}

impl<R: BufRead> DumpReader<R> {
    pub fn from_reader(inner: R) -> Self {
        let mut reader = Reader::from_reader(inner);
        reader.trim_text(true);
        Self {
            reader,
            buf: Vec::with_capacity(8 * 1024),
            depth: 0,
        }
    }

    /// Byte offset into the input, for error messages.
    pub fn position(&self) -> usize {
        self.reader.buffer_position()
    }

    /// Returns the next structural event, or `Ok(None)` at end of input.
    pub fn next_event(&mut self) -> Result<Option<DumpEvent>> {
        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!(
                            "XML parse error at position {}",
                            self.reader.buffer_position()
                        )
                    })
                }
            };

            match event {
                Event::Start(e) => {
                    self.depth += 1;
                    if self.depth == 1 {
                        return Ok(Some(DumpEvent::Open(element_name(&e))));
                    }
                    if e.name().as_ref() == ROW_TAG {
                        return Ok(Some(DumpEvent::Row(parse_row(&e))));
                    }
                }
                Event::Empty(e) => {
                    if self.depth == 0 {
                        return Ok(Some(DumpEvent::Open(element_name(&e))));
                    }
                    if e.name().as_ref() == ROW_TAG {
                        return Ok(Some(DumpEvent::Row(parse_row(&e))));
                    }
                }
                Event::End(e) => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return Ok(Some(DumpEvent::Close(
                            String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                        )));
                    }
                }
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for DumpReader<R> {
    type Item = Result<DumpEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// Malformed attributes are skipped; a value with a bad escape falls back to its raw text.
fn parse_row(e: &BytesStart<'_>) -> Row {
    let mut attrs = FxHashMap::default();
    for attr in e.attributes() {
        let attr = match attr {
            Ok(a) => a,
            Err(err) => {
                warn!(error = %err, "Skipping malformed attribute");
                continue;
            }
        };
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attrs.insert(key, value);
    }
    Row { attrs }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(xml: &str) -> Vec<DumpEvent> {
        DumpReader::from_reader(xml.as_bytes())
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn reads_root_rows_and_close() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<posts>
  <row Id="1" Title="Hello" />
  <row Id="2" Body="&lt;p&gt;Hi&lt;/p&gt;" />
</posts>"#;
        let evs = events(xml);
        assert_eq!(evs.len(), 4);
        assert_eq!(evs[0], DumpEvent::Open("posts".to_string()));
        match &evs[2] {
            DumpEvent::Row(row) => {
                assert_eq!(row.get("Id"), Some("2"));
                assert_eq!(row.get("Body"), Some("<p>Hi</p>"));
            }
            other => panic!("expected row, got {:?}", other),
        }
        assert_eq!(evs[3], DumpEvent::Close("posts".to_string()));
    }

    #[test]
    fn non_row_children_are_ignored() {
        let xml = r#"<posts><meta x="1"/><row Id="7"/></posts>"#;
        let evs = events(xml);
        assert_eq!(evs.len(), 3);
        assert!(matches!(&evs[1], DumpEvent::Row(r) if r.get("Id") == Some("7")));
    }

    #[test]
    fn empty_root_is_reported() {
        let evs = events("<comments/>");
        assert_eq!(evs, vec![DumpEvent::Open("comments".to_string())]);
    }

    #[test]
    fn row_with_children_is_still_a_row() {
        let xml = r#"<tags><row Id="3"><extra/></row></tags>"#;
        let evs = events(xml);
        assert_eq!(evs.len(), 3);
        assert!(matches!(&evs[1], DumpEvent::Row(r) if r.get("Id") == Some("3")));
        assert_eq!(evs[2], DumpEvent::Close("tags".to_string()));
    }

    #[test]
    fn mismatched_close_is_an_error() {
        let mut reader = DumpReader::from_reader(r#"<posts><row Id="1"/></comments>"#.as_bytes());
        assert!(matches!(reader.next(), Some(Ok(DumpEvent::Open(_)))));
        assert!(matches!(reader.next(), Some(Ok(DumpEvent::Row(_)))));
        assert!(matches!(reader.next(), Some(Err(_))));
    }

    #[test]
    fn row_accessors() {
        let row: Row = [
            ("Id", "42"),
            ("Score", "-3"),
            ("AnswerCount", "x"),
            ("Title", ""),
            ("ParentId", "abc"),
        ]
        .into_iter()
        .collect();
        assert_eq!(row.get_id("Id"), Some(42));
        assert_eq!(row.get_i64("Score"), Some(-3));
        assert_eq!(row.get_count("AnswerCount"), 0);
        assert_eq!(row.get_count("ViewCount"), 0);
        assert_eq!(row.get("Title"), Some(""));
        assert_eq!(row.get_non_empty("Title"), None);
        assert_eq!(row.get_id("ParentId"), None);
        assert_eq!(row.len(), 5);
    }

    #[test]
    fn small_fields_reject_out_of_range_values() {
        let row: Row = [("PostTypeId", "4294967297"), ("AnswerCount", " 3 "), ("Score", "-1")]
            .into_iter()
            .collect();
        assert_eq!(row.get_u32("PostTypeId"), None);
        assert_eq!(row.get_u32("AnswerCount"), Some(3));
        assert_eq!(row.get_u32("Score"), None);
        assert_eq!(row.get_u32("Missing"), None);
    }

    #[test]
    fn take_removes_attribute() {
        let mut row: Row = [("Body", "text")].into_iter().collect();
        assert_eq!(row.take("Body"), Some("text".to_string()));
        assert_eq!(row.get("Body"), None);
        assert!(row.is_empty());
    }
}
