use crate::parser::Row;
use anyhow::{bail, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::info;

const DUMP_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

const MODIFIED_FIELDS: [&str; 3] = ["CreationDate", "LastEditDate", "LastActivityDate"];

/// Where a stream picks up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumeFrom {
    /// Skip rows up to and including the one with this `Id`.
    ///
    /// Assumes the dump is ordered by `Id`, which holds for official exports. On an
    /// unordered file rows after the checkpoint row but with smaller ids are still emitted.
    Id(u64),
    /// Only rows created, edited or active at or after this moment.
    Date(NaiveDateTime),
}

impl ResumeFrom {
    pub fn parse_date(value: &str) -> Result<Self> {
        match parse_timestamp(value) {
            Some(ts) => Ok(ResumeFrom::Date(ts)),
            None => bail!(
                "Unrecognized resume timestamp '{}', expected e.g. 2020-01-31T12:00:00.000",
                value
            ),
        }
    }
}

/// Parses dump timestamps (`2008-07-31T21:42:52.667`) and plain dates.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for fmt in DUMP_TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Latest of the row's creation, edit and activity dates.
///
/// `None` when the row has none of them; `None` orders before every real date.
pub fn last_modified(row: &Row) -> Option<NaiveDateTime> {
    MODIFIED_FIELDS
        .iter()
        .filter_map(|f| row.get_non_empty(f).and_then(parse_timestamp))
        .max()
}

/// Decides per row whether the stream has reached its resume point.
#[derive(Debug, Clone)]
pub struct ResumeFilter {
    from: ResumeFrom,
    reached: bool,
}

impl ResumeFilter {
    pub fn new(from: ResumeFrom) -> Self {
        Self {
            from,
            reached: false,
        }
    }

    pub fn from(&self) -> ResumeFrom {
        self.from
    }

    /// True once an id checkpoint has been passed. Date filters never latch.
    pub fn is_reached(&self) -> bool {
        self.reached
    }

    /// Returns true when the row should be processed.
    pub fn admits(&mut self, row: &Row) -> bool {
        match self.from {
            ResumeFrom::Id(checkpoint) => {
                if self.reached {
                    return true;
                }
                if row.get_id("Id") == Some(checkpoint) {
                    self.reached = true;
                    info!(id = checkpoint, "Reached resume checkpoint");
                }
                false
            }
            ResumeFrom::Date(checkpoint) => Some(checkpoint) <= last_modified(row),
        }
    }
}
