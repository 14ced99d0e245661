use crate::config::CHECKPOINT_VERSION;
use crate::models::ContentType;
use crate::resume::ResumeFrom;
use crate::stats::StreamStats;
use crate::tracker::ParentTracker;
use anyhow::{Context, Result};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

#[derive(Serialize, Deserialize, Clone, Default, Debug, PartialEq)]
pub struct CheckpointStats {
    pub rows_seen: u64,
    pub records_parsed: u64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Checkpoint {
    pub version: u32,
    pub input_path: String,
    pub input_mtime: u64,
    pub content_type: String,
    /// Id of the last row the stream processed, emitted or not.
    pub last_row_id: u64,
    pub stats: CheckpointStats,
    /// Questions still waiting for answers at `last_row_id`.
    pub tracker: ParentTracker,
}

impl Checkpoint {
    /// Resume right after the last row this checkpoint recorded.
    pub fn resume_from(&self) -> ResumeFrom {
        ResumeFrom::Id(self.last_row_id)
    }
}

fn get_input_mtime(input_path: &str) -> Result<u64> {
    let metadata = fs::metadata(input_path)
        .with_context(|| format!("Failed to get metadata for: {}", input_path))?;
    let mtime = metadata
        .modified()
        .context("Failed to get modification time")?
        .duration_since(SystemTime::UNIX_EPOCH)
        .context("Invalid modification time")?
        .as_secs();
    Ok(mtime)
}

/// Returns the checkpoint only if it was written for this input and content type.
pub fn load_if_valid(
    checkpoint_path: &Path,
    input_path: &str,
    content_type: ContentType,
) -> Result<Option<Checkpoint>> {
    if !checkpoint_path.exists() {
        return Ok(None);
    }

    let file_size = fs::metadata(checkpoint_path).map(|m| m.len()).unwrap_or(0);

    let file = File::open(checkpoint_path).context("Failed to open checkpoint file")?;
    let reader = BufReader::new(file);

    let options = bincode::options().with_limit(file_size.saturating_add(1024));

    let checkpoint: Checkpoint = match options.deserialize_from(reader) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Checkpoint file is corrupt or unreadable");
            return Ok(None);
        }
    };

    if checkpoint.version != CHECKPOINT_VERSION {
        info!(
            cached = checkpoint.version,
            current = CHECKPOINT_VERSION,
            "Checkpoint version mismatch"
        );
        return Ok(None);
    }

    if checkpoint.input_path != input_path {
        info!(
            cached = checkpoint.input_path,
            current = input_path,
            "Checkpoint input path mismatch"
        );
        return Ok(None);
    }

    let current_mtime = get_input_mtime(input_path)?;
    if checkpoint.input_mtime != current_mtime {
        info!(
            cached_mtime = checkpoint.input_mtime,
            current_mtime = current_mtime,
            "Input file has changed since checkpoint was created"
        );
        return Ok(None);
    }

    if checkpoint.content_type != content_type.as_str() {
        info!(
            cached = checkpoint.content_type,
            current = content_type.as_str(),
            "Checkpoint content type mismatch"
        );
        return Ok(None);
    }

    info!(
        last_id = checkpoint.last_row_id,
        records = checkpoint.stats.records_parsed,
        open_questions = checkpoint.tracker.len(),
        "Loaded valid checkpoint"
    );

    Ok(Some(checkpoint))
}

pub fn clear(checkpoint_path: &Path) -> Result<()> {
    if checkpoint_path.exists() {
        fs::remove_file(checkpoint_path)
            .with_context(|| format!("Failed to remove checkpoint file: {:?}", checkpoint_path))?;
        info!("Checkpoint cleared");
    }
    Ok(())
}

/// Periodically records the last processed row id and the open questions behind it.
pub struct CheckpointManager {
    checkpoint_path: PathBuf,
    input_path: String,
    input_mtime: u64,
    content_type: ContentType,
    interval: u64,
    records_since_save: u64,
}

impl CheckpointManager {
    pub fn new(
        checkpoint_path: impl Into<PathBuf>,
        input_path: &str,
        content_type: ContentType,
        interval: u64,
    ) -> Result<Self> {
        let input_mtime = get_input_mtime(input_path)?;
        Ok(Self {
            checkpoint_path: checkpoint_path.into(),
            input_path: input_path.to_string(),
            input_mtime,
            content_type,
            interval: interval.max(1),
            records_since_save: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// Saves once every `interval` calls; returns whether a save happened.
    pub fn maybe_save(
        &mut self,
        last_id: u64,
        stats: &StreamStats,
        tracker: &ParentTracker,
    ) -> Result<bool> {
        self.records_since_save += 1;
        if self.records_since_save < self.interval {
            return Ok(false);
        }
        self.save(last_id, stats, tracker)?;
        Ok(true)
    }

    pub fn save(
        &mut self,
        last_id: u64,
        stats: &StreamStats,
        tracker: &ParentTracker,
    ) -> Result<()> {
        let checkpoint = Checkpoint {
            version: CHECKPOINT_VERSION,
            input_path: self.input_path.clone(),
            input_mtime: self.input_mtime,
            content_type: self.content_type.as_str().to_string(),
            last_row_id: last_id,
            stats: stats.to_checkpoint(),
            tracker: tracker.clone(),
        };

        if let Some(parent) = self.checkpoint_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {:?}", parent))?;
            }
        }

        let tmp_path = self.checkpoint_path.with_extension("tmp");
        let file = File::create(&tmp_path)
            .with_context(|| format!("Failed to create temp checkpoint file: {:?}", tmp_path))?;
        let writer = BufWriter::new(file);

        bincode::DefaultOptions::new()
            .serialize_into(writer, &checkpoint)
            .context("Failed to serialize checkpoint")?;

        fs::rename(&tmp_path, &self.checkpoint_path).with_context(|| {
            format!(
                "Failed to rename temp checkpoint: {:?}",
                self.checkpoint_path
            )
        })?;

        self.records_since_save = 0;

        debug!(
            last_id,
            records = stats.parsed(),
            open_questions = tracker.len(),
            "Checkpoint saved"
        );

        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        clear(&self.checkpoint_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_input(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("Posts.xml");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "<posts></posts>").unwrap();
        path
    }

    fn stats_with(parsed: u64) -> StreamStats {
        let mut stats = StreamStats::new();
        for _ in 0..parsed {
            stats.inc_seen();
            stats.inc_parsed();
        }
        stats
    }

    #[test]
    fn load_if_valid_returns_none_when_no_checkpoint() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let result = load_if_valid(
            &dir.path().join("missing.ckpt"),
            input_path.to_str().unwrap(),
            ContentType::PostBody,
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let input_str = input_path.to_str().unwrap();
        let ckpt = dir.path().join("run.ckpt");

        let mut tracker = ParentTracker::new();
        tracker.observe_question(40, Some(vec!["python".to_string()]), Some("How?".into()), 2);
        tracker.resolve_answer(40);

        let mut manager =
            CheckpointManager::new(&ckpt, input_str, ContentType::PostBody, 100).unwrap();
        manager.save(42, &stats_with(3), &tracker).unwrap();

        let loaded = load_if_valid(&ckpt, input_str, ContentType::PostBody)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.last_row_id, 42);
        assert_eq!(loaded.stats.records_parsed, 3);
        assert_eq!(loaded.resume_from(), ResumeFrom::Id(42));
        assert_eq!(loaded.tracker, tracker);
        assert_eq!(loaded.tracker.get(40).unwrap().seen_answers, 1);
    }

    #[test]
    fn invalidated_by_content_type_change() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let input_str = input_path.to_str().unwrap();
        let ckpt = dir.path().join("run.ckpt");

        let mut manager =
            CheckpointManager::new(&ckpt, input_str, ContentType::PostBody, 100).unwrap();
        manager.save(42, &StreamStats::new(), &ParentTracker::new()).unwrap();

        let loaded = load_if_valid(&ckpt, input_str, ContentType::PostTitle).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn invalidated_by_input_change() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let input_str = input_path.to_str().unwrap();
        let ckpt = dir.path().join("run.ckpt");

        let mut manager =
            CheckpointManager::new(&ckpt, input_str, ContentType::PostBody, 100).unwrap();
        manager.save(42, &StreamStats::new(), &ParentTracker::new()).unwrap();

        // mtime has second granularity
        std::thread::sleep(std::time::Duration::from_secs(1));
        let mut file = File::create(&input_path).unwrap();
        writeln!(file, "<posts><row Id=\"1\"/></posts>").unwrap();

        let loaded = load_if_valid(&ckpt, input_str, ContentType::PostBody).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn invalidated_by_input_path_change() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let other = dir.path().join("Other.xml");
        fs::copy(&input_path, &other).unwrap();
        let ckpt = dir.path().join("run.ckpt");

        let mut manager = CheckpointManager::new(
            &ckpt,
            input_path.to_str().unwrap(),
            ContentType::PostBody,
            100,
        )
        .unwrap();
        manager.save(42, &StreamStats::new(), &ParentTracker::new()).unwrap();

        let loaded = load_if_valid(&ckpt, other.to_str().unwrap(), ContentType::PostBody).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn clear_removes_checkpoint() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let ckpt = dir.path().join("run.ckpt");

        let mut manager = CheckpointManager::new(
            &ckpt,
            input_path.to_str().unwrap(),
            ContentType::Comments,
            100,
        )
        .unwrap();
        manager.save(7, &StreamStats::new(), &ParentTracker::new()).unwrap();
        assert!(ckpt.exists());

        manager.clear().unwrap();
        assert!(!ckpt.exists());
        assert!(clear(&ckpt).is_ok());
    }

    #[test]
    fn maybe_save_respects_interval() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let ckpt = dir.path().join("run.ckpt");
        let mut manager = CheckpointManager::new(
            &ckpt,
            input_path.to_str().unwrap(),
            ContentType::PostBody,
            3,
        )
        .unwrap();
        let stats = StreamStats::new();
        let tracker = ParentTracker::new();

        assert!(!manager.maybe_save(1, &stats, &tracker).unwrap());
        assert!(!manager.maybe_save(2, &stats, &tracker).unwrap());
        assert!(manager.maybe_save(3, &stats, &tracker).unwrap());

        // Counter resets
        assert!(!manager.maybe_save(4, &stats, &tracker).unwrap());
        assert!(!manager.maybe_save(5, &stats, &tracker).unwrap());
        assert!(manager.maybe_save(6, &stats, &tracker).unwrap());
    }

    #[test]
    fn corrupt_checkpoint_returns_none() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let ckpt = dir.path().join("run.ckpt");

        let mut file = File::create(&ckpt).unwrap();
        file.write_all(b"not valid bincode").unwrap();

        let result = load_if_valid(&ckpt, input_path.to_str().unwrap(), ContentType::PostBody)
            .unwrap();
        assert!(result.is_none());
    }
}
