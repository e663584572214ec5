//! Append-only, daily-rotated audit journal (spec §4.A).
//!
//! `state.json` is the authoritative snapshot; the journal is a secondary,
//! human-diffable record of *why* each commit happened, rotated one file
//! per UTC day so operators can prune old history without touching the
//! live snapshot.

use crate::error::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub summary: String,
}

pub struct JournalWriter {
    dir: PathBuf,
    current_date: Option<NaiveDate>,
    file: Option<std::fs::File>,
}

impl JournalWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current_date: None,
            file: None,
        }
    }

    fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("journal-{}.log", date.format("%Y-%m-%d")))
    }

    fn rotate_if_needed(&mut self, now: DateTime<Utc>) -> Result<()> {
        let today = now.date_naive();
        if self.current_date != Some(today) {
            std::fs::create_dir_all(&self.dir)?;
            let path = self.path_for(today);
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            self.file = Some(file);
            self.current_date = Some(today);
        }
        Ok(())
    }

    /// Append one entry, rotating to a new file if the UTC day has
    /// changed since the last append.
    pub fn append(&mut self, sequence: u64, summary: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.rotate_if_needed(now)?;
        let entry = JournalEntry {
            sequence,
            timestamp: now,
            summary: summary.into(),
        };
        let line = serde_json::to_string(&entry)?;
        let file = self.file.as_mut().expect("rotate_if_needed populates file");
        writeln!(file, "{line}")?;
        file.sync_data()?;
        Ok(())
    }

    /// Read back every entry from every journal file under `dir`, oldest
    /// first. Used by tests and by operator tooling; the daemon itself
    /// never needs to replay the journal since `state.json` is always the
    /// authoritative snapshot.
    pub fn read_all(dir: &Path) -> Result<Vec<JournalEntry>> {
        let mut files: Vec<PathBuf> = Vec::new();
        if dir.exists() {
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("log") {
                    files.push(path);
                }
            }
        }
        files.sort();
        let mut out = Vec::new();
        for path in files {
            let content = std::fs::read_to_string(path)?;
            for line in content.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                out.push(serde_json::from_str(line)?);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn append_and_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = JournalWriter::new(dir.path());
        let t = Utc.with_ymd_and_hms(2026, 7, 27, 10, 0, 0).unwrap();
        writer.append(1, "workstation w1 upserted", t).unwrap();
        writer.append(2, "workstation w1 deleted", t).unwrap();

        let entries = JournalWriter::read_all(dir.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].sequence, 1);
        assert_eq!(entries[1].summary, "workstation w1 deleted");
    }

    #[test]
    fn rotates_across_days() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = JournalWriter::new(dir.path());
        let day1 = Utc.with_ymd_and_hms(2026, 7, 27, 23, 59, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 7, 28, 0, 1, 0).unwrap();
        writer.append(1, "a", day1).unwrap();
        writer.append(2, "b", day2).unwrap();

        let mut names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec!["journal-2026-07-27.log", "journal-2026-07-28.log"]);
    }
}
