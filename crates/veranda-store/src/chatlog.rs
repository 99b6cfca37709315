//! Append-only human-readable text logs.
//!
//! One file per (network, subject, day) under
//! `<root>/<network>/<subject>/<YYYY-MM-DD>.log`, plus category files
//! (mentions, per-friend activity) under
//! `<root>/categories/<category>/<YYYY-MM-DD>.log`. Lines are appended
//! one write at a time; rotation is implicit in the date-keyed file name.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::Result;

/// Sink for human-readable log lines. Cheap to clone around; every call
/// opens, appends, and closes, so there is no shared file handle state.
#[derive(Debug, Clone)]
pub struct ChatLogSink {
    root: PathBuf,
}

impl ChatLogSink {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Append one line to the (network, subject, date) log.
    pub fn subject_line(
        &self,
        network: &str,
        subject: &str,
        date: NaiveDate,
        line: &str,
    ) -> Result<()> {
        let dir = self.root.join(sanitize(network)).join(sanitize(subject));
        self.append(&dir, date, line)
    }

    /// Append one line to the (category, date) log.
    pub fn category_line(&self, category: &str, date: NaiveDate, line: &str) -> Result<()> {
        let dir = self.root.join("categories").join(sanitize(category));
        self.append(&dir, date, line)
    }

    fn append(&self, dir: &Path, date: NaiveDate, line: &str) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.log", date.format("%Y-%m-%d")));
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// Replace filesystem-hostile characters in a network/subject/category
/// name so it is always usable as a directory component.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' | '.' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn test_subject_lines_append() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ChatLogSink::new(dir.path());

        sink.subject_line("efnet", "#general", day(), "12:00 <alice> hi").unwrap();
        sink.subject_line("efnet", "#general", day(), "12:01 <bob> hey").unwrap();

        let content =
            std::fs::read_to_string(dir.path().join("efnet/#general/2024-03-15.log")).unwrap();
        assert_eq!(content, "12:00 <alice> hi\n12:01 <bob> hey\n");
    }

    #[test]
    fn test_category_line() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ChatLogSink::new(dir.path());

        sink.category_line("mentions", day(), "12:00 #general <alice> hi op").unwrap();

        let content = std::fs::read_to_string(
            dir.path().join("categories/mentions/2024-03-15.log"),
        )
        .unwrap();
        assert!(content.contains("hi op"));
    }

    #[test]
    fn test_sanitize_hostile_names() {
        assert_eq!(sanitize("../etc"), "___etc");
        assert_eq!(sanitize("a/b:c"), "a_b_c");
        assert_eq!(sanitize("#general"), "#general");
    }
}
