//! Durable last-seen records.
//!
//! Two independent maps: "when was there last activity on subject X" and
//! "where was person Y last active". Each is a single JSON document,
//! loaded once at startup and rewritten wholesale on every mutation.
//! The maps are tiny (one entry per subject / per friend), so wholesale
//! rewrite keeps the on-disk format trivially inspectable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;

const SUBJECTS_FILE: &str = "last_seen_subjects.json";
const PEOPLE_FILE: &str = "last_seen_people.json";

/// One last-seen record. For the subject map `counterpart` is the
/// username that was active; for the person map it is the subject the
/// person was active on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastSeenEntry {
    pub counterpart: String,
    pub at: DateTime<Utc>,
}

/// In-memory authoritative copy of both maps plus their file paths.
#[derive(Debug)]
pub struct LastSeenStore {
    dir: PathBuf,
    subjects: HashMap<String, LastSeenEntry>,
    people: HashMap<String, LastSeenEntry>,
}

impl LastSeenStore {
    /// Load both maps from `dir`, treating missing files as empty maps.
    /// A present-but-unreadable file is a hard error so that a corrupt
    /// store is noticed at startup rather than silently overwritten.
    pub fn load(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let subjects = load_map(&dir.join(SUBJECTS_FILE))?;
        let people = load_map(&dir.join(PEOPLE_FILE))?;

        info!(
            dir = %dir.display(),
            subjects = subjects.len(),
            people = people.len(),
            "Loaded last-seen store"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            subjects,
            people,
        })
    }

    /// Update the per-subject record and persist the subject map.
    pub fn record_subject(
        &mut self,
        subject: &str,
        username: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.subjects.insert(
            subject.to_string(),
            LastSeenEntry {
                counterpart: username.to_string(),
                at,
            },
        );
        self.save_map(SUBJECTS_FILE, &self.subjects)
    }

    /// Update the per-person record and persist the person map.
    pub fn record_person(&mut self, username: &str, subject: &str, at: DateTime<Utc>) -> Result<()> {
        self.people.insert(
            username.to_string(),
            LastSeenEntry {
                counterpart: subject.to_string(),
                at,
            },
        );
        self.save_map(PEOPLE_FILE, &self.people)
    }

    pub fn subject(&self, subject: &str) -> Option<&LastSeenEntry> {
        self.subjects.get(subject)
    }

    pub fn person(&self, username: &str) -> Option<&LastSeenEntry> {
        self.people.get(username)
    }

    pub fn subjects(&self) -> &HashMap<String, LastSeenEntry> {
        &self.subjects
    }

    pub fn people(&self) -> &HashMap<String, LastSeenEntry> {
        &self.people
    }

    fn save_map(&self, file: &str, map: &HashMap<String, LastSeenEntry>) -> Result<()> {
        let path = self.dir.join(file);
        let json = serde_json::to_string_pretty(map)?;
        std::fs::write(&path, json)?;
        debug!(path = %path.display(), entries = map.len(), "Persisted last-seen map");
        Ok(())
    }
}

fn load_map(path: &Path) -> Result<HashMap<String, LastSeenEntry>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastSeenStore::load(dir.path()).unwrap();
        assert!(store.subjects().is_empty());
        assert!(store.people().is_empty());
    }

    #[test]
    fn test_record_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let at = Utc::now();

        let mut store = LastSeenStore::load(dir.path()).unwrap();
        store.record_subject("#general@efnet", "alice", at).unwrap();
        store.record_person("alice", "#general@efnet", at).unwrap();

        let reloaded = LastSeenStore::load(dir.path()).unwrap();
        assert_eq!(reloaded.subject("#general@efnet").unwrap().counterpart, "alice");
        assert_eq!(reloaded.person("alice").unwrap().counterpart, "#general@efnet");
        assert_eq!(reloaded.person("alice").unwrap().at, at);
    }

    #[test]
    fn test_record_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = LastSeenStore::load(dir.path()).unwrap();

        store.record_subject("#a", "alice", Utc::now()).unwrap();
        store.record_subject("#a", "bob", Utc::now()).unwrap();

        assert_eq!(store.subject("#a").unwrap().counterpart, "bob");
        assert_eq!(store.subjects().len(), 1);
    }

    #[test]
    fn test_corrupt_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SUBJECTS_FILE), "not json").unwrap();
        assert!(LastSeenStore::load(dir.path()).is_err());
    }
}
