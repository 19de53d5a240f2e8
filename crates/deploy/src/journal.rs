//! Deployment journal: the durable record of which actions ran and what they produced.
//!
//! Entries are keyed by [`ActionKey`]. A `succeeded` entry is final: stores refuse to
//! overwrite it, and a file whose history shows one being overwritten is reported as
//! corrupt rather than silently replayed.

use std::{
    fs::{File, OpenOptions, TryLockError},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{action::ActionOutcome, error::JournalError, future::ActionKey};

/// Status of a journal entry.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntryStatus {
    /// Submission started; the outcome is unknown until a later entry says otherwise.
    Pending,
    Succeeded,
    Failed,
}

/// What is known about one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub status: EntryStatus,
    /// Fingerprint of the action definition the entry was recorded for.
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ActionOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn pending(fingerprint: impl Into<String>) -> Self {
        Self {
            status: EntryStatus::Pending,
            fingerprint: fingerprint.into(),
            result: None,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn succeeded(fingerprint: impl Into<String>, result: ActionOutcome) -> Self {
        Self {
            status: EntryStatus::Succeeded,
            fingerprint: fingerprint.into(),
            result: Some(result),
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn failed(fingerprint: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: EntryStatus::Failed,
            fingerprint: fingerprint.into(),
            result: None,
            error: Some(error.into()),
            recorded_at: Utc::now(),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == EntryStatus::Succeeded
    }
}

/// Storage for journal entries.
pub trait JournalStore {
    /// The latest entry recorded for `key`.
    fn lookup(&self, key: &ActionKey) -> Option<JournalEntry>;

    /// Replace the entry of `key`. The entry is durable once this returns.
    fn record(&mut self, key: &ActionKey, entry: JournalEntry) -> Result<(), JournalError>;

    /// All keys with their latest entry, in first-recorded order.
    fn entries(&self) -> Vec<(ActionKey, JournalEntry)>;
}

fn check_overwrite(
    current: Option<&JournalEntry>,
    key: &ActionKey,
) -> Result<(), JournalError> {
    match current {
        Some(entry) if entry.is_succeeded() => Err(JournalError::Resurrection { key: key.clone() }),
        _ => Ok(()),
    }
}

/// A journal that lives as long as the process. Useful for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryJournal {
    entries: IndexMap<ActionKey, JournalEntry>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JournalStore for MemoryJournal {
    fn lookup(&self, key: &ActionKey) -> Option<JournalEntry> {
        self.entries.get(key).cloned()
    }

    fn record(&mut self, key: &ActionKey, entry: JournalEntry) -> Result<(), JournalError> {
        check_overwrite(self.entries.get(key), key)?;
        self.entries.insert(key.clone(), entry);
        Ok(())
    }

    fn entries(&self) -> Vec<(ActionKey, JournalEntry)> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }
}

/// One line of a journal file.
#[derive(Debug, Serialize, Deserialize)]
struct JournalLine {
    module: String,
    id: String,
    entry: JournalEntry,
}

/// A JSON-lines journal file.
///
/// Every record is appended as a full entry and synced before [`JournalStore::record`]
/// returns; the latest line of a key wins on replay. The file is locked exclusively for
/// the lifetime of the handle, so two processes cannot drive the same deployment.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: File,
    entries: IndexMap<ActionKey, JournalEntry>,
}

impl FileJournal {
    /// Open (or create) the journal at `path` and replay its history.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        let io_err = |source| JournalError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(io_err)?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(JournalError::Locked {
                    path: path.display().to_string(),
                });
            }
            Err(TryLockError::Error(source)) => return Err(io_err(source)),
        }

        let mut content = Vec::new();
        file.read_to_end(&mut content).map_err(io_err)?;
        let Replay {
            entries,
            complete_len,
            unterminated,
        } = replay(&path, &content)?;

        if complete_len < content.len() {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = content.len() - complete_len,
                "Dropping a partially written journal entry"
            );
            file.set_len(complete_len as u64).map_err(io_err)?;
            file.sync_data().map_err(io_err)?;
        } else if unterminated {
            file.write_all(b"\n").map_err(io_err)?;
            file.sync_data().map_err(io_err)?;
        }

        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened journal");
        Ok(Self {
            path,
            file,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

struct Replay {
    entries: IndexMap<ActionKey, JournalEntry>,
    /// Length of the history made of complete entries.
    complete_len: usize,
    /// The last entry is complete but misses its newline.
    unterminated: bool,
}

/// Rebuild the entries of a journal file.
///
/// A last line without its newline that does not parse is a write torn by a crash and is
/// left out; an unparsable line anywhere else is corruption.
fn replay(path: &Path, content: &[u8]) -> Result<Replay, JournalError> {
    let mut entries: IndexMap<ActionKey, JournalEntry> = IndexMap::new();
    let mut offset = 0;
    let mut unterminated = false;

    for (i, raw) in content.split_inclusive(|b| *b == b'\n').enumerate() {
        let start = offset;
        offset += raw.len();
        let terminated = raw.ends_with(b"\n");
        if raw.trim_ascii().is_empty() {
            continue;
        }
        let corrupt = |reason: String| JournalError::Corrupt {
            location: format!("{}:{}", path.display(), i + 1),
            reason,
        };

        let line: JournalLine = match serde_json::from_slice(raw) {
            Ok(line) => line,
            Err(_) if !terminated => {
                return Ok(Replay {
                    entries,
                    complete_len: start,
                    unterminated: false,
                });
            }
            Err(e) => return Err(corrupt(format!("malformed entry ({e})"))),
        };
        unterminated = !terminated;
        let key = ActionKey::new(line.module, line.id);

        if let Some(previous) = entries.get(&key)
            && previous.is_succeeded()
            && !line.entry.is_succeeded()
        {
            return Err(corrupt(format!(
                "`{}` goes from succeeded back to {}",
                key, line.entry.status
            )));
        }
        entries.insert(key, line.entry);
    }

    Ok(Replay {
        entries,
        complete_len: content.len(),
        unterminated,
    })
}

impl JournalStore for FileJournal {
    fn lookup(&self, key: &ActionKey) -> Option<JournalEntry> {
        self.entries.get(key).cloned()
    }

    fn record(&mut self, key: &ActionKey, entry: JournalEntry) -> Result<(), JournalError> {
        check_overwrite(self.entries.get(key), key)?;

        let line = JournalLine {
            module: key.module.clone(),
            id: key.id.clone(),
            entry,
        };
        let mut json = serde_json::to_string(&line)
            .expect("JournalLine serialization should never fail");
        json.push('\n');

        let io_err = |source| JournalError::Io {
            path: self.path.display().to_string(),
            source,
        };
        let len = self.file.metadata().map_err(io_err)?.len();
        let written = self
            .file
            .write_all(json.as_bytes())
            .and_then(|()| self.file.sync_data());
        if let Err(source) = written {
            // Drop whatever part of the line reached the file.
            if let Err(e) = self.file.set_len(len) {
                tracing::error!(error = %e, path = %self.path.display(), "Failed to truncate journal after a failed write");
            }
            return Err(io_err(source));
        }

        tracing::trace!(action = %key, status = %line.entry.status, "Recorded journal entry");
        self.entries.insert(key.clone(), line.entry);
        Ok(())
    }

    fn entries(&self) -> Vec<(ActionKey, JournalEntry)> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }
}
