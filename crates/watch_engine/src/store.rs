use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use watch_core::{ConflictError, Snapshot, SnapshotSummary, StoreError};

use crate::filename::snapshot_filename;
use crate::persist::{ensure_state_dir, AtomicFileWriter, PersistError};

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Last-committed snapshot per target, mutated only through a version check.
pub trait SnapshotStore: Send + Sync {
    fn get_current(&self, target_id: &str) -> Result<Option<Snapshot>, StoreError>;

    /// Install `candidate` if the stored version still equals `expected_prior_version`
    /// (`0` when nothing is stored). The candidate must carry the next version.
    fn commit_if_newer(
        &self,
        target_id: &str,
        candidate: Snapshot,
        expected_prior_version: u64,
    ) -> Result<Snapshot, StoreError>;

    /// Replaced versions, oldest first.
    fn history(&self, target_id: &str) -> Result<Vec<SnapshotSummary>, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotRecord {
    current: Snapshot,
    #[serde(default)]
    history: Vec<SnapshotSummary>,
}

impl SnapshotRecord {
    fn replaced_by(&self, candidate: Snapshot, history_limit: usize) -> SnapshotRecord {
        let mut history = self.history.clone();
        history.push(SnapshotSummary::from(&self.current));
        if history.len() > history_limit {
            let excess = history.len() - history_limit;
            history.drain(..excess);
        }
        SnapshotRecord {
            current: candidate,
            history,
        }
    }
}

fn check_candidate(
    target_id: &str,
    candidate: &Snapshot,
    expected_prior_version: u64,
    current: Option<&SnapshotRecord>,
) -> Result<(), StoreError> {
    if candidate.target_id != target_id {
        return Err(StoreError::InvalidCandidate {
            target_id: target_id.to_string(),
            reason: format!("candidate belongs to {}", candidate.target_id),
        });
    }
    if candidate.version != expected_prior_version + 1 {
        return Err(StoreError::InvalidCandidate {
            target_id: target_id.to_string(),
            reason: format!(
                "candidate version {} does not follow {}",
                candidate.version, expected_prior_version
            ),
        });
    }
    let actual = current.map_or(0, |record| record.current.version);
    if actual != expected_prior_version {
        return Err(ConflictError {
            target_id: target_id.to_string(),
            expected: expected_prior_version,
            actual,
        }
        .into());
    }
    Ok(())
}

fn next_record(
    current: Option<&SnapshotRecord>,
    candidate: Snapshot,
    history_limit: usize,
) -> SnapshotRecord {
    match current {
        Some(record) => record.replaced_by(candidate, history_limit),
        None => SnapshotRecord {
            current: candidate,
            history: Vec::new(),
        },
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Backend("snapshot store lock poisoned".to_string()))
}

/// In-process store for tests and dry runs.
#[derive(Debug)]
pub struct MemorySnapshotStore {
    records: Mutex<HashMap<String, SnapshotRecord>>,
    history_limit: usize,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            history_limit,
        }
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn get_current(&self, target_id: &str) -> Result<Option<Snapshot>, StoreError> {
        let records = lock(&self.records)?;
        Ok(records.get(target_id).map(|record| record.current.clone()))
    }

    fn commit_if_newer(
        &self,
        target_id: &str,
        candidate: Snapshot,
        expected_prior_version: u64,
    ) -> Result<Snapshot, StoreError> {
        let mut records = lock(&self.records)?;
        let current = records.get(target_id);
        check_candidate(target_id, &candidate, expected_prior_version, current)?;
        let record = next_record(current, candidate.clone(), self.history_limit);
        records.insert(target_id.to_string(), record);
        Ok(candidate)
    }

    fn history(&self, target_id: &str) -> Result<Vec<SnapshotSummary>, StoreError> {
        let records = lock(&self.records)?;
        Ok(records
            .get(target_id)
            .map(|record| record.history.clone())
            .unwrap_or_default())
    }
}

/// Durable store: one RON record per target under a state directory.
///
/// Every read goes to disk, so a commit is checked against whatever another store on
/// the same directory last wrote. Commits within this process are serialized.
#[derive(Debug)]
pub struct FileSnapshotStore {
    writer: AtomicFileWriter,
    history_limit: usize,
    commit_lock: Mutex<()>,
}

impl FileSnapshotStore {
    pub fn open(dir: impl Into<PathBuf>, history_limit: usize) -> Result<Self, PersistError> {
        let dir = dir.into();
        ensure_state_dir(&dir)?;
        Ok(Self {
            writer: AtomicFileWriter::new(dir),
            history_limit,
            commit_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        self.writer.dir()
    }

    /// Path of the record file for `target_id`, whether or not it exists yet.
    pub fn record_path(&self, target_id: &str) -> PathBuf {
        self.dir().join(snapshot_filename(target_id))
    }

    fn load(&self, target_id: &str) -> Result<Option<SnapshotRecord>, StoreError> {
        let path = self.record_path(target_id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StoreError::Backend(format!(
                    "reading {}: {err}",
                    path.display()
                )))
            }
        };
        let record: SnapshotRecord = ron::from_str(&content).map_err(|err| {
            StoreError::Backend(format!("parsing {}: {err}", path.display()))
        })?;
        if record.current.target_id != target_id {
            return Err(StoreError::Backend(format!(
                "{} holds a snapshot for {}",
                path.display(),
                record.current.target_id
            )));
        }
        Ok(Some(record))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn get_current(&self, target_id: &str) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.load(target_id)?.map(|record| record.current))
    }

    fn commit_if_newer(
        &self,
        target_id: &str,
        candidate: Snapshot,
        expected_prior_version: u64,
    ) -> Result<Snapshot, StoreError> {
        let _guard = lock(&self.commit_lock)?;
        let current = self.load(target_id)?;
        check_candidate(target_id, &candidate, expected_prior_version, current.as_ref())?;
        let record = next_record(current.as_ref(), candidate.clone(), self.history_limit);

        let content = ron::ser::to_string_pretty(&record, ron::ser::PrettyConfig::default())
            .map_err(|err| StoreError::Backend(format!("serializing {target_id}: {err}")))?;
        self.writer
            .write(&snapshot_filename(target_id), &content)
            .map_err(|err| StoreError::Backend(format!("writing {target_id}: {err}")))?;
        Ok(candidate)
    }

    fn history(&self, target_id: &str) -> Result<Vec<SnapshotSummary>, StoreError> {
        Ok(self
            .load(target_id)?
            .map(|record| record.history)
            .unwrap_or_default())
    }
}
