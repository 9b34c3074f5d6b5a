use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::task::Task;

/// Device-scoped persistence: the whole task collection as one JSON blob
/// under a fixed name, plus the free-text quick notes. Reads never fail from
/// the caller's point of view; missing or unparseable data degrades to the
/// empty value.
#[derive(Debug)]
pub struct LocalStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub notes_path: PathBuf,
}

impl LocalStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.json");
        let notes_path = data_dir.join("notes.txt");

        if !tasks_path.exists() {
            fs::write(&tasks_path, "[]")?;
        }
        if !notes_path.exists() {
            fs::write(&notes_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            notes = %notes_path.display(),
            "opened local store"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            notes_path,
        })
    }

    /// Reads the persisted collection. A missing or corrupt blob is an empty
    /// collection, not an error.
    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> Vec<Task> {
        let raw = match fs::read_to_string(&self.tasks_path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(
                    file = %self.tasks_path.display(),
                    error = %err,
                    "could not read task blob; treating as empty"
                );
                return vec![];
            }
        };

        match serde_json::from_str::<Vec<Task>>(&raw) {
            Ok(tasks) => {
                debug!(count = tasks.len(), "loaded local task collection");
                tasks
            }
            Err(err) => {
                warn!(
                    file = %self.tasks_path.display(),
                    error = %err,
                    "corrupt task blob; treating as empty"
                );
                vec![]
            }
        }
    }

    /// Whole-collection overwrite, written atomically.
    #[tracing::instrument(skip(self, tasks))]
    pub fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        debug!(
            file = %self.tasks_path.display(),
            count = tasks.len(),
            "saving task collection"
        );

        let dir = self.tasks_path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        let serialized = serde_json::to_string(tasks)?;
        temp.write_all(serialized.as_bytes())?;
        temp.flush()?;

        temp.persist(&self.tasks_path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.tasks_path.display(), err))?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn notes(&self) -> String {
        match fs::read_to_string(&self.notes_path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(
                    file = %self.notes_path.display(),
                    error = %err,
                    "could not read notes; treating as empty"
                );
                String::new()
            }
        }
    }

    #[tracing::instrument(skip(self, notes))]
    pub fn set_notes(&self, notes: &str) -> anyhow::Result<()> {
        fs::write(&self.notes_path, notes)
            .with_context(|| format!("failed writing {}", self.notes_path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::task::{Status, TaskDraft, TaskId};

    fn sample_tasks() -> Vec<Task> {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid now");
        let mut draft = TaskDraft::new("buy milk");
        draft.tags = vec!["errand".to_string()];
        let first = Task::from_draft(TaskId::Local(1_712_000_000_000), draft, now);
        let second = Task::from_draft(TaskId::Local(1_712_000_000_001), TaskDraft::new("call"), now);
        vec![first, second]
    }

    #[test]
    fn round_trips_collection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::open(dir.path()).expect("open store");

        let tasks = sample_tasks();
        store.save_tasks(&tasks).expect("save");
        let loaded = store.load_tasks();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, tasks[0].id);
        assert_eq!(loaded[0].title, "buy milk");
        assert_eq!(loaded[0].tags, vec!["errand".to_string()]);
        assert_eq!(loaded[0].status, Status::Active);
        assert_eq!(loaded[0].created_at, tasks[0].created_at);
    }

    #[test]
    fn missing_blob_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::open(dir.path()).expect("open store");
        std::fs::remove_file(&store.tasks_path).expect("remove blob");

        assert!(store.load_tasks().is_empty());
    }

    #[test]
    fn corrupt_blob_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::open(dir.path()).expect("open store");
        std::fs::write(&store.tasks_path, "{not json").expect("write garbage");

        assert!(store.load_tasks().is_empty());
    }

    #[test]
    fn notes_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::open(dir.path()).expect("open store");

        assert_eq!(store.notes(), "");
        store.set_notes("remember the milk").expect("set notes");
        assert_eq!(store.notes(), "remember the milk");
    }
}
