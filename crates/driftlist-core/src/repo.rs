use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::session::{IdentityProvider, SessionEvent, UserId};
use crate::store::LocalStore;
use crate::store::remote::{NewTaskRecord, RemoteStore};
use crate::task::{Status, Task, TaskDraft, TaskId, TaskPatch};

/// Rejections raised before any store is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RepoError {
    #[error("task title must not be empty")]
    EmptyTitle,

    #[error("cannot move a {} task to {}", from.as_str(), to.as_str())]
    InvalidTransition { from: Status, to: Status },
}

/// Which store ended up holding the outcome of an operation. Remote
/// failures silently changed durability in the original app; callers here
/// always learn which path ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persisted {
    Local,
    Remote,
}

#[derive(Debug, Clone)]
pub struct AddOutcome {
    pub task: Task,
    pub persisted: Persisted,
}

#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub task: Task,
    pub persisted: Persisted,
}

#[derive(Debug, Clone, Copy)]
pub struct DeleteOutcome {
    pub persisted: Persisted,
}

#[derive(Debug, Clone, Copy)]
pub struct ClearOutcome {
    pub removed: usize,
    pub persisted: Persisted,
}

/// Single point of truth for the task lifecycle. Owns the in-memory
/// collection, routes each mutation to the remote store (when an identity
/// is present) or the local store, and keeps the collection fully
/// consistent before every return, storage failures included.
pub struct TaskRepository {
    tasks: Vec<Task>,
    local: LocalStore,
    remote: Option<Arc<dyn RemoteStore>>,
    identity: Arc<dyn IdentityProvider>,
}

impl TaskRepository {
    pub fn new(
        local: LocalStore,
        remote: Option<Arc<dyn RemoteStore>>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            tasks: vec![],
            local,
            remote,
            identity,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn notes(&self) -> String {
        self.local.notes()
    }

    pub fn set_notes(&self, notes: &str) -> anyhow::Result<()> {
        self.local.set_notes(notes)
    }

    fn remote_scope(&self) -> Option<(Arc<dyn RemoteStore>, UserId)> {
        let remote = self.remote.clone()?;
        let session = self.identity.current()?;
        Some((remote, session.user_id))
    }

    fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    /// Replaces the collection wholesale from the active store. With an
    /// identity: the remote collection, newest first; on remote failure or
    /// without an identity: whatever the local store holds.
    #[instrument(skip(self))]
    pub async fn load(&mut self) -> anyhow::Result<Persisted> {
        if let Some((remote, user)) = self.remote_scope() {
            match remote.list(&user).await {
                Ok(records) => {
                    self.tasks = records.into_iter().map(|r| r.into_task()).collect();
                    info!(count = self.tasks.len(), "loaded collection from remote store");
                    return Ok(Persisted::Remote);
                }
                Err(err) => {
                    warn!(error = %err, "remote load failed; reading local store");
                }
            }
        }

        self.tasks = self.local.load_tasks();
        info!(count = self.tasks.len(), "loaded collection from local store");
        Ok(Persisted::Local)
    }

    /// Creates a task from a draft. Exactly one task enters the collection
    /// per call: at the front, carrying either the service-assigned id or a
    /// freshly minted local one.
    #[instrument(skip(self, draft, now), fields(title = %draft.title))]
    pub async fn add(&mut self, mut draft: TaskDraft, now: DateTime<Utc>) -> anyhow::Result<AddOutcome> {
        draft.title = draft.title.trim().to_string();
        if draft.title.is_empty() {
            return Err(RepoError::EmptyTitle.into());
        }

        let staged = Task::from_draft(TaskId::Local(now.timestamp_millis()), draft, now);

        if let Some((remote, user)) = self.remote_scope() {
            match remote.insert(NewTaskRecord::from_task(&staged, &user)).await {
                Ok(record) => {
                    let task = record.into_task();
                    self.tasks.insert(0, task.clone());
                    info!(id = %task.id, "task added to remote store");
                    return Ok(AddOutcome {
                        task,
                        persisted: Persisted::Remote,
                    });
                }
                Err(err) => {
                    warn!(error = %err, "remote insert failed; keeping task locally");
                }
            }
        }

        let task = staged;
        self.tasks.insert(0, task.clone());
        self.local.save_tasks(&self.tasks)?;
        info!(id = %task.id, "task added to local store");
        Ok(AddOutcome {
            task,
            persisted: Persisted::Local,
        })
    }

    /// Applies a patch to the task with the given id. An absent id is a
    /// no-op reported as `Ok(None)`, never an error.
    #[instrument(skip(self, patch), fields(id = %id))]
    pub async fn update(&mut self, id: TaskId, patch: TaskPatch) -> anyhow::Result<Option<UpdateOutcome>> {
        if let Some(title) = &patch.title
            && title.trim().is_empty()
        {
            return Err(RepoError::EmptyTitle.into());
        }

        let Some(idx) = self.position(id) else {
            debug!(id = %id, "update target not found");
            return Ok(None);
        };

        patch.apply(&mut self.tasks[idx]);
        self.tasks[idx].title = self.tasks[idx].title.trim().to_string();

        let (task, persisted) = self.persist_existing(idx).await?;
        Ok(Some(UpdateOutcome { task, persisted }))
    }

    /// Moves a task along the status machine. Paused and completed are
    /// mutually unreachable; a request that would join them in one step is
    /// rejected with the status untouched and no store call made.
    #[instrument(skip(self), fields(id = %id, next = next.as_str()))]
    pub async fn set_status(
        &mut self,
        id: TaskId,
        next: Status,
    ) -> anyhow::Result<Option<UpdateOutcome>> {
        let Some(idx) = self.position(id) else {
            debug!(id = %id, "status target not found");
            return Ok(None);
        };

        let current = self.tasks[idx].status;
        if !current.can_transition_to(next) {
            return Err(RepoError::InvalidTransition {
                from: current,
                to: next,
            }
            .into());
        }

        self.tasks[idx].status = next;
        let (task, persisted) = self.persist_existing(idx).await?;
        Ok(Some(UpdateOutcome { task, persisted }))
    }

    /// Removes the task with the given id. A confirmed remote delete (or
    /// the absence of an identity) makes this exact; a failed remote delete
    /// still removes locally so the collection never shows a task the user
    /// already deleted.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete(&mut self, id: TaskId) -> anyhow::Result<Option<DeleteOutcome>> {
        let Some(idx) = self.position(id) else {
            debug!(id = %id, "delete target not found");
            return Ok(None);
        };

        if let Some((remote, user)) = self.remote_scope() {
            if let Some(uuid) = id.remote_uuid() {
                match remote.delete(uuid, &user).await {
                    Ok(()) => {
                        self.tasks.remove(idx);
                        info!(id = %id, "task deleted from remote store");
                        return Ok(Some(DeleteOutcome {
                            persisted: Persisted::Remote,
                        }));
                    }
                    Err(err) => {
                        warn!(error = %err, "remote delete failed; removing locally");
                    }
                }
            }
        }

        self.tasks.remove(idx);
        self.local.save_tasks(&self.tasks)?;
        info!(id = %id, "task removed from local store");
        Ok(Some(DeleteOutcome {
            persisted: Persisted::Local,
        }))
    }

    /// Drops every completed task. Store deletes are best-effort: this is
    /// bulk cleanup, and the next `load()` reconciles any drift.
    #[instrument(skip(self))]
    pub async fn clear_completed(&mut self) -> anyhow::Result<ClearOutcome> {
        let completed: Vec<Task> = self
            .tasks
            .iter()
            .filter(|task| task.status == Status::Completed)
            .cloned()
            .collect();
        self.tasks.retain(|task| task.status != Status::Completed);

        if let Some((remote, user)) = self.remote_scope() {
            for task in &completed {
                let Some(uuid) = task.id.remote_uuid() else {
                    continue;
                };
                if let Err(err) = remote.delete(uuid, &user).await {
                    warn!(id = %task.id, error = %err, "remote delete failed during cleanup");
                }
            }
            info!(removed = completed.len(), "cleared completed tasks remotely");
            return Ok(ClearOutcome {
                removed: completed.len(),
                persisted: Persisted::Remote,
            });
        }

        self.local.save_tasks(&self.tasks)?;
        info!(removed = completed.len(), "cleared completed tasks locally");
        Ok(ClearOutcome {
            removed: completed.len(),
            persisted: Persisted::Local,
        })
    }

    /// Session transitions replace the collection; nothing is merged across
    /// identities.
    #[instrument(skip(self))]
    pub async fn on_session_event(&mut self, event: SessionEvent) -> anyhow::Result<()> {
        match event {
            SessionEvent::SignedIn(user) => {
                info!(user = %user, "session signed in; reloading collection");
                self.tasks.clear();
                self.load().await?;
            }
            SessionEvent::SignedOut => {
                info!("session signed out; clearing collection");
                self.tasks.clear();
            }
        }
        Ok(())
    }

    /// Applies identity events to the repository until the provider's event
    /// stream closes. One-shot CLI invocations never see an event; a
    /// long-lived front end drives this beside its input loop.
    pub async fn watch_sessions(&mut self) -> anyhow::Result<()> {
        let mut events = self.identity.subscribe();
        loop {
            match events.recv().await {
                Ok(event) => self.on_session_event(event).await?,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "session events lagged; reloading");
                    self.tasks.clear();
                    self.load().await?;
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }

    /// Pushes the task at `idx` to the active store. Remote path: update
    /// for remote-shaped ids, insert for local-shaped ones, with the
    /// service's echoed record replacing the in-memory task (it owns id and
    /// creation timestamp). Any remote failure persists the whole
    /// collection locally instead.
    async fn persist_existing(&mut self, idx: usize) -> anyhow::Result<(Task, Persisted)> {
        if let Some((remote, user)) = self.remote_scope() {
            let record = NewTaskRecord::from_task(&self.tasks[idx], &user);
            let result = match self.tasks[idx].id.remote_uuid() {
                Some(uuid) => remote.update(uuid, &user, record).await,
                None => remote.insert(record).await,
            };

            match result {
                Ok(echoed) => {
                    let task = echoed.into_task();
                    self.tasks[idx] = task.clone();
                    debug!(id = %task.id, "task persisted remotely");
                    return Ok((task, Persisted::Remote));
                }
                Err(err) => {
                    warn!(error = %err, "remote save failed; persisting collection locally");
                }
            }
        }

        self.local.save_tasks(&self.tasks)?;
        let task = self.tasks[idx].clone();
        debug!(id = %task.id, "task persisted locally");
        Ok((task, Persisted::Local))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;
    use tokio::sync::broadcast;
    use uuid::Uuid;

    use super::*;
    use crate::session::Session;
    use crate::store::remote::{RemoteError, TaskRecord};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0)
            .single()
            .expect("valid now")
    }

    struct MockRemote {
        rows: Mutex<Vec<TaskRecord>>,
        failing: AtomicBool,
        inserts: AtomicUsize,
        updates: AtomicUsize,
        deletes: AtomicUsize,
    }

    impl MockRemote {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                rows: Mutex::new(vec![]),
                failing: AtomicBool::new(false),
                inserts: AtomicUsize::new(0),
                updates: AtomicUsize::new(0),
                deletes: AtomicUsize::new(0),
            })
        }

        fn fail(&self, on: bool) {
            self.failing.store(on, Ordering::SeqCst);
        }

        fn check_up(&self) -> Result<(), RemoteError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(RemoteError::Service("service unavailable".to_string()))
            } else {
                Ok(())
            }
        }

        fn rows(&self) -> Vec<TaskRecord> {
            self.rows.lock().expect("rows lock").clone()
        }

        fn insert_count(&self) -> usize {
            self.inserts.load(Ordering::SeqCst)
        }

        fn update_count(&self) -> usize {
            self.updates.load(Ordering::SeqCst)
        }

        fn delete_count(&self) -> usize {
            self.deletes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteStore for MockRemote {
        async fn list(&self, user: &UserId) -> Result<Vec<TaskRecord>, RemoteError> {
            self.check_up()?;
            let mut rows: Vec<TaskRecord> = self
                .rows
                .lock()
                .expect("rows lock")
                .iter()
                .filter(|row| row.user_id == user.as_str())
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(rows)
        }

        async fn insert(&self, record: NewTaskRecord) -> Result<TaskRecord, RemoteError> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            self.check_up()?;
            let row = TaskRecord {
                id: Uuid::new_v4(),
                user_id: record.user_id,
                title: record.title,
                description: record.description,
                due_date: record.due_date,
                priority: record.priority,
                project: record.project,
                tags: record.tags,
                assignee: record.assignee,
                repeat_type: record.repeat_type,
                status: record.status,
                created_at: Utc::now(),
            };
            self.rows.lock().expect("rows lock").push(row.clone());
            Ok(row)
        }

        async fn update(
            &self,
            id: Uuid,
            user: &UserId,
            record: NewTaskRecord,
        ) -> Result<TaskRecord, RemoteError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            self.check_up()?;
            let mut rows = self.rows.lock().expect("rows lock");
            let row = rows
                .iter_mut()
                .find(|row| row.id == id && row.user_id == user.as_str())
                .ok_or_else(|| RemoteError::Service("no such row".to_string()))?;
            row.title = record.title;
            row.description = record.description;
            row.due_date = record.due_date;
            row.priority = record.priority;
            row.project = record.project;
            row.tags = record.tags;
            row.assignee = record.assignee;
            row.repeat_type = record.repeat_type;
            row.status = record.status;
            Ok(row.clone())
        }

        async fn delete(&self, id: Uuid, user: &UserId) -> Result<(), RemoteError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.check_up()?;
            let mut rows = self.rows.lock().expect("rows lock");
            rows.retain(|row| !(row.id == id && row.user_id == user.as_str()));
            Ok(())
        }
    }

    struct ScriptedIdentity {
        session: Mutex<Option<Session>>,
        events: broadcast::Sender<SessionEvent>,
    }

    impl ScriptedIdentity {
        fn signed_in(user: &str) -> Arc<Self> {
            let (events, _) = broadcast::channel(8);
            Arc::new(Self {
                session: Mutex::new(Some(Session {
                    user_id: UserId(user.to_string()),
                })),
                events,
            })
        }

        fn signed_out() -> Arc<Self> {
            let (events, _) = broadcast::channel(8);
            Arc::new(Self {
                session: Mutex::new(None),
                events,
            })
        }

        fn set(&self, user: Option<&str>) {
            *self.session.lock().expect("session lock") = user.map(|user| Session {
                user_id: UserId(user.to_string()),
            });
        }

        fn emit(&self, event: SessionEvent) {
            let _ = self.events.send(event);
        }
    }

    impl IdentityProvider for ScriptedIdentity {
        fn current(&self) -> Option<Session> {
            self.session.lock().expect("session lock").clone()
        }

        fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
            self.events.subscribe()
        }
    }

    fn open_repo(
        dir: &Path,
        remote: Option<Arc<dyn RemoteStore>>,
        identity: Arc<dyn IdentityProvider>,
    ) -> TaskRepository {
        let local = LocalStore::open(dir).expect("open local store");
        TaskRepository::new(local, remote, identity)
    }

    fn persisted_blob(dir: &Path) -> Vec<Task> {
        LocalStore::open(dir).expect("reopen local store").load_tasks()
    }

    #[tokio::test]
    async fn add_with_identity_inserts_scoped_remote_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let remote = MockRemote::new();
        let identity = ScriptedIdentity::signed_in("user-1");
        let mut repo = open_repo(dir.path(), Some(remote.clone()), identity);

        let outcome = repo
            .add(TaskDraft::new("Buy milk"), fixed_now())
            .await
            .expect("add task");

        assert_eq!(outcome.persisted, Persisted::Remote);
        assert_eq!(repo.tasks().len(), 1);
        assert_eq!(repo.tasks()[0].title, "Buy milk");
        assert_eq!(repo.tasks()[0].status, Status::Active);
        assert!(repo.tasks()[0].id.is_remote());

        let rows = remote.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, "user-1");
        assert_eq!(remote.insert_count(), 1);
    }

    #[tokio::test]
    async fn offline_add_then_complete_persists_locally() {
        let dir = tempfile::tempdir().expect("tempdir");
        let identity = ScriptedIdentity::signed_out();
        let mut repo = open_repo(dir.path(), None, identity);

        let added = repo
            .add(TaskDraft::new("Water plants"), fixed_now())
            .await
            .expect("add task");
        assert_eq!(added.persisted, Persisted::Local);
        assert!(added.task.id.is_local());

        repo.set_status(added.task.id, Status::Completed)
            .await
            .expect("complete task")
            .expect("task exists");

        let blob = persisted_blob(dir.path());
        assert_eq!(blob.len(), 1);
        assert_eq!(blob[0].title, "Water plants");
        assert_eq!(blob[0].status, Status::Completed);
    }

    #[tokio::test]
    async fn empty_title_is_rejected_before_any_store_call() {
        let dir = tempfile::tempdir().expect("tempdir");
        let remote = MockRemote::new();
        let identity = ScriptedIdentity::signed_in("user-1");
        let mut repo = open_repo(dir.path(), Some(remote.clone()), identity);

        let err = repo
            .add(TaskDraft::new("   "), fixed_now())
            .await
            .expect_err("empty title must be rejected");

        assert_eq!(err.downcast_ref::<RepoError>(), Some(&RepoError::EmptyTitle));
        assert!(repo.tasks().is_empty());
        assert_eq!(remote.insert_count(), 0);
        assert!(persisted_blob(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn add_falls_back_to_local_when_remote_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let remote = MockRemote::new();
        remote.fail(true);
        let identity = ScriptedIdentity::signed_in("user-1");
        let mut repo = open_repo(dir.path(), Some(remote.clone()), identity);

        let outcome = repo
            .add(TaskDraft::new("Buy milk"), fixed_now())
            .await
            .expect("add task");

        assert_eq!(outcome.persisted, Persisted::Local);
        assert!(outcome.task.id.is_local());
        assert_eq!(repo.tasks().len(), 1);

        let blob = persisted_blob(dir.path());
        assert_eq!(blob.len(), 1);
        assert_eq!(blob[0].title, "Buy milk");
    }

    #[tokio::test]
    async fn update_not_found_is_a_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let identity = ScriptedIdentity::signed_out();
        let mut repo = open_repo(dir.path(), None, identity);

        let patch = TaskPatch {
            title: Some("renamed".to_string()),
            ..TaskPatch::default()
        };
        let outcome = repo
            .update(TaskId::Local(404), patch)
            .await
            .expect("update must not error");

        assert!(outcome.is_none());
        assert!(repo.tasks().is_empty());
    }

    #[tokio::test]
    async fn update_of_local_task_becomes_remote_insert() {
        let dir = tempfile::tempdir().expect("tempdir");
        let remote = MockRemote::new();
        let identity = ScriptedIdentity::signed_out();
        let mut repo = open_repo(dir.path(), Some(remote.clone()), identity.clone());

        let added = repo
            .add(TaskDraft::new("draft offline"), fixed_now())
            .await
            .expect("add task");
        assert!(added.task.id.is_local());

        identity.set(Some("user-1"));
        let patch = TaskPatch {
            title: Some("drafted while offline".to_string()),
            ..TaskPatch::default()
        };
        let updated = repo
            .update(added.task.id, patch)
            .await
            .expect("update task")
            .expect("task exists");

        assert_eq!(updated.persisted, Persisted::Remote);
        assert!(updated.task.id.is_remote());
        assert_eq!(repo.tasks()[0].id, updated.task.id);
        assert_eq!(remote.insert_count(), 1);
        assert_eq!(remote.update_count(), 0);

        let rows = remote.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "drafted while offline");
    }

    #[tokio::test]
    async fn update_of_remote_task_merges_echoed_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let remote = MockRemote::new();
        let identity = ScriptedIdentity::signed_in("user-1");
        let mut repo = open_repo(dir.path(), Some(remote.clone()), identity);

        let added = repo
            .add(TaskDraft::new("Buy milk"), fixed_now())
            .await
            .expect("add task");
        let remote_created = added.task.created_at;

        let patch = TaskPatch {
            title: Some("Buy oat milk".to_string()),
            priority: Some(crate::task::Priority::High),
            ..TaskPatch::default()
        };
        let updated = repo
            .update(added.task.id, patch)
            .await
            .expect("update task")
            .expect("task exists");

        assert_eq!(updated.persisted, Persisted::Remote);
        assert_eq!(updated.task.title, "Buy oat milk");
        assert_eq!(updated.task.id, added.task.id);
        assert_eq!(updated.task.created_at, remote_created);
        assert_eq!(remote.update_count(), 1);
    }

    #[tokio::test]
    async fn update_remote_failure_persists_collection_locally() {
        let dir = tempfile::tempdir().expect("tempdir");
        let remote = MockRemote::new();
        let identity = ScriptedIdentity::signed_in("user-1");
        let mut repo = open_repo(dir.path(), Some(remote.clone()), identity);

        let added = repo
            .add(TaskDraft::new("Buy milk"), fixed_now())
            .await
            .expect("add task");

        remote.fail(true);
        let patch = TaskPatch {
            title: Some("Buy oat milk".to_string()),
            ..TaskPatch::default()
        };
        let updated = repo
            .update(added.task.id, patch)
            .await
            .expect("update task")
            .expect("task exists");

        assert_eq!(updated.persisted, Persisted::Local);
        assert_eq!(repo.tasks()[0].title, "Buy oat milk");

        let blob = persisted_blob(dir.path());
        assert_eq!(blob.len(), 1);
        assert_eq!(blob[0].title, "Buy oat milk");
    }

    #[tokio::test]
    async fn paused_and_completed_never_meet_in_one_step() {
        let dir = tempfile::tempdir().expect("tempdir");
        let identity = ScriptedIdentity::signed_out();
        let mut repo = open_repo(dir.path(), None, identity);

        let added = repo
            .add(TaskDraft::new("deep work"), fixed_now())
            .await
            .expect("add task");
        repo.set_status(added.task.id, Status::Paused)
            .await
            .expect("pause task")
            .expect("task exists");

        let err = repo
            .set_status(added.task.id, Status::Completed)
            .await
            .expect_err("paused -> completed must be rejected");
        assert_eq!(
            err.downcast_ref::<RepoError>(),
            Some(&RepoError::InvalidTransition {
                from: Status::Paused,
                to: Status::Completed,
            })
        );
        assert_eq!(repo.tasks()[0].status, Status::Paused);

        repo.set_status(added.task.id, Status::Active)
            .await
            .expect("resume task")
            .expect("task exists");
        repo.set_status(added.task.id, Status::Completed)
            .await
            .expect("complete task")
            .expect("task exists");

        let err = repo
            .set_status(added.task.id, Status::Paused)
            .await
            .expect_err("completed -> paused must be rejected");
        assert_eq!(
            err.downcast_ref::<RepoError>(),
            Some(&RepoError::InvalidTransition {
                from: Status::Completed,
                to: Status::Paused,
            })
        );
        assert_eq!(repo.tasks()[0].status, Status::Completed);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let identity = ScriptedIdentity::signed_out();
        let mut repo = open_repo(dir.path(), None, identity);

        let added = repo
            .add(TaskDraft::new("one-shot"), fixed_now())
            .await
            .expect("add task");

        let first = repo.delete(added.task.id).await.expect("first delete");
        assert!(first.is_some());
        assert!(repo.tasks().is_empty());

        let second = repo.delete(added.task.id).await.expect("second delete");
        assert!(second.is_none());
        assert!(repo.tasks().is_empty());
        assert!(persisted_blob(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn delete_degrades_to_local_removal_when_remote_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let remote = MockRemote::new();
        let identity = ScriptedIdentity::signed_in("user-1");
        let mut repo = open_repo(dir.path(), Some(remote.clone()), identity);

        let added = repo
            .add(TaskDraft::new("Buy milk"), fixed_now())
            .await
            .expect("add task");

        remote.fail(true);
        let outcome = repo
            .delete(added.task.id)
            .await
            .expect("delete task")
            .expect("task exists");

        assert_eq!(outcome.persisted, Persisted::Local);
        assert!(repo.tasks().is_empty());
        assert!(persisted_blob(dir.path()).is_empty());
        assert_eq!(remote.rows().len(), 1);
    }

    #[tokio::test]
    async fn clear_completed_swallows_per_item_remote_failures() {
        let dir = tempfile::tempdir().expect("tempdir");
        let remote = MockRemote::new();
        let identity = ScriptedIdentity::signed_in("user-1");
        let mut repo = open_repo(dir.path(), Some(remote.clone()), identity);

        let keep = repo
            .add(TaskDraft::new("keep me"), fixed_now())
            .await
            .expect("add task");
        let done = repo
            .add(TaskDraft::new("finish me"), fixed_now())
            .await
            .expect("add task");
        repo.set_status(done.task.id, Status::Completed)
            .await
            .expect("complete task")
            .expect("task exists");

        remote.fail(true);
        let outcome = repo.clear_completed().await.expect("clear completed");

        assert_eq!(outcome.removed, 1);
        assert_eq!(repo.tasks().len(), 1);
        assert_eq!(repo.tasks()[0].id, keep.task.id);
        assert_eq!(remote.delete_count(), 1);
        // The remote row survives the failed delete; the next load() picks
        // the divergence back up.
        assert_eq!(remote.rows().len(), 2);
    }

    #[tokio::test]
    async fn load_falls_back_to_local_when_remote_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let remote = MockRemote::new();
        let identity = ScriptedIdentity::signed_out();
        let mut repo = open_repo(dir.path(), Some(remote.clone()), identity.clone());

        repo.add(TaskDraft::new("cached locally"), fixed_now())
            .await
            .expect("add task");

        identity.set(Some("user-1"));
        remote.fail(true);
        let mut fresh = open_repo(dir.path(), Some(remote.clone()), identity);
        let provenance = fresh.load().await.expect("load");

        assert_eq!(provenance, Persisted::Local);
        assert_eq!(fresh.tasks().len(), 1);
        assert_eq!(fresh.tasks()[0].title, "cached locally");
    }

    #[tokio::test]
    async fn watch_sessions_reloads_on_sign_in_events() {
        let dir = tempfile::tempdir().expect("tempdir");
        let remote = MockRemote::new();
        let seeder = ScriptedIdentity::signed_in("user-1");
        let mut seed_repo = open_repo(dir.path(), Some(remote.clone()), seeder);
        seed_repo
            .add(TaskDraft::new("already upstream"), fixed_now())
            .await
            .expect("seed remote row");

        let watcher_dir = tempfile::tempdir().expect("tempdir");
        let identity = ScriptedIdentity::signed_out();
        let mut repo = open_repo(watcher_dir.path(), Some(remote.clone()), identity.clone());
        assert!(repo.tasks().is_empty());

        let watch = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            repo.watch_sessions(),
        );
        let driver = async {
            identity.set(Some("user-1"));
            identity.emit(SessionEvent::SignedIn(UserId("user-1".to_string())));
        };
        let (watch_result, ()) = tokio::join!(watch, driver);

        // The provider outlives the watcher, so the stream never closes;
        // the timeout is what ends the watch.
        assert!(watch_result.is_err());
        assert_eq!(repo.tasks().len(), 1);
        assert_eq!(repo.tasks()[0].title, "already upstream");
    }

    #[tokio::test]
    async fn session_events_replace_or_clear_the_collection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let remote = MockRemote::new();
        let identity = ScriptedIdentity::signed_in("user-1");
        let mut repo = open_repo(dir.path(), Some(remote.clone()), identity.clone());

        repo.add(TaskDraft::new("remote task"), fixed_now())
            .await
            .expect("add task");
        assert_eq!(repo.tasks().len(), 1);

        identity.set(None);
        repo.on_session_event(SessionEvent::SignedOut)
            .await
            .expect("handle sign-out");
        assert!(repo.tasks().is_empty());

        identity.set(Some("user-1"));
        repo.on_session_event(SessionEvent::SignedIn(UserId("user-1".to_string())))
            .await
            .expect("handle sign-in");
        assert_eq!(repo.tasks().len(), 1);
        assert_eq!(repo.tasks()[0].title, "remote task");
        assert!(repo.tasks()[0].id.is_remote());
    }
}
