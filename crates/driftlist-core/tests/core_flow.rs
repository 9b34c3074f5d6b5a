use std::sync::Arc;

use chrono::Utc;
use driftlist_core::filter::Filter;
use driftlist_core::repo::{Persisted, TaskRepository};
use driftlist_core::session::ConfigIdentity;
use driftlist_core::store::LocalStore;
use driftlist_core::task::{Status, TaskDraft};
use tempfile::tempdir;

#[tokio::test]
async fn offline_lifecycle_round_trips_through_the_local_store() {
    let temp = tempdir().expect("tempdir");
    let now = Utc::now();

    let local = LocalStore::open(temp.path()).expect("open local store");
    let mut repo = TaskRepository::new(local, None, Arc::new(ConfigIdentity::anonymous()));
    assert_eq!(repo.load().await.expect("load"), Persisted::Local);

    let mut draft = TaskDraft::new("Write weekly report");
    draft.tags = vec!["work".to_string(), "urgent".to_string()];
    draft.project = "work".to_string();
    let added = repo.add(draft, now).await.expect("add task");
    assert_eq!(added.persisted, Persisted::Local);

    let filter = Filter::parse(&["+urgent".to_string(), "project:work".to_string()])
        .expect("parse filter");
    assert!(filter.matches(&repo.tasks()[0], now));

    repo.set_status(added.task.id, Status::Completed)
        .await
        .expect("complete task")
        .expect("task exists");

    // A fresh repository over the same data directory sees what was saved.
    let reopened = LocalStore::open(temp.path()).expect("reopen local store");
    let mut fresh = TaskRepository::new(reopened, None, Arc::new(ConfigIdentity::anonymous()));
    assert_eq!(fresh.load().await.expect("reload"), Persisted::Local);
    assert_eq!(fresh.tasks().len(), 1);
    assert_eq!(fresh.tasks()[0].title, "Write weekly report");
    assert_eq!(fresh.tasks()[0].status, Status::Completed);

    fresh
        .delete(added.task.id)
        .await
        .expect("delete task")
        .expect("task exists");
    assert!(fresh.tasks().is_empty());

    let second_delete = fresh.delete(added.task.id).await.expect("second delete");
    assert!(second_delete.is_none());
}
