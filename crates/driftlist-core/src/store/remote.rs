use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::session::UserId;
use crate::task::{Priority, Repeat, Status, Task, TaskId};

/// Any failure talking to the record service. Always treated as transient
/// by the repository, which falls back to the local store.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote store error: {0}")]
    Service(String),

    #[error("remote request timed out")]
    Timeout,

    #[error("remote transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Row shape of the record service. Field names are the service's, not the
/// in-memory model's: `due_date` for `due`, `repeat_type` for `repeat`.
/// Unset text fields travel as empty strings, unset dates as nulls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub project: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub assignee: String,
    #[serde(default)]
    pub repeat_type: Option<Repeat>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

impl TaskRecord {
    /// The service owns `id` and `created_at`; everything it echoes back is
    /// canonical.
    pub fn into_task(self) -> Task {
        Task {
            id: TaskId::Remote(self.id),
            title: self.title,
            description: none_if_empty(self.description),
            due: self.due_date,
            priority: self.priority,
            project: self.project,
            tags: self.tags,
            assignee: none_if_empty(self.assignee),
            repeat: self.repeat_type,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// Insert/update payload: a record without the service-assigned fields.
#[derive(Debug, Clone, Serialize)]
pub struct NewTaskRecord {
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub project: String,
    pub tags: Vec<String>,
    pub assignee: String,
    pub repeat_type: Option<Repeat>,
    pub status: Status,
}

impl NewTaskRecord {
    pub fn from_task(task: &Task, user: &UserId) -> Self {
        Self {
            user_id: user.as_str().to_string(),
            title: task.title.clone(),
            description: task.description.clone().unwrap_or_default(),
            due_date: task.due,
            priority: task.priority,
            project: task.project.clone(),
            tags: task.tags.clone(),
            assignee: task.assignee.clone().unwrap_or_default(),
            repeat_type: task.repeat,
            status: task.status,
        }
    }
}

fn none_if_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

/// Record-oriented task service. Every call is scoped by the owning
/// identity at the query level, so cross-user access is impossible below
/// the application layer.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list(&self, user: &UserId) -> Result<Vec<TaskRecord>, RemoteError>;

    async fn insert(&self, record: NewTaskRecord) -> Result<TaskRecord, RemoteError>;

    async fn update(
        &self,
        id: Uuid,
        user: &UserId,
        record: NewTaskRecord,
    ) -> Result<TaskRecord, RemoteError>;

    async fn delete(&self, id: Uuid, user: &UserId) -> Result<(), RemoteError>;
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for a PostgREST-style row API: rows live under `/tasks`, filters
/// are query parameters (`user_id=eq.<id>`), and writes return the stored
/// representation when asked.
pub struct HttpRemoteStore {
    client: reqwest::Client,
    tasks_url: String,
    timeout: Duration,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, api_key: &str) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(api_key)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            tasks_url: format!("{}/tasks", base_url.trim_end_matches('/')),
            timeout: REQUEST_TIMEOUT,
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| RemoteError::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Service(format!("{status}: {body}")));
        }
        Ok(response)
    }

    /// Writes return a one-row representation; anything else is a service
    /// error.
    async fn single_row(&self, request: reqwest::RequestBuilder) -> Result<TaskRecord, RemoteError> {
        let response = self.send(request).await?;
        let mut rows: Vec<TaskRecord> = response.json().await?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            n => Err(RemoteError::Service(format!("expected one row, got {n}"))),
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    #[instrument(skip(self))]
    async fn list(&self, user: &UserId) -> Result<Vec<TaskRecord>, RemoteError> {
        let request = self.client.get(&self.tasks_url).query(&[
            ("select", "*"),
            ("user_id", &format!("eq.{user}")),
            ("order", "created_at.desc"),
        ]);

        let response = self.send(request).await?;
        let rows: Vec<TaskRecord> = response.json().await?;
        debug!(user = %user, count = rows.len(), "listed remote tasks");
        Ok(rows)
    }

    #[instrument(skip(self, record), fields(user = %record.user_id))]
    async fn insert(&self, record: NewTaskRecord) -> Result<TaskRecord, RemoteError> {
        let request = self
            .client
            .post(&self.tasks_url)
            .header("Prefer", "return=representation")
            .json(&record);

        self.single_row(request).await
    }

    #[instrument(skip(self, record), fields(id = %id, user = %user))]
    async fn update(
        &self,
        id: Uuid,
        user: &UserId,
        record: NewTaskRecord,
    ) -> Result<TaskRecord, RemoteError> {
        let request = self
            .client
            .patch(&self.tasks_url)
            .query(&[
                ("id", &format!("eq.{id}")),
                ("user_id", &format!("eq.{user}")),
            ])
            .header("Prefer", "return=representation")
            .json(&record);

        self.single_row(request).await
    }

    #[instrument(skip(self), fields(id = %id, user = %user))]
    async fn delete(&self, id: Uuid, user: &UserId) -> Result<(), RemoteError> {
        let request = self.client.delete(&self.tasks_url).query(&[
            ("id", &format!("eq.{id}")),
            ("user_id", &format!("eq.{user}")),
        ]);

        self.send(request).await?;
        Ok(())
    }
}
