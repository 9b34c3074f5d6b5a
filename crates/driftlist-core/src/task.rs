use std::fmt;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Task identifier, tagged by the store that minted it.
///
/// `Local` ids are client-generated millisecond timestamps and exist only on
/// tasks that have never been persisted remotely. `Remote` ids are assigned
/// by the record service; once a task carries one, the local id is gone for
/// good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskId {
    Local(i64),
    Remote(Uuid),
}

impl TaskId {
    pub fn local_from_millis(millis: i64) -> Self {
        Self::Local(millis)
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    pub fn remote_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Remote(uuid) => Some(*uuid),
            Self::Local(_) => None,
        }
    }

    /// Canonical string form: `local_<millis>` or the hyphenated UUID.
    pub fn canonical(&self) -> String {
        match self {
            Self::Local(millis) => format!("local_{millis}"),
            Self::Remote(uuid) => uuid.to_string(),
        }
    }

    /// Classifies a raw id once, at the edge. Accepts the canonical forms
    /// plus bare numeric strings, which older local data used for
    /// client-minted ids.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let raw = raw.trim();
        if let Ok(uuid) = Uuid::parse_str(raw) {
            return Ok(Self::Remote(uuid));
        }
        if let Some(millis) = raw.strip_prefix("local_") {
            let millis = millis
                .parse::<i64>()
                .map_err(|_| anyhow!("invalid local task id: {raw}"))?;
            return Ok(Self::Local(millis));
        }
        if let Ok(millis) = raw.parse::<i64>() {
            return Ok(Self::Local(millis));
        }
        Err(anyhow!("unrecognized task id: {raw}"))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical())
    }
}

// Stored ids were historically a mix of numbers, numeric strings, and
// prefixed strings; deserialization tolerates all three.
impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Millis(i64),
            Text(String),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Millis(millis) => Ok(TaskId::Local(millis)),
            RawId::Text(text) => TaskId::parse(&text).map_err(D::Error::custom),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Paused,
    Completed,
}

impl Status {
    /// The only legal moves: active↔paused, active↔completed. Paused and
    /// completed never reach each other in a single step.
    pub fn can_transition_to(self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Active, Status::Paused)
                | (Status::Active, Status::Completed)
                | (Status::Paused, Status::Active)
                | (Status::Completed, Status::Active)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Paused => "paused",
            Status::Completed => "completed",
        }
    }
}

impl std::str::FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Status::Active),
            "paused" => Ok(Status::Paused),
            "completed" | "done" => Ok(Status::Completed),
            other => Err(anyhow!("invalid status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l" | "low" => Ok(Priority::Low),
            "m" | "med" | "medium" => Ok(Priority::Medium),
            "h" | "high" => Ok(Priority::High),
            other => Err(anyhow!("invalid priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    Daily,
    Weekly,
    Monthly,
}

impl Repeat {
    pub fn as_str(self) -> &'static str {
        match self {
            Repeat::Daily => "daily",
            Repeat::Weekly => "weekly",
            Repeat::Monthly => "monthly",
        }
    }
}

impl std::str::FromStr for Repeat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(Repeat::Daily),
            "weekly" => Ok(Repeat::Weekly),
            "monthly" => Ok(Repeat::Monthly),
            other => Err(anyhow!("invalid repeat kind: {other}")),
        }
    }
}

pub const DEFAULT_PROJECT: &str = "personal";

fn default_project() -> String {
    DEFAULT_PROJECT.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub due: Option<DateTime<Utc>>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default = "default_project")]
    pub project: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub assignee: Option<String>,

    #[serde(default)]
    pub repeat: Option<Repeat>,

    pub status: Status,

    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn from_draft(id: TaskId, draft: TaskDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            due: draft.due,
            priority: draft.priority,
            project: draft.project,
            tags: draft.tags,
            assignee: draft.assignee,
            repeat: draft.repeat,
            status: Status::Active,
            created_at: now,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Input to `TaskRepository::add`. Only the title is required; everything
/// else carries the app defaults.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub due: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub project: String,
    pub tags: Vec<String>,
    pub assignee: Option<String>,
    pub repeat: Option<Repeat>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            due: None,
            priority: Priority::Medium,
            project: default_project(),
            tags: vec![],
            assignee: None,
            repeat: None,
        }
    }
}

/// Input to `TaskRepository::update`. `None` leaves a field alone; the
/// doubled options distinguish "leave alone" from "clear".
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub due: Option<Option<DateTime<Utc>>>,
    pub priority: Option<Priority>,
    pub project: Option<String>,
    pub tags: Option<Vec<String>>,
    pub assignee: Option<Option<String>>,
    pub repeat: Option<Option<Repeat>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due.is_none()
            && self.priority.is_none()
            && self.project.is_none()
            && self.tags.is_none()
            && self.assignee.is_none()
            && self.repeat.is_none()
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(due) = &self.due {
            task.due = *due;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(project) = &self.project {
            task.project = project.clone();
        }
        if let Some(tags) = &self.tags {
            task.tags = tags.clone();
        }
        if let Some(assignee) = &self.assignee {
            task.assignee = assignee.clone();
        }
        if let Some(repeat) = &self.repeat {
            task.repeat = *repeat;
        }
    }
}
