use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::filter::{DueWindow, due_matches};
use crate::task::{Priority, Status, Task};

const URGENT_HORIZON_HOURS: i64 = 24;
const URGENT_LIMIT: usize = 5;

/// The sidebar numbers, derived fresh from the collection on demand.
#[derive(Debug, Clone, Default)]
pub struct TaskStats {
    pub total: usize,
    pub active: usize,
    pub paused: usize,
    pub completed: usize,
    pub by_project: BTreeMap<String, usize>,
    pub due_today: usize,
    pub due_week: usize,
    pub overdue: usize,
    pub urgent: Vec<Task>,
}

impl TaskStats {
    pub fn collect(tasks: &[Task], now: DateTime<Utc>) -> Self {
        let mut stats = Self {
            total: tasks.len(),
            ..Self::default()
        };

        for task in tasks {
            match task.status {
                Status::Active => stats.active += 1,
                Status::Paused => stats.paused += 1,
                Status::Completed => stats.completed += 1,
            }
            *stats.by_project.entry(task.project.clone()).or_insert(0) += 1;

            if due_matches(DueWindow::Today, task, now) {
                stats.due_today += 1;
            }
            if due_matches(DueWindow::Week, task, now) {
                stats.due_week += 1;
            }
            if due_matches(DueWindow::Overdue, task, now) {
                stats.overdue += 1;
            }
        }

        stats.urgent = tasks
            .iter()
            .filter(|task| is_urgent(task, now))
            .take(URGENT_LIMIT)
            .cloned()
            .collect();

        stats
    }

    /// Share of the collection that is completed, in whole percent.
    pub fn percent_complete(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed * 100) / self.total) as u32
    }
}

/// High-priority active tasks due within the next day.
fn is_urgent(task: &Task, now: DateTime<Utc>) -> bool {
    task.priority == Priority::High
        && task.status == Status::Active
        && task
            .due
            .is_some_and(|due| due < now + Duration::hours(URGENT_HORIZON_HOURS))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::task::{TaskDraft, TaskId};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    fn task(title: &str, id: i64) -> Task {
        Task::from_draft(TaskId::Local(id), TaskDraft::new(title), now())
    }

    #[test]
    fn counts_statuses_and_projects() {
        let mut a = task("one", 1);
        a.project = "work".to_string();
        let mut b = task("two", 2);
        b.status = Status::Completed;
        let mut c = task("three", 3);
        c.status = Status::Paused;

        let stats = TaskStats::collect(&[a, b, c], now());
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.paused, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.percent_complete(), 33);
        assert_eq!(stats.by_project.get("work"), Some(&1));
        assert_eq!(stats.by_project.get("personal"), Some(&2));
    }

    #[test]
    fn empty_collection_is_zero_percent() {
        let stats = TaskStats::collect(&[], now());
        assert_eq!(stats.percent_complete(), 0);
    }

    #[test]
    fn urgent_takes_high_priority_active_due_soon() {
        let mut urgent = task("fire", 1);
        urgent.priority = Priority::High;
        urgent.due = Some(now() + Duration::hours(3));

        let mut distant = task("later", 2);
        distant.priority = Priority::High;
        distant.due = Some(now() + Duration::days(3));

        let mut paused = task("parked", 3);
        paused.priority = Priority::High;
        paused.due = Some(now() + Duration::hours(3));
        paused.status = Status::Paused;

        let stats = TaskStats::collect(&[urgent, distant, paused], now());
        assert_eq!(stats.urgent.len(), 1);
        assert_eq!(stats.urgent[0].title, "fire");
    }

    #[test]
    fn overdue_ignores_completed_tasks() {
        let mut late = task("late", 1);
        late.due = Some(now() - Duration::hours(1));

        let mut finished = task("finished", 2);
        finished.due = Some(now() - Duration::hours(1));
        finished.status = Status::Completed;

        let stats = TaskStats::collect(&[late, finished], now());
        assert_eq!(stats.overdue, 1);
    }
}
