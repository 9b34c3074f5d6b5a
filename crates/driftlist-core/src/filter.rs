use anyhow::anyhow;
use chrono::{DateTime, Days, Local, Utc};

use crate::task::{Status, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueWindow {
    Today,
    Week,
    Overdue,
}

#[derive(Debug, Clone, PartialEq)]
enum Pred {
    StatusEq(Status),
    ProjectEq(String),
    TagHas(String),
    Due(DueWindow),
    Search(String),
}

/// Conjunction of predicates parsed from command-line terms:
/// `status:<active|paused|completed>`, `project:<name>`, `+tag`,
/// `due:<today|week|overdue>`, and bare words, which search title and
/// description case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    preds: Vec<Pred>,
}

impl Filter {
    pub fn parse(terms: &[String]) -> anyhow::Result<Self> {
        let mut preds = Vec::with_capacity(terms.len());

        for term in terms {
            if let Some(tag) = term.strip_prefix('+') {
                if tag.is_empty() {
                    return Err(anyhow!("empty tag filter"));
                }
                preds.push(Pred::TagHas(tag.to_string()));
                continue;
            }

            if let Some((key, value)) = term.split_once(':') {
                match key.to_ascii_lowercase().as_str() {
                    "status" => {
                        preds.push(Pred::StatusEq(value.parse()?));
                        continue;
                    }
                    "project" => {
                        preds.push(Pred::ProjectEq(value.to_ascii_lowercase()));
                        continue;
                    }
                    "due" => {
                        let window = match value.to_ascii_lowercase().as_str() {
                            "today" => DueWindow::Today,
                            "week" => DueWindow::Week,
                            "overdue" => DueWindow::Overdue,
                            other => {
                                return Err(anyhow!("invalid due window: {other}"));
                            }
                        };
                        preds.push(Pred::Due(window));
                        continue;
                    }
                    _ => {}
                }
            }

            preds.push(Pred::Search(term.to_lowercase()));
        }

        Ok(Self { preds })
    }

    pub fn is_empty(&self) -> bool {
        self.preds.is_empty()
    }

    pub fn matches(&self, task: &Task, now: DateTime<Utc>) -> bool {
        self.preds.iter().all(|pred| pred_matches(pred, task, now))
    }
}

fn pred_matches(pred: &Pred, task: &Task, now: DateTime<Utc>) -> bool {
    match pred {
        Pred::StatusEq(status) => task.status == *status,
        Pred::ProjectEq(project) => task.project.eq_ignore_ascii_case(project),
        Pred::TagHas(tag) => task.has_tag(tag),
        Pred::Due(window) => due_matches(*window, task, now),
        Pred::Search(needle) => {
            task.title.to_lowercase().contains(needle)
                || task
                    .description
                    .as_ref()
                    .is_some_and(|d| d.to_lowercase().contains(needle))
        }
    }
}

pub(crate) fn due_matches(window: DueWindow, task: &Task, now: DateTime<Utc>) -> bool {
    let Some(due) = task.due else {
        return false;
    };

    match window {
        DueWindow::Today => {
            due.with_timezone(&Local).date_naive() == now.with_timezone(&Local).date_naive()
        }
        DueWindow::Week => {
            let today = now.with_timezone(&Local).date_naive();
            let due_date = due.with_timezone(&Local).date_naive();
            let Some(horizon) = today.checked_add_days(Days::new(7)) else {
                return false;
            };
            due_date >= today && due_date < horizon
        }
        // Completed tasks are done; they stop counting as overdue.
        DueWindow::Overdue => due < now && task.status != Status::Completed,
    }
}
