use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{format_local_date, format_local_datetime};
use crate::stats::TaskStats;
use crate::task::{Priority, Status, Task};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.color().unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, tasks, now))]
    pub fn print_task_table(&mut self, tasks: &[Task], now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "St".to_string(),
            "Pri".to_string(),
            "Due".to_string(),
            "Project".to_string(),
            "Title".to_string(),
            "Tags".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());

        for task in tasks {
            let id = self.paint(&task.id.canonical(), "33");

            let status = match task.status {
                Status::Active => "a".to_string(),
                Status::Paused => self.paint("p", "36"),
                Status::Completed => self.paint("c", "32"),
            };

            let priority = match task.priority {
                Priority::High => self.paint("H", "31"),
                Priority::Medium => "M".to_string(),
                Priority::Low => "L".to_string(),
            };

            let due = task.due.map(format_local_date).unwrap_or_default();
            let due = if let Some(task_due) = task.due {
                if task_due < now && task.status != Status::Completed {
                    self.paint(&due, "31")
                } else {
                    due
                }
            } else {
                due
            };

            let tags = task
                .tags
                .iter()
                .map(|tag| format!("+{tag}"))
                .collect::<Vec<_>>()
                .join(" ");

            rows.push(vec![
                id,
                status,
                priority,
                due,
                task.project.clone(),
                task.title.clone(),
                tags,
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "title     {}", task.title)?;
        writeln!(out, "status    {}", task.status.as_str())?;
        if let Some(description) = &task.description {
            writeln!(out, "desc      {description}")?;
        }
        writeln!(out, "project   {}", task.project)?;
        writeln!(out, "priority  {}", task.priority.as_str())?;
        if !task.tags.is_empty() {
            writeln!(out, "tags      {}", task.tags.join(", "))?;
        }
        if let Some(assignee) = &task.assignee {
            writeln!(out, "assignee  {assignee}")?;
        }
        if let Some(due) = task.due {
            writeln!(out, "due       {}", format_local_datetime(due))?;
        }
        if let Some(repeat) = task.repeat {
            writeln!(out, "repeat    {}", repeat.as_str())?;
        }
        writeln!(out, "created   {}", format_local_datetime(task.created_at))?;

        Ok(())
    }

    #[tracing::instrument(skip(self, stats))]
    pub fn print_stats(&mut self, stats: &TaskStats) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "total      {}", stats.total)?;
        writeln!(out, "active     {}", stats.active)?;
        writeln!(out, "paused     {}", stats.paused)?;
        writeln!(out, "completed  {}", stats.completed)?;
        writeln!(out, "done       {}%", stats.percent_complete())?;
        writeln!(out, "due today  {}", stats.due_today)?;
        writeln!(out, "due week   {}", stats.due_week)?;
        writeln!(out, "overdue    {}", stats.overdue)?;

        if !stats.by_project.is_empty() {
            writeln!(out)?;
            for (project, count) in &stats.by_project {
                writeln!(out, "{project:12} {count}")?;
            }
        }

        if !stats.urgent.is_empty() {
            writeln!(out)?;
            writeln!(out, "urgent:")?;
            for task in &stats.urgent {
                let due = task.due.map(format_local_datetime).unwrap_or_default();
                writeln!(out, "  {} ({due})", task.title)?;
            }
        }

        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
