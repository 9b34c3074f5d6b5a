use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::cli::Invocation;
use crate::datetime::parse_due_expr;
use crate::filter::Filter;
use crate::render::Renderer;
use crate::repo::{Persisted, TaskRepository};
use crate::stats::TaskStats;
use crate::task::{Priority, Repeat, Status, TaskDraft, TaskId, TaskPatch};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add",
        "list",
        "info",
        "modify",
        "done",
        "pause",
        "resume",
        "delete",
        "clear-completed",
        "stats",
        "notes",
        "sync",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(repo, renderer, inv))]
pub async fn dispatch(
    repo: &mut TaskRepository,
    renderer: &mut Renderer,
    remote_expected: bool,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();

    let loaded = repo.load().await?;
    notify_fallback(remote_expected, loaded);

    debug!(command = %inv.command, args = ?inv.args, "dispatching command");

    match inv.command.as_str() {
        "add" => cmd_add(repo, remote_expected, &inv.args, now).await,
        "list" => cmd_list(repo, renderer, &inv.args, now),
        "info" => cmd_info(repo, renderer, &inv.args),
        "modify" => cmd_modify(repo, remote_expected, &inv.args, now).await,
        "done" => cmd_toggle_complete(repo, remote_expected, &inv.args).await,
        "pause" => cmd_set_status(repo, remote_expected, &inv.args, Status::Paused).await,
        "resume" => cmd_set_status(repo, remote_expected, &inv.args, Status::Active).await,
        "delete" => cmd_delete(repo, remote_expected, &inv.args).await,
        "clear-completed" => cmd_clear_completed(repo, remote_expected).await,
        "stats" => cmd_stats(repo, renderer, now),
        "notes" => cmd_notes(repo, &inv.args),
        "sync" => cmd_sync(repo, loaded),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

/// A remote-backed session that quietly lands in the local store changed
/// the durability the user asked for; say so, off the main output stream.
fn notify_fallback(remote_expected: bool, persisted: Persisted) {
    if remote_expected && persisted == Persisted::Local {
        eprintln!("note: remote store unreachable; using local data");
    }
}

#[derive(Debug, Clone)]
enum Mod {
    TagAdd(String),
    TagRemove(String),
    Project(String),
    Priority(Priority),
    Assignee(Option<String>),
    Due(Option<DateTime<Utc>>),
    Repeat(Option<Repeat>),
}

#[instrument(skip(args, now))]
fn parse_title_and_mods(
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<(String, Vec<Mod>)> {
    let mut title_parts = Vec::new();
    let mut mods = Vec::new();

    let mut literal = false;
    for arg in args {
        if arg == "--" {
            literal = true;
            continue;
        }

        if !literal && let Some(one_mod) = parse_one_mod(arg, now)? {
            mods.push(one_mod);
            continue;
        }

        title_parts.push(arg.clone());
    }

    Ok((title_parts.join(" "), mods))
}

fn parse_one_mod(tok: &str, now: DateTime<Utc>) -> anyhow::Result<Option<Mod>> {
    if let Some(tag) = tok.strip_prefix('+') {
        if tag.is_empty() {
            return Err(anyhow!("empty tag"));
        }
        return Ok(Some(Mod::TagAdd(tag.to_string())));
    }
    if let Some(tag) = tok.strip_prefix('-') {
        if !tag.is_empty() && !tag.starts_with('-') {
            return Ok(Some(Mod::TagRemove(tag.to_string())));
        }
    }

    let Some((key, value)) = tok.split_once(':') else {
        return Ok(None);
    };

    match key.to_ascii_lowercase().as_str() {
        "project" => Ok(Some(Mod::Project(value.to_string()))),
        "pri" | "priority" => Ok(Some(Mod::Priority(value.parse()?))),
        "assignee" => {
            if value.is_empty() {
                Ok(Some(Mod::Assignee(None)))
            } else {
                Ok(Some(Mod::Assignee(Some(value.to_string()))))
            }
        }
        "due" => {
            if value.is_empty() {
                Ok(Some(Mod::Due(None)))
            } else {
                Ok(Some(Mod::Due(Some(parse_due_expr(value, now)?))))
            }
        }
        "repeat" => {
            if value.is_empty() || value.eq_ignore_ascii_case("none") {
                Ok(Some(Mod::Repeat(None)))
            } else {
                Ok(Some(Mod::Repeat(Some(value.parse()?))))
            }
        }
        _ => Ok(None),
    }
}

fn draft_from_mods(title: String, mods: Vec<Mod>) -> TaskDraft {
    let mut draft = TaskDraft::new(title);
    for one_mod in mods {
        match one_mod {
            Mod::TagAdd(tag) => {
                if !draft.tags.iter().any(|existing| *existing == tag) {
                    draft.tags.push(tag);
                }
            }
            Mod::TagRemove(tag) => {
                draft.tags.retain(|existing| *existing != tag);
            }
            Mod::Project(project) => draft.project = project,
            Mod::Priority(priority) => draft.priority = priority,
            Mod::Assignee(assignee) => draft.assignee = assignee,
            Mod::Due(due) => draft.due = due,
            Mod::Repeat(repeat) => draft.repeat = repeat,
        }
    }
    draft
}

fn patch_from_mods(title: String, mods: Vec<Mod>, current_tags: &[String]) -> TaskPatch {
    let mut patch = TaskPatch::default();
    if !title.is_empty() {
        patch.title = Some(title);
    }

    let mut tags: Option<Vec<String>> = None;
    for one_mod in mods {
        match one_mod {
            Mod::TagAdd(tag) => {
                let tags = tags.get_or_insert_with(|| current_tags.to_vec());
                if !tags.iter().any(|existing| *existing == tag) {
                    tags.push(tag);
                }
            }
            Mod::TagRemove(tag) => {
                let tags = tags.get_or_insert_with(|| current_tags.to_vec());
                tags.retain(|existing| *existing != tag);
            }
            Mod::Project(project) => patch.project = Some(project),
            Mod::Priority(priority) => patch.priority = Some(priority),
            Mod::Assignee(assignee) => patch.assignee = Some(assignee),
            Mod::Due(due) => patch.due = Some(due),
            Mod::Repeat(repeat) => patch.repeat = Some(repeat),
        }
    }
    patch.tags = tags;
    patch
}

fn parse_task_id(args: &[String]) -> anyhow::Result<TaskId> {
    let raw = args
        .first()
        .ok_or_else(|| anyhow!("a task id is required"))?;
    TaskId::parse(raw)
}

#[instrument(skip(repo, args, now))]
async fn cmd_add(
    repo: &mut TaskRepository,
    remote_expected: bool,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command add");

    let (title, mods) = parse_title_and_mods(args, now)?;
    let draft = draft_from_mods(title, mods);

    let outcome = repo.add(draft, now).await?;
    notify_fallback(remote_expected, outcome.persisted);
    println!("Created task {}.", outcome.task.id);
    Ok(())
}

#[instrument(skip(repo, renderer, args, now))]
fn cmd_list(
    repo: &TaskRepository,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command list");

    let filter = Filter::parse(args)?;
    let tasks: Vec<_> = repo
        .tasks()
        .iter()
        .filter(|task| filter.matches(task, now))
        .cloned()
        .collect();

    debug!(shown = tasks.len(), total = repo.tasks().len(), "listing tasks");
    renderer.print_task_table(&tasks, now)?;
    println!();
    println!("{} task(s)", tasks.len());
    Ok(())
}

#[instrument(skip(repo, renderer, args))]
fn cmd_info(
    repo: &TaskRepository,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command info");

    let id = parse_task_id(args)?;
    match repo.get(id) {
        Some(task) => renderer.print_task_info(task),
        None => {
            println!("No task {id}.");
            Ok(())
        }
    }
}

#[instrument(skip(repo, args, now))]
async fn cmd_modify(
    repo: &mut TaskRepository,
    remote_expected: bool,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command modify");

    let id = parse_task_id(args)?;
    let (title, mods) = parse_title_and_mods(&args[1..], now)?;

    let current_tags: Vec<String> = repo
        .get(id)
        .map(|task| task.tags.clone())
        .unwrap_or_default();
    let patch = patch_from_mods(title, mods, &current_tags);
    if patch.is_empty() {
        return Err(anyhow!("modify requires at least one change"));
    }

    match repo.update(id, patch).await? {
        Some(outcome) => {
            notify_fallback(remote_expected, outcome.persisted);
            println!("Modified task {}.", outcome.task.id);
        }
        None => println!("No task {id}."),
    }
    Ok(())
}

/// `done` toggles: completing an already-completed task reopens it.
#[instrument(skip(repo, args))]
async fn cmd_toggle_complete(
    repo: &mut TaskRepository,
    remote_expected: bool,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command done");

    let id = parse_task_id(args)?;
    let next = match repo.get(id) {
        Some(task) if task.status == Status::Completed => Status::Active,
        Some(_) => Status::Completed,
        None => {
            println!("No task {id}.");
            return Ok(());
        }
    };

    match repo.set_status(id, next).await? {
        Some(outcome) => {
            notify_fallback(remote_expected, outcome.persisted);
            println!("Task {} is now {}.", outcome.task.id, outcome.task.status.as_str());
        }
        None => println!("No task {id}."),
    }
    Ok(())
}

#[instrument(skip(repo, args))]
async fn cmd_set_status(
    repo: &mut TaskRepository,
    remote_expected: bool,
    args: &[String],
    next: Status,
) -> anyhow::Result<()> {
    info!(next = next.as_str(), "command set-status");

    let id = parse_task_id(args)?;
    match repo.set_status(id, next).await? {
        Some(outcome) => {
            notify_fallback(remote_expected, outcome.persisted);
            println!("Task {} is now {}.", outcome.task.id, outcome.task.status.as_str());
        }
        None => println!("No task {id}."),
    }
    Ok(())
}

#[instrument(skip(repo, args))]
async fn cmd_delete(
    repo: &mut TaskRepository,
    remote_expected: bool,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command delete");

    let id = parse_task_id(args)?;
    match repo.delete(id).await? {
        Some(outcome) => {
            notify_fallback(remote_expected, outcome.persisted);
            println!("Deleted task {id}.");
        }
        None => println!("No task {id}."),
    }
    Ok(())
}

#[instrument(skip(repo))]
async fn cmd_clear_completed(
    repo: &mut TaskRepository,
    remote_expected: bool,
) -> anyhow::Result<()> {
    info!("command clear-completed");

    let outcome = repo.clear_completed().await?;
    notify_fallback(remote_expected, outcome.persisted);
    println!("Cleared {} completed task(s).", outcome.removed);
    Ok(())
}

#[instrument(skip(repo, renderer, now))]
fn cmd_stats(
    repo: &TaskRepository,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command stats");

    let stats = TaskStats::collect(repo.tasks(), now);
    renderer.print_stats(&stats)
}

#[instrument(skip(repo, args))]
fn cmd_notes(repo: &TaskRepository, args: &[String]) -> anyhow::Result<()> {
    info!("command notes");

    if args.is_empty() {
        let notes = repo.notes();
        if notes.is_empty() {
            println!("(no notes)");
        } else {
            println!("{notes}");
        }
        return Ok(());
    }

    repo.set_notes(&args.join(" "))?;
    println!("Notes saved.");
    Ok(())
}

#[instrument(skip(repo))]
fn cmd_sync(repo: &TaskRepository, loaded: Persisted) -> anyhow::Result<()> {
    info!("command sync");

    let source = match loaded {
        Persisted::Remote => "remote store",
        Persisted::Local => "local store",
    };
    println!("{} task(s) loaded from the {source}.", repo.tasks().len());
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!("usage: drift [OPTIONS] <command> [args]");
    println!();
    println!("commands:");
    println!("  add <title> [modifiers]     create a task");
    println!("  list [filters]              show tasks");
    println!("  info <id>                   show one task");
    println!("  modify <id> [modifiers]     change a task");
    println!("  done <id>                   complete (or reopen) a task");
    println!("  pause <id>                  pause an active task");
    println!("  resume <id>                 reactivate a paused task");
    println!("  delete <id>                 remove a task");
    println!("  clear-completed             drop all completed tasks");
    println!("  stats                       collection statistics");
    println!("  notes [text]                show or replace quick notes");
    println!("  sync                        reload from the active store");
    println!();
    println!("modifiers: +tag -tag project:<p> priority:<l|m|h> due:<expr>");
    println!("           repeat:<daily|weekly|monthly> assignee:<name>");
    println!("filters:   status:<s> project:<p> +tag due:<today|week|overdue> <words>");
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn expands_unambiguous_abbreviations() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("ad", &known), Some("add"));
        assert_eq!(expand_command_abbrev("st", &known), Some("stats"));
        assert_eq!(expand_command_abbrev("de", &known), Some("delete"));
        assert_eq!(expand_command_abbrev("zzz", &known), None);
    }

    #[test]
    fn add_args_split_into_title_and_mods() {
        let args = strings(&["Buy", "milk", "+errand", "priority:high", "due:tomorrow"]);
        let (title, mods) = parse_title_and_mods(&args, now()).expect("parse args");
        assert_eq!(title, "Buy milk");
        assert_eq!(mods.len(), 3);

        let draft = draft_from_mods(title, mods);
        assert_eq!(draft.tags, vec!["errand".to_string()]);
        assert_eq!(draft.priority, Priority::High);
        assert!(draft.due.is_some());
    }

    #[test]
    fn literal_marker_turns_mods_into_title_words() {
        let args = strings(&["--", "call", "mom", "+1-555-0100"]);
        let (title, mods) = parse_title_and_mods(&args, now()).expect("parse args");
        assert_eq!(title, "call mom +1-555-0100");
        assert!(mods.is_empty());
    }

    #[test]
    fn empty_due_clears_in_patch() {
        let args = strings(&["due:", "repeat:none"]);
        let (title, mods) = parse_title_and_mods(&args, now()).expect("parse args");
        let patch = patch_from_mods(title, mods, &[]);
        assert_eq!(patch.due, Some(None));
        assert_eq!(patch.repeat, Some(None));
        assert!(patch.title.is_none());
    }

    #[test]
    fn tag_removal_starts_from_current_tags() {
        let args = strings(&["-errand", "+urgent"]);
        let (title, mods) = parse_title_and_mods(&args, now()).expect("parse args");
        let current = strings(&["errand", "home"]);
        let patch = patch_from_mods(title, mods, &current);
        assert_eq!(patch.tags, Some(strings(&["home", "urgent"])));
    }
}
