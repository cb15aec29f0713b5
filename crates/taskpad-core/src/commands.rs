use anyhow::anyhow;
use tracing::{debug, info, instrument};

use crate::cli::Invocation;
use crate::config::Config;
use crate::error::TaskpadError;
use crate::render::Renderer;
use crate::storage::KeyValueStorage;
use crate::store::TaskStore;
use crate::task::{NewTask, TaskId};
use crate::view::StatusFilter;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "login", "logout", "whoami", "add", "modify", "done", "toggle", "delete", "list", "counts",
        "clear", "help", "version",
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

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch<S: KeyValueStorage>(
    store: &mut TaskStore<S>,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let command = inv.command.as_str();
    let args = inv.command_args.as_slice();

    debug!(command, ?args, "dispatching command");

    match command {
        "login" => cmd_login(store, args),
        "logout" => cmd_logout(store),
        "whoami" => cmd_whoami(store),
        "add" => cmd_add(store, args),
        "modify" => cmd_modify(store, args),
        "done" => cmd_done(store, args),
        "toggle" => cmd_toggle(store, args),
        "delete" => cmd_delete(store, args),
        "list" => cmd_list(store, cfg, renderer, args),
        "counts" => cmd_counts(store, renderer),
        "clear" => cmd_clear(store),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn require_session<S: KeyValueStorage>(store: &TaskStore<S>) -> Result<(), TaskpadError> {
    match store.username() {
        Some(_) => Ok(()),
        None => Err(TaskpadError::NotLoggedIn),
    }
}

fn cmd_login<S: KeyValueStorage>(store: &mut TaskStore<S>, args: &[String]) -> anyhow::Result<()> {
    info!("command login");
    store.login(&args.join(" "))?;
    println!("Logged in as {}.", store.username().unwrap_or_default());
    Ok(())
}

fn cmd_logout<S: KeyValueStorage>(store: &mut TaskStore<S>) -> anyhow::Result<()> {
    info!("command logout");
    if store.username().is_none() {
        println!("Not logged in.");
        return Ok(());
    }
    store.logout();
    println!("Logged out.");
    Ok(())
}

fn cmd_whoami<S: KeyValueStorage>(store: &TaskStore<S>) -> anyhow::Result<()> {
    match store.username() {
        Some(name) => println!("{name}"),
        None => println!("Not logged in."),
    }
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_add<S: KeyValueStorage>(store: &mut TaskStore<S>, args: &[String]) -> anyhow::Result<()> {
    info!("command add");
    require_session(store)?;

    let text = parse_task_text(args);
    let draft = NewTask::new(text.title, text.description.unwrap_or_default());
    let task = store.add_task(draft)?;

    println!("Created task {}.", task.id);
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_modify<S: KeyValueStorage>(store: &mut TaskStore<S>, args: &[String]) -> anyhow::Result<()> {
    info!("command modify");
    require_session(store)?;

    let (id, rest) = split_id(args)?;
    let mut task = store
        .task(id)
        .cloned()
        .ok_or(TaskpadError::UnknownTask(id))?;
    let text = parse_task_text(rest);
    if text.title.is_empty() && text.description.is_none() {
        return Err(anyhow!("modify needs a new title and/or desc:<text>"));
    }

    store.begin_edit(id);
    if !text.title.is_empty() {
        task.title = text.title;
    }
    if let Some(description) = text.description {
        task.description = description;
    }
    store.update_task(task)?;

    println!("Modified task {id}.");
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_done<S: KeyValueStorage>(store: &mut TaskStore<S>, args: &[String]) -> anyhow::Result<()> {
    info!("command done");
    require_session(store)?;

    let (id, _) = split_id(args)?;
    let task = store.task(id).ok_or(TaskpadError::UnknownTask(id))?;
    if task.completed {
        println!("Task {id} is already completed.");
        return Ok(());
    }
    store.toggle_complete(id);
    println!("Completed task {id}.");
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_toggle<S: KeyValueStorage>(store: &mut TaskStore<S>, args: &[String]) -> anyhow::Result<()> {
    info!("command toggle");
    require_session(store)?;

    let (id, _) = split_id(args)?;
    if !store.toggle_complete(id) {
        return Err(TaskpadError::UnknownTask(id).into());
    }
    let completed = store.task(id).is_some_and(|t| t.completed);
    if completed {
        println!("Completed task {id}.");
    } else {
        println!("Reopened task {id}.");
    }
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_delete<S: KeyValueStorage>(store: &mut TaskStore<S>, args: &[String]) -> anyhow::Result<()> {
    info!("command delete");
    require_session(store)?;

    let (id, _) = split_id(args)?;
    if !store.delete_task(id) {
        return Err(TaskpadError::UnknownTask(id).into());
    }
    println!("Deleted task {id}.");
    Ok(())
}

/// `list [all|completed|pending] [search...]`
#[instrument(skip(store, cfg, renderer, args))]
fn cmd_list<S: KeyValueStorage>(
    store: &mut TaskStore<S>,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command list");
    require_session(store)?;

    let (filter, search_terms) = match args.split_first() {
        Some((first, rest)) => match first.parse::<StatusFilter>() {
            Ok(filter) => (filter, rest),
            Err(_) => (cfg.default_filter()?, args),
        },
        None => (cfg.default_filter()?, args),
    };
    store.set_filter(filter);
    store.set_search(search_terms.join(" "));

    let counts = store.counts();
    renderer.print_filter_tabs(&counts, filter)?;
    renderer.print_task_table(&store.visible_tasks(), filter)?;
    Ok(())
}

fn cmd_counts<S: KeyValueStorage>(store: &TaskStore<S>, renderer: &mut Renderer) -> anyhow::Result<()> {
    require_session(store)?;
    renderer.print_counts(&store.counts())
}

fn cmd_clear<S: KeyValueStorage>(store: &mut TaskStore<S>) -> anyhow::Result<()> {
    info!("command clear");
    store.clear_all_data();
    println!("Cleared all tasks and the stored username.");
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "Commands: login <name>, logout, whoami, add <title> [desc:<text>], modify <id> [title] [desc:<text>], done <id>, toggle <id>, delete <id>, list [all|completed|pending] [search], counts, clear, version"
    );
    Ok(())
}

fn split_id(args: &[String]) -> anyhow::Result<(TaskId, &[String])> {
    let (first, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("a task id is required"))?;
    Ok((first.parse::<TaskId>()?, rest))
}

#[derive(Debug, Default, PartialEq, Eq)]
struct TaskText {
    title: String,
    description: Option<String>,
}

/// Words are title text until a `desc:` (or `description:`) token; that
/// token's remainder and everything after it is the description. A bare
/// `--` makes the rest literal title text.
fn parse_task_text(args: &[String]) -> TaskText {
    let mut title_parts: Vec<&str> = Vec::new();
    let mut desc_parts: Option<Vec<&str>> = None;
    let mut literal = false;

    for arg in args {
        if let Some(parts) = desc_parts.as_mut() {
            parts.push(arg);
            continue;
        }
        if !literal && arg == "--" {
            literal = true;
            continue;
        }
        if !literal
            && let Some(first) = arg
                .strip_prefix("desc:")
                .or_else(|| arg.strip_prefix("description:"))
        {
            desc_parts = Some(if first.is_empty() { vec![] } else { vec![first] });
            continue;
        }
        title_parts.push(arg);
    }

    TaskText {
        title: title_parts.join(" "),
        description: desc_parts.map(|parts| parts.join(" ")),
    }
}
