//! The store operations behind the command line, composed from a
//! [`Store`] and freshly parsed collections.

use crate::interlude::*;

use std::time::Duration;

use crate::collection::{TaskCollection, TaskPattern};
use crate::parser::{self, ParseError, Source};
use crate::store::Store;
use crate::task::Task;

#[derive(Debug, thiserror::Error)]
#[error(
    "task `{task}` not found{}",
    .file.as_ref().map(|file| format!(" in {file}")).unwrap_or_default()
)]
pub struct TaskNotFound {
    pub task: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallNotice {
    Installed(String),
    Updated(String),
    AlreadyExists { task: String, store: PathBuf },
}

impl std::fmt::Display for InstallNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Installed(task) => write!(f, "=> Installing task `{task}`"),
            Self::Updated(task) => write!(f, "=> Updating task `{task}`"),
            Self::AlreadyExists { task, store } => {
                write!(f, "!! Task `{task}` already exists in {}", store.display())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallNotice {
    /// Carries the rendered text of what was removed.
    Removed { task: String, text: String },
    NotInstalled(String),
}

impl std::fmt::Display for UninstallNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Removed { text, .. } => write!(f, "{text}"),
            Self::NotInstalled(task) => write!(f, "!! Task `{task}` is not installed"),
        }
    }
}

/// Adds the tasks of `source` to the store, or only those named in
/// `targets` when any are given.
///
/// Existing names are left alone unless `force` is set in which case
/// they're replaced. The store is saved once at the end.
#[tracing::instrument(skip(store, source))]
pub async fn install(
    store: &mut Store,
    source: TaskCollection,
    targets: &[String],
    force: bool,
) -> Res<Vec<InstallNotice>> {
    for target in targets {
        if !source.contains(target) {
            warn!(task = %target, "requested task not present in source");
        }
    }
    let mut notices = vec![];
    for task in source {
        if !targets.is_empty() && !targets.iter().any(|target| target == task.name()) {
            continue;
        }
        let name = task.name().to_owned();
        if store.has(&name).await? {
            if !force {
                notices.push(InstallNotice::AlreadyExists {
                    task: name,
                    store: store.path().to_owned(),
                });
                continue;
            }
            store.remove(&name).await?;
            store.add(task).await?;
            notices.push(InstallNotice::Updated(name));
        } else {
            store.add(task).await?;
            notices.push(InstallNotice::Installed(name));
        }
    }
    store.save().await?;
    Ok(notices)
}

#[tracing::instrument(skip(store))]
pub async fn uninstall(store: &mut Store, names: &[String]) -> Res<Vec<UninstallNotice>> {
    let mut notices = vec![];
    for name in names {
        let found = store.tasks().await?.lookup(name).map(Task::render);
        match found {
            Some(text) => {
                store.remove(name).await?;
                notices.push(UninstallNotice::Removed {
                    task: name.clone(),
                    text,
                });
            }
            None => notices.push(UninstallNotice::NotInstalled(name.clone())),
        }
    }
    store.save().await?;
    Ok(notices)
}

/// Rendered text for a task looked up in `file` or the store.
///
/// Without a task this is the whole store. A task that can't be found
/// is given one more chance as a source of its own before giving up.
pub async fn examine(
    store: &Store,
    file: Option<&str>,
    task: Option<&str>,
    timeout: Duration,
) -> Res<String> {
    let Some(task) = task else {
        return Ok(store.tasks().await?.render());
    };
    let found = match file {
        Some(file) => parser::parse(&Source::from_arg(file), timeout)
            .await
            .wrap_err_with(|| format!("error reading {file}"))?
            .lookup(task)
            .map(Task::render),
        None => store.tasks().await?.lookup(task).map(Task::render),
    };
    if let Some(text) = found {
        return Ok(text);
    }
    match parser::parse(&Source::from_arg(task), timeout).await {
        Ok(tasks) => Ok(tasks.render()),
        Err(err) => {
            debug!(%err, "not a definition source either");
            Err(TaskNotFound {
                task: task.to_owned(),
                file: file.map(str::to_owned),
            }
            .into())
        }
    }
}

/// Listing for `list [source] [pattern]`.
///
/// A first argument that can't be read as a definition source is taken
/// as a pattern over the store instead.
#[tracing::instrument(skip(store, timeout))]
pub async fn list(
    store: &Store,
    args: &[String],
    all: bool,
    timeout: Duration,
) -> Res<Vec<String>> {
    let (tasks, pattern) = match args.first() {
        None => (store.tasks().await?.sorted(), None),
        Some(first) => match parser::parse(&Source::from_arg(first), timeout).await {
            Ok(tasks) => (tasks, args.get(1)),
            Err(err) => {
                match err {
                    ParseError::SourceUnavailable { .. } => {
                        debug!(%err, "listing store instead")
                    }
                    _ => warn!("listing store instead of {first}: {err}"),
                }
                (store.tasks().await?.sorted(), Some(first))
            }
        },
    };
    let pattern = pattern.map(|raw| TaskPattern::new(raw));
    Ok(listing_lines(&tasks, pattern.as_ref(), all))
}

/// `sake <name>   # <comment>` lines, names padded to the widest.
/// Tasks without a comment only show up with `all`.
pub fn listing_lines(
    tasks: &TaskCollection,
    pattern: Option<&TaskPattern>,
    all: bool,
) -> Vec<String> {
    let matching = tasks
        .iter()
        .filter(|task| pattern.map_or(true, |pattern| pattern.matches(task)))
        .collect::<Vec<_>>();
    let width = matching
        .iter()
        .map(|task| task.name().len())
        .max()
        .unwrap_or(0);
    matching
        .into_iter()
        .filter(|task| all || !task.is_hidden())
        .map(|task| match task.comment() {
            Some(comment) => format!("sake {:<width$}   # {comment}", task.name()),
            None => format!("sake {}", task.name()),
        })
        .collect()
}
