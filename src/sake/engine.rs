//! Hands installed tasks to the external execution engine.

use crate::interlude::*;

use std::process::ExitStatus;

use crate::ops::TaskNotFound;
use crate::store::Store;

/// Runs `task` from the store through `engine` as
/// `<engine> -f <store> task[arg1,arg2]`.
#[tracing::instrument(skip(store))]
pub async fn run(store: &Store, engine: &str, task: &str, args: &[String]) -> Res<ExitStatus> {
    if !store.has(task).await? {
        return Err(TaskNotFound {
            task: task.to_owned(),
            file: Some(store.path().display().to_string()),
        }
        .into());
    }
    let mut words = engine.split_whitespace();
    let Some(program) = words.next() else {
        eyre::bail!("no execution engine configured");
    };
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(words)
        .arg("-f")
        .arg(store.path())
        .arg(invocation(task, args));
    debug!(?cmd, "spawning engine");
    cmd.status()
        .await
        .wrap_err_with(|| format!("error running engine `{program}`"))
}

fn invocation(task: &str, args: &[String]) -> String {
    if args.is_empty() {
        task.to_owned()
    } else {
        format!("{task}[{}]", args.join(","))
    }
}
