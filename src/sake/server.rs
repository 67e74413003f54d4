//! Serves the store over http so others can install from it.
//!
//! Handlers only ever read the store, it's loaded once on first request
//! and never saved from here.

use crate::interlude::*;

use std::net::SocketAddr;

use axum::{
    extract::{Path as UrlPath, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::collection::{TaskCollection, TaskPattern};
use crate::store::Store;
use crate::task::Task;

#[derive(Debug, Deserialize)]
struct ListQuery {
    pattern: Option<String>,
    #[serde(default)]
    all: bool,
}

type HandlerError = (StatusCode, String);

pub fn router(store: Arc<Store>) -> Router {
    Router::new()
        .route("/", get(render_tasks))
        .route("/tasks", get(list_tasks))
        .route("/tasks/{name}", get(show_task))
        .with_state(store)
}

#[tracing::instrument(skip(store))]
pub async fn serve(store: Arc<Store>, addr: SocketAddr) -> Res<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("error binding server to {addr}"))?;
    info!(
        "serving tasks from {} on http://{}",
        store.path().display(),
        listener.local_addr()?
    );
    axum::serve(listener, router(store))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("error waiting for ctrl-c: {err}");
            }
            info!("shutting down");
        })
        .await
        .wrap_err("server terminated with error")
}

fn internal(err: eyre::Report) -> HandlerError {
    error!("{err:#}");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}\n"))
}

async fn load(store: &Store, pattern: Option<&str>) -> Result<TaskCollection, HandlerError> {
    let tasks = store.tasks().await.map_err(internal)?;
    Ok(match pattern {
        Some(pattern) => tasks.filtered(&TaskPattern::new(pattern)),
        None => tasks.clone(),
    })
}

/// The whole store as a definition file, installable by url.
async fn render_tasks(
    State(store): State<Arc<Store>>,
    Query(query): Query<ListQuery>,
) -> Result<String, HandlerError> {
    Ok(load(&store, query.pattern.as_deref()).await?.render())
}

async fn list_tasks(
    State(store): State<Arc<Store>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Task>>, HandlerError> {
    let tasks = load(&store, query.pattern.as_deref()).await?.sorted();
    Ok(Json(
        tasks
            .into_iter()
            .filter(|task| query.all || !task.is_hidden())
            .collect(),
    ))
}

async fn show_task(
    State(store): State<Arc<Store>>,
    UrlPath(name): UrlPath<String>,
) -> Result<String, HandlerError> {
    let tasks = store.tasks().await.map_err(internal)?;
    match tasks.lookup(&name) {
        Some(task) => Ok(task.render()),
        None => Err((
            StatusCode::NOT_FOUND,
            format!("task `{name}` not found\n"),
        )),
    }
}
