//! Uploads rendered tasks to a paste service.

use crate::interlude::*;

use crate::ops::TaskNotFound;
use crate::store::Store;
use crate::task::Task;

/// Rendered text of the named store tasks, in the order asked for.
pub async fn collect(store: &Store, names: &[String]) -> Res<String> {
    let tasks = store.tasks().await?;
    let mut texts = vec![];
    for name in names {
        let Some(task) = tasks.lookup(name) else {
            return Err(TaskNotFound {
                task: name.clone(),
                file: Some(store.path().display().to_string()),
            }
            .into());
        };
        texts.push(Task::render(task));
    }
    Ok(texts.join("\n"))
}

/// POSTs `text` as a ruby paste returning where it can be viewed.
///
/// The url is taken from the `Location` header when the service sends
/// one, from the response body otherwise.
#[tracing::instrument(skip(text))]
pub async fn publish(paste_url: &url::Url, text: String) -> Res<url::Url> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("sake/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .wrap_err("error building http client")?;
    let resp = client
        .post(paste_url.clone())
        .form(&[("content", &text[..]), ("syntax", "ruby")])
        .send()
        .await
        .wrap_err_with(|| format!("error posting to {paste_url}"))?;

    let status = resp.status();
    if !(status.is_success() || status.is_redirection()) {
        eyre::bail!("paste service at {paste_url} responded with {status}");
    }
    if let Some(location) = resp.headers().get(reqwest::header::LOCATION) {
        let location = location
            .to_str()
            .wrap_err("paste service sent an unreadable location")?;
        return paste_url
            .join(location)
            .wrap_err_with(|| format!("paste service sent an invalid location {location:?}"));
    }
    let body = resp
        .text()
        .await
        .wrap_err("error reading paste service response")?;
    let body = body.trim().trim_matches('"');
    url::Url::parse(body).wrap_err_with(|| format!("paste service sent no url, got {body:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use axum::{
        http::{header, StatusCode},
        routing::post,
        Form, Router,
    };

    async fn spawn(app: Router) -> Res<url::Url> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move { axum::serve(listener, app).await });
        Ok(url::Url::parse(&format!("http://{addr}/api/"))?)
    }

    #[tokio::test]
    async fn url_from_location() -> Res<()> {
        let app = Router::new().route(
            "/api/",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                assert_eq!(form.get("syntax").map(String::as_str), Some("ruby"));
                assert_eq!(
                    form.get("content").map(String::as_str),
                    Some("task 'a' do\nend\n")
                );
                (StatusCode::CREATED, [(header::LOCATION, "/ABC123")], "")
            }),
        );
        let base = spawn(app).await?;
        let url = publish(&base, "task 'a' do\nend\n".into()).await?;
        assert_eq!(url.path(), "/ABC123");
        assert_eq!(url.host_str(), Some("127.0.0.1"));
        Ok(())
    }

    #[tokio::test]
    async fn url_from_body() -> Res<()> {
        let app = Router::new().route(
            "/api/",
            post(|| async { "https://paste.example/XYZ\n" }),
        );
        let base = spawn(app).await?;
        let url = publish(&base, "task 'a' do\nend\n".into()).await?;
        assert_eq!(url.as_str(), "https://paste.example/XYZ");
        Ok(())
    }

    #[tokio::test]
    async fn failures_are_errors() -> Res<()> {
        let app = Router::new().route(
            "/api/",
            post(|| async { (StatusCode::BAD_REQUEST, "nope") }),
        );
        let base = spawn(app).await?;
        let err = publish(&base, "".into()).await.unwrap_err();
        assert!(err.to_string().contains("400"), "{err:#}");
        Ok(())
    }

    #[tokio::test]
    async fn collect_requires_every_task() -> Res<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".sake");
        tokio::fs::write(&path, "task :a\ntask :b\n").await?;
        let store = Store::open(path, std::time::Duration::from_secs(5)).await?;

        let text = collect(&store, &["b".into(), "a".into()]).await?;
        assert_eq!(text, "task 'b' do\nend\n\ntask 'a' do\nend\n");

        let err = collect(&store, &["a".into(), "zzz".into()])
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<TaskNotFound>().is_some());
        Ok(())
    }
}
