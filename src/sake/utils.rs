use crate::interlude::*;

#[inline]
pub fn default<T: Default>() -> T {
    std::default::Default::default()
}

// Ensure that the `tracing` stack is only initialised once using `once_cell`
// isn't required in cargo-nextest since each test runs in a new process
#[cfg(test)]
pub fn setup_tracing_once() {
    use once_cell::sync::Lazy;
    static TRACING: Lazy<()> = Lazy::new(|| {
        let _ = tracing_subscriber::fmt()
            .compact()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
    Lazy::force(&TRACING);
}

pub async fn file_exists(path: &Path) -> Res<bool> {
    match tokio::fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).wrap_err_with(|| format!("error on file stat at {path:?}")),
    }
}

/// Parses `raw` as an http(s) url, anything else is `None`.
pub fn as_http_url(raw: &str) -> Option<url::Url> {
    let url = url::Url::parse(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Quotes a string for the definition file using single quote
/// semantics where only `\\` and `\'` are escapes.
pub fn single_quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('\'');
    for ch in raw.chars() {
        if ch == '\\' || ch == '\'' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

pub fn is_ident(raw: &str) -> bool {
    let mut chars = raw.chars();
    matches!(chars.next(), Some(ch) if ch == '_' || ch.is_ascii_alphabetic())
        && chars.all(|ch| ch == '_' || ch.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_quote_escapes() {
        assert_eq!(single_quote("plain"), "'plain'");
        assert_eq!(single_quote("it's"), r"'it\'s'");
        assert_eq!(single_quote(r"back\slash"), r"'back\\slash'");
    }

    #[test]
    fn http_urls_only() {
        assert!(as_http_url("http://localhost:4020/").is_some());
        assert!(as_http_url("https://example.com/tasks.rake").is_some());
        assert!(as_http_url("file:///tmp/Rakefile").is_none());
        assert!(as_http_url("Rakefile").is_none());
        assert!(as_http_url("db:migrate").is_none());
    }

    #[test]
    fn idents() {
        assert!(is_ident("env"));
        assert!(is_ident("_x1"));
        assert!(!is_ident("1x"));
        assert!(!is_ident("with-dash"));
        assert!(!is_ident(""));
    }
}
