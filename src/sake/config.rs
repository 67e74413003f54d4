use crate::interlude::*;

use std::time::Duration;

use crate::store::StoreError;

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// `None` only when no home dir could be found and nothing was
    /// configured.
    pub store_path: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub engine: String,
    pub paste_url: url::Url,
    pub parse_timeout_secs: u64,
}

#[derive(Deserialize)]
struct ConfigFile {
    store_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    engine: Option<String>,
    paste_url: Option<String>,
    parse_timeout_secs: Option<u64>,
}

const DEFAULT_PASTE_URL: &str = "https://dpaste.com/api/v2/";

impl Config {
    fn defaults() -> Self {
        Self {
            store_path: crate::store::default_path().ok(),
            host: "0.0.0.0".into(),
            port: 4020,
            engine: "rake".into(),
            paste_url: url::Url::parse(DEFAULT_PASTE_URL)
                .expect_or_log("invalid default paste url"),
            parse_timeout_secs: 30,
        }
    }

    pub async fn source() -> Res<Self> {
        let cwd = std::env::current_dir()?;
        let config_dir = match path_from_env(&cwd, "SAKE_CONFIG_DIR") {
            Some(path) => Some(path),
            None => directories::ProjectDirs::from("", "", "sake")
                .map(|dirs| dirs.config_dir().to_owned()),
        };
        let mut config = Self::defaults();

        // we use builtin config-rs File implementation
        // which relies on sync std
        let config = tokio::task::spawn_blocking(move || {
            if let Some(dir) = &config_dir {
                let file_path = dir.join("config");
                config
                    .source_file(&file_path)
                    .wrap_err_with(|| format!("error sourcing global config from {file_path:?}"))?;
            }
            config
                .source_env(&cwd)
                .wrap_err("error sourcing config from environment variables")?;
            eyre::Ok(config)
        })
        .await
        .expect_or_log("tokio error")?;
        debug!(?config, "config sourced");
        Ok(config)
    }

    /// Reads `config.json` or `config.json5` next to `file_path`, missing
    /// files are fine.
    fn source_file(&mut self, file_path: &Path) -> Res<()> {
        let file: ConfigFile = config::Config::builder()
            .add_source(config::File::with_name(&file_path.to_string_lossy()).required(false))
            .build()
            .wrap_err("error reading config file")?
            .try_deserialize()
            .wrap_err("error deserializing config file")?;
        let base = file_path.parent().unwrap_or_else(|| Path::new("."));
        self.apply(file, base)
    }

    fn source_env(&mut self, cwd: &Path) -> Res<()> {
        let file: ConfigFile = config::Config::builder()
            .add_source(config::Environment::with_prefix("SAKE").try_parsing(true))
            .build()
            .wrap_err("error reading environment")?
            .try_deserialize()
            .wrap_err("error deserializing environment")?;
        self.apply(file, cwd)
    }

    /// Relative paths in `file` resolve against `base`.
    fn apply(&mut self, file: ConfigFile, base: &Path) -> Res<()> {
        let ConfigFile {
            store_path,
            host,
            port,
            engine,
            paste_url,
            parse_timeout_secs,
        } = file;
        if let Some(path) = store_path {
            self.store_path = Some(base.join(path));
        }
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(engine) = engine {
            self.engine = engine;
        }
        if let Some(url) = paste_url {
            self.paste_url = url::Url::parse(&url)
                .wrap_err_with(|| format!("error parsing paste_url {url:?}"))?;
        }
        if let Some(secs) = parse_timeout_secs {
            self.parse_timeout_secs = secs;
        }
        Ok(())
    }

    pub fn store_path(&self) -> Result<&Path, StoreError> {
        self.store_path.as_deref().ok_or(StoreError::HomeResolution)
    }

    pub fn parse_timeout(&self) -> Duration {
        Duration::from_secs(self.parse_timeout_secs)
    }
}

fn path_from_env(cwd: &Path, env_name: &str) -> Option<PathBuf> {
    let path = match std::env::var(env_name) {
        Ok(path) => PathBuf::from(path),
        Err(std::env::VarError::NotUnicode(os_str)) => PathBuf::from(os_str),
        Err(std::env::VarError::NotPresent) => return None,
    };
    Some(cwd.join(path))
}
