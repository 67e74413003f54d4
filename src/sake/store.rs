use crate::interlude::*;

use std::time::Duration;

use tokio::sync::OnceCell;

use crate::collection::TaskCollection;
use crate::parser::Source;
use crate::task::Task;
use crate::utils::file_exists;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unable to resolve a home directory for the store, set `store_path` explicitly")]
    HomeResolution,
}

/// The well known store location: `~/.sake`, or `~\Sakefile` on windows.
pub fn default_path() -> Result<PathBuf, StoreError> {
    let dirs = directories::BaseDirs::new().ok_or(StoreError::HomeResolution)?;
    let name = if cfg!(windows) { "Sakefile" } else { ".sake" };
    Ok(dirs.home_dir().join(name))
}

/// The persistent set of installed tasks, backed by a single definition
/// file.
///
/// Tasks are parsed from the file on first access and cached for the
/// lifetime of the value. Mutations only touch the cache until
/// [`Store::save`] writes it back.
#[derive(educe::Educe)]
#[educe(Debug)]
pub struct Store {
    path: PathBuf,
    parse_timeout: Duration,
    #[educe(Debug(ignore))]
    cache: OnceCell<TaskCollection>,
}

impl Store {
    /// Opens the store at `path`, creating an empty file there if
    /// nothing exists yet.
    #[tracing::instrument(skip(parse_timeout))]
    pub async fn open(path: PathBuf, parse_timeout: Duration) -> Res<Self> {
        if !file_exists(&path).await? {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .wrap_err_with(|| format!("error creating store dir at {parent:?}"))?;
            }
            tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .wrap_err_with(|| format!("error creating store file at {path:?}"))?;
            debug!("created empty store");
        }
        Ok(Self {
            path,
            parse_timeout,
            cache: OnceCell::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn tasks(&self) -> Res<&TaskCollection> {
        self.cache
            .get_or_try_init(|| async {
                let tasks =
                    crate::parser::parse(&Source::File(self.path.clone()), self.parse_timeout)
                        .await
                        .wrap_err_with(|| format!("error loading store at {:?}", self.path))?;
                debug!(count = tasks.len(), "loaded store");
                eyre::Ok(tasks)
            })
            .await
    }

    async fn loaded_mut(&mut self) -> Res<&mut TaskCollection> {
        self.tasks().await?;
        Ok(self
            .cache
            .get_mut()
            .expect_or_log("store tasks were just loaded"))
    }

    pub async fn has(&self, name: &str) -> Res<bool> {
        Ok(self.tasks().await?.contains(name))
    }

    /// Appends without checking for duplicates.
    pub async fn add(&mut self, task: Task) -> Res<()> {
        self.loaded_mut().await?.push(task);
        Ok(())
    }

    pub async fn remove(&mut self, name: &str) -> Res<usize> {
        Ok(self.loaded_mut().await?.remove_by_name(name))
    }

    /// Overwrites the backing file with the rendered cache.
    ///
    /// The text goes to a sibling temp file first which is then renamed
    /// over the store.
    #[tracing::instrument(skip(self), fields(path = ?self.path))]
    pub async fn save(&self) -> Res<()> {
        let text = self.tasks().await?.render();
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            use std::io::Write;
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let mut file = tempfile::NamedTempFile::new_in(dir)
                .wrap_err_with(|| format!("error creating temp file in {dir:?}"))?;
            file.write_all(text.as_bytes())
                .and_then(|_| file.as_file().sync_all())
                .wrap_err("error writing store contents")?;
            file.persist(&path)
                .map_err(|err| err.error)
                .wrap_err_with(|| format!("error replacing store at {path:?}"))?;
            eyre::Ok(())
        })
        .await
        .wrap_err("store writer panicked")??;
        debug!("saved store");
        Ok(())
    }
}
