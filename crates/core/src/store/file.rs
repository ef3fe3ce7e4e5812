use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::domain::envelope::Envelope;
use crate::errors::QueueStoreError;

use super::QueueStore;

pub const DEFAULT_CACHE_FILE_NAME: &str = "com.slackreporter.JSONFormsCache";
const DEAD_LETTER_SUFFIX: &str = ".dead-letter.json";

/// Queue persisted as one pretty-printed JSON document, replaced atomically on every save.
#[derive(Clone, Debug)]
pub struct FileQueueStore {
    path: PathBuf,
}

impl FileQueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store for envelopes the coordinator gave up on, next to this one.
    pub fn dead_letter_sibling(&self) -> Self {
        let mut file_name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| DEFAULT_CACHE_FILE_NAME.into());
        file_name.push(DEAD_LETTER_SUFFIX);
        Self { path: self.path.with_file_name(file_name) }
    }
}

#[async_trait::async_trait]
impl QueueStore for FileQueueStore {
    async fn load(&self) -> Vec<Envelope> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(
                    event_name = "queue.store.load_missing",
                    path = %self.path.display(),
                    "no persisted upload queue; starting empty"
                );
                return Vec::new();
            }
            Err(error) => {
                warn!(
                    event_name = "queue.store.load_failed",
                    path = %self.path.display(),
                    error = %error,
                    "could not read persisted upload queue; treating as empty"
                );
                return Vec::new();
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Vec::new();
        }

        match serde_json::from_slice::<Vec<Envelope>>(&bytes) {
            Ok(envelopes) => envelopes,
            Err(error) => {
                warn!(
                    event_name = "queue.store.decode_failed",
                    path = %self.path.display(),
                    error = %error,
                    "persisted upload queue is not a valid envelope list; treating as empty"
                );
                Vec::new()
            }
        }
    }

    async fn save(&self, envelopes: &[Envelope]) -> Result<(), QueueStoreError> {
        let encoded =
            serde_json::to_vec_pretty(envelopes).map_err(QueueStoreError::CouldNotSaveJson)?;
        let path = self.path.clone();

        let written = tokio::task::spawn_blocking(move || write_atomically(&path, &encoded))
            .await
            .unwrap_or_else(|join_error| Err(io::Error::other(join_error.to_string())));

        written.map_err(|source| QueueStoreError::Write { path: self.path.clone(), source })?;
        debug!(
            event_name = "queue.store.saved",
            path = %self.path.display(),
            queue_depth = envelopes.len(),
            "persisted upload queue"
        );
        Ok(())
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(path).map_err(|error| error.error)?;
    Ok(())
}
