//! Directory-based SessionStore implementation.
//!
//! Directory structure:
//! ```text
//! base_dir/
//! ├── session-id-1.json
//! └── session-id-2.json
//! ```
//!
//! Records are written as plain JSON, so they always load back as
//! text-keyed documents. Writes go through a temporary file and an atomic
//! rename. The `ttl_secs` option is not honoured by this adapter.

use crate::bounded;
use async_trait::async_trait;
use std::borrow::Cow;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tether_core::session::{
    SessionPatch, SessionRecord, SessionStore, StoreOptions, StoreResult, StoredRecord,
};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const EXTENSION: &str = "json";

pub struct DirSessionStore {
    base_dir: PathBuf,
    /// Serializes writers in this process so `update` is a clean read-modify-write.
    write_lock: Mutex<()>,
}

impl DirSessionStore {
    /// Creates a new DirSessionStore, creating `base_dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn new(base_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir).await?;
        Ok(Self {
            base_dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the session files.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.{}", encode_file_stem(id), EXTENSION))
    }

    async fn read_record(&self, id: &str) -> StoreResult<Option<StoredRecord>> {
        let path = self.record_path(id);
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if json.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(StoredRecord::from_json_str(&json)?))
    }

    async fn write_record(&self, id: &str, record: &SessionRecord) -> StoreResult<()> {
        let path = self.record_path(id);
        let json = serde_json::to_string_pretty(record)?;

        let tmp_path = path.with_extension(format!("{}.tmp", EXTENSION));
        let mut tmp_file = fs::File::create(&tmp_path).await?;
        tmp_file.write_all(json.as_bytes()).await?;
        tmp_file.sync_all().await?;
        drop(tmp_file);

        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn save_locked(&self, id: &str, record: &SessionRecord) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        self.write_record(id, record).await
    }

    async fn update_locked(&self, id: &str, patch: &SessionPatch) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let record = match self.read_record(id).await? {
            Some(existing) => {
                let mut record = existing.normalize(id);
                patch.apply_to(&mut record);
                record
            }
            None => patch.clone().into_record(id),
        };
        self.write_record(id, &record).await
    }

    async fn delete_locked(&self, id: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_ids(&self) -> StoreResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match decode_file_stem(stem) {
                Some(id) => ids.push(id),
                None => {
                    tracing::warn!(file = %path.display(), "Skipping unrecognized session file")
                }
            }
        }

        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl SessionStore for DirSessionStore {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn save(&self, id: &str, record: &SessionRecord, opts: &StoreOptions) -> StoreResult<()> {
        bounded(opts, self.save_locked(id, record)).await
    }

    async fn load(&self, id: &str, opts: &StoreOptions) -> StoreResult<Option<StoredRecord>> {
        bounded(opts, self.read_record(id)).await
    }

    async fn update(&self, id: &str, patch: &SessionPatch, opts: &StoreOptions) -> StoreResult<()> {
        bounded(opts, self.update_locked(id, patch)).await
    }

    async fn delete(&self, id: &str, opts: &StoreOptions) -> StoreResult<()> {
        bounded(opts, self.delete_locked(id)).await
    }

    async fn list_active(&self, opts: &StoreOptions) -> StoreResult<Vec<String>> {
        bounded(opts, self.list_ids()).await
    }
}

/// Percent-encodes the id so any string maps to a single file name.
fn encode_file_stem(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

fn decode_file_stem(stem: &str) -> Option<String> {
    urlencoding::decode(stem).ok().map(Cow::into_owned)
}
