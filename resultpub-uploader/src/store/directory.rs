//! Local directory object store.
//!
//! Publishes into a local filesystem directory, for dry runs and for CI
//! hosts that serve a directory over HTTP themselves. Uses atomic write
//! (temp file → fsync → rename) to prevent partial writes.

use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use resultpub_common::UploadError;

use super::{check_size, ObjectStore};

pub struct DirectoryStore {
    base_path: PathBuf,
}

impl DirectoryStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        let base_path = std::path::absolute(&base_path).unwrap_or(base_path);
        Self { base_path }
    }

    /// Only plain segments of the key are kept, so nothing escapes the base
    /// directory and names like `build..log` stay intact.
    fn full_path(&self, key: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        for component in Path::new(key).components() {
            if let Component::Normal(segment) = component {
                path.push(segment);
            }
        }
        path
    }
}

fn io_error(path: &Path, err: std::io::Error, what: &str) -> UploadError {
    UploadError::Other(anyhow::Error::new(err).context(format!("{} {}", what, path.display())))
}

#[async_trait]
impl ObjectStore for DirectoryStore {
    async fn probe(&self) -> Result<(), UploadError> {
        tokio::fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| UploadError::Connect {
                endpoint: self.base_path.display().to_string(),
                message: e.to_string(),
            })
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        _content_type: Option<&str>,
    ) -> Result<(), UploadError> {
        check_size(body.len() as u64, self.max_object_size())?;
        let dest = self.full_path(key);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e, "Failed to create directory"))?;
        }

        // Pseudo-folder markers end in '/'; the directory itself is the marker.
        if key.ends_with('/') {
            tokio::fs::create_dir_all(&dest)
                .await
                .map_err(|e| io_error(&dest, e, "Failed to create directory"))?;
            return Ok(());
        }

        let mut tmp_name = dest.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = dest.with_file_name(tmp_name);
        tokio::fs::write(&tmp_path, &body)
            .await
            .map_err(|e| io_error(&tmp_path, e, "Failed to write"))?;

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&tmp_path)
            .await
            .map_err(|e| io_error(&tmp_path, e, "Failed to open for fsync"))?;
        file.sync_all()
            .await
            .map_err(|e| io_error(&tmp_path, e, "fsync failed for"))?;
        drop(file);

        tokio::fs::rename(&tmp_path, &dest)
            .await
            .map_err(|e| io_error(&dest, e, "Atomic rename failed for"))?;

        debug!(key = %key, "Directory upload complete");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), UploadError> {
        let path = self.full_path(key);
        if path.is_file() {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| io_error(&path, e, "Failed to delete"))?;
        }
        debug!(key = %key, "Directory delete complete");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, UploadError> {
        let base = &self.base_path;
        let mut keys = Vec::new();
        if !base.exists() {
            return Ok(keys);
        }

        let mut stack = vec![base.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| io_error(&dir, e, "Failed to read directory"))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .context("Failed to read directory entry")?
            {
                let path = entry.path();
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| io_error(&path, e, "Failed to stat"))?;

                if meta.is_dir() {
                    stack.push(path);
                } else if meta.is_file() {
                    if let Ok(relative) = path.strip_prefix(base) {
                        let key = relative
                            .components()
                            .map(|c| c.as_os_str().to_string_lossy())
                            .collect::<Vec<_>>()
                            .join("/");
                        if key.starts_with(prefix) {
                            keys.push(key);
                        }
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn public_url(&self, key: &str) -> String {
        format!("file://{}", self.full_path(key).display())
    }

    fn bucket_label(&self) -> String {
        self.base_path.display().to_string()
    }
}
