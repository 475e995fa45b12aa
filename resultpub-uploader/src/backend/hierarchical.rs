//! Hierarchical backend.
//!
//! For providers that treat a trailing-slash key as a folder (Aliyun OSS).
//! The run folder is created as a real marker object, so no index page is
//! generated and `url` stays unset: HTML served from OSS default domains is
//! forced to download, which makes a generated page useless there.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use resultpub_common::uploader::{content_type_for, remote_key};
use resultpub_common::{guard, Project, Published, ResultUploader, UploadError};

use super::read_local_file;
use crate::store::ObjectStore;

pub struct HierarchicalBackend<S> {
    provider: &'static str,
    store: S,
    project: Project,
    connected: bool,
    path: Option<String>,
}

impl<S: ObjectStore> HierarchicalBackend<S> {
    pub fn new(provider: &'static str, store: S, project: Project) -> Self {
        Self {
            provider,
            store,
            project,
            connected: false,
            path: None,
        }
    }

    pub fn destination_path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    fn destination(&self) -> Result<String, UploadError> {
        if !self.connected {
            return Err(UploadError::NotConnected);
        }
        self.path.clone().ok_or(UploadError::FolderNotCreated)
    }
}

#[async_trait]
impl<S: ObjectStore> ResultUploader for HierarchicalBackend<S> {
    fn provider(&self) -> &'static str {
        self.provider
    }

    async fn connect(&mut self) -> Published {
        let provider = self.provider;
        guard(provider, "connect", async {
            self.store.probe().await?;
            self.connected = true;
            info!(bucket = %self.store.bucket_label(), "{} bucket connected", provider);
            Ok(())
        })
        .await
    }

    async fn create_project_folder(&mut self) -> Published {
        let provider = self.provider;
        guard(provider, "create_project_folder", async {
            if !self.connected {
                return Err(UploadError::NotConnected);
            }
            let path = self.project.destination_path();
            self.store
                .put(&format!("{}/", path), Bytes::new(), None)
                .await?;
            info!(path = %path, "{} project folder created", provider);
            self.path = Some(path);
            Ok(())
        })
        .await
    }

    async fn upload_file(&mut self, local_path: &Path, remote_name: &str) -> Published {
        let provider = self.provider;
        guard(provider, "upload_file", async {
            let key = remote_key(&self.destination()?, remote_name);
            let body = read_local_file(local_path, self.store.max_object_size()).await?;
            self.store.put(&key, body, content_type_for(remote_name)).await?;
            info!(key = %key, "{} file uploaded", provider);
            Ok(())
        })
        .await
    }

    async fn update_file_content(&mut self, content: &[u8], remote_name: &str) -> Published {
        let provider = self.provider;
        guard(provider, "update_file_content", async {
            let key = remote_key(&self.destination()?, remote_name);
            self.store
                .put(&key, content.to_vec().into(), content_type_for(remote_name))
                .await?;
            info!(key = %key, "{} file content updated", provider);
            Ok(())
        })
        .await
    }

    async fn delete_file(&mut self, remote_name: &str) -> Published {
        let provider = self.provider;
        guard(provider, "delete_file", async {
            let key = remote_key(&self.destination()?, remote_name);
            self.store.delete(&key).await?;
            info!(key = %key, "{} file deleted", provider);
            Ok(())
        })
        .await
    }

    fn url(&self) -> Option<&str> {
        None
    }
}
