pub mod flat;
pub mod hierarchical;
pub mod index;

use std::path::Path;

use bytes::Bytes;

use resultpub_common::config::{
    Credentials, UploaderConfig, OSS_CREDENTIALS_PREFIX, S3_CREDENTIALS_PREFIX,
};
use resultpub_common::{Project, ResultUploader, UploadError};

use self::flat::FlatKeyBackend;
use self::hierarchical::HierarchicalBackend;
use crate::store::{check_size, DirectoryStore, OssStore, S3Store};

/// Construct the uploader for `config`, publishing `project`.
///
/// Credentials are read from the environment of the provider.
pub fn from_config(
    config: &UploaderConfig,
    project: Project,
) -> anyhow::Result<Box<dyn ResultUploader>> {
    match config {
        UploaderConfig::S3(c) => {
            let credentials = Credentials::from_env(S3_CREDENTIALS_PREFIX)?;
            let store = S3Store::new(c.clone(), credentials)?;
            Ok(Box::new(FlatKeyBackend::new(
                "S3",
                store,
                project,
                c.resume_from_remote,
            )?))
        }
        UploaderConfig::Oss(c) => {
            let credentials = Credentials::from_env(OSS_CREDENTIALS_PREFIX)?;
            let store = OssStore::new(c.clone(), credentials)?;
            Ok(Box::new(HierarchicalBackend::new("OSS", store, project)))
        }
        UploaderConfig::Directory(c) => {
            let store = DirectoryStore::new(&c.path);
            Ok(Box::new(FlatKeyBackend::new(
                "Directory",
                store,
                project,
                c.resume_from_remote,
            )?))
        }
    }
}

/// Read a local file for upload, refusing it up front when it is larger
/// than `limit`.
pub(crate) async fn read_local_file(path: &Path, limit: u64) -> Result<Bytes, UploadError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| UploadError::local_file(path, e))?;
    check_size(meta.len(), limit)?;
    let body = tokio::fs::read(path)
        .await
        .map_err(|e| UploadError::local_file(path, e))?;
    Ok(Bytes::from(body))
}
