//! Flat-key backend.
//!
//! Object stores such as S3 have no folders, so a run's results are not
//! browsable by themselves. This backend keeps the list of files it has
//! published and rewrites `{destination}/index.html` after every upload and
//! delete; the public URL of that page is the run's result URL.
//!
//! The file list lives in process memory. A restarted process starts with an
//! empty list unless `resume_from_remote` is set, in which case the list is
//! seeded from the objects already under the destination path.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use resultpub_common::uploader::{content_type_for, remote_key};
use resultpub_common::{guard, Project, Published, ResultUploader, UploadError};

use super::index::{IndexPage, INDEX_FILE_NAME};
use super::read_local_file;
use crate::store::ObjectStore;

pub struct FlatKeyBackend<S> {
    provider: &'static str,
    store: S,
    project: Project,
    resume_from_remote: bool,
    index: IndexPage,
    path: Option<String>,
    filenames: Vec<String>,
    url: Option<String>,
}

impl<S: ObjectStore> FlatKeyBackend<S> {
    pub fn new(
        provider: &'static str,
        store: S,
        project: Project,
        resume_from_remote: bool,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            provider,
            store,
            project,
            resume_from_remote,
            index: IndexPage::new()?,
            path: None,
            filenames: Vec::new(),
            url: None,
        })
    }

    /// Names currently listed by the index, in publishing order.
    pub fn uploaded_files(&self) -> &[String] {
        &self.filenames
    }

    pub fn destination_path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    fn destination(&self) -> Result<String, UploadError> {
        self.path.clone().ok_or(UploadError::FolderNotCreated)
    }

    fn record(&mut self, name: &str) {
        if !self.filenames.iter().any(|n| n == name) {
            self.filenames.push(name.to_string());
        }
    }

    fn forget(&mut self, name: &str) {
        self.filenames.retain(|n| n != name);
    }

    /// File names already stored under `path`, minus the index itself.
    async fn remote_filenames(&self, path: &str) -> Result<Vec<String>, UploadError> {
        let prefix = format!("{}/", path);
        let keys = self.store.list(&prefix).await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(|name| name.to_string()))
            .filter(|name| !name.is_empty() && !name.ends_with('/') && name != INDEX_FILE_NAME)
            .collect())
    }

    /// Render the index from the current file list and overwrite it.
    async fn generate_index(&self, path: &str) -> Result<(), UploadError> {
        let html = self
            .index
            .render(path, &self.filenames, &self.store.bucket_label())?;
        self.store
            .put(&remote_key(path, INDEX_FILE_NAME), html.into(), Some("text/html"))
            .await
    }
}

/// Name as listed in the index, relative to the destination path. Fails for
/// the index itself.
fn listed_name(remote_name: &str) -> Result<&str, UploadError> {
    let name = remote_name.trim_start_matches('/');
    if name == INDEX_FILE_NAME {
        return Err(UploadError::ReservedName(INDEX_FILE_NAME.to_string()));
    }
    Ok(name)
}

#[async_trait]
impl<S: ObjectStore> ResultUploader for FlatKeyBackend<S> {
    fn provider(&self) -> &'static str {
        self.provider
    }

    /// Requests are signed individually; there is no session to open.
    async fn connect(&mut self) -> Published {
        Ok(())
    }

    async fn create_project_folder(&mut self) -> Published {
        let provider = self.provider;
        guard(provider, "create_project_folder", async {
            let path = self.project.destination_path();
            if self.resume_from_remote {
                let existing = self.remote_filenames(&path).await?;
                for name in existing {
                    self.record(&name);
                }
            }
            self.generate_index(&path).await?;

            let url = self.store.public_url(&remote_key(&path, INDEX_FILE_NAME));
            info!(url = %url, "{} project folder created", provider);
            self.path = Some(path);
            self.url = Some(url);
            Ok(())
        })
        .await
    }

    async fn upload_file(&mut self, local_path: &Path, remote_name: &str) -> Published {
        let provider = self.provider;
        guard(provider, "upload_file", async {
            let path = self.destination()?;
            let name = listed_name(remote_name)?;
            let key = remote_key(&path, name);

            let body = read_local_file(local_path, self.store.max_object_size()).await?;
            self.store.put(&key, body, content_type_for(name)).await?;
            self.record(name);
            self.generate_index(&path).await?;

            info!(key = %key, "{} file uploaded", provider);
            Ok(())
        })
        .await
    }

    async fn update_file_content(&mut self, content: &[u8], remote_name: &str) -> Published {
        let provider = self.provider;
        guard(provider, "update_file_content", async {
            let path = self.destination()?;
            let name = listed_name(remote_name)?;
            let key = remote_key(&path, name);

            self.store
                .put(&key, content.to_vec().into(), content_type_for(name))
                .await?;

            info!(key = %key, "{} file content updated", provider);
            Ok(())
        })
        .await
    }

    async fn delete_file(&mut self, remote_name: &str) -> Published {
        let provider = self.provider;
        guard(provider, "delete_file", async {
            let path = self.destination()?;
            let name = listed_name(remote_name)?;
            let key = remote_key(&path, name);

            self.store.delete(&key).await?;
            self.forget(name);
            self.generate_index(&path).await?;

            info!(key = %key, "{} file deleted", provider);
            Ok(())
        })
        .await
    }

    fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use resultpub_common::FailureKind;

    use super::*;
    use crate::backend::index::linked_files;
    use crate::store::memory::{MemoryStore, Op};

    const DEST: &str = "acme/CI/run1-20240101";

    fn backend(store: &MemoryStore) -> FlatKeyBackend<MemoryStore> {
        FlatKeyBackend::new("S3", store.clone(), Project::new("acme", "run1", "20240101"), false)
            .unwrap()
    }

    fn index_listing(store: &MemoryStore) -> Vec<String> {
        let html = store
            .get_text(&format!("{}/index.html", DEST))
            .expect("index.html missing");
        linked_files(&html)
    }

    fn local_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_end_to_end_publishing() {
        let dir = tempfile::tempdir().unwrap();
        let a = local_file(&dir, "a.txt", "alpha");
        let b = local_file(&dir, "b.html", "<html>beta</html>");
        let store = MemoryStore::new();
        let mut uploader = backend(&store);

        assert!(uploader.url().is_none());
        assert!(uploader.connect().await.is_ok());
        assert!(uploader.create_project_folder().await.is_ok());
        assert!(index_listing(&store).is_empty());
        assert_eq!(
            uploader.url(),
            Some("https://memory.invalid/acme/CI/run1-20240101/index.html")
        );

        assert!(uploader.upload_file(&a, "a.txt").await.is_ok());
        assert_eq!(index_listing(&store), vec!["a.txt"]);

        assert!(uploader.upload_file(&b, "b.html").await.is_ok());
        assert_eq!(index_listing(&store), vec!["a.txt", "b.html"]);
        let stored = store.get(&format!("{}/b.html", DEST)).unwrap();
        assert_eq!(stored.content_type.as_deref(), Some("text/html"));
        assert_eq!(stored.body, "<html>beta</html>");

        assert!(uploader.delete_file("a.txt").await.is_ok());
        assert_eq!(index_listing(&store), vec!["b.html"]);
        assert!(store.get(&format!("{}/a.txt", DEST)).is_none());

        uploader.close();
        uploader.close();
    }

    #[tokio::test]
    async fn test_index_tracks_every_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let file = local_file(&dir, "f", "x");
        let store = MemoryStore::new();
        let mut uploader = backend(&store);
        uploader.create_project_folder().await.unwrap();

        let steps: Vec<(&str, &str)> = vec![
            ("up", "one.log"),
            ("up", "two.log"),
            ("up", "three.html"),
            ("del", "two.log"),
            ("up", "two.log"),
            ("up", "one.log"),
            ("del", "three.html"),
        ];
        let mut expected: Vec<String> = Vec::new();
        for (action, name) in steps {
            match action {
                "up" => {
                    uploader.upload_file(&file, name).await.unwrap();
                    if !expected.iter().any(|n| n == name) {
                        expected.push(name.to_string());
                    }
                }
                _ => {
                    uploader.delete_file(name).await.unwrap();
                    expected.retain(|n| n != name);
                }
            }
            assert_eq!(index_listing(&store), expected);
            assert_eq!(uploader.uploaded_files(), expected.as_slice());
        }
        assert_eq!(expected, vec!["one.log", "two.log"]);
    }

    #[tokio::test]
    async fn test_create_project_folder_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = local_file(&dir, "a.txt", "alpha");
        let store = MemoryStore::new();
        let mut uploader = backend(&store);

        uploader.create_project_folder().await.unwrap();
        uploader.upload_file(&file, "a.txt").await.unwrap();
        let url = uploader.url().map(|s| s.to_string());
        let index = store.get_text(&format!("{}/index.html", DEST));

        uploader.create_project_folder().await.unwrap();
        assert_eq!(uploader.url().map(|s| s.to_string()), url);
        assert_eq!(uploader.destination_path(), Some(DEST));
        assert_eq!(store.get_text(&format!("{}/index.html", DEST)), index);
        assert_eq!(
            store.keys(),
            vec![format!("{}/a.txt", DEST), format!("{}/index.html", DEST)]
        );
    }

    #[tokio::test]
    async fn test_content_type_only_for_html() {
        let dir = tempfile::tempdir().unwrap();
        let report = local_file(&dir, "report.html", "<html></html>");
        let data = local_file(&dir, "data.log", "log line");
        let store = MemoryStore::new();
        let mut uploader = backend(&store);
        uploader.create_project_folder().await.unwrap();

        uploader.upload_file(&report, "report.html").await.unwrap();
        uploader.upload_file(&data, "data.log").await.unwrap();

        let report = store.get(&format!("{}/report.html", DEST)).unwrap();
        assert_eq!(report.content_type.as_deref(), Some("text/html"));
        let data = store.get(&format!("{}/data.log", DEST)).unwrap();
        assert_eq!(data.content_type, None);
        let index = store.get(&format!("{}/index.html", DEST)).unwrap();
        assert_eq!(index.content_type.as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn test_delete_unknown_name() {
        let store = MemoryStore::new();
        let mut uploader = backend(&store);
        uploader.create_project_folder().await.unwrap();

        assert!(uploader.delete_file("ghost.txt").await.is_ok());
        assert!(!uploader.uploaded_files().iter().any(|n| n == "ghost.txt"));

        store.fail_next(Op::Delete, || UploadError::Client {
            status: 403,
            code: "AccessDenied".into(),
            message: "Access Denied".into(),
        });
        let failure = uploader.delete_file("ghost.txt").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Remote);
        assert!(!uploader.uploaded_files().iter().any(|n| n == "ghost.txt"));
        assert!(index_listing(&store).is_empty());
    }

    #[tokio::test]
    async fn test_failed_remote_delete_keeps_file_listed() {
        let dir = tempfile::tempdir().unwrap();
        let file = local_file(&dir, "a.txt", "alpha");
        let store = MemoryStore::new();
        let mut uploader = backend(&store);
        uploader.create_project_folder().await.unwrap();
        uploader.upload_file(&file, "a.txt").await.unwrap();

        store.fail_next(Op::Delete, || UploadError::Server {
            status: 500,
            code: "InternalError".into(),
            message: "We encountered an internal error.".into(),
        });
        assert!(uploader.delete_file("a.txt").await.is_err());
        assert_eq!(uploader.uploaded_files().to_vec(), vec!["a.txt"]);
        assert_eq!(index_listing(&store), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_injected_failures_never_escape() {
        let dir = tempfile::tempdir().unwrap();
        let file = local_file(&dir, "a.txt", "alpha");
        let store = MemoryStore::new();
        let mut uploader = backend(&store);
        uploader.create_project_folder().await.unwrap();

        store.fail_next(Op::Put, || UploadError::Connect {
            endpoint: "s3.example.com".into(),
            message: "connection refused".into(),
        });
        let failure = uploader.upload_file(&file, "a.txt").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Connectivity);
        assert_eq!(failure.operation, "upload_file");

        store.fail_next(Op::Put, || UploadError::Server {
            status: 503,
            code: "SlowDown".into(),
            message: "Please reduce your request rate.".into(),
        });
        let failure = uploader.update_file_content(b"x", "notes.txt").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Remote);
        assert_eq!(failure.class, "ServerError");

        let missing = dir.path().join("missing.txt");
        let failure = uploader.upload_file(&missing, "missing.txt").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::LocalResource);

        store.fail_next(Op::Put, || UploadError::Other(anyhow::anyhow!("unexpected")));
        let failure = uploader.upload_file(&file, "a.txt").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unclassified);

        // None of the failed uploads made it into the listing.
        assert!(uploader.uploaded_files().is_empty());
        assert!(index_listing(&store).is_empty());
    }

    #[tokio::test]
    async fn test_index_failure_fails_the_upload() {
        let dir = tempfile::tempdir().unwrap();
        let file = local_file(&dir, "a.txt", "alpha");
        let store = MemoryStore::new();
        let mut uploader = backend(&store);
        uploader.create_project_folder().await.unwrap();

        store.fail_next_for(Op::Put, "index.html", || UploadError::Server {
            status: 500,
            code: "InternalError".into(),
            message: "boom".into(),
        });
        assert!(uploader.upload_file(&file, "a.txt").await.is_err());
        // The object is stored and remembered; the next mutation repairs the index.
        assert!(store.get(&format!("{}/a.txt", DEST)).is_some());
        assert!(index_listing(&store).is_empty());

        uploader.update_file_content(b"1", "b.txt").await.unwrap();
        assert!(index_listing(&store).is_empty());
        uploader.upload_file(&file, "c.txt").await.unwrap();
        assert_eq!(index_listing(&store), vec!["a.txt", "c.txt"]);
    }

    #[tokio::test]
    async fn test_operations_require_project_folder() {
        let dir = tempfile::tempdir().unwrap();
        let file = local_file(&dir, "a.txt", "alpha");
        let store = MemoryStore::new();
        let mut uploader = backend(&store);

        let failure = uploader.upload_file(&file, "a.txt").await.unwrap_err();
        assert_eq!(failure.class, "FolderNotCreated");
        assert!(uploader.delete_file("a.txt").await.is_err());
        assert!(uploader.update_file_content(b"x", "a.txt").await.is_err());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_project_folder_failure_leaves_url_unset() {
        let store = MemoryStore::new();
        let mut uploader = backend(&store);
        store.fail_next(Op::Put, || UploadError::Client {
            status: 403,
            code: "AccessDenied".into(),
            message: "Access Denied".into(),
        });
        assert!(uploader.create_project_folder().await.is_err());
        assert!(uploader.url().is_none());
        assert!(uploader.destination_path().is_none());
    }

    #[tokio::test]
    async fn test_index_name_is_reserved() {
        let dir = tempfile::tempdir().unwrap();
        let file = local_file(&dir, "index.html", "<html>mine</html>");
        let store = MemoryStore::new();
        let mut uploader = backend(&store);
        uploader.create_project_folder().await.unwrap();

        let failure = uploader.upload_file(&file, "index.html").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unclassified);
        assert!(uploader.delete_file("index.html").await.is_err());
        assert!(store.get(&format!("{}/index.html", DEST)).is_some());
    }

    #[tokio::test]
    async fn test_leading_slash_names_are_relative() {
        let dir = tempfile::tempdir().unwrap();
        let file = local_file(&dir, "a.txt", "alpha");
        let store = MemoryStore::new();
        let mut uploader = backend(&store);
        uploader.create_project_folder().await.unwrap();

        uploader.upload_file(&file, "/a.txt").await.unwrap();
        uploader.upload_file(&file, "a.txt").await.unwrap();
        assert_eq!(uploader.uploaded_files().to_vec(), vec!["a.txt"]);
        let html = store.get_text(&format!("{}/index.html", DEST)).unwrap();
        assert!(html.contains("href=\"a.txt\""));
        assert!(!html.contains("href=\"/a.txt\""));

        uploader.delete_file("/a.txt").await.unwrap();
        assert!(uploader.uploaded_files().is_empty());
        assert!(index_listing(&store).is_empty());
        assert!(uploader.upload_file(&file, "/index.html").await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_file_fails_as_remote() {
        let dir = tempfile::tempdir().unwrap();
        let file = local_file(&dir, "big.bin", &"0".repeat(8192));
        let store = MemoryStore::new().with_max_object_size(4096);
        let mut uploader = backend(&store);
        uploader.create_project_folder().await.unwrap();

        let failure = uploader.upload_file(&file, "big.bin").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Remote);
        assert_eq!(failure.class, "EntityTooLarge");
        assert!(store.get(&format!("{}/big.bin", DEST)).is_none());
        assert!(uploader.uploaded_files().is_empty());
    }

    #[tokio::test]
    async fn test_resume_from_remote_seeds_listing() {
        let store = MemoryStore::new();
        store.insert(&format!("{}/old.log", DEST), "old");
        store.insert(&format!("{}/report.html", DEST), "<html></html>");
        store.insert(&format!("{}/index.html", DEST), "stale");
        store.insert("acme/CI/run1-20240102/other.log", "other run");

        let mut uploader = FlatKeyBackend::new(
            "S3",
            store.clone(),
            Project::new("acme", "run1", "20240101"),
            true,
        )
        .unwrap();
        uploader.create_project_folder().await.unwrap();
        assert_eq!(index_listing(&store), vec!["old.log", "report.html"]);
    }

    #[tokio::test]
    async fn test_resume_listing_failure_is_reported() {
        let store = MemoryStore::new();
        let mut uploader = FlatKeyBackend::new(
            "S3",
            store.clone(),
            Project::new("acme", "run1", "20240101"),
            true,
        )
        .unwrap();
        store.fail_next(Op::List, || UploadError::Timeout("list timed out".into()));
        let failure = uploader.create_project_folder().await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Connectivity);
        assert!(uploader.url().is_none());
    }
}
