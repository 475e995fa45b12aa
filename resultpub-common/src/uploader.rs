use std::path::Path;

use crate::failure::Published;

/// Trait implemented by every result uploader.
///
/// One instance publishes the artifacts of one run. The orchestrator calls
/// `connect`, then `create_project_folder`, then any number of file
/// operations, reads `url`, and finally calls `close`. Every operation that
/// touches the remote store reports through [`Published`]; failures have
/// already been logged by the time the caller sees them, so a caller that
/// only needs a flag can use `.is_ok()`.
#[async_trait::async_trait]
pub trait ResultUploader: Send {
    /// Short provider label used in log lines ("S3", "OSS", ...).
    fn provider(&self) -> &'static str;

    /// Establish or validate reachability. Calling it twice has the same
    /// observable effect as calling it once.
    async fn connect(&mut self) -> Published;

    /// Compute the destination path and run whatever one-time setup the
    /// backend needs before file operations. Idempotent.
    async fn create_project_folder(&mut self) -> Published;

    /// Copy a local file to `{destination}/{remote_name}`.
    async fn upload_file(&mut self, local_path: &Path, remote_name: &str) -> Published;

    /// Write in-memory content to `{destination}/{remote_name}`, overwriting.
    async fn update_file_content(&mut self, content: &[u8], remote_name: &str) -> Published;

    /// Remove `{destination}/{remote_name}` if present.
    async fn delete_file(&mut self, remote_name: &str) -> Published;

    /// Browsable location of the published results, once known.
    fn url(&self) -> Option<&str>;

    /// Release backend-held resources. Safe to call more than once.
    fn close(&mut self) {}
}

/// Content type to store for a remote name. HTML is marked so browsers
/// render it instead of downloading it; everything else is left to the
/// provider's default.
pub fn content_type_for(remote_name: &str) -> Option<&'static str> {
    if remote_name.ends_with(".html") {
        Some("text/html")
    } else {
        None
    }
}

/// Compute the remote key of a file under a destination path.
/// Scheme: `{destination}/{remote_name}`
pub fn remote_key(destination: &str, remote_name: &str) -> String {
    let destination = destination.trim_end_matches('/');
    let remote_name = remote_name.trim_start_matches('/');
    if destination.is_empty() {
        remote_name.to_string()
    } else {
        format!("{}/{}", destination, remote_name)
    }
}
