pub mod config;
pub mod failure;
pub mod project;
pub mod uploader;

pub use failure::{guard, Failure, FailureKind, Published, UploadError};
pub use project::Project;
pub use uploader::ResultUploader;
