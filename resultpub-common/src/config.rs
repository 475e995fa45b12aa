use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Environment prefix of the S3 access key pair.
pub const S3_CREDENTIALS_PREFIX: &str = "RESULTPUB_S3";
/// Environment prefix of the Aliyun OSS access key pair.
pub const OSS_CREDENTIALS_PREFIX: &str = "RESULTPUB_OSS";

const DEFAULT_S3_REGION: &str = "us-east-1";

/// Publishing destination, selected by the `provider` field of the config
/// file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum UploaderConfig {
    S3(S3Config),
    Oss(OssConfig),
    Directory(DirectoryConfig),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct S3Config {
    pub bucket_name: String,
    /// Service host, optionally with an `http://` or `https://` scheme.
    pub endpoint: String,
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// Address the bucket in the path instead of the host name.
    #[serde(default)]
    pub path_style: bool,
    /// Seed the index from objects already under the destination path.
    #[serde(default)]
    pub resume_from_remote: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OssConfig {
    pub bucket_name: String,
    pub endpoint: String,
    /// Derived from `oss-<region>.aliyuncs.com` endpoints when absent.
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirectoryConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub resume_from_remote: bool,
}

fn default_s3_region() -> String {
    DEFAULT_S3_REGION.to_string()
}

impl UploaderConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let config: UploaderConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn provider(&self) -> &'static str {
        match self {
            UploaderConfig::S3(_) => "s3",
            UploaderConfig::Oss(_) => "oss",
            UploaderConfig::Directory(_) => "directory",
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        match self {
            UploaderConfig::S3(c) => {
                if c.bucket_name.is_empty() {
                    anyhow::bail!("bucket_name must not be empty");
                }
                if c.endpoint.is_empty() {
                    anyhow::bail!("endpoint must not be empty");
                }
                if c.region.is_empty() {
                    anyhow::bail!("region must not be empty");
                }
            }
            UploaderConfig::Oss(c) => {
                if c.bucket_name.is_empty() {
                    anyhow::bail!("bucket_name must not be empty");
                }
                if c.endpoint.is_empty() {
                    anyhow::bail!("endpoint must not be empty");
                }
            }
            UploaderConfig::Directory(c) => {
                if c.path.as_os_str().is_empty() {
                    anyhow::bail!("path must not be empty");
                }
            }
        }
        Ok(())
    }
}

/// Access key pair of one provider.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read `{prefix}_ACCESS_KEY_ID` and `{prefix}_SECRET_ACCESS_KEY` from the
    /// environment.
    pub fn from_env(prefix: &str) -> anyhow::Result<Self> {
        Self::from_lookup(prefix, |name| std::env::var(name).ok())
    }

    pub fn from_lookup(
        prefix: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let fetch = |suffix: &str| -> anyhow::Result<String> {
            let name = format!("{}_{}", prefix, suffix);
            match lookup(&name) {
                Some(value) if !value.is_empty() => Ok(value),
                _ => anyhow::bail!("{} is not set", name),
            }
        };
        Ok(Self {
            access_key_id: fetch("ACCESS_KEY_ID")?,
            secret_access_key: fetch("SECRET_ACCESS_KEY")?,
        })
    }
}
