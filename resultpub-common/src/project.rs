use chrono::Local;
use serde::{Deserialize, Serialize};

const TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// Identity of one run whose results are being published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub repository: String,
    pub engine_tag: String,
    pub timestamp: String,
}

impl Project {
    pub fn new(
        repository: impl Into<String>,
        engine_tag: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            engine_tag: engine_tag.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Project stamped with the current local time.
    pub fn starting_now(repository: impl Into<String>, engine_tag: impl Into<String>) -> Self {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        Self::new(repository, engine_tag, timestamp)
    }

    /// Key prefix under which every artifact of this run is stored.
    /// Scheme: `{repository}/CI/{engine_tag}-{timestamp}`
    pub fn destination_path(&self) -> String {
        format!(
            "{}/CI/{}-{}",
            self.repository.trim_end_matches('/'),
            self.engine_tag,
            self.timestamp
        )
    }
}
