//! In-memory object store for tests, with per-operation failure injection.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use resultpub_common::UploadError;

use super::{check_size, ObjectStore, MAX_SINGLE_PUT_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Probe,
    Put,
    Delete,
    List,
}

struct Injection {
    op: Op,
    key_suffix: Option<String>,
    make: Box<dyn FnOnce() -> UploadError + Send>,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, StoredObject>,
    injections: Vec<Injection>,
    calls: Vec<(Op, String)>,
}

/// Clones share state, so a test can keep a handle while a backend owns the
/// store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    max_object_size: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            max_object_size: MAX_SINGLE_PUT_SIZE,
        }
    }

    pub fn with_max_object_size(mut self, limit: u64) -> Self {
        self.max_object_size = limit;
        self
    }

    /// Fail the next call of `op`.
    pub fn fail_next(&self, op: Op, make: impl FnOnce() -> UploadError + Send + 'static) {
        self.inner.lock().unwrap().injections.push(Injection {
            op,
            key_suffix: None,
            make: Box::new(make),
        });
    }

    /// Fail the next call of `op` whose key ends with `suffix`.
    pub fn fail_next_for(
        &self,
        op: Op,
        suffix: &str,
        make: impl FnOnce() -> UploadError + Send + 'static,
    ) {
        self.inner.lock().unwrap().injections.push(Injection {
            op,
            key_suffix: Some(suffix.to_string()),
            make: Box::new(make),
        });
    }

    pub fn insert(&self, key: &str, body: &str) {
        self.inner.lock().unwrap().objects.insert(
            key.to_string(),
            StoredObject {
                body: Bytes::from(body.to_string()),
                content_type: None,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.inner.lock().unwrap().objects.get(key).cloned()
    }

    pub fn get_text(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(|o| String::from_utf8_lossy(&o.body).into_owned())
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<(Op, String)> {
        self.inner.lock().unwrap().calls.clone()
    }

    fn enter(&self, op: Op, key: &str) -> Result<(), UploadError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push((op, key.to_string()));
        let hit = inner.injections.iter().position(|inj| {
            inj.op == op
                && inj
                    .key_suffix
                    .as_deref()
                    .map_or(true, |suffix| key.ends_with(suffix))
        });
        match hit {
            Some(i) => {
                let injection = inner.injections.remove(i);
                Err((injection.make)())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn probe(&self) -> Result<(), UploadError> {
        self.enter(Op::Probe, "")
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), UploadError> {
        self.enter(Op::Put, key)?;
        check_size(body.len() as u64, self.max_object_size)?;
        self.inner.lock().unwrap().objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.map(|s| s.to_string()),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), UploadError> {
        self.enter(Op::Delete, key)?;
        self.inner.lock().unwrap().objects.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, UploadError> {
        self.enter(Op::List, prefix)?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://memory.invalid/{}", key)
    }

    fn bucket_label(&self) -> String {
        "memory".to_string()
    }

    fn max_object_size(&self) -> u64 {
        self.max_object_size
    }
}
