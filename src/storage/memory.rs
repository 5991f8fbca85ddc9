// In-memory bucket used by tests.
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use super::ObjectStore;

pub(crate) struct MemoryObjectStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub(crate) fn with_bucket(bucket: &str) -> Self {
        MemoryObjectStore {
            bucket: bucket.to_string(),
            objects: Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) fn insert(&self, key: &str, body: &[u8]) {
        self.objects
            .lock()
            .expect("memory store lock")
            .insert(key.to_string(), body.to_vec());
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.objects.lock().expect("memory store lock").contains_key(key)
    }

    fn check_bucket(&self, bucket: &str) -> Result<()> {
        if bucket != self.bucket {
            bail!("NoSuchBucket: {}", bucket);
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn head_bucket(&self, bucket: &str) -> Result<()> {
        self.check_bucket(bucket)
    }

    async fn put_object(&self, bucket: &str, key: &str, source: &Path) -> Result<()> {
        self.check_bucket(bucket)?;
        let body = std::fs::read(source).with_context(|| format!("Failed to read {}", source.display()))?;
        self.insert(key, &body);
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        self.check_bucket(bucket)?;
        let objects = self.objects.lock().expect("memory store lock");
        Ok(objects.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    async fn get_object(&self, bucket: &str, key: &str, destination: &Path) -> Result<u64> {
        self.check_bucket(bucket)?;
        let body = self
            .objects
            .lock()
            .expect("memory store lock")
            .get(key)
            .cloned()
            .with_context(|| format!("NoSuchKey: {}", key))?;
        std::fs::write(destination, &body)?;
        Ok(body.len() as u64)
    }
}
