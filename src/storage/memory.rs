use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use bytes::Bytes;

use super::StorageClient;

/// Recording storage for tests, with switchable failures.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Bytes>>,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryStorage {
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn fail_puts(&self, on: bool) {
        self.fail_puts.store(on, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, on: bool) {
        self.fail_deletes.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        anyhow::ensure!(!self.fail_puts.load(Ordering::SeqCst), "put_object {key} refused");
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        anyhow::ensure!(!self.fail_deletes.load(Ordering::SeqCst), "delete_object {key} refused");
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}
