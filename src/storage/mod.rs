use async_trait::async_trait;
use bytes::Bytes;

mod local;
#[cfg(test)]
pub(crate) mod memory;
mod s3;

pub use local::LocalStorage;
pub use s3::S3Storage;

/// Attachment store: blobs addressed by generated names, outside the record store.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
}
