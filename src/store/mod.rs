//! Object store gateway.
//!
//! The variant engine only needs a handful of blob operations, so they are
//! collected behind the [`ObjectStore`] trait:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             VariantService              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           ObjectStore Trait             │
//! │  put · get · exists · delete · list     │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │  S3ObjectStore  │    │  MemoryObjectStore  │
//! │ (aws-sdk-s3)    │    │ (tests / dev mode)  │
//! └─────────────────┘    └─────────────────────┘
//! ```
//!
//! Stores do not retry. Transport-level retries belong to the wrapped
//! client, and the engine treats any gateway error as fatal for the request.

mod memory;
mod s3;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreError;

pub use memory::MemoryObjectStore;
pub use s3::{
    create_s3_client, default_public_url, S3ObjectStore, DEFAULT_UPLOAD_CONCURRENCY,
    DEFAULT_UPLOAD_PART_SIZE, MIN_UPLOAD_PART_SIZE,
};

/// An object read back from the store.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Raw object bytes
    pub body: Bytes,

    /// Content type recorded when the object was written, if any
    pub content_type: Option<String>,
}

/// Minimal capability surface over a key-value blob store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` at `key`, replacing any existing object.
    ///
    /// The object only becomes visible once the whole body has been written.
    async fn put(&self, key: &str, body: Bytes, content_type: Option<&str>)
        -> Result<(), StoreError>;

    /// Read the object at `key`.
    ///
    /// Returns `StoreError::NotFound` if no object exists.
    async fn get(&self, key: &str) -> Result<StoredObject, StoreError>;

    /// Check whether an object exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Delete the object at `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// List every key starting with `prefix`, walking all pages.
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Public location of the object at `key`.
    fn url(&self, key: &str) -> String;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StoreError> {
        (**self).put(key, body, content_type).await
    }

    async fn get(&self, key: &str) -> Result<StoredObject, StoreError> {
        (**self).get(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        (**self).exists(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).list_by_prefix(prefix).await
    }

    fn url(&self, key: &str) -> String {
        (**self).url(key)
    }
}
