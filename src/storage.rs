use std::future::Future;

use aws_sdk_s3::{
    error::DisplayErrorContext, primitives::ByteStream, types::StorageClass, Client,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("NoSuchKey: the object {bucket}/{key} does not exist")]
    NotFound { bucket: String, key: String },
    #[error("object exceeds the maximum of {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("{0}")]
    Backend(String),
}

/// Parameters of a single object write.
#[derive(Debug, Clone, Copy)]
pub struct PutRequest<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub body: &'a [u8],
    pub content_type: &'a str,
    pub storage_class: &'a str,
}

pub trait ObjectStore: Send + Sync {
    fn get(
        &self,
        bucket: &str,
        key: &str,
    ) -> impl Future<Output = Result<Vec<u8>, StorageError>> + Send;

    fn put(&self, request: PutRequest<'_>) -> impl Future<Output = Result<(), StorageError>> + Send;
}

#[derive(Clone, Debug)]
pub struct S3Store {
    client: Client,
    max_object_bytes: u64,
}

impl S3Store {
    pub fn new(client: Client, max_object_bytes: u64) -> Self {
        Self {
            client,
            max_object_bytes,
        }
    }
}

impl ObjectStore for S3Store {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StorageError::Backend(DisplayErrorContext(&service_error).to_string())
                }
            })?;

        // check the advertised length before pulling the body into memory
        if let Some(length) = resp.content_length() {
            if u64::try_from(length).unwrap_or(0) > self.max_object_bytes {
                return Err(StorageError::TooLarge {
                    limit: self.max_object_bytes,
                });
            }
        }

        read_capped(resp.body, self.max_object_bytes).await
    }

    async fn put(&self, request: PutRequest<'_>) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(request.bucket)
            .key(request.key)
            .body(ByteStream::from(request.body.to_vec()))
            .content_type(request.content_type)
            .storage_class(StorageClass::from(request.storage_class))
            .send()
            .await
            .map_err(|e| {
                StorageError::Backend(DisplayErrorContext(&e.into_service_error()).to_string())
            })?;
        Ok(())
    }
}

/// Drains `body` chunk by chunk, giving up as soon as more than `limit`
/// bytes have arrived.
async fn read_capped(mut body: ByteStream, limit: u64) -> Result<Vec<u8>, StorageError> {
    let mut content_length: u64 = 0;
    let mut buffer = Vec::new();
    while let Some(chunk) = body
        .try_next()
        .await
        .map_err(|e| StorageError::Backend(format!("failed to read object body: {e}")))?
    {
        content_length += chunk.len() as u64;
        if content_length > limit {
            return Err(StorageError::TooLarge { limit });
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer)
}


#[cfg(test)]
pub mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::{ObjectStore, PutRequest, StorageError};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct StoredObject {
        pub bucket: String,
        pub key: String,
        pub body: Vec<u8>,
        pub content_type: String,
        pub storage_class: String,
    }

    /// In-memory store that records every call made against it.
    #[derive(Debug, Default)]
    pub struct MemoryStore {
        objects: Mutex<HashMap<(String, String), Vec<u8>>>,
        gets: Mutex<Vec<(String, String)>>,
        puts: Mutex<Vec<StoredObject>>,
        fail_puts: bool,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_puts() -> Self {
            Self {
                fail_puts: true,
                ..Self::default()
            }
        }

        pub fn insert(&self, bucket: &str, key: &str, body: Vec<u8>) {
            self.objects
                .lock()
                .unwrap()
                .insert((bucket.to_string(), key.to_string()), body);
        }

        pub fn gets(&self) -> Vec<(String, String)> {
            self.gets.lock().unwrap().clone()
        }

        pub fn puts(&self) -> Vec<StoredObject> {
            self.puts.lock().unwrap().clone()
        }
    }

    impl ObjectStore for MemoryStore {
        async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
            self.gets
                .lock()
                .unwrap()
                .push((bucket.to_string(), key.to_string()));
            self.objects
                .lock()
                .unwrap()
                .get(&(bucket.to_string(), key.to_string()))
                .cloned()
                .ok_or_else(|| StorageError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
        }

        async fn put(&self, request: PutRequest<'_>) -> Result<(), StorageError> {
            if self.fail_puts {
                return Err(StorageError::Backend("AccessDenied: Access Denied".into()));
            }
            self.puts.lock().unwrap().push(StoredObject {
                bucket: request.bucket.to_string(),
                key: request.key.to_string(),
                body: request.body.to_vec(),
                content_type: request.content_type.to_string(),
                storage_class: request.storage_class.to_string(),
            });
            self.objects.lock().unwrap().insert(
                (request.bucket.to_string(), request.key.to_string()),
                request.body.to_vec(),
            );
            Ok(())
        }
    }
}
