//! Process-local transport.
//!
//! Selected with the `memory://` connection string for dry runs of the
//! harness, and used by the test suite with injected delays and faults.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use super::{BlobStream, BlobTransport, TransportError, UploadOptions};

/// One upload call as seen by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub container: String,
    pub blob: String,
    pub len: usize,
    pub options: UploadOptions,
}

#[derive(Debug, Default)]
struct State {
    containers: HashMap<String, HashMap<String, Bytes>>,
    uploads: Vec<UploadRecord>,
    downloads: usize,
    deleted: Vec<String>,
}

#[derive(Debug, Default)]
struct Faults {
    upload_delay: Option<Duration>,
    download_delay: Option<Duration>,
    /// 1-based index of the download call that fails.
    fail_download_call: Option<usize>,
    /// 1-based index of the upload call that fails.
    fail_upload_call: Option<usize>,
    fail_create: bool,
    fail_delete: bool,
}

#[derive(Debug, Default)]
pub struct InMemoryTransport {
    state: Mutex<State>,
    faults: Faults,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every upload call.
    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.faults.upload_delay = Some(delay);
        self
    }

    /// Sleep this long while streaming every download body.
    pub fn with_download_delay(mut self, delay: Duration) -> Self {
        self.faults.download_delay = Some(delay);
        self
    }

    pub fn failing_upload(mut self, call: usize) -> Self {
        self.faults.fail_upload_call = Some(call);
        self
    }

    pub fn failing_download(mut self, call: usize) -> Self {
        self.faults.fail_download_call = Some(call);
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.faults.fail_create = true;
        self
    }

    pub fn failing_delete(mut self) -> Self {
        self.faults.fail_delete = true;
        self
    }

    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.lock().uploads.clone()
    }

    pub fn download_count(&self) -> usize {
        self.lock().downloads
    }

    pub fn container_exists(&self, container: &str) -> bool {
        self.lock().containers.contains_key(container)
    }

    /// Containers deleted so far, in order.
    pub fn deleted_containers(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BlobTransport for InMemoryTransport {
    async fn create_container(&self, container: &str) -> Result<(), TransportError> {
        if self.faults.fail_create {
            return Err(TransportError::Unavailable("create container refused".into()));
        }
        let mut state = self.lock();
        if state.containers.contains_key(container) {
            return Err(TransportError::ContainerExists(container.to_string()));
        }
        state.containers.insert(container.to_string(), HashMap::new());
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> Result<(), TransportError> {
        if self.faults.fail_delete {
            return Err(TransportError::Unavailable("delete container refused".into()));
        }
        let mut state = self.lock();
        if state.containers.remove(container).is_none() {
            return Err(TransportError::ContainerNotFound(container.to_string()));
        }
        state.deleted.push(container.to_string());
        Ok(())
    }

    async fn upload(
        &self,
        container: &str,
        blob: &str,
        payload: Bytes,
        options: UploadOptions,
    ) -> Result<(), TransportError> {
        let call = {
            let mut state = self.lock();
            state.uploads.push(UploadRecord {
                container: container.to_string(),
                blob: blob.to_string(),
                len: payload.len(),
                options,
            });
            state.uploads.len()
        };
        if let Some(delay) = self.faults.upload_delay {
            tokio::time::sleep(delay).await;
        }
        if self.faults.fail_upload_call == Some(call) {
            return Err(TransportError::Unavailable(format!("upload call {call} failed")));
        }

        let mut state = self.lock();
        let blobs = state
            .containers
            .get_mut(container)
            .ok_or_else(|| TransportError::ContainerNotFound(container.to_string()))?;
        blobs.insert(blob.to_string(), payload);
        Ok(())
    }

    async fn download(&self, container: &str, blob: &str) -> Result<BlobStream, TransportError> {
        let (call, data) = {
            let mut state = self.lock();
            state.downloads += 1;
            let call = state.downloads;
            let data = state
                .containers
                .get(container)
                .ok_or_else(|| TransportError::ContainerNotFound(container.to_string()))?
                .get(blob)
                .cloned()
                .ok_or_else(|| TransportError::BlobNotFound {
                    container: container.to_string(),
                    blob: blob.to_string(),
                })?;
            (call, data)
        };
        if self.faults.fail_download_call == Some(call) {
            return Err(TransportError::Unavailable(format!("download call {call} failed")));
        }

        let delay = self.faults.download_delay;
        let body = futures::stream::once(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(data)
        });
        Ok(body.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    const OPTIONS: UploadOptions = UploadOptions {
        block_size: 4,
        concurrency: 2,
    };

    #[tokio::test]
    async fn test_upload_then_download() {
        let transport = InMemoryTransport::new();
        transport.create_container("c1").await.unwrap();
        transport
            .upload("c1", "4-1", Bytes::from_static(b"abcdefgh"), OPTIONS)
            .await
            .unwrap();

        let chunks: Vec<Bytes> = transport.download("c1", "4-1").await.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"abcdefgh");
        assert_eq!(transport.uploads()[0].options, OPTIONS);
        assert_eq!(transport.download_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_container_and_blob() {
        let transport = InMemoryTransport::new();
        let err = transport.upload("nope", "b", Bytes::new(), OPTIONS).await.unwrap_err();
        assert!(matches!(err, TransportError::ContainerNotFound(_)));

        transport.create_container("c1").await.unwrap();
        let err = transport.download("c1", "missing").await.err().unwrap();
        assert!(matches!(err, TransportError::BlobNotFound { .. }));
    }

    #[tokio::test]
    async fn test_container_lifecycle() {
        let transport = InMemoryTransport::new();
        transport.create_container("c1").await.unwrap();
        assert!(matches!(
            transport.create_container("c1").await,
            Err(TransportError::ContainerExists(_))
        ));
        transport.delete_container("c1").await.unwrap();
        assert!(!transport.container_exists("c1"));
        assert_eq!(transport.deleted_containers(), vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn test_injected_download_failure_hits_requested_call() {
        let transport = InMemoryTransport::new().failing_download(2);
        transport.create_container("c1").await.unwrap();
        transport.upload("c1", "b", Bytes::from_static(b"x"), OPTIONS).await.unwrap();

        assert!(transport.download("c1", "b").await.is_ok());
        assert!(transport.download("c1", "b").await.is_err());
        assert!(transport.download("c1", "b").await.is_ok());
    }
}
