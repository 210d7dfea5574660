//! Object-storage transport: the client the sweep drives.
//!
//! The core only sees [`BlobTransport`]. Backends are chosen from the
//! connection string by [`connect`].

pub mod azure;
pub mod memory;
pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

pub use azure::AzureBlobClient;
pub use memory::InMemoryTransport;
pub use retry::RetryPolicy;

/// Connection string that selects the process-local backend.
pub const MEMORY_CONNECTION_STRING: &str = "memory://";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} returned HTTP {status}: {message}")]
    Status {
        operation: &'static str,
        status: u16,
        message: String,
    },

    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("container {0} does not exist")]
    ContainerNotFound(String),

    #[error("container {0} already exists")]
    ContainerExists(String),

    #[error("blob {container}/{blob} does not exist")]
    BlobNotFound { container: String, blob: String },

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest_middleware::Error> for TransportError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(e) => TransportError::Http(e),
            reqwest_middleware::Error::Middleware(e) => TransportError::Unavailable(format!("{e:#}")),
        }
    }
}

/// Chunking parameters for a single upload call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    /// Size of each block sent to the backend, in bytes.
    pub block_size: u64,
    /// Number of blocks in flight at once.
    pub concurrency: usize,
}

/// Body of a download. It must be drained for the transfer to count as done.
pub type BlobStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Object-storage client used by the sweep.
///
/// Implementations own their retry behaviour. Deadlines are applied by the
/// caller around each call, so a dropped future must leave no state behind
/// that affects later calls.
#[async_trait]
pub trait BlobTransport: Send + Sync {
    async fn create_container(&self, container: &str) -> Result<(), TransportError>;

    async fn delete_container(&self, container: &str) -> Result<(), TransportError>;

    async fn upload(
        &self,
        container: &str,
        blob: &str,
        payload: Bytes,
        options: UploadOptions,
    ) -> Result<(), TransportError>;

    async fn download(&self, container: &str, blob: &str) -> Result<BlobStream, TransportError>;
}

#[async_trait]
impl<T: BlobTransport + ?Sized> BlobTransport for Arc<T> {
    async fn create_container(&self, container: &str) -> Result<(), TransportError> {
        (**self).create_container(container).await
    }

    async fn delete_container(&self, container: &str) -> Result<(), TransportError> {
        (**self).delete_container(container).await
    }

    async fn upload(
        &self,
        container: &str,
        blob: &str,
        payload: Bytes,
        options: UploadOptions,
    ) -> Result<(), TransportError> {
        (**self).upload(container, blob, payload, options).await
    }

    async fn download(&self, container: &str, blob: &str) -> Result<BlobStream, TransportError> {
        (**self).download(container, blob).await
    }
}

/// Transport settings that are not part of the sweep itself.
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    pub retry: RetryPolicy,
}

/// Build a transport for `connection_string`.
///
/// `memory://` selects [`InMemoryTransport`]; anything else is parsed as an
/// Azure Storage connection string.
pub fn connect(
    connection_string: &str,
    config: &TransportConfig,
) -> Result<Arc<dyn BlobTransport>, TransportError> {
    if connection_string.trim() == MEMORY_CONNECTION_STRING {
        tracing::info!("Using in-memory blob transport");
        return Ok(Arc::new(InMemoryTransport::new()));
    }

    let client = AzureBlobClient::from_connection_string(connection_string, config.retry.clone())?;
    tracing::info!(endpoint = %client.endpoint(), "Using Azure Blob transport");
    Ok(Arc::new(client))
}
