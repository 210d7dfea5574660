//! Azure Blob Storage backend over plain REST.
//!
//! Uploads are staged as blocks (Put Block) with bounded concurrency and
//! committed with Put Block List, so the sweep's block size maps directly to
//! the request size on the wire.

pub mod auth;
pub mod connection;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};

use super::{BlobStream, BlobTransport, RetryPolicy, TransportError, UploadOptions};
pub use connection::ConnectionString;

pub struct AzureBlobClient {
    http: reqwest::Client,
    credentials: ConnectionString,
    retry: RetryPolicy,
}

impl AzureBlobClient {
    pub fn new(credentials: ConnectionString, retry: RetryPolicy) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("blobsweep/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            credentials,
            retry,
        })
    }

    pub fn from_connection_string(input: &str, retry: RetryPolicy) -> Result<Self, TransportError> {
        Self::new(ConnectionString::parse(input)?, retry)
    }

    pub fn endpoint(&self) -> &Url {
        &self.credentials.blob_endpoint
    }

    /// Sign and send one request, retrying per policy. `build` is called once
    /// per attempt so each attempt carries a fresh `x-ms-date` and signature.
    async fn send<F>(&self, operation: &'static str, build: F) -> Result<Response, TransportError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let http = &self.http;
        let credentials = &self.credentials;
        let build = &build;
        let response = self
            .retry
            .send(operation, move || async move {
                let mut request = build(http)
                    .header("x-ms-version", auth::MS_VERSION)
                    .header("x-ms-date", auth::ms_date(chrono::Utc::now()))
                    .build()
                    .map_err(reqwest_middleware::Error::from)?;
                auth::authorize(&credentials.account_name, &credentials.account_key, &mut request);
                http.execute(request).await.map_err(reqwest_middleware::Error::from)
            })
            .await?;
        check_status(operation, response).await
    }

    async fn put_block(
        &self,
        url: &Url,
        block_id: &str,
        chunk: Bytes,
    ) -> Result<(), TransportError> {
        tracing::debug!(%block_id, len = chunk.len(), "Put Block");
        self.send("put block", |http| {
            http.put(url.clone())
                .query(&[("comp", "block"), ("blockid", block_id)])
                .body(chunk.clone())
        })
        .await?;
        Ok(())
    }

    async fn put_block_list(&self, url: &Url, block_ids: &[String]) -> Result<(), TransportError> {
        let body = Bytes::from(block_list_xml(block_ids));
        self.send("put block list", |http| {
            http.put(url.clone())
                .query(&[("comp", "blocklist")])
                .header("content-type", "application/xml")
                .body(body.clone())
        })
        .await?;
        Ok(())
    }
}

async fn check_status(operation: &'static str, response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let code = response
        .headers()
        .get("x-ms-error-code")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let message = match code {
        Some(code) => code,
        None => response.text().await.unwrap_or_default(),
    };
    Err(TransportError::Status {
        operation,
        status: status.as_u16(),
        message,
    })
}

/// Block IDs must all have the same length within a blob.
pub fn block_id(index: usize) -> String {
    STANDARD.encode(format!("block-{index:08}"))
}

/// Split `payload` into `block_size` chunks without copying.
pub fn split_blocks(payload: &Bytes, block_size: u64) -> Vec<Bytes> {
    let step = usize::try_from(block_size.max(1)).unwrap_or(usize::MAX);
    let mut blocks = Vec::with_capacity(payload.len().div_ceil(step).max(1));
    let mut offset = 0;
    while offset < payload.len() {
        let end = payload.len().min(offset.saturating_add(step));
        blocks.push(payload.slice(offset..end));
        offset = end;
    }
    if blocks.is_empty() {
        blocks.push(Bytes::new());
    }
    blocks
}

fn block_list_xml(block_ids: &[String]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?><BlockList>"#);
    for id in block_ids {
        xml.push_str("<Latest>");
        xml.push_str(id);
        xml.push_str("</Latest>");
    }
    xml.push_str("</BlockList>");
    xml
}

#[async_trait]
impl BlobTransport for AzureBlobClient {
    async fn create_container(&self, container: &str) -> Result<(), TransportError> {
        let url = self.credentials.resource_url(container, None);
        let result = self
            .send("create container", |http| {
                http.put(url.clone())
                    .query(&[("restype", "container")])
                    .body(Bytes::new())
            })
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(TransportError::Status { status, .. }) if status == StatusCode::CONFLICT.as_u16() => {
                Err(TransportError::ContainerExists(container.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_container(&self, container: &str) -> Result<(), TransportError> {
        let url = self.credentials.resource_url(container, None);
        let result = self
            .send("delete container", |http| {
                http.request(Method::DELETE, url.clone())
                    .query(&[("restype", "container")])
            })
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(TransportError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Err(TransportError::ContainerNotFound(container.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn upload(
        &self,
        container: &str,
        blob: &str,
        payload: Bytes,
        options: UploadOptions,
    ) -> Result<(), TransportError> {
        let url = self.credentials.resource_url(container, Some(blob));
        let blocks = split_blocks(&payload, options.block_size);
        let block_ids: Vec<String> = (0..blocks.len()).map(block_id).collect();
        tracing::debug!(%blob, blocks = blocks.len(), concurrency = options.concurrency, "Staging blocks");

        let url = &url;
        futures::stream::iter(block_ids.clone().into_iter().zip(blocks))
            .map(move |(id, chunk)| async move { self.put_block(url, &id, chunk).await })
            .buffer_unordered(options.concurrency.max(1))
            .try_collect::<Vec<()>>()
            .await?;

        self.put_block_list(url, &block_ids).await
    }

    async fn download(&self, container: &str, blob: &str) -> Result<BlobStream, TransportError> {
        let url = self.credentials.resource_url(container, Some(blob));
        let response = self
            .send("get blob", |http| http.get(url.clone()))
            .await
            .map_err(|e| match e {
                TransportError::Status { status, .. } if status == StatusCode::NOT_FOUND.as_u16() => {
                    TransportError::BlobNotFound {
                        container: container.to_string(),
                        blob: blob.to_string(),
                    }
                }
                other => other,
            })?;
        Ok(response.bytes_stream().map_err(TransportError::from).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> AzureBlobClient {
        let retry = RetryPolicy {
            max_retries: Some(3),
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        };
        AzureBlobClient::from_connection_string(
            &format!("AccountName=acct;AccountKey=c2VjcmV0LWtleQ==;BlobEndpoint={}", server.uri()),
            retry,
        )
        .unwrap()
    }

    #[test]
    fn test_split_blocks_covers_payload() {
        let payload = Bytes::from(vec![0u8; 10]);
        let blocks = split_blocks(&payload, 4);
        let sizes: Vec<usize> = blocks.iter().map(Bytes::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_split_blocks_larger_than_payload() {
        let payload = Bytes::from(vec![0u8; 3]);
        let blocks = split_blocks(&payload, 1024);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].len(), 3);
    }

    #[test]
    fn test_block_ids_have_equal_length() {
        assert_eq!(block_id(0).len(), block_id(99_999_999).len());
        assert_ne!(block_id(1), block_id(2));
    }

    #[test]
    fn test_block_list_xml() {
        let xml = block_list_xml(&[block_id(0), block_id(1)]);
        assert!(xml.starts_with("<?xml"));
        assert_eq!(xml.matches("<Latest>").count(), 2);
        assert!(xml.ends_with("</BlockList>"));
    }

    #[tokio::test]
    async fn test_upload_stages_blocks_then_commits() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/c1/4-1"))
            .and(query_param("comp", "block"))
            .and(header("x-ms-version", auth::MS_VERSION))
            .and(header_exists("x-ms-date"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(201))
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/c1/4-1"))
            .and(query_param("comp", "blocklist"))
            .and(body_string_contains("<BlockList>"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let options = UploadOptions {
            block_size: 4,
            concurrency: 2,
        };
        client(&server)
            .upload("c1", "4-1", Bytes::from(vec![0u8; 10]), options)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 4);
        let commit = requests.last().unwrap();
        assert!(commit.url.query().unwrap_or("").contains("comp=blocklist"));
        let xml = String::from_utf8(commit.body.clone()).unwrap();
        assert_eq!(xml.matches("<Latest>").count(), 3);
        for request in &requests {
            let auth = request.headers.get("authorization").unwrap().to_str().unwrap();
            assert!(auth.starts_with("SharedKey acct:"));
        }
    }

    #[tokio::test]
    async fn test_download_streams_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/c1/4-1"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"0123456789".to_vec()))
            .mount(&server)
            .await;

        let mut body = client(&server).download("c1", "4-1").await.unwrap();
        let mut total = 0;
        while let Some(chunk) = body.next().await {
            total += chunk.unwrap().len();
        }
        assert_eq!(total, 10);
    }

    #[tokio::test]
    async fn test_create_conflict_is_container_exists() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/c1"))
            .and(query_param("restype", "container"))
            .respond_with(ResponseTemplate::new(409).insert_header("x-ms-error-code", "ContainerAlreadyExists"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).create_container("c1").await.unwrap_err();
        assert!(matches!(err, TransportError::ContainerExists(name) if name == "c1"));
    }

    #[tokio::test]
    async fn test_not_found_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/c1"))
            .and(query_param("restype", "container"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/c1/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client(&server);
        let err = client.delete_container("c1").await.unwrap_err();
        assert!(matches!(err, TransportError::ContainerNotFound(_)));
        let err = client.download("c1", "missing").await.err().unwrap();
        assert!(matches!(err, TransportError::BlobNotFound { .. }));
    }

    #[tokio::test]
    async fn test_server_busy_is_retried_and_resigned() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/c1"))
            .respond_with(ResponseTemplate::new(503).insert_header("x-ms-error-code", "ServerBusy"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/c1"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        client(&server).create_container("c1").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.headers.contains_key("authorization")));
    }

    #[tokio::test]
    async fn test_retry_budget_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/c1"))
            .respond_with(ResponseTemplate::new(500).insert_header("x-ms-error-code", "InternalError"))
            .mount(&server)
            .await;

        let err = client(&server).create_container("c1").await.unwrap_err();
        match err {
            TransportError::Status { status, message, .. } => {
                assert_eq!(status, 500);
                assert_eq!(message, "InternalError");
            }
            other => panic!("expected status error, got {other}"),
        }
        // One attempt plus three retries.
        assert_eq!(server.received_requests().await.unwrap().len(), 4);
    }
}
