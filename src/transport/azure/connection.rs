//! Azure Storage connection strings.
//!
//! `Key=Value` pairs separated by `;`. Only the blob service keys matter here.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Url;

use crate::transport::TransportError;

const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// Parsed credentials and endpoint for the blob service.
#[derive(Clone)]
pub struct ConnectionString {
    pub account_name: String,
    pub account_key: Vec<u8>,
    pub blob_endpoint: Url,
}

impl std::fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionString")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("blob_endpoint", &self.blob_endpoint.as_str())
            .finish()
    }
}

impl ConnectionString {
    pub fn parse(input: &str) -> Result<Self, TransportError> {
        let mut account_name = None;
        let mut account_key = None;
        let mut blob_endpoint = None;
        let mut protocol = "https".to_string();
        let mut suffix = "core.windows.net".to_string();
        let mut development = false;

        for part in input.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                TransportError::InvalidConnectionString(format!("segment without '=': {}", redact(part)))
            })?;
            match key.trim() {
                "AccountName" => account_name = Some(value.trim().to_string()),
                "AccountKey" => account_key = Some(value.trim().to_string()),
                "BlobEndpoint" => blob_endpoint = Some(value.trim().to_string()),
                "DefaultEndpointsProtocol" => protocol = value.trim().to_string(),
                "EndpointSuffix" => suffix = value.trim().to_string(),
                "UseDevelopmentStorage" => development = value.trim().eq_ignore_ascii_case("true"),
                other => tracing::debug!(key = %other, "Ignoring connection string key"),
            }
        }

        if development {
            account_name.get_or_insert_with(|| DEV_ACCOUNT_NAME.to_string());
            account_key.get_or_insert_with(|| DEV_ACCOUNT_KEY.to_string());
            blob_endpoint.get_or_insert_with(|| DEV_BLOB_ENDPOINT.to_string());
        }

        let account_name = account_name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| TransportError::InvalidConnectionString("missing AccountName".into()))?;
        let account_key = account_key
            .ok_or_else(|| TransportError::InvalidConnectionString("missing AccountKey".into()))?;
        let account_key = STANDARD
            .decode(account_key.as_bytes())
            .map_err(|e| TransportError::InvalidConnectionString(format!("AccountKey is not base64: {e}")))?;

        let endpoint = blob_endpoint
            .unwrap_or_else(|| format!("{protocol}://{account_name}.blob.{suffix}"));
        let blob_endpoint = Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|e| TransportError::InvalidConnectionString(format!("bad blob endpoint {endpoint}: {e}")))?;

        Ok(Self {
            account_name,
            account_key,
            blob_endpoint,
        })
    }

    /// URL for a container, or a blob inside it when `blob` is given.
    pub fn resource_url(&self, container: &str, blob: Option<&str>) -> Url {
        let mut url = self.blob_endpoint.clone();
        {
            let mut path = url.path().trim_end_matches('/').to_string();
            path.push('/');
            path.push_str(container);
            if let Some(blob) = blob {
                path.push('/');
                path.push_str(blob);
            }
            url.set_path(&path);
        }
        url
    }
}

fn redact(segment: &str) -> String {
    match segment.split_once('=') {
        Some((key, _)) => format!("{key}=<redacted>"),
        None => segment.chars().take(16).collect(),
    }
}
