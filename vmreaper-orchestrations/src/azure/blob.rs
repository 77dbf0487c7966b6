//! Blob storage data plane with SharedKey authorization

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use reqwest::{Method, StatusCode};
use sha2::Sha256;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use super::AzureEndpoints;
use crate::provider::{BlobStore, ProviderError, StorageConnector, StorageKey};

pub const BLOB_API_VERSION: &str = "2021-08-06";

type HmacSha256 = Hmac<Sha256>;

/// Builds [`BlobServiceClient`]s from storage account keys
#[derive(Debug, Clone)]
pub struct SharedKeyConnector {
    http: reqwest::Client,
    blob_suffix: String,
}

impl SharedKeyConnector {
    pub fn new(http: reqwest::Client, endpoints: &AzureEndpoints) -> Self {
        Self {
            http,
            blob_suffix: endpoints.blob_suffix.clone(),
        }
    }
}

impl StorageConnector for SharedKeyConnector {
    type Store = BlobServiceClient;

    fn connect(&self, account: &str, key: &StorageKey) -> Result<BlobServiceClient, ProviderError> {
        BlobServiceClient::new(self.http.clone(), account, &key.value, &self.blob_suffix)
    }
}

/// Blob service handle for one storage account
pub struct BlobServiceClient {
    http: reqwest::Client,
    account: String,
    key: Vec<u8>,
    endpoint: Url,
}

impl BlobServiceClient {
    /// Fails if the key is not valid base64 or the account does not form a
    /// valid endpoint host.
    pub fn new(
        http: reqwest::Client,
        account: &str,
        key: &str,
        blob_suffix: &str,
    ) -> Result<Self, ProviderError> {
        let key = STANDARD
            .decode(key.trim())
            .map_err(|e| ProviderError::InvalidStorageKey {
                account: account.to_string(),
                reason: e.to_string(),
            })?;
        if key.is_empty() {
            return Err(ProviderError::InvalidStorageKey {
                account: account.to_string(),
                reason: "key is empty".to_string(),
            });
        }

        if account.is_empty() || !account.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return Err(ProviderError::Decode(format!("invalid storage account name '{}'", account)));
        }
        let endpoint = Url::parse(&format!("https://{}.{}/", account, blob_suffix))
            .map_err(|e| ProviderError::Decode(format!("invalid blob endpoint for '{}': {}", account, e)))?;

        Ok(Self {
            http,
            account: account.to_string(),
            key,
            endpoint,
        })
    }

    pub fn blob_url(&self, container: &str, blob: &str) -> Result<Url, ProviderError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Decode("blob endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .push(container)
            .push(blob);
        Ok(url)
    }

    fn sign(&self, string_to_sign: &str) -> Result<String, ProviderError> {
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|e| ProviderError::InvalidStorageKey {
            account: self.account.clone(),
            reason: e.to_string(),
        })?;
        mac.update(string_to_sign.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

impl BlobStore for BlobServiceClient {
    async fn delete_blob_if_exists(&self, container: &str, blob: &str) -> Result<bool, ProviderError> {
        let url = self.blob_url(container, blob)?;
        let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let request_id = Uuid::new_v4().to_string();
        let headers = [
            ("x-ms-client-request-id", request_id.as_str()),
            ("x-ms-date", date.as_str()),
            ("x-ms-version", BLOB_API_VERSION),
        ];

        let signature = self.sign(&string_to_sign("DELETE", &headers, &self.account, &url))?;

        let mut request = self
            .http
            .request(Method::DELETE, url)
            .header("Authorization", format!("SharedKey {}:{}", self.account, signature));
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status == StatusCode::NOT_FOUND {
            debug!(container, blob, "Blob not found");
            return Ok(false);
        }

        let code = response
            .headers()
            .get("x-ms-error-code")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let message = response.text().await.unwrap_or_default();
        Err(ProviderError::Status {
            status: status.as_u16(),
            code,
            message: if message.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                message
            },
        })
    }
}

/// Canonical string signed for SharedKey authorization.
///
/// Requests sent here never carry a body or standard conditional headers, so
/// those eleven fields are empty.
pub fn string_to_sign(verb: &str, ms_headers: &[(&str, &str)], account: &str, url: &Url) -> String {
    let mut out = String::new();
    out.push_str(verb);
    out.push('\n');
    out.push_str(&"\n".repeat(11));

    let mut headers: Vec<(String, &str)> = ms_headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim()))
        .filter(|(name, _)| name.starts_with("x-ms-"))
        .collect();
    headers.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, value) in headers {
        out.push_str(&name);
        out.push(':');
        out.push_str(value);
        out.push('\n');
    }

    out.push('/');
    out.push_str(account);
    out.push_str(url.path());

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.into_owned()))
        .collect();
    params.sort();
    for (name, value) in params {
        out.push('\n');
        out.push_str(&name);
        out.push(':');
        out.push_str(&value);
    }

    out
}
