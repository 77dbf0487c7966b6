//! Azure bindings for the collaborator traits
//!
//! - [`auth`] - service principal token from an `azure_identity` client-secret credential
//! - [`arm`] - compute and storage management through Azure Resource Manager
//! - [`blob`] - blob deletion signed with the storage account SharedKey

pub mod arm;
pub mod auth;
pub mod blob;
mod wire;

pub use arm::AzureClient;
pub use blob::{BlobServiceClient, SharedKeyConnector};

use reqwest::Response;
use vmreaper_models::Credentials;

use crate::error::ReaperError;
use crate::provider::ProviderError;
use wire::ArmErrorResponse;

/// Endpoints for one Azure cloud
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureEndpoints {
    /// AAD authority, e.g. `https://login.microsoftonline.com`
    pub authority: String,
    /// ARM endpoint, e.g. `https://management.azure.com`
    pub resource_manager: String,
    /// DNS suffix appended to the account name for blob storage
    pub blob_suffix: String,
}

impl Default for AzureEndpoints {
    fn default() -> Self {
        Self {
            authority: "https://login.microsoftonline.com".to_string(),
            resource_manager: "https://management.azure.com".to_string(),
            blob_suffix: "blob.core.windows.net".to_string(),
        }
    }
}

/// Shared HTTP client for every Azure call in one invocation
pub fn http_client() -> Result<reqwest::Client, ProviderError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("vmreaper/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Authenticate and build both the control-plane client and the storage
/// connector.
pub async fn connect(
    credentials: &Credentials,
    endpoints: AzureEndpoints,
) -> Result<(AzureClient, SharedKeyConnector), ReaperError> {
    let http = http_client().map_err(ReaperError::Auth)?;
    let storage = SharedKeyConnector::new(http.clone(), &endpoints);
    let control = AzureClient::connect(http, credentials, endpoints).await?;
    Ok((control, storage))
}

/// Turn a non-success ARM response into a [`ProviderError::Status`]
pub(crate) async fn check_arm_response(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ArmErrorResponse>(&body) {
        Ok(parsed) => (
            parsed.error.code,
            parsed.error.message.unwrap_or_else(|| body.clone()),
        ),
        Err(_) if body.trim().is_empty() => (
            None,
            status.canonical_reason().unwrap_or("unknown error").to_string(),
        ),
        Err(_) => (None, body),
    };

    Err(ProviderError::Status {
        status: status.as_u16(),
        code,
        message,
    })
}
