//! Data types shared by the vmreaper crates
//!
//! Everything here is created per invocation and discarded on exit; nothing
//! is persisted.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

// ============================================================================
// Instance Record
// ============================================================================

/// Read-only snapshot of one compute instance as returned by a listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceRecord {
    /// Full ARM resource id
    pub id: String,
    /// Virtual machine name
    pub name: String,
    /// Resource group the instance lives in
    pub resource_group: String,
    /// URI of the backing OS disk blob (absent for managed disks)
    pub disk_uri: Option<String>,
}

impl InstanceRecord {
    /// Derive the storage location of the backing disk blob
    pub fn disk_locator(&self) -> Result<DiskLocator, DiskUriError> {
        match self.disk_uri.as_deref() {
            Some(uri) => DiskLocator::parse(uri),
            None => Err(DiskUriError::Missing {
                instance: self.name.clone(),
            }),
        }
    }
}

/// Extract the resource group segment from an ARM resource id.
///
/// `/subscriptions/{sub}/resourceGroups/{group}/providers/...` yields `{group}`.
pub fn resource_group_from_id(id: &str) -> Option<&str> {
    let mut segments = id.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("resourceGroups") {
            return segments.next();
        }
    }
    None
}

// ============================================================================
// Disk Locator
// ============================================================================

/// Where a disk blob lives: `https://{storage_account}.blob.../{container}/{blob_name}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskLocator {
    pub storage_account: String,
    pub container: String,
    pub blob_name: String,
}

#[derive(Debug, Error)]
pub enum DiskUriError {
    #[error("instance '{instance}' has no VHD disk URI (managed disk?)")]
    Missing { instance: String },

    #[error("malformed disk URI '{uri}': {source}")]
    Malformed {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("disk URI '{uri}' uses unsupported scheme '{scheme}'")]
    UnsupportedScheme { uri: String, scheme: String },

    #[error("disk URI '{uri}' has no storage account host")]
    MissingHost { uri: String },

    #[error("disk URI '{uri}' has no {segment} path segment")]
    MissingSegment { uri: String, segment: &'static str },
}

impl DiskLocator {
    /// Parse a blob URI.
    ///
    /// The storage account is the first DNS label of the host, the container
    /// is the first path segment and the blob name is the second.
    pub fn parse(uri: &str) -> Result<Self, DiskUriError> {
        let parsed = Url::parse(uri).map_err(|source| DiskUriError::Malformed {
            uri: uri.to_string(),
            source,
        })?;

        if parsed.scheme() != "https" && parsed.scheme() != "http" {
            return Err(DiskUriError::UnsupportedScheme {
                uri: uri.to_string(),
                scheme: parsed.scheme().to_string(),
            });
        }

        let storage_account = parsed
            .host_str()
            .and_then(|host| host.split('.').next())
            .filter(|label| !label.is_empty())
            .ok_or_else(|| DiskUriError::MissingHost {
                uri: uri.to_string(),
            })?
            .to_string();

        let mut segments = parsed.path_segments().into_iter().flatten();
        let container = decode_segment(segments.next(), uri, "container")?;
        let blob_name = decode_segment(segments.next(), uri, "blob name")?;

        Ok(Self {
            storage_account,
            container,
            blob_name,
        })
    }
}

fn decode_segment(
    segment: Option<&str>,
    uri: &str,
    what: &'static str,
) -> Result<String, DiskUriError> {
    segment
        .filter(|s| !s.is_empty())
        .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
        .ok_or_else(|| DiskUriError::MissingSegment {
            uri: uri.to_string(),
            segment: what,
        })
}

impl fmt::Display for DiskLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.storage_account, self.container, self.blob_name)
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Service principal identity used to obtain an access token.
///
/// Field names match the `credentials.json` written by the Azure tooling.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Credentials {
    #[serde(rename = "SubscriptionID", alias = "subscriptionId", default)]
    pub subscription_id: String,
    #[serde(rename = "ClientID", alias = "clientId", default)]
    pub client_id: String,
    #[serde(rename = "ClientSecret", alias = "clientSecret", default)]
    pub client_secret: String,
    #[serde(rename = "TenantID", alias = "tenantId", default)]
    pub tenant_id: String,
}

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("credentials are not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("credentials field '{0}' is missing or empty")]
    MissingField(&'static str),
}

impl Credentials {
    /// Decode and validate credentials from a JSON document
    pub fn from_json(json: &str) -> Result<Self, CredentialsError> {
        let creds: Credentials = serde_json::from_str(json)?;
        creds.validate()?;
        Ok(creds)
    }

    /// All four fields are required
    pub fn validate(&self) -> Result<(), CredentialsError> {
        let fields = [
            ("SubscriptionID", &self.subscription_id),
            ("ClientID", &self.client_id),
            ("ClientSecret", &self.client_secret),
            ("TenantID", &self.tenant_id),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(CredentialsError::MissingField(name));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("subscription_id", &self.subscription_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

// ============================================================================
// Teardown Stage
// ============================================================================

/// Stages of the destroy protocol, in execution order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TeardownStage {
    Resolve,
    LocateDisk,
    VerifyStorage,
    DeleteInstance,
    DeleteBlob,
}

impl fmt::Display for TeardownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TeardownStage::Resolve => "resolve",
            TeardownStage::LocateDisk => "locate-disk",
            TeardownStage::VerifyStorage => "verify-storage",
            TeardownStage::DeleteInstance => "delete-instance",
            TeardownStage::DeleteBlob => "delete-blob",
        };
        f.write_str(name)
    }
}
