//! Collaborator interfaces the core drives
//!
//! The Azure bindings in [`crate::azure`] implement these against the real
//! control and data planes; tests substitute scripted fakes.

use std::fmt;
use thiserror::Error;
use vmreaper_models::InstanceRecord;

// ============================================================================
// Errors
// ============================================================================

/// Failure reported by a provider collaborator
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request never produced a response
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("provider returned {status}{}: {message}", code_suffix(.code))]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Storage account returned no usable key
    #[error("storage account '{account}' returned no access keys")]
    NoStorageKeys { account: String },

    /// Storage key could not be turned into a signing key
    #[error("storage account '{account}' key is unusable: {reason}")]
    InvalidStorageKey { account: String, reason: String },

    /// Listing handed back a cursor it had already returned
    #[error("pagination cursor did not advance: {cursor}")]
    StalledCursor { cursor: String },

    /// Long-running operation finished in a non-success state
    #[error("operation ended with status '{status}'")]
    OperationFailed { status: String },

    /// Token could not be obtained from the identity provider
    #[error("identity provider: {0}")]
    Identity(#[from] azure_core::Error),

    /// Delete was accepted but its completion could not be confirmed
    #[error("delete accepted but not confirmed: {source}")]
    Unconfirmed {
        #[source]
        source: Box<ProviderError>,
    },
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" ({})", c)).unwrap_or_default()
}

impl ProviderError {
    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::Status { status: 404, .. })
    }

    /// The provider took the request, so its effects may already be underway
    pub fn was_accepted(&self) -> bool {
        matches!(self, ProviderError::Unconfirmed { .. })
    }
}

// ============================================================================
// Paging
// ============================================================================

/// One page of a listing plus the opaque cursor for the next one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` or empty when this is the last page
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }

    pub fn with_cursor(items: Vec<T>, cursor: impl Into<String>) -> Self {
        Self {
            items,
            next_cursor: Some(cursor.into()),
        }
    }

    /// Cursor for the following page, if there is one
    pub fn continuation(&self) -> Option<&str> {
        self.next_cursor.as_deref().filter(|c| !c.is_empty())
    }
}

/// What a listing covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    /// Every resource group in the subscription
    Subscription,
    /// A single resource group
    ResourceGroup(String),
}

impl fmt::Display for ListScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListScope::Subscription => f.write_str("subscription"),
            ListScope::ResourceGroup(group) => write!(f, "resource group '{}'", group),
        }
    }
}

/// Storage account access key
#[derive(Clone, PartialEq, Eq)]
pub struct StorageKey {
    pub name: String,
    pub value: String,
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageKey")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// Management-plane operations on compute instances and storage accounts
#[allow(async_fn_in_trait)]
pub trait ControlPlane: Send + Sync {
    /// Fetch one instance
    async fn get_instance(&self, group: &str, name: &str) -> Result<InstanceRecord, ProviderError>;

    /// Fetch one page of instances; `cursor` is `None` for the first page
    async fn list_instances(
        &self,
        scope: &ListScope,
        cursor: Option<&str>,
    ) -> Result<Page<InstanceRecord>, ProviderError>;

    /// Delete an instance, returning once the provider reports it gone
    async fn delete_instance(&self, group: &str, name: &str) -> Result<(), ProviderError>;

    /// List access keys for a storage account
    async fn list_storage_account_keys(
        &self,
        group: &str,
        account: &str,
    ) -> Result<Vec<StorageKey>, ProviderError>;
}

/// Builds data-plane handles from account credentials
pub trait StorageConnector: Send + Sync {
    type Store: BlobStore;

    fn connect(&self, account: &str, key: &StorageKey) -> Result<Self::Store, ProviderError>;
}

/// Blob data-plane operations
#[allow(async_fn_in_trait)]
pub trait BlobStore: Send + Sync {
    /// Delete a blob; returns whether it existed
    async fn delete_blob_if_exists(&self, container: &str, blob: &str) -> Result<bool, ProviderError>;
}
