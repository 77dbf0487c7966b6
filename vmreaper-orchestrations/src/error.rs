//! Error taxonomy for target selection and teardown
//!
//! Nothing in the core retries. Each variant names the step that failed and
//! keeps the provider error underneath it as `source`.

use crate::provider::ProviderError;
use thiserror::Error;
use vmreaper_models::{CredentialsError, DiskUriError, TeardownStage};

#[derive(Debug, Error)]
pub enum ReaperError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid credentials: {0}")]
    Credentials(#[from] CredentialsError),

    #[error("unable to authenticate service principal: {0}")]
    Auth(#[source] ProviderError),

    #[error("could not list virtual machines in {scope}: {source}")]
    Retrieval {
        scope: String,
        #[source]
        source: ProviderError,
    },

    #[error("invalid name pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("no VM found matching regex '{pattern}' in {scope}")]
    NoMatch { pattern: String, scope: String },

    #[error("unable to get virtual machine {name} in group {group}: {source}")]
    Resolution {
        group: String,
        name: String,
        #[source]
        source: ProviderError,
    },

    #[error("unable to locate disk blob: {0}")]
    LocatorParse(#[from] DiskUriError),

    #[error("unable to access storage account {account}: {source}")]
    StorageAccess {
        account: String,
        #[source]
        source: ProviderError,
    },

    #[error("unable to delete VM {name}: {source}")]
    InstanceDeletion {
        name: String,
        #[source]
        source: ProviderError,
    },

    #[error("deletion of VM {name} was accepted but not confirmed: {source}")]
    DeletionUnconfirmed {
        name: String,
        #[source]
        source: ProviderError,
    },

    #[error("unable to delete blob {blob} in container {container}: {source}")]
    BlobDeletion {
        container: String,
        blob: String,
        #[source]
        source: ProviderError,
    },
}

impl ReaperError {
    /// Teardown stage this error belongs to, if it is a teardown error
    pub fn stage(&self) -> Option<TeardownStage> {
        match self {
            ReaperError::Resolution { .. } => Some(TeardownStage::Resolve),
            ReaperError::LocatorParse(_) => Some(TeardownStage::LocateDisk),
            ReaperError::StorageAccess { .. } => Some(TeardownStage::VerifyStorage),
            ReaperError::InstanceDeletion { .. } | ReaperError::DeletionUnconfirmed { .. } => {
                Some(TeardownStage::DeleteInstance)
            }
            ReaperError::BlobDeletion { .. } => Some(TeardownStage::DeleteBlob),
            _ => None,
        }
    }
}
