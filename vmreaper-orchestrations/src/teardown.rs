//! Destroy a VM and its backing disk blob
//!
//! Stages run strictly in order:
//!
//! 1. resolve the instance
//! 2. locate the disk blob from its VHD URI
//! 3. fetch storage keys and build a blob handle
//! 4. delete the instance
//! 5. delete the blob
//!
//! The instance is never deleted before stage 3 has succeeded. A failure in
//! stages 1-3, or a delete the provider refuses outright, aborts with nothing
//! left half done. A delete that was accepted but never confirmed, or a
//! failure in stage 5, may leave an orphaned blob and is reported as a
//! partial teardown.

use serde::Serialize;
use tracing::{info, warn};
use vmreaper_models::{DiskLocator, InstanceRecord, TeardownStage};

use crate::error::ReaperError;
use crate::provider::{BlobStore, ControlPlane, ProviderError, StorageConnector};

/// Terminal result of one teardown run
#[derive(Debug)]
pub enum TeardownOutcome {
    /// Instance and blob are both gone
    Complete {
        instance: InstanceRecord,
        disk: DiskLocator,
        /// False when the blob was already absent
        blob_existed: bool,
    },
    /// Instance deletion went through, or was accepted, but its disk blob may
    /// be orphaned
    PartialTeardown {
        instance: InstanceRecord,
        disk: DiskLocator,
        error: ReaperError,
    },
    /// Stopped before anything irreversible happened
    Aborted {
        stage: TeardownStage,
        error: ReaperError,
    },
}

impl TeardownOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, TeardownOutcome::Complete { .. })
    }

    pub fn summary(&self, group: &str, name: &str) -> TeardownSummary {
        match self {
            TeardownOutcome::Complete { disk, .. } => TeardownSummary {
                status: "complete",
                resource_group: group.to_string(),
                instance: name.to_string(),
                blob: Some(disk.to_string()),
                stage: None,
                reason: None,
            },
            TeardownOutcome::PartialTeardown { disk, error, .. } => TeardownSummary {
                status: "partial",
                resource_group: group.to_string(),
                instance: name.to_string(),
                blob: Some(disk.to_string()),
                stage: Some(error.stage().unwrap_or(TeardownStage::DeleteBlob)),
                reason: Some(error.to_string()),
            },
            TeardownOutcome::Aborted { stage, error } => TeardownSummary {
                status: "aborted",
                resource_group: group.to_string(),
                instance: name.to_string(),
                blob: None,
                stage: Some(*stage),
                reason: Some(error.to_string()),
            },
        }
    }
}

/// Flat, serializable view of an outcome for rendering
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TeardownSummary {
    pub status: &'static str,
    pub resource_group: String,
    pub instance: String,
    pub blob: Option<String>,
    pub stage: Option<TeardownStage>,
    pub reason: Option<String>,
}

/// Drives the ordered destroy protocol against a control plane and storage
pub struct TeardownOrchestrator<'a, C, S> {
    control: &'a C,
    storage: &'a S,
}

impl<'a, C, S> TeardownOrchestrator<'a, C, S>
where
    C: ControlPlane,
    S: StorageConnector,
{
    pub fn new(control: &'a C, storage: &'a S) -> Self {
        Self { control, storage }
    }

    /// Destroy `name` in `group` and its disk blob
    pub async fn run(&self, group: &str, name: &str) -> TeardownOutcome {
        info!(resource_group = %group, instance = %name, "Destroying virtual machine");

        // Step 1: Resolve
        let instance = match self.control.get_instance(group, name).await {
            Ok(instance) => instance,
            Err(source) => {
                return abort(ReaperError::Resolution {
                    group: group.to_string(),
                    name: name.to_string(),
                    source,
                })
            }
        };

        // Step 2: Locate disk
        let disk = match instance.disk_locator() {
            Ok(disk) => disk,
            Err(e) => return abort(ReaperError::LocatorParse(e)),
        };
        info!(
            storage_account = %disk.storage_account,
            container = %disk.container,
            blob = %disk.blob_name,
            "Located disk blob"
        );

        // Step 3: Verify storage access before anything is deleted
        let store = match self.verify_storage(group, &disk).await {
            Ok(store) => store,
            Err(source) => {
                return abort(ReaperError::StorageAccess {
                    account: disk.storage_account.clone(),
                    source,
                })
            }
        };
        info!(storage_account = %disk.storage_account, "Storage access verified");

        // Step 4: Delete the instance
        match self.control.delete_instance(group, name).await {
            Ok(()) => info!(instance = %name, "Virtual machine deleted"),
            Err(e) if e.is_not_found() => {
                warn!(instance = %name, "Virtual machine already gone, continuing with blob");
            }
            // The blob stays leased until the VM is gone, so it is left alone
            Err(source) if source.was_accepted() => {
                let error = ReaperError::DeletionUnconfirmed {
                    name: name.to_string(),
                    source,
                };
                warn!(error = %error, blob = %disk, "VM deletion unconfirmed, disk blob left in place");
                return TeardownOutcome::PartialTeardown {
                    instance,
                    disk,
                    error,
                };
            }
            Err(source) => {
                return abort(ReaperError::InstanceDeletion {
                    name: name.to_string(),
                    source,
                })
            }
        }

        // Step 5: Delete the blob
        info!(blob = %disk.blob_name, container = %disk.container, "Removing associated blob");
        match store.delete_blob_if_exists(&disk.container, &disk.blob_name).await {
            Ok(existed) => {
                if existed {
                    info!(blob = %disk.blob_name, "Blob deleted");
                } else {
                    warn!(blob = %disk.blob_name, "Blob did not exist");
                }
                TeardownOutcome::Complete {
                    instance,
                    disk,
                    blob_existed: existed,
                }
            }
            Err(source) => {
                let error = ReaperError::BlobDeletion {
                    container: disk.container.clone(),
                    blob: disk.blob_name.clone(),
                    source,
                };
                warn!(error = %error, blob = %disk, "VM deleted but disk blob may be orphaned");
                TeardownOutcome::PartialTeardown {
                    instance,
                    disk,
                    error,
                }
            }
        }
    }

    async fn verify_storage(&self, group: &str, disk: &DiskLocator) -> Result<S::Store, ProviderError> {
        let keys = self
            .control
            .list_storage_account_keys(group, &disk.storage_account)
            .await?;
        let key = keys
            .iter()
            .find(|k| !k.value.is_empty())
            .ok_or_else(|| ProviderError::NoStorageKeys {
                account: disk.storage_account.clone(),
            })?;
        self.storage.connect(&disk.storage_account, key)
    }
}

fn abort(error: ReaperError) -> TeardownOutcome {
    let stage = error.stage().unwrap_or(TeardownStage::Resolve);
    warn!(%stage, error = %error, "Teardown aborted");
    TeardownOutcome::Aborted { stage, error }
}
