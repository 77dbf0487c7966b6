//! Scripted collaborators for unit tests
//!
//! Every fake appends to a shared [`CallLog`] so tests can assert on the
//! order in which the core touched the provider.

use std::sync::{Arc, Mutex};

use vmreaper_models::InstanceRecord;

use crate::provider::{
    BlobStore, ControlPlane, ListScope, Page, ProviderError, StorageConnector, StorageKey,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetInstance { group: String, name: String },
    ListInstances { scope: ListScope, cursor: Option<String> },
    DeleteInstance { group: String, name: String },
    ListKeys { group: String, account: String },
    Connect { account: String },
    DeleteBlob { container: String, blob: String },
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls().iter().position(pred)
    }
}

pub fn provider_failure(status: u16) -> ProviderError {
    ProviderError::Status {
        status,
        code: Some("Scripted".to_string()),
        message: format!("scripted failure {}", status),
    }
}

pub fn instance(name: &str, group: &str) -> InstanceRecord {
    InstanceRecord {
        id: format!(
            "/subscriptions/sub/resourceGroups/{}/providers/Microsoft.Compute/virtualMachines/{}",
            group, name
        ),
        name: name.to_string(),
        resource_group: group.to_string(),
        disk_uri: Some(format!("https://acct1.blob.core.windows.net/vhds/{}.vhd", name)),
    }
}

// ============================================================================
// Control plane
// ============================================================================

#[derive(Debug, Default)]
pub struct FakeControlPlane {
    pub log: CallLog,
    /// Returned by `get_instance`; `None` answers 404
    pub instance: Option<InstanceRecord>,
    /// Page `i` is served for cursor `page-{i}` (page 0 for no cursor)
    pub pages: Vec<Page<InstanceRecord>>,
    pub fail_page: Option<usize>,
    pub keys: Vec<StorageKey>,
    pub fail_keys: bool,
    /// Status returned by `delete_instance`, if it should fail
    pub delete_status: Option<u16>,
    /// Accept the delete, then fail while waiting for it to finish
    pub delete_unconfirmed: bool,
}

impl FakeControlPlane {
    pub fn with_instance(log: &CallLog, instance: InstanceRecord) -> Self {
        Self {
            log: log.clone(),
            instance: Some(instance),
            keys: vec![StorageKey {
                name: "key1".to_string(),
                value: "a2V5".to_string(),
            }],
            ..Default::default()
        }
    }

    pub fn with_pages(log: &CallLog, pages: Vec<Page<InstanceRecord>>) -> Self {
        Self {
            log: log.clone(),
            pages,
            ..Default::default()
        }
    }
}

impl ControlPlane for FakeControlPlane {
    async fn get_instance(&self, group: &str, name: &str) -> Result<InstanceRecord, ProviderError> {
        self.log.push(Call::GetInstance {
            group: group.to_string(),
            name: name.to_string(),
        });
        self.instance.clone().ok_or_else(|| provider_failure(404))
    }

    async fn list_instances(
        &self,
        scope: &ListScope,
        cursor: Option<&str>,
    ) -> Result<Page<InstanceRecord>, ProviderError> {
        self.log.push(Call::ListInstances {
            scope: scope.clone(),
            cursor: cursor.map(str::to_string),
        });
        let index = match cursor {
            None => 0,
            Some(c) => c
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| ProviderError::Decode(format!("unknown cursor {}", c)))?,
        };
        if self.fail_page == Some(index) {
            return Err(provider_failure(503));
        }
        self.pages
            .get(index)
            .cloned()
            .ok_or_else(|| ProviderError::Decode(format!("no page {}", index)))
    }

    async fn delete_instance(&self, group: &str, name: &str) -> Result<(), ProviderError> {
        self.log.push(Call::DeleteInstance {
            group: group.to_string(),
            name: name.to_string(),
        });
        if self.delete_unconfirmed {
            return Err(ProviderError::Unconfirmed {
                source: Box::new(provider_failure(503)),
            });
        }
        match self.delete_status {
            Some(status) => Err(provider_failure(status)),
            None => Ok(()),
        }
    }

    async fn list_storage_account_keys(
        &self,
        group: &str,
        account: &str,
    ) -> Result<Vec<StorageKey>, ProviderError> {
        self.log.push(Call::ListKeys {
            group: group.to_string(),
            account: account.to_string(),
        });
        if self.fail_keys {
            return Err(provider_failure(403));
        }
        Ok(self.keys.clone())
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlobBehavior {
    #[default]
    Deleted,
    Absent,
    Fail,
}

#[derive(Debug, Default)]
pub struct FakeConnector {
    pub log: CallLog,
    pub fail_connect: bool,
    pub blob: BlobBehavior,
}

impl FakeConnector {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            ..Default::default()
        }
    }
}

pub struct FakeBlobStore {
    log: CallLog,
    behavior: BlobBehavior,
}

impl StorageConnector for FakeConnector {
    type Store = FakeBlobStore;

    fn connect(&self, account: &str, _key: &StorageKey) -> Result<FakeBlobStore, ProviderError> {
        self.log.push(Call::Connect {
            account: account.to_string(),
        });
        if self.fail_connect {
            return Err(ProviderError::InvalidStorageKey {
                account: account.to_string(),
                reason: "scripted".to_string(),
            });
        }
        Ok(FakeBlobStore {
            log: self.log.clone(),
            behavior: self.blob,
        })
    }
}

impl BlobStore for FakeBlobStore {
    async fn delete_blob_if_exists(&self, container: &str, blob: &str) -> Result<bool, ProviderError> {
        self.log.push(Call::DeleteBlob {
            container: container.to_string(),
            blob: blob.to_string(),
        });
        match self.behavior {
            BlobBehavior::Deleted => Ok(true),
            BlobBehavior::Absent => Ok(false),
            BlobBehavior::Fail => Err(provider_failure(500)),
        }
    }
}
