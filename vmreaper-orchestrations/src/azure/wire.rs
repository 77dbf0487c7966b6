//! JSON shapes returned by Azure Resource Manager

use serde::Deserialize;
use vmreaper_models::{resource_group_from_id, InstanceRecord};

use crate::provider::{Page, ProviderError, StorageKey};

#[derive(Debug, Deserialize)]
pub struct ArmErrorResponse {
    pub error: ArmErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ArmErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VirtualMachine {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub properties: Option<VirtualMachineProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineProperties {
    #[serde(default)]
    pub storage_profile: Option<StorageProfile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProfile {
    #[serde(default)]
    pub os_disk: Option<OsDisk>,
}

#[derive(Debug, Deserialize)]
pub struct OsDisk {
    #[serde(default)]
    pub vhd: Option<VirtualHardDisk>,
}

#[derive(Debug, Deserialize)]
pub struct VirtualHardDisk {
    pub uri: Option<String>,
}

impl VirtualMachine {
    pub fn into_record(self) -> Result<InstanceRecord, ProviderError> {
        let resource_group = resource_group_from_id(&self.id)
            .ok_or_else(|| ProviderError::Decode(format!("no resource group in id '{}'", self.id)))?
            .to_string();
        let disk_uri = self
            .properties
            .and_then(|p| p.storage_profile)
            .and_then(|s| s.os_disk)
            .and_then(|d| d.vhd)
            .and_then(|v| v.uri);
        Ok(InstanceRecord {
            id: self.id,
            name: self.name,
            resource_group,
            disk_uri,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct VirtualMachineListResult {
    #[serde(default)]
    pub value: Vec<VirtualMachine>,
    #[serde(rename = "nextLink", default)]
    pub next_link: Option<String>,
}

impl VirtualMachineListResult {
    pub fn into_page(self) -> Result<Page<InstanceRecord>, ProviderError> {
        let items = self
            .value
            .into_iter()
            .map(VirtualMachine::into_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            next_cursor: self.next_link,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct StorageAccountKeys {
    #[serde(default)]
    pub keys: Vec<StorageAccountKey>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageAccountKey {
    pub key_name: String,
    pub value: String,
}

impl From<StorageAccountKey> for StorageKey {
    fn from(key: StorageAccountKey) -> Self {
        StorageKey {
            name: key.key_name,
            value: key.value,
        }
    }
}

/// Body of an `Azure-AsyncOperation` status poll
#[derive(Debug, Deserialize)]
pub struct AsyncOperationStatus {
    pub status: String,
    #[serde(default)]
    pub error: Option<ArmErrorBody>,
}

impl AsyncOperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "Succeeded" | "Failed" | "Canceled")
    }
}
