//! vmreaper orchestrations - target selection and VM teardown
//!
//! This crate holds the destructive core: listing VMs across pages, picking
//! one at random, and destroying a VM together with its backing disk blob in
//! an order that never deletes the VM before its storage is reachable.
//!
//! # Usage
//!
//! ```rust,no_run
//! use vmreaper_orchestrations::azure::{self, AzureEndpoints};
//! use vmreaper_orchestrations::{ResourceDirectory, TargetSelector, TeardownOrchestrator};
//! use vmreaper_orchestrations::selector::selection_rng;
//!
//! # async fn example(creds: vmreaper_models::Credentials) -> Result<(), vmreaper_orchestrations::ReaperError> {
//! let (control, storage) = azure::connect(&creds, AzureEndpoints::default()).await?;
//!
//! let population = ResourceDirectory::new(&control).list_all().await?;
//! let target = TargetSelector::new("^web-", None)?.select(population, &mut selection_rng(None))?;
//!
//! let outcome = TeardownOrchestrator::new(&control, &storage)
//!     .run(&target.resource_group, &target.name)
//!     .await;
//! println!("{}", outcome.is_complete());
//! # Ok(())
//! # }
//! ```

pub mod azure;
pub mod directory;
pub mod error;
pub mod provider;
pub mod selector;
pub mod teardown;

#[cfg(test)]
mod testing;

pub use directory::ResourceDirectory;
pub use error::ReaperError;
pub use provider::{BlobStore, ControlPlane, ListScope, Page, ProviderError, StorageConnector, StorageKey};
pub use selector::TargetSelector;
pub use teardown::{TeardownOrchestrator, TeardownOutcome, TeardownSummary};
