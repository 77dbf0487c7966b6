use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use vmreaper_models::Credentials;
use vmreaper_orchestrations::azure::AzureEndpoints;
use vmreaper_orchestrations::ReaperError;

use crate::cli::Args;

/// How the VM to destroy is chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetMode {
    /// Pick at random among VMs whose name matches `pattern`
    Random {
        pattern: String,
        group: Option<String>,
    },
    /// Destroy exactly this VM
    Explicit { group: String, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Immutable settings for one invocation, built once from flags and
/// environment
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials_file: PathBuf,
    pub target: TargetMode,
    pub force: bool,
    pub seed: Option<u64>,
    pub dry_run: bool,
    pub output: OutputFormat,
    pub endpoints: AzureEndpoints,
}

impl Config {
    pub fn load(args: Args) -> Result<Self, ReaperError> {
        Self::from_args(args, |key| std::env::var(key).ok())
    }

    /// Build the configuration with `env` as the environment lookup
    pub fn from_args(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<Self, ReaperError> {
        let group = non_empty(args.resource_group);
        let name = non_empty(args.vm_name);

        let target = if args.random {
            if name.is_some() {
                return Err(ReaperError::Config(
                    "--vm-name cannot be combined with --random".to_string(),
                ));
            }
            TargetMode::Random {
                pattern: args.regex,
                group,
            }
        } else {
            let group = group.ok_or_else(|| {
                ReaperError::Config("A resource group is required if random selection is disabled.".to_string())
            })?;
            let name = name.ok_or_else(|| {
                ReaperError::Config("A virtual machine name is required if random selection is disabled.".to_string())
            })?;
            TargetMode::Explicit { group, name }
        };

        let output = match args.output.as_str() {
            "table" => OutputFormat::Table,
            "json" => OutputFormat::Json,
            other => {
                return Err(ReaperError::Config(format!(
                    "unknown output format '{}' (expected table or json)",
                    other
                )))
            }
        };

        let credentials_file = match args.credentials_file {
            Some(path) => path,
            None => match env("VMREAPER_CREDENTIALS_FILE") {
                Some(path) => PathBuf::from(path),
                None => {
                    let home = env("HOME").ok_or_else(|| {
                        ReaperError::Config("HOME is not set; pass --credentials-file".to_string())
                    })?;
                    PathBuf::from(home).join(".azure").join("credentials.json")
                }
            },
        };

        let defaults = AzureEndpoints::default();
        let endpoints = AzureEndpoints {
            authority: env("VMREAPER_AUTHORITY_HOST").unwrap_or(defaults.authority),
            resource_manager: env("VMREAPER_ARM_ENDPOINT").unwrap_or(defaults.resource_manager),
            blob_suffix: env("VMREAPER_BLOB_SUFFIX").unwrap_or(defaults.blob_suffix),
        };

        Ok(Self {
            credentials_file,
            target,
            force: args.force,
            seed: args.seed,
            dry_run: args.dry_run,
            output,
            endpoints,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Read and validate the service principal credentials file
pub fn load_credentials(path: &Path) -> Result<Credentials> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read credentials file {}", path.display()))?;
    let credentials = Credentials::from_json(&json)
        .map_err(ReaperError::from)
        .with_context(|| format!("Invalid credentials file {}", path.display()))?;
    Ok(credentials)
}
