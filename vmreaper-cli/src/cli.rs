use clap::Parser;
use std::path::PathBuf;

/// vmreaper - destroy an Azure VM and its disk blob, optionally picked at random
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON file with the Azure service principal credentials
    /// (default: ~/.azure/credentials.json)
    #[arg(long)]
    pub credentials_file: Option<PathBuf>,

    /// Randomly select a machine to destroy
    #[arg(long)]
    pub random: bool,

    /// Regex a VM name must match during random selection
    #[arg(long, default_value = ".*")]
    pub regex: String,

    /// Resource group of the VM (restricts random selection when set)
    #[arg(long)]
    pub resource_group: Option<String>,

    /// Name of the VM to destroy
    #[arg(long)]
    pub vm_name: Option<String>,

    /// Do not prompt before destroying
    #[arg(short, long)]
    pub force: bool,

    /// Seed for random selection (default: current time)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Resolve and print the target without destroying anything
    #[arg(long)]
    pub dry_run: bool,

    /// Output format: table or json
    #[arg(short, long, default_value = "table")]
    pub output: String,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
