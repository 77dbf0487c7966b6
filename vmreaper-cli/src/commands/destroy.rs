use anyhow::Result;
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::info;
use vmreaper_models::{InstanceRecord, TeardownStage};
use vmreaper_orchestrations::azure;
use vmreaper_orchestrations::selector::selection_rng;
use vmreaper_orchestrations::{
    ControlPlane, ReaperError, ResourceDirectory, TargetSelector, TeardownOrchestrator, TeardownOutcome,
    TeardownSummary,
};

use crate::config::{load_credentials, Config, OutputFormat, TargetMode};
use crate::prompt;

/// Exit status when the VM was destroyed but its blob may be orphaned
pub const EXIT_PARTIAL: u8 = 2;

enum Target {
    Named(String, String),
    Draw(TargetSelector),
}

/// Pick the target, confirm, destroy it and report the outcome
pub async fn run(config: &Config) -> Result<ExitCode> {
    // Compile the pattern before touching the network
    let target = match &config.target {
        TargetMode::Random { pattern, group } => Target::Draw(TargetSelector::new(pattern, group.as_deref())?),
        TargetMode::Explicit { group, name } => Target::Named(group.clone(), name.clone()),
    };

    let credentials = load_credentials(&config.credentials_file)?;
    let (control, storage) = azure::connect(&credentials, config.endpoints.clone()).await?;
    info!(subscription = %control.subscription_id(), "Connected to Azure");

    let (group, name, listed) = match target {
        Target::Named(group, name) => (group, name, None),
        Target::Draw(selector) => {
            let picked = pick_random(&control, &selector, config.seed).await?;
            (picked.resource_group.clone(), picked.name.clone(), Some(picked))
        }
    };

    if config.dry_run {
        let instance = match listed {
            Some(instance) => instance,
            None => resolve(&control, &group, &name).await?,
        };
        info!(resource_group = %group, instance = %name, "Dry run, nothing destroyed");
        emit(config.output, &dry_run_summary(&instance))?;
        return Ok(ExitCode::SUCCESS);
    }

    if !config.force && !confirm_destroy(&group, &name)? {
        info!(resource_group = %group, instance = %name, "Operator declined");
        emit(config.output, &pending_summary("declined", &group, &name))?;
        return Ok(ExitCode::SUCCESS);
    }

    let outcome = TeardownOrchestrator::new(&control, &storage).run(&group, &name).await;
    emit(config.output, &outcome.summary(&group, &name))?;
    Ok(ExitCode::from(exit_status(&outcome)))
}

/// List the candidate population and draw one VM from it
pub async fn pick_random<C: ControlPlane>(
    control: &C,
    selector: &TargetSelector,
    seed: Option<u64>,
) -> Result<InstanceRecord, ReaperError> {
    let directory = ResourceDirectory::new(control);
    let population = match selector.group() {
        Some(group) => directory.list_in_group(group).await?,
        None => directory.list_all().await?,
    };
    info!(candidates = population.len(), scope = %selector.scope_label(), "Listed virtual machines");

    selector.select(population, &mut selection_rng(seed))
}

/// Look up a named VM so a dry run reports only targets that exist
pub async fn resolve<C: ControlPlane>(control: &C, group: &str, name: &str) -> Result<InstanceRecord, ReaperError> {
    control
        .get_instance(group, name)
        .await
        .map_err(|source| ReaperError::Resolution {
            group: group.to_string(),
            name: name.to_string(),
            source,
        })
}

fn confirm_destroy(group: &str, name: &str) -> Result<bool> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stderr();

    writeln!(output, "⚠️  Destroy Virtual Machine")?;
    writeln!(output)?;
    writeln!(output, "  Resource group: {}", group)?;
    writeln!(output, "  VM:             {}", name)?;
    writeln!(output)?;
    writeln!(output, "This deletes the VM and its OS disk blob. It cannot be undone.")?;
    writeln!(output)?;

    let proceed = prompt::confirm(&mut input, &mut output, "Are you sure you want to destroy it?")?;
    if !proceed {
        writeln!(output)?;
        writeln!(output, "Cancelled.")?;
    }
    Ok(proceed)
}

pub fn exit_status(outcome: &TeardownOutcome) -> u8 {
    match outcome {
        TeardownOutcome::Complete { .. } => 0,
        TeardownOutcome::PartialTeardown { .. } => EXIT_PARTIAL,
        TeardownOutcome::Aborted { .. } => 1,
    }
}

fn dry_run_summary(instance: &InstanceRecord) -> TeardownSummary {
    let mut summary = pending_summary("dry-run", &instance.resource_group, &instance.name);
    match instance.disk_locator() {
        Ok(disk) => summary.blob = Some(disk.to_string()),
        Err(e) => {
            summary.stage = Some(TeardownStage::LocateDisk);
            summary.reason = Some(e.to_string());
        }
    }
    summary
}

fn pending_summary(status: &'static str, group: &str, name: &str) -> TeardownSummary {
    TeardownSummary {
        status,
        resource_group: group.to_string(),
        instance: name.to_string(),
        blob: None,
        stage: None,
        reason: None,
    }
}

fn emit(format: OutputFormat, summary: &TeardownSummary) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(summary)?),
        OutputFormat::Table => print!("{}", render_table(summary)),
    }
    Ok(())
}

/// Human-readable report of a summary
pub fn render_table(summary: &TeardownSummary) -> String {
    let mut out = String::new();
    let headline = match summary.status {
        "complete" => format!("✓ Destroyed VM {}", summary.instance),
        "partial" if summary.stage == Some(TeardownStage::DeleteInstance) => format!(
            "⚠️  Deletion of VM {} was accepted but not confirmed; its disk blob was left in place",
            summary.instance
        ),
        "partial" => format!("⚠️  VM {} destroyed but its disk blob may be orphaned", summary.instance),
        "aborted" => format!("✗ Teardown of VM {} aborted; the VM was not deleted", summary.instance),
        "dry-run" => format!("Would destroy VM {}", summary.instance),
        "declined" => format!("Left VM {} in place", summary.instance),
        other => format!("{} VM {}", other, summary.instance),
    };
    out.push_str(&headline);
    out.push_str("\n\n");
    out.push_str(&format!("  Resource group: {}\n", summary.resource_group));
    if let Some(blob) = &summary.blob {
        out.push_str(&format!("  Disk blob:      {}\n", blob));
    }
    if let Some(stage) = summary.stage {
        out.push_str(&format!("  Stage:          {}\n", stage));
    }
    if let Some(reason) = &summary.reason {
        out.push_str(&format!("  Reason:         {}\n", reason));
    }
    out
}
