//! Random target selection
//!
//! The population is shuffled with a Fisher-Yates pass and then scanned for
//! the first name matching the pattern. Every matching instance is equally
//! likely to come out, and no counting pass is needed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use tracing::{debug, info};
use vmreaper_models::InstanceRecord;

use crate::error::ReaperError;

/// Picks one instance uniformly at random among those matching a pattern
#[derive(Debug, Clone)]
pub struct TargetSelector {
    pattern: Regex,
    group: Option<String>,
}

impl TargetSelector {
    /// `pattern` is an unanchored, case-sensitive regular expression.
    /// An empty or absent `group` means every resource group.
    pub fn new(pattern: &str, group: Option<&str>) -> Result<Self, ReaperError> {
        let pattern = Regex::new(pattern).map_err(|source| ReaperError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        let group = group
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string);
        Ok(Self { pattern, group })
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Human-readable description of the scope
    pub fn scope_label(&self) -> String {
        match &self.group {
            Some(group) => format!("resource group '{}'", group),
            None => "all resource groups".to_string(),
        }
    }

    fn in_scope(&self, instance: &InstanceRecord) -> bool {
        match &self.group {
            Some(group) => instance.resource_group.eq_ignore_ascii_case(group),
            None => true,
        }
    }

    /// Choose a target from `population` using `rng`.
    pub fn select<R: Rng>(
        &self,
        mut population: Vec<InstanceRecord>,
        rng: &mut R,
    ) -> Result<InstanceRecord, ReaperError> {
        population.retain(|instance| self.in_scope(instance));
        debug!(candidates = population.len(), scope = %self.scope_label(), "Shuffling candidates");

        shuffle(&mut population, rng);

        let target = population
            .into_iter()
            .find(|instance| self.pattern.is_match(&instance.name))
            .ok_or_else(|| ReaperError::NoMatch {
                pattern: self.pattern.as_str().to_string(),
                scope: self.scope_label(),
            })?;

        info!(target = %target.name, resource_group = %target.resource_group, "Found target");
        Ok(target)
    }
}

/// In-place Fisher-Yates shuffle
pub fn shuffle<T, R: Rng>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// PRNG for one selection: fixed when a seed is given, otherwise seeded from
/// the wall clock. Not suitable for anything security related.
pub fn selection_rng(seed: Option<u64>) -> StdRng {
    let seed = seed.unwrap_or_else(|| {
        let now = chrono::Utc::now();
        now.timestamp_nanos_opt()
            .map(|n| n as u64)
            .unwrap_or_else(|| now.timestamp_micros() as u64)
    });
    debug!(seed, "Seeding target selection");
    StdRng::seed_from_u64(seed)
}
