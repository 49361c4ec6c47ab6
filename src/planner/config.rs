//! Planner tuning knobs.

use serde::{Deserialize, Serialize};

/// Planner configuration options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Matches an in-order candidate must produce to win a race.
    pub race_batch_size: usize,
    /// A cached plan is abandoned once it scans this many times its
    /// recorded count without finishing.
    pub cached_plan_retry_factor: u64,
    /// Floor for the abandon threshold, so tiny recorded counts do not
    /// trigger a re-plan on small noise.
    pub cached_plan_min_scan: u64,
    /// Writes to a namespace after which its cached plans are dropped.
    /// Zero disables write-based invalidation.
    pub cache_write_threshold: u64,
    /// Consult and fill the plan cache.
    pub use_plan_cache: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            race_batch_size: 101,
            cached_plan_retry_factor: 10,
            cached_plan_min_scan: 100,
            cache_write_threshold: 1000,
            use_plan_cache: true,
        }
    }
}

impl PlannerConfig {
    /// Set race batch size.
    pub fn race_batch_size(mut self, value: usize) -> Self {
        self.race_batch_size = value;
        self
    }

    /// Set cached plan retry factor.
    pub fn cached_plan_retry_factor(mut self, value: u64) -> Self {
        self.cached_plan_retry_factor = value;
        self
    }

    /// Set cached plan minimum scan.
    pub fn cached_plan_min_scan(mut self, value: u64) -> Self {
        self.cached_plan_min_scan = value;
        self
    }

    /// Set cache write threshold.
    pub fn cache_write_threshold(mut self, value: u64) -> Self {
        self.cache_write_threshold = value;
        self
    }

    /// Set use_plan_cache flag.
    pub fn use_plan_cache(mut self, value: bool) -> Self {
        self.use_plan_cache = value;
        self
    }

    /// Check values are usable.
    pub fn validate(&self) -> Result<(), String> {
        if self.race_batch_size == 0 {
            return Err("race_batch_size must be at least 1".to_string());
        }
        if self.cached_plan_retry_factor == 0 {
            return Err("cached_plan_retry_factor must be at least 1".to_string());
        }
        Ok(())
    }

    /// Scan count after which a cached plan recorded at `recorded` scans is
    /// abandoned.
    pub fn abandon_threshold(&self, recorded: u64) -> u64 {
        recorded
            .saturating_mul(self.cached_plan_retry_factor)
            .max(self.cached_plan_min_scan)
    }
}
