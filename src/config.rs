//! Analysis settings: policy thresholds, signature mode and holiday source.
//!
//! Settings come from an optional JSON file, then environment variables,
//! then CLI flags, each layer overriding the previous one. Every field has a
//! default so a partial file is fine:
//!
//! ```json
//! {
//!   "policy": "coarse",
//!   "coarse": { "mostly_stable_pct": 92.5 },
//!   "signature_mode": { "mode": "with_volume", "granularity": 5 }
//! }
//! ```

use crate::analyzers::aggregate::RecommendationBands;
use crate::analyzers::grade::{ClassificationPolicy, CoarsePolicy, RigorousPolicy, TypicalWeekPolicy};
use crate::analyzers::types::{PolicyKind, SignatureMode};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_HOLIDAYS_URL: &str = "https://www.gov.uk/bank-holidays/scotland.ics";

pub const ENV_POLICY: &str = "STABILITY_POLICY";
pub const ENV_VOLUME_BUCKET: &str = "STABILITY_VOLUME_BUCKET";
pub const ENV_SYSTEMIC_ROUTES: &str = "STABILITY_SYSTEMIC_ROUTES";
pub const ENV_HOLIDAYS_URL: &str = "HOLIDAYS_URL";
pub const ENV_HOLIDAYS_TIMEOUT: &str = "HOLIDAYS_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub policy: PolicyKind,
    pub rigorous: RigorousPolicy,
    pub coarse: CoarsePolicy,
    pub typical_week: TypicalWeekPolicy,
    pub signature_mode: SignatureMode,
    /// A week flagged exceptional by at least this many routes is excluded
    /// in the second pass.
    pub systemic_route_threshold: usize,
    pub recommendation: RecommendationBands,
    pub holidays_url: String,
    pub holidays_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            rigorous: RigorousPolicy::default(),
            coarse: CoarsePolicy::default(),
            typical_week: TypicalWeekPolicy::default(),
            signature_mode: SignatureMode::default(),
            systemic_route_threshold: 10,
            recommendation: RecommendationBands::default(),
            holidays_url: DEFAULT_HOLIDAYS_URL.to_string(),
            holidays_timeout_secs: 10,
        }
    }
}

impl AnalysisConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Loads `path` if given, otherwise the defaults, then applies the
    /// process environment.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overrides fields from variables found by `lookup`.
    ///
    /// A volume bucket of 0 switches volume bucketing off.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_POLICY) {
            self.policy = raw.parse()?;
        }
        if let Some(raw) = lookup(ENV_VOLUME_BUCKET) {
            let granularity: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_VOLUME_BUCKET}='{raw}' is not a number"))?;
            self.signature_mode = if granularity == 0 {
                SignatureMode::ServicePattern
            } else {
                SignatureMode::WithVolume { granularity }
            };
        }
        if let Some(raw) = lookup(ENV_SYSTEMIC_ROUTES) {
            self.systemic_route_threshold = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_SYSTEMIC_ROUTES}='{raw}' is not a number"))?;
        }
        if let Some(raw) = lookup(ENV_HOLIDAYS_URL) {
            self.holidays_url = raw;
        }
        if let Some(raw) = lookup(ENV_HOLIDAYS_TIMEOUT) {
            self.holidays_timeout_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_HOLIDAYS_TIMEOUT}='{raw}' is not a number"))?;
        }
        Ok(())
    }

    /// The decision table selected by `policy`, with its configured thresholds.
    pub fn classification_policy(&self) -> ClassificationPolicy {
        match self.policy {
            PolicyKind::Rigorous => ClassificationPolicy::Rigorous(self.rigorous),
            PolicyKind::Coarse => ClassificationPolicy::Coarse(self.coarse),
            PolicyKind::TypicalWeek => ClassificationPolicy::TypicalWeek(self.typical_week),
        }
    }

    pub fn holidays_timeout(&self) -> Duration {
        Duration::from_secs(self.holidays_timeout_secs)
    }
}
