use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{BucketError, Result};

mod env;

use env::{read_env_f64, read_env_u8, read_env_usize, read_non_empty_env};

const ENV_GRID_RESOLUTION: &str = "GEOBUCKET_GRID_RESOLUTION";
const ENV_STOPLIST: &str = "GEOBUCKET_STOPLIST";
const ENV_EDIT_SIMILARITY_THRESHOLD: &str = "GEOBUCKET_EDIT_SIMILARITY_THRESHOLD";
const ENV_TRIGRAM_THRESHOLD: &str = "GEOBUCKET_TRIGRAM_THRESHOLD";
const ENV_MIN_RESULTS_BEFORE_EXPAND: &str = "GEOBUCKET_MIN_RESULTS_BEFORE_EXPAND";
const ENV_VARIANT_CAP: &str = "GEOBUCKET_VARIANT_CAP";

/// Resolution 9 hexagons are roughly 174 m across: small enough to separate
/// adjacent estates, large enough to absorb listing GPS jitter.
const DEFAULT_GRID_RESOLUTION: u8 = 9;
const DEFAULT_EDIT_SIMILARITY_THRESHOLD: f64 = 0.8;
const DEFAULT_TRIGRAM_THRESHOLD: f64 = 0.6;
const DEFAULT_MIN_RESULTS_BEFORE_EXPAND: usize = 5;
const DEFAULT_VARIANT_CAP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub resolution: u8,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_GRID_RESOLUTION,
        }
    }
}

/// Token tables for the name normalizer. Geographically redundant suffix
/// tokens are dropped; the replacement map folds known spelling variants.
/// Both are data, not code, so deployments can localize them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub stoplist: Vec<String>,
    pub replacements: BTreeMap<String, String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            stoplist: ["lagos", "nigeria", "ng", "lga", "state", "area"]
                .map(str::to_string)
                .to_vec(),
            replacements: [
                ("str", "street"),
                ("st", "street"),
                ("rd", "road"),
                ("ave", "avenue"),
            ]
            .into_iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub edit_similarity_threshold: f64,
    pub trigram_threshold: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            edit_similarity_threshold: DEFAULT_EDIT_SIMILARITY_THRESHOLD,
            trigram_threshold: DEFAULT_TRIGRAM_THRESHOLD,
        }
    }
}

impl MatcherConfig {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("edit_similarity_threshold", self.edit_similarity_threshold),
            ("trigram_threshold", self.trigram_threshold),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(BucketError::Validation(format!(
                    "{name} {value} outside [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// A layer's union must reach this many buckets before the ladder stops
    /// escalating.
    pub min_results_before_expand: usize,
    /// Bound on a bucket's variant set; assignments past the cap still
    /// count, the variant is silently skipped.
    pub variant_cap: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_results_before_expand: DEFAULT_MIN_RESULTS_BEFORE_EXPAND,
            variant_cap: DEFAULT_VARIANT_CAP,
        }
    }
}

impl ResolverConfig {
    fn validate(&self) -> Result<()> {
        if self.min_results_before_expand == 0 {
            return Err(BucketError::Validation(
                "min_results_before_expand must be at least 1".to_string(),
            ));
        }
        if self.variant_cap == 0 {
            return Err(BucketError::Validation(
                "variant_cap must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Process-wide immutable engine configuration, built once at startup and
/// injected; nothing in the engine reads it from hidden module state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub grid: GridConfig,
    pub normalizer: NormalizerConfig,
    pub matcher: MatcherConfig,
    pub resolver: ResolverConfig,
}

impl EngineConfig {
    /// Defaults overridden by `GEOBUCKET_*` environment variables. Invalid
    /// values fail loudly instead of silently falling back.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(resolution) = read_env_u8(ENV_GRID_RESOLUTION)? {
            config.grid.resolution = resolution;
        }
        if let Some(raw) = read_non_empty_env(ENV_STOPLIST) {
            config.normalizer.stoplist = raw
                .split(',')
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty())
                .collect();
        }
        if let Some(value) = read_env_f64(ENV_EDIT_SIMILARITY_THRESHOLD)? {
            config.matcher.edit_similarity_threshold = value;
        }
        if let Some(value) = read_env_f64(ENV_TRIGRAM_THRESHOLD)? {
            config.matcher.trigram_threshold = value;
        }
        if let Some(value) = read_env_usize(ENV_MIN_RESULTS_BEFORE_EXPAND)? {
            config.resolver.min_results_before_expand = value;
        }
        if let Some(value) = read_env_usize(ENV_VARIANT_CAP)? {
            config.resolver.variant_cap = value;
        }
        config.validate()?;
        Ok(config)
    }

    /// Partial TOML document over the defaults; the usual home for site
    /// stoplist and replacement tables.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|err| BucketError::Validation(format!("engine config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.matcher.validate()?;
        self.resolver.validate()?;
        Ok(())
    }
}
