use std::collections::{BTreeMap, BTreeSet};

use crate::config::NormalizerConfig;
use crate::error::{BucketError, Result};

/// Deterministic name-to-canonical-form transform shared by the assignment
/// and resolve paths: lowercase, strip punctuation into token boundaries,
/// drop stoplisted tokens, apply the table-driven replacement map.
///
/// The tables are validated at construction so the pipeline stays
/// idempotent: `normalize(normalize(x)) == normalize(x)`.
#[derive(Debug, Clone)]
pub struct NameNormalizer {
    stoplist: BTreeSet<String>,
    replacements: BTreeMap<String, String>,
}

impl NameNormalizer {
    pub fn new(config: &NormalizerConfig) -> Result<Self> {
        let stoplist: BTreeSet<String> = config.stoplist.iter().cloned().collect();
        for token in &stoplist {
            validate_token("stoplist", token)?;
        }
        for (from, to) in &config.replacements {
            validate_token("replacement key", from)?;
            validate_token("replacement value", to)?;
            if config.replacements.contains_key(to) {
                return Err(BucketError::Validation(format!(
                    "replacement {from} -> {to}: value is itself a replacement key"
                )));
            }
            if stoplist.contains(to) {
                return Err(BucketError::Validation(format!(
                    "replacement {from} -> {to}: value is stoplisted"
                )));
            }
        }
        Ok(Self {
            stoplist,
            replacements: config.replacements.clone(),
        })
    }

    /// Empty output means the input was empty or entirely stripped; callers
    /// on the assignment path must treat that as an unresolvable name.
    #[must_use]
    pub fn normalize(&self, raw: &str) -> String {
        let lowered = raw.to_ascii_lowercase();
        let tokens = lowered
            .split(|c: char| !c.is_ascii_lowercase() && !c.is_ascii_digit())
            .filter(|token| !token.is_empty())
            .filter(|token| !self.stoplist.contains(*token))
            .map(|token| {
                self.replacements
                    .get(token)
                    .map_or(token, String::as_str)
            })
            .collect::<Vec<_>>();
        tokens.join(" ")
    }
}

fn validate_token(what: &str, token: &str) -> Result<()> {
    let well_formed = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if well_formed {
        Ok(())
    } else {
        Err(BucketError::Validation(format!(
            "{what} {token:?}: must be a single lowercase alphanumeric token"
        )))
    }
}
