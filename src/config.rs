//! Configuration surface consumed by the aggregation core.
//!
//! Embedders usually hand these over as JSON from editor settings, so both
//! structs derive serde with defaults for every field.

use anyhow::{Context as _, Result, bail};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Knobs steering matching, ranking and the per-call result budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    /// Result budget per call, and the chunk size used for persistence.
    /// Ignored when the request is manual.
    pub max_results: usize,
    /// Minimum similarity ratio a candidate must reach against its anchor.
    pub fuzzy_cutoff: f32,
    /// How many extra trailing characters a candidate key may carry and
    /// still count as matching what was typed.
    pub look_ahead: usize,
    /// Characters that join alphanumerics into one word run.
    pub unifying_chars: FxHashSet<char>,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            max_results: 33,
            fuzzy_cutoff: 0.6,
            look_ahead: 2,
            unifying_chars: ['_', '-'].into_iter().collect(),
        }
    }
}

impl MatchOptions {
    /// Parse and validate options from a JSON settings blob, as editors
    /// usually hand them over. Missing fields take their defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        let options: Self =
            serde_json::from_str(raw).context("failed to parse match options")?;
        options.validate()?;
        Ok(options)
    }

    /// Reject configurations the aggregator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_results == 0 {
            bail!("max_results must be positive");
        }
        if !(0.0..=1.0).contains(&self.fuzzy_cutoff) {
            bail!("fuzzy_cutoff must lie within [0, 1], got {}", self.fuzzy_cutoff);
        }
        Ok(())
    }
}

/// Identity of the live source issuing queries on behalf of this worker.
///
/// The short name stamps produced completions; the weight adjustment is
/// passed through to the transport so the surrounding ranker can nudge
/// this source up or down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub short_name: String,
    #[serde(default)]
    pub weight_adjust: f32,
}

impl SourceInfo {
    pub fn new(short_name: impl Into<String>, weight_adjust: f32) -> Self {
        Self {
            short_name: short_name.into(),
            weight_adjust,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let options = MatchOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.max_results, 33);
        assert!(options.unifying_chars.contains(&'_'));
        assert!(options.unifying_chars.contains(&'-'));
    }

    #[test]
    fn zero_budget_is_rejected() {
        let options = MatchOptions {
            max_results: 0,
            ..MatchOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn out_of_range_cutoff_is_rejected() {
        let options = MatchOptions {
            fuzzy_cutoff: 1.5,
            ..MatchOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let options =
            MatchOptions::from_json(r#"{"max_results": 10, "unifying_chars": ["_"]}"#).unwrap();
        assert_eq!(options.max_results, 10);
        assert_eq!(options.fuzzy_cutoff, 0.6);
        assert_eq!(options.look_ahead, 2);
        assert!(options.unifying_chars.contains(&'_'));
        assert!(!options.unifying_chars.contains(&'-'));
    }

    #[test]
    fn invalid_json_settings_are_rejected() {
        assert!(MatchOptions::from_json(r#"{"max_results": 0}"#).is_err());
        assert!(MatchOptions::from_json("not json").is_err());
    }
}
