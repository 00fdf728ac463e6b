//! Engine configuration.
//!
//! Every field has a default so a partial JSON document (or none at all) yields
//! a usable configuration.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::scope::budget::TieredBudget;

/// Tunables shared by the generalizer, the schema instance and the mining contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Generalization is rejected when the schema needs more free variables than this.
    pub max_free_vars: usize,
    /// Reject schemas whose common kind is the universal top.
    pub reject_top_kind: bool,
    /// Check each bound variable's kind inventory against `freeVarContains` after a match.
    pub check_var_contains: bool,
    /// Demand ceiling for post-only variables, narrowest tier first.
    pub search_budget: [u32; 4],
    /// Siblings added on each side of a differing collection run wider than two.
    pub max_window_widening: usize,
    /// Upper bound on diff-narrowing iterations.
    pub max_narrowing_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_free_vars: 8,
            reject_top_kind: true,
            check_var_contains: true,
            search_budget: [8, 8, 4, 2],
            max_window_widening: 1,
            max_narrowing_steps: 64,
        }
    }
}

impl EngineConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse engine configuration")
    }

    /// Loads a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine configuration {:?}", path))?;
        Self::from_json_str(&text).with_context(|| format!("Invalid configuration in {:?}", path))
    }

    /// The search budget as a tiered supply vector.
    pub fn search_budget(&self) -> TieredBudget {
        TieredBudget::from(self.search_budget)
    }
}
