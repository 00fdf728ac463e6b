//! Scope tiers, reference inventories, and the tiered reference budget.

pub mod analyzer;
pub mod budget;
pub mod inventory;

use std::fmt;

use serde::Serialize;

pub use analyzer::ScopeAnalyzer;
pub use budget::TieredBudget;
pub use inventory::RefInventory;

/// Nested resolution scopes, narrowest first: `Before ⊂ Function ⊂ File ⊂ Binding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Tier {
    /// Resolvable inside the fragment itself.
    Before,
    /// Inside the enclosing routine.
    Function,
    /// Inside the enclosing compilation unit.
    File,
    /// Anywhere in the visible binding space.
    Binding,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Before, Tier::Function, Tier::File, Tier::Binding];

    pub fn index(self) -> usize {
        self as usize
    }

    /// True if every reference resolvable at `other` is also resolvable at `self`.
    pub fn contains(self, other: Tier) -> bool {
        self >= other
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Before => "before",
            Tier::Function => "function",
            Tier::File => "file",
            Tier::Binding => "binding",
        };
        f.write_str(name)
    }
}
