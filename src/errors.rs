//! Error types for the rewrite-schema engine.
//!
//! Only contract violations live here. Ordinary infeasibility (a pattern that
//! does not match, a rebuild that is malformed, a candidate that fails the
//! legality gate) is reported through `bool` / `Option` results because callers
//! try thousands of candidates and discard most of them.

use thiserror::Error;

use crate::ir::kind::KindTag;
use crate::schema::VarId;
use crate::scope::Tier;

/// Upstream precondition violations. These abort the current call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A post-only free variable reached rebuild without a binding and is not inferable.
    #[error("free variable {0} has no binding and cannot be inferred")]
    UnboundVariable(VarId),

    /// A budget allocation ran out of supply past the widest tier.
    #[error("reference budget underflow: demand at tier {tier:?} exceeds the widest supply")]
    BudgetUnderflow { tier: Tier },

    /// The schema asks to rebuild a node kind that is never a legal rewrite target.
    #[error("cannot rebuild {0:?}: the kind has no statement or expression host")]
    UnsupportedRebuild(KindTag),

    /// The rebuilt child list does not fit the kind's fixed role list.
    #[error("{kind:?} expects {expected} children, got {found}")]
    ArityMismatch {
        kind: KindTag,
        expected: usize,
        found: usize,
    },
}

/// Failure of bottom-up type re-inference on a rebuilt fragment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("type inference failed at {kind:?}: {message}")]
pub struct TypeError {
    pub kind: KindTag,
    pub message: String,
}

impl TypeError {
    pub fn new(kind: KindTag, message: impl Into<String>) -> Self {
        TypeError {
            kind,
            message: message.into(),
        }
    }
}
