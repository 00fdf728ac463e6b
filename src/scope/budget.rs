//! Tiered reference budget.
//!
//! A four-slot vector indexed by [`Tier`]. As supply, a slot counts how many
//! references may be drawn at that tier; as demand, how many references need
//! that tier as their minimal scope. Scopes nest, so supply at a wide tier also
//! covers demand at any narrower tier: an allocation that runs out at its own
//! tier borrows from the next wider one. Dominance and merge work on suffix
//! sums taken from the widest tier down.

use std::fmt;
use std::ops::Add;

use serde::Serialize;

use super::Tier;
use crate::errors::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct TieredBudget {
    counts: [u32; 4],
}

impl From<[u32; 4]> for TieredBudget {
    fn from(counts: [u32; 4]) -> Self {
        TieredBudget { counts }
    }
}

impl TieredBudget {
    pub fn zero() -> Self {
        Self::default()
    }

    /// A budget with `n` at `tier` and nothing elsewhere.
    pub fn single(tier: Tier, n: u32) -> Self {
        let mut budget = Self::zero();
        budget.counts[tier.index()] = n;
        budget
    }

    pub fn count(&self, tier: Tier) -> u32 {
        self.counts[tier.index()]
    }

    pub fn counts(&self) -> [u32; 4] {
        self.counts
    }

    pub fn add(&mut self, tier: Tier, n: u32) {
        self.counts[tier.index()] = self.counts[tier.index()].saturating_add(n);
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| u64::from(*c)).sum()
    }

    /// Sum of the slots at `tier` and every wider tier.
    fn suffix(&self, tier: Tier) -> u64 {
        self.counts[tier.index()..].iter().map(|c| u64::from(*c)).sum()
    }

    /// True if this supply can serve `demand` when wider slots may cover narrower needs.
    pub fn greater_eq(&self, demand: &TieredBudget) -> bool {
        Tier::ALL.iter().all(|t| self.suffix(*t) >= demand.suffix(*t))
    }

    /// Least budget dominating both operands.
    pub fn merge(&self, other: &TieredBudget) -> TieredBudget {
        let mut counts = [0u32; 4];
        let mut wider = 0u64;
        for tier in Tier::ALL.iter().rev() {
            let here = self.suffix(*tier).max(other.suffix(*tier));
            counts[tier.index()] = u32::try_from(here - wider).unwrap_or(u32::MAX);
            wider = here;
        }
        TieredBudget { counts }
    }

    /// Draws `demand` from this supply and returns what is left.
    ///
    /// Demand unmet at its own tier is carried to the next wider tier. Demand still
    /// unmet past [`Tier::Binding`] is a contract violation.
    pub fn allocate(&self, demand: &TieredBudget) -> Result<TieredBudget, EngineError> {
        let mut left = self.counts;
        let mut carry = 0u64;
        for tier in Tier::ALL {
            let need = carry + u64::from(demand.count(tier));
            let available = u64::from(left[tier.index()]);
            let take = need.min(available);
            // take <= available, which came from a u32
            left[tier.index()] = (available - take) as u32;
            carry = need - take;
        }
        if carry > 0 {
            return Err(EngineError::BudgetUnderflow { tier: Tier::Binding });
        }
        Ok(TieredBudget { counts: left })
    }
}

impl Add for TieredBudget {
    type Output = TieredBudget;

    fn add(self, other: TieredBudget) -> TieredBudget {
        let mut counts = self.counts;
        for (slot, extra) in counts.iter_mut().zip(other.counts) {
            *slot = slot.saturating_add(extra);
        }
        TieredBudget { counts }
    }
}

impl fmt::Display for TieredBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [before, function, file, binding] = self.counts;
        write!(f, "({}, {}, {}, {})", before, function, file, binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen, QuickCheck, TestResult};

    impl Arbitrary for TieredBudget {
        fn arbitrary(g: &mut Gen) -> Self {
            let mut slot = || u32::arbitrary(g) % 16;
            TieredBudget::from([slot(), slot(), slot(), slot()])
        }
    }

    #[test]
    fn test_greater_eq_reflexive() {
        fn prop(a: TieredBudget) -> TestResult {
            TestResult::from_bool(a.greater_eq(&a))
        }
        QuickCheck::new().tests(500).quickcheck(prop as fn(TieredBudget) -> TestResult);
    }

    #[test]
    fn test_greater_eq_transitive() {
        fn prop(a: TieredBudget, b: TieredBudget, c: TieredBudget) -> TestResult {
            if !(a.greater_eq(&b) && b.greater_eq(&c)) {
                return TestResult::discard();
            }
            TestResult::from_bool(a.greater_eq(&c))
        }
        QuickCheck::new()
            .tests(500)
            .max_tests(20_000)
            .quickcheck(prop as fn(TieredBudget, TieredBudget, TieredBudget) -> TestResult);
    }

    #[test]
    fn test_merge_dominates_both() {
        fn prop(a: TieredBudget, b: TieredBudget) -> TestResult {
            let m = a.merge(&b);
            TestResult::from_bool(m.greater_eq(&a) && m.greater_eq(&b) && m == b.merge(&a))
        }
        QuickCheck::new().tests(500).quickcheck(prop as fn(TieredBudget, TieredBudget) -> TestResult);
    }

    #[test]
    fn test_allocate_agrees_with_greater_eq() {
        fn prop(supply: TieredBudget, demand: TieredBudget) -> TestResult {
            TestResult::from_bool(supply.allocate(&demand).is_ok() == supply.greater_eq(&demand))
        }
        QuickCheck::new().tests(500).quickcheck(prop as fn(TieredBudget, TieredBudget) -> TestResult);
    }

    #[test]
    fn test_wider_supply_covers_narrower_demand() {
        let supply = TieredBudget::single(Tier::File, 3);
        let demand = TieredBudget::from([1, 1, 0, 0]);
        assert!(supply.greater_eq(&demand));
        assert_eq!(supply.allocate(&demand), Ok(TieredBudget::single(Tier::File, 1)));
    }

    #[test]
    fn test_narrower_supply_never_covers_wider_demand() {
        let supply = TieredBudget::single(Tier::Before, 10);
        let demand = TieredBudget::single(Tier::Binding, 1);
        assert!(!supply.greater_eq(&demand));
        assert_eq!(
            supply.allocate(&demand),
            Err(EngineError::BudgetUnderflow { tier: Tier::Binding })
        );
    }

    #[test]
    fn test_merge_is_least() {
        let a = TieredBudget::from([2, 0, 0, 0]);
        let b = TieredBudget::from([0, 0, 0, 1]);
        // widest slot from b, then just enough below it to cover a's two
        assert_eq!(a.merge(&b), TieredBudget::from([1, 0, 0, 1]));
        assert_eq!(a + b, TieredBudget::from([2, 0, 0, 1]));
    }
}
