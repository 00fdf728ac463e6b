//! AST Diff Narrower: shrinks two whole-file trees to their minimal differing pair.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::ir::node::{Node, deep_eq};
use crate::ir::printer::print;
use crate::ir::site::Site;

/// One aligned position in the before/after trees.
#[derive(Debug, Clone)]
pub struct DiffStep {
    pub before: Site,
    pub after: Site,
}

/// Narrows a before/after pair step by step, remembering every step so the
/// differing region can be widened again up to the enclosing routine.
#[derive(Debug)]
pub struct DiffNarrower {
    steps: Vec<DiffStep>,
    max_steps: usize,
    widening: usize,
}

impl DiffNarrower {
    pub fn new(before: Arc<Node>, after: Arc<Node>, config: &EngineConfig) -> Self {
        DiffNarrower {
            steps: vec![DiffStep {
                before: Site::root(before),
                after: Site::root(after),
            }],
            max_steps: config.max_narrowing_steps,
            widening: config.max_window_widening,
        }
    }

    /// The innermost pair found so far.
    pub fn current(&self) -> &DiffStep {
        // steps starts non-empty and only grows
        &self.steps[self.steps.len() - 1]
    }

    pub fn is_identical(&self) -> bool {
        deep_eq(self.steps[0].before.node(), self.steps[0].after.node())
    }

    /// Descends one level into the single differing child. Returns false once the
    /// pair is equal, ambiguous, or a leaf boundary is reached.
    pub fn narrow_down(&mut self) -> bool {
        if self.steps.len() > self.max_steps {
            debug!("Narrowing stopped after {} steps", self.max_steps);
            return false;
        }
        let current = self.current().clone();
        let (b, a) = (current.before.node(), current.after.node());
        if deep_eq(b, a) || current.before.window().is_some() {
            return false;
        }
        let next = match (&**b, &**a) {
            (Node::Element { kind: kb, children: cb, .. }, Node::Element { kind: ka, children: ca, .. })
                if kb == ka && cb.len() == ca.len() =>
            {
                self.narrow_element(&current, cb, ca)
            }
            (Node::Collection { .. }, Node::Collection { .. }) => self.narrow_collection(&current),
            _ => None,
        };
        match next {
            Some(step) => {
                trace!(
                    "Narrowed to {:?} / {:?}",
                    step.before.node().tag(),
                    step.after.node().tag()
                );
                self.steps.push(step);
                true
            }
            None => false,
        }
    }

    /// Narrows as far as possible; returns the number of steps taken.
    pub fn narrow_fully(&mut self) -> usize {
        let mut taken = 0;
        while self.narrow_down() {
            taken += 1;
        }
        taken
    }

    fn narrow_element(&self, current: &DiffStep, cb: &[Arc<Node>], ca: &[Arc<Node>]) -> Option<DiffStep> {
        let differing: Vec<usize> = cb
            .iter()
            .zip(ca)
            .enumerate()
            .filter(|(_, (x, y))| !deep_eq(x, y))
            .filter(|(_, (x, y))| print(x) != print(y))
            .map(|(i, _)| i)
            .collect();
        let [index] = differing.as_slice() else {
            return None;
        };
        Some(DiffStep {
            before: current.before.child(*index)?,
            after: current.after.child(*index)?,
        })
    }

    fn narrow_collection(&self, current: &DiffStep) -> Option<DiffStep> {
        let before = current.before.node().child_nodes();
        let after = current.after.node().child_nodes();
        let (lb, la) = (before.len(), after.len());
        let prefix = before.iter().zip(&after).take_while(|(x, y)| deep_eq(x, y)).count();
        let suffix = before
            .iter()
            .rev()
            .zip(after.iter().rev())
            .take(lb.min(la) - prefix)
            .take_while(|(x, y)| deep_eq(x, y))
            .count();
        let (run_b, run_a) = (lb - prefix - suffix, la - prefix - suffix);
        if run_b == 1 && run_a == 1 && before[prefix].same_shape(&after[prefix]) {
            return Some(DiffStep {
                before: current.before.child(prefix)?,
                after: current.after.child(prefix)?,
            });
        }
        let mut widen = if run_b.max(run_a) > 2 { self.widening } else { 0 };
        if run_b == 0 || run_a == 0 {
            widen = widen.max(1);
        }
        let start = prefix.saturating_sub(widen);
        let end_b = (lb - suffix + widen).min(lb);
        let end_a = (la - suffix + widen).min(la);
        if start == 0 && end_b == lb && end_a == la {
            return None;
        }
        Some(DiffStep {
            before: current.before.window_of(start, end_b - start)?,
            after: current.after.window_of(start, end_a - start)?,
        })
    }

    /// Candidate contexts from the innermost differing pair outward, ending at the
    /// enclosing routine (or the root when there is none).
    pub fn widening(&self) -> Vec<DiffStep> {
        let mut out = Vec::new();
        for step in self.steps.iter().rev() {
            out.push(step.clone());
            if step.before.node().tag().is_routine() {
                break;
            }
        }
        out
    }

    pub fn steps(&self) -> &[DiffStep] {
        &self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::build::*;
    use crate::ir::kind::KindTag;
    use crate::ir::node::{BinaryOp, Visibility};
    use crate::ir::types::JavaType;

    fn wrap(statements: Vec<Node>) -> Arc<Node> {
        Arc::new(unit(
            "p",
            vec![class(modifiers(Visibility::Public, false), "A", None, vec![method(
                modifiers(Visibility::Public, false),
                "f",
                JavaType::Void,
                vec![parameter(JavaType::array_of(JavaType::int()), "a")],
                Some(block(statements)),
            )])],
        ))
    }

    fn length() -> Node {
        field_read(
            Some(read_param("a", JavaType::array_of(JavaType::int()))),
            "int[]",
            "length",
            JavaType::int(),
        )
    }

    #[test]
    fn test_narrows_to_single_differing_expression() {
        let before = wrap(vec![local_var(JavaType::int(), "x", Some(length())), ret(None)]);
        let after = wrap(vec![
            local_var(JavaType::int(), "x", Some(binary(BinaryOp::Add, length(), int(1)))),
            ret(None),
        ]);
        let mut narrower = DiffNarrower::new(before, after, &EngineConfig::default());
        assert!(narrower.narrow_fully() > 0);
        let current = narrower.current();
        assert_eq!(current.before.node().tag(), KindTag::FieldRead);
        assert_eq!(current.after.node().tag(), KindTag::BinaryOperator);
        let widened: Vec<KindTag> = narrower.widening().iter().map(|s| s.before.node().tag()).collect();
        assert_eq!(widened.first(), Some(&KindTag::FieldRead));
        assert_eq!(widened.last(), Some(&KindTag::Method));
        assert!(widened.contains(&KindTag::LocalVariable));
    }

    #[test]
    fn test_identical_trees_do_not_narrow() {
        let before = wrap(vec![ret(None)]);
        let after = wrap(vec![ret(None)]);
        let mut narrower = DiffNarrower::new(before, after, &EngineConfig::default());
        assert!(narrower.is_identical());
        assert!(!narrower.narrow_down());
    }

    #[test]
    fn test_insertion_yields_window() {
        let guard = if_then(boolean(false), ret(None), None);
        let x = || local_var(JavaType::int(), "x", Some(int(1)));
        let y = || local_var(JavaType::int(), "y", Some(int(2)));
        let before = wrap(vec![x(), y(), ret(None)]);
        let after = wrap(vec![x(), guard, y(), ret(None)]);
        let mut narrower = DiffNarrower::new(before, after, &EngineConfig::default());
        narrower.narrow_fully();
        let current = narrower.current();
        let anchor = current.before.window().unwrap();
        assert_eq!((anchor.start, anchor.len), (0, 2));
        assert_eq!(current.after.node().child_count(), 3);
        assert_eq!(current.before.node().child_count(), 2);
    }

    #[test]
    fn test_textually_identical_children_are_skipped() {
        // `k` reads a local before and a parameter after; both print the same
        let sum = |k: Node, n: i32| local_var(JavaType::int(), "x", Some(binary(BinaryOp::Add, k, int(n))));
        let before = wrap(vec![sum(read_local("k", JavaType::int()), 1)]);
        let after = wrap(vec![sum(read_param("k", JavaType::int()), 2)]);
        let mut narrower = DiffNarrower::new(before, after, &EngineConfig::default());
        narrower.narrow_fully();
        let tags: Vec<KindTag> = narrower.steps().iter().map(|s| s.before.node().tag()).collect();
        assert!(tags.contains(&KindTag::Literal), "{:?}", tags);
        assert!(!tags.contains(&KindTag::VariableRead));
    }

    #[test]
    fn test_long_runs_widen_by_one_sibling() {
        let local = |name: &str, value: i32| local_var(JavaType::int(), name, Some(int(value)));
        let statements = |names: &[&str], value: i32| {
            let mut out = vec![local("s", 0)];
            out.extend(names.iter().map(|n| local(n, value)));
            out.extend([local("t", 0), ret(None)]);
            out
        };
        let anchor = |names: &[&str], config: &EngineConfig| {
            let mut narrower = DiffNarrower::new(wrap(statements(names, 1)), wrap(statements(names, 2)), config);
            narrower.narrow_fully();
            narrower.current().before.window().map(|w| (w.start, w.len))
        };
        let config = EngineConfig::default();
        assert_eq!(anchor(&["a", "b", "c"], &config), Some((0, 5)));
        assert_eq!(anchor(&["a", "b"], &config), Some((1, 2)));
        let narrow = EngineConfig {
            max_window_widening: 0,
            ..EngineConfig::default()
        };
        assert_eq!(anchor(&["a", "b", "c"], &narrow), Some((1, 3)));
    }

    #[test]
    fn test_two_differing_children_stop_narrowing() {
        let before = wrap(vec![ret(None)]);
        let after = Arc::new(unit("q", vec![]));
        let mut narrower = DiffNarrower::new(before, after, &EngineConfig::default());
        assert!(!narrower.narrow_down());
    }
}
