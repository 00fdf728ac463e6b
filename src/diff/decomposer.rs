//! Candidate Decomposer: turns one whole-file before/after pair into candidate units.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::narrower::DiffNarrower;
use crate::config::EngineConfig;
use crate::ir::kind::{KindSig, KindTag};
use crate::ir::node::Node;
use crate::ir::site::Site;

/// One `(context signatures, before, after)` training triple.
#[derive(Debug, Clone)]
pub struct CandidateUnit {
    pub context: BTreeSet<KindSig>,
    pub before: Site,
    pub after: Arc<Node>,
}

impl CandidateUnit {
    pub fn new(before: Site, after: Arc<Node>) -> Self {
        CandidateUnit {
            context: before.context_signatures(),
            before,
            after,
        }
    }

    pub fn before_node(&self) -> &Arc<Node> {
        self.before.node()
    }
}

/// A place in a before-tree where a schema could apply.
#[derive(Debug, Clone)]
pub struct CandidateSite {
    pub context: BTreeSet<KindSig>,
    pub site: Site,
}

fn is_statement_run(node: &Node) -> bool {
    match node {
        Node::Collection { elem, items } => {
            KindTag::Statement.is_super_or_equal(*elem) && items.iter().all(|s| s.is_statement())
        }
        _ => false,
    }
}

/// Cheap check that replacing `before` with `after` keeps a statement or expression shape.
pub fn is_edit_shaped(before: &Node, after: &Node) -> bool {
    if is_statement_run(before) {
        return is_statement_run(after);
    }
    (before.is_statement() && after.is_statement()) || (before.is_expression() && after.is_expression())
}

/// Every edit-shaped candidate unit along the narrowed difference, innermost first.
/// Identical trees yield nothing.
pub fn decompose(before: Arc<Node>, after: Arc<Node>, config: &EngineConfig) -> Vec<CandidateUnit> {
    let mut narrower = DiffNarrower::new(before, after, config);
    if narrower.is_identical() {
        return Vec::new();
    }
    let steps = narrower.narrow_fully();
    let units: Vec<CandidateUnit> = narrower
        .widening()
        .into_iter()
        .filter(|step| is_edit_shaped(step.before.node(), step.after.node()))
        .map(|step| CandidateUnit::new(step.before, Arc::clone(step.after.node())))
        .collect();
    debug!("Decomposed diff in {} narrowing steps into {} candidate units", steps, units.len());
    units
}

/// Every statement- or expression-shaped node under a routine of `root`, with its context.
pub fn sites(root: &Arc<Node>) -> Vec<CandidateSite> {
    let mut out = Vec::new();
    let mut stack = vec![(Site::root(Arc::clone(root)), false)];
    while let Some((site, in_routine)) = stack.pop() {
        let node = site.node();
        if in_routine && (node.is_statement() || node.is_expression()) {
            out.push(CandidateSite {
                context: site.context_signatures(),
                site: site.clone(),
            });
        }
        let inside = in_routine || node.tag().is_routine();
        for index in (0..node.child_count()).rev() {
            if let Some(child) = site.child(index) {
                stack.push((child, inside));
            }
        }
    }
    out
}
