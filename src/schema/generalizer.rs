//! Schema Generalizer: anti-unifies N candidate units into one schema.
//!
//! The pre pass walks the N before-fragments in lockstep. A position whose
//! fragment survives unchanged somewhere in each instance's after-fragment
//! becomes a free variable (reused when an existing variable has deep-equal
//! bindings), a position where all instances share a shape is kept as fixed
//! structure, and anything else becomes a variable. The post pass walks the N
//! after-fragments the same way, reusing pre variables where it can and
//! allocating post-only variables where it cannot.

use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use super::{Schema, SchemaNode, VarId};
use crate::diff::CandidateUnit;
use crate::ir::kind::{KindSig, KindTag};
use crate::ir::node::{Node, TraitValue, deep_eq, preorder};
use crate::session::Session;

#[derive(Debug, Clone)]
struct VarRecord {
    id: VarId,
    sig: KindSig,
    /// One binding per instance, in instance order.
    bindings: Vec<Arc<Node>>,
    in_pre: bool,
}

enum Shape {
    Element(KindTag, usize),
    Collection(KindTag, usize),
    Trait(TraitValue),
}

/// One generalization run. Variables are numbered from zero per run.
pub struct Generalizer<'s> {
    session: &'s Session,
    /// Per instance: every after-subtree bucketed by structural hash.
    after_index: Vec<FxHashMap<u64, Vec<Arc<Node>>>>,
    vars: Vec<VarRecord>,
}

impl<'s> Generalizer<'s> {
    pub fn new(session: &'s Session) -> Self {
        Generalizer {
            session,
            after_index: Vec::new(),
            vars: Vec::new(),
        }
    }

    /// Generalizes `units`. Always produces a schema for non-empty input; rejecting
    /// schemas that are too general is the caller's decision.
    pub fn generalize(mut self, units: &[CandidateUnit]) -> Option<Schema> {
        if units.is_empty() {
            return None;
        }
        self.after_index = units.iter().map(|u| index_subtrees(&u.after)).collect();
        let befores: Vec<Arc<Node>> = units.iter().map(|u| Arc::clone(u.before_node())).collect();
        let afters: Vec<Arc<Node>> = units.iter().map(|u| Arc::clone(&u.after)).collect();
        let pre = self.pre(&befores);
        let post = self.post(&afters);

        let context_requirement = units
            .iter()
            .map(|u| u.context.clone())
            .reduce(|acc, next| acc.intersection(&next).copied().collect())
            .unwrap_or_default()
            .into_iter()
            .filter(KindSig::is_element_kind)
            .collect();
        let var_kind = self.vars.iter().map(|v| (v.id, v.sig)).collect();
        let var_contains = self
            .vars
            .iter()
            .filter(|v| v.in_pre)
            .map(|v| (v.id, common_inventory(&v.bindings)))
            .collect();
        let inferable = self
            .vars
            .iter()
            .filter(|v| !v.in_pre && all_equal(&v.bindings))
            .map(|v| (v.id, Arc::clone(&v.bindings[0])))
            .collect();
        let schema = Schema {
            pre,
            post,
            context_requirement,
            var_kind,
            var_contains,
            inferable,
        };
        debug!(
            "Generalized {} units into `{}` with {} free variables",
            units.len(),
            schema,
            schema.free_var_count()
        );
        Some(schema)
    }

    fn pre(&mut self, nodes: &[Arc<Node>]) -> SchemaNode {
        let survives = nodes.iter().all(|n| collapsible(n))
            && nodes.iter().enumerate().all(|(i, n)| self.occurs_in_after(i, n));
        if survives {
            return self.variable(nodes, true);
        }
        match common_shape(nodes) {
            Some(Shape::Element(kind, arity)) => SchemaNode::FixedElement {
                kind,
                children: (0..arity).map(|i| self.pre(&column(nodes, i))).collect(),
            },
            Some(Shape::Collection(elem, len)) => SchemaNode::OrderedCollection {
                elem,
                children: (0..len).map(|i| self.pre(&column(nodes, i))).collect(),
            },
            Some(Shape::Trait(value)) => SchemaNode::OpaqueTrait { value },
            None => self.variable(nodes, true),
        }
    }

    fn post(&mut self, nodes: &[Arc<Node>]) -> SchemaNode {
        if let Some(reused) = self.reuse(nodes, true) {
            return reused;
        }
        match common_shape(nodes) {
            Some(Shape::Element(kind, arity)) => SchemaNode::FixedElement {
                kind,
                children: (0..arity).map(|i| self.post(&column(nodes, i))).collect(),
            },
            Some(Shape::Collection(elem, len)) => SchemaNode::OrderedCollection {
                elem,
                children: (0..len).map(|i| self.post(&column(nodes, i))).collect(),
            },
            Some(Shape::Trait(value)) => SchemaNode::OpaqueTrait { value },
            None => self.variable(nodes, false),
        }
    }

    fn occurs_in_after(&self, instance: usize, node: &Arc<Node>) -> bool {
        self.after_index[instance]
            .get(&node.structural_hash())
            .is_some_and(|bucket| bucket.iter().any(|candidate| deep_eq(candidate, node)))
    }

    /// An existing variable whose per-instance bindings equal `nodes`.
    fn reuse(&self, nodes: &[Arc<Node>], pre_only: bool) -> Option<SchemaNode> {
        self.vars
            .iter()
            .filter(|v| v.in_pre || !pre_only)
            .find(|v| v.bindings.iter().zip(nodes).all(|(b, n)| deep_eq(b, n)))
            .map(|v| SchemaNode::FreeVariable { sig: v.sig, id: v.id })
    }

    fn variable(&mut self, nodes: &[Arc<Node>], in_pre: bool) -> SchemaNode {
        if let Some(reused) = self.reuse(nodes, false) {
            return reused;
        }
        let sigs: Vec<KindSig> = nodes.iter().map(|n| n.sig()).collect();
        let sig = self.session.joins().join_all(&sigs);
        let id = VarId(self.vars.len() as u32);
        trace!("allocated {} : {} ({})", id, sig, if in_pre { "pre" } else { "post-only" });
        self.vars.push(VarRecord {
            id,
            sig,
            bindings: nodes.to_vec(),
            in_pre,
        });
        SchemaNode::FreeVariable { sig, id }
    }
}

/// Positions eligible to collapse into a shared variable: whole elements,
/// collections, references and names. Operators, literals, modifiers and absent
/// markers stay opaque so the schema keeps the edit's meaning.
fn collapsible(node: &Node) -> bool {
    match node {
        Node::Trait(value) => matches!(value, TraitValue::Name(_)),
        _ => true,
    }
}

fn common_shape(nodes: &[Arc<Node>]) -> Option<Shape> {
    let (first, rest) = nodes.split_first()?;
    match &**first {
        Node::Element { kind, children, .. } => rest
            .iter()
            .all(|n| matches!(&**n, Node::Element { kind: k, children: c, .. } if k == kind && c.len() == children.len()))
            .then(|| Shape::Element(*kind, children.len())),
        Node::Collection { elem, items } => rest
            .iter()
            .all(|n| matches!(&**n, Node::Collection { elem: e, items: i } if e == elem && i.len() == items.len()))
            .then(|| Shape::Collection(*elem, items.len())),
        Node::Trait(value) => rest
            .iter()
            .all(|n| matches!(&**n, Node::Trait(v) if v == value))
            .then(|| Shape::Trait(value.clone())),
        Node::Reference(_) => None,
    }
}

/// Child `index` of every node; callers ensure a common shape.
fn column(nodes: &[Arc<Node>], index: usize) -> Vec<Arc<Node>> {
    nodes.iter().filter_map(|n| n.child_at(index)).collect()
}

fn all_equal(nodes: &[Arc<Node>]) -> bool {
    nodes.windows(2).all(|pair| deep_eq(&pair[0], &pair[1]))
}

fn common_inventory(bindings: &[Arc<Node>]) -> BTreeSet<KindSig> {
    bindings
        .iter()
        .map(|b| b.kind_inventory())
        .reduce(|acc, next| acc.intersection(&next).copied().collect())
        .unwrap_or_default()
}

fn index_subtrees(root: &Arc<Node>) -> FxHashMap<u64, Vec<Arc<Node>>> {
    let mut index: FxHashMap<u64, Vec<Arc<Node>>> = FxHashMap::default();
    for node in preorder(root) {
        index.entry(node.structural_hash()).or_default().push(node);
    }
    index
}
