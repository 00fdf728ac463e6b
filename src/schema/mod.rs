//! Rewrite schemas: parameterized before/after patterns mined by anti-unification.

pub mod builders;
pub mod generalizer;
pub mod inference;
pub mod instance;
pub mod legality;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::ir::kind::{KindSig, KindTag, Role};
use crate::ir::node::{Node, TraitValue, node_vector};
use crate::ir::printer::print;

pub use generalizer::Generalizer;
pub use instance::SchemaInstance;

/// Free-variable identifier, rendered `$n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VarId(pub u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Pattern node of a schema.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    /// Element of a fixed kind; children aligned to the kind's roles.
    FixedElement { kind: KindTag, children: Vec<SchemaNode> },
    OrderedCollection { elem: KindTag, children: Vec<SchemaNode> },
    FreeVariable { sig: KindSig, id: VarId },
    OpaqueTrait { value: TraitValue },
}

impl SchemaNode {
    pub fn sig(&self) -> KindSig {
        match self {
            SchemaNode::FixedElement { kind, children } => {
                let op = kind
                    .role_index(Role::Operator)
                    .and_then(|i| children.get(i))
                    .and_then(|c| match c {
                        SchemaNode::OpaqueTrait { value } => value.op_family(),
                        _ => None,
                    });
                KindSig::scalar(*kind).with_op(op)
            }
            SchemaNode::OrderedCollection { elem, .. } => KindSig::collection_of(*elem),
            SchemaNode::FreeVariable { sig, .. } => *sig,
            SchemaNode::OpaqueTrait { value } => KindSig::scalar(value.tag()).with_op(value.op_family()),
        }
    }

    /// Every variable occurring in this pattern, in first-occurrence order.
    pub fn vars(&self) -> Vec<VarId> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut Vec<VarId>) {
        match self {
            SchemaNode::FreeVariable { id, .. } => {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
            SchemaNode::FixedElement { children, .. } | SchemaNode::OrderedCollection { children, .. } => {
                children.iter().for_each(|c| c.collect_vars(out))
            }
            SchemaNode::OpaqueTrait { .. } => {}
        }
    }

    pub fn size(&self) -> usize {
        1 + match self {
            SchemaNode::FixedElement { children, .. } | SchemaNode::OrderedCollection { children, .. } => {
                children.iter().map(|c| c.size()).sum()
            }
            _ => 0,
        }
    }

    /// Node view with `$n` placeholders, for rendering.
    fn placeholder_view(&self) -> Arc<Node> {
        Arc::new(match self {
            SchemaNode::FixedElement { kind, children } => {
                Node::element(*kind, children.iter().map(|c| c.placeholder_view()).collect())
            }
            SchemaNode::OrderedCollection { elem, children } => Node::Collection {
                elem: *elem,
                items: node_vector(children.iter().map(|c| c.placeholder_view())),
            },
            SchemaNode::FreeVariable { id, .. } => Node::Trait(TraitValue::Name(id.to_string())),
            SchemaNode::OpaqueTrait { value } => Node::Trait(value.clone()),
        })
    }
}

impl fmt::Display for SchemaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print(&self.placeholder_view()))
    }
}

/// A generalized rewrite rule.
///
/// Variables present in `post` but not in `pre` are post-only: they must be
/// bound externally before rebuild unless listed in `inferable`.
#[derive(Debug, Clone)]
pub struct Schema {
    pub pre: SchemaNode,
    pub post: SchemaNode,
    /// Element kinds every training fragment was nested in.
    pub context_requirement: BTreeSet<KindSig>,
    pub var_kind: BTreeMap<VarId, KindSig>,
    /// Kinds every training binding of a pre variable contained.
    pub var_contains: BTreeMap<VarId, BTreeSet<KindSig>>,
    /// Post-only variables with the same binding in every training example.
    pub inferable: BTreeMap<VarId, Arc<Node>>,
}

impl Schema {
    pub fn pre_vars(&self) -> Vec<VarId> {
        self.pre.vars()
    }

    pub fn post_only_vars(&self) -> Vec<VarId> {
        let pre: BTreeSet<VarId> = self.pre.vars().into_iter().collect();
        self.post.vars().into_iter().filter(|v| !pre.contains(v)).collect()
    }

    pub fn is_post_only(&self, id: VarId) -> bool {
        self.post_only_vars().contains(&id)
    }

    pub fn free_var_count(&self) -> usize {
        self.var_kind.len()
    }

    /// Kind signature of the fragments this schema matches.
    pub fn root_sig(&self) -> KindSig {
        self.pre.sig()
    }

    /// Cheap applicability test against a fragment's context signatures.
    pub fn applies_in(&self, context: &BTreeSet<KindSig>) -> bool {
        self.context_requirement.is_subset(context)
    }

    pub fn summary(&self) -> SchemaSummary {
        let post_only = self.post_only_vars();
        SchemaSummary {
            pre: self.pre.to_string(),
            post: self.post.to_string(),
            root: self.root_sig().to_string(),
            context: self.context_requirement.iter().map(|s| s.to_string()).collect(),
            vars: self
                .var_kind
                .iter()
                .map(|(id, sig)| VarSummary {
                    id: id.to_string(),
                    kind: sig.to_string(),
                    post_only: post_only.contains(id),
                    inferable: self.inferable.get(id).map(|n| print(n)),
                })
                .collect(),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  ==>  {}", self.pre, self.post)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarSummary {
    pub id: String,
    pub kind: String,
    pub post_only: bool,
    pub inferable: Option<String>,
}

/// Serializable report of a schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaSummary {
    pub pre: String,
    pub post: String,
    pub root: String,
    pub context: Vec<String>,
    pub vars: Vec<VarSummary>,
}
