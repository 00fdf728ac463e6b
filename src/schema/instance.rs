//! Schema Instance: one schema bound to one candidate fragment.
//!
//! Matching walks the pre pattern with an explicit stack and never backtracks.
//! Rebuild instantiates the post pattern through the per-kind builders, then
//! the result is re-typed and passed through the legality gate.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use super::builders;
use super::inference::Inference;
use super::legality::LegalityGate;
use super::{Schema, SchemaNode, VarId};
use crate::errors::EngineError;
use crate::ir::kind::{KindSig, KindTag};
use crate::ir::node::{Node, deep_eq};
use crate::ir::site::Site;
use crate::ir::visitor::deep_clone;
use crate::session::Session;

/// Local-variable and parameter references stand in for each other.
fn substitutable(tag: KindTag) -> bool {
    matches!(tag, KindTag::LocalVariableRef | KindTag::ParameterRef)
}

fn compatible(expected: &KindSig, actual: &KindSig) -> bool {
    expected.is_super_or_equal(actual)
        || (!expected.collection && !actual.collection && substitutable(expected.tag) && substitutable(actual.tag))
}

fn inventory_covers(have: &BTreeSet<KindSig>, need: &BTreeSet<KindSig>) -> bool {
    need.iter().all(|sig| {
        have.contains(sig)
            || (substitutable(sig.tag)
                && [KindTag::LocalVariableRef, KindTag::ParameterRef]
                    .into_iter()
                    .any(|tag| have.contains(&KindSig { tag, ..*sig })))
    })
}

/// Unifies `pattern` with `node`, extending `bindings`. Variables already bound
/// must see a deep-equal subtree.
fn unify(pattern: &SchemaNode, node: &Arc<Node>, bindings: &mut BTreeMap<VarId, Arc<Node>>) -> bool {
    let mut stack: Vec<(&SchemaNode, Arc<Node>)> = vec![(pattern, Arc::clone(node))];
    while let Some((pattern, node)) = stack.pop() {
        match (pattern, &*node) {
            (SchemaNode::OpaqueTrait { value }, Node::Trait(actual)) if value == actual => {}
            (SchemaNode::FreeVariable { sig, id }, _) => {
                if !compatible(sig, &node.sig()) {
                    return false;
                }
                match bindings.get(id) {
                    Some(bound) if !deep_eq(bound, &node) => return false,
                    Some(_) => {}
                    None => {
                        bindings.insert(*id, Arc::clone(&node));
                    }
                }
            }
            (SchemaNode::FixedElement { kind, children }, Node::Element { kind: actual, children: nodes, .. })
                if kind == actual && children.len() == nodes.len() =>
            {
                stack.extend(children.iter().zip(nodes.iter().cloned()).rev());
            }
            (SchemaNode::OrderedCollection { elem, children }, Node::Collection { elem: actual, items })
                if elem == actual && children.len() == items.len() =>
            {
                let pairs: Vec<_> = children.iter().zip(items.iter().cloned()).collect();
                stack.extend(pairs.into_iter().rev());
            }
            _ => return false,
        }
    }
    true
}

/// A schema applied to one fragment: its bindings and the rebuilt replacement.
#[derive(Debug)]
pub struct SchemaInstance<'a> {
    schema: &'a Schema,
    session: &'a Session,
    bindings: BTreeMap<VarId, Arc<Node>>,
}

impl<'a> SchemaInstance<'a> {
    pub fn new(schema: &'a Schema, session: &'a Session) -> Self {
        SchemaInstance {
            schema,
            session,
            bindings: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    pub fn bindings(&self) -> &BTreeMap<VarId, Arc<Node>> {
        &self.bindings
    }

    pub fn binding(&self, id: VarId) -> Option<&Arc<Node>> {
        self.bindings.get(&id)
    }

    /// Supplies a binding from outside, typically for a post-only variable.
    pub fn bind(&mut self, id: VarId, node: Arc<Node>) {
        self.bindings.insert(id, node);
    }

    /// Matches at `site`, checking the schema's context requirement first.
    pub fn match_site(&mut self, site: &Site) -> bool {
        if !self.schema.applies_in(&site.context_signatures()) {
            trace!("context requirement not met at {:?}", site.node().tag());
            self.bindings.clear();
            return false;
        }
        self.match_node(site.node())
    }

    /// Matches the pre pattern against `node`, replacing any previous bindings.
    pub fn match_node(&mut self, node: &Arc<Node>) -> bool {
        self.bindings.clear();
        let mut found = BTreeMap::new();
        if !unify(&self.schema.pre, node, &mut found) {
            return false;
        }
        if self.session.config().check_var_contains {
            for (id, need) in &self.schema.var_contains {
                let Some(bound) = found.get(id) else {
                    continue;
                };
                if !inventory_covers(&bound.kind_inventory(), need) {
                    trace!("binding of {} lacks required kinds", id);
                    return false;
                }
            }
        }
        self.bindings = found;
        true
    }

    /// Binds post-only variables by matching the post pattern against `after`.
    /// Pre variables must reproduce their existing bindings.
    pub fn bind_post_from(&mut self, after: &Arc<Node>) -> bool {
        let mut extended = self.bindings.clone();
        if !unify(&self.schema.post, after, &mut extended) {
            return false;
        }
        self.bindings = extended;
        true
    }

    /// Instantiates the post pattern. `Ok(None)` means the result would be malformed.
    pub fn rebuild(&self) -> Result<Option<Arc<Node>>, EngineError> {
        let mut shared = FxHashMap::default();
        let rebuilt = self.rebuild_node(&self.schema.post, &mut shared)?;
        if rebuilt.is_none() {
            trace!("rebuild of `{}` is malformed", self.schema.post);
        }
        Ok(rebuilt)
    }

    fn rebuild_node(
        &self,
        pattern: &SchemaNode,
        shared: &mut FxHashMap<usize, Arc<Node>>,
    ) -> Result<Option<Arc<Node>>, EngineError> {
        match pattern {
            SchemaNode::FreeVariable { id, .. } => {
                let binding = self
                    .bindings
                    .get(id)
                    .or_else(|| self.schema.inferable.get(id))
                    .ok_or(EngineError::UnboundVariable(*id))?;
                Ok(Some(use_binding(binding, shared)))
            }
            SchemaNode::OpaqueTrait { value } => Ok(Some(Arc::new(Node::Trait(value.clone())))),
            SchemaNode::FixedElement { kind, children } => {
                let Some(built) = self.rebuild_children(children, shared)? else {
                    return Ok(None);
                };
                Ok(builders::build(*kind, built)?.map(Arc::new))
            }
            SchemaNode::OrderedCollection { elem, children } => {
                let Some(built) = self.rebuild_children(children, shared)? else {
                    return Ok(None);
                };
                Ok(builders::build_collection(*elem, built).map(Arc::new))
            }
        }
    }

    fn rebuild_children(
        &self,
        children: &[SchemaNode],
        shared: &mut FxHashMap<usize, Arc<Node>>,
    ) -> Result<Option<Vec<Arc<Node>>>, EngineError> {
        let mut built = Vec::with_capacity(children.len());
        for child in children {
            match self.rebuild_node(child, shared)? {
                Some(node) => built.push(node),
                None => return Ok(None),
            }
        }
        Ok(Some(built))
    }

    /// Rebuilds, re-types and gates the replacement for the fragment at `site`.
    /// `Ok(None)` means the candidate does not type-check.
    pub fn type_checked(&self, site: &Site) -> Result<Option<Arc<Node>>, EngineError> {
        let Some(rebuilt) = self.rebuild()? else {
            return Ok(None);
        };
        let typed = match Inference::at_site(self.session.types(), site).infer(&rebuilt) {
            Ok(typed) => typed,
            Err(err) => {
                debug!("Rebuilt fragment does not type: {}", err);
                return Ok(None);
            }
        };
        Ok(LegalityGate::new(self.session, site).check(&typed).ok().map(|_| typed))
    }

    /// The whole tree with the fragment at `site` replaced by the checked rebuild.
    pub fn apply(&self, site: &Site) -> Result<Option<Arc<Node>>, EngineError> {
        Ok(self.type_checked(site)?.and_then(|rebuilt| site.replace(rebuilt)))
    }
}

/// Collections and expressions get a fresh copy per use; other bindings are
/// copied once per rebuild and shared across their uses.
fn use_binding(binding: &Arc<Node>, shared: &mut FxHashMap<usize, Arc<Node>>) -> Arc<Node> {
    if binding.is_collection() || binding.is_expression() {
        return deep_clone(binding);
    }
    let key = Arc::as_ptr(binding) as usize;
    Arc::clone(shared.entry(key).or_insert_with(|| deep_clone(binding)))
}
