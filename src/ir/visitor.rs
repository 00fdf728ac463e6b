use std::sync::Arc;

use super::kind::KindTag;
use super::node::{Node, NodeVector, Reference, TraitValue, node_vector};
use super::types::JavaType;

/// Traverses and transforms the node tree.
///
/// Default methods rebuild a node only when one of its children changed, so an
/// identity visitor returns the input `Arc` unchanged.
pub trait Visitor {
    /// Entry point, dispatching on the node variant.
    fn visit_node(&self, node: &Arc<Node>) -> Arc<Node> {
        match &**node {
            Node::Element { kind, children, ty } => self.visit_element(node, *kind, children, ty),
            Node::Collection { elem, items } => self.visit_collection(node, *elem, items),
            Node::Trait(value) => self.visit_trait(node, value),
            Node::Reference(reference) => self.visit_reference(node, reference),
        }
    }

    fn visit_element(
        &self,
        node: &Arc<Node>,
        kind: KindTag,
        children: &[Arc<Node>],
        ty: &Option<JavaType>,
    ) -> Arc<Node> {
        let new_children: Vec<Arc<Node>> = children.iter().map(|c| self.visit_node(c)).collect();
        if new_children.iter().zip(children).all(|(n, o)| Arc::ptr_eq(n, o)) {
            Arc::clone(node)
        } else {
            Arc::new(Node::Element {
                kind,
                children: new_children,
                ty: ty.clone(),
            })
        }
    }

    fn visit_collection(&self, node: &Arc<Node>, elem: KindTag, items: &NodeVector) -> Arc<Node> {
        let new_items: Vec<Arc<Node>> = items.iter().map(|c| self.visit_node(c)).collect();
        if new_items.iter().zip(items.iter()).all(|(n, o)| Arc::ptr_eq(n, o)) {
            Arc::clone(node)
        } else {
            Arc::new(Node::Collection {
                elem,
                items: node_vector(new_items),
            })
        }
    }

    fn visit_trait(&self, node: &Arc<Node>, _value: &TraitValue) -> Arc<Node> {
        Arc::clone(node)
    }

    fn visit_reference(&self, node: &Arc<Node>, _reference: &Reference) -> Arc<Node> {
        Arc::clone(node)
    }
}

/// Rebuilds every node into a fresh allocation, sharing nothing with the input.
pub struct DeepClone;

impl Visitor for DeepClone {
    fn visit_element(
        &self,
        _node: &Arc<Node>,
        kind: KindTag,
        children: &[Arc<Node>],
        ty: &Option<JavaType>,
    ) -> Arc<Node> {
        Arc::new(Node::Element {
            kind,
            children: children.iter().map(|c| self.visit_node(c)).collect(),
            ty: ty.clone(),
        })
    }

    fn visit_collection(&self, _node: &Arc<Node>, elem: KindTag, items: &NodeVector) -> Arc<Node> {
        Arc::new(Node::Collection {
            elem,
            items: node_vector(items.iter().map(|c| self.visit_node(c))),
        })
    }

    fn visit_trait(&self, _node: &Arc<Node>, value: &TraitValue) -> Arc<Node> {
        Arc::new(Node::Trait(value.clone()))
    }

    fn visit_reference(&self, _node: &Arc<Node>, reference: &Reference) -> Arc<Node> {
        Arc::new(Node::Reference(reference.clone()))
    }
}

/// Structure-preserving deep clone.
pub fn deep_clone(node: &Arc<Node>) -> Arc<Node> {
    DeepClone.visit_node(node)
}
