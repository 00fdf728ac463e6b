//! Parent navigation over immutable trees.
//!
//! Nodes carry no parent pointers, so a [`Site`] records the root-to-node path
//! and the child index taken at each step. A site may also address a synthetic
//! window: a contiguous run of a collection's items re-wrapped as a fresh
//! collection anchored to the original.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::kind::{KindSig, KindTag, Role};
use super::node::{Node, node_vector};

/// Run of a collection's items covered by a synthetic window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowAnchor {
    pub start: usize,
    pub len: usize,
}

/// Where a node sits in its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    /// Kind of the nearest owning element.
    pub owner: KindTag,
    pub role: Role,
    /// Position inside the role's collection, for collection items and windows.
    pub index: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Site {
    path: Vec<Arc<Node>>,
    indices: Vec<usize>,
    window: Option<WindowAnchor>,
}

impl Site {
    pub fn root(root: Arc<Node>) -> Self {
        Site {
            path: vec![root],
            indices: Vec::new(),
            window: None,
        }
    }

    /// Finds `target` under `root` by pointer identity.
    pub fn locate(root: &Arc<Node>, target: &Arc<Node>) -> Option<Site> {
        let mut stack = vec![Site::root(root.clone())];
        while let Some(site) = stack.pop() {
            if Arc::ptr_eq(site.node(), target) {
                return Some(site);
            }
            for index in (0..site.node().child_count()).rev() {
                if let Some(child) = site.child(index) {
                    stack.push(child);
                }
            }
        }
        None
    }

    pub fn node(&self) -> &Arc<Node> {
        // path always holds at least the root
        &self.path[self.path.len() - 1]
    }

    pub fn root_node(&self) -> &Arc<Node> {
        &self.path[0]
    }

    pub fn parent(&self) -> Option<&Arc<Node>> {
        self.path.len().checked_sub(2).map(|i| &self.path[i])
    }

    pub fn depth(&self) -> usize {
        self.indices.len()
    }

    pub fn is_root(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn window(&self) -> Option<WindowAnchor> {
        self.window
    }

    /// Ancestors from the root down to the parent.
    pub fn ancestors(&self) -> &[Arc<Node>] {
        &self.path[..self.path.len() - 1]
    }

    /// `(ancestor, child index taken)` pairs from the root down.
    pub fn steps(&self) -> impl Iterator<Item = (&Arc<Node>, usize)> {
        self.path.iter().zip(self.indices.iter().copied())
    }

    /// Descends into child `index` of the current node.
    pub fn child(&self, index: usize) -> Option<Site> {
        if self.window.is_some() {
            return None;
        }
        let child = self.node().child_at(index)?;
        let mut path = self.path.clone();
        path.push(child);
        let mut indices = self.indices.clone();
        indices.push(index);
        Some(Site { path, indices, window: None })
    }

    /// Descends into the child occupying `role`.
    pub fn role(&self, role: Role) -> Option<Site> {
        let index = self.node().tag().role_index(role)?;
        match &**self.node() {
            Node::Element { .. } => self.child(index),
            _ => None,
        }
    }

    /// Wraps items `[start, start + len)` of the current collection as a synthetic collection.
    pub fn window_of(&self, start: usize, len: usize) -> Option<Site> {
        let Node::Collection { elem, items } = &**self.node() else {
            return None;
        };
        if self.window.is_some() || len == 0 || start + len > items.len() {
            return None;
        }
        let synthetic = Arc::new(Node::Collection {
            elem: *elem,
            items: node_vector(items.iter().skip(start).take(len).cloned()),
        });
        let mut path = self.path.clone();
        path.push(synthetic);
        let mut indices = self.indices.clone();
        indices.push(start);
        Some(Site {
            path,
            indices,
            window: Some(WindowAnchor { start, len }),
        })
    }

    /// The site `levels` steps up, dropping any window.
    pub fn up(&self, levels: usize) -> Option<Site> {
        let depth = self.depth().checked_sub(levels)?;
        Some(self.truncate(depth))
    }

    fn truncate(&self, depth: usize) -> Site {
        Site {
            path: self.path[..=depth].to_vec(),
            indices: self.indices[..depth].to_vec(),
            window: None,
        }
    }

    /// Nearest strict ancestor site satisfying `pred`.
    pub fn enclosing(&self, pred: impl Fn(&Node) -> bool) -> Option<Site> {
        (0..self.depth())
            .rev()
            .find(|depth| pred(&self.path[*depth]))
            .map(|depth| self.truncate(depth))
    }

    pub fn enclosing_routine(&self) -> Option<Site> {
        self.enclosing(|n| n.tag().is_routine())
    }

    pub fn enclosing_unit(&self) -> Option<Site> {
        if self.root_node().tag() == KindTag::CompilationUnit {
            return Some(self.truncate(0));
        }
        self.enclosing(|n| n.tag() == KindTag::CompilationUnit)
    }

    /// Owner kind, role and collection index of the current node.
    pub fn slot(&self) -> Option<Slot> {
        let parent = self.parent()?;
        let index = *self.indices.last()?;
        match &**parent {
            Node::Element { kind, .. } => {
                let role = *kind.roles().get(index)?;
                Some(Slot { owner: *kind, role, index: None })
            }
            Node::Collection { .. } => {
                let owner_depth = self.path.len().checked_sub(3)?;
                let owner = &self.path[owner_depth];
                let role_index = self.indices[owner_depth];
                let role = *owner.tag().roles().get(role_index)?;
                Some(Slot {
                    owner: owner.tag(),
                    role,
                    index: Some(index),
                })
            }
            _ => None,
        }
    }

    /// Upward closure of the kinds strictly between the root and this node.
    pub fn context_signatures(&self) -> BTreeSet<KindSig> {
        self.path
            .iter()
            .skip(1)
            .take(self.path.len().saturating_sub(2))
            .flat_map(|ancestor| ancestor.sig().upward_closure())
            .collect()
    }

    /// Position of the current node inside its parent's child list or collection.
    pub fn index_in_parent(&self) -> Option<usize> {
        self.indices.last().copied()
    }

    /// New root with the current node replaced. For windows, the replacement's items
    /// are spliced in place of the covered run.
    pub fn replace(&self, replacement: Arc<Node>) -> Option<Arc<Node>> {
        let mut current = replacement;
        let mut level = self.path.len() - 1;
        if let Some(anchor) = self.window {
            let Node::Collection { elem, items } = &*self.path[level - 1] else {
                return None;
            };
            let spliced: Vec<Arc<Node>> = items
                .iter()
                .take(anchor.start)
                .cloned()
                .chain(current.child_nodes())
                .chain(items.iter().skip(anchor.start + anchor.len).cloned())
                .collect();
            current = Arc::new(Node::Collection {
                elem: *elem,
                items: node_vector(spliced),
            });
            level -= 1;
        }
        while level > 0 {
            let parent = &self.path[level - 1];
            let index = self.indices[level - 1];
            current = Arc::new(parent.with_child(index, current)?);
            level -= 1;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::build::*;
    use crate::ir::node::{BinaryOp, Visibility};
    use crate::ir::types::JavaType;

    fn sample() -> Arc<Node> {
        Arc::new(unit(
            "p",
            vec![class(modifiers(Visibility::Public, false), "A", None, vec![method(
                modifiers(Visibility::Public, false),
                "f",
                JavaType::int(),
                vec![],
                Some(block(vec![
                    local_var(JavaType::int(), "x", Some(int(1))),
                    while_loop(boolean(true), block(vec![brk()])),
                    ret(Some(read_local("x", JavaType::int()))),
                ])),
            )])],
        ))
    }

    fn body_statements(root: &Arc<Node>) -> Site {
        Site::root(root.clone())
            .role(Role::Types)
            .and_then(|s| s.child(0))
            .and_then(|s| s.role(Role::Members))
            .and_then(|s| s.child(0))
            .and_then(|s| s.role(Role::Body))
            .and_then(|s| s.role(Role::Statements))
            .unwrap()
    }

    #[test]
    fn test_slot_of_collection_item() {
        let root = sample();
        let ret_site = body_statements(&root).child(2).unwrap();
        let slot = ret_site.slot().unwrap();
        assert_eq!(slot.owner, KindTag::Block);
        assert_eq!(slot.role, Role::Statements);
        assert_eq!(slot.index, Some(2));
        let expr_site = ret_site.role(Role::Expression).unwrap();
        assert_eq!(expr_site.slot().map(|s| s.role), Some(Role::Expression));
    }

    #[test]
    fn test_context_signatures_exclude_root_and_node() {
        let root = sample();
        let ret_site = body_statements(&root).child(2).unwrap();
        let ctx = ret_site.context_signatures();
        assert!(ctx.contains(&KindSig::scalar(KindTag::Method)));
        assert!(ctx.contains(&KindSig::scalar(KindTag::Block)));
        assert!(ctx.contains(&KindSig::scalar(KindTag::Statement)));
        assert!(!ctx.contains(&KindSig::scalar(KindTag::CompilationUnit)));
        assert!(!ctx.contains(&KindSig::scalar(KindTag::Return)));
    }

    #[test]
    fn test_replace_rebuilds_spine() {
        let root = sample();
        let init = body_statements(&root)
            .child(0)
            .and_then(|s| s.role(Role::Initializer))
            .unwrap();
        let replaced = init.replace(Arc::new(binary(BinaryOp::Add, int(1), int(2)))).unwrap();
        assert_ne!(replaced, root);
        let again = Site::root(replaced.clone());
        assert_eq!(again.root_node().node_count(), root.node_count() + 4);
    }

    #[test]
    fn test_window_splice() {
        let root = sample();
        let window = body_statements(&root).window_of(0, 2).unwrap();
        assert_eq!(window.node().child_count(), 2);
        assert_eq!(window.slot().and_then(|s| s.index), Some(0));
        let replaced = window
            .replace(Arc::new(collection(KindTag::Statement, vec![brk()])))
            .unwrap();
        let stmts = body_statements(&replaced);
        assert_eq!(stmts.node().child_count(), 2);
    }

    #[test]
    fn test_enclosing_and_locate() {
        let root = sample();
        let brk_site = body_statements(&root)
            .child(1)
            .and_then(|s| s.role(Role::Body))
            .and_then(|s| s.role(Role::Statements))
            .and_then(|s| s.child(0))
            .unwrap();
        let routine = brk_site.enclosing_routine().unwrap();
        assert_eq!(routine.node().tag(), KindTag::Method);
        let found = Site::locate(&root, brk_site.node()).unwrap();
        assert_eq!(found.depth(), brk_site.depth());
        assert!(brk_site.enclosing_unit().is_some());
    }
}
