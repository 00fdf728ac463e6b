use std::collections::BTreeSet;

use rustc_hash::FxHashSet;

use crate::ir::kind::{KindTag, Role};
use crate::ir::node::{Node, Reference};
use crate::ir::types::JavaType;

/// Resolved names found under one container node: declared there or referenced there.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefInventory {
    pub variables: FxHashSet<String>,
    pub fields: FxHashSet<String>,
    pub methods: FxHashSet<String>,
    pub constructors: FxHashSet<String>,
    pub types: FxHashSet<String>,
    /// Static types of member-access qualifiers.
    pub targeted_types: BTreeSet<JavaType>,
}

impl RefInventory {
    pub fn collect(node: &Node) -> Self {
        let mut inventory = RefInventory::default();
        inventory.walk(node, None);
        inventory
    }

    fn walk<'a>(&mut self, node: &'a Node, class: Option<&'a str>) {
        match node {
            Node::Reference(reference) => self.insert(reference),
            Node::Trait(_) => {}
            Node::Collection { items, .. } => items.iter().for_each(|item| self.walk(item, class)),
            Node::Element { kind, children, .. } => {
                let mut class = class;
                match kind {
                    KindTag::Class => {
                        if let Some(name) = node.declared_name() {
                            self.types.insert(name.to_string());
                            class = Some(name);
                        }
                    }
                    KindTag::LocalVariable | KindTag::Parameter => {
                        if let Some(name) = node.declared_name() {
                            self.variables.insert(name.to_string());
                        }
                    }
                    KindTag::Field => {
                        if let (Some(owner), Some(name)) = (class, node.declared_name()) {
                            self.fields.insert(format!("{}.{}", owner, name));
                        }
                    }
                    KindTag::Method | KindTag::Constructor => {
                        if let Some(owner) = class {
                            let name = node.declared_name().unwrap_or("<init>");
                            let params: Vec<String> = node
                                .child(Role::Parameters)
                                .map(|ps| {
                                    ps.child_nodes()
                                        .iter()
                                        .filter_map(|p| p.child(Role::Type).and_then(|t| t.ty()).map(|t| t.to_string()))
                                        .collect()
                                })
                                .unwrap_or_default();
                            let canonical = format!("{}#{}({})", owner, name, params.join(","));
                            if *kind == KindTag::Constructor {
                                self.constructors.insert(canonical);
                            } else {
                                self.methods.insert(canonical);
                            }
                        }
                    }
                    KindTag::FieldRead | KindTag::Invocation => {
                        if let Some(ty) = node.present_child(Role::Target).and_then(|t| t.ty()) {
                            self.targeted_types.insert(ty.clone());
                        }
                    }
                    _ => {}
                }
                children.iter().for_each(|child| self.walk(child, class));
            }
        }
    }

    fn insert(&mut self, reference: &Reference) {
        let canonical = reference.canonical();
        match reference.kind {
            KindTag::LocalVariableRef | KindTag::ParameterRef => self.variables.insert(canonical),
            KindTag::FieldRef => self.fields.insert(canonical),
            KindTag::ExecutableRef if reference.is_constructor() => self.constructors.insert(canonical),
            KindTag::ExecutableRef => self.methods.insert(canonical),
            KindTag::TypeRef => self.types.insert(canonical),
            _ => false,
        };
    }

    pub fn contains(&self, reference: &Reference) -> bool {
        let canonical = reference.canonical();
        match reference.kind {
            KindTag::LocalVariableRef | KindTag::ParameterRef => self.variables.contains(&canonical),
            KindTag::FieldRef => self.fields.contains(&canonical),
            KindTag::ExecutableRef if reference.is_constructor() => self.constructors.contains(&canonical),
            KindTag::ExecutableRef => self.methods.contains(&canonical),
            KindTag::TypeRef => self.types.contains(&canonical),
            _ => false,
        }
    }

    /// How many candidates of the same category as `reference` this inventory offers.
    pub fn candidates_like(&self, reference: &Reference) -> usize {
        match reference.kind {
            KindTag::LocalVariableRef | KindTag::ParameterRef => self.variables.len(),
            KindTag::FieldRef => self.fields.len(),
            KindTag::ExecutableRef if reference.is_constructor() => self.constructors.len(),
            KindTag::ExecutableRef => self.methods.len(),
            KindTag::TypeRef => self.types.len(),
            _ => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.variables.len() + self.fields.len() + self.methods.len() + self.constructors.len() + self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
