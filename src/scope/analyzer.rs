//! Scope Analyzer: how far outside a fragment a reference must look to resolve.

use std::sync::Arc;

use tracing::trace;

use super::inventory::RefInventory;
use super::{Tier, TieredBudget};
use crate::ir::binding::BindingIndex;
use crate::ir::kind::{KindTag, Role};
use crate::ir::node::{Node, Reference, Visibility};
use crate::ir::site::Site;
use crate::ir::types::JavaType;
use crate::session::Session;

/// A local variable or parameter in scope at a site.
#[derive(Debug, Clone)]
pub struct VisibleLocal {
    pub name: String,
    pub ty: Option<JavaType>,
    pub is_parameter: bool,
    /// Node whose scope declares it: a block, loop, handler or the routine itself.
    pub scope: Arc<Node>,
}

/// Classifies references under one fragment into their minimal [`Tier`].
///
/// Inventories for the fragment, its routine and its compilation unit come from
/// the session cache. Without an enclosing routine the `Function` tier holds the
/// fragment's own inventory.
#[derive(Debug)]
pub struct ScopeAnalyzer<'s> {
    session: &'s Session,
    fragment: Arc<RefInventory>,
    function: Arc<RefInventory>,
    file: Arc<RefInventory>,
    package: String,
    file_name: String,
    scope_set: Vec<Arc<Node>>,
    visible: Vec<VisibleLocal>,
}

impl<'s> ScopeAnalyzer<'s> {
    pub fn new(session: &'s Session, site: &Site) -> Self {
        let fragment = session.inventory(site.node());
        let routine = site.enclosing_routine();
        let function = routine
            .as_ref()
            .map(|r| session.inventory(r.node()))
            .unwrap_or_else(|| Arc::clone(&fragment));
        let unit = site.enclosing_unit();
        let file_root = unit.as_ref().map(|u| u.node()).unwrap_or_else(|| site.root_node());
        let file = session.inventory(file_root);
        let package = unit
            .as_ref()
            .and_then(|u| u.node().child(Role::Package).and_then(|p| p.name_text()).map(str::to_string))
            .unwrap_or_default();
        let file_name = unit
            .as_ref()
            .and_then(|u| unit_file(session.index(), u.node()))
            .unwrap_or_default();
        let routine_depth = routine.as_ref().map(|r| r.depth()).unwrap_or(0);
        let scope_set: Vec<Arc<Node>> = site
            .ancestors()
            .iter()
            .skip(routine_depth)
            .filter(|n| n.tag().opens_scope())
            .cloned()
            .collect();
        ScopeAnalyzer {
            session,
            fragment,
            function,
            file,
            package,
            file_name,
            scope_set,
            visible: visible_locals(site),
        }
    }

    /// Minimal tier at which `reference` resolves, or `None` if it resolves nowhere visible.
    pub fn classify(&self, reference: &Reference) -> Option<Tier> {
        let tier = if self.fragment.contains(reference) {
            Some(Tier::Before)
        } else if self.function.contains(reference) {
            Some(Tier::Function)
        } else if self.file.contains(reference) {
            Some(Tier::File)
        } else if self.resolves_in_binding_space(reference) {
            Some(Tier::Binding)
        } else {
            None
        };
        trace!("classify {} -> {:?}", reference.canonical(), tier);
        tier
    }

    /// Per-tier reference counts for every reference under `node`; `None` if any is unresolvable.
    pub fn demand(&self, node: &Node) -> Option<TieredBudget> {
        let mut budget = TieredBudget::zero();
        for reference in node.references() {
            budget.add(self.classify(reference)?, 1);
        }
        Some(budget)
    }

    /// Inventory backing `tier`; the binding space has none.
    pub fn inventory(&self, tier: Tier) -> Option<&RefInventory> {
        match tier {
            Tier::Before => Some(&self.fragment),
            Tier::Function => Some(&self.function),
            Tier::File => Some(&self.file),
            Tier::Binding => None,
        }
    }

    /// Number of candidates like `reference` available at `tier`, counting every narrower tier.
    pub fn supply_at(&self, reference: &Reference, tier: Tier) -> usize {
        match self.inventory(tier) {
            Some(inventory) => inventory.candidates_like(reference),
            None => {
                let index = self.session.index();
                let file_count = self.file.candidates_like(reference);
                let global = match reference.kind {
                    KindTag::FieldRef => index.types().map(|t| t.fields.len()).sum(),
                    // a thrown object can only come from an exception constructor
                    KindTag::ExecutableRef if reference.is_constructor() => match reference.owner.as_deref() {
                        Some(owner) if index.is_subtype(owner, "Throwable") => index.exception_constructors().len(),
                        _ => index.types().map(|t| t.constructors.len()).sum(),
                    },
                    KindTag::ExecutableRef => index.types().map(|t| t.methods.len()).sum(),
                    KindTag::TypeRef => index.types().count(),
                    _ => 0,
                };
                file_count + global
            }
        }
    }

    pub fn visible_locals(&self) -> &[VisibleLocal] {
        &self.visible
    }

    /// Innermost local named `name` declared before the site in a scope enclosing it.
    pub fn visible_local(&self, name: &str) -> Option<&VisibleLocal> {
        self.visible
            .iter()
            .rev()
            .filter(|local| local.name == name)
            .find(|local| local.is_parameter || self.scope_set().iter().any(|s| Arc::ptr_eq(s, &local.scope)))
    }

    /// Scope-opening nodes between the enclosing routine and the fragment, outermost first.
    pub fn scope_set(&self) -> &[Arc<Node>] {
        &self.scope_set
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    fn accessible(&self, visibility: Visibility, owner: &JavaType) -> bool {
        let Some(name) = owner.class_name() else {
            return true;
        };
        let Some(decl) = self.session.index().type_decl(name) else {
            return false;
        };
        let from = (self.package.as_str(), self.file_name.as_str());
        BindingIndex::is_accessible(decl.visibility, &decl.package, decl.file.as_deref(), from.0, from.1)
            && BindingIndex::is_accessible(visibility, &decl.package, decl.file.as_deref(), from.0, from.1)
    }

    fn resolves_in_binding_space(&self, reference: &Reference) -> bool {
        let index = self.session.index();
        match reference.kind {
            KindTag::FieldRef => {
                let Some(owner) = reference.owner.as_deref().map(JavaType::parse) else {
                    return false;
                };
                index
                    .field(&owner, &reference.name)
                    .is_some_and(|f| self.accessible(f.modifiers.visibility, &JavaType::parse(&f.owner)))
            }
            KindTag::ExecutableRef => {
                let Some(owner) = reference.owner.as_deref() else {
                    return false;
                };
                let candidates: Vec<_> = if reference.is_constructor() {
                    index.constructors(owner).iter().collect()
                } else {
                    index.methods_named(owner, &reference.name)
                };
                candidates
                    .into_iter()
                    .filter(|m| m.params == reference.params)
                    .any(|m| self.accessible(m.modifiers.visibility, &JavaType::class(&m.owner)))
            }
            KindTag::TypeRef => match reference.ty.as_ref() {
                Some(ty) => self.type_resolves(ty),
                None => false,
            },
            _ => false,
        }
    }

    fn type_resolves(&self, ty: &JavaType) -> bool {
        match ty {
            JavaType::Array(elem) => self.type_resolves(elem),
            JavaType::Class(_) => self.accessible(Visibility::Public, ty),
            _ => true,
        }
    }
}

/// Source file of a compilation unit, found through the files its classes were indexed from.
fn unit_file(index: &BindingIndex, unit: &Node) -> Option<String> {
    unit.child(Role::Types)?
        .child_nodes()
        .iter()
        .filter_map(|class| class.declared_name())
        .find_map(|name| index.type_decl(name).and_then(|decl| decl.file.clone()))
}

fn local_of(node: &Node, scope: &Arc<Node>, is_parameter: bool) -> Option<VisibleLocal> {
    Some(VisibleLocal {
        name: node.declared_name()?.to_string(),
        ty: node.child(Role::Type).and_then(|t| t.ty()).cloned(),
        is_parameter,
        scope: Arc::clone(scope),
    })
}

/// Locals declared before the site in enclosing blocks and loop headers, catch
/// parameters, and the routine's parameters.
fn visible_locals(site: &Site) -> Vec<VisibleLocal> {
    let mut visible = Vec::new();
    let mut owner: Option<&Arc<Node>> = None;
    for (ancestor, index) in site.steps() {
        match &**ancestor {
            Node::Collection { items, .. } => {
                // the collection's owner opens the scope
                let declared = items.iter().take(index).filter(|i| i.tag() == KindTag::LocalVariable);
                for item in declared {
                    visible.extend(owner.and_then(|scope| local_of(item, scope, false)));
                }
            }
            Node::Element { kind, .. } => {
                let entered = kind.roles().get(index).copied();
                match (kind, entered) {
                    (KindTag::For, Some(Role::Condition | Role::Update | Role::Body)) => {
                        let init = ancestor.child(Role::Init).map(|c| c.child_nodes()).unwrap_or_default();
                        for item in init.iter().filter(|i| i.tag() == KindTag::LocalVariable) {
                            visible.extend(local_of(item, ancestor, false));
                        }
                    }
                    (KindTag::ForEach, Some(Role::Body)) => {
                        visible.extend(ancestor.child(Role::Variable).and_then(|v| local_of(v, ancestor, false)));
                    }
                    (KindTag::Catch, Some(Role::Body)) => {
                        visible.extend(ancestor.child(Role::Parameter).and_then(|p| local_of(p, ancestor, false)));
                    }
                    (KindTag::Method | KindTag::Constructor, Some(Role::Body)) => {
                        let params = ancestor.child(Role::Parameters).map(|c| c.child_nodes()).unwrap_or_default();
                        for param in &params {
                            visible.extend(local_of(param, ancestor, true));
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        owner = Some(ancestor);
    }
    visible
}
