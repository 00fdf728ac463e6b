//! Legality gate for a rebuilt, re-typed fragment at its original site.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::builders::{fits, fits_items};
use super::inference::Inference;
use crate::ir::kind::{Content, KindTag, Role};
use crate::ir::node::{Literal, Node, Reference, TraitValue, node_vector, preorder};
use crate::ir::site::Site;
use crate::ir::types::JavaType;
use crate::scope::ScopeAnalyzer;
use crate::session::Session;

/// Why a rebuilt fragment may not replace the original.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("{0:?} does not fit the slot of the original fragment")]
    Shape(KindTag),
    #[error("returned {found} where the routine returns {expected}")]
    ReturnType { expected: JavaType, found: String },
    #[error("assignment side: {0}")]
    AssignmentSide(String),
    #[error("arguments: {0}")]
    Arguments(String),
    #[error("condition: {0}")]
    Condition(String),
    #[error("operand: {0}")]
    Operand(String),
    #[error("{member} is not a member of {qualifier}")]
    MemberQualifier { qualifier: String, member: String },
    #[error("declaration of `{0}` removed while still in use")]
    RemovedDeclaration(String),
    #[error("`{0}` is used but not declared here")]
    UndeclaredUse(String),
    #[error("`{name}` is declared {declared} but used as {used}")]
    LocalType { name: String, declared: JavaType, used: JavaType },
    #[error("the routine no longer ends in a return")]
    MissingReturn,
    #[error("enclosing node no longer type-checks: {0}")]
    Host(String),
}

/// Checks `rebuilt` (already re-typed) as a replacement for the fragment at `site`.
pub struct LegalityGate<'s> {
    session: &'s Session,
    site: &'s Site,
    analyzer: ScopeAnalyzer<'s>,
}

impl<'s> LegalityGate<'s> {
    pub fn new(session: &'s Session, site: &'s Site) -> Self {
        LegalityGate {
            session,
            site,
            analyzer: session.analyzer(site),
        }
    }

    pub fn check(&self, rebuilt: &Arc<Node>) -> Result<(), Violation> {
        let verdict = self
            .check_shape(rebuilt)
            .and_then(|_| self.check_returns(rebuilt))
            .and_then(|_| self.check_host(rebuilt))
            .and_then(|_| self.check_members(rebuilt))
            .and_then(|_| self.check_removed_declarations(rebuilt))
            .and_then(|_| self.check_declared_uses(rebuilt))
            .and_then(|_| self.check_final_return(rebuilt));
        if let Err(violation) = &verdict {
            debug!("Rejected rebuilt fragment: {}", violation);
        }
        verdict
    }

    fn check_shape(&self, rebuilt: &Node) -> Result<(), Violation> {
        let original = self.site.node();
        let ok = if self.site.window().is_some() {
            match (&**original, rebuilt) {
                (Node::Collection { elem, .. }, Node::Collection { items, .. }) => fits_items(*elem, items),
                _ => false,
            }
        } else {
            match self.site.slot() {
                Some(slot) => {
                    let content = slot.owner.content(slot.role);
                    match (content, slot.index) {
                        (Content::Collection(tag), Some(_)) => fits(item_content(tag), rebuilt),
                        (content, _) => fits(content, rebuilt),
                    }
                }
                None => {
                    (!original.is_statement() || rebuilt.is_statement())
                        && (!original.is_expression() || original.is_statement() || rebuilt.is_expression())
                }
            }
        };
        if ok { Ok(()) } else { Err(Violation::Shape(rebuilt.tag())) }
    }

    fn return_type(&self) -> Option<JavaType> {
        let routine = self.site.enclosing_routine()?;
        match routine.node().tag() {
            KindTag::Constructor => Some(JavaType::Void),
            _ => routine.node().child(Role::ReturnType).and_then(|t| t.ty()).cloned(),
        }
    }

    fn check_returns(&self, rebuilt: &Arc<Node>) -> Result<(), Violation> {
        let Some(expected) = self.return_type() else {
            return Ok(());
        };
        let returned_here = self
            .site
            .slot()
            .filter(|slot| slot.owner == KindTag::Return && slot.role == Role::Expression)
            .map(|_| Arc::clone(rebuilt));
        let nested = preorder(rebuilt)
            .into_iter()
            .filter(|n| n.tag() == KindTag::Return)
            .map(|n| n.present_child(Role::Expression).cloned());
        for value in returned_here.map(Some).into_iter().chain(nested) {
            let ok = match &value {
                None => expected == JavaType::Void,
                Some(v) => v.ty().is_some_and(|found| self.session.types().is_assignable(found, &expected)),
            };
            if !ok {
                let found = value
                    .as_ref()
                    .and_then(|v| v.ty())
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "nothing".to_string());
                return Err(Violation::ReturnType { expected, found });
            }
        }
        Ok(())
    }

    /// The enclosing element with the fragment swapped in.
    fn edited_host(&self, rebuilt: &Arc<Node>) -> Option<Arc<Node>> {
        let parent = self.site.parent()?;
        match &**parent {
            Node::Element { .. } => Some(Arc::new(parent.with_child(self.site.index_in_parent()?, Arc::clone(rebuilt))?)),
            Node::Collection { elem, items } => {
                let collection = match self.site.window() {
                    Some(anchor) => Node::Collection {
                        elem: *elem,
                        items: node_vector(
                            items
                                .iter()
                                .take(anchor.start)
                                .cloned()
                                .chain(rebuilt.child_nodes())
                                .chain(items.iter().skip(anchor.start + anchor.len).cloned()),
                        ),
                    },
                    None => parent.with_child(self.site.index_in_parent()?, Arc::clone(rebuilt))?,
                };
                let collection_site = self.site.up(1)?;
                let owner = collection_site.parent()?;
                Some(Arc::new(owner.with_child(collection_site.index_in_parent()?, Arc::new(collection))?))
            }
            _ => None,
        }
    }

    /// Re-infers the enclosing element so the rebuilt value is checked against its context.
    fn check_host(&self, rebuilt: &Arc<Node>) -> Result<(), Violation> {
        let Some(host) = self.edited_host(rebuilt) else {
            return Ok(());
        };
        let Some(slot) = self.site.slot() else {
            return Ok(());
        };
        let host_site = self.site.up(if slot.index.is_some() { 2 } else { 1 });
        let inference = match &host_site {
            Some(s) => Inference::at_site(self.session.types(), s),
            None => Inference::new(self.session.types(), None),
        };
        if let Err(err) = inference.infer(&host) {
            let message = err.to_string();
            return Err(match slot.role {
                Role::Assigned | Role::Value | Role::Initializer => Violation::AssignmentSide(message),
                Role::Arguments => Violation::Arguments(message),
                Role::Condition => Violation::Condition(message),
                Role::Left | Role::Right | Role::Operand => Violation::Operand(message),
                Role::Target => Violation::MemberQualifier {
                    qualifier: rebuilt.ty().map(|t| t.to_string()).unwrap_or_default(),
                    member: message,
                },
                _ => Violation::Host(message),
            });
        }
        if matches!(slot.role, Role::Assigned) && !is_lvalue(rebuilt) {
            return Err(Violation::AssignmentSide(format!("{:?} is not assignable", rebuilt.tag())));
        }
        if slot.role == Role::Target {
            if let Some(member) = self.site.parent().and_then(|p| member_of(p)) {
                self.require_member(rebuilt, member)?;
            }
        }
        Ok(())
    }

    /// Every qualified member access inside the rebuilt fragment names a member of its qualifier.
    fn check_members(&self, rebuilt: &Arc<Node>) -> Result<(), Violation> {
        for node in preorder(rebuilt) {
            let (Some(target), Some(member)) = (node.present_child(Role::Target), member_of(&node)) else {
                continue;
            };
            if node.tag() == KindTag::FieldRead || node.tag() == KindTag::Invocation {
                self.require_member(target, member)?;
            }
        }
        Ok(())
    }

    fn require_member(&self, qualifier: &Node, member: &Reference) -> Result<(), Violation> {
        let Some(ty) = qualifier.ty() else {
            return Ok(());
        };
        let index = self.session.index();
        let owner = member.owner.as_deref().unwrap_or_default();
        let exposed = ty.to_string() == owner
            || match ty {
                JavaType::Class(class) => {
                    index.is_subtype(class, owner)
                        || (member.kind == KindTag::FieldRef && index.field(ty, &member.name).is_some())
                }
                JavaType::Array(_) => {
                    owner == "Object" || (member.kind == KindTag::FieldRef && index.field(ty, &member.name).is_some())
                }
                _ => false,
            };
        if exposed {
            Ok(())
        } else {
            Err(Violation::MemberQualifier {
                qualifier: ty.to_string(),
                member: member.canonical(),
            })
        }
    }

    /// Locals declared by the original but not by the rebuilt fragment must have no uses left.
    fn check_removed_declarations(&self, rebuilt: &Arc<Node>) -> Result<(), Violation> {
        let original = self.site.node();
        let removed: Vec<String> = {
            let kept = declared_locals(rebuilt);
            declared_locals(original).into_iter().filter(|n| !kept.contains(n)).collect()
        };
        if removed.is_empty() {
            return Ok(());
        }
        let scope = self
            .site
            .enclosing_routine()
            .map(|r| Arc::clone(r.node()))
            .unwrap_or_else(|| Arc::clone(self.site.root_node()));
        for name in removed {
            let everywhere = local_uses(&scope, &name);
            let inside = local_uses(original, &name);
            if everywhere != inside || local_uses(rebuilt, &name) > 0 {
                return Err(Violation::RemovedDeclaration(name));
            }
        }
        Ok(())
    }

    /// Every local or parameter the rebuilt fragment reads is declared earlier in an
    /// enclosing scope of the fragment, or visible at the site, with a compatible type.
    fn check_declared_uses(&self, rebuilt: &Arc<Node>) -> Result<(), Violation> {
        let mut scopes = vec![Vec::new()];
        self.walk_uses(rebuilt, &mut scopes)
    }

    fn walk_uses(&self, node: &Arc<Node>, scopes: &mut Vec<Vec<Declared>>) -> Result<(), Violation> {
        match &**node {
            Node::Reference(reference) if reference.is_variable() => self.check_use(reference, scopes),
            Node::Element { kind: KindTag::LocalVariable | KindTag::Parameter, .. } => {
                if let Some(init) = node.present_child(Role::Initializer) {
                    self.walk_uses(init, scopes)?;
                }
                if let (Some(name), Some(scope)) = (node.declared_name(), scopes.last_mut()) {
                    scope.push((name.to_string(), node.child(Role::Type).and_then(|t| t.ty()).cloned()));
                }
                Ok(())
            }
            Node::Element { kind: KindTag::ForEach, .. } => {
                scopes.push(Vec::new());
                let verdict = [Role::Iterable, Role::Variable, Role::Body]
                    .into_iter()
                    .filter_map(|role| node.present_child(role))
                    .try_for_each(|child| self.walk_uses(child, scopes));
                scopes.pop();
                verdict
            }
            Node::Element { kind, .. } if kind.opens_scope() => {
                scopes.push(Vec::new());
                let verdict = node.child_nodes().iter().try_for_each(|child| self.walk_uses(child, scopes));
                scopes.pop();
                verdict
            }
            _ => node.child_nodes().iter().try_for_each(|child| self.walk_uses(child, scopes)),
        }
    }

    fn check_use(&self, reference: &Reference, scopes: &[Vec<Declared>]) -> Result<(), Violation> {
        let inner = scopes.iter().rev().flat_map(|s| s.iter().rev()).find(|(name, _)| *name == reference.name);
        // locals and parameters substitute for each other, so the kind is not compared
        let declared = match inner {
            Some((_, ty)) => ty.clone(),
            None => match self.analyzer.visible_local(&reference.name) {
                Some(local) => local.ty.clone(),
                None => return Err(Violation::UndeclaredUse(reference.name.clone())),
            },
        };
        match (declared, &reference.ty) {
            (Some(declared), Some(used)) if !self.session.types().is_assignable(&declared, used) => {
                Err(Violation::LocalType {
                    name: reference.name.clone(),
                    declared,
                    used: used.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// A fragment ending the body of a value-returning routine must keep guaranteeing a return.
    fn check_final_return(&self, rebuilt: &Arc<Node>) -> Result<(), Violation> {
        let Some(routine) = self.site.enclosing_routine() else {
            return Ok(());
        };
        if matches!(self.return_type(), None | Some(JavaType::Void)) {
            return Ok(());
        }
        let Some(body) = routine.node().present_child(Role::Body) else {
            return Ok(());
        };
        if self.ends_body(body) && guarantees_return(self.site.node()) && !guarantees_return(rebuilt) {
            return Err(Violation::MissingReturn);
        }
        Ok(())
    }

    fn ends_body(&self, body: &Arc<Node>) -> bool {
        let node = self.site.node();
        if Arc::ptr_eq(node, body) {
            return true;
        }
        let Some(statements) = body.child(Role::Statements) else {
            return false;
        };
        let Some(parent) = self.site.parent() else {
            return false;
        };
        if !Arc::ptr_eq(parent, statements) {
            return false;
        }
        let len = statements.child_count();
        match (self.site.window(), self.site.index_in_parent()) {
            (Some(anchor), _) => anchor.start + anchor.len == len,
            (None, Some(index)) => index + 1 == len,
            _ => false,
        }
    }
}

/// A name declared inside the rebuilt fragment, with its declared type.
type Declared = (String, Option<JavaType>);

fn item_content(tag: KindTag) -> Content {
    match tag {
        KindTag::Statement => Content::Statement,
        KindTag::Expression => Content::Expression,
        tag => Content::Element(tag),
    }
}

fn is_lvalue(node: &Node) -> bool {
    matches!(
        node.tag(),
        KindTag::VariableRead | KindTag::FieldRead | KindTag::ArrayRead
    )
}

fn member_of(node: &Node) -> Option<&Reference> {
    match node.tag() {
        KindTag::FieldRead => node.child(Role::Field)?.as_reference(),
        KindTag::Invocation => node.child(Role::Executable)?.as_reference(),
        _ => None,
    }
}

fn declared_locals(node: &Arc<Node>) -> BTreeSet<String> {
    preorder(node)
        .into_iter()
        .filter(|n| n.tag() == KindTag::LocalVariable)
        .filter_map(|n| n.declared_name().map(str::to_string))
        .collect()
}

fn local_uses(node: &Node, name: &str) -> usize {
    node.references()
        .into_iter()
        .filter(|r| r.kind == KindTag::LocalVariableRef && r.name == name)
        .count()
}

/// Conservative: true only when every path provably ends in a return or throw.
pub fn guarantees_return(node: &Node) -> bool {
    match node.tag() {
        KindTag::Return | KindTag::Throw => true,
        KindTag::Block => node.child(Role::Statements).is_some_and(|s| guarantees_return(s)),
        KindTag::If => match (node.present_child(Role::Then), node.present_child(Role::Else)) {
            (Some(then), Some(otherwise)) => guarantees_return(then) && guarantees_return(otherwise),
            _ => false,
        },
        KindTag::Try => {
            let finally = node.present_child(Role::Finalizer).is_some_and(|f| guarantees_return(f));
            let body = node.child(Role::Body).is_some_and(|b| guarantees_return(b));
            let handlers = node.child(Role::Catchers).is_none_or(|c| {
                c.child_nodes()
                    .iter()
                    .all(|h| h.child(Role::Body).is_some_and(|b| guarantees_return(b)))
            });
            finally || (body && handlers)
        }
        KindTag::While => matches!(
            node.child(Role::Condition).and_then(|c| c.child(Role::Value)).and_then(|v| v.as_trait()),
            Some(TraitValue::Literal(Literal::Bool(true)))
        ),
        _ if node.is_collection() => node
            .child_nodes()
            .last()
            .is_some_and(|last| guarantees_return(last)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::ir::build::*;
    use crate::ir::node::{BinaryOp, Visibility};

    fn routine(ret_ty: JavaType, params: Vec<Node>, statements: Vec<Node>) -> Arc<Node> {
        Arc::new(unit(
            "p",
            vec![class(modifiers(Visibility::Public, false), "A", None, vec![method(
                modifiers(Visibility::Public, false),
                "f",
                ret_ty,
                params,
                Some(block(statements)),
            )])],
        ))
    }

    /// Types `rebuilt` at the first node matching `pick` and runs the gate.
    fn gate(root: &Arc<Node>, pick: impl Fn(&Node) -> bool, rebuilt: Node) -> Result<(), Violation> {
        let session = Session::from_units(&[], EngineConfig::default());
        let target = preorder(root).into_iter().find(|n| pick(n)).unwrap();
        let site = Site::locate(root, &target).unwrap();
        let typed = Inference::at_site(session.types(), &site).infer(&Arc::new(rebuilt)).unwrap();
        LegalityGate::new(&session, &site).check(&typed)
    }

    fn int_param(name: &str) -> Node {
        parameter(JavaType::int(), name)
    }

    #[test]
    fn test_compatible_replacement_passes() {
        let root = routine(JavaType::int(), vec![int_param("k")], vec![ret(Some(read_param("k", JavaType::int())))]);
        let rebuilt = ret(Some(binary(BinaryOp::Add, read_param("k", JavaType::int()), int(1))));
        assert_eq!(gate(&root, |n| n.tag() == KindTag::Return, rebuilt), Ok(()));
    }

    #[test]
    fn test_undeclared_variable_is_rejected() {
        let root = routine(JavaType::int(), vec![int_param("k")], vec![ret(Some(read_param("k", JavaType::int())))]);
        let rebuilt = ret(Some(read_local("z", JavaType::int())));
        assert_eq!(
            gate(&root, |n| n.tag() == KindTag::Return, rebuilt),
            Err(Violation::UndeclaredUse("z".to_string()))
        );
    }

    #[test]
    fn test_removed_declaration_still_in_use() {
        let root = routine(JavaType::int(), vec![], vec![
            local_var(JavaType::int(), "t", Some(int(1))),
            ret(Some(read_local("t", JavaType::int()))),
        ]);
        let rebuilt = local_var(JavaType::int(), "u", Some(int(1)));
        assert_eq!(
            gate(&root, |n| n.tag() == KindTag::LocalVariable, rebuilt),
            Err(Violation::RemovedDeclaration("t".to_string()))
        );
    }

    #[test]
    fn test_condition_must_stay_boolean() {
        let root = routine(JavaType::Void, vec![parameter(JavaType::boolean(), "b"), int_param("n")], vec![
            while_loop(read_param("b", JavaType::boolean()), block(vec![])),
        ]);
        let verdict = gate(&root, |n| n.tag() == KindTag::VariableRead, read_param("n", JavaType::int()));
        assert!(matches!(verdict, Err(Violation::Condition(_))), "{:?}", verdict);
    }

    #[test]
    fn test_final_return_must_survive() {
        let root = routine(JavaType::int(), vec![], vec![ret(Some(int(1)))]);
        assert_eq!(
            gate(&root, |n| n.tag() == KindTag::Return, block(vec![])),
            Err(Violation::MissingReturn)
        );
    }

    #[test]
    fn test_expression_cannot_replace_statement() {
        let root = routine(JavaType::int(), vec![int_param("k")], vec![ret(Some(read_param("k", JavaType::int())))]);
        let verdict = gate(&root, |n| n.tag() == KindTag::Return, read_param("k", JavaType::int()));
        assert_eq!(verdict, Err(Violation::Shape(KindTag::VariableRead)));
    }

    #[test]
    fn test_use_must_follow_declaration() {
        let root = routine(JavaType::int(), vec![], vec![
            local_var(JavaType::int(), "w", Some(int(1))),
            ret(Some(int(0))),
        ]);
        let is_decl = |n: &Node| n.tag() == KindTag::LocalVariable;
        let z = || read_local("z", JavaType::int());
        let declare = |name: &str, value: Node| local_var(JavaType::int(), name, Some(value));

        let ordered = block(vec![declare("z", int(1)), declare("t", z())]);
        assert_eq!(gate(&root, is_decl, ordered), Ok(()));
        let reversed = block(vec![declare("t", z()), declare("z", int(1))]);
        assert_eq!(gate(&root, is_decl, reversed), Err(Violation::UndeclaredUse("z".to_string())));
        let self_initialized = declare("z", binary(BinaryOp::Add, z(), int(1)));
        assert_eq!(gate(&root, is_decl, self_initialized), Err(Violation::UndeclaredUse("z".to_string())));
        let closed = block(vec![block(vec![declare("z", int(1))]), declare("t", z())]);
        assert_eq!(gate(&root, is_decl, closed), Err(Violation::UndeclaredUse("z".to_string())));
    }

    #[test]
    fn test_local_keeps_its_declared_type() {
        let root = routine(JavaType::int(), vec![], vec![
            local_var(JavaType::string(), "x", Some(string("s"))),
            ret(Some(int(0))),
        ]);
        let verdict = gate(&root, |n| n.tag() == KindTag::Return, ret(Some(read_local("x", JavaType::int()))));
        assert_eq!(
            verdict,
            Err(Violation::LocalType {
                name: "x".to_string(),
                declared: JavaType::string(),
                used: JavaType::int(),
            })
        );
    }

    #[test]
    fn test_qualifier_must_expose_the_member() {
        let ints = JavaType::array_of(JavaType::int());
        let params = vec![
            parameter(ints.clone(), "a"),
            parameter(ints.clone(), "c"),
            parameter(JavaType::string(), "s"),
        ];
        let length = field_read(Some(read_param("a", ints.clone())), "int[]", "length", JavaType::int());
        let root = routine(JavaType::int(), params, vec![ret(Some(length))]);
        let qualifier = |n: &Node| n.tag() == KindTag::VariableRead;
        assert_eq!(gate(&root, qualifier, read_param("c", ints)), Ok(()));
        let verdict = gate(&root, qualifier, read_param("s", JavaType::string()));
        assert!(
            matches!(&verdict, Err(Violation::MemberQualifier { qualifier, .. }) if qualifier == "String"),
            "{:?}",
            verdict
        );
    }

    #[test]
    fn test_arguments_must_fit_the_callee() {
        let f = || method_ref("A", "f", vec![JavaType::int()], JavaType::int());
        let root = routine(JavaType::int(), vec![int_param("k")], vec![ret(Some(call(None, f(), vec![
            read_param("k", JavaType::int()),
        ])))]);
        let argument = |n: &Node| n.tag() == KindTag::VariableRead;
        assert_eq!(gate(&root, argument, int(4)), Ok(()));
        let single = gate(&root, argument, boolean(true));
        assert!(matches!(single, Err(Violation::Arguments(_))), "{:?}", single);

        let list = |n: &Node| matches!(n, Node::Collection { elem: KindTag::Expression, .. });
        let two = collection(KindTag::Expression, vec![int(1), int(2)]);
        let whole = gate(&root, list, two);
        assert!(matches!(whole, Err(Violation::Arguments(_))), "{:?}", whole);
    }

    #[test]
    fn test_assignment_sides() {
        let root = routine(JavaType::Void, vec![int_param("k")], vec![
            local_var(JavaType::int(), "t", Some(int(0))),
            assign(read_local("t", JavaType::int()), read_param("k", JavaType::int())),
        ]);
        let assigned = |n: &Node| n.tag() == KindTag::VariableRead;
        let value = |n: &Node| n.tag() == KindTag::VariableRead && n.to_string() == "k";
        let literal = gate(&root, assigned, int(5));
        assert!(matches!(literal, Err(Violation::AssignmentSide(_))), "{:?}", literal);
        let mismatched = gate(&root, value, boolean(true));
        assert!(matches!(mismatched, Err(Violation::AssignmentSide(_))), "{:?}", mismatched);
        assert_eq!(gate(&root, value, int(5)), Ok(()));
    }

    #[test]
    fn test_guarantees_return() {
        assert!(guarantees_return(&ret(None)));
        assert!(guarantees_return(&block(vec![brk(), throw(null())])));
        assert!(!guarantees_return(&if_then(boolean(true), ret(None), None)));
        assert!(guarantees_return(&if_then(boolean(true), ret(None), Some(ret(None)))));
        assert!(guarantees_return(&while_loop(boolean(true), block(vec![]))));
        assert!(!guarantees_return(&while_loop(boolean(false), block(vec![]))));
    }
}
