//! Bottom-up static type re-inference.
//!
//! Inference is functional: it returns a new tree whose expression elements
//! carry their computed type, sharing every subtree whose annotation did not
//! change. Statement-level constraints (boolean conditions, initializer and
//! argument compatibility, throwable operands) are checked on the way up.

use std::sync::Arc;

use tracing::trace;

use crate::errors::TypeError;
use crate::ir::kind::{KindTag, Role};
use crate::ir::node::{BinaryOp, Node, Reference, TraitValue, UnaryOp, node_vector};
use crate::ir::site::Site;
use crate::ir::types::{JavaType, TypeSystem};

/// Type annotation pass over one fragment or unit.
#[derive(Debug, Clone)]
pub struct Inference<'a> {
    types: &'a TypeSystem,
    this_type: Option<JavaType>,
}

impl<'a> Inference<'a> {
    pub fn new(types: &'a TypeSystem, this_type: Option<JavaType>) -> Self {
        Inference { types, this_type }
    }

    /// Inference for a fragment located at `site`; `this` is the enclosing class.
    pub fn at_site(types: &'a TypeSystem, site: &Site) -> Self {
        let this_type = site
            .enclosing(|n| n.tag() == KindTag::Class)
            .and_then(|class| class.node().declared_name().map(JavaType::class));
        Inference::new(types, this_type)
    }

    pub fn infer(&self, node: &Arc<Node>) -> Result<Arc<Node>, TypeError> {
        match &**node {
            Node::Element { kind, children, ty } => {
                let scoped;
                let inner = if *kind == KindTag::Class {
                    scoped = Inference::new(self.types, node.declared_name().map(JavaType::class));
                    &scoped
                } else {
                    self
                };
                let new_children = children
                    .iter()
                    .map(|c| inner.infer(c))
                    .collect::<Result<Vec<_>, _>>()?;
                let computed = self.type_of(*kind, &new_children)?;
                let unchanged = new_children.iter().zip(children).all(|(n, o)| Arc::ptr_eq(n, o));
                if unchanged && computed == *ty {
                    Ok(Arc::clone(node))
                } else {
                    Ok(Arc::new(Node::Element {
                        kind: *kind,
                        children: new_children,
                        ty: computed,
                    }))
                }
            }
            Node::Collection { elem, items } => {
                let new_items = items.iter().map(|c| self.infer(c)).collect::<Result<Vec<_>, _>>()?;
                if new_items.iter().zip(items.iter()).all(|(n, o)| Arc::ptr_eq(n, o)) {
                    Ok(Arc::clone(node))
                } else {
                    Ok(Arc::new(Node::Collection {
                        elem: *elem,
                        items: node_vector(new_items),
                    }))
                }
            }
            Node::Trait(_) | Node::Reference(_) => Ok(Arc::clone(node)),
        }
    }

    /// Computed type of an element from its already-inferred children; `None` for statements
    /// and declarations.
    fn type_of(&self, kind: KindTag, children: &[Arc<Node>]) -> Result<Option<JavaType>, TypeError> {
        let get = |role: Role| kind.role_index(role).and_then(|i| children.get(i)).filter(|c| !c.is_absent());
        let need = |role: Role| get(role).ok_or_else(|| TypeError::new(kind, format!("missing {:?}", role)));
        let ty = match kind {
            KindTag::Literal => match need(Role::Value)?.as_trait() {
                Some(TraitValue::Literal(literal)) => literal.ty(),
                _ => return Err(TypeError::new(kind, "literal without a value")),
            },
            KindTag::VariableRead => declared(kind, need(Role::Variable)?)?,
            KindTag::FieldRead => {
                if let Some(target) = get(Role::Target) {
                    self.dereferenceable(kind, target)?;
                }
                declared(kind, need(Role::Field)?)?
            }
            KindTag::ArrayRead => {
                let target = typed(kind, need(Role::Target)?)?;
                let index = typed(kind, need(Role::Index)?)?;
                if JavaType::promote_unary(&index) != Some(JavaType::int()) {
                    return Err(TypeError::new(kind, format!("array index of type {}", index)));
                }
                target
                    .element_type()
                    .cloned()
                    .ok_or_else(|| TypeError::new(kind, format!("indexing non-array {}", target)))?
            }
            KindTag::Invocation => {
                if let Some(target) = get(Role::Target) {
                    self.dereferenceable(kind, target)?;
                }
                let executable = reference(kind, need(Role::Executable)?)?;
                self.check_arguments(kind, executable, need(Role::Arguments)?)?;
                executable.ty.clone().unwrap_or(JavaType::Void)
            }
            KindTag::ConstructorCall => {
                let executable = reference(kind, need(Role::Executable)?)?;
                self.check_arguments(kind, executable, need(Role::Arguments)?)?;
                let owner = executable
                    .owner
                    .as_deref()
                    .ok_or_else(|| TypeError::new(kind, "constructor without owner"))?;
                JavaType::class(owner)
            }
            KindTag::Assignment => {
                let assigned = typed(kind, need(Role::Assigned)?)?;
                let value = typed(kind, need(Role::Value)?)?;
                self.require_assignable(kind, &value, &assigned)?;
                assigned
            }
            KindTag::OperatorAssignment => {
                let op = binary_op(kind, need(Role::Operator)?)?;
                let assigned = typed(kind, need(Role::Assigned)?)?;
                let value = typed(kind, need(Role::Value)?)?;
                let ok = (op == BinaryOp::Add && assigned.is_string())
                    || binary_result(op, &assigned, &value).is_some_and(|r| r.is_numeric() || r.is_boolean());
                if !ok {
                    return Err(TypeError::new(kind, format!("{}= on {} and {}", op.symbol(), assigned, value)));
                }
                assigned
            }
            KindTag::BinaryOperator => {
                let op = binary_op(kind, need(Role::Operator)?)?;
                let left = typed(kind, need(Role::Left)?)?;
                let right = typed(kind, need(Role::Right)?)?;
                self.binary_type(op, &left, &right).ok_or_else(|| {
                    TypeError::new(kind, format!("operator {} on {} and {}", op.symbol(), left, right))
                })?
            }
            KindTag::UnaryOperator => {
                let op = match need(Role::Operator)?.as_trait() {
                    Some(TraitValue::UnaryOp(op)) => *op,
                    _ => return Err(TypeError::new(kind, "unary operator without operator")),
                };
                let operand = typed(kind, need(Role::Operand)?)?;
                unary_result(op, &operand)
                    .ok_or_else(|| TypeError::new(kind, format!("operator {} on {}", op.symbol(), operand)))?
            }
            KindTag::Conditional => {
                self.require_boolean(kind, need(Role::Condition)?)?;
                let then = typed(kind, need(Role::Then)?)?;
                let otherwise = typed(kind, need(Role::Else)?)?;
                self.conditional_type(&then, &otherwise).ok_or_else(|| {
                    TypeError::new(kind, format!("incompatible branches {} and {}", then, otherwise))
                })?
            }
            KindTag::Cast => {
                let target = declared(kind, need(Role::Type)?)?;
                let operand = typed(kind, need(Role::Expression)?)?;
                if !self.types.is_castable(&operand, &target) {
                    return Err(TypeError::new(kind, format!("cannot cast {} to {}", operand, target)));
                }
                target
            }
            KindTag::ThisAccess => self
                .this_type
                .clone()
                .ok_or_else(|| TypeError::new(kind, "`this` outside a class"))?,
            KindTag::TypeAccess => declared(kind, need(Role::Type)?)?,
            _ => {
                self.check_statement(kind, &get)?;
                return Ok(None);
            }
        };
        trace!("inferred {:?}: {}", kind, ty);
        Ok(Some(ty))
    }

    fn check_statement<'n>(
        &self,
        kind: KindTag,
        get: &impl Fn(Role) -> Option<&'n Arc<Node>>,
    ) -> Result<(), TypeError> {
        match kind {
            KindTag::If | KindTag::While | KindTag::DoWhile | KindTag::For => {
                if let Some(condition) = get(Role::Condition) {
                    self.require_boolean(kind, condition)?;
                }
            }
            KindTag::ForEach => {
                let iterable = get(Role::Iterable)
                    .ok_or_else(|| TypeError::new(kind, "missing iterable"))
                    .and_then(|i| typed(kind, i))?;
                let variable_ty = get(Role::Variable)
                    .and_then(|v| v.child(Role::Type))
                    .and_then(|t| t.ty())
                    .cloned();
                match (&iterable, variable_ty) {
                    (JavaType::Array(elem), Some(var)) => self.require_assignable(kind, elem, &var)?,
                    (JavaType::Class(_), _) | (JavaType::Array(_), None) => {}
                    _ => return Err(TypeError::new(kind, format!("cannot iterate {}", iterable))),
                }
            }
            KindTag::LocalVariable | KindTag::Field => {
                if let Some(init) = get(Role::Initializer) {
                    let declared_ty = get(Role::Type)
                        .ok_or_else(|| TypeError::new(kind, "missing declared type"))
                        .and_then(|t| declared(kind, t))?;
                    let value = typed(kind, init)?;
                    self.require_assignable(kind, &value, &declared_ty)?;
                }
            }
            KindTag::Throw => {
                let thrown = get(Role::Expression)
                    .ok_or_else(|| TypeError::new(kind, "missing thrown value"))
                    .and_then(|e| typed(kind, e))?;
                self.require_assignable(kind, &thrown, &JavaType::class("Throwable"))?;
            }
            _ => {}
        }
        Ok(())
    }

    fn dereferenceable(&self, kind: KindTag, target: &Node) -> Result<(), TypeError> {
        let ty = typed(kind, target)?;
        if ty.is_reference() && ty != JavaType::Null {
            Ok(())
        } else {
            Err(TypeError::new(kind, format!("cannot dereference {}", ty)))
        }
    }

    fn require_boolean(&self, kind: KindTag, node: &Node) -> Result<(), TypeError> {
        let ty = typed(kind, node)?;
        if ty.is_boolean() {
            Ok(())
        } else {
            Err(TypeError::new(kind, format!("condition of type {}", ty)))
        }
    }

    fn require_assignable(&self, kind: KindTag, from: &JavaType, to: &JavaType) -> Result<(), TypeError> {
        if self.types.is_assignable(from, to) {
            Ok(())
        } else {
            Err(TypeError::new(kind, format!("{} is not assignable to {}", from, to)))
        }
    }

    fn check_arguments(&self, kind: KindTag, executable: &Reference, args: &Node) -> Result<(), TypeError> {
        let types = args
            .child_nodes()
            .iter()
            .map(|a| typed(kind, a))
            .collect::<Result<Vec<_>, _>>()?;
        if accepts_arguments(self.types, executable, &types) {
            Ok(())
        } else {
            Err(TypeError::new(
                kind,
                format!("{} does not accept {} arguments as given", executable.canonical(), types.len()),
            ))
        }
    }

    fn binary_type(&self, op: BinaryOp, left: &JavaType, right: &JavaType) -> Option<JavaType> {
        match op {
            BinaryOp::Eq | BinaryOp::Ne => {
                let comparable = (left.is_numeric() && right.is_numeric())
                    || (left.is_boolean() && right.is_boolean())
                    || (left.is_reference() && right.is_reference() && self.types.is_castable(left, right));
                comparable.then(JavaType::boolean)
            }
            _ => binary_result(op, left, right),
        }
    }

    fn conditional_type(&self, then: &JavaType, otherwise: &JavaType) -> Option<JavaType> {
        if then == otherwise {
            return Some(then.clone());
        }
        if then.is_numeric() && otherwise.is_numeric() {
            return JavaType::promote(then, otherwise);
        }
        if then.is_boolean() && otherwise.is_boolean() {
            return Some(JavaType::boolean());
        }
        match (then, otherwise) {
            (JavaType::Null, other) | (other, JavaType::Null) if other.is_reference() => Some(other.clone()),
            _ if self.types.is_assignable(then, otherwise) => Some(otherwise.clone()),
            _ if self.types.is_assignable(otherwise, then) => Some(then.clone()),
            _ => None,
        }
    }
}

/// Type of a binary operator over operand types, equality excluded.
fn binary_result(op: BinaryOp, left: &JavaType, right: &JavaType) -> Option<JavaType> {
    use crate::ir::kind::OpFamily;
    match op.family() {
        OpFamily::Arithmetic if op == BinaryOp::Add && (left.is_string() || right.is_string()) => {
            (*left != JavaType::Void && *right != JavaType::Void).then(JavaType::string)
        }
        OpFamily::Arithmetic => JavaType::promote(left, right),
        OpFamily::Relational => JavaType::promote(left, right).map(|_| JavaType::boolean()),
        OpFamily::Logical => (left.is_boolean() && right.is_boolean()).then(JavaType::boolean),
        OpFamily::Bitwise if left.is_boolean() && right.is_boolean() => Some(JavaType::boolean()),
        OpFamily::Bitwise => {
            (left.is_integral() && right.is_integral()).then(|| JavaType::promote(left, right)).flatten()
        }
        OpFamily::Shift => {
            (left.is_integral() && right.is_integral()).then(|| JavaType::promote_unary(left)).flatten()
        }
        OpFamily::Equality => (left.is_numeric() && right.is_numeric()).then(JavaType::boolean),
        OpFamily::Increment | OpFamily::Negation => None,
    }
}

fn unary_result(op: UnaryOp, operand: &JavaType) -> Option<JavaType> {
    match op {
        UnaryOp::Neg | UnaryOp::Pos => JavaType::promote_unary(operand),
        UnaryOp::BitNot => operand.is_integral().then(|| JavaType::promote_unary(operand)).flatten(),
        UnaryOp::Not => operand.is_boolean().then(JavaType::boolean),
        UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
            operand.is_numeric().then(|| operand.clone())
        }
    }
}

/// Whether `executable` accepts arguments of the given types, varargs included.
pub fn accepts_arguments(types: &TypeSystem, executable: &Reference, args: &[JavaType]) -> bool {
    let params = &executable.params;
    if !executable.varargs || params.is_empty() {
        return params.len() == args.len() && args.iter().zip(params).all(|(a, p)| types.is_assignable(a, p));
    }
    let fixed = params.len() - 1;
    if args.len() < fixed || !args.iter().zip(&params[..fixed]).all(|(a, p)| types.is_assignable(a, p)) {
        return false;
    }
    let last = &params[fixed];
    if args.len() == params.len() && types.is_assignable(&args[fixed], last) {
        return true;
    }
    let Some(elem) = last.element_type() else {
        return false;
    };
    args[fixed..].iter().all(|a| types.is_assignable(a, elem))
}

fn typed(kind: KindTag, node: &Node) -> Result<JavaType, TypeError> {
    node.ty()
        .cloned()
        .ok_or_else(|| TypeError::new(kind, format!("untyped {:?} operand", node.tag())))
}

fn reference(kind: KindTag, node: &Node) -> Result<&Reference, TypeError> {
    node.as_reference()
        .ok_or_else(|| TypeError::new(kind, format!("expected a reference, found {:?}", node.tag())))
}

fn declared(kind: KindTag, node: &Node) -> Result<JavaType, TypeError> {
    let reference = reference(kind, node)?;
    reference
        .ty
        .clone()
        .ok_or_else(|| TypeError::new(kind, format!("{} has no declared type", reference.canonical())))
}

fn binary_op(kind: KindTag, node: &Node) -> Result<BinaryOp, TypeError> {
    match node.as_trait() {
        Some(TraitValue::BinaryOp(op)) => Ok(*op),
        _ => Err(TypeError::new(kind, "expected a binary operator")),
    }
}

/// Annotates every expression of a whole tree, usually a compilation unit.
pub fn attribute(node: &Arc<Node>, types: &TypeSystem) -> Result<Arc<Node>, TypeError> {
    Inference::new(types, None).infer(node)
}
