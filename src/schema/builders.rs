//! Per-kind element builders used by rebuild.
//!
//! Each fixed element kind has exactly one builder. Children are first checked
//! against the kind's role contents, then the builder adds the kind's own
//! constraints (lvalues, operator families, handler presence).

use std::sync::Arc;

use crate::errors::EngineError;
use crate::ir::kind::{Content, KindTag, OpFamily, Role};
use crate::ir::node::{Node, NodeVector, TraitValue, node_vector};

/// Kind-specific check run after role-content validation.
type Builder = fn(&[Arc<Node>]) -> bool;

/// True if `node` satisfies `content`.
pub fn fits(content: Content, node: &Node) -> bool {
    match content {
        Content::Statement => node.is_statement(),
        Content::OptionalStatement => node.is_absent() || node.is_statement(),
        Content::Expression => node.is_expression(),
        Content::OptionalExpression => node.is_absent() || node.is_expression(),
        Content::Element(tag) => is_element_of(tag, node),
        Content::OptionalElement(tag) => node.is_absent() || is_element_of(tag, node),
        Content::Collection(tag) => match node {
            Node::Collection { items, .. } => fits_items(tag, items),
            _ => false,
        },
        Content::Reference(tag) => is_reference_of(tag, node),
        Content::OptionalReference(tag) => node.is_absent() || is_reference_of(tag, node),
        Content::Trait(tag) => matches!(node, Node::Trait(value) if value.tag() == tag),
        Content::Any => true,
    }
}

fn is_element_of(tag: KindTag, node: &Node) -> bool {
    matches!(node, Node::Element { kind, .. } if tag.is_super_or_equal(*kind))
}

fn is_reference_of(tag: KindTag, node: &Node) -> bool {
    matches!(node, Node::Reference(r) if tag.is_super_or_equal(r.kind))
}

/// Every item fits the collection's element kind.
pub fn fits_items(elem: KindTag, items: &NodeVector) -> bool {
    items.iter().all(|item| match elem {
        KindTag::Statement => item.is_statement(),
        KindTag::Expression => item.is_expression(),
        tag => is_element_of(tag, item),
    })
}

/// Builds an element of `kind` from rebuilt children.
///
/// Declarations are never rewrite targets and yield `UnsupportedRebuild`; a
/// child list that does not match the kind's roles yields `ArityMismatch`.
/// `Ok(None)` means the children are well counted but malformed.
pub fn build(kind: KindTag, children: Vec<Arc<Node>>) -> Result<Option<Node>, EngineError> {
    let builder = builder_for(kind).ok_or(EngineError::UnsupportedRebuild(kind))?;
    let expected = kind.roles().len();
    if children.len() != expected {
        return Err(EngineError::ArityMismatch {
            kind,
            expected,
            found: children.len(),
        });
    }
    let ok = kind
        .roles()
        .iter()
        .zip(&children)
        .all(|(role, child)| fits(kind.content(*role), child))
        && builder(&children);
    Ok(ok.then(|| Node::element(kind, children)))
}

/// Builds a collection, checking every item against `elem`.
pub fn build_collection(elem: KindTag, items: Vec<Arc<Node>>) -> Option<Node> {
    let items = node_vector(items);
    fits_items(elem, &items).then_some(Node::Collection { elem, items })
}

fn builder_for(kind: KindTag) -> Option<Builder> {
    let builder: Builder = match kind {
        KindTag::Block
        | KindTag::If
        | KindTag::While
        | KindTag::DoWhile
        | KindTag::For
        | KindTag::Return
        | KindTag::Throw
        | KindTag::LocalVariable
        | KindTag::Break
        | KindTag::Continue
        | KindTag::Catch
        | KindTag::Invocation
        | KindTag::Literal
        | KindTag::VariableRead
        | KindTag::FieldRead
        | KindTag::ArrayRead
        | KindTag::Conditional
        | KindTag::Cast
        | KindTag::ThisAccess
        | KindTag::TypeAccess => roles_only,
        KindTag::ForEach => for_each_header,
        KindTag::Try => try_with_handler,
        KindTag::ConstructorCall => constructor_call,
        KindTag::Assignment => assignment,
        KindTag::OperatorAssignment => operator_assignment,
        KindTag::BinaryOperator => binary_operator,
        KindTag::UnaryOperator => unary_operator,
        _ => return None,
    };
    Some(builder)
}

fn roles_only(_: &[Arc<Node>]) -> bool {
    true
}

fn is_lvalue(node: &Node) -> bool {
    matches!(
        node.tag(),
        KindTag::VariableRead | KindTag::FieldRead | KindTag::ArrayRead
    )
}

fn at(kind: KindTag, children: &[Arc<Node>], role: Role) -> Option<&Arc<Node>> {
    kind.role_index(role).and_then(|i| children.get(i))
}

fn for_each_header(children: &[Arc<Node>]) -> bool {
    // the loop variable declares, it never initializes
    at(KindTag::ForEach, children, Role::Variable).is_some_and(|v| v.present_child(Role::Initializer).is_none())
}

fn try_with_handler(children: &[Arc<Node>]) -> bool {
    let catchers = at(KindTag::Try, children, Role::Catchers).map_or(0, |c| c.child_count());
    let finalizer = at(KindTag::Try, children, Role::Finalizer).is_some_and(|f| !f.is_absent());
    catchers > 0 || finalizer
}

fn constructor_call(children: &[Arc<Node>]) -> bool {
    at(KindTag::ConstructorCall, children, Role::Executable)
        .and_then(|e| e.as_reference())
        .is_some_and(|r| r.is_constructor())
}

fn assignment(children: &[Arc<Node>]) -> bool {
    at(KindTag::Assignment, children, Role::Assigned).is_some_and(|a| is_lvalue(a))
}

fn operator_assignment(children: &[Arc<Node>]) -> bool {
    let compound = matches!(
        at(KindTag::OperatorAssignment, children, Role::Operator).and_then(|o| o.as_trait()),
        Some(TraitValue::BinaryOp(op))
            if matches!(op.family(), OpFamily::Arithmetic | OpFamily::Bitwise | OpFamily::Shift)
    );
    compound && at(KindTag::OperatorAssignment, children, Role::Assigned).is_some_and(|a| is_lvalue(a))
}

fn binary_operator(children: &[Arc<Node>]) -> bool {
    matches!(
        at(KindTag::BinaryOperator, children, Role::Operator).and_then(|o| o.as_trait()),
        Some(TraitValue::BinaryOp(_))
    )
}

fn unary_operator(children: &[Arc<Node>]) -> bool {
    match at(KindTag::UnaryOperator, children, Role::Operator).and_then(|o| o.as_trait()) {
        Some(TraitValue::UnaryOp(op)) if op.family() == OpFamily::Increment => {
            at(KindTag::UnaryOperator, children, Role::Operand).is_some_and(|o| is_lvalue(o))
        }
        Some(TraitValue::UnaryOp(_)) => true,
        _ => false,
    }
}
