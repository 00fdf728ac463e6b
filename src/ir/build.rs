//! Construction helpers for AST providers and tests.
//!
//! Everything returns an untyped [`Node`]; run [`crate::schema::inference::attribute`]
//! over a compilation unit to annotate expression types. References carry their
//! declared types from construction.

use std::sync::Arc;

use super::kind::KindTag;
use super::node::{BinaryOp, Literal, Modifiers, Node, Reference, TraitValue, UnaryOp, Visibility, node_vector};
use super::types::JavaType;

fn el(kind: KindTag, children: Vec<Node>) -> Node {
    Node::element(kind, children.into_iter().map(Arc::new).collect())
}

fn opt(node: Option<Node>) -> Node {
    node.unwrap_or(Node::Trait(TraitValue::Absent))
}

pub fn collection(elem: KindTag, items: Vec<Node>) -> Node {
    Node::Collection {
        elem,
        items: node_vector(items.into_iter().map(Arc::new)),
    }
}

pub fn name(text: &str) -> Node {
    Node::Trait(TraitValue::Name(text.to_string()))
}

pub fn modifiers(visibility: Visibility, is_static: bool) -> Node {
    Node::Trait(TraitValue::Modifiers(Modifiers {
        visibility,
        is_static,
        is_final: false,
    }))
}

// ---- literals ----

pub fn lit(value: Literal) -> Node {
    el(KindTag::Literal, vec![Node::Trait(TraitValue::Literal(value))])
}

pub fn int(value: i32) -> Node {
    lit(Literal::Int(value))
}

pub fn long(value: i64) -> Node {
    lit(Literal::Long(value))
}

pub fn double(text: &str) -> Node {
    lit(Literal::Double(text.to_string()))
}

pub fn boolean(value: bool) -> Node {
    lit(Literal::Bool(value))
}

pub fn string(value: &str) -> Node {
    lit(Literal::Str(value.to_string()))
}

pub fn null() -> Node {
    lit(Literal::Null)
}

// ---- references ----

fn reference(kind: KindTag, name: &str, owner: Option<&str>, ty: Option<JavaType>) -> Reference {
    Reference {
        kind,
        name: name.to_string(),
        owner: owner.map(str::to_string),
        ty,
        params: Vec::new(),
        varargs: false,
    }
}

pub fn local_ref(name: &str, ty: JavaType) -> Node {
    Node::Reference(reference(KindTag::LocalVariableRef, name, None, Some(ty)))
}

pub fn param_ref(name: &str, ty: JavaType) -> Node {
    Node::Reference(reference(KindTag::ParameterRef, name, None, Some(ty)))
}

pub fn field_ref(owner: &str, name: &str, ty: JavaType) -> Node {
    Node::Reference(reference(KindTag::FieldRef, name, Some(owner), Some(ty)))
}

pub fn method_ref(owner: &str, name: &str, params: Vec<JavaType>, ret: JavaType) -> Node {
    let mut r = reference(KindTag::ExecutableRef, name, Some(owner), Some(ret));
    r.params = params;
    Node::Reference(r)
}

/// Executable whose last parameter is variadic; `params` lists the array type last.
pub fn varargs_method_ref(owner: &str, name: &str, params: Vec<JavaType>, ret: JavaType) -> Node {
    let mut r = reference(KindTag::ExecutableRef, name, Some(owner), Some(ret));
    r.params = params;
    r.varargs = true;
    Node::Reference(r)
}

pub fn ctor_ref(owner: &str, params: Vec<JavaType>) -> Node {
    let mut r = reference(KindTag::ExecutableRef, "<init>", Some(owner), Some(JavaType::class(owner)));
    r.params = params;
    Node::Reference(r)
}

pub fn type_ref(ty: JavaType) -> Node {
    Node::Reference(reference(KindTag::TypeRef, &ty.to_string(), None, Some(ty)))
}

// ---- expressions ----

pub fn read(variable: Node) -> Node {
    el(KindTag::VariableRead, vec![variable])
}

pub fn read_local(name: &str, ty: JavaType) -> Node {
    read(local_ref(name, ty))
}

pub fn read_param(name: &str, ty: JavaType) -> Node {
    read(param_ref(name, ty))
}

pub fn field_read(target: Option<Node>, owner: &str, name: &str, ty: JavaType) -> Node {
    el(KindTag::FieldRead, vec![opt(target), field_ref(owner, name, ty)])
}

pub fn array_read(target: Node, index: Node) -> Node {
    el(KindTag::ArrayRead, vec![target, index])
}

pub fn binary(op: BinaryOp, left: Node, right: Node) -> Node {
    el(KindTag::BinaryOperator, vec![Node::Trait(TraitValue::BinaryOp(op)), left, right])
}

pub fn unary(op: UnaryOp, operand: Node) -> Node {
    el(KindTag::UnaryOperator, vec![Node::Trait(TraitValue::UnaryOp(op)), operand])
}

pub fn call(target: Option<Node>, executable: Node, args: Vec<Node>) -> Node {
    el(
        KindTag::Invocation,
        vec![opt(target), executable, collection(KindTag::Expression, args)],
    )
}

pub fn new_object(executable: Node, args: Vec<Node>) -> Node {
    el(KindTag::ConstructorCall, vec![executable, collection(KindTag::Expression, args)])
}

pub fn assign(assigned: Node, value: Node) -> Node {
    el(KindTag::Assignment, vec![assigned, value])
}

pub fn op_assign(op: BinaryOp, assigned: Node, value: Node) -> Node {
    el(
        KindTag::OperatorAssignment,
        vec![Node::Trait(TraitValue::BinaryOp(op)), assigned, value],
    )
}

pub fn conditional(condition: Node, then: Node, otherwise: Node) -> Node {
    el(KindTag::Conditional, vec![condition, then, otherwise])
}

pub fn cast(ty: JavaType, expression: Node) -> Node {
    el(KindTag::Cast, vec![type_ref(ty), expression])
}

pub fn this() -> Node {
    el(KindTag::ThisAccess, vec![])
}

pub fn type_access(ty: JavaType) -> Node {
    el(KindTag::TypeAccess, vec![type_ref(ty)])
}

// ---- statements ----

pub fn block(statements: Vec<Node>) -> Node {
    el(KindTag::Block, vec![collection(KindTag::Statement, statements)])
}

pub fn if_then(condition: Node, then: Node, otherwise: Option<Node>) -> Node {
    el(KindTag::If, vec![condition, then, opt(otherwise)])
}

pub fn while_loop(condition: Node, body: Node) -> Node {
    el(KindTag::While, vec![condition, body])
}

pub fn do_while(body: Node, condition: Node) -> Node {
    el(KindTag::DoWhile, vec![body, condition])
}

pub fn for_loop(init: Vec<Node>, condition: Option<Node>, update: Vec<Node>, body: Node) -> Node {
    el(
        KindTag::For,
        vec![
            collection(KindTag::Statement, init),
            opt(condition),
            collection(KindTag::Statement, update),
            body,
        ],
    )
}

pub fn for_each(variable: Node, iterable: Node, body: Node) -> Node {
    el(KindTag::ForEach, vec![variable, iterable, body])
}

pub fn ret(expression: Option<Node>) -> Node {
    el(KindTag::Return, vec![opt(expression)])
}

pub fn throw(expression: Node) -> Node {
    el(KindTag::Throw, vec![expression])
}

pub fn local_var(ty: JavaType, name_text: &str, initializer: Option<Node>) -> Node {
    el(KindTag::LocalVariable, vec![type_ref(ty), name(name_text), opt(initializer)])
}

pub fn brk() -> Node {
    el(KindTag::Break, vec![])
}

pub fn cont() -> Node {
    el(KindTag::Continue, vec![])
}

pub fn try_catch(body: Node, catchers: Vec<Node>, finalizer: Option<Node>) -> Node {
    el(
        KindTag::Try,
        vec![body, collection(KindTag::Catch, catchers), opt(finalizer)],
    )
}

pub fn catch(parameter: Node, body: Node) -> Node {
    el(KindTag::Catch, vec![parameter, body])
}

// ---- declarations ----

pub fn parameter(ty: JavaType, name_text: &str) -> Node {
    el(KindTag::Parameter, vec![type_ref(ty), name(name_text)])
}

pub fn method(mods: Node, name_text: &str, ret: JavaType, params: Vec<Node>, body: Option<Node>) -> Node {
    el(
        KindTag::Method,
        vec![
            mods,
            name(name_text),
            type_ref(ret),
            collection(KindTag::Parameter, params),
            opt(body),
        ],
    )
}

pub fn constructor(mods: Node, params: Vec<Node>, body: Node) -> Node {
    el(
        KindTag::Constructor,
        vec![mods, collection(KindTag::Parameter, params), body],
    )
}

pub fn field(mods: Node, ty: JavaType, name_text: &str, initializer: Option<Node>) -> Node {
    el(KindTag::Field, vec![mods, type_ref(ty), name(name_text), opt(initializer)])
}

pub fn class(mods: Node, name_text: &str, superclass: Option<JavaType>, members: Vec<Node>) -> Node {
    el(
        KindTag::Class,
        vec![
            mods,
            name(name_text),
            opt(superclass.map(type_ref)),
            collection(KindTag::Declaration, members),
        ],
    )
}

pub fn unit(package: &str, classes: Vec<Node>) -> Node {
    el(
        KindTag::CompilationUnit,
        vec![name(package), collection(KindTag::Class, classes)],
    )
}
