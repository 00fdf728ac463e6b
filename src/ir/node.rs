use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use archery::ArcK;
use rpds::Vector;
use rustc_hash::FxHasher;
use serde::Serialize;

use super::kind::{KindSig, KindTag, OpFamily, Role};
use super::types::JavaType;

pub type NodeVector = Vector<Arc<Node>, ArcK>;

/// Collects nodes into a persistent vector.
pub fn node_vector(items: impl IntoIterator<Item = Arc<Node>>) -> NodeVector {
    items.into_iter().collect::<Vector<_, ArcK>>()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
}

impl BinaryOp {
    pub fn family(self) -> OpFamily {
        match self {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => OpFamily::Arithmetic,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => OpFamily::Relational,
            BinaryOp::Eq | BinaryOp::Ne => OpFamily::Equality,
            BinaryOp::And | BinaryOp::Or => OpFamily::Logical,
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => OpFamily::Bitwise,
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => OpFamily::Shift,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl UnaryOp {
    pub fn family(self) -> OpFamily {
        match self {
            UnaryOp::Neg | UnaryOp::Pos => OpFamily::Arithmetic,
            UnaryOp::Not => OpFamily::Logical,
            UnaryOp::BitNot => OpFamily::Bitwise,
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => OpFamily::Increment,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::PreInc | UnaryOp::PostInc => "++",
            UnaryOp::PreDec | UnaryOp::PostDec => "--",
        }
    }

    pub fn is_postfix(self) -> bool {
        matches!(self, UnaryOp::PostInc | UnaryOp::PostDec)
    }
}

/// Literal constants. Floating values keep their source text so they stay `Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Literal {
    Int(i32),
    Long(i64),
    Double(String),
    Bool(bool),
    Char(char),
    Str(String),
    Null,
}

impl Literal {
    pub fn ty(&self) -> JavaType {
        match self {
            Literal::Int(_) => JavaType::int(),
            Literal::Long(_) => JavaType::parse("long"),
            Literal::Double(_) => JavaType::parse("double"),
            Literal::Bool(_) => JavaType::boolean(),
            Literal::Char(_) => JavaType::parse("char"),
            Literal::Str(_) => JavaType::string(),
            Literal::Null => JavaType::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Default)]
pub enum Visibility {
    Private,
    #[default]
    Package,
    Protected,
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub struct Modifiers {
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
}

/// Opaque value-equality leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum TraitValue {
    BinaryOp(BinaryOp),
    UnaryOp(UnaryOp),
    Literal(Literal),
    Name(String),
    Modifiers(Modifiers),
    /// Marks an empty optional role.
    Absent,
}

impl TraitValue {
    pub fn tag(&self) -> KindTag {
        match self {
            TraitValue::BinaryOp(_) | TraitValue::UnaryOp(_) => KindTag::OperatorValue,
            TraitValue::Literal(_) => KindTag::LiteralValue,
            TraitValue::Name(_) => KindTag::Name,
            TraitValue::Modifiers(_) => KindTag::Modifiers,
            TraitValue::Absent => KindTag::Absent,
        }
    }

    pub fn op_family(&self) -> Option<OpFamily> {
        match self {
            TraitValue::BinaryOp(op) => Some(op.family()),
            TraitValue::UnaryOp(op) => Some(op.family()),
            _ => None,
        }
    }
}

/// Symbol handle into the program's binding space.
///
/// Compared by kind and canonical name only; the declared type rides along for
/// type inference but never takes part in equality.
#[derive(Debug, Clone, Serialize)]
pub struct Reference {
    pub kind: KindTag,
    pub name: String,
    /// Declaring type for fields and executables.
    pub owner: Option<String>,
    /// Variable/field type, executable return type, or the referenced type itself.
    pub ty: Option<JavaType>,
    /// Executable parameter types.
    pub params: Vec<JavaType>,
    pub varargs: bool,
}

impl Reference {
    pub fn is_variable(&self) -> bool {
        KindTag::VariableRef.is_super_or_equal(self.kind)
    }

    pub fn is_constructor(&self) -> bool {
        self.kind == KindTag::ExecutableRef && self.name == "<init>"
    }

    /// `x`, `Owner.field`, `Owner#method(int,String)`, or the type's display form.
    pub fn canonical(&self) -> String {
        match self.kind {
            KindTag::FieldRef => format!("{}.{}", self.owner.as_deref().unwrap_or("?"), self.name),
            KindTag::ExecutableRef => {
                let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
                format!("{}#{}({})", self.owner.as_deref().unwrap_or("?"), self.name, params.join(","))
            }
            _ => self.name.clone(),
        }
    }

    fn identity_eq(&self, other: &Reference) -> bool {
        self.kind == other.kind
            && self.name == other.name
            && match self.kind {
                KindTag::FieldRef => self.owner == other.owner,
                KindTag::ExecutableRef => self.owner == other.owner && self.params == other.params,
                _ => true,
            }
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.identity_eq(other)
    }
}

impl Eq for Reference {}

impl Hash for Reference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.name.hash(state);
        match self.kind {
            KindTag::FieldRef => self.owner.hash(state),
            KindTag::ExecutableRef => {
                self.owner.hash(state);
                self.params.hash(state);
            }
            _ => {}
        }
    }
}

/// Uniform AST node. Exactly one variant per node; nodes are immutable and shared through `Arc`.
#[derive(Debug, Clone)]
pub enum Node {
    /// Typed node with children aligned to `kind.roles()`.
    Element {
        kind: KindTag,
        children: Vec<Arc<Node>>,
        ty: Option<JavaType>,
    },
    /// Ordered siblings treated as one diffable unit.
    Collection { elem: KindTag, items: NodeVector },
    Trait(TraitValue),
    Reference(Reference),
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Node::Element { kind: k1, children: c1, .. },
                Node::Element { kind: k2, children: c2, .. },
            ) => k1 == k2 && c1.len() == c2.len() && c1.iter().zip(c2).all(|(a, b)| deep_eq(a, b)),
            (Node::Collection { elem: e1, items: i1 }, Node::Collection { elem: e2, items: i2 }) => {
                e1 == e2 && i1.len() == i2.len() && i1.iter().zip(i2.iter()).all(|(a, b)| deep_eq(a, b))
            }
            (Node::Trait(a), Node::Trait(b)) => a == b,
            (Node::Reference(a), Node::Reference(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Node::Element { kind, children, .. } => {
                kind.hash(state);
                for child in children {
                    child.hash(state);
                }
            }
            Node::Collection { elem, items } => {
                elem.hash(state);
                items.len().hash(state);
                for item in items.iter() {
                    item.hash(state);
                }
            }
            Node::Trait(value) => value.hash(state),
            Node::Reference(reference) => reference.hash(state),
        }
    }
}

/// Structural equality with a pointer fast path.
pub fn deep_eq(a: &Arc<Node>, b: &Arc<Node>) -> bool {
    Arc::ptr_eq(a, b) || **a == **b
}

impl Node {
    pub fn element(kind: KindTag, children: Vec<Arc<Node>>) -> Self {
        Node::Element { kind, children, ty: None }
    }

    pub fn absent() -> Arc<Node> {
        Arc::new(Node::Trait(TraitValue::Absent))
    }

    pub fn tag(&self) -> KindTag {
        match self {
            Node::Element { kind, .. } => *kind,
            Node::Collection { elem, .. } => *elem,
            Node::Trait(value) => value.tag(),
            Node::Reference(reference) => reference.kind,
        }
    }

    /// Kind signature, with the operator refinement for operator elements.
    pub fn sig(&self) -> KindSig {
        match self {
            Node::Collection { elem, .. } => KindSig::collection_of(*elem),
            Node::Trait(value) => KindSig::scalar(value.tag()).with_op(value.op_family()),
            Node::Element { kind, .. } => KindSig::scalar(*kind).with_op(self.op_family()),
            Node::Reference(reference) => KindSig::scalar(reference.kind),
        }
    }

    pub fn op_family(&self) -> Option<OpFamily> {
        match self.child(Role::Operator).map(|op| &**op) {
            Some(Node::Trait(value)) => value.op_family(),
            _ => None,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Node::Collection { .. })
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Node::Trait(TraitValue::Absent))
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Node::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn as_trait(&self) -> Option<&TraitValue> {
        match self {
            Node::Trait(value) => Some(value),
            _ => None,
        }
    }

    /// Text of a `Name` trait.
    pub fn name_text(&self) -> Option<&str> {
        match self {
            Node::Trait(TraitValue::Name(name)) => Some(name),
            _ => None,
        }
    }

    /// Usable in statement position. Only increments and decrements among unary operators.
    pub fn is_statement(&self) -> bool {
        match self {
            Node::Element { kind: KindTag::UnaryOperator, .. } => self.op_family() == Some(OpFamily::Increment),
            Node::Element { kind, .. } => kind.is_statement_kind(),
            _ => false,
        }
    }

    pub fn is_expression(&self) -> bool {
        matches!(self, Node::Element { kind, .. } if kind.is_expression_kind())
    }

    /// Static type annotation, if one has been inferred or declared.
    pub fn ty(&self) -> Option<&JavaType> {
        match self {
            Node::Element { ty, .. } => ty.as_ref(),
            Node::Reference(reference) => reference.ty.as_ref(),
            _ => None,
        }
    }

    pub fn with_ty(&self, ty: Option<JavaType>) -> Node {
        match self {
            Node::Element { kind, children, .. } => Node::Element {
                kind: *kind,
                children: children.clone(),
                ty,
            },
            other => other.clone(),
        }
    }

    /// Child in `role`, for elements whose kind has that role.
    pub fn child(&self, role: Role) -> Option<&Arc<Node>> {
        match self {
            Node::Element { kind, children, .. } => kind.role_index(role).and_then(|i| children.get(i)),
            _ => None,
        }
    }

    /// Present (non-`Absent`) child in `role`.
    pub fn present_child(&self, role: Role) -> Option<&Arc<Node>> {
        self.child(role).filter(|child| !child.is_absent())
    }

    /// Direct children in order: element children or collection items.
    pub fn child_nodes(&self) -> Vec<Arc<Node>> {
        match self {
            Node::Element { children, .. } => children.clone(),
            Node::Collection { items, .. } => items.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn child_count(&self) -> usize {
        match self {
            Node::Element { children, .. } => children.len(),
            Node::Collection { items, .. } => items.len(),
            _ => 0,
        }
    }

    pub fn child_at(&self, index: usize) -> Option<Arc<Node>> {
        match self {
            Node::Element { children, .. } => children.get(index).cloned(),
            Node::Collection { items, .. } => items.get(index).cloned(),
            _ => None,
        }
    }

    /// Copy of this node with child `index` replaced. Types are kept.
    pub fn with_child(&self, index: usize, child: Arc<Node>) -> Option<Node> {
        match self {
            Node::Element { kind, children, ty } if index < children.len() => {
                let mut children = children.clone();
                children[index] = child;
                Some(Node::Element { kind: *kind, children, ty: ty.clone() })
            }
            Node::Collection { elem, items } if index < items.len() => Some(Node::Collection {
                elem: *elem,
                items: items.set(index, child)?,
            }),
            _ => None,
        }
    }

    /// Cheap diff-level equality: same element kind, same collection length, or equal leaf.
    pub fn same_shape(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Element { kind: a, children: ca, .. }, Node::Element { kind: b, children: cb, .. }) => {
                a == b && ca.len() == cb.len()
            }
            (Node::Collection { items: a, .. }, Node::Collection { items: b, .. }) => a.len() == b.len(),
            (Node::Trait(a), Node::Trait(b)) => a == b,
            (Node::Reference(a), Node::Reference(b)) => a == b,
            _ => false,
        }
    }

    pub fn node_count(&self) -> usize {
        1 + match self {
            Node::Element { children, .. } => children.iter().map(|c| c.node_count()).sum(),
            Node::Collection { items, .. } => items.iter().map(|c| c.node_count()).sum(),
            _ => 0,
        }
    }

    /// Hash consistent with structural equality.
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Canonicalized set of kind signatures found anywhere in this subtree, itself included.
    pub fn kind_inventory(&self) -> BTreeSet<KindSig> {
        let mut inventory = BTreeSet::new();
        self.collect_kinds(&mut inventory);
        inventory
    }

    fn collect_kinds(&self, inventory: &mut BTreeSet<KindSig>) {
        if !self.is_absent() {
            inventory.insert(self.sig());
        }
        match self {
            Node::Element { children, .. } => children.iter().for_each(|c| c.collect_kinds(inventory)),
            Node::Collection { items, .. } => items.iter().for_each(|c| c.collect_kinds(inventory)),
            _ => {}
        }
    }

    /// Every reference in this subtree, pre-order.
    pub fn references(&self) -> Vec<&Reference> {
        let mut found = Vec::new();
        self.collect_references(&mut found);
        found
    }

    fn collect_references<'a>(&'a self, found: &mut Vec<&'a Reference>) {
        match self {
            Node::Reference(reference) => found.push(reference),
            Node::Element { children, .. } => children.iter().for_each(|c| c.collect_references(found)),
            Node::Collection { items, .. } => items.iter().for_each(|c| c.collect_references(found)),
            Node::Trait(_) => {}
        }
    }

    /// Name declared by a local variable, parameter, field, method or class.
    pub fn declared_name(&self) -> Option<&str> {
        match self {
            Node::Element {
                kind:
                    KindTag::LocalVariable | KindTag::Parameter | KindTag::Field | KindTag::Method | KindTag::Class,
                ..
            } => self.child(Role::Name).and_then(|n| n.name_text()),
            _ => None,
        }
    }
}

/// Every node of the tree rooted at `root`, pre-order.
pub fn preorder(root: &Arc<Node>) -> Vec<Arc<Node>> {
    let mut out = Vec::new();
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        let children = node.child_nodes();
        out.push(node);
        stack.extend(children.into_iter().rev());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::build::*;

    #[test]
    fn test_equality_ignores_types() {
        let a = Arc::new(int(1).with_ty(Some(JavaType::int())));
        let b = Arc::new(int(1));
        assert_eq!(a, b);
        assert_eq!(a.structural_hash(), b.structural_hash());
    }

    #[test]
    fn test_reference_identity_is_canonical_name() {
        let x1 = local_ref("x", JavaType::int());
        let x2 = local_ref("x", JavaType::string());
        assert_eq!(x1, x2);
        let f = field_ref("Point", "x", JavaType::int());
        assert_ne!(x1, f);
        assert_eq!(f.as_reference().map(|r| r.canonical()), Some("Point.x".to_string()));
        let m = method_ref("List", "get", vec![JavaType::int()], JavaType::object());
        assert_eq!(m.as_reference().map(|r| r.canonical()), Some("List#get(int)".to_string()));
    }

    #[test]
    fn test_operator_refinement_in_sig() {
        let sum = binary(BinaryOp::Add, read_local("a", JavaType::int()), int(1));
        assert_eq!(sum.sig().op, Some(OpFamily::Arithmetic));
        let cmp = binary(BinaryOp::Lt, read_local("a", JavaType::int()), int(1));
        assert_eq!(cmp.sig().op, Some(OpFamily::Relational));
    }

    #[test]
    fn test_statement_shape() {
        let inc = unary(UnaryOp::PostInc, read_local("i", JavaType::int()));
        let neg = unary(UnaryOp::Neg, read_local("i", JavaType::int()));
        assert!(inc.is_statement());
        assert!(!neg.is_statement());
        assert!(neg.is_expression());
        assert!(call(None, method_ref("A", "f", vec![], JavaType::Void), vec![]).is_statement());
    }

    #[test]
    fn test_inventory_and_counts() {
        let stmt = local_var(JavaType::int(), "x", Some(binary(BinaryOp::Add, int(1), int(2))));
        let inventory = stmt.kind_inventory();
        assert!(inventory.contains(&KindSig::scalar(KindTag::LocalVariable)));
        assert!(inventory.contains(&KindSig::scalar(KindTag::Literal)));
        assert!(!inventory.contains(&KindSig::scalar(KindTag::Absent)));
        assert_eq!(preorder(&Arc::new(stmt.clone())).len(), stmt.node_count());
    }

    #[test]
    fn test_with_child_on_collection() {
        let b = block(vec![ret(Some(int(1))), ret(Some(int(2)))]);
        let stmts = b.child(Role::Statements).cloned().unwrap();
        let replaced = stmts.with_child(1, Arc::new(ret(Some(int(3))))).unwrap();
        assert_eq!(replaced.child_count(), 2);
        assert_ne!(&replaced, &*stmts);
        assert!(stmts.with_child(5, Arc::new(ret(None))).is_none());
    }
}
