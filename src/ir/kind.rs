//! Kind signatures and the supertype lattice over node tags.
//!
//! Every node has a [`KindTag`]. Tags form a single-rooted hierarchy under
//! [`KindTag::Any`]; a few tags (statement-expressions) have two parents, so
//! [`KindTag::join`] picks the unique minimal common ancestor, folding further
//! up when there is more than one. A [`KindSig`] pairs the tag with the
//! collection flag and an optional operator-family refinement.

use std::fmt;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::Serialize;

/// Type tag of a node. Abstract tags only ever appear in signatures, never on nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum KindTag {
    // Abstract
    Any,
    CodeElement,
    Statement,
    Expression,
    StatementExpression,
    Declaration,
    Reference,
    VariableRef,
    Trait,

    // Statements
    Block,
    If,
    While,
    DoWhile,
    For,
    ForEach,
    Return,
    Throw,
    LocalVariable,
    Break,
    Continue,
    Try,
    Catch,

    // Statement-expressions
    Invocation,
    ConstructorCall,
    Assignment,
    OperatorAssignment,

    // Expressions
    Literal,
    BinaryOperator,
    UnaryOperator,
    VariableRead,
    FieldRead,
    ArrayRead,
    Conditional,
    Cast,
    ThisAccess,
    TypeAccess,

    // Declarations
    CompilationUnit,
    Class,
    Method,
    Constructor,
    Field,
    Parameter,

    // References
    LocalVariableRef,
    ParameterRef,
    FieldRef,
    ExecutableRef,
    TypeRef,

    // Traits
    OperatorValue,
    LiteralValue,
    Name,
    Modifiers,
    Absent,
}

impl KindTag {
    pub const ALL: [KindTag; 52] = [
        KindTag::Any,
        KindTag::CodeElement,
        KindTag::Statement,
        KindTag::Expression,
        KindTag::StatementExpression,
        KindTag::Declaration,
        KindTag::Reference,
        KindTag::VariableRef,
        KindTag::Trait,
        KindTag::Block,
        KindTag::If,
        KindTag::While,
        KindTag::DoWhile,
        KindTag::For,
        KindTag::ForEach,
        KindTag::Return,
        KindTag::Throw,
        KindTag::LocalVariable,
        KindTag::Break,
        KindTag::Continue,
        KindTag::Try,
        KindTag::Catch,
        KindTag::Invocation,
        KindTag::ConstructorCall,
        KindTag::Assignment,
        KindTag::OperatorAssignment,
        KindTag::Literal,
        KindTag::BinaryOperator,
        KindTag::UnaryOperator,
        KindTag::VariableRead,
        KindTag::FieldRead,
        KindTag::ArrayRead,
        KindTag::Conditional,
        KindTag::Cast,
        KindTag::ThisAccess,
        KindTag::TypeAccess,
        KindTag::CompilationUnit,
        KindTag::Class,
        KindTag::Method,
        KindTag::Constructor,
        KindTag::Field,
        KindTag::Parameter,
        KindTag::LocalVariableRef,
        KindTag::ParameterRef,
        KindTag::FieldRef,
        KindTag::ExecutableRef,
        KindTag::TypeRef,
        KindTag::OperatorValue,
        KindTag::LiteralValue,
        KindTag::Name,
        KindTag::Modifiers,
        KindTag::Absent,
    ];

    /// Direct supertypes.
    pub fn parents(self) -> &'static [KindTag] {
        use KindTag::*;
        match self {
            Any => &[],
            CodeElement | Declaration | Reference | Trait => &[Any],
            Statement | Expression => &[CodeElement],
            StatementExpression => &[Statement, Expression],
            Block | If | While | DoWhile | For | ForEach | Return | Throw | LocalVariable | Break
            | Continue | Try => &[Statement],
            Catch => &[CodeElement],
            Invocation | ConstructorCall | Assignment | OperatorAssignment => &[StatementExpression],
            Literal | BinaryOperator | UnaryOperator | VariableRead | FieldRead | ArrayRead
            | Conditional | Cast | ThisAccess | TypeAccess => &[Expression],
            CompilationUnit | Class | Method | Constructor | Field | Parameter => &[Declaration],
            VariableRef | FieldRef | ExecutableRef | TypeRef => &[Reference],
            LocalVariableRef | ParameterRef => &[VariableRef],
            OperatorValue | LiteralValue | Name | Modifiers | Absent => &[Trait],
        }
    }

    fn bit(self) -> u64 {
        1u64 << (self as u32)
    }

    /// Bitmask of this tag and all of its supertypes.
    pub fn ancestors(self) -> u64 {
        ANCESTORS[self as usize]
    }

    /// Iterates this tag and all of its supertypes.
    pub fn upward(self) -> impl Iterator<Item = KindTag> {
        let mask = self.ancestors();
        KindTag::ALL.into_iter().filter(move |tag| mask & tag.bit() != 0)
    }

    /// True if `self` is `other` or one of its supertypes.
    pub fn is_super_or_equal(self, other: KindTag) -> bool {
        other.ancestors() & self.bit() != 0
    }

    /// Least upper bound in the tag hierarchy.
    pub fn join(self, other: KindTag) -> KindTag {
        if self.is_super_or_equal(other) {
            return self;
        }
        if other.is_super_or_equal(self) {
            return other;
        }
        let common = self.ancestors() & other.ancestors();
        let minimal: Vec<KindTag> = KindTag::ALL
            .into_iter()
            .filter(|tag| common & tag.bit() != 0)
            .filter(|tag| {
                // no strictly more specific tag in the common set
                !KindTag::ALL.iter().any(|d| {
                    *d != *tag && common & d.bit() != 0 && tag.is_super_or_equal(*d)
                })
            })
            .collect();
        minimal
            .into_iter()
            .reduce(|a, b| a.join(b))
            .unwrap_or(KindTag::Any)
    }

    /// Tags that can sit on a concrete node.
    pub fn is_concrete(self) -> bool {
        !matches!(
            self,
            KindTag::Any
                | KindTag::CodeElement
                | KindTag::Statement
                | KindTag::Expression
                | KindTag::StatementExpression
                | KindTag::Declaration
                | KindTag::Reference
                | KindTag::VariableRef
                | KindTag::Trait
        )
    }

    pub fn is_reference(self) -> bool {
        KindTag::Reference.is_super_or_equal(self)
    }

    pub fn is_trait(self) -> bool {
        KindTag::Trait.is_super_or_equal(self)
    }

    /// Element kinds: everything that is neither a reference nor a trait.
    pub fn is_element(self) -> bool {
        self != KindTag::Any && !self.is_reference() && !self.is_trait()
    }

    pub fn is_statement_kind(self) -> bool {
        KindTag::Statement.is_super_or_equal(self)
    }

    pub fn is_expression_kind(self) -> bool {
        KindTag::Expression.is_super_or_equal(self)
    }

    /// Routines: the unit whose body bounds the `Function` scope tier.
    pub fn is_routine(self) -> bool {
        matches!(self, KindTag::Method | KindTag::Constructor)
    }

    /// Nodes that open a lexical scope for local declarations.
    pub fn opens_scope(self) -> bool {
        matches!(
            self,
            KindTag::Block
                | KindTag::For
                | KindTag::ForEach
                | KindTag::While
                | KindTag::DoWhile
                | KindTag::Catch
                | KindTag::Try
        )
    }

    /// The fixed, ordered named roles of an element kind.
    pub fn roles(self) -> &'static [Role] {
        use Role::*;
        match self {
            KindTag::Block => &[Statements],
            KindTag::If => &[Condition, Then, Else],
            KindTag::While => &[Condition, Body],
            KindTag::DoWhile => &[Body, Condition],
            KindTag::For => &[Init, Condition, Update, Body],
            KindTag::ForEach => &[Variable, Iterable, Body],
            KindTag::Return | KindTag::Throw => &[Expression],
            KindTag::LocalVariable => &[Type, Name, Initializer],
            KindTag::Try => &[Body, Catchers, Finalizer],
            KindTag::Catch => &[Parameter, Body],
            KindTag::Invocation => &[Target, Executable, Arguments],
            KindTag::ConstructorCall => &[Executable, Arguments],
            KindTag::Assignment => &[Assigned, Value],
            KindTag::OperatorAssignment => &[Operator, Assigned, Value],
            KindTag::Literal => &[Value],
            KindTag::BinaryOperator => &[Operator, Left, Right],
            KindTag::UnaryOperator => &[Operator, Operand],
            KindTag::VariableRead => &[Variable],
            KindTag::FieldRead => &[Target, Field],
            KindTag::ArrayRead => &[Target, Index],
            KindTag::Conditional => &[Condition, Then, Else],
            KindTag::Cast => &[Type, Expression],
            KindTag::TypeAccess => &[Type],
            KindTag::CompilationUnit => &[Package, Types],
            KindTag::Class => &[Modifiers, Name, Superclass, Members],
            KindTag::Method => &[Modifiers, Name, ReturnType, Parameters, Body],
            KindTag::Constructor => &[Modifiers, Parameters, Body],
            KindTag::Field => &[Modifiers, Type, Name, Initializer],
            KindTag::Parameter => &[Type, Name],
            _ => &[],
        }
    }

    /// Position of `role` in this kind's child list.
    pub fn role_index(self, role: Role) -> Option<usize> {
        self.roles().iter().position(|r| *r == role)
    }

    /// What a child in `role` must be for this kind to be well formed.
    pub fn content(self, role: Role) -> Content {
        use Content as C;
        use KindTag as K;
        use Role as R;
        match (self, role) {
            (K::Block, R::Statements) => C::Collection(K::Statement),
            (K::If, R::Condition) | (K::While, R::Condition) | (K::DoWhile, R::Condition) => C::Expression,
            (K::If, R::Then) => C::Statement,
            (K::If, R::Else) => C::OptionalStatement,
            (K::While | K::DoWhile | K::For | K::ForEach, R::Body) => C::Statement,
            (K::For, R::Init) | (K::For, R::Update) => C::Collection(K::Statement),
            (K::For, R::Condition) => C::OptionalExpression,
            (K::ForEach, R::Variable) | (K::Catch, R::Parameter) => C::Element(K::LocalVariable),
            (K::ForEach, R::Iterable) => C::Expression,
            (K::Return, R::Expression) => C::OptionalExpression,
            (K::Throw, R::Expression) => C::Expression,
            (K::LocalVariable | K::Field | K::Parameter | K::Cast, R::Type) => C::Reference(K::TypeRef),
            (K::TypeAccess, R::Type) => C::Reference(K::TypeRef),
            (K::LocalVariable | K::Field | K::Parameter | K::Class | K::Method, R::Name) => C::Trait(K::Name),
            (K::LocalVariable | K::Field, R::Initializer) => C::OptionalExpression,
            (K::Try, R::Body) | (K::Catch, R::Body) => C::Element(K::Block),
            (K::Try, R::Catchers) => C::Collection(K::Catch),
            (K::Try, R::Finalizer) => C::OptionalElement(K::Block),
            (K::Invocation | K::FieldRead, R::Target) => C::OptionalExpression,
            (K::ArrayRead, R::Target) => C::Expression,
            (K::Invocation | K::ConstructorCall, R::Executable) => C::Reference(K::ExecutableRef),
            (K::Invocation | K::ConstructorCall, R::Arguments) => C::Collection(K::Expression),
            (K::Assignment | K::OperatorAssignment, R::Assigned) => C::Expression,
            (K::Assignment | K::OperatorAssignment, R::Value) => C::Expression,
            (K::OperatorAssignment | K::BinaryOperator | K::UnaryOperator, R::Operator) => C::Trait(K::OperatorValue),
            (K::Literal, R::Value) => C::Trait(K::LiteralValue),
            (K::BinaryOperator, R::Left | R::Right) => C::Expression,
            (K::UnaryOperator, R::Operand) => C::Expression,
            (K::VariableRead, R::Variable) => C::Reference(K::VariableRef),
            (K::FieldRead, R::Field) => C::Reference(K::FieldRef),
            (K::ArrayRead, R::Index) => C::Expression,
            (K::Conditional, R::Condition | R::Then | R::Else) => C::Expression,
            (K::Cast, R::Expression) => C::Expression,
            (K::CompilationUnit, R::Package) => C::Trait(K::Name),
            (K::CompilationUnit, R::Types) => C::Collection(K::Class),
            (K::Class | K::Method | K::Constructor | K::Field, R::Modifiers) => C::Trait(K::Modifiers),
            (K::Class, R::Superclass) => C::OptionalReference(K::TypeRef),
            (K::Class, R::Members) => C::Collection(K::Declaration),
            (K::Method, R::ReturnType) => C::Reference(K::TypeRef),
            (K::Method | K::Constructor, R::Parameters) => C::Collection(K::Parameter),
            (K::Method, R::Body) => C::OptionalElement(K::Block),
            (K::Constructor, R::Body) => C::Element(K::Block),
            _ => C::Any,
        }
    }
}

static ANCESTORS: Lazy<Vec<u64>> = Lazy::new(|| {
    fn closure(tag: KindTag) -> u64 {
        tag.parents()
            .iter()
            .fold(tag.bit(), |mask, parent| mask | closure(*parent))
    }
    KindTag::ALL.iter().map(|tag| closure(*tag)).collect()
});

/// Named child slot of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Statements,
    Condition,
    Then,
    Else,
    Body,
    Init,
    Update,
    Variable,
    Iterable,
    Expression,
    Type,
    Name,
    Initializer,
    Catchers,
    Finalizer,
    Parameter,
    Target,
    Executable,
    Arguments,
    Assigned,
    Value,
    Operator,
    Left,
    Right,
    Operand,
    Field,
    Index,
    Package,
    Types,
    Modifiers,
    Superclass,
    Members,
    ReturnType,
    Parameters,
}

/// Structural requirement on the child occupying a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Content {
    Statement,
    OptionalStatement,
    Expression,
    OptionalExpression,
    Element(KindTag),
    OptionalElement(KindTag),
    Collection(KindTag),
    Reference(KindTag),
    OptionalReference(KindTag),
    Trait(KindTag),
    Any,
}

/// Operator-kind refinement carried by operator nodes, orthogonal to the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpFamily {
    Arithmetic,
    Relational,
    Equality,
    Logical,
    Bitwise,
    Shift,
    Increment,
    Negation,
}

/// A node's type tag plus collection/scalar flag and optional operator refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KindSig {
    pub tag: KindTag,
    pub collection: bool,
    pub op: Option<OpFamily>,
}

impl KindSig {
    pub const fn scalar(tag: KindTag) -> Self {
        KindSig { tag, collection: false, op: None }
    }

    pub const fn collection_of(tag: KindTag) -> Self {
        KindSig { tag, collection: true, op: None }
    }

    /// The universal top; also the join of a collection with a scalar.
    pub const fn top() -> Self {
        KindSig::scalar(KindTag::Any)
    }

    pub fn with_op(mut self, op: Option<OpFamily>) -> Self {
        self.op = op;
        self
    }

    pub fn is_top(&self) -> bool {
        *self == KindSig::top()
    }

    /// Least upper bound. Mixing collections and scalars collapses to the top.
    pub fn join(&self, other: &KindSig) -> KindSig {
        if self.collection != other.collection {
            return KindSig::top();
        }
        let tag = self.tag.join(other.tag);
        if tag == KindTag::Any && !self.collection {
            return KindSig::top();
        }
        let op = if self.op == other.op && tag == self.tag && tag == other.tag {
            self.op
        } else {
            None
        };
        KindSig { tag, collection: self.collection, op }
    }

    /// True if every node with signature `other` also has signature `self`.
    pub fn is_super_or_equal(&self, other: &KindSig) -> bool {
        if self.is_top() {
            return true;
        }
        self.collection == other.collection
            && self.tag.is_super_or_equal(other.tag)
            && (self.op.is_none() || self.op == other.op)
    }

    /// This signature and every supertype of it, operator refinement dropped above the tag itself.
    pub fn upward_closure(&self) -> impl Iterator<Item = KindSig> + use<> {
        let own = *self;
        let collection = self.collection;
        let refined = self.op.map(|_| own);
        refined
            .into_iter()
            .chain(self.tag.upward().map(move |tag| KindSig { tag, collection, op: None }))
            .chain(collection.then(KindSig::top))
    }

    /// Element kinds only: drops references, traits and collections.
    pub fn is_element_kind(&self) -> bool {
        !self.collection && self.tag.is_element()
    }
}

impl fmt::Display for KindSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.tag)?;
        if let Some(op) = self.op {
            write!(f, "<{:?}>", op)?;
        }
        if self.collection {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

/// Memoized signature joins, shared read/populate across worker threads.
#[derive(Debug, Default)]
pub struct JoinCache {
    joins: DashMap<(KindSig, KindSig), KindSig>,
}

impl JoinCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, a: &KindSig, b: &KindSig) -> KindSig {
        if a == b {
            return *a;
        }
        let key = if a <= b { (*a, *b) } else { (*b, *a) };
        if let Some(hit) = self.joins.get(&key) {
            return *hit;
        }
        let joined = a.join(b);
        self.joins.insert(key, joined);
        joined
    }

    /// Join of a non-empty sequence; the top for an empty one.
    pub fn join_all<'a>(&self, sigs: impl IntoIterator<Item = &'a KindSig>) -> KindSig {
        sigs.into_iter()
            .fold(None, |acc: Option<KindSig>, sig| {
                Some(match acc {
                    None => *sig,
                    Some(prev) => self.join(&prev, sig),
                })
            })
            .unwrap_or_else(KindSig::top)
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }
}
