//! Value types of the host language and the assignability relation over them.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use super::binding::BindingIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Primitive {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Byte => "byte",
            Primitive::Short => "short",
            Primitive::Char => "char",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
        }
    }

    pub fn box_name(self) -> &'static str {
        match self {
            Primitive::Boolean => "Boolean",
            Primitive::Byte => "Byte",
            Primitive::Short => "Short",
            Primitive::Char => "Character",
            Primitive::Int => "Integer",
            Primitive::Long => "Long",
            Primitive::Float => "Float",
            Primitive::Double => "Double",
        }
    }

    pub fn is_numeric(self) -> bool {
        self != Primitive::Boolean
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            Primitive::Byte | Primitive::Short | Primitive::Char | Primitive::Int | Primitive::Long
        )
    }

    /// Rank on the widening chain; `char` sits beside `short`.
    fn rank(self) -> u8 {
        match self {
            Primitive::Boolean => 0,
            Primitive::Byte => 1,
            Primitive::Short | Primitive::Char => 2,
            Primitive::Int => 3,
            Primitive::Long => 4,
            Primitive::Float => 5,
            Primitive::Double => 6,
        }
    }

    /// Widening primitive conversion (identity included).
    pub fn widens_to(self, to: Primitive) -> bool {
        if self == to {
            return true;
        }
        if !self.is_numeric() || !to.is_numeric() || to == Primitive::Char {
            return false;
        }
        if self == Primitive::Char && to == Primitive::Short {
            return false;
        }
        self.rank() < to.rank()
    }
}

const PRIMITIVES: [Primitive; 8] = [
    Primitive::Boolean,
    Primitive::Byte,
    Primitive::Short,
    Primitive::Char,
    Primitive::Int,
    Primitive::Long,
    Primitive::Float,
    Primitive::Double,
];

/// Static type of an expression or declaration. Class names are simple names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum JavaType {
    Void,
    Null,
    Primitive(Primitive),
    Class(String),
    Array(Box<JavaType>),
}

impl JavaType {
    pub fn int() -> Self {
        JavaType::Primitive(Primitive::Int)
    }

    pub fn boolean() -> Self {
        JavaType::Primitive(Primitive::Boolean)
    }

    pub fn object() -> Self {
        JavaType::Class("Object".to_string())
    }

    pub fn string() -> Self {
        JavaType::Class("String".to_string())
    }

    pub fn class(name: &str) -> Self {
        JavaType::Class(name.to_string())
    }

    pub fn array_of(elem: JavaType) -> Self {
        JavaType::Array(Box::new(elem))
    }

    /// Parses `int`, `String`, `int[][]` and friends.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if let Some(elem) = text.strip_suffix("[]") {
            return JavaType::array_of(JavaType::parse(elem));
        }
        if text == "void" {
            return JavaType::Void;
        }
        if text == "null" {
            return JavaType::Null;
        }
        PRIMITIVES
            .iter()
            .find(|p| p.name() == text)
            .map(|p| JavaType::Primitive(*p))
            .unwrap_or_else(|| JavaType::Class(text.to_string()))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, JavaType::Class(_) | JavaType::Array(_) | JavaType::Null)
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            JavaType::Class(name) => Some(name),
            _ => None,
        }
    }

    /// The primitive this type denotes, directly or through unboxing.
    pub fn unboxed(&self) -> Option<Primitive> {
        match self {
            JavaType::Primitive(p) => Some(*p),
            JavaType::Class(name) => PRIMITIVES.iter().copied().find(|p| p.box_name() == name),
            _ => None,
        }
    }

    pub fn boxed(&self) -> Option<JavaType> {
        match self {
            JavaType::Primitive(p) => Some(JavaType::class(p.box_name())),
            _ => None,
        }
    }

    pub fn is_boolean(&self) -> bool {
        self.unboxed() == Some(Primitive::Boolean)
    }

    pub fn is_numeric(&self) -> bool {
        self.unboxed().is_some_and(Primitive::is_numeric)
    }

    pub fn is_integral(&self) -> bool {
        self.unboxed().is_some_and(Primitive::is_integral)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, JavaType::Class(name) if name == "String")
    }

    /// Binary numeric promotion.
    pub fn promote(a: &JavaType, b: &JavaType) -> Option<JavaType> {
        let (a, b) = (a.unboxed()?, b.unboxed()?);
        if !a.is_numeric() || !b.is_numeric() {
            return None;
        }
        let widest = if a.rank() >= b.rank() { a } else { b };
        Some(JavaType::Primitive(if widest.rank() < Primitive::Int.rank() {
            Primitive::Int
        } else {
            widest
        }))
    }

    /// Unary numeric promotion.
    pub fn promote_unary(a: &JavaType) -> Option<JavaType> {
        JavaType::promote(a, &JavaType::int())
    }

    pub fn element_type(&self) -> Option<&JavaType> {
        match self {
            JavaType::Array(elem) => Some(elem),
            _ => None,
        }
    }
}

impl fmt::Display for JavaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JavaType::Void => write!(f, "void"),
            JavaType::Null => write!(f, "null"),
            JavaType::Primitive(p) => write!(f, "{}", p.name()),
            JavaType::Class(name) => write!(f, "{}", name),
            JavaType::Array(elem) => write!(f, "{}[]", elem),
        }
    }
}

/// Assignment compatibility over a binding index, memoized per session.
#[derive(Debug)]
pub struct TypeSystem {
    index: Arc<BindingIndex>,
    judgments: DashMap<(JavaType, JavaType), bool>,
}

impl TypeSystem {
    pub fn new(index: Arc<BindingIndex>) -> Self {
        TypeSystem {
            index,
            judgments: DashMap::new(),
        }
    }

    pub fn index(&self) -> &BindingIndex {
        &self.index
    }

    /// True if a value of type `from` may be assigned to a slot of type `to`.
    pub fn is_assignable(&self, from: &JavaType, to: &JavaType) -> bool {
        if from == to {
            return *from != JavaType::Void;
        }
        let key = (from.clone(), to.clone());
        if let Some(hit) = self.judgments.get(&key) {
            return *hit;
        }
        let verdict = self.compute_assignable(from, to);
        self.judgments.insert(key, verdict);
        verdict
    }

    fn compute_assignable(&self, from: &JavaType, to: &JavaType) -> bool {
        match (from, to) {
            (JavaType::Void, _) | (_, JavaType::Void) | (_, JavaType::Null) => false,
            (JavaType::Null, to) => to.is_reference(),
            (JavaType::Primitive(a), JavaType::Primitive(b)) => a.widens_to(*b),
            (JavaType::Primitive(_), JavaType::Class(_)) => from
                .boxed()
                .is_some_and(|boxed| boxed == *to || self.is_assignable(&boxed, to)),
            (JavaType::Class(_), JavaType::Primitive(b)) => {
                // unboxing then widening; only genuine box classes unbox
                from.unboxed().is_some_and(|p| p.widens_to(*b))
            }
            (JavaType::Class(a), JavaType::Class(b)) => b == "Object" || self.index.is_subtype(a, b),
            (JavaType::Array(_), JavaType::Class(b)) => b == "Object",
            (JavaType::Array(a), JavaType::Array(b)) => {
                a == b || (a.is_reference() && b.is_reference() && self.is_assignable(a, b))
            }
            _ => false,
        }
    }

    /// Compatibility for casts: either direction of assignability, or numeric to numeric.
    pub fn is_castable(&self, from: &JavaType, to: &JavaType) -> bool {
        (from.is_numeric() && to.is_numeric())
            || self.is_assignable(from, to)
            || self.is_assignable(to, from)
    }

    pub fn cached_judgments(&self) -> usize {
        self.judgments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types() -> TypeSystem {
        TypeSystem::new(Arc::new(BindingIndex::new()))
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(JavaType::parse("int"), JavaType::int());
        assert_eq!(JavaType::parse("String[]"), JavaType::array_of(JavaType::string()));
        assert_eq!(JavaType::parse("int[][]").to_string(), "int[][]");
        assert_eq!(JavaType::parse("void"), JavaType::Void);
    }

    #[test]
    fn test_primitive_widening() {
        let ts = types();
        let p = |t: &str| JavaType::parse(t);
        assert!(ts.is_assignable(&p("int"), &p("long")));
        assert!(ts.is_assignable(&p("char"), &p("int")));
        assert!(!ts.is_assignable(&p("long"), &p("int")));
        assert!(!ts.is_assignable(&p("char"), &p("short")));
        assert!(!ts.is_assignable(&p("boolean"), &p("int")));
    }

    #[test]
    fn test_boxing_and_null() {
        let ts = types();
        assert!(ts.is_assignable(&JavaType::int(), &JavaType::class("Integer")));
        assert!(ts.is_assignable(&JavaType::int(), &JavaType::class("Number")));
        assert!(ts.is_assignable(&JavaType::int(), &JavaType::object()));
        assert!(ts.is_assignable(&JavaType::class("Integer"), &JavaType::parse("long")));
        assert!(ts.is_assignable(&JavaType::Null, &JavaType::string()));
        assert!(!ts.is_assignable(&JavaType::Null, &JavaType::int()));
        assert!(!ts.is_assignable(&JavaType::string(), &JavaType::int()));
    }

    #[test]
    fn test_class_subtyping() {
        let ts = types();
        assert!(ts.is_assignable(
            &JavaType::class("IllegalArgumentException"),
            &JavaType::class("RuntimeException")
        ));
        assert!(!ts.is_assignable(&JavaType::class("Exception"), &JavaType::class("RuntimeException")));
        assert!(ts.is_assignable(&JavaType::array_of(JavaType::string()), &JavaType::object()));
        assert!(ts.cached_judgments() > 0);
    }

    #[test]
    fn test_promotion() {
        let p = |t: &str| JavaType::parse(t);
        assert_eq!(JavaType::promote(&p("byte"), &p("short")), Some(p("int")));
        assert_eq!(JavaType::promote(&p("int"), &p("double")), Some(p("double")));
        assert_eq!(JavaType::promote(&p("Integer"), &p("long")), Some(p("long")));
        assert_eq!(JavaType::promote(&p("boolean"), &p("int")), None);
    }
}
