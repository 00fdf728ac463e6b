//! Program-wide binding space: declared types, their members, and the subtype graph.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use petgraph::Graph;
use petgraph::algo::has_path_connecting;
use petgraph::graph::NodeIndex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, trace};

use super::kind::{KindTag, Role};
use super::node::{Modifiers, Node, TraitValue, Visibility};
use super::types::JavaType;

const JAVA_LANG: &str = "java.lang";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDecl {
    pub owner: String,
    pub name: String,
    pub ty: JavaType,
    pub modifiers: Modifiers,
}

/// A method or constructor. Constructors are named `<init>` and return their owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodDecl {
    pub owner: String,
    pub name: String,
    pub params: Vec<JavaType>,
    pub ret: JavaType,
    pub modifiers: Modifiers,
    pub varargs: bool,
}

impl MethodDecl {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeDecl {
    pub name: String,
    pub package: String,
    /// Source file of the declaration; `None` for built-ins.
    pub file: Option<String>,
    pub visibility: Visibility,
    pub superclass: Option<String>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub constructors: Vec<MethodDecl>,
}

/// Index of every type visible to the program, with member lookup through supertypes.
#[derive(Debug)]
pub struct BindingIndex {
    types: FxHashMap<String, TypeDecl>,
    graph: Graph<String, ()>,
    graph_nodes: FxHashMap<String, NodeIndex>,
    exception_ctors: OnceCell<Vec<MethodDecl>>,
}

impl Default for BindingIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl BindingIndex {
    /// An index holding only the built-in `java.lang` surface.
    pub fn new() -> Self {
        let mut index = BindingIndex {
            types: FxHashMap::default(),
            graph: Graph::new(),
            graph_nodes: FxHashMap::default(),
            exception_ctors: OnceCell::new(),
        };
        for decl in builtin_types() {
            index.declare(decl);
        }
        index
    }

    /// Builds the index from `(file, compilation unit)` pairs on top of the built-ins.
    pub fn from_units<'a>(units: impl IntoIterator<Item = (&'a str, &'a Arc<Node>)>) -> Self {
        let mut index = Self::new();
        for (file, unit) in units {
            index.add_unit(file, unit);
        }
        index
    }

    /// Registers every class of a compilation unit.
    pub fn add_unit(&mut self, file: &str, unit: &Node) {
        let package = unit
            .child(Role::Package)
            .and_then(|p| p.name_text())
            .unwrap_or_default()
            .to_string();
        let classes = unit.child(Role::Types).map(|c| c.child_nodes()).unwrap_or_default();
        for class in classes {
            if let Some(decl) = type_decl_of(&class, &package, file) {
                debug!("Indexed type {} from {} ({} fields, {} methods)", decl.name, file, decl.fields.len(), decl.methods.len());
                self.declare(decl);
            }
        }
    }

    fn graph_node(&mut self, name: &str) -> NodeIndex {
        if let Some(index) = self.graph_nodes.get(name) {
            return *index;
        }
        let index = self.graph.add_node(name.to_string());
        self.graph_nodes.insert(name.to_string(), index);
        index
    }

    /// Adds or replaces a type declaration. Resets the exception-constructor index.
    pub fn declare(&mut self, decl: TypeDecl) {
        let node = self.graph_node(&decl.name);
        if let Some(superclass) = decl.superclass.clone() {
            let parent = self.graph_node(&superclass);
            if self.graph.find_edge(node, parent).is_none() {
                self.graph.add_edge(node, parent, ());
            }
        }
        self.types.insert(decl.name.clone(), decl);
        self.exception_ctors = OnceCell::new();
    }

    pub fn type_decl(&self, name: &str) -> Option<&TypeDecl> {
        self.types.get(name)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDecl> {
        self.types.values()
    }

    /// `name` itself followed by its superclass chain.
    pub fn supertypes(&self, name: &str) -> Vec<&TypeDecl> {
        let mut chain = Vec::new();
        let mut current = self.types.get(name);
        while let Some(decl) = current {
            if chain.iter().any(|d: &&TypeDecl| d.name == decl.name) {
                break;
            }
            chain.push(decl);
            current = decl.superclass.as_deref().and_then(|s| self.types.get(s));
        }
        chain
    }

    /// Reflexive class subtyping through the declared-superclass graph.
    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        if sub == sup || sup == "Object" {
            return true;
        }
        match (self.graph_nodes.get(sub), self.graph_nodes.get(sup)) {
            (Some(a), Some(b)) => has_path_connecting(&self.graph, *a, *b, None),
            _ => false,
        }
    }

    /// Field `name` declared on `owner` or a supertype. Arrays expose `length`.
    pub fn field(&self, owner: &JavaType, name: &str) -> Option<FieldDecl> {
        if let JavaType::Array(_) = owner {
            return (name == "length").then(|| FieldDecl {
                owner: owner.to_string(),
                name: "length".to_string(),
                ty: JavaType::int(),
                modifiers: Modifiers {
                    visibility: Visibility::Public,
                    is_static: false,
                    is_final: true,
                },
            });
        }
        let class = owner.class_name()?;
        self.supertypes(class)
            .into_iter()
            .flat_map(|decl| decl.fields.iter())
            .find(|f| f.name == name)
            .cloned()
    }

    /// Methods called `name` on `owner` and its supertypes, most specific owner first.
    pub fn methods_named(&self, owner: &str, name: &str) -> Vec<&MethodDecl> {
        self.supertypes(owner)
            .into_iter()
            .flat_map(|decl| decl.methods.iter())
            .filter(|m| m.name == name)
            .collect()
    }

    pub fn constructors(&self, owner: &str) -> &[MethodDecl] {
        self.types
            .get(owner)
            .map(|decl| decl.constructors.as_slice())
            .unwrap_or(&[])
    }

    /// Constructors of every `Throwable` subtype, computed once per index.
    pub fn exception_constructors(&self) -> &[MethodDecl] {
        self.exception_ctors.get_or_init(|| {
            let mut ctors: Vec<MethodDecl> = self
                .types
                .values()
                .filter(|decl| self.is_subtype(&decl.name, "Throwable"))
                .flat_map(|decl| decl.constructors.iter().cloned())
                .collect();
            ctors.sort_by(|a, b| a.owner.cmp(&b.owner).then(a.params.len().cmp(&b.params.len())));
            trace!("Exception-constructor index holds {} constructors", ctors.len());
            ctors
        })
    }

    /// Whether a member with `visibility`, declared in `package`/`file`, is usable from `from_package`/`from_file`.
    pub fn is_accessible(
        visibility: Visibility,
        package: &str,
        file: Option<&str>,
        from_package: &str,
        from_file: &str,
    ) -> bool {
        match visibility {
            Visibility::Public => true,
            Visibility::Private => file == Some(from_file),
            Visibility::Package | Visibility::Protected => package == from_package,
        }
    }
}

fn modifiers_of(node: &Node) -> Modifiers {
    match node.child(Role::Modifiers).and_then(|m| m.as_trait()) {
        Some(TraitValue::Modifiers(m)) => *m,
        _ => Modifiers::default(),
    }
}

fn type_of(node: &Node, role: Role) -> JavaType {
    node.child(role)
        .and_then(|t| t.ty().cloned())
        .unwrap_or_else(JavaType::object)
}

fn param_types(node: &Node) -> Vec<JavaType> {
    node.child(Role::Parameters)
        .map(|ps| ps.child_nodes().iter().map(|p| type_of(p, Role::Type)).collect())
        .unwrap_or_default()
}

fn type_decl_of(class: &Node, package: &str, file: &str) -> Option<TypeDecl> {
    if class.tag() != KindTag::Class {
        return None;
    }
    let name = class.declared_name()?.to_string();
    let modifiers = modifiers_of(class);
    let superclass = class
        .present_child(Role::Superclass)
        .and_then(|s| s.ty())
        .and_then(|t| t.class_name().map(str::to_string))
        .or_else(|| Some("Object".to_string()));
    let mut decl = TypeDecl {
        name: name.clone(),
        package: package.to_string(),
        file: Some(file.to_string()),
        visibility: modifiers.visibility,
        superclass,
        fields: Vec::new(),
        methods: Vec::new(),
        constructors: Vec::new(),
    };
    let members = class.child(Role::Members).map(|m| m.child_nodes()).unwrap_or_default();
    for member in members {
        match member.tag() {
            KindTag::Field => decl.fields.push(FieldDecl {
                owner: name.clone(),
                name: member.declared_name().unwrap_or_default().to_string(),
                ty: type_of(&member, Role::Type),
                modifiers: modifiers_of(&member),
            }),
            KindTag::Method => decl.methods.push(MethodDecl {
                owner: name.clone(),
                name: member.declared_name().unwrap_or_default().to_string(),
                params: param_types(&member),
                ret: type_of(&member, Role::ReturnType),
                modifiers: modifiers_of(&member),
                varargs: false,
            }),
            KindTag::Constructor => decl.constructors.push(MethodDecl {
                owner: name.clone(),
                name: "<init>".to_string(),
                params: param_types(&member),
                ret: JavaType::class(&name),
                modifiers: modifiers_of(&member),
                varargs: false,
            }),
            _ => {}
        }
    }
    if decl.constructors.is_empty() {
        decl.constructors.push(default_ctor(&name, Vec::new()));
    }
    Some(decl)
}

fn public() -> Modifiers {
    Modifiers {
        visibility: Visibility::Public,
        is_static: false,
        is_final: false,
    }
}

fn default_ctor(owner: &str, params: Vec<JavaType>) -> MethodDecl {
    MethodDecl {
        owner: owner.to_string(),
        name: "<init>".to_string(),
        params,
        ret: JavaType::class(owner),
        modifiers: public(),
        varargs: false,
    }
}

fn builtin(name: &str, superclass: Option<&str>) -> TypeDecl {
    TypeDecl {
        name: name.to_string(),
        package: JAVA_LANG.to_string(),
        file: None,
        visibility: Visibility::Public,
        superclass: superclass.map(str::to_string),
        fields: Vec::new(),
        methods: Vec::new(),
        constructors: Vec::new(),
    }
}

fn builtin_method(owner: &str, name: &str, params: Vec<JavaType>, ret: JavaType) -> MethodDecl {
    MethodDecl {
        owner: owner.to_string(),
        name: name.to_string(),
        params,
        ret,
        modifiers: public(),
        varargs: false,
    }
}

fn builtin_types() -> Vec<TypeDecl> {
    let mut object = builtin("Object", None);
    object.methods = vec![
        builtin_method("Object", "equals", vec![JavaType::object()], JavaType::boolean()),
        builtin_method("Object", "hashCode", vec![], JavaType::int()),
        builtin_method("Object", "toString", vec![], JavaType::string()),
    ];
    object.constructors = vec![default_ctor("Object", vec![])];

    let mut string = builtin("String", Some("Object"));
    string.methods = vec![
        builtin_method("String", "length", vec![], JavaType::int()),
        builtin_method("String", "isEmpty", vec![], JavaType::boolean()),
        builtin_method("String", "charAt", vec![JavaType::int()], JavaType::parse("char")),
        builtin_method("String", "trim", vec![], JavaType::string()),
        builtin_method("String", "substring", vec![JavaType::int(), JavaType::int()], JavaType::string()),
    ];

    let mut types = vec![object, string, builtin("Number", Some("Object"))];
    for (boxed, parent) in [
        ("Integer", "Number"),
        ("Long", "Number"),
        ("Double", "Number"),
        ("Float", "Number"),
        ("Short", "Number"),
        ("Byte", "Number"),
        ("Boolean", "Object"),
        ("Character", "Object"),
    ] {
        types.push(builtin(boxed, Some(parent)));
    }

    for (exception, parent) in [
        ("Throwable", "Object"),
        ("Exception", "Throwable"),
        ("RuntimeException", "Exception"),
        ("IllegalArgumentException", "RuntimeException"),
        ("IllegalStateException", "RuntimeException"),
        ("NullPointerException", "RuntimeException"),
        ("IndexOutOfBoundsException", "RuntimeException"),
    ] {
        let mut decl = builtin(exception, Some(parent));
        decl.constructors = vec![
            default_ctor(exception, vec![]),
            default_ctor(exception, vec![JavaType::string()]),
        ];
        decl.methods = vec![builtin_method(exception, "getMessage", vec![], JavaType::string())];
        types.push(decl);
    }
    types
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::build::*;

    fn shapes_unit() -> Arc<Node> {
        Arc::new(unit(
            "geo",
            vec![
                class(modifiers(Visibility::Public, false), "Shape", None, vec![
                    field(modifiers(Visibility::Private, false), JavaType::int(), "sides", None),
                    method(modifiers(Visibility::Public, false), "area", JavaType::parse("double"), vec![], None),
                ]),
                class(modifiers(Visibility::Public, false), "Square", Some(JavaType::class("Shape")), vec![
                    constructor(
                        modifiers(Visibility::Public, false),
                        vec![parameter(JavaType::int(), "side")],
                        block(vec![]),
                    ),
                ]),
                class(modifiers(Visibility::Package, false), "BadShape", Some(JavaType::class("IllegalStateException")), vec![]),
            ],
        ))
    }

    #[test]
    fn test_subtyping_through_graph() {
        let u = shapes_unit();
        let index = BindingIndex::from_units([("Shape.java", &u)]);
        assert!(index.is_subtype("Square", "Shape"));
        assert!(index.is_subtype("Square", "Object"));
        assert!(!index.is_subtype("Shape", "Square"));
        assert!(index.is_subtype("BadShape", "Throwable"));
    }

    #[test]
    fn test_member_lookup_walks_supertypes() {
        let u = shapes_unit();
        let index = BindingIndex::from_units([("Shape.java", &u)]);
        let sides = index.field(&JavaType::class("Square"), "sides");
        assert_eq!(sides.map(|f| f.owner), Some("Shape".to_string()));
        assert_eq!(index.methods_named("Square", "area").len(), 1);
        assert_eq!(index.methods_named("Square", "hashCode").len(), 1);
        assert_eq!(index.constructors("Square")[0].params, vec![JavaType::int()]);
        assert!(index.field(&JavaType::array_of(JavaType::int()), "length").is_some());
    }

    #[test]
    fn test_exception_constructor_index() {
        let u = shapes_unit();
        let index = BindingIndex::from_units([("Shape.java", &u)]);
        let ctors = index.exception_constructors();
        assert!(ctors.iter().any(|c| c.owner == "IllegalArgumentException" && c.params == vec![JavaType::string()]));
        assert!(ctors.iter().any(|c| c.owner == "BadShape"));
        assert!(!ctors.iter().any(|c| c.owner == "Square"));
        assert!(std::ptr::eq(ctors, index.exception_constructors()));
    }

    #[test]
    fn test_accessibility() {
        assert!(BindingIndex::is_accessible(Visibility::Public, "a", Some("A.java"), "b", "B.java"));
        assert!(!BindingIndex::is_accessible(Visibility::Private, "a", Some("A.java"), "a", "B.java"));
        assert!(BindingIndex::is_accessible(Visibility::Private, "a", Some("A.java"), "a", "A.java"));
        assert!(!BindingIndex::is_accessible(Visibility::Package, "a", Some("A.java"), "b", "B.java"));
    }
}
