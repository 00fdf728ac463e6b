use std::sync::Arc;

use genesis::config::EngineConfig;
use genesis::diff::{CandidateUnit, decompose};
use genesis::ir::build::*;
use genesis::ir::kind::KindTag;
use genesis::ir::node::{BinaryOp, Node, Visibility, deep_eq, preorder};
use genesis::ir::site::Site;
use genesis::ir::types::JavaType;
use genesis::mining::{self, Example};
use genesis::schema::{SchemaInstance, SchemaNode};
use genesis::scope::Tier;
use genesis::session::Session;
use indoc::indoc;
use quickcheck::{Arbitrary, Gen, QuickCheck, TestResult};

fn file(ret_ty: JavaType, params: Vec<Node>, statements: Vec<Node>) -> Arc<Node> {
    Arc::new(unit(
        "app",
        vec![class(
            modifiers(Visibility::Public, false),
            "Main",
            None,
            vec![
                field(modifiers(Visibility::Private, false), JavaType::int(), "count", None),
                method(modifiers(Visibility::Public, false), "run", ret_ty, params, Some(block(statements))),
            ],
        )],
    ))
}

fn site_of(root: &Arc<Node>, tag: KindTag) -> Site {
    let target = preorder(root).into_iter().find(|n| n.tag() == tag).unwrap();
    Site::locate(root, &target).unwrap()
}

fn unit_at(root: &Arc<Node>, tag: KindTag, after: Node) -> CandidateUnit {
    CandidateUnit::new(site_of(root, tag), Arc::new(after))
}

fn session() -> Session {
    Session::from_units(&[], EngineConfig::default())
}

#[test]
fn test_length_increment_scenario() {
    let ints = JavaType::array_of(JavaType::int());
    let a_length = || field_read(Some(read_param("a", ints.clone())), "int[]", "length", JavaType::int());
    let before = file(JavaType::Void, vec![parameter(ints.clone(), "a")], vec![local_var(
        JavaType::int(),
        "x",
        Some(a_length()),
    )]);
    let after = file(JavaType::Void, vec![parameter(ints.clone(), "a")], vec![local_var(
        JavaType::int(),
        "x",
        Some(binary(BinaryOp::Add, a_length(), int(1))),
    )]);

    let session = session();
    let units = decompose(before, after, session.config());
    let statement = units
        .into_iter()
        .find(|u| u.before_node().tag() == KindTag::LocalVariable)
        .unwrap();
    let schema = mining::generalize(&session, &[statement]).unwrap();
    assert_eq!(schema.post.to_string(), "$0 $1 = $2 + 1;");
    assert!(schema.post_only_vars().is_empty());

    let buf = JavaType::class("Buf");
    let b_size = field_read(Some(read_param("b", buf.clone())), "Buf", "size", JavaType::int());
    let target = file(JavaType::Void, vec![parameter(buf, "b")], vec![local_var(
        JavaType::int(),
        "y",
        Some(b_size.clone()),
    )]);
    let site = site_of(&target, KindTag::LocalVariable);
    let mut instance = SchemaInstance::new(&schema, &session);
    assert!(instance.match_site(&site));
    let shared = schema.pre_vars()[2];
    assert!(deep_eq(instance.binding(shared).unwrap(), &Arc::new(b_size)));

    let rebuilt = instance.type_checked(&site).unwrap().unwrap();
    assert_eq!(rebuilt.to_string(), "int y = b.size + 1;");
    let patched = instance.apply(&site).unwrap().unwrap();
    let expected = indoc! {"
        {
            int y = b.size + 1;
        }"};
    let body = preorder(&patched).into_iter().find(|n| n.tag() == KindTag::Block).unwrap();
    assert_eq!(body.to_string(), expected);
}

#[test]
fn test_repeated_example_reproduces_after() {
    let session = session();
    let k = || read_param("k", JavaType::int());
    let root = file(JavaType::int(), vec![parameter(JavaType::int(), "k")], vec![ret(Some(k()))]);
    let after = ret(Some(binary(BinaryOp::Sub, k(), int(1))));
    for n in 1..=4 {
        let units = vec![unit_at(&root, KindTag::Return, after.clone()); n];
        let schema = mining::generalize(&session, &units).unwrap();
        let mut instance = SchemaInstance::new(&schema, &session);
        assert!(instance.match_node(units[0].before_node()));
        let rebuilt = instance.rebuild().unwrap().unwrap();
        assert!(deep_eq(&rebuilt, &units[0].after), "n = {}: {}", n, rebuilt);
    }
}

#[test]
fn test_shared_subtree_is_one_variable() {
    let session = session();
    let sum = || method_ref("Main", "sum", vec![JavaType::int(), JavaType::int()], JavaType::int());
    let params = || vec![parameter(JavaType::int(), "c"), parameter(JavaType::int(), "d")];
    let doubled = |left: &str, right: &str| {
        let read = |name: &str| read_param(name, JavaType::int());
        file(JavaType::int(), params(), vec![ret(Some(call(None, sum(), vec![read(left), read(right)])))])
    };
    let pair = |name: &str| {
        unit_at(
            &doubled(name, name),
            KindTag::Return,
            ret(Some(binary(BinaryOp::Mul, int(2), read_param(name, JavaType::int())))),
        )
    };
    let schema = mining::generalize(&session, &[pair("c"), pair("d")]).unwrap();
    let SchemaNode::FixedElement { children, .. } = &schema.pre else {
        panic!("unexpected pre {}", schema.pre);
    };
    let vars = children[0].vars();
    assert_eq!(vars.len(), 2);
    assert_eq!(schema.pre.to_string(), "return $0($1, $1);");

    let differing = doubled("c", "d");
    let mut instance = SchemaInstance::new(&schema, &session);
    assert!(!instance.match_site(&site_of(&differing, KindTag::Return)));
}

#[test]
fn test_identity_schema_reproduces_input() {
    let session = session();
    let root = file(JavaType::int(), vec![parameter(JavaType::int(), "k")], vec![ret(Some(binary(
        BinaryOp::Add,
        read_param("k", JavaType::int()),
        int(3),
    )))]);
    let site = site_of(&root, KindTag::Return);
    let unit = CandidateUnit::new(site.clone(), Arc::new((**site.node()).clone()));
    let schema = mining::generalize(&session, &[unit]).unwrap();
    assert!(schema.post_only_vars().is_empty());
    let mut instance = SchemaInstance::new(&schema, &session);
    assert!(instance.match_site(&site));
    assert!(deep_eq(&instance.rebuild().unwrap().unwrap(), site.node()));
}

#[test]
fn test_incompatible_return_type_is_rejected() {
    let session = session();
    let k = || read_param("k", JavaType::int());
    let training = file(JavaType::boolean(), vec![parameter(JavaType::int(), "k")], vec![ret(Some(k()))]);
    let unit = unit_at(&training, KindTag::Return, ret(Some(binary(BinaryOp::Eq, k(), int(0)))));
    let schema = mining::generalize(&session, &[unit]).unwrap();

    let target = file(JavaType::int(), vec![parameter(JavaType::int(), "j")], vec![ret(Some(read_param(
        "j",
        JavaType::int(),
    )))]);
    let site = site_of(&target, KindTag::Return);
    let mut instance = SchemaInstance::new(&schema, &session);
    assert!(instance.match_site(&site));
    // Structure and local typing are fine; the enclosing routine returns int.
    assert!(instance.rebuild().unwrap().is_some());
    assert_eq!(instance.type_checked(&site).unwrap(), None);
    assert_eq!(instance.apply(&site).unwrap(), None);
}

#[test]
fn test_carried_local_must_keep_its_type() {
    let session = session();
    let with_x = |ty: JavaType, value: Node| {
        file(JavaType::int(), vec![], vec![local_var(ty, "x", Some(value)), ret(Some(int(0)))])
    };
    let training = with_x(JavaType::int(), int(3));
    let unit = unit_at(&training, KindTag::Return, ret(Some(read_local("x", JavaType::int()))));
    let schema = mining::generalize(&session, &[unit]).unwrap();
    let carried = schema.post_only_vars();
    assert_eq!(carried.len(), 1);
    assert!(schema.inferable.contains_key(&carried[0]));

    let same = with_x(JavaType::int(), int(7));
    let site = site_of(&same, KindTag::Return);
    let mut instance = SchemaInstance::new(&schema, &session);
    assert!(instance.match_site(&site));
    let rebuilt = instance.type_checked(&site).unwrap().map(|n| n.to_string());
    assert_eq!(rebuilt.as_deref(), Some("return x;"));

    let retyped = with_x(JavaType::string(), string("s"));
    let site = site_of(&retyped, KindTag::Return);
    assert!(instance.match_site(&site));
    assert_eq!(instance.type_checked(&site).unwrap(), None);
}

#[test]
fn test_classify_respects_nesting() {
    let session = session();
    let root = file(JavaType::int(), vec![parameter(JavaType::int(), "k")], vec![ret(Some(int(0)))]);
    let analyzer = session.analyzer(&site_of(&root, KindTag::Return));
    let reference = |node: Node| match node {
        Node::Reference(r) => r,
        _ => unreachable!(),
    };
    let k = reference(param_ref("k", JavaType::int()));
    let count = reference(field_ref("Main", "count", JavaType::int()));
    let length = reference(method_ref("String", "length", vec![], JavaType::int()));
    let missing = reference(method_ref("Nowhere", "go", vec![], JavaType::Void));

    assert_eq!(analyzer.classify(&k), Some(Tier::Function));
    assert_eq!(analyzer.classify(&count), Some(Tier::File));
    assert_eq!(analyzer.classify(&length), Some(Tier::Binding));
    assert_eq!(analyzer.classify(&missing), None);
    // A reference resolving inside the fragment is Before, never narrower elsewhere.
    let body = site_of(&root, KindTag::Return);
    let zero = preorder(body.node()).into_iter().find(|n| n.tag() == KindTag::Literal).unwrap();
    let inner = session.analyzer(&Site::locate(&root, &zero).unwrap());
    for (r, truth) in [(&k, Tier::Function), (&count, Tier::File), (&length, Tier::Binding)] {
        let tier = inner.classify(r).unwrap();
        assert!(tier.index() >= truth.index(), "{:?} classified as {:?}", truth, tier);
    }
}

#[test]
fn test_coverage_over_decomposed_corpus() {
    let session = session();
    let pair = |name: &str| {
        let k = || read_param(name, JavaType::int());
        let before = file(JavaType::int(), vec![parameter(JavaType::int(), name)], vec![ret(Some(k()))]);
        let after = file(JavaType::int(), vec![parameter(JavaType::int(), name)], vec![ret(Some(unary(
            genesis::ir::node::UnaryOp::Neg,
            k(),
        )))]);
        decompose(before, after, session.config())
            .into_iter()
            .find(|u| u.before_node().tag() == KindTag::Return)
            .unwrap()
    };
    let corpus: Vec<Example> = ["p", "q", "r"]
        .into_iter()
        .enumerate()
        .map(|(id, name)| Example::new(id, pair(name)))
        .collect();
    let schema = mining::generalize(&session, &[corpus[0].unit.clone(), corpus[1].unit.clone()]).unwrap();
    let covered = mining::coverage(&session, &schema, &corpus);
    assert_eq!(covered.len(), 3);
    assert!(covered.values().all(|cost| *cost == 0));
    assert!(mining::coverage(&session, &schema, &[]).is_empty());
}

#[test]
fn test_no_input_yields_no_candidates() {
    let session = session();
    assert!(mining::generalize(&session, &[]).is_none());
    let root = file(JavaType::Void, vec![], vec![]);
    assert!(decompose(Arc::clone(&root), root, session.config()).is_empty());
}

/// Small integer expressions over two parameters.
#[derive(Debug, Clone)]
struct Expr(Node);

fn arbitrary_expr(g: &mut Gen, depth: usize) -> Node {
    let choice = u8::arbitrary(g) % if depth == 0 { 2 } else { 5 };
    match choice {
        0 => int(i32::from(i8::arbitrary(g))),
        1 => read_param(if bool::arbitrary(g) { "k" } else { "m" }, JavaType::int()),
        _ => {
            let op = *g.choose(&[BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul]).unwrap();
            binary(op, arbitrary_expr(g, depth - 1), arbitrary_expr(g, depth - 1))
        }
    }
}

impl Arbitrary for Expr {
    fn arbitrary(g: &mut Gen) -> Self {
        Expr(arbitrary_expr(g, 3))
    }
}

#[test]
fn test_generalize_then_rebuild_reproduces_after() {
    fn prop(expr: Expr, copies: u8) -> TestResult {
        let copies = usize::from(copies % 3) + 1;
        let session = session();
        let params = vec![parameter(JavaType::int(), "k"), parameter(JavaType::int(), "m")];
        let root = file(JavaType::int(), params, vec![ret(Some(expr.0.clone()))]);
        let after = ret(Some(binary(BinaryOp::Add, expr.0, int(1))));
        let units = vec![unit_at(&root, KindTag::Return, after); copies];
        let Some(schema) = mining::generalize(&session, &units) else {
            return TestResult::failed();
        };
        let site = site_of(&root, KindTag::Return);
        let mut instance = SchemaInstance::new(&schema, &session);
        if !instance.match_site(&site) {
            return TestResult::failed();
        }
        match instance.rebuild() {
            Ok(Some(rebuilt)) => TestResult::from_bool(deep_eq(&rebuilt, &units[0].after)),
            _ => TestResult::failed(),
        }
    }

    QuickCheck::new()
        .tests(200)
        .quickcheck(prop as fn(Expr, u8) -> TestResult);
}
