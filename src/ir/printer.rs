//! Java-like source rendering of nodes, for logs, test assertions and textual comparison.

use std::fmt;

use super::kind::{KindTag, Role};
use super::node::{Literal, Node, TraitValue, Visibility};

const INDENT: &str = "    ";

/// Renders a node. Statements end with `;`, blocks span several lines.
pub fn print(node: &Node) -> String {
    if node.is_expression() {
        expr(node, 0)
    } else {
        stmt(node, 0)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print(self))
    }
}

fn pad(depth: usize) -> String {
    INDENT.repeat(depth)
}

fn child(node: &Node, role: Role) -> Option<&Node> {
    node.present_child(role).map(|c| &**c)
}

fn items(node: Option<&Node>) -> Vec<&Node> {
    match node {
        Some(Node::Collection { items, .. }) => items.iter().map(|i| &**i).collect(),
        Some(other) => vec![other],
        None => Vec::new(),
    }
}

fn name_of(node: &Node, role: Role) -> String {
    child(node, role).map(|n| expr(n, 0)).unwrap_or_default()
}

fn modifier_prefix(node: &Node) -> String {
    let Some(Node::Trait(TraitValue::Modifiers(m))) = child(node, Role::Modifiers) else {
        return String::new();
    };
    let mut parts = Vec::new();
    match m.visibility {
        Visibility::Public => parts.push("public"),
        Visibility::Protected => parts.push("protected"),
        Visibility::Private => parts.push("private"),
        Visibility::Package => {}
    }
    if m.is_static {
        parts.push("static");
    }
    if m.is_final {
        parts.push("final");
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("{} ", parts.join(" "))
    }
}

fn stmt(node: &Node, depth: usize) -> String {
    let Node::Element { kind, .. } = node else {
        return match node {
            Node::Collection { items, .. } => items
                .iter()
                .map(|s| stmt(s, depth))
                .collect::<Vec<_>>()
                .join(format!("\n{}", pad(depth)).as_str()),
            other => expr(other, 0),
        };
    };
    let c = |role| child(node, role);
    match kind {
        KindTag::Block => {
            let body = items(c(Role::Statements));
            if body.is_empty() {
                return "{}".to_string();
            }
            let mut out = String::from("{\n");
            for s in body {
                out.push_str(&pad(depth + 1));
                out.push_str(&stmt(s, depth + 1));
                out.push('\n');
            }
            out.push_str(&pad(depth));
            out.push('}');
            out
        }
        KindTag::If => {
            let mut out = format!("if ({}) {}", opt_expr(c(Role::Condition)), opt_stmt(c(Role::Then), depth));
            if let Some(otherwise) = c(Role::Else) {
                out.push_str(" else ");
                out.push_str(&stmt(otherwise, depth));
            }
            out
        }
        KindTag::While => format!(
            "while ({}) {}",
            opt_expr(c(Role::Condition)),
            opt_stmt(c(Role::Body), depth)
        ),
        KindTag::DoWhile => format!(
            "do {} while ({});",
            opt_stmt(c(Role::Body), depth),
            opt_expr(c(Role::Condition))
        ),
        KindTag::For => {
            let inline = |role| {
                items(c(role))
                    .into_iter()
                    .map(|s| stmt(s, depth).trim_end_matches(';').to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            format!(
                "for ({}; {}; {}) {}",
                inline(Role::Init),
                opt_expr(c(Role::Condition)),
                inline(Role::Update),
                opt_stmt(c(Role::Body), depth)
            )
        }
        KindTag::ForEach => {
            let variable = c(Role::Variable).map(|v| stmt(v, depth)).unwrap_or_default();
            format!(
                "for ({} : {}) {}",
                variable.trim_end_matches(';'),
                opt_expr(c(Role::Iterable)),
                opt_stmt(c(Role::Body), depth)
            )
        }
        KindTag::Return => match c(Role::Expression) {
            Some(e) => format!("return {};", expr(e, 0)),
            None => "return;".to_string(),
        },
        KindTag::Throw => format!("throw {};", opt_expr(c(Role::Expression))),
        KindTag::LocalVariable | KindTag::Field => {
            let head = format!("{}{} {}", modifier_prefix(node), name_of(node, Role::Type), name_of(node, Role::Name));
            match c(Role::Initializer) {
                Some(init) => format!("{} = {};", head, expr(init, 0)),
                None => format!("{};", head),
            }
        }
        KindTag::Break => "break;".to_string(),
        KindTag::Continue => "continue;".to_string(),
        KindTag::Try => {
            let mut out = format!("try {}", opt_stmt(c(Role::Body), depth));
            for catcher in items(c(Role::Catchers)) {
                out.push(' ');
                out.push_str(&stmt(catcher, depth));
            }
            if let Some(finalizer) = c(Role::Finalizer) {
                out.push_str(" finally ");
                out.push_str(&stmt(finalizer, depth));
            }
            out
        }
        KindTag::Catch => {
            let parameter = c(Role::Parameter).map(|p| stmt(p, depth)).unwrap_or_default();
            format!(
                "catch ({}) {}",
                parameter.trim_end_matches(';'),
                opt_stmt(c(Role::Body), depth)
            )
        }
        KindTag::Parameter => format!("{} {}", name_of(node, Role::Type), name_of(node, Role::Name)),
        KindTag::Method | KindTag::Constructor => {
            let params = items(c(Role::Parameters))
                .into_iter()
                .map(|p| stmt(p, depth))
                .collect::<Vec<_>>()
                .join(", ");
            let head = if *kind == KindTag::Method {
                format!("{}{} {}", modifier_prefix(node), name_of(node, Role::ReturnType), name_of(node, Role::Name))
            } else {
                format!("{}<init>", modifier_prefix(node))
            };
            match c(Role::Body) {
                Some(body) => format!("{}({}) {}", head, params, stmt(body, depth)),
                None => format!("{}({});", head, params),
            }
        }
        KindTag::Class => {
            let mut out = format!("{}class {}", modifier_prefix(node), name_of(node, Role::Name));
            if let Some(superclass) = c(Role::Superclass) {
                out.push_str(" extends ");
                out.push_str(&expr(superclass, 0));
            }
            out.push_str(" {\n");
            for member in items(c(Role::Members)) {
                out.push_str(&pad(depth + 1));
                out.push_str(&stmt(member, depth + 1));
                out.push('\n');
            }
            out.push_str(&pad(depth));
            out.push('}');
            out
        }
        KindTag::CompilationUnit => {
            let classes = items(c(Role::Types))
                .into_iter()
                .map(|k| stmt(k, depth))
                .collect::<Vec<_>>()
                .join("\n\n");
            format!("package {};\n\n{}", name_of(node, Role::Package), classes)
        }
        _ => format!("{};", expr(node, 0)),
    }
}

fn opt_stmt(node: Option<&Node>, depth: usize) -> String {
    node.map(|n| stmt(n, depth)).unwrap_or_else(|| ";".to_string())
}

fn opt_expr(node: Option<&Node>) -> String {
    node.map(|n| expr(n, 0)).unwrap_or_default()
}

fn precedence(node: &Node) -> u8 {
    let Node::Element { kind, .. } = node else {
        return 15;
    };
    match kind {
        KindTag::Assignment | KindTag::OperatorAssignment => 1,
        KindTag::Conditional => 2,
        KindTag::BinaryOperator => match child(node, Role::Operator) {
            Some(Node::Trait(TraitValue::BinaryOp(op))) => binary_precedence(op.symbol()),
            _ => 3,
        },
        KindTag::UnaryOperator | KindTag::Cast => 13,
        _ => 15,
    }
}

fn binary_precedence(symbol: &str) -> u8 {
    match symbol {
        "||" => 3,
        "&&" => 4,
        "|" => 5,
        "^" => 6,
        "&" => 7,
        "==" | "!=" => 8,
        "<" | "<=" | ">" | ">=" => 9,
        "<<" | ">>" | ">>>" => 10,
        "+" | "-" => 11,
        _ => 12,
    }
}

fn expr(node: &Node, min_prec: u8) -> String {
    let text = expr_inner(node);
    if precedence(node) < min_prec {
        format!("({})", text)
    } else {
        text
    }
}

fn args(node: Option<&Node>) -> String {
    items(node)
        .into_iter()
        .map(|a| expr(a, 0))
        .collect::<Vec<_>>()
        .join(", ")
}

fn qualified(target: Option<&Node>, member: String) -> String {
    match target {
        Some(t) => format!("{}.{}", expr(t, 14), member),
        None => member,
    }
}

fn expr_inner(node: &Node) -> String {
    match node {
        Node::Trait(value) => trait_text(value),
        Node::Reference(reference) => reference.name.clone(),
        Node::Collection { .. } => format!("[{}]", args(Some(node))),
        Node::Element { kind, .. } => {
            let c = |role| child(node, role);
            match kind {
                KindTag::Literal => opt_expr(c(Role::Value)),
                KindTag::VariableRead | KindTag::TypeAccess => {
                    opt_expr(c(Role::Variable).or_else(|| c(Role::Type)))
                }
                KindTag::FieldRead => qualified(c(Role::Target), opt_expr(c(Role::Field))),
                KindTag::ArrayRead => format!("{}[{}]", expr_or_empty(c(Role::Target), 14), opt_expr(c(Role::Index))),
                KindTag::Invocation => qualified(
                    c(Role::Target),
                    format!("{}({})", opt_expr(c(Role::Executable)), args(c(Role::Arguments))),
                ),
                KindTag::ConstructorCall => {
                    let owner = match c(Role::Executable) {
                        Some(Node::Reference(r)) => r.owner.clone().unwrap_or_else(|| r.name.clone()),
                        Some(other) => expr(other, 0),
                        None => String::new(),
                    };
                    format!("new {}({})", owner, args(c(Role::Arguments)))
                }
                KindTag::Assignment => format!(
                    "{} = {}",
                    expr_or_empty(c(Role::Assigned), 2),
                    expr_or_empty(c(Role::Value), 1)
                ),
                KindTag::OperatorAssignment => format!(
                    "{} {}= {}",
                    expr_or_empty(c(Role::Assigned), 2),
                    opt_expr(c(Role::Operator)),
                    expr_or_empty(c(Role::Value), 1)
                ),
                KindTag::BinaryOperator => {
                    let prec = precedence(node);
                    format!(
                        "{} {} {}",
                        expr_or_empty(c(Role::Left), prec),
                        opt_expr(c(Role::Operator)),
                        expr_or_empty(c(Role::Right), prec + 1)
                    )
                }
                KindTag::UnaryOperator => {
                    let operand = expr_or_empty(c(Role::Operand), 13);
                    match c(Role::Operator) {
                        Some(Node::Trait(TraitValue::UnaryOp(op))) if op.is_postfix() => {
                            format!("{}{}", operand, op.symbol())
                        }
                        Some(op) => format!("{}{}", expr(op, 0), operand),
                        None => operand,
                    }
                }
                KindTag::Conditional => format!(
                    "{} ? {} : {}",
                    expr_or_empty(c(Role::Condition), 3),
                    expr_or_empty(c(Role::Then), 2),
                    expr_or_empty(c(Role::Else), 2)
                ),
                KindTag::Cast => format!("({}) {}", opt_expr(c(Role::Type)), expr_or_empty(c(Role::Expression), 13)),
                KindTag::ThisAccess => "this".to_string(),
                _ => stmt(node, 0),
            }
        }
    }
}

fn expr_or_empty(node: Option<&Node>, min_prec: u8) -> String {
    node.map(|n| expr(n, min_prec)).unwrap_or_default()
}

fn trait_text(value: &TraitValue) -> String {
    match value {
        TraitValue::BinaryOp(op) => op.symbol().to_string(),
        TraitValue::UnaryOp(op) => op.symbol().to_string(),
        TraitValue::Literal(literal) => match literal {
            Literal::Int(v) => v.to_string(),
            Literal::Long(v) => format!("{}L", v),
            Literal::Double(text) => text.clone(),
            Literal::Bool(v) => v.to_string(),
            Literal::Char(c) => format!("'{}'", c.escape_default()),
            Literal::Str(s) => format!("\"{}\"", s.escape_default()),
            Literal::Null => "null".to_string(),
        },
        TraitValue::Name(name) => name.clone(),
        TraitValue::Modifiers(_) => String::new(),
        TraitValue::Absent => String::new(),
    }
}
