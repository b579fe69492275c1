//! Structured dump of a compiled expression tree.

use core::fmt;

use itertools::Itertools;

use crate::compiler::arena::ExprArena;
use crate::compiler::expr::{ExprId, ExprKind, NodeCompareOp, Quantifier, SetOp, VarId};

/// One element of an explain tree: the node kind, its parameters, and its operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainNode {
    pub name: &'static str,
    pub attributes: Vec<(&'static str, String)>,
    pub children: Vec<ExplainNode>,
}

impl ExplainNode {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(n, _)| *n == name).map(|(_, v)| v.as_str())
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        let attributes = self.attributes.iter().map(|(n, v)| format!(" {n}=\"{}\"", escape(v))).join("");
        if self.children.is_empty() {
            return writeln!(f, "{indent}<{}{attributes}/>", self.name);
        }
        writeln!(f, "{indent}<{}{attributes}>", self.name)?;
        for child in &self.children {
            child.write_indented(f, depth + 1)?;
        }
        writeln!(f, "{indent}</{}>", self.name)
    }
}

impl fmt::Display for ExplainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

/// Builds the explain tree of the subtree rooted at `id`.
pub fn explain(arena: &ExprArena, id: ExprId) -> ExplainNode {
    let kind = arena.kind(id);
    let var_name = |v: VarId| format!("${}", arena.var(v).name);
    let mut attributes: Vec<(&'static str, String)> = Vec::new();
    match kind {
        ExprKind::Literal(v) => {
            let value = if v.len() == 1 { v.iter().join("") } else { format!("({})", v.iter().join(", ")) };
            attributes.push(("value", value));
        }
        ExprKind::LocalVarRef(v) => {
            attributes.push(("name", var_name(*v)));
            attributes.push(("slot", v.slot().to_string()));
        }
        ExprKind::GlobalVarRef { name, .. } => attributes.push(("name", format!("${name}"))),
        ExprKind::Arithmetic { op, calculator, backwards_compatible, .. } => {
            attributes.push(("op", op.to_string()));
            if let Some(c) = calculator {
                attributes.push(("calculator", format!("{:?}", c.kind)));
            }
            if *backwards_compatible {
                attributes.push(("xpath1", "true".to_string()));
            }
        }
        ExprKind::ValueComparison { op, comparer, result_when_empty, .. } => {
            attributes.push(("op", op.value_symbol().to_string()));
            attributes.push(("comparer", format!("{comparer:?}")));
            if let Some(b) = result_when_empty {
                attributes.push(("onEmpty", b.to_string()));
            }
        }
        ExprKind::GeneralComparison { op, comparer, strategy, runtime_coercion, .. } => {
            attributes.push(("op", op.general_symbol().to_string()));
            attributes.push(("comparer", format!("{comparer:?}")));
            attributes.push(("strategy", format!("{strategy:?}")));
            if *runtime_coercion {
                attributes.push(("untyped", "true".to_string()));
            }
        }
        ExprKind::IdentityComparison { op, .. } => {
            let op = match op {
                NodeCompareOp::Is => "is",
                NodeCompareOp::Precedes => "<<",
                NodeCompareOp::Follows => ">>",
            };
            attributes.push(("op", op.to_string()));
        }
        ExprKind::Filter { flags, .. } if !flags.is_empty() => {
            let names = flags.iter_names().map(|(n, _)| n.to_ascii_lowercase()).join(" ");
            attributes.push(("flags", names));
        }
        ExprKind::Axis { axis, test } => {
            attributes.push(("name", axis.name().to_string()));
            attributes.push(("nodeTest", test.to_string()));
        }
        ExprKind::Venn { op, .. } => {
            let op = match op {
                SetOp::Union => "union",
                SetOp::Intersect => "intersect",
                SetOp::Except => "except",
            };
            attributes.push(("op", op.to_string()));
        }
        ExprKind::For { var, .. } | ExprKind::Let { var, .. } => {
            attributes.push(("var", var_name(*var)));
            attributes.push(("slot", var.slot().to_string()));
        }
        ExprKind::Quantified { quantifier, var, .. } => {
            let q = match quantifier {
                Quantifier::Some => "some",
                Quantifier::Every => "every",
            };
            attributes.push(("quantifier", q.to_string()));
            attributes.push(("var", var_name(*var)));
        }
        ExprKind::InstanceOf { target, .. } | ExprKind::TreatAs { target, .. } => {
            attributes.push(("of", target.to_string()));
        }
        ExprKind::Castable { target, allows_empty, .. } | ExprKind::Cast { target, allows_empty, .. } => {
            attributes.push(("as", format!("xs:{}{}", target.local_name(), if *allows_empty { "?" } else { "" })));
        }
        ExprKind::UntypedConverter { target, .. } => attributes.push(("to", target.to_string())),
        ExprKind::CardinalityChecker { required, role, .. } => {
            attributes.push(("card", required.to_string()));
            attributes.push(("role", role.to_string()));
        }
        ExprKind::ItemChecker { required, role, .. } => {
            attributes.push(("type", required.to_string()));
            attributes.push(("role", role.to_string()));
        }
        ExprKind::IsLast { condition } => attributes.push(("condition", condition.to_string())),
        ExprKind::FunctionCall { function, .. } => attributes.push(("name", function.local_name().to_string())),
        _ => {}
    }
    let children = arena.children(id).into_iter().map(|c| explain(arena, c)).collect();
    ExplainNode { name: kind.name(), attributes, children }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::calculator::ArithOp;

    #[test]
    fn renders_nested_elements() {
        let mut arena = ExprArena::new();
        let one = arena.integer(1);
        let two = arena.string("a<b");
        let sum = arena.arithmetic(ArithOp::Plus, one, two);
        let tree = explain(&arena, sum);
        assert_eq!(tree.name, "arith");
        assert_eq!(tree.attribute("op"), Some("+"));
        let text = tree.to_string();
        assert_eq!(
            text,
            "<arith op=\"+\">\n  <literal value=\"integer(1)\"/>\n  <literal value=\"&quot;a&lt;b&quot;\"/>\n</arith>\n"
        );
    }
}
