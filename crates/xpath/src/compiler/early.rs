//! Compile-time evaluation of constant subexpressions.

use std::sync::Arc;

use crate::compiler::arena::ExprArena;
use crate::compiler::expr::{ExprId, ExprKind};
use crate::compiler::functions::SystemFunction;
use crate::compiler::properties::Dependencies;
use crate::engine::context::{Controller, XPathContext};
use crate::engine::evaluator;
use crate::engine::runtime::{Error, StaticContext};
use crate::model::{NodeKind, QName, XdmNode};
use crate::xdm::{GroundedValue, XdmAtomicValue};

/// Literal operands larger than this are not folded.
const FOLD_INPUT_LIMIT: usize = 4096;

/// Outcome of evaluating a subexpression while compiling.
#[derive(Debug)]
pub(crate) enum Speculation {
    Value(GroundedValue),
    /// Evaluation raises this error; it is reported at run time if the expression runs.
    Failed(Error),
    /// The outcome depends on something only the dynamic context knows.
    Undecidable,
}

/// Node type of compile-time evaluation. No value of it exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Unreachable {}

impl XdmNode for Unreachable {
    fn kind(&self) -> NodeKind {
        match *self {}
    }

    fn name(&self) -> Option<QName> {
        match *self {}
    }

    fn string_value(&self) -> String {
        match *self {}
    }

    fn parent(&self) -> Option<Self> {
        match *self {}
    }

    fn children(&self) -> Vec<Self> {
        match *self {}
    }

    fn attributes(&self) -> Vec<Self> {
        match *self {}
    }
}

fn small_literal(arena: &ExprArena, id: ExprId) -> bool {
    arena.kind(id).as_literal().is_some_and(|v| v.len() <= FOLD_INPUT_LIMIT)
}

/// Whether `id` is a candidate for folding: its value operands are small literals and
/// it reads nothing from the dynamic context.
pub(crate) fn foldable(arena: &ExprArena, id: ExprId) -> bool {
    use ExprKind as K;
    let outside = Dependencies::FOCUS | Dependencies::LOCAL_VARIABLES | Dependencies::GLOBAL_VARIABLES;
    if arena.dependencies(id).intersects(outside) {
        return false;
    }
    match arena.kind(id) {
        K::Filter { base, .. } => small_literal(arena, *base),
        K::FunctionCall { function, args } => {
            !matches!(function, SystemFunction::Position | SystemFunction::Last)
                && args.iter().all(|a| small_literal(arena, *a))
        }
        K::Arithmetic { .. }
        | K::Negate { .. }
        | K::Boolean { .. }
        | K::ValueComparison { .. }
        | K::GeneralComparison { .. }
        | K::IntegerRangeTest { .. }
        | K::Block { .. }
        | K::FirstItem { .. }
        | K::LastItem { .. }
        | K::Subscript { .. }
        | K::Conditional { .. }
        | K::InstanceOf { .. }
        | K::Castable { .. }
        | K::Cast { .. }
        | K::TreatAs { .. }
        | K::Atomizer { .. }
        | K::UntypedConverter { .. }
        | K::CardinalityChecker { .. }
        | K::ItemChecker { .. } => arena.children(id).iter().all(|c| small_literal(arena, *c)),
        _ => false,
    }
}

/// Evaluates the subtree at `id` without a dynamic context.
pub(crate) fn speculate(arena: &ExprArena, id: ExprId, static_ctx: &StaticContext) -> Speculation {
    if !arena.free_variables(id).is_empty() {
        return Speculation::Undecidable;
    }
    let (sub, root) = arena.extract(id);
    let controller = match Controller::<Unreachable>::speculative(Arc::new(sub), static_ctx) {
        Ok(c) => c,
        Err(_) => return Speculation::Undecidable,
    };
    let ctx = XPathContext::initial(controller, None);
    let outcome = match evaluator::materialize(&ctx, root) {
        Ok(items) => match GroundedValue::from_items(&items) {
            Some(v) => Speculation::Value(v),
            None => Speculation::Undecidable,
        },
        Err(e) if e.is_deferred() => Speculation::Undecidable,
        Err(e) => Speculation::Failed(e),
    };
    match &outcome {
        Speculation::Value(v) => {
            tracing::trace!(target: "xpath_core::optimizer", node = %id, items = v.len(), "speculation succeeded");
        }
        Speculation::Failed(e) => {
            tracing::trace!(target: "xpath_core::optimizer", node = %id, code = e.code_str(), "speculation failed");
        }
        Speculation::Undecidable => {
            tracing::trace!(target: "xpath_core::optimizer", node = %id, "speculation undecidable");
        }
    }
    outcome
}

/// The single boolean a literal holds, if that is all it holds.
pub(crate) fn literal_boolean(arena: &ExprArena, id: ExprId) -> Option<bool> {
    match arena.kind(id).as_literal()?.as_singleton()? {
        XdmAtomicValue::Boolean(b) => Some(b),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::calculator::ArithOp;
    use crate::engine::runtime::ErrorCode;

    #[test]
    fn folds_integer_arithmetic() {
        let mut a = ExprArena::new();
        let l = a.integer(6);
        let r = a.integer(7);
        let m = a.arithmetic(ArithOp::Times, l, r);
        assert!(foldable(&a, m));
        match speculate(&a, m, &StaticContext::default()) {
            Speculation::Value(v) => assert_eq!(v.as_singleton(), Some(XdmAtomicValue::Integer(42))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn division_by_zero_is_kept_for_run_time() {
        let mut a = ExprArena::new();
        let l = a.integer(1);
        let r = a.integer(0);
        let d = a.arithmetic(ArithOp::Div, l, r);
        match speculate(&a, d, &StaticContext::default()) {
            Speculation::Failed(e) => assert_eq!(e.code, ErrorCode::FOAR0001),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn focus_dependent_trees_are_not_foldable() {
        let mut a = ExprArena::new();
        let c = a.context_item();
        let one = a.integer(1);
        let sum = a.arithmetic(ArithOp::Plus, c, one);
        assert!(!foldable(&a, sum));
    }
}
