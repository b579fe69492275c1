//! Value and general comparisons: operand coercion during type checking, and the
//! rewrites that pick a cheaper evaluation during optimization.

use smallvec::smallvec;

use crate::compiler::expr::{ComparisonStrategy, ExprId, ExprKind};
use crate::compiler::functions::SystemFunction;
use crate::compiler::visitor::ExpressionVisitor;
use crate::engine::comparer::{CompareOp, Comparer, general_untyped_target};
use crate::engine::runtime::{Error, ErrorCode};
use crate::types::{AtomicType, Cardinality, ItemType, type_hierarchy};
use crate::xdm::{GroundedValue, XdmAtomicValue};

fn not_comparable(op: &str, lt: AtomicType, rt: AtomicType) -> Error {
    Error::static_type(ErrorCode::XPTY0004, format!("cannot compare {lt} to {rt} using '{op}'"))
}

impl ExpressionVisitor<'_> {
    pub(super) fn type_check_value_comparison(&mut self, id: ExprId) -> Result<ExprId, Error> {
        let ExprKind::ValueComparison { op, lhs, rhs, .. } = self.arena.kind(id).clone() else {
            return Ok(id);
        };
        let symbol = op.value_symbol();
        let lhs = self.comparison_operand(id, lhs, &format!("the first operand of '{symbol}'"))?;
        let rhs = self.comparison_operand(id, rhs, &format!("the second operand of '{symbol}'"))?;
        let lt = self.arena.item_type(lhs).primitive_atomic();
        let rt = self.arena.item_type(rhs).primitive_atomic();
        let comparer = match Comparer::resolve(lt, rt, false) {
            Some(c) if c.supports(op, lt, rt) => c,
            _ => return Err(not_comparable(symbol, lt, rt)),
        };
        if let ExprKind::ValueComparison { comparer: c, .. } = self.arena.kind_mut(id) {
            *c = comparer;
        }
        Ok(self.fold(id))
    }

    fn comparison_operand(&mut self, id: ExprId, operand: ExprId, role: &str) -> Result<ExprId, Error> {
        let operand = self.atomized(id, operand);
        let operand = self.checked_cardinality(id, operand, Cardinality::ZERO_OR_ONE, role)?;
        Ok(self.untyped_to(id, operand, AtomicType::String))
    }

    pub(super) fn type_check_general_comparison(&mut self, id: ExprId) -> Result<ExprId, Error> {
        let ExprKind::GeneralComparison { op, lhs, rhs, .. } = self.arena.kind(id).clone() else {
            return Ok(id);
        };
        let mut lhs = self.atomized(id, lhs);
        let mut rhs = self.atomized(id, rhs);
        let untyped = ItemType::UNTYPED;
        let (lt, rt) = (self.arena.item_type(lhs), self.arena.item_type(rhs));
        if lt == untyped && rt == untyped {
            lhs = self.untyped_to(id, lhs, AtomicType::String);
            rhs = self.untyped_to(id, rhs, AtomicType::String);
        } else if lt == untyped {
            if let Some(target) = general_untyped_target(rt.primitive_atomic()) {
                lhs = self.untyped_to(id, lhs, target);
            }
        } else if rt == untyped {
            if let Some(target) = general_untyped_target(lt.primitive_atomic()) {
                rhs = self.untyped_to(id, rhs, target);
            }
        }

        let runtime_coercion =
            self.arena.item_type(lhs).may_be_untyped() || self.arena.item_type(rhs).may_be_untyped();
        let lt = self.arena.item_type(lhs).primitive_atomic();
        let rt = self.arena.item_type(rhs).primitive_atomic();
        let symbol = op.general_symbol();
        let comparer = match Comparer::resolve(lt, rt, false) {
            Some(c) if runtime_coercion || c.supports(op, lt, rt) => c,
            Some(_) => return Err(not_comparable(symbol, lt, rt)),
            // untyped values are converted pair by pair, so any static type may still work
            None if runtime_coercion => Comparer::Dynamic,
            None => return Err(not_comparable(symbol, lt, rt)),
        };

        let singletons = self.arena.cardinality(lhs).is_at_most_one() && self.arena.cardinality(rhs).is_at_most_one();
        if singletons && !runtime_coercion {
            let vc = self.arena.add_like(
                ExprKind::ValueComparison { op, lhs, rhs, comparer, result_when_empty: Some(false) },
                id,
            );
            self.record("general-to-value", vc);
            return Ok(self.fold(vc));
        }
        if let ExprKind::GeneralComparison { comparer: c, runtime_coercion: r, .. } = self.arena.kind_mut(id) {
            *c = comparer;
            *r = runtime_coercion;
        }
        Ok(self.fold(id))
    }

    fn is_numeric_singleton(&self, id: ExprId) -> bool {
        self.arena.cardinality(id).is_at_most_one()
            && type_hierarchy().is_subtype(&self.arena.item_type(id), &ItemType::NUMERIC)
    }

    fn is_numeric(&self, id: ExprId) -> bool {
        type_hierarchy().is_subtype(&self.arena.item_type(id), &ItemType::NUMERIC)
    }

    pub(super) fn optimize_general_comparison(&mut self, id: ExprId) -> Result<ExprId, Error> {
        let ExprKind::GeneralComparison { lhs, rhs, .. } = self.arena.kind(id).clone() else {
            return Ok(id);
        };
        // existential semantics: neither order nor duplicates of the operands matter
        for operand in [lhs, rhs] {
            let unordered = self.make_unordered(operand, false);
            if unordered != operand {
                self.arena.replace_sub_expression(id, operand, unordered);
            }
        }
        let ExprKind::GeneralComparison { op, lhs, rhs, runtime_coercion, .. } = self.arena.kind(id).clone()
        else {
            return Ok(id);
        };

        if op == CompareOp::Eq {
            if let Some(test) = self.integer_range_test(id, lhs, rhs).or_else(|| self.integer_range_test(id, rhs, lhs)) {
                return Ok(self.fold(test));
            }
        }

        if op.is_ordering() && !runtime_coercion && self.is_numeric(lhs) && self.is_numeric(rhs) {
            let many = self.arena.cardinality(lhs).allows_many() || self.arena.cardinality(rhs).allows_many();
            if many {
                return Ok(self.minimax(id, op, lhs, rhs));
            }
        }

        let left_one = self.arena.cardinality(lhs).is_at_most_one();
        let right_one = self.arena.cardinality(rhs).is_at_most_one();
        let (strategy, op, lhs, rhs) = match (left_one, right_one) {
            (true, true) => (ComparisonStrategy::OneToOne, op, lhs, rhs),
            (_, true) => (ComparisonStrategy::ManyToOne, op, lhs, rhs),
            (true, false) => {
                self.record("swap-operands", id);
                (ComparisonStrategy::ManyToOne, op.inverse(), rhs, lhs)
            }
            (false, false) => (ComparisonStrategy::ManyToMany, op, lhs, rhs),
        };
        if let ExprKind::GeneralComparison { strategy: s, op: o, lhs: l, rhs: r, .. } = self.arena.kind_mut(id) {
            *s = strategy;
            *o = op;
            *l = lhs;
            *r = rhs;
        }
        Ok(self.fold(id))
    }

    /// `value = (min to max)` when `range` is an integer range and `value` a numeric singleton.
    fn integer_range_test(&mut self, id: ExprId, value: ExprId, range: ExprId) -> Option<ExprId> {
        if !self.is_numeric_singleton(value) {
            return None;
        }
        let (min, max) = match self.arena.kind(range).clone() {
            ExprKind::Range { start, end } => (start, end),
            ExprKind::Literal(GroundedValue::IntegerRange { start, end }) => {
                let min = self.literal_like(GroundedValue::singleton(XdmAtomicValue::Integer(start)), range);
                let max = self.literal_like(GroundedValue::singleton(XdmAtomicValue::Integer(end)), range);
                (min, max)
            }
            _ => return None,
        };
        let test = self.arena.add_like(ExprKind::IntegerRangeTest { value, min, max }, id);
        self.record("integer-range-test", test);
        Some(test)
    }

    /// `A < B` over numeric sequences is `min(A) < max(B)`, and likewise for the other
    /// ordering operators. NaN never satisfies the comparison, so the aggregates skip it.
    fn minimax(&mut self, id: ExprId, op: CompareOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        let (left, right) = match op {
            CompareOp::Lt | CompareOp::Le => {
                (SystemFunction::Min { ignore_nan: true }, SystemFunction::Max { ignore_nan: true })
            }
            _ => (SystemFunction::Max { ignore_nan: true }, SystemFunction::Min { ignore_nan: true }),
        };
        let mut aggregate = |operand: ExprId, function: SystemFunction| {
            if self.arena.cardinality(operand).allows_many() {
                self.arena.add_like(ExprKind::FunctionCall { function, args: smallvec![operand] }, operand)
            } else {
                operand
            }
        };
        let lhs = aggregate(lhs, left);
        let rhs = aggregate(rhs, right);
        let vc = self.arena.add_like(
            ExprKind::ValueComparison { op, lhs, rhs, comparer: Comparer::Numeric, result_when_empty: Some(false) },
            id,
        );
        self.record("minimax", vc);
        self.fold(vc)
    }

    pub(super) fn optimize_value_comparison(&mut self, id: ExprId) -> Result<ExprId, Error> {
        let ExprKind::ValueComparison { op, lhs, rhs, .. } = self.arena.kind(id).clone() else {
            return Ok(id);
        };
        let is_call = |e: ExprId, f: SystemFunction| {
            matches!(self.arena.kind(e), ExprKind::FunctionCall { function, args } if *function == f && args.is_empty())
        };
        let position_vs_last = (is_call(lhs, SystemFunction::Position) && is_call(rhs, SystemFunction::Last))
            || (is_call(lhs, SystemFunction::Last) && is_call(rhs, SystemFunction::Position));
        if position_vs_last && matches!(op, CompareOp::Eq | CompareOp::Ne) {
            let is_last = self.arena.add_like(ExprKind::IsLast { condition: op == CompareOp::Eq }, id);
            self.record("is-last", is_last);
            return Ok(is_last);
        }

        if let Some(rewritten) = self.count_against_zero(id, op, lhs, rhs) {
            return Ok(rewritten);
        }
        Ok(self.fold(id))
    }

    /// `count(E) eq 0` is `empty(E)`; `count(E) ne 0` and `count(E) gt 0` are `exists(E)`.
    fn count_against_zero(&mut self, id: ExprId, op: CompareOp, lhs: ExprId, rhs: ExprId) -> Option<ExprId> {
        let is_zero = |e: ExprId| {
            matches!(
                self.arena.kind(e).as_literal().and_then(GroundedValue::as_singleton),
                Some(XdmAtomicValue::Integer(0))
            )
        };
        let counted = |e: ExprId| match self.arena.kind(e) {
            ExprKind::FunctionCall { function: SystemFunction::Count, args } => args.first().copied(),
            _ => None,
        };
        // normalize to `count(E) op 0`
        let (operand, op) = if is_zero(rhs) {
            (counted(lhs)?, op)
        } else if is_zero(lhs) {
            (counted(rhs)?, op.inverse())
        } else {
            return None;
        };
        let function = match op {
            CompareOp::Eq | CompareOp::Le => SystemFunction::Empty,
            CompareOp::Ne | CompareOp::Gt => SystemFunction::Exists,
            CompareOp::Lt | CompareOp::Ge => return None,
        };
        let call = self.arena.add_like(ExprKind::FunctionCall { function, args: smallvec![operand] }, id);
        self.record(if function == SystemFunction::Empty { "count-to-empty" } else { "count-to-exists" }, call);
        Some(self.fold(call))
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::ExprArena;
    use crate::compiler::expr::ExprKind;
    use crate::compiler::functions::SystemFunction;
    use crate::compiler::visitor::ExpressionVisitor;
    use crate::engine::comparer::CompareOp;
    use crate::engine::runtime::StaticContext;
    use crate::types::ContextItemType;

    fn compile_tree(arena: &mut ExprArena, root: crate::compiler::expr::ExprId) -> crate::compiler::expr::ExprId {
        let env = StaticContext::default();
        let mut v = ExpressionVisitor::new(arena, &env);
        let root = v.simplify(root).unwrap();
        let root = v.type_check(root, ContextItemType::Unknown).unwrap();
        v.optimize(root, ContextItemType::Unknown).unwrap()
    }

    #[test]
    fn count_compared_with_zero_becomes_exists() {
        let mut arena = ExprArena::new();
        let dot = arena.context_item();
        let count = arena.function(SystemFunction::Count, vec![dot]);
        let zero = arena.integer(0);
        let cmp = arena.value_comparison(CompareOp::Gt, count, zero);
        let root = compile_tree(&mut arena, cmp);
        assert!(arena.kind(root).is_function(SystemFunction::Exists));
    }

    #[test]
    fn zero_equal_to_count_becomes_empty() {
        let mut arena = ExprArena::new();
        let dot = arena.context_item();
        let count = arena.function(SystemFunction::Count, vec![dot]);
        let zero = arena.integer(0);
        let cmp = arena.value_comparison(CompareOp::Eq, zero, count);
        let root = compile_tree(&mut arena, cmp);
        assert!(arena.kind(root).is_function(SystemFunction::Empty));
    }

    #[test]
    fn singleton_general_comparison_becomes_value_comparison() {
        let mut arena = ExprArena::new();
        let dot = arena.context_item();
        let len = arena.function(SystemFunction::StringLength, vec![dot]);
        let three = arena.integer(3);
        let cmp = arena.general_comparison(CompareOp::Lt, len, three);
        let root = compile_tree(&mut arena, cmp);
        assert!(matches!(arena.kind(root), ExprKind::ValueComparison { result_when_empty: Some(false), .. }));
    }
}
