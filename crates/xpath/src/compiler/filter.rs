//! Filter expressions: predicate classification during type checking and the
//! positional rewrites that replace a filter by `subsequence`, `remove` or a subscript.

use smallvec::smallvec;

use crate::compiler::expr::{BooleanOp, ExprId, ExprKind, FilterFlags, VarId};
use crate::compiler::functions::SystemFunction;
use crate::compiler::promotion::PromotionAction;
use crate::compiler::properties::Dependencies;
use crate::compiler::visitor::ExpressionVisitor;
use crate::engine::calculator::ArithOp;
use crate::engine::comparer::CompareOp;
use crate::engine::numeric::as_whole_i64;
use crate::engine::runtime::Error;
use crate::types::{Cardinality, ItemType, Relation, type_hierarchy};
use crate::xdm::{GroundedValue, XdmAtomicValue};

/// How a rewrite refers to the value `position()` is compared with.
#[derive(Clone, Copy)]
enum Comparand {
    /// A literal, copied at each use.
    Literal(ExprId),
    /// A variable bound once around the rewritten expression.
    Bound(VarId),
}

fn reads_position(deps: Dependencies) -> bool {
    deps.intersects(Dependencies::POSITION | Dependencies::LAST)
}

impl ExpressionVisitor<'_> {
    pub(super) fn type_check_filter(&mut self, id: ExprId) -> Result<ExprId, Error> {
        let ExprKind::Filter { base, predicate, .. } = self.arena.kind(id).clone() else {
            return Ok(id);
        };
        if self.arena.cardinality(base).is_empty_sequence() {
            return Ok(self.literal_like(GroundedValue::empty(), id));
        }
        if let Some(value) = self.arena.kind(predicate).as_literal().cloned() {
            if let Some(rewritten) = self.literal_predicate(id, base, predicate, &value) {
                return Ok(rewritten);
            }
        }
        if self.is_call(predicate, SystemFunction::Last) {
            let last = self.arena.add_like(ExprKind::LastItem { base }, id);
            self.record("last-item", last);
            return Ok(self.fold(last));
        }

        let t = self.arena.item_type(predicate);
        let maybe_numeric = type_hierarchy().relationship(&t, &ItemType::NUMERIC) != Relation::Disjoint;
        let predicate = if maybe_numeric || self.is_singleton_boolean(predicate) {
            predicate
        } else {
            self.wrap(id, predicate, |p| ExprKind::FunctionCall { function: SystemFunction::Boolean, args: smallvec![p] })
        };
        let flags = self.predicate_flags(predicate);
        if let ExprKind::Filter { flags: f, .. } = self.arena.kind_mut(id) {
            *f = flags;
        }
        Ok(self.fold(id))
    }

    fn literal_predicate(&mut self, id: ExprId, base: ExprId, predicate: ExprId, value: &GroundedValue) -> Option<ExprId> {
        let rewritten = match value.as_singleton() {
            Some(v) if v.is_numeric() => match as_whole_i64(&v) {
                Some(1) => self.arena.add_like(ExprKind::FirstItem { base }, id),
                Some(n) if n > 1 => self.arena.add_like(ExprKind::Subscript { base, index: predicate }, id),
                _ => self.literal_like(GroundedValue::empty(), id),
            },
            _ => match value.effective_boolean_value()? {
                true => base,
                false => self.literal_like(GroundedValue::empty(), id),
            },
        };
        self.record("literal-predicate", rewritten);
        Some(self.fold(rewritten))
    }

    fn is_call(&self, id: ExprId, function: SystemFunction) -> bool {
        matches!(self.arena.kind(id), ExprKind::FunctionCall { function: f, args } if *f == function && args.is_empty())
    }

    fn is_singleton_boolean(&self, id: ExprId) -> bool {
        self.arena.item_type(id) == ItemType::BOOLEAN && self.arena.cardinality(id) == Cardinality::EXACTLY_ONE
    }

    fn predicate_flags(&self, predicate: ExprId) -> FilterFlags {
        let th = type_hierarchy();
        let t = self.arena.item_type(predicate);
        let deps = self.arena.dependencies(predicate);
        let mut flags = FilterFlags::empty();
        if self.is_singleton_boolean(predicate) {
            flags |= FilterFlags::SINGLETON_BOOLEAN;
        }
        if reads_position(deps) || th.relationship(&t, &ItemType::NUMERIC) != Relation::Disjoint {
            flags |= FilterFlags::POSITIONAL;
        }
        if th.is_subtype(&t, &ItemType::NUMERIC)
            && self.arena.cardinality(predicate).is_at_most_one()
            && !deps.depends_on_focus()
        {
            flags |= FilterFlags::POSITIONAL | FilterFlags::INDEPENDENT_NUMERIC;
        }
        flags
    }

    pub(super) fn optimize_filter(&mut self, id: ExprId) -> Result<ExprId, Error> {
        let ExprKind::Filter { base, predicate, flags } = self.arena.kind(id).clone() else {
            return Ok(id);
        };
        if matches!(self.arena.kind(predicate), ExprKind::IsLast { condition: true }) {
            let last = self.arena.add_like(ExprKind::LastItem { base }, id);
            self.record("last-item", last);
            return Ok(self.fold(last));
        }
        if flags.contains(FilterFlags::INDEPENDENT_NUMERIC) {
            let subscript = self.arena.add_like(ExprKind::Subscript { base, index: predicate }, id);
            self.record("subscript", subscript);
            return Ok(self.fold(subscript));
        }
        if self.env.optimizer.positional_rewrites {
            if let Some(rewritten) = self.positional_rewrite(id, base, predicate) {
                return Ok(rewritten);
            }
        }
        if let ExprKind::Boolean { op: BooleanOp::And, lhs, rhs } = self.arena.kind(predicate).clone() {
            if let Some(split) = self.split_conjunction(id, base, lhs, rhs)? {
                return Ok(split);
            }
        }
        if self.env.optimizer.loop_lifting && self.arena.cardinality(base).allows_many() {
            let promoted = self.promote(id, PromotionAction::FocusIndependent);
            if promoted != id {
                return Ok(promoted);
            }
        }
        Ok(self.fold(id))
    }

    /// `E[A and B]` where only `A` reads the position becomes `E[A][B]`, so the
    /// positional part can be rewritten on its own.
    fn split_conjunction(&mut self, id: ExprId, base: ExprId, lhs: ExprId, rhs: ExprId) -> Result<Option<ExprId>, Error> {
        if !self.is_singleton_boolean(lhs) || !self.is_singleton_boolean(rhs) {
            return Ok(None);
        }
        let (inner, outer) = match (reads_position(self.arena.dependencies(lhs)), reads_position(self.arena.dependencies(rhs))) {
            (true, false) => (lhs, rhs),
            (false, true) => (rhs, lhs),
            _ => return Ok(None),
        };
        let inner_flags = self.predicate_flags(inner);
        let inner_filter = self.arena.add_like(ExprKind::Filter { base, predicate: inner, flags: inner_flags }, id);
        let inner_filter = self.optimize_filter(inner_filter)?;
        let outer_flags = self.predicate_flags(outer);
        let outer_filter =
            self.arena.add_like(ExprKind::Filter { base: inner_filter, predicate: outer, flags: outer_flags }, id);
        self.record("split-conjunction", outer_filter);
        self.optimize_filter(outer_filter).map(Some)
    }

    /// Recognizes `position() op V`, `V op position()` and `position() = (A to B)`.
    fn positional_rewrite(&mut self, id: ExprId, base: ExprId, predicate: ExprId) -> Option<ExprId> {
        match self.arena.kind(predicate).clone() {
            ExprKind::ValueComparison { op, lhs, rhs, .. } => {
                let (op, value) = if self.is_call(lhs, SystemFunction::Position) {
                    (op, rhs)
                } else if self.is_call(rhs, SystemFunction::Position) {
                    (op.inverse(), lhs)
                } else {
                    return None;
                };
                self.position_compared(id, base, op, value)
            }
            ExprKind::IntegerRangeTest { value, min, max } if self.is_call(value, SystemFunction::Position) => {
                self.position_in_range(id, base, min, max)
            }
            _ => None,
        }
    }

    fn position_compared(&mut self, id: ExprId, base: ExprId, op: CompareOp, value: ExprId) -> Option<ExprId> {
        let th = type_hierarchy();
        let t = self.arena.item_type(value);
        let card = self.arena.cardinality(value);
        if self.arena.dependencies(value).depends_on_focus() || card.allows_many() || !th.is_subtype(&t, &ItemType::NUMERIC) {
            return None;
        }
        let integer = th.is_subtype(&t, &ItemType::INTEGER);
        let literal = self.arena.kind(value).as_literal().cloned();
        let rewritten = match literal {
            Some(v) if v.is_empty() => self.literal_like(GroundedValue::empty(), id),
            Some(v) => {
                let known = if integer { v.as_singleton().as_ref().and_then(as_whole_i64) } else { None };
                match known {
                    Some(n) => self.integer_literal_position(id, base, op, n, value),
                    None => self.position_table(id, base, op, Comparand::Literal(value), integer),
                }
            }
            None => {
                let var = self.temporary("p");
                let body = self.position_table(id, base, op, Comparand::Bound(var), integer);
                let body = if card.allows_zero() { self.guarded(var, body, id) } else { body };
                self.arena.add_like(ExprKind::Let { var, sequence: value, action: body }, id)
            }
        };
        self.record("positional-filter", rewritten);
        Some(self.fold(rewritten))
    }

    /// `if (exists($var)) then body else ()`.
    fn guarded(&mut self, var: VarId, body: ExprId, like: ExprId) -> ExprId {
        let reference = self.arena.add_like(ExprKind::LocalVarRef(var), like);
        let exists = self.system_call(SystemFunction::Exists, &[reference], like);
        let empty = self.literal_like(GroundedValue::empty(), like);
        self.arena.add_like(ExprKind::Conditional { condition: exists, then_branch: body, else_branch: empty }, like)
    }

    fn comparand(&mut self, comparand: Comparand, like: ExprId) -> ExprId {
        match comparand {
            Comparand::Literal(e) => self.arena.copy(e),
            Comparand::Bound(var) => self.arena.add_like(ExprKind::LocalVarRef(var), like),
        }
    }

    fn integer(&mut self, value: i64, like: ExprId) -> ExprId {
        self.literal_like(GroundedValue::singleton(XdmAtomicValue::Integer(value)), like)
    }

    /// `value ± 1` computed in xs:double, so no bound overflows.
    fn offset_by_one(&mut self, op: ArithOp, value: ExprId, like: ExprId) -> ExprId {
        let one = self.literal_like(GroundedValue::singleton(XdmAtomicValue::Double(1.0)), like);
        self.checked_arithmetic(op, value, one, like)
    }

    pub(crate) fn system_call(&mut self, function: SystemFunction, args: &[ExprId], like: ExprId) -> ExprId {
        let call = self.arena.add_like(ExprKind::FunctionCall { function, args: args.iter().copied().collect() }, like);
        self.fold(call)
    }

    fn integer_literal_position(&mut self, id: ExprId, base: ExprId, op: CompareOp, n: i64, value: ExprId) -> ExprId {
        let subsequence = |with_length| SystemFunction::Subsequence { with_length };
        match op {
            CompareOp::Eq if n == 1 => self.arena.add_like(ExprKind::FirstItem { base }, id),
            CompareOp::Eq | CompareOp::Lt if n <= 1 => self.literal_like(GroundedValue::empty(), id),
            CompareOp::Gt if n == i64::MAX => self.literal_like(GroundedValue::empty(), id),
            CompareOp::Eq => self.arena.add_like(ExprKind::Subscript { base, index: value }, id),
            CompareOp::Lt => {
                let (one, length) = (self.integer(1, id), self.integer(n - 1, id));
                self.system_call(subsequence(true), &[base, one, length], id)
            }
            CompareOp::Le => {
                let one = self.integer(1, id);
                self.system_call(subsequence(true), &[base, one, value], id)
            }
            CompareOp::Ne => self.system_call(SystemFunction::Remove, &[base, value], id),
            CompareOp::Gt => {
                let start = self.integer(n + 1, id);
                self.system_call(subsequence(false), &[base, start], id)
            }
            CompareOp::Ge => self.system_call(subsequence(false), &[base, value], id),
        }
    }

    /// The general rewrite of `base[position() op V]`.
    fn position_table(&mut self, id: ExprId, base: ExprId, op: CompareOp, v: Comparand, integer: bool) -> ExprId {
        let subsequence = |with_length| SystemFunction::Subsequence { with_length };
        match (op, integer) {
            (CompareOp::Eq, _) => {
                let index = self.comparand(v, id);
                self.arena.add_like(ExprKind::Subscript { base, index }, id)
            }
            (CompareOp::Lt, true) => {
                let (one, value) = (self.integer(1, id), self.comparand(v, id));
                let length = self.offset_by_one(ArithOp::Minus, value, id);
                self.system_call(subsequence(true), &[base, one, length], id)
            }
            (CompareOp::Le, true) => {
                let (one, value) = (self.integer(1, id), self.comparand(v, id));
                self.system_call(subsequence(true), &[base, one, value], id)
            }
            (CompareOp::Ne, _) => {
                // remove() ignores an index that is not a whole number within range
                let value = self.comparand(v, id);
                self.system_call(SystemFunction::Remove, &[base, value], id)
            }
            (CompareOp::Gt, true) => {
                let value = self.comparand(v, id);
                let start = self.offset_by_one(ArithOp::Plus, value, id);
                self.system_call(subsequence(false), &[base, start], id)
            }
            (CompareOp::Ge, true) => {
                let value = self.comparand(v, id);
                self.system_call(subsequence(false), &[base, value], id)
            }
            (CompareOp::Lt, false) => {
                let whole = self.comparand(v, id);
                let below = self.comparand(v, id);
                let below = self.offset_by_one(ArithOp::Minus, below, id);
                let other = self.comparand(v, id);
                let floor = self.system_call(SystemFunction::Floor, &[other], id);
                let length = self.if_whole(whole, below, floor, id);
                let one = self.integer(1, id);
                self.system_call(subsequence(true), &[base, one, length], id)
            }
            (CompareOp::Le, false) => {
                let value = self.comparand(v, id);
                let floor = self.system_call(SystemFunction::Floor, &[value], id);
                let one = self.integer(1, id);
                self.system_call(subsequence(true), &[base, one, floor], id)
            }
            (CompareOp::Gt, false) => {
                let whole = self.comparand(v, id);
                let above = self.comparand(v, id);
                let above = self.offset_by_one(ArithOp::Plus, above, id);
                let other = self.comparand(v, id);
                let ceiling = self.system_call(SystemFunction::Ceiling, &[other], id);
                let start = self.if_whole(whole, above, ceiling, id);
                self.system_call(subsequence(false), &[base, start], id)
            }
            (CompareOp::Ge, false) => {
                let value = self.comparand(v, id);
                let ceiling = self.system_call(SystemFunction::Ceiling, &[value], id);
                self.system_call(subsequence(false), &[base, ceiling], id)
            }
        }
    }

    /// `if (is-whole-number(tested)) then whole else fractional`.
    fn if_whole(&mut self, tested: ExprId, whole: ExprId, fractional: ExprId, like: ExprId) -> ExprId {
        let condition = self.system_call(SystemFunction::IsWholeNumber, &[tested], like);
        let choice = self.arena.add_like(
            ExprKind::Conditional { condition, then_branch: whole, else_branch: fractional },
            like,
        );
        self.fold(choice)
    }

    /// `base[position() = (min to max)]`.
    fn position_in_range(&mut self, id: ExprId, base: ExprId, min: ExprId, max: ExprId) -> Option<ExprId> {
        if self.arena.dependencies(min).depends_on_focus() {
            return None;
        }
        let subsequence = |with_length| SystemFunction::Subsequence { with_length };
        let rewritten = if self.arena.dependencies(max).depends_on_focus() {
            if !self.is_call(max, SystemFunction::Last) {
                return None;
            }
            self.system_call(subsequence(false), &[base, min], id)
        } else {
            // let $n := min return subsequence(base, $n, max - ($n - 1))
            let var = self.temporary("n");
            let start = self.arena.add_like(ExprKind::LocalVarRef(var), id);
            let before = self.arena.add_like(ExprKind::LocalVarRef(var), id);
            let one = self.integer(1, id);
            let before = self.checked_arithmetic(ArithOp::Minus, before, one, id);
            let length = self.checked_arithmetic(ArithOp::Minus, max, before, id);
            let body = self.system_call(subsequence(true), &[base, start, length], id);
            self.arena.add_like(ExprKind::Let { var, sequence: min, action: body }, id)
        };
        self.record("positional-range", rewritten);
        Some(self.fold(rewritten))
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::ExprArena;
    use crate::compiler::expr::{ExprId, ExprKind};
    use crate::compiler::functions::SystemFunction;
    use crate::compiler::visitor::ExpressionVisitor;
    use crate::engine::comparer::CompareOp;
    use crate::engine::runtime::StaticContextBuilder;
    use crate::types::{Cardinality, ContextItemType, ItemType, SequenceType};
    use crate::xdm::ExpandedName;

    fn compile_tree(arena: &mut ExprArena, root: ExprId) -> ExprId {
        let env = StaticContextBuilder::new()
            .with_variable(ExpandedName::local("items"), SequenceType::new(ItemType::INTEGER, Cardinality::ZERO_OR_MORE))
            .build();
        let mut v = ExpressionVisitor::new(arena, &env);
        let root = v.simplify(root).unwrap();
        let root = v.type_check(root, ContextItemType::Unknown).unwrap();
        v.optimize(root, ContextItemType::Unknown).unwrap()
    }

    #[test]
    fn first_predicate_becomes_first_item() {
        let mut arena = ExprArena::new();
        let items = arena.global_var(ExpandedName::local("items"));
        let one = arena.integer(1);
        let filter = arena.filter(items, one);
        let root = compile_tree(&mut arena, filter);
        assert!(matches!(arena.kind(root), ExprKind::FirstItem { .. }));
    }

    #[test]
    fn position_greater_than_literal_becomes_subsequence() {
        let mut arena = ExprArena::new();
        let items = arena.global_var(ExpandedName::local("items"));
        let position = arena.function(SystemFunction::Position, vec![]);
        let two = arena.integer(2);
        let cmp = arena.general_comparison(CompareOp::Gt, position, two);
        let filter = arena.filter(items, cmp);
        let root = compile_tree(&mut arena, filter);
        assert!(arena.kind(root).is_function(SystemFunction::Subsequence { with_length: false }));
    }

    #[test]
    fn position_equal_to_last_becomes_last_item() {
        let mut arena = ExprArena::new();
        let items = arena.global_var(ExpandedName::local("items"));
        let position = arena.function(SystemFunction::Position, vec![]);
        let last = arena.function(SystemFunction::Last, vec![]);
        let cmp = arena.value_comparison(CompareOp::Eq, position, last);
        let filter = arena.filter(items, cmp);
        let root = compile_tree(&mut arena, filter);
        assert!(matches!(arena.kind(root), ExprKind::LastItem { .. }));
    }
}
