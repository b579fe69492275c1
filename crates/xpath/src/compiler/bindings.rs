//! Optimization of `let`, `for` and quantified expressions.

use crate::compiler::expr::{ExprId, ExprKind, Quantifier, VarId};
use crate::compiler::promotion::PromotionAction;
use crate::compiler::visitor::ExpressionVisitor;
use crate::engine::runtime::Error;
use crate::types::Cardinality;
use crate::xdm::{GroundedValue, XdmAtomicValue};

impl ExpressionVisitor<'_> {
    pub(super) fn optimize_let(&mut self, id: ExprId) -> Result<ExprId, Error> {
        let ExprKind::Let { var, sequence, action } = self.arena.kind(id).clone() else {
            return Ok(id);
        };
        if self.arena.reference_count(var, action) == 0 {
            self.record("drop-unreferenced-let", action);
            return Ok(action);
        }
        if matches!(self.arena.kind(sequence), ExprKind::Literal(_) | ExprKind::LocalVarRef(_)) {
            let inlined = self.inline_variable(var, sequence, action);
            self.record("inline-let", inlined);
            return Ok(self.fold(inlined));
        }
        Ok(self.fold(id))
    }

    /// Replaces each reference to `var` within `action` by a copy of `value`.
    fn inline_variable(&mut self, var: VarId, value: ExprId, action: ExprId) -> ExprId {
        let references: Vec<ExprId> = self
            .arena
            .descendants_or_self(action)
            .into_iter()
            .filter(|e| matches!(self.arena.kind(*e), ExprKind::LocalVarRef(v) if *v == var))
            .collect();
        let mut result = action;
        for reference in references {
            let copy = self.arena.copy(value);
            if reference == action {
                result = copy;
            } else if let Some(parent) = self.arena.parent(reference) {
                self.arena.replace_sub_expression(parent, reference, copy);
            }
        }
        result
    }

    pub(super) fn optimize_for(&mut self, id: ExprId) -> Result<ExprId, Error> {
        let ExprKind::For { var, sequence, action } = self.arena.kind(id).clone() else {
            return Ok(id);
        };
        if matches!(self.arena.kind(action), ExprKind::LocalVarRef(v) if *v == var) {
            self.record("identity-for", sequence);
            return Ok(sequence);
        }
        if self.arena.cardinality(sequence).is_empty_sequence() {
            let empty = self.literal_like(GroundedValue::empty(), id);
            self.record("empty-for", empty);
            return Ok(empty);
        }
        if self.arena.cardinality(sequence) == Cardinality::EXACTLY_ONE {
            let binding = self.arena.add_like(ExprKind::Let { var, sequence, action }, id);
            self.record("singleton-for", binding);
            return self.optimize_let(binding);
        }
        if self.env.optimizer.loop_lifting {
            let promoted = self.promote(id, PromotionAction::RangeIndependent);
            if promoted != id {
                return Ok(promoted);
            }
        }
        Ok(self.fold(id))
    }

    pub(super) fn optimize_quantified(&mut self, id: ExprId) -> Result<ExprId, Error> {
        let ExprKind::Quantified { quantifier, sequence, .. } = self.arena.kind(id).clone() else {
            return Ok(id);
        };
        if self.arena.cardinality(sequence).is_empty_sequence() {
            let value = XdmAtomicValue::Boolean(quantifier == Quantifier::Every);
            let lit = self.literal_like(GroundedValue::singleton(value), id);
            self.record("empty-quantified", lit);
            return Ok(lit);
        }
        if self.env.optimizer.loop_lifting {
            let promoted = self.promote(id, PromotionAction::RangeIndependent);
            if promoted != id {
                return Ok(promoted);
            }
        }
        Ok(self.fold(id))
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::ExprArena;
    use crate::compiler::expr::ExprKind;
    use crate::compiler::visitor::ExpressionVisitor;
    use crate::engine::calculator::ArithOp;
    use crate::engine::runtime::StaticContext;
    use crate::types::ContextItemType;
    use crate::xdm::{ExpandedName, XdmAtomicValue};

    #[test]
    fn unreferenced_let_is_dropped() {
        let mut arena = ExprArena::new();
        let x = arena.declare_var(ExpandedName::local("x"));
        let seq = arena.range_of(1, 3);
        let action = arena.context_item();
        let binding = arena.let_expr(x, seq, action);
        let env = StaticContext::default();
        let mut v = ExpressionVisitor::new(&mut arena, &env);
        let root = v.optimize(binding, ContextItemType::Unknown).unwrap();
        assert!(matches!(v.arena.kind(root), ExprKind::ContextItem { .. }));
    }

    #[test]
    fn literal_let_is_inlined_and_folded() {
        let mut arena = ExprArena::new();
        let x = arena.declare_var(ExpandedName::local("x"));
        let two = arena.integer(2);
        let a = arena.var_ref(x);
        let b = arena.var_ref(x);
        let product = arena.arithmetic(ArithOp::Times, a, b);
        let binding = arena.let_expr(x, two, product);
        let env = StaticContext::default();
        let mut v = ExpressionVisitor::new(&mut arena, &env);
        let root = v.simplify(binding).unwrap();
        let root = v.type_check(root, ContextItemType::Unknown).unwrap();
        let root = v.optimize(root, ContextItemType::Unknown).unwrap();
        let value = v.arena.kind(root).as_literal().and_then(|l| l.as_singleton());
        assert!(matches!(value, Some(XdmAtomicValue::Integer(4))));
    }
}
