//! Loop lifting: subexpressions of a predicate or a loop body that give the same value
//! on every iteration are bound once in a `let` around the loop.

use crate::compiler::expr::{ExprId, ExprKind, VarId};
use crate::compiler::visitor::ExpressionVisitor;

/// What the lifted subexpressions must be independent of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PromotionAction {
    /// The focus of a filter predicate.
    FocusIndependent,
    /// The range variable of a `for` or quantified expression.
    RangeIndependent,
}

/// Search state while looking for liftable subexpressions.
#[derive(Debug)]
pub(crate) struct PromotionOffer {
    /// Variables bound by the loop itself.
    excluded: Vec<VarId>,
    /// Variables bound between the loop and the node being looked at.
    bound: Vec<VarId>,
    pub(crate) accepted: Vec<ExprId>,
}

impl PromotionOffer {
    fn new(excluded: Vec<VarId>) -> Self {
        Self { excluded, bound: Vec::new(), accepted: Vec::new() }
    }

    fn allows(&self, var: VarId) -> bool {
        !self.excluded.contains(&var) && !self.bound.contains(&var)
    }
}

impl ExpressionVisitor<'_> {
    /// Lifts invariant parts of `container` (a filter, `for` or quantified expression)
    /// into `let` bindings wrapped around it. Returns the outermost new node, or
    /// `container` when nothing was lifted.
    pub(crate) fn promote(&mut self, container: ExprId, action: PromotionAction) -> ExprId {
        let (region, excluded) = match (action, self.arena.kind(container)) {
            (PromotionAction::FocusIndependent, ExprKind::Filter { predicate, .. }) => (*predicate, Vec::new()),
            (PromotionAction::RangeIndependent, ExprKind::For { var, action, .. }) => (*action, vec![*var]),
            (PromotionAction::RangeIndependent, ExprKind::Quantified { var, satisfies, .. }) => {
                (*satisfies, vec![*var])
            }
            _ => return container,
        };
        let mut offer = PromotionOffer::new(excluded);
        self.collect_promotable(&mut offer, region);

        let mut result = container;
        for candidate in offer.accepted {
            let Some(parent) = self.arena.parent(candidate) else {
                continue;
            };
            let var = self.temporary("lift");
            let reference = self.arena.add_like(ExprKind::LocalVarRef(var), candidate);
            self.arena.replace_sub_expression(parent, candidate, reference);
            result = self.arena.add_like(ExprKind::Let { var, sequence: candidate, action: result }, container);
            tracing::trace!(target: "xpath_core::optimizer", ?action, lifted = %candidate, "promoted");
            self.record("loop-lifting", result);
        }
        result
    }

    /// Collects the maximal subtrees of `id` that can move out of the loop.
    fn collect_promotable(&self, offer: &mut PromotionOffer, id: ExprId) {
        let kind = self.arena.kind(id);
        let children = kind.children();
        // lifting a leaf gains nothing; focus-dependent values differ per item
        if !children.is_empty() && !self.arena.dependencies(id).depends_on_focus() {
            let free = self.arena.free_variables(id);
            if free.iter().all(|v| offer.allows(*v)) {
                offer.accepted.push(id);
                return;
            }
        }
        let binding = kind.bound_var();
        if let Some(var) = binding {
            offer.bound.push(var);
        }
        for child in children {
            self.collect_promotable(offer, child);
        }
        if binding.is_some() {
            offer.bound.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::ExprArena;
    use crate::compiler::expr::ExprKind;
    use crate::compiler::visitor::ExpressionVisitor;
    use crate::engine::calculator::ArithOp;
    use crate::engine::comparer::CompareOp;
    use crate::engine::runtime::StaticContext;
    use crate::xdm::ExpandedName;

    use super::PromotionAction;

    #[test]
    fn range_independent_part_of_a_loop_body_is_lifted() {
        let mut arena = ExprArena::new();
        let x = arena.declare_var(ExpandedName::local("x"));
        let y = arena.declare_var(ExpandedName::local("y"));
        let seq = arena.range_of(1, 10);
        let y_ref = arena.var_ref(y);
        let ten = arena.integer(10);
        let invariant = arena.arithmetic(ArithOp::Times, y_ref, ten);
        let x_ref = arena.var_ref(x);
        let cmp = arena.value_comparison(CompareOp::Lt, x_ref, invariant);
        let body = arena.for_expr(x, seq, cmp);

        let env = StaticContext::default();
        let mut v = ExpressionVisitor::new(&mut arena, &env);
        let lifted = v.promote(body, PromotionAction::RangeIndependent);
        assert_ne!(lifted, body);
        let ExprKind::Let { sequence, action, .. } = v.arena.kind(lifted).clone() else {
            panic!("expected a let around the loop");
        };
        assert_eq!(sequence, invariant);
        assert_eq!(action, body);
        assert_eq!(v.arena.parent(lifted), None);
    }

    #[test]
    fn loop_dependent_parts_stay() {
        let mut arena = ExprArena::new();
        let x = arena.declare_var(ExpandedName::local("x"));
        let seq = arena.range_of(1, 10);
        let x_ref = arena.var_ref(x);
        let one = arena.integer(1);
        let body = arena.arithmetic(ArithOp::Plus, x_ref, one);
        let for_expr = arena.for_expr(x, seq, body);

        let env = StaticContext::default();
        let mut v = ExpressionVisitor::new(&mut arena, &env);
        assert_eq!(v.promote(for_expr, PromotionAction::RangeIndependent), for_expr);
    }
}
