//! The optimize phase: dispatch to the rewrite rules of each expression kind.

use smallvec::SmallVec;

use crate::compiler::early;
use crate::compiler::expr::{BooleanOp, ExprId, ExprKind, FilterFlags, SetOp};
use crate::compiler::functions::SystemFunction;
use crate::compiler::properties::StaticProperty;
use crate::compiler::visitor::ExpressionVisitor;
use crate::engine::runtime::Error;
use crate::types::{Cardinality, ContextItemType, ItemType};
use crate::xdm::{GroundedValue, XdmAtomicValue};

impl ExpressionVisitor<'_> {
    pub(super) fn optimize_node(&mut self, id: ExprId, _context: ContextItemType) -> Result<ExprId, Error> {
        use ExprKind as K;
        match self.arena.kind(id).clone() {
            K::GeneralComparison { .. } => self.optimize_general_comparison(id),
            K::ValueComparison { .. } => self.optimize_value_comparison(id),
            K::Filter { .. } => self.optimize_filter(id),
            K::Let { .. } => self.optimize_let(id),
            K::For { .. } => self.optimize_for(id),
            K::Quantified { .. } => self.optimize_quantified(id),
            K::DocumentSorter { operand } => {
                let sorted = self.arena.properties(operand).contains(StaticProperty::ORDERED)
                    || self.arena.item_type(operand).is_atomic()
                    || self.arena.cardinality(operand).is_at_most_one();
                if sorted {
                    self.record("redundant-sort", operand);
                    return Ok(operand);
                }
                Ok(id)
            }
            K::Conditional { condition, then_branch, else_branch } => match early::literal_boolean(self.arena, condition) {
                Some(true) => {
                    self.record("constant-condition", then_branch);
                    Ok(then_branch)
                }
                Some(false) => {
                    self.record("constant-condition", else_branch);
                    Ok(else_branch)
                }
                None => Ok(self.fold(id)),
            },
            K::Boolean { op, lhs, rhs } => Ok(self.optimize_boolean(id, op, lhs, rhs)),
            K::FunctionCall { function, args } => {
                for (i, arg) in args.iter().enumerate() {
                    let counted = function.counts_argument(i);
                    if function.ignores_argument_order(i) || counted {
                        let unordered = self.make_unordered(*arg, counted);
                        if unordered != *arg {
                            self.arena.replace_sub_expression(id, *arg, unordered);
                        }
                    }
                }
                Ok(self.fold(id))
            }
            _ => Ok(self.fold(id)),
        }
    }

    /// `true() and E` is `boolean(E)`, `false() and E` is `false()`; dually for `or`.
    fn optimize_boolean(&mut self, id: ExprId, op: BooleanOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        let absorbing = op == BooleanOp::Or;
        let known = |side: ExprId| early::literal_boolean(self.arena, side);
        let (constant, other) = match (known(lhs), known(rhs)) {
            (Some(b), _) => (b, rhs),
            (None, Some(b)) => (b, lhs),
            (None, None) => return self.fold(id),
        };
        let rewritten = if constant == absorbing {
            self.literal_like(GroundedValue::singleton(XdmAtomicValue::Boolean(absorbing)), id)
        } else if self.arena.item_type(other) == ItemType::BOOLEAN
            && self.arena.cardinality(other) == Cardinality::EXACTLY_ONE
        {
            other
        } else {
            self.system_call(SystemFunction::Boolean, &[other], id)
        };
        self.record("constant-operand", rewritten);
        rewritten
    }

    /// Rewrites `id` for a consumer that ignores the order of the items, and also
    /// ignores duplicate nodes unless `retain_all_nodes` is set. Returns the node that
    /// takes the place of `id`.
    pub(crate) fn make_unordered(&mut self, id: ExprId, retain_all_nodes: bool) -> ExprId {
        use ExprKind as K;
        match self.arena.kind(id).clone() {
            K::DocumentSorter { operand } if !retain_all_nodes => {
                self.record("unordered", operand);
                self.make_unordered(operand, retain_all_nodes)
            }
            K::FunctionCall { function: SystemFunction::Reverse, args } if args.len() == 1 => {
                self.record("unordered", args[0]);
                self.make_unordered(args[0], retain_all_nodes)
            }
            K::Venn { op: SetOp::Union, lhs, rhs } if !retain_all_nodes => {
                let lhs = self.make_unordered(lhs, retain_all_nodes);
                let rhs = self.make_unordered(rhs, retain_all_nodes);
                let children: SmallVec<[ExprId; 4]> = smallvec::smallvec![lhs, rhs];
                let block = self.arena.add_like(K::Block { children }, id);
                self.record("unordered", block);
                block
            }
            K::Block { children } => {
                for child in children {
                    let unordered = self.make_unordered(child, retain_all_nodes);
                    if unordered != child {
                        self.arena.replace_sub_expression(id, child, unordered);
                    }
                }
                id
            }
            K::Filter { base, flags, .. } if !flags.contains(FilterFlags::POSITIONAL) => {
                self.unordered_operand(id, base, retain_all_nodes)
            }
            K::Atomizer { operand } | K::UntypedConverter { operand, .. } => {
                self.unordered_operand(id, operand, retain_all_nodes)
            }
            _ => id,
        }
    }

    fn unordered_operand(&mut self, id: ExprId, operand: ExprId, retain_all_nodes: bool) -> ExprId {
        let unordered = self.make_unordered(operand, retain_all_nodes);
        if unordered != operand {
            self.arena.replace_sub_expression(id, operand, unordered);
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::ExprArena;
    use crate::compiler::expr::{Axis, ExprKind, SetOp};
    use crate::compiler::functions::SystemFunction;
    use crate::compiler::visitor::ExpressionVisitor;
    use crate::engine::runtime::StaticContext;
    use crate::types::{ContextItemType, NodeTest};

    #[test]
    fn exists_ignores_order_and_duplicates_of_a_union() {
        let mut arena = ExprArena::new();
        let a = arena.axis(Axis::Child, NodeTest::element("a"));
        let b = arena.axis(Axis::Descendant, NodeTest::element("b"));
        let union = arena.venn(SetOp::Union, a, b);
        let exists = arena.function(SystemFunction::Exists, vec![union]);
        let env = StaticContext::default();
        let mut v = ExpressionVisitor::new(&mut arena, &env);
        let root = v.optimize(exists, ContextItemType::Unknown).unwrap();
        let ExprKind::FunctionCall { args, .. } = v.arena.kind(root) else {
            panic!("expected exists() to remain");
        };
        assert!(matches!(v.arena.kind(args[0]), ExprKind::Block { .. }));
    }

    #[test]
    fn constant_condition_selects_a_branch() {
        let mut arena = ExprArena::new();
        let yes = arena.boolean(true);
        let then_branch = arena.context_item();
        let else_branch = arena.integer(0);
        let choice = arena.conditional(yes, then_branch, else_branch);
        let env = StaticContext::default();
        let mut v = ExpressionVisitor::new(&mut arena, &env);
        let root = v.optimize(choice, ContextItemType::Unknown).unwrap();
        assert_eq!(root, then_branch);
    }
}
