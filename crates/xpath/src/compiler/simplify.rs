//! Structural normalization that needs no type information.

use smallvec::SmallVec;

use crate::compiler::expr::{ExprId, ExprKind};
use crate::compiler::functions::SystemFunction;
use crate::compiler::visitor::ExpressionVisitor;
use crate::engine::calculator;
use crate::engine::runtime::Error;
use crate::types::ItemType;
use crate::xdm::{GroundedValue, XdmAtomicValue};

impl ExpressionVisitor<'_> {
    pub(super) fn simplify_node(&mut self, id: ExprId) -> Result<ExprId, Error> {
        match self.arena.kind(id).clone() {
            ExprKind::Arithmetic { lhs, rhs, simplified: false, .. } => Ok(self.simplify_arithmetic(id, lhs, rhs)),
            ExprKind::Negate { operand, .. } => Ok(self.simplify_negate(id, operand)),
            ExprKind::Block { children } => Ok(self.flatten_block(id, &children)),
            ExprKind::Range { start, end } => Ok(self.literal_range(id, start, end)),
            ExprKind::FunctionCall { function, args } if args.is_empty() && function.takes_context_item_by_default() => {
                let mut dot = self.arena.add_like(ExprKind::ContextItem { item_type: ItemType::AnyItem }, id);
                if function == SystemFunction::StringLength {
                    dot = self.arena.add_like(
                        ExprKind::FunctionCall { function: SystemFunction::String, args: smallvec::smallvec![dot] },
                        id,
                    );
                }
                let call = self.arena.add_like(ExprKind::FunctionCall { function, args: smallvec::smallvec![dot] }, id);
                self.record("context-item-argument", call);
                Ok(call)
            }
            _ => Ok(id),
        }
    }

    /// Decides backwards-compatible mode once; later passes leave the node alone.
    fn simplify_arithmetic(&mut self, id: ExprId, lhs: ExprId, rhs: ExprId) -> ExprId {
        let compatible = self.env.backwards_compatible;
        if compatible {
            for operand in [lhs, rhs] {
                let first = self.arena.add_like(ExprKind::FirstItem { base: operand }, operand);
                let number = self
                    .arena
                    .add_like(ExprKind::FunctionCall { function: SystemFunction::Number, args: smallvec::smallvec![first] }, operand);
                self.arena.replace_sub_expression(id, operand, number);
            }
        }
        if let ExprKind::Arithmetic { simplified, backwards_compatible, .. } = self.arena.kind_mut(id) {
            *simplified = true;
            *backwards_compatible = compatible;
        }
        if compatible {
            self.record("backwards-compatible-arithmetic", id);
        }
        id
    }

    fn simplify_negate(&mut self, id: ExprId, operand: ExprId) -> ExprId {
        if self.env.backwards_compatible {
            if let ExprKind::Negate { backwards_compatible, .. } = self.arena.kind_mut(id) {
                *backwards_compatible = true;
            }
            return id;
        }
        let value = match self.arena.kind(operand).as_literal().and_then(GroundedValue::as_singleton) {
            Some(v) if v.is_numeric() => v,
            _ => return id,
        };
        match calculator::negate(&value) {
            Ok(negated) => {
                let lit = self.literal_like(GroundedValue::singleton(negated), id);
                self.record("negate-literal", lit);
                lit
            }
            Err(_) => id,
        }
    }

    /// Splices nested blocks and drops empty literals.
    fn flatten_block(&mut self, id: ExprId, children: &[ExprId]) -> ExprId {
        let mut flat: SmallVec<[ExprId; 4]> = SmallVec::new();
        let mut changed = false;
        for child in children {
            match self.arena.kind(*child) {
                ExprKind::Block { children: inner } => {
                    flat.extend(inner.iter().copied());
                    changed = true;
                }
                ExprKind::Literal(v) if v.is_empty() => changed = true,
                _ => flat.push(*child),
            }
        }
        match flat.len() {
            0 => {
                let lit = self.literal_like(GroundedValue::empty(), id);
                self.record("empty-block", lit);
                lit
            }
            1 => {
                self.record("singleton-block", flat[0]);
                flat[0]
            }
            _ if changed => {
                let block = self.arena.add_like(ExprKind::Block { children: flat }, id);
                self.record("flatten-block", block);
                block
            }
            _ => id,
        }
    }

    fn literal_range(&mut self, id: ExprId, start: ExprId, end: ExprId) -> ExprId {
        let bound = |e: ExprId| match self.arena.kind(e).as_literal().and_then(GroundedValue::as_singleton) {
            Some(XdmAtomicValue::Integer(i)) => Some(i),
            _ => None,
        };
        match (bound(start), bound(end)) {
            (Some(s), Some(e)) => {
                let lit = self.literal_like(GroundedValue::range(s, e), id);
                self.record("literal-range", lit);
                lit
            }
            _ => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::ExprArena;
    use crate::compiler::expr::{ExprId, ExprKind};
    use crate::compiler::functions::SystemFunction;
    use crate::compiler::visitor::ExpressionVisitor;
    use crate::engine::calculator::ArithOp;
    use crate::engine::runtime::StaticContextBuilder;

    fn number_calls(arena: &ExprArena, root: ExprId) -> usize {
        arena
            .descendants_or_self(root)
            .into_iter()
            .filter(|e| matches!(arena.kind(*e), ExprKind::FunctionCall { function: SystemFunction::Number, .. }))
            .count()
    }

    #[test]
    fn backwards_compatible_arithmetic_is_wrapped_once() {
        let mut arena = ExprArena::new();
        let a = arena.string("1");
        let b = arena.integer(2);
        let sum = arena.arithmetic(ArithOp::Plus, a, b);
        let env = StaticContextBuilder::new().with_backwards_compatible(true).build();
        let mut v = ExpressionVisitor::new(&mut arena, &env);
        let once = v.simplify(sum).unwrap();
        let twice = v.simplify(once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(number_calls(v.arena, twice), 2);
    }

    #[test]
    fn nested_blocks_are_flattened() {
        let mut arena = ExprArena::new();
        let one = arena.integer(1);
        let empty = arena.empty_sequence();
        let two = arena.integer(2);
        let inner = arena.block(vec![empty, two]);
        let three = arena.integer(3);
        let outer = arena.block(vec![one, inner, three]);
        let env = StaticContextBuilder::new().build();
        let mut v = ExpressionVisitor::new(&mut arena, &env);
        let root = v.simplify(outer).unwrap();
        let ExprKind::Block { children } = v.arena.kind(root) else {
            panic!("expected a block");
        };
        assert_eq!(children.len(), 3);
    }

    #[test]
    fn integer_range_becomes_a_literal() {
        let mut arena = ExprArena::new();
        let lo = arena.integer(2);
        let hi = arena.integer(5);
        let range = arena.range(lo, hi);
        let env = StaticContextBuilder::new().build();
        let mut v = ExpressionVisitor::new(&mut arena, &env);
        let root = v.simplify(range).unwrap();
        let literal = v.arena.kind(root).as_literal().map(|l| l.len());
        assert_eq!(literal, Some(4));
    }
}
