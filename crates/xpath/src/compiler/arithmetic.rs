//! Type checking of arithmetic and unary minus.

use crate::compiler::expr::{ExprId, ExprKind};
use crate::compiler::visitor::ExpressionVisitor;
use crate::engine::calculator::{ArithOp, Calculator};
use crate::engine::runtime::{Error, ErrorCode};
use crate::types::{AtomicType, Cardinality};

impl ExpressionVisitor<'_> {
    pub(super) fn type_check_arithmetic(&mut self, id: ExprId) -> Result<ExprId, Error> {
        let ExprKind::Arithmetic { op, lhs, rhs, backwards_compatible, .. } = self.arena.kind(id).clone() else {
            return Ok(id);
        };
        let (lhs, rhs) = if backwards_compatible {
            (lhs, rhs)
        } else {
            let lhs = self.arithmetic_operand(id, lhs, op, "first")?;
            let rhs = self.arithmetic_operand(id, rhs, op, "second")?;
            (lhs, rhs)
        };
        let lt = self.arena.item_type(lhs);
        let rt = self.arena.item_type(rhs);
        let Some(calculator) = Calculator::resolve(op, lt.primitive_atomic(), rt.primitive_atomic(), false) else {
            return Err(Error::static_type(
                ErrorCode::XPTY0004,
                format!("arithmetic operator '{op}' is not defined for arguments of types ({lt}, {rt})"),
            ));
        };
        if let ExprKind::Arithmetic { calculator: c, .. } = self.arena.kind_mut(id) {
            *c = Some(calculator);
        }
        Ok(self.fold(id))
    }

    fn arithmetic_operand(&mut self, id: ExprId, operand: ExprId, op: ArithOp, which: &str) -> Result<ExprId, Error> {
        let operand = self.atomized(id, operand);
        let role = format!("the {which} operand of '{op}'");
        let operand = self.checked_cardinality(id, operand, Cardinality::ZERO_OR_ONE, &role)?;
        Ok(self.untyped_to(id, operand, AtomicType::Double))
    }

    pub(super) fn type_check_negate(&mut self, id: ExprId) -> Result<ExprId, Error> {
        let ExprKind::Negate { operand, backwards_compatible } = self.arena.kind(id).clone() else {
            return Ok(id);
        };
        if backwards_compatible {
            return Ok(self.fold(id));
        }
        let operand = self.atomized(id, operand);
        let operand = self.checked_cardinality(id, operand, Cardinality::ZERO_OR_ONE, "the operand of unary '-'")?;
        let operand = self.untyped_to(id, operand, AtomicType::Double);
        let t = self.arena.item_type(operand).primitive_atomic();
        if !t.is_numeric() && !t.is_abstract() && !self.arena.cardinality(operand).is_empty_sequence() {
            return Err(Error::static_type(
                ErrorCode::XPTY0004,
                format!("unary minus is not defined for an argument of type {t}"),
            ));
        }
        Ok(self.fold(id))
    }

    /// A type-checked arithmetic node, used by rewrites that build new expressions.
    pub(crate) fn checked_arithmetic(&mut self, op: ArithOp, lhs: ExprId, rhs: ExprId, like: ExprId) -> ExprId {
        let lt = self.arena.item_type(lhs).primitive_atomic();
        let rt = self.arena.item_type(rhs).primitive_atomic();
        let kind = ExprKind::Arithmetic {
            op,
            lhs,
            rhs,
            calculator: Calculator::resolve(op, lt, rt, false),
            simplified: true,
            backwards_compatible: false,
        };
        let id = self.arena.add_like(kind, like);
        self.fold(id)
    }
}
