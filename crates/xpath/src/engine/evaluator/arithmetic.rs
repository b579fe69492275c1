use crate::compiler::expr::ExprId;
use crate::engine::calculator::{self, ArithOp, Calculator, CalculatorKind};
use crate::engine::context::XPathContext;
use crate::engine::numeric;
use crate::engine::runtime::Error;
use crate::model::XdmNode;
use crate::types::AtomicType;
use crate::xdm::{XdmAtomicValue, XdmItem};

use super::atomic_operand;

pub(super) fn binary<N: XdmNode>(
    ctx: &XPathContext<N>,
    op: ArithOp,
    lhs: ExprId,
    rhs: ExprId,
    calculator: Option<Calculator>,
) -> Result<Option<XdmItem<N>>, Error> {
    let Some(a) = atomic_operand(ctx, lhs)? else {
        return Ok(None);
    };
    let Some(b) = atomic_operand(ctx, rhs)? else {
        return Ok(None);
    };
    // an expression that skipped type checking still evaluates, resolving per value pair
    let calculator =
        calculator.unwrap_or(Calculator { op, kind: CalculatorKind::Dynamic, result: AtomicType::AnyAtomic });
    calculator.compute(&a, &b, ctx.implicit_timezone()).map(|v| Some(XdmItem::Atomic(v)))
}

pub(super) fn negate<N: XdmNode>(
    ctx: &XPathContext<N>,
    operand: ExprId,
    backwards_compatible: bool,
) -> Result<Option<XdmItem<N>>, Error> {
    let Some(v) = atomic_operand(ctx, operand)? else {
        return Ok(None);
    };
    let v = if backwards_compatible { XdmAtomicValue::Double(numeric::number(&v)) } else { v };
    calculator::negate(&v).map(|v| Some(XdmItem::Atomic(v)))
}
