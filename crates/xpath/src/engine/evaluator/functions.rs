//! Evaluation of the system functions.

use itertools::Itertools;

use crate::compiler::expr::ExprId;
use crate::compiler::functions::SystemFunction;
use crate::engine::calculator::{ArithOp, Calculator, CalculatorKind};
use crate::engine::casting::cast_atomic;
use crate::engine::comparer::{CompareOp, Comparer};
use crate::engine::context::XPathContext;
use crate::engine::cursors::{self, BoxedCursor, GroundedCursor, RemoveCursor, SubsequenceCursor};
use crate::engine::numeric::{self, NumKind, Rounding, as_whole_i64, classify};
use crate::engine::runtime::{Error, ErrorCode};
use crate::model::XdmNode;
use crate::types::AtomicType;
use crate::xdm::{XdmAtomicValue, XdmItem};

use super::{atomic_operand, atomize_cursor, atomize_item, effective_boolean_value, evaluate_item, iterate};

fn arg(args: &[ExprId], index: usize) -> Result<ExprId, Error> {
    args.get(index).copied().ok_or_else(|| {
        Error::from_code(ErrorCode::XPST0017, format!("missing argument {} in function call", index + 1))
    })
}

/// Functions whose result is a single boolean; `None` for every other function.
pub(super) fn boolean<N: XdmNode>(
    ctx: &XPathContext<N>,
    function: SystemFunction,
    args: &[ExprId],
) -> Result<Option<bool>, Error> {
    use SystemFunction::*;
    let b = match function {
        True => true,
        False => false,
        Not => !effective_boolean_value(ctx, arg(args, 0)?)?,
        Boolean => effective_boolean_value(ctx, arg(args, 0)?)?,
        Exists | Empty => {
            let mut cursor = iterate(ctx, arg(args, 0)?)?;
            let any = cursor.next_item().transpose()?.is_some();
            cursor.close();
            any == (function == Exists)
        }
        IsWholeNumber => match atomic_operand(ctx, arg(args, 0)?)?.as_ref().and_then(classify) {
            Some(NumKind::Int(_)) => true,
            Some(NumKind::Dec(d)) => d.fract().is_zero(),
            Some(k) => numeric::is_whole(k.to_f64()),
            None => false,
        },
        _ => return Ok(None),
    };
    Ok(Some(b))
}

/// Functions that return a sequence; `None` for the single-item functions.
pub(super) fn iterate_call<N: XdmNode>(
    ctx: &XPathContext<N>,
    function: SystemFunction,
    args: &[ExprId],
) -> Result<Option<BoxedCursor<N>>, Error> {
    use SystemFunction::*;
    let cursor = match function {
        Subsequence { with_length } => subsequence(ctx, args, with_length)?,
        Remove => {
            let base = iterate(ctx, arg(args, 0)?)?;
            let index = atomic_operand(ctx, arg(args, 1)?)?.as_ref().and_then(as_whole_i64);
            match index.and_then(|i| usize::try_from(i).ok()).filter(|i| *i >= 1) {
                Some(i) => Box::new(RemoveCursor::new(base, i)),
                None => base,
            }
        }
        Data => atomize_cursor(iterate(ctx, arg(args, 0)?)?),
        Reverse => {
            let mut items = cursors::drain(iterate(ctx, arg(args, 0)?)?)?;
            items.reverse();
            GroundedCursor::from_vec(items)
        }
        Tail => Box::new(SubsequenceCursor::new(iterate(ctx, arg(args, 0)?)?, 2, None)),
        _ => return Ok(None),
    };
    Ok(Some(cursor))
}

/// `fn:round` on a double, as used for `subsequence` positions.
fn round_position(d: f64) -> f64 {
    (d + 0.5).floor()
}

// positions beyond this are never reached by a real sequence
const MAX_POSITION: f64 = 9.0e15;

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn subsequence<N: XdmNode>(
    ctx: &XPathContext<N>,
    args: &[ExprId],
    with_length: bool,
) -> Result<BoxedCursor<N>, Error> {
    let number = |id: ExprId| -> Result<f64, Error> {
        Ok(atomic_operand(ctx, id)?.as_ref().map_or(f64::NAN, numeric::number))
    };
    let start = round_position(number(arg(args, 1)?)?);
    let end = if with_length { start + round_position(number(arg(args, 2)?)?) } else { f64::INFINITY };
    if start.is_nan() || end.is_nan() {
        return Ok(cursors::empty());
    }
    let first = start.max(1.0);
    if end <= first || first >= MAX_POSITION {
        return Ok(cursors::empty());
    }
    let to = (end < MAX_POSITION).then_some(end as usize);
    Ok(Box::new(SubsequenceCursor::new(iterate(ctx, arg(args, 0)?)?, first as usize, to)))
}

fn atomic<N>(v: XdmAtomicValue) -> Option<XdmItem<N>> {
    Some(XdmItem::Atomic(v))
}

fn count_as_integer(n: usize) -> XdmAtomicValue {
    XdmAtomicValue::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

/// Value of a function call that yields at most one item. Sequence-valued functions
/// yield their first item.
pub(super) fn item<N: XdmNode>(
    ctx: &XPathContext<N>,
    function: SystemFunction,
    args: &[ExprId],
) -> Result<Option<XdmItem<N>>, Error> {
    use SystemFunction::*;
    if let Some(b) = boolean(ctx, function, args)? {
        return Ok(atomic(XdmAtomicValue::Boolean(b)));
    }
    if let Some(mut cursor) = iterate_call(ctx, function, args)? {
        let first = cursor.next_item().transpose();
        cursor.close();
        return first;
    }
    let value = match function {
        Position => count_as_integer(ctx.context_position()?),
        Last => count_as_integer(ctx.last()?),
        Count => count_as_integer(cursors::count(iterate(ctx, arg(args, 0)?)?)?),
        Head => {
            let mut cursor = iterate(ctx, arg(args, 0)?)?;
            let first = cursor.next_item().transpose()?;
            cursor.close();
            return Ok(first);
        }
        Floor | Ceiling | Round | Abs => {
            let Some(v) = atomic_operand(ctx, arg(args, 0)?)? else {
                return Ok(None);
            };
            let v = if v.is_untyped() { cast_atomic(&v, AtomicType::Double)? } else { v };
            match function {
                Floor => numeric::round_value(&v, Rounding::Floor)?,
                Ceiling => numeric::round_value(&v, Rounding::Ceiling)?,
                Round => numeric::round_value(&v, Rounding::Round)?,
                _ => numeric::abs_value(&v)?,
            }
        }
        Number => {
            let v = match args.first() {
                Some(a) => atomic_operand(ctx, *a)?,
                None => Some(atomize_item(ctx.context_item()?)),
            };
            XdmAtomicValue::Double(v.as_ref().map_or(f64::NAN, numeric::number))
        }
        String => {
            let item = match args.first() {
                Some(a) => evaluate_item(ctx, *a)?,
                None => Some(ctx.context_item()?),
            };
            XdmAtomicValue::String(item.map(|i| string_value(&i)).unwrap_or_default())
        }
        StringLength => {
            let item = match args.first() {
                Some(a) => evaluate_item(ctx, *a)?,
                None => Some(ctx.context_item()?),
            };
            let n = item.map_or(0, |i| string_value(&i).chars().count());
            count_as_integer(n)
        }
        Concat { .. } => {
            let parts = args.iter().map(|a| atomic_operand(ctx, *a)).collect::<Result<Vec<_>, _>>()?;
            XdmAtomicValue::String(parts.iter().flatten().map(XdmAtomicValue::lexical).join(""))
        }
        Sum => sum(ctx, arg(args, 0)?)?,
        Min { ignore_nan } => return extreme(ctx, arg(args, 0)?, CompareOp::Lt, ignore_nan).map(|v| v.and_then(atomic)),
        Max { ignore_nan } => return extreme(ctx, arg(args, 0)?, CompareOp::Gt, ignore_nan).map(|v| v.and_then(atomic)),
        // boolean and sequence functions were handled above
        _ => return Ok(None),
    };
    Ok(atomic(value))
}

fn string_value<N: XdmNode>(item: &XdmItem<N>) -> std::string::String {
    match item {
        XdmItem::Node(n) => n.string_value(),
        XdmItem::Atomic(a) => a.lexical(),
    }
}

fn untyped_as_double(v: XdmAtomicValue) -> Result<XdmAtomicValue, Error> {
    if v.is_untyped() { cast_atomic(&v, AtomicType::Double) } else { Ok(v) }
}

fn summable(v: &XdmAtomicValue) -> bool {
    v.is_numeric() || matches!(v, XdmAtomicValue::YearMonthDuration(_) | XdmAtomicValue::DayTimeDuration(_))
}

fn sum<N: XdmNode>(ctx: &XPathContext<N>, operand: ExprId) -> Result<XdmAtomicValue, Error> {
    let plus = Calculator { op: ArithOp::Plus, kind: CalculatorKind::Dynamic, result: AtomicType::AnyAtomic };
    let mut values = atomize_cursor(iterate(ctx, operand)?);
    let mut total: Option<XdmAtomicValue> = None;
    while let Some(item) = values.next_item() {
        let v = untyped_as_double(atomize_item(item?))?;
        if !summable(&v) {
            values.close();
            return Err(Error::dynamic(ErrorCode::FORG0006, format!("fn:sum is not defined for {}", v.atomic_type())));
        }
        total = Some(match total {
            None => v,
            Some(t) => plus.compute(&t, &v, ctx.implicit_timezone()).map_err(|e| Error { code: ErrorCode::FORG0006, ..e })?,
        });
    }
    Ok(total.unwrap_or(XdmAtomicValue::Integer(0)))
}

/// `fn:min` (with `Lt`) or `fn:max` (with `Gt`).
///
/// A NaN operand makes the result NaN, unless `ignore_nan` is set, in which case NaN
/// values are skipped.
fn extreme<N: XdmNode>(
    ctx: &XPathContext<N>,
    operand: ExprId,
    better: CompareOp,
    ignore_nan: bool,
) -> Result<Option<XdmAtomicValue>, Error> {
    let mut values = atomize_cursor(iterate(ctx, operand)?);
    let env = ctx.compare_env();
    let mut best: Option<XdmAtomicValue> = None;
    let mut saw_nan = false;
    while let Some(item) = values.next_item() {
        let v = untyped_as_double(atomize_item(item?))?;
        if v.is_nan() {
            if ignore_nan {
                continue;
            }
            saw_nan = true;
        }
        best = match best {
            None => Some(v),
            Some(b) => {
                let wins = Comparer::Dynamic.compare(better, &v, &b, &env).map_err(|e| Error {
                    code: ErrorCode::FORG0006,
                    ..e
                })?;
                Some(if wins { v } else { b })
            }
        };
    }
    if saw_nan {
        return Ok(Some(XdmAtomicValue::Double(f64::NAN)));
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsequence_positions_round_half_up() {
        assert!((round_position(1.5) - 2.0).abs() < f64::EPSILON);
        assert!((round_position(-0.5) - 0.0).abs() < f64::EPSILON);
        assert!(round_position(f64::NAN).is_nan());
    }

    #[test]
    fn summable_types() {
        assert!(summable(&XdmAtomicValue::Decimal(rust_decimal::Decimal::ONE)));
        assert!(summable(&XdmAtomicValue::DayTimeDuration(1)));
        assert!(!summable(&XdmAtomicValue::String("1".into())));
    }
}
