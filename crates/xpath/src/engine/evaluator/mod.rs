//! Tree-walking evaluation of an optimized expression arena.
//!
//! Every node evaluates either to a lazy cursor ([`iterate`]), to at most one item
//! ([`evaluate_item`]) or to a boolean ([`effective_boolean_value`]). Kinds that always
//! produce a single item implement `evaluate_item` directly and are wrapped in a grounded
//! cursor when iterated; every other kind builds a cursor and `evaluate_item` reads its
//! first item.

mod arithmetic;
mod bindings;
mod comparison;
mod filter;
mod functions;
mod path;
mod types;

pub(crate) use types::matches_item_type;

use std::rc::Rc;

use crate::compiler::expr::{BooleanOp, ExprId, ExprKind, FilterFlags};
use crate::engine::context::XPathContext;
use crate::engine::cursors::{self, BlockCursor, BoxedCursor, GroundedCursor, ItemMappingCursor, LocatingCursor};
use crate::engine::numeric::{NumKind, classify, compare_numeric};
use crate::engine::runtime::{Error, ErrorCode};
use crate::model::XdmNode;
use crate::xdm::{GroundedValue, XdmAtomicValue, XdmItem, XdmSequence};

/// Lazily evaluates `id`.
pub(crate) fn iterate<N: XdmNode>(ctx: &XPathContext<N>, id: ExprId) -> Result<BoxedCursor<N>, Error> {
    let cursor = dispatch(ctx, id).map_err(|e| enrich(ctx, id, e))?;
    match ctx.arena().location(id) {
        Some(location) => Ok(Box::new(LocatingCursor::new(cursor, location.clone(), ctx.clone()))),
        None => Ok(cursor),
    }
}

/// Evaluates `id` to completion.
pub(crate) fn materialize<N: XdmNode>(ctx: &XPathContext<N>, id: ExprId) -> Result<XdmSequence<N>, Error> {
    cursors::drain(iterate(ctx, id)?)
}

/// The single item `id` evaluates to, or `None` for the empty sequence.
///
/// Expressions that may yield more items must have been wrapped in a cardinality check
/// during type checking; only the first item is read here.
pub(crate) fn evaluate_item<N: XdmNode>(ctx: &XPathContext<N>, id: ExprId) -> Result<Option<XdmItem<N>>, Error> {
    singleton(ctx, id).map_err(|e| enrich(ctx, id, e))
}

pub(crate) fn effective_boolean_value<N: XdmNode>(ctx: &XPathContext<N>, id: ExprId) -> Result<bool, Error> {
    if let Some(b) = boolean_kind(ctx, id).map_err(|e| enrich(ctx, id, e))? {
        return Ok(b);
    }
    let mut cursor = iterate(ctx, id)?;
    let result = sequence_ebv(cursor.as_mut());
    cursor.close();
    result.map_err(|e| enrich(ctx, id, e))
}

/// Effective boolean value of a single atomic value.
pub(crate) fn atomic_ebv(value: &XdmAtomicValue) -> Result<bool, Error> {
    use XdmAtomicValue as V;
    match value {
        V::Boolean(b) => Ok(*b),
        V::String(s) | V::UntypedAtomic(s) | V::AnyUri(s) => Ok(!s.is_empty()),
        V::Integer(i) => Ok(*i != 0),
        V::Decimal(d) => Ok(!d.is_zero()),
        V::Float(f) => Ok(!f.is_nan() && *f != 0.0),
        V::Double(d) => Ok(!d.is_nan() && *d != 0.0),
        other => Err(Error::dynamic(
            ErrorCode::FORG0006,
            format!("effective boolean value is not defined for {}", other.atomic_type()),
        )),
    }
}

fn sequence_ebv<N: XdmNode>(cursor: &mut dyn cursors::SequenceCursor<N>) -> Result<bool, Error> {
    match cursor.next_item().transpose()? {
        None => Ok(false),
        Some(XdmItem::Node(_)) => Ok(true),
        Some(XdmItem::Atomic(a)) => {
            if cursor.next_item().transpose()?.is_some() {
                return Err(Error::dynamic(
                    ErrorCode::FORG0006,
                    "effective boolean value is not defined for a sequence of two or more atomic values",
                ));
            }
            atomic_ebv(&a)
        }
    }
}

/// Whether the current focus item passes a filter predicate.
///
/// A numeric predicate value selects by position; any other value is reduced to its
/// effective boolean value.
pub(crate) fn predicate_matches<N: XdmNode>(
    ctx: &XPathContext<N>,
    predicate: ExprId,
    flags: FilterFlags,
) -> Result<bool, Error> {
    if flags.contains(FilterFlags::SINGLETON_BOOLEAN) {
        return effective_boolean_value(ctx, predicate);
    }
    if let Some(b) = boolean_kind(ctx, predicate).map_err(|e| enrich(ctx, predicate, e))? {
        return Ok(b);
    }
    let mut cursor = iterate(ctx, predicate)?;
    let first = cursor.next_item().transpose()?;
    let result = match first {
        Some(XdmItem::Atomic(a)) if a.is_numeric() => {
            if cursor.next_item().transpose()?.is_some() {
                Err(Error::dynamic(
                    ErrorCode::FORG0006,
                    "a predicate must not yield a sequence of two or more numbers",
                ))
            } else {
                let position = i64::try_from(ctx.context_position()?).unwrap_or(i64::MAX);
                Ok(equals_position(&a, position))
            }
        }
        None => Ok(false),
        Some(XdmItem::Node(_)) => Ok(true),
        Some(XdmItem::Atomic(a)) => {
            if cursor.next_item().transpose()?.is_some() {
                Err(Error::dynamic(
                    ErrorCode::FORG0006,
                    "effective boolean value is not defined for a sequence of two or more atomic values",
                ))
            } else {
                atomic_ebv(&a)
            }
        }
    };
    cursor.close();
    result
}

fn equals_position(value: &XdmAtomicValue, position: i64) -> bool {
    classify(value).is_some_and(|k| compare_numeric(k, NumKind::Int(position)) == Some(core::cmp::Ordering::Equal))
}

/// Typed value of an item.
pub(crate) fn atomize_item<N: XdmNode>(item: XdmItem<N>) -> XdmAtomicValue {
    match item {
        XdmItem::Atomic(a) => a,
        XdmItem::Node(n) => n.typed_value(),
    }
}

/// Lazily atomizes every item of `base`.
pub(crate) fn atomize_cursor<N: XdmNode>(base: BoxedCursor<N>) -> BoxedCursor<N> {
    Box::new(ItemMappingCursor::new(base, Rc::new(|item| Ok(Some(XdmItem::Atomic(atomize_item(item)))))))
}

/// The atomized value of a zero-or-one operand.
pub(crate) fn atomic_operand<N: XdmNode>(
    ctx: &XPathContext<N>,
    id: ExprId,
) -> Result<Option<XdmAtomicValue>, Error> {
    Ok(evaluate_item(ctx, id)?.map(atomize_item))
}

fn boolean_item<N>(b: bool) -> Option<XdmItem<N>> {
    Some(XdmItem::Atomic(XdmAtomicValue::Boolean(b)))
}

fn enrich<N: XdmNode>(ctx: &XPathContext<N>, id: ExprId, mut e: Error) -> Error {
    e.maybe_set_location(ctx.arena().location(id));
    e.maybe_set_context(|| ctx.error_context());
    e
}

/// Kinds whose value is always a single boolean, computed without a cursor.
fn boolean_kind<N: XdmNode>(ctx: &XPathContext<N>, id: ExprId) -> Result<Option<bool>, Error> {
    let b = match ctx.arena().kind(id) {
        ExprKind::Boolean { op: BooleanOp::And, lhs, rhs } => {
            effective_boolean_value(ctx, *lhs)? && effective_boolean_value(ctx, *rhs)?
        }
        ExprKind::Boolean { op: BooleanOp::Or, lhs, rhs } => {
            effective_boolean_value(ctx, *lhs)? || effective_boolean_value(ctx, *rhs)?
        }
        ExprKind::GeneralComparison { op, lhs, rhs, comparer, strategy, runtime_coercion } => {
            comparison::general(ctx, *op, *lhs, *rhs, *comparer, *strategy, *runtime_coercion)?
        }
        ExprKind::IntegerRangeTest { value, min, max } => comparison::integer_range_test(ctx, *value, *min, *max)?,
        ExprKind::IsLast { condition } => ctx.is_at_last()? == *condition,
        ExprKind::Quantified { quantifier, var, sequence, satisfies } => {
            bindings::quantified(ctx, *quantifier, *var, *sequence, *satisfies)?
        }
        ExprKind::InstanceOf { operand, target } => types::instance_of(ctx, *operand, target)?,
        ExprKind::Castable { operand, target, allows_empty } => {
            types::castable(ctx, *operand, *target, *allows_empty)?
        }
        ExprKind::FunctionCall { function, args } => match functions::boolean(ctx, *function, args)? {
            Some(b) => b,
            None => return Ok(None),
        },
        _ => return Ok(None),
    };
    Ok(Some(b))
}

fn singleton<N: XdmNode>(ctx: &XPathContext<N>, id: ExprId) -> Result<Option<XdmItem<N>>, Error> {
    if let Some(b) = boolean_kind(ctx, id)? {
        return Ok(boolean_item(b));
    }
    let arena = ctx.arena();
    match arena.kind(id) {
        ExprKind::Literal(v) => match v.len() {
            0 => Ok(None),
            _ => Ok(v.item_at(0).map(XdmItem::Atomic)),
        },
        ExprKind::ContextItem { .. } => ctx.context_item().map(Some),
        ExprKind::LocalVarRef(var) => Ok(ctx.local_variable(*var)?.first().cloned()),
        ExprKind::Arithmetic { op, lhs, rhs, calculator, .. } => {
            arithmetic::binary(ctx, *op, *lhs, *rhs, *calculator)
        }
        ExprKind::Negate { operand, backwards_compatible } => {
            arithmetic::negate(ctx, *operand, *backwards_compatible)
        }
        ExprKind::ValueComparison { op, lhs, rhs, comparer, result_when_empty } => {
            comparison::value(ctx, *op, *lhs, *rhs, *comparer, *result_when_empty)
        }
        ExprKind::IdentityComparison { op, lhs, rhs } => comparison::identity(ctx, *op, *lhs, *rhs),
        ExprKind::Cast { operand, target, allows_empty } => types::cast(ctx, *operand, *target, *allows_empty),
        ExprKind::FirstItem { base } => filter::first_item(ctx, *base),
        ExprKind::LastItem { base } => filter::last_item(ctx, *base),
        ExprKind::Conditional { condition, then_branch, else_branch } => {
            let branch = if effective_boolean_value(ctx, *condition)? { *then_branch } else { *else_branch };
            evaluate_item(ctx, branch)
        }
        ExprKind::FunctionCall { function, args } => functions::item(ctx, *function, args),
        _ => first_of(ctx, id),
    }
}

fn first_of<N: XdmNode>(ctx: &XPathContext<N>, id: ExprId) -> Result<Option<XdmItem<N>>, Error> {
    let mut cursor = dispatch(ctx, id)?;
    let first = cursor.next_item().transpose();
    cursor.close();
    first
}

fn dispatch<N: XdmNode>(ctx: &XPathContext<N>, id: ExprId) -> Result<BoxedCursor<N>, Error> {
    let arena = ctx.arena();
    let kind = arena.kind(id);
    let cursor = match kind {
        ExprKind::Literal(v) => GroundedCursor::literal(v.clone()),
        ExprKind::LocalVarRef(var) => GroundedCursor::items(ctx.local_variable(*var)?),
        ExprKind::GlobalVarRef { name, .. } => GroundedCursor::items(ctx.global_variable(name)?),
        ExprKind::Root => path::root(ctx)?,
        ExprKind::Range { start, end } => range(ctx, *start, *end)?,
        ExprKind::Block { children } => Box::new(BlockCursor::new(ctx.clone(), Rc::new(children.clone()))),
        ExprKind::Filter { base, predicate, flags } => filter::filter(ctx, *base, *predicate, *flags)?,
        ExprKind::Subscript { base, index } => filter::subscript(ctx, *base, *index)?,
        ExprKind::Slash { start, step } => path::slash(ctx, *start, *step)?,
        ExprKind::Axis { axis, test } => path::axis(ctx, *axis, test)?,
        ExprKind::DocumentSorter { operand } => path::document_sorter(ctx, *operand)?,
        ExprKind::Venn { op, lhs, rhs } => path::venn(ctx, *op, *lhs, *rhs)?,
        ExprKind::For { var, sequence, action } => bindings::for_each(ctx, *var, *sequence, *action)?,
        ExprKind::Let { var, sequence, action } => bindings::let_binding(ctx, *var, *sequence, *action)?,
        ExprKind::Conditional { condition, then_branch, else_branch } => {
            let branch = if effective_boolean_value(ctx, *condition)? { *then_branch } else { *else_branch };
            iterate(ctx, branch)?
        }
        ExprKind::TreatAs { operand, target } => types::treat_as(ctx, *operand, target)?,
        ExprKind::Atomizer { operand } => atomize_cursor(iterate(ctx, *operand)?),
        ExprKind::UntypedConverter { operand, target } => types::convert_untyped(ctx, *operand, *target)?,
        ExprKind::CardinalityChecker { operand, required, role } => {
            types::check_cardinality(ctx, *operand, *required, role)?
        }
        ExprKind::ItemChecker { operand, required, role } => types::check_items(ctx, *operand, *required, role)?,
        ExprKind::FunctionCall { function, args } => match functions::iterate_call(ctx, *function, args)? {
            Some(cursor) => cursor,
            None => GroundedCursor::from_vec(functions::item(ctx, *function, args)?.into_iter().collect()),
        },
        _ => GroundedCursor::from_vec(singleton(ctx, id)?.into_iter().collect()),
    };
    Ok(cursor)
}

fn range<N: XdmNode>(ctx: &XPathContext<N>, start: ExprId, end: ExprId) -> Result<BoxedCursor<N>, Error> {
    let bound = |id: ExprId| -> Result<Option<i64>, Error> {
        match atomic_operand(ctx, id)? {
            None => Ok(None),
            Some(XdmAtomicValue::Integer(i)) => Ok(Some(i)),
            Some(other) => Err(Error::dynamic(
                ErrorCode::XPTY0004,
                format!("range bound must be xs:integer, found {}", other.atomic_type()),
            )),
        }
    };
    match (bound(start)?, bound(end)?) {
        (Some(s), Some(e)) => Ok(GroundedCursor::literal(GroundedValue::range(s, e))),
        _ => Ok(cursors::empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ebv_of_atomic_values() {
        assert!(atomic_ebv(&XdmAtomicValue::String("x".into())).unwrap());
        assert!(!atomic_ebv(&XdmAtomicValue::Double(f64::NAN)).unwrap());
        assert!(!atomic_ebv(&XdmAtomicValue::Integer(0)).unwrap());
        assert_eq!(
            atomic_ebv(&XdmAtomicValue::DayTimeDuration(0)).unwrap_err().code,
            ErrorCode::FORG0006
        );
    }

    #[test]
    fn numeric_predicates_compare_with_position() {
        assert!(equals_position(&XdmAtomicValue::Double(2.0), 2));
        assert!(!equals_position(&XdmAtomicValue::Double(2.5), 2));
        assert!(!equals_position(&XdmAtomicValue::Double(f64::NAN), 1));
    }
}
