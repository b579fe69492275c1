use core::cmp::Ordering;

use crate::compiler::expr::{ComparisonStrategy, ExprId, NodeCompareOp};
use crate::engine::comparer::{CompareOp, Comparer, coerce_general_pair, coerce_value_operand};
use crate::engine::context::XPathContext;
use crate::engine::numeric::as_whole_i64;
use crate::engine::casting::cast_atomic;
use crate::engine::runtime::{Error, ErrorCode};
use crate::model::XdmNode;
use crate::types::AtomicType;
use crate::xdm::{XdmAtomicValue, XdmItem};

use super::{atomic_operand, atomize_cursor, evaluate_item, iterate};

pub(super) fn value<N: XdmNode>(
    ctx: &XPathContext<N>,
    op: CompareOp,
    lhs: ExprId,
    rhs: ExprId,
    comparer: Comparer,
    result_when_empty: Option<bool>,
) -> Result<Option<XdmItem<N>>, Error> {
    let empty = || result_when_empty.map(|b| XdmItem::Atomic(XdmAtomicValue::Boolean(b)));
    let Some(a) = atomic_operand(ctx, lhs)? else {
        return Ok(empty());
    };
    let Some(b) = atomic_operand(ctx, rhs)? else {
        return Ok(empty());
    };
    let (a, b) = (coerce_value_operand(a), coerce_value_operand(b));
    let result = comparer.compare(op, &a, &b, &ctx.compare_env())?;
    Ok(Some(XdmItem::Atomic(XdmAtomicValue::Boolean(result))))
}

struct PairTest<'a, N> {
    ctx: &'a XPathContext<N>,
    op: CompareOp,
    comparer: Comparer,
    runtime_coercion: bool,
}

impl<N: XdmNode> PairTest<'_, N> {
    fn test(&self, a: &XdmAtomicValue, b: &XdmAtomicValue) -> Result<bool, Error> {
        let env = self.ctx.compare_env();
        if self.runtime_coercion && (a.is_untyped() || b.is_untyped()) {
            let (a, b) = coerce_general_pair(a, b)?;
            return Comparer::Dynamic.compare(self.op, &a, &b, &env);
        }
        self.comparer.compare(self.op, a, b, &env)
    }
}

/// Existentially quantified comparison of two atomized sequences.
pub(super) fn general<N: XdmNode>(
    ctx: &XPathContext<N>,
    op: CompareOp,
    lhs: ExprId,
    rhs: ExprId,
    comparer: Comparer,
    strategy: ComparisonStrategy,
    runtime_coercion: bool,
) -> Result<bool, Error> {
    let pair = PairTest { ctx, op, comparer, runtime_coercion };
    match strategy {
        ComparisonStrategy::OneToOne => {
            let Some(a) = atomic_operand(ctx, lhs)? else {
                return Ok(false);
            };
            let Some(b) = atomic_operand(ctx, rhs)? else {
                return Ok(false);
            };
            pair.test(&a, &b)
        }
        ComparisonStrategy::ManyToOne => {
            let Some(b) = atomic_operand(ctx, rhs)? else {
                return Ok(false);
            };
            let mut left = atomize_cursor(iterate(ctx, lhs)?);
            while let Some(a) = left.next_item() {
                if let XdmItem::Atomic(a) = a? {
                    if pair.test(&a, &b)? {
                        left.close();
                        return Ok(true);
                    }
                }
            }
            Ok(false)
        }
        ComparisonStrategy::ManyToMany | ComparisonStrategy::Unresolved => many_to_many(ctx, &pair, lhs, rhs),
    }
}

/// Reads both sides alternately, comparing each new item with everything already seen
/// on the other side, so that a match is found without exhausting either operand.
fn many_to_many<N: XdmNode>(
    ctx: &XPathContext<N>,
    pair: &PairTest<'_, N>,
    lhs: ExprId,
    rhs: ExprId,
) -> Result<bool, Error> {
    let mut left = Some(atomize_cursor(iterate(ctx, lhs)?));
    let mut right = Some(atomize_cursor(iterate(ctx, rhs)?));
    let mut seen_left: Vec<XdmAtomicValue> = Vec::new();
    let mut seen_right: Vec<XdmAtomicValue> = Vec::new();
    let mut found = false;
    while !found && (left.is_some() || right.is_some()) {
        if let Some(cursor) = &mut left {
            match cursor.next_item().transpose()? {
                Some(XdmItem::Atomic(a)) => {
                    for b in &seen_right {
                        if pair.test(&a, b)? {
                            found = true;
                            break;
                        }
                    }
                    seen_left.push(a);
                }
                Some(XdmItem::Node(_)) => {}
                None => left = None,
            }
        }
        if found {
            break;
        }
        if let Some(cursor) = &mut right {
            match cursor.next_item().transpose()? {
                Some(XdmItem::Atomic(b)) => {
                    for a in &seen_left {
                        if pair.test(a, &b)? {
                            found = true;
                            break;
                        }
                    }
                    seen_right.push(b);
                }
                Some(XdmItem::Node(_)) => {}
                None => right = None,
            }
        }
    }
    for cursor in [left, right].iter_mut().flatten() {
        cursor.close();
    }
    Ok(found)
}

pub(super) fn identity<N: XdmNode>(
    ctx: &XPathContext<N>,
    op: NodeCompareOp,
    lhs: ExprId,
    rhs: ExprId,
) -> Result<Option<XdmItem<N>>, Error> {
    let node = |id: ExprId| -> Result<Option<N>, Error> {
        match evaluate_item(ctx, id)? {
            None => Ok(None),
            Some(XdmItem::Node(n)) => Ok(Some(n)),
            Some(XdmItem::Atomic(a)) => Err(Error::dynamic(
                ErrorCode::XPTY0004,
                format!("node comparison operand is an atomic value of type {}", a.atomic_type()),
            )),
        }
    };
    let (Some(a), Some(b)) = (node(lhs)?, node(rhs)?) else {
        return Ok(None);
    };
    let result = match op {
        NodeCompareOp::Is => a == b,
        NodeCompareOp::Precedes => a.compare_document_order(&b)? == Ordering::Less,
        NodeCompareOp::Follows => a.compare_document_order(&b)? == Ordering::Greater,
    };
    Ok(Some(XdmItem::Atomic(XdmAtomicValue::Boolean(result))))
}

/// `value = (min to max)`: true when the value is a whole number inside the range.
pub(super) fn integer_range_test<N: XdmNode>(
    ctx: &XPathContext<N>,
    value: ExprId,
    min: ExprId,
    max: ExprId,
) -> Result<bool, Error> {
    let Some(v) = atomic_operand(ctx, value)? else {
        return Ok(false);
    };
    let v = if v.is_untyped() { cast_atomic(&v, AtomicType::Double)? } else { v };
    let Some(v) = as_whole_i64(&v) else {
        return Ok(false);
    };
    let bound = |id: ExprId| -> Result<Option<i64>, Error> { Ok(atomic_operand(ctx, id)?.as_ref().and_then(as_whole_i64)) };
    match (bound(min)?, bound(max)?) {
        (Some(lo), Some(hi)) => Ok(lo <= v && v <= hi),
        _ => Ok(false),
    }
}
