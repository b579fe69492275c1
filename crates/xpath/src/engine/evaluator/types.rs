use std::rc::Rc;
use std::sync::Arc;

use crate::compiler::expr::{ExprId, Role};
use crate::engine::casting::cast_atomic;
use crate::engine::context::XPathContext;
use crate::engine::cursors::{BoxedCursor, CardinalityCheckCursor, GroundedCursor, ItemMappingCursor};
use crate::engine::runtime::{Error, ErrorCode};
use crate::model::XdmNode;
use crate::types::{AtomicType, Cardinality, ItemType, SequenceType, type_hierarchy};
use crate::xdm::{XdmAtomicValue, XdmItem};

use super::{atomize_cursor, iterate, materialize};

/// Whether a single item is an instance of `item_type`.
pub(crate) fn matches_item_type<N: XdmNode>(item: &XdmItem<N>, item_type: &ItemType) -> bool {
    match (item_type, item) {
        (ItemType::AnyItem, _) | (ItemType::AnyNode, XdmItem::Node(_)) => true,
        (ItemType::Node(kind), XdmItem::Node(n)) => n.kind() == *kind,
        (ItemType::Atomic(t), XdmItem::Atomic(a)) => type_hierarchy().is_atomic_subtype(a.atomic_type(), *t),
        _ => false,
    }
}

fn describe<N: XdmNode>(item: &XdmItem<N>) -> String {
    match item {
        XdmItem::Node(n) => n.kind().test_name().to_string(),
        XdmItem::Atomic(a) => a.atomic_type().to_string(),
    }
}

pub(super) fn instance_of<N: XdmNode>(
    ctx: &XPathContext<N>,
    operand: ExprId,
    target: &SequenceType,
) -> Result<bool, Error> {
    let mut cursor = iterate(ctx, operand)?;
    let mut count = 0usize;
    while let Some(item) = cursor.next_item() {
        count += 1;
        let fits = matches_item_type(&item?, &target.item_type) && (count == 1 || target.cardinality.allows_many());
        if !fits {
            cursor.close();
            return Ok(false);
        }
    }
    Ok(if count == 0 { target.cardinality.allows_zero() } else { target.cardinality.allows_one() || count > 1 })
}

/// Atomizes the operand of a cast, which must be a single value (or empty when allowed).
fn cast_operand<N: XdmNode>(ctx: &XPathContext<N>, operand: ExprId) -> Result<Vec<XdmAtomicValue>, Error> {
    let mut cursor = atomize_cursor(iterate(ctx, operand)?);
    let mut values = Vec::with_capacity(1);
    while let Some(item) = cursor.next_item() {
        if let XdmItem::Atomic(a) = item? {
            values.push(a);
        }
        if values.len() > 1 {
            cursor.close();
            break;
        }
    }
    Ok(values)
}

pub(super) fn castable<N: XdmNode>(
    ctx: &XPathContext<N>,
    operand: ExprId,
    target: AtomicType,
    allows_empty: bool,
) -> Result<bool, Error> {
    let values = cast_operand(ctx, operand)?;
    Ok(match values.as_slice() {
        [] => allows_empty,
        [v] => cast_atomic(v, target).is_ok(),
        _ => false,
    })
}

pub(super) fn cast<N: XdmNode>(
    ctx: &XPathContext<N>,
    operand: ExprId,
    target: AtomicType,
    allows_empty: bool,
) -> Result<Option<XdmItem<N>>, Error> {
    let values = cast_operand(ctx, operand)?;
    match values.as_slice() {
        [] if allows_empty => Ok(None),
        [] => Err(Error::dynamic(ErrorCode::XPTY0004, format!("cannot cast an empty sequence to {target}"))),
        [v] => cast_atomic(v, target).map(|v| Some(XdmItem::Atomic(v))),
        _ => Err(Error::dynamic(
            ErrorCode::XPTY0004,
            format!("cannot cast a sequence of more than one item to {target}"),
        )),
    }
}

pub(super) fn treat_as<N: XdmNode>(
    ctx: &XPathContext<N>,
    operand: ExprId,
    target: &SequenceType,
) -> Result<BoxedCursor<N>, Error> {
    let items = materialize(ctx, operand)?;
    let fail = |what: String| Error::dynamic(ErrorCode::XPDY0050, format!("treat as {target} failed: {what}"));
    if !target.cardinality.subsumes(Cardinality::from_count(items.len())) {
        return Err(fail(format!("the value has {} item(s)", items.len())));
    }
    if let Some(bad) = items.iter().find(|i| !matches_item_type(i, &target.item_type)) {
        return Err(fail(format!("found an item of type {}", describe(bad))));
    }
    Ok(GroundedCursor::from_vec(items))
}

/// Casts `xs:untypedAtomic` items to `target`; other items pass through.
pub(super) fn convert_untyped<N: XdmNode>(
    ctx: &XPathContext<N>,
    operand: ExprId,
    target: AtomicType,
) -> Result<BoxedCursor<N>, Error> {
    let base = iterate(ctx, operand)?;
    Ok(Box::new(ItemMappingCursor::new(
        base,
        Rc::new(move |item| match item {
            XdmItem::Atomic(a) if a.is_untyped() => cast_atomic(&a, target).map(|v| Some(XdmItem::Atomic(v))),
            other => Ok(Some(other)),
        }),
    )))
}

pub(super) fn check_cardinality<N: XdmNode>(
    ctx: &XPathContext<N>,
    operand: ExprId,
    required: Cardinality,
    role: &Role,
) -> Result<BoxedCursor<N>, Error> {
    Ok(Box::new(CardinalityCheckCursor::new(iterate(ctx, operand)?, required, Arc::clone(role))))
}

pub(super) fn check_items<N: XdmNode>(
    ctx: &XPathContext<N>,
    operand: ExprId,
    required: ItemType,
    role: &Role,
) -> Result<BoxedCursor<N>, Error> {
    let role = Arc::clone(role);
    Ok(Box::new(ItemMappingCursor::new(
        iterate(ctx, operand)?,
        Rc::new(move |item| {
            if matches_item_type(&item, &required) {
                Ok(Some(item))
            } else {
                Err(Error::dynamic(
                    ErrorCode::XPTY0004,
                    format!("required item type of {role} is {required}; supplied value has type {}", describe(&item)),
                ))
            }
        }),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeKind;
    use crate::model::simple::{SimpleNode, elem};

    #[test]
    fn item_type_matching() {
        let n: XdmItem<SimpleNode> = XdmItem::Node(elem("a").build());
        let i: XdmItem<SimpleNode> = XdmItem::Atomic(XdmAtomicValue::Integer(1));
        assert!(matches_item_type(&n, &ItemType::Node(NodeKind::Element)));
        assert!(!matches_item_type(&n, &ItemType::ANY_ATOMIC));
        assert!(matches_item_type(&i, &ItemType::NUMERIC));
        assert!(!matches_item_type(&i, &ItemType::STRING));
        assert!(!matches_item_type(&i, &ItemType::Empty));
    }
}
