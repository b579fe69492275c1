use crate::compiler::expr::{ExprId, FilterFlags};
use crate::engine::context::XPathContext;
use crate::engine::cursors::{self, BoxedCursor, FilterCursor, SubsequenceCursor};
use crate::engine::numeric::as_whole_i64;
use crate::engine::runtime::Error;
use crate::model::XdmNode;
use crate::xdm::XdmItem;

use super::{atomic_operand, iterate};

pub(super) fn filter<N: XdmNode>(
    ctx: &XPathContext<N>,
    base: ExprId,
    predicate: ExprId,
    flags: FilterFlags,
) -> Result<BoxedCursor<N>, Error> {
    let focus = ctx.with_focus(iterate(ctx, base)?);
    Ok(Box::new(FilterCursor::new(focus, predicate, flags)))
}

pub(super) fn first_item<N: XdmNode>(ctx: &XPathContext<N>, base: ExprId) -> Result<Option<XdmItem<N>>, Error> {
    let mut cursor = iterate(ctx, base)?;
    let first = cursor.next_item().transpose();
    cursor.close();
    first
}

pub(super) fn last_item<N: XdmNode>(ctx: &XPathContext<N>, base: ExprId) -> Result<Option<XdmItem<N>>, Error> {
    let mut cursor = iterate(ctx, base)?;
    let mut last = None;
    while let Some(item) = cursor.next_item() {
        last = Some(item?);
    }
    Ok(last)
}

/// `base[index]` for an index that does not depend on the focus; the index is
/// evaluated once.
pub(super) fn subscript<N: XdmNode>(
    ctx: &XPathContext<N>,
    base: ExprId,
    index: ExprId,
) -> Result<BoxedCursor<N>, Error> {
    let position = atomic_operand(ctx, index)?.as_ref().and_then(as_whole_i64);
    match position.and_then(|p| usize::try_from(p).ok()).filter(|p| *p >= 1) {
        Some(p) => Ok(Box::new(SubsequenceCursor::new(iterate(ctx, base)?, p, Some(p + 1)))),
        None => Ok(cursors::empty()),
    }
}
