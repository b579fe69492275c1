use std::rc::Rc;

use crate::compiler::expr::{ExprId, ExprKind, Quantifier, VarId};
use crate::engine::context::{LazyValue, SlotValue, XPathContext};
use crate::engine::cursors::{BoxedCursor, MappingCursor};
use crate::engine::runtime::Error;
use crate::model::XdmNode;

use super::{effective_boolean_value, iterate, materialize};

pub(super) fn for_each<N: XdmNode>(
    ctx: &XPathContext<N>,
    var: VarId,
    sequence: ExprId,
    action: ExprId,
) -> Result<BoxedCursor<N>, Error> {
    let base = iterate(ctx, sequence)?;
    Ok(Box::new(MappingCursor::new(ctx.fork(), var, base, action)))
}

pub(super) fn let_binding<N: XdmNode>(
    ctx: &XPathContext<N>,
    var: VarId,
    sequence: ExprId,
    action: ExprId,
) -> Result<BoxedCursor<N>, Error> {
    let arena = ctx.arena();
    // a focus-dependent value must be read before the focus moves on
    let eager = arena.dependencies(sequence).depends_on_focus()
        || matches!(arena.kind(sequence), ExprKind::Literal(_) | ExprKind::LocalVarRef(_));
    let value = if eager {
        SlotValue::Value(Rc::new(materialize(ctx, sequence)?))
    } else {
        SlotValue::Lazy(Rc::new(LazyValue::new(sequence, ctx.fork())))
    };
    let scope = ctx.fork();
    scope.bind(var, value);
    iterate(&scope, action)
}

pub(super) fn quantified<N: XdmNode>(
    ctx: &XPathContext<N>,
    quantifier: Quantifier,
    var: VarId,
    sequence: ExprId,
    satisfies: ExprId,
) -> Result<bool, Error> {
    let scope = ctx.fork();
    let mut items = iterate(ctx, sequence)?;
    let wanted = quantifier == Quantifier::Some;
    while let Some(item) = items.next_item() {
        scope.bind(var, SlotValue::single(item?));
        if effective_boolean_value(&scope, satisfies)? == wanted {
            items.close();
            return Ok(wanted);
        }
    }
    Ok(!wanted)
}
