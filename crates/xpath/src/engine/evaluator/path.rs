use core::cmp::Ordering;

use crate::compiler::expr::{Axis, ExprId, SetOp};
use crate::engine::context::XPathContext;
use crate::engine::cursors::{AxisCursor, BoxedCursor, ContextMappingCursor, GroundedCursor};
use crate::engine::runtime::{Error, ErrorCode};
use crate::model::XdmNode;
use crate::types::NodeTest;
use crate::xdm::{XdmItem, XdmSequence};

use super::{iterate, materialize};

fn context_node<N: XdmNode>(ctx: &XPathContext<N>, what: &str) -> Result<N, Error> {
    match ctx.context_item()? {
        XdmItem::Node(n) => Ok(n),
        XdmItem::Atomic(a) => Err(Error::dynamic(
            ErrorCode::XPTY0020,
            format!("{what} requires a node as context item, found {}", a.atomic_type()),
        )),
    }
}

pub(super) fn root<N: XdmNode>(ctx: &XPathContext<N>) -> Result<BoxedCursor<N>, Error> {
    let node = context_node(ctx, "the root expression")?;
    Ok(GroundedCursor::single(XdmItem::Node(node.root())))
}

pub(super) fn axis<N: XdmNode>(ctx: &XPathContext<N>, axis: Axis, test: &NodeTest) -> Result<BoxedCursor<N>, Error> {
    let node = context_node(ctx, "an axis step")?;
    Ok(Box::new(AxisCursor::new(node, axis, test.clone())))
}

pub(super) fn slash<N: XdmNode>(ctx: &XPathContext<N>, start: ExprId, step: ExprId) -> Result<BoxedCursor<N>, Error> {
    let focus = ctx.with_focus(iterate(ctx, start)?);
    Ok(Box::new(ContextMappingCursor::new(focus, step)))
}

/// Sorts nodes into document order and drops duplicates.
pub(crate) fn sort_nodes<N: XdmNode>(mut nodes: Vec<N>) -> Result<Vec<N>, Error> {
    let mut failure = None;
    nodes.sort_by(|a, b| {
        a.compare_document_order(b).unwrap_or_else(|e| {
            failure.get_or_insert(e);
            Ordering::Equal
        })
    });
    if let Some(e) = failure {
        return Err(e);
    }
    nodes.dedup();
    Ok(nodes)
}

/// Puts a path result into document order. An all-atomic result passes through;
/// a result mixing nodes and atomic values is an error.
pub(super) fn document_sorter<N: XdmNode>(ctx: &XPathContext<N>, operand: ExprId) -> Result<BoxedCursor<N>, Error> {
    let items = materialize(ctx, operand)?;
    let nodes = items.iter().filter(|i| i.is_node()).count();
    if nodes == 0 {
        return Ok(GroundedCursor::from_vec(items));
    }
    if nodes != items.len() {
        return Err(Error::dynamic(ErrorCode::XPTY0018, "the result of a path contains both nodes and atomic values"));
    }
    let nodes = sort_nodes(items.into_iter().filter_map(|i| i.as_node().cloned()).collect())?;
    Ok(GroundedCursor::from_vec(nodes.into_iter().map(XdmItem::Node).collect()))
}

fn node_operand<N: XdmNode>(items: XdmSequence<N>, op: SetOp) -> Result<Vec<N>, Error> {
    items
        .into_iter()
        .map(|item| match item {
            XdmItem::Node(n) => Ok(n),
            XdmItem::Atomic(a) => Err(Error::dynamic(
                ErrorCode::XPTY0004,
                format!("{op:?} operand contains an atomic value of type {}", a.atomic_type()),
            )),
        })
        .collect()
}

pub(super) fn venn<N: XdmNode>(ctx: &XPathContext<N>, op: SetOp, lhs: ExprId, rhs: ExprId) -> Result<BoxedCursor<N>, Error> {
    let left = node_operand(materialize(ctx, lhs)?, op)?;
    let right = node_operand(materialize(ctx, rhs)?, op)?;
    let combined = match op {
        SetOp::Union => left.into_iter().chain(right).collect(),
        SetOp::Intersect => left.into_iter().filter(|n| right.contains(n)).collect(),
        SetOp::Except => left.into_iter().filter(|n| !right.contains(n)).collect(),
    };
    let nodes = sort_nodes(combined)?;
    Ok(GroundedCursor::from_vec(nodes.into_iter().map(XdmItem::Node).collect()))
}
