//! Pull-based sequence cursors.
//!
//! Every expression evaluates to a [`SequenceCursor`]. Composite cursors pull from
//! their sources on demand, propagate [`close`](SequenceCursor::close) to them and never
//! read past the last item they need. [`another`](SequenceCursor::another) yields an
//! independent cursor over the same logical sequence, positioned before the first item.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::compiler::expr::{Axis, ExprId, FilterFlags, Role, VarId};
use crate::engine::context::{SlotValue, XPathContext};
use crate::engine::evaluator;
use crate::engine::runtime::{Error, ErrorCode, Location};
use crate::model::{NodeKind, XdmNode};
use crate::types::{Cardinality, NodeTest};
use crate::xdm::{GroundedValue, XdmItem, XdmSequence};

pub type ItemResult<N> = Option<Result<XdmItem<N>, Error>>;

pub trait SequenceCursor<N> {
    /// Next item, or `None` at the end of the sequence.
    fn next_item(&mut self) -> ItemResult<N>;

    /// The item most recently returned by `next_item`.
    fn current(&self) -> Option<&XdmItem<N>>;

    /// 1-based position of [`current`](Self::current); 0 before the first item.
    fn position(&self) -> usize;

    /// Releases sources early. Reading after `close` yields `None`.
    fn close(&mut self) {}

    fn another(&self) -> Box<dyn SequenceCursor<N>>;

    /// Number of items, when known without reading them.
    fn length(&self) -> Option<usize> {
        None
    }
}

pub type BoxedCursor<N> = Box<dyn SequenceCursor<N>>;

/// Current item and position bookkeeping shared by the composite cursors.
#[derive(Debug)]
pub(crate) struct Tracker<N> {
    current: Option<XdmItem<N>>,
    position: usize,
}

impl<N: Clone> Tracker<N> {
    pub(crate) fn new() -> Self {
        Self { current: None, position: 0 }
    }

    pub(crate) fn record(&mut self, next: ItemResult<N>) -> ItemResult<N> {
        match &next {
            Some(Ok(item)) => {
                self.position += 1;
                self.current = Some(item.clone());
            }
            _ => self.current = None,
        }
        next
    }

    pub(crate) fn current(&self) -> Option<&XdmItem<N>> {
        self.current.as_ref()
    }

    pub(crate) fn position(&self) -> usize {
        self.position
    }
}

pub(crate) struct EmptyCursor;

impl<N: XdmNode> SequenceCursor<N> for EmptyCursor {
    fn next_item(&mut self) -> ItemResult<N> {
        None
    }

    fn current(&self) -> Option<&XdmItem<N>> {
        None
    }

    fn position(&self) -> usize {
        0
    }

    fn another(&self) -> BoxedCursor<N> {
        Box::new(EmptyCursor)
    }

    fn length(&self) -> Option<usize> {
        Some(0)
    }
}

pub(crate) fn empty<N: XdmNode>() -> BoxedCursor<N> {
    Box::new(EmptyCursor)
}

#[derive(Clone)]
enum Grounded<N> {
    Items(Rc<XdmSequence<N>>),
    Literal(GroundedValue),
}

impl<N: Clone> Grounded<N> {
    fn len(&self) -> usize {
        match self {
            Grounded::Items(v) => v.len(),
            Grounded::Literal(v) => v.len(),
        }
    }

    fn item_at(&self, index: usize) -> Option<XdmItem<N>> {
        match self {
            Grounded::Items(v) => v.get(index).cloned(),
            Grounded::Literal(v) => v.item_at(index).map(XdmItem::Atomic),
        }
    }
}

/// Cursor over a materialized sequence or a literal value.
pub(crate) struct GroundedCursor<N> {
    source: Grounded<N>,
    next: usize,
    current: Option<XdmItem<N>>,
}

impl<N: XdmNode> GroundedCursor<N> {
    pub(crate) fn items(items: Rc<XdmSequence<N>>) -> BoxedCursor<N> {
        Box::new(Self { source: Grounded::Items(items), next: 0, current: None })
    }

    pub(crate) fn literal(value: GroundedValue) -> BoxedCursor<N> {
        Box::new(Self { source: Grounded::Literal(value), next: 0, current: None })
    }

    pub(crate) fn single(item: XdmItem<N>) -> BoxedCursor<N> {
        Self::items(Rc::new(vec![item]))
    }

    pub(crate) fn from_vec(items: XdmSequence<N>) -> BoxedCursor<N> {
        if items.is_empty() { empty() } else { Self::items(Rc::new(items)) }
    }
}

impl<N: XdmNode> SequenceCursor<N> for GroundedCursor<N> {
    fn next_item(&mut self) -> ItemResult<N> {
        self.current = self.source.item_at(self.next);
        let item = self.current.clone()?;
        self.next += 1;
        Some(Ok(item))
    }

    fn current(&self) -> Option<&XdmItem<N>> {
        self.current.as_ref()
    }

    fn position(&self) -> usize {
        self.next
    }

    fn close(&mut self) {
        self.next = self.source.len();
        self.current = None;
    }

    fn another(&self) -> BoxedCursor<N> {
        Box::new(Self { source: self.source.clone(), next: 0, current: None })
    }

    fn length(&self) -> Option<usize> {
        Some(self.source.len())
    }
}

/// `for $v in base return action`, evaluated on a private copy of the stack frame.
pub(crate) struct MappingCursor<N> {
    ctx: XPathContext<N>,
    var: VarId,
    action: ExprId,
    base: BoxedCursor<N>,
    inner: Option<BoxedCursor<N>>,
    tracker: Tracker<N>,
}

impl<N: XdmNode> MappingCursor<N> {
    pub(crate) fn new(ctx: XPathContext<N>, var: VarId, base: BoxedCursor<N>, action: ExprId) -> Self {
        Self { ctx, var, action, base, inner: None, tracker: Tracker::new() }
    }
}

impl<N: XdmNode> SequenceCursor<N> for MappingCursor<N> {
    fn next_item(&mut self) -> ItemResult<N> {
        loop {
            if let Some(inner) = &mut self.inner {
                if let Some(next) = inner.next_item() {
                    return self.tracker.record(Some(next));
                }
                self.inner = None;
            }
            let item = match self.base.next_item() {
                Some(Ok(item)) => item,
                other => return self.tracker.record(other),
            };
            self.ctx.bind(self.var, SlotValue::single(item));
            match evaluator::iterate(&self.ctx, self.action) {
                Ok(c) => self.inner = Some(c),
                Err(e) => return self.tracker.record(Some(Err(e))),
            }
        }
    }

    fn current(&self) -> Option<&XdmItem<N>> {
        self.tracker.current()
    }

    fn position(&self) -> usize {
        self.tracker.position()
    }

    fn close(&mut self) {
        if let Some(inner) = &mut self.inner {
            inner.close();
        }
        self.inner = None;
        self.base.close();
    }

    fn another(&self) -> BoxedCursor<N> {
        Box::new(MappingCursor::new(self.ctx.fork(), self.var, self.base.another(), self.action))
    }
}

/// `base/step`: evaluates `step` once per item of the focus installed in `ctx`.
pub(crate) struct ContextMappingCursor<N> {
    ctx: XPathContext<N>,
    step: ExprId,
    inner: Option<BoxedCursor<N>>,
    tracker: Tracker<N>,
}

impl<N: XdmNode> ContextMappingCursor<N> {
    pub(crate) fn new(ctx: XPathContext<N>, step: ExprId) -> Self {
        Self { ctx, step, inner: None, tracker: Tracker::new() }
    }
}

impl<N: XdmNode> SequenceCursor<N> for ContextMappingCursor<N> {
    fn next_item(&mut self) -> ItemResult<N> {
        loop {
            if let Some(inner) = &mut self.inner {
                if let Some(next) = inner.next_item() {
                    return self.tracker.record(Some(next));
                }
                self.inner = None;
            }
            match self.ctx.advance_focus() {
                Some(Ok(XdmItem::Node(_))) => {}
                Some(Ok(XdmItem::Atomic(a))) => {
                    return self.tracker.record(Some(Err(Error::dynamic(
                        ErrorCode::XPTY0019,
                        format!("path step applied to atomic value {a}"),
                    ))));
                }
                other => return self.tracker.record(other),
            }
            match evaluator::iterate(&self.ctx, self.step) {
                Ok(c) => self.inner = Some(c),
                Err(e) => return self.tracker.record(Some(Err(e))),
            }
        }
    }

    fn current(&self) -> Option<&XdmItem<N>> {
        self.tracker.current()
    }

    fn position(&self) -> usize {
        self.tracker.position()
    }

    fn close(&mut self) {
        if let Some(inner) = &mut self.inner {
            inner.close();
        }
        self.inner = None;
        self.ctx.close_focus();
    }

    fn another(&self) -> BoxedCursor<N> {
        Box::new(ContextMappingCursor::new(self.ctx.refocused(), self.step))
    }
}

/// `base[predicate]` with the base installed as focus in `ctx`.
pub(crate) struct FilterCursor<N> {
    ctx: XPathContext<N>,
    predicate: ExprId,
    flags: FilterFlags,
    tracker: Tracker<N>,
}

impl<N: XdmNode> FilterCursor<N> {
    pub(crate) fn new(ctx: XPathContext<N>, predicate: ExprId, flags: FilterFlags) -> Self {
        Self { ctx, predicate, flags, tracker: Tracker::new() }
    }
}

impl<N: XdmNode> SequenceCursor<N> for FilterCursor<N> {
    fn next_item(&mut self) -> ItemResult<N> {
        loop {
            let item = match self.ctx.advance_focus() {
                Some(Ok(item)) => item,
                other => return self.tracker.record(other),
            };
            match evaluator::predicate_matches(&self.ctx, self.predicate, self.flags) {
                Ok(true) => return self.tracker.record(Some(Ok(item))),
                Ok(false) => {}
                Err(e) => return self.tracker.record(Some(Err(e))),
            }
        }
    }

    fn current(&self) -> Option<&XdmItem<N>> {
        self.tracker.current()
    }

    fn position(&self) -> usize {
        self.tracker.position()
    }

    fn close(&mut self) {
        self.ctx.close_focus();
    }

    fn another(&self) -> BoxedCursor<N> {
        Box::new(FilterCursor::new(self.ctx.refocused(), self.predicate, self.flags))
    }
}

/// Items at base positions `from..to` (1-based, `to` exclusive).
///
/// Stops pulling from the base once the position before `to` has been delivered.
pub(crate) struct SubsequenceCursor<N> {
    base: BoxedCursor<N>,
    from: usize,
    to: Option<usize>,
    base_position: usize,
    tracker: Tracker<N>,
}

impl<N: XdmNode> SubsequenceCursor<N> {
    pub(crate) fn new(base: BoxedCursor<N>, from: usize, to: Option<usize>) -> Self {
        Self { base, from: from.max(1), to, base_position: 0, tracker: Tracker::new() }
    }
}

impl<N: XdmNode> SequenceCursor<N> for SubsequenceCursor<N> {
    fn next_item(&mut self) -> ItemResult<N> {
        loop {
            if self.to.is_some_and(|to| self.base_position + 1 >= to) {
                self.base.close();
                return self.tracker.record(None);
            }
            match self.base.next_item() {
                Some(Ok(item)) => {
                    self.base_position += 1;
                    if self.base_position >= self.from {
                        return self.tracker.record(Some(Ok(item)));
                    }
                }
                other => return self.tracker.record(other),
            }
        }
    }

    fn current(&self) -> Option<&XdmItem<N>> {
        self.tracker.current()
    }

    fn position(&self) -> usize {
        self.tracker.position()
    }

    fn close(&mut self) {
        self.base.close();
    }

    fn another(&self) -> BoxedCursor<N> {
        Box::new(SubsequenceCursor::new(self.base.another(), self.from, self.to))
    }

    fn length(&self) -> Option<usize> {
        let n = self.base.length()?;
        let end = self.to.map_or(n + 1, |to| to.min(n + 1));
        Some(end.saturating_sub(self.from))
    }
}

/// The base without the item at `index` (1-based).
pub(crate) struct RemoveCursor<N> {
    base: BoxedCursor<N>,
    index: usize,
    base_position: usize,
    tracker: Tracker<N>,
}

impl<N: XdmNode> RemoveCursor<N> {
    pub(crate) fn new(base: BoxedCursor<N>, index: usize) -> Self {
        Self { base, index, base_position: 0, tracker: Tracker::new() }
    }
}

impl<N: XdmNode> SequenceCursor<N> for RemoveCursor<N> {
    fn next_item(&mut self) -> ItemResult<N> {
        loop {
            match self.base.next_item() {
                Some(Ok(item)) => {
                    self.base_position += 1;
                    if self.base_position != self.index {
                        return self.tracker.record(Some(Ok(item)));
                    }
                }
                other => return self.tracker.record(other),
            }
        }
    }

    fn current(&self) -> Option<&XdmItem<N>> {
        self.tracker.current()
    }

    fn position(&self) -> usize {
        self.tracker.position()
    }

    fn close(&mut self) {
        self.base.close();
    }

    fn another(&self) -> BoxedCursor<N> {
        Box::new(RemoveCursor::new(self.base.another(), self.index))
    }

    fn length(&self) -> Option<usize> {
        let n = self.base.length()?;
        Some(if (1..=n).contains(&self.index) { n - 1 } else { n })
    }
}

/// The comma operator: children are evaluated one after the other, on demand.
pub(crate) struct BlockCursor<N> {
    ctx: XPathContext<N>,
    children: Rc<SmallVec<[ExprId; 4]>>,
    next_child: usize,
    inner: Option<BoxedCursor<N>>,
    tracker: Tracker<N>,
}

impl<N: XdmNode> BlockCursor<N> {
    pub(crate) fn new(ctx: XPathContext<N>, children: Rc<SmallVec<[ExprId; 4]>>) -> Self {
        Self { ctx, children, next_child: 0, inner: None, tracker: Tracker::new() }
    }
}

impl<N: XdmNode> SequenceCursor<N> for BlockCursor<N> {
    fn next_item(&mut self) -> ItemResult<N> {
        loop {
            if let Some(inner) = &mut self.inner {
                if let Some(next) = inner.next_item() {
                    return self.tracker.record(Some(next));
                }
                self.inner = None;
            }
            let Some(child) = self.children.get(self.next_child).copied() else {
                return self.tracker.record(None);
            };
            self.next_child += 1;
            match evaluator::iterate(&self.ctx, child) {
                Ok(c) => self.inner = Some(c),
                Err(e) => return self.tracker.record(Some(Err(e))),
            }
        }
    }

    fn current(&self) -> Option<&XdmItem<N>> {
        self.tracker.current()
    }

    fn position(&self) -> usize {
        self.tracker.position()
    }

    fn close(&mut self) {
        if let Some(inner) = &mut self.inner {
            inner.close();
        }
        self.inner = None;
        self.next_child = self.children.len();
    }

    fn another(&self) -> BoxedCursor<N> {
        Box::new(BlockCursor::new(self.ctx.clone(), Rc::clone(&self.children)))
    }
}

/// Lazy traversal state of one axis from one origin node.
enum AxisWalk<N> {
    /// Nodes already known, in axis order.
    List(std::vec::IntoIter<N>),
    /// Depth-first pre-order over the subtrees on the stack.
    Descend(Vec<N>),
    /// Walk up the parent chain.
    Climb(Option<N>),
    /// Depth-first over what follows `anchor` in document order.
    Follow { stack: Vec<N>, anchor: Option<N> },
}

fn is_attribute_like<N: XdmNode>(n: &N) -> bool {
    matches!(n.kind(), NodeKind::Attribute | NodeKind::Namespace)
}

fn siblings_after<N: XdmNode>(n: &N) -> Vec<N> {
    if is_attribute_like(n) {
        return Vec::new();
    }
    let Some(parent) = n.parent() else { return Vec::new() };
    let children = parent.children();
    match children.iter().position(|c| c == n) {
        Some(i) => children[i + 1..].to_vec(),
        None => Vec::new(),
    }
}

fn siblings_before<N: XdmNode>(n: &N) -> Vec<N> {
    if is_attribute_like(n) {
        return Vec::new();
    }
    let Some(parent) = n.parent() else { return Vec::new() };
    let children = parent.children();
    match children.iter().position(|c| c == n) {
        Some(i) => children[..i].iter().rev().cloned().collect(),
        None => Vec::new(),
    }
}

/// Preceding nodes in reverse document order, without ancestors, attributes or namespaces.
fn preceding<N: XdmNode>(origin: &N) -> Vec<N> {
    let mut anchor = origin.clone();
    if is_attribute_like(&anchor) {
        match anchor.parent() {
            Some(p) => anchor = p,
            None => return Vec::new(),
        }
    }
    let mut out = Vec::new();
    let mut cur = Some(anchor);
    while let Some(n) = cur {
        for sib in siblings_before(&n) {
            // reverse document order within a subtree is reverse pre-order
            let mut subtree = Vec::new();
            let mut stack = vec![sib];
            while let Some(x) = stack.pop() {
                stack.extend(x.children().into_iter().rev());
                subtree.push(x);
            }
            out.extend(subtree.into_iter().rev());
        }
        cur = n.parent();
    }
    out
}

impl<N: XdmNode> AxisWalk<N> {
    fn start(origin: &N, axis: Axis) -> Self {
        let list = |v: Vec<N>| AxisWalk::List(v.into_iter());
        match axis {
            Axis::Child => list(origin.children()),
            Axis::Attribute => list(if origin.kind() == NodeKind::Element { origin.attributes() } else { Vec::new() }),
            Axis::Namespace => list(if origin.kind() == NodeKind::Element { origin.namespaces() } else { Vec::new() }),
            Axis::SelfAxis => list(vec![origin.clone()]),
            Axis::Parent => list(origin.parent().into_iter().collect()),
            Axis::Descendant => AxisWalk::Descend(origin.children().into_iter().rev().collect()),
            Axis::DescendantOrSelf => AxisWalk::Descend(vec![origin.clone()]),
            Axis::Ancestor => AxisWalk::Climb(origin.parent()),
            Axis::AncestorOrSelf => AxisWalk::Climb(Some(origin.clone())),
            Axis::FollowingSibling => list(siblings_after(origin)),
            Axis::PrecedingSibling => list(siblings_before(origin)),
            Axis::Following => AxisWalk::Follow { stack: Vec::new(), anchor: Some(origin.clone()) },
            Axis::Preceding => list(preceding(origin)),
        }
    }

    fn next_node(&mut self) -> Option<N> {
        match self {
            AxisWalk::List(it) => it.next(),
            AxisWalk::Descend(stack) => {
                let n = stack.pop()?;
                stack.extend(n.children().into_iter().rev());
                Some(n)
            }
            AxisWalk::Climb(next) => {
                let n = next.take()?;
                *next = n.parent();
                Some(n)
            }
            AxisWalk::Follow { stack, anchor } => loop {
                if let Some(n) = stack.pop() {
                    stack.extend(n.children().into_iter().rev());
                    return Some(n);
                }
                let a = anchor.take()?;
                if is_attribute_like(&a) {
                    let parent = a.parent()?;
                    stack.extend(parent.children().into_iter().rev());
                    *anchor = Some(parent);
                } else {
                    stack.extend(siblings_after(&a).into_iter().rev());
                    *anchor = a.parent();
                }
            },
        }
    }
}

/// Nodes on `axis` from `origin` that pass `test`, in axis order.
pub(crate) struct AxisCursor<N> {
    origin: N,
    axis: Axis,
    test: NodeTest,
    walk: AxisWalk<N>,
    tracker: Tracker<N>,
}

impl<N: XdmNode> AxisCursor<N> {
    pub(crate) fn new(origin: N, axis: Axis, test: NodeTest) -> Self {
        let walk = AxisWalk::start(&origin, axis);
        Self { origin, axis, test, walk, tracker: Tracker::new() }
    }
}

impl<N: XdmNode> SequenceCursor<N> for AxisCursor<N> {
    fn next_item(&mut self) -> ItemResult<N> {
        while let Some(n) = self.walk.next_node() {
            if self.test.matches(&n) {
                return self.tracker.record(Some(Ok(XdmItem::Node(n))));
            }
        }
        self.tracker.record(None)
    }

    fn current(&self) -> Option<&XdmItem<N>> {
        self.tracker.current()
    }

    fn position(&self) -> usize {
        self.tracker.position()
    }

    fn close(&mut self) {
        self.walk = AxisWalk::List(Vec::new().into_iter());
    }

    fn another(&self) -> BoxedCursor<N> {
        Box::new(AxisCursor::new(self.origin.clone(), self.axis, self.test.clone()))
    }
}

pub(crate) type ItemMapper<N> = Rc<dyn Fn(XdmItem<N>) -> Result<Option<XdmItem<N>>, Error>>;

/// Maps each item through a function; `Ok(None)` drops the item.
pub(crate) struct ItemMappingCursor<N> {
    base: BoxedCursor<N>,
    map: ItemMapper<N>,
    tracker: Tracker<N>,
}

impl<N: XdmNode> ItemMappingCursor<N> {
    pub(crate) fn new(base: BoxedCursor<N>, map: ItemMapper<N>) -> Self {
        Self { base, map, tracker: Tracker::new() }
    }
}

impl<N: XdmNode> SequenceCursor<N> for ItemMappingCursor<N> {
    fn next_item(&mut self) -> ItemResult<N> {
        loop {
            let item = match self.base.next_item() {
                Some(Ok(item)) => item,
                other => return self.tracker.record(other),
            };
            match (self.map)(item) {
                Ok(Some(mapped)) => return self.tracker.record(Some(Ok(mapped))),
                Ok(None) => {}
                Err(e) => return self.tracker.record(Some(Err(e))),
            }
        }
    }

    fn current(&self) -> Option<&XdmItem<N>> {
        self.tracker.current()
    }

    fn position(&self) -> usize {
        self.tracker.position()
    }

    fn close(&mut self) {
        self.base.close();
    }

    fn another(&self) -> BoxedCursor<N> {
        Box::new(ItemMappingCursor::new(self.base.another(), Rc::clone(&self.map)))
    }
}

/// Passes items through while checking the number of items against `required`.
pub(crate) struct CardinalityCheckCursor<N> {
    base: BoxedCursor<N>,
    required: Cardinality,
    role: Role,
    tracker: Tracker<N>,
}

impl<N: XdmNode> CardinalityCheckCursor<N> {
    pub(crate) fn new(base: BoxedCursor<N>, required: Cardinality, role: Role) -> Self {
        Self { base, required, role, tracker: Tracker::new() }
    }

    fn violation(&self, what: &str) -> Error {
        Error::dynamic(ErrorCode::XPTY0004, format!("{what} is not allowed as {}", self.role))
    }
}

impl<N: XdmNode> SequenceCursor<N> for CardinalityCheckCursor<N> {
    fn next_item(&mut self) -> ItemResult<N> {
        let next = self.base.next_item();
        let seen = self.tracker.position();
        let err = match &next {
            None if seen == 0 && !self.required.allows_zero() => Some(self.violation("An empty sequence")),
            Some(Ok(_)) if seen == 0 && !self.required.allows_one() && !self.required.allows_many() => {
                Some(self.violation("A non-empty sequence"))
            }
            Some(Ok(_)) if seen == 1 && !self.required.allows_many() => {
                Some(self.violation("A sequence of more than one item"))
            }
            _ => None,
        };
        match err {
            Some(e) => {
                self.base.close();
                self.tracker.record(Some(Err(e)))
            }
            None => self.tracker.record(next),
        }
    }

    fn current(&self) -> Option<&XdmItem<N>> {
        self.tracker.current()
    }

    fn position(&self) -> usize {
        self.tracker.position()
    }

    fn close(&mut self) {
        self.base.close();
    }

    fn another(&self) -> BoxedCursor<N> {
        Box::new(CardinalityCheckCursor::new(self.base.another(), self.required, std::sync::Arc::clone(&self.role)))
    }

    fn length(&self) -> Option<usize> {
        self.base.length()
    }
}

/// Attaches a source location and the focus to errors raised while pulling.
pub(crate) struct LocatingCursor<N> {
    inner: BoxedCursor<N>,
    location: Location,
    ctx: XPathContext<N>,
}

impl<N: XdmNode> LocatingCursor<N> {
    pub(crate) fn new(inner: BoxedCursor<N>, location: Location, ctx: XPathContext<N>) -> Self {
        Self { inner, location, ctx }
    }
}

impl<N: XdmNode> SequenceCursor<N> for LocatingCursor<N> {
    fn next_item(&mut self) -> ItemResult<N> {
        match self.inner.next_item() {
            Some(Err(mut e)) => {
                e.maybe_set_location(Some(&self.location));
                e.maybe_set_context(|| self.ctx.error_context());
                Some(Err(e))
            }
            other => other,
        }
    }

    fn current(&self) -> Option<&XdmItem<N>> {
        self.inner.current()
    }

    fn position(&self) -> usize {
        self.inner.position()
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn another(&self) -> BoxedCursor<N> {
        Box::new(LocatingCursor::new(self.inner.another(), self.location.clone(), self.ctx.clone()))
    }

    fn length(&self) -> Option<usize> {
        self.inner.length()
    }
}

/// Reads a cursor to the end.
pub(crate) fn drain<N>(mut cursor: BoxedCursor<N>) -> Result<XdmSequence<N>, Error> {
    let mut out = Vec::with_capacity(cursor.length().unwrap_or(0));
    while let Some(item) = cursor.next_item() {
        out.push(item?);
    }
    Ok(out)
}

/// Number of items, reading the cursor only when its length is unknown.
pub(crate) fn count<N>(mut cursor: BoxedCursor<N>) -> Result<usize, Error> {
    if let Some(n) = cursor.length() {
        return Ok(n);
    }
    let mut n = 0;
    while let Some(item) = cursor.next_item() {
        item?;
        n += 1;
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::{SimpleNode, attr, doc, elem, text};
    use crate::xdm::XdmAtomicValue;

    fn ints(values: &[i64]) -> BoxedCursor<SimpleNode> {
        GroundedCursor::from_vec(values.iter().map(|v| XdmItem::Atomic(XdmAtomicValue::Integer(*v))).collect())
    }

    fn as_ints(seq: XdmSequence<SimpleNode>) -> Vec<i64> {
        seq.into_iter()
            .map(|i| match i {
                XdmItem::Atomic(XdmAtomicValue::Integer(v)) => v,
                other => panic!("unexpected {other}"),
            })
            .collect()
    }

    /// Counts how many items were pulled from the wrapped cursor.
    struct Counting {
        inner: BoxedCursor<SimpleNode>,
        pulled: Rc<std::cell::Cell<usize>>,
    }

    impl SequenceCursor<SimpleNode> for Counting {
        fn next_item(&mut self) -> ItemResult<SimpleNode> {
            let n = self.inner.next_item();
            if n.is_some() {
                self.pulled.set(self.pulled.get() + 1);
            }
            n
        }
        fn current(&self) -> Option<&XdmItem<SimpleNode>> {
            self.inner.current()
        }
        fn position(&self) -> usize {
            self.inner.position()
        }
        fn another(&self) -> BoxedCursor<SimpleNode> {
            Box::new(Counting { inner: self.inner.another(), pulled: Rc::clone(&self.pulled) })
        }
    }

    #[test]
    fn subsequence_stops_at_upper_bound() {
        let pulled = Rc::new(std::cell::Cell::new(0));
        let base = Box::new(Counting { inner: ints(&[1, 2, 3, 4, 5, 6]), pulled: Rc::clone(&pulled) });
        let sub = Box::new(SubsequenceCursor::new(base, 2, Some(4)));
        assert_eq!(as_ints(drain(sub).unwrap()), vec![2, 3]);
        assert_eq!(pulled.get(), 3);
    }

    #[test]
    fn remove_and_lengths() {
        let r = RemoveCursor::new(ints(&[1, 2, 3]), 2);
        assert_eq!(r.length(), Some(2));
        assert_eq!(as_ints(drain(Box::new(r)).unwrap()), vec![1, 3]);
        let s = SubsequenceCursor::new(ints(&[1, 2, 3]), 3, None);
        assert_eq!(s.length(), Some(1));
    }

    #[test]
    fn another_restarts() {
        let mut c = ints(&[7, 8]);
        c.next_item();
        assert_eq!(c.position(), 1);
        let again = c.another();
        assert_eq!(again.position(), 0);
        assert_eq!(as_ints(drain(again).unwrap()), vec![7, 8]);
    }

    #[test]
    fn cardinality_check_reports_second_item() {
        let c = CardinalityCheckCursor::new(ints(&[1, 2]), Cardinality::ZERO_OR_ONE, std::sync::Arc::from("the operand"));
        let err = drain(Box::new(c)).unwrap_err();
        assert_eq!(err.code, ErrorCode::XPTY0004);
        assert!(err.message.contains("the operand"));
    }

    #[test]
    fn axes_walk_in_axis_order() {
        let d = doc()
            .child(
                elem("a")
                    .attr(attr("id", "1"))
                    .child(elem("b").child(text("x")))
                    .child(elem("c").child(elem("d"))),
            )
            .build();
        let a = d.children()[0].clone();
        let names = |axis: Axis, origin: &SimpleNode| -> Vec<String> {
            drain(Box::new(AxisCursor::new(origin.clone(), axis, NodeTest::any_element())))
                .unwrap()
                .into_iter()
                .filter_map(|i| i.as_node().and_then(|n| n.name()).map(|q| q.local))
                .collect()
        };
        assert_eq!(names(Axis::Descendant, &a), vec!["b", "c", "d"]);
        let dnode = a.children()[1].children()[0].clone();
        assert_eq!(names(Axis::Ancestor, &dnode), vec!["c", "a"]);
        assert_eq!(names(Axis::Preceding, &dnode), vec!["b"]);
        let id = a.attributes()[0].clone();
        assert_eq!(names(Axis::Following, &id), vec!["b", "c", "d"]);
    }
}
