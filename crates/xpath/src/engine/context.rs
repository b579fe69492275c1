//! The dynamic evaluation context.
//!
//! An [`XPathContext`] is cheap to clone. A *minor* context ([`XPathContext::new_minor_context`])
//! shares the stack frame of its caller and may install a different focus or receiver;
//! a *major* context ([`XPathContext::new_context`]) gets a fresh stack frame. Frames are
//! never popped explicitly: a context is dropped when the evaluation scope holding it
//! ends, and the caller simply keeps using its own context.

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use chrono::FixedOffset;

use crate::compiler::arena::ExprArena;
use crate::compiler::expr::{ExprId, VarId};
use crate::engine::collation::CollationRef;
use crate::engine::comparer::CompareEnv;
use crate::engine::cursors::{self, BoxedCursor, GroundedCursor};
use crate::engine::evaluator;
use crate::engine::runtime::{DynamicContext, Error, ErrorCode, ErrorContext, StaticContext};
use crate::model::XdmNode;
use crate::xdm::{ExpandedName, XdmItem, XdmSequence};

/// Push-based consumer of evaluation results.
pub trait Receiver<N> {
    fn append(&mut self, item: XdmItem<N>) -> Result<(), Error>;

    /// Called once after the last item.
    fn end(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl<N> Receiver<N> for Vec<XdmItem<N>> {
    fn append(&mut self, item: XdmItem<N>) -> Result<(), Error> {
        self.push(item);
        Ok(())
    }
}

/// Per-evaluation state shared by every context of one evaluation.
pub(crate) struct Controller<N> {
    pub(crate) arena: Arc<ExprArena>,
    globals: HashMap<ExpandedName, Rc<XdmSequence<N>>>,
    default_collation: CollationRef,
    // absent while evaluating at compile time
    implicit_timezone: Option<FixedOffset>,
}

impl<N: XdmNode> Controller<N> {
    pub(crate) fn new(
        arena: Arc<ExprArena>,
        static_ctx: &StaticContext,
        dynamic: &DynamicContext<N>,
    ) -> Result<Self, Error> {
        let collations = dynamic.collations.clone().unwrap_or_else(|| Arc::clone(&static_ctx.collations));
        let uri = dynamic.default_collation.as_deref().or(static_ctx.default_collation.as_deref());
        let default_collation = collations.resolve(uri)?;
        let globals = dynamic
            .variables
            .iter()
            .map(|(name, value)| (name.clone(), Rc::new(value.clone())))
            .collect();
        Ok(Self { arena, globals, default_collation, implicit_timezone: Some(dynamic.implicit_timezone()) })
    }

    /// Controller for evaluating constant subexpressions while compiling.
    pub(crate) fn speculative(arena: Arc<ExprArena>, static_ctx: &StaticContext) -> Result<Self, Error> {
        let default_collation = static_ctx.collations.resolve(static_ctx.default_collation.as_deref())?;
        Ok(Self { arena, globals: HashMap::new(), default_collation, implicit_timezone: None })
    }
}

/// One bound local variable.
pub(crate) enum SlotValue<N> {
    Unbound,
    Value(Rc<XdmSequence<N>>),
    Lazy(Rc<LazyValue<N>>),
}

impl<N> Clone for SlotValue<N> {
    fn clone(&self) -> Self {
        match self {
            SlotValue::Unbound => SlotValue::Unbound,
            SlotValue::Value(v) => SlotValue::Value(Rc::clone(v)),
            SlotValue::Lazy(l) => SlotValue::Lazy(Rc::clone(l)),
        }
    }
}

impl<N> SlotValue<N> {
    pub(crate) fn single(item: XdmItem<N>) -> Self {
        SlotValue::Value(Rc::new(vec![item]))
    }
}

/// A let value evaluated on first use, in the context captured at binding time.
pub(crate) struct LazyValue<N> {
    expr: ExprId,
    ctx: XPathContext<N>,
    value: OnceCell<Result<Rc<XdmSequence<N>>, Error>>,
}

impl<N: XdmNode> LazyValue<N> {
    /// The captured context must own a frame that does not hold this value.
    pub(crate) fn new(expr: ExprId, ctx: XPathContext<N>) -> Self {
        Self { expr, ctx, value: OnceCell::new() }
    }

    fn get(&self) -> Result<Rc<XdmSequence<N>>, Error> {
        self.value.get_or_init(|| evaluator::materialize(&self.ctx, self.expr).map(Rc::new)).clone()
    }
}

pub(crate) struct StackFrame<N> {
    slots: Vec<SlotValue<N>>,
}

impl<N> StackFrame<N> {
    fn new(size: usize) -> Self {
        Self { slots: vec![SlotValue::Unbound; size] }
    }
}

/// The focus: a cursor whose current item is the context item.
struct FocusFrame<N> {
    cursor: RefCell<BoxedCursor<N>>,
    last: Cell<Option<usize>>,
}

pub struct XPathContext<N> {
    controller: Rc<Controller<N>>,
    frame: Rc<RefCell<StackFrame<N>>>,
    focus: Option<Rc<FocusFrame<N>>>,
    receiver: Option<Rc<RefCell<dyn Receiver<N>>>>,
    current_error: Rc<RefCell<Option<Error>>>,
}

impl<N: XdmNode> Clone for XPathContext<N> {
    fn clone(&self) -> Self {
        Self {
            controller: Rc::clone(&self.controller),
            frame: Rc::clone(&self.frame),
            focus: self.focus.clone(),
            receiver: self.receiver.clone(),
            current_error: Rc::clone(&self.current_error),
        }
    }
}

impl<N: XdmNode> XPathContext<N> {
    /// Initial context of an evaluation; the context item, if any, becomes the focus.
    pub(crate) fn initial(controller: Controller<N>, context_item: Option<XdmItem<N>>) -> Self {
        let slots = controller.arena.slot_count();
        let mut ctx = Self {
            controller: Rc::new(controller),
            frame: Rc::new(RefCell::new(StackFrame::new(slots))),
            focus: None,
            receiver: None,
            current_error: Rc::new(RefCell::new(None)),
        };
        if let Some(item) = context_item {
            let mut cursor = GroundedCursor::single(item);
            cursor.next_item();
            ctx.set_current_iterator(cursor);
        }
        ctx
    }

    pub(crate) fn arena(&self) -> &ExprArena {
        &self.controller.arena
    }

    /// A context with a fresh stack frame; focus and receiver are inherited.
    pub fn new_context(&self) -> Self {
        let slots = self.arena().slot_count();
        Self { frame: Rc::new(RefCell::new(StackFrame::new(slots))), ..self.clone() }
    }

    /// A context sharing this context's stack frame.
    pub fn new_minor_context(&self) -> Self {
        self.clone()
    }

    /// A context with a private copy of the current stack frame.
    pub fn fork(&self) -> Self {
        let slots = self.frame.borrow().slots.clone();
        Self { frame: Rc::new(RefCell::new(StackFrame { slots })), ..self.clone() }
    }

    /// Installs a new focus. The cursor should already be positioned on the context item
    /// when the context is used outside a focus-driving cursor.
    pub fn set_current_iterator(&mut self, cursor: BoxedCursor<N>) {
        self.focus = Some(Rc::new(FocusFrame { cursor: RefCell::new(cursor), last: Cell::new(None) }));
    }

    /// Minor context whose focus is `cursor`, positioned before its first item.
    pub(crate) fn with_focus(&self, cursor: BoxedCursor<N>) -> Self {
        let mut ctx = self.new_minor_context();
        ctx.set_current_iterator(cursor);
        ctx
    }

    /// The same context with its focus restarted from the beginning.
    pub(crate) fn refocused(&self) -> Self {
        let cursor = match &self.focus {
            Some(f) => f.cursor.borrow().another(),
            None => cursors::empty(),
        };
        self.with_focus(cursor)
    }

    pub(crate) fn advance_focus(&self) -> Option<Result<XdmItem<N>, Error>> {
        self.focus.as_ref()?.cursor.borrow_mut().next_item()
    }

    pub(crate) fn close_focus(&self) {
        if let Some(f) = &self.focus {
            f.cursor.borrow_mut().close();
        }
    }

    fn no_focus(what: &str) -> Error {
        Error::dynamic(ErrorCode::XPDY0002, format!("{what} is undefined: there is no context item"))
    }

    pub fn context_item(&self) -> Result<XdmItem<N>, Error> {
        self.focus
            .as_ref()
            .and_then(|f| f.cursor.borrow().current().cloned())
            .ok_or_else(|| Self::no_focus("the context item"))
    }

    pub fn context_position(&self) -> Result<usize, Error> {
        match &self.focus {
            Some(f) => Ok(f.cursor.borrow().position()),
            None => Err(Self::no_focus("the context position")),
        }
    }

    /// Context size, computed once per installed focus.
    pub fn last(&self) -> Result<usize, Error> {
        let Some(f) = &self.focus else {
            return Err(Self::no_focus("the context size"));
        };
        if let Some(n) = f.last.get() {
            return Ok(n);
        }
        let n = {
            let cursor = f.cursor.borrow();
            match cursor.length() {
                Some(n) => n,
                None => cursors::count(cursor.another())?,
            }
        };
        f.last.set(Some(n));
        Ok(n)
    }

    pub fn is_at_last(&self) -> Result<bool, Error> {
        Ok(self.context_position()? == self.last()?)
    }

    /// Focus snapshot attached to dynamic errors.
    pub(crate) fn error_context(&self) -> Option<ErrorContext> {
        let f = self.focus.as_ref()?;
        let cursor = f.cursor.borrow();
        let item = cursor.current()?;
        Some(ErrorContext { position: Some(cursor.position()), item: Some(item.to_string()) })
    }

    /// Value of a local variable.
    ///
    /// # Panics
    ///
    /// When the slot does not exist or was never bound; both mean the expression tree
    /// and the frame disagree.
    pub fn local_variable(&self, var: VarId) -> Result<Rc<XdmSequence<N>>, Error> {
        let slot = {
            let frame = self.frame.borrow();
            match frame.slots.get(var.slot()) {
                Some(s) => s.clone(),
                None => panic!("local variable slot {} out of range ({} slots)", var.slot(), frame.slots.len()),
            }
        };
        match slot {
            SlotValue::Value(v) => Ok(v),
            SlotValue::Lazy(l) => l.get(),
            SlotValue::Unbound => panic!("local variable slot {} read before it was bound", var.slot()),
        }
    }

    pub fn set_local_variable(&self, var: VarId, value: XdmSequence<N>) {
        self.bind(var, SlotValue::Value(Rc::new(value)));
    }

    pub(crate) fn bind(&self, var: VarId, value: SlotValue<N>) {
        let mut frame = self.frame.borrow_mut();
        let len = frame.slots.len();
        match frame.slots.get_mut(var.slot()) {
            Some(slot) => *slot = value,
            None => panic!("local variable slot {} out of range ({len} slots)", var.slot()),
        }
    }

    pub(crate) fn global_variable(&self, name: &ExpandedName) -> Result<Rc<XdmSequence<N>>, Error> {
        self.controller.globals.get(name).cloned().ok_or_else(|| {
            Error::dynamic(ErrorCode::XPDY0002, format!("no value supplied for external variable ${name}"))
        })
    }

    pub fn set_receiver(&mut self, receiver: Rc<RefCell<dyn Receiver<N>>>) {
        self.receiver = Some(receiver);
    }

    pub fn receiver(&self) -> Option<Rc<RefCell<dyn Receiver<N>>>> {
        self.receiver.clone()
    }

    /// The last error recorded by this evaluation.
    pub fn current_exception(&self) -> Option<Error> {
        self.current_error.borrow().clone()
    }

    pub(crate) fn set_current_exception(&self, error: &Error) {
        *self.current_error.borrow_mut() = Some(error.clone());
    }

    /// Implicit timezone; `None` while evaluating at compile time.
    pub(crate) fn implicit_timezone(&self) -> Option<FixedOffset> {
        self.controller.implicit_timezone
    }

    pub(crate) fn compare_env(&self) -> CompareEnv<'_> {
        CompareEnv { collation: &self.controller.default_collation, implicit_timezone: self.controller.implicit_timezone }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cursors::SequenceCursor;
    use crate::model::simple::SimpleNode;
    use crate::xdm::{ExpandedName, XdmAtomicValue};

    fn ctx_with_slots(n: usize) -> XPathContext<SimpleNode> {
        let mut arena = ExprArena::new();
        for i in 0..n {
            arena.declare_var(ExpandedName::local(format!("v{i}")));
        }
        let sc = StaticContext::default();
        let controller = Controller::new(Arc::new(arena), &sc, &DynamicContext::default()).unwrap();
        XPathContext::initial(controller, None)
    }

    fn int(v: i64) -> XdmItem<SimpleNode> {
        XdmItem::Atomic(XdmAtomicValue::Integer(v))
    }

    #[test]
    fn missing_focus_is_xpdy0002() {
        let ctx = ctx_with_slots(0);
        assert_eq!(ctx.context_item().unwrap_err().code, ErrorCode::XPDY0002);
        assert_eq!(ctx.last().unwrap_err().code, ErrorCode::XPDY0002);
        assert_eq!(ctx.is_at_last().unwrap_err().code, ErrorCode::XPDY0002);
    }

    #[test]
    fn minor_shares_frame_and_fork_copies() {
        let ctx = ctx_with_slots(1);
        let v = VarId(0);
        ctx.set_local_variable(v, vec![int(1)]);
        let minor = ctx.new_minor_context();
        let forked = ctx.fork();
        minor.set_local_variable(v, vec![int(2)]);
        assert_eq!(*ctx.local_variable(v).unwrap(), vec![int(2)]);
        assert_eq!(*forked.local_variable(v).unwrap(), vec![int(1)]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn bad_slot_panics() {
        let ctx = ctx_with_slots(1);
        let _ = ctx.local_variable(VarId(3));
    }

    #[test]
    fn last_is_recomputed_for_a_new_focus() {
        let mut ctx = ctx_with_slots(0);
        let mut c = GroundedCursor::from_vec(vec![int(1), int(2), int(3)]);
        c.next_item();
        ctx.set_current_iterator(c);
        assert_eq!(ctx.last().unwrap(), 3);
        assert!(!ctx.is_at_last().unwrap());
        let mut c = GroundedCursor::from_vec(vec![int(9)]);
        c.next_item();
        ctx.set_current_iterator(c);
        assert_eq!(ctx.last().unwrap(), 1);
        assert!(ctx.is_at_last().unwrap());
        assert_eq!(ctx.context_item().unwrap(), int(9));
    }
}
