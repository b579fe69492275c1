//! Expression trees and the compiler that turns them into an executable form.
//!
//! A tree is built in an [`ExprArena`] (see the builder methods in `builder.rs`) and
//! compiled with [`compile`], which runs three phases bottom-up over the tree:
//!
//! * `simplify` normalizes the tree without type information;
//! * `type_check` computes static types, inserts atomization, untyped conversion and
//!   runtime checks, reports static errors, and folds constant subtrees;
//! * `optimize` applies rewrites that need the checked types (positional filters,
//!   comparison strategies, loop lifting, let elimination).
//!
//! The result is a [`CompiledXPath`] holding the frozen arena.

pub mod arena;
mod arithmetic;
mod bindings;
mod builder;
mod coercion;
mod comparison;
mod copy;
pub(crate) mod early;
pub mod explain;
pub mod expr;
mod filter;
pub mod functions;
pub mod hooks;
mod optimize;
pub(crate) mod promotion;
pub mod properties;
mod simplify;
pub(crate) mod static_type;
mod type_check;
pub(crate) mod visitor;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

pub use arena::ExprArena;
pub use explain::{ExplainNode, explain};
pub use expr::{ExprId, ExprKind, VarId};
pub use hooks::{CompilerHooks, ExpressionCompilerHook, StreamingAdjunctHook};

pub use crate::engine::calculator::ArithOp;
pub use crate::engine::comparer::CompareOp;

use crate::engine::context::{Controller, Receiver, XPathContext};
use crate::engine::evaluator;
use crate::engine::runtime::{DynamicContext, Error, ErrorCode, StaticContext};
use crate::model::XdmNode;
use crate::types::ContextItemType;
use crate::xdm::{XdmItem, XdmSequence, XdmSequenceStream};
use visitor::ExpressionVisitor;

/// One rewrite applied by the compiler, recorded when
/// [`OptimizerOptions::trace_optimizer_decisions`](crate::engine::runtime::OptimizerOptions::trace_optimizer_decisions)
/// is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerTrace {
    /// Name of the rewrite, e.g. `"positional-filter"`.
    pub rewrite: &'static str,
    /// The node produced by the rewrite.
    pub node: ExprId,
    /// Kind of that node, as in [`explain`].
    pub kind: &'static str,
}

/// Compiles the tree rooted at `root`.
///
/// # Errors
///
/// Returns the first static error found while type checking, e.g. `XPTY0004` for an
/// operand that can never have the required type, `XPDY0002` for a focus-dependent
/// expression without a context item, or `XPST0008` for an undeclared variable.
pub fn compile(mut arena: ExprArena, root: ExprId, static_ctx: &StaticContext) -> Result<CompiledXPath, Error> {
    let context = static_ctx.context_item_type;
    let mut visitor = ExpressionVisitor::new(&mut arena, static_ctx);
    let root = visitor.simplify(root)?;
    let root = visitor.type_check(root, context)?;
    let root = visitor.optimize(root, context)?;
    let trace = std::mem::take(&mut visitor.trace);
    arena.detach(root);
    tracing::debug!(target: "xpath_core::compiler", nodes = arena.len(), rewrites = trace.len(), "compiled");
    let slot_count = arena.slot_count();
    Ok(CompiledXPath { arena: Arc::new(arena), root, static_ctx: static_ctx.clone(), slot_count, trace })
}

/// A compiled expression, ready to be evaluated any number of times.
#[derive(Debug, Clone)]
pub struct CompiledXPath {
    arena: Arc<ExprArena>,
    root: ExprId,
    static_ctx: StaticContext,
    slot_count: usize,
    trace: Vec<OptimizerTrace>,
}

impl CompiledXPath {
    pub fn root(&self) -> ExprId {
        self.root
    }

    pub fn arena(&self) -> &ExprArena {
        &self.arena
    }

    pub fn static_context(&self) -> &StaticContext {
        &self.static_ctx
    }

    /// Number of local variable slots an evaluation allocates.
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn optimizer_trace(&self) -> &[OptimizerTrace] {
        &self.trace
    }

    pub fn explain(&self) -> ExplainNode {
        explain(&self.arena, self.root)
    }

    /// The registered expression compiler, if it handles the kind of node `id`.
    pub fn expression_compiler(&self, id: ExprId) -> Option<Arc<dyn ExpressionCompilerHook>> {
        let hook = self.static_ctx.hooks.expression_compiler.as_ref()?;
        hook.handles(self.arena.kind(id)).then(|| Arc::clone(hook))
    }

    /// The registered streaming adjunct, if it handles the kind of node `id`.
    pub fn streaming_adjunct(&self, id: ExprId) -> Option<Arc<dyn StreamingAdjunctHook>> {
        let hook = self.static_ctx.hooks.streaming_adjunct.as_ref()?;
        hook.handles(self.arena.kind(id)).then(|| Arc::clone(hook))
    }

    fn context<N: XdmNode>(&self, dynamic: &DynamicContext<N>) -> Result<XPathContext<N>, Error> {
        if let (ContextItemType::Known(expected), Some(item)) = (self.static_ctx.context_item_type, &dynamic.context_item) {
            if !evaluator::matches_item_type(item, &expected) {
                return Err(Error::dynamic(
                    ErrorCode::XPTY0004,
                    format!("the context item does not match the declared context item type {expected}"),
                ));
            }
        }
        let controller = Controller::new(Arc::clone(&self.arena), &self.static_ctx, dynamic)?;
        Ok(XPathContext::initial(controller, dynamic.context_item.clone()))
    }

    /// Evaluates the expression to a materialized sequence.
    ///
    /// # Errors
    ///
    /// Returns the first dynamic error raised by the evaluation.
    pub fn evaluate<N: XdmNode>(&self, dynamic: &DynamicContext<N>) -> Result<XdmSequence<N>, Error> {
        let ctx = self.context(dynamic)?;
        evaluator::materialize(&ctx, self.root)
    }

    /// Evaluates the expression lazily; items are computed as the stream is read.
    ///
    /// # Errors
    ///
    /// Returns an error if the evaluation cannot start; later errors are yielded by
    /// the stream.
    pub fn evaluate_stream<N: XdmNode>(&self, dynamic: &DynamicContext<N>) -> Result<XdmSequenceStream<N>, Error> {
        let ctx = self.context(dynamic)?;
        Ok(XdmSequenceStream::new(evaluator::iterate(&ctx, self.root)?))
    }

    /// The first item of the result, without evaluating the rest.
    ///
    /// # Errors
    ///
    /// Returns the first dynamic error raised while computing that item.
    pub fn evaluate_first<N: XdmNode>(&self, dynamic: &DynamicContext<N>) -> Result<Option<XdmItem<N>>, Error> {
        let ctx = self.context(dynamic)?;
        let mut cursor = evaluator::iterate(&ctx, self.root)?;
        let first = cursor.next_item().transpose();
        cursor.close();
        first
    }

    /// # Errors
    ///
    /// `FORG0006` when the result has no effective boolean value, or any dynamic error
    /// raised by the evaluation.
    pub fn effective_boolean_value<N: XdmNode>(&self, dynamic: &DynamicContext<N>) -> Result<bool, Error> {
        let ctx = self.context(dynamic)?;
        evaluator::effective_boolean_value(&ctx, self.root)
    }

    /// Pushes each result item to `receiver`, then calls [`Receiver::end`].
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the evaluation or the receiver; the error is
    /// also recorded as the context's current exception.
    pub fn process<N: XdmNode>(
        &self,
        dynamic: &DynamicContext<N>,
        receiver: Rc<RefCell<dyn Receiver<N>>>,
    ) -> Result<(), Error> {
        let mut ctx = self.context(dynamic)?;
        ctx.set_receiver(Rc::clone(&receiver));
        let result = push_all(&ctx, self.root, &receiver);
        if let Err(e) = &result {
            tracing::debug!(target: "xpath_core::evaluator", code = e.code_str(), "evaluation failed");
            ctx.set_current_exception(e);
        }
        result
    }
}

fn push_all<N: XdmNode>(ctx: &XPathContext<N>, root: ExprId, receiver: &RefCell<dyn Receiver<N>>) -> Result<(), Error> {
    let mut cursor = evaluator::iterate(ctx, root)?;
    while let Some(item) = cursor.next_item() {
        receiver.borrow_mut().append(item?)?;
    }
    receiver.borrow_mut().end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::SimpleNode;
    use crate::xdm::XdmAtomicValue;

    #[test]
    fn compiled_expression_is_reusable() {
        let mut arena = ExprArena::new();
        let range = arena.range_of(1, 3);
        let compiled = compile(arena, range, &StaticContext::default()).unwrap();
        let dynamic = DynamicContext::<SimpleNode>::default();
        assert_eq!(compiled.evaluate(&dynamic).unwrap().len(), 3);
        let first = compiled.evaluate_first(&dynamic).unwrap();
        assert!(matches!(first, Some(XdmItem::Atomic(XdmAtomicValue::Integer(1)))));
    }

    #[test]
    fn trace_is_empty_unless_requested() {
        let mut arena = ExprArena::new();
        let a = arena.integer(2);
        let b = arena.integer(3);
        let sum = arena.arithmetic(ArithOp::Plus, a, b);
        let compiled = compile(arena, sum, &StaticContext::default()).unwrap();
        assert!(compiled.optimizer_trace().is_empty());
    }
}
