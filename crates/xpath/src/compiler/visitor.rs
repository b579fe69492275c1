//! Drives the three compile phases over the arena.
//!
//! Every phase works bottom-up: the children of a node are processed first and put
//! back into their slots, then the node itself runs its rule for the phase. A rule
//! returns the node that takes its place, which may be a new node, one of its former
//! children, or the node itself.

use std::sync::Arc;

use crate::compiler::OptimizerTrace;
use crate::compiler::arena::ExprArena;
use crate::compiler::early::{self, Speculation};
use crate::compiler::expr::{ExprId, ExprKind, VarId};
use crate::consts::INTERNAL_NS;
use crate::engine::runtime::{Error, StaticContext};
use crate::types::ContextItemType;
use crate::xdm::{ExpandedName, GroundedValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Simplify,
    TypeCheck,
    Optimize,
}

pub(crate) struct ExpressionVisitor<'a> {
    pub(crate) arena: &'a mut ExprArena,
    pub(crate) env: &'a StaticContext,
    pub(crate) trace: Vec<OptimizerTrace>,
    temporaries: u32,
}

impl<'a> ExpressionVisitor<'a> {
    pub(crate) fn new(arena: &'a mut ExprArena, env: &'a StaticContext) -> Self {
        Self { arena, env, trace: Vec::new(), temporaries: 0 }
    }

    pub(crate) fn simplify(&mut self, id: ExprId) -> Result<ExprId, Error> {
        self.visit(Phase::Simplify, id, ContextItemType::Unknown)
    }

    pub(crate) fn type_check(&mut self, id: ExprId, context: ContextItemType) -> Result<ExprId, Error> {
        self.visit(Phase::TypeCheck, id, context)
    }

    pub(crate) fn optimize(&mut self, id: ExprId, context: ContextItemType) -> Result<ExprId, Error> {
        self.visit(Phase::Optimize, id, context)
    }

    fn visit(&mut self, phase: Phase, id: ExprId, context: ContextItemType) -> Result<ExprId, Error> {
        self.visit_children(phase, id, context)?;
        let location = self.arena.location(id).cloned();
        let out = match phase {
            Phase::Simplify => self.simplify_node(id),
            Phase::TypeCheck => self.type_check_node(id, context),
            Phase::Optimize => self.optimize_node(id, context),
        };
        out.map_err(|e| e.at(location.as_ref()))
    }

    fn visit_children(&mut self, phase: Phase, id: ExprId, context: ContextItemType) -> Result<(), Error> {
        let focus_child = self.arena.kind(id).focus_controlled_child();
        let binding = self.arena.kind(id).bound_var();
        for child in self.arena.children(id) {
            let child_context = if Some(child) == focus_child { self.inner_focus(id) } else { context };
            let new = self.visit(phase, child, child_context)?;
            if new != child {
                self.arena.replace_sub_expression(id, child, new);
            }
            // references cache the type of the binding sequence, which may have changed
            if let Some(var) = binding {
                if self.binding_sequence(id) == Some(new) {
                    self.arena.invalidate_references(var, id);
                }
            }
        }
        Ok(())
    }

    fn binding_sequence(&self, id: ExprId) -> Option<ExprId> {
        match self.arena.kind(id) {
            ExprKind::For { sequence, .. } | ExprKind::Let { sequence, .. } | ExprKind::Quantified { sequence, .. } => {
                Some(*sequence)
            }
            _ => None,
        }
    }

    /// Context item type seen by the focus-controlled child of `id`.
    pub(crate) fn inner_focus(&self, id: ExprId) -> ContextItemType {
        match self.arena.kind(id) {
            ExprKind::Filter { base, .. } => ContextItemType::Known(self.arena.item_type(*base)),
            ExprKind::Slash { start, .. } => ContextItemType::Known(self.arena.item_type(*start)),
            _ => ContextItemType::Unknown,
        }
    }

    /// Reports a rewrite decision.
    pub(crate) fn record(&mut self, rewrite: &'static str, node: ExprId) {
        let kind = self.arena.kind(node).name();
        tracing::debug!(target: "xpath_core::optimizer", rewrite, node = %node, kind, "rewrite");
        if self.env.optimizer.trace_optimizer_decisions {
            self.trace.push(OptimizerTrace { rewrite, node, kind });
        }
    }

    /// Declares a compiler-generated variable.
    pub(crate) fn temporary(&mut self, prefix: &str) -> VarId {
        self.temporaries += 1;
        self.arena.declare_var(ExpandedName::new(Some(INTERNAL_NS), format!("{prefix}{}", self.temporaries)))
    }

    /// Wraps `child`, a child of `parent`, in the node built by `make` and folds the
    /// wrapper when its operand is constant.
    pub(crate) fn wrap(&mut self, parent: ExprId, child: ExprId, make: impl FnOnce(ExprId) -> ExprKind) -> ExprId {
        let wrapper = self.arena.add_like(make(child), child);
        self.arena.replace_sub_expression(parent, child, wrapper);
        let folded = self.fold(wrapper);
        if folded != wrapper {
            self.arena.replace_sub_expression(parent, wrapper, folded);
        }
        folded
    }

    /// A new literal that takes the place and location of `like`.
    pub(crate) fn literal_like(&mut self, value: GroundedValue, like: ExprId) -> ExprId {
        self.arena.add_like(ExprKind::Literal(value), like)
    }

    /// Replaces `id` by a literal when it can be evaluated now.
    ///
    /// Errors raised by the evaluation are kept for run time: the expression might never
    /// be evaluated.
    pub(crate) fn fold(&mut self, id: ExprId) -> ExprId {
        if !self.env.optimizer.early_evaluation || !early::foldable(self.arena, id) {
            return id;
        }
        match early::speculate(self.arena, id, self.env) {
            Speculation::Value(v) => {
                let lit = self.literal_like(v, id);
                self.record("early-evaluation", lit);
                lit
            }
            Speculation::Failed(_) | Speculation::Undecidable => id,
        }
    }

    pub(crate) fn role(text: String) -> crate::compiler::expr::Role {
        Arc::from(text)
    }
}
