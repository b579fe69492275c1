//! Static type checking: coercions, static errors and constant folding.

use crate::compiler::expr::{Axis, ExprId, ExprKind, NodeCompareOp, SetOp};
use crate::compiler::functions::SystemFunction;
use crate::compiler::properties::StaticProperty;
use crate::compiler::visitor::ExpressionVisitor;
use crate::engine::casting::cast_possible;
use crate::engine::runtime::{Error, ErrorCode};
use crate::model::NodeKind;
use crate::types::{AtomicType, Cardinality, ContextItemType, ItemType, SequenceType, type_hierarchy};
use crate::xdm::{GroundedValue, XdmAtomicValue};

fn absent_focus(what: &str) -> Error {
    Error::static_type(ErrorCode::XPDY0002, format!("{what} requires a context item, but none is defined"))
}

fn atomic_focus(what: &str, t: ItemType) -> Error {
    Error::static_type(ErrorCode::XPTY0020, format!("{what} requires a node as context item, but the context item is {t}"))
}

/// Node kinds that have neither children nor attributes.
fn is_leaf_kind(kind: NodeKind) -> bool {
    !matches!(kind, NodeKind::Document | NodeKind::Element)
}

impl ExpressionVisitor<'_> {
    pub(super) fn type_check_node(&mut self, id: ExprId, context: ContextItemType) -> Result<ExprId, Error> {
        use ExprKind as K;
        match self.arena.kind(id).clone() {
            K::Literal(_) | K::LocalVarRef(_) | K::For { .. } | K::Let { .. } | K::Quantified { .. } => Ok(id),
            K::ContextItem { item_type } => {
                let Some(t) = context.item_type() else {
                    return Err(absent_focus("the context item expression"));
                };
                if t != item_type {
                    if let K::ContextItem { item_type } = self.arena.kind_mut(id) {
                        *item_type = t;
                    }
                }
                Ok(id)
            }
            K::Root => {
                self.check_node_focus("the root expression '/'", context)?;
                Ok(id)
            }
            K::Axis { axis, .. } => {
                self.check_node_focus(&format!("the {} axis step", axis.name()), context)?;
                Ok(self.empty_axis_step(id, axis, context))
            }
            K::IsLast { .. } => match context {
                ContextItemType::Absent => Err(absent_focus("position() and last()")),
                _ => Ok(id),
            },
            K::GlobalVarRef { name, .. } => {
                let Some(declared) = self.env.variable_type(&name).copied() else {
                    return Err(Error::from_code(ErrorCode::XPST0008, format!("variable ${name} is not declared")));
                };
                if let K::GlobalVarRef { declared: d, .. } = self.arena.kind_mut(id) {
                    *d = Some(declared);
                }
                Ok(id)
            }
            K::Arithmetic { .. } => self.type_check_arithmetic(id),
            K::Negate { .. } => self.type_check_negate(id),
            K::Boolean { .. } | K::Block { .. } | K::FirstItem { .. } | K::LastItem { .. } | K::Subscript { .. } => {
                Ok(self.fold(id))
            }
            K::ValueComparison { .. } => self.type_check_value_comparison(id),
            K::GeneralComparison { .. } => self.type_check_general_comparison(id),
            K::IdentityComparison { lhs, rhs, op } => {
                for operand in [lhs, rhs] {
                    if self.arena.item_type(operand).is_atomic() {
                        return Err(Error::static_type(
                            ErrorCode::XPTY0004,
                            format!("the operands of '{}' must be nodes", node_compare_symbol(op)),
                        ));
                    }
                    self.checked_cardinality(id, operand, Cardinality::ZERO_OR_ONE, "an operand of a node comparison")?;
                }
                Ok(id)
            }
            K::IntegerRangeTest { .. } => Ok(self.fold(id)),
            K::Range { start, end } => self.type_check_range(id, start, end),
            K::Filter { .. } => self.type_check_filter(id),
            K::Slash { start, step } => self.type_check_slash(id, start, step),
            K::DocumentSorter { .. } => Ok(id),
            K::Venn { op, lhs, rhs } => {
                for operand in [lhs, rhs] {
                    if self.arena.item_type(operand).is_atomic() {
                        return Err(Error::static_type(
                            ErrorCode::XPTY0004,
                            format!("the operands of '{}' must be node sequences", op_name(op)),
                        ));
                    }
                }
                Ok(id)
            }
            K::Conditional { condition, then_branch, else_branch } => {
                match self.arena.kind(condition).as_literal().and_then(GroundedValue::effective_boolean_value) {
                    Some(true) => {
                        self.record("constant-condition", then_branch);
                        Ok(then_branch)
                    }
                    Some(false) => {
                        self.record("constant-condition", else_branch);
                        Ok(else_branch)
                    }
                    None => Ok(id),
                }
            }
            K::InstanceOf { operand, target } => {
                let supplied = SequenceType::new(self.arena.item_type(operand), self.arena.cardinality(operand));
                if type_hierarchy().sequence_subsumed(&supplied, &target) {
                    let lit = self.literal_like(GroundedValue::singleton(XdmAtomicValue::Boolean(true)), id);
                    self.record("instance-of-statically-true", lit);
                    return Ok(lit);
                }
                Ok(self.fold(id))
            }
            K::Castable { operand, target, allows_empty } => {
                self.check_cast_target(target)?;
                let operand = self.atomized(id, operand);
                let from = self.arena.item_type(operand).primitive_atomic();
                let never = !from.is_abstract()
                    && from != AtomicType::UntypedAtomic
                    && !cast_possible(from, target)
                    && !(allows_empty && self.arena.cardinality(operand).allows_zero());
                if never {
                    let lit = self.literal_like(GroundedValue::singleton(XdmAtomicValue::Boolean(false)), id);
                    self.record("castable-statically-false", lit);
                    return Ok(lit);
                }
                Ok(self.fold(id))
            }
            K::Cast { operand, target, allows_empty } => {
                self.check_cast_target(target)?;
                let operand = self.atomized(id, operand);
                let required = if allows_empty { Cardinality::ZERO_OR_ONE } else { Cardinality::EXACTLY_ONE };
                let operand = self.checked_cardinality(id, operand, required, "the operand of a cast expression")?;
                let from = self.arena.item_type(operand).primitive_atomic();
                if !from.is_abstract() && from != AtomicType::UntypedAtomic && !cast_possible(from, target) {
                    return Err(Error::static_type(
                        ErrorCode::XPTY0004,
                        format!("casting from {from} to {target} can never succeed"),
                    ));
                }
                Ok(self.fold(id))
            }
            K::TreatAs { operand, target } => {
                let supplied = SequenceType::new(self.arena.item_type(operand), self.arena.cardinality(operand));
                if type_hierarchy().sequence_subsumed(&supplied, &target) {
                    self.record("treat-as-redundant", operand);
                    return Ok(operand);
                }
                Ok(self.fold(id))
            }
            K::Atomizer { operand } => match self.arena.item_type(operand) {
                ItemType::Atomic(_) | ItemType::Empty => Ok(operand),
                _ => Ok(self.fold(id)),
            },
            K::UntypedConverter { operand, .. } => {
                if self.arena.item_type(operand).may_be_untyped() {
                    Ok(self.fold(id))
                } else {
                    Ok(operand)
                }
            }
            K::CardinalityChecker { operand, required, role } => {
                let supplied = self.arena.cardinality(operand);
                if required.subsumes(supplied) {
                    return Ok(operand);
                }
                if (supplied & required).is_empty() {
                    return Err(Error::static_type(
                        ErrorCode::XPTY0004,
                        format!("required cardinality of {role} is {required}; supplied value has cardinality {supplied}"),
                    ));
                }
                Ok(self.fold(id))
            }
            K::ItemChecker { operand, required, .. } => {
                if type_hierarchy().is_subtype(&self.arena.item_type(operand), &required) {
                    return Ok(operand);
                }
                Ok(self.fold(id))
            }
            K::FunctionCall { function, args } => self.type_check_call(id, function, &args, context),
        }
    }

    fn check_node_focus(&self, what: &str, context: ContextItemType) -> Result<(), Error> {
        match context {
            ContextItemType::Absent => Err(absent_focus(what)),
            ContextItemType::Known(t) if t.is_atomic() => Err(atomic_focus(what, t)),
            _ => Ok(()),
        }
    }

    /// A downward step from a node that has no children or attributes selects nothing.
    fn empty_axis_step(&mut self, id: ExprId, axis: Axis, context: ContextItemType) -> ExprId {
        let downward = matches!(axis, Axis::Child | Axis::Descendant | Axis::Attribute | Axis::Namespace);
        match context {
            ContextItemType::Known(ItemType::Node(kind)) if downward && is_leaf_kind(kind) => {
                let lit = self.literal_like(GroundedValue::empty(), id);
                self.record("axis-selects-nothing", lit);
                lit
            }
            _ => id,
        }
    }

    fn check_cast_target(&self, target: AtomicType) -> Result<(), Error> {
        if target.is_abstract() {
            return Err(Error::from_code(ErrorCode::XPST0080, format!("cannot cast to the abstract type {target}")));
        }
        Ok(())
    }

    fn type_check_range(&mut self, id: ExprId, start: ExprId, end: ExprId) -> Result<ExprId, Error> {
        for (operand, role) in [(start, "the first operand of 'to'"), (end, "the second operand of 'to'")] {
            let operand = self.atomized(id, operand);
            let operand = self.checked_cardinality(id, operand, Cardinality::ZERO_OR_ONE, role)?;
            let operand = self.untyped_to(id, operand, AtomicType::Integer);
            self.checked_item_type(id, operand, ItemType::INTEGER, role)?;
        }
        let ExprKind::Range { start, end } = self.arena.kind(id).clone() else {
            return Ok(id);
        };
        let bound = |e: ExprId| self.arena.kind(e).as_literal().and_then(GroundedValue::as_singleton);
        match (bound(start), bound(end)) {
            (Some(XdmAtomicValue::Integer(s)), Some(XdmAtomicValue::Integer(e))) => {
                let lit = self.literal_like(GroundedValue::range(s, e), id);
                self.record("literal-range", lit);
                Ok(lit)
            }
            _ => Ok(id),
        }
    }

    fn type_check_slash(&mut self, id: ExprId, start: ExprId, step: ExprId) -> Result<ExprId, Error> {
        let start_type = self.arena.item_type(start);
        if start_type.is_atomic() {
            return Err(Error::static_type(
                ErrorCode::XPTY0019,
                format!("the first operand of '/' must be a node sequence, but has type {start_type}"),
            ));
        }
        if self.arena.cardinality(start).is_empty_sequence() || self.arena.cardinality(step).is_empty_sequence() {
            let lit = self.literal_like(GroundedValue::empty(), id);
            self.record("empty-path", lit);
            return Ok(lit);
        }
        let ordered = self.arena.properties(id).contains(StaticProperty::ORDERED);
        if ordered || self.arena.item_type(step).is_atomic() {
            return Ok(id);
        }
        let sorter = self.arena.add_like(ExprKind::DocumentSorter { operand: id }, id);
        self.record("document-sorter", sorter);
        Ok(sorter)
    }

    fn type_check_call(
        &mut self,
        id: ExprId,
        function: SystemFunction,
        args: &[ExprId],
        context: ContextItemType,
    ) -> Result<ExprId, Error> {
        if matches!(function, SystemFunction::Position | SystemFunction::Last) && context == ContextItemType::Absent {
            return Err(absent_focus(&format!("{}()", function.local_name())));
        }
        for (i, arg) in args.iter().enumerate() {
            let role = format!("argument {} of {}()", i + 1, function.local_name());
            self.coerce_argument(id, *arg, function.argument_type(i), &role)?;
        }
        if function == SystemFunction::Boolean {
            if let Some(arg) = self.arena.children(id).first().copied() {
                if self.arena.item_type(arg) == ItemType::BOOLEAN
                    && self.arena.cardinality(arg) == Cardinality::EXACTLY_ONE
                {
                    self.record("redundant-boolean", arg);
                    return Ok(arg);
                }
            }
        }
        Ok(self.fold(id))
    }
}

fn node_compare_symbol(op: NodeCompareOp) -> &'static str {
    match op {
        NodeCompareOp::Is => "is",
        NodeCompareOp::Precedes => "<<",
        NodeCompareOp::Follows => ">>",
    }
}

fn op_name(op: SetOp) -> &'static str {
    match op {
        SetOp::Union => "union",
        SetOp::Intersect => "intersect",
        SetOp::Except => "except",
    }
}
