//! Insertion of atomization, untyped conversion and runtime type checks.

use crate::compiler::expr::{ExprId, ExprKind};
use crate::compiler::properties::StaticProperty;
use crate::compiler::visitor::ExpressionVisitor;
use crate::engine::runtime::{Error, ErrorCode};
use crate::types::{AtomicType, Cardinality, ItemType, Relation, SequenceType, type_hierarchy};

/// Target type for untyped values passed where `required` is expected.
fn untyped_target(required: AtomicType) -> Option<AtomicType> {
    match required {
        AtomicType::AnyAtomic | AtomicType::UntypedAtomic => None,
        t if t.is_numeric() && t != AtomicType::Integer => Some(AtomicType::Double),
        t => Some(t),
    }
}

impl ExpressionVisitor<'_> {
    /// Atomizes `child` unless it is atomic already.
    pub(crate) fn atomized(&mut self, parent: ExprId, child: ExprId) -> ExprId {
        match self.arena.item_type(child) {
            ItemType::Atomic(_) | ItemType::Empty => child,
            _ => self.wrap(parent, child, |operand| ExprKind::Atomizer { operand }),
        }
    }

    /// Converts untyped values of `child` to `target`, if it can produce any.
    pub(crate) fn untyped_to(&mut self, parent: ExprId, child: ExprId, target: AtomicType) -> ExprId {
        let never_untyped = self.arena.properties(child).contains(StaticProperty::NOT_UNTYPED_ATOMIC)
            || !self.arena.item_type(child).may_be_untyped();
        if never_untyped {
            return child;
        }
        self.wrap(parent, child, |operand| ExprKind::UntypedConverter { operand, target })
    }

    /// Ensures `child` has a cardinality allowed by `required`, statically or at run time.
    pub(crate) fn checked_cardinality(
        &mut self,
        parent: ExprId,
        child: ExprId,
        required: Cardinality,
        role: &str,
    ) -> Result<ExprId, Error> {
        let supplied = self.arena.cardinality(child);
        if required.subsumes(supplied) {
            return Ok(child);
        }
        if (supplied & required).is_empty() {
            return Err(Error::static_type(
                ErrorCode::XPTY0004,
                format!("required cardinality of {role} is {required}; supplied value has cardinality {supplied}"),
            ));
        }
        let role = Self::role(role.to_string());
        Ok(self.wrap(parent, child, |operand| ExprKind::CardinalityChecker { operand, required, role }))
    }

    /// Ensures the items of `child` are instances of `required`, statically or at run time.
    pub(crate) fn checked_item_type(
        &mut self,
        parent: ExprId,
        child: ExprId,
        required: ItemType,
        role: &str,
    ) -> Result<ExprId, Error> {
        let supplied = self.arena.item_type(child);
        match type_hierarchy().relationship(&supplied, &required) {
            Relation::SameType | Relation::SubsumedBy => Ok(child),
            Relation::Disjoint if !self.arena.cardinality(child).allows_zero() => Err(Error::static_type(
                ErrorCode::XPTY0004,
                format!("required item type of {role} is {required}; supplied value has item type {supplied}"),
            )),
            _ => {
                let role = Self::role(role.to_string());
                Ok(self.wrap(parent, child, |operand| ExprKind::ItemChecker { operand, required, role }))
            }
        }
    }

    /// Applies the function conversion rules to argument `child` of `parent`.
    pub(crate) fn coerce_argument(
        &mut self,
        parent: ExprId,
        child: ExprId,
        required: SequenceType,
        role: &str,
    ) -> Result<ExprId, Error> {
        let mut arg = child;
        if let ItemType::Atomic(t) = required.item_type {
            arg = self.atomized(parent, arg);
            if let Some(target) = untyped_target(t) {
                arg = self.untyped_to(parent, arg, target);
            }
        }
        let supplied = SequenceType::new(self.arena.item_type(arg), self.arena.cardinality(arg));
        if type_hierarchy().sequence_subsumed(&supplied, &required) {
            return Ok(arg);
        }
        arg = self.checked_cardinality(parent, arg, required.cardinality, role)?;
        self.checked_item_type(parent, arg, required.item_type, role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untyped_arguments_follow_the_required_type() {
        assert_eq!(untyped_target(AtomicType::Numeric), Some(AtomicType::Double));
        assert_eq!(untyped_target(AtomicType::Integer), Some(AtomicType::Integer));
        assert_eq!(untyped_target(AtomicType::String), Some(AtomicType::String));
        assert_eq!(untyped_target(AtomicType::AnyAtomic), None);
    }
}
