use std::sync::Arc;

use super::{XdmAtomicValue, XdmItem};
use crate::types::{AtomicType, Cardinality, ItemType, type_hierarchy};

/// A fully materialized sequence of atomic values, the payload of a literal.
///
/// Contiguous integer ranges (`1 to 1000000`) are kept symbolically.
#[derive(Debug, Clone)]
pub enum GroundedValue {
    Atomics(Arc<[XdmAtomicValue]>),
    IntegerRange { start: i64, end: i64 },
}

impl GroundedValue {
    pub fn empty() -> Self {
        GroundedValue::Atomics(Arc::from(Vec::new()))
    }

    pub fn singleton(value: XdmAtomicValue) -> Self {
        GroundedValue::Atomics(Arc::from(vec![value]))
    }

    pub fn from_values(values: Vec<XdmAtomicValue>) -> Self {
        GroundedValue::Atomics(Arc::from(values))
    }

    /// `start to end`; empty when `start > end`.
    pub fn range(start: i64, end: i64) -> Self {
        if start > end {
            Self::empty()
        } else if start == end {
            Self::singleton(XdmAtomicValue::Integer(start))
        } else {
            GroundedValue::IntegerRange { start, end }
        }
    }

    /// Grounds a materialized item sequence; fails (returns `None`) if it contains nodes.
    pub fn from_items<N>(items: &[XdmItem<N>]) -> Option<Self> {
        let mut values = Vec::with_capacity(items.len());
        for it in items {
            values.push(it.as_atomic()?.clone());
        }
        Some(Self::from_values(values))
    }

    pub fn len(&self) -> usize {
        match self {
            GroundedValue::Atomics(v) => v.len(),
            GroundedValue::IntegerRange { start, end } => usize::try_from(end - start + 1).unwrap_or(usize::MAX),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero-based access.
    pub fn item_at(&self, index: usize) -> Option<XdmAtomicValue> {
        match self {
            GroundedValue::Atomics(v) => v.get(index).cloned(),
            GroundedValue::IntegerRange { start, end } => {
                let i = i64::try_from(index).ok()?;
                let v = start.checked_add(i)?;
                (v <= *end).then_some(XdmAtomicValue::Integer(v))
            }
        }
    }

    pub fn as_singleton(&self) -> Option<XdmAtomicValue> {
        if self.len() == 1 { self.item_at(0) } else { None }
    }

    pub fn iter(&self) -> impl Iterator<Item = XdmAtomicValue> + '_ {
        (0..self.len()).map_while(move |i| self.item_at(i))
    }

    pub fn to_items<N>(&self) -> Vec<XdmItem<N>> {
        self.iter().map(XdmItem::Atomic).collect()
    }

    pub fn cardinality(&self) -> Cardinality {
        Cardinality::from_count(self.len())
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            GroundedValue::IntegerRange { .. } => ItemType::Atomic(AtomicType::Integer),
            GroundedValue::Atomics(v) => {
                let th = type_hierarchy();
                v.iter().fold(ItemType::Empty, |acc, a| {
                    th.common_supertype(&acc, &ItemType::Atomic(a.atomic_type()))
                })
            }
        }
    }

    /// Identity over values and their type annotations.
    pub fn identical(&self, other: &GroundedValue) -> bool {
        if let (
            GroundedValue::IntegerRange { start: a, end: b },
            GroundedValue::IntegerRange { start: c, end: d },
        ) = (self, other)
        {
            return a == c && b == d;
        }
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(x, y)| x.identical(&y))
    }

    /// Effective boolean value for values known at compile time. `None` when the
    /// effective boolean value would be a type error.
    pub fn effective_boolean_value(&self) -> Option<bool> {
        match self.len() {
            0 => Some(false),
            1 => crate::engine::evaluator::atomic_ebv(&self.item_at(0)?).ok(),
            _ => None,
        }
    }
}

impl From<XdmAtomicValue> for GroundedValue {
    fn from(value: XdmAtomicValue) -> Self {
        GroundedValue::singleton(value)
    }
}

impl From<Vec<XdmAtomicValue>> for GroundedValue {
    fn from(values: Vec<XdmAtomicValue>) -> Self {
        GroundedValue::from_values(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_symbolic_and_indexable() {
        let r = GroundedValue::range(3, 1_000_000);
        assert_eq!(r.len(), 999_998);
        assert_eq!(r.item_at(2), Some(XdmAtomicValue::Integer(5)));
        assert_eq!(r.item_at(999_998), None);
        assert!(GroundedValue::range(5, 1).is_empty());
    }

    #[test]
    fn mixed_values_widen_item_type() {
        let v = GroundedValue::from_values(vec![
            XdmAtomicValue::Integer(1),
            XdmAtomicValue::Double(2.0),
        ]);
        assert_eq!(v.item_type(), ItemType::Atomic(AtomicType::Numeric));
        assert_eq!(v.cardinality(), Cardinality::ONE_OR_MORE);
    }
}
