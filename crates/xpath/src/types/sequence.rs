use core::fmt;

use super::{AtomicType, Cardinality, ItemType};

/// Item type plus cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceType {
    pub item_type: ItemType,
    pub cardinality: Cardinality,
}

impl SequenceType {
    pub const ANY: SequenceType =
        SequenceType { item_type: ItemType::AnyItem, cardinality: Cardinality::ZERO_OR_MORE };
    pub const EMPTY: SequenceType =
        SequenceType { item_type: ItemType::Empty, cardinality: Cardinality::EMPTY };
    pub const SINGLE_BOOLEAN: SequenceType =
        SequenceType { item_type: ItemType::BOOLEAN, cardinality: Cardinality::EXACTLY_ONE };
    pub const SINGLE_INTEGER: SequenceType =
        SequenceType { item_type: ItemType::INTEGER, cardinality: Cardinality::EXACTLY_ONE };
    pub const OPTIONAL_ATOMIC: SequenceType =
        SequenceType { item_type: ItemType::ANY_ATOMIC, cardinality: Cardinality::ZERO_OR_ONE };
    pub const ATOMIC_SEQUENCE: SequenceType =
        SequenceType { item_type: ItemType::ANY_ATOMIC, cardinality: Cardinality::ZERO_OR_MORE };

    pub fn new(item_type: ItemType, cardinality: Cardinality) -> Self {
        Self { item_type, cardinality }
    }

    pub fn atomic(t: AtomicType, cardinality: Cardinality) -> Self {
        Self { item_type: ItemType::Atomic(t), cardinality }
    }

    pub fn single(item_type: ItemType) -> Self {
        Self { item_type, cardinality: Cardinality::EXACTLY_ONE }
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cardinality.is_empty_sequence() {
            return f.write_str("empty-sequence()");
        }
        write!(f, "{}{}", self.item_type, self.cardinality.occurrence_indicator())
    }
}

/// Static knowledge about the context item handed to `type_check` and `optimize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextItemType {
    /// There is no context item: any dependency on it is a static `XPDY0002` error.
    Absent,
    /// A context item may exist but nothing is known about its type.
    #[default]
    Unknown,
    Known(ItemType),
}

impl ContextItemType {
    pub fn item_type(&self) -> Option<ItemType> {
        match self {
            ContextItemType::Absent => None,
            ContextItemType::Unknown => Some(ItemType::AnyItem),
            ContextItemType::Known(t) => Some(*t),
        }
    }
}
