//! Static type model: atomic type lattice, item types, cardinalities and sequence types.

mod atomic;
mod cardinality;
mod hierarchy;
mod item;
mod sequence;

pub use atomic::AtomicType;
pub use cardinality::Cardinality;
pub use hierarchy::{Relation, TypeHierarchy, type_hierarchy};
pub use item::{ItemType, NodeTest};
pub use sequence::{ContextItemType, SequenceType};
