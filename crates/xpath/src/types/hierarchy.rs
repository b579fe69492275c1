use std::collections::HashMap;
use std::sync::LazyLock;

use super::{AtomicType, ItemType, SequenceType};

/// Relationship between two item types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    SameType,
    /// The first type includes every instance of the second.
    Subsumes,
    /// The first type is included in the second.
    SubsumedBy,
    Overlaps,
    Disjoint,
}

impl Relation {
    /// The relation seen from the other operand.
    pub fn inverse(self) -> Relation {
        match self {
            Relation::Subsumes => Relation::SubsumedBy,
            Relation::SubsumedBy => Relation::Subsumes,
            other => other,
        }
    }
}

/// Process-wide, immutable registry of the built-in type lattice.
pub struct TypeHierarchy {
    // ancestors of each atomic type, nearest first, excluding the type itself
    ancestors: HashMap<AtomicType, Vec<AtomicType>>,
}

static TYPE_HIERARCHY: LazyLock<TypeHierarchy> = LazyLock::new(TypeHierarchy::build);

pub fn type_hierarchy() -> &'static TypeHierarchy {
    &TYPE_HIERARCHY
}

impl TypeHierarchy {
    fn build() -> Self {
        let ancestors = AtomicType::ALL
            .into_iter()
            .map(|t| {
                let mut chain = Vec::new();
                let mut cur = t.parent();
                while let Some(p) = cur {
                    chain.push(p);
                    cur = p.parent();
                }
                (t, chain)
            })
            .collect();
        Self { ancestors }
    }

    fn atomic_ancestors(&self, t: AtomicType) -> &[AtomicType] {
        self.ancestors.get(&t).map_or(&[], Vec::as_slice)
    }

    pub fn atomic_relationship(&self, a: AtomicType, b: AtomicType) -> Relation {
        if a == b {
            Relation::SameType
        } else if self.atomic_ancestors(b).contains(&a) {
            Relation::Subsumes
        } else if self.atomic_ancestors(a).contains(&b) {
            Relation::SubsumedBy
        } else {
            Relation::Disjoint
        }
    }

    pub fn relationship(&self, a: &ItemType, b: &ItemType) -> Relation {
        use ItemType::*;
        match (a, b) {
            _ if a == b => Relation::SameType,
            (Empty, _) => Relation::SubsumedBy,
            (_, Empty) => Relation::Subsumes,
            (AnyItem, _) => Relation::Subsumes,
            (_, AnyItem) => Relation::SubsumedBy,
            (AnyNode, Node(_)) => Relation::Subsumes,
            (Node(_), AnyNode) => Relation::SubsumedBy,
            (Node(_), Node(_)) => Relation::Disjoint,
            (Atomic(x), Atomic(y)) => self.atomic_relationship(*x, *y),
            _ => Relation::Disjoint,
        }
    }

    /// `a` is the same type as `b` or a subtype of it.
    pub fn is_subtype(&self, a: &ItemType, b: &ItemType) -> bool {
        matches!(self.relationship(a, b), Relation::SameType | Relation::SubsumedBy)
    }

    pub fn is_atomic_subtype(&self, a: AtomicType, b: AtomicType) -> bool {
        matches!(self.atomic_relationship(a, b), Relation::SameType | Relation::SubsumedBy)
    }

    /// Least common supertype of two item types.
    pub fn common_supertype(&self, a: &ItemType, b: &ItemType) -> ItemType {
        use ItemType::*;
        match self.relationship(a, b) {
            Relation::SameType | Relation::Subsumes => return *a,
            Relation::SubsumedBy => return *b,
            _ => {}
        }
        match (a, b) {
            (Atomic(x), Atomic(y)) => {
                let chain = self.atomic_ancestors(*x);
                let common = chain
                    .iter()
                    .copied()
                    .find(|anc| self.is_atomic_subtype(*y, *anc))
                    .unwrap_or(AtomicType::AnyAtomic);
                Atomic(common)
            }
            (Node(_) | AnyNode, Node(_) | AnyNode) => AnyNode,
            _ => AnyItem,
        }
    }

    /// `supplied` is guaranteed to be an instance of `required`, statically.
    pub fn sequence_subsumed(&self, supplied: &SequenceType, required: &SequenceType) -> bool {
        required.cardinality.subsumes(supplied.cardinality)
            && (supplied.cardinality.is_empty_sequence()
                || self.is_subtype(&supplied.item_type, &required.item_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeKind;

    #[test]
    fn relation_is_symmetric_under_inversion() {
        let th = type_hierarchy();
        let samples = [
            ItemType::AnyItem,
            ItemType::AnyNode,
            ItemType::Node(NodeKind::Element),
            ItemType::Node(NodeKind::Attribute),
            ItemType::Empty,
            ItemType::INTEGER,
            ItemType::NUMERIC,
            ItemType::DOUBLE,
            ItemType::STRING,
            ItemType::UNTYPED,
            ItemType::ANY_ATOMIC,
        ];
        for a in &samples {
            for b in &samples {
                assert_eq!(th.relationship(a, b), th.relationship(b, a).inverse(), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn numeric_tower() {
        let th = type_hierarchy();
        assert_eq!(th.relationship(&ItemType::NUMERIC, &ItemType::INTEGER), Relation::Subsumes);
        assert_eq!(th.relationship(&ItemType::UNTYPED, &ItemType::NUMERIC), Relation::Disjoint);
        assert_eq!(
            th.common_supertype(&ItemType::INTEGER, &ItemType::DOUBLE),
            ItemType::NUMERIC
        );
        assert_eq!(
            th.common_supertype(&ItemType::STRING, &ItemType::INTEGER),
            ItemType::ANY_ATOMIC
        );
    }
}
