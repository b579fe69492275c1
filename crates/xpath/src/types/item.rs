use core::fmt;

use string_cache::DefaultAtom;

use super::AtomicType;
use crate::model::{NodeKind, XdmNode};

/// Static classification of items.
///
/// `Empty` is the type of the empty sequence (and of expressions that can only fail);
/// it is a subtype of every other item type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    AnyItem,
    AnyNode,
    Node(NodeKind),
    Atomic(AtomicType),
    Empty,
}

impl ItemType {
    pub const ANY_ATOMIC: ItemType = ItemType::Atomic(AtomicType::AnyAtomic);
    pub const NUMERIC: ItemType = ItemType::Atomic(AtomicType::Numeric);
    pub const BOOLEAN: ItemType = ItemType::Atomic(AtomicType::Boolean);
    pub const INTEGER: ItemType = ItemType::Atomic(AtomicType::Integer);
    pub const DOUBLE: ItemType = ItemType::Atomic(AtomicType::Double);
    pub const STRING: ItemType = ItemType::Atomic(AtomicType::String);
    pub const UNTYPED: ItemType = ItemType::Atomic(AtomicType::UntypedAtomic);

    pub fn is_atomic(&self) -> bool {
        matches!(self, ItemType::Atomic(_))
    }

    pub fn is_node(&self) -> bool {
        matches!(self, ItemType::AnyNode | ItemType::Node(_))
    }

    pub fn atomic(&self) -> Option<AtomicType> {
        match self {
            ItemType::Atomic(t) => Some(*t),
            _ => None,
        }
    }

    /// Primitive atomic type after atomization, used to select calculators and comparers.
    pub fn primitive_atomic(&self) -> AtomicType {
        match self.atomized() {
            ItemType::Atomic(t) => t.primitive(),
            _ => AtomicType::AnyAtomic,
        }
    }

    /// Item type after atomization. Nodes of the untyped tree model atomize to
    /// `xs:untypedAtomic`, except comments, processing instructions and namespaces,
    /// whose typed value is an `xs:string`.
    pub fn atomized(&self) -> ItemType {
        match self {
            ItemType::Atomic(_) | ItemType::Empty => *self,
            ItemType::Node(k) => match k {
                NodeKind::Comment | NodeKind::ProcessingInstruction | NodeKind::Namespace => ItemType::STRING,
                _ => ItemType::UNTYPED,
            },
            ItemType::AnyNode | ItemType::AnyItem => ItemType::ANY_ATOMIC,
        }
    }

    /// Whether atomizing a value of this type can yield `xs:untypedAtomic`.
    pub fn may_be_untyped(&self) -> bool {
        match self.atomized() {
            ItemType::Atomic(t) => matches!(t, AtomicType::UntypedAtomic | AtomicType::AnyAtomic),
            _ => false,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::AnyItem => f.write_str("item()"),
            ItemType::AnyNode => f.write_str("node()"),
            ItemType::Node(k) => write!(f, "{}", k.test_name()),
            ItemType::Atomic(t) => write!(f, "{t}"),
            ItemType::Empty => f.write_str("empty-sequence()"),
        }
    }
}

/// Node test of an axis step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeTest {
    AnyNode,
    Kind(NodeKind),
    Name {
        kind: NodeKind,
        ns_uri: Option<DefaultAtom>,
        local: DefaultAtom,
    },
    /// `prefix:*`
    NamespaceWildcard { kind: NodeKind, ns_uri: DefaultAtom },
    /// `*:local`
    LocalWildcard { kind: NodeKind, local: DefaultAtom },
}

impl NodeTest {
    /// Element name test in no namespace.
    pub fn element(local: &str) -> Self {
        NodeTest::Name { kind: NodeKind::Element, ns_uri: None, local: DefaultAtom::from(local) }
    }

    pub fn attribute(local: &str) -> Self {
        NodeTest::Name { kind: NodeKind::Attribute, ns_uri: None, local: DefaultAtom::from(local) }
    }

    pub fn any_element() -> Self {
        NodeTest::Kind(NodeKind::Element)
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            NodeTest::AnyNode => ItemType::AnyNode,
            NodeTest::Kind(k)
            | NodeTest::Name { kind: k, .. }
            | NodeTest::NamespaceWildcard { kind: k, .. }
            | NodeTest::LocalWildcard { kind: k, .. } => ItemType::Node(*k),
        }
    }

    pub fn matches<N: XdmNode>(&self, node: &N) -> bool {
        match self {
            NodeTest::AnyNode => true,
            NodeTest::Kind(k) => node.kind() == *k,
            NodeTest::Name { kind, ns_uri, local } => {
                node.kind() == *kind
                    && node.name().is_some_and(|q| {
                        q.local == **local && q.ns_uri.as_deref() == ns_uri.as_deref()
                    })
            }
            NodeTest::NamespaceWildcard { kind, ns_uri } => {
                node.kind() == *kind
                    && node.name().is_some_and(|q| q.ns_uri.as_deref() == Some(&**ns_uri))
            }
            NodeTest::LocalWildcard { kind, local } => {
                node.kind() == *kind && node.name().is_some_and(|q| q.local == **local)
            }
        }
    }
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTest::AnyNode => f.write_str("node()"),
            NodeTest::Kind(k) => f.write_str(k.test_name()),
            NodeTest::Name { ns_uri: Some(ns), local, .. } => write!(f, "Q{{{ns}}}{local}"),
            NodeTest::Name { local, .. } => f.write_str(local),
            NodeTest::NamespaceWildcard { ns_uri, .. } => write!(f, "Q{{{ns_uri}}}*"),
            NodeTest::LocalWildcard { local, .. } => write!(f, "*:{local}"),
        }
    }
}
