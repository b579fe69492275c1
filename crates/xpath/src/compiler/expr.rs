//! The closed set of expression kinds held in an [`ExprArena`](super::ExprArena).

use core::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use smallvec::{SmallVec, smallvec};

use crate::compiler::functions::SystemFunction;
use crate::engine::calculator::{ArithOp, Calculator};
use crate::engine::comparer::{CompareOp, Comparer};
use crate::model::NodeKind;
use crate::types::{AtomicType, Cardinality, ItemType, NodeTest, SequenceType};
use crate::xdm::{ExpandedName, GroundedValue};

/// Index of a node in an expression arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub(crate) u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A local variable. The id doubles as the variable's slot in the evaluation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) u32);

impl VarId {
    pub fn slot(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BooleanOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCompareOp {
    Is,
    Precedes,
    Follows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    Some,
    Every,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Attribute,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    Namespace,
}

impl Axis {
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf | Axis::PrecedingSibling | Axis::Preceding
        )
    }

    /// Node kind selected by name tests on this axis.
    pub fn principal_node_kind(self) -> NodeKind {
        match self {
            Axis::Attribute => NodeKind::Attribute,
            Axis::Namespace => NodeKind::Namespace,
            _ => NodeKind::Element,
        }
    }

    /// Whether the axis stays within the subtree of its origin.
    pub fn is_subtree(self) -> bool {
        matches!(
            self,
            Axis::Child | Axis::Descendant | Axis::DescendantOrSelf | Axis::Attribute | Axis::SelfAxis | Axis::Namespace
        )
    }

    /// Whether no result node is an ancestor of another.
    pub fn is_peer(self) -> bool {
        matches!(
            self,
            Axis::Child | Axis::Attribute | Axis::SelfAxis | Axis::Namespace | Axis::Parent
                | Axis::FollowingSibling | Axis::PrecedingSibling
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Attribute => "attribute",
            Axis::SelfAxis => "self",
            Axis::Parent => "parent",
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::FollowingSibling => "following-sibling",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::Following => "following",
            Axis::Preceding => "preceding",
            Axis::Namespace => "namespace",
        }
    }
}

/// How a general comparison walks its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonStrategy {
    /// Not classified yet (before `optimize`).
    Unresolved,
    OneToOne,
    /// The left operand may be a sequence; the right is a singleton.
    ManyToOne,
    ManyToMany,
}

bitflags! {
    /// Predicate classification of a filter, fixed during type checking.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FilterFlags: u8 {
        /// The predicate may select by position.
        const POSITIONAL = 1 << 0;
        /// The predicate is a single boolean.
        const SINGLETON_BOOLEAN = 1 << 1;
        /// The predicate is a number that does not depend on the focus.
        const INDEPENDENT_NUMERIC = 1 << 2;
    }
}

/// What an inserted runtime check protects, used in its error message.
pub type Role = Arc<str>;

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(GroundedValue),
    ContextItem {
        item_type: ItemType,
    },
    Root,
    LocalVarRef(VarId),
    GlobalVarRef {
        name: ExpandedName,
        declared: Option<SequenceType>,
    },
    Arithmetic {
        op: ArithOp,
        lhs: ExprId,
        rhs: ExprId,
        calculator: Option<Calculator>,
        /// One-shot guard: backwards-compatible mode is decided by the first `simplify`.
        simplified: bool,
        backwards_compatible: bool,
    },
    Negate {
        operand: ExprId,
        backwards_compatible: bool,
    },
    Boolean {
        op: BooleanOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    ValueComparison {
        op: CompareOp,
        lhs: ExprId,
        rhs: ExprId,
        comparer: Comparer,
        /// Result when either operand is empty; `None` yields the empty sequence.
        result_when_empty: Option<bool>,
    },
    GeneralComparison {
        op: CompareOp,
        lhs: ExprId,
        rhs: ExprId,
        comparer: Comparer,
        strategy: ComparisonStrategy,
        /// Operand values may be untyped and need pairwise coercion at runtime.
        runtime_coercion: bool,
    },
    IdentityComparison {
        op: NodeCompareOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    /// `value = (min to max)` for a singleton numeric value.
    IntegerRangeTest {
        value: ExprId,
        min: ExprId,
        max: ExprId,
    },
    Range {
        start: ExprId,
        end: ExprId,
    },
    Block {
        children: SmallVec<[ExprId; 4]>,
    },
    Filter {
        base: ExprId,
        predicate: ExprId,
        flags: FilterFlags,
    },
    FirstItem {
        base: ExprId,
    },
    LastItem {
        base: ExprId,
    },
    /// `base[index]` for a focus-independent numeric index.
    Subscript {
        base: ExprId,
        index: ExprId,
    },
    Slash {
        start: ExprId,
        step: ExprId,
    },
    Axis {
        axis: Axis,
        test: NodeTest,
    },
    DocumentSorter {
        operand: ExprId,
    },
    Venn {
        op: SetOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    For {
        var: VarId,
        sequence: ExprId,
        action: ExprId,
    },
    Let {
        var: VarId,
        sequence: ExprId,
        action: ExprId,
    },
    Quantified {
        quantifier: Quantifier,
        var: VarId,
        sequence: ExprId,
        satisfies: ExprId,
    },
    Conditional {
        condition: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
    },
    InstanceOf {
        operand: ExprId,
        target: SequenceType,
    },
    Castable {
        operand: ExprId,
        target: AtomicType,
        allows_empty: bool,
    },
    Cast {
        operand: ExprId,
        target: AtomicType,
        allows_empty: bool,
    },
    TreatAs {
        operand: ExprId,
        target: SequenceType,
    },
    Atomizer {
        operand: ExprId,
    },
    UntypedConverter {
        operand: ExprId,
        target: AtomicType,
    },
    CardinalityChecker {
        operand: ExprId,
        required: Cardinality,
        role: Role,
    },
    ItemChecker {
        operand: ExprId,
        required: ItemType,
        role: Role,
    },
    /// `position() = last()`, or its negation when `condition` is false.
    IsLast {
        condition: bool,
    },
    FunctionCall {
        function: SystemFunction,
        args: SmallVec<[ExprId; 3]>,
    },
}

impl ExprKind {
    /// Element name used by `explain`.
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Literal(_) => "literal",
            ExprKind::ContextItem { .. } => "dot",
            ExprKind::Root => "root",
            ExprKind::LocalVarRef(_) => "varRef",
            ExprKind::GlobalVarRef { .. } => "globalVarRef",
            ExprKind::Arithmetic { .. } => "arith",
            ExprKind::Negate { .. } => "negate",
            ExprKind::Boolean { op: BooleanOp::And, .. } => "and",
            ExprKind::Boolean { op: BooleanOp::Or, .. } => "or",
            ExprKind::ValueComparison { .. } => "vc",
            ExprKind::GeneralComparison { .. } => "gc",
            ExprKind::IdentityComparison { .. } => "nodeComparison",
            ExprKind::IntegerRangeTest { .. } => "intRangeTest",
            ExprKind::Range { .. } => "to",
            ExprKind::Block { .. } => "sequence",
            ExprKind::Filter { .. } => "filter",
            ExprKind::FirstItem { .. } => "first",
            ExprKind::LastItem { .. } => "last",
            ExprKind::Subscript { .. } => "subscript",
            ExprKind::Slash { .. } => "slash",
            ExprKind::Axis { .. } => "axis",
            ExprKind::DocumentSorter { .. } => "docOrder",
            ExprKind::Venn { .. } => "venn",
            ExprKind::For { .. } => "for",
            ExprKind::Let { .. } => "let",
            ExprKind::Quantified { .. } => "quantified",
            ExprKind::Conditional { .. } => "choose",
            ExprKind::InstanceOf { .. } => "instance",
            ExprKind::Castable { .. } => "castable",
            ExprKind::Cast { .. } => "cast",
            ExprKind::TreatAs { .. } => "treat",
            ExprKind::Atomizer { .. } => "data",
            ExprKind::UntypedConverter { .. } => "convertUntyped",
            ExprKind::CardinalityChecker { .. } => "check",
            ExprKind::ItemChecker { .. } => "itemCheck",
            ExprKind::IsLast { .. } => "isLast",
            ExprKind::FunctionCall { .. } => "fn",
        }
    }

    /// Direct subexpressions in evaluation order.
    pub fn children(&self) -> SmallVec<[ExprId; 4]> {
        use ExprKind::*;
        match self {
            Literal(_) | ContextItem { .. } | Root | LocalVarRef(_) | GlobalVarRef { .. }
            | ExprKind::Axis { .. } | IsLast { .. } => SmallVec::new(),
            Arithmetic { lhs, rhs, .. }
            | Boolean { lhs, rhs, .. }
            | ValueComparison { lhs, rhs, .. }
            | GeneralComparison { lhs, rhs, .. }
            | IdentityComparison { lhs, rhs, .. }
            | Venn { lhs, rhs, .. } => smallvec![*lhs, *rhs],
            Range { start, end } => smallvec![*start, *end],
            IntegerRangeTest { value, min, max } => smallvec![*value, *min, *max],
            Block { children } => children.iter().copied().collect(),
            Filter { base, predicate, .. } => smallvec![*base, *predicate],
            Subscript { base, index } => smallvec![*base, *index],
            Slash { start, step } => smallvec![*start, *step],
            For { sequence, action, .. } | Let { sequence, action, .. } => smallvec![*sequence, *action],
            Quantified { sequence, satisfies, .. } => smallvec![*sequence, *satisfies],
            Conditional { condition, then_branch, else_branch } => {
                smallvec![*condition, *then_branch, *else_branch]
            }
            Negate { operand, .. }
            | DocumentSorter { operand }
            | InstanceOf { operand, .. }
            | Castable { operand, .. }
            | Cast { operand, .. }
            | TreatAs { operand, .. }
            | Atomizer { operand }
            | UntypedConverter { operand, .. }
            | CardinalityChecker { operand, .. }
            | ItemChecker { operand, .. } => smallvec![*operand],
            FirstItem { base } | LastItem { base } => smallvec![*base],
            FunctionCall { args, .. } => args.iter().copied().collect(),
        }
    }

    /// Mutable child slots, in the same order as [`children`](Self::children).
    pub fn child_slots_mut(&mut self) -> SmallVec<[&mut ExprId; 4]> {
        use ExprKind::*;
        match self {
            Literal(_) | ContextItem { .. } | Root | LocalVarRef(_) | GlobalVarRef { .. }
            | ExprKind::Axis { .. } | IsLast { .. } => SmallVec::new(),
            Arithmetic { lhs, rhs, .. }
            | Boolean { lhs, rhs, .. }
            | ValueComparison { lhs, rhs, .. }
            | GeneralComparison { lhs, rhs, .. }
            | IdentityComparison { lhs, rhs, .. }
            | Venn { lhs, rhs, .. } => smallvec![lhs, rhs],
            Range { start, end } => smallvec![start, end],
            IntegerRangeTest { value, min, max } => smallvec![value, min, max],
            Block { children } => children.iter_mut().collect(),
            Filter { base, predicate, .. } => smallvec![base, predicate],
            Subscript { base, index } => smallvec![base, index],
            Slash { start, step } => smallvec![start, step],
            For { sequence, action, .. } | Let { sequence, action, .. } => smallvec![sequence, action],
            Quantified { sequence, satisfies, .. } => smallvec![sequence, satisfies],
            Conditional { condition, then_branch, else_branch } => smallvec![condition, then_branch, else_branch],
            Negate { operand, .. }
            | DocumentSorter { operand }
            | InstanceOf { operand, .. }
            | Castable { operand, .. }
            | Cast { operand, .. }
            | TreatAs { operand, .. }
            | Atomizer { operand }
            | UntypedConverter { operand, .. }
            | CardinalityChecker { operand, .. }
            | ItemChecker { operand, .. } => smallvec![operand],
            FirstItem { base } | LastItem { base } => smallvec![base],
            FunctionCall { args, .. } => args.iter_mut().collect(),
        }
    }

    /// The child evaluated under a new focus (a predicate or a path step).
    pub fn focus_controlled_child(&self) -> Option<ExprId> {
        match self {
            ExprKind::Filter { predicate, .. } => Some(*predicate),
            ExprKind::Slash { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// The variable this node binds, if any.
    pub fn bound_var(&self) -> Option<VarId> {
        match self {
            ExprKind::For { var, .. } | ExprKind::Let { var, .. } | ExprKind::Quantified { var, .. } => Some(*var),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, ExprKind::Literal(_))
    }

    pub fn as_literal(&self) -> Option<&GroundedValue> {
        match self {
            ExprKind::Literal(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_function(&self, f: SystemFunction) -> bool {
        matches!(self, ExprKind::FunctionCall { function, .. } if *function == f)
    }
}
