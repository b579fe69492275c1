//! Static item type, cardinality, special properties and dependencies of each
//! expression kind.

use crate::compiler::arena::{ExprArena, StaticInfo};
use crate::compiler::expr::{Axis, ExprId, ExprKind, FilterFlags, SetOp};
use crate::compiler::properties::{Dependencies, StaticProperty};
use crate::engine::calculator::CalculatorKind;
use crate::model::NodeKind;
use crate::types::{AtomicType, Cardinality, ItemType, NodeTest, SequenceType, type_hierarchy};
use crate::xdm::XdmAtomicValue;

fn info(item_type: ItemType, cardinality: Cardinality) -> StaticInfo {
    StaticInfo {
        item_type,
        cardinality,
        properties: StaticProperty::NON_CREATIVE,
        dependencies: Dependencies::empty(),
    }
}

fn boolean() -> StaticInfo {
    info(ItemType::BOOLEAN, Cardinality::EXACTLY_ONE)
}

fn union_deps(arena: &ExprArena, ids: &[ExprId]) -> Dependencies {
    ids.iter().fold(Dependencies::empty(), |d, id| d | arena.dependencies(*id))
}

fn common_type(arena: &ExprArena, ids: &[ExprId]) -> ItemType {
    let th = type_hierarchy();
    ids.iter().fold(ItemType::Empty, |t, id| th.common_supertype(&t, &arena.item_type(*id)))
}

/// Dependencies a focus-changing child contributes to its parent.
fn outer_deps(arena: &ExprArena, inner: ExprId) -> Dependencies {
    arena.dependencies(inner) - Dependencies::FOCUS
}

fn node_props(props: StaticProperty) -> StaticProperty {
    props | StaticProperty::NON_CREATIVE
}

fn axis_item_type(axis: Axis, test: &NodeTest) -> ItemType {
    match test {
        NodeTest::AnyNode => match axis {
            Axis::Attribute => ItemType::Node(NodeKind::Attribute),
            Axis::Namespace => ItemType::Node(NodeKind::Namespace),
            _ => ItemType::AnyNode,
        },
        other => other.item_type(),
    }
}

pub(crate) fn compute(arena: &ExprArena, id: ExprId) -> StaticInfo {
    use ExprKind as K;
    let children = arena.children(id);
    let deps = union_deps(arena, &children);
    let mut out = match arena.kind(id) {
        K::Literal(v) => {
            let mut i = info(v.item_type(), v.cardinality());
            if !v.iter().any(|a| a.is_untyped()) {
                i.properties |= StaticProperty::NOT_UNTYPED_ATOMIC;
            }
            i.properties |= StaticProperty::ORDERED | StaticProperty::PEER;
            i
        }
        K::ContextItem { item_type } => {
            let mut i = info(*item_type, Cardinality::EXACTLY_ONE);
            i.properties |= StaticProperty::ORDERED | StaticProperty::PEER | StaticProperty::SUBTREE;
            i.dependencies = Dependencies::CONTEXT_ITEM;
            i
        }
        K::Root => {
            let mut i = info(ItemType::Node(NodeKind::Document), Cardinality::EXACTLY_ONE);
            i.properties |= StaticProperty::ORDERED
                | StaticProperty::PEER
                | StaticProperty::CONTEXT_DOCUMENT_NODESET;
            i.dependencies = Dependencies::CONTEXT_ITEM | Dependencies::CONTEXT_DOCUMENT;
            i
        }
        K::LocalVarRef(var) => {
            let (t, c) = match arena.binding_of(id, *var).map(|b| arena.kind(b)) {
                Some(K::For { sequence, .. } | K::Quantified { sequence, .. }) => {
                    (arena.item_type(*sequence), Cardinality::EXACTLY_ONE)
                }
                Some(K::Let { sequence, .. }) => (arena.item_type(*sequence), arena.cardinality(*sequence)),
                _ => (ItemType::AnyItem, Cardinality::ZERO_OR_MORE),
            };
            let mut i = info(t, c);
            i.dependencies = Dependencies::LOCAL_VARIABLES;
            i
        }
        K::GlobalVarRef { declared, .. } => {
            let st = declared.unwrap_or(SequenceType::ANY);
            let mut i = info(st.item_type, st.cardinality);
            i.dependencies = Dependencies::GLOBAL_VARIABLES;
            i
        }
        K::Arithmetic { lhs, rhs, calculator, backwards_compatible, .. } => {
            if *backwards_compatible {
                info(ItemType::DOUBLE, Cardinality::EXACTLY_ONE)
            } else {
                let t = calculator.map_or(ItemType::ANY_ATOMIC, |c| ItemType::Atomic(c.result));
                let both_one = arena.cardinality(*lhs) == Cardinality::EXACTLY_ONE
                    && arena.cardinality(*rhs) == Cardinality::EXACTLY_ONE;
                let mut i = info(t, if both_one { Cardinality::EXACTLY_ONE } else { Cardinality::ZERO_OR_ONE });
                if calculator.is_some_and(|c| c.kind == CalculatorKind::TemporalDifference) {
                    i.dependencies |= Dependencies::IMPLICIT_TIMEZONE;
                }
                i
            }
        }
        K::Negate { operand, backwards_compatible } => {
            if *backwards_compatible {
                info(ItemType::DOUBLE, Cardinality::EXACTLY_ONE)
            } else {
                let t = match arena.item_type(*operand).atomized() {
                    ItemType::Atomic(a) if a.is_numeric() => ItemType::Atomic(a),
                    ItemType::Atomic(AtomicType::UntypedAtomic) => ItemType::DOUBLE,
                    _ => ItemType::NUMERIC,
                };
                let c = arena.cardinality(*operand);
                info(t, if c == Cardinality::EXACTLY_ONE { c } else { Cardinality::ZERO_OR_ONE })
            }
        }
        K::Boolean { .. }
        | K::GeneralComparison { .. }
        | K::IntegerRangeTest { .. }
        | K::InstanceOf { .. }
        | K::Castable { .. }
        | K::Quantified { .. } => boolean(),
        K::IsLast { .. } => {
            let mut i = boolean();
            i.dependencies = Dependencies::POSITION | Dependencies::LAST;
            i
        }
        K::ValueComparison { lhs, rhs, result_when_empty, .. } => {
            let both_one = arena.cardinality(*lhs) == Cardinality::EXACTLY_ONE
                && arena.cardinality(*rhs) == Cardinality::EXACTLY_ONE;
            let c = if both_one || result_when_empty.is_some() {
                Cardinality::EXACTLY_ONE
            } else {
                Cardinality::ZERO_OR_ONE
            };
            info(ItemType::BOOLEAN, c)
        }
        K::IdentityComparison { lhs, rhs, .. } => {
            let both_one = arena.cardinality(*lhs) == Cardinality::EXACTLY_ONE
                && arena.cardinality(*rhs) == Cardinality::EXACTLY_ONE;
            info(ItemType::BOOLEAN, if both_one { Cardinality::EXACTLY_ONE } else { Cardinality::ZERO_OR_ONE })
        }
        K::Range { start, end } => {
            let bounds = (arena.kind(*start).as_literal(), arena.kind(*end).as_literal());
            let c = match bounds {
                (Some(s), Some(e)) => match (s.as_singleton(), e.as_singleton()) {
                    (Some(XdmAtomicValue::Integer(a)), Some(XdmAtomicValue::Integer(b))) => {
                        if a > b {
                            Cardinality::EMPTY
                        } else if a == b {
                            Cardinality::EXACTLY_ONE
                        } else {
                            Cardinality::ONE_OR_MORE
                        }
                    }
                    _ => Cardinality::ZERO_OR_MORE,
                },
                _ => Cardinality::ZERO_OR_MORE,
            };
            let mut i = info(if c.is_empty_sequence() { ItemType::Empty } else { ItemType::INTEGER }, c);
            i.properties |= StaticProperty::NOT_UNTYPED_ATOMIC;
            i
        }
        K::Block { children } => {
            let c = children
                .iter()
                .fold(Cardinality::EMPTY, |c, ch| c.sum(arena.cardinality(*ch)));
            let mut i = info(common_type(arena, children), c);
            if children.iter().all(|ch| arena.properties(*ch).contains(StaticProperty::NOT_UNTYPED_ATOMIC)) {
                i.properties |= StaticProperty::NOT_UNTYPED_ATOMIC;
            }
            i
        }
        K::Filter { base, predicate, flags } => {
            let base_card = arena.cardinality(*base);
            let c = if base_card.is_empty_sequence() {
                Cardinality::EMPTY
            } else if base_card.is_at_most_one()
                || flags.contains(FilterFlags::POSITIONAL | FilterFlags::INDEPENDENT_NUMERIC)
            {
                Cardinality::ZERO_OR_ONE
            } else {
                base_card | Cardinality::ALLOWS_ZERO
            };
            let mut i = info(arena.item_type(*base), c);
            i.properties = arena.properties(*base);
            i.dependencies = arena.dependencies(*base) | outer_deps(arena, *predicate);
            return i;
        }
        K::FirstItem { base } | K::LastItem { base } => {
            let bc = arena.cardinality(*base);
            let c = if bc.is_empty_sequence() {
                Cardinality::EMPTY
            } else if bc.allows_zero() {
                Cardinality::ZERO_OR_ONE
            } else {
                Cardinality::EXACTLY_ONE
            };
            let mut i = info(arena.item_type(*base), c);
            i.properties = arena.properties(*base);
            i
        }
        K::Subscript { base, .. } => {
            let mut i = info(arena.item_type(*base), Cardinality::ZERO_OR_ONE);
            i.properties = arena.properties(*base);
            i
        }
        K::Slash { start, step } => {
            let c = arena.cardinality(*start).multiply(arena.cardinality(*step));
            let mut i = info(arena.item_type(*step), c);
            i.properties = node_props(slash_properties(arena, *start, *step));
            i.dependencies = arena.dependencies(*start) | outer_deps(arena, *step);
            return i;
        }
        K::Axis { axis, test } => {
            let c = match axis {
                Axis::SelfAxis | Axis::Parent => Cardinality::ZERO_OR_ONE,
                _ => Cardinality::ZERO_OR_MORE,
            };
            let mut i = info(axis_item_type(*axis, test), c);
            let mut p = StaticProperty::CONTEXT_DOCUMENT_NODESET;
            if !axis.is_reverse() {
                p |= StaticProperty::ORDERED;
            }
            if axis.is_peer() {
                p |= StaticProperty::PEER;
            }
            if axis.is_subtree() {
                p |= StaticProperty::SUBTREE;
            }
            i.properties = node_props(p);
            i.dependencies = Dependencies::CONTEXT_ITEM;
            i
        }
        K::DocumentSorter { operand } => {
            let mut i = info(arena.item_type(*operand), arena.cardinality(*operand));
            i.properties = node_props(arena.properties(*operand) | StaticProperty::ORDERED);
            i
        }
        K::Venn { op, lhs, rhs } => {
            let t = common_type(arena, &[*lhs, *rhs]);
            let c = match op {
                SetOp::Union => arena.cardinality(*lhs).union(arena.cardinality(*rhs)) | Cardinality::ALLOWS_MANY,
                _ => arena.cardinality(*lhs) | Cardinality::ALLOWS_ZERO,
            };
            let both_empty =
                arena.cardinality(*lhs).is_empty_sequence() && arena.cardinality(*rhs).is_empty_sequence();
            let mut i = info(t, if both_empty { Cardinality::EMPTY } else { c });
            i.properties = node_props(StaticProperty::ORDERED);
            i
        }
        K::For { sequence, action, .. } => {
            let c = arena.cardinality(*sequence).multiply(arena.cardinality(*action));
            info(arena.item_type(*action), c)
        }
        K::Let { action, .. } => {
            let mut i = info(arena.item_type(*action), arena.cardinality(*action));
            i.properties = arena.properties(*action);
            i
        }
        K::Conditional { then_branch, else_branch, .. } => {
            let c = arena.cardinality(*then_branch).union(arena.cardinality(*else_branch));
            info(common_type(arena, &[*then_branch, *else_branch]), c)
        }
        K::Cast { operand, target, allows_empty } => {
            let c = if *allows_empty && arena.cardinality(*operand).allows_zero() {
                Cardinality::ZERO_OR_ONE
            } else {
                Cardinality::EXACTLY_ONE
            };
            let mut i = info(ItemType::Atomic(*target), c);
            if *target != AtomicType::UntypedAtomic {
                i.properties |= StaticProperty::NOT_UNTYPED_ATOMIC;
            }
            i
        }
        K::TreatAs { operand, target } => {
            let th = type_hierarchy();
            let supplied = arena.item_type(*operand);
            let t = if th.is_subtype(&supplied, &target.item_type) { supplied } else { target.item_type };
            let c = arena.cardinality(*operand) & target.cardinality;
            info(t, if c.is_empty() { target.cardinality } else { c })
        }
        K::Atomizer { operand } => {
            let t = arena.item_type(*operand).atomized();
            let mut i = info(t, arena.cardinality(*operand));
            if !t.may_be_untyped() {
                i.properties |= StaticProperty::NOT_UNTYPED_ATOMIC;
            }
            i
        }
        K::UntypedConverter { operand, target } => {
            let supplied = arena.item_type(*operand);
            let t = match supplied {
                ItemType::Atomic(AtomicType::UntypedAtomic) => ItemType::Atomic(*target),
                other if other.may_be_untyped() => {
                    type_hierarchy().common_supertype(&other, &ItemType::Atomic(*target))
                }
                other => other,
            };
            let mut i = info(t, arena.cardinality(*operand));
            i.properties |= StaticProperty::NOT_UNTYPED_ATOMIC;
            i
        }
        K::CardinalityChecker { operand, required, .. } => {
            let c = arena.cardinality(*operand) & *required;
            let mut i = info(arena.item_type(*operand), if c.is_empty() { *required } else { c });
            i.properties = arena.properties(*operand);
            i
        }
        K::ItemChecker { operand, required, .. } => {
            let supplied = arena.item_type(*operand);
            let t = if type_hierarchy().is_subtype(&supplied, required) { supplied } else { *required };
            let mut i = info(t, arena.cardinality(*operand));
            i.properties = arena.properties(*operand);
            i
        }
        K::FunctionCall { function, args } => {
            let arg_types: Vec<(ItemType, Cardinality)> =
                args.iter().map(|a| (arena.item_type(*a), arena.cardinality(*a))).collect();
            let (t, c) = function.result_type(&arg_types);
            let mut i = info(t, c);
            i.dependencies = function.intrinsic_dependencies();
            if !t.may_be_untyped() {
                i.properties |= StaticProperty::NOT_UNTYPED_ATOMIC;
            }
            i
        }
    };
    out.dependencies |= deps;
    out
}

fn slash_properties(arena: &ExprArena, start: ExprId, step: ExprId) -> StaticProperty {
    let sp = arena.properties(start);
    let tp = arena.properties(step);
    let start_single = arena.cardinality(start).is_at_most_one();
    let step_ordered = tp.contains(StaticProperty::ORDERED);
    let mut p = StaticProperty::empty();
    if step_ordered && start_single {
        p |= StaticProperty::ORDERED | (tp & (StaticProperty::PEER | StaticProperty::SUBTREE));
    } else if step_ordered && sp.contains(StaticProperty::ORDERED | StaticProperty::PEER) {
        if tp.contains(StaticProperty::PEER | StaticProperty::SUBTREE) {
            p |= StaticProperty::ORDERED | StaticProperty::PEER;
        } else if tp.contains(StaticProperty::SUBTREE) {
            p |= StaticProperty::ORDERED;
        }
    }
    if tp.contains(StaticProperty::SUBTREE) && sp.contains(StaticProperty::SUBTREE) {
        p |= StaticProperty::SUBTREE;
    }
    if sp.contains(StaticProperty::CONTEXT_DOCUMENT_NODESET) {
        p |= StaticProperty::CONTEXT_DOCUMENT_NODESET;
    }
    p
}
