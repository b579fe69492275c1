//! Index arena holding the expression tree.
//!
//! Children are referenced by [`ExprId`]; each node records its parent so that a phase
//! can replace a node in its parent's slot. Static information is computed lazily and
//! cached per node; any structural change clears the cache of the changed node and of
//! all its ancestors.

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use crate::compiler::expr::{ExprId, ExprKind, VarId};
use crate::compiler::properties::{Dependencies, StaticProperty};
use crate::compiler::static_type;
use crate::engine::runtime::Location;
use crate::types::{Cardinality, ItemType, SequenceType};
use crate::xdm::{ExpandedName, GroundedValue};

/// Cached static facts about one expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticInfo {
    pub item_type: ItemType,
    pub cardinality: Cardinality,
    pub properties: StaticProperty,
    pub dependencies: Dependencies,
}

impl StaticInfo {
    pub fn sequence_type(&self) -> SequenceType {
        SequenceType::new(self.item_type, self.cardinality)
    }
}

#[derive(Debug, Clone)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub parent: Option<ExprId>,
    pub location: Option<Location>,
    info: OnceLock<StaticInfo>,
}

#[derive(Debug, Clone)]
pub struct VarInfo {
    pub name: ExpandedName,
}

#[derive(Debug, Clone, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
    vars: Vec<VarInfo>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a node and adopts its children.
    pub fn add(&mut self, kind: ExprKind) -> ExprId {
        self.add_at(kind, None)
    }

    pub fn add_at(&mut self, kind: ExprKind, location: Option<Location>) -> ExprId {
        let id = ExprId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        for child in kind.children() {
            self.nodes[child.index()].parent = Some(id);
        }
        self.nodes.push(ExprNode { kind, parent: None, location, info: OnceLock::new() });
        id
    }

    /// Adds a node that takes the source location of `like`.
    pub fn add_like(&mut self, kind: ExprKind, like: ExprId) -> ExprId {
        let location = self.nodes[like.index()].location.clone();
        self.add_at(kind, location)
    }

    pub fn literal(&mut self, value: impl Into<GroundedValue>) -> ExprId {
        self.add(ExprKind::Literal(value.into()))
    }

    pub fn node(&self, id: ExprId) -> &ExprNode {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.nodes[id.index()].kind
    }

    /// Mutable access to a node; clears the cached static information up the tree.
    pub fn kind_mut(&mut self, id: ExprId) -> &mut ExprKind {
        self.invalidate(id);
        &mut self.nodes[id.index()].kind
    }

    pub fn parent(&self, id: ExprId) -> Option<ExprId> {
        self.nodes[id.index()].parent
    }

    pub fn location(&self, id: ExprId) -> Option<&Location> {
        self.nodes[id.index()].location.as_ref()
    }

    pub fn set_location(&mut self, id: ExprId, location: Location) {
        self.nodes[id.index()].location = Some(location);
    }

    pub fn children(&self, id: ExprId) -> smallvec::SmallVec<[ExprId; 4]> {
        self.kind(id).children()
    }

    pub fn info(&self, id: ExprId) -> &StaticInfo {
        self.nodes[id.index()].info.get_or_init(|| static_type::compute(self, id))
    }

    pub fn item_type(&self, id: ExprId) -> ItemType {
        self.info(id).item_type
    }

    pub fn cardinality(&self, id: ExprId) -> Cardinality {
        self.info(id).cardinality
    }

    pub fn properties(&self, id: ExprId) -> StaticProperty {
        self.info(id).properties
    }

    pub fn dependencies(&self, id: ExprId) -> Dependencies {
        self.info(id).dependencies
    }

    pub(crate) fn invalidate(&mut self, id: ExprId) {
        let mut cur = Some(id);
        while let Some(n) = cur {
            let node = &mut self.nodes[n.index()];
            node.info.take();
            cur = node.parent;
        }
    }

    /// Replaces `old` by `new` in the child slots of `parent`.
    ///
    /// Returns `false` when `old` is not a child of `parent`.
    pub fn replace_sub_expression(&mut self, parent: ExprId, old: ExprId, new: ExprId) -> bool {
        let mut found = false;
        for slot in self.nodes[parent.index()].kind.child_slots_mut() {
            if *slot == old {
                *slot = new;
                found = true;
            }
        }
        if found {
            self.nodes[new.index()].parent = Some(parent);
            self.invalidate(parent);
        }
        found
    }

    /// Puts `new` in the place `old` occupies in its parent, if it has one.
    pub fn replace(&mut self, old: ExprId, new: ExprId) {
        if old == new {
            return;
        }
        match self.parent(old) {
            Some(p) => {
                self.replace_sub_expression(p, old, new);
            }
            None => self.nodes[new.index()].parent = None,
        }
    }

    /// Detaches a node from its parent so it can be adopted elsewhere.
    pub(crate) fn detach(&mut self, id: ExprId) {
        self.nodes[id.index()].parent = None;
    }

    pub fn declare_var(&mut self, name: ExpandedName) -> VarId {
        let id = VarId(u32::try_from(self.vars.len()).unwrap_or(u32::MAX));
        self.vars.push(VarInfo { name });
        id
    }

    pub fn var(&self, var: VarId) -> &VarInfo {
        &self.vars[var.slot()]
    }

    /// Number of frame slots needed to evaluate any tree in this arena.
    pub fn slot_count(&self) -> usize {
        self.vars.len()
    }

    /// Pre-order listing of a subtree.
    pub fn descendants_or_self(&self, id: ExprId) -> Vec<ExprId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            let children = self.children(n);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Whether `id` is `ancestor` or lies below it.
    pub fn is_within(&self, id: ExprId, ancestor: ExprId) -> bool {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    /// The binding node of `var`, searched from a reference upwards.
    pub fn binding_of(&self, reference: ExprId, var: VarId) -> Option<ExprId> {
        let mut cur = self.parent(reference);
        while let Some(n) = cur {
            if self.kind(n).bound_var() == Some(var) {
                return Some(n);
            }
            cur = self.parent(n);
        }
        None
    }

    /// Number of references to `var` inside the subtree at `within`.
    pub fn reference_count(&self, var: VarId, within: ExprId) -> usize {
        self.descendants_or_self(within)
            .into_iter()
            .filter(|n| matches!(self.kind(*n), ExprKind::LocalVarRef(v) if *v == var))
            .count()
    }

    /// Clears cached types of the references to `var`, after its binding sequence changed.
    pub(crate) fn invalidate_references(&mut self, var: VarId, within: ExprId) {
        for n in self.descendants_or_self(within) {
            if matches!(self.kind(n), ExprKind::LocalVarRef(v) if *v == var) {
                self.invalidate(n);
            }
        }
    }

    /// Local variables referenced in the subtree but bound outside it.
    pub fn free_variables(&self, id: ExprId) -> BTreeSet<VarId> {
        let nodes = self.descendants_or_self(id);
        let bound: BTreeSet<VarId> = nodes.iter().filter_map(|n| self.kind(*n).bound_var()).collect();
        nodes
            .iter()
            .filter_map(|n| match self.kind(*n) {
                ExprKind::LocalVarRef(v) if !bound.contains(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// Copies the subtree at `id` into a fresh arena that keeps variable ids.
    pub fn extract(&self, id: ExprId) -> (ExprArena, ExprId) {
        let mut out = ExprArena { nodes: Vec::new(), vars: self.vars.clone() };
        let mut map: HashMap<ExprId, ExprId> = HashMap::new();
        // children are always created before their parent
        let mut order = self.descendants_or_self(id);
        order.reverse();
        for n in order {
            let src = self.node(n);
            let mut kind = src.kind.clone();
            for slot in kind.child_slots_mut() {
                *slot = map[&*slot];
            }
            let new = out.add_at(kind, src.location.clone());
            if let Some(info) = src.info.get() {
                let _ = out.nodes[new.index()].info.set(*info);
            }
            map.insert(n, new);
        }
        let root = map[&id];
        (out, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::calculator::ArithOp;
    use crate::xdm::XdmAtomicValue;

    #[test]
    fn replacing_a_child_clears_ancestor_caches() {
        let mut a = ExprArena::new();
        let one = a.literal(XdmAtomicValue::Integer(1));
        let two = a.literal(XdmAtomicValue::Integer(2));
        let sum = a.arithmetic(ArithOp::Plus, one, two);
        let nothing = a.block(vec![]);
        let seq = a.block(vec![nothing]);
        assert_eq!(a.cardinality(seq), Cardinality::EMPTY);
        let lit = a.literal(XdmAtomicValue::Integer(3));
        a.replace(nothing, lit);
        assert_eq!(a.parent(one), Some(sum));
        assert_eq!(a.parent(lit), Some(seq));
        assert_eq!(a.cardinality(seq), Cardinality::EXACTLY_ONE);
        assert_eq!(a.children(seq).as_slice(), &[lit]);
    }

    #[test]
    fn extract_keeps_shape() {
        let mut a = ExprArena::new();
        let x = a.declare_var(ExpandedName::local("x"));
        let r = a.range_of(1, 3);
        let v = a.var_ref(x);
        let f = a.for_expr(x, r, v);
        let (b, root) = a.extract(f);
        assert_eq!(b.len(), 3);
        assert_eq!(b.kind(root).name(), "for");
        assert_eq!(b.slot_count(), 1);
        assert!(a.free_variables(f).is_empty());
        assert_eq!(a.free_variables(v).into_iter().collect::<Vec<_>>(), vec![x]);
    }
}
