use std::collections::HashMap;

use crate::compiler::arena::ExprArena;
use crate::compiler::expr::{ExprId, ExprKind, VarId};

impl ExprArena {
    /// Deep copy of the subtree at `id`, returned detached.
    ///
    /// Variables bound inside the subtree are redeclared and the copied references
    /// follow them; references to variables bound outside keep pointing there.
    pub fn copy(&mut self, id: ExprId) -> ExprId {
        let mut renamed = HashMap::new();
        self.copy_node(id, &mut renamed)
    }

    fn copy_node(&mut self, id: ExprId, renamed: &mut HashMap<VarId, VarId>) -> ExprId {
        let mut kind = self.kind(id).clone();
        if let Some(old) = kind.bound_var() {
            let name = self.var(old).name.clone();
            let fresh = self.declare_var(name);
            renamed.insert(old, fresh);
            match &mut kind {
                ExprKind::For { var, .. } | ExprKind::Let { var, .. } | ExprKind::Quantified { var, .. } => {
                    *var = fresh;
                }
                _ => {}
            }
        }
        if let ExprKind::LocalVarRef(v) = &mut kind {
            if let Some(fresh) = renamed.get(v) {
                *v = *fresh;
            }
        }
        for slot in kind.child_slots_mut() {
            *slot = self.copy_node(*slot, renamed);
        }
        self.add_like(kind, id)
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::arena::ExprArena;
    use crate::compiler::expr::ExprKind;
    use crate::engine::calculator::ArithOp;
    use crate::xdm::ExpandedName;

    #[test]
    fn copies_rebind_inner_variables() {
        let mut a = ExprArena::new();
        let outer = a.declare_var(ExpandedName::local("o"));
        let x = a.declare_var(ExpandedName::local("x"));
        let seq = a.range_of(1, 3);
        let rx = a.var_ref(x);
        let ro = a.var_ref(outer);
        let sum = a.arithmetic(ArithOp::Plus, rx, ro);
        let f = a.for_expr(x, seq, sum);

        let c = a.copy(f);
        assert_ne!(c, f);
        assert_eq!(a.parent(c), None);
        let ExprKind::For { var, action, .. } = a.kind(c).clone() else { panic!("not a for") };
        assert_ne!(var, x);
        assert_eq!(a.var(var).name, ExpandedName::local("x"));
        assert_eq!(a.reference_count(var, action), 1);
        assert_eq!(a.reference_count(outer, c), 1);
        assert_eq!(a.reference_count(x, c), 0);
        assert_eq!(a.reference_count(x, f), 1);
    }

    #[test]
    fn mutating_a_copy_leaves_the_original() {
        let mut a = ExprArena::new();
        let one = a.integer(1);
        let two = a.integer(2);
        let block = a.block(vec![one, two]);
        let c = a.copy(block);
        let three = a.integer(3);
        let first_copy = a.children(c)[0];
        a.replace(first_copy, three);
        assert_eq!(a.children(block).as_slice(), &[one, two]);
        assert_eq!(a.children(c)[0], three);
    }
}
