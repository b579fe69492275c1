//! Construction helpers for expression trees.
//!
//! A front end (or a test) builds the tree bottom-up and hands the root to
//! [`compile`](crate::compile):
//!
//! ```
//! use xpath_core::compiler::{CompareOp, ExprArena};
//!
//! // (1 to 5)[position() > 2]
//! let mut a = ExprArena::new();
//! let one = a.integer(1);
//! let five = a.integer(5);
//! let range = a.range(one, five);
//! let pos = a.fn_call("position", vec![]).unwrap();
//! let two = a.integer(2);
//! let cmp = a.general_comparison(CompareOp::Gt, pos, two);
//! let root = a.filter(range, cmp);
//! assert_eq!(a.kind(root).name(), "filter");
//! ```

use smallvec::SmallVec;

use crate::compiler::arena::ExprArena;
use crate::compiler::expr::{
    Axis, BooleanOp, ComparisonStrategy, ExprId, ExprKind, FilterFlags, NodeCompareOp, Quantifier, SetOp, VarId,
};
use crate::compiler::functions::SystemFunction;
use crate::consts::FNS;
use crate::engine::calculator::ArithOp;
use crate::engine::comparer::{CompareOp, Comparer};
use crate::engine::runtime::Error;
use crate::types::{AtomicType, ItemType, NodeTest, SequenceType};
use crate::xdm::{ExpandedName, GroundedValue, XdmAtomicValue};

impl ExprArena {
    pub fn integer(&mut self, v: i64) -> ExprId {
        self.literal(XdmAtomicValue::Integer(v))
    }

    pub fn double(&mut self, v: f64) -> ExprId {
        self.literal(XdmAtomicValue::Double(v))
    }

    pub fn string(&mut self, v: &str) -> ExprId {
        self.literal(XdmAtomicValue::String(v.to_string()))
    }

    pub fn untyped(&mut self, v: &str) -> ExprId {
        self.literal(XdmAtomicValue::UntypedAtomic(v.to_string()))
    }

    pub fn boolean(&mut self, v: bool) -> ExprId {
        self.literal(XdmAtomicValue::Boolean(v))
    }

    pub fn empty_sequence(&mut self) -> ExprId {
        self.literal(GroundedValue::empty())
    }

    /// Literal integer range `start to end`.
    pub fn range_of(&mut self, start: i64, end: i64) -> ExprId {
        self.literal(GroundedValue::range(start, end))
    }

    pub fn context_item(&mut self) -> ExprId {
        self.add(ExprKind::ContextItem { item_type: ItemType::AnyItem })
    }

    pub fn root(&mut self) -> ExprId {
        self.add(ExprKind::Root)
    }

    pub fn var_ref(&mut self, var: VarId) -> ExprId {
        self.add(ExprKind::LocalVarRef(var))
    }

    /// Reference to an external variable declared in the static context.
    pub fn global_var(&mut self, name: ExpandedName) -> ExprId {
        self.add(ExprKind::GlobalVarRef { name, declared: None })
    }

    pub fn arithmetic(&mut self, op: ArithOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.add(ExprKind::Arithmetic {
            op,
            lhs,
            rhs,
            calculator: None,
            simplified: false,
            backwards_compatible: false,
        })
    }

    pub fn negate(&mut self, operand: ExprId) -> ExprId {
        self.add(ExprKind::Negate { operand, backwards_compatible: false })
    }

    pub fn and(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.add(ExprKind::Boolean { op: BooleanOp::And, lhs, rhs })
    }

    pub fn or(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.add(ExprKind::Boolean { op: BooleanOp::Or, lhs, rhs })
    }

    pub fn value_comparison(&mut self, op: CompareOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.add(ExprKind::ValueComparison { op, lhs, rhs, comparer: Comparer::Dynamic, result_when_empty: None })
    }

    pub fn general_comparison(&mut self, op: CompareOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.add(ExprKind::GeneralComparison {
            op,
            lhs,
            rhs,
            comparer: Comparer::Dynamic,
            strategy: ComparisonStrategy::Unresolved,
            runtime_coercion: true,
        })
    }

    pub fn node_comparison(&mut self, op: NodeCompareOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.add(ExprKind::IdentityComparison { op, lhs, rhs })
    }

    pub fn range(&mut self, start: ExprId, end: ExprId) -> ExprId {
        self.add(ExprKind::Range { start, end })
    }

    /// Comma operator.
    pub fn block(&mut self, children: Vec<ExprId>) -> ExprId {
        self.add(ExprKind::Block { children: SmallVec::from_vec(children) })
    }

    pub fn filter(&mut self, base: ExprId, predicate: ExprId) -> ExprId {
        self.add(ExprKind::Filter { base, predicate, flags: FilterFlags::empty() })
    }

    pub fn slash(&mut self, start: ExprId, step: ExprId) -> ExprId {
        self.add(ExprKind::Slash { start, step })
    }

    pub fn axis(&mut self, axis: Axis, test: NodeTest) -> ExprId {
        self.add(ExprKind::Axis { axis, test })
    }

    /// `start/s1/s2/...`, associating to the left.
    pub fn path(&mut self, start: ExprId, steps: Vec<ExprId>) -> ExprId {
        steps.into_iter().fold(start, |acc, step| self.slash(acc, step))
    }

    pub fn venn(&mut self, op: SetOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.add(ExprKind::Venn { op, lhs, rhs })
    }

    pub fn for_expr(&mut self, var: VarId, sequence: ExprId, action: ExprId) -> ExprId {
        self.add(ExprKind::For { var, sequence, action })
    }

    pub fn let_expr(&mut self, var: VarId, sequence: ExprId, action: ExprId) -> ExprId {
        self.add(ExprKind::Let { var, sequence, action })
    }

    pub fn quantified(&mut self, quantifier: Quantifier, var: VarId, sequence: ExprId, satisfies: ExprId) -> ExprId {
        self.add(ExprKind::Quantified { quantifier, var, sequence, satisfies })
    }

    pub fn conditional(&mut self, condition: ExprId, then_branch: ExprId, else_branch: ExprId) -> ExprId {
        self.add(ExprKind::Conditional { condition, then_branch, else_branch })
    }

    pub fn instance_of(&mut self, operand: ExprId, target: SequenceType) -> ExprId {
        self.add(ExprKind::InstanceOf { operand, target })
    }

    pub fn castable(&mut self, operand: ExprId, target: AtomicType, allows_empty: bool) -> ExprId {
        self.add(ExprKind::Castable { operand, target, allows_empty })
    }

    pub fn cast(&mut self, operand: ExprId, target: AtomicType, allows_empty: bool) -> ExprId {
        self.add(ExprKind::Cast { operand, target, allows_empty })
    }

    pub fn treat_as(&mut self, operand: ExprId, target: SequenceType) -> ExprId {
        self.add(ExprKind::TreatAs { operand, target })
    }

    /// Calls a function by expanded name; unknown names or arities fail with `XPST0017`.
    pub fn call(&mut self, name: &ExpandedName, args: Vec<ExprId>) -> Result<ExprId, Error> {
        let function = SystemFunction::lookup(name, args.len())?;
        Ok(self.function(function, args))
    }

    /// Calls a function in the standard function namespace.
    pub fn fn_call(&mut self, local: &str, args: Vec<ExprId>) -> Result<ExprId, Error> {
        self.call(&ExpandedName::new(Some(FNS), local), args)
    }

    pub fn function(&mut self, function: SystemFunction, args: Vec<ExprId>) -> ExprId {
        self.add(ExprKind::FunctionCall { function, args: SmallVec::from_vec(args) })
    }
}
