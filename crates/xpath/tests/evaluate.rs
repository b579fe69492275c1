use std::cell::RefCell;
use std::rc::Rc;

use rstest::{fixture, rstest};
use xpath_core::compiler::{ArithOp, CompareOp};
use xpath_core::compiler::expr::Axis;
use xpath_core::types::{Cardinality, ItemType, NodeTest, SequenceType};
use xpath_core::{
    DynamicContext, DynamicContextBuilder, ExprArena, ExprId, ExpandedName, SimpleNode, StaticContext,
    StaticContextBuilder, XdmAtomicValue, XdmItem, XdmNode, XdmSequence, attr, compile, doc, elem, text,
};

fn run(arena: ExprArena, root: ExprId) -> XdmSequence<SimpleNode> {
    let compiled = compile(arena, root, &StaticContext::default()).unwrap();
    compiled.evaluate(&DynamicContext::default()).unwrap()
}

fn integers(seq: &XdmSequence<SimpleNode>) -> Vec<i64> {
    seq.iter()
        .map(|item| match item {
            XdmItem::Atomic(XdmAtomicValue::Integer(i)) => *i,
            other => panic!("expected an integer, got {other:?}"),
        })
        .collect()
}

fn ints(values: impl IntoIterator<Item = i64>) -> XdmSequence<SimpleNode> {
    values.into_iter().map(|i| XdmItem::Atomic(XdmAtomicValue::Integer(i))).collect()
}

#[fixture]
fn document() -> SimpleNode {
    doc()
        .child(
            elem("root")
                .child(elem("a").attr(attr("id", "1")).child(text("one")))
                .child(elem("a").attr(attr("id", "2")).child(elem("b").child(text("deep"))))
                .child(elem("c")),
        )
        .build()
}

#[rstest]
fn range_filtered_by_position() {
    let mut arena = ExprArena::new();
    let base = arena.range_of(1, 5);
    let pos = arena.fn_call("position", vec![]).unwrap();
    let two = arena.integer(2);
    let pred = arena.general_comparison(CompareOp::Gt, pos, two);
    let filter = arena.filter(base, pred);
    assert_eq!(integers(&run(arena, filter)), vec![3, 4, 5]);
}

#[rstest]
#[case(CompareOp::Gt, 2, vec![30, 40, 50])]
#[case(CompareOp::Ge, 2, vec![20, 30, 40, 50])]
#[case(CompareOp::Lt, 3, vec![10, 20])]
#[case(CompareOp::Eq, 4, vec![40])]
#[case(CompareOp::Ne, 1, vec![20, 30, 40, 50])]
fn variable_filtered_by_position(#[case] op: CompareOp, #[case] n: i64, #[case] expected: Vec<i64>) {
    let items = ExpandedName::local("items");
    let static_ctx = StaticContextBuilder::new()
        .with_variable(items.clone(), SequenceType::new(ItemType::INTEGER, Cardinality::ZERO_OR_MORE))
        .build();
    let mut arena = ExprArena::new();
    let base = arena.global_var(items.clone());
    let pos = arena.fn_call("position", vec![]).unwrap();
    let bound = arena.integer(n);
    let pred = arena.general_comparison(op, pos, bound);
    let filter = arena.filter(base, pred);
    let compiled = compile(arena, filter, &static_ctx).unwrap();
    let dynamic = DynamicContextBuilder::new().with_variable(items, ints([10, 20, 30, 40, 50])).build();
    assert_eq!(integers(&compiled.evaluate(&dynamic).unwrap()), expected);
}

#[rstest]
#[case(&["a", "b"], &["b", "c"], true)]
#[case(&["a", "b"], &["c", "d"], false)]
#[case(&["a"], &["x", "y", "a"], true)]
fn general_equality_of_strings(#[case] lhs: &[&str], #[case] rhs: &[&str], #[case] expected: bool) {
    let mut arena = ExprArena::new();
    let lhs = lhs.iter().map(|s| arena.string(s)).collect();
    let lhs = arena.block(lhs);
    let rhs = rhs.iter().map(|s| arena.string(s)).collect();
    let rhs = arena.block(rhs);
    let eq = arena.general_comparison(CompareOp::Eq, lhs, rhs);
    let compiled = compile(arena, eq, &StaticContext::default()).unwrap();
    assert_eq!(compiled.effective_boolean_value(&DynamicContext::<SimpleNode>::default()).unwrap(), expected);
}

#[rstest]
fn sequence_equals_singleton() {
    let mut arena = ExprArena::new();
    let seq = arena.range_of(1, 3);
    let two = arena.integer(2);
    let eq = arena.general_comparison(CompareOp::Eq, seq, two);
    let result = run(arena, eq);
    assert_eq!(result, vec![XdmItem::Atomic(XdmAtomicValue::Boolean(true))]);
}

/// `1 idiv $z`, with `$z` bound to zero by [`with_zero`].
fn failing_division(arena: &mut ExprArena) -> ExprId {
    let one = arena.integer(1);
    let z = arena.global_var(ExpandedName::local("z"));
    arena.arithmetic(ArithOp::IDiv, one, z)
}

fn with_zero(arena: ExprArena, root: ExprId) -> bool {
    let z = ExpandedName::local("z");
    let static_ctx = StaticContextBuilder::new()
        .with_variable(z.clone(), SequenceType::new(ItemType::INTEGER, Cardinality::EXACTLY_ONE))
        .build();
    let compiled = compile(arena, root, &static_ctx).unwrap();
    let dynamic = DynamicContextBuilder::<SimpleNode>::new().with_variable(z, ints([0])).build();
    compiled.effective_boolean_value(&dynamic).unwrap()
}

#[rstest]
fn sequence_equals_singleton_stops_at_the_match() {
    let mut arena = ExprArena::new();
    let one = arena.integer(1);
    let two = arena.integer(2);
    let failing = failing_division(&mut arena);
    let seq = arena.block(vec![one, two, failing]);
    let target = arena.integer(2);
    let eq = arena.general_comparison(CompareOp::Eq, seq, target);
    assert!(with_zero(arena, eq));
}

#[rstest]
fn sequences_compare_equal_without_reading_past_the_match() {
    let mut arena = ExprArena::new();
    let a = arena.string("a");
    let b = arena.string("b");
    let lhs = arena.block(vec![a, b]);
    let b = arena.string("b");
    let failing = failing_division(&mut arena);
    let failing = arena.fn_call("string", vec![failing]).unwrap();
    let rhs = arena.block(vec![b, failing]);
    let eq = arena.general_comparison(CompareOp::Eq, lhs, rhs);
    assert!(with_zero(arena, eq));
}

#[rstest]
fn untyped_operand_of_arithmetic_becomes_double() {
    let mut arena = ExprArena::new();
    let three = arena.integer(3);
    let two = arena.untyped("2");
    let sum = arena.arithmetic(ArithOp::Plus, three, two);
    assert_eq!(run(arena, sum), vec![XdmItem::Atomic(XdmAtomicValue::Double(5.0))]);
}

#[rstest]
fn untyped_compares_numerically_against_a_number() {
    let mut arena = ExprArena::new();
    let untyped = arena.untyped("10");
    let nine = arena.integer(9);
    let gt = arena.general_comparison(CompareOp::Gt, untyped, nine);
    assert_eq!(run(arena, gt), vec![XdmItem::Atomic(XdmAtomicValue::Boolean(true))]);
}

#[rstest]
fn for_expression_doubles_each_item() {
    let mut arena = ExprArena::new();
    let x = arena.declare_var(ExpandedName::local("x"));
    let seq = arena.range_of(1, 4);
    let x_ref = arena.var_ref(x);
    let two = arena.integer(2);
    let doubled = arena.arithmetic(ArithOp::Times, x_ref, two);
    let for_expr = arena.for_expr(x, seq, doubled);
    assert_eq!(integers(&run(arena, for_expr)), vec![2, 4, 6, 8]);
}

#[rstest]
fn let_binding_is_shared_between_references() {
    let mut arena = ExprArena::new();
    let x = arena.declare_var(ExpandedName::local("x"));
    let seq = arena.range_of(1, 10);
    let count_arg = arena.var_ref(x);
    let count = arena.fn_call("count", vec![count_arg]).unwrap();
    let sum_arg = arena.var_ref(x);
    let sum = arena.fn_call("sum", vec![sum_arg]).unwrap();
    let body = arena.arithmetic(ArithOp::Plus, count, sum);
    let binding = arena.let_expr(x, seq, body);
    assert_eq!(integers(&run(arena, binding)), vec![65]);
}

#[rstest]
fn child_path_selects_elements_in_document_order(document: SimpleNode) {
    let mut arena = ExprArena::new();
    let start = arena.root();
    let root_step = arena.axis(Axis::Child, NodeTest::element("root"));
    let a_step = arena.axis(Axis::Child, NodeTest::element("a"));
    let id_step = arena.axis(Axis::Attribute, NodeTest::attribute("id"));
    let path = arena.path(start, vec![root_step, a_step, id_step]);
    let compiled = compile(arena, path, &StaticContext::default()).unwrap();
    let dynamic = DynamicContextBuilder::new().with_context_item(document).build();
    let ids: Vec<String> = compiled
        .evaluate(&dynamic)
        .unwrap()
        .into_iter()
        .map(|item| match item {
            XdmItem::Node(n) => n.string_value(),
            other => panic!("expected a node, got {other:?}"),
        })
        .collect();
    assert_eq!(ids, vec!["1", "2"]);
}

#[rstest]
fn descendant_path_with_positional_predicate(document: SimpleNode) {
    let mut arena = ExprArena::new();
    let start = arena.root();
    let all_a = arena.axis(Axis::Descendant, NodeTest::element("a"));
    let path = arena.path(start, vec![all_a]);
    let last = arena.fn_call("last", vec![]).unwrap();
    let filter = arena.filter(path, last);
    let compiled = compile(arena, filter, &StaticContext::default()).unwrap();
    let dynamic = DynamicContextBuilder::new().with_context_item(document).build();
    let result = compiled.evaluate(&dynamic).unwrap();
    assert_eq!(result.len(), 1);
    let XdmItem::Node(node) = &result[0] else { panic!("expected a node") };
    assert_eq!(node.string_value(), "deep");
}

#[rstest]
fn stream_yields_items_lazily() {
    let mut arena = ExprArena::new();
    let seq = arena.range_of(1, 1_000_000);
    let compiled = compile(arena, seq, &StaticContext::default()).unwrap();
    let dynamic = DynamicContext::<SimpleNode>::default();
    let first_three: Vec<_> = compiled.evaluate_stream(&dynamic).unwrap().take(3).map(Result::unwrap).collect();
    assert_eq!(first_three, ints([1, 2, 3]));
    let first = compiled.evaluate_first(&dynamic).unwrap();
    assert_eq!(first, Some(XdmItem::Atomic(XdmAtomicValue::Integer(1))));
}

#[rstest]
fn first_item_does_not_evaluate_later_errors() {
    let mut arena = ExprArena::new();
    let one = arena.integer(1);
    let x = arena.declare_var(ExpandedName::local("x"));
    let seq = arena.range_of(0, 2);
    let x_ref = arena.var_ref(x);
    let divide = arena.arithmetic(ArithOp::IDiv, one, x_ref);
    let for_expr = arena.for_expr(x, seq, divide);
    let head = arena.integer(7);
    let block = arena.block(vec![head, for_expr]);
    let compiled = compile(arena, block, &StaticContext::default()).unwrap();
    let dynamic = DynamicContext::<SimpleNode>::default();
    assert_eq!(compiled.evaluate_first(&dynamic).unwrap(), Some(XdmItem::Atomic(XdmAtomicValue::Integer(7))));
    let err = compiled.evaluate(&dynamic).unwrap_err();
    assert_eq!(err.code_str(), "FOAR0001");
}

#[rstest]
fn process_pushes_items_to_a_receiver() {
    let mut arena = ExprArena::new();
    let seq = arena.range_of(4, 6);
    let compiled = compile(arena, seq, &StaticContext::default()).unwrap();
    let sink: Rc<RefCell<Vec<XdmItem<SimpleNode>>>> = Rc::new(RefCell::new(Vec::new()));
    compiled.process(&DynamicContext::default(), sink.clone()).unwrap();
    assert_eq!(*sink.borrow(), ints([4, 5, 6]));
}

#[rstest]
fn effective_boolean_value_of_a_sequence_of_atomics_fails() {
    let mut arena = ExprArena::new();
    let seq = arena.range_of(1, 2);
    let compiled = compile(arena, seq, &StaticContext::default()).unwrap();
    let err = compiled.effective_boolean_value(&DynamicContext::<SimpleNode>::default()).unwrap_err();
    assert_eq!(err.code_str(), "FORG0006");
}
