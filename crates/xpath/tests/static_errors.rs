use rstest::rstest;
use xpath_core::compiler::expr::Axis;
use xpath_core::compiler::{ArithOp, CompareOp};
use xpath_core::engine::runtime::ErrorKind;
use xpath_core::types::{AtomicType, ContextItemType, ItemType, NodeTest};
use xpath_core::{
    DynamicContextBuilder, Error, ErrorCode, ExprArena, ExprId, ExpandedName, SimpleNode, StaticContext,
    StaticContextBuilder, XdmAtomicValue, XdmItem, compile,
};

fn compile_error(arena: ExprArena, root: ExprId, static_ctx: &StaticContext) -> Error {
    match compile(arena, root, static_ctx) {
        Ok(compiled) => panic!("expected a static error, compiled to\n{}", compiled.explain()),
        Err(e) => e,
    }
}

#[rstest]
fn string_plus_integer_is_a_type_error() {
    let mut arena = ExprArena::new();
    let a = arena.string("a");
    let one = arena.integer(1);
    let sum = arena.arithmetic(ArithOp::Plus, a, one);
    let err = compile_error(arena, sum, &StaticContext::default());
    assert_eq!(err.code, ErrorCode::XPTY0004);
    assert_eq!(err.kind, ErrorKind::Type);
}

#[rstest]
fn negating_a_string_is_a_type_error() {
    let mut arena = ExprArena::new();
    let a = arena.string("a");
    let neg = arena.negate(a);
    assert_eq!(compile_error(arena, neg, &StaticContext::default()).code, ErrorCode::XPTY0004);
}

#[rstest]
fn comparing_string_with_integer_is_a_type_error() {
    let mut arena = ExprArena::new();
    let a = arena.string("a");
    let one = arena.integer(1);
    let eq = arena.value_comparison(CompareOp::Eq, a, one);
    let err = compile_error(arena, eq, &StaticContext::default());
    assert_eq!(err.code, ErrorCode::XPTY0004);
    assert!(err.message.contains("compare"), "{}", err.message);
}

#[rstest]
fn backwards_compatible_arithmetic_accepts_strings() {
    let mut arena = ExprArena::new();
    let a = arena.string("2");
    let one = arena.integer(1);
    let sum = arena.arithmetic(ArithOp::Plus, a, one);
    let bc = StaticContextBuilder::new().with_backwards_compatible(true).build();
    let compiled = compile(arena, sum, &bc).unwrap();
    let result = compiled.evaluate(&DynamicContextBuilder::<SimpleNode>::new().build()).unwrap();
    assert_eq!(result, vec![XdmItem::Atomic(XdmAtomicValue::Double(3.0))]);
}

#[rstest]
fn undeclared_variable() {
    let mut arena = ExprArena::new();
    let var = arena.global_var(ExpandedName::local("nope"));
    assert_eq!(compile_error(arena, var, &StaticContext::default()).code, ErrorCode::XPST0008);
}

#[rstest]
fn unknown_function_is_rejected_by_the_builder() {
    let mut arena = ExprArena::new();
    let err = arena.fn_call("no-such-function", vec![]).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0017);
}

#[rstest]
#[case::context_item("dot")]
#[case::position("position")]
#[case::axis("axis")]
fn focus_without_context_item(#[case] what: &str) {
    let mut arena = ExprArena::new();
    let root = match what {
        "dot" => arena.context_item(),
        "position" => arena.fn_call("position", vec![]).unwrap(),
        _ => arena.axis(Axis::Child, NodeTest::any_element()),
    };
    let absent = StaticContextBuilder::new().with_context_item_type(ContextItemType::Absent).build();
    assert_eq!(compile_error(arena, root, &absent).code, ErrorCode::XPDY0002);
}

#[rstest]
fn axis_step_on_atomic_context_item() {
    let mut arena = ExprArena::new();
    let step = arena.axis(Axis::Child, NodeTest::any_element());
    let atomic = StaticContextBuilder::new().with_context_item_type(ContextItemType::Known(ItemType::INTEGER)).build();
    assert_eq!(compile_error(arena, step, &atomic).code, ErrorCode::XPTY0020);
}

#[rstest]
#[case(AtomicType::AnyAtomic)]
#[case(AtomicType::Numeric)]
fn cast_to_abstract_type(#[case] target: AtomicType) {
    let mut arena = ExprArena::new();
    let one = arena.integer(1);
    let cast = arena.cast(one, target, false);
    assert_eq!(compile_error(arena, cast, &StaticContext::default()).code, ErrorCode::XPST0080);
}

#[rstest]
fn context_item_of_the_wrong_type_fails_at_evaluation() {
    let mut arena = ExprArena::new();
    let dot = arena.context_item();
    let static_ctx = StaticContextBuilder::new().with_context_item_type(ContextItemType::Known(ItemType::INTEGER)).build();
    let compiled = compile(arena, dot, &static_ctx).unwrap();
    let dynamic = DynamicContextBuilder::<SimpleNode>::new()
        .with_context_item(XdmItem::Atomic(XdmAtomicValue::String("x".into())))
        .build();
    let err = compiled.evaluate(&dynamic).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
    assert_eq!(err.kind, ErrorKind::Dynamic);
}

#[rstest]
fn division_by_zero_is_not_raised_while_compiling() {
    let mut arena = ExprArena::new();
    let one = arena.integer(1);
    let zero = arena.integer(0);
    let div = arena.arithmetic(ArithOp::IDiv, one, zero);
    let compiled = compile(arena, div, &StaticContext::default()).unwrap();
    let err = compiled.evaluate(&DynamicContextBuilder::<SimpleNode>::new().build()).unwrap_err();
    assert_eq!(err.code, ErrorCode::FOAR0001);
}
