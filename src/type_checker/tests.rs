//! Unit tests for resolution and inference.

use std::rc::Rc;

use super::type_checker::{type_check, TypedProgram};
use crate::{
    ast::{ast::NodeKind, types::Type},
    errors::errors::{Error, ErrorImpl},
    lexer::lexer::tokenize,
    parser::parser::parse,
};

fn check(source: &str) -> Result<TypedProgram, Vec<Error>> {
    let tokens = tokenize(source.to_string(), Some("test.sp".to_string())).unwrap();
    let ast = parse(tokens, Rc::new("test.sp".to_string())).unwrap();
    type_check(ast)
}

fn global_type(program: &TypedProgram, name: &str) -> Option<Type> {
    program.env.global(name).map(|entry| entry.ty.clone())
}

fn error_kinds(source: &str) -> Vec<ErrorImpl> {
    match check(source) {
        Ok(_) => panic!("expected resolution to fail"),
        Err(errors) => errors.iter().map(|error| error.get_kind().clone()).collect(),
    }
}

#[test]
fn test_global_statement_redirects_to_global_table() {
    let source = "x = 1\ndef f():\n    global x\n    x = 2\n    return x\ny = f()\n";
    let program = check(source).unwrap();

    assert_eq!(global_type(&program, "x"), Some(Type::Int));
    assert_eq!(global_type(&program, "y"), Some(Type::Int));

    let def = program.env.signature("f").unwrap().node;
    assert!(program.ast.scope(def).unwrap().locals.is_empty());
}

#[test]
fn test_inner_global_leaves_outer_local_alone() {
    let source = "x = 0\ndef outer():\n    x = 1\n    def inner():\n        global x\n        x = 2\n    inner()\n    return x\ny = outer()\n";
    let program = check(source).unwrap();

    assert_eq!(global_type(&program, "x"), Some(Type::Int));
    assert_eq!(global_type(&program, "y"), Some(Type::Int));

    let outer = program.env.signature("outer").unwrap().node;
    assert!(program.ast.scope(outer).unwrap().locals.contains_key("x"));
}

#[test]
fn test_assignment_in_function_shadows_global() {
    let source = "x = 1\ndef f():\n    x = \"local\"\n    return x\ny = f()\n";
    let program = check(source).unwrap();

    assert_eq!(global_type(&program, "x"), Some(Type::Int));
    assert_eq!(global_type(&program, "y"), Some(Type::Text));
}

#[test]
fn test_int_binding_widens_to_float() {
    let program = check("x = 1\nx = 2.5\n").unwrap();
    assert_eq!(global_type(&program, "x"), Some(Type::Float));
}

#[test]
fn test_read_before_widening_in_loop_is_float() {
    let source = "x = 0\ni = 0\nwhile i < 2:\n    y = x\n    x = 0.5\n    i += 1\n";
    let program = check(source).unwrap();

    assert_eq!(global_type(&program, "x"), Some(Type::Float));
    assert_eq!(global_type(&program, "y"), Some(Type::Float));
    assert_eq!(global_type(&program, "i"), Some(Type::Int));
}

#[test]
fn test_local_widened_in_loop_types_earlier_reads() {
    let source = "def f():\n    t = 0\n    s = 0.0\n    n = 0\n    while n < 3:\n        s = t\n        t = t + 0.5\n        n += 1\n    return s\nv = f()\n";
    let program = check(source).unwrap();

    assert_eq!(global_type(&program, "v"), Some(Type::Float));
    let def = program.env.signature("f").unwrap().node;
    let locals = &program.ast.scope(def).unwrap().locals;
    assert_eq!(locals["t"].ty, Type::Float);
    assert_eq!(locals["n"].ty, Type::Int);
}

#[test]
fn test_int_store_after_widening_is_rejected() {
    let kinds = error_kinds("x = 1\nx = 2.5\nx = 3\n");

    assert_eq!(kinds.len(), 1);
    assert!(matches!(kinds[0], ErrorImpl::ReassignmentTypeError { .. }));
}

#[test]
fn test_widened_binding_compares_only_with_floats() {
    let kinds = error_kinds("x = 9\nwhile x <= 9:\n    x = x + 0.5\n");
    assert_eq!(kinds.len(), 1);
    assert!(matches!(kinds[0], ErrorImpl::InvalidOperands { .. }));

    let program = check("x = 9\nwhile x <= 9.0:\n    x = x + 0.5\n").unwrap();
    assert_eq!(global_type(&program, "x"), Some(Type::Float));
}

#[test]
fn test_float_binding_rejects_int() {
    let kinds = error_kinds("x = 1.5\nx = 2\n");
    assert!(matches!(kinds[0], ErrorImpl::ReassignmentTypeError { .. }));
}

#[test]
fn test_local_float_binding_rejects_int() {
    let kinds = error_kinds("def f():\n    y = 0.5\n    y = 1\n    return y\nz = f()\n");
    assert!(matches!(kinds[0], ErrorImpl::ReassignmentTypeError { .. }));
}

#[test]
fn test_division_is_always_float() {
    let program = check("a = 4 / 2\nb = 7 // 2\nc = 7 % 2.0\nd = 1 + 2\n").unwrap();

    assert_eq!(global_type(&program, "a"), Some(Type::Float));
    assert_eq!(global_type(&program, "b"), Some(Type::Int));
    assert_eq!(global_type(&program, "c"), Some(Type::Float));
    assert_eq!(global_type(&program, "d"), Some(Type::Int));
}

#[test]
fn test_first_call_fixes_signature() {
    let program = check("def ident(a):\n    return a\nx = ident(1)\ny = ident(2)\n").unwrap();

    let signature = program.env.signature("ident").unwrap();
    assert_eq!(signature.param_types(), Some(&[Type::Int][..]));
    assert_eq!(signature.return_type(), Some(&Type::Int));
    assert_eq!(signature.call_count, 2);
}

#[test]
fn test_later_call_with_other_type_is_rejected() {
    let kinds = error_kinds("def ident(a):\n    return a\nx = ident(1)\ny = ident(\"s\")\n");
    assert!(matches!(kinds[0], ErrorImpl::ArgumentTypeMatchError { .. }));
}

#[test]
fn test_int_argument_accepted_by_float_parameter() {
    let program = check("def half(v):\n    return v / 2\na = half(1.5)\nb = half(3)\n").unwrap();
    assert_eq!(global_type(&program, "b"), Some(Type::Float));
}

#[test]
fn test_recursive_call_uses_in_progress_signature() {
    let source = "def fact(n):\n    if n < 2:\n        return 1\n    return n * fact(n - 1)\nx = fact(5)\n";
    let program = check(source).unwrap();

    assert_eq!(global_type(&program, "x"), Some(Type::Int));
    assert_eq!(program.env.signature("fact").unwrap().call_count, 2);
}

#[test]
fn test_recursive_call_follows_widened_return() {
    let source = "def f(n):\n    if n < 1:\n        return 1\n    return f(n - 1) + 0.5\nx = f(2)\n";
    let program = check(source).unwrap();

    assert_eq!(global_type(&program, "x"), Some(Type::Float));
    assert_eq!(
        program.env.signature("f").unwrap().return_type(),
        Some(&Type::Float)
    );

    let calls = program
        .ast
        .ids()
        .map(|id| &program.ast[id])
        .filter(|node| matches!(node.kind, NodeKind::Call { .. }))
        .filter(|node| node.target.as_deref() == Some("f"))
        .map(|node| node.ty.clone())
        .collect::<Vec<_>>();
    assert_eq!(calls, vec![Type::Float, Type::Float]);
}

#[test]
fn test_recursive_call_with_other_return_is_reported() {
    let source = "def f(n):\n    if n < 1:\n        return \"s\"\n    y = f(n - 1)\n    return 2\nx = f(2)\n";
    let kinds = error_kinds(source);

    assert!(kinds
        .iter()
        .all(|kind| matches!(kind, ErrorImpl::ReturnTypeMismatch { .. })));
    assert!(kinds.contains(&ErrorImpl::ReturnTypeMismatch {
        expected: String::from("Int"),
        received: String::from("Text"),
    }));
}

#[test]
fn test_conflicting_returns_are_reported() {
    let source = "def f(a):\n    if a:\n        return 1\n    return \"s\"\nx = f(True)\n";
    let kinds = error_kinds(source);

    assert_eq!(
        kinds,
        vec![ErrorImpl::ReturnTypeMismatch {
            expected: String::from("Text"),
            received: String::from("Int"),
        }]
    );
}

#[test]
fn test_int_return_widens_into_float_return() {
    let source = "def f(a):\n    if a:\n        return 1\n    return 2.5\nx = f(True)\n";
    let program = check(source).unwrap();

    assert_eq!(global_type(&program, "x"), Some(Type::Float));
}

#[test]
fn test_uncalled_functions_are_pruned() {
    let source = "def dead():\n    return 1\ndef live():\n    return 2\nx = live()\n";
    let program = check(source).unwrap();

    assert_eq!(program.pruned, vec![String::from("dead")]);
    assert!(program.env.signature("dead").is_none());
    assert!(program.env.function("dead").is_none());

    let defs: Vec<_> = program
        .ast
        .module_body()
        .iter()
        .filter_map(|id| match &program.ast[*id].kind {
            NodeKind::FunctionDef(def) => Some(def.name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(defs, vec![String::from("live")]);
}

#[test]
fn test_callee_of_dead_function_is_pruned_too() {
    let source = "def helper():\n    return 1\ndef dead():\n    return helper()\nprint(1)\n";
    let program = check(source).unwrap();

    assert_eq!(program.pruned.len(), 2);
}

#[test]
fn test_dead_function_body_errors_are_not_reported() {
    assert!(check("def dead():\n    return 1 + \"s\"\nprint(1)\n").is_ok());
}

#[test]
fn test_mixed_list_literal_is_rejected() {
    let kinds = error_kinds("xs = [1, 2.0]\n");
    assert!(matches!(kinds[0], ErrorImpl::MixedContainer { .. }));
}

#[test]
fn test_dict_keys_must_be_text() {
    let kinds = error_kinds("d = {1: 2}\n");
    assert!(matches!(kinds[0], ErrorImpl::InvalidDictKey { .. }));
}

#[test]
fn test_empty_list_is_refined_by_append() {
    let program = check("xs = []\nxs.append(1)\ny = xs[0]\n").unwrap();

    assert_eq!(global_type(&program, "xs"), Some(Type::list_of(Type::Int)));
    assert_eq!(global_type(&program, "y"), Some(Type::Int));
}

#[test]
fn test_reading_from_never_filled_list_is_uninferable() {
    let kinds = error_kinds("xs = []\ny = xs[0]\n");
    assert!(matches!(kinds[0], ErrorImpl::UninferableType { .. }));
}

#[test]
fn test_nested_function_cannot_capture() {
    let source = "def outer():\n    a = 1\n    def inner():\n        return a\n    return inner()\nx = outer()\n";
    let kinds = error_kinds(source);

    assert!(kinds
        .iter()
        .any(|kind| matches!(kind, ErrorImpl::UnsupportedCapture { .. })));
}

#[test]
fn test_nested_function_signature_key() {
    let source = "def outer(a):\n    def inner(b):\n        return b + 1\n    return inner(a)\nx = outer(1)\n";
    let program = check(source).unwrap();

    assert!(program.env.signature("outer.inner").is_some());
    assert_eq!(global_type(&program, "x"), Some(Type::Int));
}

#[test]
fn test_init_introduces_fields() {
    let source = "class Box:\n    def __init__(self, v):\n        self.v = v\nb = Box(3)\ny = b.v\n";
    let program = check(source).unwrap();

    assert_eq!(global_type(&program, "b"), Some(Type::Instance(String::from("Box"))));
    assert_eq!(global_type(&program, "y"), Some(Type::Int));
}

#[test]
fn test_methods_receive_instance() {
    let source = "class Counter:\n    count = 0\n    def bump(self, by):\n        self.count = self.count + by\n        return self.count\nc = Counter()\nn = c.bump(2)\n";
    let program = check(source).unwrap();

    assert_eq!(global_type(&program, "n"), Some(Type::Int));
    assert!(program.env.signature("Counter.bump").is_some());
}

#[test]
fn test_unknown_field_outside_init() {
    let source = "class Box:\n    v = 0\nb = Box()\nb.w = 1\n";
    let kinds = error_kinds(source);

    assert!(matches!(kinds[0], ErrorImpl::UnknownField { .. }));
}

#[test]
fn test_struct_literal_fields_are_checked() {
    let ok = check("struct P:\n    x = 0\n    y = 0.0\np = P { y: 1 }\nv = p.y\n").unwrap();
    assert_eq!(global_type(&ok, "v"), Some(Type::Float));

    let kinds = error_kinds("struct P:\n    x = 0\np = P { z: 1 }\n");
    assert!(matches!(kinds[0], ErrorImpl::UnknownField { .. }));

    let kinds = error_kinds("struct P:\n    x = 0\np = P { x: \"s\" }\n");
    assert!(matches!(kinds[0], ErrorImpl::FieldTypeMatchError { .. }));
}

#[test]
fn test_condition_must_be_bool() {
    let kinds = error_kinds("if 1:\n    pass\n");
    assert!(matches!(kinds[0], ErrorImpl::ConditionNotBool { .. }));
}

#[test]
fn test_function_is_not_a_value() {
    let kinds = error_kinds("def f():\n    return 1\ng = f\n");
    assert!(matches!(kinds[0], ErrorImpl::NotAValue { .. }));
}

#[test]
fn test_calling_a_variable_is_rejected() {
    let kinds = error_kinds("x = 1\ny = x(2)\n");
    assert!(matches!(kinds[0], ErrorImpl::NotCallable { .. }));
}

#[test]
fn test_builtins() {
    let program = check("n = len(\"abc\")\ns = str(2.5)\ni = int(\"12\")\nf = float(3)\nbs = s.encode()\nt = bs.decode()\n").unwrap();

    assert_eq!(global_type(&program, "n"), Some(Type::Int));
    assert_eq!(global_type(&program, "s"), Some(Type::Text));
    assert_eq!(global_type(&program, "i"), Some(Type::Int));
    assert_eq!(global_type(&program, "f"), Some(Type::Float));
    assert_eq!(global_type(&program, "bs"), Some(Type::list_of(Type::Int)));
    assert_eq!(global_type(&program, "t"), Some(Type::Text));
}

#[test]
fn test_errors_accumulate_across_statements() {
    let kinds = error_kinds("a = 1 + \"s\"\nb = undefined\nc = 3\n");

    assert_eq!(kinds.len(), 2);
    assert!(matches!(kinds[0], ErrorImpl::InvalidOperands { .. }));
    assert!(matches!(kinds[1], ErrorImpl::VariableNotDeclared { .. }));
}

#[test]
fn test_loop_variable_is_int() {
    let program = check("total = 0\nfor i in range(3):\n    total = total + i\n").unwrap();

    assert_eq!(global_type(&program, "i"), Some(Type::Int));
    assert_eq!(global_type(&program, "total"), Some(Type::Int));
}

#[test]
fn test_duplicate_function_is_rejected() {
    let kinds = error_kinds("def f():\n    pass\ndef f():\n    pass\n");
    assert!(matches!(kinds[0], ErrorImpl::FunctionAlreadyDeclared { .. }));
}
