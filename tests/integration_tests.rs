//! Integration tests for end-to-end compilation.
//!
//! Each program goes through tokenizing, parsing, resolution, pruning and
//! lowering, and is then executed by the IR interpreter against the
//! reference runtime.

use pretty_assertions::assert_eq;
use serpent::{
    driver::{compile_source, emit_text, run_source, CompileOptions, Emit},
    errors::errors::ErrorImpl,
    ir::interpreter::Execution,
};

fn options() -> CompileOptions {
    CompileOptions::new("test.sp")
}

fn run(source: &str) -> Execution {
    match run_source(source, &options()) {
        Ok(execution) => execution,
        Err(errors) => panic!("compilation failed: {:?}", errors),
    }
}

/// Runs a program that must finish normally without leaking.
fn output(source: &str) -> String {
    let execution = run(source);
    assert_eq!(execution.exit_code, 0, "stderr: {}", execution.stderr);
    assert_eq!(execution.live_blocks, 0, "leaked blocks");
    execution.stdout
}

#[test]
fn test_global_statement_and_local_shadowing() {
    let source = "\
x = 1
def bump():
    global x
    x = x + 10
    return x
def shadow():
    x = 5
    return x
print(bump(), shadow(), x)
";
    assert_eq!(output(source), "11 5 11\n");
}

#[test]
fn test_int_binding_widens() {
    assert_eq!(output("x = 1\nx = x + 0.5\nprint(x)\n"), "1.5\n");
}

#[test]
fn test_binding_widened_later_in_loop_prints_as_float() {
    let source = "\
x = 0
i = 0
while i < 2:
    print(x)
    x = 0.5
    i += 1
";
    assert_eq!(output(source), "0.0\n0.5\n");
}

#[test]
fn test_loop_condition_reads_widened_binding() {
    let source = "\
x = 9
n = 0
while x <= 9.0 and n < 5:
    x = x + 0.5
    n += 1
print(n, x)
";
    assert_eq!(output(source), "1 9.5\n");
}

#[test]
fn test_recursion_with_widened_return() {
    let source = "\
def f(n):
    if n < 1:
        return 1
    return f(n - 1) + 0.5
print(f(2))
";
    assert_eq!(output(source), "2.0\n");
}

#[test]
fn test_inner_global_does_not_touch_outer_local() {
    let source = "\
x = 0
def outer():
    x = 1
    def inner():
        global x
        x = 2
    inner()
    return x
print(outer() + 2, x)
";
    assert_eq!(output(source), "3 2\n");
}

#[test]
fn test_int_argument_widens_into_float_parameter() {
    let source = "def half(v):\n    return v / 2\nprint(half(1.5), half(3))\n";
    assert_eq!(output(source), "0.75 1.5\n");
}

#[test]
fn test_division_values() {
    let source = "print(1 / 4, 9 // 4, -9 // 4, 9 % 4, -9 % 4, 2.5 // 1)\n";
    assert_eq!(output(source), "0.25 2 -3 1 3 2.0\n");
}

#[test]
fn test_float_division_by_zero_is_infinite() {
    assert_eq!(output("print(1 / 0)\n"), "inf\n");
}

#[test]
fn test_integer_division_by_zero_exits() {
    let execution = run("print(1)\nprint(1 // 0)\nprint(2)\n");

    assert_eq!(execution.exit_code, 1);
    assert_eq!(execution.stdout, "1\n");
    assert!(execution.stderr.contains("ZeroDivisionError"));
}

#[test]
fn test_lazy_inference_and_recursion() {
    let source = "\
def ident(a):
    return a
def fact(n):
    if n < 2:
        return 1
    return n * fact(n - 1)
print(ident(1), ident(2), fact(10))
";
    assert_eq!(output(source), "1 2 3628800\n");
}

#[test]
fn test_pruned_functions_are_absent_from_ir() {
    let source = "def dead():\n    return 1 + \"never checked\"\ndef live():\n    return 2\nprint(live())\n";
    let text = emit_text(source, &options(), Emit::Ir).unwrap();

    assert!(text.contains("@sp.live"));
    assert!(!text.contains("@sp.dead"));
}

#[test]
fn test_text_copies_balance() {
    let execution = run("a = \"x\"\nb = a\nprint(a, b)\n");

    assert_eq!(execution.stdout, "x x\n");
    assert_eq!(execution.stats.peak_count, 2);
    assert_eq!(execution.stats.retains, execution.stats.releases);
    assert_eq!(execution.stats.frees, execution.stats.allocations);
    assert_eq!(execution.live_blocks, 0);
}

#[test]
fn test_text_built_in_loop_balances() {
    let source = "s = \"\"\nfor i in range(5):\n    s = s + str(i)\nprint(s, len(s))\n";
    assert_eq!(output(source), "01234 5\n");
}

#[test]
fn test_list_returned_from_function_balances() {
    let source = "\
def make(n):
    xs = []
    for i in range(n):
        xs.append(str(i))
    return xs
ys = make(3)
print(ys, len(ys))
";
    assert_eq!(output(source), "['0', '1', '2'] 3\n");
}

#[test]
fn test_instances_with_text_fields_balance() {
    let source = "\
class Greeter:
    name = \"\"
    def __init__(self, name):
        self.name = name
    def greet(self, other):
        return \"hi \" + other + \" from \" + self.name
g = Greeter(\"ann\")
print(g.greet(\"bob\"))
g = Greeter(\"cy\")
print(g.name, g)
";
    assert_eq!(output(source), "hi bob from ann\ncy <Greeter object>\n");
}

#[test]
fn test_while_loop() {
    let source = "\
a = 0
b = 1
n = 0
while n < 10:
    t = a + b
    a = b
    b = t
    n += 1
print(a)
";
    assert_eq!(output(source), "55\n");
}

#[test]
fn test_conversions() {
    let source = "print(int(\"12\") + 1, float(3), str(2.5) + \"!\", str(True))\n";
    assert_eq!(output(source), "13 3.0 2.5! True\n");
}

#[test]
fn test_dicts_hold_text_values() {
    let source = "d = {\"a\": \"x\"}\nd[\"a\"] = \"y\"\nd[\"b\"] = \"z\"\nprint(d[\"a\"], len(d))\n";
    assert_eq!(output(source), "y 2\n");
}

#[test]
fn test_mixed_list_is_rejected() {
    let errors = compile_source("xs = [1, 2.0]\n", &options()).unwrap_err();
    assert!(matches!(
        errors[0].get_kind(),
        ErrorImpl::MixedContainer { .. }
    ));
}

#[test]
fn test_index_out_of_range_exits_with_one() {
    let execution = run("xs = [1, 2]\nprint(xs[1])\nprint(xs[2])\n");

    assert_eq!(execution.exit_code, 1);
    assert_eq!(execution.stdout, "2\n");
    assert!(execution.stderr.contains("IndexError: list index out of range"));
}

#[test]
fn test_pop_from_empty_list_exits_with_one() {
    let execution = run("xs = [1]\na = xs.pop()\nb = xs.pop()\n");

    assert_eq!(execution.exit_code, 1);
    assert!(execution.stderr.contains("IndexError: pop from empty list"));
}

#[test]
fn test_syntax_error_is_reported() {
    let errors = compile_source("x = (1 +\n", &options()).unwrap_err();
    assert!(!errors.is_empty());
}
