//! Lowering tests: the shape of the generated IR and what it does when run.

use std::rc::Rc;

use pretty_assertions::assert_eq;

use super::compiler::compile;
use crate::{
    ir::{
        interpreter::{run, Execution},
        ir::{CastOp, Instruction, Module},
    },
    lexer::lexer::tokenize,
    parser::parser::parse,
    type_checker::type_checker::type_check,
};

fn lower(source: &str) -> Module {
    let tokens = tokenize(source.to_string(), Some("test.sp".to_string())).unwrap();
    let ast = parse(tokens, Rc::new("test.sp".to_string())).unwrap();
    let program = type_check(ast).unwrap();
    compile(&program, "test.sp").unwrap()
}

fn execute(source: &str) -> Execution {
    run(&lower(source)).unwrap()
}

fn has_cast(module: &Module, function: &str, op: CastOp) -> bool {
    module
        .function(function)
        .unwrap()
        .instructions()
        .any(|data| matches!(data.inst, Instruction::Cast { op: found, .. } if found == op))
}

#[test]
fn test_int_store_into_widened_global_is_converted() {
    let module = lower("x = 1\nx = 2.5\nprint(x)\n");

    assert!(has_cast(&module, "main", CastOp::SiToFp));
    assert_eq!(run(&module).unwrap().stdout, "2.5\n");
}

#[test]
fn test_read_before_widening_in_loop_is_float() {
    let source = "x = 0\ni = 0\nwhile i < 2:\n    print(x)\n    x = 0.5\n    i += 1\n";
    let module = lower(source);

    assert!(!has_cast(&module, "main", CastOp::FpToSi));
    assert_eq!(run(&module).unwrap().stdout, "0.0\n0.5\n");
}

#[test]
fn test_recursive_call_sees_widened_return() {
    let source = "def f(n):\n    if n < 1:\n        return 1\n    return f(n - 1) + 0.5\nprint(f(2))\n";
    let module = lower(source);

    assert!(module.to_string().contains("define double @sp.f(i64 %n)"));
    assert!(!has_cast(&module, "sp.f", CastOp::FpToSi));
    assert_eq!(run(&module).unwrap().stdout, "2.0\n");
}

#[test]
fn test_loops_in_main_reclaim_each_iteration() {
    let source = "n = 0\nfor i in range(3):\n    n = n + len(str(i))\nwhile n < 5:\n    n = n + len(str(n))\nprint(n)\n";
    let module = lower(source);

    let main = module.function("main").unwrap();
    // One per top-level statement plus one per loop back-edge.
    assert_eq!(main.calls_to("rt_reclaim").count(), 6);

    let execution = run(&module).unwrap();
    assert_eq!(execution.stdout, "5\n");
    assert!(execution.calls("rt_reclaim") > 6);
    assert_eq!(execution.stats.frees, execution.stats.allocations);
    assert_eq!(execution.live_blocks, 0);
}

#[test]
fn test_function_loops_do_not_reclaim() {
    let module = lower("def count(n):\n    t = 0\n    while t < n:\n        t += 1\n    return t\nprint(count(3))\n");

    let count = module.function("sp.count").unwrap();
    assert_eq!(count.calls_to("rt_reclaim").count(), 0);
}

#[test]
fn test_function_signature_uses_inferred_types() {
    let module = lower("def add(a, b):\n    return a + b\nprint(add(1, 2))\n");
    let text = module.to_string();

    assert!(text.contains("define i64 @sp.add(i64 %a, i64 %b)"));
    assert!(text.contains("define i32 @main()"));
    assert_eq!(run(&module).unwrap().stdout, "3\n");
}

#[test]
fn test_pruned_function_is_not_lowered() {
    let module = lower("def dead():\n    return 1\ndef live():\n    return 2\nprint(live())\n");

    assert!(module.function("sp.dead").is_none());
    assert!(module.function("sp.live").is_some());
}

#[test]
fn test_for_loop_counts_from_zero() {
    let module = lower("total = 0\nfor i in range(4):\n    total = total + i\nprint(total)\n");
    let main = module.function("main").unwrap();
    let names = main
        .blocks
        .iter()
        .map(|block| block.name.as_str())
        .collect::<Vec<_>>();

    assert!(names.contains(&"for.cond"));
    assert!(names.contains(&"for.step"));
    assert_eq!(run(&module).unwrap().stdout, "6\n");
}

#[test]
fn test_assigning_loop_variable_does_not_change_iterations() {
    let execution = execute("n = 0\nfor i in range(3):\n    i = 10\n    n = n + 1\nprint(n)\n");
    assert_eq!(execution.stdout, "3\n");
}

#[test]
fn test_division_operators() {
    let execution = execute("print(7 / 2, 7 // 2, -7 // 2, 7.5 // 2)\n");
    assert_eq!(execution.stdout, "3.5 3 -4 3.0\n");
}

#[test]
fn test_text_copies_are_balanced() {
    let module = lower("a = \"x\"\nb = a\nprint(b)\n");

    let main = module.function("main").unwrap();
    assert!(main.calls_to("rt_retain").count() > 0);
    assert!(main.calls_to("rt_release").count() > 0);

    let execution = run(&module).unwrap();
    assert_eq!(execution.stdout, "x\n");
    assert_eq!(execution.exit_code, 0);

    // One block, owned by both globals until main releases them.
    let stats = execution.stats;
    assert_eq!(stats.allocations, 1);
    assert_eq!(stats.peak_count, 2);
    assert_eq!(stats.retains, stats.releases);
    assert_eq!(stats.frees, stats.allocations);
    assert_eq!(execution.live_blocks, 0);
}

#[test]
fn test_overwritten_text_is_freed() {
    let execution = execute("s = \"a\"\ns = s + \"b\"\ns = s + \"c\"\nprint(s)\n");

    assert_eq!(execution.stdout, "abc\n");
    assert_eq!(execution.live_blocks, 0);
}

#[test]
fn test_heap_result_of_call_is_released() {
    let source = "def greet(name):\n    message = \"hi \" + name\n    return message\nprint(greet(\"bob\"))\n";
    let execution = execute(source);

    assert_eq!(execution.stdout, "hi bob\n");
    assert_eq!(execution.live_blocks, 0);
}

#[test]
fn test_list_methods_and_pop_ownership() {
    let execution = execute("xs = [\"a\"]\nxs.append(\"b\")\nlast = xs.pop()\nprint(last, xs, len(xs))\n");

    assert_eq!(execution.stdout, "b ['a'] 1\n");
    assert_eq!(execution.live_blocks, 0);
}

#[test]
fn test_dict_set_and_get() {
    let execution = execute("d = {\"a\": 1}\nd[\"b\"] = 2\nprint(len(d), d[\"b\"], d)\n");
    assert_eq!(execution.stdout, "2 2 {'a': 1, 'b': 2}\n");
}

#[test]
fn test_struct_literal_uses_defaults() {
    let source = "struct Point:\n    x = 0\n    y = 0.0\np = Point { x: 3 }\np.y = 1.5\nprint(p.x, p.y, p)\n";
    let execution = execute(source);

    assert_eq!(execution.stdout, "3 1.5 <Point object>\n");
    assert_eq!(execution.live_blocks, 0);
}

#[test]
fn test_class_construction_runs_init() {
    let source = "class Counter:\n    count = 0\n    def __init__(self, start):\n        self.count = start\n    def bump(self, by):\n        self.count = self.count + by\n        return self.count\nc = Counter(5)\nc.bump(1)\nprint(c.bump(2))\n";
    let execution = execute(source);

    assert_eq!(execution.stdout, "8\n");
    assert_eq!(execution.live_blocks, 0);
}

#[test]
fn test_out_of_range_index_traps() {
    let module = lower("xs = [1]\nprint(xs[3])\nprint(2)\n");
    assert!(module.to_string().contains("unreachable"));

    let execution = run(&module).unwrap();
    assert_eq!(execution.exit_code, 1);
    assert_eq!(execution.stdout, "");
    assert!(execution.stderr.contains("IndexError: list index out of range"));
}

#[test]
fn test_missing_key_traps() {
    let execution = execute("d = {\"a\": 1}\nprint(d[\"z\"])\n");

    assert_eq!(execution.exit_code, 1);
    assert!(execution.stderr.contains("KeyError"));
}

#[test]
fn test_short_circuit_skips_right_side() {
    let source = "def loud():\n    print(\"called\")\n    return True\nok = False and loud()\nprint(ok)\nok = True or loud()\nprint(ok)\n";
    let execution = execute(source);

    assert_eq!(execution.stdout, "False\nTrue\n");
}

#[test]
fn test_text_encode_decode() {
    let execution = execute("bs = \"hi\".encode()\nprint(bs, bs.decode())\n");

    assert_eq!(execution.stdout, "[104, 105] hi\n");
    assert_eq!(execution.live_blocks, 0);
}
