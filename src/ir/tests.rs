use pretty_assertions::assert_eq;

use super::{
    builder::Builder,
    interpreter::run,
    ir::{BinaryOp, IrType, Module, Predicate, Value},
};
use crate::runtime::abi::declaration;

fn declare(module: &mut Module, names: &[&str]) {
    for name in names {
        module.declare_extern(declaration(name).unwrap());
    }
}

/// `main` printing `value` with `rt_print_int`.
fn print_int_main(module: &mut Module, build: impl FnOnce(&mut Builder) -> Value) {
    declare(module, &["rt_print_int", "rt_print_newline"]);

    let mut builder = Builder::new("main", vec![], IrType::I32);
    let entry = builder.append_basic_block("entry");
    builder.position_at_end(entry);
    let value = build(&mut builder);
    builder
        .build_call("rt_print_int", vec![value], IrType::Void, "")
        .unwrap();
    builder
        .build_call("rt_print_newline", vec![], IrType::Void, "")
        .unwrap();
    builder.build_return(Some(Value::I32(0))).unwrap();
    module.functions.push(builder.finish().unwrap());
}

#[test]
fn test_entry_allocas_stay_at_the_top() {
    let mut builder = Builder::new("f", vec![], IrType::Void);
    let entry = builder.append_basic_block("entry");
    builder.position_at_end(entry);

    builder
        .build_call("rt_reclaim", vec![], IrType::Void, "")
        .unwrap();
    let slot = builder.build_entry_alloca(IrType::I64, "x").unwrap();
    builder.build_store(slot, Value::Int(1)).unwrap();
    builder.build_return(None).unwrap();

    let function = builder.finish().unwrap();
    let first = function.block(entry).instructions[0];
    assert_eq!(function.inst(first).name, "x");
}

#[test]
fn test_unterminated_block_is_rejected() {
    let mut builder = Builder::new("f", vec![], IrType::Void);
    let entry = builder.append_basic_block("entry");
    builder.position_at_end(entry);
    builder.append_basic_block("dangling");
    builder.build_return(None).unwrap();

    assert!(builder.finish().is_err());
}

#[test]
fn test_instruction_after_terminator_is_rejected() {
    let mut builder = Builder::new("f", vec![], IrType::Void);
    let entry = builder.append_basic_block("entry");
    builder.position_at_end(entry);
    builder.build_return(None).unwrap();

    assert!(builder
        .build_call("rt_reclaim", vec![], IrType::Void, "")
        .is_err());
}

#[test]
fn test_block_names_are_unique() {
    let mut builder = Builder::new("f", vec![], IrType::Void);
    let first = builder.append_basic_block("then");
    let second = builder.append_basic_block("then");

    assert_eq!(builder.function().block(first).name, "then");
    assert_eq!(builder.function().block(second).name, "then.1");
}

#[test]
fn test_display_of_a_module() {
    let mut module = Module::new("demo");
    module.add_global("count", IrType::I64);
    module.add_string("hi\n");
    declare(&mut module, &["rt_print_int"]);

    let mut builder = Builder::new("sp.add", vec![(String::from("a"), IrType::I64)], IrType::I64);
    let entry = builder.append_basic_block("entry");
    builder.position_at_end(entry);
    let sum = builder
        .build_binary(BinaryOp::Add, Value::Param(0), Value::Int(1), "sum")
        .unwrap();
    builder.build_return(Some(sum)).unwrap();
    module.functions.push(builder.finish().unwrap());

    let text = module.to_string();
    assert_eq!(
        text,
        "; ModuleID = 'demo'\n\
         @.str.0 = private constant [3 x i8] c\"hi\\0A\"\n\
         @count = global i64 zeroinitializer\n\
         \n\
         declare void @rt_print_int(i64)\n\
         \n\
         define i64 @sp.add(i64 %a) {\n\
         entry:\n  %sum = add i64 %a, 1\n  ret i64 %sum\n\
         }\n"
    );
}

#[test]
fn test_interpreter_runs_a_loop() {
    let mut module = Module::new("loop");
    print_int_main(&mut module, |builder| {
        let total = builder.build_entry_alloca(IrType::I64, "total").unwrap();
        let i = builder.build_entry_alloca(IrType::I64, "i").unwrap();
        builder.build_store(total, Value::Int(0)).unwrap();
        builder.build_store(i, Value::Int(0)).unwrap();

        let cond = builder.append_basic_block("cond");
        let body = builder.append_basic_block("body");
        let done = builder.append_basic_block("done");
        builder.build_br(cond).unwrap();

        builder.position_at_end(cond);
        let current = builder.build_load(IrType::I64, i, "i.load").unwrap();
        let more = builder
            .build_compare(Predicate::Slt, current, Value::Int(5), "more")
            .unwrap();
        builder.build_cond_br(more, body, done).unwrap();

        builder.position_at_end(body);
        let current = builder.build_load(IrType::I64, i, "i.load").unwrap();
        let sum = builder.build_load(IrType::I64, total, "total.load").unwrap();
        let sum = builder
            .build_binary(BinaryOp::Add, sum, current, "sum")
            .unwrap();
        builder.build_store(total, sum).unwrap();
        let next = builder
            .build_binary(BinaryOp::Add, current, Value::Int(1), "next")
            .unwrap();
        builder.build_store(i, next).unwrap();
        builder.build_br(cond).unwrap();

        builder.position_at_end(done);
        builder.build_load(IrType::I64, total, "result").unwrap()
    });

    let execution = run(&module).unwrap();
    assert_eq!(execution.stdout, "10\n");
    assert_eq!(execution.exit_code, 0);
    assert_eq!(execution.calls("rt_print_int"), 1);
}

#[test]
fn test_interpreter_calls_functions_and_floors_division() {
    let mut module = Module::new("calls");
    declare(&mut module, &["rt_int_floordiv"]);

    let mut half = Builder::new("sp.half", vec![(String::from("n"), IrType::I64)], IrType::I64);
    let entry = half.append_basic_block("entry");
    half.position_at_end(entry);
    let result = half
        .build_call(
            "rt_int_floordiv",
            vec![Value::Param(0), Value::Int(2)],
            IrType::I64,
            "result",
        )
        .unwrap();
    half.build_return(Some(result)).unwrap();
    module.functions.push(half.finish().unwrap());

    print_int_main(&mut module, |builder| {
        builder
            .build_call("sp.half", vec![Value::Int(-7)], IrType::I64, "call")
            .unwrap()
    });

    assert_eq!(run(&module).unwrap().stdout, "-4\n");
}

#[test]
fn test_trap_exits_with_status_one() {
    let mut module = Module::new("trap");
    declare(&mut module, &["rt_int_floordiv"]);
    print_int_main(&mut module, |builder| {
        builder
            .build_call(
                "rt_int_floordiv",
                vec![Value::Int(1), Value::Int(0)],
                IrType::I64,
                "quotient",
            )
            .unwrap()
    });

    let execution = run(&module).unwrap();
    assert_eq!(execution.exit_code, 1);
    assert_eq!(execution.stdout, "");
    assert!(execution.stderr.contains("ZeroDivisionError"));
}

#[test]
fn test_records_store_through_field_addresses() {
    let mut module = Module::new("record");
    declare(&mut module, &["rt_alloc", "rt_data", "rt_retain", "rt_release"]);
    print_int_main(&mut module, |builder| {
        let object = builder
            .build_call("rt_alloc", vec![Value::Int(2), Value::Int(0)], IrType::Ptr, "obj")
            .unwrap();
        builder
            .build_call("rt_retain", vec![object], IrType::I64, "")
            .unwrap();
        let data = builder
            .build_call("rt_data", vec![object], IrType::Ptr, "data")
            .unwrap();
        let second = builder.build_field_addr(data, 1, "field").unwrap();
        builder.build_store(second, Value::Int(42)).unwrap();
        let value = builder.build_load(IrType::I64, second, "value").unwrap();
        builder
            .build_call("rt_release", vec![object], IrType::I64, "")
            .unwrap();
        value
    });

    let execution = run(&module).unwrap();
    assert_eq!(execution.stdout, "42\n");
    assert_eq!(execution.live_blocks, 0);
    assert_eq!(execution.stats.frees, 1);
}

#[test]
fn test_release_of_unretained_block_is_a_fault() {
    let mut module = Module::new("fault");
    declare(&mut module, &["rt_str_from_static", "rt_release"]);
    let text = module.add_string("x");
    print_int_main(&mut module, |builder| {
        let object = builder
            .build_call(
                "rt_str_from_static",
                vec![text, Value::Int(1)],
                IrType::Ptr,
                "text",
            )
            .unwrap();
        builder
            .build_call("rt_release", vec![object], IrType::I64, "count")
            .unwrap()
    });

    assert!(run(&module).is_err());
}
