//! Names and IR signatures of every function the generated code imports
//! from the runtime. Lowering declares them on first use and the
//! interpreter dispatches on the same names.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::{ast::types::Type, ir::ir::ExternDecl, ir::ir::IrType};

pub const KIND_UNKNOWN: i64 = -1;
pub const KIND_INT: i64 = 0;
pub const KIND_FLOAT: i64 = 1;
pub const KIND_BOOL: i64 = 2;
pub const KIND_PTR: i64 = 3;

pub const RT_ALLOC: &str = "rt_alloc";
pub const RT_RETAIN: &str = "rt_retain";
pub const RT_RELEASE: &str = "rt_release";
pub const RT_DATA: &str = "rt_data";
pub const RT_RECLAIM: &str = "rt_reclaim";

pub const RT_PRINT_ERROR: &str = "rt_print_error";
pub const RT_EXIT: &str = "rt_exit";

lazy_static! {
    static ref RUNTIME_FUNCTIONS: HashMap<String, ExternDecl> = {
        use IrType::{Ptr, Void, F64, I1, I64};

        let mut table = vec![
            ("rt_alloc", vec![I64, I64], Ptr),
            ("rt_retain", vec![Ptr], I64),
            ("rt_release", vec![Ptr], I64),
            ("rt_data", vec![Ptr], Ptr),
            ("rt_reclaim", vec![], Void),
            ("rt_str_from_static", vec![Ptr, I64], Ptr),
            ("rt_str_concat", vec![Ptr, Ptr], Ptr),
            ("rt_str_eq", vec![Ptr, Ptr], I1),
            ("rt_str_len", vec![Ptr], I64),
            ("rt_str_from_int", vec![I64], Ptr),
            ("rt_str_from_float", vec![F64], Ptr),
            ("rt_str_from_bool", vec![I1], Ptr),
            ("rt_str_to_int", vec![Ptr], I64),
            ("rt_to_str", vec![Ptr], Ptr),
            ("rt_str_encode", vec![Ptr], Ptr),
            ("rt_str_decode", vec![Ptr], Ptr),
            ("rt_list_new", vec![I64], Ptr),
            ("rt_list_len", vec![Ptr], I64),
            ("rt_list_check", vec![Ptr, I64], I1),
            ("rt_dict_new", vec![I64], Ptr),
            ("rt_dict_len", vec![Ptr], I64),
            ("rt_dict_has", vec![Ptr, Ptr], I1),
            ("rt_int_floordiv", vec![I64, I64], I64),
            ("rt_int_mod", vec![I64, I64], I64),
            ("rt_float_floordiv", vec![F64, F64], F64),
            ("rt_float_mod", vec![F64, F64], F64),
            ("rt_print_int", vec![I64], Void),
            ("rt_print_float", vec![F64], Void),
            ("rt_print_bool", vec![I1], Void),
            ("rt_print_str", vec![Ptr], Void),
            ("rt_print_sep", vec![], Void),
            ("rt_print_newline", vec![], Void),
            ("rt_print_error", vec![Ptr, I64], Void),
            ("rt_exit", vec![I64], Void),
        ]
        .into_iter()
        .map(|(name, params, ret)| (name.to_string(), params, ret))
        .collect::<Vec<_>>();

        for ty in [I64, F64, I1, Ptr] {
            let suffix = element_suffix(ty);
            table.push((format!("rt_list_get_{}", suffix), vec![Ptr, I64], ty));
            table.push((format!("rt_list_set_{}", suffix), vec![Ptr, I64, ty], Void));
            table.push((format!("rt_list_push_{}", suffix), vec![Ptr, ty], Void));
            table.push((format!("rt_list_pop_{}", suffix), vec![Ptr], ty));
            table.push((format!("rt_dict_get_{}", suffix), vec![Ptr, Ptr], ty));
            table.push((format!("rt_dict_set_{}", suffix), vec![Ptr, Ptr, ty], Void));
        }

        table
            .into_iter()
            .map(|(name, params, ret)| (name.clone(), ExternDecl { name, params, ret }))
            .collect()
    };
}

/// Declaration of a runtime function, if `name` is one.
pub fn declaration(name: &str) -> Option<ExternDecl> {
    RUNTIME_FUNCTIONS.get(name).cloned()
}

pub fn is_runtime_function(name: &str) -> bool {
    RUNTIME_FUNCTIONS.contains_key(name)
}

/// Suffix of the typed container helpers, e.g. `rt_list_get_float`.
pub fn element_suffix(ty: IrType) -> &'static str {
    match ty {
        IrType::F64 => "float",
        IrType::I1 => "bool",
        IrType::Ptr => "ptr",
        _ => "int",
    }
}

/// Element kind code passed to `rt_list_new` and `rt_dict_new`.
pub fn element_kind(element: &Type) -> i64 {
    match element {
        Type::Int => KIND_INT,
        Type::Float => KIND_FLOAT,
        Type::Bool => KIND_BOOL,
        Type::Unresolved => KIND_UNKNOWN,
        _ => KIND_PTR,
    }
}
