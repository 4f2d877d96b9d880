use pretty_assertions::assert_eq;

use super::{
    abi::{declaration, element_kind, KIND_PTR, KIND_UNKNOWN},
    heap::{
        floor_div, floor_mod, format_float, ElementKind, Heap, HeapError, HeapStats, Payload, Word,
    },
};
use crate::{ast::types::Type, ir::ir::IrType};

#[test]
fn test_release_to_zero_frees_once() {
    let mut heap = Heap::new();
    let text = heap.alloc_text(String::from("x"));

    assert_eq!(heap.retain(text), Ok(1));
    assert_eq!(heap.retain(text), Ok(2));
    assert_eq!(heap.release(text), Ok(1));
    assert!(heap.is_live(text));
    assert_eq!(heap.release(text), Ok(0));
    assert!(!heap.is_live(text));

    assert_eq!(
        heap.stats(),
        HeapStats {
            allocations: 1,
            retains: 2,
            releases: 2,
            frees: 1,
            peak_count: 2,
        }
    );
}

#[test]
fn test_double_free_is_detected() {
    let mut heap = Heap::new();
    let text = heap.alloc_text(String::from("x"));
    heap.retain(text).unwrap();
    heap.release(text).unwrap();

    assert_eq!(heap.release(text), Err(HeapError::UseAfterFree(text.0)));
    assert_eq!(heap.stats().frees, 1);
}

#[test]
fn test_release_without_retain_underflows() {
    let mut heap = Heap::new();
    let text = heap.alloc_text(String::from("x"));

    assert_eq!(heap.release(text), Err(HeapError::Underflow(text.0)));
}

#[test]
fn test_reclaim_frees_only_fresh_blocks() {
    let mut heap = Heap::new();
    let kept = heap.alloc_text(String::from("kept"));
    let temporary = heap.alloc_text(String::from("temporary"));
    heap.retain(kept).unwrap();

    assert_eq!(heap.reclaim(), Ok(1));
    assert!(heap.is_live(kept));
    assert!(!heap.is_live(temporary));
    assert_eq!(heap.reclaim(), Ok(0));
}

#[test]
fn test_freeing_a_container_releases_children() {
    let mut heap = Heap::new();
    let child = heap.alloc_text(String::from("a"));
    let list = heap.alloc(Payload::List {
        kind: ElementKind::Ptr,
        elements: vec![],
    });

    heap.retain(child).unwrap();
    heap.list_push(list, Word::Ref(child)).unwrap();
    heap.retain(list).unwrap();
    heap.release(list).unwrap();

    assert!(!heap.is_live(child));
    assert_eq!(heap.live_blocks(), 0);
}

#[test]
fn test_list_set_releases_replaced_element() {
    let mut heap = Heap::new();
    let first = heap.alloc_text(String::from("a"));
    let second = heap.alloc_text(String::from("b"));
    let list = heap.alloc(Payload::List {
        kind: ElementKind::Unknown,
        elements: vec![],
    });

    heap.retain(first).unwrap();
    heap.list_push(list, Word::Ref(first)).unwrap();
    heap.retain(second).unwrap();
    heap.list_set(list, -1, Word::Ref(second)).unwrap();

    assert!(!heap.is_live(first));
    assert_eq!(heap.list_get(list, 0), Ok(Word::Ref(second)));
    assert_eq!(heap.list_kind(list), Ok(ElementKind::Ptr));
}

#[test]
fn test_negative_indexes_count_from_the_end() {
    let mut heap = Heap::new();
    let list = heap.alloc(Payload::List {
        kind: ElementKind::Int,
        elements: vec![Word::Int(1), Word::Int(2)],
    });

    assert_eq!(heap.list_check(list, -2), Ok(true));
    assert_eq!(heap.list_check(list, -3), Ok(false));
    assert_eq!(heap.list_check(list, 2), Ok(false));
    assert_eq!(heap.list_get(list, -1), Ok(Word::Int(2)));
}

#[test]
fn test_display_of_containers() {
    let mut heap = Heap::new();
    let text = heap.alloc_text(String::from("k"));
    let list = heap.alloc(Payload::List {
        kind: ElementKind::Ptr,
        elements: vec![Word::Ref(text)],
    });
    let dict = heap.alloc(Payload::Dict {
        kind: ElementKind::Float,
        entries: vec![(String::from("a"), Word::Float(1.0)), (String::from("b"), Word::Float(0.5))],
    });

    assert_eq!(heap.display(Word::Ref(text), false), Ok(String::from("k")));
    assert_eq!(heap.display(Word::Ref(list), false), Ok(String::from("['k']")));
    assert_eq!(heap.display(Word::Ref(dict), false), Ok(String::from("{'a': 1.0, 'b': 0.5}")));
}

#[test]
fn test_python_division_semantics() {
    assert_eq!(floor_div(7, 2), Ok(3));
    assert_eq!(floor_div(-7, 2), Ok(-4));
    assert_eq!(floor_mod(-7, 2), Ok(1));
    assert!(matches!(floor_div(1, 0), Err(HeapError::Trap(_))));
}

#[test]
fn test_float_formatting() {
    assert_eq!(format_float(2.0), "2.0");
    assert_eq!(format_float(0.1), "0.1");
    assert_eq!(format_float(-1.5), "-1.5");
    assert_eq!(format_float(f64::INFINITY), "inf");
}

#[test]
fn test_abi_table() {
    let alloc = declaration("rt_alloc").unwrap();
    assert_eq!(alloc.params, vec![IrType::I64, IrType::I64]);
    assert_eq!(alloc.ret, IrType::Ptr);

    let get = declaration("rt_dict_get_float").unwrap();
    assert_eq!(get.params, vec![IrType::Ptr, IrType::Ptr]);
    assert_eq!(get.ret, IrType::F64);

    assert!(declaration("printf").is_none());
    assert_eq!(element_kind(&Type::Text), KIND_PTR);
    assert_eq!(element_kind(&Type::Unresolved), KIND_UNKNOWN);
}
