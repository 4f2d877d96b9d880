//! Unit tests for the parser module.
//!
//! This module contains tests for parsing various language constructs including:
//! - Assignments and augmented assignments
//! - Function, class and struct definitions
//! - Expressions and precedence
//! - Control flow statements
//! - Grammar errors

use std::rc::Rc;

use super::parser::parse;
use crate::{
    ast::{
        ast::{Ast, NodeId, NodeKind},
        expressions::{BinaryOperator, UnaryOperator},
    },
    errors::errors::{Error, ErrorImpl},
    lexer::lexer::tokenize,
};

fn parse_source(source: &str) -> Result<Ast, Error> {
    let tokens = tokenize(source.to_string(), Some("test.sp".to_string()))?;
    parse(tokens, Rc::new("test.sp".to_string()))
}

fn first_statement(ast: &Ast) -> &NodeKind {
    &ast[ast.module_body()[0]].kind
}

fn assigned_value(ast: &Ast, stmt: NodeId) -> NodeId {
    match &ast[stmt].kind {
        NodeKind::Assign { value, .. } => *value,
        other => panic!("expected assignment, found {:?}", other),
    }
}

#[test]
fn test_parse_assignment() {
    let ast = parse_source("x = 42\n").unwrap();

    let stmt = ast.module_body()[0];
    let NodeKind::Assign { target, value } = &ast[stmt].kind else {
        panic!("expected assignment");
    };
    assert_eq!(
        ast[*target].kind,
        NodeKind::Variable {
            name: String::from("x")
        }
    );
    assert_eq!(ast[*value].kind, NodeKind::IntLiteral(42));
}

#[test]
fn test_parse_float_and_bool_literals() {
    let ast = parse_source("a = 2.5; b = True").unwrap();

    let body = ast.module_body().to_vec();
    assert_eq!(body.len(), 2);
    assert_eq!(ast[assigned_value(&ast, body[0])].kind, NodeKind::FloatLiteral(2.5));
    assert_eq!(ast[assigned_value(&ast, body[1])].kind, NodeKind::BoolLiteral(true));
}

#[test]
fn test_parse_precedence() {
    let ast = parse_source("x = 1 + 2 * 3").unwrap();

    let value = assigned_value(&ast, ast.module_body()[0]);
    let NodeKind::Binary { op, right, .. } = &ast[value].kind else {
        panic!("expected binary expression");
    };
    assert_eq!(*op, BinaryOperator::Add);
    assert!(matches!(
        ast[*right].kind,
        NodeKind::Binary {
            op: BinaryOperator::Multiply,
            ..
        }
    ));
}

#[test]
fn test_parse_not_binds_looser_than_comparison() {
    let ast = parse_source("x = not a == b").unwrap();

    let value = assigned_value(&ast, ast.module_body()[0]);
    let NodeKind::Unary { op, operand } = &ast[value].kind else {
        panic!("expected unary expression");
    };
    assert_eq!(*op, UnaryOperator::Not);
    assert!(matches!(
        ast[*operand].kind,
        NodeKind::Binary {
            op: BinaryOperator::Equal,
            ..
        }
    ));
}

#[test]
fn test_parse_negation_binds_tighter_than_addition() {
    let ast = parse_source("x = -a + b").unwrap();

    let value = assigned_value(&ast, ast.module_body()[0]);
    assert!(matches!(
        ast[value].kind,
        NodeKind::Binary {
            op: BinaryOperator::Add,
            ..
        }
    ));
}

#[test]
fn test_parse_augmented_assignment_is_desugared() {
    let ast = parse_source("x += 2").unwrap();

    let stmt = ast.module_body()[0];
    let NodeKind::Assign { target, value } = &ast[stmt].kind else {
        panic!("expected assignment");
    };
    let NodeKind::Binary { op, left, right } = &ast[*value].kind else {
        panic!("expected binary value");
    };
    assert_eq!(*op, BinaryOperator::Add);
    assert_ne!(left, target);
    assert_eq!(ast[*left].kind, ast[*target].kind);
    assert_eq!(ast[*right].kind, NodeKind::IntLiteral(2));
}

#[test]
fn test_parse_function_definition() {
    let source = "def add(a, b):\n    return a + b\n";
    let ast = parse_source(source).unwrap();

    let NodeKind::FunctionDef(def) = first_statement(&ast) else {
        panic!("expected function definition");
    };
    assert_eq!(def.name, "add");
    assert_eq!(def.params, vec![String::from("a"), String::from("b")]);
    assert_eq!(def.body.len(), 1);
    assert!(ast[ast.module_body()[0]].scope.is_some());
}

#[test]
fn test_parse_single_line_suite() {
    let ast = parse_source("if x: y = 1; z = 2\nw = 3\n").unwrap();

    assert_eq!(ast.module_body().len(), 2);
    let NodeKind::If { branches, .. } = first_statement(&ast) else {
        panic!("expected if statement");
    };
    assert_eq!(branches[0].body.len(), 2);
}

#[test]
fn test_parse_if_elif_else() {
    let source = "if x > 0:\n    pass\nelif x == 0:\n    pass\nelse:\n    y = 1\n";
    let ast = parse_source(source).unwrap();

    let NodeKind::If {
        branches,
        else_body,
    } = first_statement(&ast)
    else {
        panic!("expected if statement");
    };
    assert_eq!(branches.len(), 2);
    assert_eq!(else_body.len(), 1);
}

#[test]
fn test_parse_while_and_for() {
    let source = "while x < 10:\n    x = x + 1\nfor i in range(3):\n    print(i)\n";
    let ast = parse_source(source).unwrap();

    assert!(matches!(first_statement(&ast), NodeKind::While { .. }));
    let NodeKind::For { variable, body, .. } = &ast[ast.module_body()[1]].kind else {
        panic!("expected for loop");
    };
    assert_eq!(variable, "i");
    assert!(matches!(ast[body[0]].kind, NodeKind::Print { .. }));
}

#[test]
fn test_parse_for_requires_range() {
    let error = parse_source("for i in xs:\n    pass\n").unwrap_err();

    assert_eq!(error.get_error_name(), "UnexpectedTokenDetailed");
}

#[test]
fn test_parse_struct_definition_and_literal() {
    let source = "struct Point:\n    x = 0\n    y = 0.0\np = Point { x: 3 }\n";
    let ast = parse_source(source).unwrap();

    let NodeKind::StructDef(def) = first_statement(&ast) else {
        panic!("expected struct definition");
    };
    assert_eq!(def.name, "Point");
    assert_eq!(def.fields.len(), 2);

    let value = assigned_value(&ast, ast.module_body()[1]);
    let NodeKind::StructLiteral { name, fields } = &ast[value].kind else {
        panic!("expected struct literal");
    };
    assert_eq!(name, "Point");
    assert_eq!(fields[0].0, "x");
}

#[test]
fn test_parse_class_with_methods() {
    let source = "class Counter:\n    count = 0\n    def bump(self, by):\n        self.count = self.count + by\nc = Counter()\nc.bump(1)\n";
    let ast = parse_source(source).unwrap();

    let NodeKind::ClassDef(def) = first_statement(&ast) else {
        panic!("expected class definition");
    };
    assert_eq!(def.body.len(), 2);

    let NodeKind::ExprStmt { expr } = &ast[ast.module_body()[2]].kind else {
        panic!("expected expression statement");
    };
    assert!(matches!(
        &ast[*expr].kind,
        NodeKind::MethodCall { method, args, .. } if method == "bump" && args.len() == 1
    ));
}

#[test]
fn test_parse_containers_and_indexing() {
    let source = "xs = [1,\n  2, 3]\nd = {\"a\": 1, \"b\": 2}\nxs[0] = d[\"a\"]\ne = {}\n";
    let ast = parse_source(source).unwrap();

    let body = ast.module_body().to_vec();
    assert!(matches!(&ast[assigned_value(&ast, body[0])].kind, NodeKind::List { elements } if elements.len() == 3));
    assert!(matches!(&ast[assigned_value(&ast, body[1])].kind, NodeKind::Dict { entries } if entries.len() == 2));
    assert!(matches!(&ast[assigned_value(&ast, body[2])].kind, NodeKind::Index { .. }));
    assert!(matches!(&ast[assigned_value(&ast, body[3])].kind, NodeKind::Dict { entries } if entries.is_empty()));
}

#[test]
fn test_parse_links_parents() {
    let ast = parse_source("def f():\n    x = 1\n").unwrap();

    let def = ast.module_body()[0];
    let NodeKind::FunctionDef(function) = &ast[def].kind else {
        panic!("expected function definition");
    };
    let assign = function.body[0];

    assert_eq!(ast.parent(def), Some(ast.root()));
    assert_eq!(ast.parent(assign), Some(def));
    assert_eq!(ast.enclosing_scope(assign), Some(def));
}

#[test]
fn test_parse_statement_lines() {
    let ast = parse_source("a = 1\n\nb = 2\n").unwrap();

    let lines: Vec<u32> = ast.module_body().iter().map(|id| ast[*id].line()).collect();
    assert_eq!(lines, vec![1, 3]);
}

#[test]
fn test_parse_global_outside_function() {
    let error = parse_source("global x\n").unwrap_err();

    assert_eq!(error.get_kind(), &ErrorImpl::GlobalOutsideFunction);
}

#[test]
fn test_parse_return_outside_function() {
    let error = parse_source("return 1\n").unwrap_err();
    assert_eq!(error.get_kind(), &ErrorImpl::ReturnOutsideFunction);

    let source = "def f():\n    class C:\n        return 1\n";
    assert_eq!(
        parse_source(source).unwrap_err().get_kind(),
        &ErrorImpl::ReturnOutsideFunction
    );
}

#[test]
fn test_parse_invalid_assignment_target() {
    let error = parse_source("1 = x\n").unwrap_err();

    assert_eq!(error.get_kind(), &ErrorImpl::InvalidAssignmentTarget);
}

#[test]
fn test_parse_invalid_callee() {
    let error = parse_source("x = (1)(2)\n").unwrap_err();

    assert_eq!(error.get_kind(), &ErrorImpl::InvalidCallee);
}

#[test]
fn test_parse_unexpected_token() {
    let error = parse_source("x = 1 2\n").unwrap_err();

    assert_eq!(error.get_error_name(), "UnexpectedToken");
}

#[test]
fn test_parse_number_overflow() {
    let error = parse_source("x = 99999999999999999999\n").unwrap_err();

    assert_eq!(error.get_error_name(), "NumberParseError");
}

#[test]
fn test_duplicate_parameter_is_rejected() {
    let error = parse_source("def f(a, a):\n    return a\n").unwrap_err();

    assert!(matches!(
        error.get_kind(),
        ErrorImpl::UnexpectedTokenDetailed { message, .. } if message == "duplicate parameter"
    ));
}
