//! Unit tests for error handling.
//!
//! This module contains tests for error types, severities and the
//! diagnostics accumulator.

use crate::errors::diagnostics::Diagnostics;
use crate::errors::errors::{Error, ErrorImpl, ErrorTip, Severity};
use crate::{internal_error, Position};
use std::rc::Rc;

fn position(offset: u32, line: u32) -> Position {
    Position::new(offset, line, Rc::new("test.sp".to_string()))
}

#[test]
fn test_error_creation() {
    let error = Error::new(
        ErrorImpl::UnrecognisedToken {
            token: "@".to_string(),
        },
        position(10, 1),
    );

    assert_eq!(error.get_error_name(), "UnrecognisedToken");
    assert_eq!(error.get_position().offset, 10);
    assert!(error.get_origin().is_none());
}

#[test]
fn test_error_display_has_file_and_line() {
    let error = Error::new(
        ErrorImpl::VariableNotDeclared {
            variable: "x".to_string(),
        },
        position(0, 7),
    );

    assert_eq!(error.to_string(), "test.sp:7: variable \"x\" not declared");
}

#[test]
fn test_error_tip() {
    let error = Error::new(
        ErrorImpl::UnexpectedArguments {
            expected: 2,
            received: 3,
        },
        position(0, 1),
    );

    match error.get_tip() {
        ErrorTip::Suggestion(msg) => assert_eq!(msg, "Expected 2 arguments, received 3"),
        ErrorTip::None => panic!("Expected suggestion tip"),
    }
}

#[test]
fn test_unrecognised_token_has_no_tip() {
    let error = Error::new(
        ErrorImpl::UnrecognisedToken {
            token: "$".to_string(),
        },
        position(0, 1),
    );

    assert!(matches!(error.get_tip(), ErrorTip::None));
}

#[test]
fn test_severity() {
    let syntax = Error::new(ErrorImpl::InconsistentIndentation, position(0, 1));
    let type_error = Error::new(
        ErrorImpl::ConditionNotBool {
            received: "Int".to_string(),
        },
        position(0, 1),
    );
    let internal = internal_error!(
        ErrorImpl::MissingStorage {
            variable: "x".to_string()
        },
        position(0, 1)
    );

    assert_eq!(syntax.severity(), Severity::Syntax);
    assert_eq!(type_error.severity(), Severity::Type);
    assert_eq!(internal.severity(), Severity::Internal);
    assert!(internal.is_internal());
}

#[test]
fn test_internal_error_records_origin() {
    let error = internal_error!(
        ErrorImpl::InternalInvariant {
            message: "boom".to_string()
        },
        position(0, 1)
    );

    let (file, line) = error.get_origin().unwrap();
    assert!(file.ends_with("tests.rs"));
    assert!(line > 0);
}

#[test]
fn test_diagnostics_accumulate_in_order() {
    let mut diagnostics = Diagnostics::new();
    assert!(diagnostics.is_empty());

    diagnostics.report(Error::new(
        ErrorImpl::VariableNotDeclared {
            variable: "a".to_string(),
        },
        position(0, 1),
    ));
    diagnostics.report(Error::new(
        ErrorImpl::VariableNotDeclared {
            variable: "b".to_string(),
        },
        position(4, 2),
    ));

    assert!(diagnostics.has_errors());
    assert_eq!(diagnostics.len(), 2);

    let lines: Vec<u32> = diagnostics
        .into_errors()
        .iter()
        .map(|e| e.get_position().line)
        .collect();
    assert_eq!(lines, vec![1, 2]);
}
