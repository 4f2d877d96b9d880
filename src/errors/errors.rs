use std::fmt::Display;

use thiserror::Error;

use crate::Position;

/// Which phase an error belongs to and how the pipeline reacts to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Lexer and parser errors. Compilation stops at the first one.
    Syntax,
    /// User type errors. Accumulated, the resolver keeps going statement by statement.
    Type,
    /// Violated compiler contracts. Abort immediately.
    Internal,
}

#[derive(Debug, Clone)]
pub struct Error {
    internal_error: ErrorImpl,
    position: Position,
    origin: Option<(&'static str, u32)>,
}

impl Error {
    pub fn new(error_impl: ErrorImpl, position: Position) -> Self {
        Error {
            internal_error: error_impl,
            position,
            origin: None,
        }
    }

    /// Creates an error that records the compiler source location raising it.
    /// Use the `internal_error!` macro instead of calling this directly.
    pub fn internal(error_impl: ErrorImpl, position: Position, file: &'static str, line: u32) -> Self {
        Error {
            internal_error: error_impl,
            position,
            origin: Some((file, line)),
        }
    }

    pub fn get_position(&self) -> &Position {
        &self.position
    }

    pub fn get_kind(&self) -> &ErrorImpl {
        &self.internal_error
    }

    pub fn get_origin(&self) -> Option<(&'static str, u32)> {
        self.origin
    }

    pub fn is_internal(&self) -> bool {
        self.severity() == Severity::Internal
    }

    pub fn severity(&self) -> Severity {
        match &self.internal_error {
            ErrorImpl::UnrecognisedToken { .. }
            | ErrorImpl::UnexpectedToken { .. }
            | ErrorImpl::UnexpectedTokenDetailed { .. }
            | ErrorImpl::NumberParseError { .. }
            | ErrorImpl::UnterminatedString
            | ErrorImpl::InconsistentIndentation
            | ErrorImpl::InvalidAssignmentTarget
            | ErrorImpl::InvalidCallee
            | ErrorImpl::GlobalOutsideFunction
            | ErrorImpl::ReturnOutsideFunction => Severity::Syntax,
            ErrorImpl::UnresolvedType { .. }
            | ErrorImpl::MissingStorage { .. }
            | ErrorImpl::DuplicateDeclaration { .. }
            | ErrorImpl::NoEnclosingScope { .. }
            | ErrorImpl::InternalInvariant { .. }
            | ErrorImpl::MalformedIr { .. }
            | ErrorImpl::HeapFault { .. }
            | ErrorImpl::BackendError { .. } => Severity::Internal,
            _ => Severity::Type,
        }
    }

    pub fn get_error_name(&self) -> &str {
        match &self.internal_error {
            ErrorImpl::UnrecognisedToken { .. } => "UnrecognisedToken",
            ErrorImpl::UnexpectedToken { .. } => "UnexpectedToken",
            ErrorImpl::UnexpectedTokenDetailed { .. } => "UnexpectedTokenDetailed",
            ErrorImpl::NumberParseError { .. } => "NumberParseError",
            ErrorImpl::UnterminatedString => "UnterminatedString",
            ErrorImpl::InconsistentIndentation => "InconsistentIndentation",
            ErrorImpl::InvalidAssignmentTarget => "InvalidAssignmentTarget",
            ErrorImpl::InvalidCallee => "InvalidCallee",
            ErrorImpl::GlobalOutsideFunction => "GlobalOutsideFunction",
            ErrorImpl::ReturnOutsideFunction => "ReturnOutsideFunction",
            ErrorImpl::VariableNotDeclared { .. } => "VariableNotDeclared",
            ErrorImpl::FunctionNotDeclared { .. } => "FunctionNotDeclared",
            ErrorImpl::FunctionAlreadyDeclared { .. } => "FunctionAlreadyDeclared",
            ErrorImpl::UnknownType { .. } => "UnknownType",
            ErrorImpl::TypeAlreadyDeclared { .. } => "TypeAlreadyDeclared",
            ErrorImpl::UnknownField { .. } => "UnknownField",
            ErrorImpl::UnknownMethod { .. } => "UnknownMethod",
            ErrorImpl::UnexpectedArguments { .. } => "UnexpectedArguments",
            ErrorImpl::MissingArguments { .. } => "MissingArguments",
            ErrorImpl::ArgumentTypeMatchError { .. } => "ArgumentTypeMatchError",
            ErrorImpl::FieldTypeMatchError { .. } => "FieldTypeMatchError",
            ErrorImpl::TypeMatchError { .. } => "TypeMatchError",
            ErrorImpl::ReassignmentTypeError { .. } => "ReassignmentTypeError",
            ErrorImpl::GlobalRedeclared { .. } => "GlobalRedeclared",
            ErrorImpl::InvalidOperands { .. } => "InvalidOperands",
            ErrorImpl::InvalidOperand { .. } => "InvalidOperand",
            ErrorImpl::MixedContainer { .. } => "MixedContainer",
            ErrorImpl::InvalidDictKey { .. } => "InvalidDictKey",
            ErrorImpl::UninferableType { .. } => "UninferableType",
            ErrorImpl::ReturnTypeMismatch { .. } => "ReturnTypeMismatch",
            ErrorImpl::ConditionNotBool { .. } => "ConditionNotBool",
            ErrorImpl::NotCallable { .. } => "NotCallable",
            ErrorImpl::NotAValue { .. } => "NotAValue",
            ErrorImpl::NotIndexable { .. } => "NotIndexable",
            ErrorImpl::UnsupportedCapture { .. } => "UnsupportedCapture",
            ErrorImpl::UnresolvedType { .. } => "UnresolvedType",
            ErrorImpl::MissingStorage { .. } => "MissingStorage",
            ErrorImpl::DuplicateDeclaration { .. } => "DuplicateDeclaration",
            ErrorImpl::NoEnclosingScope { .. } => "NoEnclosingScope",
            ErrorImpl::InternalInvariant { .. } => "InternalInvariant",
            ErrorImpl::MalformedIr { .. } => "MalformedIr",
            ErrorImpl::HeapFault { .. } => "HeapFault",
            ErrorImpl::BackendError { .. } => "BackendError",
        }
    }

    pub fn get_tip(&self) -> ErrorTip {
        match &self.internal_error {
            ErrorImpl::UnrecognisedToken { .. } => ErrorTip::None,
            ErrorImpl::UnexpectedToken { token } => {
                ErrorTip::Suggestion(format!("Unexpected token: `{}`", token))
            }
            ErrorImpl::UnexpectedTokenDetailed { token, message } => {
                ErrorTip::Suggestion(format!("Unexpected token: `{}`, {}", token, message))
            }
            ErrorImpl::NumberParseError { token } => ErrorTip::Suggestion(format!(
                "Invalid number: `{}`, is it above the integer limit?",
                token
            )),
            ErrorImpl::UnterminatedString => {
                ErrorTip::Suggestion(String::from("String literal is missing its closing quote"))
            }
            ErrorImpl::InconsistentIndentation => ErrorTip::Suggestion(String::from(
                "Dedent does not match any outer indentation level",
            )),
            ErrorImpl::InvalidAssignmentTarget => ErrorTip::Suggestion(String::from(
                "Only names, fields and indexes can be assigned to",
            )),
            ErrorImpl::InvalidCallee => ErrorTip::Suggestion(String::from(
                "Only named functions, classes and methods can be called",
            )),
            ErrorImpl::GlobalOutsideFunction => ErrorTip::Suggestion(String::from(
                "`global` is only allowed inside a function body",
            )),
            ErrorImpl::ReturnOutsideFunction => ErrorTip::Suggestion(String::from(
                "`return` is only allowed inside a function body",
            )),
            ErrorImpl::VariableNotDeclared { variable } => {
                ErrorTip::Suggestion(format!("Variable `{}` not declared", variable))
            }
            ErrorImpl::FunctionNotDeclared { function } => {
                ErrorTip::Suggestion(format!("Function `{}` not declared", function))
            }
            ErrorImpl::FunctionAlreadyDeclared { function } => {
                ErrorTip::Suggestion(format!("Function `{}` already declared", function))
            }
            ErrorImpl::UnknownType { type_ } => {
                ErrorTip::Suggestion(format!("Unknown type `{}` found", type_))
            }
            ErrorImpl::TypeAlreadyDeclared { type_ } => {
                ErrorTip::Suggestion(format!("`{}` is already defined", type_))
            }
            ErrorImpl::UnknownField { type_, field } => {
                ErrorTip::Suggestion(format!("`{}` has no field `{}`", type_, field))
            }
            ErrorImpl::UnknownMethod { type_, method } => {
                ErrorTip::Suggestion(format!("`{}` has no method `{}`", type_, method))
            }
            ErrorImpl::UnexpectedArguments { expected, received } => ErrorTip::Suggestion(format!(
                "Expected {} arguments, received {}",
                expected, received
            )),
            ErrorImpl::MissingArguments { expected, received } => ErrorTip::Suggestion(format!(
                "Expected {} arguments, received {}",
                expected, received
            )),
            ErrorImpl::ArgumentTypeMatchError { expected, received } => {
                ErrorTip::Suggestion(format!(
                    "Expected argument type `{}`, received `{}`",
                    expected, received
                ))
            }
            ErrorImpl::FieldTypeMatchError { expected, received } => ErrorTip::Suggestion(format!(
                "Expected field type `{}`, received `{}`",
                expected, received
            )),
            ErrorImpl::TypeMatchError { expected, received } => ErrorTip::Suggestion(format!(
                "Expected type `{}`, received `{}`",
                expected, received
            )),
            ErrorImpl::ReassignmentTypeError {
                variable,
                expected,
                received,
            } => ErrorTip::Suggestion(format!(
                "Variable `{}` holds `{}` and cannot be reassigned a `{}`",
                variable, expected, received
            )),
            ErrorImpl::GlobalRedeclared {
                variable,
                line,
                existing,
                received,
            } => ErrorTip::Suggestion(format!(
                "Global `{}` is `{}` since line {}, cannot redeclare it as `{}` here",
                variable, existing, line, received
            )),
            ErrorImpl::InvalidOperands {
                operator,
                left,
                right,
            } => ErrorTip::Suggestion(format!(
                "Operator `{}` cannot be applied to `{}` and `{}`",
                operator, left, right
            )),
            ErrorImpl::InvalidOperand { operator, operand } => ErrorTip::Suggestion(format!(
                "Operator `{}` cannot be applied to `{}`",
                operator, operand
            )),
            ErrorImpl::MixedContainer { expected, received } => ErrorTip::Suggestion(format!(
                "Container elements must share one type: `{}` then `{}`",
                expected, received
            )),
            ErrorImpl::InvalidDictKey { received } => {
                ErrorTip::Suggestion(format!("Dict keys must be `Text`, received `{}`", received))
            }
            ErrorImpl::UninferableType { variable } => ErrorTip::Suggestion(format!(
                "Cannot infer the element type of `{}`, it is never filled",
                variable
            )),
            ErrorImpl::ReturnTypeMismatch { expected, received } => ErrorTip::Suggestion(format!(
                "Function returns `{}` but this return gives `{}`",
                expected, received
            )),
            ErrorImpl::ConditionNotBool { received } => {
                ErrorTip::Suggestion(format!("Condition must be `Bool`, received `{}`", received))
            }
            ErrorImpl::NotCallable { name } => {
                ErrorTip::Suggestion(format!("`{}` cannot be called", name))
            }
            ErrorImpl::NotAValue { name, kind } => {
                ErrorTip::Suggestion(format!("`{}` is a {} and cannot be used as a value", name, kind))
            }
            ErrorImpl::NotIndexable { type_ } => {
                ErrorTip::Suggestion(format!("`{}` cannot be indexed", type_))
            }
            ErrorImpl::UnsupportedCapture { variable } => ErrorTip::Suggestion(format!(
                "Nested functions cannot capture `{}` from the enclosing function",
                variable
            )),
            ErrorImpl::UnresolvedType { context } => {
                ErrorTip::Suggestion(format!("Unresolved type reached {}", context))
            }
            ErrorImpl::MissingStorage { variable } => {
                ErrorTip::Suggestion(format!("No storage was created for `{}`", variable))
            }
            ErrorImpl::DuplicateDeclaration { variable } => {
                ErrorTip::Suggestion(format!("Forced declaration of `{}` collided", variable))
            }
            ErrorImpl::NoEnclosingScope { variable } => {
                ErrorTip::Suggestion(format!("`global {}` has no enclosing scope", variable))
            }
            ErrorImpl::InternalInvariant { message } => ErrorTip::Suggestion(message.clone()),
            ErrorImpl::MalformedIr { message } => ErrorTip::Suggestion(message.clone()),
            ErrorImpl::BackendError { message } => ErrorTip::Suggestion(message.clone()),
            ErrorImpl::HeapFault { message } => ErrorTip::Suggestion(format!(
                "The generated program broke the reference counting protocol: {}",
                message
            )),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: {}",
            self.position.file, self.position.line, self.internal_error
        )
    }
}

pub enum ErrorTip {
    None,
    Suggestion(String),
}

impl Display for ErrorTip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorTip::None => write!(f, ""),
            ErrorTip::Suggestion(suggestion) => write!(f, "{}", suggestion),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ErrorImpl {
    // Syntax
    #[error("unrecognised token: {token:?}")]
    UnrecognisedToken { token: String },
    #[error("unexpected token: {token:?}")]
    UnexpectedToken { token: String },
    #[error("unexpected token ({message:?}): {token:?}")]
    UnexpectedTokenDetailed { token: String, message: String },
    #[error("error parsing number: {token:?}")]
    NumberParseError { token: String },
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("inconsistent indentation")]
    InconsistentIndentation,
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
    #[error("invalid callee")]
    InvalidCallee,
    #[error("global declaration outside of a function")]
    GlobalOutsideFunction,
    #[error("return outside of a function")]
    ReturnOutsideFunction,

    // Type
    #[error("variable {variable:?} not declared")]
    VariableNotDeclared { variable: String },
    #[error("function {function:?} not declared")]
    FunctionNotDeclared { function: String },
    #[error("function {function:?} already declared")]
    FunctionAlreadyDeclared { function: String },
    #[error("unknown type {type_} found")]
    UnknownType { type_: String },
    #[error("type {type_:?} already declared")]
    TypeAlreadyDeclared { type_: String },
    #[error("type {type_} has no field {field:?}")]
    UnknownField { type_: String, field: String },
    #[error("type {type_} has no method {method:?}")]
    UnknownMethod { type_: String, method: String },
    #[error("unexpected arguments: expected {expected:?}, received {received:?}")]
    UnexpectedArguments { expected: usize, received: usize },
    #[error("missing arguments: expected {expected:?}, received {received:?}")]
    MissingArguments { expected: usize, received: usize },
    #[error("argument types do not match: expected {expected:?}, received {received:?}")]
    ArgumentTypeMatchError { expected: String, received: String },
    #[error("field types do not match: expected {expected:?}, received {received:?}")]
    FieldTypeMatchError { expected: String, received: String },
    #[error("types do not match: expected {expected:?}, received {received:?}")]
    TypeMatchError { expected: String, received: String },
    #[error("variable {variable:?} of type {expected} reassigned with {received}")]
    ReassignmentTypeError {
        variable: String,
        expected: String,
        received: String,
    },
    #[error("global {variable:?} redeclared as {received}, already {existing} since line {line}")]
    GlobalRedeclared {
        variable: String,
        line: u32,
        existing: String,
        received: String,
    },
    #[error("operator {operator} not supported for {left} and {right}")]
    InvalidOperands {
        operator: String,
        left: String,
        right: String,
    },
    #[error("operator {operator} not supported for {operand}")]
    InvalidOperand { operator: String, operand: String },
    #[error("container mixes {expected} and {received}")]
    MixedContainer { expected: String, received: String },
    #[error("dict key must be Text, received {received}")]
    InvalidDictKey { received: String },
    #[error("cannot infer type of {variable:?}")]
    UninferableType { variable: String },
    #[error("return type mismatch: expected {expected}, received {received}")]
    ReturnTypeMismatch { expected: String, received: String },
    #[error("condition must be Bool, received {received}")]
    ConditionNotBool { received: String },
    #[error("{name:?} is not callable")]
    NotCallable { name: String },
    #[error("{name:?} is a {kind}, not a value")]
    NotAValue { name: String, kind: String },
    #[error("type {type_} is not indexable")]
    NotIndexable { type_: String },
    #[error("nested function captures {variable:?}")]
    UnsupportedCapture { variable: String },

    // Internal
    #[error("unresolved type reached {context}")]
    UnresolvedType { context: String },
    #[error("no storage for {variable:?}")]
    MissingStorage { variable: String },
    #[error("forced declaration of {variable:?} collided")]
    DuplicateDeclaration { variable: String },
    #[error("global {variable:?} without an enclosing scope")]
    NoEnclosingScope { variable: String },
    #[error("internal invariant violated: {message}")]
    InternalInvariant { message: String },
    #[error("malformed IR: {message}")]
    MalformedIr { message: String },
    #[error("heap fault: {message}")]
    HeapFault { message: String },
    #[error("backend error: {message}")]
    BackendError { message: String },
}
