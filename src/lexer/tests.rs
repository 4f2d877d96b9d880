//! Unit tests for the lexer module.
//!
//! This module contains tests for tokenization including:
//! - Keywords and identifiers
//! - Numeric literals (integers and floats)
//! - String literals with escape sequences
//! - Operators and punctuation
//! - Indentation tokens
//! - Error cases

use super::{lexer::tokenize, tokens::TokenKind};
use crate::errors::errors::ErrorImpl;

fn kinds(source: &str) -> Vec<TokenKind> {
    tokenize(source.to_string(), Some("test.sp".to_string()))
        .unwrap()
        .into_iter()
        .map(|token| token.kind)
        .collect()
}

#[test]
fn test_tokenize_keywords() {
    let source = "def return if elif else while for in global class struct pass and or not True False";
    let tokens = kinds(source);

    assert_eq!(
        tokens,
        vec![
            TokenKind::Def,
            TokenKind::Return,
            TokenKind::If,
            TokenKind::Elif,
            TokenKind::Else,
            TokenKind::While,
            TokenKind::For,
            TokenKind::In,
            TokenKind::Global,
            TokenKind::Class,
            TokenKind::Struct,
            TokenKind::Pass,
            TokenKind::And,
            TokenKind::Or,
            TokenKind::Not,
            TokenKind::True,
            TokenKind::False,
            TokenKind::Newline,
            TokenKind::EOF,
        ]
    );
}

#[test]
fn test_tokenize_identifiers() {
    let source = "foo bar baz_123 _underscore CamelCase".to_string();
    let tokens = tokenize(source, Some("test.sp".to_string())).unwrap();

    assert_eq!(tokens[0].kind, TokenKind::Identifier);
    assert_eq!(tokens[0].value, "foo");
    assert_eq!(tokens[2].value, "baz_123");
    assert_eq!(tokens[3].value, "_underscore");
    assert_eq!(tokens[4].value, "CamelCase");
    assert_eq!(tokens[5].kind, TokenKind::Newline);
    assert_eq!(tokens[6].kind, TokenKind::EOF);
}

#[test]
fn test_tokenize_numbers() {
    let source = "42 3.14 0 100.5".to_string();
    let tokens = tokenize(source, Some("test.sp".to_string())).unwrap();

    let values: Vec<&str> = tokens[..4].iter().map(|t| t.value.as_str()).collect();
    assert_eq!(values, vec!["42", "3.14", "0", "100.5"]);
    assert!(tokens[..4].iter().all(|t| t.kind == TokenKind::Number));
}

#[test]
fn test_tokenize_strings_with_escapes() {
    let source = r#""hello\n" 'it\'s' "tab\there""#.to_string();
    let tokens = tokenize(source, Some("test.sp".to_string())).unwrap();

    assert_eq!(tokens[0].kind, TokenKind::String);
    assert_eq!(tokens[0].value, "hello\n");
    assert_eq!(tokens[1].value, "it's");
    assert_eq!(tokens[2].value, "tab\there");
}

#[test]
fn test_tokenize_operators() {
    let tokens = kinds("== != <= >= += -= *= /= // = < > + - * / % . ; : ,");

    assert_eq!(
        &tokens[..21],
        &[
            TokenKind::Equals,
            TokenKind::NotEquals,
            TokenKind::LessEquals,
            TokenKind::GreaterEquals,
            TokenKind::PlusEquals,
            TokenKind::MinusEquals,
            TokenKind::StarEquals,
            TokenKind::SlashEquals,
            TokenKind::SlashSlash,
            TokenKind::Assignment,
            TokenKind::Less,
            TokenKind::Greater,
            TokenKind::Plus,
            TokenKind::Dash,
            TokenKind::Star,
            TokenKind::Slash,
            TokenKind::Percent,
            TokenKind::Dot,
            TokenKind::Semicolon,
            TokenKind::Colon,
            TokenKind::Comma,
        ]
    );
}

#[test]
fn test_tokenize_comments_are_skipped() {
    let tokens = kinds("x = 1 # trailing\n# whole line\ny = 2\n");

    assert_eq!(
        tokens,
        vec![
            TokenKind::Identifier,
            TokenKind::Assignment,
            TokenKind::Number,
            TokenKind::Newline,
            TokenKind::Identifier,
            TokenKind::Assignment,
            TokenKind::Number,
            TokenKind::Newline,
            TokenKind::EOF,
        ]
    );
}

#[test]
fn test_tokenize_indentation() {
    let tokens = kinds("if x:\n    y = 1\n\n    z = 2\nw = 3\n");

    assert_eq!(
        tokens,
        vec![
            TokenKind::If,
            TokenKind::Identifier,
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::Identifier,
            TokenKind::Assignment,
            TokenKind::Number,
            TokenKind::Newline,
            TokenKind::Identifier,
            TokenKind::Assignment,
            TokenKind::Number,
            TokenKind::Newline,
            TokenKind::Dedent,
            TokenKind::Identifier,
            TokenKind::Assignment,
            TokenKind::Number,
            TokenKind::Newline,
            TokenKind::EOF,
        ]
    );
}

#[test]
fn test_tokenize_closes_indentation_at_eof() {
    let tokens = kinds("def f():\n    if x:\n        pass");
    let dedents = tokens.iter().filter(|k| **k == TokenKind::Dedent).count();

    assert_eq!(dedents, 2);
    assert_eq!(tokens.last(), Some(&TokenKind::EOF));
}

#[test]
fn test_tokenize_newlines_inside_brackets() {
    let tokens = kinds("xs = [1,\n      2]\n");

    assert_eq!(
        tokens,
        vec![
            TokenKind::Identifier,
            TokenKind::Assignment,
            TokenKind::OpenBracket,
            TokenKind::Number,
            TokenKind::Comma,
            TokenKind::Number,
            TokenKind::CloseBracket,
            TokenKind::Newline,
            TokenKind::EOF,
        ]
    );
}

#[test]
fn test_tokenize_tracks_lines() {
    let tokens = tokenize("a\nb\n\nc".to_string(), Some("test.sp".to_string())).unwrap();
    let lines: Vec<u32> = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Identifier)
        .map(|t| t.span.start.line)
        .collect();

    assert_eq!(lines, vec![1, 2, 4]);
}

#[test]
fn test_tokenize_inconsistent_dedent() {
    let result = tokenize("if x:\n    y = 1\n  z = 2\n".to_string(), None);

    let error = result.unwrap_err();
    assert_eq!(error.get_kind(), &ErrorImpl::InconsistentIndentation);
}

#[test]
fn test_tokenize_unrecognised_token() {
    let result = tokenize("x = $".to_string(), None);

    let error = result.unwrap_err();
    assert_eq!(
        error.get_kind(),
        &ErrorImpl::UnrecognisedToken {
            token: String::from("$")
        }
    );
    assert_eq!(error.get_position().offset, 4);
    assert_eq!(error.get_position().file.as_str(), "shell");
}

#[test]
fn test_tokenize_unterminated_string() {
    let result = tokenize("x = \"abc\n".to_string(), None);

    assert_eq!(result.unwrap_err().get_kind(), &ErrorImpl::UnterminatedString);
}
