//! Parser implementation for building the Abstract Syntax Tree.
//!
//! This module contains the main Parser struct and parsing functions.
//! The parser uses a Pratt parser approach with NUD/LED handlers for
//! expression parsing and specialized functions for statement parsing.
//!
//! It maintains lookup tables for:
//! - Statement handlers
//! - NUD (null denotation) handlers for prefix expressions
//! - LED (left denotation) handlers for infix expressions
//! - Binding powers for operator precedence
//!
//! Nodes are appended to an [`Ast`] arena owned by the parser; parent links
//! are filled once the whole module has been parsed.

use std::{collections::HashMap, rc::Rc};

use crate::{
    ast::ast::{Ast, NodeId, NodeKind},
    errors::errors::{Error, ErrorImpl},
    lexer::tokens::{Token, TokenKind},
    Position, Span,
};

use super::{
    lookups::{
        create_token_lookups, BPLookup, BindingPower, LEDHandler, LEDLookup, NUDHandler, NUDLookup,
        StmtHandler, StmtLookup,
    },
    stmt::parse_stmt,
};

/// The main parser structure that maintains parsing state.
///
/// This struct holds the token stream and maintains lookup tables for
/// parsing statements and expressions. It tracks the current position in
/// the token stream and provides methods for token consumption.
pub struct Parser {
    /// The list of tokens to parse
    tokens: Vec<Token>,
    /// Current position in the token stream
    pos: usize,
    /// The name of the source file being parsed
    file: Rc<String>,
    /// Lookup table for statement parsing handlers
    stmt_lookup: StmtLookup,
    /// Lookup table for null denotation (prefix) expression handlers
    nud_lookup: NUDLookup,
    /// Lookup table for left denotation (infix) expression handlers
    led_lookup: LEDLookup,
    /// Lookup table for expression binding powers (precedence)
    binding_power_lookup: BPLookup,
    /// Arena receiving every parsed node
    pub ast: Ast,
    /// Number of enclosing `def` bodies, `global` and `return` need one
    pub function_depth: u32,
    /// End of the most recently consumed token
    last_end: Position,
}

impl Parser {
    /// Creates a new Parser instance.
    ///
    /// # Arguments
    ///
    /// * `tokens` - Vector of tokens to parse, terminated by `EOF`
    /// * `file` - Reference-counted string containing the source file name
    pub fn new(tokens: Vec<Token>, file: Rc<String>) -> Self {
        Parser {
            tokens,
            pos: 0,
            last_end: Position::new(0, 1, Rc::clone(&file)),
            file,
            stmt_lookup: HashMap::new(),
            nud_lookup: HashMap::new(),
            led_lookup: HashMap::new(),
            binding_power_lookup: HashMap::new(),
            ast: Ast::new(),
            function_depth: 0,
        }
    }

    /// Returns the current token without advancing. Past the end this keeps
    /// returning the final `EOF` token.
    pub fn current_token(&self) -> &Token {
        let index = self.pos.min(self.tokens.len().saturating_sub(1));
        &self.tokens[index]
    }

    /// Returns the kind of the current token.
    pub fn current_token_kind(&self) -> TokenKind {
        if self.tokens.is_empty() {
            return TokenKind::EOF;
        }
        self.current_token().kind
    }

    /// Returns the kind of the token after the current one.
    pub fn peek_kind(&self) -> TokenKind {
        self.tokens
            .get(self.pos + 1)
            .map(|token| token.kind)
            .unwrap_or(TokenKind::EOF)
    }

    /// Returns the kind of the most recently consumed token.
    pub fn previous_kind(&self) -> Option<TokenKind> {
        self.pos
            .checked_sub(1)
            .and_then(|index| self.tokens.get(index))
            .map(|token| token.kind)
    }

    /// Advances to the next token and returns the previous token.
    pub fn advance(&mut self) -> Token {
        let token = self.current_token().clone();
        self.last_end = token.span.end.clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Expects a token of the specified kind, with optional custom error.
    ///
    /// # Returns
    ///
    /// Returns Ok(Token) if the current token matches, otherwise returns an Error.
    pub fn expect_error(
        &mut self,
        expected_kind: TokenKind,
        error: Option<Error>,
    ) -> Result<Token, Error> {
        let token = self.current_token();
        if token.kind != expected_kind {
            match error {
                Some(error) => Err(error),
                None => Err(Error::new(
                    ErrorImpl::UnexpectedTokenDetailed {
                        token: token.value.clone(),
                        message: format!("expected {}", expected_kind),
                    },
                    token.span.start.clone(),
                )),
            }
        } else {
            Ok(self.advance())
        }
    }

    /// Expects a token of the specified kind with default error message.
    pub fn expect(&mut self, expected_kind: TokenKind) -> Result<Token, Error> {
        self.expect_error(expected_kind, None)
    }

    /// Checks if there are more tokens to parse.
    pub fn has_tokens(&self) -> bool {
        self.pos < self.tokens.len() && self.current_token_kind() != TokenKind::EOF
    }

    /// Returns a reference to the statement lookup table.
    pub fn get_stmt_lookup(&self) -> &StmtLookup {
        &self.stmt_lookup
    }

    /// Returns a reference to the NUD (null denotation) lookup table.
    pub fn get_nud_lookup(&self) -> &NUDLookup {
        &self.nud_lookup
    }

    /// Returns a reference to the LED (left denotation) lookup table.
    pub fn get_led_lookup(&self) -> &LEDLookup {
        &self.led_lookup
    }

    /// Returns a reference to the binding power lookup table.
    pub fn get_bp_lookup(&self) -> &BPLookup {
        &self.binding_power_lookup
    }

    /// Registers a left denotation (infix) handler for a token.
    pub fn led(&mut self, kind: TokenKind, binding_power: BindingPower, led_fn: LEDHandler) {
        self.binding_power_lookup.insert(kind, binding_power);
        self.led_lookup.insert(kind, led_fn);
    }

    /// Registers a null denotation (prefix) handler for a token.
    pub fn nud(&mut self, kind: TokenKind, nud_fn: NUDHandler) {
        self.binding_power_lookup
            .entry(kind)
            .or_insert(BindingPower::Primary);
        self.nud_lookup.insert(kind, nud_fn);
    }

    /// Registers a statement handler for a token.
    pub fn stmt(&mut self, kind: TokenKind, stmt_fn: StmtHandler) {
        self.binding_power_lookup.insert(kind, BindingPower::Default);
        self.stmt_lookup.insert(kind, stmt_fn);
    }

    /// Returns the start of the current token.
    pub fn get_position(&self) -> Position {
        if self.tokens.is_empty() {
            return Position::new(0, 1, Rc::clone(&self.file));
        }
        self.current_token().span.start.clone()
    }

    /// Span from `start` to the end of the last consumed token.
    pub fn span_from(&self, start: Position) -> Span {
        Span {
            start,
            end: self.last_end.clone(),
        }
    }

    /// Adds a node whose span starts at `start` and ends at the last consumed token.
    pub fn add_node(&mut self, kind: NodeKind, start: Position) -> NodeId {
        let span = self.span_from(start);
        self.ast.add(kind, span)
    }

    /// Copies an assignment target so it can be read as well as written.
    pub fn duplicate_target(&mut self, id: NodeId) -> Result<NodeId, Error> {
        let node = self.ast[id].clone();
        let kind = match &node.kind {
            NodeKind::Variable { .. } => node.kind.clone(),
            NodeKind::Field { object, field } => NodeKind::Field {
                object: self.duplicate_expression(*object)?,
                field: field.clone(),
            },
            NodeKind::Index { object, index } => NodeKind::Index {
                object: self.duplicate_expression(*object)?,
                index: self.duplicate_expression(*index)?,
            },
            _ => {
                return Err(Error::new(
                    ErrorImpl::InvalidAssignmentTarget,
                    node.span.start.clone(),
                ))
            }
        };

        Ok(self.ast.add(kind, node.span))
    }

    fn duplicate_expression(&mut self, id: NodeId) -> Result<NodeId, Error> {
        let node = self.ast[id].clone();
        let mut kind = node.kind.clone();

        match &mut kind {
            NodeKind::Binary { left, right, .. } => {
                *left = self.duplicate_expression(*left)?;
                *right = self.duplicate_expression(*right)?;
            }
            NodeKind::Unary { operand, .. } => *operand = self.duplicate_expression(*operand)?,
            NodeKind::Field { object, .. } => *object = self.duplicate_expression(*object)?,
            NodeKind::Index { object, index } => {
                *object = self.duplicate_expression(*object)?;
                *index = self.duplicate_expression(*index)?;
            }
            NodeKind::Call { args, .. } => {
                for arg in args.iter_mut() {
                    *arg = self.duplicate_expression(*arg)?;
                }
            }
            NodeKind::MethodCall { receiver, args, .. } => {
                *receiver = self.duplicate_expression(*receiver)?;
                for arg in args.iter_mut() {
                    *arg = self.duplicate_expression(*arg)?;
                }
            }
            NodeKind::List { elements } => {
                for element in elements.iter_mut() {
                    *element = self.duplicate_expression(*element)?;
                }
            }
            NodeKind::Dict { entries } => {
                for (key, value) in entries.iter_mut() {
                    *key = self.duplicate_expression(*key)?;
                    *value = self.duplicate_expression(*value)?;
                }
            }
            NodeKind::StructLiteral { fields, .. } => {
                for (_, value) in fields.iter_mut() {
                    *value = self.duplicate_expression(*value)?;
                }
            }
            _ => {}
        }

        Ok(self.ast.add(kind, node.span))
    }
}

/// Parses a stream of tokens into an Abstract Syntax Tree.
///
/// This is the main entry point for parsing. It creates a parser instance,
/// initializes all lookup tables, and parses all statements until EOF.
/// Parsing stops at the first syntax error.
#[tracing::instrument(level = "debug", skip_all)]
pub fn parse(tokens: Vec<Token>, file: Rc<String>) -> Result<Ast, Error> {
    let mut parser = Parser::new(tokens, Rc::clone(&file));
    create_token_lookups(&mut parser);

    let mut body = vec![];

    while parser.has_tokens() {
        if parser.current_token_kind() == TokenKind::Newline {
            parser.advance();
            continue;
        }
        body.push(parse_stmt(&mut parser)?);
    }

    let root = parser.add_node(NodeKind::Module { body }, Position::new(0, 1, file));
    parser.ast.set_root(root);
    parser.ast.link_parents();

    tracing::debug!(nodes = parser.ast.len(), "parsed");
    Ok(parser.ast)
}
