use crate::{
    ast::{
        ast::{NodeId, NodeKind},
        expressions::BinaryOperator,
        statements::{Branch, ClassDef, FunctionDef, StructDef},
    },
    errors::errors::{Error, ErrorImpl},
    lexer::tokens::TokenKind,
    parser::{expr::parse_expr, lookups::BindingPower},
};

use super::parser::Parser;

const AUGMENTED_ASSIGNMENTS: [TokenKind; 4] = [
    TokenKind::PlusEquals,
    TokenKind::MinusEquals,
    TokenKind::StarEquals,
    TokenKind::SlashEquals,
];

const COMPOUND_STATEMENTS: [TokenKind; 6] = [
    TokenKind::If,
    TokenKind::While,
    TokenKind::For,
    TokenKind::Def,
    TokenKind::Class,
    TokenKind::Struct,
];

pub fn parse_stmt(parser: &mut Parser) -> Result<NodeId, Error> {
    if let Some(stmt_fn) = parser
        .get_stmt_lookup()
        .get(&parser.current_token_kind())
        .copied()
    {
        return stmt_fn(parser);
    }

    if parser.current_token().value == "print"
        && parser.current_token_kind() == TokenKind::Identifier
        && parser.peek_kind() == TokenKind::OpenParen
    {
        return parse_print_stmt(parser);
    }

    parse_expression_stmt(parser)
}

/// Consumes the end of a simple statement: `;`, a newline, or nothing
/// before a dedent or the end of input.
fn expect_end_of_statement(parser: &mut Parser) -> Result<(), Error> {
    match parser.current_token_kind() {
        TokenKind::Semicolon => {
            parser.advance();
            if parser.current_token_kind() == TokenKind::Newline {
                parser.advance();
            }
            Ok(())
        }
        TokenKind::Newline => {
            parser.advance();
            Ok(())
        }
        TokenKind::Dedent | TokenKind::EOF => Ok(()),
        _ => Err(Error::new(
            ErrorImpl::UnexpectedTokenDetailed {
                token: parser.current_token().value.clone(),
                message: String::from("expected end of statement"),
            },
            parser.get_position(),
        )),
    }
}

/// Parses `:` followed by either an indented block or simple statements on
/// the same line.
fn parse_block(parser: &mut Parser) -> Result<Vec<NodeId>, Error> {
    parser.expect(TokenKind::Colon)?;
    let mut body = vec![];

    if parser.current_token_kind() != TokenKind::Newline {
        loop {
            if COMPOUND_STATEMENTS.contains(&parser.current_token_kind()) {
                return Err(Error::new(
                    ErrorImpl::UnexpectedTokenDetailed {
                        token: parser.current_token().value.clone(),
                        message: String::from("compound statements need their own line"),
                    },
                    parser.get_position(),
                ));
            }

            body.push(parse_stmt(parser)?);

            if parser.previous_kind() == Some(TokenKind::Newline)
                || matches!(
                    parser.current_token_kind(),
                    TokenKind::Dedent | TokenKind::EOF
                )
            {
                return Ok(body);
            }
        }
    }

    parser.advance();
    parser.expect(TokenKind::Indent)?;

    while !matches!(
        parser.current_token_kind(),
        TokenKind::Dedent | TokenKind::EOF
    ) {
        if parser.current_token_kind() == TokenKind::Newline {
            parser.advance();
            continue;
        }
        body.push(parse_stmt(parser)?);
    }

    parser.expect(TokenKind::Dedent)?;
    Ok(body)
}

fn is_assignment_target(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Variable { .. } | NodeKind::Field { .. } | NodeKind::Index { .. }
    )
}

pub fn parse_expression_stmt(parser: &mut Parser) -> Result<NodeId, Error> {
    let start = parser.get_position();
    let expr = parse_expr(parser, BindingPower::Default)?;
    let operator = parser.current_token_kind();

    let node = if operator == TokenKind::Assignment || AUGMENTED_ASSIGNMENTS.contains(&operator) {
        if !is_assignment_target(&parser.ast[expr].kind) {
            return Err(Error::new(ErrorImpl::InvalidAssignmentTarget, start));
        }

        parser.advance();
        let rhs = parse_expr(parser, BindingPower::Default)?;

        // x += e becomes x = x + e
        let value = match BinaryOperator::from_token(operator) {
            Some(op) if operator != TokenKind::Assignment => {
                let left = parser.duplicate_target(expr)?;
                let binary_start = parser.ast[left].span.start.clone();
                parser.add_node(
                    NodeKind::Binary {
                        op,
                        left,
                        right: rhs,
                    },
                    binary_start,
                )
            }
            _ => rhs,
        };

        parser.add_node(
            NodeKind::Assign {
                target: expr,
                value,
            },
            start,
        )
    } else {
        parser.add_node(NodeKind::ExprStmt { expr }, start)
    };

    expect_end_of_statement(parser)?;
    Ok(node)
}

pub fn parse_print_stmt(parser: &mut Parser) -> Result<NodeId, Error> {
    let start = parser.advance().span.start;
    parser.expect(TokenKind::OpenParen)?;

    let mut args = vec![];
    while parser.current_token_kind() != TokenKind::CloseParen {
        args.push(parse_expr(parser, BindingPower::Comma)?);

        if parser.current_token_kind() != TokenKind::CloseParen {
            parser.expect(TokenKind::Comma)?;
        }
    }
    parser.expect(TokenKind::CloseParen)?;

    let node = parser.add_node(NodeKind::Print { args }, start);
    expect_end_of_statement(parser)?;
    Ok(node)
}

pub fn parse_if_stmt(parser: &mut Parser) -> Result<NodeId, Error> {
    let start = parser.advance().span.start;

    let condition = parse_expr(parser, BindingPower::Default)?;
    let body = parse_block(parser)?;
    let mut branches = vec![Branch { condition, body }];

    while parser.current_token_kind() == TokenKind::Elif {
        parser.advance();
        let condition = parse_expr(parser, BindingPower::Default)?;
        let body = parse_block(parser)?;
        branches.push(Branch { condition, body });
    }

    let else_body = if parser.current_token_kind() == TokenKind::Else {
        parser.advance();
        parse_block(parser)?
    } else {
        vec![]
    };

    Ok(parser.add_node(
        NodeKind::If {
            branches,
            else_body,
        },
        start,
    ))
}

pub fn parse_while_stmt(parser: &mut Parser) -> Result<NodeId, Error> {
    let start = parser.advance().span.start;

    let condition = parse_expr(parser, BindingPower::Default)?;
    let body = parse_block(parser)?;

    Ok(parser.add_node(NodeKind::While { condition, body }, start))
}

pub fn parse_for_stmt(parser: &mut Parser) -> Result<NodeId, Error> {
    // for i in range(end):
    let start = parser.advance().span.start;

    let variable = parser.expect(TokenKind::Identifier)?.value;
    parser.expect(TokenKind::In)?;

    let range_error = Error::new(
        ErrorImpl::UnexpectedTokenDetailed {
            token: parser.current_token().value.clone(),
            message: String::from("only range(...) loops are supported"),
        },
        parser.get_position(),
    );
    let iterable = parser.expect_error(TokenKind::Identifier, Some(range_error.clone()))?;
    if iterable.value != "range" {
        return Err(range_error);
    }

    parser.expect(TokenKind::OpenParen)?;
    let end = parse_expr(parser, BindingPower::Default)?;
    parser.expect(TokenKind::CloseParen)?;

    let body = parse_block(parser)?;

    Ok(parser.add_node(
        NodeKind::For {
            variable,
            end,
            body,
        },
        start,
    ))
}

pub fn parse_fn_decl_stmt(parser: &mut Parser) -> Result<NodeId, Error> {
    let start = parser.advance().span.start;

    let error = Error::new(
        ErrorImpl::UnexpectedTokenDetailed {
            token: parser.current_token().value.clone(),
            message: String::from("expected function name"),
        },
        parser.get_position(),
    );
    let name = parser.expect_error(TokenKind::Identifier, Some(error))?.value;

    parser.expect(TokenKind::OpenParen)?;
    let mut params = vec![];

    while parser.current_token_kind() != TokenKind::CloseParen {
        let param = parser.expect(TokenKind::Identifier)?;
        if params.contains(&param.value) {
            return Err(Error::new(
                ErrorImpl::UnexpectedTokenDetailed {
                    token: param.value,
                    message: String::from("duplicate parameter"),
                },
                param.span.start,
            ));
        }
        params.push(param.value);

        if parser.current_token_kind() != TokenKind::CloseParen {
            parser.expect(TokenKind::Comma)?;
        }
    }
    parser.expect(TokenKind::CloseParen)?;

    parser.function_depth += 1;
    let body = parse_block(parser);
    parser.function_depth -= 1;

    Ok(parser.add_node(
        NodeKind::FunctionDef(FunctionDef {
            name,
            params,
            body: body?,
        }),
        start,
    ))
}

/// Class and struct bodies are not function bodies, even when nested in one.
fn parse_declaration_body(parser: &mut Parser) -> Result<Vec<NodeId>, Error> {
    let depth = std::mem::take(&mut parser.function_depth);
    let body = parse_block(parser);
    parser.function_depth = depth;
    body
}

fn is_field_default(parser: &Parser, id: NodeId) -> bool {
    match &parser.ast[id].kind {
        NodeKind::Assign { target, .. } => {
            matches!(parser.ast[*target].kind, NodeKind::Variable { .. })
        }
        _ => false,
    }
}

fn unexpected_member(parser: &Parser, id: NodeId, message: &str) -> Error {
    Error::new(
        ErrorImpl::UnexpectedTokenDetailed {
            token: String::new(),
            message: String::from(message),
        },
        parser.ast[id].span.start.clone(),
    )
}

pub fn parse_class_decl_stmt(parser: &mut Parser) -> Result<NodeId, Error> {
    let start = parser.advance().span.start;
    let name = parser.expect(TokenKind::Identifier)?.value;
    let body = parse_declaration_body(parser)?;

    for id in &body {
        let allowed = is_field_default(parser, *id)
            || matches!(
                parser.ast[*id].kind,
                NodeKind::FunctionDef(_) | NodeKind::Pass
            );
        if !allowed {
            return Err(unexpected_member(
                parser,
                *id,
                "class bodies hold field defaults and methods only",
            ));
        }
    }

    Ok(parser.add_node(NodeKind::ClassDef(ClassDef { name, body }), start))
}

pub fn parse_struct_decl_stmt(parser: &mut Parser) -> Result<NodeId, Error> {
    let start = parser.advance().span.start;
    let name = parser.expect(TokenKind::Identifier)?.value;
    let body = parse_declaration_body(parser)?;
    let mut fields = vec![];

    for id in body {
        if is_field_default(parser, id) {
            fields.push(id);
        } else if parser.ast[id].kind != NodeKind::Pass {
            return Err(unexpected_member(
                parser,
                id,
                "struct bodies hold field defaults only",
            ));
        }
    }

    Ok(parser.add_node(NodeKind::StructDef(StructDef { name, fields }), start))
}

pub fn parse_return_stmt(parser: &mut Parser) -> Result<NodeId, Error> {
    let start = parser.advance().span.start;

    if parser.function_depth == 0 {
        return Err(Error::new(ErrorImpl::ReturnOutsideFunction, start));
    }

    let value = match parser.current_token_kind() {
        TokenKind::Semicolon | TokenKind::Newline | TokenKind::Dedent | TokenKind::EOF => None,
        _ => Some(parse_expr(parser, BindingPower::Default)?),
    };

    let node = parser.add_node(NodeKind::Return { value }, start);
    expect_end_of_statement(parser)?;
    Ok(node)
}

pub fn parse_global_stmt(parser: &mut Parser) -> Result<NodeId, Error> {
    let start = parser.advance().span.start;

    if parser.function_depth == 0 {
        return Err(Error::new(ErrorImpl::GlobalOutsideFunction, start));
    }

    let mut names = vec![parser.expect(TokenKind::Identifier)?.value];
    while parser.current_token_kind() == TokenKind::Comma {
        parser.advance();
        names.push(parser.expect(TokenKind::Identifier)?.value);
    }

    let node = parser.add_node(NodeKind::Global { names }, start);
    expect_end_of_statement(parser)?;
    Ok(node)
}

pub fn parse_pass_stmt(parser: &mut Parser) -> Result<NodeId, Error> {
    let start = parser.advance().span.start;
    let node = parser.add_node(NodeKind::Pass, start);
    expect_end_of_statement(parser)?;
    Ok(node)
}
