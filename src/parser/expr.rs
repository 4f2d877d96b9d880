use crate::{
    ast::{
        ast::{NodeId, NodeKind},
        expressions::{BinaryOperator, UnaryOperator},
    },
    errors::errors::{Error, ErrorImpl},
    lexer::tokens::TokenKind,
};

use super::{lookups::BindingPower, parser::Parser};

pub fn parse_expr(parser: &mut Parser, bp: BindingPower) -> Result<NodeId, Error> {
    // First parse NUD
    let token_kind = parser.current_token_kind();
    let Some(nud_fn) = parser.get_nud_lookup().get(&token_kind).copied() else {
        return Err(Error::new(
            ErrorImpl::UnexpectedToken {
                token: parser.current_token().value.clone(),
            },
            parser.get_position(),
        ));
    };

    let mut left = nud_fn(parser)?;

    // While LED and current BP is less than BP of current token, continue parsing lhs
    loop {
        let token_kind = parser.current_token_kind();
        let token_bp = parser
            .get_bp_lookup()
            .get(&token_kind)
            .copied()
            .unwrap_or(BindingPower::Default);

        if token_bp <= bp {
            break;
        }

        let Some(led_fn) = parser.get_led_lookup().get(&token_kind).copied() else {
            return Err(Error::new(
                ErrorImpl::UnexpectedToken {
                    token: parser.current_token().value.clone(),
                },
                parser.get_position(),
            ));
        };

        left = led_fn(parser, left, token_bp)?;
    }

    Ok(left)
}

pub fn parse_primary_expr(parser: &mut Parser) -> Result<NodeId, Error> {
    let start = parser.get_position();

    let kind = match parser.current_token_kind() {
        TokenKind::Number => {
            let value = parser.current_token().value.clone();
            let number_error = || {
                Error::new(
                    ErrorImpl::NumberParseError {
                        token: value.clone(),
                    },
                    start.clone(),
                )
            };

            if value.contains('.') {
                NodeKind::FloatLiteral(value.parse().map_err(|_| number_error())?)
            } else {
                NodeKind::IntLiteral(value.parse().map_err(|_| number_error())?)
            }
        }
        TokenKind::Identifier => NodeKind::Variable {
            name: parser.current_token().value.clone(),
        },
        TokenKind::String => NodeKind::StringLiteral(parser.current_token().value.clone()),
        TokenKind::True => NodeKind::BoolLiteral(true),
        TokenKind::False => NodeKind::BoolLiteral(false),
        _ => {
            return Err(Error::new(
                ErrorImpl::UnexpectedToken {
                    token: parser.current_token().value.clone(),
                },
                start,
            ))
        }
    };

    parser.advance();
    Ok(parser.add_node(kind, start))
}

pub fn parse_binary_expr(
    parser: &mut Parser,
    left: NodeId,
    bp: BindingPower,
) -> Result<NodeId, Error> {
    let operator_token = parser.advance();
    let Some(op) = BinaryOperator::from_token(operator_token.kind) else {
        return Err(Error::new(
            ErrorImpl::UnexpectedToken {
                token: operator_token.value,
            },
            operator_token.span.start,
        ));
    };

    let right = parse_expr(parser, bp)?;
    let start = parser.ast[left].span.start.clone();

    Ok(parser.add_node(NodeKind::Binary { op, left, right }, start))
}

pub fn parse_prefix_expr(parser: &mut Parser) -> Result<NodeId, Error> {
    let operator_token = parser.advance();

    let (op, bp) = match operator_token.kind {
        TokenKind::Not => (UnaryOperator::Not, BindingPower::LogicalNot),
        _ => (UnaryOperator::Negate, BindingPower::Unary),
    };

    let operand = parse_expr(parser, bp)?;

    Ok(parser.add_node(NodeKind::Unary { op, operand }, operator_token.span.start))
}

pub fn parse_grouping_expr(parser: &mut Parser) -> Result<NodeId, Error> {
    parser.advance();
    let expr = parse_expr(parser, BindingPower::Default)?;
    parser.expect(TokenKind::CloseParen)?;

    Ok(expr)
}

/// Parses `expr, expr, ...` up to and including `close`. A trailing comma is allowed.
fn parse_expr_list(parser: &mut Parser, close: TokenKind) -> Result<Vec<NodeId>, Error> {
    let mut items = vec![];

    while parser.current_token_kind() != close {
        items.push(parse_expr(parser, BindingPower::Comma)?);

        if parser.current_token_kind() != close {
            parser.expect(TokenKind::Comma)?;
        }
    }

    parser.expect(close)?;
    Ok(items)
}

pub fn parse_call_expr(
    parser: &mut Parser,
    left: NodeId,
    _bp: BindingPower,
) -> Result<NodeId, Error> {
    let start = parser.ast[left].span.start.clone();
    parser.advance();
    let args = parse_expr_list(parser, TokenKind::CloseParen)?;

    let kind = match &parser.ast[left].kind {
        NodeKind::Variable { name } if name == "print" => {
            return Err(Error::new(
                ErrorImpl::UnexpectedTokenDetailed {
                    token: name.clone(),
                    message: String::from("print is a statement, not a value"),
                },
                start,
            ))
        }
        NodeKind::Variable { name } => NodeKind::Call {
            callee: name.clone(),
            args,
        },
        NodeKind::Field { object, field } => NodeKind::MethodCall {
            receiver: *object,
            method: field.clone(),
            args,
        },
        _ => return Err(Error::new(ErrorImpl::InvalidCallee, start)),
    };

    Ok(parser.add_node(kind, start))
}

pub fn parse_index_expr(
    parser: &mut Parser,
    left: NodeId,
    _bp: BindingPower,
) -> Result<NodeId, Error> {
    let start = parser.ast[left].span.start.clone();
    parser.advance();
    let index = parse_expr(parser, BindingPower::Default)?;
    parser.expect(TokenKind::CloseBracket)?;

    Ok(parser.add_node(
        NodeKind::Index {
            object: left,
            index,
        },
        start,
    ))
}

pub fn parse_member_expr(
    parser: &mut Parser,
    left: NodeId,
    _bp: BindingPower,
) -> Result<NodeId, Error> {
    let start = parser.ast[left].span.start.clone();
    parser.advance();
    let field = parser.expect(TokenKind::Identifier)?.value;

    Ok(parser.add_node(
        NodeKind::Field {
            object: left,
            field,
        },
        start,
    ))
}

pub fn parse_struct_literal_expr(
    parser: &mut Parser,
    left: NodeId,
    _bp: BindingPower,
) -> Result<NodeId, Error> {
    // Point { x: 1, y: 2 }
    let start = parser.ast[left].span.start.clone();
    let NodeKind::Variable { name } = parser.ast[left].kind.clone() else {
        return Err(Error::new(
            ErrorImpl::UnexpectedToken {
                token: parser.current_token().value.clone(),
            },
            parser.get_position(),
        ));
    };

    parser.advance();
    let mut fields = vec![];

    while parser.current_token_kind() != TokenKind::CloseCurly {
        let field = parser.expect(TokenKind::Identifier)?.value;
        parser.expect(TokenKind::Colon)?;
        let value = parse_expr(parser, BindingPower::Comma)?;
        fields.push((field, value));

        if parser.current_token_kind() != TokenKind::CloseCurly {
            parser.expect(TokenKind::Comma)?;
        }
    }

    parser.expect(TokenKind::CloseCurly)?;

    Ok(parser.add_node(NodeKind::StructLiteral { name, fields }, start))
}

pub fn parse_list_expr(parser: &mut Parser) -> Result<NodeId, Error> {
    let start = parser.advance().span.start;
    let elements = parse_expr_list(parser, TokenKind::CloseBracket)?;

    Ok(parser.add_node(NodeKind::List { elements }, start))
}

pub fn parse_dict_expr(parser: &mut Parser) -> Result<NodeId, Error> {
    let start = parser.advance().span.start;
    let mut entries = vec![];

    while parser.current_token_kind() != TokenKind::CloseCurly {
        let key = parse_expr(parser, BindingPower::Comma)?;
        parser.expect(TokenKind::Colon)?;
        let value = parse_expr(parser, BindingPower::Comma)?;
        entries.push((key, value));

        if parser.current_token_kind() != TokenKind::CloseCurly {
            parser.expect(TokenKind::Comma)?;
        }
    }

    parser.expect(TokenKind::CloseCurly)?;

    Ok(parser.add_node(NodeKind::Dict { entries }, start))
}
