use std::rc::Rc;

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    errors::errors::{Error, ErrorImpl},
    Position, Span, MK_DEFAULT_HANDLER, MK_TOKEN,
};

use super::tokens::{Token, TokenKind, RESERVED_LOOKUP};

pub type RegexHandler = fn(&mut Lexer, &Regex) -> Result<(), Error>;

pub struct RegexPattern {
    regex: Regex,
    handler: RegexHandler,
}

impl RegexPattern {
    fn new(pattern: &str, handler: RegexHandler) -> Self {
        RegexPattern {
            // Patterns are fixed literals, a failure here is a bug in this table.
            regex: Regex::new(pattern).unwrap_or_else(|e| panic!("bad lexer pattern {pattern}: {e}")),
            handler,
        }
    }
}

lazy_static! {
    static ref PATTERNS: Vec<RegexPattern> = vec![
        RegexPattern::new(r"^\r?\n[ \t]*", newline_handler),
        RegexPattern::new(r"^[ \t]+", skip_handler),
        RegexPattern::new(r"^\\\r?\n", skip_handler),
        RegexPattern::new(r"^#[^\n]*", skip_handler),
        RegexPattern::new(r"^[a-zA-Z_][a-zA-Z0-9_]*", symbol_handler),
        RegexPattern::new(r"^[0-9]+\.[0-9]+", number_handler),
        RegexPattern::new(r"^[0-9]+", number_handler),
        RegexPattern::new(r#"^"(?:[^"\\\n]|\\.)*""#, string_handler),
        RegexPattern::new(r"^'(?:[^'\\\n]|\\.)*'", string_handler),
        RegexPattern::new(r#"^["']"#, unterminated_string_handler),
        RegexPattern::new(r"^[\[\{\(]", open_bracket_handler),
        RegexPattern::new(r"^[\]\}\)]", close_bracket_handler),
        RegexPattern::new("^==", MK_DEFAULT_HANDLER!(TokenKind::Equals, "==")),
        RegexPattern::new("^!=", MK_DEFAULT_HANDLER!(TokenKind::NotEquals, "!=")),
        RegexPattern::new("^<=", MK_DEFAULT_HANDLER!(TokenKind::LessEquals, "<=")),
        RegexPattern::new("^>=", MK_DEFAULT_HANDLER!(TokenKind::GreaterEquals, ">=")),
        RegexPattern::new(r"^\+=", MK_DEFAULT_HANDLER!(TokenKind::PlusEquals, "+=")),
        RegexPattern::new("^-=", MK_DEFAULT_HANDLER!(TokenKind::MinusEquals, "-=")),
        RegexPattern::new(r"^\*=", MK_DEFAULT_HANDLER!(TokenKind::StarEquals, "*=")),
        RegexPattern::new("^/=", MK_DEFAULT_HANDLER!(TokenKind::SlashEquals, "/=")),
        RegexPattern::new("^//", MK_DEFAULT_HANDLER!(TokenKind::SlashSlash, "//")),
        RegexPattern::new("^=", MK_DEFAULT_HANDLER!(TokenKind::Assignment, "=")),
        RegexPattern::new("^<", MK_DEFAULT_HANDLER!(TokenKind::Less, "<")),
        RegexPattern::new("^>", MK_DEFAULT_HANDLER!(TokenKind::Greater, ">")),
        RegexPattern::new(r"^\.", MK_DEFAULT_HANDLER!(TokenKind::Dot, ".")),
        RegexPattern::new("^;", MK_DEFAULT_HANDLER!(TokenKind::Semicolon, ";")),
        RegexPattern::new("^:", MK_DEFAULT_HANDLER!(TokenKind::Colon, ":")),
        RegexPattern::new("^,", MK_DEFAULT_HANDLER!(TokenKind::Comma, ",")),
        RegexPattern::new(r"^\+", MK_DEFAULT_HANDLER!(TokenKind::Plus, "+")),
        RegexPattern::new("^-", MK_DEFAULT_HANDLER!(TokenKind::Dash, "-")),
        RegexPattern::new("^/", MK_DEFAULT_HANDLER!(TokenKind::Slash, "/")),
        RegexPattern::new(r"^\*", MK_DEFAULT_HANDLER!(TokenKind::Star, "*")),
        RegexPattern::new("^%", MK_DEFAULT_HANDLER!(TokenKind::Percent, "%")),
    ];
}

pub struct Lexer {
    tokens: Vec<Token>,
    source: String,
    pos: usize,
    line: u32,
    file: Rc<String>,
    /// Column widths of the currently open indentation levels, innermost last.
    indent_stack: Vec<usize>,
    /// Newlines inside brackets do not end a logical line.
    bracket_depth: u32,
}

impl Lexer {
    pub fn new(source: String, file: Option<String>) -> Lexer {
        let file_name = if let Some(file) = file {
            Rc::new(file)
        } else {
            Rc::new(String::from("shell"))
        };

        Lexer {
            tokens: vec![],
            source,
            pos: 0,
            line: 1,
            file: file_name,
            indent_stack: vec![0],
            bracket_depth: 0,
        }
    }

    pub fn advance_n(&mut self, n: usize) {
        let end = (self.pos + n).min(self.source.len());
        self.line += self.source[self.pos..end].matches('\n').count() as u32;
        self.pos = end;
    }

    pub fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    pub fn remainder(&self) -> &str {
        &self.source[self.pos..]
    }

    pub fn at_eof(&self) -> bool {
        self.pos >= self.source.len()
    }

    pub fn position(&self) -> Position {
        Position::new(self.pos as u32, self.line, Rc::clone(&self.file))
    }

    /// Span of the next `len` bytes, assumed to sit on the current line.
    pub fn span_of(&self, len: usize) -> Span {
        Span {
            start: self.position(),
            end: Position::new((self.pos + len) as u32, self.line, Rc::clone(&self.file)),
        }
    }

    fn matched(&self, regex: &Regex) -> String {
        regex
            .find(self.remainder())
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }

    fn last_kind(&self) -> Option<TokenKind> {
        self.tokens.last().map(|token| token.kind)
    }

    fn push_newline(&mut self) {
        if !matches!(self.last_kind(), None | Some(TokenKind::Newline)) {
            let span = self.span_of(0);
            self.push(MK_TOKEN!(TokenKind::Newline, String::from("\\n"), span));
        }
    }

    fn close_indentation_to(&mut self, width: usize) -> Result<(), Error> {
        while self.indent_stack.last().is_some_and(|top| *top > width) {
            self.indent_stack.pop();
            let span = self.span_of(0);
            self.push(MK_TOKEN!(TokenKind::Dedent, String::new(), span));
        }

        if self.indent_stack.last() != Some(&width) {
            return Err(Error::new(ErrorImpl::InconsistentIndentation, self.position()));
        }

        Ok(())
    }
}

fn newline_handler(lexer: &mut Lexer, regex: &Regex) -> Result<(), Error> {
    let matched = lexer.matched(regex);

    if lexer.bracket_depth > 0 {
        lexer.advance_n(matched.len());
        return Ok(());
    }

    lexer.push_newline();
    lexer.advance_n(matched.len());

    // Blank and comment-only lines carry no indentation information.
    if matches!(lexer.remainder().chars().next(), None | Some('\n') | Some('\r') | Some('#')) {
        return Ok(());
    }

    let width = matched.trim_start_matches('\r').trim_start_matches('\n').len();
    let current = lexer.indent_stack.last().copied().unwrap_or(0);

    if width > current {
        lexer.indent_stack.push(width);
        let span = lexer.span_of(0);
        lexer.push(MK_TOKEN!(TokenKind::Indent, String::new(), span));
        Ok(())
    } else {
        lexer.close_indentation_to(width)
    }
}

fn skip_handler(lexer: &mut Lexer, regex: &Regex) -> Result<(), Error> {
    let matched = lexer.matched(regex);
    lexer.advance_n(matched.len());
    Ok(())
}

fn number_handler(lexer: &mut Lexer, regex: &Regex) -> Result<(), Error> {
    let matched = lexer.matched(regex);
    let span = lexer.span_of(matched.len());

    lexer.advance_n(matched.len());
    lexer.push(MK_TOKEN!(TokenKind::Number, matched, span));
    Ok(())
}

fn string_handler(lexer: &mut Lexer, regex: &Regex) -> Result<(), Error> {
    let matched = lexer.matched(regex);
    let span = lexer.span_of(matched.len());
    let inner = &matched[1..matched.len() - 1];

    let mut result = String::new();
    let mut chars = inner.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }

        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('0') => result.push('\0'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some('\'') => result.push('\''),
            Some(other) => {
                // Unknown escapes keep their backslash
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }

    lexer.advance_n(matched.len());
    lexer.push(MK_TOKEN!(TokenKind::String, result, span));
    Ok(())
}

fn unterminated_string_handler(lexer: &mut Lexer, _regex: &Regex) -> Result<(), Error> {
    Err(Error::new(ErrorImpl::UnterminatedString, lexer.position()))
}

fn open_bracket_handler(lexer: &mut Lexer, regex: &Regex) -> Result<(), Error> {
    let matched = lexer.matched(regex);
    let kind = match matched.as_str() {
        "[" => TokenKind::OpenBracket,
        "{" => TokenKind::OpenCurly,
        _ => TokenKind::OpenParen,
    };

    let span = lexer.span_of(1);
    lexer.push(MK_TOKEN!(kind, matched, span));
    lexer.advance_n(1);
    lexer.bracket_depth += 1;
    Ok(())
}

fn close_bracket_handler(lexer: &mut Lexer, regex: &Regex) -> Result<(), Error> {
    let matched = lexer.matched(regex);
    let kind = match matched.as_str() {
        "]" => TokenKind::CloseBracket,
        "}" => TokenKind::CloseCurly,
        _ => TokenKind::CloseParen,
    };

    let span = lexer.span_of(1);
    lexer.push(MK_TOKEN!(kind, matched, span));
    lexer.advance_n(1);
    lexer.bracket_depth = lexer.bracket_depth.saturating_sub(1);
    Ok(())
}

fn symbol_handler(lexer: &mut Lexer, regex: &Regex) -> Result<(), Error> {
    let value = lexer.matched(regex);
    let span = lexer.span_of(value.len());
    let kind = RESERVED_LOOKUP
        .get(value.as_str())
        .copied()
        .unwrap_or(TokenKind::Identifier);

    lexer.advance_n(value.len());
    lexer.push(MK_TOKEN!(kind, value, span));
    Ok(())
}

#[tracing::instrument(level = "debug", skip_all)]
pub fn tokenize(source: String, file: Option<String>) -> Result<Vec<Token>, Error> {
    let mut lex = Lexer::new(source, file);

    while !lex.at_eof() {
        let pattern = PATTERNS
            .iter()
            .find(|pattern| pattern.regex.is_match(lex.remainder()));

        match pattern {
            Some(pattern) => (pattern.handler)(&mut lex, &pattern.regex)?,
            None => {
                let token = lex.remainder().chars().next().map(String::from).unwrap_or_default();
                return Err(Error::new(ErrorImpl::UnrecognisedToken { token }, lex.position()));
            }
        }
    }

    lex.push_newline();
    lex.close_indentation_to(0)?;

    let span = lex.span_of(0);
    lex.push(MK_TOKEN!(TokenKind::EOF, String::from("EOF"), span));
    tracing::debug!(tokens = lex.tokens.len(), "tokenized");
    Ok(lex.tokens)
}
