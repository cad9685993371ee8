//! Text front end for filter expressions.
//!
//! Hand-rolled lexer plus recursive descent, precedence low to high:
//! `OR` < `AND` < `NOT` < relational < `+ -` < `* / %` < unary `-` <
//! subscript < primary. Property references:
//!
//! - `label.prop` - unresolved label attribute (tag or edge, decided by
//!   the request builder); `label._src` / `_dst` / `_type` / `_rank` name
//!   the edge-key columns.
//! - `$^.tag.prop` / `$$.tag.prop` - source / destination vertex property.
//! - `$-.col` - inbound row column, `$var` - plan variable.
//!
//! A unary minus directly in front of an integer literal is folded during
//! parsing so `-9223372036854775808` is a plain constant.

use super::{ArithOp, Expression, LogicalOp, RelOp, UnaryOp};
use crate::value::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("Unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },
    #[error("Integer literal out of range: {text}")]
    IntOutOfRange { text: String },
    #[error("Invalid float literal: {text}")]
    BadFloat { text: String },
    #[error("Unexpected token {found} (expected {expected})")]
    Unexpected { expected: String, found: String },
    #[error("Unexpected end of expression (expected {expected})")]
    UnexpectedEnd { expected: String },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Num { text: String, is_float: bool },
    Str(String),
    // punctuation and operators
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Bang,
    DollarCaret,
    DollarDollar,
    DollarMinus,
    Dollar,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "'{s}'"),
            Token::Num { text, .. } => write!(f, "'{text}'"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::LBracket => write!(f, "'['"),
            Token::RBracket => write!(f, "']'"),
            Token::LBrace => write!(f, "'{{'"),
            Token::RBrace => write!(f, "'}}'"),
            Token::Comma => write!(f, "','"),
            Token::Colon => write!(f, "':'"),
            Token::Dot => write!(f, "'.'"),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::Percent => write!(f, "'%'"),
            Token::EqEq => write!(f, "'=='"),
            Token::NotEq => write!(f, "'!='"),
            Token::Lt => write!(f, "'<'"),
            Token::Le => write!(f, "'<='"),
            Token::Gt => write!(f, "'>'"),
            Token::Ge => write!(f, "'>='"),
            Token::Bang => write!(f, "'!'"),
            Token::DollarCaret => write!(f, "'$^'"),
            Token::DollarDollar => write!(f, "'$$'"),
            Token::DollarMinus => write!(f, "'$-'"),
            Token::Dollar => write!(f, "'$'"),
        }
    }
}

fn lex(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::EqEq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Bang);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '$' => match chars.get(i + 1) {
                Some('^') => {
                    tokens.push(Token::DollarCaret);
                    i += 2;
                }
                Some('$') => {
                    tokens.push(Token::DollarDollar);
                    i += 2;
                }
                Some('-') => {
                    tokens.push(Token::DollarMinus);
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Dollar);
                    i += 1;
                }
            },
            '"' => {
                let start = i;
                i += 1;
                let mut s = String::new();
                loop {
                    match chars.get(i) {
                        None => return Err(ParseError::UnterminatedString { offset: start }),
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some('\\') if matches!(chars.get(i + 1), Some('"' | '\\')) => {
                            s.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(ch) => {
                            s.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            '0'..='9' => {
                let mut text = String::new();
                let mut is_float = false;
                while let Some(ch) = chars.get(i) {
                    if ch.is_ascii_digit() {
                        text.push(*ch);
                        i += 1;
                    } else if *ch == '.'
                        && !is_float
                        && chars.get(i + 1).is_some_and(char::is_ascii_digit)
                    {
                        is_float = true;
                        text.push('.');
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Num { text, is_float });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(ch) = chars.get(i) {
                    if ch.is_ascii_alphanumeric() || *ch == '_' {
                        name.push(*ch);
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(name));
            }
            other => return Err(ParseError::UnexpectedChar { ch: other, offset: i }),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), ParseError> {
        match self.next() {
            Some(token) if token == *expected => Ok(()),
            Some(token) => Err(ParseError::Unexpected {
                expected: what.to_string(),
                found: token.to_string(),
            }),
            None => Err(ParseError::UnexpectedEnd { expected: what.to_string() }),
        }
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(kw))
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            Some(token) => Err(ParseError::Unexpected {
                expected: what.to_string(),
                found: token.to_string(),
            }),
            None => Err(ParseError::UnexpectedEnd { expected: what.to_string() }),
        }
    }

    fn or_expr(&mut self) -> Result<Expression, ParseError> {
        let first = self.and_expr()?;
        let mut operands = vec![first];
        while self.eat_keyword("OR") {
            operands.push(self.and_expr()?);
        }
        if operands.len() == 1 {
            Ok(operands.pop().unwrap_or(Expression::Constant(Value::Empty)))
        } else {
            Ok(Expression::Logical { op: LogicalOp::Or, operands })
        }
    }

    fn and_expr(&mut self) -> Result<Expression, ParseError> {
        let first = self.not_expr()?;
        let mut operands = vec![first];
        while self.eat_keyword("AND") {
            operands.push(self.not_expr()?);
        }
        if operands.len() == 1 {
            Ok(operands.pop().unwrap_or(Expression::Constant(Value::Empty)))
        } else {
            Ok(Expression::Logical { op: LogicalOp::And, operands })
        }
    }

    fn not_expr(&mut self) -> Result<Expression, ParseError> {
        if self.eat_keyword("NOT") {
            return Ok(Expression::not(self.not_expr()?));
        }
        if matches!(self.peek(), Some(Token::Bang)) {
            self.pos += 1;
            return Ok(Expression::not(self.not_expr()?));
        }
        self.rel_expr()
    }

    fn rel_expr(&mut self) -> Result<Expression, ParseError> {
        let left = self.add_expr()?;
        let op = match self.peek() {
            Some(Token::EqEq) => Some(RelOp::Eq),
            Some(Token::NotEq) => Some(RelOp::Ne),
            Some(Token::Lt) => Some(RelOp::Lt),
            Some(Token::Le) => Some(RelOp::Le),
            Some(Token::Gt) => Some(RelOp::Gt),
            Some(Token::Ge) => Some(RelOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let right = self.add_expr()?;
            return Ok(Expression::relational(op, left, right));
        }
        if self.eat_keyword("IN") {
            let right = self.add_expr()?;
            return Ok(Expression::relational(RelOp::In, left, right));
        }
        if self.eat_keyword("CONTAINS") {
            let right = self.add_expr()?;
            return Ok(Expression::relational(RelOp::Contains, left, right));
        }
        if self.eat_keyword("STARTS") {
            self.keyword("WITH")?;
            let right = self.add_expr()?;
            return Ok(Expression::relational(RelOp::StartsWith, left, right));
        }
        if self.eat_keyword("ENDS") {
            self.keyword("WITH")?;
            let right = self.add_expr()?;
            return Ok(Expression::relational(RelOp::EndsWith, left, right));
        }
        Ok(left)
    }

    fn keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            match self.peek() {
                Some(token) => Err(ParseError::Unexpected {
                    expected: kw.to_string(),
                    found: token.to_string(),
                }),
                None => Err(ParseError::UnexpectedEnd { expected: kw.to_string() }),
            }
        }
    }

    fn add_expr(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.mul_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.mul_expr()?;
            left = Expression::Arithmetic { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn mul_expr(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Slash) => ArithOp::Div,
                Some(Token::Percent) => ArithOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.unary_expr()?;
            left = Expression::Arithmetic { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn unary_expr(&mut self) -> Result<Expression, ParseError> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.pos += 1;
            // Fold the sign into an immediately following integer literal so
            // i64::MIN is representable without an overflowing negation.
            if let Some(Token::Num { text, is_float }) = self.peek().cloned() {
                self.pos += 1;
                return self.negative_literal(&text, is_float);
            }
            return Ok(Expression::Unary {
                op: UnaryOp::Negate,
                operand: Box::new(self.unary_expr()?),
            });
        }
        self.postfix_expr()
    }

    fn negative_literal(&mut self, text: &str, is_float: bool) -> Result<Expression, ParseError> {
        if is_float {
            let v: f64 = text
                .parse()
                .map_err(|_| ParseError::BadFloat { text: text.to_string() })?;
            return Ok(Expression::Constant(Value::Float(-v)));
        }
        let magnitude: i128 = text
            .parse()
            .map_err(|_| ParseError::IntOutOfRange { text: text.to_string() })?;
        let v = -magnitude;
        if v < i128::from(i64::MIN) {
            return Err(ParseError::IntOutOfRange { text: format!("-{text}") });
        }
        Ok(Expression::Constant(Value::Int(v as i64)))
    }

    fn postfix_expr(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.primary_expr()?;
        while matches!(self.peek(), Some(Token::LBracket)) {
            self.pos += 1;
            let index = self.or_expr()?;
            self.expect(&Token::RBracket, "']'")?;
            expr = Expression::Subscript { collection: Box::new(expr), index: Box::new(index) };
        }
        Ok(expr)
    }

    fn primary_expr(&mut self) -> Result<Expression, ParseError> {
        match self.next() {
            Some(Token::Num { text, is_float }) => {
                if is_float {
                    let v: f64 = text.parse().map_err(|_| ParseError::BadFloat { text })?;
                    Ok(Expression::Constant(Value::Float(v)))
                } else {
                    let v: i64 = text
                        .parse()
                        .map_err(|_| ParseError::IntOutOfRange { text })?;
                    Ok(Expression::Constant(Value::Int(v)))
                }
            }
            Some(Token::Str(s)) => Ok(Expression::Constant(Value::Str(s))),
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let items = self.expr_list(&Token::RBracket, "']'")?;
                Ok(Expression::ListLiteral(items))
            }
            Some(Token::LBrace) => self.brace_literal(),
            Some(Token::DollarCaret) => {
                self.expect(&Token::Dot, "'.'")?;
                let tag = self.ident("tag name")?;
                self.expect(&Token::Dot, "'.'")?;
                let prop = self.ident("property name")?;
                Ok(Expression::SrcProperty { tag, prop })
            }
            Some(Token::DollarDollar) => {
                self.expect(&Token::Dot, "'.'")?;
                let tag = self.ident("tag name")?;
                self.expect(&Token::Dot, "'.'")?;
                let prop = self.ident("property name")?;
                Ok(Expression::DstProperty { tag, prop })
            }
            Some(Token::DollarMinus) => {
                self.expect(&Token::Dot, "'.'")?;
                let name = self.ident("column name")?;
                Ok(Expression::InputProperty(name))
            }
            Some(Token::Dollar) => {
                let name = self.ident("variable name")?;
                Ok(Expression::Variable(name))
            }
            Some(Token::Ident(name)) => self.ident_expr(name),
            Some(token) => Err(ParseError::Unexpected {
                expected: "expression".to_string(),
                found: token.to_string(),
            }),
            None => Err(ParseError::UnexpectedEnd { expected: "expression".to_string() }),
        }
    }

    fn ident_expr(&mut self, name: String) -> Result<Expression, ParseError> {
        if name.eq_ignore_ascii_case("true") {
            return Ok(Expression::Constant(Value::Bool(true)));
        }
        if name.eq_ignore_ascii_case("false") {
            return Ok(Expression::Constant(Value::Bool(false)));
        }
        if name.eq_ignore_ascii_case("null") {
            return Ok(Expression::Constant(Value::Null));
        }
        match self.peek() {
            Some(Token::LParen) => {
                self.pos += 1;
                let args = self.expr_list(&Token::RParen, "')'")?;
                Ok(Expression::FunctionCall { name, args })
            }
            Some(Token::Dot) => {
                self.pos += 1;
                let attr = self.ident("property name")?;
                Ok(match attr.as_str() {
                    "_src" => Expression::EdgeSrc { edge: name },
                    "_dst" => Expression::EdgeDst { edge: name },
                    "_type" => Expression::EdgeTypeOf { edge: name },
                    "_rank" => Expression::EdgeRank { edge: name },
                    _ => Expression::LabelAttribute { label: name, attr },
                })
            }
            _ => Err(ParseError::Unexpected {
                expected: "'.' or '('".to_string(),
                found: format!("'{name}'"),
            }),
        }
    }

    fn brace_literal(&mut self) -> Result<Expression, ParseError> {
        // `{k: v, ...}` is a map; `{v, ...}` is a set. Disambiguate by the
        // token after the first element's identifier.
        if matches!(self.peek(), Some(Token::RBrace)) {
            self.pos += 1;
            return Ok(Expression::SetLiteral(Vec::new()));
        }
        let is_map = matches!(
            (self.peek(), self.tokens.get(self.pos + 1)),
            (Some(Token::Ident(_) | Token::Str(_)), Some(Token::Colon))
        );
        if is_map {
            let mut entries = Vec::new();
            loop {
                let key = match self.next() {
                    Some(Token::Ident(k) | Token::Str(k)) => k,
                    Some(token) => {
                        return Err(ParseError::Unexpected {
                            expected: "map key".to_string(),
                            found: token.to_string(),
                        })
                    }
                    None => {
                        return Err(ParseError::UnexpectedEnd { expected: "map key".to_string() })
                    }
                };
                self.expect(&Token::Colon, "':'")?;
                entries.push((key, self.or_expr()?));
                match self.next() {
                    Some(Token::Comma) => {}
                    Some(Token::RBrace) => break,
                    Some(token) => {
                        return Err(ParseError::Unexpected {
                            expected: "',' or '}'".to_string(),
                            found: token.to_string(),
                        })
                    }
                    None => {
                        return Err(ParseError::UnexpectedEnd { expected: "'}'".to_string() })
                    }
                }
            }
            Ok(Expression::MapLiteral(entries))
        } else {
            let items = self.expr_list(&Token::RBrace, "'}'")?;
            Ok(Expression::SetLiteral(items))
        }
    }

    fn expr_list(&mut self, close: &Token, what: &str) -> Result<Vec<Expression>, ParseError> {
        let mut items = Vec::new();
        if self.peek() == Some(close) {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            items.push(self.or_expr()?);
            match self.next() {
                Some(Token::Comma) => {}
                Some(token) if token == *close => break,
                Some(token) => {
                    return Err(ParseError::Unexpected {
                        expected: format!("',' or {what}"),
                        found: token.to_string(),
                    })
                }
                None => return Err(ParseError::UnexpectedEnd { expected: what.to_string() }),
            }
        }
        Ok(items)
    }
}

/// Parse one expression; trailing input is an error.
pub fn parse_expression(input: &str) -> Result<Expression, ParseError> {
    let tokens = lex(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or_expr()?;
    if let Some(extra) = parser.peek() {
        return Err(ParseError::Unexpected {
            expected: "end of expression".to_string(),
            found: extra.to_string(),
        });
    }
    Ok(expr)
}
