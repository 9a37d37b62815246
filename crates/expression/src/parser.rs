//! Lexer and Pratt parser for the expression language.

use serde_json::Value;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::ExpressionError;

/// Parse source text into an AST.
pub fn parse(source: &str) -> Result<Expr, ExpressionError> {
    let tokens = lex(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expression(0)?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(ExpressionError::parse(
            tok.offset,
            format!("unexpected trailing token {:?}", tok.kind),
        )),
    }
}

// ── Lexer ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
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
    AndAnd,
    OrOr,
    Bang,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn lex(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }
            '+' => {
                tokens.push(Token { kind: TokenKind::Plus, offset: start });
                i += 1;
            }
            '-' => {
                tokens.push(Token { kind: TokenKind::Minus, offset: start });
                i += 1;
            }
            '*' => {
                tokens.push(Token { kind: TokenKind::Star, offset: start });
                i += 1;
            }
            '/' => {
                tokens.push(Token { kind: TokenKind::Slash, offset: start });
                i += 1;
            }
            '%' => {
                tokens.push(Token { kind: TokenKind::Percent, offset: start });
                i += 1;
            }
            '.' => {
                tokens.push(Token { kind: TokenKind::Dot, offset: start });
                i += 1;
            }
            ',' => {
                tokens.push(Token { kind: TokenKind::Comma, offset: start });
                i += 1;
            }
            '(' => {
                tokens.push(Token { kind: TokenKind::LParen, offset: start });
                i += 1;
            }
            ')' => {
                tokens.push(Token { kind: TokenKind::RParen, offset: start });
                i += 1;
            }
            '[' => {
                tokens.push(Token { kind: TokenKind::LBracket, offset: start });
                i += 1;
            }
            ']' => {
                tokens.push(Token { kind: TokenKind::RBracket, offset: start });
                i += 1;
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token { kind: TokenKind::EqEq, offset: start });
                    i += 2;
                } else {
                    return Err(ExpressionError::parse(start, "expected `==`"));
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token { kind: TokenKind::NotEq, offset: start });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Bang, offset: start });
                    i += 1;
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token { kind: TokenKind::Le, offset: start });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Lt, offset: start });
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token { kind: TokenKind::Ge, offset: start });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Gt, offset: start });
                    i += 1;
                }
            }
            '&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push(Token { kind: TokenKind::AndAnd, offset: start });
                    i += 2;
                } else {
                    return Err(ExpressionError::parse(start, "expected `&&`"));
                }
            }
            '|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push(Token { kind: TokenKind::OrOr, offset: start });
                    i += 2;
                } else {
                    return Err(ExpressionError::parse(start, "expected `||`"));
                }
            }
            '\'' | '"' => {
                let quote = c;
                i += 1;
                let mut s = String::new();
                loop {
                    let Some(ch) = source[i..].chars().next() else {
                        return Err(ExpressionError::parse(start, "unterminated string"));
                    };
                    if ch == quote {
                        i += 1;
                        break;
                    }
                    if ch == '\\' {
                        let escaped = source[i + 1..].chars().next().ok_or_else(|| {
                            ExpressionError::parse(i, "dangling escape")
                        })?;
                        s.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            '\\' => '\\',
                            other => other,
                        });
                        i += 1 + escaped.len_utf8();
                    } else {
                        s.push(ch);
                        i += ch.len_utf8();
                    }
                }
                tokens.push(Token { kind: TokenKind::Str(s), offset: start });
            }
            '0'..='9' => {
                let mut end = i;
                let mut is_float = false;
                while end < bytes.len() {
                    match bytes[end] {
                        b'0'..=b'9' => end += 1,
                        // a dot is part of the number only when a digit follows;
                        // otherwise it is property access (e.g. `1.to_string` is
                        // not supported, but `items[0].x` lexes the dot separately)
                        b'.' if !is_float
                            && bytes.get(end + 1).is_some_and(u8::is_ascii_digit) =>
                        {
                            is_float = true;
                            end += 1;
                        }
                        _ => break,
                    }
                }
                let text = &source[i..end];
                let kind = if is_float {
                    TokenKind::Float(text.parse().map_err(|_| {
                        ExpressionError::parse(start, format!("invalid number {text:?}"))
                    })?)
                } else {
                    TokenKind::Int(text.parse().map_err(|_| {
                        ExpressionError::parse(start, format!("invalid number {text:?}"))
                    })?)
                };
                tokens.push(Token { kind, offset: start });
                i = end;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = i;
                while end < bytes.len()
                    && ((bytes[end] as char).is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                let word = &source[i..end];
                let kind = match word {
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    "null" => TokenKind::Null,
                    _ => TokenKind::Ident(word.to_owned()),
                };
                tokens.push(Token { kind, offset: start });
                i = end;
            }
            other => {
                return Err(ExpressionError::parse(
                    start,
                    format!("unexpected character {other:?}"),
                ));
            }
        }
    }

    Ok(tokens)
}

// ── Parser ──────────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), ExpressionError> {
        match self.advance() {
            Some(tok) if tok.kind == *kind => Ok(()),
            Some(tok) => Err(ExpressionError::parse(
                tok.offset,
                format!("expected {what}, found {:?}", tok.kind),
            )),
            None => Err(ExpressionError::parse(
                self.end_offset(),
                format!("expected {what}, found end of input"),
            )),
        }
    }

    fn end_offset(&self) -> usize {
        self.tokens.last().map_or(0, |t| t.offset + 1)
    }

    /// Pratt expression parser.
    fn expression(&mut self, min_bp: u8) -> Result<Expr, ExpressionError> {
        let mut left = self.prefix()?;

        while let Some(op) = self.peek_binary_op() {
            let bp = op.binding_power();
            if bp <= min_bp {
                break;
            }
            self.advance();
            let right = self.expression(bp)?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn peek_binary_op(&self) -> Option<BinaryOp> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Plus) => Some(BinaryOp::Add),
            Some(TokenKind::Minus) => Some(BinaryOp::Sub),
            Some(TokenKind::Star) => Some(BinaryOp::Mul),
            Some(TokenKind::Slash) => Some(BinaryOp::Div),
            Some(TokenKind::Percent) => Some(BinaryOp::Mod),
            Some(TokenKind::EqEq) => Some(BinaryOp::Eq),
            Some(TokenKind::NotEq) => Some(BinaryOp::Ne),
            Some(TokenKind::Lt) => Some(BinaryOp::Lt),
            Some(TokenKind::Le) => Some(BinaryOp::Le),
            Some(TokenKind::Gt) => Some(BinaryOp::Gt),
            Some(TokenKind::Ge) => Some(BinaryOp::Ge),
            Some(TokenKind::AndAnd) => Some(BinaryOp::And),
            Some(TokenKind::OrOr) => Some(BinaryOp::Or),
            _ => None,
        }
    }

    fn prefix(&mut self) -> Result<Expr, ExpressionError> {
        let tok = self.advance().ok_or_else(|| {
            ExpressionError::parse(self.end_offset(), "expected expression, found end of input")
        })?;

        let expr = match tok.kind {
            TokenKind::Int(n) => Expr::Literal(Value::from(n)),
            TokenKind::Float(f) => Expr::Literal(
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| ExpressionError::parse(tok.offset, "non-finite number"))?,
            ),
            TokenKind::Str(s) => Expr::Literal(Value::String(s)),
            TokenKind::True => Expr::Literal(Value::Bool(true)),
            TokenKind::False => Expr::Literal(Value::Bool(false)),
            TokenKind::Null => Expr::Literal(Value::Null),
            TokenKind::Minus => {
                let operand = self.prefix()?;
                Expr::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(operand),
                }
            }
            TokenKind::Bang => {
                let operand = self.prefix()?;
                Expr::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(operand),
                }
            }
            TokenKind::LParen => {
                let inner = self.expression(0)?;
                self.expect(&TokenKind::RParen, "`)`")?;
                inner
            }
            TokenKind::Ident(name) => {
                if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen)) {
                    self.advance();
                    let mut args = Vec::new();
                    if !matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RParen)) {
                        loop {
                            args.push(self.expression(0)?);
                            match self.peek().map(|t| &t.kind) {
                                Some(TokenKind::Comma) => {
                                    self.advance();
                                }
                                _ => break,
                            }
                        }
                    }
                    self.expect(&TokenKind::RParen, "`)`")?;
                    Expr::Call {
                        function: name,
                        args,
                    }
                } else {
                    Expr::Variable(name)
                }
            }
            other => {
                return Err(ExpressionError::parse(
                    tok.offset,
                    format!("unexpected token {other:?}"),
                ));
            }
        };

        self.postfix(expr)
    }

    /// Apply `.name` and `[index]` postfix chains.
    fn postfix(&mut self, mut expr: Expr) -> Result<Expr, ExpressionError> {
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Dot) => {
                    self.advance();
                    let tok = self.advance().ok_or_else(|| {
                        ExpressionError::parse(self.end_offset(), "expected property name")
                    })?;
                    let TokenKind::Ident(name) = tok.kind else {
                        return Err(ExpressionError::parse(
                            tok.offset,
                            "expected property name after `.`",
                        ));
                    };
                    expr = Expr::Property {
                        object: Box::new(expr),
                        name,
                    };
                }
                Some(TokenKind::LBracket) => {
                    self.advance();
                    let index = self.expression(0)?;
                    self.expect(&TokenKind::RBracket, "`]`")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn literals() {
        assert_eq!(parse("42").unwrap(), Expr::Literal(json!(42)));
        assert_eq!(parse("2.5").unwrap(), Expr::Literal(json!(2.5)));
        assert_eq!(parse("'hi'").unwrap(), Expr::Literal(json!("hi")));
        assert_eq!(parse("\"hi\"").unwrap(), Expr::Literal(json!("hi")));
        assert_eq!(parse("true").unwrap(), Expr::Literal(json!(true)));
        assert_eq!(parse("null").unwrap(), Expr::Literal(Value::Null));
    }

    #[test]
    fn variable_and_property_chain() {
        let expr = parse("input.user.name").unwrap();
        assert_eq!(
            expr,
            Expr::Property {
                object: Box::new(Expr::Property {
                    object: Box::new(Expr::Variable("input".into())),
                    name: "user".into(),
                }),
                name: "name".into(),
            }
        );
    }

    #[test]
    fn index_access() {
        let expr = parse("items[0]").unwrap();
        assert_eq!(
            expr,
            Expr::Index {
                object: Box::new(Expr::Variable("items".into())),
                index: Box::new(Expr::Literal(json!(0))),
            }
        );
    }

    #[test]
    fn precedence_mul_over_add() {
        let expr = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                left: Box::new(Expr::Literal(json!(1))),
                op: BinaryOp::Add,
                right: Box::new(Expr::Binary {
                    left: Box::new(Expr::Literal(json!(2))),
                    op: BinaryOp::Mul,
                    right: Box::new(Expr::Literal(json!(3))),
                }),
            }
        );
    }

    #[test]
    fn precedence_comparison_over_and() {
        let expr = parse("a > 1 && b < 2").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::And, .. } => {}
            other => panic!("expected And at the root, got {other:?}"),
        }
    }

    #[test]
    fn parens_override_precedence() {
        let expr = parse("(1 + 2) * 3").unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Mul, .. } => {}
            other => panic!("expected Mul at the root, got {other:?}"),
        }
    }

    #[test]
    fn unary_operators() {
        assert_eq!(
            parse("-x").unwrap(),
            Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(Expr::Variable("x".into())),
            }
        );
        assert_eq!(
            parse("!ok").unwrap(),
            Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(Expr::Variable("ok".into())),
            }
        );
    }

    #[test]
    fn call_with_args() {
        let expr = parse("min(a, 3)").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                function: "min".into(),
                args: vec![Expr::Variable("a".into()), Expr::Literal(json!(3))],
            }
        );
    }

    #[test]
    fn call_no_args_then_property() {
        let expr = parse("keys(input).length").unwrap();
        match expr {
            Expr::Property { name, .. } => assert_eq!(name, "length"),
            other => panic!("expected property access, got {other:?}"),
        }
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            parse(r#"'a\'b'"#).unwrap(),
            Expr::Literal(json!("a'b"))
        );
        assert_eq!(parse(r#""x\ny""#).unwrap(), Expr::Literal(json!("x\ny")));
    }

    #[test]
    fn non_ascii_string_content() {
        assert_eq!(parse("'héllo wörld'").unwrap(), Expr::Literal(json!("héllo wörld")));
    }

    #[test]
    fn errors_carry_offsets() {
        match parse("1 + $") {
            Err(ExpressionError::Parse { offset, .. }) => assert_eq!(offset, 4),
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(parse("").is_err());
        assert!(parse("1 2").is_err());
        assert!(parse("'unterminated").is_err());
        assert!(parse("a &").is_err());
    }
}
