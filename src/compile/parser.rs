//! Parser for index-notation source text.
//!
//! # Grammar
//!
//! ```text
//! program   ::= statement (('\n' | ';') statement)*
//! statement ::= expr (('=' | ':=' | '+=' | '-=') expr)?
//! expr      ::= term (('+' | '-') term)*
//! term      ::= unary (('*' | '/') unary)*
//! unary     ::= ('+' | '-') unary | postfix
//! postfix   ::= primary ('[' indices ']' | '\'')*
//! primary   ::= number | ident | ident '(' expr,* ')' | '(' expr ')'
//! indices   ::= index,* (';' index,*)?
//! ```
//!
//! A `;` inside brackets splits the left (codomain) and right (domain)
//! index rows; outside brackets it separates statements.

use super::ast::{AssignOp, Expr};
use crate::error::{TensorOpsError, TensorOpsResult};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Prime,
    Assign,
    Define,
    AddAssign,
    SubAssign,
    Newline,
}

struct Lexer<'a> {
    chars: core::iter::Peekable<core::str::Chars<'a>>,
    line: u32,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().peekable(),
            line: 1,
        }
    }

    fn tokenize(mut self) -> TensorOpsResult<Vec<(Token, u32)>> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.chars.next();
                }
                '\n' => {
                    self.chars.next();
                    tokens.push((Token::Newline, self.line));
                    self.line += 1;
                }
                '#' => {
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                }
                '0'..='9' => tokens.push((self.number()?, self.line)),
                c if is_ident_start(c) => tokens.push((self.ident(), self.line)),
                _ => {
                    self.chars.next();
                    let token = match c {
                        '\'' | '\u{2032}' => Token::Prime,
                        '(' => Token::LParen,
                        ')' => Token::RParen,
                        '[' => Token::LBracket,
                        ']' => Token::RBracket,
                        ',' => Token::Comma,
                        ';' => Token::Semi,
                        '*' => Token::Star,
                        '/' => Token::Slash,
                        '+' => self.with_eq(Token::AddAssign, Token::Plus),
                        '-' => self.with_eq(Token::SubAssign, Token::Minus),
                        ':' => {
                            if self.chars.peek() == Some(&'=') {
                                self.chars.next();
                                Token::Define
                            } else {
                                return Err(TensorOpsError::expression(format!(
                                    "line {}: expected '=' after ':'",
                                    self.line
                                )));
                            }
                        }
                        '=' => Token::Assign,
                        other => {
                            return Err(TensorOpsError::expression(format!(
                                "line {}: unexpected character '{}'",
                                self.line, other
                            )));
                        }
                    };
                    tokens.push((token, self.line));
                }
            }
        }
        Ok(tokens)
    }

    fn with_eq(&mut self, combined: Token, plain: Token) -> Token {
        if self.chars.peek() == Some(&'=') {
            self.chars.next();
            combined
        } else {
            plain
        }
    }

    fn number(&mut self) -> TensorOpsResult<Token> {
        let mut text = String::new();
        let mut is_float = false;
        while let Some(&c) = self.chars.peek() {
            match c {
                '0'..='9' => {
                    text.push(c);
                    self.chars.next();
                }
                '.' | 'e' | 'E' => {
                    is_float = true;
                    text.push(c);
                    self.chars.next();
                    if (c == 'e' || c == 'E') && matches!(self.chars.peek(), Some('+') | Some('-'))
                    {
                        text.push(self.chars.next().unwrap());
                    }
                }
                _ => break,
            }
        }
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| TensorOpsError::expression(format!("bad numeric literal '{}'", text)))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| TensorOpsError::expression(format!("bad numeric literal '{}'", text)))
        }
    }

    fn ident(&mut self) -> Token {
        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            if is_ident_continue(c) {
                text.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        Token::Ident(text)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

struct Parser {
    tokens: Vec<(Token, u32)>,
    pos: usize,
}

/// Parses source text into a block of statements with line annotations.
pub fn parse(src: &str) -> TensorOpsResult<Expr> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut statements = Vec::new();
    loop {
        parser.skip_separators();
        if parser.at_end() {
            break;
        }
        statements.push(Expr::Line(parser.current_line()));
        statements.push(parser.statement()?);
        if !parser.at_end() && !parser.at_separator() {
            return Err(TensorOpsError::expression(format!(
                "line {}: expected end of statement",
                parser.current_line()
            )));
        }
    }
    Ok(Expr::Block(statements))
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn current_line(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|&(_, line)| line)
            .unwrap_or(1)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> TensorOpsResult<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(TensorOpsError::expression(format!(
                "line {}: expected {:?}",
                self.current_line(),
                token
            )))
        }
    }

    fn at_separator(&self) -> bool {
        matches!(self.peek(), Some(Token::Newline) | Some(Token::Semi))
    }

    fn skip_separators(&mut self) {
        while self.at_separator() {
            self.pos += 1;
        }
    }

    fn statement(&mut self) -> TensorOpsResult<Expr> {
        let lhs = self.expr()?;
        let op = match self.peek() {
            Some(Token::Assign) => Some(AssignOp::Assign),
            Some(Token::Define) => Some(AssignOp::Define),
            Some(Token::AddAssign) => Some(AssignOp::AddAssign),
            Some(Token::SubAssign) => Some(AssignOp::SubAssign),
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                let rhs = self.expr()?;
                Ok(Expr::Assign {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                })
            }
            None => Ok(lhs),
        }
    }

    fn expr(&mut self) -> TensorOpsResult<Expr> {
        let mut lhs = self.term()?;
        loop {
            if self.eat(&Token::Plus) {
                let rhs = self.term()?;
                lhs = Expr::Add(Box::new(lhs), Box::new(rhs));
            } else if self.eat(&Token::Minus) {
                let rhs = self.term()?;
                lhs = Expr::Sub(Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn term(&mut self) -> TensorOpsResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            if self.eat(&Token::Star) {
                let rhs = self.unary()?;
                lhs = match lhs {
                    Expr::Mul(mut factors) => {
                        factors.push(rhs);
                        Expr::Mul(factors)
                    }
                    other => Expr::Mul(vec![other, rhs]),
                };
            } else if self.eat(&Token::Slash) {
                let rhs = self.unary()?;
                lhs = Expr::Div(Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn unary(&mut self) -> TensorOpsResult<Expr> {
        if self.eat(&Token::Minus) {
            Ok(Expr::Neg(Box::new(self.unary()?)))
        } else if self.eat(&Token::Plus) {
            self.unary()
        } else {
            self.postfix()
        }
    }

    fn postfix(&mut self) -> TensorOpsResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::LBracket) {
                let (left, right) = self.index_rows()?;
                expr = Expr::Tensor {
                    obj: Box::new(expr),
                    left,
                    right,
                };
            } else if self.eat(&Token::Prime) {
                expr = Expr::Prime(Box::new(expr));
            } else {
                return Ok(expr);
            }
        }
    }

    fn index_rows(&mut self) -> TensorOpsResult<(Vec<Expr>, Vec<Expr>)> {
        let left = self.index_row()?;
        let right = if self.eat(&Token::Semi) {
            self.index_row()?
        } else {
            Vec::new()
        };
        self.expect(Token::RBracket)?;
        Ok((left, right))
    }

    fn index_row(&mut self) -> TensorOpsResult<Vec<Expr>> {
        let mut row = Vec::new();
        if matches!(self.peek(), Some(Token::RBracket) | Some(Token::Semi)) {
            return Ok(row);
        }
        loop {
            row.push(self.expr()?);
            if !self.eat(&Token::Comma) {
                return Ok(row);
            }
        }
    }

    fn primary(&mut self) -> TensorOpsResult<Expr> {
        match self.bump() {
            Some(Token::Int(v)) => Ok(Expr::Int(v)),
            Some(Token::Float(v)) => Ok(Expr::Float(v)),
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let mut args = Vec::new();
                    if !self.eat(&Token::RParen) {
                        loop {
                            args.push(self.expr()?);
                            if self.eat(&Token::RParen) {
                                break;
                            }
                            self.expect(Token::Comma)?;
                        }
                    }
                    Ok(Expr::Call { func: name, args })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            other => Err(TensorOpsError::expression(format!(
                "line {}: unexpected token {:?}",
                self.current_line(),
                other
            ))),
        }
    }
}
