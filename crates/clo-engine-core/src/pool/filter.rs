//! Collateral-pool predicate grammar (§4.4).
//!
//! A small boolean expression language over asset fields: comparison
//! operators plus logical `and`, `or`, `not`, with parenthesization.
//! Precedence: `not` (unary, highest) > `and` > `or`.
//!
//! Per the Open Question in `spec.md` §9, `not` is specified as a unary
//! prefix operator only — it is never a binary operator, so a malformed
//! sequence like `a not and b` (two operators back-to-back with no
//! operand between `a` and `not`) is rejected as a syntax error by the
//! parser below rather than silently reinterpreted.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::EngineResult;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(Decimal),
    Text(String),
    Bool(bool),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{n}"),
            Literal::Text(s) => write!(f, "\"{s}\""),
            Literal::Bool(b) => write!(f, "{b}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::Neq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        };
        write!(f, "{s}")
    }
}

/// The parsed filter AST.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Compare {
        field: String,
        op: CompareOp,
        value: Literal,
    },
    Not(Box<FilterExpr>),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::Compare { field, op, value } => write!(f, "{field} {op} {value}"),
            FilterExpr::Not(inner) => write!(f, "not ({inner})"),
            FilterExpr::And(l, r) => write!(f, "({l}) and ({r})"),
            FilterExpr::Or(l, r) => write!(f, "({l}) or ({r})"),
        }
    }
}

/// A resolved field value during evaluation against one asset.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Number(Decimal),
    Text(String),
    Bool(bool),
}

/// Implemented by anything a filter can be evaluated against (the
/// collateral pool asset view).
pub trait FilterContext {
    fn field(&self, name: &str) -> Option<FieldValue>;
}

impl FilterExpr {
    pub fn evaluate(&self, ctx: &dyn FilterContext) -> EngineResult<bool> {
        match self {
            FilterExpr::Compare { field, op, value } => {
                let actual = ctx.field(field).ok_or_else(|| EngineError::BadInput {
                    field: field.clone(),
                    reason: "unknown filter field".into(),
                })?;
                compare(&actual, op, value)
            }
            FilterExpr::Not(inner) => Ok(!inner.evaluate(ctx)?),
            FilterExpr::And(l, r) => Ok(l.evaluate(ctx)? && r.evaluate(ctx)?),
            FilterExpr::Or(l, r) => Ok(l.evaluate(ctx)? || r.evaluate(ctx)?),
        }
    }
}

fn compare(actual: &FieldValue, op: &CompareOp, expected: &Literal) -> EngineResult<bool> {
    let ordering = match (actual, expected) {
        (FieldValue::Number(a), Literal::Number(b)) => a.partial_cmp(b),
        (FieldValue::Text(a), Literal::Text(b)) => a.partial_cmp(b),
        (FieldValue::Bool(a), Literal::Bool(b)) => a.partial_cmp(b),
        _ => {
            return Err(EngineError::BadInput {
                field: "filter".into(),
                reason: "type mismatch between field value and literal".into(),
            })
        }
    };
    let ordering = ordering.ok_or_else(|| EngineError::BadInput {
        field: "filter".into(),
        reason: "incomparable values".into(),
    })?;
    use std::cmp::Ordering::*;
    Ok(match op {
        CompareOp::Eq => ordering == Equal,
        CompareOp::Neq => ordering != Equal,
        CompareOp::Lt => ordering == Less,
        CompareOp::Lte => ordering != Greater,
        CompareOp::Gt => ordering == Greater,
        CompareOp::Gte => ordering != Less,
    })
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(Decimal),
    Text(String),
    Op(CompareOp),
    And,
    Or,
    Not,
    True,
    False,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> EngineResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' => {
                let mut j = i + 1;
                let mut s = String::new();
                while j < chars.len() && chars[j] != '"' {
                    s.push(chars[j]);
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(EngineError::BadInput {
                        field: "filter".into(),
                        reason: "unterminated string literal".into(),
                    });
                }
                tokens.push(Token::Text(s));
                i = j + 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CompareOp::Eq));
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CompareOp::Neq));
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CompareOp::Lte));
                i += 2;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CompareOp::Gte));
                i += 2;
            }
            '<' => {
                tokens.push(Token::Op(CompareOp::Lt));
                i += 1;
            }
            '>' => {
                tokens.push(Token::Op(CompareOp::Gt));
                i += 1;
            }
            _ if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) => {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
                    j += 1;
                }
                let text: String = chars[i..j].iter().collect();
                let number: Decimal = text.parse().map_err(|_| EngineError::BadInput {
                    field: "filter".into(),
                    reason: format!("invalid number literal '{text}'"),
                })?;
                tokens.push(Token::Number(number));
                i = j;
            }
            _ if c.is_alphabetic() || c == '_' => {
                let mut j = i;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_' || chars[j] == '.') {
                    j += 1;
                }
                let word: String = chars[i..j].iter().collect();
                tokens.push(match word.to_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(word),
                });
                i = j;
            }
            _ => {
                return Err(EngineError::BadInput {
                    field: "filter".into(),
                    reason: format!("unexpected character '{c}'"),
                })
            }
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Recursive-descent parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, token: &Token) -> EngineResult<()> {
        match self.advance() {
            Some(t) if t == *token => Ok(()),
            other => Err(EngineError::BadInput {
                field: "filter".into(),
                reason: format!("expected {token:?}, found {other:?}"),
            }),
        }
    }

    // or_expr := and_expr (OR and_expr)*
    fn parse_or(&mut self) -> EngineResult<FilterExpr> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let right = self.parse_and()?;
            left = FilterExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // and_expr := unary (AND unary)*
    fn parse_and(&mut self) -> EngineResult<FilterExpr> {
        let mut left = self.parse_unary()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let right = self.parse_unary()?;
            left = FilterExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // unary := NOT unary | primary
    fn parse_unary(&mut self) -> EngineResult<FilterExpr> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(FilterExpr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    // primary := '(' or_expr ')' | comparison
    fn parse_primary(&mut self) -> EngineResult<FilterExpr> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(field)) => {
                let op = match self.advance() {
                    Some(Token::Op(op)) => op,
                    other => {
                        return Err(EngineError::BadInput {
                            field: "filter".into(),
                            reason: format!("expected comparison operator, found {other:?}"),
                        })
                    }
                };
                let value = match self.advance() {
                    Some(Token::Number(n)) => Literal::Number(n),
                    Some(Token::Text(s)) => Literal::Text(s),
                    Some(Token::True) => Literal::Bool(true),
                    Some(Token::False) => Literal::Bool(false),
                    other => {
                        return Err(EngineError::BadInput {
                            field: "filter".into(),
                            reason: format!("expected literal, found {other:?}"),
                        })
                    }
                };
                Ok(FilterExpr::Compare { field, op, value })
            }
            other => Err(EngineError::BadInput {
                field: "filter".into(),
                reason: format!("expected '(' or field name, found {other:?}"),
            }),
        }
    }
}

/// Parse a filter expression string into its AST.
pub fn parse(input: &str) -> EngineResult<FilterExpr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(EngineError::BadInput {
            field: "filter".into(),
            reason: "empty filter expression".into(),
        });
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(EngineError::BadInput {
            field: "filter".into(),
            reason: "trailing tokens after valid expression".into(),
        });
    }
    Ok(expr)
}
