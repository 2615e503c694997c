//! Recursive-descent parser for rule conditions.
//!
//! Precedence, loosest first: `or`, `and`, `not`, a single comparison,
//! `+ -`, `* / %`, unary `-`, `["key"]` indexing.

use crate::error::{AlertError, Result};
use crate::expr::ast::{ArithOp, CompareOp, Expr, Helper};
use crate::expr::lexer::{Token, TokenKind, tokenize};

/// Longest accepted condition, in bytes.
pub const MAX_SOURCE_LEN: usize = 4096;

/// Deepest accepted nesting.
pub const MAX_DEPTH: usize = 64;

/// The identifier that names the whole view.
const VIEW_IDENT: &str = "metrics";

/// Parses a condition into a syntax tree.
pub(crate) fn parse(src: &str) -> Result<Expr> {
    if src.len() > MAX_SOURCE_LEN {
        return Err(AlertError::ParseError {
            position: MAX_SOURCE_LEN,
            reason: format!("condition exceeds {MAX_SOURCE_LEN} bytes"),
        });
    }
    if src.trim().is_empty() {
        return Err(AlertError::ParseError {
            position: 0,
            reason: "condition is empty".to_string(),
        });
    }

    let mut parser = Parser {
        tokens: tokenize(src)?,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expr()?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::Eof {
        return Err(AlertError::ParseError {
            position: trailing.pos,
            reason: format!("unexpected {} after expression", trailing.kind),
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token list always ends with Eof and `pos` never passes it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token> {
        let token = self.advance();
        if &token.kind == kind {
            Ok(token)
        } else {
            Err(AlertError::ParseError {
                position: token.pos,
                reason: format!("expected {kind}, found {}", token.kind),
            })
        }
    }

    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(AlertError::ParseError {
                position: self.peek().pos,
                reason: format!("expression nests deeper than {MAX_DEPTH}"),
            });
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    fn expr(&mut self) -> Result<Expr> {
        self.descend()?;
        let expr = self.or();
        self.ascend();
        expr
    }

    fn or(&mut self) -> Result<Expr> {
        let mut lhs = self.and()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut lhs = self.not()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr> {
        if self.eat(&TokenKind::Not) {
            self.descend()?;
            let inner = self.not();
            self.ascend();
            return Ok(Expr::Not(Box::new(inner?)));
        }
        self.compare()
    }

    fn compare(&mut self) -> Result<Expr> {
        let lhs = self.additive()?;
        let Some(op) = compare_op(&self.peek().kind) else {
            return Ok(lhs);
        };
        self.advance();
        let rhs = self.additive()?;

        let next = self.peek();
        if compare_op(&next.kind).is_some() {
            return Err(AlertError::ParseError {
                position: next.pos,
                reason: "chained comparisons are not supported, combine with 'and'".to_string(),
            });
        }
        Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => ArithOp::Add,
                TokenKind::Minus => ArithOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.term()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => ArithOp::Mul,
                TokenKind::Slash => ArithOp::Div,
                TokenKind::Percent => ArithOp::Rem,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&TokenKind::Minus) {
            self.descend()?;
            let inner = self.unary();
            self.ascend();
            return Ok(Expr::Neg(Box::new(inner?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        while self.eat(&TokenKind::LBracket) {
            let token = self.advance();
            let TokenKind::Str(key) = token.kind else {
                return Err(AlertError::ParseError {
                    position: token.pos,
                    reason: format!("index must be a string literal, found {}", token.kind),
                });
            };
            self.expect(&TokenKind::RBracket)?;
            expr = Expr::Index(Box::new(expr), key);
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Str(s) => Ok(Expr::Str(s)),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::LParen => {
                let inner = self.expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) if self.peek().kind == TokenKind::LParen => {
                let helper = Helper::from_name(&name).ok_or_else(|| AlertError::ParseError {
                    position: token.pos,
                    reason: format!("unknown function '{name}', expected avg, max, min, or count"),
                })?;
                self.advance();
                let arg = self.expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(Expr::Call(helper, Box::new(arg)))
            }
            TokenKind::Ident(name) if name == VIEW_IDENT => Ok(Expr::View),
            TokenKind::Ident(name) => Ok(Expr::Metric(name)),
            other => Err(AlertError::ParseError {
                position: token.pos,
                reason: format!("unexpected {other}"),
            }),
        }
    }
}

fn compare_op(kind: &TokenKind) -> Option<CompareOp> {
    match kind {
        TokenKind::Lt => Some(CompareOp::Lt),
        TokenKind::Le => Some(CompareOp::Le),
        TokenKind::Gt => Some(CompareOp::Gt),
        TokenKind::Ge => Some(CompareOp::Ge),
        TokenKind::EqEq => Some(CompareOp::Eq),
        TokenKind::Ne => Some(CompareOp::Ne),
        _ => None,
    }
}
