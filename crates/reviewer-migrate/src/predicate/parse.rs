//! Parser for user-supplied filter expressions.
//!
//! Accepts the expression subset Reviewer users write in the tool's
//! Expression parameter:
//!
//! ```text
//! expr    := or
//! or      := and ("OR" and)*
//! and     := unary ("AND" unary)*
//! unary   := "NOT" unary | "(" expr ")" | clause
//! clause  := field op literal
//!          | field ["NOT"] "IN" "(" literal ("," literal)* ")"
//!          | field "IS" ["NOT"] "NULL"
//!          | field ["NOT"] "LIKE" literal
//! literal := number | 'text' | DATE 'yyyy-mm-dd[ hh:mm:ss]'
//! ```
//!
//! Keywords are case-insensitive. Field names may be bare, `[bracketed]` or
//! `"double quoted"`.

use super::{Clause, Operator, Predicate};
use crate::core::value::Value;
use crate::error::{MigrateError, Result};

/// Deepest allowed nesting of parentheses and `NOT`.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    QuotedIdent(String),
    Number(String),
    Str(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

fn err(expr: &str, message: impl std::fmt::Display) -> MigrateError {
    MigrateError::Config(format!("Invalid expression {:?}: {}", expr, message))
}

fn tokenize(expr: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '\'' => {
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(err(expr, "unterminated string literal")),
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            s.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            s.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            '[' | '"' => {
                let close = if c == '[' { ']' } else { '"' };
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|ch| *ch == close)
                    .map(|p| start + p)
                    .ok_or_else(|| err(expr, "unterminated quoted field name"))?;
                tokens.push(Token::QuotedIdent(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '=' => {
                tokens.push(Token::Op("="));
                i += 1;
            }
            '<' | '>' | '!' => {
                let next = chars.get(i + 1).copied();
                let op = match (c, next) {
                    ('<', Some('=')) => "<=",
                    ('<', Some('>')) => "<>",
                    ('>', Some('=')) => ">=",
                    ('!', Some('=')) => "<>",
                    ('<', _) => "<",
                    ('>', _) => ">",
                    _ => return Err(err(expr, "unexpected '!'")),
                };
                i += if matches!(op, "<" | ">") { 1 } else { 2 };
                tokens.push(Token::Op(op));
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(err(expr, format!("unexpected character {:?}", other))),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    expr: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
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

    fn expect_keyword(&mut self, kw: &str) -> Result<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(err(self.expr, format!("expected {}", kw)))
        }
    }

    fn or(&mut self) -> Result<Predicate> {
        let mut items = vec![self.and()?];
        while self.eat_keyword("OR") {
            items.push(self.and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Predicate::Or(items)
        })
    }

    fn and(&mut self) -> Result<Predicate> {
        let mut items = vec![self.unary()?];
        while self.eat_keyword("AND") {
            items.push(self.unary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Predicate::And(items)
        })
    }

    fn unary(&mut self) -> Result<Predicate> {
        if self.eat_keyword("NOT") {
            self.descend()?;
            let inner = self.unary();
            self.depth -= 1;
            return Ok(Predicate::Not(Box::new(inner?)));
        }
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            self.descend()?;
            let inner = self.or();
            self.depth -= 1;
            let inner = inner?;
            match self.next() {
                Some(Token::RParen) => return Ok(inner),
                _ => return Err(err(self.expr, "expected ')'")),
            }
        }
        self.clause()
    }

    fn descend(&mut self) -> Result<()> {
        if self.depth >= MAX_DEPTH {
            return Err(err(self.expr, "nesting too deep"));
        }
        self.depth += 1;
        Ok(())
    }

    fn clause(&mut self) -> Result<Predicate> {
        let column = match self.next() {
            Some(Token::Ident(s)) if !is_keyword(&s) => s,
            Some(Token::QuotedIdent(s)) => s,
            other => {
                return Err(err(
                    self.expr,
                    format!("expected field name, found {:?}", other),
                ))
            }
        };

        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            let op = if negated {
                Operator::IsNotNull
            } else {
                Operator::IsNull
            };
            return Ok(Predicate::Clause(Clause {
                column,
                op,
                values: Vec::new(),
            }));
        }

        let negated = self.eat_keyword("NOT");
        if self.eat_keyword("IN") {
            if self.next() != Some(Token::LParen) {
                return Err(err(self.expr, "expected '(' after IN"));
            }
            let mut values = vec![self.literal()?];
            loop {
                match self.next() {
                    Some(Token::Comma) => values.push(self.literal()?),
                    Some(Token::RParen) => break,
                    _ => return Err(err(self.expr, "expected ',' or ')' in IN list")),
                }
            }
            let op = if negated { Operator::NotIn } else { Operator::In };
            return Ok(Predicate::Clause(Clause { column, op, values }));
        }
        if self.eat_keyword("LIKE") {
            let op = if negated {
                Operator::NotLike
            } else {
                Operator::Like
            };
            let value = self.literal()?;
            return Ok(Predicate::Clause(Clause {
                column,
                op,
                values: vec![value],
            }));
        }
        if negated {
            return Err(err(self.expr, "expected IN or LIKE after NOT"));
        }

        let op = match self.next() {
            Some(Token::Op(op)) => match op {
                "=" => Operator::Eq,
                "<>" => Operator::Ne,
                "<" => Operator::Lt,
                "<=" => Operator::Le,
                ">" => Operator::Gt,
                _ => Operator::Ge,
            },
            other => {
                return Err(err(
                    self.expr,
                    format!("expected comparison operator after {}, found {:?}", column, other),
                ))
            }
        };
        let value = self.literal()?;
        Ok(Predicate::Clause(Clause {
            column,
            op,
            values: vec![value],
        }))
    }

    fn literal(&mut self) -> Result<Value> {
        match self.next() {
            Some(Token::Number(n)) => {
                if let Ok(i) = n.parse::<i64>() {
                    Ok(Value::Int(i))
                } else {
                    n.parse::<f64>()
                        .map(Value::Double)
                        .map_err(|_| err(self.expr, format!("invalid number {}", n)))
                }
            }
            Some(Token::Str(s)) => Ok(Value::Text(s)),
            Some(Token::Ident(kw))
                if kw.eq_ignore_ascii_case("DATE") || kw.eq_ignore_ascii_case("TIMESTAMP") =>
            {
                match self.next() {
                    Some(Token::Str(s)) => Ok(Value::Text(s)),
                    _ => Err(err(self.expr, "expected quoted date after DATE")),
                }
            }
            other => Err(err(self.expr, format!("expected literal, found {:?}", other))),
        }
    }
}

fn is_keyword(s: &str) -> bool {
    ["AND", "OR", "NOT", "IN", "IS", "NULL", "LIKE"]
        .iter()
        .any(|k| k.eq_ignore_ascii_case(s))
}

/// Parse a filter expression into a [`Predicate`].
///
/// Returns `Ok(None)` for a blank expression.
pub fn parse(expr: &str) -> Result<Option<Predicate>> {
    if expr.trim().is_empty() {
        return Ok(None);
    }
    let tokens = tokenize(expr)?;
    let mut parser = Parser {
        expr,
        tokens,
        pos: 0,
        depth: 0,
    };
    let predicate = parser.or()?;
    if parser.pos < parser.tokens.len() {
        return Err(err(
            expr,
            format!("unexpected trailing input {:?}", parser.tokens[parser.pos]),
        ));
    }
    Ok(Some(predicate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(expr: &str) -> String {
        parse(expr).unwrap().unwrap().render().unwrap()
    }

    #[test]
    fn test_blank_is_none() {
        assert!(parse("   ").unwrap().is_none());
    }

    #[test]
    fn test_simple_comparison() {
        assert_eq!(render("REVIEWSTATUS = 'Open'"), "REVIEWSTATUS = 'Open'");
        assert_eq!(render("severity>=3"), "severity >= 3");
        assert_eq!(render("A != 1"), "A <> 1");
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(
            render("a = 1 and (b is null or c not in (1, 2))"),
            "a = 1 AND (b IS NULL OR c NOT IN (1,2))"
        );
    }

    #[test]
    fn test_quoted_fields_and_strings() {
        assert_eq!(render("[ORIGIN TABLE] = 'O''Hare'"), "ORIGIN TABLE = 'O''Hare'");
        assert_eq!(render("\"Status\" LIKE 'Open%'"), "Status LIKE 'Open%'");
    }

    #[test]
    fn test_date_literal() {
        assert_eq!(
            render("REVIEWDATE > date '2019-11-27 00:00:00'"),
            "REVIEWDATE > '2019-11-27 00:00:00'"
        );
    }

    #[test]
    fn test_not_prefix() {
        assert_eq!(render("NOT A = 1"), "NOT (A = 1)");
    }

    #[test]
    fn test_negative_and_float_numbers() {
        let p = parse("X > -1.5").unwrap().unwrap();
        match p {
            Predicate::Clause(c) => assert_eq!(c.values, vec![Value::Double(-1.5)]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_errors() {
        assert!(parse("A =").is_err());
        assert!(parse("A = 'open").is_err());
        assert!(parse("(A = 1").is_err());
        assert!(parse("A = 1 B").is_err());
        assert!(parse("A IN 1, 2").is_err());
        assert!(parse("AND = 1").is_err());
        assert!(parse("A NOT = 1").is_err());
        assert!(parse("A ; DROP").is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let deep = format!("{}STATUS = 1{}", "(".repeat(200_000), ")".repeat(200_000));
        let err = parse(&deep).unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
        assert!(err.to_string().contains("nesting too deep"));

        let nots = format!("{}STATUS = 1", "NOT ".repeat(10_000));
        assert!(parse(&nots).is_err());

        let ok = format!("{}STATUS = 1{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert_eq!(render(&ok), "STATUS = 1");
    }
}
