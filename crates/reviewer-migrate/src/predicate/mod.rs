//! Structured selection predicates.
//!
//! Selections are built as a small AST of `(column, operator, values)`
//! clauses combined with AND / OR / NOT. The AST is rendered to text only at
//! the store boundary (and for length checks and logs); in-process stores
//! evaluate it directly.
//!
//! Rendering is canonical: the same predicate always renders to the same
//! text, so the length ceiling in [`check_length`] can be tested without a
//! store.

mod parse;

pub use parse::parse;

use std::cmp::Ordering;

use crate::core::identifier::{format_guid, quote_field, quote_literal, FieldDelimiter};
use crate::core::schema::TableSchema;
use crate::core::value::Value;
use crate::error::{MigrateError, Result};

/// Default ceiling on rendered predicate length.
///
/// Some DBMSs cap IN lists and predicate text; longer selections must be
/// narrowed by the caller rather than truncated.
pub const MAX_PREDICATE_LEN: usize = 1000;

/// Clause operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl Operator {
    fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }
}

/// A single `column op values` test.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub column: String,
    pub op: Operator,
    pub values: Vec<Value>,
}

/// Predicate AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Clause(Clause),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// `column op value`.
    pub fn compare(column: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Predicate::Clause(Clause {
            column: column.into(),
            op,
            values: vec![value.into()],
        })
    }

    /// `column = value`.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, Operator::Eq, value)
    }

    /// `column IN (values)`.
    pub fn in_list(column: impl Into<String>, values: Vec<Value>) -> Self {
        Predicate::Clause(Clause {
            column: column.into(),
            op: Operator::In,
            values,
        })
    }

    /// `column IS NULL`.
    pub fn is_null(column: impl Into<String>) -> Self {
        Predicate::Clause(Clause {
            column: column.into(),
            op: Operator::IsNull,
            values: Vec::new(),
        })
    }

    /// Conjunction, flattening nested ANDs.
    pub fn and(self, other: Predicate) -> Self {
        let mut items = match self {
            Predicate::And(items) => items,
            p => vec![p],
        };
        match other {
            Predicate::And(more) => items.extend(more),
            p => items.push(p),
        }
        Predicate::And(items)
    }

    /// AND two optional predicates together.
    pub fn and_opt(left: Option<Predicate>, right: Option<Predicate>) -> Option<Predicate> {
        match (left, right) {
            (Some(l), Some(r)) => Some(l.and(r)),
            (l, r) => l.or(r),
        }
    }

    /// Render with bare field names.
    pub fn render(&self) -> Result<String> {
        self.render_with(FieldDelimiter::None)
    }

    /// Render for a store using the given field delimiter.
    pub fn render_with(&self, delimiter: FieldDelimiter) -> Result<String> {
        let mut out = String::new();
        self.write(&mut out, delimiter)?;
        Ok(out)
    }

    fn write(&self, out: &mut String, delimiter: FieldDelimiter) -> Result<()> {
        match self {
            Predicate::Clause(clause) => write_clause(out, clause, delimiter),
            Predicate::And(items) => write_joined(out, items, " AND ", delimiter, |p| {
                matches!(p, Predicate::Or(_))
            }),
            Predicate::Or(items) => write_joined(out, items, " OR ", delimiter, |_| false),
            Predicate::Not(inner) => {
                out.push_str("NOT (");
                inner.write(out, delimiter)?;
                out.push(')');
                Ok(())
            }
        }
    }

    /// Evaluate against a row, with `lookup` resolving a column to its value.
    ///
    /// SQL three-valued logic: a comparison involving NULL is unknown, and a
    /// row is selected only when the predicate is definitely true.
    pub fn matches<'a, F>(&self, lookup: &F) -> Result<bool>
    where
        F: Fn(&str) -> Option<&'a Value>,
    {
        Ok(self.eval(lookup)? == Some(true))
    }

    fn eval<'a, F>(&self, lookup: &F) -> Result<Option<bool>>
    where
        F: Fn(&str) -> Option<&'a Value>,
    {
        match self {
            Predicate::Clause(clause) => eval_clause(clause, lookup),
            Predicate::And(items) => {
                let mut result = Some(true);
                for item in items {
                    match item.eval(lookup)? {
                        Some(false) => return Ok(Some(false)),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                Ok(result)
            }
            Predicate::Or(items) => {
                let mut result = Some(false);
                for item in items {
                    match item.eval(lookup)? {
                        Some(true) => return Ok(Some(true)),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                Ok(result)
            }
            Predicate::Not(inner) => Ok(inner.eval(lookup)?.map(|b| !b)),
        }
    }

    /// Column names referenced anywhere in the predicate.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'s>(&'s self, out: &mut Vec<&'s str>) {
        match self {
            Predicate::Clause(c) => {
                if !out.iter().any(|n| n.eq_ignore_ascii_case(&c.column)) {
                    out.push(&c.column);
                }
            }
            Predicate::And(items) | Predicate::Or(items) => {
                items.iter().for_each(|p| p.collect_columns(out))
            }
            Predicate::Not(inner) => inner.collect_columns(out),
        }
    }
}

fn write_joined(
    out: &mut String,
    items: &[Predicate],
    sep: &str,
    delimiter: FieldDelimiter,
    needs_parens: impl Fn(&Predicate) -> bool,
) -> Result<()> {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(sep);
        }
        if needs_parens(item) {
            out.push('(');
            item.write(out, delimiter)?;
            out.push(')');
        } else {
            item.write(out, delimiter)?;
        }
    }
    Ok(())
}

fn write_clause(out: &mut String, clause: &Clause, delimiter: FieldDelimiter) -> Result<()> {
    out.push_str(&quote_field(&clause.column, delimiter)?);
    out.push(' ');
    out.push_str(clause.op.as_sql());
    match clause.op {
        Operator::IsNull | Operator::IsNotNull => {}
        Operator::In | Operator::NotIn => {
            let rendered: Result<Vec<String>> = clause.values.iter().map(render_literal).collect();
            out.push_str(" (");
            out.push_str(&rendered?.join(","));
            out.push(')');
        }
        _ => {
            let value = clause.values.first().ok_or_else(|| {
                MigrateError::Config(format!("Clause on {} has no value", clause.column))
            })?;
            out.push(' ');
            out.push_str(&render_literal(value)?);
        }
    }
    Ok(())
}

/// Render a literal: numbers bare, text/GUID/date single-quoted.
pub fn render_literal(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => "NULL".to_string(),
        Value::Int(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Text(v) => quote_literal(v),
        Value::Guid(v) => quote_literal(&format_guid(v)),
        Value::Date(_) => quote_literal(&value.to_string()),
        Value::Blob(_) | Value::Geometry(_) => {
            return Err(MigrateError::Config(format!(
                "Cannot use {} as a predicate literal",
                value
            )))
        }
    })
}

fn eval_clause<'a, F>(clause: &Clause, lookup: &F) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<&'a Value>,
{
    let value = lookup(&clause.column).ok_or_else(|| {
        MigrateError::Config(format!("Unknown field in expression: {}", clause.column))
    })?;

    let first = || {
        clause.values.first().ok_or_else(|| {
            MigrateError::Config(format!("Clause on {} has no value", clause.column))
        })
    };

    let ordering = |pred: fn(Ordering) -> bool| -> Result<Option<bool>> {
        Ok(value.compare(first()?).map(pred))
    };

    match clause.op {
        Operator::IsNull => Ok(Some(value.is_null())),
        Operator::IsNotNull => Ok(Some(!value.is_null())),
        Operator::Eq => ordering(|o| o == Ordering::Equal),
        Operator::Ne => ordering(|o| o != Ordering::Equal),
        Operator::Lt => ordering(|o| o == Ordering::Less),
        Operator::Le => ordering(|o| o != Ordering::Greater),
        Operator::Gt => ordering(|o| o == Ordering::Greater),
        Operator::Ge => ordering(|o| o != Ordering::Less),
        Operator::In | Operator::NotIn => {
            if value.is_null() {
                return Ok(None);
            }
            let found = clause
                .values
                .iter()
                .any(|v| value.compare(v) == Some(Ordering::Equal));
            Ok(Some(found == (clause.op == Operator::In)))
        }
        Operator::Like | Operator::NotLike => {
            let pattern = match first()? {
                Value::Text(p) => p,
                other => {
                    return Err(MigrateError::Config(format!(
                        "LIKE pattern must be text, got {}",
                        other
                    )))
                }
            };
            if value.is_null() {
                return Ok(None);
            }
            let matched = like_match(&value.to_string(), pattern);
            Ok(Some(matched == (clause.op == Operator::Like)))
        }
    }
}

/// SQL LIKE with `%` and `_` wildcards.
fn like_match(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    // dp[j]: pattern[..i] matches text[..j]
    let mut dp = vec![false; t.len() + 1];
    dp[0] = true;
    for pc in &p {
        let mut next = vec![false; t.len() + 1];
        if *pc == '%' {
            let mut seen = false;
            for j in 0..=t.len() {
                seen |= dp[j];
                next[j] = seen;
            }
        } else {
            for j in 1..=t.len() {
                next[j] = dp[j - 1] && (*pc == '_' || *pc == t[j - 1]);
            }
        }
        dp = next;
    }
    dp[t.len()]
}

/// Fail if a rendered predicate is longer than `limit` characters.
pub fn check_length(rendered: &str, limit: usize) -> Result<()> {
    let length = rendered.chars().count();
    if length > limit {
        return Err(MigrateError::PredicateTooLong { length, limit });
    }
    Ok(())
}

/// Outcome of [`make_in_clause`] when no predicate could be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InClauseSkip {
    /// No values were supplied.
    Empty,
    /// The field does not exist in the table.
    MissingField,
    /// The field's type cannot be used in a value list.
    UnsupportedType(String),
}

/// Build `field IN (values)` with literals typed after the declared column
/// type: numeric columns take bare numbers, string/date/GUID columns take
/// quoted text.
pub fn make_in_clause(
    schema: &TableSchema,
    field: &str,
    values: &[Value],
) -> std::result::Result<Predicate, InClauseSkip> {
    if values.is_empty() {
        return Err(InClauseSkip::Empty);
    }
    let column = schema.field(field).ok_or(InClauseSkip::MissingField)?;
    let typed: Vec<Value> = if column.field_type.is_numeric() {
        values
            .iter()
            .map(|v| match v {
                Value::Int(_) | Value::Double(_) => v.clone(),
                other => other
                    .as_i64()
                    .map(Value::Int)
                    .unwrap_or_else(|| Value::Text(other.to_string())),
            })
            .collect()
    } else if column.field_type.is_quoted() {
        values.iter().map(|v| Value::Text(v.to_string())).collect()
    } else {
        return Err(InClauseSkip::UnsupportedType(format!(
            "{:?}",
            column.field_type
        )));
    };
    Ok(Predicate::in_list(column.name.clone(), typed))
}
