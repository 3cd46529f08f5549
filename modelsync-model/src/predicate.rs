//! Filter predicates.
//!
//! A [`QueryPredicate`] is rendered two ways: as the backend's filter-input
//! JSON (`{"and":[{"grayRelease":{"gt":3}}]}`) and, by the local store, as SQL.
//! It can also be evaluated directly against a [`Record`].

use std::cmp::Ordering;

use modelsync_types::{fields, Record};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Comparison operator of a single-field clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Operator {
    /// Key used in the backend filter input.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
        }
    }

    /// SQL comparison operator.
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    fn matches(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
        }
    }
}

/// A boolean filter over record fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPredicate {
    /// Matches every record.
    #[default]
    All,
    Compare {
        field: String,
        op: Operator,
        value: Value,
    },
    And(Vec<QueryPredicate>),
    Or(Vec<QueryPredicate>),
    Not(Box<QueryPredicate>),
}

impl QueryPredicate {
    pub fn compare(field: &str, op: Operator, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, Operator::Eq, value)
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, Operator::Ne, value)
    }

    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, Operator::Gt, value)
    }

    pub fn ge(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, Operator::Ge, value)
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, Operator::Lt, value)
    }

    pub fn le(field: &str, value: impl Into<Value>) -> Self {
        Self::compare(field, Operator::Le, value)
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Conjunction. `All` is the identity and nested `And`s are flattened.
    #[must_use]
    pub fn and(self, other: QueryPredicate) -> Self {
        let mut clauses = Vec::new();
        for p in [self, other] {
            match p {
                Self::All => {}
                Self::And(inner) => clauses.extend(inner),
                p => clauses.push(p),
            }
        }
        match clauses.len() {
            0 => Self::All,
            _ => Self::And(clauses),
        }
    }

    /// Disjunction. An `All` operand makes the whole disjunction `All`.
    #[must_use]
    pub fn or(self, other: QueryPredicate) -> Self {
        if self.is_all() || other.is_all() {
            return Self::All;
        }
        let mut clauses = Vec::new();
        for p in [self, other] {
            match p {
                Self::Or(inner) => clauses.extend(inner),
                p => clauses.push(p),
            }
        }
        Self::Or(clauses)
    }

    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Self::Not(inner) => *inner,
            p => Self::Not(Box::new(p)),
        }
    }

    /// Field names referenced by this predicate.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::All => {}
            Self::Compare { field, .. } => {
                if !out.contains(&field.as_str()) {
                    out.push(field);
                }
            }
            Self::And(ps) | Self::Or(ps) => ps.iter().for_each(|p| p.collect_fields(out)),
            Self::Not(p) => p.collect_fields(out),
        }
    }

    /// Renders the backend filter input. `All` renders as `null` (no filter).
    pub fn to_filter(&self) -> Value {
        match self {
            Self::All => Value::Null,
            Self::Compare { field, op, value } => {
                let mut cond = Map::new();
                cond.insert(op.as_str().into(), value.clone());
                let mut object = Map::new();
                object.insert(field.clone(), Value::Object(cond));
                Value::Object(object)
            }
            Self::And(ps) => json!({ "and": Self::filter_list(ps) }),
            Self::Or(ps) => json!({ "or": Self::filter_list(ps) }),
            Self::Not(p) => match p.to_filter() {
                Value::Null => json!({ "not": {} }),
                inner => json!({ "not": inner }),
            },
        }
    }

    fn filter_list(ps: &[QueryPredicate]) -> Vec<Value> {
        ps.iter()
            .map(QueryPredicate::to_filter)
            .filter(|v| !v.is_null())
            .collect()
    }

    /// Evaluates the predicate against a record.
    ///
    /// A comparison on a missing field is false, except `ne` which is true.
    pub fn evaluate(&self, record: &Record) -> bool {
        match self {
            Self::All => true,
            Self::Compare { field, op, value } => {
                let actual = if field == fields::ID {
                    Some(Value::String(record.id.clone()))
                } else {
                    record.get(field).cloned()
                };
                match actual.and_then(|a| compare_values(&a, value)) {
                    Some(ordering) => op.matches(ordering),
                    None => *op == Operator::Ne,
                }
            }
            Self::And(ps) => ps.iter().all(|p| p.evaluate(record)),
            Self::Or(ps) => ps.iter().any(|p| p.evaluate(record)),
            Self::Not(p) => !p.evaluate(record),
        }
    }
}

/// Orders two JSON scalars of the same kind. Numeric strings compare with
/// numbers numerically.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => {
            let x = as_number(a)?;
            let y = as_number(b)?;
            x.partial_cmp(&y)
        }
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
