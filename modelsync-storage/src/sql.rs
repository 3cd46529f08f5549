//! Translation of [`QueryPredicate`] into SQL over the JSON `data` column.

use modelsync_model::{Operator, QueryPredicate};
use modelsync_types::fields;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::{StorageError, StorageResult};

/// A `WHERE` fragment plus its positional parameters.
#[derive(Debug, Default)]
pub(crate) struct SqlFilter {
    pub clause: String,
    pub params: Vec<SqlValue>,
}

pub(crate) fn to_sql(predicate: &QueryPredicate) -> StorageResult<SqlFilter> {
    let mut params = Vec::new();
    let clause = render(predicate, &mut params)?;
    Ok(SqlFilter { clause, params })
}

/// SQL expression reading one top-level field.
pub(crate) fn field_expr(field: &str) -> StorageResult<String> {
    if field == fields::ID {
        return Ok("id".into());
    }
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StorageError::InvalidData(format!(
            "unsupported field name in predicate: {field:?}"
        )));
    }
    Ok(format!("json_extract(data, '$.{field}')"))
}

fn render(predicate: &QueryPredicate, params: &mut Vec<SqlValue>) -> StorageResult<String> {
    Ok(match predicate {
        QueryPredicate::All => "1".into(),
        QueryPredicate::Compare { field, op, value } => {
            let expr = field_expr(field)?;
            params.push(to_sql_value(value));
            match op {
                // Missing fields compare unequal to everything.
                Operator::Ne => format!("({expr} IS NOT ?)"),
                op => format!("({expr} {} ?)", op.sql()),
            }
        }
        QueryPredicate::And(ps) => join(ps, " AND ", "1", params)?,
        QueryPredicate::Or(ps) => join(ps, " OR ", "0", params)?,
        QueryPredicate::Not(p) => format!("(NOT COALESCE({}, 0))", render(p, params)?),
    })
}

fn join(
    ps: &[QueryPredicate],
    sep: &str,
    empty: &str,
    params: &mut Vec<SqlValue>,
) -> StorageResult<String> {
    if ps.is_empty() {
        return Ok(empty.into());
    }
    let parts = ps
        .iter()
        .map(|p| render(p, params))
        .collect::<StorageResult<Vec<_>>>()?;
    Ok(format!("({})", parts.join(sep)))
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_true() {
        let f = to_sql(&QueryPredicate::All).unwrap();
        assert_eq!(f.clause, "1");
        assert!(f.params.is_empty());
    }

    #[test]
    fn and_of_comparisons() {
        let p = QueryPredicate::gt("grayRelease", 3).and(QueryPredicate::eq("id", "a"));
        let f = to_sql(&p).unwrap();
        assert_eq!(
            f.clause,
            "((json_extract(data, '$.grayRelease') > ?) AND (id = ?))"
        );
        assert_eq!(
            f.params,
            vec![SqlValue::Integer(3), SqlValue::Text("a".into())]
        );
    }

    #[test]
    fn rejects_injection_in_field_names() {
        assert!(to_sql(&QueryPredicate::eq("a') OR 1=1 --", 1)).is_err());
    }
}
