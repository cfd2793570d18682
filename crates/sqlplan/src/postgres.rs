//! tokio-postgres adapter.
//!
//! Rendered SQL uses `:name` placeholders. Before a statement reaches the
//! server they are rewritten to `$1, $2, ...` following the rendered query's
//! parameter order, and the bound [`Value`]s are passed in that order.

use crate::error::{PlanError, PlanResult};
use crate::exec::Executor;
use crate::render::RenderedQuery;
use crate::row::Row;
use crate::value::{Params, Value};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::error::Error as StdError;
use std::sync::Arc;
use tokio_postgres::types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};

type BoxError = Box<dyn StdError + Sync + Send>;

/// Rewrite `:name` placeholders to `$n`.
///
/// `names` is the rendered parameter order; the first entry becomes `$1`.
/// Quoted strings, quoted identifiers and `::` casts are left untouched. A
/// placeholder missing from `names` is a [`PlanError::MissingParam`].
pub fn to_positional(sql: &str, names: &[String]) -> PlanResult<String> {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '\'' | '"' => {
                out.push(c);
                // Doubled quote chars re-enter this arm and stay balanced.
                for (_, inner) in chars.by_ref() {
                    out.push(inner);
                    if inner == c {
                        break;
                    }
                }
            }
            ':' => {
                if let Some(&(_, ':')) = chars.peek() {
                    chars.next();
                    out.push_str("::");
                    continue;
                }
                let start = i + 1;
                let mut end = start;
                while let Some(&(j, n)) = chars.peek() {
                    let ok = if j == start {
                        n == '_' || n.is_ascii_alphabetic()
                    } else {
                        n == '_' || n.is_ascii_alphanumeric()
                    };
                    if !ok {
                        break;
                    }
                    end = j + n.len_utf8();
                    chars.next();
                }
                if end == start {
                    out.push(':');
                    continue;
                }
                let name = &sql[start..end];
                let pos = names
                    .iter()
                    .position(|n| n == name)
                    .ok_or_else(|| PlanError::MissingParam(name.to_string()))?;
                out.push('$');
                out.push_str(&(pos + 1).to_string());
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

/// Positional SQL plus values in placeholder order.
fn bind<'a>(query: &RenderedQuery, params: &'a Params) -> PlanResult<(String, Vec<&'a Value>)> {
    let sql = to_positional(&query.sql, &query.params)?;
    let values = params.ordered(&query.params)?;
    Ok((sql, values))
}

fn as_refs<'a>(values: &'a [&'a Value]) -> Vec<&'a (dyn ToSql + Sync)> {
    values.iter().map(|v| *v as &(dyn ToSql + Sync)).collect()
}

/// Convert driver rows, sharing one column-name list across the result set.
fn convert_rows(rows: Vec<tokio_postgres::Row>) -> PlanResult<Vec<Row>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns: Arc<[String]> = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    rows.iter()
        .map(|row| {
            let values = (0..columns.len())
                .map(|i| {
                    row.try_get::<_, Value>(i)
                        .map_err(|e| PlanError::decode(columns[i].as_str(), e.to_string()))
                })
                .collect::<PlanResult<Vec<_>>>()?;
            Row::new(Arc::clone(&columns), values)
        })
        .collect()
}

fn mismatch(value: &Value, ty: &Type) -> BoxError {
    format!("cannot encode {} value as {}", value.type_name(), ty).into()
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::INT8 => i.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::FLOAT8 => f.to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            Value::Text(s) => match *ty {
                Type::UUID => uuid::Uuid::parse_str(s)?.to_sql(ty, out),
                Type::DATE => s.parse::<NaiveDate>()?.to_sql(ty, out),
                Type::TIME => s.parse::<NaiveTime>()?.to_sql(ty, out),
                Type::JSON | Type::JSONB => {
                    serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
                }
                _ => s.as_str().to_sql(ty, out),
            },
            Value::Bytes(b) => b.as_slice().to_sql(ty, out),
            Value::Json(j) => j.to_sql(ty, out),
            Value::Uuid(u) => u.to_sql(ty, out),
            Value::Timestamp(t) => match *ty {
                Type::TIMESTAMP => t.naive_utc().to_sql(ty, out),
                _ => t.to_sql(ty, out),
            },
            Value::Array(items) => items.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let value = match *ty {
            Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => Value::Int(i16::from_sql(ty, raw)?.into()),
            Type::INT4 => Value::Int(i32::from_sql(ty, raw)?.into()),
            Type::INT8 => Value::Int(i64::from_sql(ty, raw)?),
            Type::FLOAT4 => Value::Float(f32::from_sql(ty, raw)?.into()),
            Type::FLOAT8 => Value::Float(f64::from_sql(ty, raw)?),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
                Value::Text(String::from_sql(ty, raw)?)
            }
            Type::BYTEA => Value::Bytes(Vec::<u8>::from_sql(ty, raw)?),
            Type::JSON | Type::JSONB => Value::Json(serde_json::Value::from_sql(ty, raw)?),
            Type::UUID => Value::Uuid(uuid::Uuid::from_sql(ty, raw)?),
            Type::TIMESTAMPTZ => Value::Timestamp(DateTime::<Utc>::from_sql(ty, raw)?),
            Type::TIMESTAMP => Value::Timestamp(NaiveDateTime::from_sql(ty, raw)?.and_utc()),
            Type::DATE => Value::Text(NaiveDate::from_sql(ty, raw)?.to_string()),
            Type::TIME => Value::Text(NaiveTime::from_sql(ty, raw)?.to_string()),
            _ => match ty.kind() {
                Kind::Array(_) => Value::Array(Vec::<Value>::from_sql(ty, raw)?),
                Kind::Enum(_) => Value::Text(String::from_sql(&Type::TEXT, raw)?),
                _ => return Err(format!("unsupported column type {ty}").into()),
            },
        };
        Ok(value)
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(Value::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

impl Executor for tokio_postgres::Client {
    async fn query(&self, query: &RenderedQuery, params: &Params) -> PlanResult<Vec<Row>> {
        let (sql, values) = bind(query, params)?;
        let rows = tokio_postgres::Client::query(self, &sql, &as_refs(&values))
            .await
            .map_err(PlanError::from_db_error)?;
        convert_rows(rows)
    }

    async fn execute(&self, query: &RenderedQuery, params: &Params) -> PlanResult<u64> {
        let (sql, values) = bind(query, params)?;
        tokio_postgres::Client::execute(self, &sql, &as_refs(&values))
            .await
            .map_err(PlanError::from_db_error)
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        Some(tokio_postgres::Client::cancel_token(self))
    }
}

impl Executor for tokio_postgres::Transaction<'_> {
    async fn query(&self, query: &RenderedQuery, params: &Params) -> PlanResult<Vec<Row>> {
        let (sql, values) = bind(query, params)?;
        let rows = tokio_postgres::Transaction::query(self, &sql, &as_refs(&values))
            .await
            .map_err(PlanError::from_db_error)?;
        convert_rows(rows)
    }

    async fn execute(&self, query: &RenderedQuery, params: &Params) -> PlanResult<u64> {
        let (sql, values) = bind(query, params)?;
        tokio_postgres::Transaction::execute(self, &sql, &as_refs(&values))
            .await
            .map_err(PlanError::from_db_error)
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        Some(tokio_postgres::Transaction::cancel_token(self))
    }
}

// ===== deadpool-postgres support =====

#[cfg(feature = "pool")]
impl Executor for deadpool_postgres::Client {
    async fn query(&self, query: &RenderedQuery, params: &Params) -> PlanResult<Vec<Row>> {
        let client: &tokio_postgres::Client = self;
        Executor::query(client, query, params).await
    }

    async fn execute(&self, query: &RenderedQuery, params: &Params) -> PlanResult<u64> {
        let client: &tokio_postgres::Client = self;
        Executor::execute(client, query, params).await
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        let client: &tokio_postgres::Client = self;
        Executor::cancel_token(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rewrites_in_param_order() {
        let sql = r#"UPDATE "users" SET "name" = :name WHERE "id" = :id AND "x" = :name"#;
        let out = to_positional(sql, &names(&["name", "id"])).unwrap();
        assert_eq!(
            out,
            r#"UPDATE "users" SET "name" = $1 WHERE "id" = $2 AND "x" = $1"#
        );
    }

    #[test]
    fn skips_casts_and_quoted_text() {
        let sql = r#"SELECT ':nope', "a:b", x::text FROM t WHERE y = :p"#;
        let out = to_positional(sql, &names(&["p"])).unwrap();
        assert_eq!(out, r#"SELECT ':nope', "a:b", x::text FROM t WHERE y = $1"#);
    }

    #[test]
    fn doubled_quotes_stay_balanced() {
        let sql = "SELECT 'it''s :x' WHERE a = :a";
        let out = to_positional(sql, &names(&["a"])).unwrap();
        assert_eq!(out, "SELECT 'it''s :x' WHERE a = $1");
    }

    #[test]
    fn unknown_placeholder_is_missing_param() {
        let err = to_positional("SELECT :a, :b", &names(&["a"])).unwrap_err();
        assert!(matches!(err, PlanError::MissingParam(n) if n == "b"));
    }

    #[test]
    fn value_accepts_every_type_and_encodes_nulls() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            Value::Null.to_sql(&Type::INT4, &mut buf).unwrap(),
            IsNull::Yes
        ));
        assert!(Value::Int(70_000).to_sql(&Type::INT2, &mut buf).is_err());
        assert!(Value::Bool(true).to_sql(&Type::BOOL, &mut buf).is_ok());
    }

    #[test]
    fn date_and_time_columns_decode_to_iso_text() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut buf = BytesMut::new();
        date.to_sql(&Type::DATE, &mut buf).unwrap();
        assert_eq!(
            Value::from_sql(&Type::DATE, &buf).unwrap(),
            Value::Text("2024-03-01".into())
        );

        let time = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        let mut buf = BytesMut::new();
        time.to_sql(&Type::TIME, &mut buf).unwrap();
        assert_eq!(
            Value::from_sql(&Type::TIME, &buf).unwrap(),
            Value::Text("09:30:00".into())
        );

        let mut buf = BytesMut::new();
        Value::Text("2024-03-01".into())
            .to_sql(&Type::DATE, &mut buf)
            .unwrap();
        assert_eq!(NaiveDate::from_sql(&Type::DATE, &buf).unwrap(), date);
    }

    #[test]
    fn numeric_is_a_decode_failure() {
        assert!(Value::from_sql(&Type::NUMERIC, &[0, 0]).is_err());
    }
}
