use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use std::collections::BTreeMap;
use std::fmt;

/// A scalar cell of a normalized row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar {
    Null,
    Integer(i64),
    Text(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<Option<String>> for Scalar {
    fn from(value: Option<String>) -> Self {
        value.map(Scalar::Text).unwrap_or(Scalar::Null)
    }
}

impl From<Option<i64>> for Scalar {
    fn from(value: Option<i64>) -> Self {
        value.map(Scalar::Integer).unwrap_or(Scalar::Null)
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("NULL"),
            Scalar::Integer(v) => write!(f, "{}", v),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl ToSql for Scalar {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Scalar::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Scalar::Integer(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            Scalar::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl FromSql for Scalar {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Scalar::Null),
            ValueRef::Integer(v) => Ok(Scalar::Integer(v)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|s| Scalar::Text(s.to_string()))
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            ValueRef::Real(_) | ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

/// A flat row ready for relational storage: column name to scalar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRow {
    values: BTreeMap<&'static str, Scalar>,
}

impl NormalizedRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &'static str, value: impl Into<Scalar>) -> Self {
        self.values.insert(column, value.into());
        self
    }

    pub fn set(&mut self, column: &'static str, value: impl Into<Scalar>) {
        self.values.insert(column, value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.values.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_explicit_nulls() {
        let row = NormalizedRow::new()
            .with("id", "a")
            .with("name", None::<String>)
            .with("count", Some(3i64));

        assert_eq!(row.len(), 3);
        assert_eq!(row.get("id").and_then(Scalar::as_str), Some("a"));
        assert!(row.get("name").unwrap().is_null());
        assert_eq!(row.get("count").and_then(Scalar::as_i64), Some(3));
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["count", "id", "name"]);
    }

    #[test]
    fn test_sql_round_trip() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (a TEXT, b INTEGER, c TEXT)", [])
            .unwrap();
        conn.execute(
            "INSERT INTO t VALUES (?1, ?2, ?3)",
            rusqlite::params![
                Scalar::from("x"),
                Scalar::Integer(7),
                Scalar::Null
            ],
        )
        .unwrap();

        let (a, b, c): (Scalar, Scalar, Scalar) = conn
            .query_row("SELECT a, b, c FROM t", [], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })
            .unwrap();
        assert_eq!(a, Scalar::Text("x".to_string()));
        assert_eq!(b, Scalar::Integer(7));
        assert_eq!(c, Scalar::Null);
    }
}
