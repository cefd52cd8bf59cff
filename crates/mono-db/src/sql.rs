//! Row decoding and statement assembly shared by the resource services.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    any::{AnyQueryResult, AnyRow},
    Any, Encode, QueryBuilder, Row, Type,
};

use crate::{error::DbError, profile::Backend, session::ScopedSession};

/// Fixed-width UTC text so lexical order matches chronological order.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

fn parse_timestamp(
    table: &'static str,
    column: &'static str,
    value: &str,
) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| DbError::Decode {
            table,
            column,
            reason: format!("invalid RFC3339 timestamp '{value}': {err}"),
        })
}

pub(crate) fn get_timestamp(
    row: &AnyRow,
    table: &'static str,
    column: &'static str,
) -> Result<DateTime<Utc>, DbError> {
    let raw: String = row.try_get(column)?;
    parse_timestamp(table, column, &raw)
}

pub(crate) fn get_opt_timestamp(
    row: &AnyRow,
    table: &'static str,
    column: &'static str,
) -> Result<Option<DateTime<Utc>>, DbError> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|value| parse_timestamp(table, column, &value))
        .transpose()
}

/// Flags are stored as integers so both dialects decode them the same way.
pub(crate) fn get_flag(row: &AnyRow, column: &str) -> Result<bool, DbError> {
    let raw: i64 = row.try_get(column)?;
    Ok(raw != 0)
}

pub(crate) fn flag(value: bool) -> i64 {
    i64::from(value)
}

/// Escapes `LIKE` wildcards with `!`, which needs no quoting in either dialect.
pub(crate) fn like_contains(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.to_lowercase().chars() {
        if matches!(ch, '!' | '%' | '_') {
            pattern.push('!');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// Truncates on a char boundary so bounded `VARCHAR` columns accept the value.
pub(crate) fn clip(value: String, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value,
    }
}

/// Id of the row `result` inserted. The SQLite `Any` mapping never reports
/// it, so the connection is asked directly; this must run on the session
/// that executed the insert.
pub(crate) async fn inserted_id(
    session: &mut ScopedSession,
    result: &AnyQueryResult,
    table: &'static str,
) -> Result<i64, DbError> {
    if let Some(id) = result.last_insert_id() {
        return Ok(id);
    }
    let row = sqlx::query(last_insert_id_query(session.backend()))
        .fetch_one(session.conn())
        .await?;
    let id: i64 = row.try_get(0)?;
    if id <= 0 {
        return Err(DbError::Decode {
            table,
            column: "id",
            reason: "driver did not report the inserted row id".to_string(),
        });
    }
    Ok(id)
}

fn last_insert_id_query(backend: Backend) -> &'static str {
    match backend {
        Backend::Sqlite => "SELECT last_insert_rowid()",
        Backend::MySql => "SELECT CAST(LAST_INSERT_ID() AS SIGNED)",
    }
}

/// Runs a built statement inside `session` and maps every row.
pub(crate) async fn fetch_rows<T>(
    session: &mut ScopedSession,
    mut query: QueryBuilder<'static, Any>,
    map: fn(&AnyRow) -> Result<T, DbError>,
) -> Result<Vec<T>, DbError> {
    let rows = query.build().fetch_all(session.conn()).await?;
    rows.iter().map(map).collect()
}

/// `SELECT` statement with optional `WHERE` conditions joined by `AND`.
pub(crate) struct Select {
    builder: QueryBuilder<'static, Any>,
    has_where: bool,
}

impl Select {
    pub(crate) fn new(base: &str) -> Self {
        Self {
            builder: QueryBuilder::new(base),
            has_where: false,
        }
    }

    /// Starts the next condition and hands back the builder to write it.
    pub(crate) fn and(&mut self) -> &mut QueryBuilder<'static, Any> {
        let joiner = if self.has_where { " AND " } else { " WHERE " };
        self.has_where = true;
        self.builder.push(joiner)
    }

    pub(crate) fn eq<T>(&mut self, column: &str, value: T) -> &mut Self
    where
        T: 'static + Encode<'static, Any> + Type<Any> + Send,
    {
        self.and().push(column).push(" = ").push_bind(value);
        self
    }

    pub(crate) fn eq_opt<T>(&mut self, column: &str, value: Option<T>) -> &mut Self
    where
        T: 'static + Encode<'static, Any> + Type<Any> + Send,
    {
        if let Some(value) = value {
            self.eq(column, value);
        }
        self
    }

    pub(crate) fn builder(&mut self) -> &mut QueryBuilder<'static, Any> {
        &mut self.builder
    }

    pub(crate) fn into_builder(self) -> QueryBuilder<'static, Any> {
        self.builder
    }
}
