//! Keyset ("cursor") pagination shared by every list operation.
//!
//! A page is fetched in two steps around the caller's own query:
//!
//! 1. [`CursorPager::open`] validates the requested limit, decodes the `after`
//!    cursor and returns a [`KeysetWindow`] which appends the keyset predicate,
//!    the `ORDER BY key, id` clause and a `LIMIT limit + 1` probe to the query.
//! 2. [`CursorPager::close`] trims the probe row, decides `has_more` and mints
//!    the cursor for the last row that is returned.
//!
//! Cursors are opaque to clients: URL-safe base64 JSON followed by an
//! HMAC-SHA256 signature, so a modified cursor is rejected instead of silently
//! paging from an arbitrary position.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use sqlx::{Any, QueryBuilder};
use thiserror::Error;

use crate::{
    error::{FieldViolation, ValidationError},
    sql::Select,
};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Client-supplied paging parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    pub limit: Option<i64>,
    pub after: Option<String>,
}

impl PageRequest {
    pub fn first(limit: i64) -> Self {
        Self {
            limit: Some(limit),
            after: None,
        }
    }

    pub fn after(limit: i64, cursor: impl Into<String>) -> Self {
        Self {
            limit: Some(limit),
            after: Some(cursor.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    fn comparison(self) -> &'static str {
        match self {
            Self::Asc => ">",
            Self::Desc => "<",
        }
    }
}

/// Column a list is ordered by. The primary key `id` is always the tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: &'static str,
    pub direction: SortDirection,
}

impl SortKey {
    pub const ID_ASC: SortKey = SortKey::asc("id");
    pub const ID_DESC: SortKey = SortKey::desc("id");

    pub const fn asc(field: &'static str) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    pub const fn desc(field: &'static str) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }

    fn is_primary_key(&self) -> bool {
        self.field == "id"
    }
}

/// Sort key value captured from the last row of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CursorValue {
    Int(i64),
    Text(String),
}

impl From<i64> for CursorValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for CursorValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for CursorValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Decoded position: the sort key of the last row served plus its id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Cursor {
    #[serde(rename = "f")]
    pub field: String,
    #[serde(rename = "d")]
    pub direction: SortDirection,
    #[serde(rename = "v")]
    pub value: CursorValue,
    pub id: i64,
}

impl Cursor {
    fn to_json(&self) -> String {
        let value = match &self.value {
            CursorValue::Int(v) => Value::from(*v),
            CursorValue::Text(v) => Value::from(v.as_str()),
        };
        let mut payload = Map::new();
        payload.insert("f".into(), Value::from(self.field.as_str()));
        payload.insert("d".into(), Value::from(self.direction_str()));
        payload.insert("v".into(), value);
        payload.insert("id".into(), Value::from(self.id));
        Value::Object(payload).to_string()
    }

    fn direction_str(&self) -> &'static str {
        match self.direction {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cursor signing key must not be empty")]
pub struct EmptyCursorKey;

/// Signs and verifies cursor tokens.
#[derive(Clone)]
pub struct CursorCodec {
    mac: HmacSha256,
}

impl fmt::Debug for CursorCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorCodec").finish_non_exhaustive()
    }
}

impl CursorCodec {
    pub fn new(secret: &[u8]) -> Result<Self, EmptyCursorKey> {
        if secret.is_empty() {
            return Err(EmptyCursorKey);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| EmptyCursorKey)?;
        Ok(Self { mac })
    }

    pub fn encode(&self, cursor: &Cursor) -> String {
        let payload = cursor.to_json();
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        let signature = mac.finalize().into_bytes();
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload.as_bytes()),
            URL_SAFE_NO_PAD.encode(signature)
        )
    }

    /// Every failure maps to the same validation error; the reason is not
    /// echoed back to the client.
    pub fn decode(&self, token: &str) -> Result<Cursor, ValidationError> {
        let invalid = || ValidationError::field("after", "invalid cursor");

        let (payload, signature) = token.split_once('.').ok_or_else(invalid)?;
        let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;

        let mut mac = self.mac.clone();
        mac.update(&payload);
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        serde_json::from_slice(&payload).map_err(|_| invalid())
    }
}

/// Supplies the values a cursor is minted from.
pub trait Pageable {
    fn cursor_id(&self) -> i64;

    /// Value of `key.field` for this row.
    fn cursor_value(&self, key: &SortKey) -> CursorValue;
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
    pub limit: i64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            has_more: self.has_more,
            next_cursor: self.next_cursor,
            limit: self.limit,
        }
    }
}

/// A validated page position, ready to be applied to a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeysetWindow {
    key: SortKey,
    limit: i64,
    after: Option<Cursor>,
}

impl KeysetWindow {
    pub fn key(&self) -> SortKey {
        self.key
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    /// Rows requested from the database: one more than the page size.
    pub fn fetch_limit(&self) -> i64 {
        self.limit + 1
    }

    pub fn after(&self) -> Option<&Cursor> {
        self.after.as_ref()
    }

    /// Adds the keyset predicate, ordering and probe limit.
    pub(crate) fn apply(&self, mut select: Select) -> QueryBuilder<'static, Any> {
        let field = self.key.field;
        let cmp = self.key.direction.comparison();

        if let Some(cursor) = &self.after {
            if self.key.is_primary_key() {
                select
                    .and()
                    .push(format!("id {cmp} "))
                    .push_bind(cursor.id);
            } else {
                let builder = select.and();
                builder.push(format!("({field} {cmp} "));
                push_value(builder, &cursor.value);
                builder.push(format!(" OR ({field} = "));
                push_value(builder, &cursor.value);
                builder.push(format!(" AND id {cmp} "));
                builder.push_bind(cursor.id);
                builder.push("))");
            }
        }

        let dir = self.key.direction.keyword();
        let builder = select.builder();
        if self.key.is_primary_key() {
            builder.push(format!(" ORDER BY id {dir}"));
        } else {
            builder.push(format!(" ORDER BY {field} {dir}, id {dir}"));
        }
        builder.push(" LIMIT ").push_bind(self.fetch_limit());
        select.into_builder()
    }
}

fn push_value(builder: &mut QueryBuilder<'static, Any>, value: &CursorValue) {
    match value {
        CursorValue::Int(v) => builder.push_bind(*v),
        CursorValue::Text(v) => builder.push_bind(v.clone()),
    };
}

/// Turns page requests into keyset windows and query results into pages.
#[derive(Debug, Clone)]
pub struct CursorPager {
    codec: CursorCodec,
    default_limit: i64,
    max_limit: i64,
}

impl CursorPager {
    pub fn new(codec: CursorCodec) -> Self {
        Self {
            codec,
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: MAX_PAGE_LIMIT,
        }
    }

    /// Overrides the largest page served; values above it are clamped.
    pub fn with_max_limit(mut self, max_limit: i64) -> Self {
        self.max_limit = max_limit.max(1);
        self.default_limit = self.default_limit.min(self.max_limit);
        self
    }

    pub fn max_limit(&self) -> i64 {
        self.max_limit
    }

    pub fn codec(&self) -> &CursorCodec {
        &self.codec
    }

    /// Applies the default, rejects non-positive values and clamps the rest.
    pub fn resolve_limit(&self, requested: Option<i64>) -> Result<i64, ValidationError> {
        match requested {
            None => Ok(self.default_limit),
            Some(limit) if limit <= 0 => Err(ValidationError::from_violations(vec![
                FieldViolation::new("limit", "limit must be greater than 0").with_value(limit),
            ])),
            Some(limit) => Ok(limit.min(self.max_limit)),
        }
    }

    pub fn open(&self, key: SortKey, request: &PageRequest) -> Result<KeysetWindow, ValidationError> {
        let limit = self.resolve_limit(request.limit)?;
        let after = match request.after.as_deref() {
            None | Some("") => None,
            Some(token) => {
                let cursor = self.codec.decode(token)?;
                if cursor.field != key.field || cursor.direction != key.direction {
                    return Err(ValidationError::field(
                        "after",
                        format!("cursor does not belong to a list sorted by {}", key.field),
                    ));
                }
                if matches!(cursor.value, CursorValue::Text(_)) && key.is_primary_key() {
                    return Err(ValidationError::field("after", "invalid cursor"));
                }
                Some(cursor)
            }
        };
        Ok(KeysetWindow { key, limit, after })
    }

    /// `rows` must be the result of the query built by [`KeysetWindow::apply`].
    pub fn close<T: Pageable>(&self, window: KeysetWindow, mut rows: Vec<T>) -> Page<T> {
        let limit = usize::try_from(window.limit).unwrap_or(usize::MAX);
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        let next_cursor = if has_more {
            rows.last().map(|last| {
                self.codec.encode(&Cursor {
                    field: window.key.field.to_string(),
                    direction: window.key.direction,
                    value: last.cursor_value(&window.key),
                    id: last.cursor_id(),
                })
            })
        } else {
            None
        };

        Page {
            items: rows,
            has_more,
            next_cursor,
            limit: window.limit,
        }
    }
}
