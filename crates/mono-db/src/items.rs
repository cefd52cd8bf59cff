//! Items catalog on the main database.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{any::AnyRow, Row};
use tracing::info;

use crate::{
    audit::{AuditLogService, LogLevel, NewApplicationLog},
    error::{DbError, FieldViolation, ValidationError, Violations},
    pager::{CursorPager, CursorValue, Page, PageRequest, Pageable, SortKey},
    schema::LONG_TEXT_LIMIT,
    session::{ScopedSession, SessionProvider},
    sql::{self, Select},
};

const NAME_MAX_CHARS: usize = 255;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Pageable for Item {
    fn cursor_id(&self) -> i64 {
        self.id
    }

    fn cursor_value(&self, key: &SortKey) -> CursorValue {
        match key.field {
            "name" => CursorValue::Text(self.name.clone()),
            _ => CursorValue::Int(self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub name: String,
    pub description: Option<String>,
}

impl NewItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Violations::default();
        check_name(&mut violations, &self.name);
        check_description(&mut violations, self.description.as_deref());
        violations.finish()
    }
}

/// Partial update. `None` leaves a field untouched; `description: Some(None)`
/// clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Violations::default();
        if let Some(name) = &self.name {
            check_name(&mut violations, name);
        }
        if let Some(description) = &self.description {
            check_description(&mut violations, description.as_deref());
        }
        violations.finish()
    }

    /// Applies the set fields on top of `item`.
    pub fn merge(self, mut item: Item) -> Item {
        if let Some(name) = self.name {
            item.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            item.description = description;
        }
        item
    }
}

fn check_name(violations: &mut Violations, name: &str) {
    let chars = name.trim().chars().count();
    violations.check((1..=NAME_MAX_CHARS).contains(&chars), || {
        FieldViolation::new("name", "name must be between 1 and 255 characters")
            .with_value(name)
    });
}

fn check_description(violations: &mut Violations, description: Option<&str>) {
    violations.check(
        description.map_or(true, |d| d.chars().count() <= LONG_TEXT_LIMIT),
        || FieldViolation::new("description", "description must be at most 4096 characters"),
    );
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ItemSort {
    #[default]
    Id,
    Name,
}

impl ItemSort {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "id" => Ok(Self::Id),
            "name" => Ok(Self::Name),
            other => Err(ValidationError::from_violations(vec![FieldViolation::new(
                "sort",
                "sort must be one of: id, name",
            )
            .with_value(other)])),
        }
    }

    fn key(self) -> SortKey {
        match self {
            Self::Id => SortKey::ID_ASC,
            Self::Name => SortKey::asc("name"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    /// Case-insensitive substring of the name.
    pub q: Option<String>,
    pub sort: ItemSort,
}

const SELECT_ITEM: &str =
    "SELECT id, name, description, is_active, created_at, updated_at FROM items";

#[derive(Debug, Clone)]
pub struct ItemService {
    provider: SessionProvider,
    pager: CursorPager,
    audit: AuditLogService,
}

impl ItemService {
    pub fn new(provider: SessionProvider, pager: CursorPager, audit: AuditLogService) -> Self {
        Self {
            provider,
            pager,
            audit,
        }
    }

    pub async fn create(&self, input: NewItem) -> Result<Item, DbError> {
        input.validate()?;
        let mut session = self.provider.acquire().await?;
        let result = insert_item(&mut session, input).await;
        let item = session.finish(result).await?;

        info!(item_id = item.id, "item created");
        self.record_event(format!("item {} created", item.id), "create");
        Ok(item)
    }

    /// Active items only.
    pub async fn get(&self, id: i64) -> Result<Item, DbError> {
        let mut session = self.provider.acquire().await?;
        let result = fetch_item(&mut session, id, true).await;
        session.finish(result).await
    }

    pub async fn update(&self, id: i64, patch: ItemPatch) -> Result<Item, DbError> {
        patch.validate()?;
        let mut session = self.provider.acquire().await?;
        let result = update_item(&mut session, id, patch).await;
        let item = session.finish(result).await?;

        info!(item_id = item.id, "item updated");
        self.record_event(format!("item {id} updated"), "update");
        Ok(item)
    }

    /// Marks the item inactive. The row is kept.
    pub async fn delete(&self, id: i64) -> Result<(), DbError> {
        let mut session = self.provider.acquire().await?;
        let result = deactivate_item(&mut session, id).await;
        session.finish(result).await?;

        info!(item_id = id, "item deleted");
        self.record_event(format!("item {id} deleted"), "delete");
        Ok(())
    }

    /// Active items matching `filter`, in sort-key order.
    pub async fn list(
        &self,
        filter: &ItemFilter,
        page: &PageRequest,
    ) -> Result<Page<Item>, DbError> {
        let window = self.pager.open(filter.sort.key(), page)?;
        let mut select = Select::new(SELECT_ITEM);
        select.eq("is_active", sql::flag(true));
        if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            select
                .and()
                .push("LOWER(name) LIKE ")
                .push_bind(sql::like_contains(q))
                .push(" ESCAPE '!'");
        }

        let mut session = self.provider.acquire().await?;
        let result = sql::fetch_rows(&mut session, window.apply(select), map_item).await;
        let rows = session.finish(result).await?;
        Ok(self.pager.close(window, rows))
    }

    fn record_event(&self, message: String, function: &str) {
        self.audit.record_detached(
            NewApplicationLog::new(LogLevel::Info, "items", message)
                .module("items")
                .function(function),
        );
    }
}

async fn insert_item(session: &mut ScopedSession, input: NewItem) -> Result<Item, DbError> {
    let result = sqlx::query(
        r#"
        INSERT INTO items (name, description, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, NULL)
        "#,
    )
    .bind(input.name.trim().to_string())
    .bind(input.description)
    .bind(sql::flag(true))
    .bind(sql::now_timestamp())
    .execute(session.conn())
    .await?;

    let id = sql::inserted_id(session, &result, "items").await?;
    fetch_item(session, id, false).await
}

async fn fetch_item(
    session: &mut ScopedSession,
    id: i64,
    active_only: bool,
) -> Result<Item, DbError> {
    let row = sqlx::query(&format!("{SELECT_ITEM} WHERE id = ?"))
        .bind(id)
        .fetch_optional(session.conn())
        .await?;

    match row.map(|row| map_item(&row)).transpose()? {
        Some(item) if item.is_active || !active_only => Ok(item),
        _ => Err(DbError::not_found("item", id)),
    }
}

async fn update_item(session: &mut ScopedSession, id: i64, patch: ItemPatch) -> Result<Item, DbError> {
    let current = fetch_item(session, id, true).await?;
    if patch.is_empty() {
        return Ok(current);
    }
    let merged = patch.merge(current);

    sqlx::query("UPDATE items SET name = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(merged.name)
        .bind(merged.description)
        .bind(sql::now_timestamp())
        .bind(id)
        .execute(session.conn())
        .await?;

    fetch_item(session, id, true).await
}

async fn deactivate_item(session: &mut ScopedSession, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE items SET is_active = ?, updated_at = ? WHERE id = ? AND is_active = ?",
    )
    .bind(sql::flag(false))
    .bind(sql::now_timestamp())
    .bind(id)
    .bind(sql::flag(true))
    .execute(session.conn())
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("item", id));
    }
    Ok(())
}

fn map_item(row: &AnyRow) -> Result<Item, DbError> {
    Ok(Item {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        is_active: sql::get_flag(row, "is_active")?,
        created_at: sql::get_timestamp(row, "items", "created_at")?,
        updated_at: sql::get_opt_timestamp(row, "items", "updated_at")?,
    })
}
