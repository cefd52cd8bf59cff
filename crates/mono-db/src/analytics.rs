//! Activity and item-view events on the analytics database.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{any::AnyRow, Row};
use tracing::debug;

use crate::{
    audit::{AuditLogService, LogLevel, NewApplicationLog},
    error::{DbError, FieldViolation, ValidationError, Violations},
    pager::{CursorPager, CursorValue, Page, PageRequest, Pageable, SortKey},
    session::{ScopedSession, SessionProvider},
    sql::{self, Select},
};

pub const DEFAULT_POPULAR_LIMIT: i64 = 10;
const SUMMARY_TOP_ITEMS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserActivity {
    pub id: i64,
    pub user_id: i64,
    pub action: String,
    pub page_url: Option<String>,
    /// Seconds.
    pub session_duration: Option<i64>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUserActivity {
    pub user_id: i64,
    pub action: String,
    pub page_url: Option<String>,
    pub session_duration: Option<i64>,
    pub ip_address: Option<String>,
}

impl NewUserActivity {
    pub fn new(user_id: i64, action: impl Into<String>) -> Self {
        Self {
            user_id,
            action: action.into(),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Violations::default();
        violations.check(self.user_id > 0, || {
            FieldViolation::new("user_id", "user_id must be positive").with_value(self.user_id)
        });
        let action_chars = self.action.trim().chars().count();
        violations.check((1..=100).contains(&action_chars), || {
            FieldViolation::new("action", "action must be between 1 and 100 characters")
        });
        violations.check(
            self.page_url.as_ref().map_or(true, |url| url.chars().count() <= 500),
            || FieldViolation::new("page_url", "page_url must be at most 500 characters"),
        );
        violations.check(self.session_duration.map_or(true, |secs| secs >= 0), || {
            FieldViolation::new("session_duration", "session_duration must not be negative")
        });
        violations.check(
            self.ip_address.as_ref().map_or(true, |ip| ip.len() <= 45),
            || FieldViolation::new("ip_address", "ip_address must be at most 45 characters"),
        );
        violations.finish()
    }
}

/// View counter for one (item, viewer) pair; anonymous views share one row
/// per item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemView {
    pub id: i64,
    pub item_id: i64,
    pub user_id: Option<i64>,
    pub view_count: i64,
    pub last_viewed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewItemView {
    pub item_id: i64,
    pub user_id: Option<i64>,
}

impl NewItemView {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Violations::default();
        violations.check(self.item_id > 0, || {
            FieldViolation::new("item_id", "item_id must be positive").with_value(self.item_id)
        });
        violations.check(self.user_id.map_or(true, |id| id > 0), || {
            FieldViolation::new("user_id", "user_id must be positive")
        });
        violations.finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PopularItem {
    pub item_id: i64,
    pub total_views: i64,
    /// Distinct viewer rows, anonymous viewers counted once.
    pub unique_views: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyticsSummary {
    pub total_user_activities: i64,
    pub total_item_views: i64,
    pub top_popular_items: Vec<PopularItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityFilter {
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemViewFilter {
    pub item_id: Option<i64>,
}

impl Pageable for UserActivity {
    fn cursor_id(&self) -> i64 {
        self.id
    }

    fn cursor_value(&self, _key: &SortKey) -> CursorValue {
        CursorValue::Int(self.id)
    }
}

impl Pageable for ItemView {
    fn cursor_id(&self) -> i64 {
        self.id
    }

    fn cursor_value(&self, key: &SortKey) -> CursorValue {
        match key.field {
            "last_viewed_at" => CursorValue::Text(sql::format_timestamp(self.last_viewed_at)),
            _ => CursorValue::Int(self.id),
        }
    }
}

const SELECT_ACTIVITY: &str = "SELECT id, user_id, action, page_url, session_duration, \
     ip_address, created_at FROM user_activities";

const SELECT_ITEM_VIEW: &str = "SELECT id, item_id, user_id, view_count, last_viewed_at, \
     created_at, updated_at FROM item_views";

const RECENT_VIEWS_KEY: SortKey = SortKey::desc("last_viewed_at");

#[derive(Debug, Clone)]
pub struct AnalyticsService {
    provider: SessionProvider,
    pager: CursorPager,
    audit: AuditLogService,
}

impl AnalyticsService {
    pub fn new(provider: SessionProvider, pager: CursorPager, audit: AuditLogService) -> Self {
        Self {
            provider,
            pager,
            audit,
        }
    }

    pub async fn log_user_activity(&self, input: NewUserActivity) -> Result<UserActivity, DbError> {
        input.validate()?;
        let mut session = self.provider.acquire().await?;
        let result = insert_activity(&mut session, input).await;
        let activity = session.finish(result).await?;

        self.record_event(
            format!(
                "activity '{}' logged for user {}",
                activity.action, activity.user_id
            ),
            "log_user_activity",
        );
        Ok(activity)
    }

    /// Increments the counter of an existing (item, viewer) row or creates it.
    pub async fn log_item_view(&self, input: NewItemView) -> Result<ItemView, DbError> {
        input.validate()?;
        let mut session = self.provider.acquire().await?;
        let result = upsert_item_view(&mut session, input).await;
        let view = session.finish(result).await?;

        self.record_event(
            format!("view {} recorded for item {}", view.view_count, view.item_id),
            "log_item_view",
        );
        Ok(view)
    }

    /// Newest first.
    pub async fn list_user_activities(
        &self,
        filter: ActivityFilter,
        page: &PageRequest,
    ) -> Result<Page<UserActivity>, DbError> {
        let window = self.pager.open(SortKey::ID_DESC, page)?;
        let mut select = Select::new(SELECT_ACTIVITY);
        select.eq_opt("user_id", filter.user_id);

        let mut session = self.provider.acquire().await?;
        let result = sql::fetch_rows(&mut session, window.apply(select), map_activity).await;
        let rows = session.finish(result).await?;
        Ok(self.pager.close(window, rows))
    }

    /// Most recently viewed first.
    pub async fn list_item_views(
        &self,
        filter: ItemViewFilter,
        page: &PageRequest,
    ) -> Result<Page<ItemView>, DbError> {
        let window = self.pager.open(RECENT_VIEWS_KEY, page)?;
        let mut select = Select::new(SELECT_ITEM_VIEW);
        select.eq_opt("item_id", filter.item_id);

        let mut session = self.provider.acquire().await?;
        let result = sql::fetch_rows(&mut session, window.apply(select), map_item_view).await;
        let rows = session.finish(result).await?;
        Ok(self.pager.close(window, rows))
    }

    /// Items ordered by total views; `limit` follows the page-size rules.
    pub async fn popular_items(&self, limit: Option<i64>) -> Result<Vec<PopularItem>, DbError> {
        let limit = self
            .pager
            .resolve_limit(Some(limit.unwrap_or(DEFAULT_POPULAR_LIMIT)))?;
        let mut session = self.provider.acquire().await?;
        let result = fetch_popular(&mut session, limit).await;
        session.finish(result).await
    }

    /// Totals and the top five items, read in one session.
    pub async fn summary(&self) -> Result<AnalyticsSummary, DbError> {
        let mut session = self.provider.acquire().await?;
        let result = async {
            let total_user_activities: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM user_activities")
                    .fetch_one(session.conn())
                    .await?;
            let total_item_views: i64 = sqlx::query_scalar(
                "SELECT CAST(COALESCE(SUM(view_count), 0) AS SIGNED) FROM item_views",
            )
            .fetch_one(session.conn())
            .await?;
            let top_popular_items = fetch_popular(&mut session, SUMMARY_TOP_ITEMS).await?;
            Ok::<_, DbError>(AnalyticsSummary {
                total_user_activities,
                total_item_views,
                top_popular_items,
            })
        }
        .await;
        session.finish(result).await
    }

    fn record_event(&self, message: String, function: &str) {
        self.audit.record_detached(
            NewApplicationLog::new(LogLevel::Info, "analytics", message)
                .module("analytics")
                .function(function),
        );
    }
}

async fn insert_activity(
    session: &mut ScopedSession,
    input: NewUserActivity,
) -> Result<UserActivity, DbError> {
    let result = sqlx::query(
        r#"
        INSERT INTO user_activities (
            user_id, action, page_url, session_duration, ip_address, created_at
        ) VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(input.user_id)
    .bind(input.action.trim().to_string())
    .bind(input.page_url)
    .bind(input.session_duration)
    .bind(input.ip_address)
    .bind(sql::now_timestamp())
    .execute(session.conn())
    .await?;

    let id = sql::inserted_id(session, &result, "user_activities").await?;
    let row = sqlx::query(&format!("{SELECT_ACTIVITY} WHERE id = ?"))
        .bind(id)
        .fetch_one(session.conn())
        .await?;
    map_activity(&row)
}

async fn upsert_item_view(
    session: &mut ScopedSession,
    input: NewItemView,
) -> Result<ItemView, DbError> {
    let mut select = Select::new("SELECT id FROM item_views");
    select.eq("item_id", input.item_id);
    match input.user_id {
        Some(user_id) => {
            select.eq("user_id", user_id);
        }
        None => {
            select.and().push("user_id IS NULL");
        }
    }
    select.builder().push(" ORDER BY id LIMIT 1");
    let existing: Option<i64> = select
        .into_builder()
        .build_query_scalar()
        .fetch_optional(session.conn())
        .await?;

    let now = sql::now_timestamp();
    let id = match existing {
        Some(id) => {
            sqlx::query(
                "UPDATE item_views SET view_count = view_count + 1, last_viewed_at = ?, \
                 updated_at = ? WHERE id = ?",
            )
            .bind(now.clone())
            .bind(now)
            .bind(id)
            .execute(session.conn())
            .await?;
            debug!(item_id = input.item_id, "item view count incremented");
            id
        }
        None => {
            let result = sqlx::query(
                r#"
                INSERT INTO item_views (
                    item_id, user_id, view_count, last_viewed_at, created_at, updated_at
                ) VALUES (?, ?, 1, ?, ?, NULL)
                "#,
            )
            .bind(input.item_id)
            .bind(input.user_id)
            .bind(now.clone())
            .bind(now)
            .execute(session.conn())
            .await?;
            debug!(item_id = input.item_id, "item view created");
            sql::inserted_id(session, &result, "item_views").await?
        }
    };

    let row = sqlx::query(&format!("{SELECT_ITEM_VIEW} WHERE id = ?"))
        .bind(id)
        .fetch_one(session.conn())
        .await?;
    map_item_view(&row)
}

async fn fetch_popular(session: &mut ScopedSession, limit: i64) -> Result<Vec<PopularItem>, DbError> {
    let rows = sqlx::query(
        r#"
        SELECT item_id,
               CAST(SUM(view_count) AS SIGNED) AS total_views,
               COUNT(id) AS unique_views
        FROM item_views
        GROUP BY item_id
        ORDER BY total_views DESC, item_id ASC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(session.conn())
    .await?;

    rows.iter()
        .map(|row| {
            Ok(PopularItem {
                item_id: row.try_get("item_id")?,
                total_views: row.try_get("total_views")?,
                unique_views: row.try_get("unique_views")?,
            })
        })
        .collect()
}

fn map_activity(row: &AnyRow) -> Result<UserActivity, DbError> {
    Ok(UserActivity {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        action: row.try_get("action")?,
        page_url: row.try_get("page_url")?,
        session_duration: row.try_get("session_duration")?,
        ip_address: row.try_get("ip_address")?,
        created_at: sql::get_timestamp(row, "user_activities", "created_at")?,
    })
}

fn map_item_view(row: &AnyRow) -> Result<ItemView, DbError> {
    Ok(ItemView {
        id: row.try_get("id")?,
        item_id: row.try_get("item_id")?,
        user_id: row.try_get("user_id")?,
        view_count: row.try_get("view_count")?,
        last_viewed_at: sql::get_timestamp(row, "item_views", "last_viewed_at")?,
        created_at: sql::get_timestamp(row, "item_views", "created_at")?,
        updated_at: sql::get_opt_timestamp(row, "item_views", "updated_at")?,
    })
}
