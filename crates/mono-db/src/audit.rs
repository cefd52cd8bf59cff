//! Application and API request logs, persisted to the logs database.
//!
//! Other services call the `*_best_effort` helpers after their own unit of
//! work has committed. Those writes run in their own session; a failure is
//! reported through `tracing` and never reaches the caller.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{any::AnyRow, Row};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    error::{DbError, FieldViolation, ValidationError, Violations},
    pager::{CursorPager, CursorValue, Page, PageRequest, Pageable, SortKey},
    schema::LONG_TEXT_LIMIT,
    session::{ScopedSession, SessionProvider},
    sql::{self, Select},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        Self::Debug,
        Self::Info,
        Self::Warning,
        Self::Error,
        Self::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                ValidationError::from_violations(vec![FieldViolation::new(
                    "level",
                    "level must be one of DEBUG, INFO, WARNING, ERROR, CRITICAL",
                )
                .with_value(value)])
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationLog {
    pub id: i64,
    pub level: LogLevel,
    pub logger_name: String,
    pub message: String,
    pub module: Option<String>,
    pub function: Option<String>,
    pub line_number: Option<i64>,
    pub stack_trace: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewApplicationLog {
    pub level: LogLevel,
    pub logger_name: String,
    pub message: String,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub line_number: Option<i64>,
    #[serde(default)]
    pub stack_trace: Option<String>,
}

impl NewApplicationLog {
    pub fn new(level: LogLevel, logger_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            logger_name: logger_name.into(),
            message: message.into(),
            module: None,
            function: None,
            line_number: None,
            stack_trace: None,
        }
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Violations::default();
        violations.check(!self.logger_name.trim().is_empty(), || {
            FieldViolation::new("logger_name", "logger_name must not be empty")
        });
        violations.check(self.logger_name.chars().count() <= 100, || {
            FieldViolation::new("logger_name", "logger_name must be at most 100 characters")
        });
        violations.check(!self.message.trim().is_empty(), || {
            FieldViolation::new("message", "message must not be empty")
        });
        violations.check(self.line_number.map_or(true, |line| line >= 0), || {
            FieldViolation::new("line_number", "line_number must not be negative")
        });
        violations.finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiLog {
    pub id: i64,
    pub method: String,
    pub endpoint: String,
    pub status_code: i64,
    pub response_time_ms: Option<i64>,
    pub user_id: Option<i64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_body: Option<String>,
    pub response_body: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewApiLog {
    pub method: String,
    pub endpoint: String,
    pub status_code: i64,
    #[serde(default)]
    pub response_time_ms: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub request_body: Option<String>,
    #[serde(default)]
    pub response_body: Option<String>,
}

impl NewApiLog {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Violations::default();
        violations.check(
            !self.method.trim().is_empty() && self.method.len() <= 10,
            || FieldViolation::new("method", "method must be 1 to 10 characters"),
        );
        violations.check(!self.endpoint.trim().is_empty(), || {
            FieldViolation::new("endpoint", "endpoint must not be empty")
        });
        violations.check((100..=599).contains(&self.status_code), || {
            FieldViolation::new("status_code", "status_code must be between 100 and 599")
                .with_value(self.status_code)
        });
        violations.check(self.response_time_ms.map_or(true, |ms| ms >= 0), || {
            FieldViolation::new("response_time_ms", "response_time_ms must not be negative")
        });
        violations.finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationLogFilter {
    pub level: Option<LogLevel>,
    pub logger_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiLogFilter {
    pub method: Option<String>,
    pub status_code: Option<i64>,
    pub user_id: Option<i64>,
}

impl Pageable for ApplicationLog {
    fn cursor_id(&self) -> i64 {
        self.id
    }

    fn cursor_value(&self, _key: &SortKey) -> CursorValue {
        CursorValue::Int(self.id)
    }
}

impl Pageable for ApiLog {
    fn cursor_id(&self) -> i64 {
        self.id
    }

    fn cursor_value(&self, key: &SortKey) -> CursorValue {
        match key.field {
            "response_time_ms" => CursorValue::Int(self.response_time_ms.unwrap_or_default()),
            _ => CursorValue::Int(self.id),
        }
    }
}

const SELECT_APPLICATION_LOG: &str = "SELECT id, level, logger_name, message, module, \
     function_name, line_number, stack_trace, created_at FROM application_logs";

const SELECT_API_LOG: &str = "SELECT id, method, endpoint, status_code, response_time_ms, \
     user_id, ip_address, user_agent, request_body, response_body, created_at FROM api_logs";

const SLOW_REQUEST_KEY: SortKey = SortKey::desc("response_time_ms");

/// Audit trail bound to the logs database.
#[derive(Debug, Clone)]
pub struct AuditLogService {
    provider: SessionProvider,
    pager: CursorPager,
}

impl AuditLogService {
    pub fn new(provider: SessionProvider, pager: CursorPager) -> Self {
        Self { provider, pager }
    }

    pub async fn record_application(
        &self,
        entry: NewApplicationLog,
    ) -> Result<ApplicationLog, DbError> {
        entry.validate()?;
        let mut session = self.provider.acquire().await?;
        let result = insert_application_log(&mut session, entry).await;
        session.finish(result).await
    }

    pub async fn record_api_request(&self, entry: NewApiLog) -> Result<ApiLog, DbError> {
        entry.validate()?;
        let mut session = self.provider.acquire().await?;
        let result = insert_api_log(&mut session, entry).await;
        session.finish(result).await
    }

    /// Writes the entry in its own session; failures are only logged.
    pub async fn record_best_effort(&self, entry: NewApplicationLog) {
        let level = entry.level;
        if let Err(err) = self.record_application(entry).await {
            warn!(%level, error = %err, "application log entry dropped");
        }
    }

    /// Hands the entry to a background task so the caller never waits on the
    /// logs database.
    pub fn record_detached(&self, entry: NewApplicationLog) -> JoinHandle<()> {
        let audit = self.clone();
        tokio::spawn(async move { audit.record_best_effort(entry).await })
    }

    pub async fn record_api_request_best_effort(&self, entry: NewApiLog) {
        let method = entry.method.clone();
        let endpoint = entry.endpoint.clone();
        if let Err(err) = self.record_api_request(entry).await {
            warn!(%method, %endpoint, error = %err, "api log entry dropped");
        }
    }

    /// Newest first.
    pub async fn list_application_logs(
        &self,
        filter: &ApplicationLogFilter,
        page: &PageRequest,
    ) -> Result<Page<ApplicationLog>, DbError> {
        let window = self.pager.open(SortKey::ID_DESC, page)?;
        let mut select = Select::new(SELECT_APPLICATION_LOG);
        select
            .eq_opt("level", filter.level.map(|level| level.as_str().to_string()))
            .eq_opt("logger_name", filter.logger_name.clone());

        let mut session = self.provider.acquire().await?;
        let result = sql::fetch_rows(&mut session, window.apply(select), map_application_log).await;
        let rows = session.finish(result).await?;
        Ok(self.pager.close(window, rows))
    }

    /// Newest first.
    pub async fn list_api_logs(
        &self,
        filter: &ApiLogFilter,
        page: &PageRequest,
    ) -> Result<Page<ApiLog>, DbError> {
        let window = self.pager.open(SortKey::ID_DESC, page)?;
        let mut select = Select::new(SELECT_API_LOG);
        select
            .eq_opt("method", filter.method.as_ref().map(|m| m.to_uppercase()))
            .eq_opt("status_code", filter.status_code)
            .eq_opt("user_id", filter.user_id);

        let mut session = self.provider.acquire().await?;
        let result = sql::fetch_rows(&mut session, window.apply(select), map_api_log).await;
        let rows = session.finish(result).await?;
        Ok(self.pager.close(window, rows))
    }

    /// `ERROR` and `CRITICAL` entries, newest first.
    pub async fn error_logs(&self, page: &PageRequest) -> Result<Page<ApplicationLog>, DbError> {
        let window = self.pager.open(SortKey::ID_DESC, page)?;
        let mut select = Select::new(SELECT_APPLICATION_LOG);
        select
            .and()
            .push("level IN (")
            .push_bind(LogLevel::Error.as_str().to_string())
            .push(", ")
            .push_bind(LogLevel::Critical.as_str().to_string())
            .push(")");

        let mut session = self.provider.acquire().await?;
        let result = sql::fetch_rows(&mut session, window.apply(select), map_application_log).await;
        let rows = session.finish(result).await?;
        Ok(self.pager.close(window, rows))
    }

    /// Requests slower than `threshold_ms`, slowest first.
    pub async fn slow_requests(
        &self,
        threshold_ms: i64,
        page: &PageRequest,
    ) -> Result<Page<ApiLog>, DbError> {
        if threshold_ms < 0 {
            return Err(ValidationError::from_violations(vec![FieldViolation::new(
                "threshold_ms",
                "threshold_ms must not be negative",
            )
            .with_value(threshold_ms)])
            .into());
        }
        let window = self.pager.open(SLOW_REQUEST_KEY, page)?;
        let mut select = Select::new(SELECT_API_LOG);
        select
            .and()
            .push("response_time_ms > ")
            .push_bind(threshold_ms);

        let mut session = self.provider.acquire().await?;
        let result = sql::fetch_rows(&mut session, window.apply(select), map_api_log).await;
        let rows = session.finish(result).await?;
        Ok(self.pager.close(window, rows))
    }
}

async fn insert_application_log(
    session: &mut ScopedSession,
    entry: NewApplicationLog,
) -> Result<ApplicationLog, DbError> {
    let result = sqlx::query(
        r#"
        INSERT INTO application_logs (
            level, logger_name, message, module, function_name,
            line_number, stack_trace, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.level.as_str())
    .bind(entry.logger_name.trim().to_string())
    .bind(sql::clip(entry.message, LONG_TEXT_LIMIT))
    .bind(entry.module.map(|m| sql::clip(m, 100)))
    .bind(entry.function.map(|f| sql::clip(f, 100)))
    .bind(entry.line_number)
    .bind(entry.stack_trace.map(|s| sql::clip(s, LONG_TEXT_LIMIT)))
    .bind(sql::now_timestamp())
    .execute(session.conn())
    .await?;

    let id = sql::inserted_id(session, &result, "application_logs").await?;
    let row = sqlx::query(&format!("{SELECT_APPLICATION_LOG} WHERE id = ?"))
        .bind(id)
        .fetch_one(session.conn())
        .await?;
    let log = map_application_log(&row)?;
    debug!(id = log.id, level = %log.level, "application log recorded");
    Ok(log)
}

async fn insert_api_log(session: &mut ScopedSession, entry: NewApiLog) -> Result<ApiLog, DbError> {
    let result = sqlx::query(
        r#"
        INSERT INTO api_logs (
            method, endpoint, status_code, response_time_ms, user_id,
            ip_address, user_agent, request_body, response_body, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.method.to_uppercase())
    .bind(sql::clip(entry.endpoint, 500))
    .bind(entry.status_code)
    .bind(entry.response_time_ms)
    .bind(entry.user_id)
    .bind(entry.ip_address.map(|ip| sql::clip(ip, 45)))
    .bind(entry.user_agent.map(|ua| sql::clip(ua, 500)))
    .bind(entry.request_body.map(|b| sql::clip(b, LONG_TEXT_LIMIT)))
    .bind(entry.response_body.map(|b| sql::clip(b, LONG_TEXT_LIMIT)))
    .bind(sql::now_timestamp())
    .execute(session.conn())
    .await?;

    let id = sql::inserted_id(session, &result, "api_logs").await?;
    let row = sqlx::query(&format!("{SELECT_API_LOG} WHERE id = ?"))
        .bind(id)
        .fetch_one(session.conn())
        .await?;
    map_api_log(&row)
}

fn map_application_log(row: &AnyRow) -> Result<ApplicationLog, DbError> {
    let level: String = row.try_get("level")?;
    let level = level.parse::<LogLevel>().map_err(|_| DbError::Decode {
        table: "application_logs",
        column: "level",
        reason: format!("unknown log level '{level}'"),
    })?;

    Ok(ApplicationLog {
        id: row.try_get("id")?,
        level,
        logger_name: row.try_get("logger_name")?,
        message: row.try_get("message")?,
        module: row.try_get("module")?,
        function: row.try_get("function_name")?,
        line_number: row.try_get("line_number")?,
        stack_trace: row.try_get("stack_trace")?,
        created_at: sql::get_timestamp(row, "application_logs", "created_at")?,
    })
}

fn map_api_log(row: &AnyRow) -> Result<ApiLog, DbError> {
    Ok(ApiLog {
        id: row.try_get("id")?,
        method: row.try_get("method")?,
        endpoint: row.try_get("endpoint")?,
        status_code: row.try_get("status_code")?,
        response_time_ms: row.try_get("response_time_ms")?,
        user_id: row.try_get("user_id")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        request_body: row.try_get("request_body")?,
        response_body: row.try_get("response_body")?,
        created_at: sql::get_timestamp(row, "api_logs", "created_at")?,
    })
}
