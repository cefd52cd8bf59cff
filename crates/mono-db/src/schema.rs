//! Idempotent table bootstrap for each database role.
//!
//! Columns use only types the `Any` driver decodes on both MySQL and SQLite:
//! `BIGINT` for integers and flags, `VARCHAR` for text and RFC3339 timestamps.

use sqlx::AnyPool;
use tracing::info;

use crate::{profile::Backend, DatabaseRole};

struct Table {
    name: &'static str,
    columns: &'static [(&'static str, &'static str)],
    unique: &'static [&'static str],
    indexes: &'static [&'static str],
}

const ITEMS: Table = Table {
    name: "items",
    columns: &[
        ("name", "VARCHAR(255) NOT NULL"),
        ("description", "VARCHAR(4096) NULL"),
        ("is_active", "BIGINT NOT NULL DEFAULT 1"),
        ("created_at", "VARCHAR(40) NOT NULL"),
        ("updated_at", "VARCHAR(40) NULL"),
    ],
    unique: &[],
    indexes: &["name"],
};

const USERS: Table = Table {
    name: "users",
    columns: &[
        ("email", "VARCHAR(255) NOT NULL"),
        ("username", "VARCHAR(100) NOT NULL"),
        ("full_name", "VARCHAR(255) NULL"),
        ("hashed_password", "VARCHAR(255) NOT NULL"),
        ("is_active", "BIGINT NOT NULL DEFAULT 1"),
        ("is_superuser", "BIGINT NOT NULL DEFAULT 0"),
        ("created_at", "VARCHAR(40) NOT NULL"),
        ("updated_at", "VARCHAR(40) NULL"),
    ],
    unique: &["email", "username"],
    indexes: &[],
};

const USER_ACTIVITIES: Table = Table {
    name: "user_activities",
    columns: &[
        ("user_id", "BIGINT NOT NULL"),
        ("action", "VARCHAR(100) NOT NULL"),
        ("page_url", "VARCHAR(500) NULL"),
        ("session_duration", "BIGINT NULL"),
        ("ip_address", "VARCHAR(45) NULL"),
        ("created_at", "VARCHAR(40) NOT NULL"),
    ],
    unique: &[],
    indexes: &["user_id"],
};

const ITEM_VIEWS: Table = Table {
    name: "item_views",
    columns: &[
        ("item_id", "BIGINT NOT NULL"),
        ("user_id", "BIGINT NULL"),
        ("view_count", "BIGINT NOT NULL DEFAULT 1"),
        ("last_viewed_at", "VARCHAR(40) NOT NULL"),
        ("created_at", "VARCHAR(40) NOT NULL"),
        ("updated_at", "VARCHAR(40) NULL"),
    ],
    unique: &[],
    indexes: &["item_id", "user_id"],
};

const APPLICATION_LOGS: Table = Table {
    name: "application_logs",
    columns: &[
        ("level", "VARCHAR(16) NOT NULL"),
        ("logger_name", "VARCHAR(100) NOT NULL"),
        ("message", "VARCHAR(4096) NOT NULL"),
        ("module", "VARCHAR(100) NULL"),
        ("function_name", "VARCHAR(100) NULL"),
        ("line_number", "BIGINT NULL"),
        ("stack_trace", "VARCHAR(4096) NULL"),
        ("created_at", "VARCHAR(40) NOT NULL"),
    ],
    unique: &[],
    indexes: &["level", "logger_name"],
};

const API_LOGS: Table = Table {
    name: "api_logs",
    columns: &[
        ("method", "VARCHAR(10) NOT NULL"),
        ("endpoint", "VARCHAR(500) NOT NULL"),
        ("status_code", "BIGINT NOT NULL"),
        ("response_time_ms", "BIGINT NULL"),
        ("user_id", "BIGINT NULL"),
        ("ip_address", "VARCHAR(45) NULL"),
        ("user_agent", "VARCHAR(500) NULL"),
        ("request_body", "VARCHAR(4096) NULL"),
        ("response_body", "VARCHAR(4096) NULL"),
        ("created_at", "VARCHAR(40) NOT NULL"),
    ],
    unique: &[],
    indexes: &["method", "status_code", "user_id"],
};

fn tables_for(role: DatabaseRole) -> &'static [Table] {
    match role {
        DatabaseRole::Main => &[ITEMS, USERS],
        DatabaseRole::Analytics => &[USER_ACTIVITIES, ITEM_VIEWS],
        DatabaseRole::Logs => &[APPLICATION_LOGS, API_LOGS],
    }
}

/// Largest text the `VARCHAR(4096)` columns accept.
pub const LONG_TEXT_LIMIT: usize = 4096;

fn render(table: &Table, backend: Backend) -> Vec<String> {
    let mut columns = vec![match backend {
        Backend::MySql => "id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY".to_string(),
        Backend::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
    }];
    columns.extend(
        table
            .columns
            .iter()
            .map(|(name, ty)| format!("{name} {ty}")),
    );
    columns.extend(
        table
            .unique
            .iter()
            .map(|col| format!("CONSTRAINT uq_{}_{col} UNIQUE ({col})", table.name)),
    );

    let mut statements = Vec::new();
    match backend {
        Backend::MySql => {
            columns.extend(
                table
                    .indexes
                    .iter()
                    .map(|col| format!("INDEX ix_{}_{col} ({col})", table.name)),
            );
            statements.push(format!(
                "CREATE TABLE IF NOT EXISTS {} ({}) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
                table.name,
                columns.join(", ")
            ));
        }
        Backend::Sqlite => {
            statements.push(format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                table.name,
                columns.join(", ")
            ));
            statements.extend(table.indexes.iter().map(|col| {
                format!(
                    "CREATE INDEX IF NOT EXISTS ix_{0}_{1} ON {0} ({1})",
                    table.name, col
                )
            }));
        }
    }
    statements
}

pub(crate) async fn bootstrap(
    pool: &AnyPool,
    role: DatabaseRole,
    backend: Backend,
) -> Result<(), sqlx::Error> {
    for table in tables_for(role) {
        for statement in render(table, backend) {
            sqlx::query(&statement).execute(pool).await?;
        }
    }
    info!(%role, "schema bootstrap complete");
    Ok(())
}
