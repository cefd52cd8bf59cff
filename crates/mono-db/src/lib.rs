//! Mono persistence layer spanning three relational databases.
//!
//! Every logical operation is bound to exactly one database role. The
//! [`ConnectionRegistry`] opens one pool per role at start-up, each pool is
//! wrapped by a [`SessionProvider`] that hands out scoped units of work, and
//! the resource services ([`ItemService`], [`UserService`],
//! [`AnalyticsService`], [`AuditLogService`]) run their statements through
//! those sessions. Lists are paged with the keyset [`CursorPager`].

use std::fmt;

use serde::Serialize;

pub mod analytics;
pub mod audit;
pub mod error;
pub mod items;
pub mod pager;
pub mod password;
pub mod profile;
pub mod registry;
mod schema;
pub mod session;
mod sql;
pub mod users;

pub use analytics::{
    ActivityFilter, AnalyticsService, AnalyticsSummary, ItemView, ItemViewFilter, NewItemView,
    NewUserActivity, PopularItem, UserActivity,
};
pub use audit::{
    ApiLog, ApiLogFilter, ApplicationLog, ApplicationLogFilter, AuditLogService, LogLevel,
    NewApiLog, NewApplicationLog,
};
pub use error::{DbError, FieldViolation, ValidationError};
pub use items::{Item, ItemFilter, ItemPatch, ItemService, ItemSort, NewItem};
pub use pager::{
    Cursor, CursorCodec, CursorPager, CursorValue, EmptyCursorKey, KeysetWindow, Page,
    PageRequest, Pageable, SortDirection, SortKey,
};
pub use password::PasswordHasher;
pub use profile::{Backend, ConnectionProfile, DatabaseSettings, PoolSettings, ProfileError};
pub use registry::ConnectionRegistry;
pub use session::{ScopedSession, SessionProvider, SessionStats};
pub use users::{NewUser, User, UserFilter, UserPatch, UserService};

/// The logical databases the service persists to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseRole {
    /// Items and users.
    Main,
    /// Activity and item-view events.
    Analytics,
    /// Application and API request logs.
    Logs,
}

impl DatabaseRole {
    pub const ALL: [DatabaseRole; 3] = [Self::Main, Self::Analytics, Self::Logs];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Analytics => "analytics",
            Self::Logs => "logs",
        }
    }
}

impl fmt::Display for DatabaseRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
