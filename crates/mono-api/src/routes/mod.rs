//! Route handlers grouped by resource, mounted under `/api/v1`.

use std::sync::Arc;

use axum::Router;

use crate::server::AppState;

pub mod admin;
pub mod analytics;
pub mod items;
pub mod logs;
pub mod users;

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(items::router())
        .merge(users::router())
        .merge(admin::router())
        .merge(analytics::router())
        .merge(logs::router())
}
