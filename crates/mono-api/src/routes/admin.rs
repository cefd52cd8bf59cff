//! User administration. Reads here also see deactivated accounts.

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use mono_db::UserFilter;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    envelope::Envelope,
    error::{ApiResult, ForRequest},
    extract::{ApiPath, ApiQuery},
    middleware::RequestId,
    models::page_request,
    routes::users::UserResponse,
    server::AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AdminUserListQuery {
    pub limit: Option<i64>,
    pub after: Option<String>,
    /// Defaults to `true`.
    pub include_inactive: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    tag = "admin",
    params(AdminUserListQuery),
    responses(
        (status = 200, description = "One page of users", body = crate::envelope::EnvelopeDoc),
        (status = 422, description = "Bad limit or cursor", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn list_all_users(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiQuery(query): ApiQuery<AdminUserListQuery>,
) -> ApiResult<Json<Envelope<Vec<UserResponse>>>> {
    let filter = UserFilter {
        include_inactive: query.include_inactive.unwrap_or(true),
    };
    let page = state
        .users
        .list(filter, &page_request(query.limit, &query.after))
        .await
        .for_request(&request_id)?;
    Ok(Json(Envelope::page(
        page,
        UserResponse::from,
        "Users retrieved successfully",
        &request_id,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/users/{id}",
    tag = "admin",
    params(("id" = i64, Path, description = "User identifier")),
    responses(
        (status = 200, description = "User details, active or not", body = crate::envelope::EnvelopeDoc),
        (status = 404, description = "Unknown user", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn get_any_user(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<UserResponse>>> {
    let user = state.users.find_any(id).await.for_request(&request_id)?;
    Ok(Json(Envelope::success(
        UserResponse::from(user),
        "User retrieved successfully",
        &request_id,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users/{id}/activate",
    tag = "admin",
    params(("id" = i64, Path, description = "User identifier")),
    responses(
        (status = 200, description = "User activated", body = crate::envelope::EnvelopeDoc),
        (status = 404, description = "Unknown user", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn activate_user(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<UserResponse>>> {
    let user = state
        .users
        .set_active(id, true)
        .await
        .for_request(&request_id)?;
    Ok(Json(Envelope::success(
        UserResponse::from(user),
        "User activated successfully",
        &request_id,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users/{id}/deactivate",
    tag = "admin",
    params(("id" = i64, Path, description = "User identifier")),
    responses(
        (status = 200, description = "User deactivated", body = crate::envelope::EnvelopeDoc),
        (status = 404, description = "Unknown user", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<UserResponse>>> {
    let user = state
        .users
        .set_active(id, false)
        .await
        .for_request(&request_id)?;
    Ok(Json(Envelope::success(
        UserResponse::from(user),
        "User deactivated successfully",
        &request_id,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users/{id}/make-admin",
    tag = "admin",
    params(("id" = i64, Path, description = "User identifier")),
    responses(
        (status = 200, description = "Superuser granted", body = crate::envelope::EnvelopeDoc),
        (status = 404, description = "Unknown user", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn grant_superuser(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<UserResponse>>> {
    let user = state
        .users
        .set_superuser(id, true)
        .await
        .for_request(&request_id)?;
    Ok(Json(Envelope::success(
        UserResponse::from(user),
        "User granted admin privileges",
        &request_id,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users/{id}/remove-admin",
    tag = "admin",
    params(("id" = i64, Path, description = "User identifier")),
    responses(
        (status = 200, description = "Superuser revoked", body = crate::envelope::EnvelopeDoc),
        (status = 404, description = "Unknown user", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn revoke_superuser(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<UserResponse>>> {
    let user = state
        .users
        .set_superuser(id, false)
        .await
        .for_request(&request_id)?;
    Ok(Json(Envelope::success(
        UserResponse::from(user),
        "User admin privileges removed",
        &request_id,
    )))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/users", get(list_all_users))
        .route("/admin/users/:id", get(get_any_user))
        .route("/admin/users/:id/activate", post(activate_user))
        .route("/admin/users/:id/deactivate", post(deactivate_user))
        .route("/admin/users/:id/make-admin", post(grant_superuser))
        .route("/admin/users/:id/remove-admin", post(revoke_superuser))
}
