use std::{fmt, sync::Arc};

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use mono_db::{NewUser, User, UserFilter, UserPatch};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    envelope::Envelope,
    error::{ApiResult, ForRequest},
    extract::{ApiJson, ApiPath, ApiQuery},
    middleware::RequestId,
    models::{double_option, opt_timestamp, timestamp, PageQuery},
    server::AppState,
};

#[derive(Deserialize, ToSchema)]
pub struct UserCreate {
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub password: String,
}

impl fmt::Debug for UserCreate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCreate")
            .field("email", &self.email)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl From<UserCreate> for NewUser {
    fn from(body: UserCreate) -> Self {
        NewUser {
            email: body.email,
            username: body.username,
            full_name: body.full_name,
            password: body.password,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct UserUpdate {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub full_name: Option<Option<String>>,
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for UserUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserUpdate")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl From<UserUpdate> for UserPatch {
    fn from(body: UserUpdate) -> Self {
        UserPatch {
            email: body.email,
            username: body.username,
            full_name: body.full_name,
            password: body.password,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            full_name: user.full_name,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            created_at: timestamp(user.created_at),
            updated_at: opt_timestamp(user.updated_at),
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "users",
    request_body = UserCreate,
    responses(
        (status = 201, description = "User registered", body = crate::envelope::EnvelopeDoc),
        (status = 409, description = "Email or username already taken", body = crate::envelope::EnvelopeDoc),
        (status = 422, description = "Invalid user", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiJson(body): ApiJson<UserCreate>,
) -> ApiResult<(StatusCode, Json<Envelope<UserResponse>>)> {
    let user = state.users.create(body.into()).await.for_request(&request_id)?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::success(
            UserResponse::from(user),
            "User created successfully",
            &request_id,
        )),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "users",
    params(PageQuery),
    responses(
        (status = 200, description = "One page of active users", body = crate::envelope::EnvelopeDoc),
        (status = 422, description = "Bad limit or cursor", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<Envelope<Vec<UserResponse>>>> {
    let page = state
        .users
        .list(UserFilter::default(), &query.page())
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
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "User identifier")),
    responses(
        (status = 200, description = "User details", body = crate::envelope::EnvelopeDoc),
        (status = 404, description = "No active user with this id", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<UserResponse>>> {
    let user = state.users.get(id).await.for_request(&request_id)?;
    Ok(Json(Envelope::success(
        UserResponse::from(user),
        "User retrieved successfully",
        &request_id,
    )))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "User identifier")),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "User updated", body = crate::envelope::EnvelopeDoc),
        (status = 404, description = "No active user with this id", body = crate::envelope::EnvelopeDoc),
        (status = 409, description = "Email or username already taken", body = crate::envelope::EnvelopeDoc),
        (status = 422, description = "Invalid update", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UserUpdate>,
) -> ApiResult<Json<Envelope<UserResponse>>> {
    let user = state
        .users
        .update(id, body.into())
        .await
        .for_request(&request_id)?;
    Ok(Json(Envelope::success(
        UserResponse::from(user),
        "User updated successfully",
        &request_id,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "User identifier")),
    responses(
        (status = 204, description = "User deactivated"),
        (status = 404, description = "No active user with this id", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    state.users.delete(id).await.for_request(&request_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}
