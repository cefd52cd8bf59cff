use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use mono_db::{
    ActivityFilter, AnalyticsSummary, ItemView, ItemViewFilter, NewItemView, NewUserActivity,
    PopularItem, UserActivity,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    envelope::Envelope,
    error::{ApiResult, ForRequest},
    extract::{ApiJson, ApiQuery},
    middleware::RequestId,
    models::{opt_timestamp, page_request, timestamp},
    server::AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserActivityCreate {
    pub user_id: i64,
    pub action: String,
    #[serde(default)]
    pub page_url: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub session_duration: Option<i64>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

impl From<UserActivityCreate> for NewUserActivity {
    fn from(body: UserActivityCreate) -> Self {
        NewUserActivity {
            user_id: body.user_id,
            action: body.action,
            page_url: body.page_url,
            session_duration: body.session_duration,
            ip_address: body.ip_address,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserActivityResponse {
    pub id: i64,
    pub user_id: i64,
    pub action: String,
    pub page_url: Option<String>,
    pub session_duration: Option<i64>,
    pub ip_address: Option<String>,
    pub created_at: String,
}

impl From<UserActivity> for UserActivityResponse {
    fn from(activity: UserActivity) -> Self {
        Self {
            id: activity.id,
            user_id: activity.user_id,
            action: activity.action,
            page_url: activity.page_url,
            session_duration: activity.session_duration,
            ip_address: activity.ip_address,
            created_at: timestamp(activity.created_at),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ItemViewCreate {
    pub item_id: i64,
    /// Omit for anonymous views.
    #[serde(default)]
    pub user_id: Option<i64>,
}

impl From<ItemViewCreate> for NewItemView {
    fn from(body: ItemViewCreate) -> Self {
        NewItemView {
            item_id: body.item_id,
            user_id: body.user_id,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemViewResponse {
    pub id: i64,
    pub item_id: i64,
    pub user_id: Option<i64>,
    pub view_count: i64,
    pub last_viewed_at: String,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl From<ItemView> for ItemViewResponse {
    fn from(view: ItemView) -> Self {
        Self {
            id: view.id,
            item_id: view.item_id,
            user_id: view.user_id,
            view_count: view.view_count,
            last_viewed_at: timestamp(view.last_viewed_at),
            created_at: timestamp(view.created_at),
            updated_at: opt_timestamp(view.updated_at),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PopularItemResponse {
    pub item_id: i64,
    pub total_views: i64,
    pub unique_views: i64,
}

impl From<PopularItem> for PopularItemResponse {
    fn from(item: PopularItem) -> Self {
        Self {
            item_id: item.item_id,
            total_views: item.total_views,
            unique_views: item.unique_views,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyticsSummaryResponse {
    pub total_user_activities: i64,
    pub total_item_views: i64,
    pub top_popular_items: Vec<PopularItemResponse>,
}

impl From<AnalyticsSummary> for AnalyticsSummaryResponse {
    fn from(summary: AnalyticsSummary) -> Self {
        Self {
            total_user_activities: summary.total_user_activities,
            total_item_views: summary.total_item_views,
            top_popular_items: summary
                .top_popular_items
                .into_iter()
                .map(PopularItemResponse::from)
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActivityListQuery {
    pub limit: Option<i64>,
    pub after: Option<String>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ItemViewListQuery {
    pub limit: Option<i64>,
    pub after: Option<String>,
    pub item_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PopularItemsQuery {
    /// Number of items, 1 to 100 (default 10).
    pub limit: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/api/v1/analytics/user-activity",
    tag = "analytics",
    request_body = UserActivityCreate,
    responses(
        (status = 201, description = "Activity recorded", body = crate::envelope::EnvelopeDoc),
        (status = 422, description = "Invalid activity", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn log_user_activity(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiJson(body): ApiJson<UserActivityCreate>,
) -> ApiResult<(StatusCode, Json<Envelope<UserActivityResponse>>)> {
    let activity = state
        .analytics
        .log_user_activity(body.into())
        .await
        .for_request(&request_id)?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::success(
            UserActivityResponse::from(activity),
            "User activity logged successfully",
            &request_id,
        )),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/analytics/item-view",
    tag = "analytics",
    request_body = ItemViewCreate,
    responses(
        (status = 200, description = "View counter after this view", body = crate::envelope::EnvelopeDoc),
        (status = 422, description = "Invalid view", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn log_item_view(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiJson(body): ApiJson<ItemViewCreate>,
) -> ApiResult<Json<Envelope<ItemViewResponse>>> {
    let view = state
        .analytics
        .log_item_view(body.into())
        .await
        .for_request(&request_id)?;
    Ok(Json(Envelope::success(
        ItemViewResponse::from(view),
        "Item view logged successfully",
        &request_id,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/analytics/user-activities",
    tag = "analytics",
    params(ActivityListQuery),
    responses(
        (status = 200, description = "Activities, newest first", body = crate::envelope::EnvelopeDoc),
        (status = 422, description = "Bad limit or cursor", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn list_user_activities(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiQuery(query): ApiQuery<ActivityListQuery>,
) -> ApiResult<Json<Envelope<Vec<UserActivityResponse>>>> {
    let filter = ActivityFilter {
        user_id: query.user_id,
    };
    let page = state
        .analytics
        .list_user_activities(filter, &page_request(query.limit, &query.after))
        .await
        .for_request(&request_id)?;
    Ok(Json(Envelope::page(
        page,
        UserActivityResponse::from,
        "User activities retrieved successfully",
        &request_id,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/analytics/item-views",
    tag = "analytics",
    params(ItemViewListQuery),
    responses(
        (status = 200, description = "View counters, most recently viewed first", body = crate::envelope::EnvelopeDoc),
        (status = 422, description = "Bad limit or cursor", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn list_item_views(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiQuery(query): ApiQuery<ItemViewListQuery>,
) -> ApiResult<Json<Envelope<Vec<ItemViewResponse>>>> {
    let filter = ItemViewFilter {
        item_id: query.item_id,
    };
    let page = state
        .analytics
        .list_item_views(filter, &page_request(query.limit, &query.after))
        .await
        .for_request(&request_id)?;
    Ok(Json(Envelope::page(
        page,
        ItemViewResponse::from,
        "Item views retrieved successfully",
        &request_id,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/analytics/popular-items",
    tag = "analytics",
    params(PopularItemsQuery),
    responses(
        (status = 200, description = "Items by total views", body = crate::envelope::EnvelopeDoc),
        (status = 422, description = "Bad limit", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn popular_items(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiQuery(query): ApiQuery<PopularItemsQuery>,
) -> ApiResult<Json<Envelope<Vec<PopularItemResponse>>>> {
    let items = state
        .analytics
        .popular_items(query.limit)
        .await
        .for_request(&request_id)?;
    Ok(Json(Envelope::success(
        items.into_iter().map(PopularItemResponse::from).collect(),
        "Popular items retrieved successfully",
        &request_id,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/analytics/stats/summary",
    tag = "analytics",
    responses(
        (status = 200, description = "Totals and top items", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn summary(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
) -> ApiResult<Json<Envelope<AnalyticsSummaryResponse>>> {
    let summary = state.analytics.summary().await.for_request(&request_id)?;
    Ok(Json(Envelope::success(
        AnalyticsSummaryResponse::from(summary),
        "Analytics summary retrieved successfully",
        &request_id,
    )))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analytics/user-activity", post(log_user_activity))
        .route("/analytics/item-view", post(log_item_view))
        .route("/analytics/user-activities", get(list_user_activities))
        .route("/analytics/item-views", get(list_item_views))
        .route("/analytics/popular-items", get(popular_items))
        .route("/analytics/stats/summary", get(summary))
}
