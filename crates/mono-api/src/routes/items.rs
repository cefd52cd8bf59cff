use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use mono_db::{Item, ItemFilter, ItemPatch, ItemSort, NewItem};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    envelope::Envelope,
    error::{ApiResult, ForRequest},
    extract::{ApiJson, ApiPath, ApiQuery},
    middleware::RequestId,
    models::{double_option, opt_timestamp, page_request, timestamp},
    server::AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ItemCreate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<ItemCreate> for NewItem {
    fn from(body: ItemCreate) -> Self {
        NewItem {
            name: body.name,
            description: body.description,
        }
    }
}

/// Fields left out are unchanged; `"description": null` clears it.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ItemUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
}

impl From<ItemUpdate> for ItemPatch {
    fn from(body: ItemUpdate) -> Self {
        ItemPatch {
            name: body.name,
            description: body.description,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl From<Item> for ItemResponse {
    fn from(item: Item) -> Self {
        Self {
            id: item.id,
            name: item.name,
            description: item.description,
            is_active: item.is_active,
            created_at: timestamp(item.created_at),
            updated_at: opt_timestamp(item.updated_at),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ItemListQuery {
    pub limit: Option<i64>,
    pub after: Option<String>,
    /// Case-insensitive substring of the name.
    pub q: Option<String>,
    /// `id` (default) or `name`.
    pub sort: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/items",
    tag = "items",
    request_body = ItemCreate,
    responses(
        (status = 201, description = "Item created", body = crate::envelope::EnvelopeDoc),
        (status = 422, description = "Invalid item", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn create_item(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiJson(body): ApiJson<ItemCreate>,
) -> ApiResult<(StatusCode, Json<Envelope<ItemResponse>>)> {
    let item = state.items.create(body.into()).await.for_request(&request_id)?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::success(
            ItemResponse::from(item),
            "Item created successfully",
            &request_id,
        )),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/items",
    tag = "items",
    params(ItemListQuery),
    responses(
        (status = 200, description = "One page of active items", body = crate::envelope::EnvelopeDoc),
        (status = 422, description = "Bad limit, sort or cursor", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn list_items(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiQuery(query): ApiQuery<ItemListQuery>,
) -> ApiResult<Json<Envelope<Vec<ItemResponse>>>> {
    let sort = match query.sort.as_deref() {
        Some(raw) => ItemSort::parse(raw).for_request(&request_id)?,
        None => ItemSort::default(),
    };
    let filter = ItemFilter {
        q: query.q.clone(),
        sort,
    };
    let page = state
        .items
        .list(&filter, &page_request(query.limit, &query.after))
        .await
        .for_request(&request_id)?;

    Ok(Json(Envelope::page(
        page,
        ItemResponse::from,
        "Items retrieved successfully",
        &request_id,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/items/{id}",
    tag = "items",
    params(("id" = i64, Path, description = "Item identifier")),
    responses(
        (status = 200, description = "Item details", body = crate::envelope::EnvelopeDoc),
        (status = 404, description = "No active item with this id", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn get_item(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Envelope<ItemResponse>>> {
    let item = state.items.get(id).await.for_request(&request_id)?;
    Ok(Json(Envelope::success(
        ItemResponse::from(item),
        "Item retrieved successfully",
        &request_id,
    )))
}

#[utoipa::path(
    put,
    path = "/api/v1/items/{id}",
    tag = "items",
    params(("id" = i64, Path, description = "Item identifier")),
    request_body = ItemUpdate,
    responses(
        (status = 200, description = "Item updated", body = crate::envelope::EnvelopeDoc),
        (status = 404, description = "No active item with this id", body = crate::envelope::EnvelopeDoc),
        (status = 422, description = "Invalid update", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<ItemUpdate>,
) -> ApiResult<Json<Envelope<ItemResponse>>> {
    let item = state
        .items
        .update(id, body.into())
        .await
        .for_request(&request_id)?;
    Ok(Json(Envelope::success(
        ItemResponse::from(item),
        "Item updated successfully",
        &request_id,
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/items/{id}",
    tag = "items",
    params(("id" = i64, Path, description = "Item identifier")),
    responses(
        (status = 204, description = "Item deactivated"),
        (status = 404, description = "No active item with this id", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn delete_item(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    state.items.delete(id).await.for_request(&request_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .route(
            "/items/:id",
            get(get_item).put(update_item).delete(delete_item),
        )
}
