use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{HeaderValue, Method, StatusCode, Uri},
    routing::get,
    Json, Router,
};
use mono_db::{
    AnalyticsService, AuditLogService, ConnectionRegistry, CursorCodec, CursorPager, DatabaseRole,
    ItemService, UserService,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{
    config::AppConfig,
    envelope::{Envelope, ErrorCode, ErrorDetail},
    error::{ApiError, ApiResult},
    middleware::{RequestContextLayer, RequestId},
    models::{DatabaseHealth, HealthReport, ServiceInfo},
    routes,
};

const SERVICE_NAME: &str = "Mono API";
const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn run() -> Result<()> {
    let config = AppConfig::from_env()?;

    let registry = ConnectionRegistry::connect(&config.databases)
        .await
        .context("failed to open databases")?;
    if config.bootstrap_schema {
        registry
            .bootstrap_schema()
            .await
            .context("failed to bootstrap schema")?;
    }

    let codec = CursorCodec::new(config.secret_key.as_bytes()).context("invalid SECRET_KEY")?;
    let pager = CursorPager::new(codec).with_max_limit(config.pagination_max_limit);
    let state = Arc::new(AppState::new(
        registry.clone(),
        pager,
        config.log_api_requests,
    ));

    let app = build_router(state)
        .layer(cors_layer(&config.cors_origins)?)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context("failed to bind listen socket")?;

    info!(addr = %config.listen_addr, "mono-api listening");
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server exited");

    registry.close().await;
    info!("database pools closed");
    served
}

/// Services wired to the database each of them owns.
#[derive(Clone)]
pub struct AppState {
    pub registry: ConnectionRegistry,
    pub items: ItemService,
    pub users: UserService,
    pub analytics: AnalyticsService,
    pub audit: AuditLogService,
    pub log_api_requests: bool,
}

impl AppState {
    pub fn new(registry: ConnectionRegistry, pager: CursorPager, log_api_requests: bool) -> Self {
        let audit = AuditLogService::new(registry.logs().clone(), pager.clone());
        let items = ItemService::new(registry.main().clone(), pager.clone(), audit.clone());
        let users = UserService::new(registry.main().clone(), pager.clone(), audit.clone());
        let analytics = AnalyticsService::new(registry.analytics().clone(), pager, audit.clone());
        Self {
            registry,
            items,
            users,
            analytics,
            audit,
            log_api_requests,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let mut context = RequestContextLayer::new();
    if state.log_api_requests {
        context = context.with_api_log(state.audit.clone());
    }

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/openapi.json", get(openapi_json))
        .nest("/api/v1", routes::api_router())
        .fallback(route_not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
        .layer(context)
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .with_context(|| format!("invalid CORS origin {origin:?}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[utoipa::path(
    get,
    path = "/",
    tag = "service",
    responses(
        (status = 200, description = "Service banner", body = crate::envelope::EnvelopeDoc)
    )
)]
async fn root(request_id: RequestId) -> Json<Envelope<ServiceInfo>> {
    let info = ServiceInfo {
        name: SERVICE_NAME.to_string(),
        version: SERVICE_VERSION.to_string(),
        docs: "/openapi.json".to_string(),
        databases: DatabaseRole::ALL
            .iter()
            .map(|role| role.as_str().to_string())
            .collect(),
    };
    Json(Envelope::success(
        info,
        "API is running successfully",
        &request_id,
    ))
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "service",
    responses(
        (status = 200, description = "Every database answered", body = crate::envelope::EnvelopeDoc),
        (status = 500, description = "At least one database is unreachable", body = crate::envelope::EnvelopeDoc)
    )
)]
async fn health(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
) -> ApiResult<Json<Envelope<HealthReport>>> {
    let mut databases = Vec::with_capacity(DatabaseRole::ALL.len());
    let mut failures = Vec::new();
    for (role, result) in state.registry.health().await {
        let stats = state.registry.provider(role).stats();
        if let Err(err) = &result {
            error!(request_id = %request_id, role = %role, error = %err, "database health check failed");
            failures.push(ErrorDetail::new(
                ErrorCode::InternalError,
                Some(role.as_str().to_string()),
                format!("{role} database is unreachable"),
            ));
        }
        databases.push(DatabaseHealth {
            role: role.as_str().to_string(),
            healthy: result.is_ok(),
            in_flight_sessions: stats.in_flight(),
        });
    }

    if !failures.is_empty() {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError,
            "Health check failed",
        )
        .with_details(failures)
        .with_request_id(&request_id));
    }

    Ok(Json(Envelope::success(
        HealthReport {
            status: "healthy".to_string(),
            version: SERVICE_VERSION.to_string(),
            databases,
        },
        "Health check passed",
        &request_id,
    )))
}

async fn route_not_found(request_id: RequestId, uri: Uri) -> ApiError {
    ApiError::not_found(format!("No route for {}", uri.path())).with_request_id(&request_id)
}

async fn method_not_allowed(request_id: RequestId, method: Method, uri: Uri) -> ApiError {
    ApiError::new(
        StatusCode::METHOD_NOT_ALLOWED,
        ErrorCode::BadRequest,
        format!("Method {method} is not allowed on {}", uri.path()),
    )
    .with_request_id(&request_id)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    use utoipa::OpenApi;
    Json(docs::ApiDoc::openapi())
}

pub mod docs {
    use super::*;
    use crate::envelope::{EnvelopeDoc, PageMeta, ResponseStatus};
    use crate::routes::{admin, analytics, items, logs, users};
    use utoipa::OpenApi;

    #[derive(OpenApi)]
    #[openapi(
        info(title = "Mono API", version = "0.1.0"),
        paths(
            root,
            health,
            items::create_item,
            items::list_items,
            items::get_item,
            items::update_item,
            items::delete_item,
            users::create_user,
            users::list_users,
            users::get_user,
            users::update_user,
            users::delete_user,
            admin::list_all_users,
            admin::get_any_user,
            admin::activate_user,
            admin::deactivate_user,
            admin::grant_superuser,
            admin::revoke_superuser,
            analytics::log_user_activity,
            analytics::log_item_view,
            analytics::list_user_activities,
            analytics::list_item_views,
            analytics::popular_items,
            analytics::summary,
            logs::record_application_log,
            logs::list_application_logs,
            logs::list_api_logs,
            logs::list_error_logs,
            logs::list_slow_requests
        ),
        components(
            schemas(
                EnvelopeDoc,
                PageMeta,
                ErrorCode,
                ErrorDetail,
                ResponseStatus,
                ServiceInfo,
                DatabaseHealth,
                HealthReport,
                items::ItemCreate,
                items::ItemUpdate,
                items::ItemResponse,
                users::UserCreate,
                users::UserUpdate,
                users::UserResponse,
                analytics::UserActivityCreate,
                analytics::UserActivityResponse,
                analytics::ItemViewCreate,
                analytics::ItemViewResponse,
                analytics::PopularItemResponse,
                analytics::AnalyticsSummaryResponse,
                logs::ApplicationLogCreate,
                logs::ApplicationLogResponse,
                logs::ApiLogResponse
            )
        ),
        tags(
            (name = "service", description = "Banner and health"),
            (name = "items", description = "Item catalogue"),
            (name = "users", description = "User accounts"),
            (name = "admin", description = "User administration"),
            (name = "analytics", description = "Activity and item-view events"),
            (name = "logs", description = "Application and API request logs")
        )
    )]
    pub struct ApiDoc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, Response, StatusCode};
    use mono_db::{
        ApiLogFilter, ConnectionProfile, DatabaseSettings, PageRequest, PasswordHasher,
    };
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::Service;
    use utoipa::OpenApi;

    use crate::middleware::{PROCESSING_TIME_HEADER, REQUEST_ID_HEADER};

    async fn setup_test_app(log_api_requests: bool) -> (Arc<AppState>, Router, TempDir) {
        let temp = TempDir::new().expect("tempdir");
        let profile = |role: DatabaseRole| {
            let path = temp.path().join(format!("{role}.sqlite"));
            ConnectionProfile::from_dsn(role, format!("sqlite://{}?mode=rwc", path.display()))
        };
        let settings = DatabaseSettings {
            main: profile(DatabaseRole::Main),
            analytics: profile(DatabaseRole::Analytics),
            logs: profile(DatabaseRole::Logs),
        };
        let registry = ConnectionRegistry::connect(&settings).await.expect("registry");
        registry.bootstrap_schema().await.expect("schema");

        let codec = CursorCodec::new(b"router-test-secret").expect("codec");
        let mut state = AppState::new(registry, CursorPager::new(codec), log_api_requests);
        state.users = state
            .users
            .clone()
            .with_password_hasher(PasswordHasher::with_iterations(1_000));
        let state = Arc::new(state);
        let router = build_router(state.clone());
        (state, router, temp)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .expect("request")
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    async fn body_json(response: Response<Body>) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    async fn create_item(router: &mut Router, name: &str) -> Value {
        let response = router
            .call(json_request("POST", "/api/v1/items", json!({ "name": name })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["data"].clone()
    }

    async fn create_user(router: &mut Router, email: &str, username: &str) -> Response<Body> {
        router
            .call(json_request(
                "POST",
                "/api/v1/users",
                json!({
                    "email": email,
                    "username": username,
                    "full_name": "Test User",
                    "password": "correct-horse"
                }),
            ))
            .await
            .expect("response")
    }

    #[tokio::test]
    async fn root_returns_banner_with_request_headers() {
        let (_state, mut router, _tmp) = setup_test_app(false).await;
        let response = router.call(empty_request("GET", "/")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let header_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .expect("request id header")
            .to_string();
        let processing = response
            .headers()
            .get(PROCESSING_TIME_HEADER)
            .and_then(|value| value.to_str().ok())
            .expect("processing time header")
            .to_string();
        assert!(processing.ends_with("ms"));

        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "API is running successfully");
        assert_eq!(body["request_id"], header_id.as_str());
        assert_eq!(body["data"]["name"], SERVICE_NAME);
        assert_eq!(
            body["data"]["databases"],
            json!(["main", "analytics", "logs"])
        );
        assert!(body.get("error_code").is_none());
    }

    #[tokio::test]
    async fn health_reports_every_database() {
        let (_state, mut router, _tmp) = setup_test_app(false).await;
        let response = router
            .call(empty_request("GET", "/health"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["status"], "healthy");
        let databases = body["data"]["databases"].as_array().expect("databases");
        assert_eq!(databases.len(), 3);
        assert!(databases.iter().all(|db| db["healthy"] == true));
    }

    #[tokio::test]
    async fn health_fails_when_a_pool_is_closed() {
        let (state, mut router, _tmp) = setup_test_app(false).await;
        state.registry.analytics().close().await;

        let response = router
            .call(empty_request("GET", "/health"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["error_code"], "INTERNAL_ERROR");
        assert_eq!(body["details"][0]["field"], "analytics");
    }

    #[tokio::test]
    async fn item_lifecycle_over_http() {
        let (_state, mut router, _tmp) = setup_test_app(false).await;
        let item = create_item(&mut router, "Widget").await;
        let id = item["id"].as_i64().expect("item id");
        assert_eq!(item["is_active"], true);

        let response = router
            .call(empty_request("GET", &format!("/api/v1/items/{id}")))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["name"], "Widget");

        let response = router
            .call(json_request(
                "PUT",
                &format!("/api/v1/items/{id}"),
                json!({ "description": "Blue" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["name"], "Widget");
        assert_eq!(body["data"]["description"], "Blue");

        let response = router
            .call(empty_request("DELETE", &format!("/api/v1/items/{id}")))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        assert!(bytes.is_empty());

        let response = router
            .call(empty_request("GET", &format!("/api/v1/items/{id}")))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["error_code"], "NOT_FOUND");
        assert!(body.get("data").is_none());
    }

    #[tokio::test]
    async fn item_list_pages_with_cursor() {
        let (_state, mut router, _tmp) = setup_test_app(false).await;
        for name in ["alpha", "beta", "gamma"] {
            create_item(&mut router, name).await;
        }

        let response = router
            .call(empty_request("GET", "/api/v1/items?limit=2"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let first = body_json(response).await;
        assert_eq!(first["data"].as_array().expect("items").len(), 2);
        assert_eq!(first["meta"]["has_more"], true);
        assert_eq!(first["meta"]["limit"], 2);
        let cursor = first["meta"]["next_cursor"]
            .as_str()
            .expect("next cursor")
            .to_string();

        let response = router
            .call(empty_request(
                "GET",
                &format!("/api/v1/items?limit=2&after={cursor}"),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let second = body_json(response).await;
        let items = second["data"].as_array().expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["name"], "gamma");
        assert_eq!(second["meta"]["has_more"], false);
        assert!(second["meta"]["next_cursor"].is_null());
    }

    #[tokio::test]
    async fn invalid_input_maps_to_validation_error() {
        let (_state, mut router, _tmp) = setup_test_app(false).await;

        let response = router
            .call(json_request("POST", "/api/v1/items", json!({ "name": "" })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error_code"], "VALIDATION_ERROR");
        assert_eq!(body["details"][0]["field"], "name");

        for uri in [
            "/api/v1/items?limit=0",
            "/api/v1/items?after=not-a-cursor",
            "/api/v1/items?sort=price",
            "/api/v1/items/abc",
        ] {
            let response = router
                .call(empty_request("GET", uri))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY, "{uri}");
            let body = body_json(response).await;
            assert_eq!(body["error_code"], "VALIDATION_ERROR", "{uri}");
        }
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let (_state, mut router, _tmp) = setup_test_app(false).await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/items")
            .header("content-type", "application/json")
            .body(Body::from("{\"name\": "))
            .expect("request");
        let response = router.call(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error_code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn duplicate_user_is_a_conflict() {
        let (_state, mut router, _tmp) = setup_test_app(false).await;
        let response = create_user(&mut router, "ada@example.com", "ada").await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["data"]["email"], "ada@example.com");
        assert!(body["data"].get("password").is_none());
        assert!(body["data"].get("hashed_password").is_none());

        let response = create_user(&mut router, "ada@example.com", "ada2").await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error_code"], "CONFLICT");
        assert_eq!(body["details"][0]["field"], "email");
    }

    #[tokio::test]
    async fn admin_sees_and_restores_deactivated_users() {
        let (_state, mut router, _tmp) = setup_test_app(false).await;
        let response = create_user(&mut router, "grace@example.com", "grace").await;
        let id = body_json(response).await["data"]["id"]
            .as_i64()
            .expect("user id");

        let response = router
            .call(empty_request("DELETE", &format!("/api/v1/users/{id}")))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = router
            .call(empty_request("GET", &format!("/api/v1/users/{id}")))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router
            .call(empty_request("GET", &format!("/api/v1/admin/users/{id}")))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["is_active"], false);

        let response = router
            .call(empty_request("GET", "/api/v1/admin/users"))
            .await
            .expect("response");
        let body = body_json(response).await;
        assert_eq!(body["data"].as_array().expect("users").len(), 1);

        let response = router
            .call(empty_request(
                "POST",
                &format!("/api/v1/admin/users/{id}/activate"),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["is_active"], true);

        let response = router
            .call(empty_request(
                "POST",
                &format!("/api/v1/admin/users/{id}/make-admin"),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["is_superuser"], true);
    }

    #[tokio::test]
    async fn item_views_accumulate() {
        let (_state, mut router, _tmp) = setup_test_app(false).await;
        for _ in 0..2 {
            let response = router
                .call(json_request(
                    "POST",
                    "/api/v1/analytics/item-view",
                    json!({ "item_id": 7, "user_id": 3 }),
                ))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = router
            .call(json_request(
                "POST",
                "/api/v1/analytics/item-view",
                json!({ "item_id": 7 }),
            ))
            .await
            .expect("response");
        assert_eq!(body_json(response).await["data"]["view_count"], 1);

        let response = router
            .call(empty_request("GET", "/api/v1/analytics/popular-items"))
            .await
            .expect("response");
        let body = body_json(response).await;
        assert_eq!(body["data"][0]["item_id"], 7);
        assert_eq!(body["data"][0]["total_views"], 3);
        assert_eq!(body["data"][0]["unique_views"], 2);

        let response = router
            .call(json_request(
                "POST",
                "/api/v1/analytics/user-activity",
                json!({ "user_id": 3, "action": "login" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = router
            .call(empty_request("GET", "/api/v1/analytics/stats/summary"))
            .await
            .expect("response");
        let body = body_json(response).await;
        assert_eq!(body["data"]["total_user_activities"], 1);
        assert_eq!(body["data"]["total_item_views"], 3);
    }

    #[tokio::test]
    async fn application_logs_are_recorded_and_filtered() {
        let (_state, mut router, _tmp) = setup_test_app(false).await;
        let response = router
            .call(json_request(
                "POST",
                "/api/v1/logs/application",
                json!({
                    "level": "ERROR",
                    "logger_name": "worker",
                    "message": "job failed"
                }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = router
            .call(empty_request("GET", "/api/v1/logs/errors"))
            .await
            .expect("response");
        let body = body_json(response).await;
        let entries = body["data"].as_array().expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["message"], "job failed");
        assert_eq!(entries[0]["level"], "ERROR");

        let response = router
            .call(json_request(
                "POST",
                "/api/v1/logs/application",
                json!({ "level": "LOUD", "logger_name": "worker", "message": "?" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn api_requests_are_logged_when_enabled() {
        let (state, mut router, _tmp) = setup_test_app(true).await;
        let response = router
            .call(empty_request("GET", "/api/v1/items"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let filter = ApiLogFilter::default();
        let mut logged = Vec::new();
        for _ in 0..50 {
            logged = state
                .audit
                .list_api_logs(&filter, &PageRequest::first(10))
                .await
                .expect("api logs")
                .items;
            if !logged.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].method, "GET");
        assert_eq!(logged[0].endpoint, "/api/v1/items");
        assert_eq!(logged[0].status_code, 200);
    }

    #[tokio::test]
    async fn unknown_routes_and_methods_get_error_envelopes() {
        let (_state, mut router, _tmp) = setup_test_app(false).await;

        let response = router
            .call(empty_request("GET", "/api/v1/nope"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let header_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .expect("request id header")
            .to_string();
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["error_code"], "NOT_FOUND");
        assert_eq!(body["request_id"], header_id.as_str());
        assert!(body["message"].as_str().unwrap().contains("/api/v1/nope"));

        let response = router
            .call(empty_request("PATCH", "/api/v1/items"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["error_code"], "BAD_REQUEST");
        assert!(body["request_id"].as_str().is_some_and(|id| !id.is_empty()));

        let response = router
            .call(empty_request("DELETE", "/health"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_json(response).await["error_code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let (_state, mut router, _tmp) = setup_test_app(false).await;
        let response = router
            .call(empty_request("GET", "/openapi.json"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["info"]["title"], "Mono API");
    }

    #[test]
    fn openapi_lists_every_resource() {
        let doc = docs::ApiDoc::openapi();
        for path in [
            "/",
            "/health",
            "/api/v1/items/{id}",
            "/api/v1/users",
            "/api/v1/admin/users/{id}/deactivate",
            "/api/v1/analytics/stats/summary",
            "/api/v1/logs/slow-requests",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let yaml = doc.to_yaml().expect("yaml");
        assert!(yaml.contains("EnvelopeDoc"));
    }
}
