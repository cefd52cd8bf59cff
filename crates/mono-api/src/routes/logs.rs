use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use mono_db::{
    ApiLog, ApiLogFilter, ApplicationLog, ApplicationLogFilter, LogLevel, NewApplicationLog,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    envelope::Envelope,
    error::{ApiResult, ForRequest},
    extract::{ApiJson, ApiQuery},
    middleware::RequestId,
    models::{page_request, timestamp, PageQuery},
    server::AppState,
};

const DEFAULT_SLOW_THRESHOLD_MS: i64 = 1000;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApplicationLogCreate {
    /// DEBUG, INFO, WARNING, ERROR or CRITICAL.
    pub level: String,
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

#[derive(Debug, Serialize, ToSchema)]
pub struct ApplicationLogResponse {
    pub id: i64,
    pub level: String,
    pub logger_name: String,
    pub message: String,
    pub module: Option<String>,
    pub function: Option<String>,
    pub line_number: Option<i64>,
    pub stack_trace: Option<String>,
    pub created_at: String,
}

impl From<ApplicationLog> for ApplicationLogResponse {
    fn from(log: ApplicationLog) -> Self {
        Self {
            id: log.id,
            level: log.level.to_string(),
            logger_name: log.logger_name,
            message: log.message,
            module: log.module,
            function: log.function,
            line_number: log.line_number,
            stack_trace: log.stack_trace,
            created_at: timestamp(log.created_at),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiLogResponse {
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
    pub created_at: String,
}

impl From<ApiLog> for ApiLogResponse {
    fn from(log: ApiLog) -> Self {
        Self {
            id: log.id,
            method: log.method,
            endpoint: log.endpoint,
            status_code: log.status_code,
            response_time_ms: log.response_time_ms,
            user_id: log.user_id,
            ip_address: log.ip_address,
            user_agent: log.user_agent,
            request_body: log.request_body,
            response_body: log.response_body,
            created_at: timestamp(log.created_at),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ApplicationLogQuery {
    pub limit: Option<i64>,
    pub after: Option<String>,
    pub level: Option<String>,
    pub logger_name: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ApiLogQuery {
    pub limit: Option<i64>,
    pub after: Option<String>,
    pub method: Option<String>,
    pub status_code: Option<i64>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SlowRequestQuery {
    pub limit: Option<i64>,
    pub after: Option<String>,
    /// Milliseconds (default 1000).
    pub threshold_ms: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/api/v1/logs/application",
    tag = "logs",
    request_body = ApplicationLogCreate,
    responses(
        (status = 201, description = "Entry recorded", body = crate::envelope::EnvelopeDoc),
        (status = 422, description = "Invalid entry", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn record_application_log(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiJson(body): ApiJson<ApplicationLogCreate>,
) -> ApiResult<(StatusCode, Json<Envelope<ApplicationLogResponse>>)> {
    let level: LogLevel = body.level.parse().for_request(&request_id)?;
    let entry = NewApplicationLog {
        level,
        logger_name: body.logger_name,
        message: body.message,
        module: body.module,
        function: body.function,
        line_number: body.line_number,
        stack_trace: body.stack_trace,
    };
    let log = state
        .audit
        .record_application(entry)
        .await
        .for_request(&request_id)?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::success(
            ApplicationLogResponse::from(log),
            "Log entry recorded successfully",
            &request_id,
        )),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/logs/application",
    tag = "logs",
    params(ApplicationLogQuery),
    responses(
        (status = 200, description = "Application log, newest first", body = crate::envelope::EnvelopeDoc),
        (status = 422, description = "Bad filter, limit or cursor", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn list_application_logs(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiQuery(query): ApiQuery<ApplicationLogQuery>,
) -> ApiResult<Json<Envelope<Vec<ApplicationLogResponse>>>> {
    let level = query
        .level
        .as_deref()
        .map(str::parse::<LogLevel>)
        .transpose()
        .for_request(&request_id)?;
    let filter = ApplicationLogFilter {
        level,
        logger_name: query.logger_name.clone(),
    };
    let page = state
        .audit
        .list_application_logs(&filter, &page_request(query.limit, &query.after))
        .await
        .for_request(&request_id)?;
    Ok(Json(Envelope::page(
        page,
        ApplicationLogResponse::from,
        "Application logs retrieved successfully",
        &request_id,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/logs/api",
    tag = "logs",
    params(ApiLogQuery),
    responses(
        (status = 200, description = "API request log, newest first", body = crate::envelope::EnvelopeDoc),
        (status = 422, description = "Bad limit or cursor", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn list_api_logs(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiQuery(query): ApiQuery<ApiLogQuery>,
) -> ApiResult<Json<Envelope<Vec<ApiLogResponse>>>> {
    let filter = ApiLogFilter {
        method: query.method.clone(),
        status_code: query.status_code,
        user_id: query.user_id,
    };
    let page = state
        .audit
        .list_api_logs(&filter, &page_request(query.limit, &query.after))
        .await
        .for_request(&request_id)?;
    Ok(Json(Envelope::page(
        page,
        ApiLogResponse::from,
        "API logs retrieved successfully",
        &request_id,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/logs/errors",
    tag = "logs",
    params(PageQuery),
    responses(
        (status = 200, description = "ERROR and CRITICAL entries, newest first", body = crate::envelope::EnvelopeDoc),
        (status = 422, description = "Bad limit or cursor", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn list_error_logs(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<Envelope<Vec<ApplicationLogResponse>>>> {
    let page = state
        .audit
        .error_logs(&query.page())
        .await
        .for_request(&request_id)?;
    Ok(Json(Envelope::page(
        page,
        ApplicationLogResponse::from,
        "Error logs retrieved successfully",
        &request_id,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/logs/slow-requests",
    tag = "logs",
    params(SlowRequestQuery),
    responses(
        (status = 200, description = "Requests above the threshold, slowest first", body = crate::envelope::EnvelopeDoc),
        (status = 422, description = "Bad threshold, limit or cursor", body = crate::envelope::EnvelopeDoc)
    )
)]
pub async fn list_slow_requests(
    State(state): State<Arc<AppState>>,
    request_id: RequestId,
    ApiQuery(query): ApiQuery<SlowRequestQuery>,
) -> ApiResult<Json<Envelope<Vec<ApiLogResponse>>>> {
    let threshold_ms = query.threshold_ms.unwrap_or(DEFAULT_SLOW_THRESHOLD_MS);
    let page = state
        .audit
        .slow_requests(threshold_ms, &page_request(query.limit, &query.after))
        .await
        .for_request(&request_id)?;
    Ok(Json(Envelope::page(
        page,
        ApiLogResponse::from,
        "Slow requests retrieved successfully",
        &request_id,
    )))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/logs/application",
            get(list_application_logs).post(record_application_log),
        )
        .route("/logs/api", get(list_api_logs))
        .route("/logs/errors", get(list_error_logs))
        .route("/logs/slow-requests", get(list_slow_requests))
}
