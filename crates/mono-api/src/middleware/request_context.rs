use std::{
    convert::Infallible,
    fmt,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, Extensions, HeaderValue, Request},
    response::Response,
};
use futures::future::BoxFuture;
use mono_db::{AuditLogService, NewApiLog};
use tower::{Layer, Service};
use tracing::info;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const PROCESSING_TIME_HEADER: &str = "x-processing-time";

/// Correlation id generated once per inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(Arc<str>);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reads the id stored by [`RequestContextLayer`]. Routers mounted without
/// the layer get an id minted on first extraction.
#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ensure_request_id(&mut parts.extensions))
    }
}

/// Returns the request's id, storing a fresh one if none was set yet.
pub(crate) fn ensure_request_id(extensions: &mut Extensions) -> RequestId {
    if let Some(existing) = extensions.get::<RequestId>() {
        return existing.clone();
    }
    let generated = RequestId::generate();
    extensions.insert(generated.clone());
    generated
}

/// Tags every request with a [`RequestId`], stamps the correlation and
/// timing headers on the response, and optionally records the exchange in
/// the API log.
#[derive(Clone, Default)]
pub struct RequestContextLayer {
    api_log: Option<AuditLogService>,
}

impl RequestContextLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_log(mut self, audit: AuditLogService) -> Self {
        self.api_log = Some(audit);
        self
    }
}

impl<S> Layer<S> for RequestContextLayer {
    type Service = RequestContextService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestContextService {
            inner,
            api_log: self.api_log.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RequestContextService<S> {
    inner: S,
    api_log: Option<AuditLogService>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for RequestContextService<S>
where
    S: Service<Request<ReqBody>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let mut inner = self.inner.clone();
        let api_log = self.api_log.clone();

        let request_id = RequestId::generate();
        request.extensions_mut().insert(request_id.clone());
        let exchange = Exchange::from_request(&request);

        Box::pin(async move {
            let started = Instant::now();
            info!(
                request_id = %request_id,
                method = %exchange.method,
                path = %exchange.path,
                "request started"
            );

            let mut response = inner.call(request).await?;
            let elapsed = started.elapsed();

            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
                headers.insert(REQUEST_ID_HEADER, value);
            }
            if let Ok(value) = HeaderValue::from_str(&format_processing_time(elapsed)) {
                headers.insert(PROCESSING_TIME_HEADER, value);
            }

            let status = response.status().as_u16();
            info!(
                request_id = %request_id,
                status,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "request completed"
            );

            if let Some(audit) = api_log {
                let entry = exchange.into_api_log(status, elapsed);
                tokio::spawn(async move {
                    audit.record_api_request_best_effort(entry).await;
                });
            }

            Ok(response)
        })
    }
}

/// Request attributes captured before the request is handed on.
struct Exchange {
    method: String,
    path: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

impl Exchange {
    fn from_request<B>(request: &Request<B>) -> Self {
        let headers = request.headers();
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty());
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Self {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            ip_address: forwarded.or(peer),
            user_agent: headers
                .get(header::USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
        }
    }

    fn into_api_log(self, status: u16, elapsed: Duration) -> NewApiLog {
        NewApiLog {
            method: self.method,
            endpoint: self.path,
            status_code: i64::from(status),
            response_time_ms: Some(i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)),
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            ..NewApiLog::default()
        }
    }
}

fn format_processing_time(elapsed: Duration) -> String {
    format!("{:.2}ms", elapsed.as_secs_f64() * 1000.0)
}
