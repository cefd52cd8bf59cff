//! Uniform response body shared by every endpoint.

use chrono::{DateTime, Utc};
use mono_db::{FieldViolation, Page};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::middleware::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
    Warning,
}

/// Closed set of machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    InternalError,
    BadRequest,
    Conflict,
    RateLimited,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub value: Option<Value>,
}

impl ErrorDetail {
    pub fn new(code: ErrorCode, field: Option<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            field,
            message: message.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl From<FieldViolation> for ErrorDetail {
    fn from(violation: FieldViolation) -> Self {
        Self {
            code: ErrorCode::ValidationError,
            field: Some(violation.field),
            message: violation.message,
            value: violation.value,
        }
    }
}

/// Pagination block attached to list responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PageMeta {
    pub has_more: bool,
    pub next_cursor: Option<String>,
    pub limit: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub status: ResponseStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ErrorDetail>>,
}

/// Schema of [`Envelope`] as published in the OpenAPI document; `data` is
/// the endpoint's payload.
#[derive(Debug, ToSchema)]
pub struct EnvelopeDoc {
    pub status: ResponseStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    #[schema(value_type = Object)]
    pub data: Option<Value>,
    pub meta: Option<PageMeta>,
    pub error_code: Option<ErrorCode>,
    pub details: Option<Vec<ErrorDetail>>,
}

impl<T> Envelope<T> {
    pub fn success(data: T, message: impl Into<String>, request_id: &RequestId) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
            timestamp: Utc::now(),
            request_id: request_id.to_string(),
            data: Some(data),
            meta: None,
            error_code: None,
            details: None,
        }
    }

    pub fn with_meta(mut self, meta: PageMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

impl<T> Envelope<Vec<T>> {
    /// Wraps one page of results, converting each row with `convert`.
    pub fn page<R>(
        page: Page<R>,
        convert: impl FnMut(R) -> T,
        message: impl Into<String>,
        request_id: &RequestId,
    ) -> Self {
        let meta = PageMeta {
            has_more: page.has_more,
            next_cursor: page.next_cursor,
            limit: page.limit,
            total: None,
        };
        let items = page.items.into_iter().map(convert).collect();
        Self::success(items, message, request_id).with_meta(meta)
    }
}

impl Envelope<()> {
    pub fn error(
        code: ErrorCode,
        message: impl Into<String>,
        request_id: &RequestId,
        details: Vec<ErrorDetail>,
    ) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
            timestamp: Utc::now(),
            request_id: request_id.to_string(),
            data: None,
            meta: None,
            error_code: Some(code),
            details: (!details.is_empty()).then_some(details),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_carries_data_and_request_id() {
        let request_id = RequestId::generate();
        let body = serde_json::to_value(Envelope::success(
            json!({"id": 1}),
            "Item retrieved",
            &request_id,
        ))
        .unwrap();

        assert_eq!(body["status"], "success");
        assert_eq!(body["request_id"], request_id.as_str());
        assert_eq!(body["data"]["id"], 1);
        assert!(body.get("error_code").is_none());
        assert!(body.get("meta").is_none());
        assert!(body["timestamp"].is_string());
    }

    #[test]
    fn error_codes_serialise_in_screaming_snake_case() {
        let request_id = RequestId::generate();
        let body = serde_json::to_value(Envelope::error(
            ErrorCode::ValidationError,
            "bad input",
            &request_id,
            vec![
                ErrorDetail::new(ErrorCode::ValidationError, Some("name".into()), "too long")
                    .with_value("xxxx"),
                ErrorDetail::new(ErrorCode::ValidationError, Some("email".into()), "missing @"),
            ],
        ))
        .unwrap();

        assert_eq!(body["status"], "error");
        assert_eq!(body["error_code"], "VALIDATION_ERROR");
        assert_eq!(body["details"][0]["field"], "name");
        assert_eq!(body["details"][0]["value"], "xxxx");
        assert_eq!(body["details"][1]["field"], "email");
        assert!(body.get("data").is_none());
    }

    #[test]
    fn error_without_details_omits_the_list() {
        let body = serde_json::to_value(Envelope::error(
            ErrorCode::InternalError,
            "Internal server error",
            &RequestId::generate(),
            Vec::new(),
        ))
        .unwrap();
        assert!(body.get("details").is_none());
    }

    #[test]
    fn page_meta_mirrors_the_page() {
        let page = Page {
            items: vec![1_i64, 2, 3],
            has_more: true,
            next_cursor: Some("abc".to_string()),
            limit: 3,
        };
        let envelope = Envelope::page(page, |n| n * 10, "Items retrieved", &RequestId::generate());
        let body = serde_json::to_value(envelope).unwrap();

        assert_eq!(body["data"], json!([10, 20, 30]));
        assert_eq!(body["meta"]["has_more"], true);
        assert_eq!(body["meta"]["next_cursor"], "abc");
        assert_eq!(body["meta"]["limit"], 3);
        assert!(body["meta"].get("total").is_none());
    }
}
