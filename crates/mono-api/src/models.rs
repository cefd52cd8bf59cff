//! Wire types shared across route modules.

use chrono::{DateTime, SecondsFormat, Utc};
use mono_db::PageRequest;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Plain cursor-paging parameters.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Page size, 1 to 100 (default 20).
    pub limit: Option<i64>,
    /// Opaque cursor from a previous page's `next_cursor`.
    pub after: Option<String>,
}

impl PageQuery {
    pub fn page(&self) -> PageRequest {
        page_request(self.limit, &self.after)
    }
}

pub fn page_request(limit: Option<i64>, after: &Option<String>) -> PageRequest {
    PageRequest {
        limit,
        after: after.clone(),
    }
}

pub fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn opt_timestamp(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(timestamp)
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in partial updates.
pub fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub docs: String,
    pub databases: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DatabaseHealth {
    pub role: String,
    pub healthy: bool,
    pub in_flight_sessions: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub databases: Vec<DatabaseHealth>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        description: Option<Option<String>>,
    }

    #[test]
    fn double_option_separates_absent_from_null() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.description, None);

        let cleared: Patch = serde_json::from_str(r#"{"description": null}"#).unwrap();
        assert_eq!(cleared.description, Some(None));

        let set: Patch = serde_json::from_str(r#"{"description": "blue"}"#).unwrap();
        assert_eq!(set.description, Some(Some("blue".to_string())));
    }

    #[test]
    fn timestamps_are_utc_rfc3339() {
        let value = DateTime::parse_from_rfc3339("2024-03-01T10:00:00.5+02:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(timestamp(value), "2024-03-01T08:00:00.500000Z");
    }
}
