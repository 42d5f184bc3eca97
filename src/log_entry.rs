//! Cloud Logging [LogEntry](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry)
//! shapes. Empty values are skipped so absent data never shows up as `""`,
//! `false` or `{}`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_derive::Serialize;

use crate::{
    severity::Severity,
    utils::{is_false, serialize_rfc3339_nanos},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry<'a> {
    pub severity: Severity,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub insert_id: &'a str,
    #[serde(skip_serializing_if = "is_false")]
    pub trace_sampled: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub trace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<&'a BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_request: Option<HttpRequestEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation<'a>>,
    #[serde(serialize_with = "serialize_rfc3339_nanos")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub message: &'a str,
}

/// [HttpRequest](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry#HttpRequest)
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestEntry {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub request_method: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub request_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub request_size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub response_size: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_agent: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remote_ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub server_ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub referer: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub latency: String,
    #[serde(skip_serializing_if = "is_false")]
    pub cache_lookup: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub cache_hit: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub cache_validated_with_origin_server: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cache_fill_bytes: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub protocol: String,
}

/// [LogEntryOperation](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry#LogEntryOperation)
#[derive(Debug, Serialize)]
pub struct Operation<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    pub id: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub producer: &'a str,
    #[serde(skip_serializing_if = "is_false")]
    pub first: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub last: bool,
}

#[derive(Debug, Serialize)]
pub struct SourceLocation<'a> {
    pub file: &'a str,
    /// 1-based, kept as a string like the API does.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub line: String,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub function: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_http_request_serializes_to_empty_object() {
        let value = serde_json::to_value(HttpRequestEntry::default()).unwrap();

        assert_eq!(value, json!({}));
    }

    #[test]
    fn http_request_field_names() {
        let entry = HttpRequestEntry {
            status: Some(200),
            cache_validated_with_origin_server: true,
            cache_fill_bytes: "12".to_owned(),
            remote_ip: "10.0.0.1".to_owned(),
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_value(entry).unwrap(),
            json!({
                "status": 200,
                "cacheValidatedWithOriginServer": true,
                "cacheFillBytes": "12",
                "remoteIp": "10.0.0.1",
            })
        );
    }

    #[test]
    fn operation_skips_false_flags() {
        let operation = Operation {
            id: "op",
            producer: "",
            first: true,
            last: false,
        };

        assert_eq!(
            serde_json::to_value(operation).unwrap(),
            json!({"id": "op", "first": true})
        );
    }
}
