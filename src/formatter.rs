use std::{collections::BTreeMap, sync::Arc};

use serde_json::Value;
use thiserror::Error;

use crate::{
    config::{FormatterConfig, FormatterConfigBuilder, FormatterConfigBuilderError},
    fields::*,
    http_meta::{request_size, response_size},
    log_entry::{HttpRequestEntry, LogEntry, Operation, SourceLocation},
    severity::{Severity, SeverityMap, resolve_severity},
    trace_context::TraceContext,
    INTERNAL_TARGET,
};

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("JSON encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Value has no JSON form: {0}")]
    Unrepresentable(&'static str),
    #[error("Invalid formatter config: {0}")]
    Config(#[from] FormatterConfigBuilderError),
}

/// Turns a message and its fields into one line of text.
///
/// Implement this to plug another output format into [`crate::GCloudFormatLayer`].
pub trait LogFormatter: Send + Sync + 'static {
    fn format(&self, message: &str, fields: &Fields) -> Result<String, FormatError>;
}

/// Formats records as [structured](https://cloud.google.com/logging/docs/structured-logging)
/// Cloud Logging JSON.
///
/// Reserved fields (see [`RESERVED_FIELDS`]) fill the dedicated `LogEntry`
/// attributes; every other field is merged into the top level next to
/// `message`.
#[derive(Debug, Clone, Default)]
pub struct GcpFormatter {
    config: FormatterConfig,
}

impl GcpFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: FormatterConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &FormatterConfig {
        &self.config
    }

    pub fn with_severity_map(&self, map: impl Into<Arc<SeverityMap>>) -> Self {
        Self::from_config(self.config.with_severity_map(map))
    }

    pub fn with_default_level(&self, level: impl Into<i64>) -> Self {
        Self::from_config(self.config.with_default_level(level))
    }

    pub fn with_project_id(&self, project_id: impl Into<Arc<str>>) -> Self {
        Self::from_config(self.config.with_project_id(project_id))
    }

    fn severity(&self, fields: &Fields) -> Severity {
        let level = fields.i64_or(FIELD_LEVEL, self.config.default_level());
        resolve_severity(self.config.severity_map(), level)
    }

    fn entry<'a>(&self, message: &'a str, fields: &'a Fields) -> LogEntry<'a> {
        let mut entry = LogEntry {
            severity: self.severity(fields),
            insert_id: fields.str_or(FIELD_INSERT_ID, ""),
            trace_sampled: fields.bool_or(FIELD_TRACE_ENABLED, false),
            trace: fields.str_or(FIELD_TRACE_ID, "").to_owned(),
            span_id: fields.str_or(FIELD_TRACE_SPAN_ID, "").to_owned(),
            labels: fields.labels(FIELD_LABELS).filter(|labels| !labels.is_empty()),
            http_request: http_request(fields),
            operation: operation(fields),
            source_location: source_location(fields),
            timestamp: fields.time_or_else(FIELD_TIMESTAMP, chrono::Utc::now),
            message,
        };

        self.apply_trace_context(fields, &mut entry);

        entry
    }

    /// Falls back to the request's trace header when no trace id was given.
    fn apply_trace_context(&self, fields: &Fields, entry: &mut LogEntry<'_>) {
        if !entry.trace.is_empty() {
            return;
        }
        let Some(project_id) = self.config.project_id() else {
            return;
        };
        let Some(request) = fields.request(FIELD_HTTP_REQUEST) else {
            return;
        };
        let Some(context) = TraceContext::from_headers(request.header_map()) else {
            return;
        };

        entry.trace = context.resource_name(project_id);
        if let Some(span) = context.span {
            entry.span_id = span.span_id.to_owned();
            entry.trace_sampled = span.sampled;
        }
    }
}

impl TryFrom<FormatterConfigBuilder> for GcpFormatter {
    type Error = FormatError;

    fn try_from(builder: FormatterConfigBuilder) -> Result<Self, Self::Error> {
        Ok(Self::from_config(builder.build()?))
    }
}

impl LogFormatter for GcpFormatter {
    fn format(&self, message: &str, fields: &Fields) -> Result<String, FormatError> {
        let entry = self.entry(message, fields);

        let Value::Object(mut record) = serde_json::to_value(&entry)? else {
            return Err(FormatError::Unrepresentable("log entry"));
        };
        if let Some(payload) = json_payload(fields) {
            for (name, value) in payload {
                record.entry(name).or_insert(value);
            }
        }

        Ok(serde_json::to_string(&Value::Object(record))?)
    }
}

/// Every non-reserved field that has a JSON form. `None` when nothing is left.
pub fn json_payload(fields: &Fields) -> Option<BTreeMap<String, Value>> {
    let payload = fields
        .iter()
        .filter(|(name, _)| !is_reserved(name))
        .filter_map(|(name, value)| match value.to_json() {
            Ok(json) => Some((name.clone(), json)),
            Err(err) => {
                tracing::trace!(
                    target: INTERNAL_TARGET,
                    field = %name,
                    "Dropping field from payload: {err}"
                );
                None
            }
        })
        .collect::<BTreeMap<_, _>>();

    (!payload.is_empty()).then_some(payload)
}

fn http_request(fields: &Fields) -> Option<HttpRequestEntry> {
    let request = fields.request(FIELD_HTTP_REQUEST)?;

    let mut entry = HttpRequestEntry {
        request_method: request.request_method().to_owned(),
        request_url: request.request_url(),
        request_size: request_size(request),
        user_agent: request.user_agent().unwrap_or_default().to_owned(),
        remote_ip: request
            .remote_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default(),
        server_ip: fields.str_or(FIELD_SERVER_IP, "").to_owned(),
        referer: request.referer().unwrap_or_default().to_owned(),
        latency: fields.str_or(FIELD_LATENCY, "").to_owned(),
        cache_lookup: fields.bool_or(FIELD_CACHE_LOOKUP, false),
        cache_hit: fields.bool_or(FIELD_CACHE_HIT, false),
        cache_validated_with_origin_server: fields
            .bool_or(FIELD_CACHE_VALIDATED_WITH_ORIGIN_SERVER, false),
        cache_fill_bytes: fields.numeric_str_or(FIELD_CACHE_FILL_BYTES, ""),
        protocol: request.protocol().to_owned(),
        ..Default::default()
    };

    if let Some(response) = fields.response(FIELD_HTTP_RESPONSE) {
        entry.status = Some(response.status().as_u16());
        entry.response_size = response_size(response);
    }

    Some(entry)
}

fn operation(fields: &Fields) -> Option<Operation<'_>> {
    let id = fields.str_or(FIELD_OPERATION_ID, "");
    let producer = fields.str_or(FIELD_OPERATION_PRODUCER, "");
    if id.is_empty() && producer.is_empty() {
        return None;
    }

    Some(Operation {
        id,
        producer,
        first: fields.bool_or(FIELD_OPERATION_FIRST, false),
        last: fields.bool_or(FIELD_OPERATION_LAST, false),
    })
}

fn source_location(fields: &Fields) -> Option<SourceLocation<'_>> {
    let file = fields.str_or(FIELD_CALLER_FILE, "");
    if file.is_empty() {
        return None;
    }

    Some(SourceLocation {
        file,
        line: fields.numeric_str_or(FIELD_CALLER_LINE, ""),
        function: fields.str_or(FIELD_CALLER_FUNC, ""),
    })
}
