use std::{
    collections::{BTreeMap, btree_map},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use serde_json::{Number, Value};

use crate::{
    formatter::FormatError,
    http_meta::{HttpRequest, HttpRequestLike, HttpResponse, HttpResponseLike},
    severity::LogLevel,
    utils::rfc3339_nanos,
};

// Names set by the logging framework.
pub const FIELD_MESSAGE: &str = "message";
pub const FIELD_LEVEL: &str = "level";
pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_CALLER_FILE: &str = "caller_file";
pub const FIELD_CALLER_LINE: &str = "caller_line";
pub const FIELD_CALLER_FUNC: &str = "caller_func";
pub const FIELD_HTTP_REQUEST: &str = "http_request";
pub const FIELD_HTTP_RESPONSE: &str = "http_response";

// Names understood by the Cloud Logging formatter.
pub const FIELD_INSERT_ID: &str = "gcp:insert_id";
pub const FIELD_OPERATION_ID: &str = "gcp:operation_id";
pub const FIELD_OPERATION_PRODUCER: &str = "gcp:operation_producer";
pub const FIELD_OPERATION_FIRST: &str = "gcp:operation_first";
pub const FIELD_OPERATION_LAST: &str = "gcp:operation_last";
pub const FIELD_LABELS: &str = "gcp:labels";
pub const FIELD_CACHE_LOOKUP: &str = "gcp:cache:lookup";
pub const FIELD_CACHE_HIT: &str = "gcp:cache:hit";
pub const FIELD_CACHE_VALIDATED_WITH_ORIGIN_SERVER: &str =
    "gcp:cache:validation_with_origin_header";
pub const FIELD_CACHE_FILL_BYTES: &str = "gcp:cache:fill_bytes";
pub const FIELD_SERVER_IP: &str = "gcp:server_ip";
pub const FIELD_LATENCY: &str = "gcp:latency";
pub const FIELD_TRACE_ID: &str = "gcp:trace:id";
pub const FIELD_TRACE_SPAN_ID: &str = "gcp:trace:span_id";
pub const FIELD_TRACE_ENABLED: &str = "gcp:trace:enabled";

/// Fields that map to dedicated schema slots and never reach the payload.
pub const RESERVED_FIELDS: [&str; 23] = [
    FIELD_MESSAGE,
    FIELD_LEVEL,
    FIELD_TIMESTAMP,
    FIELD_CALLER_FILE,
    FIELD_CALLER_LINE,
    FIELD_CALLER_FUNC,
    FIELD_HTTP_REQUEST,
    FIELD_HTTP_RESPONSE,
    FIELD_INSERT_ID,
    FIELD_OPERATION_ID,
    FIELD_OPERATION_PRODUCER,
    FIELD_OPERATION_FIRST,
    FIELD_OPERATION_LAST,
    FIELD_LABELS,
    FIELD_CACHE_LOOKUP,
    FIELD_CACHE_HIT,
    FIELD_CACHE_VALIDATED_WITH_ORIGIN_SERVER,
    FIELD_CACHE_FILL_BYTES,
    FIELD_SERVER_IP,
    FIELD_LATENCY,
    FIELD_TRACE_ID,
    FIELD_TRACE_SPAN_ID,
    FIELD_TRACE_ENABLED,
];

#[inline]
pub fn is_reserved(name: &str) -> bool {
    RESERVED_FIELDS.contains(&name)
}

/// Dynamically typed field value.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    Time(DateTime<Utc>),
    Labels(BTreeMap<String, String>),
    Json(Value),
    Request(Arc<dyn HttpRequestLike>),
    Response(Arc<dyn HttpResponseLike>),
}

impl FieldValue {
    pub fn request(request: impl HttpRequestLike + 'static) -> Self {
        FieldValue::Request(Arc::new(request))
    }

    pub fn response(response: impl HttpResponseLike + 'static) -> Self {
        FieldValue::Response(Arc::new(response))
    }

    /// JSON form of the value, for the generic payload.
    pub fn to_json(&self) -> Result<Value, FormatError> {
        Ok(match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(value) => Value::Bool(*value),
            FieldValue::I64(value) => Value::from(*value),
            FieldValue::U64(value) => Value::from(*value),
            FieldValue::F64(value) => Number::from_f64(*value)
                .map(Value::Number)
                .ok_or(FormatError::Unrepresentable("non-finite float"))?,
            FieldValue::Str(value) => Value::String(value.clone()),
            FieldValue::Time(value) => Value::String(rfc3339_nanos(value)),
            FieldValue::Labels(value) => serde_json::to_value(value)?,
            FieldValue::Json(value) => value.clone(),
            FieldValue::Request(_) => return Err(FormatError::Unrepresentable("http request")),
            FieldValue::Response(_) => return Err(FormatError::Unrepresentable("http response")),
        })
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                #[inline]
                fn from(value: $ty) -> Self {
                    FieldValue::$variant(value.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i32 => I64,
    i64 => I64,
    u32 => U64,
    u64 => U64,
    f64 => F64,
    String => Str,
    &str => Str,
    DateTime<Utc> => Time,
    BTreeMap<String, String> => Labels,
    Value => Json,
}

impl From<LogLevel> for FieldValue {
    fn from(level: LogLevel) -> Self {
        FieldValue::I64(level.into())
    }
}

impl From<HttpRequest> for FieldValue {
    fn from(request: HttpRequest) -> Self {
        FieldValue::request(request)
    }
}

impl From<HttpResponse> for FieldValue {
    fn from(response: HttpResponse) -> Self {
        FieldValue::response(response)
    }
}

/// Field name to value mapping handed to the formatter.
///
/// The typed accessors return the fallback on a missing field or on a
/// variant of the wrong type.
#[derive(Debug, Clone, Default)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        self.0.insert(name.into(), value.into())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FieldValue> {
        self.0.iter()
    }

    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        match self.get(name) {
            Some(FieldValue::Str(value)) => value.as_str(),
            _ => default,
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        match self.get(name) {
            Some(FieldValue::Bool(value)) => *value,
            _ => default,
        }
    }

    pub fn i64_or(&self, name: &str, default: i64) -> i64 {
        match self.get(name) {
            Some(FieldValue::I64(value)) => *value,
            Some(FieldValue::U64(value)) => i64::try_from(*value).unwrap_or(default),
            _ => default,
        }
    }

    /// Accepts strings and integers, integers rendered in decimal.
    pub fn numeric_str_or(&self, name: &str, default: &str) -> String {
        match self.get(name) {
            Some(FieldValue::Str(value)) => value.clone(),
            Some(FieldValue::I64(value)) => value.to_string(),
            Some(FieldValue::U64(value)) => value.to_string(),
            _ => default.to_owned(),
        }
    }

    pub fn time_or_else(
        &self,
        name: &str,
        default: impl FnOnce() -> DateTime<Utc>,
    ) -> DateTime<Utc> {
        match self.get(name) {
            Some(FieldValue::Time(value)) => *value,
            _ => default(),
        }
    }

    pub fn labels(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        match self.get(name) {
            Some(FieldValue::Labels(value)) => Some(value),
            _ => None,
        }
    }

    pub fn request(&self, name: &str) -> Option<&dyn HttpRequestLike> {
        match self.get(name) {
            Some(FieldValue::Request(value)) => Some(value.as_ref()),
            _ => None,
        }
    }

    pub fn response(&self, name: &str) -> Option<&dyn HttpResponseLike> {
        match self.get(name) {
            Some(FieldValue::Response(value)) => Some(value.as_ref()),
            _ => None,
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Fields
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        fields.extend(iter);
        fields
    }
}

impl<K, V> Extend<(K, V)> for Fields
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}

impl IntoIterator for Fields {
    type Item = (String, FieldValue);
    type IntoIter = btree_map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Fields {
    type Item = (&'a String, &'a FieldValue);
    type IntoIter = btree_map::Iter<'a, String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
