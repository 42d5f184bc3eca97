use http::HeaderMap;

/// Header set by Google front ends: `TRACE_ID/SPAN_ID;o=FLAG`.
pub const TRACE_CONTEXT_HEADER: &str = "x-cloud-trace-context";

const SAMPLED_FLAG: &str = "o=1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceContext<'a> {
    pub trace_id: &'a str,
    /// Span id and sampling flag, present only when the `;o=` part is well formed.
    pub span: Option<SpanContext<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanContext<'a> {
    pub span_id: &'a str,
    pub sampled: bool,
}

impl<'a> TraceContext<'a> {
    /// Parses a header value. `None` unless it splits into exactly two `/` parts
    /// with a non-empty trace id. A span part with an empty span id is dropped.
    pub fn parse(header: &'a str) -> Option<Self> {
        let (trace_id, rest) = split_exactly_two(header, '/')?;
        if trace_id.is_empty() {
            return None;
        }

        let span = split_exactly_two(rest, ';')
            .filter(|(span_id, _)| !span_id.is_empty())
            .map(|(span_id, flag)| SpanContext {
                span_id,
                sampled: flag == SAMPLED_FLAG,
            });

        Some(Self { trace_id, span })
    }

    /// Reads and parses the first trace context header value, if any.
    pub fn from_headers(headers: &'a HeaderMap) -> Option<Self> {
        headers
            .get(TRACE_CONTEXT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(Self::parse)
    }

    /// Fully qualified trace resource name.
    pub fn resource_name(&self, project_id: &str) -> String {
        format!("projects/{}/traces/{}", project_id, self.trace_id)
    }
}

fn split_exactly_two(value: &str, separator: char) -> Option<(&str, &str)> {
    let mut parts = value.split(separator);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(first), Some(second), None) => Some((first, second)),
        _ => None,
    }
}
