use std::{fmt, io::Write};

use chrono::Utc;
use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
    span,
};
use tracing_subscriber::{
    fmt::MakeWriter,
    layer::{Context, Layer},
    registry::LookupSpan,
};

use crate::{
    fields::{
        FIELD_CALLER_FILE, FIELD_CALLER_FUNC, FIELD_CALLER_LINE, FIELD_LEVEL, FIELD_MESSAGE,
        FIELD_TIMESTAMP, FieldValue, Fields,
    },
    formatter::{GcpFormatter, LogFormatter},
    severity::LogLevel,
    INTERNAL_TARGET,
};

/// `tracing` layer writing each event as one formatted line.
///
/// Span fields are inherited by the events inside them, so a request span
/// can carry `"gcp:trace:id"` or `"gcp:operation_id"` for every event it
/// contains. Inner spans override outer ones and event fields override spans.
pub struct GCloudFormatLayer<F = GcpFormatter, W = fn() -> std::io::Stdout> {
    formatter: F,
    make_writer: W,
}

impl<F: LogFormatter> GCloudFormatLayer<F> {
    pub fn new(formatter: F) -> Self {
        Self {
            formatter,
            make_writer: std::io::stdout,
        }
    }
}

impl<F, W> GCloudFormatLayer<F, W>
where
    F: LogFormatter,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    pub fn with_writer<W2>(self, make_writer: W2) -> GCloudFormatLayer<F, W2>
    where
        W2: for<'writer> MakeWriter<'writer> + 'static,
    {
        GCloudFormatLayer {
            formatter: self.formatter,
            make_writer,
        }
    }

    pub fn formatter(&self) -> &F {
        &self.formatter
    }
}

/// Fields recorded on a span, kept in its extensions.
#[derive(Debug, Default)]
struct SpanFields(Fields);

impl<S, F, W> Layer<S> for GCloudFormatLayer<F, W>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    F: LogFormatter,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);

        span.extensions_mut().insert(SpanFields(visitor.into_fields()));
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);

        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<SpanFields>() {
            Some(SpanFields(fields)) => fields.extend(visitor.into_fields()),
            None => extensions.insert(SpanFields(visitor.into_fields())),
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target() == INTERNAL_TARGET {
            return;
        }

        let mut visitor = FieldVisitor::default();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(SpanFields(fields)) = span.extensions().get::<SpanFields>() {
                    visitor.fields.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
        }
        event.record(&mut visitor);

        let FieldVisitor {
            mut fields,
            message,
        } = visitor;
        fields.insert(FIELD_LEVEL, LogLevel::from(metadata.level()));
        fields.insert(FIELD_TIMESTAMP, Utc::now());
        if let Some(file) = metadata.file() {
            fields.insert(FIELD_CALLER_FILE, file);
        }
        if let Some(line) = metadata.line() {
            fields.insert(FIELD_CALLER_LINE, line);
        }
        if let Some(module) = metadata.module_path() {
            fields.insert(FIELD_CALLER_FUNC, module);
        }

        let line = match self.formatter.format(message.as_deref().unwrap_or_default(), &fields) {
            Ok(line) => line,
            Err(err) => {
                eprintln!("Failed to format log event: {err}");
                return;
            }
        };

        let mut writer = self.make_writer.make_writer_for(metadata);
        if let Err(err) = writeln!(writer, "{line}") {
            eprintln!("Failed to write log event: {err}");
        }
    }
}

#[derive(Default)]
struct FieldVisitor {
    fields: Fields,
    message: Option<String>,
}

impl FieldVisitor {
    fn into_fields(self) -> Fields {
        let Self { mut fields, message } = self;
        if let Some(message) = message {
            fields.insert(FIELD_MESSAGE, message);
        }
        fields
    }

    fn record(&mut self, field: &Field, value: impl Into<FieldValue>) {
        self.fields.insert(field.name(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == FIELD_MESSAGE {
            self.message = Some(value.to_owned());
        } else {
            self.record(field, value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record(field, value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record(field, value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == FIELD_MESSAGE {
            self.message = Some(format!("{value:?}"));
        } else {
            self.record(field, format!("{value:?}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use serde_json::{Value, json};
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn lines(&self) -> Vec<Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    fn capture(formatter: GcpFormatter, f: impl FnOnce()) -> Vec<Value> {
        let buffer = SharedBuffer::default();
        let writer = buffer.clone();
        let layer = GCloudFormatLayer::new(formatter).with_writer(move || writer.clone());
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, f);

        buffer.lines()
    }

    #[test]
    fn writes_one_line_per_event() {
        let lines = capture(GcpFormatter::new(), || {
            tracing::info!(foo = "bar", count = 3u64, "hello {}", "world");
            tracing::error!("boom");
        });

        assert_eq!(lines.len(), 2);

        let first = &lines[0];
        assert_eq!(first["message"], json!("hello world"));
        assert_eq!(first["severity"], json!("INFO"));
        assert_eq!(first["foo"], json!("bar"));
        assert_eq!(first["count"], json!(3));
        assert_eq!(first["sourceLocation"]["file"], json!(file!()));
        assert_eq!(first["sourceLocation"]["function"], json!(module_path!()));
        assert!(first["sourceLocation"]["line"].as_str().unwrap().parse::<u32>().is_ok());
        assert!(first["timestamp"].is_string());

        assert_eq!(lines[1]["severity"], json!("ERROR"));
        assert_eq!(lines[1]["message"], json!("boom"));
    }

    #[test]
    fn reserved_names_through_string_literal_fields() {
        let lines = capture(GcpFormatter::new(), || {
            tracing::warn!(
                "gcp:insert_id" = "insert-7",
                "gcp:trace:id" = "projects/p/traces/t",
                "gcp:trace:enabled" = true,
                "careful"
            );
        });

        assert_eq!(
            lines[0]["insertId"],
            json!("insert-7"),
            "{}",
            lines[0]
        );
        assert_eq!(lines[0]["trace"], json!("projects/p/traces/t"));
        assert_eq!(lines[0]["traceSampled"], json!(true));
        assert_eq!(lines[0]["severity"], json!("WARNING"));
        assert!(lines[0].get("gcp:insert_id").is_none());
    }

    #[test]
    fn events_inherit_span_fields() {
        let lines = capture(GcpFormatter::new(), || {
            let outer = tracing::info_span!("request", "gcp:operation_id" = "op-1", user = "ann");
            let _outer = outer.enter();
            let inner = tracing::info_span!("step", user = "bob", attempt = tracing::field::Empty);
            let _inner = inner.enter();
            inner.record("attempt", 2u64);

            tracing::debug!(user = "cat", "inside");
        });

        let line = &lines[0];
        assert_eq!(line["operation"], json!({"id": "op-1"}));
        assert_eq!(line["user"], json!("cat"));
        assert_eq!(line["attempt"], json!(2));
        assert_eq!(line["severity"], json!("DEBUG"));
        assert_eq!(line["message"], json!("inside"));
    }

    #[test]
    fn own_diagnostics_are_skipped() {
        let lines = capture(GcpFormatter::new(), || {
            tracing::info!(target: INTERNAL_TARGET, "internal");
            tracing::info!("external");
        });

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["message"], json!("external"));
    }
}
