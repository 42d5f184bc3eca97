//! Google Cloud Logging structured JSON for log events.
//!
//! [`GcpFormatter`] turns a message plus a [`Fields`] mapping into a single
//! JSON line following the Cloud Logging `LogEntry` schema. [`GCloudFormatLayer`]
//! plugs it into `tracing`.
//!
//! ```no_run
//! use tracing_subscriber::layer::SubscriberExt;
//!
//! let subscriber = tracing_subscriber::registry().with(tracing_gcloud_formatter::layer());
//! tracing::subscriber::set_global_default(subscriber).unwrap();
//!
//! tracing::info!("gcp:insert_id" = "a1", user = "ann", "logged in");
//! ```

mod config;
pub mod fields;
mod formatter;
pub mod http_meta;
mod layer;
mod log_entry;
mod severity;
pub mod trace_context;
mod utils;

pub use config::{
    FormatterConfig, FormatterConfigBuilder, FormatterConfigBuilderError, PROJECT_ID_ENV_VARS,
};
pub use fields::{FieldValue, Fields};
pub use formatter::{FormatError, GcpFormatter, LogFormatter, json_payload};
pub use http_meta::{HttpRequest, HttpRequestLike, HttpResponse, HttpResponseLike, ReplayBody};
pub use layer::GCloudFormatLayer;
pub use severity::{LogLevel, Severity, SeverityMap, default_severity_map, resolve_severity};

/// Target of this crate's own diagnostics; [`GCloudFormatLayer`] drops these events.
pub(crate) const INTERNAL_TARGET: &str = "tracing_gcloud_formatter::internal";

/// Layer writing Cloud Logging JSON to stdout, with the project id taken
/// from the environment (see [`FormatterConfig::from_env`]).
pub fn layer() -> GCloudFormatLayer {
    GCloudFormatLayer::new(GcpFormatter::from_config(FormatterConfig::from_env()))
}
