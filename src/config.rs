use std::sync::Arc;

use derive_builder::Builder;

use crate::severity::{LogLevel, SeverityMap, default_severity_map};

const DEFAULT_LEVEL: LogLevel = LogLevel::Info;

/// Environment variables consulted by [`FormatterConfig::from_env`], in order.
pub const PROJECT_ID_ENV_VARS: [&str; 3] =
    ["GOOGLE_CLOUD_PROJECT", "GCP_PROJECT", "GCLOUD_PROJECT"];

/// Immutable formatter configuration.
///
/// Clones share the severity table and project id. The `with_*` methods
/// return a new value and leave `self` untouched.
#[derive(Debug, Clone, Builder)]
#[builder(pattern = "owned", setter(into, strip_option))]
pub struct FormatterConfig {
    #[builder(default = Arc::new(default_severity_map()))]
    severity_map: Arc<SeverityMap>,
    #[builder(default = i64::from(DEFAULT_LEVEL))]
    default_level: i64,
    /// Needed to turn a trace id from the request header into a
    /// `projects/<id>/traces/<trace>` resource name.
    #[builder(default)]
    project_id: Option<Arc<str>>,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            severity_map: Arc::new(default_severity_map()),
            default_level: i64::from(DEFAULT_LEVEL),
            project_id: None,
        }
    }
}

impl FormatterConfig {
    #[inline]
    pub fn builder() -> FormatterConfigBuilder {
        FormatterConfigBuilder::default()
    }

    /// Default configuration with the project id taken from the environment, if set.
    pub fn from_env() -> Self {
        match project_id_from(|var| std::env::var(var).ok()) {
            Some(project_id) => Self::default().with_project_id(project_id),
            None => Self::default(),
        }
    }

    pub fn severity_map(&self) -> &SeverityMap {
        &self.severity_map
    }

    pub fn default_level(&self) -> i64 {
        self.default_level
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn with_severity_map(&self, map: impl Into<Arc<SeverityMap>>) -> Self {
        Self {
            severity_map: map.into(),
            ..self.clone()
        }
    }

    pub fn with_default_level(&self, level: impl Into<i64>) -> Self {
        Self {
            default_level: level.into(),
            ..self.clone()
        }
    }

    pub fn with_project_id(&self, project_id: impl Into<Arc<str>>) -> Self {
        let project_id: Arc<str> = project_id.into();

        Self {
            project_id: (!project_id.is_empty()).then_some(project_id),
            ..self.clone()
        }
    }
}

/// First non-empty value among [`PROJECT_ID_ENV_VARS`], as resolved by `lookup`.
fn project_id_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    PROJECT_ID_ENV_VARS
        .iter()
        .filter_map(|var| lookup(var))
        .find(|value| !value.is_empty())
}
