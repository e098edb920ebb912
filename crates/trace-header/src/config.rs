//! Injector configuration types.

use serde::Deserialize;

/// Header checked and populated when the configured name is empty.
pub const DEFAULT_HEADER_NAME: &str = "X-Trace-Id";

/// Configuration for the trace header injector.
///
/// Field names follow the camelCase keys used by middleware hosts
/// (`headerPrefix`, `headerName`, `verbose`).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TraceHeaderConfig {
    /// Prepended to every generated identifier.
    #[serde(default)]
    pub header_prefix: String,

    /// Header to check and set. An empty string resolves to
    /// [`DEFAULT_HEADER_NAME`] when the injector is built.
    #[serde(default = "default_header_name")]
    pub header_name: String,

    /// Log the trace id of every request passing through.
    #[serde(default)]
    pub verbose: bool,
}

fn default_header_name() -> String {
    DEFAULT_HEADER_NAME.to_string()
}

impl Default for TraceHeaderConfig {
    fn default() -> Self {
        Self {
            header_prefix: String::new(),
            header_name: default_header_name(),
            verbose: false,
        }
    }
}
