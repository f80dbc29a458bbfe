use serde::Deserialize;

/// Log output configuration
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` directive (e.g. `info,axon_llm=debug`)
    #[serde(default)]
    pub filter: Option<String>,
}

/// Log line format
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON object per line
    Json,
}
