use serde::Deserialize;

use crate::error::Error;

/// Global object the synthesized code reports to.
pub const DEFAULT_RUNTIME_IDENT: &str = "__callprobe";

/// Names that are never wrapped, along with their dotted members.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    "console.log",
    "process.on",
    "performance.now",
    "Math.min",
    "Math.max",
    "eval",
];

const DEFAULT_HASH_LENGTH: usize = 10;

/// Plugin options, read from the JSON blob the host passes in.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstrumentConfig {
    pub runtime_ident: String,
    /// Side-effect import that installs a custom sink (modules only).
    pub runtime_module: Option<String>,
    pub exclude: Vec<String>,
    pub replace_default_exclusions: bool,
    pub instrument_calls: bool,
    pub instrument_loops: bool,
    pub inject_runtime: bool,
    pub hash_length: usize,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            runtime_ident: DEFAULT_RUNTIME_IDENT.to_string(),
            runtime_module: None,
            exclude: vec![],
            replace_default_exclusions: false,
            instrument_calls: true,
            instrument_loops: true,
            inject_runtime: true,
            hash_length: DEFAULT_HASH_LENGTH,
        }
    }
}

impl InstrumentConfig {
    pub fn from_json(raw: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Lenient variant used by the plugin entry: bad JSON falls back to defaults.
    pub fn from_json_or_default(raw: Option<&str>) -> Self {
        match raw {
            Some(raw) if !raw.trim().is_empty() => Self::from_json(raw).unwrap_or_else(|err| {
                tracing::warn!(%err, "ignoring plugin config, using defaults");
                Self::default()
            }),
            _ => Self::default(),
        }
    }
}
