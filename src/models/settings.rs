use garde::Validate;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};

/// How strictly the vision model should grade deviations from the references.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Strictness {
    Lenient,
    #[default]
    Standard,
    Strict,
}

/// Per-request analysis settings. Snapshotted into task metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AnalysisSettings {
    /// Overrides the configured default model.
    #[garde(length(min = 1, max = 100))]
    #[serde(default)]
    pub model: Option<String>,

    /// Language for generated text (e.g. "en", "zh-CN").
    #[garde(length(min = 2, max = 16))]
    #[serde(default = "default_language")]
    pub language: String,

    #[garde(skip)]
    #[serde(default)]
    pub strictness: Strictness,

    /// Hold identification results for user confirmation before completing.
    #[garde(skip)]
    #[serde(default)]
    pub confirm_identification: bool,
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            model: None,
            language: default_language(),
            strictness: Strictness::default(),
            confirm_identification: false,
        }
    }
}

/// The caller's API key for the vision model.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(***)")
    }
}
