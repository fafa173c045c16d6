use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string. Without it (and the S3 settings) products
    /// are kept in memory only.
    pub database_url: Option<String>,

    /// S3-compatible bucket for image blobs
    pub s3_bucket: Option<String>,

    /// S3 endpoint URL
    pub s3_endpoint: Option<String>,

    /// S3 access key ID
    pub s3_access_key: Option<String>,

    /// S3 secret access key
    pub s3_secret_key: Option<String>,

    /// Vision model API base URL
    #[serde(default = "default_ai_base_url")]
    pub ai_base_url: String,

    /// Default vision model, overridable per request
    #[serde(default = "default_ai_model")]
    pub ai_model: String,

    /// Fallback API key when a request carries no `x-api-key` header
    pub ai_api_key: Option<String>,

    /// Per-request timeout for model calls, in seconds
    #[serde(default = "default_ai_timeout_secs")]
    pub ai_timeout_secs: u64,

    /// Images larger than this (longest side, pixels) are downscaled before upload
    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u32,
}

/// Connection settings for the durable backend, present only when fully configured.
#[derive(Debug, Clone, PartialEq)]
pub struct DurableBackend<'a> {
    pub database_url: &'a str,
    pub s3_bucket: &'a str,
    pub s3_endpoint: &'a str,
    pub s3_access_key: &'a str,
    pub s3_secret_key: &'a str,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_ai_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_ai_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_ai_timeout_secs() -> u64 {
    120
}

fn default_max_image_dimension() -> u32 {
    1536
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn durable_backend(&self) -> Option<DurableBackend<'_>> {
        Some(DurableBackend {
            database_url: self.database_url.as_deref()?,
            s3_bucket: self.s3_bucket.as_deref()?,
            s3_endpoint: self.s3_endpoint.as_deref()?,
            s3_access_key: self.s3_access_key.as_deref()?,
            s3_secret_key: self.s3_secret_key.as_deref()?,
        })
    }
}
