use chrono::Utc;
use garde::Validate;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use crate::models::{
    AnalysisSettings, Credentials, FailureKind, ImageData, ProductProfile, QcReport,
    ReportSection, TaskError, Verdict,
};
use crate::services::imaging::{self, ImagingError};

/// The hosted vision model, as seen by the task runner.
pub trait AnalysisService: Send + Sync + 'static {
    /// Identify a product from photos and/or a product page URL.
    fn identify(
        &self,
        credentials: &Credentials,
        images: &[ImageData],
        url: Option<&str>,
        settings: &AnalysisSettings,
    ) -> impl Future<Output = Result<ProductProfile, AnalysisError>> + Send;

    /// Grade inspection images against a product's references.
    fn analyze(
        &self,
        credentials: &Credentials,
        profile: &ProductProfile,
        reference_images: &[ImageData],
        inspection_images: &[ImageData],
        settings: &AnalysisSettings,
    ) -> impl Future<Output = Result<QcReport, AnalysisError>> + Send;
}

/// Client for the Gemini `generateContent` REST API.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    default_model: String,
    max_image_dimension: u32,
}

/// Report shape the model is asked to emit; ids and timestamps are ours.
#[derive(Deserialize)]
struct ModelReport {
    overall_score: u8,
    verdict: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    sections: Vec<ReportSection>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        default_model: &str,
        timeout: Duration,
        max_image_dimension: u32,
    ) -> Result<Self, AnalysisError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AnalysisError::Http)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model: default_model.to_string(),
            max_image_dimension,
        })
    }

    fn endpoint(&self, settings: &AnalysisSettings) -> String {
        let model = settings.model.as_deref().unwrap_or(&self.default_model);
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    /// Send one multimodal prompt and return the model's JSON text.
    async fn generate(
        &self,
        credentials: &Credentials,
        settings: &AnalysisSettings,
        prompt: String,
        images: &[ImageData],
    ) -> Result<String, AnalysisError> {
        let images = imaging::fit_all(images, self.max_image_dimension).await?;

        let mut parts = vec![json!({ "text": prompt })];
        parts.extend(images.iter().map(|img| {
            json!({
                "inline_data": {
                    "mime_type": img.mime(),
                    "data": img.to_base64(),
                }
            })
        }));

        let request_body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "temperature": 0.2
            }
        });

        let response = self
            .http
            .post(self.endpoint(settings))
            .header("x-goog-api-key", credentials.api_key())
            .json(&request_body)
            .send()
            .await
            .map_err(AnalysisError::Http)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Quota(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let generated: GenerateResponse = response.json().await.map_err(AnalysisError::Http)?;
        extract_text(generated)
    }
}

fn extract_text(response: GenerateResponse) -> Result<String, AnalysisError> {
    response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or(AnalysisError::EmptyResponse)
}

/// Models occasionally wrap JSON in a markdown fence despite the mime type.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

pub(crate) fn parse_profile(text: &str) -> Result<ProductProfile, AnalysisError> {
    let profile: ProductProfile = serde_json::from_str(strip_code_fence(text))?;
    profile
        .validate()
        .map_err(|e| AnalysisError::Invalid(e.to_string()))?;
    Ok(profile)
}

pub(crate) fn parse_report(text: &str) -> Result<QcReport, AnalysisError> {
    let raw: ModelReport = serde_json::from_str(strip_code_fence(text))?;
    let verdict = raw
        .verdict
        .parse::<Verdict>()
        .map_err(|_| AnalysisError::Invalid(format!("unknown verdict '{}'", raw.verdict)))?;

    let report = QcReport {
        id: Uuid::new_v4(),
        generated_at: Utc::now(),
        overall_score: raw.overall_score,
        verdict,
        summary: raw.summary,
        sections: raw.sections,
    };
    report
        .validate()
        .map_err(|e| AnalysisError::Invalid(e.to_string()))?;
    Ok(report)
}

fn identify_prompt(url: Option<&str>, settings: &AnalysisSettings) -> String {
    let mut prompt = String::from(concat!(
        "Identify the product shown. Return ONLY valid JSON with fields: ",
        "name, brand, category, description, materials (array of strings), ",
        "key_features (array of strings), specifications (object of string to string)."
    ));
    if let Some(url) = url {
        prompt.push_str(&format!(" The product page is at {}.", url));
    }
    prompt.push_str(&format!(" Write text values in language '{}'.", settings.language));
    prompt
}

fn analyze_prompt(
    profile: &ProductProfile,
    reference_count: usize,
    settings: &AnalysisSettings,
) -> Result<String, AnalysisError> {
    let profile_json = serde_json::to_string(profile)?;
    Ok(format!(
        concat!(
            "You are a quality-control inspector. Product profile: {}. ",
            "The first {} image(s) are reference images; the rest are inspection images. ",
            "Grade with {} strictness. Return ONLY valid JSON with fields: ",
            "overall_score (0-100), verdict (pass|caution|fail), summary, ",
            "sections (array of {{title, score (0-100), findings (array of strings)}}). ",
            "Write text values in language '{}'."
        ),
        profile_json, reference_count, settings.strictness, settings.language
    ))
}

impl AnalysisService for GeminiClient {
    async fn identify(
        &self,
        credentials: &Credentials,
        images: &[ImageData],
        url: Option<&str>,
        settings: &AnalysisSettings,
    ) -> Result<ProductProfile, AnalysisError> {
        let text = self
            .generate(credentials, settings, identify_prompt(url, settings), images)
            .await?;
        parse_profile(&text)
    }

    async fn analyze(
        &self,
        credentials: &Credentials,
        profile: &ProductProfile,
        reference_images: &[ImageData],
        inspection_images: &[ImageData],
        settings: &AnalysisSettings,
    ) -> Result<QcReport, AnalysisError> {
        let prompt = analyze_prompt(profile, reference_images.len(), settings)?;
        let all: Vec<ImageData> = reference_images
            .iter()
            .chain(inspection_images)
            .cloned()
            .collect();

        let text = self.generate(credentials, settings, prompt, &all).await?;
        parse_report(&text)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model quota exhausted: {0}")]
    Quota(String),

    #[error("Model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model returned no content")]
    EmptyResponse,

    #[error("Failed to parse model response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Model response failed validation: {0}")]
    Invalid(String),

    #[error("Image preparation failed: {0}")]
    Image(#[from] ImagingError),
}

impl From<&AnalysisError> for TaskError {
    fn from(err: &AnalysisError) -> Self {
        let kind = match err {
            AnalysisError::Http(_) => FailureKind::Network,
            AnalysisError::Quota(_) => FailureKind::Quota,
            AnalysisError::Status { status, .. } if *status >= 500 => FailureKind::Network,
            AnalysisError::Status { .. }
            | AnalysisError::EmptyResponse
            | AnalysisError::Parse(_)
            | AnalysisError::Invalid(_) => FailureKind::Model,
            AnalysisError::Image(_) => FailureKind::Internal,
        };
        TaskError::new(kind, err.to_string())
    }
}
