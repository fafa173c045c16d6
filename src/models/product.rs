use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};
use uuid::Uuid;

use super::image::ImageId;

/// Structured identification of a product, produced by the vision model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ProductProfile {
    #[garde(length(min = 1, max = 200))]
    pub name: String,

    #[garde(length(max = 200))]
    #[serde(default)]
    pub brand: Option<String>,

    #[garde(length(max = 200))]
    #[serde(default)]
    pub category: Option<String>,

    #[garde(skip)]
    #[serde(default)]
    pub description: Option<String>,

    #[garde(skip)]
    #[serde(default)]
    pub materials: Vec<String>,

    #[garde(skip)]
    #[serde(default)]
    pub key_features: Vec<String>,

    #[garde(skip)]
    #[serde(default)]
    pub specifications: BTreeMap<String, String>,
}

impl ProductProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            brand: None,
            category: None,
            description: None,
            materials: Vec::new(),
            key_features: Vec::new(),
            specifications: BTreeMap::new(),
        }
    }
}

/// A timestamped group of inspection images submitted in one QC run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcBatch {
    pub id: Uuid,
    pub image_ids: Vec<ImageId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Verdict {
    Pass,
    Caution,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ReportSection {
    #[garde(length(min = 1, max = 200))]
    pub title: String,

    #[garde(range(max = 100))]
    pub score: u8,

    #[garde(skip)]
    #[serde(default)]
    pub findings: Vec<String>,
}

/// Scored, sectioned output of a cumulative QC analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct QcReport {
    #[garde(skip)]
    pub id: Uuid,

    #[garde(skip)]
    pub generated_at: DateTime<Utc>,

    #[garde(range(max = 100))]
    pub overall_score: u8,

    #[garde(skip)]
    pub verdict: Verdict,

    #[garde(skip)]
    #[serde(default)]
    pub summary: String,

    #[garde(dive)]
    #[serde(default)]
    pub sections: Vec<ReportSection>,
}

/// A product with its reference images and append-only QC history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub profile: ProductProfile,
    pub reference_image_ids: Vec<ImageId>,
    pub qc_batches: Vec<QcBatch>,
    pub reports: Vec<QcReport>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(profile: ProductProfile, reference_image_ids: Vec<ImageId>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            profile,
            reference_image_ids,
            qc_batches: Vec::new(),
            reports: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Every inspection image id across all batches, oldest batch first.
    pub fn inspection_history(&self) -> impl Iterator<Item = &ImageId> {
        self.qc_batches.iter().flat_map(|b| b.image_ids.iter())
    }

    /// Append one QC run's batch and report. History is never rewritten.
    pub fn record_qc(&mut self, batch: QcBatch, report: QcReport) {
        self.qc_batches.push(batch);
        self.reports.push(report);
        self.updated_at = Utc::now();
    }

    /// Reference and inspection image ids together.
    pub fn image_ids(&self) -> Vec<ImageId> {
        self.reference_image_ids
            .iter()
            .chain(self.inspection_history())
            .copied()
            .collect()
    }

    pub fn latest_report(&self) -> Option<&QcReport> {
        self.reports.last()
    }
}
