//! Image and product fixtures
#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

use product_qc::models::{ImageData, Product, ProductProfile, QcReport, Verdict};

/// A 1x1 PNG whose pixel colour is `tag`, so each one is distinguishable.
pub fn png(tag: u8) -> ImageData {
    let img = RgbaImage::from_pixel(1, 1, Rgba([tag, 0, 0, 255]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode fixture PNG");
    ImageData::from_bytes(bytes).expect("fixture is a PNG")
}

/// A recognizable GIF, which the service does not accept.
pub const GIF_DATA_URL: &str =
    "data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

pub fn widget_profile() -> ProductProfile {
    let mut profile = ProductProfile::named("Widget");
    profile.brand = Some("Acme".to_string());
    profile.materials = vec!["aluminium".to_string()];
    profile
}

pub fn widget() -> Product {
    Product::new(widget_profile(), vec![])
}

pub fn report(score: u8, verdict: Verdict) -> QcReport {
    QcReport {
        id: uuid::Uuid::new_v4(),
        generated_at: chrono::Utc::now(),
        overall_score: score,
        verdict,
        summary: "Finish consistent with references".to_string(),
        sections: vec![],
    }
}
