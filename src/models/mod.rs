pub mod api;
pub mod image;
pub mod product;
pub mod settings;
pub mod task;

pub use image::{ImageData, ImageId};
pub use product::{Product, ProductProfile, QcBatch, QcReport, ReportSection, Verdict};
pub use settings::{AnalysisSettings, Credentials, Strictness};
pub use task::{
    BackgroundTask, FailureKind, TaskError, TaskId, TaskKind, TaskMeta, TaskOutput, TaskState,
    TaskStatus, TaskUpdate,
};
