//! Product identification and quality control
//!
//! This library tracks long-running vision-model work as background tasks.
//! It identifies products from photos or product pages and grades inspection
//! images against a product's references. QC history is kept per product.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod projection;
pub mod routes;
pub mod services;
