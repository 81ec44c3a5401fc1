//! Webox Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared infrastructure for the webox ETL workspace:
//!
//! - **Logging**: tracing subscriber setup shared by every binary
//! - **Text**: source-file header normalization helpers

pub mod logging;
pub mod text;
