//! # reviewer-migrate
//!
//! Copy, move and export Reviewer Workspace session records.
//!
//! This library provides:
//!
//! - **Schema detection** of pre-10.3, pre-10.6 and 10.6 workspaces
//! - **Session copy** of records, geometry and run tables with identifier
//!   remapping, inside a destination edit session that rolls back on failure
//! - **Move** by deleting the copied rows from the source afterwards
//! - **Run logs** listing every old and new identifier pair
//! - **Export** of session records to GeoJSON points plus a CSV table
//!
//! ## Example
//!
//! ```rust,no_run
//! use reviewer_migrate::{CopyConfig, CopyRun};
//!
//! #[tokio::main]
//! async fn main() -> reviewer_migrate::Result<()> {
//!     let config = CopyConfig::load("copy.yaml")?;
//!     let report = CopyRun::open(config)?.run().await?;
//!     println!("Copied {} records", report.outcome.records.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod delete;
pub mod edit;
pub mod error;
pub mod export;
pub mod geometry;
pub mod orchestrator;
pub mod predicate;
pub mod runlog;
pub mod selection;
pub mod store;
pub mod transfer;
pub mod version;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{CopyConfig, CopyOptions, ExportConfig};
pub use crate::core::traits::Store;
pub use crate::core::value::{Identifier, Row, Value};
pub use error::{CopyPhase, MigrateError, Result, Warnings};
pub use export::{ExportReport, ExportRun};
pub use orchestrator::{CopyReport, CopyRun};
pub use store::JsonWorkspace;
pub use transfer::{CopyOutcome, IdentifierMap};
pub use version::{Compatibility, SchemaVersion};
