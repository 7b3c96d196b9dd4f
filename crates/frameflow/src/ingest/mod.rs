//! Ingest pipeline: discovery, validation, copy, record.
//!
//! The controller drives one state machine per candidate file
//! (`Discovered -> SizeStabilizing -> Validated -> Hashed ->
//! {Unchanged | Copying -> Recorded}`, `Rejected` from anywhere) and funnels
//! both scan mode and watch mode through it.

pub mod controller;
pub mod copier;
pub mod error;
pub mod index;
pub mod types;

pub use controller::IntakeController;
pub use copier::AssetCopier;
pub use error::{IngestError, ProcessingError};
pub use index::{AssetIndex, AssetIndexBuilder, AssetRecord};
pub use types::{BatchReport, FileOutcome, RejectReason};
