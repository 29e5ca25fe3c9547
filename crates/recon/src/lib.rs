//! `purelink-recon`: project/publication relation reconciliation engine.
//!
//! Takes pre-loaded CSV rows and a [`Registry`] implementation, decides one
//! [`Outcome`] per row, and (unless dry-running) adds the missing relations.
//! No HTTP or CLI dependencies; the Pure adapter lives in
//! `purelink-pure-client`.

pub mod audit;
pub mod config;
pub mod doi;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod export;
pub mod input;
pub mod inspect;
pub mod memory;
pub mod model;
pub mod registry;
pub mod resolve;
pub mod writeback;

pub use audit::{AuditError, AuditSink, JsonlAuditLog, MemoryAuditLog};
pub use config::ReconConfig;
pub use engine::{BatchOptions, ReconciliationEngine, StopFlag};
pub use error::ReconError;
pub use evidence::compute_summary;
pub use input::{load_csv_rows, InputBatch};
pub use memory::MemoryRegistry;
pub use model::{
    BatchReport, BatchSummary, Decision, IdentifierScheme, InputRow, Outcome, SchemeField,
    WritebackLogEntry,
};
pub use registry::{RecordId, Registry, RegistryError};
