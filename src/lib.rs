//! pgsleuth - PostgreSQL statement insight library.
//!
//! Inspects a running PostgreSQL server and turns its statement
//! statistics into structured advice:
//!
//! - `collector` - connection handling, capability probing, ranked
//!   statement collection, safe plan collection, table/index snapshots
//! - `analysis` - plan signal extraction, advice synthesis, findings
//! - `models` - plain data records shared across the pipeline
//! - `report` - per-database orchestration and report assembly

pub mod analysis;
pub mod collector;
pub mod models;
pub mod report;
