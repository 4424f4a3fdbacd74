//! `waterwise-telemetry`: ingestion backend for flood-risk sensor telemetry.
//!
//! Sensors post readings and alerts; each submission is written to the
//! primary PostgreSQL store, or to a bounded local JSON ledger when the
//! primary store cannot take it. Reads follow the same preference order.
//!
//! Module layout follows the Explicit Module Boundary Pattern (EMBP): the
//! crate root re-exports what sibling modules need, so `routes/*.rs` only
//! know about their parent, never about each other.

mod cache;
mod config;
mod dashboard;
mod error;
mod fallback;
mod models;
mod schema;
mod validate;

pub mod ingest;
pub mod primary;
pub mod query;
pub mod routes;

pub use cache::ReadThroughCache;
pub use config::{load_from_env, Config, DashboardTtls, PrimaryBackend, PrimaryConfig, ProvenanceDefaults};
pub use dashboard::{DashboardReader, DashboardSummary};
pub use error::{FallbackError, IngestError, PrimaryError, ReplayError, ValidationError};
pub use fallback::{FallbackStore, Ledger, RetentionPolicy};
pub use models::{NewAlert, NewReading, Severity, StorageTag, StoredAlert, StoredReading};
pub use primary::{DisabledPrimary, MemoryPrimary, PgPrimaryStore, PrimaryStore};
pub use routes::{router, AppState};
