//! Alert detection and deduplication.
//!
//! A scan walks every tenant, loads a bounded window of that tenant's sales,
//! competitor snapshots, and SKUs, and evaluates each `Rule` over the window.
//! Each rule yields alert `Candidate`s, which are inserted into the `Store`.
//!
//! Alerts are deduplicated solely by their `dedupe_key`, which the store must
//! enforce as unique per tenant. There's no "does this alert exist?" pre-check:
//! repeated or concurrent scans race to insert, the first insert wins, and the
//! rest observe `InsertOutcome::DuplicateKey`. This keeps the scan stateless
//! between invocations.
mod memory;
mod pg;
pub mod rules;
mod scan;
mod store;

pub use memory::{Faults, MemoryStore};
pub use pg::{apply_schema, PgStore, SCHEMA};
pub use rules::{Candidate, Rule, TenantWindow};
pub use scan::{ScanSummary, Scanner, TenantSummary};
pub use store::{InsertOutcome, Store, StoreError};
