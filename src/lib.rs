// src/lib.rs
//
// Profile snapshot reconciliation against a rate-limited tabular store:
// identity-keyed upserts with a head-of-table ordering invariant, field
// diffs recorded as cell notes, seen-count and run-metric trackers, and
// adaptive pacing of every store mutation.

pub mod constants;
pub mod diff;
pub mod index;
pub mod json_store;
pub mod rate;
pub mod schema;
pub mod source;
pub mod store;
pub mod sync;
pub mod trackers;

pub use index::{DataQualityWarning, IdentityIndex, IndexedRecord};
pub use json_store::JsonStore;
pub use rate::{AdaptiveRateController, RateState};
pub use schema::{identity_key, FieldId, ProfileRecord, Schema};
pub use source::{JsonlSource, RecordSource, VecSource};
pub use store::{CellNote, MemoryStore, ProfileStore, Row, StoreError, StoreResult};
pub use sync::{
    CliLogger, RunLogger, RunStats, SyncConfig, SyncEngine, SyncError, UpdatePlacement,
    UpsertOutcome, UpsertStatus,
};
pub use trackers::{MetricsTracker, SeenEntry, SeenTracker};
