//! SQLite persistence for demands, weeks and metadata, with a rebuildable
//! full-text index and the durable week rollover.

mod error;
pub mod rollover;
pub mod schema;
pub mod search;
mod store;

pub use error::{StoreError, StoreResult};
pub use rollover::{check_and_advance, check_and_advance_async, AdvanceOutcome};
pub use schema::{SchemaReport, SCHEMA_VERSION};
pub use search::{FallbackReason, SearchHits, SearchPath};
pub use store::{ReplaceReport, RolloverReport, Snapshot, Store, StoreOptions};
