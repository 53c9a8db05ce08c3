//! Durable week advance driven by the stored current-week pointer.

use chrono::NaiveDateTime;
use dw_core::rollover::{decide, RolloverDecision};
use serde::Serialize;

use crate::error::StoreResult;
use crate::store::{RolloverReport, Store};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    /// No pointer is stored yet; nothing to advance from.
    NoCurrentWeek,
    /// The stored week is still active at `now`.
    Stay { week_key: String },
    Advanced(RolloverReport),
}

/// Read the pointer, decide against `now` (local wall-clock time) and roll
/// over if the stored week has ended.
///
/// A malformed pointer fails with `StoreError::Corrupt`; callers on a timer
/// should log it and try again on the next tick.
pub fn check_and_advance(store: &Store, now: NaiveDateTime) -> StoreResult<AdvanceOutcome> {
    let Some(current) = store.current_week()? else {
        return Ok(AdvanceOutcome::NoCurrentWeek);
    };
    match decide(&current, now)? {
        RolloverDecision::Stay => Ok(AdvanceOutcome::Stay {
            week_key: current.key,
        }),
        RolloverDecision::Advance { next } => {
            let report = store.rollover_week(&next, &current.key)?;
            Ok(AdvanceOutcome::Advanced(report))
        }
    }
}

pub async fn check_and_advance_async(
    store: &Store,
    now: NaiveDateTime,
) -> StoreResult<AdvanceOutcome> {
    let store = store.clone();
    tokio::task::spawn_blocking(move || check_and_advance(&store, now))
        .await
        .map_err(|e| crate::StoreError::Join(e.to_string()))?
}
