//! Week advance decision and the in-memory carry transform.
//!
//! The durable counterpart lives in `dw-store`; both must agree on which
//! demands move, so the predicate is shared through [`carries`].

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::{Demand, DomainError, Status, Week};

/// Outcome of comparing "now" against the active week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RolloverDecision {
    /// Still inside the active week (or `now` lies before it).
    Stay,
    /// The active week has ended; `next` is the week containing `now`.
    Advance { next: Week },
}

/// Decide whether the active week must change at `now`.
///
/// Rollover triggers once the calendar day of `now` is after `endDate`; the
/// target is recomputed from `now`, so repeated calls converge on the same
/// week and a target equal to the current key is reported as `Stay`.
pub fn decide(current: &Week, now: NaiveDateTime) -> Result<RolloverDecision, DomainError> {
    let today = now.date();
    if !current.has_ended_by(today) {
        return Ok(RolloverDecision::Stay);
    }
    let next = Week::containing(today)?;
    if next.key == current.key {
        return Ok(RolloverDecision::Stay);
    }
    Ok(RolloverDecision::Advance { next })
}

/// True when `demand` moves from `previous_key` into the next week.
pub fn carries(demand: &Demand, previous_key: &str) -> bool {
    demand.week_key == previous_key && demand.status != Status::Done
}

/// Apply the carry to an in-memory list. Returns how many demands moved.
pub fn carry_forward(demands: &mut [Demand], previous_key: &str, next: &Week) -> usize {
    if previous_key == next.key {
        return 0;
    }
    let mut moved = 0;
    for demand in demands.iter_mut().filter(|d| carries(d, previous_key)) {
        demand.week_key = next.key.clone();
        demand.status = Status::Urgent;
        demand.carried_over = true;
        moved += 1;
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewDemand, Priority};
    use chrono::{NaiveDate, Utc};

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn w1() -> Week {
        Week::from_key("2024-01-01_2024-01-07").unwrap()
    }

    fn demand(title: &str, status: Status) -> Demand {
        let mut d = NewDemand::new(title, "Acme", Priority::High, w1().key)
            .into_demand(Utc::now())
            .unwrap();
        d.status = status;
        d
    }

    #[test]
    fn stays_within_the_week_including_sunday_evening() {
        assert_eq!(decide(&w1(), at(2024, 1, 3, 9)).unwrap(), RolloverDecision::Stay);
        assert_eq!(decide(&w1(), at(2024, 1, 7, 23)).unwrap(), RolloverDecision::Stay);
    }

    #[test]
    fn advances_to_the_week_containing_now() {
        match decide(&w1(), at(2024, 1, 10, 8)).unwrap() {
            RolloverDecision::Advance { next } => {
                assert_eq!(next.key, "2024-01-08_2024-01-14");
            }
            other => panic!("expected advance, got {other:?}"),
        }
        // Skipped weeks jump straight to the week of `now`.
        match decide(&w1(), at(2024, 2, 1, 8)).unwrap() {
            RolloverDecision::Advance { next } => {
                assert_eq!(next.key, "2024-01-29_2024-02-04");
            }
            other => panic!("expected advance, got {other:?}"),
        }
    }

    #[test]
    fn deciding_again_from_the_new_week_is_a_no_op() {
        let now = at(2024, 1, 10, 8);
        let RolloverDecision::Advance { next } = decide(&w1(), now).unwrap() else {
            panic!("expected advance");
        };
        assert_eq!(decide(&next, now).unwrap(), RolloverDecision::Stay);
    }

    #[test]
    fn carry_forward_moves_only_pending_work() {
        let next = w1().next().unwrap();
        let mut demands = vec![
            demand("open", Status::Open),
            demand("urgent", Status::Urgent),
            demand("done", Status::Done),
        ];
        let mut elsewhere = demand("other week", Status::Open);
        elsewhere.week_key = "2023-12-25_2023-12-31".into();
        demands.push(elsewhere.clone());
        let done_before = demands[2].clone();

        let moved = carry_forward(&mut demands, &w1().key, &next);
        assert_eq!(moved, 2);
        for d in &demands[..2] {
            assert_eq!(d.week_key, next.key);
            assert_eq!(d.status, Status::Urgent);
            assert!(d.carried_over);
        }
        assert_eq!(demands[2], done_before);
        assert_eq!(demands[3], elsewhere);

        assert_eq!(carry_forward(&mut demands, &next.key, &next), 0);
    }
}
