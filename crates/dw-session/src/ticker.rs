//! Periodic auto-advance loop.

use std::future::Future;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::session::Session;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickerStats {
    pub ticks: u64,
    pub advanced: u64,
    pub failures: u64,
}

/// Call [`Session::check_auto_advance`] every `every` until `shutdown`
/// resolves. The first check runs immediately.
///
/// The loop owns the session for its lifetime, so checks never interleave
/// with other commands. Errors are logged and the next tick retries.
pub async fn run_auto_advance<C, S>(
    session: &mut Session,
    every: Duration,
    mut clock: C,
    shutdown: S,
) -> TickerStats
where
    C: FnMut() -> NaiveDateTime,
    S: Future<Output = ()>,
{
    let mut stats = TickerStats::default();
    let mut tick = tokio::time::interval(every.max(Duration::from_millis(1)));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tick.tick() => {
                stats.ticks += 1;
                match session.check_auto_advance(clock()).await {
                    Ok(Some(report)) => {
                        stats.advanced += 1;
                        tracing::info!(
                            week = %report.week.key,
                            carried = report.carried,
                            "auto-advanced week"
                        );
                    }
                    Ok(None) => {}
                    Err(err) => {
                        stats.failures += 1;
                        tracing::warn!(%err, "auto-advance check failed; retrying next tick");
                    }
                }
            }
        }
    }
    tracing::debug!(?stats, "auto-advance loop stopped");
    stats
}
