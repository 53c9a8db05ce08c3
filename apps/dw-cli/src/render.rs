use std::fmt::Write as _;

use anyhow::Result;
use dw_core::{Demand, Status, Week};
use dw_session::{ClientSummary, WeekGroup, WeekView};
use dw_store::{RolloverReport, SearchHits, SearchPath};
use serde::Serialize;

pub(crate) fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Print `value` as pretty JSON in `--json` mode, otherwise the text form.
pub(crate) fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        let out = text();
        if !out.is_empty() {
            println!("{}", out.trim_end());
        }
    }
    Ok(())
}

pub(crate) fn demand_line(d: &Demand) -> String {
    let mark = match d.status {
        Status::Done => "x",
        Status::Urgent => "!",
        Status::Open => " ",
    };
    let carried = if d.carried_over { " (carried)" } else { "" };
    format!(
        "[{mark}] {}  {:<6}  {}: {}{carried}",
        short_id(&d.id),
        d.priority,
        d.client,
        d.title
    )
}

pub(crate) fn demand_detail(d: &Demand) -> String {
    let mut out = demand_line(d);
    let _ = write!(
        out,
        "\n    id: {}\n    week: {}\n    status: {}\n    created: {}",
        d.id,
        d.week_key,
        d.status,
        d.created_at_iso()
    );
    if let Some(desc) = &d.description {
        let _ = write!(out, "\n    description: {desc}");
    }
    out
}

pub(crate) fn week_label(w: &Week) -> String {
    format!("{} .. {}", w.start_date, w.end_date)
}

pub(crate) fn board(view: &WeekView) -> String {
    let mut out = format!("Week {}", week_label(&view.week));
    if let Some(client) = &view.client_filter {
        let _ = write!(out, "  (client: {client})");
    }
    let _ = write!(out, "\nIn progress ({}):", view.in_progress.len());
    for d in &view.in_progress {
        let _ = write!(out, "\n  {}", demand_line(d));
    }
    let _ = write!(out, "\nDone ({}):", view.done.len());
    for d in &view.done {
        let _ = write!(out, "\n  {}", demand_line(d));
    }
    out
}

pub(crate) fn history(groups: &[WeekGroup]) -> String {
    if groups.is_empty() {
        return "No demands match.".to_string();
    }
    let mut out = String::new();
    for g in groups {
        let _ = writeln!(out, "Week {}", g.week_key.replace('_', " .. "));
        for d in &g.demands {
            let _ = writeln!(out, "  {}", demand_line(d));
        }
    }
    out
}

pub(crate) fn summaries(rows: &[ClientSummary]) -> String {
    let mut out = String::new();
    for s in rows {
        let _ = writeln!(
            out,
            "{}: total {}, urgent {}, done {}, priority score {}",
            s.client, s.total, s.urgent, s.done, s.priority_score
        );
    }
    out
}

pub(crate) fn search(hits: &SearchHits, demands: &[&Demand]) -> String {
    let via = match &hits.path {
        SearchPath::Skipped => "empty query",
        SearchPath::FullText { substring_only: 0 } => "index",
        SearchPath::FullText { .. } => "index + substring",
        SearchPath::Fallback { .. } => "substring",
    };
    let mut out = format!("{} match(es) via {via}", hits.ids.len());
    for d in demands {
        let _ = write!(out, "\n  {}", demand_line(d));
    }
    out
}

pub(crate) fn rollover(report: &RolloverReport) -> String {
    if report.already_current {
        return format!("Week {} is already current.", week_label(&report.week));
    }
    format!(
        "Now on week {}; carried {} demand(s) from {}.",
        week_label(&report.week),
        report.carried,
        report.previous_key.replace('_', " .. ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use dw_core::{NewDemand, Priority};

    #[test]
    fn demand_line_marks_status_and_carry() {
        let mut d = NewDemand::new("Fix login", "Acme", Priority::High, "2024-01-01_2024-01-07")
            .into_demand(Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap())
            .unwrap();
        d.id = "0123456789abcdef".into();
        assert_eq!(demand_line(&d), "[ ] 01234567  high    Acme: Fix login");
        d.status = Status::Urgent;
        d.carried_over = true;
        assert_eq!(
            demand_line(&d),
            "[!] 01234567  high    Acme: Fix login (carried)"
        );
        assert_eq!(short_id("abc"), "abc");
    }
}
