//! Read-only views over the working copy: the current week board, the
//! history grouped by week, and per-client summaries.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use dw_core::{Demand, Priority, Status, Week};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusFilter {
    #[default]
    Any,
    Open,
    Urgent,
    Done,
    /// Open or urgent.
    NotDone,
}

impl StatusFilter {
    pub fn matches(self, status: Status) -> bool {
        match self {
            StatusFilter::Any => true,
            StatusFilter::Open => status == Status::Open,
            StatusFilter::Urgent => status == Status::Urgent,
            StatusFilter::Done => status == Status::Done,
            StatusFilter::NotDone => status.is_pending(),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" | "all" => Ok(StatusFilter::Any),
            "open" => Ok(StatusFilter::Open),
            "urgent" => Ok(StatusFilter::Urgent),
            "done" => Ok(StatusFilter::Done),
            "not-done" | "not_done" | "pending" => Ok(StatusFilter::NotDone),
            other => Err(format!(
                "unknown status filter '{other}' (expected any|open|urgent|done|not-done)"
            )),
        }
    }
}

/// Structured filter applied on top of an optional text match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandFilter {
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub status: StatusFilter,
    #[serde(default)]
    pub week_key: Option<String>,
}

impl DemandFilter {
    pub fn matches(&self, demand: &Demand) -> bool {
        self.client.as_deref().is_none_or(|c| demand.client == c)
            && self.priority.is_none_or(|p| demand.priority == p)
            && self.status.matches(demand.status)
            && self
                .week_key
                .as_deref()
                .is_none_or(|k| demand.week_key == k)
    }
}

/// How a free-text query narrows a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextScope {
    All,
    /// Ids returned by the store search.
    Ids(BTreeSet<String>),
    /// Lowercased needle matched against title, description and client; used
    /// when the store search itself failed.
    Substring(String),
}

impl TextScope {
    pub fn substring(query: &str) -> Self {
        TextScope::Substring(query.trim().to_lowercase())
    }

    pub fn matches(&self, demand: &Demand) -> bool {
        match self {
            TextScope::All => true,
            TextScope::Ids(ids) => ids.contains(&demand.id),
            TextScope::Substring(needle) => [
                demand.title.as_str(),
                demand.description.as_deref().unwrap_or(""),
                demand.client.as_str(),
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(needle.as_str())),
        }
    }
}

/// The active week split into pending and completed work, each in
/// descending `sort_order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekView {
    pub week: Week,
    pub client_filter: Option<String>,
    pub in_progress: Vec<Demand>,
    pub done: Vec<Demand>,
}

pub fn week_view(
    demands: &[Demand],
    week: &Week,
    client_filter: Option<&str>,
    text: &TextScope,
) -> WeekView {
    let (done, in_progress): (Vec<Demand>, Vec<Demand>) = sorted_by_order(
        demands
            .iter()
            .filter(|d| d.week_key == week.key)
            .filter(|d| client_filter.is_none_or(|c| d.client == c))
            .filter(|d| text.matches(d)),
    )
    .into_iter()
    .partition(|d| d.status == Status::Done);
    WeekView {
        week: week.clone(),
        client_filter: client_filter.map(str::to_string),
        in_progress,
        done,
    }
}

pub fn select(demands: &[Demand], filter: &DemandFilter, text: &TextScope) -> Vec<Demand> {
    sorted_by_order(
        demands
            .iter()
            .filter(|d| filter.matches(d) && text.matches(d)),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekGroup {
    pub week_key: String,
    pub demands: Vec<Demand>,
}

/// Matching demands grouped by week, oldest week first.
pub fn history(demands: &[Demand], filter: &DemandFilter, text: &TextScope) -> Vec<WeekGroup> {
    let mut groups: BTreeMap<String, Vec<Demand>> = BTreeMap::new();
    for d in select(demands, filter, text) {
        groups.entry(d.week_key.clone()).or_default().push(d);
    }
    groups
        .into_iter()
        .map(|(week_key, demands)| WeekGroup { week_key, demands })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientOrder {
    /// Most demands first.
    #[default]
    Count,
    Name,
    /// Highest summed priority weight first.
    Priority,
}

impl FromStr for ClientOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "count" | "qty" => Ok(ClientOrder::Count),
            "name" => Ok(ClientOrder::Name),
            "priority" => Ok(ClientOrder::Priority),
            other => Err(format!(
                "unknown order '{other}' (expected count|name|priority)"
            )),
        }
    }
}

impl fmt::Display for ClientOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClientOrder::Count => "count",
            ClientOrder::Name => "name",
            ClientOrder::Priority => "priority",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSummary {
    pub client: String,
    pub total: usize,
    pub urgent: usize,
    pub done: usize,
    pub priority_score: u32,
}

/// Per-client counts over every demand matching `text`. Ties keep name order.
pub fn client_summaries(
    demands: &[Demand],
    text: &TextScope,
    order: ClientOrder,
) -> Vec<ClientSummary> {
    let mut by_client: BTreeMap<&str, ClientSummary> = BTreeMap::new();
    for d in demands.iter().filter(|d| text.matches(d)) {
        let entry = by_client
            .entry(d.client.as_str())
            .or_insert_with(|| ClientSummary {
                client: d.client.clone(),
                total: 0,
                urgent: 0,
                done: 0,
                priority_score: 0,
            });
        entry.total += 1;
        entry.priority_score += d.priority.weight();
        match d.status {
            Status::Urgent => entry.urgent += 1,
            Status::Done => entry.done += 1,
            Status::Open => {}
        }
    }
    let mut out: Vec<ClientSummary> = by_client.into_values().collect();
    match order {
        ClientOrder::Count => out.sort_by(|a, b| b.total.cmp(&a.total)),
        ClientOrder::Priority => out.sort_by(|a, b| b.priority_score.cmp(&a.priority_score)),
        ClientOrder::Name => out.sort_by(|a, b| {
            a.client
                .to_lowercase()
                .cmp(&b.client.to_lowercase())
                .then_with(|| a.client.cmp(&b.client))
        }),
    }
    out
}

fn sorted_by_order<'a>(demands: impl Iterator<Item = &'a Demand>) -> Vec<Demand> {
    let mut out: Vec<Demand> = demands.cloned().collect();
    out.sort_by(|a, b| b.sort_order.cmp(&a.sort_order));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use dw_core::NewDemand;

    const W1: &str = "2024-01-01_2024-01-07";
    const W2: &str = "2024-01-08_2024-01-14";

    fn demand(title: &str, client: &str, priority: Priority, week: &str, order: i64) -> Demand {
        let mut new = NewDemand::new(title, client, priority, week);
        new.sort_order = Some(order);
        new.into_demand(Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap())
            .unwrap()
    }

    fn sample() -> Vec<Demand> {
        let mut a = demand("Fix login", "Acme", Priority::High, W1, 1);
        a.status = Status::Done;
        let b = demand("Invoice run", "Globex", Priority::Low, W1, 2);
        let mut c = demand("Carry me", "Acme", Priority::Medium, W2, 3);
        c.status = Status::Urgent;
        c.carried_over = true;
        let d = demand("Plan sprint", "Acme", Priority::Low, W2, 4);
        vec![a, b, c, d]
    }

    #[test]
    fn status_filter_parses_aliases() {
        assert_eq!("pending".parse::<StatusFilter>(), Ok(StatusFilter::NotDone));
        assert_eq!("ALL".parse::<StatusFilter>(), Ok(StatusFilter::Any));
        assert!("later".parse::<StatusFilter>().is_err());
        assert!(StatusFilter::NotDone.matches(Status::Urgent));
        assert!(!StatusFilter::NotDone.matches(Status::Done));
    }

    #[test]
    fn week_view_splits_and_orders() {
        let week = Week::from_key(W2).unwrap();
        let view = week_view(&sample(), &week, None, &TextScope::All);
        let titles: Vec<_> = view.in_progress.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, ["Plan sprint", "Carry me"]);
        assert!(view.done.is_empty());

        let w1 = Week::from_key(W1).unwrap();
        let view = week_view(&sample(), &w1, Some("Acme"), &TextScope::All);
        assert!(view.in_progress.is_empty());
        assert_eq!(view.done.len(), 1);
    }

    #[test]
    fn history_groups_oldest_week_first() {
        let filter = DemandFilter {
            client: Some("Acme".into()),
            ..Default::default()
        };
        let groups = history(&sample(), &filter, &TextScope::All);
        let keys: Vec<_> = groups.iter().map(|g| g.week_key.as_str()).collect();
        assert_eq!(keys, [W1, W2]);
        assert_eq!(groups[1].demands[0].title, "Plan sprint");

        let done_only = DemandFilter {
            status: StatusFilter::Done,
            ..Default::default()
        };
        let groups = history(&sample(), &done_only, &TextScope::All);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].demands[0].title, "Fix login");
    }

    #[test]
    fn substring_scope_is_case_insensitive() {
        let scope = TextScope::substring("  INVOICE ");
        let hits = select(&sample(), &DemandFilter::default(), &scope);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].client, "Globex");
    }

    #[test]
    fn summaries_rank_by_requested_order() {
        let by_count = client_summaries(&sample(), &TextScope::All, ClientOrder::Count);
        assert_eq!(
            by_count[0],
            ClientSummary {
                client: "Acme".into(),
                total: 3,
                urgent: 1,
                done: 1,
                priority_score: 3 + 2 + 1,
            }
        );
        let by_name = client_summaries(&sample(), &TextScope::All, ClientOrder::Name);
        assert_eq!(by_name[1].client, "Globex");
        let by_priority = client_summaries(&sample(), &TextScope::All, ClientOrder::Priority);
        assert_eq!(by_priority[1].priority_score, 1);
    }
}
