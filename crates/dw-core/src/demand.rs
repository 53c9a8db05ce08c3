//! Demand records and the status state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// Weight used when ranking clients by pending priority.
    pub fn weight(self) -> u32 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(DomainError::UnknownPriority(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Open,
    Done,
    Urgent,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Open => "open",
            Status::Done => "done",
            Status::Urgent => "urgent",
        }
    }

    /// Open and urgent both count as pending work.
    pub fn is_pending(self) -> bool {
        !matches!(self, Status::Done)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Status {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Status::Open),
            "done" => Ok(Status::Done),
            "urgent" => Ok(Status::Urgent),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// A tracked task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Demand {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub client: String,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub status: Status,
    pub week_key: String,
    #[serde(default)]
    pub carried_over: bool,
    pub sort_order: i64,
}

/// Fields supplied by the caller when adding a demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDemand {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub client: String,
    pub priority: Priority,
    pub week_key: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sort_order: Option<i64>,
}

impl NewDemand {
    pub fn new(
        title: impl Into<String>,
        client: impl Into<String>,
        priority: Priority,
        week_key: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: None,
            client: client.into(),
            priority,
            week_key: week_key.into(),
            created_at: None,
            sort_order: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Validate and materialize the record with a fresh id. New demands
    /// always start `open` and not carried.
    pub fn into_demand(self, now: DateTime<Utc>) -> Result<Demand, DomainError> {
        let title = required_text("title", &self.title)?;
        let client = required_text("client", &self.client)?;
        if self.week_key.trim().is_empty() {
            return Err(DomainError::EmptyField("weekKey"));
        }
        let created_at = self.created_at.unwrap_or(now);
        Ok(Demand {
            id: Uuid::new_v4().to_string(),
            title,
            description: normalize_description(self.description),
            client,
            priority: self.priority,
            created_at,
            status: Status::Open,
            week_key: self.week_key,
            carried_over: false,
            sort_order: self.sort_order.unwrap_or_else(|| created_at.timestamp_millis()),
        })
    }
}

/// Partial update for `edit`. `description: Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandChanges {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl DemandChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.client.is_none()
            && self.priority.is_none()
    }

    /// True when the change touches fields mirrored by the search index.
    pub fn touches_search_text(&self) -> bool {
        self.title.is_some() || self.description.is_some() || self.client.is_some()
    }
}

impl Demand {
    /// Apply an edit. Validation happens before any field is written, so a
    /// rejected edit leaves the record untouched.
    pub fn apply(&mut self, changes: &DemandChanges) -> Result<(), DomainError> {
        let title = changes
            .title
            .as_deref()
            .map(|t| required_text("title", t))
            .transpose()?;
        let client = changes
            .client
            .as_deref()
            .map(|c| required_text("client", c))
            .transpose()?;
        if let Some(title) = title {
            self.title = title;
        }
        if let Some(client) = client {
            self.client = client;
        }
        if let Some(description) = &changes.description {
            self.description = normalize_description(description.clone());
        }
        if let Some(priority) = changes.priority {
            self.priority = priority;
        }
        Ok(())
    }

    /// Resolve a user-requested status change.
    ///
    /// Users may complete or reopen a demand; `urgent` is only ever assigned
    /// by rollover. Reopening a carried demand lands on `urgent`.
    pub fn requested_status(&self, requested: Status) -> Result<Status, DomainError> {
        match (self.status, requested) {
            (current, wanted) if current == wanted => Ok(current),
            (_, Status::Done) => Ok(Status::Done),
            (Status::Done, Status::Open) if self.carried_over => Ok(Status::Urgent),
            (Status::Done, Status::Open) => Ok(Status::Open),
            (Status::Urgent, Status::Open) => Ok(Status::Urgent),
            (from, to) => Err(DomainError::InvalidTransition { from, to }),
        }
    }

    /// RFC 3339 in UTC, with as many fractional digits as the value needs.
    pub fn created_at_iso(&self) -> String {
        self.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
}

fn required_text(field: &'static str, raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::EmptyField(field));
    }
    Ok(trimmed.to_string())
}

fn normalize_description(raw: Option<String>) -> Option<String> {
    raw.filter(|d| !d.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demand() -> Demand {
        NewDemand::new("Fix login", "Acme", Priority::High, "2024-01-01_2024-01-07")
            .into_demand(Utc::now())
            .unwrap()
    }

    #[test]
    fn into_demand_assigns_defaults() {
        let now = DateTime::parse_from_rfc3339("2024-01-02T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let d = NewDemand::new("  Fix login ", "Acme", Priority::High, "2024-01-01_2024-01-07")
            .with_description("   ")
            .into_demand(now)
            .unwrap();
        assert_eq!(d.title, "Fix login");
        assert_eq!(d.status, Status::Open);
        assert!(!d.carried_over);
        assert_eq!(d.description, None);
        assert_eq!(d.created_at, now);
        assert_eq!(d.sort_order, now.timestamp_millis());
        assert_eq!(d.created_at_iso(), "2024-01-02T10:00:00Z");
        assert!(Uuid::parse_str(&d.id).is_ok());
    }

    #[test]
    fn into_demand_rejects_blank_title_and_client() {
        let err = NewDemand::new(" ", "Acme", Priority::Low, "k")
            .into_demand(Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::EmptyField("title")));
        let err = NewDemand::new("t", "", Priority::Low, "k")
            .into_demand(Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::EmptyField("client")));
    }

    #[test]
    fn ids_are_unique() {
        let a = demand();
        let b = demand();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn apply_is_all_or_nothing() {
        let mut d = demand();
        let before = d.clone();
        let bad = DemandChanges {
            title: Some("New title".into()),
            client: Some("  ".into()),
            ..Default::default()
        };
        assert!(d.apply(&bad).is_err());
        assert_eq!(d, before);

        let good = DemandChanges {
            title: Some("New title".into()),
            description: Some(Some("**bold**".into())),
            priority: Some(Priority::Low),
            ..Default::default()
        };
        d.apply(&good).unwrap();
        assert_eq!(d.title, "New title");
        assert_eq!(d.description.as_deref(), Some("**bold**"));
        assert_eq!(d.priority, Priority::Low);

        d.apply(&DemandChanges {
            description: Some(None),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(d.description, None);
    }

    #[test]
    fn status_transitions_follow_the_state_machine() {
        let mut d = demand();
        assert_eq!(d.requested_status(Status::Done).unwrap(), Status::Done);
        assert!(matches!(
            d.requested_status(Status::Urgent),
            Err(DomainError::InvalidTransition { .. })
        ));

        d.status = Status::Done;
        assert_eq!(d.requested_status(Status::Open).unwrap(), Status::Open);
        d.carried_over = true;
        assert_eq!(d.requested_status(Status::Open).unwrap(), Status::Urgent);

        d.status = Status::Urgent;
        assert_eq!(d.requested_status(Status::Done).unwrap(), Status::Done);
        assert_eq!(d.requested_status(Status::Urgent).unwrap(), Status::Urgent);
        assert_eq!(d.requested_status(Status::Open).unwrap(), Status::Urgent);
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(" done ".parse::<Status>().unwrap(), Status::Done);
        assert!("later".parse::<Status>().is_err());
        assert_eq!(serde_json::to_string(&Status::Urgent).unwrap(), "\"urgent\"");
    }
}
