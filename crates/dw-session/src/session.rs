//! The working copy and the command surface used by front ends.
//!
//! Each mutating command validates first (rejections leave everything as it
//! was), then updates the in-memory copy, then writes through to the store.
//! Write failures are reported in [`Applied::persist_error`] and do not undo
//! the in-memory change.

use chrono::{NaiveDateTime, NaiveTime, Utc};
use dw_core::rollover::carry_forward;
use dw_core::{
    Demand, DemandChanges, DomainError, NewDemand, Priority, Settings, Status, Week,
    META_CLIENTS, META_FILTER_CLIENT, META_SETTINGS,
};
use dw_store::{AdvanceOutcome, RolloverReport, SearchHits, Snapshot, Store, StoreError};

use crate::clients;
use crate::error::{Applied, SessionError, SessionResult};
use crate::query::{self, ClientOrder, ClientSummary, DemandFilter, TextScope, WeekGroup, WeekView};

pub struct Session {
    store: Store,
    demands: Vec<Demand>,
    weeks: Vec<Week>,
    current_week: Week,
    settings: Settings,
    /// Used when the store holds no settings blob.
    default_settings: Settings,
    clients: Vec<String>,
    filter_client: Option<String>,
    /// `current_week` exists only in memory (after a reset) and is written
    /// with the next change.
    week_unsaved: bool,
}

impl Session {
    /// Load everything from `store`. When no current week is stored, the week
    /// containing `now` becomes current and is persisted.
    pub async fn hydrate(store: Store, now: NaiveDateTime) -> SessionResult<Self> {
        Self::hydrate_with(store, now, Settings::default()).await
    }

    /// Like [`Session::hydrate`], with the settings used when none are stored.
    pub async fn hydrate_with(
        store: Store,
        now: NaiveDateTime,
        default_settings: Settings,
    ) -> SessionResult<Self> {
        let mut session = Self {
            current_week: Week::containing(now.date())?,
            store,
            demands: Vec::new(),
            weeks: Vec::new(),
            settings: default_settings,
            default_settings,
            clients: Vec::new(),
            filter_client: None,
            week_unsaved: false,
        };
        session.load(now).await?;
        Ok(session)
    }

    /// Discard the working copy and re-read the store.
    pub async fn reload(&mut self, now: NaiveDateTime) -> SessionResult<()> {
        self.load(now).await
    }

    async fn load(&mut self, now: NaiveDateTime) -> SessionResult<()> {
        let snap = self.store.load_all_async().await?;
        let mut weeks = snap.weeks;
        let current = match snap.current_week {
            Some(week) => week,
            None => {
                let week = Week::containing(now.date())?;
                self.store.set_current_week_async(week.clone()).await?;
                tracing::info!(week = %week.key, "initialized current week");
                insert_week_sorted(&mut weeks, &week);
                week
            }
        };

        let settings = match snap.metadata.get(META_SETTINGS) {
            Some(raw) => Settings::from_meta(Some(raw.as_str())),
            None => self.default_settings,
        };
        let filter_client = snap
            .metadata
            .get(META_FILTER_CLIENT)
            .and_then(|raw| match serde_json::from_str::<Option<String>>(raw) {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(%err, "ignoring unreadable client filter");
                    None
                }
            });
        let mut client_list = clients::from_meta(snap.metadata.get(META_CLIENTS).map(String::as_str));
        if client_list.is_empty() {
            client_list = clients::seed_from_demands(&snap.demands);
            if !client_list.is_empty() {
                if let Err(err) = self
                    .store
                    .set_meta_async(META_CLIENTS.to_string(), clients::to_meta(&client_list))
                    .await
                {
                    tracing::warn!(%err, "could not save seeded client list");
                }
            }
        }

        self.demands = snap.demands;
        self.weeks = weeks;
        self.current_week = current;
        self.settings = settings;
        self.filter_client = filter_client;
        self.clients = client_list;
        self.week_unsaved = false;
        tracing::debug!(
            demands = self.demands.len(),
            weeks = self.weeks.len(),
            week = %self.current_week.key,
            "session loaded"
        );
        Ok(())
    }

    // ---------------- Accessors ----------------

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn demands(&self) -> &[Demand] {
        &self.demands
    }

    pub fn demand(&self, id: &str) -> Option<&Demand> {
        self.demands.iter().find(|d| d.id == id)
    }

    pub fn weeks(&self) -> &[Week] {
        &self.weeks
    }

    pub fn current_week(&self) -> &Week {
        &self.current_week
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn clients(&self) -> &[String] {
        &self.clients
    }

    pub fn filter_client(&self) -> Option<&str> {
        self.filter_client.as_deref()
    }

    /// The working copy in the same shape [`Store::load_all`] returns.
    pub fn snapshot(&self) -> Snapshot {
        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert(META_SETTINGS.to_string(), self.settings.to_meta());
        metadata.insert(META_CLIENTS.to_string(), clients::to_meta(&self.clients));
        if let Ok(raw) = serde_json::to_string(&self.filter_client) {
            metadata.insert(META_FILTER_CLIENT.to_string(), raw);
        }
        Snapshot {
            demands: self.demands.clone(),
            weeks: self.weeks.clone(),
            current_week: Some(self.current_week.clone()),
            metadata,
        }
    }

    // ---------------- Demand commands ----------------

    pub async fn add_demand(&mut self, new: NewDemand) -> SessionResult<Applied<Demand>> {
        let week = Week::from_key(&new.week_key)?;
        let demand = new.into_demand(Utc::now())?;
        let weeks_error = self.ensure_week(&week).await;
        self.demands.push(demand.clone());
        self.sort_demands();
        let err = self.persist_demands().await.or(weeks_error);
        tracing::info!(id = %demand.id, week = %demand.week_key, "demand added");
        Ok(Applied::new(demand, err))
    }

    pub async fn edit_demand(
        &mut self,
        id: &str,
        changes: DemandChanges,
    ) -> SessionResult<Applied<Demand>> {
        let idx = self.index_of(id)?;
        if changes.is_empty() {
            return Ok(Applied::unchanged(self.demands[idx].clone()));
        }
        self.demands[idx].apply(&changes)?;
        let updated = self.demands[idx].clone();
        let err = self.persist_demands().await;
        Ok(Applied::new(updated, err))
    }

    pub async fn delete_demand(&mut self, id: &str) -> SessionResult<Applied<Demand>> {
        let idx = self.index_of(id)?;
        let removed = self.demands.remove(idx);
        let err = self.persist_demands().await;
        tracing::info!(id = %removed.id, "demand deleted");
        Ok(Applied::new(removed, err))
    }

    /// User status change: complete (`done`) or reopen (`open`). Reopening a
    /// carried demand lands on `urgent`; requesting `urgent` is rejected.
    pub async fn set_status(
        &mut self,
        id: &str,
        requested: Status,
    ) -> SessionResult<Applied<Demand>> {
        let idx = self.index_of(id)?;
        let next = self.demands[idx].requested_status(requested)?;
        if next == self.demands[idx].status {
            return Ok(Applied::unchanged(self.demands[idx].clone()));
        }
        self.demands[idx].status = next;
        let updated = self.demands[idx].clone();
        let err = self.persist_demands().await;
        Ok(Applied::new(updated, err))
    }

    pub async fn set_client(&mut self, id: &str, client: &str) -> SessionResult<Applied<Demand>> {
        let changes = DemandChanges {
            client: Some(client.to_string()),
            ..Default::default()
        };
        self.edit_demand(id, changes).await
    }

    pub async fn set_priority(
        &mut self,
        id: &str,
        priority: Priority,
    ) -> SessionResult<Applied<Demand>> {
        let changes = DemandChanges {
            priority: Some(priority),
            ..Default::default()
        };
        self.edit_demand(id, changes).await
    }

    /// Reassign a demand to another week without touching its status.
    pub async fn move_to_week(
        &mut self,
        id: &str,
        week_key: &str,
    ) -> SessionResult<Applied<Demand>> {
        let idx = self.index_of(id)?;
        let week = Week::from_key(week_key)?;
        if self.demands[idx].week_key == week.key {
            return Ok(Applied::unchanged(self.demands[idx].clone()));
        }
        let weeks_error = self.ensure_week(&week).await;
        self.demands[idx].week_key = week.key;
        let updated = self.demands[idx].clone();
        let err = self.persist_demands().await.or(weeks_error);
        Ok(Applied::new(updated, err))
    }

    // ---------------- Weeks ----------------

    /// Make `week` current. Unfinished work of the outgoing week moves along
    /// as urgent, exactly as an automatic rollover would.
    pub async fn set_current_week(&mut self, week: Week) -> SessionResult<Applied<RolloverReport>> {
        week.validate()?;
        let previous_key = self.current_week.key.clone();
        if week.key == previous_key {
            return Ok(Applied::unchanged(RolloverReport {
                week,
                previous_key,
                week_inserted: false,
                carried: 0,
                already_current: true,
            }));
        }

        let week_inserted = insert_week_sorted(&mut self.weeks, &week);
        let carried = carry_forward(&mut self.demands, &previous_key, &week);
        self.current_week = week.clone();
        let report = RolloverReport {
            week: week.clone(),
            previous_key: previous_key.clone(),
            week_inserted,
            carried,
            already_current: false,
        };

        let week_error = self.save_unsaved_week().await;
        let err = match self.store.rollover_week_async(week, previous_key).await {
            Ok(stored) if stored.already_current || stored.carried != carried => {
                tracing::warn!(
                    in_memory = carried,
                    stored = stored.carried,
                    already_current = stored.already_current,
                    "working copy and store disagree on the rollover; re-reading the store"
                );
                self.load(stored.week.start_date.and_time(NaiveTime::MIN)).await?;
                return Ok(Applied::new(stored, week_error));
            }
            Ok(_) => week_error,
            Err(err) => {
                tracing::warn!(%err, week = %report.week.key, "changes may not have saved");
                Some(err)
            }
        };
        Ok(Applied::new(report, err))
    }

    /// Advance the week if the current one has ended at `now` and the
    /// `autoAdvance` setting is on.
    ///
    /// The decision is made against the pointer in the store, and the working
    /// copy is re-read after an advance. Store errors (including an
    /// unreadable pointer) are returned and nothing changes.
    pub async fn check_auto_advance(
        &mut self,
        now: NaiveDateTime,
    ) -> SessionResult<Option<RolloverReport>> {
        if !self.settings.auto_advance {
            return Ok(None);
        }
        match dw_store::check_and_advance_async(&self.store, now).await? {
            AdvanceOutcome::Advanced(report) => {
                self.load(now).await?;
                Ok(Some(report))
            }
            AdvanceOutcome::Stay { .. } | AdvanceOutcome::NoCurrentWeek => Ok(None),
        }
    }

    // ---------------- Settings, filter, clients ----------------

    pub async fn set_setting(&mut self, key: &str, value: &str) -> SessionResult<Applied<Settings>> {
        let mut next = self.settings;
        next.set(key, value)?;
        self.settings = next;
        let err = self.persist_meta(META_SETTINGS, next.to_meta()).await;
        Ok(Applied::new(next, err))
    }

    /// Set or clear (`None` or blank) the persisted client filter.
    pub async fn set_filter_client(
        &mut self,
        client: Option<&str>,
    ) -> SessionResult<Applied<Option<String>>> {
        let value = client
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        self.filter_client = value.clone();
        let raw = serde_json::to_string(&value).map_err(StoreError::from)?;
        let err = self.persist_meta(META_FILTER_CLIENT, raw).await;
        Ok(Applied::new(value, err))
    }

    pub async fn add_client(&mut self, name: &str) -> SessionResult<Applied<Vec<String>>> {
        if name.trim().is_empty() {
            return Err(DomainError::EmptyField("client").into());
        }
        let list = clients::with_added(&self.clients, name);
        Ok(self.replace_clients(list).await)
    }

    /// Rename a client in the registry and on every demand that uses it.
    pub async fn rename_client(
        &mut self,
        from: &str,
        to: &str,
    ) -> SessionResult<Applied<Vec<String>>> {
        let to = to.trim();
        if to.is_empty() {
            return Err(DomainError::EmptyField("client").into());
        }
        let used = self.demands.iter().any(|d| d.client == from);
        if !used && !self.clients.iter().any(|c| c == from) {
            return Err(SessionError::UnknownClient(from.to_string()));
        }
        let list = clients::with_renamed(&self.clients, from, to);
        let mut renamed = 0usize;
        for d in self.demands.iter_mut().filter(|d| d.client == from) {
            d.client = to.to_string();
            renamed += 1;
        }
        let demands_error = if renamed > 0 {
            self.persist_demands().await
        } else {
            None
        };
        let applied = self.replace_clients(list).await;
        tracing::info!(from, to, renamed, "client renamed");
        Ok(Applied::new(applied.value, demands_error.or(applied.persist_error)))
    }

    /// Drop a name from the registry. Demands keep their client text.
    pub async fn remove_client(&mut self, name: &str) -> SessionResult<Applied<Vec<String>>> {
        if !self.clients.iter().any(|c| c == name) {
            return Err(SessionError::UnknownClient(name.to_string()));
        }
        let list = clients::without(&self.clients, name);
        Ok(self.replace_clients(list).await)
    }

    pub async fn set_clients(&mut self, names: &[String]) -> Applied<Vec<String>> {
        self.replace_clients(clients::normalize(names)).await
    }

    async fn replace_clients(&mut self, list: Vec<String>) -> Applied<Vec<String>> {
        self.clients = list.clone();
        let err = self.persist_meta(META_CLIENTS, clients::to_meta(&list)).await;
        Applied::new(list, err)
    }

    // ---------------- Search and views ----------------

    /// Search demand ids through the store's index (substring fallback
    /// included). A blank query yields an empty result.
    pub async fn search(&self, query: &str) -> SessionResult<SearchHits> {
        Ok(self.store.search_async(query.to_string()).await?)
    }

    /// Resolve free text into a [`TextScope`]. If the store search fails the
    /// scope degrades to an in-memory substring match.
    pub async fn text_scope(&self, text: Option<&str>) -> TextScope {
        let Some(q) = text.map(str::trim).filter(|q| !q.is_empty()) else {
            return TextScope::All;
        };
        match self.search(q).await {
            Ok(hits) => TextScope::Ids(hits.ids),
            Err(err) => {
                tracing::warn!(%err, "search failed; matching in memory");
                TextScope::substring(q)
            }
        }
    }

    /// The current week's board, narrowed by the persisted client filter.
    pub async fn current_demands(&self, text: Option<&str>) -> WeekView {
        let scope = self.text_scope(text).await;
        query::week_view(
            &self.demands,
            &self.current_week,
            self.filter_client.as_deref(),
            &scope,
        )
    }

    pub async fn query(&self, filter: &DemandFilter, text: Option<&str>) -> Vec<Demand> {
        let scope = self.text_scope(text).await;
        query::select(&self.demands, filter, &scope)
    }

    pub async fn history(&self, filter: &DemandFilter, text: Option<&str>) -> Vec<WeekGroup> {
        let scope = self.text_scope(text).await;
        query::history(&self.demands, filter, &scope)
    }

    pub async fn client_summaries(
        &self,
        order: ClientOrder,
        text: Option<&str>,
    ) -> Vec<ClientSummary> {
        let scope = self.text_scope(text).await;
        query::client_summaries(&self.demands, &scope, order)
    }

    // ---------------- Reset ----------------

    /// Wipe the store and start over in memory with the week containing
    /// `now`. The store stays empty until the next change (or the next
    /// hydrate) writes that week.
    pub async fn reset_all(&mut self, now: NaiveDateTime) -> SessionResult<Applied<()>> {
        let week = Week::containing(now.date())?;
        self.demands.clear();
        self.weeks = vec![week.clone()];
        self.current_week = week;
        self.settings = self.default_settings;
        self.clients.clear();
        self.filter_client = None;
        self.week_unsaved = true;

        let err = self.store.reset_all_async().await.err();
        if let Some(err) = &err {
            tracing::warn!(%err, "changes may not have saved");
        } else {
            tracing::info!("all data reset");
        }
        Ok(Applied::new((), err))
    }

    // ---------------- Helpers ----------------

    fn index_of(&self, id: &str) -> SessionResult<usize> {
        self.demands
            .iter()
            .position(|d| d.id == id)
            .ok_or_else(|| SessionError::UnknownDemand(id.to_string()))
    }

    fn sort_demands(&mut self) {
        self.demands
            .sort_by(|a, b| b.sort_order.cmp(&a.sort_order));
    }

    /// Register `week` if unknown. Returns the write error, if any.
    async fn ensure_week(&mut self, week: &Week) -> Option<StoreError> {
        if !insert_week_sorted(&mut self.weeks, week) {
            return None;
        }
        match self.store.replace_weeks_async(self.weeks.clone()).await {
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(%err, week = %week.key, "changes may not have saved");
                Some(err)
            }
        }
    }

    /// Write the in-memory current week and pointer if a reset left them
    /// unsaved.
    async fn save_unsaved_week(&mut self) -> Option<StoreError> {
        if !self.week_unsaved {
            return None;
        }
        match self.store.set_current_week_async(self.current_week.clone()).await {
            Ok(()) => {
                self.week_unsaved = false;
                None
            }
            Err(err) => {
                tracing::warn!(%err, week = %self.current_week.key, "changes may not have saved");
                Some(err)
            }
        }
    }

    async fn persist_demands(&mut self) -> Option<StoreError> {
        let week_error = self.save_unsaved_week().await;
        match self.store.replace_demands_async(self.demands.clone()).await {
            Ok(report) => {
                if !report.index_rebuilt {
                    tracing::warn!("search index is stale; text search uses substring matching");
                }
                week_error
            }
            Err(err) => {
                tracing::warn!(%err, "changes may not have saved");
                Some(err)
            }
        }
    }

    async fn persist_meta(&mut self, key: &str, value: String) -> Option<StoreError> {
        let week_error = self.save_unsaved_week().await;
        match self.store.set_meta_async(key.to_string(), value).await {
            Ok(()) => week_error,
            Err(err) => {
                tracing::warn!(%err, key, "changes may not have saved");
                Some(err)
            }
        }
    }
}

/// Insert keeping `start_date` descending. Returns false if already present.
fn insert_week_sorted(weeks: &mut Vec<Week>, week: &Week) -> bool {
    if weeks.iter().any(|w| w.key == week.key) {
        return false;
    }
    let at = weeks
        .iter()
        .position(|w| w.start_date < week.start_date)
        .unwrap_or(weeks.len());
    weeks.insert(at, week.clone());
    true
}
