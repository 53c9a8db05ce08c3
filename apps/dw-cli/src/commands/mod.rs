use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use dw_core::{EffectiveConfig, Settings, Week};
use dw_session::{Applied, Session};
use dw_store::{Store, StoreOptions};

use crate::{Cli, Commands};

mod admin;
mod demands;
mod views;
mod weeks;

pub(crate) struct Ctx {
    pub json: bool,
    pub cfg: EffectiveConfig,
    pub db: PathBuf,
}

impl Ctx {
    pub(crate) async fn open_session(&self) -> Result<Session> {
        let options = StoreOptions {
            busy_timeout: Duration::from_millis(self.cfg.busy_timeout_ms),
        };
        let store = Store::open_with(&self.db, options)
            .with_context(|| format!("opening {}", self.db.display()))?;
        let now = Local::now().naive_local();
        let defaults = Settings {
            auto_advance: self.cfg.auto_advance_default,
        };
        let mut session = Session::hydrate_with(store, now, defaults).await?;
        match session.check_auto_advance(now).await {
            Ok(Some(report)) => tracing::info!(
                week = %report.week.key,
                carried = report.carried,
                "advanced to the current week"
            ),
            Ok(None) => {}
            Err(err) => tracing::warn!(%err, "automatic week check failed"),
        }
        Ok(session)
    }
}

pub(crate) async fn dispatch(cli: Cli, cfg: EffectiveConfig) -> Result<()> {
    let ctx = Ctx {
        json: cli.json,
        db: cli.db.clone().unwrap_or_else(|| cfg.db_path.clone()),
        cfg,
    };
    match cli.command {
        Commands::Add(args) => demands::add(&ctx, args).await,
        Commands::Edit(args) => demands::edit(&ctx, args).await,
        Commands::Rm(args) => demands::remove(&ctx, &args.id).await,
        Commands::Done(args) => demands::set_status(&ctx, &args.id, dw_core::Status::Done).await,
        Commands::Undo(args) => demands::set_status(&ctx, &args.id, dw_core::Status::Open).await,
        Commands::Status(args) => demands::set_status(&ctx, &args.id, args.status).await,
        Commands::Client(args) => demands::set_client(&ctx, &args.id, &args.client).await,
        Commands::Priority(args) => demands::set_priority(&ctx, &args.id, args.priority).await,
        Commands::Move(args) => demands::move_to_week(&ctx, &args.id, &args.week).await,
        Commands::List(args) => views::list(&ctx, args).await,
        Commands::History(args) => views::history(&ctx, args).await,
        Commands::Clients { cmd } => views::clients(&ctx, cmd).await,
        Commands::Search(args) => views::search(&ctx, &args.query).await,
        Commands::Week { cmd } => weeks::week(&ctx, cmd).await,
        Commands::Advance(args) => weeks::advance(&ctx, args).await,
        Commands::Settings { cmd } => admin::settings(&ctx, cmd).await,
        Commands::Reset(args) => admin::reset(&ctx, args).await,
        Commands::Watch(args) => admin::watch(&ctx, args).await,
        Commands::Paths => admin::paths(&ctx),
        Commands::Completions(args) => admin::completions(args),
    }
}

/// Unwrap a command outcome, turning a failed durable write into an error.
pub(crate) fn saved<T>(applied: Applied<T>) -> Result<T> {
    Ok(applied.into_result()?)
}

/// Resolve a full id or a unique id prefix.
pub(crate) fn resolve_id(session: &Session, raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("demand id must not be empty");
    }
    if session.demand(raw).is_some() {
        return Ok(raw.to_string());
    }
    let matches: Vec<&str> = session
        .demands()
        .iter()
        .filter(|d| d.id.starts_with(raw))
        .map(|d| d.id.as_str())
        .collect();
    match matches.as_slice() {
        [one] => Ok((*one).to_string()),
        [] => bail!("no demand with id '{raw}'"),
        many => bail!("id prefix '{raw}' matches {} demands", many.len()),
    }
}

/// Resolve `next`, `prev`, a week key or a date inside the wanted week.
pub(crate) fn resolve_week(session: &Session, raw: &str) -> Result<Week> {
    let raw = raw.trim();
    let current = session.current_week();
    let week = match raw {
        "next" => current.next()?,
        "prev" | "previous" => current.previous()?,
        "current" => current.clone(),
        key if key.contains('_') => Week::from_key(key)?,
        date => {
            let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("'{date}' is not a week key, date, next or prev"))?;
            Week::containing(day)?
        }
    };
    Ok(week)
}
