use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Local;
use clap::CommandFactory;
use serde_json::json;

use super::{saved, Ctx};
use crate::render;
use crate::{Cli, CompletionsArgs, ResetArgs, SettingsCmd, WatchArgs};

pub(crate) async fn settings(ctx: &Ctx, cmd: SettingsCmd) -> Result<()> {
    let mut session = ctx.open_session().await?;
    let settings = match cmd {
        SettingsCmd::Show => *session.settings(),
        SettingsCmd::Set { key, value } => saved(session.set_setting(&key, &value).await?)?,
    };
    render::emit(ctx.json, &settings, || {
        format!("autoAdvance = {}", settings.auto_advance)
    })
}

pub(crate) async fn reset(ctx: &Ctx, args: ResetArgs) -> Result<()> {
    if !args.yes {
        bail!("refusing to delete all data without --yes");
    }
    let mut session = ctx.open_session().await?;
    saved(session.reset_all(Local::now().naive_local()).await?)?;
    let week = session.current_week().clone();
    render::emit(ctx.json, &json!({ "reset": true, "week": week }), || {
        format!("All data deleted. Current week: {}", render::week_label(&week))
    })
}

pub(crate) async fn watch(ctx: &Ctx, args: WatchArgs) -> Result<()> {
    let mut session = ctx.open_session().await?;
    let every = Duration::from_secs(args.interval.unwrap_or(ctx.cfg.tick_secs).max(1));
    tracing::info!(
        db = %ctx.db.display(),
        every_secs = every.as_secs(),
        week = %session.current_week().key,
        "watching for week changes (ctrl-c to stop)"
    );
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(%err, "ctrl-c handler unavailable; stop the process to exit");
            std::future::pending::<()>().await;
        }
    };
    let stats = dw_session::run_auto_advance(
        &mut session,
        every,
        || Local::now().naive_local(),
        shutdown,
    )
    .await;
    render::emit(ctx.json, &stats, || {
        format!(
            "Stopped after {} check(s): {} advance(s), {} failure(s).",
            stats.ticks, stats.advanced, stats.failures
        )
    })
}

pub(crate) fn paths(ctx: &Ctx) -> Result<()> {
    let v = json!({
        "db": ctx.db,
        "stateDir": ctx.cfg.state_dir,
        "configPath": ctx.cfg.config_path,
        "busyTimeoutMs": ctx.cfg.busy_timeout_ms,
        "autoAdvanceDefault": ctx.cfg.auto_advance_default,
        "tickSecs": ctx.cfg.tick_secs,
        "logLevel": ctx.cfg.log_level,
    });
    println!("{}", serde_json::to_string_pretty(&v)?);
    Ok(())
}

pub(crate) fn completions(args: CompletionsArgs) -> Result<()> {
    use clap_complete::{generate, generate_to};
    use std::io::stdout;
    let mut cmd = Cli::command();
    let bin = "dw";
    if let Some(dir) = args.out_dir {
        std::fs::create_dir_all(&dir)?;
        let path = generate_to(args.shell, &mut cmd, bin, &dir)?;
        tracing::info!(path = %path.display(), "completions written");
    } else {
        generate(args.shell, &mut cmd, bin, &mut stdout());
    }
    Ok(())
}
