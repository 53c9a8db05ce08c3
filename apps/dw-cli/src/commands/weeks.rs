use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde_json::json;

use super::{resolve_week, saved, Ctx};
use crate::render;
use crate::{AdvanceArgs, WeekCmd};

pub(crate) async fn week(ctx: &Ctx, cmd: WeekCmd) -> Result<()> {
    let mut session = ctx.open_session().await?;
    match cmd {
        WeekCmd::Show => {
            let week = session.current_week().clone();
            render::emit(ctx.json, &week, || {
                format!("{}  ({})", render::week_label(&week), week.key)
            })
        }
        WeekCmd::List => {
            let current = session.current_week().key.clone();
            let weeks = session.weeks().to_vec();
            render::emit(ctx.json, &weeks, || {
                weeks
                    .iter()
                    .map(|w| {
                        let mark = if w.key == current { "*" } else { " " };
                        format!("{mark} {}", render::week_label(w))
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        WeekCmd::Set { week } => {
            let target = resolve_week(&session, &week)?;
            let report = saved(session.set_current_week(target).await?)?;
            render::emit(ctx.json, &report, || render::rollover(&report))
        }
    }
}

pub(crate) async fn advance(ctx: &Ctx, args: AdvanceArgs) -> Result<()> {
    let now = match args.at.as_deref() {
        Some(raw) => parse_local(raw)?,
        None => Local::now().naive_local(),
    };
    let mut session = ctx.open_session().await?;
    let report = session.check_auto_advance(now).await?;
    match report {
        Some(report) => render::emit(ctx.json, &report, || render::rollover(&report)),
        None => {
            let current = session.current_week().clone();
            let payload = json!({ "advanced": false, "week": current });
            render::emit(ctx.json, &payload, || {
                if session.settings().auto_advance {
                    format!("Week {} is still current.", render::week_label(&current))
                } else {
                    "Automatic advance is disabled (settings set autoAdvance true).".to_string()
                }
            })
        }
    }
}

fn parse_local(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("'{raw}' is not YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS"))?;
    day.and_hms_opt(12, 0, 0)
        .with_context(|| format!("invalid time for {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_local_accepts_dates_and_datetimes() {
        assert_eq!(
            parse_local("2024-01-10").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 10)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap()
        );
        assert_eq!(
            parse_local("2024-01-07T23:59:59").unwrap().date(),
            NaiveDate::from_ymd_opt(2024, 1, 7).unwrap()
        );
        assert!(parse_local("next tuesday").is_err());
    }
}
