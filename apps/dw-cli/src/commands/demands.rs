use anyhow::Result;
use dw_core::{DemandChanges, NewDemand, Priority, Status};

use super::{resolve_id, resolve_week, saved, Ctx};
use crate::render;
use crate::{AddArgs, EditArgs};

pub(crate) async fn add(ctx: &Ctx, args: AddArgs) -> Result<()> {
    let mut session = ctx.open_session().await?;
    let week = match args.week.as_deref() {
        Some(raw) => resolve_week(&session, raw)?,
        None => session.current_week().clone(),
    };
    let mut new = NewDemand::new(args.title, args.client, args.priority, week.key);
    new.description = args.description;
    let demand = saved(session.add_demand(new).await?)?;
    render::emit(ctx.json, &demand, || {
        format!("Added {}", render::demand_line(&demand))
    })
}

pub(crate) async fn edit(ctx: &Ctx, args: EditArgs) -> Result<()> {
    let mut session = ctx.open_session().await?;
    let id = resolve_id(&session, &args.id)?;
    let description = if args.clear_description {
        Some(None)
    } else {
        args.description.map(Some)
    };
    let changes = DemandChanges {
        title: args.title,
        description,
        client: args.client,
        priority: args.priority,
    };
    if changes.is_empty() {
        anyhow::bail!("nothing to change (use --title, --description, --client or --priority)");
    }
    let demand = saved(session.edit_demand(&id, changes).await?)?;
    render::emit(ctx.json, &demand, || render::demand_detail(&demand))
}

pub(crate) async fn remove(ctx: &Ctx, raw_id: &str) -> Result<()> {
    let mut session = ctx.open_session().await?;
    let id = resolve_id(&session, raw_id)?;
    let removed = saved(session.delete_demand(&id).await?)?;
    render::emit(ctx.json, &removed, || {
        format!("Deleted {}", render::demand_line(&removed))
    })
}

pub(crate) async fn set_status(ctx: &Ctx, raw_id: &str, status: Status) -> Result<()> {
    let mut session = ctx.open_session().await?;
    let id = resolve_id(&session, raw_id)?;
    let demand = saved(session.set_status(&id, status).await?)?;
    render::emit(ctx.json, &demand, || render::demand_line(&demand))
}

pub(crate) async fn set_client(ctx: &Ctx, raw_id: &str, client: &str) -> Result<()> {
    let mut session = ctx.open_session().await?;
    let id = resolve_id(&session, raw_id)?;
    let demand = saved(session.set_client(&id, client).await?)?;
    render::emit(ctx.json, &demand, || render::demand_line(&demand))
}

pub(crate) async fn set_priority(ctx: &Ctx, raw_id: &str, priority: Priority) -> Result<()> {
    let mut session = ctx.open_session().await?;
    let id = resolve_id(&session, raw_id)?;
    let demand = saved(session.set_priority(&id, priority).await?)?;
    render::emit(ctx.json, &demand, || render::demand_line(&demand))
}

pub(crate) async fn move_to_week(ctx: &Ctx, raw_id: &str, raw_week: &str) -> Result<()> {
    let mut session = ctx.open_session().await?;
    let id = resolve_id(&session, raw_id)?;
    let week = resolve_week(&session, raw_week)?;
    let demand = saved(session.move_to_week(&id, &week.key).await?)?;
    render::emit(ctx.json, &demand, || {
        format!(
            "Moved to {}: {}",
            render::week_label(&week),
            render::demand_line(&demand)
        )
    })
}
