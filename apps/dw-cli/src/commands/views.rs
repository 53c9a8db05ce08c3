use anyhow::Result;
use dw_core::Demand;
use dw_session::DemandFilter;
use serde_json::json;

use super::{saved, Ctx};
use crate::render;
use crate::{ClientsCmd, HistoryArgs, ListArgs};

pub(crate) async fn list(ctx: &Ctx, args: ListArgs) -> Result<()> {
    let session = ctx.open_session().await?;
    let view = session.current_demands(args.search.as_deref()).await;
    render::emit(ctx.json, &view, || render::board(&view))
}

pub(crate) async fn history(ctx: &Ctx, args: HistoryArgs) -> Result<()> {
    let session = ctx.open_session().await?;
    let filter = DemandFilter {
        client: args.client,
        priority: args.priority,
        status: args.status,
        week_key: None,
    };
    let groups = session.history(&filter, args.search.as_deref()).await;
    render::emit(ctx.json, &groups, || render::history(&groups))
}

pub(crate) async fn search(ctx: &Ctx, query: &str) -> Result<()> {
    let session = ctx.open_session().await?;
    let hits = session.search(query).await?;
    let found: Vec<&Demand> = session
        .demands()
        .iter()
        .filter(|d| hits.contains(&d.id))
        .collect();
    let payload = json!({ "path": &hits.path, "demands": &found });
    render::emit(ctx.json, &payload, || render::search(&hits, &found))
}

pub(crate) async fn clients(ctx: &Ctx, cmd: ClientsCmd) -> Result<()> {
    let mut session = ctx.open_session().await?;
    match cmd {
        ClientsCmd::Summary { order, search } => {
            let rows = session.client_summaries(order, search.as_deref()).await;
            render::emit(ctx.json, &rows, || render::summaries(&rows))
        }
        ClientsCmd::List => {
            let list = session.clients().to_vec();
            render::emit(ctx.json, &list, || list.join("\n"))
        }
        ClientsCmd::Add { name } => {
            let list = saved(session.add_client(&name).await?)?;
            render::emit(ctx.json, &list, || list.join("\n"))
        }
        ClientsCmd::Rename { from, to } => {
            let list = saved(session.rename_client(&from, &to).await?)?;
            render::emit(ctx.json, &list, || list.join("\n"))
        }
        ClientsCmd::Rm { name } => {
            let list = saved(session.remove_client(&name).await?)?;
            render::emit(ctx.json, &list, || list.join("\n"))
        }
        ClientsCmd::Filter { name } => {
            let value = saved(session.set_filter_client(name.as_deref()).await?)?;
            render::emit(ctx.json, &value, || match &value {
                Some(c) => format!("Filtering by client {c}"),
                None => "Client filter cleared".to_string(),
            })
        }
    }
}
