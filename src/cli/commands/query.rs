//! Query commands.

use console::style;

use super::super::helpers::{print_json, warning};
use crate::config::Settings;
use crate::context::AppContext;
use crate::service::QueryOutcome;

pub async fn cmd_search(settings: Settings, query: &str, limit: usize, json: bool) -> anyhow::Result<()> {
    let ctx = AppContext::from_settings(settings)?;
    let outcome = ctx.service().search(query, limit).await;

    let payload = match outcome {
        QueryOutcome::Empty => {
            println!("No breweries match '{}'", query);
            return Ok(());
        }
        QueryOutcome::Unavailable => anyhow::bail!("Upstream unavailable and nothing cached"),
        QueryOutcome::Stale { payload, cached_at } => {
            warning(format!("Upstream unavailable, showing results cached at {}", cached_at));
            payload
        }
        QueryOutcome::Fresh(payload) | QueryOutcome::Cached(payload) => payload,
    };

    if json {
        return print_json(&payload);
    }

    for brewery in payload.as_array().into_iter().flatten() {
        let field = |name: &str| brewery.get(name).and_then(|v| v.as_str()).unwrap_or("");
        println!(
            "{}  {}, {}  {}",
            style(field("name")).bold(),
            field("city"),
            field("state_province"),
            style(field("brewery_type")).dim()
        );
    }
    Ok(())
}
