//! Web server command.

use console::style;

use super::super::helpers::parse_bind_address;
use crate::config::Settings;
use crate::context::AppContext;

/// Start the web server.
pub async fn cmd_serve(settings: Settings, bind: &str) -> anyhow::Result<()> {
    let (host, port) = parse_bind_address(bind);
    let ctx = AppContext::from_settings(settings)?;

    println!(
        "{} Starting brewpipe server at http://{}:{}",
        style("→").cyan(),
        host,
        port
    );
    println!("  Press Ctrl+C to stop");

    crate::server::serve(&ctx, &host, port).await
}
