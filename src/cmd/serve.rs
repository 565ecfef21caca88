//! API server command — `sitecraft serve`.

use anyhow::Result;

use sitecraft::config::AppConfig;
use sitecraft::studio::server::{ServeOptions, start_server};

pub async fn cmd_serve(config: AppConfig, open: bool) -> Result<()> {
    // No browser inside dev containers.
    let open_browser = open && !config.server.dev_mode;
    start_server(config, ServeOptions { open_browser }).await
}
