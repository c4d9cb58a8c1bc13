use revaer_test_support::HarnessConfig;
use revaer_test_support::origin::OriginServer;
use tracing::info;

use crate::cli::OriginArgs;
use crate::commands::wait_for_interrupt;
use crate::error::CliResult;
use crate::output::{FixtureStarted, render_json};

pub(crate) async fn handle_origin(config: &HarnessConfig, args: OriginArgs) -> CliResult<()> {
    let mut origin = config.origin.clone();
    if let Some(root) = args.root {
        origin.root = root;
    }

    let server = OriginServer::start(&origin, args.port).await?;
    render_json(&FixtureStarted {
        fixture: "origin",
        addr: server.local_addr(),
        kind: None,
        accepting: None,
    })?;

    let interrupted = wait_for_interrupt().await;
    info!("shutting down origin double");
    server.stop().await;
    interrupted
}
