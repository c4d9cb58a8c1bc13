use std::net::{Ipv4Addr, SocketAddr};

use anyhow::anyhow;
use revaer_test_support::HarnessConfig;
use revaer_test_support::proxy::{start_proxy, stop_proxy};
use tokio::task::spawn_blocking;
use tracing::info;

use crate::cli::{ProxyStartArgs, ProxyStopArgs};
use crate::commands::wait_for_interrupt;
use crate::error::{CliError, CliResult};
use crate::output::{FixtureStarted, render_json};

pub(crate) async fn handle_proxy_start(
    config: &HarnessConfig,
    args: ProxyStartArgs,
) -> CliResult<()> {
    let proxy = config.proxy.clone();
    let fixture = spawn_blocking(move || start_proxy(&proxy, args.port, args.kind))
        .await
        .map_err(|err| CliError::failure(anyhow!("proxy start task failed: {err}")))??;

    render_json(&FixtureStarted {
        fixture: "proxy",
        addr: SocketAddr::from((Ipv4Addr::LOCALHOST, fixture.port())),
        kind: Some(fixture.kind().to_string()),
        accepting: Some(fixture.accepting()),
    })?;

    let interrupted = wait_for_interrupt().await;
    info!(port = fixture.port(), "stopping proxy daemon");
    spawn_blocking(move || fixture.stop())
        .await
        .map_err(|err| CliError::failure(anyhow!("proxy stop task failed: {err}")))??;
    interrupted
}

pub(crate) async fn handle_proxy_stop(config: &HarnessConfig, args: &ProxyStopArgs) -> CliResult<()> {
    let proxy = config.proxy.clone();
    let port = args.port;
    spawn_blocking(move || stop_proxy(&proxy, port))
        .await
        .map_err(|err| CliError::failure(anyhow!("proxy stop task failed: {err}")))??;
    info!(port, "proxy stop requested");
    Ok(())
}
