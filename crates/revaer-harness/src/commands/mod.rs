//! Fixture command handlers.

pub(crate) mod fixture;
pub(crate) mod origin;
pub(crate) mod proxy;

use anyhow::anyhow;

use crate::error::{CliError, CliResult};

/// Block until the operator interrupts the process.
pub(crate) async fn wait_for_interrupt() -> CliResult<()> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to listen for ctrl-c: {err}")))
}
