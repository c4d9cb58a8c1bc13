//! Command-line surface for running harness fixtures by hand.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use revaer_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
use revaer_test_support::HarnessConfig;
use revaer_test_support::proxy::ProxyKind;

use crate::commands::{fixture, origin, proxy};
use crate::error::{CliError, CliResult};

const DEFAULT_PIECE_SIZE: usize = 16 * 1024;
const DEFAULT_PIECE_COUNT: usize = 19;

/// Parses CLI arguments, installs logging and runs the requested fixture.
/// Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let logging = LoggingConfig {
        level: &cli.log_level,
        format: cli.log_format,
        build_sha: build_sha(),
    };
    if let Err(err) = init_logging(&logging) {
        eprintln!("error: failed to initialise logging: {err}");
        return 3;
    }

    match dispatch(cli.command).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn dispatch(command: Command) -> CliResult<()> {
    let config = HarnessConfig::from_env().map_err(CliError::from)?;
    match command {
        Command::Origin(args) => origin::handle_origin(&config, args).await,
        Command::Proxy(ProxyCommand::Start(args)) => proxy::handle_proxy_start(&config, args).await,
        Command::Proxy(ProxyCommand::Stop(args)) => proxy::handle_proxy_stop(&config, &args).await,
        Command::Fixture(args) => fixture::handle_fixture(&args),
    }
}

#[derive(Parser)]
#[command(
    name = "revaer-harness",
    about = "Fixtures for end-to-end tests of a peer-to-peer distribution engine"
)]
pub(crate) struct Cli {
    #[arg(
        long,
        global = true,
        env = "REVAER_LOG_FORMAT",
        default_value = "auto",
        help = "Log output: json, pretty or auto"
    )]
    log_format: LogFormat,
    #[arg(long, global = true, default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Serve files over the HTTP/1.0 origin double until interrupted.
    Origin(OriginArgs),
    /// Control the forward proxy daemon.
    #[command(subcommand)]
    Proxy(ProxyCommand),
    /// Write a synthetic payload and its descriptor.
    Fixture(FixtureArgs),
}

#[derive(Subcommand)]
pub(crate) enum ProxyCommand {
    /// Restart the daemon on a port and keep it up until interrupted.
    Start(ProxyStartArgs),
    /// Stop the daemon on a port.
    Stop(ProxyStopArgs),
}

#[derive(Args)]
pub(crate) struct OriginArgs {
    #[arg(long, default_value_t = 0, help = "Port to listen on; 0 picks one")]
    pub(crate) port: u16,
    #[arg(long, help = "Directory to serve (defaults to REVAER_HARNESS_ORIGIN_ROOT)")]
    pub(crate) root: Option<PathBuf>,
}

#[derive(Args)]
pub(crate) struct ProxyStartArgs {
    #[arg(long)]
    pub(crate) port: u16,
    #[arg(long, help = "socks4, socks5, socks5-pw, http or http-pw")]
    pub(crate) kind: ProxyKind,
}

#[derive(Args)]
pub(crate) struct ProxyStopArgs {
    #[arg(long)]
    pub(crate) port: u16,
}

#[derive(Args)]
pub(crate) struct FixtureArgs {
    #[arg(long, default_value_t = DEFAULT_PIECE_SIZE)]
    pub(crate) piece_size: usize,
    #[arg(long, default_value_t = DEFAULT_PIECE_COUNT)]
    pub(crate) pieces: usize,
    #[arg(long, default_value = ".")]
    pub(crate) out: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("revaer-harness").chain(args.iter().copied()))
    }

    #[test]
    fn fixture_defaults_match_swarm_shape() -> Result<(), clap::Error> {
        let cli = parse(&["fixture"])?;
        let Command::Fixture(args) = cli.command else {
            panic!("expected fixture command");
        };
        assert_eq!(args.piece_size, 16 * 1024);
        assert_eq!(args.pieces, 19);
        assert_eq!(args.out, PathBuf::from("."));
        Ok(())
    }

    #[test]
    fn proxy_start_parses_kind() -> Result<(), clap::Error> {
        let cli = parse(&["proxy", "start", "--port", "4444", "--kind", "socks5-pw"])?;
        let Command::Proxy(ProxyCommand::Start(args)) = cli.command else {
            panic!("expected proxy start");
        };
        assert_eq!(args.port, 4444);
        assert_eq!(args.kind, ProxyKind::Socks5Password);
        Ok(())
    }

    #[test]
    fn unknown_proxy_kind_is_rejected() {
        assert!(parse(&["proxy", "start", "--port", "1", "--kind", "gopher"]).is_err());
    }

    #[test]
    fn log_format_is_global() -> Result<(), clap::Error> {
        let cli = parse(&["origin", "--log-format", "json", "--port", "8000"])?;
        assert_eq!(cli.log_format, LogFormat::Json);
        let Command::Origin(args) = cli.command else {
            panic!("expected origin command");
        };
        assert_eq!(args.port, 8000);
        assert!(args.root.is_none());
        Ok(())
    }
}
