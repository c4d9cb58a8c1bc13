use std::fs;

use revaer_test_support::HarnessError;
use revaer_test_support::fixtures::{ContentFixture, payload_path};
use tracing::info;

use crate::cli::FixtureArgs;
use crate::error::{CliError, CliResult};
use crate::output::{FixtureSummary, render_json};

const DESCRIPTOR_FILE_NAME: &str = "fixture.torrent";

pub(crate) fn handle_fixture(args: &FixtureArgs) -> CliResult<()> {
    let summary = write_fixture(args)?;
    render_json(&summary)
}

fn write_fixture(args: &FixtureArgs) -> CliResult<FixtureSummary> {
    if args.piece_size == 0 || args.pieces == 0 {
        return Err(CliError::validation(
            "--piece-size and --pieces must both be positive",
        ));
    }

    let descriptor = ContentFixture::new(args.piece_size, args.pieces).materialize(&args.out)?;
    let descriptor_path = args.out.join(DESCRIPTOR_FILE_NAME);
    fs::write(&descriptor_path, descriptor.as_bytes()).map_err(|source| HarnessError::Io {
        operation: "write",
        path: descriptor_path.clone(),
        source,
    })?;
    info!(
        info_hash = %descriptor.info_hash(),
        path = %descriptor_path.display(),
        "wrote payload fixture"
    );

    Ok(FixtureSummary {
        info_hash: descriptor.info_hash().to_string(),
        name: descriptor.name().to_string(),
        piece_length: descriptor.piece_length(),
        pieces: descriptor.num_pieces(),
        total_length: descriptor.total_length(),
        trackers: descriptor.trackers().to_vec(),
        payload: payload_path(&args.out),
        descriptor: descriptor_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use revaer_test_support::metainfo::Descriptor;
    use tempfile::TempDir;

    #[test]
    fn writes_payload_and_descriptor() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let args = FixtureArgs {
            piece_size: 32,
            pieces: 4,
            out: temp.path().join("fixture"),
        };
        let summary = write_fixture(&args).map_err(|err| anyhow::anyhow!(err.display_message()))?;

        assert_eq!(summary.total_length, 128);
        assert_eq!(summary.pieces, 4);
        assert_eq!(summary.name, "temporary");
        assert_eq!(fs::read(&summary.payload)?.len(), 128);
        let descriptor = Descriptor::from_bytes(&fs::read(&summary.descriptor)?)?;
        assert_eq!(descriptor.info_hash().to_string(), summary.info_hash);
        assert_eq!(summary.trackers.len(), 3);
        Ok(())
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let args = FixtureArgs {
            piece_size: 0,
            pieces: 19,
            out: ".".into(),
        };
        assert!(matches!(write_fixture(&args), Err(CliError::Validation(_))));
    }
}
