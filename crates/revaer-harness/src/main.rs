//! Entry point for the harness fixture CLI.

#[tokio::main]
async fn main() {
    let exit_code = revaer_harness::run().await;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}
