#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::redundant_pub_crate)]

//! Operator CLI that runs harness fixtures outside a test binary.
//!
//! Layout:
//! - `cli.rs`: argument parsing and command dispatch
//! - `commands/`: fixture handlers (origin double, proxy daemon, payload fixture)
//! - `error.rs`: CLI error type and exit codes
//! - `output.rs`: JSON renderers
//! - `main.rs`: thin entrypoint delegating to `run()`

pub(crate) mod cli;
pub(crate) mod commands;
pub(crate) mod error;
pub(crate) mod output;

pub use cli::run;
