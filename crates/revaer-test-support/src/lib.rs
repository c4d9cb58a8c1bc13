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

//! End-to-end harness for a peer-to-peer file-distribution engine.
//! Layout: fixtures.rs + metainfo.rs (content and descriptors), engine/ (surface of the
//! engine under test plus a loopback double), swarm.rs (topology wiring), drain.rs +
//! report.rs (event checks), origin/ (HTTP double), proxy.rs (proxy daemon lifecycle),
//! config.rs (environment overrides), error.rs (harness errors).
//!
//! Every piece of a synthesized payload is identical and its descriptor lists one
//! digest for all of them. An engine that checks pieces against the wrong index
//! still passes verification with these fixtures.

pub mod config;
pub mod drain;
pub mod engine;
pub mod error;
pub mod fixtures;
pub mod metainfo;
pub mod origin;
pub mod proxy;
pub mod report;
pub mod swarm;

pub use config::{HarnessConfig, OriginConfig, ProxyConfig};
pub use drain::{DrainPolicy, drain_events};
pub use error::{HarnessError, HarnessResult};
pub use report::CheckReport;
pub use swarm::{ContentSource, SwarmMembers, SwarmOptions, SwarmTransfers, setup_transfer};
