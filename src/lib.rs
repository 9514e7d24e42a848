//! # hotbackup-sync
//!
//! Synchronizes hot-backups of a Riak KV / Leveled cluster between a
//! node's local filesystem and an S3-compatible object store, and allows
//! retrieving a single object from that backup without restoring it.
//!
//! - The ring, manifest, and journal formats are Erlang External Term
//!   Format (`etf`); nothing here writes into a live Riak node.
//! - `backup`/`restore`/`retrieve` (see `orchestrate`) are the three
//!   entry points a CLI or another program drives.
//! - Manifests and journals are immutable once written under a tag; the
//!   top-level `MANIFESTS` object is append-only.

pub mod cdb;
pub mod config;
pub mod error;
pub mod etf;
pub mod hints;
pub mod journal;
pub mod manifest;
pub mod orchestrate;
pub mod ring;
pub mod router;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
pub use etf::Term;
pub use orchestrate::{backup, list_versions, restore, retrieve, RetrieveOutcome};
