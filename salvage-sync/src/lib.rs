//! # salvage-sync
//!
//! Remote repository access and the sync engine.
//!
//! [`pipeline::run`] enumerates a [`StackSource`](salvage_source::StackSource)
//! and hands the stacks to [`sync_stacks`], which compares each one with its
//! remote copy and writes only what changed. [`GitHubRepository`] talks to the
//! GitHub contents API; [`MemoryRepository`] keeps everything in process.

pub mod diff;
pub mod engine;
pub mod error;
pub mod github;
pub mod memory;
pub mod pipeline;
pub mod repository;

pub use diff::{diff_stacks, StackDiff};
pub use engine::{commit_message, sync_stacks, SyncOptions};
pub use error::{RepoError, SyncError};
pub use github::GitHubRepository;
pub use memory::MemoryRepository;
pub use repository::{
    remote_path, stack_name_from_path, PutOutcome, RemoteEntry, RemoteRepository,
    STACK_FILE_EXTENSION,
};
