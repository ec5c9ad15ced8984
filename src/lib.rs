//! Treesync - content-addressed version history with push reconciliation
//!
//! Treesync keeps file snapshots as immutable, hash-addressed objects,
//! records them as commits on a branch, and pushes that branch to a peer.
//! A rejected push is never merged automatically: the peer's history is
//! fetched and the divergence is returned as a structured report.
//!
//! # Architecture
//!
//! - [`core`] - Domain types, repository layout, configuration, locking
//! - [`store`] - Object encoding, object store, reference store
//! - [`repo`] - A repository: one object store plus one reference store
//! - [`history`] - Commit graph queries and revision parsing
//! - [`diff`] - Path-level tree differences
//! - [`transport`] - Push/fetch abstraction, credentials, test doubles
//! - [`worktree`] - Destinations for working-tree writes
//! - [`sync`] - The controller tying it all together
//! - [`logging`] - Subscriber setup for hosts
//!
//! # Correctness Invariants
//!
//! 1. An object's id is the SHA-256 of its encoding; stored objects never change
//! 2. An object is stored only after everything it references
//! 3. References move by compare-and-swap; a failed operation leaves them untouched
//! 4. A push is only accepted as a fast-forward of the remote branch

pub mod core;
pub mod diff;
pub mod history;
pub mod logging;
pub mod repo;
pub mod store;
pub mod sync;
pub mod transport;
pub mod worktree;
