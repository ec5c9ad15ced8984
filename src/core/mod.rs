//! core
//!
//! Core domain types, configuration, and repository-wide guards.
//!
//! # Modules
//!
//! - [`types`] - Strong types: ObjectId, RefName, BranchName, RepoPath, UtcTimestamp
//! - [`config`] - Configuration schema and loading
//! - [`paths`] - Centralized path routing for on-disk storage
//! - [`ops`] - Repository lock
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing

pub mod config;
pub mod ops;
pub mod paths;
pub mod types;
