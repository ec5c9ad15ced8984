//! core::ops
//!
//! Repository-wide operation guards.
//!
//! # Modules
//!
//! - [`lock`] - Exclusive repository lock

pub mod lock;
