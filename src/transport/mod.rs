//! transport
//!
//! The seam between the local repository and remote peers.
//!
//! # Architecture
//!
//! - [`traits`] - The [`Transport`] trait, [`PushOutcome`], [`RefSpec`], [`TransportError`]
//! - [`credentials`] - Opaque [`Credentials`] and their sources
//! - [`local`] - [`LocalTransport`], remotes that are in-process repositories
//! - [`mock`] - [`MockTransport`](mock::MockTransport), failure injection for tests
//!
//! Transports may fail without compromising local correctness: local refs
//! other than remote tracking refs are never written by a transport.

pub mod credentials;
pub mod local;
pub mod mock;
pub mod traits;

pub use credentials::{
    CredentialError, CredentialSource, Credentials, EnvCredentials, StaticCredentials,
};
pub use local::LocalTransport;
pub use traits::{FetchSummary, PushOutcome, RefSpec, RejectReason, Transport, TransportError};
