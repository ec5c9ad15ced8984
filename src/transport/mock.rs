//! transport::mock
//!
//! Failure-injecting transport wrapper for deterministic testing.
//!
//! # Design
//!
//! `MockTransport` wraps any real transport (usually a
//! [`LocalTransport`](super::LocalTransport)), records every call, and can
//! be configured to fail a given operation or to reject pushes without
//! consulting the peer. State is shared across clones, so a test can keep a
//! handle after moving the transport into a controller.
//!
//! # Example
//!
//! ```
//! use treesync::repo::Repository;
//! use treesync::transport::mock::{FailOn, MockOperation, MockTransport};
//! use treesync::transport::{LocalTransport, Transport, TransportError};
//!
//! let transport = MockTransport::new(LocalTransport::new())
//!     .fail_on(FailOn::Fetch(TransportError::Network("timed out".into())));
//!
//! let local = Repository::in_memory();
//! assert!(transport.fetch(&local, "origin").is_err());
//! assert_eq!(
//!     transport.operations(),
//!     vec![MockOperation::Fetch { remote: "origin".into() }]
//! );
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use super::credentials::Credentials;
use super::traits::{FetchSummary, PushOutcome, RefSpec, RejectReason, Transport, TransportError};
use crate::repo::Repository;
use crate::store::RefEntry;

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    /// Fail fetch with the given error.
    Fetch(TransportError),
    /// Fail push with the given error.
    Push(TransportError),
    /// Answer every push with this rejection.
    RejectPush(RejectReason),
    /// Fail list_remote_refs with the given error.
    ListRemoteRefs(TransportError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    Fetch { remote: String },
    Push { remote: String, spec: RefSpec },
    ListRemoteRefs { url: String },
}

#[derive(Debug, Default)]
struct MockState {
    fail_on: Option<FailOn>,
    operations: Vec<MockOperation>,
}

/// Mock transport for testing.
#[derive(Debug, Clone)]
pub struct MockTransport<T> {
    inner: T,
    state: Arc<Mutex<MockState>>,
}

impl<T: Transport> MockTransport<T> {
    /// Wrap a transport; with no failure configured, calls pass through.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Configure the mock to fail on a specific operation.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.set_fail_on(fail_on);
        self
    }

    /// Change the failure configuration on a shared handle.
    pub fn set_fail_on(&self, fail_on: FailOn) {
        self.state.lock().fail_on = Some(fail_on);
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        self.state.lock().fail_on = None;
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.state.lock().operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.state.lock().operations.clear();
    }

    /// The wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn record(&self, op: MockOperation) {
        self.state.lock().operations.push(op);
    }

    fn configured(&self) -> Option<FailOn> {
        self.state.lock().fail_on.clone()
    }
}

impl<T: Transport> Transport for MockTransport<T> {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn fetch(&self, local: &Repository, remote: &str) -> Result<FetchSummary, TransportError> {
        self.record(MockOperation::Fetch {
            remote: remote.to_string(),
        });
        if let Some(FailOn::Fetch(e)) = self.configured() {
            return Err(e);
        }
        self.inner.fetch(local, remote)
    }

    fn push(
        &self,
        local: &Repository,
        remote: &str,
        spec: &RefSpec,
        credentials: &Credentials,
    ) -> Result<PushOutcome, TransportError> {
        self.record(MockOperation::Push {
            remote: remote.to_string(),
            spec: spec.clone(),
        });
        match self.configured() {
            Some(FailOn::Push(e)) => Err(e),
            Some(FailOn::RejectPush(reason)) => Ok(PushOutcome::Rejected(reason)),
            _ => self.inner.push(local, remote, spec, credentials),
        }
    }

    fn list_remote_refs(
        &self,
        url: &str,
        credentials: &Credentials,
    ) -> Result<Vec<RefEntry>, TransportError> {
        self.record(MockOperation::ListRemoteRefs {
            url: url.to_string(),
        });
        if let Some(FailOn::ListRemoteRefs(e)) = self.configured() {
            return Err(e);
        }
        self.inner.list_remote_refs(url, credentials)
    }
}
