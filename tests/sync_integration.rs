//! Integration tests for the sync controller.
//!
//! Two or more controllers share a remote through `LocalTransport`, so
//! pushes, rejections, and reconciliation run end to end in memory.

use std::sync::Arc;

use treesync::core::types::{ObjectId, RefName, RepoPath};
use treesync::diff::{ChangeType, DiffOptions, TreeDiffer};
use treesync::repo::Repository;
use treesync::store::{MemoryObjectStore, MemoryRefStore, ObjectStore, StoreError};
use treesync::sync::{SyncController, SyncError, SyncOutcome, SyncPhase, SyncSettings};
use treesync::transport::mock::{FailOn, MockOperation, MockTransport};
use treesync::transport::{
    CredentialError, CredentialSource, Credentials, LocalTransport, RejectReason,
    StaticCredentials, TransportError,
};
use treesync::worktree::MemoryWorktree;

// =============================================================================
// Test Helpers
// =============================================================================

/// A shared remote plus a transport that can reach it as `origin`.
struct Remote {
    repo: Repository,
    transport: LocalTransport,
}

impl Remote {
    fn new() -> Self {
        let repo = Repository::in_memory();
        let transport = LocalTransport::new().with_remote("origin", repo.clone());
        Self { repo, transport }
    }

    fn head(&self) -> Option<ObjectId> {
        self.repo.refs().read(&master()).unwrap()
    }

    /// A fresh local repository pushing to this remote.
    fn client(&self) -> SyncController {
        SyncController::new(
            Repository::in_memory(),
            self.transport.clone(),
            MemoryWorktree::new(),
            StaticCredentials::default(),
            SyncSettings::default(),
        )
    }
}

fn master() -> RefName {
    RefName::new("refs/heads/master").unwrap()
}

fn history(controller: &SyncController, rev: &str) -> Vec<ObjectId> {
    controller
        .history_of(rev)
        .unwrap()
        .map(|entry| entry.unwrap().id)
        .collect()
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn first_commit_in_empty_repository() {
    let remote = Remote::new();
    let mut c = remote.client();

    let id = c.commit_change("a.txt", b"hello", "init").unwrap();

    assert_eq!(c.head().unwrap(), Some(id));
    assert_eq!(history(&c, "HEAD"), vec![id]);

    let objects = c.repository().objects();
    let commit = objects.read_commit(&id).unwrap();
    assert!(commit.parents.is_empty());
    let tree = objects.read_tree(&commit.tree).unwrap();
    assert_eq!(tree.len(), 1);
    let entry = tree.get("a.txt").unwrap();
    assert_eq!(entry.target, ObjectId::hash(b"blob 5\0hello"));
    assert_eq!(objects.read_blob(&entry.target).unwrap().as_bytes(), b"hello");
}

#[test]
fn sequential_commits_to_same_path() {
    let remote = Remote::new();
    let mut c = remote.client();

    let first = c.commit_change("notes/today.md", b"draft", "draft").unwrap();
    let second = c.commit_change("notes/today.md", b"final", "final").unwrap();

    assert_eq!(c.file_at("HEAD", "notes/today.md").unwrap(), b"final");
    assert_eq!(c.file_at(&first.to_hex(), "notes/today.md").unwrap(), b"draft");

    let diff = c.diff_revisions(&first.to_hex(), &second.to_hex()).unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].change, ChangeType::Modify);
    assert_eq!(diff[0].path().unwrap().as_str(), "notes/today.md");
    assert_eq!(diff[0].old_id, Some(ObjectId::hash(b"blob 5\0draft")));
    assert_eq!(diff[0].new_id, Some(ObjectId::hash(b"blob 5\0final")));
}

#[test]
fn diverged_push_is_reconciled_into_report() {
    let remote = Remote::new();
    let mut alice = remote.client();
    let mut bob = remote.client();

    let theirs = match alice.sync("shared.txt", b"alice", "alice").unwrap() {
        SyncOutcome::Pushed { head } => head,
        other => panic!("expected push, got {other:?}"),
    };
    bob.commit_change("bob.txt", b"bob", "bob").unwrap();
    let ours = bob.head().unwrap().unwrap();

    let report = match bob.push("origin").unwrap() {
        SyncOutcome::Conflicted(report) => report,
        other => panic!("expected conflict, got {other:?}"),
    };
    assert_eq!(bob.phase(), SyncPhase::Conflicted);
    assert_eq!(remote.head(), Some(theirs));
    assert_eq!(bob.head().unwrap(), Some(ours));

    assert_eq!(report.reason, RejectReason::NonFastForward);
    assert_eq!(report.local_head, ours);
    assert_eq!(report.remote_head, Some(theirs));
    assert_eq!(report.merge_base, None);
    assert_eq!((report.ahead, report.behind), (1, 1));
    assert!(report.is_diverged());

    // Same entries as comparing the two trees directly.
    let objects = bob.repository().objects();
    let local_tree = objects.read_commit(&ours).unwrap().tree;
    let remote_tree = objects.read_commit(&theirs).unwrap().tree;
    let expected = TreeDiffer::new(objects.as_ref(), DiffOptions::default())
        .diff(Some(&local_tree), Some(&remote_tree))
        .unwrap();
    assert_eq!(report.entries, expected);

    let changes: Vec<_> = report
        .entries
        .iter()
        .map(|e| (e.change, e.path().unwrap().as_str()))
        .collect();
    assert_eq!(
        changes,
        vec![(ChangeType::Delete, "bob.txt"), (ChangeType::Add, "shared.txt")]
    );

    // The fetched remote tip is now readable locally.
    assert_eq!(bob.file_at("origin/master", "shared.txt").unwrap(), b"alice");
}

#[test]
fn report_includes_merge_base_for_shared_history() {
    let remote = Remote::new();
    let mut alice = remote.client();
    alice.sync("a.txt", b"1", "base").unwrap();
    let base = alice.head().unwrap().unwrap();

    // Bob starts from the pushed history.
    let mut bob = remote.client();
    bob.fetch("origin").unwrap();
    let bob_repo = bob.repository().clone();
    bob_repo
        .refs()
        .update(&master(), &base, None)
        .unwrap();

    alice.sync("a.txt", b"2", "alice").unwrap();
    bob.commit_change("b.txt", b"x", "bob one").unwrap();
    bob.commit_change("b.txt", b"y", "bob two").unwrap();

    let report = match bob.push("origin").unwrap() {
        SyncOutcome::Conflicted(report) => report,
        other => panic!("expected conflict, got {other:?}"),
    };
    assert_eq!(report.merge_base, Some(base));
    assert_eq!((report.ahead, report.behind), (2, 1));
    assert_eq!(report.entries_of(ChangeType::Modify).count(), 1);
    assert_eq!(report.entries_of(ChangeType::Delete).count(), 1);

    let json = serde_json::to_value(SyncOutcome::Conflicted(report)).unwrap();
    assert_eq!(json["outcome"], "conflicted");
    assert_eq!(json["detail"]["ahead"], 2);
}

#[test]
fn history_is_newest_first_and_restartable() {
    let remote = Remote::new();
    let mut c = remote.client();
    let ids: Vec<_> = ["one", "two", "three"]
        .iter()
        .map(|m| c.commit_change("f.txt", m.as_bytes(), m).unwrap())
        .collect();

    let walked = history(&c, "HEAD");
    assert_eq!(walked, vec![ids[2], ids[1], ids[0]]);
    assert_eq!(history(&c, "HEAD"), walked);
    assert_eq!(history(&c, "HEAD~1"), vec![ids[1], ids[0]]);

    let messages: Vec<_> = c
        .history_of("master")
        .unwrap()
        .map(|e| e.unwrap().commit.message.clone())
        .collect();
    assert_eq!(messages, ["three", "two", "one"]);
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn fast_forward_is_accepted_and_divergence_rejected() {
    let remote = Remote::new();
    let mut c = remote.client();

    for i in 0..3 {
        let content = format!("v{i}");
        let outcome = c.sync("f.txt", content.as_bytes(), &content).unwrap();
        let head = c.head().unwrap().unwrap();
        assert_eq!(outcome, SyncOutcome::Pushed { head });
        assert_eq!(remote.head(), Some(head));
    }

    // Rewind locally: the remote head is no longer an ancestor.
    let rewound = c.history().resolve("HEAD~2").unwrap();
    let head = c.head().unwrap().unwrap();
    c.repository()
        .refs()
        .update(&master(), &rewound, Some(&head))
        .unwrap();
    c.commit_change("g.txt", b"side", "side").unwrap();
    assert!(!c
        .history()
        .is_ancestor(&head, &c.head().unwrap().unwrap())
        .unwrap());
    assert!(matches!(c.push("origin").unwrap(), SyncOutcome::Conflicted(_)));
    assert_eq!(remote.head(), Some(head));
}

#[test]
fn committed_content_reads_back_exactly() {
    let remote = Remote::new();
    let mut c = remote.client();
    let content: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

    let id = c.commit_change("bin/data", &content, "binary").unwrap();

    let objects = c.repository().objects();
    let tree = objects.read_tree(&objects.read_commit(&id).unwrap().tree).unwrap();
    let bin = objects.read_tree(&tree.get("bin").unwrap().target).unwrap();
    let blob = objects.read_blob(&bin.get("data").unwrap().target).unwrap();
    assert_eq!(blob.as_bytes(), content.as_slice());
    assert_eq!(c.file_at(&id.short(8), "bin/data").unwrap(), content);
}

#[test]
fn changes_in_lists_commit_delta() {
    let remote = Remote::new();
    let mut c = remote.client();
    c.commit_change("a.txt", b"1", "one").unwrap();
    c.commit_change("dir/b.txt", b"2", "two").unwrap();

    let root = c.changes_in("HEAD~1").unwrap();
    assert_eq!(root.len(), 1);
    assert_eq!(root[0].change, ChangeType::Add);

    let second = c.changes_in("HEAD").unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].path().unwrap().as_str(), "dir/b.txt");

    let back = c.diff_against("HEAD~1").unwrap();
    assert_eq!(back, second);
}

// =============================================================================
// Failure handling
// =============================================================================

#[test]
fn transport_failure_is_surfaced_and_retryable() {
    let remote = Remote::new();
    let transport = MockTransport::new(remote.transport.clone())
        .fail_on(FailOn::Push(TransportError::Network("connection reset".into())));
    let mut c = SyncController::new(
        Repository::in_memory(),
        transport.clone(),
        MemoryWorktree::new(),
        StaticCredentials::default(),
        SyncSettings::default(),
    );

    let outcome = c.sync("a.txt", b"x", "init").unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Failed(TransportError::Network("connection reset".into()))
    );
    assert_eq!(c.phase(), SyncPhase::Failed);
    let head = c.head().unwrap().unwrap();
    assert_eq!(remote.head(), None);

    transport.clear_fail_on();
    assert_eq!(c.push("origin").unwrap(), SyncOutcome::Pushed { head });
    assert_eq!(remote.head(), Some(head));
    assert_eq!(transport.operations().len(), 2);
}

#[test]
fn rejection_fetches_before_reporting() {
    let remote = Remote::new();
    let transport = MockTransport::new(remote.transport.clone())
        .fail_on(FailOn::RejectPush(RejectReason::Other("locked".into())));
    let mut c = SyncController::new(
        Repository::in_memory(),
        transport.clone(),
        MemoryWorktree::new(),
        StaticCredentials::default(),
        SyncSettings::default(),
    );

    let report = match c.sync("a.txt", b"x", "init").unwrap() {
        SyncOutcome::Conflicted(report) => report,
        other => panic!("expected conflict, got {other:?}"),
    };
    assert_eq!(report.reason, RejectReason::Other("locked".into()));
    assert_eq!(report.remote_head, None);
    assert_eq!((report.ahead, report.behind), (1, 0));
    assert_eq!(report.entries_of(ChangeType::Delete).count(), 1);

    let ops = transport.operations();
    assert!(matches!(ops[0], MockOperation::Push { .. }));
    assert_eq!(
        ops[1],
        MockOperation::Fetch {
            remote: "origin".into()
        }
    );
}

#[test]
fn wrong_credentials_fail_without_reconciliation() {
    let remote = Remote::new();
    let secret = Credentials::new("ci", "s3cret");
    remote
        .transport
        .require_credentials("origin", secret.clone())
        .unwrap();

    let mut anonymous = remote.client();
    let outcome = anonymous.sync("a.txt", b"x", "init").unwrap();
    assert!(matches!(
        outcome,
        SyncOutcome::Failed(TransportError::AuthFailed(_))
    ));

    let mut authorized = SyncController::new(
        Repository::in_memory(),
        remote.transport.clone(),
        MemoryWorktree::new(),
        StaticCredentials::new(secret),
        SyncSettings::default(),
    );
    assert!(matches!(
        authorized.sync("a.txt", b"x", "init").unwrap(),
        SyncOutcome::Pushed { .. }
    ));
}

#[derive(Debug)]
struct NoCredentials;

impl CredentialSource for NoCredentials {
    fn credentials(&self, remote: &str) -> Result<Credentials, CredentialError> {
        Err(CredentialError::Incomplete(format!("no token for {remote}")))
    }
}

#[test]
fn credential_lookup_failure_is_auth_failure() {
    let remote = Remote::new();
    let mut c = SyncController::new(
        Repository::in_memory(),
        remote.transport.clone(),
        MemoryWorktree::new(),
        NoCredentials,
        SyncSettings::default(),
    );
    let outcome = c.sync("a.txt", b"x", "init").unwrap();
    assert!(matches!(
        outcome,
        SyncOutcome::Failed(TransportError::AuthFailed(_))
    ));
    assert!(c.head().unwrap().is_some());
}

/// Object store whose writes fail after a set number of objects.
#[derive(Debug)]
struct FlakyObjectStore {
    inner: MemoryObjectStore,
    budget: parking_lot::Mutex<usize>,
}

impl ObjectStore for FlakyObjectStore {
    fn read_raw(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.read_raw(id)
    }

    fn write_raw(&self, id: &ObjectId, encoded: &[u8]) -> Result<bool, StoreError> {
        let mut budget = self.budget.lock();
        if *budget == 0 {
            return Err(StoreError::Io {
                path: "objects".into(),
                source: std::io::Error::other("no space left on device"),
            });
        }
        *budget -= 1;
        self.inner.write_raw(id, encoded)
    }

    fn contains(&self, id: &ObjectId) -> Result<bool, StoreError> {
        self.inner.contains(id)
    }

    fn ids_with_prefix(&self, hex_prefix: &str) -> Result<Vec<ObjectId>, StoreError> {
        self.inner.ids_with_prefix(hex_prefix)
    }
}

#[test]
fn object_write_failure_leaves_head_unchanged() {
    // blob + tree + commit for the first change, then blob + tree only
    let objects = Arc::new(FlakyObjectStore {
        inner: MemoryObjectStore::new(),
        budget: parking_lot::Mutex::new(5),
    });
    let repo = Repository::from_stores(objects, Arc::new(MemoryRefStore::new()));
    let worktree = MemoryWorktree::new();
    let mut c = SyncController::new(
        repo,
        LocalTransport::new(),
        worktree.clone(),
        StaticCredentials::default(),
        SyncSettings::default(),
    );

    let first = c.commit_change("a.txt", b"one", "one").unwrap();
    let err = c.commit_change("a.txt", b"two", "two").unwrap_err();
    assert!(matches!(err, SyncError::Write(_)), "{err}");
    assert_eq!(c.head().unwrap(), Some(first));
    assert_eq!(c.phase(), SyncPhase::Failed);
    assert_eq!(c.file_at("HEAD", "a.txt").unwrap(), b"one");

    // The working tree was written before staging failed.
    let path = RepoPath::new("a.txt").unwrap();
    assert_eq!(worktree.read(&path), Some(b"two".to_vec()));
}

#[test]
fn bad_revisions_are_invalid_references() {
    let remote = Remote::new();
    let mut c = remote.client();
    assert!(matches!(c.history_of("HEAD"), Err(SyncError::InvalidReference(_))));

    c.commit_change("a.txt", b"x", "init").unwrap();
    for rev in ["HEAD~1", "HEAD^2", "no-such-branch", "HEAD@{1}", "zzzz"] {
        assert!(
            matches!(c.file_at(rev, "a.txt"), Err(SyncError::InvalidReference(_))),
            "{rev}"
        );
    }
}

#[test]
fn ambiguous_abbreviation_is_invalid_reference() {
    let remote = Remote::new();
    let mut c = remote.client();
    c.commit_change("a.txt", b"x", "init").unwrap();

    let objects = c.repository().objects();
    let mut seen = std::collections::HashSet::new();
    let prefix = (0..=0x10000)
        .map(|n| objects.put_blob(format!("filler {n}").as_bytes()).unwrap())
        .map(|id| id.to_hex()[..4].to_string())
        .find(|prefix| !seen.insert(prefix.clone()))
        .unwrap();

    assert!(matches!(
        c.diff_revisions(&prefix, "HEAD"),
        Err(SyncError::InvalidReference(_))
    ));
    assert!(matches!(
        c.diff_revisions("HEAD", &format!("{prefix}~0")),
        Err(SyncError::InvalidReference(_))
    ));
}

// =============================================================================
// Phases
// =============================================================================

#[test]
fn phases_follow_each_attempt() {
    let remote = Remote::new();
    let mut c = remote.client();
    assert_eq!(c.phase(), SyncPhase::Idle);

    c.commit_change("a.txt", b"x", "init").unwrap();
    assert_eq!(c.phase(), SyncPhase::Committed);

    c.push("origin").unwrap();
    assert_eq!(c.phase(), SyncPhase::Pushed);
    assert!(c.phase().is_terminal());

    c.commit_change("a.txt", b"y", "next").unwrap();
    assert_eq!(c.phase(), SyncPhase::Committed);

    let _ = c.commit_change("a.txt/b", b"z", "bad");
    assert_eq!(c.phase(), SyncPhase::Failed);
}

// =============================================================================
// Remote queries
// =============================================================================

#[test]
fn remote_history_and_branch_listing() {
    let remote = Remote::new();
    let mut alice = remote.client();
    alice.sync("a.txt", b"1", "one").unwrap();
    alice.sync("a.txt", b"2", "two").unwrap();

    let bob = remote.client();
    let ids: Vec<_> = bob
        .remote_history("origin", "master")
        .unwrap()
        .map(|e| e.unwrap().id)
        .collect();
    assert_eq!(ids, history(&alice, "HEAD"));

    let branches = bob.list_remote_branches(Some("local://origin")).unwrap();
    let names: Vec<_> = branches.iter().map(|b| b.as_str()).collect();
    assert_eq!(names, ["master"]);

    assert!(matches!(
        bob.list_remote_branches(None),
        Err(SyncError::InvalidReference(_))
    ));
    assert!(matches!(
        bob.list_remote_branches(Some("local://nowhere")),
        Err(SyncError::Transport(TransportError::UnknownRemote(_)))
    ));
}
