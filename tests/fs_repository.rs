//! Integration tests for on-disk repositories.
//!
//! These tests exercise the filesystem stores, configuration loading, and
//! the repository lock against directories created with tempfile.

use std::fs;

use tempfile::TempDir;

use treesync::core::config::schema::{AuthorConfig, RepoConfig};
use treesync::core::config::Config;
use treesync::core::ops::lock::{LockError, RepoLock};
use treesync::core::paths::RepoPaths;
use treesync::core::types::RefName;
use treesync::repo::Repository;
use treesync::store::StoreError;
use treesync::sync::{SyncController, SyncError, SyncOutcome};
use treesync::transport::{LocalTransport, StaticCredentials, TransportError};

// =============================================================================
// Test Helpers
// =============================================================================

/// A temporary directory holding an initialized repository.
struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        Repository::init(dir.path()).expect("init repository");
        Self { dir }
    }

    fn controller(&self, transport: LocalTransport) -> SyncController {
        SyncController::open(self.dir.path(), transport, StaticCredentials::default())
            .expect("open controller")
    }
}

// =============================================================================
// Repository lifecycle
// =============================================================================

#[test]
fn init_creates_layout_and_refuses_twice() {
    let repo = TestRepo::new();
    let paths = RepoPaths::new(repo.dir.path().to_path_buf());
    assert!(paths.objects_dir().is_dir());
    assert!(paths.refs_dir().join("heads").is_dir());

    assert!(matches!(
        Repository::init(repo.dir.path()),
        Err(StoreError::AlreadyExists { .. })
    ));
}

#[test]
fn open_requires_repository() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        Repository::open(dir.path()),
        Err(StoreError::NotARepo { .. })
    ));
    assert!(matches!(
        SyncController::open(dir.path(), LocalTransport::new(), StaticCredentials::default()),
        Err(SyncError::Store(StoreError::NotARepo { .. }))
    ));
}

#[test]
fn commit_writes_worktree_objects_and_ref() {
    let repo = TestRepo::new();
    let mut c = repo.controller(LocalTransport::new());

    let id = c
        .commit_change("docs/guide/intro.md", b"# Intro\n", "add guide")
        .unwrap();

    let on_disk = fs::read(repo.dir.path().join("docs/guide/intro.md")).unwrap();
    assert_eq!(on_disk, b"# Intro\n");

    let paths = RepoPaths::new(repo.dir.path().to_path_buf());
    assert!(paths.object_path(&id).is_file());
    let master = RefName::new("refs/heads/master").unwrap();
    let ref_file = fs::read_to_string(paths.ref_path(&master)).unwrap();
    assert_eq!(ref_file, format!("{}\n", id.to_hex()));
}

#[test]
fn history_survives_reopen() {
    let repo = TestRepo::new();
    let ids = {
        let mut c = repo.controller(LocalTransport::new());
        vec![
            c.commit_change("a.txt", b"1", "one").unwrap(),
            c.commit_change("a.txt", b"2", "two").unwrap(),
        ]
    };

    let c = repo.controller(LocalTransport::new());
    assert_eq!(c.head().unwrap(), Some(ids[1]));
    assert_eq!(c.file_at("HEAD~1", "a.txt").unwrap(), b"1");
    assert_eq!(c.file_at(&ids[1].short(6), "a.txt").unwrap(), b"2");

    let walked: Vec<_> = c.history_of("HEAD").unwrap().map(|e| e.unwrap().id).collect();
    assert_eq!(walked, vec![ids[1], ids[0]]);
}

#[test]
fn tampered_object_is_corrupt() {
    let repo = TestRepo::new();
    let mut c = repo.controller(LocalTransport::new());
    let id = c.commit_change("a.txt", b"hello", "init").unwrap();

    let objects = c.repository().objects();
    let commit = objects.read_commit(&id).unwrap();
    let tree = objects.read_tree(&commit.tree).unwrap();
    let blob = tree.get("a.txt").unwrap().target;

    let paths = RepoPaths::new(repo.dir.path().to_path_buf());
    fs::write(paths.object_path(&blob), b"blob 5\0jello").unwrap();

    assert!(matches!(
        c.file_at("HEAD", "a.txt"),
        Err(SyncError::CorruptObject(_))
    ));
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn repo_config_selects_branch_and_author() {
    let repo = TestRepo::new();
    let config = RepoConfig {
        branch: Some("main".into()),
        author: Some(AuthorConfig {
            name: Some("Grace".into()),
            email: Some("grace@example.com".into()),
        }),
        ..Default::default()
    };
    Config::write_repo(repo.dir.path(), &config).unwrap();

    let mut c = repo.controller(LocalTransport::new());
    assert_eq!(c.settings().branch.as_str(), "main");

    let id = c.commit_change("a.txt", b"x", "init").unwrap();
    let main = RefName::new("refs/heads/main").unwrap();
    assert_eq!(c.repository().refs().read(&main).unwrap(), Some(id));

    let commit = c.history().commit(&id).unwrap();
    assert_eq!(commit.author.name, "Grace");
    assert_eq!(commit.committer.email, "grace@example.com");
}

#[test]
fn invalid_repo_config_is_reported() {
    let repo = TestRepo::new();
    fs::write(
        repo.dir.path().join(".treesync/config.toml"),
        "unknown_key = true\n",
    )
    .unwrap();

    assert!(matches!(
        SyncController::open(repo.dir.path(), LocalTransport::new(), StaticCredentials::default()),
        Err(SyncError::Config(_))
    ));
}

// =============================================================================
// Locking and remotes
// =============================================================================

#[test]
fn held_lock_blocks_mutation() {
    let repo = TestRepo::new();
    let mut c = repo.controller(LocalTransport::new());
    let paths = RepoPaths::new(repo.dir.path().to_path_buf());

    let lock = RepoLock::acquire(&paths).unwrap();
    assert!(matches!(
        c.commit_change("a.txt", b"x", "init"),
        Err(SyncError::Lock(LockError::AlreadyLocked(_)))
    ));
    assert_eq!(c.head().unwrap(), None);
    assert!(!repo.dir.path().join("a.txt").exists());

    drop(lock);
    assert!(c.commit_change("a.txt", b"x", "init").is_ok());
}

#[test]
fn push_between_disk_repositories() {
    let local = TestRepo::new();
    let remote_dir = TempDir::new().unwrap();
    let remote = Repository::init(remote_dir.path()).unwrap();

    let transport = LocalTransport::new().with_remote("origin", remote.clone());
    let mut c = local.controller(transport);

    let outcome = c.sync("a.txt", b"hello", "init").unwrap();
    let head = c.head().unwrap().unwrap();
    assert_eq!(outcome, SyncOutcome::Pushed { head });

    let reopened = Repository::open(remote_dir.path()).unwrap();
    let master = RefName::new("refs/heads/master").unwrap();
    assert_eq!(reopened.refs().read(&master).unwrap(), Some(head));
    assert!(reopened.objects().contains(&head).unwrap());

    let tracking = RefName::new("refs/remotes/origin/master").unwrap();
    assert_eq!(c.repository().refs().read(&tracking).unwrap(), Some(head));
}

#[test]
fn locked_remote_fails_push_and_keeps_local_commit() {
    let local = TestRepo::new();
    let remote_dir = TempDir::new().unwrap();
    Repository::init(remote_dir.path()).unwrap();
    let other_writer = Repository::open(remote_dir.path()).unwrap();

    let transport =
        LocalTransport::new().with_remote("origin", Repository::open(remote_dir.path()).unwrap());
    let mut c = local.controller(transport);

    let held = other_writer.lock().unwrap();
    let outcome = c.sync("a.txt", b"hello", "init").unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Failed(TransportError::Locked("origin".into()))
    );

    let master = RefName::new("refs/heads/master").unwrap();
    assert_eq!(other_writer.refs().read(&master).unwrap(), None);
    let head = c.head().unwrap().unwrap();

    drop(held);
    assert_eq!(c.push("origin").unwrap(), SyncOutcome::Pushed { head });
    assert_eq!(other_writer.refs().read(&master).unwrap(), Some(head));
}

#[test]
fn fetch_waits_for_local_lock() {
    let repo = TestRepo::new();
    let remote = Repository::in_memory();
    let mut c = repo.controller(LocalTransport::new().with_remote("origin", remote.clone()));
    c.commit_change("a.txt", b"x", "init").unwrap();
    c.push("origin").unwrap();

    let paths = RepoPaths::new(repo.dir.path().to_path_buf());
    let lock = RepoLock::acquire(&paths).unwrap();
    assert!(matches!(
        c.fetch("origin"),
        Err(SyncError::Lock(LockError::AlreadyLocked(_)))
    ));
    drop(lock);
    assert!(c.fetch("origin").is_ok());
}
