//! store::object
//!
//! Immutable object value types and their canonical encoding.
//!
//! # Encoding
//!
//! Every object encodes as `"<kind> <len>\0<body>"`; its [`ObjectId`] is the
//! SHA-256 of the full encoding. This is git's SHA-256 object format:
//!
//! - blob body: raw bytes
//! - tree body: per entry `"<mode> <name>\0<32 raw id bytes>"`
//! - commit body: `tree`, `parent`*, `author`, `committer` header lines, a
//!   blank line, then the message
//!
//! Tree entries are ordered by name bytes, comparing directory names as if
//! they ended in `/`. A depth-first walk therefore visits full paths in
//! lexicographic order.
//!
//! # Example
//!
//! ```
//! use treesync::store::object::{Blob, EntryMode, Object, Tree, TreeEntry};
//!
//! let blob = Object::Blob(Blob::new(b"hello".to_vec()));
//! let entry = TreeEntry::new("a.txt", EntryMode::File, blob.id()).unwrap();
//! let tree = Object::Tree(Tree::new(vec![entry]).unwrap());
//!
//! let decoded = Object::decode(&tree.encode()).unwrap();
//! assert_eq!(decoded, tree);
//! assert_eq!(decoded.id(), tree.id());
//! ```

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{ObjectId, RepoPath, UtcTimestamp};

/// Errors from building or decoding objects.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ObjectError {
    /// Tree entry name is not a single valid path segment.
    #[error("invalid entry name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Two tree entries share a name.
    #[error("duplicate tree entry '{0}'")]
    DuplicateEntry(String),

    /// Author/committer identity cannot be encoded.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Bytes do not decode as an object.
    #[error("malformed object: {0}")]
    Malformed(String),
}

fn malformed(msg: impl Into<String>) -> ObjectError {
    ObjectError::Malformed(msg.into())
}

/// The three object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl ObjectKind {
    /// Header tag used in the encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
        }
    }

    fn parse(s: &str) -> Result<Self, ObjectError> {
        match s {
            "blob" => Ok(ObjectKind::Blob),
            "tree" => Ok(ObjectKind::Tree),
            "commit" => Ok(ObjectKind::Commit),
            other => Err(malformed(format!("unknown object kind '{other}'"))),
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// File content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Tree entry mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryMode {
    /// Regular file
    File,
    /// Executable file
    Executable,
    /// Sub-tree
    Directory,
}

impl EntryMode {
    /// Octal mode string used in the tree encoding.
    pub fn as_octal(&self) -> &'static str {
        match self {
            EntryMode::File => "100644",
            EntryMode::Executable => "100755",
            EntryMode::Directory => "40000",
        }
    }

    fn parse(s: &str) -> Result<Self, ObjectError> {
        match s {
            "100644" => Ok(EntryMode::File),
            "100755" => Ok(EntryMode::Executable),
            "40000" => Ok(EntryMode::Directory),
            other => Err(malformed(format!("unknown entry mode '{other}'"))),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, EntryMode::Directory)
    }
}

/// One named slot in a directory snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub mode: EntryMode,
    pub target: ObjectId,
}

impl TreeEntry {
    /// Create an entry, validating the name as a single path segment.
    ///
    /// # Errors
    ///
    /// Returns `ObjectError::InvalidName` for empty names, `.`/`..`, or names
    /// containing `/` or NUL.
    pub fn new(name: impl Into<String>, mode: EntryMode, target: ObjectId) -> Result<Self, ObjectError> {
        let name = name.into();
        if name.contains('/') {
            return Err(ObjectError::InvalidName {
                name,
                reason: "contains '/'".into(),
            });
        }
        RepoPath::validate_segment(&name).map_err(|reason| ObjectError::InvalidName {
            name: name.clone(),
            reason: reason.into(),
        })?;
        Ok(Self { name, mode, target })
    }

    pub fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }

    /// Canonical tree order: name bytes, directories compared with a trailing `/`.
    pub fn canonical_cmp(&self, other: &TreeEntry) -> Ordering {
        fn key(e: &TreeEntry) -> impl Iterator<Item = &u8> {
            let suffix: &[u8] = if e.is_dir() { b"/" } else { b"" };
            e.name.as_bytes().iter().chain(suffix.iter())
        }
        key(self).cmp(key(other))
    }
}

/// A directory snapshot: entries unique by name, kept in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// The empty tree.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a tree from entries in any order.
    ///
    /// # Errors
    ///
    /// Returns `ObjectError::DuplicateEntry` if two entries share a name.
    pub fn new(mut entries: Vec<TreeEntry>) -> Result<Self, ObjectError> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.name.as_str()) {
                return Err(ObjectError::DuplicateEntry(entry.name.clone()));
            }
        }
        entries.sort_by(|a, b| a.canonical_cmp(b));
        Ok(Self { entries })
    }

    /// Entries in canonical order.
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Return a new tree with `entry` inserted, replacing any same-named entry.
    /// All other entries are carried over unchanged.
    pub fn with_entry(&self, entry: TreeEntry) -> Tree {
        let mut entries: Vec<TreeEntry> = self
            .entries
            .iter()
            .filter(|e| e.name != entry.name)
            .cloned()
            .collect();
        let pos = entries
            .binary_search_by(|e| e.canonical_cmp(&entry))
            .unwrap_or_else(|p| p);
        entries.insert(pos, entry);
        Tree { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Identity and time attached to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub time: UtcTimestamp,
}

impl Signature {
    /// Create a signature.
    ///
    /// # Errors
    ///
    /// Returns `ObjectError::InvalidIdentity` if name or email contain
    /// characters that would break the header encoding.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        time: UtcTimestamp,
    ) -> Result<Self, ObjectError> {
        let name = name.into();
        let email = email.into();
        Self::validate_identity(&name, &email)?;
        Ok(Self { name, email, time })
    }

    /// Check that a name/email pair can be encoded.
    pub fn validate_identity(name: &str, email: &str) -> Result<(), ObjectError> {
        for (field, value) in [("name", name), ("email", email)] {
            if value.contains(['<', '>', '\n', '\0']) {
                return Err(ObjectError::InvalidIdentity(format!(
                    "{field} cannot contain '<', '>', newline or NUL"
                )));
            }
        }
        if name.starts_with(' ') || name.ends_with(' ') {
            return Err(ObjectError::InvalidIdentity(
                "name cannot start or end with a space".into(),
            ));
        }
        Ok(())
    }

    fn encode(&self) -> String {
        format!("{} <{}> {} +0000", self.name, self.email, self.time.unix())
    }

    fn decode(s: &str) -> Result<Self, ObjectError> {
        let (name, rest) = s
            .split_once(" <")
            .or_else(|| s.strip_prefix('<').map(|r| ("", r)))
            .ok_or_else(|| malformed("signature missing '<'"))?;
        let (email, rest) = rest
            .split_once("> ")
            .ok_or_else(|| malformed("signature missing '>'"))?;
        let secs = rest.split(' ').next().unwrap_or_default();
        let secs: i64 = secs
            .parse()
            .map_err(|_| malformed(format!("bad signature time '{secs}'")))?;
        let time = UtcTimestamp::from_unix(secs).map_err(|e| malformed(e.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            email: email.to_string(),
            time,
        })
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// A snapshot in history.
///
/// Parent order matters: the first parent is the "previous" side for diffs
/// and first-parent traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl Commit {
    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    pub fn first_parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}

/// Any stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Blob(_) => ObjectKind::Blob,
            Object::Tree(_) => ObjectKind::Tree,
            Object::Commit(_) => ObjectKind::Commit,
        }
    }

    /// Content hash of the canonical encoding.
    pub fn id(&self) -> ObjectId {
        ObjectId::hash(&self.encode())
    }

    /// Ids this object points at. These must exist before it may be stored.
    pub fn references(&self) -> Vec<ObjectId> {
        match self {
            Object::Blob(_) => Vec::new(),
            Object::Tree(tree) => tree.entries().iter().map(|e| e.target).collect(),
            Object::Commit(commit) => std::iter::once(commit.tree)
                .chain(commit.parents.iter().copied())
                .collect(),
        }
    }

    /// Canonical encoding (header + body).
    pub fn encode(&self) -> Vec<u8> {
        let body = self.encode_body();
        let mut out = format!("{} {}\0", self.kind(), body.len()).into_bytes();
        out.extend_from_slice(&body);
        out
    }

    fn encode_body(&self) -> Vec<u8> {
        match self {
            Object::Blob(blob) => blob.as_bytes().to_vec(),
            Object::Tree(tree) => {
                let mut out = Vec::new();
                for entry in tree.entries() {
                    out.extend_from_slice(entry.mode.as_octal().as_bytes());
                    out.push(b' ');
                    out.extend_from_slice(entry.name.as_bytes());
                    out.push(0);
                    out.extend_from_slice(entry.target.as_bytes());
                }
                out
            }
            Object::Commit(commit) => {
                let mut out = format!("tree {}\n", commit.tree);
                for parent in &commit.parents {
                    out.push_str(&format!("parent {}\n", parent));
                }
                out.push_str(&format!("author {}\n", commit.author.encode()));
                out.push_str(&format!("committer {}\n", commit.committer.encode()));
                out.push('\n');
                out.push_str(&commit.message);
                out.into_bytes()
            }
        }
    }

    /// Decode a canonical encoding.
    ///
    /// # Errors
    ///
    /// Returns `ObjectError::Malformed` if the header, length, or body is invalid.
    pub fn decode(bytes: &[u8]) -> Result<Object, ObjectError> {
        let nul = bytes
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| malformed("missing header terminator"))?;
        let header =
            std::str::from_utf8(&bytes[..nul]).map_err(|_| malformed("header is not UTF-8"))?;
        let (kind, len) = header
            .split_once(' ')
            .ok_or_else(|| malformed("header missing length"))?;
        let kind = ObjectKind::parse(kind)?;
        let len: usize = len
            .parse()
            .map_err(|_| malformed(format!("bad length '{len}'")))?;

        let body = &bytes[nul + 1..];
        if body.len() != len {
            return Err(malformed(format!(
                "length mismatch: header says {}, body has {}",
                len,
                body.len()
            )));
        }

        match kind {
            ObjectKind::Blob => Ok(Object::Blob(Blob::new(body.to_vec()))),
            ObjectKind::Tree => decode_tree(body).map(Object::Tree),
            ObjectKind::Commit => decode_commit(body).map(Object::Commit),
        }
    }
}

fn decode_tree(mut body: &[u8]) -> Result<Tree, ObjectError> {
    let mut entries = Vec::new();
    while !body.is_empty() {
        let space = body
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| malformed("tree entry missing mode"))?;
        let mode = std::str::from_utf8(&body[..space]).map_err(|_| malformed("bad mode"))?;
        let mode = EntryMode::parse(mode)?;
        body = &body[space + 1..];

        let nul = body
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| malformed("tree entry missing name terminator"))?;
        let name = std::str::from_utf8(&body[..nul])
            .map_err(|_| malformed("tree entry name is not UTF-8"))?;
        body = &body[nul + 1..];

        if body.len() < ObjectId::LEN {
            return Err(malformed("truncated tree entry id"));
        }
        let target =
            ObjectId::from_bytes(&body[..ObjectId::LEN]).map_err(|e| malformed(e.to_string()))?;
        body = &body[ObjectId::LEN..];

        entries.push(TreeEntry::new(name, mode, target).map_err(|e| malformed(e.to_string()))?);
    }

    let tree = Tree::new(entries.clone()).map_err(|e| malformed(e.to_string()))?;
    if tree.entries() != entries.as_slice() {
        return Err(malformed("tree entries are not in canonical order"));
    }
    Ok(tree)
}

fn decode_commit(body: &[u8]) -> Result<Commit, ObjectError> {
    let text = std::str::from_utf8(body).map_err(|_| malformed("commit is not UTF-8"))?;
    let (headers, message) = text
        .split_once("\n\n")
        .ok_or_else(|| malformed("commit missing header terminator"))?;

    let parse_id = |hex: &str| ObjectId::from_hex(hex).map_err(|e| malformed(e.to_string()));

    let mut tree = None;
    let mut parents = Vec::new();
    let mut author = None;
    let mut committer = None;

    for line in headers.lines() {
        let (key, value) = line
            .split_once(' ')
            .ok_or_else(|| malformed(format!("bad commit header '{line}'")))?;
        match key {
            "tree" if tree.is_none() => tree = Some(parse_id(value)?),
            "parent" => parents.push(parse_id(value)?),
            "author" if author.is_none() => author = Some(Signature::decode(value)?),
            "committer" if committer.is_none() => committer = Some(Signature::decode(value)?),
            other => return Err(malformed(format!("unexpected commit header '{other}'"))),
        }
    }

    Ok(Commit {
        tree: tree.ok_or_else(|| malformed("commit missing tree"))?,
        parents,
        author: author.ok_or_else(|| malformed("commit missing author"))?,
        committer: committer.ok_or_else(|| malformed("commit missing committer"))?,
        message: message.to_string(),
    })
}
