//! core::types
//!
//! Identifiers and names shared by every layer.
//!
//! - [`ObjectId`] - SHA-256 of an object's canonical encoding
//! - [`BranchName`] - Branch name following git's refname rules
//! - [`RefName`] - Full reference name, e.g. `refs/remotes/origin/master`
//! - [`RepoPath`] - `/`-separated path relative to the working tree root
//! - [`UtcTimestamp`] - Commit time, whole seconds in UTC
//!
//! Constructors validate, so a value of one of these types is always
//! well-formed and the stores never see a malformed name.
//!
//! # Examples
//!
//! ```
//! use treesync::core::types::{BranchName, ObjectId, RefName, RepoPath};
//!
//! let branch = BranchName::new("master").unwrap();
//! let refname = RefName::for_branch(&branch);
//! assert_eq!(refname.as_str(), "refs/heads/master");
//!
//! let id = ObjectId::hash(b"hello");
//! assert_eq!(id.to_hex().len(), 64);
//!
//! assert!(RepoPath::new("docs/readme.md").is_ok());
//! assert!(RepoPath::new("../escape").is_err());
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}

/// Characters git refuses anywhere in a ref or branch name.
const INVALID_REF_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];

/// A content-addressed object identifier (SHA-256, 32 bytes).
///
/// Equality is byte-wise. Identical content always hashes to the same id.
///
/// # Example
///
/// ```
/// use treesync::core::types::ObjectId;
///
/// let a = ObjectId::hash(b"same bytes");
/// let b = ObjectId::hash(b"same bytes");
/// assert_eq!(a, b);
///
/// let parsed = ObjectId::from_hex(&a.to_hex().to_uppercase()).unwrap();
/// assert_eq!(parsed, a);
/// assert_eq!(a.short(7).len(), 7);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId([u8; ObjectId::LEN]);

impl ObjectId {
    /// Length of an id in bytes.
    pub const LEN: usize = 32;

    /// Length of an id rendered as hex.
    pub const HEX_LEN: usize = Self::LEN * 2;

    /// Hash raw bytes into an id.
    pub fn hash(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut out = [0u8; Self::LEN];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// Build an id from its raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidObjectId` if `bytes` is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypeError> {
        let raw: [u8; Self::LEN] = bytes.try_into().map_err(|_| {
            TypeError::InvalidObjectId(format!(
                "expected {} bytes, got {}",
                Self::LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(raw))
    }

    /// Parse an id from a full-length hex string (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidObjectId` if the string is not 64 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        if s.len() != Self::HEX_LEN {
            return Err(TypeError::InvalidObjectId(format!(
                "expected {} hex characters, got {}",
                Self::HEX_LEN,
                s.len()
            )));
        }
        let mut out = [0u8; Self::LEN];
        hex::decode_to_slice(s, &mut out).map_err(|_| {
            TypeError::InvalidObjectId("object id must be hexadecimal".into())
        })?;
        Ok(Self(out))
    }

    /// Raw id bytes.
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated hex form (at most the full length).
    pub fn short(&self, len: usize) -> String {
        let mut hex = self.to_hex();
        hex.truncate(len.min(Self::HEX_LEN));
        hex
    }

    /// Whether `prefix` (hex, any case) is a prefix of this id.
    pub fn has_hex_prefix(&self, prefix: &str) -> bool {
        self.to_hex().starts_with(&prefix.to_ascii_lowercase())
    }
}

impl TryFrom<String> for ObjectId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.to_hex()
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId({})", self.short(12))
    }
}

/// A validated branch name.
///
/// Rules follow `git check-ref-format`: non-empty, not `@`, no leading `-`,
/// no component starting with `.` or ending in `.lock`, no `..`, `@{` or
/// `//`, and none of space, `~`, `^`, `:`, `\`, `?`, `*`, `[` or control
/// characters.
///
/// # Example
///
/// ```
/// use treesync::core::types::BranchName;
///
/// let name = BranchName::new("feature/sync").unwrap();
/// assert_eq!(name.as_str(), "feature/sync");
///
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new("branch.lock").is_err());
/// assert!(BranchName::new("has space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        let fail = |msg: &str| Err(TypeError::InvalidBranchName(msg.to_string()));

        if name.is_empty() {
            return fail("branch name cannot be empty");
        }
        if name == "@" {
            return fail("branch name cannot be '@' (reserved)");
        }
        if name.starts_with('-') {
            return fail("branch name cannot start with '-'");
        }
        validate_ref_shape(name).map_err(TypeError::InvalidBranchName)
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BranchName {
    /// `master`.
    fn default() -> Self {
        Self("master".to_string())
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared refname checks for branch and ref names.
fn validate_ref_shape(name: &str) -> Result<(), String> {
    if name.starts_with('/') {
        return Err("name cannot start with '/'".into());
    }
    if name.ends_with('/') {
        return Err("name cannot end with '/'".into());
    }
    if name.ends_with(".lock") {
        return Err("name cannot end with '.lock'".into());
    }
    for bad in ["..", "@{", "//"] {
        if name.contains(bad) {
            return Err(format!("name cannot contain '{bad}'"));
        }
    }
    for c in INVALID_REF_CHARS {
        if name.contains(c) {
            return Err(format!("name cannot contain '{c}'"));
        }
    }
    if name.chars().any(|c| c.is_ascii_control()) {
        return Err("name cannot contain control characters".into());
    }
    for component in name.split('/') {
        if component.starts_with('.') {
            return Err("path component cannot start with '.'".into());
        }
        if component.ends_with(".lock") {
            return Err("path component cannot end with '.lock'".into());
        }
    }
    Ok(())
}

/// A validated reference name.
///
/// # Example
///
/// ```
/// use treesync::core::types::{BranchName, RefName};
///
/// let branch = BranchName::new("master").unwrap();
/// assert_eq!(RefName::for_branch(&branch).as_str(), "refs/heads/master");
///
/// let tracking = RefName::for_remote_branch("origin", &branch).unwrap();
/// assert_eq!(tracking.as_str(), "refs/remotes/origin/master");
/// assert!(tracking.is_remote_ref());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    /// Prefix of local branch refs.
    pub const HEADS: &'static str = "refs/heads/";

    /// Prefix of remote tracking refs.
    pub const REMOTES: &'static str = "refs/remotes/";

    /// Create a new validated ref name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` if the name violates git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TypeError::InvalidRefName("ref name cannot be empty".into()));
        }
        validate_ref_shape(&name).map_err(TypeError::InvalidRefName)?;
        Ok(Self(name))
    }

    /// Create a ref name for a local branch (`refs/heads/<branch>`).
    pub fn for_branch(branch: &BranchName) -> Self {
        // Branch names are validated, and the prefix is well-formed.
        Self(format!("{}{}", Self::HEADS, branch.as_str()))
    }

    /// Create a remote tracking ref name (`refs/remotes/<remote>/<branch>`).
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` if `remote` is not a valid single
    /// ref component.
    pub fn for_remote_branch(remote: &str, branch: &BranchName) -> Result<Self, TypeError> {
        if remote.is_empty() || remote.contains('/') {
            return Err(TypeError::InvalidRefName(format!(
                "invalid remote name '{remote}'"
            )));
        }
        Self::new(format!("{}{}/{}", Self::REMOTES, remote, branch.as_str()))
    }

    /// Strip a prefix from the ref name and return the remainder.
    ///
    /// Returns `None` if the ref doesn't start with the given prefix.
    pub fn strip_prefix(&self, prefix: &str) -> Option<&str> {
        self.0.strip_prefix(prefix)
    }

    /// Check if this ref is a local branch ref.
    pub fn is_branch_ref(&self) -> bool {
        self.0.starts_with(Self::HEADS)
    }

    /// Check if this ref is a remote tracking ref.
    pub fn is_remote_ref(&self) -> bool {
        self.0.starts_with(Self::REMOTES)
    }

    /// Branch name of a `refs/heads/*` ref.
    pub fn branch(&self) -> Option<BranchName> {
        self.strip_prefix(Self::HEADS)
            .and_then(|b| BranchName::new(b).ok())
    }

    /// Get the ref name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RefName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RefName> for String {
    fn from(name: RefName) -> Self {
        name.0
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated, repository-relative file path using `/` separators.
///
/// Paths are never absolute and never contain empty, `.` or `..` segments,
/// so they cannot escape the working tree.
///
/// # Example
///
/// ```
/// use treesync::core::types::RepoPath;
///
/// let path = RepoPath::new("src/lib.rs").unwrap();
/// assert_eq!(path.components().collect::<Vec<_>>(), vec!["src", "lib.rs"]);
/// assert_eq!(path.file_name(), "lib.rs");
///
/// assert!(RepoPath::new("/etc/passwd").is_err());
/// assert!(RepoPath::new("a//b").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoPath(String);

impl RepoPath {
    /// Create a new validated path.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidPath` for empty, absolute, or escaping paths.
    pub fn new(path: impl Into<String>) -> Result<Self, TypeError> {
        let path = path.into();
        if path.is_empty() {
            return Err(TypeError::InvalidPath("path cannot be empty".into()));
        }
        if path.starts_with('/') {
            return Err(TypeError::InvalidPath(format!("'{path}' is absolute")));
        }
        for segment in path.split('/') {
            Self::validate_segment(segment)
                .map_err(|msg| TypeError::InvalidPath(format!("'{path}': {msg}")))?;
        }
        Ok(Self(path))
    }

    /// Check a single path segment (also used for tree entry names).
    pub(crate) fn validate_segment(segment: &str) -> Result<(), &'static str> {
        match segment {
            "" => Err("empty path segment"),
            "." | ".." => Err("relative path segment"),
            s if s.contains('\0') => Err("path contains NUL"),
            s if s.contains('\\') => Err("path contains backslash"),
            _ => Ok(()),
        }
    }

    /// Append one segment.
    pub fn join(&self, segment: &str) -> Result<Self, TypeError> {
        Self::new(format!("{}/{}", self.0, segment))
    }

    /// Parent directory, or `None` for a top-level path.
    pub fn parent(&self) -> Option<RepoPath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| RepoPath(parent.to_string()))
    }

    /// Iterate over the `/`-separated segments.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Last segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RepoPath {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RepoPath> for String {
    fn from(path: RepoPath) -> Self {
        path.0
    }
}

impl AsRef<str> for RepoPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepoPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A UTC timestamp with second precision.
///
/// Commits store whole seconds, so truncation happens at construction and
/// a timestamp survives an encode/decode cycle unchanged.
///
/// # Example
///
/// ```
/// use treesync::core::types::UtcTimestamp;
///
/// let ts = UtcTimestamp::from_unix(1_700_000_000).unwrap();
/// assert_eq!(ts.unix(), 1_700_000_000);
/// assert_eq!(ts.to_string(), "2023-11-14T22:13:20+00:00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtcTimestamp(chrono::DateTime<chrono::Utc>);

impl UtcTimestamp {
    /// Create a timestamp for the current second.
    pub fn now() -> Self {
        let now = chrono::Utc::now();
        Self::from_unix(now.timestamp()).unwrap_or(Self(now))
    }

    /// Create a timestamp from seconds since the Unix epoch.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidTimestamp` if the value is out of range.
    pub fn from_unix(secs: i64) -> Result<Self, TypeError> {
        chrono::DateTime::from_timestamp(secs, 0)
            .map(Self)
            .ok_or(TypeError::InvalidTimestamp(secs))
    }

    /// Seconds since the Unix epoch.
    pub fn unix(&self) -> i64 {
        self.0.timestamp()
    }

    /// Get the underlying datetime.
    pub fn as_datetime(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.0
    }
}

impl std::fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod object_id {
        use super::*;

        #[test]
        fn identical_content_same_id() {
            assert_eq!(ObjectId::hash(b"abc"), ObjectId::hash(b"abc"));
            assert_ne!(ObjectId::hash(b"abc"), ObjectId::hash(b"abd"));
        }

        #[test]
        fn known_sha256_vector() {
            assert_eq!(
                ObjectId::hash(b"").to_hex(),
                "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
            );
        }

        #[test]
        fn hex_is_normalized() {
            let id = ObjectId::hash(b"x");
            let upper = id.to_hex().to_uppercase();
            assert_eq!(ObjectId::from_hex(&upper).unwrap(), id);
        }

        #[test]
        fn wrong_length_rejected() {
            assert!(ObjectId::from_hex("abc").is_err());
            assert!(ObjectId::from_bytes(&[0u8; 20]).is_err());
        }

        #[test]
        fn non_hex_rejected() {
            let bad = "g".repeat(ObjectId::HEX_LEN);
            assert!(ObjectId::from_hex(&bad).is_err());
        }

        #[test]
        fn prefix_matching() {
            let id = ObjectId::hash(b"prefix");
            let hex = id.to_hex();
            assert!(id.has_hex_prefix(&hex[..6]));
            assert!(id.has_hex_prefix(&hex[..6].to_uppercase()));
            assert_eq!(id.short(100), hex);
        }

        #[test]
        fn serde_as_hex_string() {
            let id = ObjectId::hash(b"serde");
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{}\"", id.to_hex()));
            let back: ObjectId = serde_json::from_str(&json).unwrap();
            assert_eq!(back, id);
        }
    }

    mod branch_name {
        use super::*;

        #[test]
        fn valid_branch_names() {
            assert!(BranchName::new("master").is_ok());
            assert!(BranchName::new("feature/foo").is_ok());
            assert!(BranchName::new("user@feature").is_ok());
        }

        #[test]
        fn invalid_branch_names() {
            assert!(BranchName::new("").is_err());
            assert!(BranchName::new("@").is_err());
            assert!(BranchName::new("-flag").is_err());
            assert!(BranchName::new(".hidden").is_err());
            assert!(BranchName::new("a..b").is_err());
            assert!(BranchName::new("a:b").is_err());
            assert!(BranchName::new("foo/.hidden").is_err());
        }
    }

    mod ref_name {
        use super::*;

        #[test]
        fn head_is_valid() {
            assert!(RefName::new("HEAD").is_ok());
        }

        #[test]
        fn branch_roundtrip() {
            let branch = BranchName::new("topic").unwrap();
            let refname = RefName::for_branch(&branch);
            assert!(refname.is_branch_ref());
            assert_eq!(refname.branch(), Some(branch));
        }

        #[test]
        fn remote_name_must_be_single_component() {
            let branch = BranchName::new("master").unwrap();
            assert!(RefName::for_remote_branch("up/stream", &branch).is_err());
            assert!(RefName::for_remote_branch("", &branch).is_err());
        }

        #[test]
        fn invalid_ref_names() {
            assert!(RefName::new("").is_err());
            assert!(RefName::new("refs/heads/").is_err());
            assert!(RefName::new("refs/heads/a b").is_err());
            assert!(RefName::new("refs/heads/x.lock").is_err());
        }
    }

    mod repo_path {
        use super::*;

        #[test]
        fn valid_paths() {
            assert!(RepoPath::new("a.txt").is_ok());
            assert!(RepoPath::new("dir/sub/file.rs").is_ok());
        }

        #[test]
        fn invalid_paths() {
            assert!(RepoPath::new("").is_err());
            assert!(RepoPath::new("/abs").is_err());
            assert!(RepoPath::new("a/").is_err());
            assert!(RepoPath::new("a/../b").is_err());
            assert!(RepoPath::new("./a").is_err());
            assert!(RepoPath::new("a\0b").is_err());
        }

        #[test]
        fn file_name_of_nested_path() {
            assert_eq!(RepoPath::new("x/y/z").unwrap().file_name(), "z");
            assert_eq!(RepoPath::new("z").unwrap().file_name(), "z");
        }

        #[test]
        fn join_and_parent() {
            let dir = RepoPath::new("x/y").unwrap();
            let file = dir.join("z").unwrap();
            assert_eq!(file.as_str(), "x/y/z");
            assert_eq!(file.parent(), Some(dir));
            assert_eq!(RepoPath::new("top").unwrap().parent(), None);
            assert!(file.join("..").is_err());
        }
    }

    mod timestamp {
        use super::*;

        #[test]
        fn now_has_second_precision() {
            let now = UtcTimestamp::now();
            assert_eq!(UtcTimestamp::from_unix(now.unix()).unwrap(), now);
        }

        #[test]
        fn out_of_range_rejected() {
            assert!(UtcTimestamp::from_unix(i64::MAX).is_err());
        }
    }
}
