//! sync::report
//!
//! Structured description of a rejected push.

use serde::Serialize;

use crate::core::types::ObjectId;
use crate::diff::{ChangeType, DiffEntry};
use crate::transport::RejectReason;

/// Divergence between local `HEAD` and the remote branch after a rejected push.
///
/// `entries` diff local `HEAD`'s tree (old side) against the remote tip's
/// tree (new side). Nothing is merged; the caller decides what to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    /// Remote that rejected the push.
    pub remote: String,
    pub reason: RejectReason,
    pub local_head: ObjectId,
    /// Remote tip after fetching; `None` if the remote branch does not exist.
    pub remote_head: Option<ObjectId>,
    pub merge_base: Option<ObjectId>,
    /// Commits only in local history.
    pub ahead: usize,
    /// Commits only in remote history.
    pub behind: usize,
    pub entries: Vec<DiffEntry>,
}

impl ConflictReport {
    /// Whether both sides have commits the other lacks.
    pub fn is_diverged(&self) -> bool {
        self.ahead > 0 && self.behind > 0
    }

    /// Entries of one change type.
    pub fn entries_of(&self, change: ChangeType) -> impl Iterator<Item = &DiffEntry> {
        self.entries.iter().filter(move |e| e.change == change)
    }
}

impl std::fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "push to {} rejected ({}): {} ahead, {} behind",
            self.remote, self.reason, self.ahead, self.behind
        )?;
        for entry in &self.entries {
            writeln!(f, "  {entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RepoPath;
    use crate::store::object::EntryMode;

    fn report() -> ConflictReport {
        let id = ObjectId::hash(b"x");
        ConflictReport {
            remote: "origin".into(),
            reason: RejectReason::NonFastForward,
            local_head: id,
            remote_head: Some(id),
            merge_base: None,
            ahead: 1,
            behind: 2,
            entries: vec![DiffEntry::added(
                RepoPath::new("b.txt").unwrap(),
                id,
                EntryMode::File,
            )],
        }
    }

    #[test]
    fn display_lists_entries() {
        let text = report().to_string();
        assert!(text.starts_with("push to origin rejected (non-fast-forward): 1 ahead, 2 behind"));
        assert!(text.contains("A\tb.txt"));
    }

    #[test]
    fn serializes_to_json() {
        let json = serde_json::to_value(report()).unwrap();
        assert_eq!(json["reason"], "non_fast_forward");
        assert_eq!(json["entries"][0]["change"], "ADD");
        assert!(report().is_diverged());
        assert_eq!(report().entries_of(ChangeType::Add).count(), 1);
    }
}
