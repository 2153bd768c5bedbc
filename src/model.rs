// src/model.rs

use crate::uast::Node;
use git2::Oid;
use std::collections::HashMap;

/// Uniquely identifies a resolved author
pub type AuthorId = usize;

/// The author index which denotes any unmatched identity
pub const MISSING_AUTHOR: AuthorId = (1 << 18) - 1;

/// Display name of the unmatched identity
pub const MISSING_AUTHOR_NAME: &str = "<unmatched>";

/// One side of a tree change: the path and the blob it points to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEntry {
    pub name: String,
    pub blob: Oid,
}

impl ChangeEntry {
    pub fn new(name: impl Into<String>, blob: Oid) -> Self {
        Self { name: name.into(), blob }
    }
}

/// What happened to a file between two trees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Insert,
    Delete,
    Modify,
}

/// A raw tree change record. The action is derived from which sides are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub from: Option<ChangeEntry>,
    pub to: Option<ChangeEntry>,
}

impl Change {
    #[cfg(test)]
    pub fn insert(name: impl Into<String>) -> Self {
        Self { from: None, to: Some(ChangeEntry::new(name, Oid::zero())) }
    }

    #[cfg(test)]
    pub fn delete(name: impl Into<String>) -> Self {
        Self { from: Some(ChangeEntry::new(name, Oid::zero())), to: None }
    }

    #[cfg(test)]
    pub fn modify(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: Some(ChangeEntry::new(from, Oid::zero())),
            to: Some(ChangeEntry::new(to, Oid::zero())),
        }
    }

    /// `None` when the record carries neither side and cannot be interpreted.
    pub fn action(&self) -> Option<Action> {
        match (&self.from, &self.to) {
            (None, Some(_)) => Some(Action::Insert),
            (Some(_), None) => Some(Action::Delete),
            (Some(_), Some(_)) => Some(Action::Modify),
            (None, None) => None,
        }
    }

    pub fn from_name(&self) -> Option<&str> {
        self.from.as_ref().map(|e| e.name.as_str())
    }

    pub fn to_name(&self) -> Option<&str> {
        self.to.as_ref().map(|e| e.name.as_str())
    }
}

/// Kind of a single edit script operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Delete,
    Insert,
    Equal,
}

/// An edit script operation spanning `len` lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditOp {
    pub kind: EditKind,
    pub len: usize,
}

impl EditOp {
    pub fn new(kind: EditKind, len: usize) -> Self {
        Self { kind, len }
    }
}

/// Line-level difference between the two versions of a modified file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDiff {
    pub old_lines: usize,
    pub new_lines: usize,
    pub ops: Vec<EditOp>,
}

/// A tree change together with the parsed syntax trees of both sides
#[derive(Debug, Clone)]
pub struct UastChange {
    pub change: Change,
    pub before: Option<Node>,
    pub after: Option<Node>,
}

/// Everything the analyses need to know about one commit
#[derive(Debug, Clone)]
pub struct CommitData {
    pub hash: Oid,
    pub time: i64,
    pub author: AuthorId,
    pub changes: Vec<Change>,
    /// Keyed by the destination path of the change
    pub file_diffs: HashMap<String, FileDiff>,
    pub uast_changes: Vec<UastChange>,
    /// Line count of every inserted or modified text file, by destination path
    pub file_lines: HashMap<String, usize>,
}

impl CommitData {
    #[cfg(test)]
    pub fn new(author: AuthorId, changes: Vec<Change>) -> Self {
        Self {
            hash: Oid::zero(),
            time: 0,
            author,
            changes,
            file_diffs: HashMap::new(),
            uast_changes: Vec::new(),
            file_lines: HashMap::new(),
        }
    }
}
