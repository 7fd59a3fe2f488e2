// src/model.rs

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// One numstat line of a commit, filename still in raw log notation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub name: String,
    pub added: u32,
    pub deleted: u32,
}

/// A commit header plus its numstat lines, as read from the log stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitBlock {
    pub commit_id: String,
    pub author_name: String,
    pub author_email: String,
    pub date: String,
    pub summary: String,
    pub files: Vec<FileStat>,
}

/// A stored commit, author already resolved
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRecord {
    pub id: String,
    pub summary: String,
    pub author_name: String,
    pub author_email: String,
    pub author_team: String,
    pub commit_date: DateTime<FixedOffset>,
}

/// A stored per-file change, filename canonical
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub commit_id: String,
    pub filename: String,
    pub added: u32,
    pub deleted: u32,
}

/// Commits (newest first) and their file changes, already narrowed to a
/// time window and team scope
#[derive(Debug, Clone, Default)]
pub struct HistorySlice {
    pub commits: Vec<CommitRecord>,
    pub changes: Vec<FileChange>,
}

impl HistorySlice {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// An ordered email-wildcard rule mapping authors onto names and teams
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserRule {
    #[serde(rename = "email")]
    pub email_wildcard: String,
    #[serde(rename = "user")]
    pub canonical_name: String,
    pub team: String,
}

/// Summary of a commit as attached to a graph node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitRef {
    pub id: String,
    pub author_name: String,
    pub author_team: String,
    pub summary: String,
    pub date: String,
}

/// Commit count per author or team on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub name: String,
    pub commits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    /// Canonical file path
    pub id: String,
    pub name: String,
    pub folder: String,
    pub module: String,
    pub color: String,
    pub weight: f64,
    pub commits: Vec<CommitRef>,
    pub users: Vec<Tally>,
    pub teams: Vec<Tally>,
    pub recency: f64,
}

/// A co-change link; `source < target` lexicographically
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub weight: f64,
    pub color: String,
    pub recency: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegendEntry {
    pub module: String,
    pub color: String,
    pub file_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamMember {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamRoster {
    pub name: String,
    pub members: Vec<TeamMember>,
}

/// Result of graph construction
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoChangeGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub modules: Vec<LegendEntry>,
    pub teams: Vec<TeamRoster>,
}

/// The document handed to the visualization layer
#[derive(Debug, Clone, Serialize)]
pub struct GraphPayload {
    #[serde(flatten)]
    pub graph: CoChangeGraph,
    pub repository_url: String,
}
