// src/graph.rs

//! Co-change graph construction.
//!
//! Pure over its inputs: a [`HistorySlice`] already narrowed to a window and
//! team, the module map and [`GraphOptions`]. Per-commit pairing runs in
//! parallel; results are merged in commit order so totals are reproducible.

use crate::model::{
    CoChangeGraph, CommitRecord, CommitRef, GraphEdge, GraphNode, HistorySlice, LegendEntry,
    Tally, TeamMember, TeamRoster,
};
use crate::modules::{
    ModuleColorMap, CURRENT_COLOR, CURRENT_MODULE, UNKNOWN_COLOR, UNKNOWN_MODULE,
};
use chrono::{DateTime, FixedOffset};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Per-file multiplier applied after each pairing within one commit
pub const PAIR_DECAY: f64 = 0.8;
pub const RECENCY_FLOOR: f64 = 0.3;

const SAME_MODULE_EDGE_COLOR: &str = "#4CAF50";
const CROSS_MODULE_EDGE_COLOR: &str = "#9E9E9E";

#[derive(Debug, Clone)]
pub struct GraphOptions {
    /// Commits touching more files than this are ignored
    pub max_files_per_commit: usize,
    /// Edges lighter than this are dropped
    pub threshold: f64,
    /// Path prefixes of the "current" scope; empty means no scope
    pub current_scope: Vec<String>,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            max_files_per_commit: 21,
            threshold: 1.0,
            current_scope: Vec::new(),
        }
    }
}

impl GraphOptions {
    fn in_scope(&self, file: &str) -> bool {
        self.current_scope.iter().any(|prefix| file.starts_with(prefix.as_str()))
    }
}

/// Linear map of commit time onto `[0.3, 1.0]`
#[derive(Debug, Clone, Copy)]
pub struct RecencyScale {
    min: i64,
    max: i64,
}

impl RecencyScale {
    pub fn new(earliest: DateTime<FixedOffset>, latest: DateTime<FixedOffset>) -> Self {
        Self {
            min: earliest.timestamp_millis(),
            max: latest.timestamp_millis(),
        }
    }

    pub fn normalize(&self, at: DateTime<FixedOffset>) -> f64 {
        let t = at.timestamp_millis();
        if self.max <= self.min {
            return 1.0;
        }
        if t <= self.min {
            return RECENCY_FLOOR;
        }
        if t >= self.max {
            return 1.0;
        }
        let span = (self.max - self.min) as f64;
        RECENCY_FLOOR + (1.0 - RECENCY_FLOOR) * (t - self.min) as f64 / span
    }
}

struct NodeAcc<'a> {
    path: &'a str,
    module: String,
    color: String,
    weight: f64,
    /// Indices into `history.commits`
    commits: Vec<usize>,
}

/// What one commit adds: edge keys and node weight terms, in pairing order
struct CommitContribution<'a> {
    pairs: Vec<(&'a str, &'a str)>,
    terms: Vec<(usize, f64)>,
}

/// For every pair `i < j`, each file adds its current multiplier to its node
/// weight, then the multiplier decays by [`PAIR_DECAY`].
fn pair_commit<'a>(files: &[&'a str], node_index: &HashMap<&'a str, usize>) -> CommitContribution<'a> {
    let mut multiplier = vec![1.0f64; files.len()];
    let mut pairs = Vec::new();
    let mut terms = Vec::new();
    for i in 0..files.len() {
        for j in (i + 1)..files.len() {
            let (a, b) = (files[i], files[j]);
            pairs.push(if a < b { (a, b) } else { (b, a) });
            terms.push((node_index[a], multiplier[i]));
            terms.push((node_index[b], multiplier[j]));
            multiplier[i] *= PAIR_DECAY;
            multiplier[j] *= PAIR_DECAY;
        }
    }
    CommitContribution { pairs, terms }
}

fn attribute(
    file: &str,
    modules: &ModuleColorMap,
    options: &GraphOptions,
) -> (String, String) {
    if options.in_scope(file) {
        return (CURRENT_MODULE.to_string(), CURRENT_COLOR.to_string());
    }
    match modules.attribute(file) {
        Some(entry) => (entry.module_name.clone(), entry.color.clone()),
        None => (UNKNOWN_MODULE.to_string(), UNKNOWN_COLOR.to_string()),
    }
}

pub fn build_graph(
    history: &HistorySlice,
    modules: &ModuleColorMap,
    options: &GraphOptions,
) -> CoChangeGraph {
    let commits = &history.commits;
    let teams = team_roster(commits);

    // group changes per commit, keeping first-seen file order
    let by_id: HashMap<&str, usize> = commits
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.as_str(), i))
        .collect();
    let mut groups: Vec<Vec<&str>> = vec![Vec::new(); commits.len()];
    for change in &history.changes {
        match by_id.get(change.commit_id.as_str()) {
            Some(&i) => groups[i].push(change.filename.as_str()),
            None => debug!(commit = %change.commit_id, "change without a commit in scope"),
        }
    }

    let scoped = !options.current_scope.is_empty();
    let mut qualifying: Vec<(usize, Vec<&str>)> = Vec::new();
    for (i, mut files) in groups.into_iter().enumerate() {
        let mut seen = HashSet::new();
        files.retain(|f| seen.insert(*f));
        if files.is_empty() {
            continue;
        }
        if files.len() > options.max_files_per_commit {
            debug!(commit = %commits[i].id, files = files.len(), "commit over file cap skipped");
            continue;
        }
        if scoped && !files.iter().any(|f| options.in_scope(f)) {
            continue;
        }
        qualifying.push((i, files));
    }

    if qualifying.is_empty() {
        warn!("no qualifying commits, graph is empty");
        return CoChangeGraph {
            teams,
            ..Default::default()
        };
    }

    let mut nodes: Vec<NodeAcc<'_>> = Vec::new();
    let mut node_index: HashMap<&str, usize> = HashMap::new();
    for (commit, files) in &qualifying {
        for &file in files {
            let idx = *node_index.entry(file).or_insert_with(|| {
                let (module, color) = attribute(file, modules, options);
                nodes.push(NodeAcc {
                    path: file,
                    module,
                    color,
                    weight: 1.0,
                    commits: Vec::new(),
                });
                nodes.len() - 1
            });
            nodes[idx].commits.push(*commit);
        }
    }

    let contributions: Vec<CommitContribution<'_>> = qualifying
        .par_iter()
        .map(|(_, files)| pair_commit(files, &node_index))
        .collect();

    let mut edge_weights: BTreeMap<(&str, &str), f64> = BTreeMap::new();
    for contribution in &contributions {
        for &key in &contribution.pairs {
            edge_weights
                .entry(key)
                .and_modify(|w| *w += 1.0)
                .or_insert(1.0);
        }
        for &(node, term) in &contribution.terms {
            nodes[node].weight += term;
        }
    }

    let earliest = qualifying.iter().map(|(i, _)| commits[*i].commit_date).min();
    let latest = qualifying.iter().map(|(i, _)| commits[*i].commit_date).max();
    let scale = match (earliest, latest) {
        (Some(earliest), Some(latest)) => RecencyScale::new(earliest, latest),
        _ => return CoChangeGraph { teams, ..Default::default() },
    };

    let edges: Vec<GraphEdge> = edge_weights
        .into_iter()
        .filter(|(_, weight)| *weight >= options.threshold)
        .map(|((a, b), weight)| {
            let (na, nb) = (&nodes[node_index[a]], &nodes[node_index[b]]);
            let common: HashSet<usize> = na.commits.iter().copied().collect();
            let recency = nb
                .commits
                .iter()
                .filter(|c| common.contains(c))
                .map(|&c| commits[c].commit_date)
                .max()
                .map_or(RECENCY_FLOOR, |at| scale.normalize(at));
            let color = if na.module == nb.module {
                SAME_MODULE_EDGE_COLOR
            } else {
                CROSS_MODULE_EDGE_COLOR
            };
            GraphEdge {
                source: a.to_string(),
                target: b.to_string(),
                weight,
                color: color.to_string(),
                recency,
            }
        })
        .collect();

    let modules_legend = legend(&nodes, modules, scoped);
    let nodes: Vec<GraphNode> = nodes
        .into_iter()
        .map(|node| finish_node(node, commits, &scale))
        .collect();

    debug!(nodes = nodes.len(), edges = edges.len(), "graph built");
    CoChangeGraph {
        nodes,
        edges,
        modules: modules_legend,
        teams,
    }
}

fn finish_node(node: NodeAcc<'_>, commits: &[CommitRecord], scale: &RecencyScale) -> GraphNode {
    let mut touching: Vec<&CommitRecord> = node.commits.iter().map(|&i| &commits[i]).collect();
    touching.sort_by(|a, b| b.commit_date.cmp(&a.commit_date));

    let recency = touching
        .first()
        .map_or(RECENCY_FLOOR, |c| scale.normalize(c.commit_date));
    let users = tally(touching.iter().map(|c| c.author_name.as_str()));
    let teams = tally(touching.iter().map(|c| c.author_team.as_str()));
    let commit_refs = touching
        .iter()
        .map(|c| CommitRef {
            id: c.id.clone(),
            author_name: c.author_name.clone(),
            author_team: c.author_team.clone(),
            summary: c.summary.clone(),
            date: c.commit_date.to_rfc3339(),
        })
        .collect();

    let (folder, name) = match node.path.rsplit_once('/') {
        Some((folder, name)) => (folder.to_string(), name.to_string()),
        None => (String::new(), node.path.to_string()),
    };
    GraphNode {
        id: node.path.to_string(),
        name,
        folder,
        module: node.module,
        color: node.color,
        weight: node.weight,
        commits: commit_refs,
        users,
        teams,
        recency,
    }
}

/// Counts per name, most frequent first, ties by name.
fn tally<'a>(names: impl Iterator<Item = &'a str>) -> Vec<Tally> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for name in names {
        *counts.entry(name).or_default() += 1;
    }
    let mut tallies: Vec<Tally> = counts
        .into_iter()
        .map(|(name, commits)| Tally {
            name: name.to_string(),
            commits,
        })
        .collect();
    tallies.sort_by(|a, b| b.commits.cmp(&a.commits));
    tallies
}

/// One entry per module with nodes, biggest first; "Current" leads when a
/// scope is active.
fn legend(nodes: &[NodeAcc<'_>], modules: &ModuleColorMap, scoped: bool) -> Vec<LegendEntry> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for node in nodes {
        if node.module != CURRENT_MODULE {
            *counts.entry(node.module.as_str()).or_default() += 1;
        }
    }

    let mut entries: Vec<LegendEntry> = Vec::new();
    let mut listed: HashSet<&str> = HashSet::new();
    for entry in modules.entries() {
        let name = entry.module_name.as_str();
        if let Some(&file_count) = counts.get(name) {
            if listed.insert(name) {
                entries.push(LegendEntry {
                    module: name.to_string(),
                    color: entry.color.clone(),
                    file_count,
                });
            }
        }
    }
    if let Some(&file_count) = counts.get(UNKNOWN_MODULE) {
        if !listed.contains(UNKNOWN_MODULE) {
            entries.push(LegendEntry {
                module: UNKNOWN_MODULE.to_string(),
                color: UNKNOWN_COLOR.to_string(),
                file_count,
            });
        }
    }
    entries.sort_by(|a, b| b.file_count.cmp(&a.file_count));

    if scoped {
        entries.insert(
            0,
            LegendEntry {
                module: CURRENT_MODULE.to_string(),
                color: CURRENT_COLOR.to_string(),
                file_count: 0,
            },
        );
    }
    entries
}

/// Team -> members over the whole filtered commit set.
fn team_roster(commits: &[CommitRecord]) -> Vec<TeamRoster> {
    let mut teams: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for commit in commits {
        let team = if commit.author_team.is_empty() {
            UNKNOWN_MODULE
        } else {
            commit.author_team.as_str()
        };
        let members = teams.entry(team).or_default();
        if !commit.author_name.is_empty() {
            members.insert(commit.author_name.as_str());
        }
    }
    teams
        .into_iter()
        .map(|(name, members)| TeamRoster {
            name: name.to_string(),
            members: members
                .into_iter()
                .map(|m| TeamMember { name: m.to_string() })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileChange;

    fn commit(id: &str, date: &str, author: &str, team: &str) -> CommitRecord {
        CommitRecord {
            id: id.to_string(),
            summary: format!("summary {id}"),
            author_name: author.to_string(),
            author_email: format!("{author}@corp.com"),
            author_team: team.to_string(),
            commit_date: DateTime::parse_from_rfc3339(date).unwrap(),
        }
    }

    fn history(rows: &[(&str, &str, &[&str])]) -> HistorySlice {
        let mut slice = HistorySlice::default();
        for (id, date, files) in rows {
            slice.commits.push(commit(id, date, "dev", "core"));
            for file in *files {
                slice.changes.push(FileChange {
                    commit_id: id.to_string(),
                    filename: file.to_string(),
                    added: 1,
                    deleted: 1,
                });
            }
        }
        slice
    }

    fn edge<'a>(graph: &'a CoChangeGraph, a: &str, b: &str) -> Option<&'a GraphEdge> {
        graph.edges.iter().find(|e| e.source == a && e.target == b)
    }

    fn node<'a>(graph: &'a CoChangeGraph, id: &str) -> &'a GraphNode {
        graph.nodes.iter().find(|n| n.id == id).unwrap()
    }

    #[test]
    fn test_two_commit_history() {
        let slice = history(&[
            ("c2", "2024-01-02T00:00:00+00:00", &["y.py", "z.py"]),
            ("c1", "2024-01-01T00:00:00+00:00", &["x.py", "y.py"]),
        ]);
        let graph = build_graph(&slice, &ModuleColorMap::default(), &GraphOptions::default());
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(edge(&graph, "x.py", "y.py").unwrap().weight, 1.0);
        assert_eq!(edge(&graph, "y.py", "z.py").unwrap().weight, 1.0);
    }

    #[test]
    fn test_repeated_pair_accumulates() {
        let slice = history(&[
            ("c2", "2024-01-02T00:00:00+00:00", &["b.rs", "a.rs"]),
            ("c1", "2024-01-01T00:00:00+00:00", &["a.rs", "b.rs"]),
        ]);
        let graph = build_graph(&slice, &ModuleColorMap::default(), &GraphOptions::default());
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(edge(&graph, "a.rs", "b.rs").unwrap().weight, 2.0);
    }

    #[test]
    fn test_node_weight_decays_within_commit() {
        let slice = history(&[(
            "c1",
            "2024-01-01T00:00:00+00:00",
            &["hub.rs", "a.rs", "b.rs", "c.rs"],
        )]);
        let graph = build_graph(&slice, &ModuleColorMap::default(), &GraphOptions::default());
        // 1.0 base + 1.0 + 0.8 + 0.64 from three pairings
        assert!((node(&graph, "hub.rs").weight - 3.44).abs() < 1e-9);
    }

    #[test]
    fn test_file_cap_drops_large_commits() {
        let slice = history(&[
            ("big", "2024-01-02T00:00:00+00:00", &["a", "b", "c"]),
            ("small", "2024-01-01T00:00:00+00:00", &["a", "b"]),
        ]);
        let options = GraphOptions {
            max_files_per_commit: 2,
            ..Default::default()
        };
        let graph = build_graph(&slice, &ModuleColorMap::default(), &options);
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(edge(&graph, "a", "b").unwrap().weight, 1.0);
    }

    #[test]
    fn test_threshold_filters_edges_not_nodes() {
        let slice = history(&[
            ("c2", "2024-01-02T00:00:00+00:00", &["a", "b"]),
            ("c1", "2024-01-01T00:00:00+00:00", &["a", "b", "c"]),
        ]);
        let options = GraphOptions {
            threshold: 2.0,
            ..Default::default()
        };
        let graph = build_graph(&slice, &ModuleColorMap::default(), &options);
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].source, "a");
        assert_eq!(graph.edges[0].target, "b");
    }

    #[test]
    fn test_duplicate_filename_in_commit_makes_no_self_edge() {
        let slice = history(&[("c1", "2024-01-01T00:00:00+00:00", &["a", "a", "b"])]);
        let graph = build_graph(&slice, &ModuleColorMap::default(), &GraphOptions::default());
        assert_eq!(graph.edges.len(), 1);
        assert!(graph.edges.iter().all(|e| e.source < e.target));
    }

    #[test]
    fn test_recency_bounds() {
        let earliest = DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00").unwrap();
        let middle = DateTime::parse_from_rfc3339("2024-01-06T00:00:00+00:00").unwrap();
        let latest = DateTime::parse_from_rfc3339("2024-01-11T00:00:00+00:00").unwrap();
        let scale = RecencyScale::new(earliest, latest);
        assert_eq!(scale.normalize(earliest), 0.3);
        assert_eq!(scale.normalize(latest), 1.0);
        assert!((scale.normalize(middle) - 0.65).abs() < 1e-9);
        assert_eq!(RecencyScale::new(latest, latest).normalize(latest), 1.0);
    }

    #[test]
    fn test_node_and_edge_recency() {
        let slice = history(&[
            ("c3", "2024-01-03T00:00:00+00:00", &["a", "c"]),
            ("c2", "2024-01-02T00:00:00+00:00", &["a", "b"]),
            ("c1", "2024-01-01T00:00:00+00:00", &["b", "c"]),
        ]);
        let graph = build_graph(&slice, &ModuleColorMap::default(), &GraphOptions::default());
        assert_eq!(node(&graph, "a").recency, 1.0);
        assert!((node(&graph, "b").recency - 0.65).abs() < 1e-9);
        assert_eq!(edge(&graph, "b", "c").unwrap().recency, 0.3);
        assert!((edge(&graph, "a", "b").unwrap().recency - 0.65).abs() < 1e-9);
        assert_eq!(edge(&graph, "a", "c").unwrap().recency, 1.0);
    }

    #[test]
    fn test_module_attribution_and_legend() {
        let modules = ModuleColorMap::from_rows(vec![
            ("a".to_string(), "A".to_string()),
            ("a/b".to_string(), "AB".to_string()),
        ]);
        let slice = history(&[(
            "c1",
            "2024-01-01T00:00:00+00:00",
            &["a/b/c.py", "a/b/d.py", "a/x.py", "z.py"],
        )]);
        let graph = build_graph(&slice, &modules, &GraphOptions::default());
        assert_eq!(node(&graph, "a/b/c.py").module, "AB");
        assert_eq!(node(&graph, "a/x.py").module, "A");
        assert_eq!(node(&graph, "z.py").module, UNKNOWN_MODULE);
        assert_eq!(node(&graph, "z.py").color, UNKNOWN_COLOR);

        let legend: Vec<(&str, usize)> = graph
            .modules
            .iter()
            .map(|l| (l.module.as_str(), l.file_count))
            .collect();
        assert_eq!(legend, vec![("AB", 2), ("A", 1), (UNKNOWN_MODULE, 1)]);
        assert_eq!(edge(&graph, "a/b/c.py", "a/b/d.py").unwrap().color, SAME_MODULE_EDGE_COLOR);
        assert_eq!(edge(&graph, "a/x.py", "z.py").unwrap().color, CROSS_MODULE_EDGE_COLOR);
    }

    #[test]
    fn test_current_scope_filters_commits_and_overrides_module() {
        let modules = ModuleColorMap::from_rows(vec![("src".to_string(), "Core".to_string())]);
        let slice = history(&[
            ("c2", "2024-01-02T00:00:00+00:00", &["src/ui/view.rs", "src/db.rs"]),
            ("c1", "2024-01-01T00:00:00+00:00", &["src/db.rs", "src/net.rs"]),
        ]);
        let options = GraphOptions {
            current_scope: vec!["src/ui".to_string()],
            ..Default::default()
        };
        let graph = build_graph(&slice, &modules, &options);
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(node(&graph, "src/ui/view.rs").module, CURRENT_MODULE);
        assert_eq!(node(&graph, "src/ui/view.rs").color, CURRENT_COLOR);
        assert_eq!(node(&graph, "src/db.rs").module, "Core");
        assert_eq!(graph.modules[0].module, CURRENT_MODULE);
        assert_eq!(graph.modules[0].file_count, 0);
        assert_eq!(graph.modules[1].module, "Core");
        assert_eq!(graph.modules[1].file_count, 1);
    }

    #[test]
    fn test_node_detail_and_roster() {
        let mut slice = history(&[
            ("c2", "2024-01-02T00:00:00+00:00", &["a", "b"]),
            ("c1", "2024-01-01T00:00:00+00:00", &["a", "b"]),
        ]);
        slice.commits[1].author_name = "amy".to_string();
        slice.commits[1].author_team = "web".to_string();
        let graph = build_graph(&slice, &ModuleColorMap::default(), &GraphOptions::default());

        let a = node(&graph, "a");
        assert_eq!(a.commits[0].id, "c2");
        assert_eq!(a.commits[1].id, "c1");
        assert_eq!(a.users.len(), 2);
        assert_eq!(a.teams.len(), 2);

        assert_eq!(graph.teams.len(), 2);
        assert_eq!(graph.teams[0].name, "core");
        assert_eq!(graph.teams[0].members, vec![TeamMember { name: "dev".into() }]);
        assert_eq!(graph.teams[1].name, "web");
    }

    #[test]
    fn test_empty_history_gives_empty_graph() {
        let graph = build_graph(
            &HistorySlice::default(),
            &ModuleColorMap::default(),
            &GraphOptions::default(),
        );
        assert!(graph.nodes.is_empty());
        assert!(graph.edges.is_empty());
        assert!(graph.modules.is_empty());
    }

    #[test]
    fn test_accumulation_is_order_independent_in_totals() {
        let forward = history(&[
            ("c2", "2024-01-02T00:00:00+00:00", &["a", "b", "c"]),
            ("c1", "2024-01-01T00:00:00+00:00", &["c", "a"]),
        ]);
        let reversed = history(&[
            ("c1", "2024-01-01T00:00:00+00:00", &["a", "c"]),
            ("c2", "2024-01-02T00:00:00+00:00", &["c", "b", "a"]),
        ]);
        let g1 = build_graph(&forward, &ModuleColorMap::default(), &GraphOptions::default());
        let g2 = build_graph(&reversed, &ModuleColorMap::default(), &GraphOptions::default());
        for id in ["a", "b", "c"] {
            assert!((node(&g1, id).weight - node(&g2, id).weight).abs() < 1e-9);
        }
        assert_eq!(g1.edges, g2.edges);
    }
}
