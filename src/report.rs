// src/report.rs

//! Graph payload generation from a populated store.

use crate::error::{Error, Result};
use crate::graph::{build_graph, GraphOptions};
use crate::model::GraphPayload;
use crate::modules::ModuleColorMap;
use crate::store::{CommitStore, HistoryFilter};
use crate::timespec::parse_time_bound;
use chrono::Utc;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct GraphRequest {
    pub database: PathBuf,
    pub modules_file: PathBuf,
    pub since: Option<String>,
    pub until: Option<String>,
    pub team: Option<String>,
    pub options: GraphOptions,
    pub repository_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphSummary {
    pub nodes: usize,
    pub edges: usize,
    pub modules: usize,
}

impl GraphRequest {
    /// Resolves the window phrases against the current time.
    pub fn history_filter(&self) -> Result<HistoryFilter> {
        let now = Utc::now();
        let bound = |phrase: &Option<String>| {
            phrase
                .as_deref()
                .map(|p| parse_time_bound(p, now))
                .transpose()
        };
        Ok(HistoryFilter {
            since: bound(&self.since)?,
            until: bound(&self.until)?,
            team: self.team.clone(),
        })
    }

    fn open(&self) -> Result<(CommitStore, ModuleColorMap)> {
        if !self.database.exists() {
            return Err(Error::Config(format!(
                "store {} not found, run ingest first",
                self.database.display()
            )));
        }
        let modules = ModuleColorMap::from_csv(&self.modules_file)?;
        let store = CommitStore::open(&self.database)?;
        Ok((store, modules))
    }
}

/// Loads the filtered history and builds its graph.
pub fn build_payload(
    store: &CommitStore,
    modules: &ModuleColorMap,
    filter: &HistoryFilter,
    options: &GraphOptions,
    repository_url: &str,
) -> Result<GraphPayload> {
    let history = store.load_history(filter)?;
    if history.is_empty() {
        warn!(team = ?filter.team, "no file changes in scope");
    }
    let graph = build_graph(&history, modules, options);
    Ok(GraphPayload {
        graph,
        repository_url: repository_url.to_string(),
    })
}

pub fn write_payload(path: &Path, payload: &GraphPayload) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, payload)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

fn summarize(payload: &GraphPayload) -> GraphSummary {
    GraphSummary {
        nodes: payload.graph.nodes.len(),
        edges: payload.graph.edges.len(),
        modules: payload.graph.modules.len(),
    }
}

pub fn run_graph(request: &GraphRequest, output: &Path) -> Result<GraphSummary> {
    let filter = request.history_filter()?;
    let (store, modules) = request.open()?;
    let payload = build_payload(
        &store,
        &modules,
        &filter,
        &request.options,
        &request.repository_url,
    )?;
    write_payload(output, &payload)?;
    let summary = summarize(&payload);
    info!(
        path = %output.display(),
        nodes = summary.nodes,
        edges = summary.edges,
        "graph written"
    );
    Ok(summary)
}

/// One payload per stored team, written as `<dir>/team_<name>.json`.
/// The request's own team filter is ignored.
pub fn run_team_reports(
    request: &GraphRequest,
    output_dir: &Path,
) -> Result<Vec<(String, PathBuf, GraphSummary)>> {
    let base = request.history_filter()?;
    let (store, modules) = request.open()?;
    std::fs::create_dir_all(output_dir)?;

    let mut written = Vec::new();
    for team in store.teams()? {
        let filter = HistoryFilter {
            team: Some(team.clone()),
            ..base.clone()
        };
        let payload = build_payload(
            &store,
            &modules,
            &filter,
            &request.options,
            &request.repository_url,
        )?;
        let path = output_dir.join(format!("team_{}.json", file_stem(&team)));
        write_payload(&path, &payload)?;
        info!(team = %team, path = %path.display(), "team graph written");
        written.push((team, path, summarize(&payload)));
    }
    Ok(written)
}

/// Team names as safe file-name fragments.
fn file_stem(team: &str) -> String {
    team.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
