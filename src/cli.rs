// src/cli.rs

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file; `git-cochange.toml` is used when present
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load new commits from a repository's history into the store
    Ingest(IngestArgs),
    /// Build the co-change graph payload from the store
    Graph(GraphArgs),
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Any path inside the repository to ingest
    #[arg(short, long, default_value = ".")]
    pub repo: PathBuf,

    /// SQLite store to create or extend
    #[arg(short, long)]
    pub database: Option<PathBuf>,

    /// CSV of `email,user,team` author rules
    #[arg(long)]
    pub users: Option<PathBuf>,

    /// Where authors without a rule are written
    #[arg(long)]
    pub unknown_users: Option<PathBuf>,

    /// Only commits after this date (passed to git as-is)
    #[arg(long)]
    pub since: Option<String>,

    /// Only commits before this date (passed to git as-is)
    #[arg(long)]
    pub until: Option<String>,

    /// Move the existing store to its backup and start empty
    #[arg(long)]
    pub fresh: bool,

    /// Pathspecs limiting which files are logged
    #[arg(last = true)]
    pub patterns: Vec<String>,
}

#[derive(Args, Debug)]
pub struct GraphArgs {
    /// SQLite store produced by `ingest`
    #[arg(short, long)]
    pub database: Option<PathBuf>,

    /// CSV of `path,module` rows
    #[arg(short, long)]
    pub modules: Option<PathBuf>,

    /// JSON payload to write
    #[arg(short, long, default_value = "graph.json")]
    pub output: PathBuf,

    /// Window start: a date or e.g. "3 months ago"
    #[arg(long)]
    pub since: Option<String>,

    /// Window end: a date, "now" or e.g. "1 week ago"
    #[arg(long)]
    pub until: Option<String>,

    /// Commits touching more files than this are ignored
    #[arg(long)]
    pub max_files: Option<usize>,

    /// Minimum co-change weight for an edge to be kept
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Path prefixes shown as the "Current" module; only commits touching them count
    #[arg(long, value_delimiter = ',')]
    pub folders: Vec<String>,

    /// Restrict the graph to files this team touched
    #[arg(long, conflicts_with = "all_teams")]
    pub team: Option<String>,

    /// Repository link embedded in the payload; read from `origin` by default
    #[arg(long)]
    pub repository_url: Option<String>,

    /// Repository whose `origin` supplies the link
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Write one payload per stored team instead of a single graph
    #[arg(long)]
    pub all_teams: bool,

    /// Directory for per-team payloads
    #[arg(long, default_value = "team_reports")]
    pub output_dir: PathBuf,
}
