// src/store.rs

//! SQLite persistence for commits and their file changes.
//!
//! The database runs in WAL mode so a report run can read while an
//! ingestion run writes. All writes from one store go through a single
//! mutex-guarded connection.

use crate::error::{Error, Result};
use crate::model::{CommitBlock, CommitRecord, FileChange, HistorySlice};
use crate::renames::RenameTable;
use crate::timespec::parse_commit_date;
use crate::users::UserResolver;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS commits (
        id TEXT UNIQUE,
        summary TEXT,
        author_name TEXT,
        author_email TEXT,
        author_team TEXT,
        commit_date TEXT
    );
    CREATE TABLE IF NOT EXISTS commit_files (
        commit_id TEXT,
        filename TEXT,
        added INT,
        deleted INT,
        FOREIGN KEY (commit_id) REFERENCES commits(id)
    );
    CREATE INDEX IF NOT EXISTS idx_commit_files_filename ON commit_files(filename);
    CREATE INDEX IF NOT EXISTS idx_commit_files_commit_id ON commit_files(commit_id);
";

pub const DEFAULT_COMMIT_BATCH: usize = 500;

/// Per-run ingestion state, threaded through [`CommitStore::ingest`]
#[derive(Debug, Default)]
pub struct IngestSession {
    pub users: UserResolver,
    pub renames: RenameTable,
}

impl IngestSession {
    pub fn new(users: UserResolver) -> Self {
        Self {
            users,
            renames: RenameTable::new(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub commits_added: usize,
    pub files_added: usize,
    pub rows_rewritten: usize,
    /// The already-stored commit id that stopped the run, if any
    pub halted_on: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub commits: u64,
    pub file_changes: u64,
}

/// Time window and team scope for [`CommitStore::load_history`]
#[derive(Debug, Default, Clone)]
pub struct HistoryFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub team: Option<String>,
}

impl HistoryFilter {
    fn in_window(&self, at: DateTime<Utc>) -> bool {
        self.since.map_or(true, |since| at >= since) && self.until.map_or(true, |until| at <= until)
    }
}

enum BatchEnd {
    Full,
    Exhausted,
    Halted(String),
}

pub struct CommitStore {
    conn: Mutex<Connection>,
}

impl CommitStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened commit store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(journal_mode = %mode, "journal mode set");
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        add_missing_team_column(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::StoreLockPoisoned)
    }

    pub fn contains_commit(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        commit_exists(&conn, id)
    }

    /// Applies blocks newest-first until the stream ends or a stored id is met.
    ///
    /// Reaching an id that is already stored means everything older is
    /// stored too, so ingestion stops there. Transactions are committed
    /// every `batch_size` blocks and at the stopping point.
    pub fn ingest<I, F>(
        &self,
        blocks: I,
        session: &mut IngestSession,
        batch_size: usize,
        mut on_block: F,
    ) -> Result<IngestOutcome>
    where
        I: IntoIterator<Item = CommitBlock>,
        F: FnMut(&CommitBlock),
    {
        let batch_size = batch_size.max(1);
        let mut blocks = blocks.into_iter();
        let mut outcome = IngestOutcome::default();
        let mut conn = self.lock()?;

        loop {
            let tx = conn.transaction()?;
            let mut in_batch = 0;
            let end = loop {
                let Some(block) = blocks.next() else {
                    break BatchEnd::Exhausted;
                };
                if commit_exists(&tx, &block.commit_id)? {
                    break BatchEnd::Halted(block.commit_id);
                }
                let (files, rewritten) = apply_block(&tx, &block, session)?;
                outcome.commits_added += 1;
                outcome.files_added += files;
                outcome.rows_rewritten += rewritten;
                on_block(&block);
                in_batch += 1;
                if in_batch >= batch_size {
                    break BatchEnd::Full;
                }
            };
            tx.commit()?;

            match end {
                BatchEnd::Full => debug!(commits = outcome.commits_added, "batch committed"),
                BatchEnd::Exhausted => break,
                BatchEnd::Halted(id) => {
                    info!(commit = %id, "commit already stored, history is up to date from here");
                    outcome.halted_on = Some(id);
                    break;
                }
            }
        }
        Ok(outcome)
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        let conn = self.lock()?;
        let commits: i64 = conn.query_row("SELECT COUNT(*) FROM commits", [], |row| row.get(0))?;
        let file_changes: i64 =
            conn.query_row("SELECT COUNT(*) FROM commit_files", [], |row| row.get(0))?;
        Ok(StoreCounts {
            commits: commits.max(0) as u64,
            file_changes: file_changes.max(0) as u64,
        })
    }

    /// Distinct non-empty teams, sorted.
    pub fn teams(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT author_team FROM commits
             WHERE author_team IS NOT NULL AND author_team != ''
             ORDER BY author_team",
        )?;
        let teams = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(teams)
    }

    /// All file changes stored under `filename`, in insertion order.
    pub fn changes_for_file(&self, filename: &str) -> Result<Vec<FileChange>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT commit_id, filename, added, deleted FROM commit_files
             WHERE filename = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([filename], read_change)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Commits (newest first) and changes inside the filter's window.
    ///
    /// With a team filter, only files that team touched in the window are
    /// kept, together with every commit in the window touching them.
    pub fn load_history(&self, filter: &HistoryFilter) -> Result<HistorySlice> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, summary, author_name, author_email, author_team, commit_date FROM commits",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut commits = Vec::with_capacity(raw.len());
        for (id, summary, author_name, author_email, author_team, date) in raw {
            let date = date.unwrap_or_default();
            let Some(commit_date) = parse_commit_date(&date) else {
                warn!(commit = %id, date = %date, "skipping commit with unparseable date");
                continue;
            };
            if !filter.in_window(commit_date.with_timezone(&Utc)) {
                continue;
            }
            commits.push(CommitRecord {
                id,
                summary: summary.unwrap_or_default(),
                author_name: author_name.unwrap_or_default(),
                author_email: author_email.unwrap_or_default(),
                author_team: author_team.unwrap_or_default(),
                commit_date,
            });
        }
        commits.sort_by(|a, b| b.commit_date.cmp(&a.commit_date));

        let mut changes = {
            let in_window: HashSet<&str> = commits.iter().map(|c| c.id.as_str()).collect();
            let mut stmt = conn.prepare(
                "SELECT commit_id, filename, added, deleted FROM commit_files ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([], read_change)?
                .filter(|row| match row {
                    Ok(change) => in_window.contains(change.commit_id.as_str()),
                    Err(_) => true,
                })
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let Some(team) = filter.team.as_deref() else {
            return Ok(HistorySlice { commits, changes });
        };

        let team_files: HashSet<String> = {
            let team_commits: HashSet<&str> = commits
                .iter()
                .filter(|c| c.author_team == team)
                .map(|c| c.id.as_str())
                .collect();
            changes
                .iter()
                .filter(|c| team_commits.contains(c.commit_id.as_str()))
                .map(|c| c.filename.clone())
                .collect()
        };
        if team_files.is_empty() {
            warn!(team, "no commits by this team in the selected window");
            return Ok(HistorySlice::default());
        }

        changes.retain(|c| team_files.contains(&c.filename));
        let touched: HashSet<String> = changes.iter().map(|c| c.commit_id.clone()).collect();
        commits.retain(|c| touched.contains(&c.id));
        Ok(HistorySlice { commits, changes })
    }
}

fn read_change(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileChange> {
    Ok(FileChange {
        commit_id: row.get(0)?,
        filename: row.get(1)?,
        added: row.get::<_, Option<u32>>(2)?.unwrap_or(0),
        deleted: row.get::<_, Option<u32>>(3)?.unwrap_or(0),
    })
}

fn commit_exists(conn: &Connection, id: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM commits WHERE id = ?1", [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Inserts one commit; rename rewrites land before the block's own rows.
fn apply_block(
    tx: &Transaction<'_>,
    block: &CommitBlock,
    session: &mut IngestSession,
) -> Result<(usize, usize)> {
    let (author_name, author_team) = session.users.resolve(&block.author_name, &block.author_email);
    tx.execute(
        "INSERT INTO commits (id, summary, author_name, author_email, author_team, commit_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            block.commit_id,
            block.summary,
            author_name,
            block.author_email,
            author_team,
            block.date
        ],
    )?;

    let mut rows = Vec::with_capacity(block.files.len());
    let mut rewritten = 0;
    for stat in &block.files {
        let resolution = session.renames.resolve(&stat.name);
        if let Some(rewrite) = resolution.rewrite {
            let moved = tx.execute(
                "UPDATE commit_files SET filename = ?1 WHERE filename = ?2",
                params![rewrite.to, rewrite.from],
            )?;
            if moved > 0 {
                debug!(from = %rewrite.from, to = %rewrite.to, rows = moved, "rewrote renamed file rows");
            }
            rewritten += moved;
        }
        rows.push((resolution.filename, stat.added, stat.deleted));
    }

    let mut insert = tx.prepare_cached(
        "INSERT INTO commit_files (commit_id, filename, added, deleted) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (filename, added, deleted) in &rows {
        insert.execute(params![block.commit_id, filename, added, deleted])?;
    }
    debug!(commit = %block.commit_id, files = rows.len(), "commit stored");
    Ok((rows.len(), rewritten))
}

/// Stores created before teams were tracked lack `author_team`.
fn add_missing_team_column(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(commits)")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if !columns.iter().any(|c| c == "author_team") {
        info!("adding author_team column to existing commits table");
        conn.execute("ALTER TABLE commits ADD COLUMN author_team TEXT", [])?;
    }
    Ok(())
}
