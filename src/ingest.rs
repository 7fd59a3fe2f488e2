// src/ingest.rs

//! Runs `git log` against a working tree and streams its output into the
//! commit store.

use crate::error::{Error, Result};
use crate::log_parser::{LogStreamParser, LossyLines};
use crate::store::{CommitStore, IngestOutcome, IngestSession, StoreCounts};
use crate::users::UserResolver;
use git2::Repository;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const LOG_FORMAT: &str = "--pretty=format:%H|%an|%ae|%aI|%s";
pub const UNKNOWN_REPOSITORY_URL: &str = "Unknown";

/// How long git gets to exit on its own after its pipe is closed
const HALT_GRACE: Duration = Duration::from_secs(3);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Any path inside the working tree
    pub repo: PathBuf,
    pub database: PathBuf,
    pub users_file: PathBuf,
    pub unknown_users_file: PathBuf,
    pub since: Option<String>,
    pub until: Option<String>,
    /// Pathspecs passed after `--`
    pub patterns: Vec<String>,
    /// Move the existing store aside instead of extending it
    pub fresh: bool,
    pub commit_batch: usize,
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub outcome: IngestOutcome,
    pub counts: StoreCounts,
    pub unknown_users: usize,
    pub backup: Option<PathBuf>,
}

pub fn run_ingest(request: &IngestRequest) -> Result<IngestReport> {
    // everything that can be rejected is checked before the store is touched
    let users = UserResolver::from_csv(&request.users_file)?;
    let root = repository_root(&request.repo)?;
    info!(root = %root.display(), "ingesting repository");

    let backup = backup_database(&request.database, request.fresh)?;
    let store = CommitStore::open(&request.database)?;
    let mut session = IngestSession::new(users);

    let args = log_args(
        request.since.as_deref(),
        request.until.as_deref(),
        &request.patterns,
    );
    let (process, stdout) = LogProcess::spawn(&root, &args)?;

    let bar = ProgressBar::new_spinner();
    bar.set_style(spinner_style());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar.set_message("reading history");

    let blocks = LogStreamParser::new(LossyLines::new(BufReader::new(stdout)));
    let ingested = store.ingest(blocks, &mut session, request.commit_batch, |block| {
        bar.inc(1);
        bar.set_message(block.commit_id.chars().take(10).collect::<String>());
    });

    let outcome = match ingested {
        Ok(outcome) => outcome,
        Err(e) => {
            bar.abandon_with_message("ingestion failed");
            process.kill();
            return Err(e);
        }
    };
    bar.finish_with_message(format!("{} new commits", outcome.commits_added));
    process.finish(outcome.halted_on.is_some())?;

    session
        .users
        .unknown()
        .export_csv(&request.unknown_users_file)?;

    Ok(IngestReport {
        counts: store.counts()?,
        unknown_users: session.users.unknown().len(),
        outcome,
        backup,
    })
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {pos} commits {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Arguments for `git log`, newest first, merges excluded.
pub fn log_args(since: Option<&str>, until: Option<&str>, patterns: &[String]) -> Vec<String> {
    let mut args = vec![
        "log".to_string(),
        LOG_FORMAT.to_string(),
        "--numstat".to_string(),
        "--no-merges".to_string(),
    ];
    if let Some(since) = since {
        args.push(format!("--since={since}"));
    }
    if let Some(until) = until {
        args.push(format!("--until={until}"));
    }
    if !patterns.is_empty() {
        args.push("--".to_string());
        args.extend(patterns.iter().cloned());
    }
    args
}

/// Working-tree root of the repository containing `path`.
pub fn repository_root(path: &Path) -> Result<PathBuf> {
    let repo = Repository::discover(path)?;
    let root = repo
        .workdir()
        .ok_or_else(|| Error::Config(format!("{} is a bare repository", path.display())))?;
    Ok(root.to_path_buf())
}

/// Browsable URL of `origin`, or [`UNKNOWN_REPOSITORY_URL`].
pub fn repository_url(path: &Path) -> String {
    let url = Repository::discover(path).ok().and_then(|repo| {
        let remote = repo.find_remote("origin").ok()?;
        remote.url().map(normalize_remote_url)
    });
    url.unwrap_or_else(|| {
        warn!(path = %path.display(), "no origin remote, repository url unknown");
        UNKNOWN_REPOSITORY_URL.to_string()
    })
}

/// `git@host:org/repo.git` -> `https://host/org/repo`
pub fn normalize_remote_url(raw: &str) -> String {
    let raw = raw.trim();
    let url = match raw.strip_prefix("git@") {
        Some(rest) => format!("https://{}", rest.replacen(':', "/", 1)),
        None => raw.to_string(),
    };
    url.strip_suffix(".git").map(str::to_string).unwrap_or(url)
}

/// `<db>.back` beside the store.
pub fn backup_path(database: &Path) -> PathBuf {
    let mut name = database.as_os_str().to_owned();
    name.push(".back");
    PathBuf::from(name)
}

/// Copies (or with `fresh`, moves) an existing store to its backup path,
/// replacing any older backup.
pub fn backup_database(database: &Path, fresh: bool) -> Result<Option<PathBuf>> {
    if !database.exists() {
        debug!(path = %database.display(), "no existing store to back up");
        return Ok(None);
    }
    let backup = backup_path(database);
    if backup.exists() {
        std::fs::remove_file(&backup)?;
    }
    if fresh {
        std::fs::rename(database, &backup)?;
        info!(backup = %backup.display(), "moved existing store aside, starting fresh");
    } else {
        std::fs::copy(database, &backup)?;
        info!(backup = %backup.display(), "backed up existing store");
    }
    Ok(Some(backup))
}

/// A running `git log` with its stderr drained on a side thread
struct LogProcess {
    child: Child,
    command: String,
    stderr: Option<JoinHandle<String>>,
}

impl LogProcess {
    fn spawn(root: &Path, args: &[String]) -> Result<(Self, std::process::ChildStdout)> {
        let command = format!("git {}", args.join(" "));
        debug!(%command, cwd = %root.display(), "spawning log command");
        let mut child = Command::new("git")
            .args(args)
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Subprocess {
                command: command.clone(),
                status: "not started".to_string(),
                stderr: e.to_string(),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| Error::Subprocess {
            command: command.clone(),
            status: "no stdout".to_string(),
            stderr: String::new(),
        })?;
        let stderr = child.stderr.take().map(drain_stderr);
        Ok((
            Self {
                child,
                command,
                stderr,
            },
            stdout,
        ))
    }

    /// Waits for git after its stdout has been dropped.
    ///
    /// After a halt git is usually still writing; the closed pipe ends it,
    /// and anything still alive after [`HALT_GRACE`] is killed. A non-zero
    /// exit is only an error when the whole stream was consumed.
    fn finish(mut self, halted: bool) -> Result<()> {
        let status = if halted {
            wait_with_grace(&mut self.child, HALT_GRACE)?
        } else {
            Some(self.child.wait()?)
        };
        let stderr = self.collect_stderr();

        match status {
            None => {
                warn!(command = %self.command, "log command did not exit after halt, killed");
                Ok(())
            }
            Some(status) if halted || status.success() => {
                debug!(command = %self.command, %status, "log command finished");
                Ok(())
            }
            Some(status) => Err(Error::Subprocess {
                command: self.command,
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            }),
        }
    }

    fn kill(mut self) {
        if let Err(e) = self.child.kill() {
            debug!("log command already gone: {e}");
        }
        if let Err(e) = self.child.wait() {
            debug!("reaping log command failed: {e}");
        }
        self.collect_stderr();
    }

    fn collect_stderr(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

fn drain_stderr(mut stderr: ChildStderr) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = stderr.read_to_end(&mut buf) {
            debug!("reading log command stderr failed: {e}");
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Polls until the child exits; kills it once `grace` runs out and
/// returns `None` in that case.
fn wait_with_grace(child: &mut Child, grace: Duration) -> Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() > grace {
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
