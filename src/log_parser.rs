// src/log_parser.rs

//! Turns the line stream of `git log --pretty=format:%H|%an|%ae|%aI|%s --numstat`
//! into [`CommitBlock`]s.
//!
//! A header line always closes whatever block is pending. Blocks that never
//! collect a numstat line (empty commits, mode-only changes) are dropped.

use crate::model::{CommitBlock, FileStat};
use std::io::BufRead;
use tracing::{debug, warn};

enum State {
    AwaitingHeader,
    AccumulatingFiles(CommitBlock),
}

pub struct LogStreamParser<I> {
    lines: I,
    state: State,
    line_no: usize,
    exhausted: bool,
}

impl<I, S> LogStreamParser<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    pub fn new(lines: I) -> Self {
        Self {
            lines,
            state: State::AwaitingHeader,
            line_no: 0,
            exhausted: false,
        }
    }

    fn take_pending(&mut self) -> Option<CommitBlock> {
        match std::mem::replace(&mut self.state, State::AwaitingHeader) {
            State::AccumulatingFiles(block) if !block.files.is_empty() => Some(block),
            State::AccumulatingFiles(block) => {
                debug!(commit = %block.commit_id, "dropping commit without file changes");
                None
            }
            State::AwaitingHeader => None,
        }
    }
}

impl<I, S> Iterator for LogStreamParser<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    type Item = CommitBlock;

    fn next(&mut self) -> Option<CommitBlock> {
        if self.exhausted {
            return None;
        }
        loop {
            let Some(raw) = self.lines.next() else {
                self.exhausted = true;
                return self.take_pending();
            };
            self.line_no += 1;
            let line = raw.as_ref().trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }

            if looks_like_header(line) {
                let finished = self.take_pending();
                match parse_header(line) {
                    Some(block) => self.state = State::AccumulatingFiles(block),
                    None => warn!(line = self.line_no, "malformed commit header skipped: {line:?}"),
                }
                if finished.is_some() {
                    return finished;
                }
                continue;
            }

            match &mut self.state {
                State::AccumulatingFiles(block) => match parse_stat(line) {
                    Some(stat) => block.files.push(stat),
                    None => warn!(line = self.line_no, "malformed numstat line skipped: {line:?}"),
                },
                State::AwaitingHeader => {
                    debug!(line = self.line_no, "numstat line outside any commit ignored");
                }
            }
        }
    }
}

/// `<lowercase hex>|...`; a stat line never matches because it starts with
/// a count (or `-`) followed by a tab.
fn looks_like_header(line: &str) -> bool {
    match line.split_once('|') {
        Some((id, _)) => {
            !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        }
        None => false,
    }
}

/// The summary is last and may itself contain `|`, so split at most 5 ways.
fn parse_header(line: &str) -> Option<CommitBlock> {
    let mut parts = line.splitn(5, '|');
    let commit_id = parts.next()?;
    let author_name = parts.next()?;
    let author_email = parts.next()?;
    let date = parts.next()?;
    let summary = parts.next()?;
    Some(CommitBlock {
        commit_id: commit_id.to_string(),
        author_name: author_name.to_string(),
        author_email: author_email.to_string(),
        date: date.trim().to_string(),
        summary: summary.to_string(),
        files: Vec::new(),
    })
}

/// `added\tdeleted\tfilename`; binary files report `-` counts, read as 0.
fn parse_stat(line: &str) -> Option<FileStat> {
    let mut parts = line.splitn(3, '\t');
    let added = parts.next()?;
    let deleted = parts.next()?;
    let name = parts.next()?;
    if name.is_empty() {
        return None;
    }
    Some(FileStat {
        name: name.to_string(),
        added: added.trim().parse().unwrap_or(0),
        deleted: deleted.trim().parse().unwrap_or(0),
    })
}

/// Line iterator over a byte stream that tolerates non-UTF-8 author names
/// and paths. Stops at the first read error.
pub struct LossyLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LossyLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(256),
        }
    }
}

impl<R: BufRead> Iterator for LossyLines<R> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => Some(String::from_utf8_lossy(&self.buf).into_owned()),
            Err(e) => {
                warn!("log stream read failed, treating as end of stream: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Vec<CommitBlock> {
        LogStreamParser::new(input.lines()).collect()
    }

    #[test]
    fn test_parses_header_and_numstat() {
        let log = "a1b2c3|Alice|alice@example.com|2024-03-01T10:00:00+00:00|Fix parser\n\
                   \n\
                   3\t1\tsrc/lib.rs\n\
                   10\t0\tREADME.md\n";
        let blocks = parse(log);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].commit_id, "a1b2c3");
        assert_eq!(blocks[0].author_email, "alice@example.com");
        assert_eq!(blocks[0].files.len(), 2);
        assert_eq!(blocks[0].files[0].name, "src/lib.rs");
        assert_eq!(blocks[0].files[0].added, 3);
        assert_eq!(blocks[0].files[0].deleted, 1);
    }

    #[test]
    fn test_summary_keeps_delimiter() {
        let log = "ff00|Bob|bob@x.org|2024-03-01T10:00:00+00:00|a | b | c\n1\t1\tx.py\n";
        let blocks = parse(log);
        assert_eq!(blocks[0].summary, "a | b | c");
    }

    #[test]
    fn test_binary_counts_coerced_to_zero() {
        let log = "abc|Bob|bob@x.org|2024-03-01T10:00:00+00:00|logo\n-\t-\tassets/logo.png\n";
        let blocks = parse(log);
        assert_eq!(blocks[0].files[0].added, 0);
        assert_eq!(blocks[0].files[0].deleted, 0);
    }

    #[test]
    fn test_empty_commit_dropped() {
        let log = "aaa|A|a@x|2024-03-02T10:00:00+00:00|empty\n\
                   bbb|B|b@x|2024-03-01T10:00:00+00:00|real\n\
                   1\t0\tx.py\n";
        let blocks = parse(log);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].commit_id, "bbb");
    }

    #[test]
    fn test_malformed_stat_line_skipped() {
        let log = "abc|A|a@x|2024-03-01T10:00:00+00:00|s\n\
                   1\t0\n\
                   2\t2\tkept.rs\n";
        let blocks = parse(log);
        assert_eq!(blocks[0].files.len(), 1);
        assert_eq!(blocks[0].files[0].name, "kept.rs");
    }

    #[test]
    fn test_malformed_header_closes_block_and_discards_its_stats() {
        let log = "aaa|A|a@x|2024-03-02T10:00:00+00:00|first\n\
                   1\t0\tone.rs\n\
                   bbb|broken\n\
                   5\t5\torphan.rs\n\
                   ccc|C|c@x|2024-03-01T10:00:00+00:00|third\n\
                   1\t1\tthree.rs\n";
        let blocks = parse(log);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].files.len(), 1);
        assert_eq!(blocks[1].commit_id, "ccc");
        assert_eq!(blocks[1].files[0].name, "three.rs");
    }

    #[test]
    fn test_rename_notation_passed_through() {
        let log = "abc|A|a@x|2024-03-01T10:00:00+00:00|mv\n0\t0\tsrc/{old => new}/mod.rs\n";
        let blocks = parse(log);
        assert_eq!(blocks[0].files[0].name, "src/{old => new}/mod.rs");
    }

    #[test]
    fn test_lossy_lines_handles_invalid_utf8() {
        let bytes: &[u8] = b"abc|Ren\xe9|r@x|2024-03-01T10:00:00+00:00|s\n1\t1\tf.c\n";
        let blocks: Vec<_> = LogStreamParser::new(LossyLines::new(bytes)).collect();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].author_name.starts_with("Ren"));
    }
}
