// src/users.rs

use crate::error::{Error, Result};
use crate::model::UserRule;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

pub const UNKNOWN_TEAM: &str = "unknown";

/// Authors no rule matched, in first-seen order
#[derive(Debug, Default)]
pub struct UnknownUserRegistry {
    seen: HashSet<(String, String)>,
    ordered: Vec<(String, String)>,
}

#[derive(Serialize)]
struct UnknownUserRow<'a> {
    name: &'a str,
    email: &'a str,
    team: &'a str,
}

impl UnknownUserRegistry {
    fn record(&mut self, name: &str, email: &str) {
        let key = (name.to_string(), email.to_string());
        if self.seen.insert(key.clone()) {
            debug!(name, email, "unknown author");
            self.ordered.push(key);
        }
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Writes `name,email,team` rows, team always `unknown`.
    pub fn export_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for (name, email) in &self.ordered {
            writer.serialize(UnknownUserRow {
                name,
                email,
                team: UNKNOWN_TEAM,
            })?;
        }
        writer.flush()?;
        info!(count = self.ordered.len(), path = %path.display(), "exported unknown authors");
        Ok(())
    }
}

/// Maps raw author identity onto a canonical name and team.
///
/// Rules are tried in declared order and the first whose wildcard token is
/// a case-insensitive substring of the email wins.
#[derive(Debug, Default)]
pub struct UserResolver {
    rules: Vec<(String, UserRule)>,
    unknown: UnknownUserRegistry,
}

impl UserResolver {
    pub fn new(rules: Vec<UserRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| (wildcard_token(&rule.email_wildcard), rule))
            .collect();
        Self {
            rules,
            unknown: UnknownUserRegistry::default(),
        }
    }

    /// Loads `email,user,team` rows; a missing file aborts the run.
    pub fn from_csv(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "user mapping file {} not found",
                path.display()
            )));
        }
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        let rules = reader
            .deserialize::<UserRule>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        info!(rules = rules.len(), path = %path.display(), "loaded user mapping");
        Ok(Self::new(rules))
    }

    pub fn resolve(&mut self, raw_name: &str, raw_email: &str) -> (String, String) {
        let email = raw_email.to_lowercase();
        if let Some((_, rule)) = self
            .rules
            .iter()
            .find(|(token, _)| email.contains(token.as_str()))
        {
            return (rule.canonical_name.clone(), rule.team.clone());
        }
        self.unknown.record(raw_name, raw_email);
        (raw_name.to_string(), UNKNOWN_TEAM.to_string())
    }

    pub fn unknown(&self) -> &UnknownUserRegistry {
        &self.unknown
    }
}

/// `*@corp.com` -> `@corp.com`, lowercased.
fn wildcard_token(pattern: &str) -> String {
    pattern.trim().trim_matches('*').to_lowercase()
}
