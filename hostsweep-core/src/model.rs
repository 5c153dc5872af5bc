// Run, host and wordlist records shared by storage, the engine and reports

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type RunId = i64;

/// Character budget of a run's rolling log.
pub const LOG_LIMIT: usize = 4000;

/// Source tag stored on hosts found by the HTTP enumerator.
pub const HTTP_ENUMERATOR_SOURCE: &str = "http_enumerator";

pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(RunStatus::Pending),
            "running" => Some(RunStatus::Running),
            "succeeded" => Some(RunStatus::Succeeded),
            "failed" => Some(RunStatus::Failed),
            "canceled" | "cancelled" => Some(RunStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Canceled
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for RunStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RunStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        RunStatus::parse(raw)
            .ok_or_else(|| FromSqlError::Other(format!("unknown run status '{}'", raw).into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub domain: String,
    pub status: RunStatus,
    pub log_snippet: String,
    pub error_message: Option<String>,
    pub wordlist_id: Option<i64>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl Run {
    /// Apply `update` in memory. A run that reached a terminal status keeps it;
    /// log lines and errors are still recorded.
    pub fn apply(&mut self, update: &RunUpdate, now: i64) {
        if let Some(status) = update.status
            && !self.status.is_terminal()
        {
            self.status = status;
            if status == RunStatus::Running && self.started_at.is_none() {
                self.started_at = Some(now);
            }
        }
        if let Some(line) = &update.log_line
            && !line.is_empty()
        {
            self.log_snippet = append_log(&self.log_snippet, line);
        }
        if let Some(error) = &update.error
            && !error.is_empty()
        {
            self.error_message = Some(error.clone());
        }
        if update.finished {
            self.finished_at = Some(now);
        }
    }
}

/// Partial update of a run: optional status, log line and error, plus a
/// flag that stamps `finished_at`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub log_line: Option<String>,
    pub error: Option<String>,
    pub finished: bool,
}

impl RunUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: RunStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn log(mut self, line: impl Into<String>) -> Self {
        self.log_line = Some(line.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn finished(mut self) -> Self {
        self.finished = true;
        self
    }
}

/// Join `line` onto `buffer` and keep only the newest `LOG_LIMIT` characters.
pub fn append_log(buffer: &str, line: &str) -> String {
    let combined = format!("{}\n{}", buffer, line);
    let combined = combined.trim();

    let count = combined.chars().count();
    if count <= LOG_LIMIT {
        return combined.to_string();
    }

    let start = combined
        .char_indices()
        .nth(count - LOG_LIMIT)
        .map(|(idx, _)| idx)
        .unwrap_or(combined.len());
    combined[start..].to_string()
}

/// A confirmed hit waiting to be persisted. `metadata` is the JSON-encoded
/// probe diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredHost {
    pub run_id: RunId,
    pub host: String,
    pub source: String,
    pub metadata: Option<String>,
}

/// A persisted hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    pub id: i64,
    pub run_id: RunId,
    pub host: String,
    pub source: Option<String>,
    pub metadata: Option<String>,
    pub discovered_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordlistKind {
    Subdomain,
    Username,
    Password,
}

impl WordlistKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WordlistKind::Subdomain => "subdomain",
            WordlistKind::Username => "username",
            WordlistKind::Password => "password",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "subdomain" => Some(WordlistKind::Subdomain),
            "username" => Some(WordlistKind::Username),
            "password" => Some(WordlistKind::Password),
            _ => None,
        }
    }
}

impl fmt::Display for WordlistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for WordlistKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for WordlistKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        WordlistKind::parse(raw)
            .ok_or_else(|| FromSqlError::Other(format!("unknown wordlist type '{}'", raw).into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wordlist {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub size_bytes: i64,
    pub kind: WordlistKind,
    pub is_default: bool,
    pub created_at: i64,
}
