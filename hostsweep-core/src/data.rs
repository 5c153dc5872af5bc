use crate::error::{EnumError, Result};
use crate::model::{
    DiscoveredHost, HostRecord, Run, RunId, RunStatus, RunUpdate, Wordlist, WordlistKind,
    current_timestamp,
};
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, Row, ffi, params};
use std::fs;
use std::path::Path;
use tracing::warn;

const DOMAIN_PATTERN: &str = r"^[A-Za-z0-9.-]+\.[A-Za-z]{2,}$";

const RUN_COLUMNS: &str = "id, domain, status, log_snippet, error_message, wordlist_id, created_at, started_at, finished_at";
const WORDLIST_COLUMNS: &str = "id, name, path, size_bytes, type, is_default, created_at";

/// Outcome of a bulk host insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostInsert {
    Inserted(usize),
    /// A host already recorded for the run; the whole batch was rolled back.
    Conflict,
}

/// What the enumeration engine needs from persistence.
pub trait RunStore {
    fn get_run(&self, run_id: RunId) -> Result<Option<Run>>;

    /// Apply `update` to `run` and persist it. Stamps `started_at` on the
    /// first move to running and `finished_at` when the update is final.
    fn update_run(&self, run: &mut Run, update: RunUpdate) -> Result<()>;

    /// The wordlist with `id` when given, otherwise the default of that kind.
    /// Either way it must be of `kind`.
    fn find_wordlist(&self, id: Option<i64>, kind: WordlistKind) -> Result<Option<Wordlist>>;

    /// Insert all hosts in one transaction. Unique conflicts roll the batch
    /// back and are reported, never raised.
    fn insert_hosts(&self, hosts: &[DiscoveredHost]) -> Result<HostInsert>;
}

impl<T: RunStore + ?Sized> RunStore for &T {
    fn get_run(&self, run_id: RunId) -> Result<Option<Run>> {
        (**self).get_run(run_id)
    }

    fn update_run(&self, run: &mut Run, update: RunUpdate) -> Result<()> {
        (**self).update_run(run, update)
    }

    fn find_wordlist(&self, id: Option<i64>, kind: WordlistKind) -> Result<Option<Wordlist>> {
        (**self).find_wordlist(id, kind)
    }

    fn insert_hosts(&self, hosts: &[DiscoveredHost]) -> Result<HostInsert> {
        (**self).insert_hosts(hosts)
    }
}

pub struct Database {
    conn: Connection,
}

pub fn validate_domain(domain: &str) -> Result<()> {
    let pattern = Regex::new(DOMAIN_PATTERN)
        .map_err(|e| EnumError::Config(format!("domain pattern: {}", e)))?;
    if pattern.is_match(domain) {
        Ok(())
    } else {
        Err(EnumError::InvalidDomain(domain.to_string()))
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<Run> {
    Ok(Run {
        id: row.get(0)?,
        domain: row.get(1)?,
        status: row.get(2)?,
        log_snippet: row.get(3)?,
        error_message: row.get(4)?,
        wordlist_id: row.get(5)?,
        created_at: row.get(6)?,
        started_at: row.get(7)?,
        finished_at: row.get(8)?,
    })
}

fn wordlist_from_row(row: &Row<'_>) -> rusqlite::Result<Wordlist> {
    Ok(Wordlist {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        size_bytes: row.get(3)?,
        kind: row.get(4)?,
        is_default: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(code, _)
            if code.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || code.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

impl Database {
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn remove(path: &Path) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -16000;  -- 16MB cache
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            -- Uploaded wordlists, the file itself lives on disk
            CREATE TABLE IF NOT EXISTS wordlists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    path TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    type TEXT NOT NULL DEFAULT 'subdomain' CHECK(type IN ('subdomain', 'username', 'password')),
    is_default BOOLEAN NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_wordlists_type ON wordlists(type);

-- One enumeration against one domain
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending', 'running', 'succeeded', 'failed', 'canceled')),
    error_message TEXT,
    log_snippet TEXT NOT NULL DEFAULT '',
    wordlist_id INTEGER,
    created_at INTEGER NOT NULL,
    started_at INTEGER,
    finished_at INTEGER,

    FOREIGN KEY(wordlist_id) REFERENCES wordlists(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_runs_domain ON runs(domain);

-- Hosts confirmed live during a run
CREATE TABLE IF NOT EXISTS discovered_hosts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL,
    host TEXT NOT NULL,
    source TEXT,
    metadata TEXT,            -- JSON probe diagnostics
    discovered_at INTEGER NOT NULL,

    FOREIGN KEY(run_id) REFERENCES runs(id) ON DELETE CASCADE,
    UNIQUE(run_id, host)
);

CREATE INDEX IF NOT EXISTS idx_discovered_hosts_host ON discovered_hosts(host);
            ",
        )?;
        Ok(())
    }

    // Run management
    pub fn create_run(&self, domain: &str, wordlist_id: Option<i64>) -> Result<Run> {
        let domain = domain.trim();
        validate_domain(domain)?;

        if let Some(id) = wordlist_id {
            let wordlist = self
                .get_wordlist(id)?
                .ok_or(EnumError::WordlistNotFound(id))?;
            if wordlist.kind != WordlistKind::Subdomain {
                return Err(EnumError::WordlistType {
                    id,
                    found: wordlist.kind.to_string(),
                    expected: WordlistKind::Subdomain.to_string(),
                });
            }
        }

        let timestamp = current_timestamp();
        self.conn.execute(
            "INSERT INTO runs (domain, status, log_snippet, wordlist_id, created_at) VALUES (?1, ?2, '', ?3, ?4)",
            params![domain, RunStatus::Pending, wordlist_id, timestamp],
        )?;

        let id = self.conn.last_insert_rowid();
        self.get_run(id)?.ok_or(EnumError::RunNotFound(id))
    }

    pub fn recent_runs(&self, limit: usize) -> Result<Vec<Run>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM runs ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;

        let runs = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(runs)
    }

    pub fn hosts_for_run(&self, run_id: RunId) -> Result<Vec<HostRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, host, source, metadata, discovered_at
             FROM discovered_hosts WHERE run_id = ?1 ORDER BY id",
        )?;

        let hosts = stmt
            .query_map(params![run_id], |row| {
                Ok(HostRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    host: row.get(2)?,
                    source: row.get(3)?,
                    metadata: row.get(4)?,
                    discovered_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(hosts)
    }

    // Wordlist management
    pub fn add_wordlist(
        &self,
        name: &str,
        path: &str,
        size_bytes: i64,
        kind: WordlistKind,
        is_default: bool,
    ) -> Result<Wordlist> {
        let tx = self.conn.unchecked_transaction()?;
        if is_default {
            tx.execute(
                "UPDATE wordlists SET is_default = 0 WHERE type = ?1",
                params![kind],
            )?;
        }
        tx.execute(
            "INSERT INTO wordlists (name, path, size_bytes, type, is_default, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![name, path, size_bytes, kind, is_default, current_timestamp()],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        self.get_wordlist(id)?.ok_or(EnumError::WordlistNotFound(id))
    }

    pub fn get_wordlist(&self, id: i64) -> Result<Option<Wordlist>> {
        let wordlist = self
            .conn
            .query_row(
                &format!("SELECT {} FROM wordlists WHERE id = ?1", WORDLIST_COLUMNS),
                params![id],
                wordlist_from_row,
            )
            .optional()?;
        Ok(wordlist)
    }

    pub fn list_wordlists(&self, kind: Option<WordlistKind>) -> Result<Vec<Wordlist>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM wordlists WHERE ?1 IS NULL OR type = ?1 ORDER BY id",
            WORDLIST_COLUMNS
        ))?;

        let wordlists = stmt
            .query_map(params![kind], wordlist_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(wordlists)
    }

    /// Make `id` the only default among wordlists of its kind.
    pub fn set_default_wordlist(&self, id: i64) -> Result<Wordlist> {
        let wordlist = self
            .get_wordlist(id)?
            .ok_or(EnumError::WordlistNotFound(id))?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE wordlists SET is_default = 0 WHERE type = ?1",
            params![wordlist.kind],
        )?;
        tx.execute(
            "UPDATE wordlists SET is_default = 1 WHERE id = ?1",
            params![id],
        )?;
        tx.commit()?;

        self.get_wordlist(id)?.ok_or(EnumError::WordlistNotFound(id))
    }

    pub fn update_wordlist_size(&self, id: i64, size_bytes: i64) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE wordlists SET size_bytes = ?1 WHERE id = ?2",
            params![size_bytes, id],
        )?;
        if changed == 0 {
            return Err(EnumError::WordlistNotFound(id));
        }
        Ok(())
    }

    /// Remove the record and return it so the caller can delete the file.
    pub fn delete_wordlist(&self, id: i64) -> Result<Wordlist> {
        let wordlist = self
            .get_wordlist(id)?
            .ok_or(EnumError::WordlistNotFound(id))?;
        self.conn
            .execute("DELETE FROM wordlists WHERE id = ?1", params![id])?;
        Ok(wordlist)
    }

    pub fn wordlist_paths(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT path FROM wordlists")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(paths)
    }
}

impl RunStore for Database {
    fn get_run(&self, run_id: RunId) -> Result<Option<Run>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn update_run(&self, run: &mut Run, update: RunUpdate) -> Result<()> {
        if let Some(status) = update.status
            && run.status.is_terminal()
            && status != run.status
        {
            warn!(
                "Run {} is already {}, ignoring move to {}",
                run.id, run.status, status
            );
        }

        run.apply(&update, current_timestamp());
        self.conn.execute(
            "UPDATE runs SET status = ?1, log_snippet = ?2, error_message = ?3,
                             started_at = ?4, finished_at = ?5
             WHERE id = ?6",
            params![
                run.status,
                &run.log_snippet,
                &run.error_message,
                run.started_at,
                run.finished_at,
                run.id,
            ],
        )?;
        Ok(())
    }

    fn find_wordlist(&self, id: Option<i64>, kind: WordlistKind) -> Result<Option<Wordlist>> {
        let wordlist = match id {
            Some(id) => self.conn.query_row(
                &format!(
                    "SELECT {} FROM wordlists WHERE id = ?1 AND type = ?2",
                    WORDLIST_COLUMNS
                ),
                params![id, kind],
                wordlist_from_row,
            ),
            None => self.conn.query_row(
                &format!(
                    "SELECT {} FROM wordlists WHERE is_default = 1 AND type = ?1 ORDER BY id LIMIT 1",
                    WORDLIST_COLUMNS
                ),
                params![kind],
                wordlist_from_row,
            ),
        }
        .optional()?;
        Ok(wordlist)
    }

    fn insert_hosts(&self, hosts: &[DiscoveredHost]) -> Result<HostInsert> {
        if hosts.is_empty() {
            return Ok(HostInsert::Inserted(0));
        }

        let timestamp = current_timestamp();
        let tx = self.conn.unchecked_transaction()?;
        for host in hosts {
            let outcome = tx.execute(
                "INSERT INTO discovered_hosts (run_id, host, source, metadata, discovered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![host.run_id, &host.host, &host.source, &host.metadata, timestamp],
            );
            match outcome {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    tx.rollback()?;
                    warn!(
                        "Duplicate host {} for run {}, batch of {} rolled back",
                        host.host,
                        host.run_id,
                        hosts.len()
                    );
                    return Ok(HostInsert::Conflict);
                }
                Err(e) => return Err(e.into()),
            }
        }
        tx.commit()?;

        Ok(HostInsert::Inserted(hosts.len()))
    }
}
