// Wordlist files: loading candidates, normalizing, dedupe and orphan cleanup

use crate::error::{EnumError, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Upper bound for an imported or rewritten wordlist.
pub const MAX_WORDLIST_BYTES: usize = 10 * 1024 * 1024;

/// Load candidate words: lossy UTF-8, blank lines and `#` comments dropped,
/// entries trimmed, file order kept.
pub fn load_words(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read(path)?;
    let content = String::from_utf8_lossy(&raw);

    let words: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with('#'))
        .map(String::from)
        .collect();

    debug!("Loaded {} words from {}", words.len(), path.display());
    Ok(words)
}

pub fn normalize_newlines(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// Number of non-blank lines.
pub fn count_entries(content: &str) -> usize {
    normalize_newlines(content)
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .count()
}

/// Drop repeated entries, keeping the first occurrence of each. Returns the
/// new content plus the entry counts before and after.
pub fn dedupe_content(content: &str) -> (String, usize, usize) {
    let normalized = normalize_newlines(content);
    let lines: Vec<&str> = normalized
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let mut seen = HashSet::new();
    let deduped: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|line| seen.insert(*line))
        .collect();

    (deduped.join("\n"), lines.len(), deduped.len())
}

/// Validate and write wordlist content, returning its size in bytes.
pub fn write_content(path: &Path, content: &str) -> Result<usize> {
    let normalized = normalize_newlines(content);
    if normalized.trim().is_empty() {
        return Err(EnumError::InvalidWordlist("wordlist is empty".to_string()));
    }
    if normalized.len() > MAX_WORDLIST_BYTES {
        return Err(EnumError::InvalidWordlist(format!(
            "wordlist is {} bytes, limit is {}",
            normalized.len(),
            MAX_WORDLIST_BYTES
        )));
    }
    fs::write(path, normalized.as_bytes())?;
    Ok(normalized.len())
}

/// Copy `source` into `dir` under a unique file name. Returns the stored path
/// and its size.
pub fn import_file(source: &Path, dir: &Path) -> Result<(PathBuf, usize)> {
    let raw = fs::read(source)?;
    if raw.is_empty() {
        return Err(EnumError::InvalidWordlist(format!(
            "{} is empty",
            source.display()
        )));
    }
    if raw.len() > MAX_WORDLIST_BYTES {
        return Err(EnumError::InvalidWordlist(format!(
            "{} is {} bytes, limit is {}",
            source.display(),
            raw.len(),
            MAX_WORDLIST_BYTES
        )));
    }

    fs::create_dir_all(dir)?;
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .map(sanitize_name)
        .unwrap_or_else(|| "wordlist".to_string());
    let ext = source
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("txt");

    let stamp = chrono::Utc::now().timestamp_millis();
    let mut target = dir.join(format!("{}-{}.{}", stem, stamp, ext));
    let mut n = 1;
    while target.exists() {
        target = dir.join(format!("{}-{}-{}.{}", stem, stamp, n, ext));
        n += 1;
    }

    fs::write(&target, &raw)?;
    Ok((target, raw.len()))
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "wordlist".to_string()
    } else {
        cleaned
    }
}

/// Files directly inside `dir` that no wordlist record points at.
pub fn find_orphans(dir: &Path, referenced: &[String]) -> Result<Vec<PathBuf>> {
    let referenced: HashSet<PathBuf> = referenced
        .iter()
        .map(|p| canonical(Path::new(p)))
        .collect();

    let mut orphans = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && !referenced.contains(&canonical(&path)) {
            orphans.push(path);
        }
    }
    orphans.sort();
    Ok(orphans)
}

/// Delete what can be deleted; missing or protected files are skipped.
pub fn delete_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .iter()
        .filter(|path| match fs::remove_file(path) {
            Ok(()) => true,
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                false
            }
        })
        .cloned()
        .collect()
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
