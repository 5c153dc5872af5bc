use crate::commands::DEFAULT_DB_PATH;
use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use hostsweep_core::config::EnumerationConfig;
use hostsweep_core::data::{Database, RunStore};
use hostsweep_core::enumerate::{BatchCallback, BatchReport, Enumerator};
use hostsweep_core::error::EnumError;
use hostsweep_core::model::{Run, RunStatus, Wordlist, WordlistKind};
use hostsweep_core::progress::RunRegistry;
use hostsweep_core::report::{self, ReportFormat, RunReport};
use hostsweep_core::wordlist;
use hostsweep_scanner::{DnsBackend, Pins};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

pub const DEFAULT_WORDLIST: &str = include_str!("../wordlists/default.txt");

/// Lines of the run log shown by `status`.
const STATUS_LOG_TAIL: usize = 10;

// Path helpers

pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

/// Database location from the global `--db` argument.
pub fn db_path(args: &ArgMatches) -> PathBuf {
    let raw = args
        .get_one::<String>("db")
        .map(String::as_str)
        .unwrap_or(DEFAULT_DB_PATH);
    expand_path(raw)
}

/// Imported wordlists live next to the database.
pub fn wordlist_dir(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("wordlists")
}

fn open_database(db_path: &Path) -> Result<Database> {
    if !Database::exists(db_path) {
        bail!(
            "no database at {} (run `hostsweep init` first)",
            db_path.display()
        );
    }
    Database::new(db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))
}

fn required<'a, T>(args: &'a ArgMatches, id: &str) -> Result<&'a T>
where
    T: Clone + Send + Sync + 'static,
{
    args.get_one::<T>(id)
        .ok_or_else(|| anyhow!("missing argument: {}", id))
}

// Output helpers

pub fn print_banner() {
    println!(
        "{} {}",
        "hostsweep".bright_cyan().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black()
    );
    println!("{}", "wordlist subdomain discovery".bright_black());
    println!();
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

fn colored_status(status: RunStatus) -> String {
    let label = status.as_str();
    match status {
        RunStatus::Succeeded => label.green().bold().to_string(),
        RunStatus::Failed => label.red().bold().to_string(),
        RunStatus::Canceled => label.yellow().bold().to_string(),
        RunStatus::Running => label.cyan().bold().to_string(),
        RunStatus::Pending => label.bright_black().to_string(),
    }
}

// init

/// Write the bundled wordlist into `dir` and register it as the default
/// subdomain list.
pub fn install_default_wordlist(db: &Database, dir: &Path) -> Result<Wordlist> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join("default.txt");
    let size = wordlist::write_content(&path, DEFAULT_WORDLIST)?;
    let record = db.add_wordlist(
        "default",
        &path.to_string_lossy(),
        size as i64,
        WordlistKind::Subdomain,
        true,
    )?;
    Ok(record)
}

pub fn handle_init(db_path: &Path, args: &ArgMatches) -> Result<()> {
    print_divider();
    println!("{}", "  HOSTSWEEP INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let force = args.get_flag("force");
    let config_dir = db_path.parent().unwrap_or_else(|| Path::new("."));
    println!(
        "{} Target: {}",
        "→".blue(),
        db_path.display().to_string().bright_white()
    );
    println!();

    if Database::exists(db_path) {
        if !force {
            println!("{}", "⚠ WARNING".yellow().bold());
            println!("Database already exists at:");
            println!(
                "  {} {}",
                "•".yellow(),
                db_path.display().to_string().bright_white()
            );
            println!();
            let response = print_prompt("Do you want to overwrite it? [y/N]:")?;
            println!();
            if response != "y" && response != "yes" {
                println!("{} Initialization cancelled.", "✗".red().bold());
                return Ok(());
            }
        }
        Database::remove(db_path)?;
        println!("{} Existing database removed", "✓".green().bold());
    }

    fs::create_dir_all(config_dir)
        .with_context(|| format!("failed to create {}", config_dir.display()))?;
    let db = Database::new(db_path)?;
    println!(
        "{} Database initialized: {}",
        "✓".green().bold(),
        db_path.display().to_string().bright_white()
    );

    let record = install_default_wordlist(&db, &wordlist_dir(db_path))?;
    let entries = wordlist::count_entries(DEFAULT_WORDLIST);
    println!(
        "{} Default wordlist #{}: {} ({} entries, {} bytes)",
        "✓".green().bold(),
        record.id,
        record.path.bright_white(),
        entries.to_string().cyan(),
        record.size_bytes.to_string().cyan()
    );

    println!();
    print_divider();
    println!("{}", "  INITIALIZATION COMPLETE".green().bold());
    print_divider();
    println!();
    Ok(())
}

// wordlist

pub fn handle_wordlist_add(db_path: &Path, args: &ArgMatches) -> Result<()> {
    let db = open_database(db_path)?;
    let file = required::<PathBuf>(args, "FILE")?;
    let kind_raw = required::<String>(args, "type")?;
    let kind = WordlistKind::parse(kind_raw)
        .ok_or_else(|| anyhow!("unknown wordlist type '{}'", kind_raw))?;
    let make_default = args.get_flag("default");

    let (stored, size) = wordlist::import_file(file, &wordlist_dir(db_path))
        .with_context(|| format!("failed to import {}", file.display()))?;
    let name = match args.get_one::<String>("name") {
        Some(name) => name.clone(),
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "wordlist".to_string()),
    };

    let record = db.add_wordlist(
        &name,
        &stored.to_string_lossy(),
        size as i64,
        kind,
        make_default,
    )?;
    let entries = wordlist::load_words(&stored)?.len();

    println!(
        "{} Added {} wordlist #{} '{}' ({} entries, {} bytes){}",
        "✓".green().bold(),
        record.kind,
        record.id,
        record.name.bright_white(),
        entries.to_string().cyan(),
        record.size_bytes.to_string().cyan(),
        if record.is_default { " [default]" } else { "" }
    );
    Ok(())
}

pub fn handle_wordlist_list(db_path: &Path, args: &ArgMatches) -> Result<()> {
    let db = open_database(db_path)?;
    let kind = match args.get_one::<String>("type") {
        Some(raw) => Some(
            WordlistKind::parse(raw).ok_or_else(|| anyhow!("unknown wordlist type '{}'", raw))?,
        ),
        None => None,
    };

    let lists = db.list_wordlists(kind)?;
    if lists.is_empty() {
        println!("No wordlists stored.");
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:>4}  {:<24} {:<10} {:>10}  {}",
            "ID", "NAME", "TYPE", "BYTES", "PATH"
        )
        .bold()
    );
    for list in lists {
        let marker = if list.is_default {
            "*".green().bold().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "{:>4}{} {:<24} {:<10} {:>10}  {}",
            list.id,
            marker,
            list.name,
            list.kind.as_str(),
            list.size_bytes,
            list.path.bright_black()
        );
    }
    Ok(())
}

pub fn handle_wordlist_default(db_path: &Path, args: &ArgMatches) -> Result<()> {
    let db = open_database(db_path)?;
    let id = *required::<i64>(args, "ID")?;
    let record = db.set_default_wordlist(id)?;
    println!(
        "{} '{}' is now the default {} wordlist",
        "✓".green().bold(),
        record.name.bright_white(),
        record.kind
    );
    Ok(())
}

pub fn handle_wordlist_dedupe(db_path: &Path, args: &ArgMatches) -> Result<()> {
    let db = open_database(db_path)?;
    let id = *required::<i64>(args, "ID")?;
    let record = db
        .get_wordlist(id)?
        .ok_or(EnumError::WordlistNotFound(id))?;

    let raw = fs::read(&record.path).with_context(|| format!("failed to read {}", record.path))?;
    let (content, before, after) = wordlist::dedupe_content(&String::from_utf8_lossy(&raw));
    if before == after {
        println!("{} No duplicates in '{}'", "✓".green().bold(), record.name);
        return Ok(());
    }

    let size = wordlist::write_content(Path::new(&record.path), &content)?;
    db.update_wordlist_size(id, size as i64)?;
    println!(
        "{} Removed {} duplicates from '{}' ({} -> {} entries)",
        "✓".green().bold(),
        (before - after).to_string().cyan(),
        record.name.bright_white(),
        before,
        after
    );
    Ok(())
}

pub fn handle_wordlist_remove(db_path: &Path, args: &ArgMatches) -> Result<()> {
    let db = open_database(db_path)?;
    let id = *required::<i64>(args, "ID")?;
    let record = db.delete_wordlist(id)?;
    println!(
        "{} Removed wordlist #{} '{}'",
        "✓".green().bold(),
        record.id,
        record.name.bright_white()
    );

    if !args.get_flag("keep-file") {
        match fs::remove_file(&record.path) {
            Ok(()) => println!("  {} deleted {}", "✓".green(), record.path.bright_black()),
            Err(e) => {
                warn!("Failed to delete wordlist file {}: {}", record.path, e);
                println!(
                    "  {} could not delete {}: {}",
                    "⚠".yellow(),
                    record.path.bright_black(),
                    e
                );
            }
        }
    }
    Ok(())
}

pub fn handle_wordlist_orphans(db_path: &Path, args: &ArgMatches) -> Result<()> {
    let db = open_database(db_path)?;
    let dir = wordlist_dir(db_path);
    if !dir.exists() {
        println!("No wordlist directory at {}", dir.display());
        return Ok(());
    }

    let orphans = wordlist::find_orphans(&dir, &db.wordlist_paths()?)?;
    if orphans.is_empty() {
        println!("{} No orphaned wordlist files", "✓".green().bold());
        return Ok(());
    }

    println!("{} orphaned file(s):", orphans.len().to_string().yellow().bold());
    for path in &orphans {
        println!("  {} {}", "•".yellow(), path.display());
    }

    if args.get_flag("delete") {
        let removed = wordlist::delete_files(&orphans);
        println!(
            "{} Deleted {} of {} file(s)",
            "✓".green().bold(),
            removed.len(),
            orphans.len()
        );
    }
    Ok(())
}

// run

/// Apply `run` flags on top of an environment-derived configuration.
pub fn apply_run_overrides(
    mut config: EnumerationConfig,
    args: &ArgMatches,
) -> Result<EnumerationConfig> {
    if let Some(&threads) = args.get_one::<usize>("threads") {
        if threads == 0 {
            bail!("--threads must be greater than zero");
        }
        if threads > Semaphore::MAX_PERMITS {
            bail!("--threads must be at most {}", Semaphore::MAX_PERMITS);
        }
        config.max_concurrent_requests = threads;
    }
    if let Some(&timeout) = args.get_one::<u64>("timeout") {
        if timeout == 0 {
            bail!("--timeout must be greater than zero");
        }
        config.request_timeout = Duration::from_secs(timeout);
    }
    if let Some(&batch_size) = args.get_one::<usize>("batch-size") {
        if batch_size == 0 {
            bail!("--batch-size must be greater than zero");
        }
        config.batch_size = batch_size;
    }
    if args.get_flag("no-get-fallback") {
        config.get_fallback = false;
    }
    if let Some(raw) = args.get_one::<String>("dns") {
        config.dns_backend =
            DnsBackend::from_str(raw).ok_or_else(|| anyhow!("unknown DNS backend '{}'", raw))?;
    }
    if let Some(entries) = args.get_many::<String>("resolve") {
        let entries: Vec<String> = entries.cloned().collect();
        config.pins = parse_pins(&entries)?;
    }
    Ok(config)
}

pub fn parse_pins(entries: &[String]) -> Result<Pins> {
    let mut pins = Pins::new();
    for entry in entries {
        let (host, addr) =
            Pins::parse_entry(entry).with_context(|| format!("bad --resolve entry '{}'", entry))?;
        pins.insert(&host, addr);
    }
    Ok(pins)
}

fn progress_bar(quiet: bool) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}

pub async fn handle_run(db_path: &Path, args: &ArgMatches, quiet: bool) -> Result<()> {
    let db = open_database(db_path)?;
    let domain = required::<String>(args, "domain")?.trim().to_ascii_lowercase();
    let wordlist_id = args.get_one::<i64>("wordlist").copied();

    let config = apply_run_overrides(EnumerationConfig::from_env()?, args)?;
    let run = db.create_run(&domain, wordlist_id)?;
    debug!("Run {} config: {:?}", run.id, config);
    let registry = RunRegistry::global();

    println!(
        "{} Run #{} against {}",
        "→".blue(),
        run.id,
        domain.bright_white().bold()
    );
    println!(
        "  workers: {}  timeout: {}s  batch: {}  dns: {}  GET fallback: {}",
        config.max_concurrent_requests,
        config.request_timeout.as_secs(),
        config.batch_size,
        config.dns_backend.as_str(),
        if config.get_fallback { "on" } else { "off" }
    );
    println!();

    let bar = progress_bar(quiet)?;
    let progress = bar.clone();
    let on_batch: BatchCallback = Arc::new(move |report: &BatchReport| {
        progress.set_length(report.total);
        progress.set_position(report.processed);
        progress.set_message(format!(
            "batch {}/{} | {} live",
            report.batch, report.total_batches, report.total_hits
        ));
        for line in &report.lines {
            progress.println(line.green().to_string());
        }
    });

    // Ctrl-C only asks for a stop; the current batch still finishes
    let run_id = run.id;
    let notice = bar.clone();
    let stop_watch = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            notice.println(format!(
                "{} Stop requested, finishing the current batch...",
                "⚠".yellow().bold()
            ));
            RunRegistry::global().request_stop(run_id);
        }
    });

    let enumerator = Enumerator::new(&db, registry, config).with_batch_callback(on_batch);
    let outcome = enumerator.run(run.id, &domain, wordlist_id).await;
    stop_watch.abort();
    bar.finish_and_clear();
    let status = outcome?;

    let finished = db.get_run(run.id)?.ok_or(EnumError::RunNotFound(run.id))?;
    let hosts = db.hosts_for_run(run.id)?.len();
    println!(
        "{} Run #{} {} with {} live host(s)",
        if status == RunStatus::Succeeded {
            "✓".green().bold()
        } else {
            "✗".red().bold()
        },
        run.id,
        colored_status(status),
        hosts.to_string().cyan()
    );
    println!(
        "  see `hostsweep results {}` for the full report",
        run.id
    );

    if status == RunStatus::Failed {
        bail!(
            "run {} failed: {}",
            run.id,
            finished.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

// status / results

fn print_run_summary(run: &Run, hosts: usize) {
    println!("{} {}", "Run".bold(), run.id);
    println!("  Domain:   {}", run.domain.bright_white());
    println!("  Status:   {}", colored_status(run.status));
    println!("  Created:  {}", report::format_timestamp(run.created_at));
    if let Some(started) = run.started_at {
        println!("  Started:  {}", report::format_timestamp(started));
    }
    if let Some(finished) = run.finished_at {
        println!("  Finished: {}", report::format_timestamp(finished));
    }
    println!("  Hosts:    {}", hosts.to_string().cyan());
    if let Some(ref error) = run.error_message {
        println!("  Error:    {}", error.red());
    }
}

/// Last `n` lines of a run log.
pub fn log_tail(log: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = log.lines().collect();
    lines[lines.len().saturating_sub(n)..].to_vec()
}

pub fn handle_status(db_path: &Path, args: &ArgMatches) -> Result<()> {
    let db = open_database(db_path)?;

    let Some(&run_id) = args.get_one::<i64>("RUN_ID") else {
        let runs = db.recent_runs(10)?;
        if runs.is_empty() {
            println!("No runs yet.");
            return Ok(());
        }
        println!(
            "{}",
            format!("{:>4}  {:<32} {:<10} {}", "ID", "DOMAIN", "STATUS", "CREATED").bold()
        );
        for run in runs {
            println!(
                "{:>4}  {:<32} {:<10} {}",
                run.id,
                run.domain,
                run.status.as_str(),
                report::format_timestamp(run.created_at)
            );
        }
        return Ok(());
    };

    let run = db.get_run(run_id)?.ok_or(EnumError::RunNotFound(run_id))?;
    let hosts = db.hosts_for_run(run_id)?.len();
    print_run_summary(&run, hosts);

    let tail = log_tail(&run.log_snippet, STATUS_LOG_TAIL);
    if !tail.is_empty() {
        println!();
        println!("{}", "Recent log".bold());
        for line in tail {
            println!("  {}", line.bright_black());
        }
    }
    Ok(())
}

pub fn render_report(report: &RunReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(report::generate_text_report(report)),
        ReportFormat::Json => Ok(report::generate_json_report(report)?),
    }
}

pub fn handle_results(db_path: &Path, args: &ArgMatches) -> Result<()> {
    let db = open_database(db_path)?;
    let run_id = *required::<i64>(args, "RUN_ID")?;
    let format_raw = required::<String>(args, "format")?;
    let format = ReportFormat::from_str(format_raw)
        .ok_or_else(|| anyhow!("unknown report format '{}'", format_raw))?;

    let report = report::gather_report(&db, RunRegistry::global(), run_id)?;
    let content = render_report(&report, format)?;

    match args.get_one::<PathBuf>("output") {
        Some(path) => {
            report::save_report(&content, path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!(
                "{} Report saved to {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
        None => print!("{}", content),
    }
    Ok(())
}
