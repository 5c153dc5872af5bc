// Enumeration engine: drives one run from pending to a terminal status

use crate::config::EnumerationConfig;
use crate::data::{HostInsert, RunStore};
use crate::error::{EnumError, Result};
use crate::model::{
    DiscoveredHost, HTTP_ENUMERATOR_SOURCE, Run, RunId, RunStatus, RunUpdate, WordlistKind,
};
use crate::progress::RunRegistry;
use crate::wordlist::load_words;
use futures::future::join_all;
use hostsweep_scanner::{CandidateVerifier, ProbeResult, Prober};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub const STOP_LOG_LINE: &str = "run stopped by user";

/// Summary handed to the batch callback once a batch has been committed.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub run_id: RunId,
    pub batch: usize,
    pub total_batches: usize,
    pub candidates: usize,
    pub hits: usize,
    pub total_hits: usize,
    pub processed: u64,
    pub total: u64,
    /// Hit lines appended to the run log for this batch.
    pub lines: Vec<String>,
}

pub type BatchCallback = Arc<dyn Fn(&BatchReport) + Send + Sync>;

/// Runs wordlist enumeration for a single run.
///
/// Batches go out strictly in wordlist order; candidates inside a batch are
/// verified concurrently under one run-wide semaphore. Stop requests are
/// honored between batches only, so an in-flight batch always completes.
pub struct Enumerator<'r, S: RunStore> {
    store: S,
    registry: &'r RunRegistry,
    config: EnumerationConfig,
    on_batch: Option<BatchCallback>,
}

impl<'r, S: RunStore> Enumerator<'r, S> {
    pub fn new(store: S, registry: &'r RunRegistry, config: EnumerationConfig) -> Self {
        Self {
            store,
            registry,
            config,
            on_batch: None,
        }
    }

    pub fn with_batch_callback(mut self, callback: BatchCallback) -> Self {
        self.on_batch = Some(callback);
        self
    }

    /// Execute the run and return its final status. Failures after the run
    /// was loaded are recorded on the run, not returned.
    pub async fn run(
        &self,
        run_id: RunId,
        domain: &str,
        wordlist_id: Option<i64>,
    ) -> Result<RunStatus> {
        let mut run = self
            .store
            .get_run(run_id)?
            .ok_or(EnumError::RunNotFound(run_id))?;

        if run.status.is_terminal() {
            warn!("Run {} already {}, not starting again", run_id, run.status);
            return Ok(run.status);
        }

        self.registry.clear_stop(run_id);
        self.registry.clear_progress(run_id);

        if !self.config.enabled {
            self.store.update_run(
                &mut run,
                RunUpdate::new()
                    .status(RunStatus::Failed)
                    .error(EnumError::Disabled.to_string())
                    .finished(),
            )?;
            return Ok(run.status);
        }

        info!("Run {} started for domain={}", run_id, domain);

        match self.execute(&mut run, domain, wordlist_id).await {
            Ok(status) => Ok(status),
            Err(e) => {
                warn!("Run {} failed: {}", run_id, e);
                self.registry.clear_progress(run_id);
                self.registry.clear_stop(run_id);
                self.store.update_run(
                    &mut run,
                    RunUpdate::new()
                        .status(RunStatus::Failed)
                        .error(format!("HTTP enumerator error: {}", e))
                        .finished(),
                )?;
                Ok(run.status)
            }
        }
    }

    async fn execute(
        &self,
        run: &mut Run,
        domain: &str,
        wordlist_id: Option<i64>,
    ) -> Result<RunStatus> {
        let Some(wordlist) = self
            .store
            .find_wordlist(wordlist_id, WordlistKind::Subdomain)?
        else {
            self.store.update_run(
                run,
                RunUpdate::new()
                    .status(RunStatus::Failed)
                    .error(EnumError::NoWordlist.to_string())
                    .finished(),
            )?;
            return Ok(run.status);
        };

        self.store
            .update_run(run, RunUpdate::new().status(RunStatus::Running))?;

        let words = load_words(Path::new(&wordlist.path))?;
        let total = words.len() as u64;
        self.registry.set_progress(run.id, Some(total), 0);

        let verifier = CandidateVerifier::new(
            Prober::new(&self.config.probe_settings())?,
            self.config.dns_prefilter(),
            Arc::new(Semaphore::new(
                self.config
                    .max_concurrent_requests
                    .min(Semaphore::MAX_PERMITS),
            )),
        );
        let dns_enabled = verifier.dns().is_enabled();

        for line in self.startup_lines(words.len(), &verifier) {
            self.store.update_run(run, RunUpdate::new().log(line))?;
        }

        let batch_size = self.config.batch_size.max(1);
        let total_batches = words.len().div_ceil(batch_size);
        let mut found: HashSet<String> = HashSet::new();
        let mut total_hits = 0;

        for (index, batch) in words.chunks(batch_size).enumerate() {
            if self.registry.is_stopped(run.id) {
                self.registry.clear_progress(run.id);
                self.store.update_run(
                    run,
                    RunUpdate::new()
                        .status(RunStatus::Canceled)
                        .log(STOP_LOG_LINE)
                        .finished(),
                )?;
                self.registry.clear_stop(run.id);
                info!("Run {} stopped by user before batch {}", run.id, index + 1);
                return Ok(run.status);
            }

            let batch_num = index + 1;
            self.store.update_run(
                run,
                RunUpdate::new().log(format!(
                    "Batch {}/{}: {} candidates",
                    batch_num,
                    total_batches,
                    batch.len()
                )),
            )?;
            info!(
                "Processing batch {}/{} (size={}) for domain={}",
                batch_num,
                total_batches,
                batch.len(),
                domain
            );

            let mut queued = HashSet::new();
            let candidates: Vec<String> = batch
                .iter()
                .map(|word| format!("{}.{}", word, domain).to_ascii_lowercase())
                .filter(|host| !found.contains(host) && queued.insert(host.clone()))
                .collect();

            let outcomes = join_all(candidates.iter().map(|host| verifier.verify(host))).await;

            let mut hits = Vec::new();
            let mut lines = Vec::new();
            for (host, outcome) in candidates.iter().zip(outcomes) {
                match outcome {
                    Ok(Some(result)) => {
                        if !found.insert(host.clone()) {
                            continue;
                        }
                        lines.push(format_hit_line(host, &result));
                        hits.push(DiscoveredHost {
                            run_id: run.id,
                            host: host.clone(),
                            source: HTTP_ENUMERATOR_SOURCE.to_string(),
                            metadata: Some(serde_json::to_string(&result)?),
                        });
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Check for {} failed: {}", host, e),
                }
            }

            if !hits.is_empty() {
                if self.store.insert_hosts(&hits)? == HostInsert::Conflict {
                    warn!(
                        "Run {} batch {}: duplicate host while saving, batch rolled back",
                        run.id, batch_num
                    );
                }
                total_hits += hits.len();
                self.store
                    .update_run(run, RunUpdate::new().log(lines.join("\n")))?;
                self.store.update_run(
                    run,
                    RunUpdate::new().log(format!(
                        "Batch {}: {} hosts found, {} total",
                        batch_num,
                        hits.len(),
                        total_hits
                    )),
                )?;
            }

            self.registry
                .increment_progress(run.id, batch.len() as u64, None);

            if let Some(ref callback) = self.on_batch {
                callback(&BatchReport {
                    run_id: run.id,
                    batch: batch_num,
                    total_batches,
                    candidates: batch.len(),
                    hits: hits.len(),
                    total_hits,
                    processed: self.registry.progress(run.id).processed,
                    total,
                    lines,
                });
            }
        }

        self.registry.clear_progress(run.id);
        let mut summary = format!("HTTP enumeration complete: {} live hosts found", total_hits);
        if dns_enabled {
            summary.push_str("\nDNS pre-filter skipped candidates without records");
        }
        self.store.update_run(
            run,
            RunUpdate::new()
                .status(RunStatus::Succeeded)
                .log(summary)
                .finished(),
        )?;
        self.registry.clear_stop(run.id);
        info!("Run {} finished with {} hosts", run.id, total_hits);

        Ok(run.status)
    }

    fn startup_lines(&self, candidates: usize, verifier: &CandidateVerifier) -> Vec<String> {
        let dns = verifier.dns();
        let strategy = if verifier.prober().get_fallback_enabled() {
            "Strategy: DNS -> parallel HEAD(HTTPS+HTTP) -> OPTIONS -> GET(limited)"
        } else {
            "Strategy: DNS -> parallel HEAD(HTTPS+HTTP) -> OPTIONS"
        };
        let dns_line = if dns.is_enabled() {
            format!(
                "DNS pre-filter enabled ({}), names without records are skipped",
                dns.backend().as_str()
            )
        } else {
            "DNS pre-filter disabled, every candidate is probed over HTTP".to_string()
        };

        vec![
            format!("Starting HTTP enumerator: {} candidates", candidates),
            format!(
                "Config: concurrency={}, timeout={}s, dns={}",
                self.config.max_concurrent_requests,
                self.config.request_timeout.as_secs(),
                dns.backend().as_str()
            ),
            strategy.to_string(),
            dns_line,
        ]
    }
}

/// One run-log line per hit, e.g.
/// `[+] www.example.com [HEAD https 200] (0.12s) IP:[1.2.3.4] - nginx - Welcome`.
pub fn format_hit_line(host: &str, result: &ProbeResult) -> String {
    let method = result.method.map(|m| m.as_str()).unwrap_or("?");
    let scheme = result.scheme.map(|s| s.as_str()).unwrap_or("?");
    let status = result
        .status_code
        .map(|s| s.to_string())
        .unwrap_or_else(|| "?".to_string());

    let mut line = format!("[+] {} [{} {} {}]", host, method, scheme, status);

    if let Some(elapsed) = result.response_time
        && elapsed > 0.0
    {
        line.push_str(&format!(" ({:.2}s)", elapsed));
    }
    if !result.ips.is_empty() {
        let shown: Vec<String> = result.ips.iter().take(3).map(|ip| ip.to_string()).collect();
        let mut ips = shown.join(", ");
        if result.ips.len() > 3 {
            ips.push_str(&format!(" +{}...", result.ips.len() - 3));
        }
        line.push_str(&format!(" IP:[{}]", ips));
    }
    if let Some(ref server) = result.server
        && !server.is_empty()
    {
        line.push_str(&format!(" - {}", truncate(server, 30)));
    }
    match (&result.title, &result.title_debug) {
        (Some(title), _) if !title.is_empty() => {
            line.push_str(&format!(" - {}", truncate(title, 50)));
        }
        (_, Some(debug)) if !debug.is_empty() => {
            line.push_str(&format!(" - no title ({})", truncate(debug, 120)));
        }
        _ => {}
    }
    line
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
