// Report generation from the database and the live progress registry

use crate::data::{Database, RunStore};
use crate::error::{EnumError, Result};
use crate::model::{Run, RunId};
use crate::progress::{Progress, RunRegistry};
use chrono::{DateTime, Utc};
use hostsweep_scanner::ProbeResult;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEntry {
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub discovered_at: i64,
    /// Probe diagnostics; `None` when the stored JSON is missing or unreadable.
    pub metadata: Option<ProbeResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run: Run,
    pub progress: Option<ProgressInfo>,
    pub hosts: Vec<HostEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub total: Option<u64>,
    pub processed: u64,
    pub percent: Option<f64>,
}

impl From<Progress> for ProgressInfo {
    fn from(progress: Progress) -> Self {
        Self {
            total: progress.total,
            processed: progress.processed,
            percent: progress.percent(),
        }
    }
}

pub fn gather_report(db: &Database, registry: &RunRegistry, run_id: RunId) -> Result<RunReport> {
    let run = db.get_run(run_id)?.ok_or(EnumError::RunNotFound(run_id))?;

    let progress = registry.progress(run_id);
    let progress = (progress != Progress::default()).then(|| ProgressInfo::from(progress));

    let hosts = db
        .hosts_for_run(run_id)?
        .into_iter()
        .map(|record| HostEntry {
            metadata: record
                .metadata
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok()),
            host: record.host,
            source: record.source,
            discovered_at: record.discovered_at,
        })
        .collect();

    Ok(RunReport {
        run,
        progress,
        hosts,
    })
}

pub fn generate_text_report(report: &RunReport) -> String {
    let run = &report.run;
    let mut out = String::new();

    out.push_str(RULE);
    out.push_str("                           HOSTSWEEP RUN REPORT\n");
    out.push_str(RULE);
    out.push('\n');

    out.push_str(&format!("Run ID:       {}\n", run.id));
    out.push_str(&format!("Domain:       {}\n", run.domain));
    out.push_str(&format!("Status:       {}\n", run.status));
    out.push_str(&format!("Created:      {}\n", format_timestamp(run.created_at)));
    if let Some(started) = run.started_at {
        out.push_str(&format!("Started:      {}\n", format_timestamp(started)));
        if let Some(finished) = run.finished_at {
            out.push_str(&format!("Duration:     {} seconds\n", finished - started));
        }
    }
    if let Some(ref progress) = report.progress {
        let percent = progress
            .percent
            .map(|p| format!(" ({:.2}%)", p))
            .unwrap_or_default();
        let total = progress
            .total
            .map(|t| t.to_string())
            .unwrap_or_else(|| "?".to_string());
        out.push_str(&format!(
            "Progress:     {}/{}{}\n",
            progress.processed, total, percent
        ));
    }
    if let Some(ref error) = run.error_message {
        out.push_str(&format!("Error:        {}\n", error));
    }
    out.push_str(&format!("Hosts Found:  {}\n\n", report.hosts.len()));

    if !report.hosts.is_empty() {
        out.push_str(RULE);
        out.push_str("LIVE HOSTS\n");
        out.push_str(RULE);
        out.push('\n');
        for entry in &report.hosts {
            out.push_str(&format_host_line(entry));
            out.push('\n');
        }
        out.push('\n');
    }

    if !run.log_snippet.is_empty() {
        out.push_str(RULE);
        out.push_str("RUN LOG (tail)\n");
        out.push_str(RULE);
        out.push('\n');
        for line in run.log_snippet.lines() {
            out.push_str(&format!("  {}\n", line));
        }
        out.push('\n');
    }

    out.push_str(RULE);
    out.push_str("                              End of Report\n");
    out.push_str(RULE);
    out
}

fn format_host_line(entry: &HostEntry) -> String {
    let Some(ref meta) = entry.metadata else {
        return format!("  {}", entry.host);
    };

    let status = meta
        .status_code
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    let method = meta.method.map(|m| m.as_str()).unwrap_or("-");
    let scheme = meta.scheme.map(|s| s.as_str()).unwrap_or("-");
    let mut line = format!("  {:<40} [{} {} {}]", entry.host, method, scheme, status);

    if !meta.ips.is_empty() {
        let ips: Vec<String> = meta.ips.iter().map(|ip| ip.to_string()).collect();
        line.push_str(&format!(" {}", ips.join(", ")));
    }
    if let Some(ref title) = meta.title {
        line.push_str(&format!(" \"{}\"", title));
    }
    line
}

pub fn generate_json_report(report: &RunReport) -> std::result::Result<String, serde_json::Error> {
    let run = &report.run;
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "hostsweep",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": Utc::now().to_rfc3339(),
                "format": "json"
            },
            "run": {
                "id": run.id,
                "domain": run.domain,
                "status": run.status,
                "error_message": run.error_message,
                "wordlist_id": run.wordlist_id,
                "created_at": format_iso8601_timestamp(run.created_at),
                "started_at": run.started_at.map(format_iso8601_timestamp),
                "finished_at": run.finished_at.map(format_iso8601_timestamp),
                "log_snippet": run.log_snippet
            },
            "progress": report.progress,
            "summary": {
                "total_hosts": report.hosts.len()
            },
            "results": report.hosts
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

pub fn format_timestamp(timestamp: i64) -> String {
    let datetime = DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_default();
    datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn format_iso8601_timestamp(timestamp: i64) -> String {
    let datetime = DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_default();
    datetime.to_rfc3339()
}
