use crate::error::{Result, ScanError};
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which resolver answers the existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsBackend {
    /// hickory stub resolver querying A and AAAA.
    Resolver,
    /// OS `getaddrinfo` through tokio.
    System,
    /// Only the pinned host table answers; everything else is absent.
    Static,
    /// No pre-filter, every candidate goes straight to HTTP.
    Disabled,
}

impl DnsBackend {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "resolver" | "hickory" => Some(DnsBackend::Resolver),
            "system" | "os" => Some(DnsBackend::System),
            "static" => Some(DnsBackend::Static),
            "off" | "disabled" | "none" => Some(DnsBackend::Disabled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DnsBackend::Resolver => "resolver",
            DnsBackend::System => "system",
            DnsBackend::Static => "static",
            DnsBackend::Disabled => "off",
        }
    }
}

/// curl `--resolve` style host pins, shared by the DNS check and the HTTP clients.
#[derive(Debug, Clone, Default)]
pub struct Pins {
    entries: HashMap<String, SocketAddr>,
}

impl Pins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, host: &str, addr: SocketAddr) {
        self.entries.insert(host.to_lowercase(), addr);
    }

    pub fn with(mut self, host: &str, addr: SocketAddr) -> Self {
        self.insert(host, addr);
        self
    }

    /// Parse `host=ip`, `host=ip:port` or `host=[v6]:port`. Port 0 means the
    /// scheme default.
    pub fn parse_entry(entry: &str) -> Result<(String, SocketAddr)> {
        let (host, target) = entry
            .split_once('=')
            .ok_or_else(|| ScanError::Other(format!("Invalid pin '{}', expected host=addr", entry)))?;
        let host = host.trim();
        let target = target.trim();
        if host.is_empty() {
            return Err(ScanError::Other(format!("Invalid pin '{}': empty host", entry)));
        }

        let addr = if let Ok(addr) = target.parse::<SocketAddr>() {
            addr
        } else if let Ok(ip) = target.parse::<IpAddr>() {
            SocketAddr::new(ip, 0)
        } else {
            return Err(ScanError::Other(format!(
                "Invalid pin '{}': '{}' is not an address",
                entry, target
            )));
        };

        Ok((host.to_lowercase(), addr))
    }

    pub fn get(&self, host: &str) -> Option<SocketAddr> {
        self.entries.get(&host.to_lowercase()).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SocketAddr)> {
        self.entries.iter()
    }
}

/// How the existence answer was reached. Failures stay distinguishable even
/// though all of them skip HTTP probing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsOutcome {
    Resolved,
    Pinned,
    NoRecords,
    Timeout,
    Error(String),
    Disabled,
}

impl fmt::Display for DnsOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsOutcome::Resolved => f.write_str("resolved"),
            DnsOutcome::Pinned => f.write_str("pinned"),
            DnsOutcome::NoRecords => f.write_str("no_records"),
            DnsOutcome::Timeout => f.write_str("timeout"),
            DnsOutcome::Error(msg) => write!(f, "error:{}", msg),
            DnsOutcome::Disabled => f.write_str("disabled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsLookup {
    pub exists: bool,
    pub ips: Vec<IpAddr>,
    pub outcome: DnsOutcome,
}

impl DnsLookup {
    fn found(ips: Vec<IpAddr>, outcome: DnsOutcome) -> Self {
        Self {
            exists: true,
            ips,
            outcome,
        }
    }

    fn missing(outcome: DnsOutcome) -> Self {
        Self {
            exists: false,
            ips: Vec::new(),
            outcome,
        }
    }
}

enum Backend {
    Resolver(TokioAsyncResolver),
    System,
    Static,
    Disabled,
}

pub struct DnsPrefilter {
    backend: Backend,
    pins: Pins,
    timeout: Duration,
}

impl DnsPrefilter {
    pub fn new(kind: DnsBackend, timeout: Duration, retries: usize, pins: Pins) -> Self {
        let backend = match kind {
            DnsBackend::Resolver => Backend::Resolver(Self::build_resolver(timeout, retries)),
            DnsBackend::System => Backend::System,
            DnsBackend::Static => Backend::Static,
            DnsBackend::Disabled => Backend::Disabled,
        };
        info!(
            "DNS pre-filter: backend={}, timeout={:?}, retries={}, pins={}",
            kind.as_str(),
            timeout,
            retries,
            pins.entries.len()
        );
        Self {
            backend,
            pins,
            timeout,
        }
    }

    pub fn disabled() -> Self {
        Self {
            backend: Backend::Disabled,
            pins: Pins::new(),
            timeout: Duration::from_secs(2),
        }
    }

    fn build_resolver(timeout: Duration, retries: usize) -> TokioAsyncResolver {
        let (config, mut opts) = match hickory_resolver::system_conf::read_system_conf() {
            Ok(conf) => conf,
            Err(e) => {
                warn!("Could not read system resolver config, using defaults: {}", e);
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };
        opts.timeout = timeout;
        opts.attempts = retries.max(1);
        TokioAsyncResolver::tokio(config, opts)
    }

    pub fn backend(&self) -> DnsBackend {
        match self.backend {
            Backend::Resolver(_) => DnsBackend::Resolver,
            Backend::System => DnsBackend::System,
            Backend::Static => DnsBackend::Static,
            Backend::Disabled => DnsBackend::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.backend, Backend::Disabled)
    }

    pub async fn lookup(&self, host: &str) -> DnsLookup {
        if let Some(addr) = self.pins.get(host) {
            return DnsLookup::found(vec![addr.ip()], DnsOutcome::Pinned);
        }

        let lookup = match &self.backend {
            Backend::Resolver(resolver) => self.lookup_records(resolver, host).await,
            Backend::System => self.lookup_system(host).await,
            Backend::Static => DnsLookup::missing(DnsOutcome::NoRecords),
            Backend::Disabled => DnsLookup::found(Vec::new(), DnsOutcome::Disabled),
        };
        debug!("DNS {} -> {} {:?}", host, lookup.outcome, lookup.ips);
        lookup
    }

    async fn lookup_records(&self, resolver: &TokioAsyncResolver, host: &str) -> DnsLookup {
        let (v4, v6) = tokio::join!(resolver.ipv4_lookup(host), resolver.ipv6_lookup(host));

        let mut ips: Vec<IpAddr> = Vec::new();
        let mut failures: Vec<ResolveError> = Vec::new();

        match v4 {
            Ok(records) => push_unique(&mut ips, records.iter().map(|a| IpAddr::V4(a.0))),
            Err(e) => failures.push(e),
        }
        match v6 {
            Ok(records) => push_unique(&mut ips, records.iter().map(|aaaa| IpAddr::V6(aaaa.0))),
            Err(e) => failures.push(e),
        }

        if !ips.is_empty() {
            return DnsLookup::found(ips, DnsOutcome::Resolved);
        }

        DnsLookup::missing(classify_failures(&failures))
    }

    async fn lookup_system(&self, host: &str) -> DnsLookup {
        match tokio::time::timeout(self.timeout, tokio::net::lookup_host((host, 0))).await {
            Ok(Ok(addrs)) => {
                let mut ips = Vec::new();
                push_unique(&mut ips, addrs.map(|addr| addr.ip()));
                if ips.is_empty() {
                    DnsLookup::missing(DnsOutcome::NoRecords)
                } else {
                    DnsLookup::found(ips, DnsOutcome::Resolved)
                }
            }
            // getaddrinfo cannot tell NXDOMAIN from a flaky upstream, both skip probing
            Ok(Err(e)) => DnsLookup::missing(DnsOutcome::Error(e.to_string())),
            Err(_) => DnsLookup::missing(DnsOutcome::Timeout),
        }
    }
}

fn push_unique(ips: &mut Vec<IpAddr>, found: impl Iterator<Item = IpAddr>) {
    for ip in found {
        if !ips.contains(&ip) {
            ips.push(ip);
        }
    }
}

fn classify_failures(failures: &[ResolveError]) -> DnsOutcome {
    if failures.is_empty() {
        return DnsOutcome::NoRecords;
    }
    if failures
        .iter()
        .any(|e| matches!(e.kind(), ResolveErrorKind::Timeout))
    {
        return DnsOutcome::Timeout;
    }
    if failures
        .iter()
        .all(|e| matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }))
    {
        return DnsOutcome::NoRecords;
    }
    failures
        .iter()
        .find(|e| !matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }))
        .map(|e| DnsOutcome::Error(e.to_string()))
        .unwrap_or(DnsOutcome::NoRecords)
}
