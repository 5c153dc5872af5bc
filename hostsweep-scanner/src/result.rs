use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Probe technique, in escalation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbeMethod {
    #[serde(rename = "HEAD")]
    Head,
    #[serde(rename = "OPTIONS")]
    Options,
    #[serde(rename = "GET(limited)")]
    LimitedGet,
}

impl ProbeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeMethod::Head => "HEAD",
            ProbeMethod::Options => "OPTIONS",
            ProbeMethod::LimitedGet => "GET(limited)",
        }
    }

    pub fn is_get(&self) -> bool {
        matches!(self, ProbeMethod::LimitedGet)
    }
}

impl fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Https,
    Http,
}

impl Scheme {
    pub const ALL: [Scheme; 2] = [Scheme::Https, Scheme::Http];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Https => "https",
            Scheme::Http => "http",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "https" => Some(Scheme::Https),
            "http" => Some(Scheme::Http),
            _ => None,
        }
    }

    pub fn url_for(&self, host: &str) -> String {
        format!("{}://{}", self.as_str(), host)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single attempt produced no response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    ConnectionRefused,
    Http(String),
    Unknown(String),
}

impl FailureKind {
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FailureKind::Timeout
        } else if err.is_connect() {
            FailureKind::ConnectionRefused
        } else if err.is_redirect() {
            FailureKind::Http("redirect".to_string())
        } else if err.is_body() {
            FailureKind::Http("body".to_string())
        } else if err.is_decode() {
            FailureKind::Http("decode".to_string())
        } else if err.is_status() {
            FailureKind::Http("status".to_string())
        } else if err.is_request() {
            FailureKind::Http("request".to_string())
        } else if err.is_builder() {
            FailureKind::Unknown("builder".to_string())
        } else {
            FailureKind::Unknown(err.to_string())
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "timeout" => FailureKind::Timeout,
            "connection_refused" => FailureKind::ConnectionRefused,
            other => {
                if let Some(cause) = other.strip_prefix("http_error:") {
                    FailureKind::Http(cause.to_string())
                } else if let Some(cause) = other.strip_prefix("unknown_error:") {
                    FailureKind::Unknown(cause.to_string())
                } else {
                    FailureKind::Unknown(other.to_string())
                }
            }
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => f.write_str("timeout"),
            FailureKind::ConnectionRefused => f.write_str("connection_refused"),
            FailureKind::Http(cause) => write!(f, "http_error:{}", cause),
            FailureKind::Unknown(cause) => write!(f, "unknown_error:{}", cause),
        }
    }
}

impl Serialize for FailureKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FailureKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(FailureKind::parse(&raw))
    }
}

/// Diagnostics for one candidate. Completed responses fill the HTTP fields
/// whether or not the status counted as live; failed attempts only set `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub subdomain: String,
    pub method: Option<ProbeMethod>,
    pub scheme: Option<Scheme>,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub server: Option<String>,
    /// Seconds since the tier started.
    pub response_time: Option<f64>,
    pub error: Option<FailureKind>,
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_debug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampled_bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
    #[serde(default)]
    pub ips: Vec<IpAddr>,
    pub detected_by: Option<ProbeMethod>,
}

impl ProbeResult {
    pub fn new(subdomain: impl Into<String>) -> Self {
        Self {
            subdomain: subdomain.into(),
            method: None,
            scheme: None,
            status_code: None,
            content_type: None,
            content_length: None,
            server: None,
            response_time: None,
            error: None,
            title: None,
            title_debug: None,
            final_url: None,
            redirected: None,
            sampled_bytes: None,
            ip: None,
            ips: Vec::new(),
            detected_by: None,
        }
    }

    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.response_time = Some(elapsed.as_secs_f64());
    }

    /// Record the address the HTTP connection actually reached.
    pub fn record_peer(&mut self, peer: IpAddr) {
        if self.ip.is_none() {
            self.ip = Some(peer);
        }
        if !self.ips.contains(&peer) {
            self.ips.push(peer);
        }
    }

    /// Replace the address list with DNS answers, then append the HTTP peer
    /// address if DNS did not already report it.
    pub fn merge_addresses(&mut self, dns_ips: &[IpAddr]) {
        let mut merged: Vec<IpAddr> = Vec::with_capacity(dns_ips.len() + 1);
        for ip in dns_ips {
            if !merged.contains(ip) {
                merged.push(*ip);
            }
        }
        if dns_ips.is_empty() {
            for ip in &self.ips {
                if !merged.contains(ip) {
                    merged.push(*ip);
                }
            }
        }
        if let Some(peer) = self.ip
            && !merged.contains(&peer)
        {
            merged.push(peer);
        }
        self.ips = merged;
    }
}
