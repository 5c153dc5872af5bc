use crate::error::{EnumError, Result};
use dotenvy::dotenv;
use hostsweep_scanner::probe::DEFAULT_USER_AGENT;
use hostsweep_scanner::{DnsBackend, DnsPrefilter, Pins, ProbeSettings};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Semaphore;

pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Enumeration settings, loaded from environment variables
#[derive(Debug, Clone)]
pub struct EnumerationConfig {
    pub enabled: bool,
    pub max_concurrent_requests: usize,
    pub request_timeout: Duration,
    pub max_response_size: usize,
    pub verify_ssl: bool,
    pub get_fallback: bool,
    pub user_agent: String,
    pub dns_timeout: Duration,
    pub dns_retries: usize,
    pub dns_backend: DnsBackend,
    pub batch_size: usize,
    /// Fixed host to address answers, used by both DNS and HTTP.
    pub pins: Pins,
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent_requests: 50,
            request_timeout: Duration::from_secs(5),
            max_response_size: 4096,
            verify_ssl: false,
            get_fallback: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            dns_timeout: Duration::from_secs(2),
            dns_retries: 2,
            dns_backend: DnsBackend::Resolver,
            batch_size: DEFAULT_BATCH_SIZE,
            pins: Pins::new(),
        }
    }
}

impl EnumerationConfig {
    /// Load configuration from the process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from any key/value source. Missing keys keep
    /// their defaults; malformed values are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let dns_backend = match get("DNS_BACKEND") {
            Some(raw) => DnsBackend::from_str(&raw).ok_or_else(|| {
                EnumError::Config(format!(
                    "DNS_BACKEND must be one of resolver, system, static, off (got '{}')",
                    raw
                ))
            })?,
            None => defaults.dns_backend,
        };

        Ok(Self {
            enabled: flag(get("ENABLE_HTTP_ENUM"), defaults.enabled),
            max_concurrent_requests: concurrency(
                get("MAX_CONCURRENT_REQUESTS"),
                defaults.max_concurrent_requests,
            )?,
            request_timeout: seconds(
                "REQUEST_TIMEOUT",
                get("REQUEST_TIMEOUT"),
                defaults.request_timeout,
            )?,
            max_response_size: positive(
                "MAX_RESPONSE_SIZE",
                get("MAX_RESPONSE_SIZE"),
                defaults.max_response_size,
            )?,
            verify_ssl: flag(get("VERIFY_SSL"), defaults.verify_ssl),
            get_fallback: flag(get("ENABLE_GET_FALLBACK"), defaults.get_fallback),
            user_agent: get("USER_AGENT").unwrap_or(defaults.user_agent),
            dns_timeout: seconds("DNS_TIMEOUT", get("DNS_TIMEOUT"), defaults.dns_timeout)?,
            dns_retries: positive("DNS_RETRIES", get("DNS_RETRIES"), defaults.dns_retries)?,
            dns_backend,
            batch_size: positive("BATCH_SIZE", get("BATCH_SIZE"), defaults.batch_size)?,
            pins: defaults.pins,
        })
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            request_timeout: self.request_timeout,
            max_response_bytes: self.max_response_size,
            verify_ssl: self.verify_ssl,
            get_fallback: self.get_fallback,
            user_agent: self.user_agent.clone(),
            pins: self.pins.clone(),
        }
    }

    pub fn dns_prefilter(&self) -> DnsPrefilter {
        DnsPrefilter::new(
            self.dns_backend,
            self.dns_timeout,
            self.dns_retries,
            self.pins.clone(),
        )
    }
}

// Only the literal "true" enables a flag
fn flag(raw: Option<String>, default: bool) -> bool {
    match raw {
        Some(value) => value.eq_ignore_ascii_case("true"),
        None => default,
    }
}

fn positive<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr + PartialOrd + Default,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(EnumError::Config(format!(
            "{} must be a positive integer (got '{}')",
            key, raw
        ))),
    }
}

// The run-wide limiter cannot hold more than MAX_PERMITS
fn concurrency(raw: Option<String>, default: usize) -> Result<usize> {
    let value = positive("MAX_CONCURRENT_REQUESTS", raw, default)?;
    if value > Semaphore::MAX_PERMITS {
        return Err(EnumError::Config(format!(
            "MAX_CONCURRENT_REQUESTS must be at most {} (got {})",
            Semaphore::MAX_PERMITS,
            value
        )));
    }
    Ok(value)
}

fn seconds(key: &str, raw: Option<String>, default: Duration) -> Result<Duration> {
    positive(key, raw, default.as_secs()).map(Duration::from_secs)
}
