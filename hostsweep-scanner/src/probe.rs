use crate::classify::is_live_status;
use crate::dns::Pins;
use crate::error::Result;
use crate::result::{FailureKind, ProbeMethod, ProbeResult, Scheme};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use reqwest::header::{CONTENT_TYPE, HeaderName, RANGE, SERVER};
use reqwest::{Client, ClientBuilder, Method, Response};
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Ceiling for a single HEAD/OPTIONS/ranged GET attempt.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(3);
/// Ceiling for the unranged GET issued only to find a title.
const TITLE_RETRY_TIMEOUT: Duration = Duration::from_secs(4);
const TITLE_MAX_CHARS: usize = 100;

pub const DEFAULT_USER_AGENT: &str = "hostsweep/0.1 (HTTP subdomain enumerator)";

/// Knobs for the HTTP side of verification.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub request_timeout: Duration,
    pub max_response_bytes: usize,
    pub verify_ssl: bool,
    pub get_fallback: bool,
    pub user_agent: String,
    pub pins: Pins,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            max_response_bytes: 4096,
            verify_ssl: false,
            get_fallback: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            pins: Pins::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub live: bool,
    pub result: ProbeResult,
}

impl ProbeOutcome {
    fn hit(result: ProbeResult) -> Self {
        Self { live: true, result }
    }

    fn miss(result: ProbeResult) -> Self {
        Self {
            live: false,
            result,
        }
    }
}

/// Runs the HEAD → OPTIONS → limited GET ladder against one hostname.
pub struct Prober {
    /// HEAD and OPTIONS never follow redirects.
    direct: Client,
    /// Limited GET follows redirects to land on the final page.
    following: Client,
    attempt_timeout: Duration,
    title_retry_timeout: Duration,
    max_response_bytes: usize,
    get_fallback: bool,
}

impl Prober {
    pub fn new(settings: &ProbeSettings) -> Result<Self> {
        let direct = Self::client_builder(settings)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let following = Self::client_builder(settings)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            direct,
            following,
            attempt_timeout: ATTEMPT_TIMEOUT.min(settings.request_timeout),
            title_retry_timeout: TITLE_RETRY_TIMEOUT.min(settings.request_timeout),
            max_response_bytes: settings.max_response_bytes.max(1),
            get_fallback: settings.get_fallback,
        })
    }

    fn client_builder(settings: &ProbeSettings) -> ClientBuilder {
        let mut builder = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.request_timeout)
            .connect_timeout(settings.request_timeout.min(Duration::from_secs(3)))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .danger_accept_invalid_certs(!settings.verify_ssl);

        for (host, addr) in settings.pins.iter() {
            builder = builder.resolve(host, *addr);
        }
        builder
    }

    pub fn get_fallback_enabled(&self) -> bool {
        self.get_fallback
    }

    /// Escalate through the probe tiers until one scheme answers with a live status.
    pub async fn probe(&self, host: &str) -> ProbeOutcome {
        let started = Instant::now();

        let mut tiers = vec![ProbeMethod::Head, ProbeMethod::Options];
        if self.get_fallback {
            tiers.push(ProbeMethod::LimitedGet);
        }

        let mut last_miss = ProbeResult::new(host);
        for method in tiers {
            match self.race_schemes(method, host, started).await {
                Ok(result) => {
                    debug!(
                        "{} live via {} {} ({:?})",
                        host,
                        method,
                        result.scheme.map(|s| s.as_str()).unwrap_or("?"),
                        result.status_code
                    );
                    return ProbeOutcome::hit(result);
                }
                Err(miss) => {
                    debug!("{} {} tier failed: {:?}", host, method, miss.error);
                    last_miss = miss;
                }
            }
        }

        ProbeOutcome::miss(last_miss)
    }

    /// Race https and http for one tier. The first live answer wins and the
    /// other attempt is dropped mid-flight.
    async fn race_schemes(
        &self,
        method: ProbeMethod,
        host: &str,
        started: Instant,
    ) -> std::result::Result<ProbeResult, ProbeResult> {
        let mut attempts: FuturesUnordered<_> = Scheme::ALL
            .iter()
            .map(|scheme| self.attempt(method, *scheme, host, started))
            .collect();

        let mut last_miss = None;
        while let Some(outcome) = attempts.next().await {
            if outcome.live {
                return Ok(outcome.result);
            }
            last_miss = Some(outcome.result);
        }

        Err(last_miss.unwrap_or_else(|| ProbeResult::new(host)))
    }

    async fn attempt(
        &self,
        method: ProbeMethod,
        scheme: Scheme,
        host: &str,
        started: Instant,
    ) -> ProbeOutcome {
        match method {
            ProbeMethod::Head => self.try_request(Method::HEAD, method, scheme, host, started).await,
            ProbeMethod::Options => {
                self.try_request(Method::OPTIONS, method, scheme, host, started)
                    .await
            }
            ProbeMethod::LimitedGet => {
                self.try_limited_get(ProbeResult::new(host), scheme, host, started)
                    .await
            }
        }
    }

    async fn try_request(
        &self,
        http_method: Method,
        method: ProbeMethod,
        scheme: Scheme,
        host: &str,
        started: Instant,
    ) -> ProbeOutcome {
        let url = scheme.url_for(host);
        let mut result = ProbeResult::new(host);

        let response = match self
            .direct
            .request(http_method, &url)
            .timeout(self.attempt_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                result.error = Some(FailureKind::from_reqwest(&e));
                return ProbeOutcome::miss(result);
            }
        };

        record_response(&mut result, method, scheme, &response, started);

        if !is_live_status(response.status().as_u16()) {
            return ProbeOutcome::miss(result);
        }

        result.detected_by.get_or_insert(method);
        if let Some(addr) = response.remote_addr() {
            result.record_peer(addr.ip());
        }
        ProbeOutcome::hit(result)
    }

    /// Ranged GET that samples at most `max_response_bytes` and looks for a
    /// title. When the sample has none and the page is not an error, one
    /// unranged GET (same byte budget) retries the title only; it does not
    /// change the liveness verdict.
    async fn try_limited_get(
        &self,
        base: ProbeResult,
        scheme: Scheme,
        host: &str,
        started: Instant,
    ) -> ProbeOutcome {
        let url = scheme.url_for(host);
        let mut result = base;

        let mut response = match self
            .following
            .get(&url)
            .header(RANGE, format!("bytes=0-{}", self.max_response_bytes - 1))
            .timeout(self.attempt_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                result.error = Some(FailureKind::from_reqwest(&e));
                return ProbeOutcome::miss(result);
            }
        };

        let final_scheme = Scheme::from_str(response.url().scheme()).unwrap_or(scheme);
        record_response(&mut result, ProbeMethod::LimitedGet, final_scheme, &response, started);
        record_final_url(&mut result, response.url(), scheme, host);

        let status = response.status().as_u16();
        if !is_live_status(status) {
            return ProbeOutcome::miss(result);
        }

        result.error = None;
        result.detected_by.get_or_insert(ProbeMethod::LimitedGet);
        if let Some(addr) = response.remote_addr() {
            result.record_peer(addr.ip());
        }

        let sample = read_sample(&mut response, self.max_response_bytes).await;
        result.sampled_bytes = Some(sample.len());
        result.title = extract_title(&sample);
        let mut last_sample = sample;

        if result.title.is_none() && status < 400 {
            match self
                .following
                .get(&url)
                .timeout(self.title_retry_timeout)
                .send()
                .await
            {
                Ok(mut retry) => {
                    let retry_scheme = Scheme::from_str(retry.url().scheme()).unwrap_or(scheme);
                    let previous_server = result.server.take();
                    record_response(&mut result, ProbeMethod::LimitedGet, retry_scheme, &retry, started);
                    if result.server.is_none() {
                        result.server = previous_server;
                    }
                    record_final_url(&mut result, retry.url(), scheme, host);
                    if let Some(addr) = retry.remote_addr() {
                        result.record_peer(addr.ip());
                    }

                    let sample = read_sample(&mut retry, self.max_response_bytes).await;
                    result.sampled_bytes = Some(sample.len());
                    result.title = extract_title(&sample);
                    last_sample = sample;
                }
                Err(e) => debug!("Title retry for {} failed: {}", url, e),
            }
        }

        if result.title.is_none() {
            result.title_debug = Some(format!(
                "no <title> in first {} bytes; ct={}; url={}",
                result
                    .sampled_bytes
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "?".to_string()),
                result.content_type.as_deref().unwrap_or(""),
                result.final_url.as_deref().unwrap_or("")
            ));
            debug!(
                "No <title> for {} {} ct={:?} sampled={:?} body='{}'",
                url,
                status,
                result.content_type,
                result.sampled_bytes,
                safe_snippet(&String::from_utf8_lossy(&last_sample), 200)
            );
        }

        ProbeOutcome::hit(result)
    }

    /// Follow-up limited GET for hits confirmed by HEAD or OPTIONS, to fill in
    /// title and final status. The detection tag of the original hit is kept.
    pub async fn enrich(&self, host: &str, result: ProbeResult) -> ProbeResult {
        if result.method.is_some_and(|m| m.is_get()) {
            return result;
        }

        let detected_by = result.detected_by.or(result.method);
        let scheme = result.scheme.unwrap_or(Scheme::Https);
        let outcome = self
            .try_limited_get(result.clone(), scheme, host, Instant::now())
            .await;

        let mut enriched = if outcome.live { outcome.result } else { result };
        enriched.detected_by = detected_by;
        enriched
    }
}

fn record_response(
    result: &mut ProbeResult,
    method: ProbeMethod,
    scheme: Scheme,
    response: &Response,
    started: Instant,
) {
    let header = |name: HeaderName| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };

    result.method = Some(method);
    result.scheme = Some(scheme);
    result.status_code = Some(response.status().as_u16());
    result.content_type = header(CONTENT_TYPE);
    result.content_length = response.content_length();
    result.server = header(SERVER);
    result.set_elapsed(started.elapsed());
}

fn record_final_url(result: &mut ProbeResult, final_url: &Url, scheme: Scheme, host: &str) {
    let redirected = final_url.scheme() != scheme.as_str()
        || final_url
            .host_str()
            .is_none_or(|h| !h.eq_ignore_ascii_case(host))
        || final_url.path() != "/";
    result.final_url = Some(final_url.to_string());
    result.redirected = Some(redirected);
}

async fn read_sample(response: &mut Response, cap: usize) -> Vec<u8> {
    let mut sample = Vec::with_capacity(cap.min(16 * 1024));
    while sample.len() < cap {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = (cap - sample.len()).min(chunk.len());
                sample.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Body read stopped early: {}", e);
                break;
            }
        }
    }
    sample
}

/// Pull `<title>` out of a raw byte sample. Case-insensitive substring search
/// on lossy UTF-8; no HTML parsing and no charset detection.
pub fn extract_title(sample: &[u8]) -> Option<String> {
    let content = String::from_utf8_lossy(sample);
    // ASCII lowercasing keeps byte offsets aligned with `content`
    let lower = content.to_ascii_lowercase();

    let start = lower.find("<title>")? + "<title>".len();
    let end = start + lower[start..].find("</title>")?;
    if end <= start {
        return None;
    }

    let title = content.get(start..end)?.trim();
    Some(title.chars().take(TITLE_MAX_CHARS).collect())
}

/// Collapse whitespace and cut to `limit` characters for log output.
pub fn safe_snippet(text: &str, limit: usize) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title_case_insensitive() {
        let html = b"<html><HEAD><TiTlE>  Welcome Home </tItLe></head></html>";
        assert_eq!(extract_title(html), Some("Welcome Home".to_string()));
    }

    #[test]
    fn test_extract_title_missing_or_unclosed() {
        assert_eq!(extract_title(b"<html><body>nothing</body></html>"), None);
        assert_eq!(extract_title(b"<title>cut off by the byte cap"), None);
        assert_eq!(extract_title(b"<title></title>"), None);
    }

    #[test]
    fn test_extract_title_truncates_to_100_chars() {
        let long = "x".repeat(250);
        let html = format!("<title>{}</title>", long);
        let title = extract_title(html.as_bytes()).unwrap();
        assert_eq!(title.chars().count(), 100);
    }

    #[test]
    fn test_extract_title_survives_invalid_utf8() {
        let mut html = b"<title>caf".to_vec();
        html.push(0xff);
        html.extend_from_slice(b"</title>");
        let title = extract_title(&html).unwrap();
        assert!(title.starts_with("caf"));
    }

    #[test]
    fn test_safe_snippet_collapses_whitespace() {
        assert_eq!(safe_snippet("a\n\n  b\tc", 200), "a b c");
        assert_eq!(safe_snippet("abcdef", 3), "abc");
    }
}
