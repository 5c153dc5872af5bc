use crate::dns::DnsPrefilter;
use crate::error::{Result, ScanError};
use crate::probe::Prober;
use crate::result::ProbeResult;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// DNS pre-filter, then HTTP probing under the run-wide concurrency limit,
/// then enrichment for hits.
pub struct CandidateVerifier {
    prober: Prober,
    dns: DnsPrefilter,
    limiter: Arc<Semaphore>,
}

impl CandidateVerifier {
    pub fn new(prober: Prober, dns: DnsPrefilter, limiter: Arc<Semaphore>) -> Self {
        Self {
            prober,
            dns,
            limiter,
        }
    }

    pub fn dns(&self) -> &DnsPrefilter {
        &self.dns
    }

    pub fn prober(&self) -> &Prober {
        &self.prober
    }

    /// Returns the enriched diagnostics when `host` serves HTTP, `None` otherwise.
    ///
    /// Names without DNS presence return before a permit is taken, so dead
    /// names never hold up live ones.
    pub async fn verify(&self, host: &str) -> Result<Option<ProbeResult>> {
        let lookup = self.dns.lookup(host).await;
        if !lookup.exists {
            debug!("{} skipped, dns {}", host, lookup.outcome);
            return Ok(None);
        }

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| ScanError::Other(format!("Concurrency limiter closed: {}", e)))?;

        let outcome = self.prober.probe(host).await;
        if !outcome.live {
            return Ok(None);
        }

        let mut result = self.prober.enrich(host, outcome.result).await;
        result.merge_addresses(&lookup.ips);
        Ok(Some(result))
    }
}
