pub mod classify;
pub mod dns;
pub mod error;
pub mod probe;
pub mod result;
pub mod verify;

pub use classify::is_live_status;
pub use dns::{DnsBackend, DnsLookup, DnsPrefilter, Pins};
pub use error::ScanError;
pub use probe::{ProbeOutcome, ProbeSettings, Prober, extract_title};
pub use result::{FailureKind, ProbeMethod, ProbeResult, Scheme};
pub use verify::CandidateVerifier;
