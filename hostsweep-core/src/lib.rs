pub mod config;
pub mod data;
pub mod enumerate;
pub mod error;
pub mod model;
pub mod progress;
pub mod report;
pub mod wordlist;

pub use config::EnumerationConfig;
pub use data::{Database, HostInsert, RunStore};
pub use enumerate::{BatchCallback, BatchReport, Enumerator};
pub use error::{EnumError, Result};
pub use model::{DiscoveredHost, Run, RunId, RunStatus, RunUpdate, Wordlist, WordlistKind};
pub use progress::{Progress, RunRegistry};
