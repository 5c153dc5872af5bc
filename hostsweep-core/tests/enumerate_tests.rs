// Tests for the enumeration engine against a local mock server

use hostsweep_core::data::{Database, RunStore};
use hostsweep_core::enumerate::{BatchReport, Enumerator, STOP_LOG_LINE};
use hostsweep_core::model::{LOG_LIMIT, RunStatus, WordlistKind};
use hostsweep_core::{EnumError, EnumerationConfig, RunRegistry};
use hostsweep_scanner::{DnsBackend, Pins, ProbeResult};
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::Semaphore;
use wiremock::matchers::{any, header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOMAIN: &str = "example.test";

fn create_test_db(words: &str) -> (TempDir, Database, i64) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("test.db")).unwrap();

    let path = temp_dir.path().join("subdomains.txt");
    fs::write(&path, words).unwrap();
    let wordlist = db
        .add_wordlist(
            "subdomains.txt",
            path.to_str().unwrap(),
            words.len() as i64,
            WordlistKind::Subdomain,
            true,
        )
        .unwrap();

    (temp_dir, db, wordlist.id)
}

fn config_for(server: &MockServer, words: &[&str]) -> EnumerationConfig {
    let mut pins = Pins::new();
    for word in words {
        pins.insert(&format!("{}.{}", word, DOMAIN), *server.address());
    }
    EnumerationConfig {
        dns_backend: DnsBackend::Static,
        request_timeout: Duration::from_secs(3),
        pins,
        ..EnumerationConfig::default()
    }
}

async fn mount_everything_live(server: &MockServer) {
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<title>Up</title>"))
        .mount(server)
        .await;
}

fn collect_reports() -> (Arc<Mutex<Vec<BatchReport>>>, hostsweep_core::BatchCallback) {
    let reports: Arc<Mutex<Vec<BatchReport>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    let callback: hostsweep_core::BatchCallback = Arc::new(move |report: &BatchReport| {
        sink.lock().unwrap().push(report.clone());
    });
    (reports, callback)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_live_hosts_are_recorded_and_dead_names_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(header("host", "www.example.test"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(header("host", "api.example.test"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("host", "www.example.test"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<title>Example</title>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("host", "api.example.test"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let (_temp_dir, db, wordlist_id) = create_test_db("www\napi\nnonexistent123xyz\n");
    let run = db.create_run(DOMAIN, Some(wordlist_id)).unwrap();
    let registry = RunRegistry::new();
    let (reports, callback) = collect_reports();

    let enumerator = Enumerator::new(&db, &registry, config_for(&server, &["www", "api"]))
        .with_batch_callback(callback);
    let status = enumerator.run(run.id, DOMAIN, Some(wordlist_id)).await.unwrap();

    assert_eq!(status, RunStatus::Succeeded);

    let hosts = db.hosts_for_run(run.id).unwrap();
    let names: Vec<&str> = hosts.iter().map(|h| h.host.as_str()).collect();
    assert_eq!(hosts.len(), 2);
    assert!(names.contains(&"www.example.test"));
    assert!(names.contains(&"api.example.test"));
    assert!(hosts.iter().all(|h| h.source.as_deref() == Some("http_enumerator")));

    let www = hosts.iter().find(|h| h.host == "www.example.test").unwrap();
    let meta: ProbeResult = serde_json::from_str(www.metadata.as_deref().unwrap()).unwrap();
    assert_eq!(meta.status_code, Some(200));
    assert_eq!(meta.title.as_deref(), Some("Example"));

    let reports = reports.lock().unwrap();
    let last = reports.last().unwrap();
    assert_eq!((last.processed, last.total), (3, 3));
    assert_eq!(last.total_hits, 2);

    let stored = db.get_run(run.id).unwrap().unwrap();
    assert!(stored.started_at.is_some());
    assert!(stored.finished_at.is_some());
    assert!(stored.log_snippet.contains("[+] www.example.test [GET(limited) http 200]"));
    assert!(stored.log_snippet.contains("2 live hosts found"));
    assert!(!stored.log_snippet.contains("nonexistent123xyz"));

    // Progress is cleared once the run is over
    assert_eq!(registry.progress(run.id).total, None);
}

#[tokio::test]
async fn test_disabled_feature_fails_without_network() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (_temp_dir, db, wordlist_id) = create_test_db("www\napi\n");
    let run = db.create_run(DOMAIN, None).unwrap();
    let registry = RunRegistry::new();
    let config = EnumerationConfig {
        enabled: false,
        ..config_for(&server, &["www", "api"])
    };

    let status = Enumerator::new(&db, &registry, config)
        .run(run.id, DOMAIN, Some(wordlist_id))
        .await
        .unwrap();

    assert_eq!(status, RunStatus::Failed);
    let stored = db.get_run(run.id).unwrap().unwrap();
    assert_eq!(
        stored.error_message.as_deref(),
        Some("HTTP enumeration is disabled (set ENABLE_HTTP_ENUM=true)")
    );
    assert!(stored.started_at.is_none());
    assert!(stored.finished_at.is_some());
    assert!(db.hosts_for_run(run.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_stop_after_first_batch_cancels_run() {
    let server = MockServer::start().await;
    mount_everything_live(&server).await;

    let words = ["a1", "a2", "b1", "b2", "c1", "c2"];
    let (_temp_dir, db, wordlist_id) = create_test_db(&words.join("\n"));
    let run = db.create_run(DOMAIN, None).unwrap();
    let registry = Arc::new(RunRegistry::new());

    let calls = Arc::new(Mutex::new(0usize));
    let stopper = registry.clone();
    let counter = calls.clone();
    let callback: hostsweep_core::BatchCallback = Arc::new(move |report: &BatchReport| {
        *counter.lock().unwrap() += 1;
        if report.batch == 1 {
            stopper.request_stop(report.run_id);
        }
    });

    let config = EnumerationConfig {
        batch_size: 2,
        ..config_for(&server, &words)
    };
    let status = Enumerator::new(&db, &registry, config)
        .with_batch_callback(callback)
        .run(run.id, DOMAIN, Some(wordlist_id))
        .await
        .unwrap();

    assert_eq!(status, RunStatus::Canceled);
    assert_eq!(*calls.lock().unwrap(), 1);

    let mut hosts: Vec<String> = db
        .hosts_for_run(run.id)
        .unwrap()
        .into_iter()
        .map(|h| h.host)
        .collect();
    hosts.sort();
    assert_eq!(hosts, vec!["a1.example.test", "a2.example.test"]);

    let stored = db.get_run(run.id).unwrap().unwrap();
    assert!(stored.log_snippet.ends_with(STOP_LOG_LINE));
    assert!(stored.finished_at.is_some());
    assert_eq!(registry.progress(run.id).total, None);
    assert!(!registry.is_stopped(run.id));
}

#[tokio::test]
async fn test_in_flight_requests_capped_by_worker_limit() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<title>Up</title>"))
        .mount(&server)
        .await;

    let words = ["w1", "w2", "w3", "w4", "w5", "w6"];
    let (_temp_dir, db, wordlist_id) = create_test_db(&words.join("\n"));
    let run = db.create_run(DOMAIN, None).unwrap();
    let registry = RunRegistry::new();
    let config = EnumerationConfig {
        max_concurrent_requests: 2,
        batch_size: 10,
        ..config_for(&server, &words)
    };

    let started = Instant::now();
    let status = Enumerator::new(&db, &registry, config)
        .run(run.id, DOMAIN, Some(wordlist_id))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // six slow answers through two slots take at least three rounds
    assert_eq!(status, RunStatus::Succeeded);
    assert_eq!(db.hosts_for_run(run.id).unwrap().len(), 6);
    assert!(elapsed >= Duration::from_millis(850), "finished in {:?}", elapsed);
}

#[tokio::test]
async fn test_oversized_worker_limit_is_clamped() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (_temp_dir, db, wordlist_id) = create_test_db("ghost1\nghost2\n");
    let run = db.create_run(DOMAIN, None).unwrap();
    let registry = RunRegistry::new();
    let config = EnumerationConfig {
        max_concurrent_requests: usize::MAX,
        ..config_for(&server, &[])
    };
    assert!(config.max_concurrent_requests > Semaphore::MAX_PERMITS);

    let status = Enumerator::new(&db, &registry, config)
        .run(run.id, DOMAIN, Some(wordlist_id))
        .await
        .unwrap();

    assert_eq!(status, RunStatus::Succeeded);
    assert!(db.hosts_for_run(run.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_repeated_words_yield_one_row_per_host() {
    let server = MockServer::start().await;
    mount_everything_live(&server).await;

    let (_temp_dir, db, wordlist_id) = create_test_db("www\nWWW\napi\nwww\napi\n");
    let run = db.create_run(DOMAIN, None).unwrap();
    let registry = RunRegistry::new();
    let config = EnumerationConfig {
        batch_size: 2,
        ..config_for(&server, &["www", "api"])
    };

    let status = Enumerator::new(&db, &registry, config)
        .run(run.id, DOMAIN, Some(wordlist_id))
        .await
        .unwrap();

    assert_eq!(status, RunStatus::Succeeded);
    assert_eq!(db.hosts_for_run(run.id).unwrap().len(), 2);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_reaches_total() {
    let server = MockServer::start().await;
    mount_everything_live(&server).await;

    let words: Vec<String> = (0..7).map(|i| format!("host{}", i)).collect();
    let word_refs: Vec<&str> = words.iter().map(String::as_str).collect();
    let (_temp_dir, db, wordlist_id) = create_test_db(&words.join("\n"));
    let run = db.create_run(DOMAIN, None).unwrap();
    let registry = RunRegistry::new();
    let (reports, callback) = collect_reports();

    let config = EnumerationConfig {
        batch_size: 3,
        ..config_for(&server, &word_refs)
    };
    Enumerator::new(&db, &registry, config)
        .with_batch_callback(callback)
        .run(run.id, DOMAIN, Some(wordlist_id))
        .await
        .unwrap();

    let reports = reports.lock().unwrap();
    let processed: Vec<u64> = reports.iter().map(|r| r.processed).collect();
    assert_eq!(processed, vec![3, 6, 7]);
    assert!(reports.iter().all(|r| r.total == 7 && r.total_batches == 3));
}

#[tokio::test]
async fn test_log_stays_within_budget() {
    let server = MockServer::start().await;
    mount_everything_live(&server).await;

    let words: Vec<String> = (0..120).map(|i| format!("service-number-{}", i)).collect();
    let word_refs: Vec<&str> = words.iter().map(String::as_str).collect();
    let (_temp_dir, db, wordlist_id) = create_test_db(&words.join("\n"));
    let run = db.create_run(DOMAIN, None).unwrap();
    let registry = RunRegistry::new();
    let config = EnumerationConfig {
        batch_size: 40,
        ..config_for(&server, &word_refs)
    };

    let status = Enumerator::new(&db, &registry, config)
        .run(run.id, DOMAIN, Some(wordlist_id))
        .await
        .unwrap();

    assert_eq!(status, RunStatus::Succeeded);
    assert_eq!(db.hosts_for_run(run.id).unwrap().len(), 120);

    let stored = db.get_run(run.id).unwrap().unwrap();
    assert!(stored.log_snippet.chars().count() <= LOG_LIMIT);
    assert!(stored.log_snippet.contains("120 live hosts found"));
    assert!(!stored.log_snippet.contains("Starting HTTP enumerator"));
}

// ============================================================================
// Failure paths
// ============================================================================

#[tokio::test]
async fn test_no_wordlist_fails_run() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
    let run = db.create_run(DOMAIN, None).unwrap();
    let registry = RunRegistry::new();

    let status = Enumerator::new(&db, &registry, EnumerationConfig::default())
        .run(run.id, DOMAIN, None)
        .await
        .unwrap();

    assert_eq!(status, RunStatus::Failed);
    let stored = db.get_run(run.id).unwrap().unwrap();
    assert_eq!(stored.error_message.as_deref(), Some("no wordlist available"));
}

#[tokio::test]
async fn test_missing_wordlist_file_records_engine_error() {
    let (temp_dir, db, wordlist_id) = create_test_db("www\n");
    fs::remove_file(temp_dir.path().join("subdomains.txt")).unwrap();
    let run = db.create_run(DOMAIN, None).unwrap();
    let registry = RunRegistry::new();
    let config = EnumerationConfig {
        dns_backend: DnsBackend::Static,
        ..EnumerationConfig::default()
    };

    let status = Enumerator::new(&db, &registry, config)
        .run(run.id, DOMAIN, Some(wordlist_id))
        .await
        .unwrap();

    assert_eq!(status, RunStatus::Failed);
    let stored = db.get_run(run.id).unwrap().unwrap();
    assert!(
        stored
            .error_message
            .unwrap()
            .starts_with("HTTP enumerator error:")
    );
    assert_eq!(registry.progress(run.id).total, None);
    assert!(!registry.is_stopped(run.id));
}

#[tokio::test]
async fn test_unknown_run_is_an_error() {
    let (_temp_dir, db, _) = create_test_db("www\n");
    let registry = RunRegistry::new();

    let result = Enumerator::new(&db, &registry, EnumerationConfig::default())
        .run(999, DOMAIN, None)
        .await;

    assert!(matches!(result, Err(EnumError::RunNotFound(999))));
}

#[tokio::test]
async fn test_finished_run_is_not_restarted() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (_temp_dir, db, wordlist_id) = create_test_db("www\n");
    let mut run = db.create_run(DOMAIN, None).unwrap();
    db.update_run(
        &mut run,
        hostsweep_core::RunUpdate::new()
            .status(RunStatus::Canceled)
            .finished(),
    )
    .unwrap();
    let registry = RunRegistry::new();

    let status = Enumerator::new(&db, &registry, config_for(&server, &["www"]))
        .run(run.id, DOMAIN, Some(wordlist_id))
        .await
        .unwrap();

    assert_eq!(status, RunStatus::Canceled);
}
