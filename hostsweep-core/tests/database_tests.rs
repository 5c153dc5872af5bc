// Tests for database functionality

use hostsweep_core::data::{Database, HostInsert, RunStore};
use hostsweep_core::model::{DiscoveredHost, RunStatus, RunUpdate, WordlistKind};
use hostsweep_core::EnumError;
use tempfile::TempDir;

fn create_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path).unwrap();
    (temp_dir, db)
}

fn host(run_id: i64, name: &str) -> DiscoveredHost {
    DiscoveredHost {
        run_id,
        host: name.to_string(),
        source: "http_enumerator".to_string(),
        metadata: Some("{\"status_code\":200}".to_string()),
    }
}

// ============================================================================
// Database Creation Tests
// ============================================================================

#[test]
fn test_database_creation() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let db = Database::new(&db_path);
    assert!(db.is_ok());
    assert!(db_path.exists());
}

#[test]
fn test_database_exists_and_remove() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    assert!(!Database::exists(&db_path));

    let db = Database::new(&db_path).unwrap();
    drop(db);
    assert!(Database::exists(&db_path));

    Database::remove(&db_path).unwrap();
    assert!(!Database::exists(&db_path));
}

#[test]
fn test_schema_is_reentrant() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let first = Database::new(&db_path).unwrap();
    let run = first.create_run("example.com", None).unwrap();
    drop(first);

    let second = Database::new(&db_path).unwrap();
    assert!(second.get_run(run.id).unwrap().is_some());
}

// ============================================================================
// Run Tests
// ============================================================================

#[test]
fn test_create_run_starts_pending() {
    let (_temp_dir, db) = create_test_db();

    let run = db.create_run("example.com", None).unwrap();
    assert_eq!(run.status, RunStatus::Pending);
    assert_eq!(run.domain, "example.com");
    assert!(run.log_snippet.is_empty());
    assert!(run.started_at.is_none());
    assert!(run.finished_at.is_none());
}

#[test]
fn test_create_run_rejects_bad_domains() {
    let (_temp_dir, db) = create_test_db();

    for domain in ["localhost", "example.c0m", "exa mple.com", "", "example.c"] {
        assert!(
            matches!(db.create_run(domain, None), Err(EnumError::InvalidDomain(_))),
            "{} should be rejected",
            domain
        );
    }
    assert!(db.create_run("sub-1.example.co.uk", None).is_ok());
}

#[test]
fn test_create_run_checks_wordlist() {
    let (_temp_dir, db) = create_test_db();

    assert!(matches!(
        db.create_run("example.com", Some(42)),
        Err(EnumError::WordlistNotFound(42))
    ));

    let users = db
        .add_wordlist("users", "/tmp/users.txt", 10, WordlistKind::Username, false)
        .unwrap();
    assert!(matches!(
        db.create_run("example.com", Some(users.id)),
        Err(EnumError::WordlistType { .. })
    ));

    let subs = db
        .add_wordlist("subs", "/tmp/subs.txt", 10, WordlistKind::Subdomain, false)
        .unwrap();
    let run = db.create_run("example.com", Some(subs.id)).unwrap();
    assert_eq!(run.wordlist_id, Some(subs.id));
}

#[test]
fn test_update_run_persists_fields() {
    let (_temp_dir, db) = create_test_db();
    let mut run = db.create_run("example.com", None).unwrap();

    db.update_run(
        &mut run,
        RunUpdate::new().status(RunStatus::Running).log("started"),
    )
    .unwrap();
    db.update_run(
        &mut run,
        RunUpdate::new()
            .status(RunStatus::Failed)
            .error("boom")
            .log("failing")
            .finished(),
    )
    .unwrap();

    let stored = db.get_run(run.id).unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
    assert_eq!(stored.log_snippet, "started\nfailing");
    assert_eq!(stored.error_message.as_deref(), Some("boom"));
    assert!(stored.started_at.is_some());
    assert!(stored.finished_at.is_some());
}

#[test]
fn test_get_missing_run() {
    let (_temp_dir, db) = create_test_db();
    assert!(db.get_run(12345).unwrap().is_none());
}

#[test]
fn test_recent_runs_newest_first() {
    let (_temp_dir, db) = create_test_db();
    let first = db.create_run("one.com", None).unwrap();
    let second = db.create_run("two.com", None).unwrap();

    let runs = db.recent_runs(10).unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id, second.id);
    assert_eq!(runs[1].id, first.id);
}

// ============================================================================
// Discovered Host Tests
// ============================================================================

#[test]
fn test_insert_hosts_in_one_batch() {
    let (_temp_dir, db) = create_test_db();
    let run = db.create_run("example.com", None).unwrap();

    let outcome = db
        .insert_hosts(&[host(run.id, "www.example.com"), host(run.id, "api.example.com")])
        .unwrap();
    assert_eq!(outcome, HostInsert::Inserted(2));

    let hosts = db.hosts_for_run(run.id).unwrap();
    assert_eq!(hosts.len(), 2);
    assert_eq!(hosts[0].host, "www.example.com");
    assert_eq!(hosts[0].source.as_deref(), Some("http_enumerator"));
}

#[test]
fn test_duplicate_host_rolls_back_batch() {
    let (_temp_dir, db) = create_test_db();
    let run = db.create_run("example.com", None).unwrap();

    db.insert_hosts(&[host(run.id, "www.example.com")]).unwrap();

    let outcome = db
        .insert_hosts(&[host(run.id, "mail.example.com"), host(run.id, "www.example.com")])
        .unwrap();
    assert_eq!(outcome, HostInsert::Conflict);

    let hosts = db.hosts_for_run(run.id).unwrap();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].host, "www.example.com");

    // Same insert again stays idempotent
    assert_eq!(
        db.insert_hosts(&[host(run.id, "www.example.com")]).unwrap(),
        HostInsert::Conflict
    );
    assert_eq!(db.hosts_for_run(run.id).unwrap().len(), 1);
}

#[test]
fn test_same_host_allowed_across_runs() {
    let (_temp_dir, db) = create_test_db();
    let first = db.create_run("example.com", None).unwrap();
    let second = db.create_run("example.com", None).unwrap();

    assert_eq!(
        db.insert_hosts(&[host(first.id, "www.example.com")]).unwrap(),
        HostInsert::Inserted(1)
    );
    assert_eq!(
        db.insert_hosts(&[host(second.id, "www.example.com")]).unwrap(),
        HostInsert::Inserted(1)
    );
}

#[test]
fn test_host_for_unknown_run_is_an_error() {
    let (_temp_dir, db) = create_test_db();
    let run = db.create_run("example.com", None).unwrap();

    let result = db.insert_hosts(&[host(run.id, "www.example.com"), host(999, "mail.example.com")]);
    assert!(matches!(result, Err(EnumError::Database(_))));
    assert!(db.hosts_for_run(run.id).unwrap().is_empty());
}

#[test]
fn test_insert_no_hosts() {
    let (_temp_dir, db) = create_test_db();
    assert_eq!(db.insert_hosts(&[]).unwrap(), HostInsert::Inserted(0));
}

// ============================================================================
// Wordlist Tests
// ============================================================================

#[test]
fn test_default_is_unique_per_kind() {
    let (_temp_dir, db) = create_test_db();

    let a = db
        .add_wordlist("a", "/tmp/a.txt", 1, WordlistKind::Subdomain, true)
        .unwrap();
    let b = db
        .add_wordlist("b", "/tmp/b.txt", 1, WordlistKind::Subdomain, true)
        .unwrap();
    let pw = db
        .add_wordlist("pw", "/tmp/pw.txt", 1, WordlistKind::Password, true)
        .unwrap();

    assert!(!db.get_wordlist(a.id).unwrap().unwrap().is_default);
    assert!(db.get_wordlist(b.id).unwrap().unwrap().is_default);
    assert!(db.get_wordlist(pw.id).unwrap().unwrap().is_default);

    db.set_default_wordlist(a.id).unwrap();
    assert!(db.get_wordlist(a.id).unwrap().unwrap().is_default);
    assert!(!db.get_wordlist(b.id).unwrap().unwrap().is_default);
    assert!(db.get_wordlist(pw.id).unwrap().unwrap().is_default);
}

#[test]
fn test_find_wordlist_by_id_and_default() {
    let (_temp_dir, db) = create_test_db();

    assert!(db.find_wordlist(None, WordlistKind::Subdomain).unwrap().is_none());

    let subs = db
        .add_wordlist("subs", "/tmp/subs.txt", 1, WordlistKind::Subdomain, true)
        .unwrap();
    let users = db
        .add_wordlist("users", "/tmp/users.txt", 1, WordlistKind::Username, true)
        .unwrap();

    let default = db.find_wordlist(None, WordlistKind::Subdomain).unwrap().unwrap();
    assert_eq!(default.id, subs.id);

    // An explicit id of the wrong kind is not a match
    assert!(
        db.find_wordlist(Some(users.id), WordlistKind::Subdomain)
            .unwrap()
            .is_none()
    );
    assert_eq!(
        db.find_wordlist(Some(users.id), WordlistKind::Username)
            .unwrap()
            .unwrap()
            .name,
        "users"
    );
}

#[test]
fn test_list_and_delete_wordlists() {
    let (_temp_dir, db) = create_test_db();
    db.add_wordlist("subs", "/tmp/subs.txt", 1, WordlistKind::Subdomain, false)
        .unwrap();
    let users = db
        .add_wordlist("users", "/tmp/users.txt", 1, WordlistKind::Username, false)
        .unwrap();

    assert_eq!(db.list_wordlists(None).unwrap().len(), 2);
    assert_eq!(
        db.list_wordlists(Some(WordlistKind::Username)).unwrap().len(),
        1
    );

    let removed = db.delete_wordlist(users.id).unwrap();
    assert_eq!(removed.path, "/tmp/users.txt");
    assert_eq!(db.wordlist_paths().unwrap(), vec!["/tmp/subs.txt".to_string()]);
    assert!(matches!(
        db.delete_wordlist(users.id),
        Err(EnumError::WordlistNotFound(_))
    ));
}

#[test]
fn test_deleting_wordlist_keeps_runs() {
    let (_temp_dir, db) = create_test_db();
    let subs = db
        .add_wordlist("subs", "/tmp/subs.txt", 1, WordlistKind::Subdomain, false)
        .unwrap();
    let run = db.create_run("example.com", Some(subs.id)).unwrap();

    db.delete_wordlist(subs.id).unwrap();

    let stored = db.get_run(run.id).unwrap().unwrap();
    assert_eq!(stored.wordlist_id, None);
}

#[test]
fn test_update_wordlist_size() {
    let (_temp_dir, db) = create_test_db();
    let subs = db
        .add_wordlist("subs", "/tmp/subs.txt", 100, WordlistKind::Subdomain, false)
        .unwrap();

    db.update_wordlist_size(subs.id, 42).unwrap();
    assert_eq!(db.get_wordlist(subs.id).unwrap().unwrap().size_bytes, 42);
    assert!(db.update_wordlist_size(999, 1).is_err());
}
