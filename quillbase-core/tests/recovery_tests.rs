// tests/recovery_tests.rs
// Crash recovery: disk snapshot load plus WAL replay

mod common;

use common::gen_doc;
use quillbase_core::{Config, Engine, Parameters, SessionId};

const DB: &str = "RecoveryDb";
const COLLECTIONS: [&str; 3] = ["alpha", "beta", "gamma"];

fn populate(engine: &Engine) -> Vec<u64> {
    let session = SessionId::new();
    engine.create_database(&session, DB).unwrap();
    let mut sizes = Vec::new();
    for (i, coll) in COLLECTIONS.iter().enumerate() {
        let session = SessionId::new();
        engine.create_collection(&session, DB, coll).unwrap();
        let count = 20 + 10 * i as i64;
        for num in 0..count {
            let session = SessionId::new();
            assert!(engine
                .insert_one(&session, DB, coll, gen_doc(num))
                .unwrap()
                .is_success());
        }
        let session = SessionId::new();
        sizes.push(engine.size(&session, DB, coll).unwrap());
    }
    sizes
}

#[test]
fn test_acknowledged_writes_survive_a_kill() {
    let dir = tempfile::tempdir().unwrap();
    let sizes = {
        let engine = Engine::start(Config::new(dir.path())).unwrap();
        let sizes = populate(&engine);
        engine.kill(); // no orderly shutdown
        sizes
    };
    assert_eq!(sizes, vec![20, 30, 40]);

    // let the abandoned actor threads wind down before reopening the files
    std::thread::sleep(std::time::Duration::from_millis(200));

    let engine = Engine::start(Config::new(dir.path())).unwrap();
    engine.load().unwrap();
    for (coll, expected) in COLLECTIONS.iter().zip(&sizes) {
        let session = SessionId::new();
        assert_eq!(engine.size(&session, DB, coll).unwrap(), *expected);
    }
}

#[test]
fn test_wal_replay_rebuilds_lost_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let sizes = {
        let engine = Engine::start(Config::new(dir.path())).unwrap();
        let sizes = populate(&engine);
        engine.shutdown();
        sizes
    };

    // lose the snapshot: reset the checkpoint and remove the document
    // files, keeping the catalog and the WAL
    let config = Config::new(dir.path());
    std::fs::remove_file(config.checkpoint_path()).unwrap();
    for coll in COLLECTIONS {
        let documents = dir.path().join(DB).join(coll).join("documents.qbs");
        if documents.exists() {
            std::fs::remove_file(documents).unwrap();
        }
    }

    let engine = Engine::start(config).unwrap();
    engine.load().unwrap();
    for (coll, expected) in COLLECTIONS.iter().zip(&sizes) {
        let session = SessionId::new();
        assert_eq!(engine.size(&session, DB, coll).unwrap(), *expected);
    }
    // replayed documents are intact, not just counted
    let session = SessionId::new();
    let cursor = engine
        .find_one(
            &session,
            DB,
            "alpha",
            Some(quillbase_core::Expr::eq("count", 1)),
            {
                let mut parameters = Parameters::default();
                parameters.add(1, 7i64);
                parameters
            },
        )
        .unwrap();
    let found = cursor.first().expect("document replayed");
    assert_eq!(found.get_string("/countStr").as_deref(), Some("7"));
}

#[test]
fn test_replay_is_idempotent_over_surviving_snapshot() {
    // a stale checkpoint makes every record replay on top of the intact
    // snapshot; duplicate ids must not double-insert
    let dir = tempfile::tempdir().unwrap();
    let sizes = {
        let engine = Engine::start(Config::new(dir.path())).unwrap();
        let sizes = populate(&engine);
        engine.shutdown();
        sizes
    };

    let config = Config::new(dir.path());
    std::fs::remove_file(config.checkpoint_path()).unwrap();

    let engine = Engine::start(config).unwrap();
    engine.load().unwrap();
    for (coll, expected) in COLLECTIONS.iter().zip(&sizes) {
        let session = SessionId::new();
        assert_eq!(engine.size(&session, DB, coll).unwrap(), *expected);
    }
}

#[test]
fn test_wal_ids_continue_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = Engine::start(Config::new(dir.path())).unwrap();
        populate(&engine);
        engine.shutdown();
    }
    // the id counter picks up where the log ends
    let config = Config::new(dir.path());
    let wal = quillbase_core::WalManager::open(&config).unwrap();
    let before = wal.last_id();
    assert!(before > 0);
    drop(wal);

    let engine = Engine::start(config.clone()).unwrap();
    engine.load().unwrap();
    let session = SessionId::new();
    engine
        .insert_one(&session, DB, "alpha", gen_doc(999))
        .unwrap();
    engine.shutdown();

    let wal = quillbase_core::WalManager::open(&config).unwrap();
    assert_eq!(wal.last_id(), before + 1);
}

#[test]
fn test_load_on_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::start(Config::new(dir.path())).unwrap();
    engine.load().unwrap();
    let session = SessionId::new();
    assert!(engine.create_database(&session, DB).unwrap().is_success());
}
