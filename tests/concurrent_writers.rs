//! Concurrency tests: ingestion, sweeps and readers sharing one lake

use chrono::{Duration, Utc};
use simlake::catalog::{partition_key, simulation_id, ArtifactKind, CatalogEntry};
use simlake::DataLake;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const WRITERS: u32 = 8;
const FILES_PER_WRITER: u32 = 5;

#[test]
fn test_concurrent_ingestion_loses_no_entries() {
    let tmp = TempDir::new().unwrap();
    let lake = Arc::new(DataLake::open(tmp.path().join("lake")).unwrap());
    let inbox = tmp.path().join("inbox");
    fs::create_dir_all(&inbox).unwrap();

    let ingested = Arc::new(AtomicU32::new(0));
    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let lake = Arc::clone(&lake);
            let inbox = inbox.clone();
            let ingested = Arc::clone(&ingested);
            thread::spawn(move || {
                for n in 0..FILES_PER_WRITER {
                    let src = inbox.join(format!("w{writer}_f{n}.mat"));
                    fs::write(&src, vec![1u8; 100]).unwrap();
                    lake.ingest(&src, None).unwrap();
                    ingested.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let expected = WRITERS * FILES_PER_WRITER;
    assert_eq!(ingested.load(Ordering::SeqCst), expected);

    let catalog = lake.catalog().unwrap();
    assert_eq!(catalog.len(), expected as usize);
    assert_eq!(catalog.statistics().total_simulations(), expected as usize);
    assert_eq!(
        catalog.statistics().total_size_bytes(),
        u64::from(expected) * 100
    );
}

#[test]
fn test_sweep_and_ingest_do_not_overwrite_each_other() {
    let tmp = TempDir::new().unwrap();
    let lake = Arc::new(DataLake::open(tmp.path().join("lake")).unwrap());

    // Aged entries for the sweeper
    let mut aged = Vec::new();
    for n in 0..10 {
        let created = Utc::now() - Duration::days(40 + n);
        let dir = lake
            .layout()
            .partition_dir(ArtifactKind::Raw, &partition_key(created));
        fs::create_dir_all(&dir).unwrap();
        let name = format!("aged{n}");
        let path = dir.join(format!("{}.mat", simulation_id(&name, created)));
        fs::write(&path, b"x").unwrap();
        let entry = CatalogEntry::builder(name, "/in/aged.mat", path)
            .created_at(created)
            .size_bytes(1)
            .build();
        lake.store().upsert(entry.clone()).unwrap();
        aged.push(entry.id().to_string());
    }

    let inbox = tmp.path().join("inbox");
    fs::create_dir_all(&inbox).unwrap();

    let ingester = {
        let lake = Arc::clone(&lake);
        let inbox = inbox.clone();
        thread::spawn(move || {
            for n in 0..20 {
                let src = inbox.join(format!("fresh{n}.mat"));
                fs::write(&src, b"y").unwrap();
                lake.ingest(&src, None).unwrap();
            }
        })
    };
    let sweeper = {
        let lake = Arc::clone(&lake);
        thread::spawn(move || {
            let mut archived = 0;
            for _ in 0..5 {
                archived += lake.archive_older_than(30).unwrap();
            }
            archived
        })
    };

    ingester.join().unwrap();
    let archived = sweeper.join().unwrap();

    assert_eq!(archived, 10);
    let catalog = lake.catalog().unwrap();
    assert_eq!(catalog.len(), 30);
    for id in &aged {
        assert!(catalog.get(id).unwrap().is_archived(), "{id} not archived");
    }
    assert_eq!(
        catalog.entries().filter(|e| !e.is_archived()).count(),
        20
    );
}

#[test]
fn test_readers_never_see_a_torn_document() {
    let tmp = TempDir::new().unwrap();
    let lake = Arc::new(DataLake::open(tmp.path().join("lake")).unwrap());
    let inbox = tmp.path().join("inbox");
    fs::create_dir_all(&inbox).unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let lake = Arc::clone(&lake);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut reads = 0u32;
            loop {
                let catalog = lake.catalog().unwrap();
                assert_eq!(catalog.statistics().total_simulations(), catalog.len());
                reads += 1;
                if done.load(Ordering::SeqCst) {
                    return reads;
                }
            }
        })
    };

    for n in 0..30 {
        let src = inbox.join(format!("r{n}.mat"));
        fs::write(&src, b"z").unwrap();
        lake.ingest(&src, None).unwrap();
    }
    done.store(true, Ordering::SeqCst);

    assert!(reader.join().unwrap() > 0);
    assert_eq!(lake.catalog().unwrap().len(), 30);
}
