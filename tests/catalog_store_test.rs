//! Catalog document persistence tests

use chrono::{TimeZone, Utc};
use serde_json::Value;
use simlake::catalog::{ArtifactKind, Catalog, CatalogEntry, CatalogFilter, CatalogStore};
use simlake::{Error, ErrorKind};
use std::fs;
use tempfile::TempDir;

/// A catalog as written by the original export tool: naive timestamps, no
/// `artifact_kind`, no `total_size_bytes`, plus a key this version never writes.
const LEGACY_DOCUMENT: &str = r#"{
  "version": "1.0",
  "created": "2024-01-02T08:00:00.123456",
  "simulations": {
    "pump_20240115_143005": {
      "simulation_name": "pump",
      "original_file": "/exports/pump.mat",
      "organized_path": "data/raw/2024-01-15/pump_20240115_143005.mat",
      "file_type": ".mat",
      "size_bytes": 2048,
      "created": "2024-01-15T14:30:05.000001",
      "date_partition": "2024-01-15",
      "archived": false,
      "operator": "night-shift"
    },
    "cooling_20231101_090000": {
      "simulation_name": "cooling",
      "original_file": "/exports/cooling.csv",
      "organized_path": "data/processed/2023-11-01/cooling_20231101_090000.csv",
      "file_type": ".csv",
      "size_bytes": 1024,
      "created": "2023-11-01T09:00:00",
      "date_partition": "2023-11-01",
      "archived": true,
      "archive_path": "data/archive/2023/cooling_20231101_090000.csv"
    }
  },
  "statistics": {
    "total_simulations": 2,
    "total_size_mb": 0.0,
    "last_updated": "2024-01-15T14:30:06"
  }
}"#;

fn store(tmp: &TempDir) -> CatalogStore {
    CatalogStore::new(tmp.path().join("metadata").join("catalog.json"))
}

fn write_document(store: &CatalogStore, body: &str) {
    fs::create_dir_all(store.path().parent().unwrap()).unwrap();
    fs::write(store.path(), body).unwrap();
}

#[test]
fn test_legacy_document_loads_with_typed_defaults() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    write_document(&store, LEGACY_DOCUMENT);

    let catalog = store.load().unwrap();
    assert_eq!(catalog.len(), 2);

    let pump = catalog.get("pump_20240115_143005").unwrap();
    assert_eq!(pump.id(), "pump_20240115_143005");
    assert_eq!(pump.artifact_kind(), ArtifactKind::Raw);
    assert_eq!(
        pump.created_at().date_naive(),
        Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap().date_naive()
    );
    assert!(pump.archive_path().is_none());

    let cooling = catalog.get("cooling_20231101_090000").unwrap();
    assert_eq!(cooling.artifact_kind(), ArtifactKind::Processed);
    assert!(cooling.is_archived());
    assert_eq!(cooling.current_path(), cooling.archive_path().unwrap());
}

#[test]
fn test_missing_partition_is_derived_from_created() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    write_document(
        &store,
        r#"{
  "simulations": {
    "valve_20240303_235959": {
      "simulation_name": "valve",
      "original_file": "/exports/valve.mat",
      "organized_path": "data/raw/2024-03-03/valve_20240303_235959.mat",
      "size_bytes": 10,
      "created": "2024-03-03T23:59:59"
    }
  }
}"#,
    );

    let catalog = store.load().unwrap();
    let valve = catalog.get("valve_20240303_235959").unwrap();
    assert_eq!(valve.partition_key(), "2024-03-03");

    let listed = catalog.list(&CatalogFilter::new().date_from(
        chrono::NaiveDate::from_ymd_opt(2024, 3, 3).unwrap(),
    ));
    assert_eq!(listed.len(), 1);
}

#[test]
fn test_unknown_fields_survive_upsert() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    write_document(&store, LEGACY_DOCUMENT);

    let entry = CatalogEntry::builder("valve", "/exports/valve.mat", "data/raw/v.mat")
        .size_bytes(100)
        .build();
    store.upsert(entry).unwrap();

    let raw: Value = serde_json::from_slice(&fs::read(store.path()).unwrap()).unwrap();
    assert_eq!(
        raw["simulations"]["pump_20240115_143005"]["operator"],
        "night-shift"
    );
    assert_eq!(raw["statistics"]["total_simulations"], 3);
    assert_eq!(raw["statistics"]["total_size_bytes"], 3172);
}

#[test]
fn test_save_of_load_is_field_for_field_equal() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    write_document(&store, LEGACY_DOCUMENT);

    let mut catalog = store.load().unwrap();
    store.save(&mut catalog).unwrap();
    let reloaded = store.load().unwrap();

    assert_eq!(reloaded, catalog);
    assert_eq!(
        reloaded.entries().collect::<Vec<_>>(),
        catalog.entries().collect::<Vec<_>>()
    );
}

#[test]
fn test_missing_document_is_empty_catalog() {
    let tmp = TempDir::new().unwrap();
    let catalog = store(&tmp).load().unwrap();
    assert!(catalog.is_empty());
    assert_eq!(catalog.statistics().total_simulations(), 0);
}

#[test]
fn test_corrupt_document_surfaces_then_reinitializes() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    write_document(&store, "{ not json");

    let err = store.load().unwrap_err();
    assert!(matches!(err, Error::CorruptCatalog { .. }));
    assert_eq!(err.kind(), ErrorKind::CorruptCatalog);

    let fresh = store.reinitialize().unwrap();
    assert!(fresh.is_empty());
    assert!(store.load().unwrap().is_empty());
}

#[test]
fn test_upsert_replaces_by_id() {
    let tmp = TempDir::new().unwrap();
    let store = store(&tmp);
    let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    let first = CatalogEntry::builder("run", "/a.mat", "/lake/a.mat")
        .created_at(created)
        .size_bytes(10)
        .build();
    let second = CatalogEntry::builder("run", "/a.mat", "/lake/a.mat")
        .created_at(created)
        .size_bytes(30)
        .build();

    store.upsert(first).unwrap();
    let catalog: Catalog = store.upsert(second).unwrap();

    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.statistics().total_size_bytes(), 30);
}
