use super::*;
use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults() {
    let cfg = StoreConfig::default();
    assert_eq!(cfg.root, PathBuf::from("./shelf"));
    assert_eq!(cfg.lock_timeout, Duration::from_secs(5));
    assert!(cfg.wal_sync);
    assert_eq!(cfg.auto_flush, 0);
}

#[test]
fn unset_environment_gives_defaults() {
    assert_eq!(StoreConfig::from_lookup(|_| None), StoreConfig::default());
}

#[test]
fn reads_every_variable() {
    let cfg = StoreConfig::from_lookup(lookup_from(&[
        ("SHELF_ROOT", "/tmp/db"),
        ("SHELF_LOCK_TIMEOUT_MS", "250"),
        ("SHELF_WAL_SYNC", "false"),
        ("SHELF_AUTO_FLUSH", "128"),
    ]));
    assert_eq!(cfg.root, PathBuf::from("/tmp/db"));
    assert_eq!(cfg.lock_timeout, Duration::from_millis(250));
    assert!(!cfg.wal_sync);
    assert_eq!(cfg.auto_flush, 128);
}

#[test]
fn zero_timeout_is_kept() {
    let cfg = StoreConfig::from_lookup(lookup_from(&[("SHELF_LOCK_TIMEOUT_MS", "0")]));
    assert_eq!(cfg.lock_timeout, Duration::ZERO);
}

#[test]
fn garbage_falls_back_to_defaults() {
    let cfg = StoreConfig::from_lookup(lookup_from(&[
        ("SHELF_LOCK_TIMEOUT_MS", "soon"),
        ("SHELF_WAL_SYNC", "yes please"),
        ("SHELF_AUTO_FLUSH", "-3"),
    ]));
    assert_eq!(cfg.lock_timeout, DEFAULT_LOCK_TIMEOUT);
    assert!(cfg.wal_sync);
    assert_eq!(cfg.auto_flush, 0);
}

#[test]
fn builder_and_layout() {
    let cfg = StoreConfig::new("/srv/shelf")
        .with_lock_timeout(Duration::from_millis(10))
        .with_wal_sync(false)
        .with_auto_flush(3);
    assert_eq!(cfg.lock_timeout, Duration::from_millis(10));
    assert!(!cfg.wal_sync);
    assert_eq!(cfg.auto_flush, 3);

    assert_eq!(cfg.ids_path(), PathBuf::from("/srv/shelf/ids.json"));
    assert_eq!(cfg.wal_dir(), PathBuf::from("/srv/shelf/wal"));
    assert_eq!(cfg.data_dir(), PathBuf::from("/srv/shelf/data"));
    assert_eq!(cfg.index_dir(), PathBuf::from("/srv/shelf/index"));
}
