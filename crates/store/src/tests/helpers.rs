use crate::Store;
use config::StoreConfig;
use anyhow::Result;
use pending::Document;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A store at `root` with a short lock timeout and unsynced WAL appends.
pub fn open_store(root: &Path) -> Result<Store> {
    Store::open(
        StoreConfig::new(root)
            .with_lock_timeout(Duration::from_millis(200))
            .with_wal_sync(false),
    )
}

pub fn obj(v: Value) -> Document {
    match v {
        Value::Object(m) => m,
        other => panic!("not an object: {other}"),
    }
}

pub fn person(age: i64) -> Document {
    obj(json!({ "age": age }))
}

/// Resolves every id of `field`'s index to its value.
pub fn resolved(store: &Store, field: &str) -> Result<Vec<i64>> {
    let mut out = Vec::new();
    for id in store.index_ids(field)? {
        let doc = store.get(id)?.expect("indexed document exists");
        out.push(doc[field].as_i64().expect("integer field"));
    }
    Ok(out)
}

/// Every pending WAL under `root`, sorted.
pub fn wal_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(root.join("wal"))? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "wal") {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}
