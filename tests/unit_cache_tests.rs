//! # Cache Module Unit Tests / Cache 模块单元测试
//!
//! Key derivation, write-once storage and get-or-populate semantics.
//!
//! 键派生、一次写入存储以及获取或填充语义。

use matrix_orchestrator::core::cache::{CacheKey, CacheOutcome, CacheStore};
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_key_depends_on_lockfile_content() {
    let a = CacheKey::from_content("pip-ubuntu", b"pytest==7.4.0\n");
    let b = CacheKey::from_content("pip-ubuntu", b"pytest==7.4.0\n");
    let c = CacheKey::from_content("pip-ubuntu", b"pytest==8.0.0\n");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert!(a.as_str().starts_with("pip-ubuntu-"));
    assert_eq!(a.as_str().len(), "pip-ubuntu-".len() + 16);
}

#[test]
fn test_key_prefix_is_sanitized() {
    let key = CacheKey::from_content("pip/3.8 win", b"x");
    assert!(key.as_str().starts_with("pip_3.8_win-"));
}

#[test]
fn test_derive_reads_lockfile() {
    let dir = tempfile::tempdir().unwrap();
    let lock = dir.path().join("requirements.lock");
    fs::write(&lock, "a==1\n").unwrap();
    let key = CacheKey::derive("deps", &lock).unwrap();
    assert_eq!(key, CacheKey::from_content("deps", b"a==1\n"));
    assert!(CacheKey::derive("deps", &dir.path().join("missing.lock")).is_err());
}

#[test]
fn test_store_is_write_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path().join("store"));
    let key = CacheKey::from_content("deps", b"lock");

    let first = dir.path().join("first");
    fs::create_dir_all(&first).unwrap();
    fs::write(first.join("pkg.txt"), "first").unwrap();
    assert!(store.store(&key, &first).unwrap());
    assert!(store.contains(&key));

    let second = dir.path().join("second");
    fs::create_dir_all(&second).unwrap();
    fs::write(second.join("pkg.txt"), "second").unwrap();
    assert!(!store.store(&key, &second).unwrap());

    let target = dir.path().join("restored");
    assert!(store.restore(&key, &target).unwrap());
    assert_eq!(fs::read_to_string(target.join("pkg.txt")).unwrap(), "first");
}

#[test]
fn test_restore_miss_returns_false() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path());
    let key = CacheKey::from_content("deps", b"lock");
    assert!(!store.restore(&key, &dir.path().join("target")).unwrap());
}

#[tokio::test]
async fn test_get_or_populate_populates_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path().join("store"));
    let key = CacheKey::from_content("deps", b"lock");
    let calls = Arc::new(AtomicUsize::new(0));

    let first_dir = dir.path().join("run-a").join(".deps");
    let counter = Arc::clone(&calls);
    let target = first_dir.clone();
    let outcome = store
        .get_or_populate(&key, &first_dir, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            fs::create_dir_all(&target).unwrap();
            fs::write(target.join("wheel.whl"), "bits").unwrap();
            (true, "populated")
        })
        .await
        .unwrap();
    assert!(matches!(outcome, CacheOutcome::Populated("populated")));

    let second_dir = dir.path().join("run-b").join(".deps");
    let counter = Arc::clone(&calls);
    let outcome = store
        .get_or_populate(&key, &second_dir, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            (true, "populated again")
        })
        .await
        .unwrap();
    assert!(matches!(outcome, CacheOutcome::Hit));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(fs::read_to_string(second_dir.join("wheel.whl")).unwrap(), "bits");
}

#[tokio::test]
async fn test_failed_populate_is_not_stored() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path().join("store"));
    let key = CacheKey::from_content("deps", b"lock");
    let target = dir.path().join(".deps");

    let outcome = store
        .get_or_populate(&key, &target, || async { (false, 7) })
        .await
        .unwrap();
    assert!(matches!(outcome, CacheOutcome::NotStored(7)));
    assert!(!store.contains(&key));
}
