use memtier::{CacheConfig, CacheError, CacheRegistry, MemoryCache};
use std::sync::Arc;
use std::time::Duration;

fn make(name: &str) -> Arc<MemoryCache<String, String>> {
    MemoryCache::with_config(CacheConfig { auto_trim_interval: Duration::MAX, ..CacheConfig::named(name) })
}

#[test]
fn lookups_share_the_live_instance() {
    let registry = CacheRegistry::new();
    let images = make("images");
    registry.register(&images).unwrap();
    images.set("a".into(), "1".into());
    let found = registry.get("images").unwrap();
    assert!(Arc::ptr_eq(&images, &found));
    assert_eq!(found.get(&"a".to_string()).as_deref(), Some("1"));
    assert!(registry.get("missing").is_none());
}

#[test]
fn registry_does_not_keep_caches_alive() {
    let registry = CacheRegistry::new();
    let cache = make("tmp");
    registry.register(&cache).unwrap();
    assert_eq!(registry.names(), vec!["tmp".to_string()]);
    drop(cache);
    assert!(registry.get("tmp").is_none());
    assert!(registry.names().is_empty());
    assert_eq!(registry.prune(), 1);
    assert_eq!(registry.prune(), 0);
}

#[test]
fn live_names_cannot_be_taken_twice() {
    let registry = CacheRegistry::new();
    let first = make("dup");
    registry.register(&first).unwrap();
    let err = registry.register(&make("dup")).unwrap_err();
    assert!(matches!(err, CacheError::NameTaken(ref n) if n == "dup"));
    drop(first);
    registry.register(&make("dup")).unwrap();
}

#[test]
fn get_or_create_builds_once_while_alive() {
    let registry: CacheRegistry<String, String> = CacheRegistry::new();
    let mut built = 0;
    let a = registry.get_or_create("shared", |n| {
        built += 1;
        make(n)
    });
    let b = registry.get_or_create("shared", |n| {
        built += 1;
        make(n)
    });
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(built, 1);
    assert_eq!(a.name(), "shared");
    assert!(registry.unregister("shared"));
    assert!(registry.get("shared").is_none());
}

#[test]
fn builder_may_use_the_registry() {
    let registry: CacheRegistry<String, String> = CacheRegistry::new();
    let thumbs = registry.get_or_create("thumbs", |n| {
        assert!(registry.names().is_empty());
        assert!(registry.get(n).is_none());
        make(n)
    });
    assert_eq!(registry.names(), vec!["thumbs".to_string()]);

    // a cache registered while the builder runs wins over the built one
    let early = make("avatars");
    let got = registry.get_or_create("avatars", |n| {
        registry.register(&early).unwrap();
        make(n)
    });
    assert!(Arc::ptr_eq(&got, &early));
    assert_eq!(registry.names(), vec!["avatars".to_string(), "thumbs".to_string()]);
    drop(thumbs);
}
