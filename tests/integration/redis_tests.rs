//! Redis store integration tests.
//!
//! These need a running Redis server and are ignored by default:
//!
//! ```text
//! docker run --rm -p 6379:6379 redis:7
//! REDIS_URL=redis://127.0.0.1:6379/ cargo test -- --ignored
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use image_ladder::ladder::Label;
use image_ladder::store::{DerivativeStore, RedisStore};

use super::test_utils::{tagged_set, test_ladder};

fn store() -> RedisStore {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/".into());
    RedisStore::new(&url, 4).unwrap()
}

/// Identifier that does not collide across test runs.
fn unique_identifier(name: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("test-{}-{}-{}", name, std::process::id(), nanos)
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_ping() {
    store().ping().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_put_get_labels() {
    let store = store();
    let identifier = unique_identifier("cat");

    store.put(&identifier, &tagged_set("cat")).await.unwrap();

    assert_eq!(
        store.labels(&identifier).await.unwrap(),
        test_ladder().labels()
    );
    assert_eq!(
        store.get(&identifier, Label::Square(64)).await.unwrap(),
        Some(Bytes::from("cat-64"))
    );
    assert_eq!(
        store.get(&identifier, Label::Square(256)).await.unwrap(),
        Some(Bytes::from("cat-orig"))
    );
    assert_eq!(
        store.get(&identifier, Label::Square(512)).await.unwrap(),
        None
    );
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_put_replaces_record() {
    let store = store();
    let identifier = unique_identifier("dog");

    store.put(&identifier, &tagged_set("old")).await.unwrap();
    store.put(&identifier, &tagged_set("new")).await.unwrap();

    for label in test_ladder().labels() {
        let payload = store.get(&identifier, label).await.unwrap().unwrap();
        assert!(payload.starts_with(b"new-"), "{} kept an old payload", label);
    }
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_missing_record() {
    let store = store();
    let identifier = unique_identifier("missing");

    assert_eq!(store.get(&identifier, Label::Original).await.unwrap(), None);
    assert!(store.labels(&identifier).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_record_reads_every_field() {
    let store = store();
    let identifier = unique_identifier("bird");

    assert!(store.record(&identifier).await.unwrap().is_empty());

    store.put(&identifier, &tagged_set("bird")).await.unwrap();
    let record = store.record(&identifier).await.unwrap();

    assert_eq!(record.keys().copied().collect::<Vec<_>>(), test_ladder().labels());
    assert_eq!(record[&Label::Square(32)], Bytes::from("bird-32"));
    assert_eq!(record[&Label::Square(128)], record[&Label::Original]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires a running Redis server"]
async fn test_concurrent_reads_never_see_mixed_record() {
    let store = Arc::new(store());
    let identifier = unique_identifier("swap");
    store.put(&identifier, &tagged_set("a")).await.unwrap();

    let writer = {
        let store = Arc::clone(&store);
        let identifier = identifier.clone();
        tokio::spawn(async move {
            for round in 0..100 {
                let tag = if round % 2 == 0 { "b" } else { "a" };
                store.put(&identifier, &tagged_set(tag)).await.unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let store = Arc::clone(&store);
            let identifier = identifier.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    let record = store.record(&identifier).await.unwrap();
                    assert_eq!(
                        record.keys().copied().collect::<Vec<_>>(),
                        test_ladder().labels()
                    );

                    let tags: HashSet<&[u8]> = record
                        .values()
                        .map(|payload| &payload[..1])
                        .collect();
                    assert_eq!(tags.len(), 1, "mixed record: {:?}", record);
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
}
