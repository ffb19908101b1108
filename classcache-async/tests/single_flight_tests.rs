//! Integration tests for request coalescing

use classcache_async::{CacheGetStatus, CacheLayer, MutationContext, MutationKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn settle<V, E>(cache: &CacheLayer<V, E>)
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    while cache.in_flight() > 0 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_trigger_one_fetch() {
    let cache = Arc::new(CacheLayer::<Vec<u64>, String>::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let readers: Vec<_> = (0..16)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .read("class_students_5", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(vec![11, 12, 13])
                    })
                    .await
            })
        })
        .collect();

    for reader in readers {
        assert_eq!(reader.await.unwrap(), Ok(vec![11, 12, 13]));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    settle(&cache).await;
    assert_eq!(cache.peek("class_students_5"), Some(vec![11, 12, 13]));
}

#[tokio::test]
async fn test_waiters_share_the_failure() {
    init_tracing();
    let cache = CacheLayer::<u64, String>::new();
    let calls = AtomicUsize::new(0);
    let (release, gate) = oneshot::channel::<()>();

    let first = cache.read_with_status("user_4", || {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            let _ = gate.await;
            Err("503 Service Unavailable".to_string())
        }
    });
    let second = cache.read_with_status("user_4", || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok(4) }
    });
    let releaser = async {
        tokio::task::yield_now().await;
        let _ = release.send(());
    };

    let ((a, a_status), (b, b_status), ()) = tokio::join!(first, second, releaser);
    assert_eq!(a, Err("503 Service Unavailable".to_string()));
    assert_eq!(b, Err("503 Service Unavailable".to_string()));
    assert_eq!(a_status, CacheGetStatus::Miss);
    assert_eq!(b_status, CacheGetStatus::MissAlreadyLoading);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    settle(&cache).await;
    assert_eq!(cache.peek("user_4"), None);

    // The failure was not cached, the next read fetches again
    let retried = cache.read("user_4", || async { Ok(4) }).await;
    assert_eq!(retried, Ok(4));
}

#[tokio::test]
async fn test_fetch_completes_after_caller_is_dropped() {
    let cache = Arc::new(CacheLayer::<String, String>::new());
    let (release, gate) = oneshot::channel::<()>();

    let reader = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            cache
                .read("class_1", || async move {
                    let _ = gate.await;
                    Ok("Physics".to_string())
                })
                .await
        })
    };

    while cache.in_flight() == 0 {
        tokio::task::yield_now().await;
    }
    reader.abort();
    assert!(reader.await.unwrap_err().is_cancelled());

    release.send(()).unwrap();
    settle(&cache).await;
    assert_eq!(cache.peek("class_1"), Some("Physics".to_string()));
}

#[tokio::test]
async fn test_invalidation_during_fetch_is_not_overwritten() {
    init_tracing();
    let cache = Arc::new(CacheLayer::<Vec<u64>, String>::new());
    let (release, gate) = oneshot::channel::<()>();

    let reader = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            cache
                .read("class_sessions_5", || async move {
                    let _ = gate.await;
                    // Session list as it was before the write below
                    Ok(vec![1, 2])
                })
                .await
        })
    };

    while cache.in_flight() == 0 {
        tokio::task::yield_now().await;
    }

    let created: Result<u64, String> = cache
        .write(
            MutationKind::CreateSession,
            MutationContext::new().class(5),
            async { Ok(3) },
        )
        .await;
    assert_eq!(created, Ok(3));

    release.send(()).unwrap();
    assert_eq!(reader.await.unwrap(), Ok(vec![1, 2]));

    settle(&cache).await;
    assert_eq!(cache.peek("class_sessions_5"), None);

    let fresh = cache
        .read("class_sessions_5", || async { Ok(vec![1, 2, 3]) })
        .await;
    assert_eq!(fresh, Ok(vec![1, 2, 3]));
}

#[tokio::test]
async fn test_read_after_write_does_not_join_older_fetch() {
    init_tracing();
    let cache = Arc::new(CacheLayer::<Vec<u64>, String>::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let (release, gate) = oneshot::channel::<()>();

    let reader = {
        let cache = Arc::clone(&cache);
        let calls = Arc::clone(&calls);
        tokio::spawn(async move {
            cache
                .read_with_status("class_sessions_5", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let _ = gate.await;
                    // Session list as it was before the write below
                    Ok(vec![1, 2])
                })
                .await
        })
    };

    while cache.in_flight() == 0 {
        tokio::task::yield_now().await;
    }

    let created: Result<u64, String> = cache
        .write(
            MutationKind::CreateSession,
            MutationContext::new().class(5),
            async { Ok(3) },
        )
        .await;
    assert_eq!(created, Ok(3));

    // The older fetch is still pending, but a read issued after the write
    // must see the new session
    let (after_write, status) = {
        let calls = Arc::clone(&calls);
        cache
            .read_with_status("class_sessions_5", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![1, 2, 3])
            })
            .await
    };
    assert_eq!(after_write, Ok(vec![1, 2, 3]));
    assert_eq!(status, CacheGetStatus::Miss);

    release.send(()).unwrap();
    let (before_write, status) = reader.await.unwrap();
    assert_eq!(before_write, Ok(vec![1, 2]));
    assert_eq!(status, CacheGetStatus::Miss);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    settle(&cache).await;
    assert_eq!(cache.peek("class_sessions_5"), Some(vec![1, 2, 3]));
}

#[tokio::test]
async fn test_distinct_keys_fetch_independently() {
    let cache = CacheLayer::<u64, String>::new();
    let calls = AtomicUsize::new(0);

    let (a, b) = tokio::join!(
        cache.read("user_1", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(1) }
        }),
        cache.read("user_2", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(2) }
        }),
    );

    assert_eq!((a, b), (Ok(1), Ok(2)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[cfg(feature = "stats")]
#[tokio::test]
async fn test_stats_count_coalesced_reads() {
    let cache = CacheLayer::<u64, String>::new();
    let (release, gate) = oneshot::channel::<()>();

    let first = cache.read("users", || async move {
        let _ = gate.await;
        Ok(1)
    });
    let second = cache.read("users", || async { Ok(2) });
    let releaser = async {
        tokio::task::yield_now().await;
        let _ = release.send(());
    };
    let _ = tokio::join!(first, second, releaser);
    settle(&cache).await;
    let _ = cache.read("users", || async { Ok(3) }).await;

    let stats = cache.stats();
    assert_eq!(stats.misses(), 1);
    assert_eq!(stats.coalesced(), 1);
    assert_eq!(stats.hits(), 1);
    assert_eq!(stats.fetches_saved(), 2);
}
