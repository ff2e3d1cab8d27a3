use fastslot::{PagePool, PagePoolOptions, PoolError, PoolStats};
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::thread;

fn small_pool(count: usize, size: usize) -> PagePool {
    PagePool::builder()
        .page_count(count)
        .page_size(size)
        .acquire_retries(2)
        .build()
        .unwrap()
}

#[test]
fn test_builder_defaults() {
    let pool = PagePool::builder().build().unwrap();
    assert_eq!(pool.name(), "pages");
    assert_eq!(pool.page_count(), 64);
    assert_eq!(pool.page_size(), 4096);
    assert_eq!(pool.free_pages(), 64);
    assert_eq!(pool.filled_pages(), 0);
}

#[test]
fn test_invalid_configuration() {
    let err = PagePool::builder().page_count(0).build().unwrap_err();
    assert!(matches!(err, PoolError::Configuration(_)));

    let err = PagePool::builder().page_size(0).build().unwrap_err();
    assert!(matches!(err, PoolError::Configuration(_)));
}

#[test]
fn test_with_options() {
    let options = PagePoolOptions {
        name: "wal".to_string(),
        page_count: 3,
        page_size: 32,
        ..Default::default()
    };
    let pool = PagePool::with_options(options).unwrap();
    assert_eq!(pool.name(), "wal");
    assert_eq!(pool.page_count(), 3);
    assert_eq!(pool.page_size(), 32);
}

#[test]
fn test_options_from_partial_config() {
    let options: PagePoolOptions = serde_json::from_str(r#"{"page_count": 3}"#).unwrap();
    assert_eq!(options.page_count, 3);
    assert_eq!(options.name, "pages");
    assert_eq!(options.page_size, 4096);
    assert_eq!(options.acquire_retries, 16);

    let pool = PagePool::with_options(options).unwrap();
    assert_eq!(pool.page_count(), 3);
    assert_eq!(pool.free_pages(), 3);
}

#[test]
fn test_options_serde_round_trip() {
    let options = PagePoolOptions {
        name: "trace".to_string(),
        page_count: 8,
        page_size: 256,
        acquire_retries: 2,
    };
    let json = serde_json::to_string(&options).unwrap();
    let back: PagePoolOptions = serde_json::from_str(&json).unwrap();
    assert_eq!(back, options);

    let empty: PagePoolOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(empty, PagePoolOptions::default());
}

#[test]
fn test_write_commit_read_cycle() {
    let pool = small_pool(2, 16);

    let mut page = pool.try_write().unwrap();
    assert_eq!(page.push(b"abc"), 3);
    assert_eq!(&*page, b"abc");
    page.commit();
    assert_eq!(pool.stats(), PoolStats { free: 1, filled: 1, in_flight: 0 });

    let reader = pool.try_read().unwrap();
    assert_eq!(&*reader, b"abc");
    assert_eq!(pool.stats(), PoolStats { free: 1, filled: 0, in_flight: 1 });
    drop(reader);

    assert_eq!(pool.stats(), PoolStats { free: 2, filled: 0, in_flight: 0 });
    assert!(pool.try_read().is_none());
}

#[test]
fn test_uncommitted_page_is_discarded() {
    let pool = small_pool(1, 16);
    {
        let mut page = pool.try_write().unwrap();
        page.push(b"lost");
        assert_eq!(pool.free_pages(), 0);
    }
    assert_eq!(pool.free_pages(), 1);
    assert_eq!(pool.filled_pages(), 0);
    assert!(pool.try_read().is_none());
}

#[test]
fn test_page_contents_are_reset_on_reuse() {
    let pool = small_pool(1, 16);

    let mut page = pool.try_write().unwrap();
    page.push(b"first");
    page.commit();
    drop(pool.try_read().unwrap());

    let page = pool.try_write().unwrap();
    assert!(page.is_empty());
    assert_eq!(page.remaining(), 16);
}

#[test]
fn test_push_truncates_at_page_size() {
    let pool = small_pool(1, 4);
    let mut page = pool.try_write().unwrap();

    assert_eq!(page.push(b"abcdef"), 4);
    assert_eq!(page.remaining(), 0);
    assert_eq!(page.push(b"g"), 0);
    assert_eq!(&*page, b"abcd");

    // io::Write reports the short write as an error from write_all.
    assert!(page.write_all(b"more").is_err());
}

#[test]
fn test_exhaustion() {
    let pool = small_pool(2, 8);
    let a = pool.try_write().unwrap();
    let b = pool.write().unwrap();
    assert_ne!(a.index(), b.index());

    assert!(pool.try_write().is_none());
    assert_eq!(pool.write().unwrap_err(), PoolError::Exhausted);

    drop(a);
    assert!(pool.write().is_ok());
}

#[test]
fn test_concurrent_producers_and_consumer() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 2_000;

    let pool = Arc::new(small_pool(8, 32));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let pool = pool.clone();
            thread::spawn(move || {
                let mut sent = 0;
                while sent < PER_PRODUCER {
                    if let Some(mut page) = pool.try_write() {
                        write!(page, "{}:{}", p, sent).unwrap();
                        page.commit();
                        sent += 1;
                    } else {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let consumer = {
        let pool = pool.clone();
        thread::spawn(move || {
            let mut seen = HashSet::new();
            while seen.len() < PRODUCERS * PER_PRODUCER {
                if let Some(page) = pool.try_read() {
                    let text = String::from_utf8(page.to_vec()).unwrap();
                    assert!(seen.insert(text.clone()), "message {} read twice", text);
                } else {
                    thread::yield_now();
                }
            }
            seen
        })
    };

    for producer in producers {
        producer.join().unwrap();
    }
    let seen = consumer.join().unwrap();

    assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
    assert!(seen.contains("3:1999"));
    assert_eq!(pool.stats(), PoolStats { free: 8, filled: 0, in_flight: 0 });
}
