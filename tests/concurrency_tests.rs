use cmap::ShardedMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_concurrent_disjoint_writers() {
    let map = Arc::new(ShardedMap::new());
    let mut handles = vec![];

    // 100 threads, each owning 1000 keys
    for thread_id in 0..100 {
        let map = Arc::clone(&map);
        let handle = thread::spawn(move || {
            for i in 0..1000 {
                let key = format!("thread_{}_key_{}", thread_id, i);
                map.set(key.clone(), i);
                assert_eq!(map.get(&key).as_deref(), Some(&i));
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(map.len(), 100_000);
}

#[test]
fn test_concurrent_reads() {
    let map = Arc::new(ShardedMap::new());

    for i in 0..100 {
        map.set(format!("key_{}", i), i);
    }

    let mut handles = vec![];

    // Spawn 20 threads, each reading all items
    for _ in 0..20 {
        let map = Arc::clone(&map);
        let handle = thread::spawn(move || {
            for i in 0..100 {
                let key = format!("key_{}", i);
                let value = map.get(&key).unwrap();
                assert_eq!(*value, i);
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_update_has_no_lost_increments() {
    let map: Arc<ShardedMap<String, u64>> = Arc::new(ShardedMap::new());
    let barrier = Arc::new(Barrier::new(1000));
    let mut handles = vec![];

    // 1000 tasks, one increment each, all released together
    for _ in 0..1000 {
        let map = Arc::clone(&map);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            map.update("counter".to_string(), |v| v.copied().unwrap_or(0) + 1);
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(*map.get(&"counter".to_string()).unwrap(), 1000);
}

#[test]
fn test_set_if_absent_single_winner() {
    let map: Arc<ShardedMap<&str, usize>> = Arc::new(ShardedMap::new());
    let winners = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for thread_id in 0..16 {
        let map = Arc::clone(&map);
        let winners = Arc::clone(&winners);
        handles.push(thread::spawn(move || {
            if map.set_if_absent("leader", thread_id) {
                winners.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(winners.load(Ordering::Relaxed), 1);
    assert!(map.get(&"leader").is_some());
}

#[test]
fn test_concurrent_mixed_operations() {
    let map = Arc::new(ShardedMap::new());
    let mut handles = vec![];

    // Spawn writers
    for thread_id in 0..5 {
        let map = Arc::clone(&map);
        let handle = thread::spawn(move || {
            for i in 0..100 {
                let key = format!("key_{}_{}", thread_id, i);
                map.set(key.clone(), i);
                map.swap(key, i + 1);
            }
        });
        handles.push(handle);
    }

    // Spawn readers and iterators
    for _ in 0..5 {
        let map = Arc::clone(&map);
        let handle = thread::spawn(move || {
            for _ in 0..100 {
                for i in 0..10 {
                    let key = format!("key_{}_{}", i % 5, i);
                    map.get(&key); // May or may not exist, that's ok
                }
                map.for_each(|_, _| true);
                let _ = map.keys();
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(map.len(), 500);
}

#[test]
fn test_for_each_concurrent_with_writers() {
    let map = Arc::new(ShardedMap::with_shard_count(8).unwrap());
    for i in 0..1000u32 {
        map.set(i, i);
    }

    let writer = {
        let map = Arc::clone(&map);
        thread::spawn(move || {
            for i in 0..1000u32 {
                if i % 2 == 0 {
                    map.delete(&i);
                } else {
                    map.set(i + 1000, i);
                }
            }
        })
    };

    // Whatever is visited must be a value that was really stored
    map.for_each(|k, v| {
        assert!(*k == *v || *k == *v + 1000);
        true
    });

    writer.join().unwrap();
    assert_eq!(map.len(), 1000);
}
