use crate::config::Transport;
use crate::hash::KeyHasher;
use crate::queue::RingQueue;
use crate::shardmap::ShardedMap;
use crossbeam_channel::{Receiver, Sender};
use std::hash::Hash;
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Entry<K, V> = (K, Arc<V>);

/// Receiving side of a transport. Uses an enum to avoid boxing the two
/// interchangeable implementations.
enum Source<T> {
    Ring(Arc<RingQueue<T>>),
    Channel(Receiver<T>),
}

/// Sending side handed to each shard scanner.
enum Sink<T> {
    Ring(Arc<RingQueue<T>>),
    Channel(Sender<T>),
}

impl<T> Source<T> {
    fn recv(&self) -> Option<T> {
        match self {
            Source::Ring(queue) => queue.recv(),
            Source::Channel(rx) => rx.recv().ok(),
        }
    }

    /// The channel closes by itself once every scanner has dropped its sender.
    fn close(&self) {
        if let Source::Ring(queue) = self {
            queue.close();
        }
    }
}

impl<T> Sink<T> {
    fn send(&self, item: T) -> bool {
        match self {
            Sink::Ring(queue) => queue.send(item).is_ok(),
            Sink::Channel(tx) => tx.send(item).is_ok(),
        }
    }
}

struct Shared<T> {
    source: Source<T>,
    cancelled: AtomicBool,
    live_workers: AtomicUsize,
}

/// Decrements the live worker count when a background thread exits.
struct WorkerGuard<T>(Arc<Shared<T>>);

impl<T> WorkerGuard<T> {
    fn enter(shared: &Arc<Shared<T>>) -> Self {
        shared.live_workers.fetch_add(1, Ordering::AcqRel);
        WorkerGuard(Arc::clone(shared))
    }
}

impl<T> Drop for WorkerGuard<T> {
    fn drop(&mut self) {
        self.0.live_workers.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A stream of every entry in a [`ShardedMap`], fed by one scanner thread
/// per shard.
///
/// Scanners use the same snapshot discipline as
/// [`ShardedMap::for_each`], so no shard lock is held while an entry sits in
/// the transport and the map may be mutated while the stream is consumed.
/// Entries arrive in no particular order.
///
/// Dropping the stream cancels it and waits for the scanners to exit.
///
/// # Example
///
/// ```rust
/// use cmap::ShardedMap;
/// use std::sync::Arc;
///
/// let map = Arc::new(ShardedMap::new());
/// for i in 0..100u32 {
///     map.set(i, i * 2);
/// }
///
/// let total: u32 = Arc::clone(&map).iterate(8).map(|(_, v)| *v).sum();
/// assert_eq!(total, 9900);
/// ```
pub struct Stream<K, V> {
    shared: Arc<Shared<Entry<K, V>>>,
    coordinator: Option<JoinHandle<()>>,
    exhausted: bool,
}

/// Cancels a [`Stream`] from any thread.
pub struct CancelHandle<K, V> {
    shared: Arc<Shared<Entry<K, V>>>,
}

impl<K, V> Clone for CancelHandle<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> CancelHandle<K, V> {
    /// Stop the scanners and drain whatever they already queued.
    ///
    /// Draining is what lets a scanner blocked on a full queue make progress,
    /// see the cancellation and exit. Returns once the transport is closed
    /// and empty.
    pub fn cancel(&self) {
        let first = !self.shared.cancelled.swap(true, Ordering::AcqRel);

        let mut drained = 0usize;
        while self.shared.source.recv().is_some() {
            drained += 1;
        }
        if first {
            tracing::debug!(drained, "stream cancelled");
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// Number of background threads (scanners and coordinator) still running.
    pub fn live_workers(&self) -> usize {
        self.shared.live_workers.load(Ordering::Acquire)
    }
}

impl<K, V> Stream<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn spawn<S>(
        map: Arc<ShardedMap<K, V, S>>,
        transport: Transport,
        buffer: usize,
    ) -> Self
    where
        S: KeyHasher<K> + 'static,
    {
        let shard_count = map.num_shards();
        tracing::trace!(shard_count, ?transport, buffer, "starting stream");

        let (source, sink) = match transport {
            Transport::Ring => {
                let queue = Arc::new(RingQueue::clamped(buffer));
                (Source::Ring(Arc::clone(&queue)), Sink::Ring(queue))
            }
            Transport::Channel => {
                let (tx, rx) = crossbeam_channel::bounded(buffer);
                (Source::Channel(rx), Sink::Channel(tx))
            }
        };

        let shared = Arc::new(Shared {
            source,
            cancelled: AtomicBool::new(false),
            live_workers: AtomicUsize::new(0),
        });

        let mut scanners = Vec::with_capacity(shard_count);
        for index in 0..shard_count {
            let guard = WorkerGuard::enter(&shared);
            let map = Arc::clone(&map);
            let sink = match &sink {
                Sink::Ring(queue) => Sink::Ring(Arc::clone(queue)),
                Sink::Channel(tx) => Sink::Channel(tx.clone()),
            };
            scanners.push(thread::spawn(move || {
                let shared = &guard.0;
                let mut keys = Vec::new();
                map.shard(index).for_each(&mut keys, |key, value| {
                    if shared.cancelled.load(Ordering::Acquire) {
                        return false;
                    }
                    sink.send((key.clone(), Arc::clone(value)))
                });
                drop(sink);
            }));
        }
        // Scanners hold the only senders from here on.
        drop(sink);

        let guard = WorkerGuard::enter(&shared);
        let coordinator = thread::spawn(move || {
            for scanner in scanners {
                // A panicking scanner still counts as finished.
                let _ = scanner.join();
            }
            guard.0.source.close();
        });

        Self {
            shared,
            coordinator: Some(coordinator),
            exhausted: false,
        }
    }
}

impl<K, V> Stream<K, V> {
    /// A handle that can cancel this stream from another thread.
    pub fn cancel_handle(&self) -> CancelHandle<K, V> {
        CancelHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Cancel the stream and wait for every background thread to exit.
    pub fn cancel(self) {
        drop(self);
    }

    /// Number of background threads (scanners and coordinator) still running.
    pub fn live_workers(&self) -> usize {
        self.shared.live_workers.load(Ordering::Acquire)
    }
}

impl<K, V> Iterator for Stream<K, V> {
    type Item = (K, Arc<V>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let item = self.shared.source.recv();
        self.exhausted = item.is_none();
        item
    }
}

// `exhausted` latches, so `None` is final.
impl<K, V> FusedIterator for Stream<K, V> {}

impl<K, V> Drop for Stream<K, V> {
    fn drop(&mut self) {
        if !self.exhausted {
            self.cancel_handle().cancel();
        }
        if let Some(coordinator) = self.coordinator.take() {
            let _ = coordinator.join();
        }
    }
}
