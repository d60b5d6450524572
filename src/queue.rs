//! Bounded lock-free MPMC ring queue.
//!
//! The queue is an array of slots, each an `AtomicPtr<T>` that is either null
//! (empty) or owns one boxed item. Senders and receivers pick slots with
//! monotonic tickets:
//!
//! ```text
//! send:  ticket = send_ticket++   slot[ticket % cap]  CAS null -> item
//! recv:  ticket = recv_ticket++   slot[ticket % cap]  swap item -> null
//! ```
//!
//! A failed claim (the slot is still occupied, or already empty) just takes
//! the next ticket. Ownership of an item moves from sender to receiver in one
//! atomic step, so no slot is ever read or written by two threads at once.
//!
//! `len` is `sent - received`, where each counter is bumped after the claim
//! that it counts. Under concurrency it is an approximation, never a
//! snapshot.
//!
//! Ordering is ticket-ordered only: with several senders a later ticket can
//! land before an earlier one. A single sender paired with a single receiver
//! gets strict FIFO.
//!
//! # Example
//!
//! ```rust
//! use cmap::RingQueue;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let queue = Arc::new(RingQueue::with_capacity(4)?);
//!
//! let producer = {
//!     let queue = Arc::clone(&queue);
//!     thread::spawn(move || {
//!         for i in 0..100 {
//!             queue.send(i).unwrap();
//!         }
//!         queue.close();
//!     })
//! };
//!
//! let mut sum = 0;
//! while let Some(value) = queue.recv() {
//!     sum += value;
//! }
//! producer.join().unwrap();
//! assert_eq!(sum, 4950);
//! # Ok::<(), cmap::Error>(())
//! ```

use crate::error::Error;
use crossbeam_utils::{Backoff, CachePadded};
use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// How long a blocked sender or receiver sleeps once spinning is exhausted.
const PARK_INTERVAL: Duration = Duration::from_micros(100);

/// Error returned when a value could not be placed in a [`RingQueue`].
///
/// The rejected value is handed back.
pub enum SendError<T> {
    /// Every slot was occupied.
    Full(T),
    /// The queue was closed.
    Closed(T),
}

impl<T> SendError<T> {
    /// Take back the value that could not be sent.
    pub fn into_inner(self) -> T {
        match self {
            SendError::Full(value) | SendError::Closed(value) => value,
        }
    }

    /// Whether the send failed because the queue was full.
    pub fn is_full(&self) -> bool {
        matches!(self, SendError::Full(_))
    }

    /// Whether the send failed because the queue was closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, SendError::Closed(_))
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Full(_) => write!(f, "Full(..)"),
            SendError::Closed(_) => write!(f, "Closed(..)"),
        }
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Full(_) => write!(f, "sending on a full queue"),
            SendError::Closed(_) => write!(f, "sending on a closed queue"),
        }
    }
}

impl<T> std::error::Error for SendError<T> {}

/// A fixed-capacity, lock-free, multi-producer multi-consumer queue.
pub struct RingQueue<T> {
    slots: Box<[CachePadded<AtomicPtr<T>>]>,
    send_ticket: CachePadded<AtomicUsize>,
    recv_ticket: CachePadded<AtomicUsize>,
    sent: CachePadded<AtomicUsize>,
    received: CachePadded<AtomicUsize>,
    closed: AtomicBool,
    _marker: PhantomData<T>,
}

// Items only ever move between threads by value, one owner at a time.
unsafe impl<T: Send> Send for RingQueue<T> {}
unsafe impl<T: Send> Sync for RingQueue<T> {}

impl<T> RingQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub fn with_capacity(capacity: usize) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity);
        }
        Ok(Self::clamped(capacity))
    }

    /// Like `with_capacity`, but zero is bumped to one.
    pub(crate) fn clamped(capacity: usize) -> Self {
        let slots = (0..capacity.max(1))
            .map(|_| CachePadded::new(AtomicPtr::new(ptr::null_mut())))
            .collect();

        Self {
            slots,
            send_ticket: CachePadded::new(AtomicUsize::new(0)),
            recv_ticket: CachePadded::new(AtomicUsize::new(0)),
            sent: CachePadded::new(AtomicUsize::new(0)),
            received: CachePadded::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
            _marker: PhantomData,
        }
    }

    /// Maximum number of items the queue holds.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Approximate number of buffered items (`sent - received`).
    #[inline]
    pub fn len(&self) -> usize {
        let received = self.received.load(Ordering::Acquire);
        let sent = self.sent.load(Ordering::Acquire);
        sent.saturating_sub(received)
    }

    /// Whether no items appear to be buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every slot appears to be occupied.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Mark the queue closed.
    ///
    /// Buffered items stay receivable; [`recv`](Self::recv) returns `None`
    /// only once the queue is closed and drained. Blocked senders give up and
    /// get their value back.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::trace!(buffered = self.len(), "ring queue closed");
        }
    }

    /// Whether [`close`](Self::close) has been called.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Send without blocking.
    ///
    /// Fails with [`SendError::Full`] if the queue looks full or no free slot
    /// turned up within one lap of tickets.
    pub fn try_send(&self, value: T) -> Result<(), SendError<T>> {
        if self.is_closed() {
            return Err(SendError::Closed(value));
        }
        if self.is_full() {
            return Err(SendError::Full(value));
        }

        let item = Box::into_raw(Box::new(value));
        for _ in 0..self.capacity() {
            if self.claim_send(item) {
                return Ok(());
            }
        }
        // SAFETY: every claim failed, so `item` was never published.
        let value = unsafe { *Box::from_raw(item) };
        Err(SendError::Full(value))
    }

    /// Send, spinning (then sleeping) until a slot frees up.
    ///
    /// Fails with [`SendError::Closed`] if the queue is closed first.
    pub fn send(&self, value: T) -> Result<(), SendError<T>> {
        let item = Box::into_raw(Box::new(value));
        let backoff = Backoff::new();

        while !self.is_closed() {
            if !self.is_full() && self.claim_send(item) {
                return Ok(());
            }
            pause(&backoff);
        }
        // SAFETY: every claim failed, so `item` was never published.
        let value = unsafe { *Box::from_raw(item) };
        Err(SendError::Closed(value))
    }

    /// Receive without blocking.
    pub fn try_recv(&self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        for _ in 0..self.capacity() {
            if let Some(value) = self.claim_recv() {
                return Some(value);
            }
        }
        None
    }

    /// Receive, spinning (then sleeping) until an item arrives.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn recv(&self) -> Option<T> {
        let backoff = Backoff::new();
        loop {
            if !self.is_empty() {
                if let Some(value) = self.claim_recv() {
                    return Some(value);
                }
            } else if self.is_closed() {
                return None;
            }
            pause(&backoff);
        }
    }

    fn claim_send(&self, item: *mut T) -> bool {
        let ticket = self.send_ticket.fetch_add(1, Ordering::Relaxed);
        let slot = &self.slots[ticket % self.slots.len()];
        if slot
            .compare_exchange(ptr::null_mut(), item, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.sent.fetch_add(1, Ordering::AcqRel);
            true
        } else {
            false
        }
    }

    fn claim_recv(&self) -> Option<T> {
        let ticket = self.recv_ticket.fetch_add(1, Ordering::Relaxed);
        let slot = &self.slots[ticket % self.slots.len()];
        let item = slot.swap(ptr::null_mut(), Ordering::AcqRel);
        if item.is_null() {
            return None;
        }
        self.received.fetch_add(1, Ordering::AcqRel);
        // SAFETY: the swap made this thread the sole owner of `item`, which
        // came from `Box::into_raw` in a sender.
        Some(unsafe { *Box::from_raw(item) })
    }
}

#[inline]
fn pause(backoff: &Backoff) {
    if backoff.is_completed() {
        thread::sleep(PARK_INTERVAL);
    } else {
        backoff.snooze();
    }
}

impl<T> Drop for RingQueue<T> {
    fn drop(&mut self) {
        for slot in self.slots.iter_mut() {
            let item = *slot.get_mut();
            if !item.is_null() {
                // SAFETY: exclusive access; a non-null slot owns its box.
                drop(unsafe { Box::from_raw(item) });
            }
        }
    }
}

impl<T> fmt::Debug for RingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(
            RingQueue::<u32>::with_capacity(0).unwrap_err(),
            Error::InvalidCapacity
        );
    }

    #[test]
    fn test_basic_operations() {
        let queue = RingQueue::with_capacity(3).unwrap();

        assert!(queue.is_empty());
        assert_eq!(queue.try_recv(), None);

        queue.try_send(1).unwrap();
        queue.try_send(2).unwrap();
        queue.try_send(3).unwrap();
        assert_eq!(queue.len(), 3);
        assert!(queue.is_full());

        let err = queue.try_send(4).unwrap_err();
        assert!(err.is_full());
        assert_eq!(err.into_inner(), 4);

        assert_eq!(queue.try_recv(), Some(1));
        queue.try_send(4).unwrap();

        assert_eq!(queue.try_recv(), Some(2));
        assert_eq!(queue.try_recv(), Some(3));
        assert_eq!(queue.try_recv(), Some(4));
        assert_eq!(queue.try_recv(), None);
    }

    #[test]
    fn test_close_keeps_buffered_items() {
        let queue = RingQueue::with_capacity(2).unwrap();
        queue.send("a").unwrap();
        queue.close();

        assert!(queue.send("b").unwrap_err().is_closed());
        assert!(queue.try_send("b").unwrap_err().is_closed());
        assert_eq!(queue.recv(), Some("a"));
        assert_eq!(queue.recv(), None);
    }

    #[test]
    fn test_close_releases_blocked_sender() {
        let queue = Arc::new(RingQueue::with_capacity(1).unwrap());
        queue.send(0).unwrap();

        let sender = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.send(1))
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();

        let result = sender.join().unwrap();
        assert_eq!(result.unwrap_err().into_inner(), 1);
    }

    #[test]
    fn test_drop_frees_buffered_items() {
        let marker = Arc::new(());
        {
            let queue = RingQueue::with_capacity(4).unwrap();
            queue.send(Arc::clone(&marker)).unwrap();
            queue.send(Arc::clone(&marker)).unwrap();
            assert_eq!(Arc::strong_count(&marker), 3);
        }
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_spsc_is_fifo() {
        let queue = Arc::new(RingQueue::with_capacity(8).unwrap());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..10_000 {
                    queue.send(i).unwrap();
                }
                queue.close();
            })
        };

        let mut expected = 0;
        while let Some(value) = queue.recv() {
            assert_eq!(value, expected);
            expected += 1;
        }
        producer.join().unwrap();
        assert_eq!(expected, 10_000);
    }
}
