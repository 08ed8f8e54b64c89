//! Bounded multi-producer mailbox feeding one event loop
//!
//! Capacity is enforced by a lock-free `ArrayQueue`: a non-blocking push
//! either takes a slot or hands the item back. Blocking producers wait on
//! a condvar that the loop signals after every pop and that `close()`
//! broadcasts. The loop itself sleeps on a `LoopParking`, unparked by
//! every successful push.
//!
//! Slots are released when the loop pops an item, i.e. right before it
//! executes it. An item is therefore counted against capacity for as
//! long as it is waiting.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use shardloop_core::PostError;

use crate::parking::{new_parking, LoopParking};

pub(crate) struct Mailbox<T> {
    queue: ArrayQueue<T>,
    closed: AtomicBool,
    /// Producers blocked in `push_blocking`
    waiters: AtomicUsize,
    space: Mutex<()>,
    space_available: Condvar,
    parking: Box<dyn LoopParking>,
}

impl<T: Send> Mailbox<T> {
    /// `capacity` must be non-zero; callers validate first.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            closed: AtomicBool::new(false),
            waiters: AtomicUsize::new(0),
            space: Mutex::new(()),
            space_available: Condvar::new(),
            parking: new_parking(),
        }
    }

    /// Enqueue without blocking. Full and closed both hand the item back.
    pub(crate) fn try_push(&self, item: T) -> Result<(), PostError<T>> {
        if self.is_closed() {
            return Err(PostError::closed(item));
        }
        self.queue.push(item).map_err(PostError::full)?;
        self.parking.unpark();
        Ok(())
    }

    /// Enqueue, waiting for a free slot. Fails only once the mailbox is
    /// closed, with a `Shutdown` code.
    pub(crate) fn push_blocking(&self, item: T) -> Result<(), PostError<T>> {
        let mut item = item;
        self.waiters.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.space.lock().unwrap_or_else(PoisonError::into_inner);
        let result = loop {
            if self.is_closed() {
                break Err(PostError::shutdown(item));
            }
            match self.queue.push(item) {
                Ok(()) => break Ok(()),
                Err(back) => item = back,
            }
            guard = self.space_available.wait(guard).unwrap_or_else(PoisonError::into_inner);
        };
        drop(guard);
        self.waiters.fetch_sub(1, Ordering::SeqCst);

        if result.is_ok() {
            self.parking.unpark();
        }
        result
    }

    /// Take the oldest item and release its slot to one blocked producer
    pub(crate) fn pop(&self) -> Option<T> {
        let item = self.queue.pop()?;
        if self.waiters.load(Ordering::SeqCst) > 0 {
            // Taking the lock orders this notify after the waiter's
            // failed push.
            let _guard = self.space.lock().unwrap_or_else(PoisonError::into_inner);
            self.space_available.notify_one();
        }
        Some(item)
    }

    /// Refuse further pushes, fail blocked producers and wake the loop.
    /// Items already queued stay until popped or drained.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        {
            let _guard = self.space.lock().unwrap_or_else(PoisonError::into_inner);
            self.space_available.notify_all();
        }
        self.parking.unpark();
    }

    /// Drop everything still queued. Returns how many items were dropped.
    pub(crate) fn drain(&self) -> usize {
        let mut dropped = 0;
        while self.queue.pop().is_some() {
            dropped += 1;
        }
        dropped
    }

    /// Sleep the loop thread until a push, `close()`, or `timeout`
    pub(crate) fn park(&self, timeout: Option<Duration>) -> bool {
        self.parking.park(timeout)
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    #[inline]
    pub(crate) fn blocked_producers(&self) -> usize {
        self.waiters.load(Ordering::Relaxed)
    }
}
