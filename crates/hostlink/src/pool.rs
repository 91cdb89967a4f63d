//! # Reply Slot Pool
//!
//! A free list of single-value channels used by the synchronous wrappers to wait
//! for exactly one reply.
//!
//! Reuse is only sound because each borrowed slot receives exactly one value
//! before it goes back: [`SlotPool::take`] hands out a waiting [`Slot`] and the
//! channel's only [`SlotSender`], the sender is moved into a one-shot response
//! handler, and the borrower waits for the value. The value travels together
//! with the sender, so the drained [`EmptySlot`] that [`Slot::wait`] hands back
//! owns both ends again and is the only form that can be restored. A sender
//! dropped without filling disconnects the channel and the slot is discarded.

use std::sync::Mutex;
use std::sync::mpsc;

pub struct SlotPool<T> {
    free: Mutex<Vec<Channel<T>>>,
    capacity: usize,
}

struct Delivery<T> {
    value: T,
    tx: mpsc::SyncSender<Delivery<T>>,
}

struct Channel<T> {
    tx: mpsc::SyncSender<Delivery<T>>,
    rx: mpsc::Receiver<Delivery<T>>,
}

impl<T> Channel<T> {
    fn new() -> Self {
        let (tx, rx) = mpsc::sync_channel(1);
        Self { tx, rx }
    }
}

/// A borrowed slot waiting for its single value.
pub struct Slot<T> {
    rx: mpsc::Receiver<Delivery<T>>,
}

/// The write end of a borrowed slot. Consumed by the one send it may perform.
pub struct SlotSender<T> {
    tx: mpsc::SyncSender<Delivery<T>>,
}

/// A slot whose value has been taken; the only form that may be restored.
pub struct EmptySlot<T> {
    channel: Channel<T>,
}

impl<T> SlotPool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Borrows an idle slot, creating one if the free list is empty.
    pub fn take(&self) -> (Slot<T>, SlotSender<T>) {
        let reused = self.free.lock().unwrap_or_else(|e| e.into_inner()).pop();
        let Channel { tx, rx } = reused.unwrap_or_else(Channel::new);
        (Slot { rx }, SlotSender { tx })
    }

    /// Returns a drained slot to the free list.
    pub fn restore(&self, slot: EmptySlot<T>) {
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        if free.len() < self.capacity {
            free.push(slot.channel);
        }
    }

    /// Number of idle slots.
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl<T> Slot<T> {
    /// Blocks until the value arrives.
    ///
    /// Returns `None` if the sender was dropped without sending, in which case
    /// the slot is discarded rather than reused.
    pub fn wait(self) -> Option<(T, EmptySlot<T>)> {
        let Delivery { value, tx } = self.rx.recv().ok()?;
        let channel = Channel { tx, rx: self.rx };
        Some((value, EmptySlot { channel }))
    }
}

impl<T> SlotSender<T> {
    pub fn fill(self, value: T) {
        let tx = self.tx.clone();
        // capacity 1 and a single send per borrow: this never blocks
        if self.tx.try_send(Delivery { value, tx }).is_err() {
            tracing::warn!("reply slot is gone; dropping value");
        }
    }
}
