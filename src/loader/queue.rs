// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Bounded single-producer/single-consumer work queue between the scheduler and
//! the loading thread.

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Error types for queue pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("request queue is full ({capacity} items)")]
    Full { capacity: usize },

    #[error("request queue is closed")]
    Closed,
}

/// Creates a queue with the given capacity, returning the producer and consumer ends.
pub fn request_queue<T>(capacity: usize) -> (RequestQueue<T>, QueueWaiter<T>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (
        RequestQueue {
            tx: Some(tx),
            rx: rx.clone(),
            capacity,
        },
        QueueWaiter { rx },
    )
}

/// The producer end. Pushing never blocks.
pub struct RequestQueue<T> {
    tx: Option<Sender<T>>,
    // Kept to observe the backlog; items are only ever taken by the waiter.
    rx: Receiver<T>,
    capacity: usize,
}

impl<T> RequestQueue<T> {
    /// Appends an item and wakes the consumer.
    ///
    /// The queue is sized to the request pool, so `Full` means the caller broke the
    /// capacity contract.
    pub fn push(&self, item: T) -> Result<(), QueueError> {
        let tx = self.tx.as_ref().ok_or(QueueError::Closed)?;
        tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full {
                capacity: self.capacity,
            },
            TrySendError::Disconnected(_) => QueueError::Closed,
        })
    }

    /// Closes the queue. The consumer drains what is left and then stops waiting.
    pub fn close(&mut self) {
        self.tx = None;
    }

    /// Returns true once the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// The number of items waiting to be consumed.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// The maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// The consumer end.
pub struct QueueWaiter<T> {
    rx: Receiver<T>,
}

impl<T> QueueWaiter<T> {
    /// Blocks until an item is available and returns the oldest one. Returns None
    /// once the queue is closed and empty.
    pub fn wait_and_pop(&self) -> Option<T> {
        self.rx.recv().ok()
    }
}
