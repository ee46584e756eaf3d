// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! A bounded, closable, multi-producer/single-consumer queue.
//!
//! Hardware callbacks run on threads owned by the vendor SDK and must never
//! block, so writers only ever try to enqueue: a full or closed channel causes
//! the event to be dropped and `send()` to return `false`.  Readers block with
//! an optional timeout, and closing the channel wakes every blocked reader
//! with [`ChannelError::Cancelled`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use parking_lot::Condvar;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel has been closed.
    #[error("Channel is closed")]
    Cancelled,
    /// Nothing arrived on the channel within the requested timeout.
    #[error("Read did not succeed within timeout due to empty channel")]
    Timeout,
}

struct Queue<T> {
    items: VecDeque<T>,
    closed: bool,
}

struct Shared<T> {
    queue: Mutex<Queue<T>>,
    not_empty: Condvar,
    depth: usize,
}

/// The channel itself.  Cloning yields another handle on the same queue.
pub struct EventChannel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for EventChannel<T> {
    fn clone(&self) -> Self {
        EventChannel {
            shared: self.shared.clone(),
        }
    }
}

impl<T> EventChannel<T> {
    /// Create a channel holding at most `depth` undelivered items.
    pub fn new(depth: usize) -> Self {
        EventChannel {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue {
                    items: VecDeque::with_capacity(depth),
                    closed: false,
                }),
                not_empty: Condvar::new(),
                depth,
            }),
        }
    }

    pub fn writer(&self) -> ChannelWriter<T> {
        ChannelWriter {
            shared: self.shared.clone(),
        }
    }

    pub fn reader(&self) -> ChannelReader<T> {
        ChannelReader {
            shared: self.shared.clone(),
        }
    }

    /// Close the channel, discarding anything still queued and waking all
    /// blocked readers.  Returns `false` if the channel was already closed.
    pub fn close(&self) -> bool {
        let mut queue = self.shared.queue.lock();
        if queue.closed {
            return false;
        }
        queue.closed = true;
        queue.items.clear();
        self.shared.not_empty.notify_all();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.shared.queue.lock().closed
    }
}

/// The producer side of an [`EventChannel`].
pub struct ChannelWriter<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ChannelWriter<T> {
    fn clone(&self) -> Self {
        ChannelWriter {
            shared: self.shared.clone(),
        }
    }
}

impl<T> ChannelWriter<T> {
    /// Enqueue `item` without blocking.  Returns `false`, dropping the item,
    /// if the channel is full or closed.
    pub fn send(&self, item: T) -> bool {
        let mut queue = self.shared.queue.lock();
        if queue.closed || queue.items.len() >= self.shared.depth {
            return false;
        }
        queue.items.push_back(item);
        self.shared.not_empty.notify_one();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.shared.queue.lock().closed
    }
}

/// The consumer side of an [`EventChannel`].
pub struct ChannelReader<T> {
    shared: Arc<Shared<T>>,
}

impl<T> ChannelReader<T> {
    /// Wait for the next item.  A `timeout` of `None` waits until an item
    /// arrives or the channel is closed.
    pub fn recv(&self, timeout: Option<Duration>) -> Result<T, ChannelError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut queue = self.shared.queue.lock();
        loop {
            if queue.closed {
                return Err(ChannelError::Cancelled);
            }
            if let Some(item) = queue.items.pop_front() {
                return Ok(item);
            }
            match deadline {
                None => self.shared.not_empty.wait(&mut queue),
                Some(deadline) => {
                    if self
                        .shared
                        .not_empty
                        .wait_until(&mut queue, deadline)
                        .timed_out()
                    {
                        if queue.closed {
                            return Err(ChannelError::Cancelled);
                        }
                        return queue
                            .items
                            .pop_front()
                            .ok_or(ChannelError::Timeout);
                    }
                }
            }
        }
    }

    /// Take the next item if one is already queued.
    pub fn try_recv(&self) -> Result<T, ChannelError> {
        let mut queue = self.shared.queue.lock();
        if queue.closed {
            return Err(ChannelError::Cancelled);
        }
        queue.items.pop_front().ok_or(ChannelError::Timeout)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.queue.lock().closed
    }
}
