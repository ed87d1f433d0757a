//! Single-destination message endpoint.
//!
//! A [`Sink`] delivers every message it receives to one callback, either
//! synchronously on the writer's thread or through a FIFO queue drained by
//! [`Sink::iteration`] on the reader's thread.
//!
//! Locks are split by concern: the queue, the callback and the routing
//! identity each have their own mutex so a writer never waits on a callback
//! that is running on the reader thread.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use switchboard_types::Message;
use tracing::{debug, trace};

use crate::routing::{DEFAULT_ROUTING_CAPACITY, RoutingTable};
use crate::utils::lock;

/// Id matching every sink and every client.
pub const WILDCARD_ID: &str = "*";

/// Message handler. Returning `false` stops the current iteration.
pub type SinkCallback = Box<dyn FnMut(&Message) -> bool + Send>;

/// Delivery mode of a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    /// The callback runs inside `put` on the writer's thread.
    Synchronous,
    /// `put` enqueues; `iteration` runs the callback on the reader's thread.
    /// With a capacity, `put` blocks while the queue is full.
    Queued { capacity: Option<usize> },
}

pub struct Sink {
    mode: SinkMode,
    callback: Mutex<SinkCallback>,
    queue: Mutex<VecDeque<Message>>,
    not_empty: Condvar,
    not_full: Condvar,
    id: Mutex<Option<String>>,
    routes: Mutex<RoutingTable>,
    processed: AtomicUsize,
}

impl Sink {
    /// Create a synchronous (`sync == true`) or unbounded queued sink.
    pub fn new<F>(callback: F, sync: bool) -> Arc<Self>
    where
        F: FnMut(&Message) -> bool + Send + 'static,
    {
        let mode = if sync {
            SinkMode::Synchronous
        } else {
            SinkMode::Queued { capacity: None }
        };
        Self::with_mode(callback, mode, DEFAULT_ROUTING_CAPACITY)
    }

    pub fn synchronous<F>(callback: F) -> Arc<Self>
    where
        F: FnMut(&Message) -> bool + Send + 'static,
    {
        Self::new(callback, true)
    }

    pub fn queued<F>(callback: F) -> Arc<Self>
    where
        F: FnMut(&Message) -> bool + Send + 'static,
    {
        Self::new(callback, false)
    }

    /// Queued sink holding at most `capacity` messages.
    pub fn bounded<F>(callback: F, capacity: usize) -> Arc<Self>
    where
        F: FnMut(&Message) -> bool + Send + 'static,
    {
        Self::with_mode(
            callback,
            SinkMode::Queued {
                capacity: Some(capacity.max(1)),
            },
            DEFAULT_ROUTING_CAPACITY,
        )
    }

    pub fn with_mode<F>(callback: F, mode: SinkMode, routing_capacity: usize) -> Arc<Self>
    where
        F: FnMut(&Message) -> bool + Send + 'static,
    {
        Arc::new(Self {
            mode,
            callback: Mutex::new(Box::new(callback)),
            queue: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            id: Mutex::new(None),
            routes: Mutex::new(RoutingTable::new(routing_capacity)),
            processed: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn mode(&self) -> SinkMode {
        self.mode
    }

    #[must_use]
    pub fn is_sync(&self) -> bool {
        self.mode == SinkMode::Synchronous
    }

    /// Begin a write: a fresh message for the caller to fill and hand to
    /// [`Sink::put`].
    #[must_use]
    pub fn get(&self) -> Message {
        Message::default()
    }

    /// Complete a write.
    ///
    /// Synchronous sinks run the callback before returning and report its
    /// result. The callback must not write back into this same sink.
    /// Queued sinks always accept the message; a full bounded queue blocks
    /// the caller until the reader frees a slot.
    pub fn put(&self, msg: Message) -> bool {
        match self.mode {
            SinkMode::Synchronous => {
                let mut callback = lock(&self.callback);
                (*callback)(&msg)
            }
            SinkMode::Queued { capacity } => {
                let mut queue = lock(&self.queue);
                if let Some(capacity) = capacity {
                    while queue.len() >= capacity {
                        queue = self
                            .not_full
                            .wait(queue)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                }
                queue.push_back(msg);
                drop(queue);
                self.not_empty.notify_all();
                true
            }
        }
    }

    /// Enqueue without blocking. A full bounded queue hands the message
    /// back. Synchronous sinks run the callback and ignore its result.
    ///
    /// # Errors
    ///
    /// Returns the message when the queue has no free slot.
    pub fn try_put(&self, msg: Message) -> std::result::Result<(), Message> {
        let SinkMode::Queued { capacity } = self.mode else {
            self.put(msg);
            return Ok(());
        };

        let mut queue = lock(&self.queue);
        if capacity.is_some_and(|capacity| queue.len() >= capacity) {
            return Err(msg);
        }
        queue.push_back(msg);
        drop(queue);
        self.not_empty.notify_all();
        Ok(())
    }

    pub fn put_copy(&self, msg: &Message) -> bool {
        self.put(msg.clone())
    }

    /// Drain the messages queued at the time of the call, in FIFO order.
    ///
    /// Returns `false` when the generic quit command is reached (it is
    /// consumed without reaching the callback) or when the callback returns
    /// `false`. Messages behind the stop point stay queued. Synchronous sinks
    /// have nothing to drain and return `true`.
    pub fn iteration(&self) -> bool {
        if self.is_sync() {
            debug!("iteration() called on a synchronous sink, ignoring");
            return true;
        }

        let pending = lock(&self.queue).len();
        let mut processed = 0;
        let mut keep_going = true;

        for _ in 0..pending {
            let Some(msg) = self.pop() else {
                break;
            };

            if msg.is_quit() {
                trace!("Sink received quit command");
                keep_going = false;
                break;
            }

            processed += 1;
            let mut callback = lock(&self.callback);
            if !(*callback)(&msg) {
                keep_going = false;
                break;
            }
        }

        self.processed.store(processed, Ordering::Release);
        keep_going
    }

    fn pop(&self) -> Option<Message> {
        let msg = lock(&self.queue).pop_front();
        if msg.is_some() {
            self.not_full.notify_one();
        }
        msg
    }

    /// Number of messages handed to the callback by the last iteration.
    #[must_use]
    pub fn num(&self) -> usize {
        self.processed.load(Ordering::Acquire)
    }

    /// Block until a message is queued or `timeout` elapses. Returns whether
    /// a message is available.
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.is_sync() {
            debug!("wait() called on a synchronous sink, ignoring");
            return false;
        }

        let queue = lock(&self.queue);
        let (queue, _) = self
            .not_empty
            .wait_timeout_while(queue, timeout, |queue| queue.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        !queue.is_empty()
    }

    /// Messages waiting in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.queue).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every queued message.
    pub fn clear(&self) {
        let dropped = {
            let mut queue = lock(&self.queue);
            let dropped = queue.len();
            queue.clear();
            dropped
        };
        if dropped > 0 {
            trace!("Dropped {} queued messages", dropped);
            self.not_full.notify_all();
        }
    }

    pub fn set_id(&self, id: impl Into<String>) {
        *lock(&self.id) = Some(id.into());
    }

    #[must_use]
    pub fn id(&self) -> Option<String> {
        lock(&self.id).clone()
    }

    /// Remember a client id that flowed through this sink.
    pub fn add_route(&self, id: &str) {
        if let Some(evicted) = lock(&self.routes).touch(id) {
            trace!("Routing table full, evicted {}", evicted);
        }
    }

    /// Whether a message addressed to `id` belongs here: either side is the
    /// wildcard, the ids are equal, or `id` is in the routing table.
    #[must_use]
    pub fn has_id(&self, id: &str) -> bool {
        if id == WILDCARD_ID {
            return true;
        }

        if let Some(own) = lock(&self.id).as_deref()
            && (own == WILDCARD_ID || own == id)
        {
            return true;
        }

        lock(&self.routes).contains(id)
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("mode", &self.mode)
            .field("id", &self.id())
            .field("queued", &self.len())
            .finish_non_exhaustive()
    }
}
