//! Observer registry and broadcaster.
//!
//! The registry is the only owner of the observer set and of the delta history.
//! Both live behind one mutex so that recording a delta and choosing who gets it
//! live happen in the same critical section as a connect snapshotting the
//! backlog: an observer sees every delta exactly once, either in its backlog or
//! as a live update. Frames are queued outside that lock on per-observer bounded
//! queues, and each observer has a single writer draining its queue.
//!
//! Lifecycle: `connect` registers an observer as `Active`. `close` moves it to
//! `Closing`: it gets no further frames and its connection task is told to drop
//! the socket. `disconnect` removes it (`Closed`).

use crate::error::RegistryError;
use crate::ring_buffer::RingBuffer;
use crate::types::{DeltaMessage, WireMessage};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

/// A serialized wire message, shared by every observer it is sent to.
pub type Frame = Arc<str>;

/// Remote address plus a process-unique serial, so a reused address never
/// aliases an older connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObserverId {
    addr: String,
    serial: u64,
}

impl ObserverId {
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.addr, self.serial)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverState {
    Active,
    Closing,
    Closed,
}

/// Handed to the connection task: its id, the queue its writer drains (the
/// first frame is always the backlog) and a signal that fires when the
/// registry wants the connection dropped.
pub struct Subscription {
    pub id: ObserverId,
    pub frames: mpsc::Receiver<Frame>,
    pub closed: oneshot::Receiver<()>,
}

struct Observer {
    tx: mpsc::Sender<Frame>,
    state: ObserverState,
    close: Option<oneshot::Sender<()>>,
}

impl Observer {
    fn begin_close(&mut self) {
        self.state = ObserverState::Closing;
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
    }
}

struct Inner {
    observers: HashMap<ObserverId, Observer>,
    history: RingBuffer<DeltaMessage>,
}

#[derive(Clone)]
pub struct Registry {
    inner: Arc<Mutex<Inner>>,
    // held for a whole publish so concurrent callers cannot interleave
    publishing: Arc<Mutex<()>>,
    next_serial: Arc<AtomicU64>,
    interval_secs: u64,
    queue_depth: usize,
}

impl Registry {
    pub fn new(capacity: NonZeroUsize, interval_secs: u64, queue_depth: NonZeroUsize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                observers: HashMap::new(),
                history: RingBuffer::new(capacity),
            })),
            publishing: Arc::new(Mutex::new(())),
            next_serial: Arc::new(AtomicU64::new(1)),
            interval_secs,
            queue_depth: queue_depth.get(),
        }
    }

    /// Register an observer and queue its backlog ahead of any live update.
    pub fn connect(&self, addr: impl Into<String>) -> Result<Subscription, RegistryError> {
        let id = ObserverId {
            addr: addr.into(),
            serial: self.next_serial.fetch_add(1, Ordering::Relaxed),
        };
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let (close_tx, close_rx) = oneshot::channel();

        let mut inner = self.lock();
        let backlog = inner.history.values();
        let frame = encode(&WireMessage::Initial {
            data: &backlog,
            count: inner.history.capacity(),
            interval: self.interval_secs,
        })?;
        // fresh queue with room for at least one frame
        tx.try_send(frame).map_err(|_| RegistryError::Backlog)?;
        inner.observers.insert(
            id.clone(),
            Observer {
                tx,
                state: ObserverState::Active,
                close: Some(close_tx),
            },
        );
        let observers = inner.observers.len();
        drop(inner);

        info!(observer = %id, observers, backlog = backlog.len(), "observer connected");
        Ok(Subscription {
            id,
            frames: rx,
            closed: close_rx,
        })
    }

    /// Record `msg` in history and queue it for every active observer.
    /// Returns how many observers it was queued for. Concurrent calls are
    /// serialized, so every queue sees updates in history order.
    pub fn publish(&self, msg: DeltaMessage) -> usize {
        let _publishing = self
            .publishing
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let frame = encode(&WireMessage::Update { data: &msg });

        let targets: Vec<(ObserverId, mpsc::Sender<Frame>)> = {
            let mut inner = self.lock();
            inner.history.add(msg);
            inner
                .observers
                .iter()
                .filter(|(_, o)| o.state == ObserverState::Active)
                .map(|(id, o)| (id.clone(), o.tx.clone()))
                .collect()
        };

        let frame = match frame {
            Ok(f) => f,
            Err(e) => {
                warn!("update kept in history but not sent: {e}");
                return 0;
            }
        };

        let mut delivered = 0;
        for (id, tx) in targets {
            match tx.try_send(frame.clone()) {
                Ok(()) => {
                    trace!(observer = %id, "queued update");
                    delivered += 1;
                }
                Err(TrySendError::Full(_)) => {
                    // writer is stuck on the socket; its task removes it
                    warn!(observer = %id, "outbound queue full, closing observer");
                    self.close(&id);
                }
                Err(TrySendError::Closed(_)) => {
                    // nobody drains the queue any more
                    debug!(observer = %id, "outbound queue closed");
                    self.disconnect(&id);
                }
            }
        }
        delivered
    }

    /// Stop sending to an observer and signal its connection task to drop the
    /// socket. The observer stays `Closing` until `disconnect`. Returns false
    /// if it is unknown.
    pub fn close(&self, id: &ObserverId) -> bool {
        match self.lock().observers.get_mut(id) {
            Some(o) => {
                o.begin_close();
                true
            }
            None => false,
        }
    }

    /// Remove an observer, signalling its connection task if it had not been
    /// closed yet. Returns false if it was already gone.
    pub fn disconnect(&self, id: &ObserverId) -> bool {
        let (removed, observers) = {
            let mut inner = self.lock();
            let removed = inner.observers.remove(id);
            (removed, inner.observers.len())
        };
        match removed {
            Some(mut o) => {
                o.begin_close();
                info!(observer = %id, observers, "observer disconnected");
                true
            }
            None => false,
        }
    }

    pub fn state_of(&self, id: &ObserverId) -> ObserverState {
        self.lock()
            .observers
            .get(id)
            .map_or(ObserverState::Closed, |o| o.state)
    }

    pub fn len(&self) -> usize {
        self.lock().observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retained deltas, oldest first.
    pub fn history(&self) -> Vec<DeltaMessage> {
        self.lock().history.values()
    }

    pub fn capacity(&self) -> usize {
        self.lock().history.capacity()
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // no invariant spans a panic inside the lock, so keep going
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn encode(msg: &WireMessage<'_>) -> Result<Frame, RegistryError> {
    Ok(serde_json::to_string(msg)?.into())
}
