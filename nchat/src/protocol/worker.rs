//! The worker actor that serializes all work for one backend instance.
//!
//! # Architecture
//!
//! ```text
//! any thread ── send() ──▶ [unbounded queue] ──▶ worker thread ──▶ RequestHandler
//!                                                      │
//!                                                      └── Notifier ──▶ MessageHandler
//! ```
//!
//! `send` only enqueues, so producers never wait for backend work. The
//! worker thread pops requests in FIFO order and runs them one at a time;
//! notifications from one worker therefore reach the handler in the order
//! they were produced.
//!
//! Stopping drops the queue's sender. The thread finishes what is already
//! queued, sees the closed channel and exits; [`Worker::stop`] joins it.
//! There is no cancellation: a request that never returns blocks `stop`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use nchat_proto::request::RequestMessage;
use nchat_proto::service::{ServiceKind, ServiceMessage};

use super::MessageHandler;

/// Errors from starting, feeding or stopping a [`Worker`].
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// `start` was called on a worker that is not stopped.
    #[error("worker {0} is already running")]
    AlreadyRunning(String),

    /// The worker is not accepting requests.
    #[error("worker {0} is not running")]
    NotRunning(String),

    /// The OS refused to create the thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The backend panicked while handling a request.
    #[error("worker {name} panicked: {reason}")]
    Panicked {
        /// Worker name.
        name: String,
        /// Panic payload, if it was a string.
        reason: String,
    },
}

/// Lifecycle of a [`Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No thread exists.
    Stopped,
    /// The thread is pumping the queue.
    Running,
    /// Stop requested; the thread is finishing queued work.
    Draining,
}

/// Backend logic executed on the worker thread.
pub trait RequestHandler: Send + 'static {
    /// Execute one request.
    ///
    /// Every request with [`RequestMessage::expects_reply`] must produce
    /// exactly one matching notification through `notifier`, success or not.
    ///
    /// [`RequestMessage::DeferNotify`] is executed by the worker loop itself
    /// and never reaches a handler.
    fn handle(&mut self, request: RequestMessage, notifier: &Notifier);
}

/// Handle through which backend code emits notifications.
#[derive(Clone)]
pub struct Notifier {
    profile_id: String,
    handler: MessageHandler,
}

impl Notifier {
    /// Create a notifier stamping notifications with `profile_id`.
    pub fn new(profile_id: impl Into<String>, handler: MessageHandler) -> Self {
        Self {
            profile_id: profile_id.into(),
            handler,
        }
    }

    /// The profile this notifier reports for.
    #[must_use]
    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    /// Emit a notification for this profile.
    pub fn notify(&self, kind: ServiceKind) {
        self.forward(ServiceMessage::new(self.profile_id.clone(), kind));
    }

    /// Hand an already built notification to the handler unchanged.
    pub fn forward(&self, message: ServiceMessage) {
        tracing::trace!(
            profile_id = %message.profile_id,
            kind = message.kind.name(),
            "notify"
        );
        (self.handler)(message);
    }
}

struct Slot {
    state: WorkerState,
    tx: Option<mpsc::UnboundedSender<RequestMessage>>,
    thread: Option<JoinHandle<()>>,
}

/// One thread plus its FIFO request queue.
pub struct Worker {
    name: String,
    slot: Mutex<Slot>,
    queued: Arc<AtomicUsize>,
}

impl Worker {
    /// Create a stopped worker. `name` is used for the thread and for logs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot: Mutex::new(Slot {
                state: WorkerState::Stopped,
                tx: None,
                thread: None,
            }),
            queued: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Spawn the worker thread running `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::AlreadyRunning`] unless the worker is stopped,
    /// or [`WorkerError::Spawn`] if the thread cannot be created.
    pub fn start<H: RequestHandler>(
        &self,
        handler: H,
        notifier: Notifier,
    ) -> Result<(), WorkerError> {
        let mut slot = self.slot.lock();
        if slot.state != WorkerState::Stopped {
            return Err(WorkerError::AlreadyRunning(self.name.clone()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::clone(&self.queued);
        let name = self.name.clone();
        let thread = std::thread::Builder::new()
            .name(format!("worker-{}", self.name))
            .spawn(move || run(&name, handler, rx, &notifier, &queued))?;

        slot.tx = Some(tx);
        slot.thread = Some(thread);
        slot.state = WorkerState::Running;
        tracing::info!(worker = %self.name, "worker started");
        Ok(())
    }

    /// Append a request to the back of the queue.
    ///
    /// Only holds the slot lock for the push; never waits for backend work.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::NotRunning`] if the worker is stopped, draining
    /// or its thread has died.
    pub fn send(&self, request: RequestMessage) -> Result<(), WorkerError> {
        let slot = self.slot.lock();
        let Some(tx) = slot.tx.as_ref() else {
            return Err(WorkerError::NotRunning(self.name.clone()));
        };
        self.queued.fetch_add(1, Ordering::SeqCst);
        if tx.send(request).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(WorkerError::NotRunning(self.name.clone()));
        }
        Ok(())
    }

    /// Stop accepting requests, let the thread drain the queue, and join it.
    ///
    /// Stopping a stopped worker is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Panicked`] if the handler panicked.
    pub fn stop(&self) -> Result<(), WorkerError> {
        // The slot lock must not be held across the join: code running on the
        // worker thread may call `send` on this worker.
        let thread = {
            let mut slot = self.slot.lock();
            if slot.state == WorkerState::Stopped {
                return Ok(());
            }
            slot.tx = None;
            slot.state = WorkerState::Draining;
            slot.thread.take()
        };

        let joined = thread.map_or(Ok(()), JoinHandle::join);
        // A panicked thread drops its receiver with requests still in it.
        self.queued.store(0, Ordering::SeqCst);
        self.slot.lock().state = WorkerState::Stopped;

        match joined {
            Ok(()) => {
                tracing::info!(worker = %self.name, "worker stopped");
                Ok(())
            }
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(worker = %self.name, %reason, "worker panicked");
                Err(WorkerError::Panicked {
                    name: self.name.clone(),
                    reason,
                })
            }
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.slot.lock().state
    }

    /// Number of requests submitted but not yet dequeued.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(worker = %self.name, error = %e, "worker stop on drop failed");
        }
    }
}

fn run<H: RequestHandler>(
    name: &str,
    mut handler: H,
    mut rx: mpsc::UnboundedReceiver<RequestMessage>,
    notifier: &Notifier,
    queued: &AtomicUsize,
) {
    tracing::debug!(worker = %name, "worker loop entered");
    while let Some(request) = rx.blocking_recv() {
        queued.fetch_sub(1, Ordering::SeqCst);
        match request {
            RequestMessage::DeferNotify(message) => notifier.forward(*message),
            request => {
                tracing::debug!(worker = %name, request = request.name(), "handling request");
                handler.handle(request, notifier);
            }
        }
    }
    tracing::debug!(worker = %name, "worker queue closed");
}
