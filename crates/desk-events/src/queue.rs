//! Command Queue
//!
//! Durable FIFO shared by every context that opens the same store. The
//! producer context enqueues; the consumer context polls and drains, fanning
//! each drained command out to its `on_any` listeners.
//!
//! # Atomicity
//!
//! Every mutation is one [`PersistentStore::update`](desk_store::PersistentStore::update)
//! of the whole snapshot, additionally serialized inside the process by a
//! read-modify-write lock. An empty queue is never rewritten.
//!
//! # Corruption
//!
//! An unparsable snapshot is treated as empty and replaced by a fresh one on
//! the next mutation. The id counter of the fresh snapshot starts at the
//! current wall-clock millisecond so new ids stay above any id handed out
//! before the corruption.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use desk_store::{wallclock_ms, SharedStore};
use serde_json::json;

use crate::command::{Command, NewCommand, QueueSnapshot};
use crate::config::EventingConfig;
use crate::dispatcher::ActionDispatcher;
use crate::error::EventsError;
use crate::poller::Poller;
use crate::slot::{Decoded, JsonSlot};
use crate::subscribers::{SubscriberList, Subscription};

/// Handle to the command queue. Cheap to clone; clones share one queue and
/// one poller.
#[derive(Clone)]
pub struct CommandQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    slot: JsonSlot<QueueSnapshot>,
    /// One read-modify-write at a time within this process
    rmw_lock: Mutex<()>,
    /// Held for a whole drain; contended drains are skipped
    drain_lock: Mutex<()>,
    enqueue_subs: SubscriberList<Command>,
    drain_subs: SubscriberList<Command>,
    /// Where corruption is reported as an ERROR action
    reporter: Option<ActionDispatcher>,
    backlog_threshold: usize,
    backlog_warned: AtomicBool,
    drain_fault_reported: AtomicBool,
    poller: Mutex<Option<Poller>>,
    default_interval: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl QueueInner {
    /// Current snapshot for a mutation, resetting corrupt data.
    fn snapshot_for_write(
        current: Decoded<QueueSnapshot>,
        corrupt: &mut Option<serde_json::Error>,
    ) -> (QueueSnapshot, bool) {
        match current {
            Decoded::Missing => (QueueSnapshot::new(0), false),
            Decoded::Value(snapshot) => (snapshot, false),
            Decoded::Corrupt(err) => {
                *corrupt = Some(err);
                (QueueSnapshot::new(wallclock_ms()), true)
            }
        }
    }

    /// Read-only view; corrupt data reads as empty and is left for the next
    /// mutation to reset.
    fn read_snapshot(&self) -> Result<QueueSnapshot, EventsError> {
        match self.slot.read() {
            Ok(Some(snapshot)) => Ok(snapshot),
            Ok(None) => Ok(QueueSnapshot::new(0)),
            Err(err) if err.is_serialization() => {
                tracing::debug!(error = %err, "[queue] corrupt snapshot read as empty");
                Ok(QueueSnapshot::new(0))
            }
            Err(err) => Err(err),
        }
    }

    fn report_corrupt(&self, source: serde_json::Error) {
        let err = EventsError::Corrupt {
            key: self.slot.key().to_string(),
            source,
        };
        tracing::warn!(error = %err, "[queue] stored queue was corrupt; reset to empty");
        if let Some(reporter) = &self.reporter {
            reporter.error(
                "command_queue_corrupt",
                json!({ "key": self.slot.key(), "error": err.to_string() }),
            );
        }
    }

    /// Track the backlog threshold crossing for `len`.
    fn observe_backlog(&self, len: usize) {
        if len >= self.backlog_threshold {
            if !self.backlog_warned.swap(true, Ordering::SeqCst) {
                tracing::warn!(
                    pending = len,
                    threshold = self.backlog_threshold,
                    "[queue] backlog threshold reached; is a consumer polling?"
                );
            }
        } else {
            self.backlog_warned.store(false, Ordering::SeqCst);
        }
    }
}

impl CommandQueue {
    /// Queue over `store` without a corruption reporter.
    pub fn new(store: SharedStore, config: &EventingConfig) -> Self {
        Self::build(store, config, None)
    }

    /// Queue that records corruption as ERROR actions on `dispatcher`.
    pub fn with_reporter(store: SharedStore, config: &EventingConfig, dispatcher: ActionDispatcher) -> Self {
        Self::build(store, config, Some(dispatcher))
    }

    fn build(store: SharedStore, config: &EventingConfig, reporter: Option<ActionDispatcher>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                slot: JsonSlot::with_decoder(store, config.command_queue_key.clone(), QueueSnapshot::decode),
                rmw_lock: Mutex::new(()),
                drain_lock: Mutex::new(()),
                enqueue_subs: SubscriberList::new("queue"),
                drain_subs: SubscriberList::new("queue"),
                reporter,
                backlog_threshold: config.backlog_warn_threshold.max(1),
                backlog_warned: AtomicBool::new(false),
                drain_fault_reported: AtomicBool::new(false),
                poller: Mutex::new(None),
                default_interval: config.poll_interval(),
            }),
        }
    }

    // =========================================================================
    // Producer side
    // =========================================================================

    /// Append a command to the durable queue.
    ///
    /// Assigns `id` and `enqueued_at` (never earlier than the current tail),
    /// then notifies `on_enqueue` listeners.
    ///
    /// # Errors
    /// Store failures are returned: a command that was not persisted was not
    /// sent.
    pub fn enqueue(&self, new: NewCommand) -> Result<Command, EventsError> {
        let mut corrupt = None;
        let result = {
            let _rmw = lock(&self.inner.rmw_lock);
            self.inner.slot.update(|current| {
                let (mut snapshot, _) = QueueInner::snapshot_for_write(current, &mut corrupt);
                let now = wallclock_ms();
                let enqueued_at = snapshot
                    .commands
                    .back()
                    .map_or(now, |tail| now.max(tail.enqueued_at));
                let command = Command {
                    id: snapshot.next_id,
                    kind: new.kind,
                    payload: new.payload.clone(),
                    source: new.source.clone(),
                    enqueued_at,
                };
                snapshot.next_id += 1;
                snapshot.commands.push_back(command.clone());
                let len = snapshot.commands.len();
                (Some(snapshot), (command, len))
            })
        };

        if let Some(source) = corrupt {
            self.inner.report_corrupt(source);
        }
        let (command, len) = result?;

        tracing::debug!(
            id = command.id,
            kind = %command.kind,
            source = %command.source,
            pending = len,
            "[queue] enqueued"
        );
        self.inner.observe_backlog(len);
        self.inner.enqueue_subs.notify(&command);
        Ok(command)
    }

    /// Listen for commands this handle enqueues (producer-side feedback).
    pub fn on_enqueue(&self, callback: impl Fn(&Command) + Send + Sync + 'static) -> Subscription {
        self.inner.enqueue_subs.add(callback)
    }

    // =========================================================================
    // Consumer side
    // =========================================================================

    /// Remove and return the head command.
    ///
    /// An empty (or missing) queue returns `None` without writing.
    pub fn dequeue(&self) -> Result<Option<Command>, EventsError> {
        let mut corrupt = None;
        let result = {
            let _rmw = lock(&self.inner.rmw_lock);
            self.inner.slot.update(|current| {
                if matches!(current, Decoded::Missing) {
                    return (None, (None, 0));
                }
                let (mut snapshot, reset) = QueueInner::snapshot_for_write(current, &mut corrupt);
                match snapshot.commands.pop_front() {
                    Some(head) => {
                        let remaining = snapshot.commands.len();
                        (Some(snapshot), (Some(head), remaining))
                    }
                    None if reset => (Some(snapshot), (None, 0)),
                    None => (None, (None, 0)),
                }
            })
        };

        if let Some(source) = corrupt {
            self.inner.report_corrupt(source);
        }
        let (head, remaining) = result?;
        if let Some(command) = &head {
            tracing::debug!(id = command.id, kind = %command.kind, remaining, "[queue] dequeued");
            self.inner.observe_backlog(remaining);
        }
        Ok(head)
    }

    /// Listen for every command drained by this handle.
    pub fn on_any(&self, callback: impl Fn(&Command) + Send + Sync + 'static) -> Subscription {
        self.inner.drain_subs.add(callback)
    }

    /// Dequeue until empty, delivering each command to `on_any` listeners.
    ///
    /// Returns the number of commands drained. A drain already running on
    /// this queue (another thread, or a listener calling back in) makes this
    /// call return 0. Store errors end the drain and are logged, never
    /// returned.
    pub fn drain(&self) -> usize {
        let _drain = match self.inner.drain_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return 0,
        };

        let mut drained = 0;
        loop {
            match self.dequeue() {
                Ok(Some(command)) => {
                    drained += 1;
                    self.inner.drain_subs.notify(&command);
                }
                Ok(None) => {
                    self.inner.drain_fault_reported.store(false, Ordering::SeqCst);
                    break;
                }
                Err(err) => {
                    if !self.inner.drain_fault_reported.swap(true, Ordering::SeqCst) {
                        tracing::error!(error = %err, "[queue] drain stopped on store error");
                    }
                    break;
                }
            }
        }
        if drained > 0 {
            tracing::debug!(drained, "[queue] drain complete");
        }
        drained
    }

    // =========================================================================
    // Polling
    // =========================================================================

    /// Start draining every `interval` on the current tokio runtime.
    ///
    /// Returns `Ok(false)` if a poller is already running (its interval is
    /// kept).
    ///
    /// # Errors
    /// `EventsError::NoRuntime` outside a tokio runtime.
    pub fn start_polling(&self, interval: Duration) -> Result<bool, EventsError> {
        let mut poller = lock(&self.inner.poller);
        if poller.is_some() {
            return Ok(false);
        }

        let weak = Arc::downgrade(&self.inner);
        let started = Poller::spawn(interval, move || match weak.upgrade() {
            Some(inner) => {
                CommandQueue { inner }.drain();
                true
            }
            None => false,
        })?;
        tracing::info!(interval_ms = started.period().as_millis() as u64, "[queue] polling started");
        *poller = Some(started);
        Ok(true)
    }

    /// Start polling at the configured interval.
    pub fn start_default_polling(&self) -> Result<bool, EventsError> {
        self.start_polling(self.inner.default_interval)
    }

    /// Stop polling. Returns `false` if no poller was running.
    pub fn stop_polling(&self) -> bool {
        let stopped = lock(&self.inner.poller).take();
        match stopped {
            Some(poller) => {
                drop(poller);
                tracing::info!("[queue] polling stopped");
                true
            }
            None => false,
        }
    }

    /// Check if a poller is running.
    pub fn is_polling(&self) -> bool {
        lock(&self.inner.poller).is_some()
    }

    // =========================================================================
    // Inspection and maintenance
    // =========================================================================

    /// Head command, without removing it.
    pub fn peek(&self) -> Result<Option<Command>, EventsError> {
        Ok(self.inner.read_snapshot()?.commands.pop_front())
    }

    /// All pending commands, head first, without removing them.
    pub fn pending(&self) -> Result<Vec<Command>, EventsError> {
        Ok(self.inner.read_snapshot()?.commands.into_iter().collect())
    }

    /// Number of pending commands.
    pub fn len(&self) -> Result<usize, EventsError> {
        Ok(self.inner.read_snapshot()?.commands.len())
    }

    /// Check if no commands are pending.
    pub fn is_empty(&self) -> Result<bool, EventsError> {
        Ok(self.len()? == 0)
    }

    /// Drop the oldest pending commands so at most `max_len` remain.
    ///
    /// Returns the number of commands dropped.
    pub fn truncate(&self, max_len: usize) -> Result<usize, EventsError> {
        let mut corrupt = None;
        let result = {
            let _rmw = lock(&self.inner.rmw_lock);
            self.inner.slot.update(|current| {
                if matches!(current, Decoded::Missing) {
                    return (None, (0, 0));
                }
                let (mut snapshot, reset) = QueueInner::snapshot_for_write(current, &mut corrupt);
                let excess = snapshot.commands.len().saturating_sub(max_len);
                if excess == 0 && !reset {
                    let len = snapshot.commands.len();
                    return (None, (0, len));
                }
                snapshot.commands.drain(..excess);
                let len = snapshot.commands.len();
                (Some(snapshot), (excess, len))
            })
        };

        if let Some(source) = corrupt {
            self.inner.report_corrupt(source);
        }
        let (dropped, remaining) = result?;
        if dropped > 0 {
            tracing::warn!(dropped, remaining, "[queue] truncated backlog");
        }
        self.inner.observe_backlog(remaining);
        Ok(dropped)
    }

    /// Remove every pending command. The id counter keeps counting.
    pub fn clear(&self) -> Result<usize, EventsError> {
        self.truncate(0)
    }

    /// Number of `on_any` listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.drain_subs.len()
    }
}
