//! How requests get executed and how their results come back.
//!
//! The engine hands a [`Job`] to a [`Dispatcher`] and later collects
//! [`Completion`]s from it on the UI thread, one at a time. Dispatchers never
//! touch the store.
//!
//! - [`ThreadedDispatcher`]: runs calls on the worker pool, results return
//!   over a channel. Used by the app.
//! - [`ManualDispatcher`]: holds jobs until the caller resolves them, in any
//!   order. Used to drive the engine deterministically (tests, replays).

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::trace;

use super::request::{ApiCall, ApiReply, Ticket};
use crate::core::workers::Workers;
use crate::transport::{Transport, TransportError};

#[derive(Debug, Clone)]
pub struct Job {
    pub ticket: Ticket,
    pub call: ApiCall,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub ticket: Ticket,
    pub result: Result<ApiReply, TransportError>,
}

pub trait Dispatcher {
    /// Start executing a job. Must not block on the network.
    fn dispatch(&self, job: Job);

    /// Completions that are ready now. Never blocks.
    fn poll(&self) -> Vec<Completion>;

    /// Wait up to `timeout` for the next completion.
    fn wait(&self, timeout: Duration) -> Option<Completion>;

    /// Session ended: jobs not yet started may be dropped.
    fn invalidate(&self) {}
}

// ========== ThreadedDispatcher ==========

/// Runs calls on a [`Workers`] pool.
pub struct ThreadedDispatcher {
    workers: Workers,
    transport: Arc<dyn Transport>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl ThreadedDispatcher {
    pub fn new(transport: Arc<dyn Transport>, num_threads: usize) -> Self {
        let (tx, rx) = unbounded();
        Self {
            workers: Workers::new(num_threads),
            transport,
            tx,
            rx,
        }
    }
}

impl fmt::Debug for ThreadedDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadedDispatcher")
            .field("threads", &self.workers.num_threads())
            .field("epoch", &self.workers.current_epoch())
            .field("ready", &self.rx.len())
            .finish()
    }
}

impl Dispatcher for ThreadedDispatcher {
    fn dispatch(&self, job: Job) {
        let transport = Arc::clone(&self.transport);
        let tx = self.tx.clone();
        self.workers.execute_with_epoch(self.workers.current_epoch(), move || {
            let result = job.call.run(transport.as_ref());
            if tx.send(Completion { ticket: job.ticket, result }).is_err() {
                trace!("Completion {} dropped, dispatcher gone", job.ticket);
            }
        });
    }

    fn poll(&self) -> Vec<Completion> {
        self.rx.try_iter().collect()
    }

    fn wait(&self, timeout: Duration) -> Option<Completion> {
        self.rx.recv_timeout(timeout).ok()
    }

    fn invalidate(&self) {
        let epoch = self.workers.advance_epoch();
        trace!("ThreadedDispatcher: now at epoch {}", epoch);
    }
}

// ========== ManualDispatcher ==========

#[derive(Default)]
struct ManualState {
    pending: Vec<Job>,
    ready: VecDeque<Completion>,
}

/// Holds dispatched jobs until resolved. Clones share state, so keep one
/// clone outside the engine to drive it.
#[derive(Clone)]
pub struct ManualDispatcher {
    transport: Arc<dyn Transport>,
    state: Arc<Mutex<ManualState>>,
}

impl ManualDispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            state: Arc::new(Mutex::new(ManualState::default())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn pending(&self) -> Vec<Job> {
        self.lock().pending.clone()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Run the job against the transport now and queue its completion.
    /// Returns false if no such job is pending.
    pub fn resolve(&self, ticket: Ticket) -> bool {
        let Some(job) = self.take(ticket) else {
            return false;
        };
        let result = job.call.run(self.transport.as_ref());
        self.lock().ready.push_back(Completion { ticket, result });
        true
    }

    /// Resolve every pending job in dispatch order. Returns how many.
    pub fn resolve_all(&self) -> usize {
        let tickets: Vec<Ticket> = self.lock().pending.iter().map(|j| j.ticket).collect();
        tickets.into_iter().filter(|t| self.resolve(*t)).count()
    }

    fn take(&self, ticket: Ticket) -> Option<Job> {
        let mut state = self.lock();
        let index = state.pending.iter().position(|j| j.ticket == ticket)?;
        Some(state.pending.remove(index))
    }
}

impl Dispatcher for ManualDispatcher {
    fn dispatch(&self, job: Job) {
        self.lock().pending.push(job);
    }

    fn poll(&self) -> Vec<Completion> {
        self.lock().ready.drain(..).collect()
    }

    fn wait(&self, _timeout: Duration) -> Option<Completion> {
        self.lock().ready.pop_front()
    }

    fn invalidate(&self) {
        self.lock().pending.clear();
    }
}
