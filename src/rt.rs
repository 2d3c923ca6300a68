//! Real-time worker thread
//!
//! Runs a [`Runnable`] on a dedicated thread: one `init`, then `execute`
//! repeatedly until stopped or until a cycle fails. Starting is synchronous;
//! the caller learns whether `init` and the first cycle succeeded before
//! [`RtThread::start_sync`] returns.

use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{AdapterError, Result};

/// Result of one loop cycle that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    Completed,
    /// Nothing was exchanged this cycle; the loop keeps going
    Skipped,
}

/// Work driven by an [`RtThread`]
pub trait Runnable: Send + 'static {
    /// One-time setup, run on the worker thread before the first cycle.
    fn init(&mut self) -> Result<()>;

    /// One cycle. An `Err` stops the loop.
    fn execute(&mut self) -> Result<CycleStatus>;
}

/// Observable lifecycle of the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    Created = 0,
    /// `init` done, first cycle in progress
    Ready = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LoopState::Created,
            1 => LoopState::Ready,
            2 => LoopState::Running,
            3 => LoopState::Stopping,
            _ => LoopState::Stopped,
        }
    }
}

#[derive(Debug)]
struct LoopControl {
    state: AtomicU8,
    stop: AtomicBool,
}

impl LoopControl {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(LoopState::Created as u8),
            stop: AtomicBool::new(false),
        }
    }

    fn set(&self, state: LoopState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn get(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }
}

/// Dedicated thread owning a [`Runnable`] while it runs
pub struct RtThread<R: Runnable> {
    name: String,
    priority: Option<u8>,
    control: Arc<LoopControl>,
    slot: Arc<Mutex<Option<R>>>,
    handle: Option<JoinHandle<()>>,
}

impl<R: Runnable> RtThread<R> {
    pub fn new(name: impl Into<String>, runnable: R) -> Self {
        Self {
            name: name.into(),
            priority: None,
            control: Arc::new(LoopControl::new()),
            slot: Arc::new(Mutex::new(Some(runnable))),
            handle: None,
        }
    }

    /// Request real-time scheduling at `priority` (0-99) for the worker.
    /// Failing to obtain it later is logged, not fatal.
    pub fn acquire_real_time(&mut self, priority: u8) {
        self.priority = Some(priority);
    }

    /// Spawn the worker and wait until `init` and the first cycle are done.
    ///
    /// On error the worker has already exited and the runnable can be taken
    /// back with [`take_runnable`](Self::take_runnable).
    pub fn start_sync(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(AdapterError::AlreadyRunning.into());
        }

        self.control.stop.store(false, Ordering::SeqCst);
        self.control.set(LoopState::Created);

        let (started_tx, started_rx) = bounded::<std::result::Result<(), AdapterError>>(1);
        let control = self.control.clone();
        let slot = self.slot.clone();
        let priority = self.priority;
        let dispatch = tracing::dispatcher::get_default(|current| current.clone());

        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let _log = tracing::dispatcher::set_default(&dispatch);

                let Some(mut runnable) = slot.lock().take() else {
                    control.set(LoopState::Stopped);
                    let _ = started_tx.send(Err(AdapterError::InitFailed("nothing to run".into())));
                    return;
                };

                if let Some(priority) = priority {
                    promote_current_thread(priority);
                }

                if let Err(e) = runnable.init() {
                    *slot.lock() = Some(runnable);
                    control.set(LoopState::Stopped);
                    let _ = started_tx.send(Err(AdapterError::InitFailed(e.to_string())));
                    return;
                }

                control.set(LoopState::Ready);
                if let Err(e) = runnable.execute() {
                    *slot.lock() = Some(runnable);
                    control.set(LoopState::Stopped);
                    let _ = started_tx.send(Err(AdapterError::FirstCycleFailed(e.to_string())));
                    return;
                }

                control.set(LoopState::Running);
                let _ = started_tx.send(Ok(()));

                while !control.stop.load(Ordering::Acquire) {
                    if let Err(e) = runnable.execute() {
                        tracing::error!("Real-time loop stopped: {}", e);
                        break;
                    }
                }

                control.set(LoopState::Stopping);
                *slot.lock() = Some(runnable);
                control.set(LoopState::Stopped);
            })
            .map_err(|e| AdapterError::SpawnFailed(e.to_string()))?;

        self.handle = Some(handle);

        let started = started_rx.recv().unwrap_or(Err(AdapterError::ThreadLost));
        if let Err(e) = started {
            self.join();
            return Err(e.into());
        }
        Ok(())
    }

    /// Ask the loop to finish its current cycle and wait for the thread.
    pub fn stop(&mut self) {
        self.control.stop.store(true, Ordering::SeqCst);
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Real-time thread {} panicked", self.name);
            }
            self.control.set(LoopState::Stopped);
        }
    }

    pub fn state(&self) -> LoopState {
        self.control.get()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    /// Get the runnable back once the worker is not holding it.
    pub fn take_runnable(&mut self) -> Option<R> {
        if self.handle.is_some() {
            return None;
        }
        self.slot.lock().take()
    }
}

impl<R: Runnable> Drop for RtThread<R> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(unix)]
fn promote_current_thread(priority: u8) {
    use thread_priority::unix::{
        set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
        ThreadSchedulePolicy,
    };
    use thread_priority::{ThreadPriority, ThreadPriorityValue};

    let value = match ThreadPriorityValue::try_from(priority) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Invalid real-time priority {}: {:?}", priority, e);
            return;
        }
    };
    let policy = ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo);
    if let Err(e) =
        set_thread_priority_and_policy(thread_native_id(), ThreadPriority::Crossplatform(value), policy)
    {
        tracing::warn!("Cannot acquire real-time priority {}: {:?}", priority, e);
    }
}

#[cfg(not(unix))]
fn promote_current_thread(priority: u8) {
    use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};

    let value = match ThreadPriorityValue::try_from(priority) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Invalid real-time priority {}: {:?}", priority, e);
            return;
        }
    };
    if let Err(e) = set_current_thread_priority(ThreadPriority::Crossplatform(value)) {
        tracing::warn!("Cannot acquire real-time priority {}: {:?}", priority, e);
    }
}
