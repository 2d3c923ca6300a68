//! Host-facing adapter
//!
//! [`NetAdapter`] is what the host driver talks to: `open`, `close` and
//! buffer size changes. It owns the bridge while stopped and hands it to the
//! real-time thread while running.

pub mod bridge;

pub use bridge::{BridgeStats, BridgeStatsSnapshot, NetBridge};

use std::sync::Arc;

use crate::audio::{create_port_slot, HostPortSlot, HostPorts};
use crate::config::SessionConfig;
use crate::constants::RT_PRIORITY;
use crate::error::{AdapterError, Result};
use crate::network::NetTransport;
use crate::rt::{LoopState, RtThread};

const THREAD_NAME: &str = "net-adapter";

/// Slave-side network audio adapter
pub struct NetAdapter<T: NetTransport + 'static> {
    host_ports: HostPortSlot,
    stats: Arc<BridgeStats>,
    priority: Option<u8>,
    idle: Option<NetBridge<T>>,
    thread: Option<RtThread<NetBridge<T>>>,
    transport_open: bool,
}

impl<T: NetTransport + 'static> NetAdapter<T> {
    pub fn new(config: SessionConfig, transport: T) -> Self {
        let host_ports = create_port_slot();
        let stats = Arc::new(BridgeStats::default());
        let bridge = NetBridge::new(config, transport, host_ports.clone(), stats.clone());

        Self {
            host_ports,
            stats,
            priority: Some(RT_PRIORITY),
            idle: Some(bridge),
            thread: None,
            transport_open: false,
        }
    }

    /// Ring capacity per channel, in frames.
    pub fn with_ring_capacity(mut self, frames: usize) -> Self {
        self.idle = self.idle.take().map(|bridge| bridge.with_ring_capacity(frames));
        self
    }

    /// Real-time priority for the loop thread, `None` to keep the default
    /// scheduling.
    pub fn with_priority(mut self, priority: Option<u8>) -> Self {
        self.priority = priority;
        self
    }

    /// Connect to the master and start the loop.
    ///
    /// Returns once the first cycle has completed. An error means the loop
    /// is not running.
    pub fn open(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(AdapterError::AlreadyRunning.into());
        }
        self.reclaim();

        let bridge = self.idle.take().ok_or(AdapterError::ThreadLost)?;
        let config = bridge.config();
        tracing::info!(
            "Net adapter started in {} mode {} master's transport sync.",
            if config.slave_sync_mode() { "sync" } else { "async" },
            if config.transport_sync() { "with" } else { "without" }
        );

        let mut thread = RtThread::new(THREAD_NAME, bridge);
        if let Some(priority) = self.priority {
            thread.acquire_real_time(priority);
        }

        self.transport_open = true;
        match thread.start_sync() {
            Ok(()) => {
                self.thread = Some(thread);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Cannot start net adapter: {}", e);
                if let Some(mut bridge) = thread.take_runnable() {
                    bridge.release();
                    self.idle = Some(bridge);
                }
                Err(e)
            }
        }
    }

    /// Stop the loop, close the transport and free all buffers.
    ///
    /// Safe to call at any time, any number of times.
    pub fn close(&mut self) -> Result<()> {
        self.reclaim();

        if let Some(bridge) = self.idle.as_mut() {
            if self.transport_open {
                bridge.close_transport();
                self.transport_open = false;
                tracing::info!("Net adapter closed");
            }
            bridge.release();
        }
        Ok(())
    }

    /// Host buffer size changed. Only allowed while stopped; takes effect
    /// on the next `open`.
    pub fn set_buffer_size(&mut self, frames: u32) -> Result<()> {
        if self.is_running() {
            return Err(AdapterError::Running.into());
        }
        self.reclaim();

        let bridge = self.idle.as_mut().ok_or(AdapterError::ThreadLost)?;
        bridge.config_mut().set_period_size(frames)
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|thread| thread.is_running())
    }

    /// Loop state, `Stopped` when no loop was ever started.
    pub fn state(&self) -> LoopState {
        self.thread
            .as_ref()
            .map_or(LoopState::Stopped, |thread| thread.state())
    }

    /// Host ends of the rings for the local audio callback.
    ///
    /// Each successful `open` makes one set available; `None` once taken or
    /// while stopped. Ports taken before a `close` go quiet and must be
    /// replaced after the next `open`.
    pub fn host_ports(&self) -> Option<HostPorts> {
        self.host_ports.lock().take()
    }

    pub fn stats(&self) -> BridgeStatsSnapshot {
        self.stats.snapshot()
    }

    /// Session configuration, only readable while stopped.
    pub fn config(&self) -> Option<&SessionConfig> {
        self.idle.as_ref().map(|bridge| bridge.config())
    }

    /// Take the bridge back from a stopped or dead loop.
    fn reclaim(&mut self) {
        if let Some(mut thread) = self.thread.take() {
            thread.stop();
            match thread.take_runnable() {
                Some(bridge) => self.idle = Some(bridge),
                None => tracing::error!("Net adapter loop lost its bridge"),
            }
        }
    }
}

impl<T: NetTransport + 'static> Drop for NetAdapter<T> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
