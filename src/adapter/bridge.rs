//! One bridge cycle: network in, resample, network out

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::{ring_bank, HostPortSlot, RingBank, SoftBuffer};
use crate::config::SessionConfig;
use crate::constants::RING_BUFFER_CAPACITY;
use crate::error::Result;
use crate::network::{NetTransport, SyncOutcome};
use crate::rt::{CycleStatus, Runnable};

/// Cycle counters, shared with the host
#[derive(Debug, Default)]
pub struct BridgeStats {
    cycles_completed: AtomicU64,
    cycles_skipped: AtomicU64,
    ring_resets: AtomicU64,
}

impl BridgeStats {
    pub fn snapshot(&self) -> BridgeStatsSnapshot {
        BridgeStatsSnapshot {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            ring_resets: self.ring_resets.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStatsSnapshot {
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    /// Cycles that ended with a drift recovery
    pub ring_resets: u64,
}

/// Slave-side bridge between a transport session and the ring buffers.
///
/// Owns the session configuration, the transport, both soft buffers and the
/// bridge ends of the rings. Each `init` leaves the matching [`HostPorts`]
/// in the port slot for the host to pick up.
///
/// [`HostPorts`]: crate::audio::HostPorts
pub struct NetBridge<T: NetTransport> {
    config: SessionConfig,
    transport: T,
    rings: RingBank,
    host_ports: HostPortSlot,
    ring_capacity: usize,
    soft_capture: SoftBuffer,
    soft_playback: SoftBuffer,
    stats: Arc<BridgeStats>,
}

impl<T: NetTransport> NetBridge<T> {
    pub fn new(config: SessionConfig, transport: T, host_ports: HostPortSlot, stats: Arc<BridgeStats>) -> Self {
        Self {
            config,
            transport,
            rings: RingBank::default(),
            host_ports,
            ring_capacity: RING_BUFFER_CAPACITY,
            soft_capture: SoftBuffer::new(),
            soft_playback: SoftBuffer::new(),
            stats,
        }
    }

    /// Ring capacity in frames. Never less than one period.
    pub fn with_ring_capacity(mut self, frames: usize) -> Self {
        self.ring_capacity = frames;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    pub fn close_transport(&mut self) {
        self.transport.close();
    }

    /// Free soft buffers and ring storage. Safe to call in any state.
    pub fn release(&mut self) {
        let had_buffers = self.soft_capture.release() | self.soft_playback.release();
        self.rings = RingBank::default();
        self.host_ports.lock().take();
        if had_buffers {
            tracing::debug!("Bridge buffers released");
        }
    }

    fn period(&self) -> usize {
        self.config.period_size() as usize
    }
}

impl<T: NetTransport + 'static> Runnable for NetBridge<T> {
    fn init(&mut self) -> Result<()> {
        self.release();

        let params = self.transport.handshake(&self.config)?;
        self.config.apply_negotiated(&params)?;

        let period = self.period();
        self.soft_capture
            .allocate(self.config.send_audio_channels(), period);
        self.soft_playback
            .allocate(self.config.return_audio_channels(), period);
        let (rings, ports) = ring_bank(
            self.config.send_audio_channels(),
            self.config.return_audio_channels(),
            self.ring_capacity.max(period),
        );
        self.rings = rings;
        *self.host_ports.lock() = Some(ports);

        tracing::info!("{}", params);
        Ok(())
    }

    fn execute(&mut self) -> Result<CycleStatus> {
        if self.transport.recv_sync()? == SyncOutcome::Missed {
            tracing::debug!("Sync packet missed, skipping cycle");
            self.stats.cycles_skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(CycleStatus::Skipped);
        }

        self.transport.recv_data(&mut self.soft_capture)?;
        let (time_a, time_b) = self.transport.resample_factor();
        let period = self.period();

        let mut drift = false;
        for (ring, samples) in self
            .rings
            .capture_mut()
            .iter_mut()
            .zip(self.soft_capture.iter_channels())
        {
            ring.set_ratio(time_a, time_b);
            drift |= ring.write_resample(samples, period) < period;
        }
        for (ring, out) in self
            .rings
            .playback_mut()
            .iter_mut()
            .zip(self.soft_playback.iter_channels_mut())
        {
            ring.set_ratio(time_b, time_a);
            drift |= ring.read_resample(out, period) < period;
        }

        self.transport.send_sync()?;
        self.transport.send_data(&self.soft_playback)?;

        if drift {
            tracing::error!("Ring buffer failure, resetting ring buffers");
            self.rings.reset();
            self.stats.ring_resets.fetch_add(1, Ordering::Relaxed);
        }

        self.stats.cycles_completed.fetch_add(1, Ordering::Relaxed);
        Ok(CycleStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{create_port_slot, HostPorts, Ratio};
    use crate::error::{Error, NetworkError};
    use crate::network::mock::{MockTransport, Step};
    use crate::network::SessionParams;

    fn bridge(mock: &MockTransport) -> NetBridge<MockTransport> {
        let config = SessionConfig::new(48000, 256).unwrap();
        NetBridge::new(
            config,
            mock.clone(),
            create_port_slot(),
            Arc::new(BridgeStats::default()),
        )
    }

    fn negotiate(mock: &MockTransport, send: usize, ret: usize, period: u32) {
        let config = SessionConfig::new(48000, 256).unwrap();
        let mut params = SessionParams::proposal(&config);
        params.send_audio_channels = send;
        params.return_audio_channels = ret;
        params.period_size = period;
        mock.state.lock().negotiated = Some(params);
    }

    fn take_ports(bridge: &NetBridge<MockTransport>) -> HostPorts {
        bridge.host_ports.lock().take().unwrap()
    }

    #[test]
    fn test_init_allocates_negotiated_layout() {
        let mock = MockTransport::unpaced(&[]);
        negotiate(&mock, 3, 1, 128);
        let mut bridge = bridge(&mock);
        bridge.init().unwrap();

        assert_eq!(bridge.config().period_size(), 128);
        assert_eq!(bridge.soft_capture.channels(), 3);
        assert_eq!(bridge.soft_capture.frames(), 128);
        assert_eq!(bridge.soft_playback.channels(), 1);
        assert_eq!(bridge.rings.capture().len(), 3);
        assert_eq!(bridge.rings.playback().len(), 1);
        assert_eq!(bridge.rings.capture()[0].capacity(), RING_BUFFER_CAPACITY);

        let ports = take_ports(&bridge);
        assert_eq!((ports.capture_channels(), ports.playback_channels()), (3, 1));

        // A second init hands out a fresh set
        bridge.init().unwrap();
        assert!(bridge.host_ports.lock().is_some());
    }

    #[test]
    fn test_init_failure_leaves_nothing_allocated() {
        let mock = MockTransport::unpaced(&[]);
        mock.state.lock().fail_handshake = true;
        let mut bridge = bridge(&mock);

        let err = bridge.init().unwrap_err();
        assert!(matches!(err, Error::Network(NetworkError::HandshakeFailed(_))));
        assert!(!bridge.soft_capture.is_allocated());
        assert!(bridge.rings.is_empty());
        assert!(bridge.host_ports.lock().is_none());
    }

    #[test]
    fn test_init_rejects_zero_period() {
        let mock = MockTransport::unpaced(&[]);
        negotiate(&mock, 2, 2, 0);
        let mut bridge = bridge(&mock);
        assert!(matches!(bridge.init(), Err(Error::Config(_))));
        assert!(!bridge.soft_playback.is_allocated());
    }

    #[test]
    fn test_cycle_moves_audio_both_ways() {
        let mock = MockTransport::unpaced(&[]);
        negotiate(&mock, 1, 1, 64);
        let mut bridge = bridge(&mock);
        bridge.init().unwrap();

        let mut ports = take_ports(&bridge);
        ports.write_playback(0, &[0.25; 64]).unwrap();
        assert_eq!(bridge.execute().unwrap(), CycleStatus::Completed);

        // One frame of interpolator latency in each direction
        let mut captured = [1.0; 64];
        assert_eq!(ports.read_capture(0, &mut captured).unwrap(), 64);
        assert_eq!(captured[0], 0.0);
        assert!(captured[1..].iter().all(|&s| s == 0.5));

        let state = mock.state.lock();
        assert_eq!(state.last_playback[0], 0.0);
        assert!(state.last_playback[1..].iter().all(|&s| s == 0.25));
        assert_eq!((state.syncs_sent, state.data_sent), (1, 1));
        assert_eq!(bridge.stats.snapshot().ring_resets, 0);
    }

    #[test]
    fn test_missed_sync_skips_cycle() {
        let mock = MockTransport::unpaced(&[Step::Sync, Step::Miss]);
        negotiate(&mock, 2, 0, 256);
        let mut bridge = bridge(&mock);
        bridge.init().unwrap();

        assert_eq!(bridge.execute().unwrap(), CycleStatus::Completed);
        let config = bridge.config().clone();
        let filled: Vec<usize> = bridge.rings.capture().iter().map(|r| r.read_space()).collect();
        assert_eq!(filled, vec![256, 256]);

        assert_eq!(bridge.execute().unwrap(), CycleStatus::Skipped);
        let after: Vec<usize> = bridge.rings.capture().iter().map(|r| r.read_space()).collect();
        assert_eq!(after, filled);
        assert_eq!(bridge.config(), &config);

        let state = mock.state.lock();
        assert_eq!(state.data_received, 1);
        assert_eq!(state.syncs_sent, 1);
        assert_eq!(
            bridge.stats.snapshot(),
            BridgeStatsSnapshot {
                cycles_completed: 1,
                cycles_skipped: 1,
                ring_resets: 0
            }
        );
    }

    #[test]
    fn test_every_primitive_failure_is_fatal() {
        for step in [Step::FailSync, Step::FailData, Step::FailSendSync, Step::FailSendData] {
            let mock = MockTransport::unpaced(&[step]);
            let mut bridge = bridge(&mock);
            bridge.init().unwrap();
            assert!(bridge.execute().is_err(), "{:?} should be fatal", step);
            assert_eq!(bridge.stats.snapshot().cycles_completed, 0);
        }
    }

    #[test]
    fn test_capture_overflow_resets_rings() {
        let mock = MockTransport::unpaced(&[]);
        mock.state.lock().ratio = (1001, 1000);
        negotiate(&mock, 2, 0, 256);
        let mut bridge = bridge(&mock).with_ring_capacity(256);
        bridge.init().unwrap();

        bridge.execute().unwrap();
        assert!(bridge.rings.capture().iter().all(|r| r.read_space() == 256));
        assert_eq!(bridge.stats.snapshot().ring_resets, 0);

        assert_eq!(bridge.execute().unwrap(), CycleStatus::Completed);
        for ring in bridge.rings.capture() {
            assert_eq!(ring.read_space(), 0);
            assert_eq!(ring.ratio(), Ratio::UNITY);
        }
        assert_eq!(bridge.stats.snapshot().ring_resets, 1);
    }

    #[test]
    fn test_capture_overflow_resets_playback_too() {
        let mock = MockTransport::unpaced(&[]);
        mock.state.lock().ratio = (1001, 1000);
        negotiate(&mock, 2, 1, 256);
        let mut bridge = bridge(&mock).with_ring_capacity(512);
        bridge.init().unwrap();
        let mut ports = take_ports(&bridge);

        // Keep the playback ring topped up while nobody drains capture
        assert_eq!(ports.write_playback(0, &[0.25; 512]).unwrap(), 512);
        bridge.execute().unwrap();
        ports.write_playback(0, &[0.25; 256]).unwrap();
        bridge.execute().unwrap();
        assert_eq!(bridge.stats.snapshot().ring_resets, 0);
        assert!(bridge.rings.capture().iter().all(|r| r.write_space() == 0));
        assert!(bridge.rings.playback()[0].read_space() >= 256);

        ports.write_playback(0, &[0.25; 256]).unwrap();
        assert_eq!(bridge.execute().unwrap(), CycleStatus::Completed);
        assert_eq!(bridge.stats.snapshot().ring_resets, 1);
        assert_eq!(mock.state.lock().last_playback, vec![0.25; 256]);

        for ring in bridge.rings.capture() {
            assert_eq!(ring.read_space(), 0);
            assert_eq!(ring.ratio(), Ratio::UNITY);
        }
        for ring in bridge.rings.playback() {
            assert_eq!(ring.read_space(), 0);
            assert_eq!(ring.ratio(), Ratio::UNITY);
        }

        let mut out = [1.0; 256];
        for channel in 0..2 {
            assert_eq!(ports.read_capture(channel, &mut out).unwrap(), 0);
            assert!(out.iter().all(|&s| s == 0.0));
        }
        assert!(bridge.rings.capture().iter().all(|r| r.write_space() == 512));
    }

    #[test]
    fn test_playback_underflow_resets_and_sends_silence() {
        let mock = MockTransport::unpaced(&[]);
        negotiate(&mock, 0, 1, 64);
        let mut bridge = bridge(&mock);
        bridge.init().unwrap();
        let mut ports = take_ports(&bridge);

        bridge.execute().unwrap();
        assert_eq!(mock.state.lock().last_playback, vec![0.0; 64]);
        assert_eq!(bridge.stats.snapshot().ring_resets, 1);

        ports.write_playback(0, &[0.25; 64]).unwrap();
        bridge.execute().unwrap();
        let sent = mock.state.lock().last_playback.clone();
        assert_eq!(sent[0], 0.0);
        assert_eq!(&sent[1..], &[0.25; 63][..]);
        assert_eq!(bridge.stats.snapshot().ring_resets, 1);
    }

    #[test]
    fn test_release_is_repeatable() {
        let mock = MockTransport::unpaced(&[]);
        let mut bridge = bridge(&mock);
        bridge.init().unwrap();
        bridge.release();
        bridge.release();
        assert!(!bridge.soft_capture.is_allocated());
        assert!(bridge.rings.is_empty());
        assert!(bridge.host_ports.lock().is_none());
    }
}
