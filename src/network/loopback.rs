//! In-process simulated master
//!
//! Plays the master's side of a session without a network: cycles are paced
//! by a master clock running `drift_ppm` away from nominal, capture carries
//! a sine tone, and returned audio is only measured. Useful for demos and
//! for exercising drift compensation end to end.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::SoftBuffer;
use crate::config::SessionConfig;
use crate::error::NetworkError;
use crate::network::transport::{NetTransport, SessionParams, SyncOutcome};

/// Loopback master settings
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Master clock offset from nominal, in parts per million
    pub drift_ppm: f64,
    /// Drop every n-th sync packet
    pub miss_every: Option<u64>,
    /// Tone sent on every capture channel
    pub tone_hz: f32,
    pub amplitude: f32,
    /// Period imposed by the master instead of the proposed one
    pub master_period: Option<u32>,
    /// Sleep to the master clock between cycles
    pub paced: bool,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            drift_ppm: 0.0,
            miss_every: None,
            tone_hz: 440.0,
            amplitude: 0.25,
            master_period: None,
            paced: true,
        }
    }
}

/// Counters readable while the transport runs on the bridge thread
#[derive(Debug, Default)]
pub struct LoopbackStats {
    cycles: AtomicU64,
    missed: AtomicU64,
    frames_returned: AtomicU64,
    peak_bits: AtomicU32,
}

impl LoopbackStats {
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn missed(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }

    /// Frames per channel received back from the slave
    pub fn frames_returned(&self) -> u64 {
        self.frames_returned.load(Ordering::Relaxed)
    }

    /// Highest absolute sample value received back
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak_bits.load(Ordering::Relaxed))
    }
}

/// Simulated master transport
pub struct LoopbackTransport {
    config: LoopbackConfig,
    params: Option<SessionParams>,
    cycle: u64,
    phase: f32,
    deadline: Option<Instant>,
    stats: Arc<LoopbackStats>,
}

impl LoopbackTransport {
    pub fn new(config: LoopbackConfig) -> Self {
        Self {
            config,
            params: None,
            cycle: 0,
            phase: 0.0,
            deadline: None,
            stats: Arc::new(LoopbackStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<LoopbackStats> {
        self.stats.clone()
    }

    fn session(&self) -> Result<&SessionParams, NetworkError> {
        self.params
            .as_ref()
            .ok_or_else(|| NetworkError::ConnectionLost("loopback session closed".into()))
    }

    fn nominal_period_ns(params: &SessionParams) -> u64 {
        params.period_size as u64 * 1_000_000_000 / params.sample_rate as u64
    }

    /// One master period measured on the local clock. A fast master clock
    /// finishes its period early.
    fn master_period_ns(&self, params: &SessionParams) -> u64 {
        let nominal = Self::nominal_period_ns(params) as f64;
        (nominal / (1.0 + self.config.drift_ppm * 1e-6)).round().max(1.0) as u64
    }

    fn pace(&mut self, period: Duration) {
        let now = Instant::now();
        let deadline = match self.deadline {
            Some(previous) if now <= previous + period * 4 => previous + period,
            _ => now,
        };
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        self.deadline = Some(deadline);
    }
}

impl NetTransport for LoopbackTransport {
    fn handshake(&mut self, config: &SessionConfig) -> Result<SessionParams, NetworkError> {
        let mut params = SessionParams::proposal(config);
        params.master_name = "loopback".to_string();
        if let Some(period) = self.config.master_period {
            if period == 0 {
                return Err(NetworkError::HandshakeFailed("master period is zero".into()));
            }
            params.period_size = period;
        }

        tracing::debug!(
            "Loopback master accepted {} ({} Hz, {} frames)",
            params.client_name,
            params.sample_rate,
            params.period_size
        );
        self.params = Some(params.clone());
        self.cycle = 0;
        self.deadline = None;
        Ok(params)
    }

    fn recv_sync(&mut self) -> Result<SyncOutcome, NetworkError> {
        let period_ns = {
            let params = self.session()?;
            self.master_period_ns(params)
        };

        self.cycle += 1;
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);
        if self.config.paced {
            self.pace(Duration::from_nanos(period_ns));
        }

        match self.config.miss_every {
            Some(n) if n > 0 && self.cycle % n == 0 => {
                self.stats.missed.fetch_add(1, Ordering::Relaxed);
                Ok(SyncOutcome::Missed)
            }
            _ => Ok(SyncOutcome::Received),
        }
    }

    fn recv_data(&mut self, capture: &mut SoftBuffer) -> Result<(), NetworkError> {
        let sample_rate = self.session()?.sample_rate as f32;
        let step = TAU * self.config.tone_hz / sample_rate;
        let amplitude = self.config.amplitude;
        let start = self.phase;

        for channel in capture.iter_channels_mut() {
            let mut phase = start;
            for sample in channel.iter_mut() {
                *sample = amplitude * phase.sin();
                phase = (phase + step) % TAU;
            }
        }
        self.phase = (start + step * capture.frames() as f32) % TAU;
        Ok(())
    }

    fn resample_factor(&self) -> (u64, u64) {
        match &self.params {
            Some(params) => (Self::nominal_period_ns(params), self.master_period_ns(params)),
            None => (1, 1),
        }
    }

    fn send_sync(&mut self) -> Result<(), NetworkError> {
        self.session().map(|_| ())
    }

    fn send_data(&mut self, playback: &SoftBuffer) -> Result<(), NetworkError> {
        self.session()?;
        let peak = playback
            .iter_channels()
            .flat_map(|channel| channel.iter())
            .fold(self.stats.peak(), |peak, sample| peak.max(sample.abs()));
        self.stats.peak_bits.store(peak.to_bits(), Ordering::Relaxed);
        self.stats
            .frames_returned
            .fetch_add(playback.frames() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn close(&mut self) {
        if self.params.take().is_some() {
            tracing::debug!("Loopback session closed");
        }
    }
}
