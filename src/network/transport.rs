//! Transport session consumed by the bridge
//!
//! The datagram layer, the packet format and the handshake with the master
//! live behind [`NetTransport`]. The bridge only relies on the per-cycle
//! contract documented on each method.

use std::fmt;

use crate::audio::SoftBuffer;
use crate::config::{NetworkMode, SessionConfig};
use crate::error::NetworkError;

/// Outcome of waiting for the per-cycle sync packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Sync received; the cycle goes on
    Received,
    /// The expected packet did not arrive in time; only this cycle is skipped
    Missed,
}

/// Session parameters agreed with the master during the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub client_name: String,
    pub master_name: String,
    pub mtu: u32,
    pub send_audio_channels: usize,
    pub return_audio_channels: usize,
    pub send_midi_channels: usize,
    pub return_midi_channels: usize,
    pub sample_rate: u32,
    pub period_size: u32,
    pub transport_sync: bool,
    pub slave_sync_mode: bool,
    pub network_mode: NetworkMode,
}

impl SessionParams {
    /// What the slave asks for, before the master answers.
    pub fn proposal(config: &SessionConfig) -> Self {
        Self {
            client_name: config.client_name().to_string(),
            master_name: String::new(),
            mtu: config.mtu(),
            send_audio_channels: config.send_audio_channels(),
            return_audio_channels: config.return_audio_channels(),
            send_midi_channels: config.send_midi_channels(),
            return_midi_channels: config.return_midi_channels(),
            sample_rate: config.sample_rate(),
            period_size: config.period_size(),
            transport_sync: config.transport_sync(),
            slave_sync_mode: config.slave_sync_mode(),
            network_mode: config.network_mode(),
        }
    }
}

impl fmt::Display for SessionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "******************** Network parameters ********************")?;
        writeln!(f, "Client name : {}", self.client_name)?;
        if !self.master_name.is_empty() {
            writeln!(f, "Master name : {}", self.master_name)?;
        }
        writeln!(f, "MTU : {}", self.mtu)?;
        writeln!(
            f,
            "Send channels (audio - midi) : {} - {}",
            self.send_audio_channels, self.send_midi_channels
        )?;
        writeln!(
            f,
            "Return channels (audio - midi) : {} - {}",
            self.return_audio_channels, self.return_midi_channels
        )?;
        writeln!(f, "Sample rate : {} frames per second", self.sample_rate)?;
        writeln!(f, "Period size : {} frames per period", self.period_size)?;
        writeln!(f, "Network mode : {}", self.network_mode)?;
        writeln!(f, "Transport sync : {}", if self.transport_sync { "yes" } else { "no" })?;
        write!(f, "Slave mode : {}", if self.slave_sync_mode { "sync" } else { "async" })
    }
}

/// A slave-side session with a net master.
///
/// Every method runs on the bridge's real-time thread. The receive and send
/// calls may block on the network; nothing else should. Any `Err` is fatal
/// for the loop.
pub trait NetTransport: Send {
    /// Connect to the master and agree on session parameters.
    fn handshake(&mut self, config: &SessionConfig) -> Result<SessionParams, NetworkError>;

    /// Wait for the cycle's sync packet.
    fn recv_sync(&mut self) -> Result<SyncOutcome, NetworkError>;

    /// Receive the cycle's audio into the capture soft buffer.
    fn recv_data(&mut self, capture: &mut SoftBuffer) -> Result<(), NetworkError>;

    /// Clock relation from the last sync: `(time_a, time_b)`, the elapsed
    /// cycle time measured by the slave and by the master.
    fn resample_factor(&self) -> (u64, u64);

    /// Send the cycle's sync packet back to the master.
    fn send_sync(&mut self) -> Result<(), NetworkError>;

    /// Send the playback soft buffer to the master.
    fn send_data(&mut self, playback: &SoftBuffer) -> Result<(), NetworkError>;

    /// Release transport resources. Must be idempotent.
    fn close(&mut self);
}

impl<T: NetTransport + ?Sized> NetTransport for Box<T> {
    fn handshake(&mut self, config: &SessionConfig) -> Result<SessionParams, NetworkError> {
        (**self).handshake(config)
    }

    fn recv_sync(&mut self) -> Result<SyncOutcome, NetworkError> {
        (**self).recv_sync()
    }

    fn recv_data(&mut self, capture: &mut SoftBuffer) -> Result<(), NetworkError> {
        (**self).recv_data(capture)
    }

    fn resample_factor(&self) -> (u64, u64) {
        (**self).resample_factor()
    }

    fn send_sync(&mut self) -> Result<(), NetworkError> {
        (**self).send_sync()
    }

    fn send_data(&mut self, playback: &SoftBuffer) -> Result<(), NetworkError> {
        (**self).send_data(playback)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
