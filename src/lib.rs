//! # Net Audio Adapter
//!
//! Slave-side network audio bridge: a remote master's ports show up as local
//! capture and playback ports.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                               MASTER (remote)                            │
//! └──────────────────────────────┬──────────────────────▲────────────────────┘
//!                  sync + audio  │                      │  sync + audio
//!                                ▼                      │
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                 Network Transport Session (network::NetTransport)        │
//! │        recv_sync / recv_data / resample_factor / send_sync / send_data   │
//! └──────────────────────────────┬──────────────────────▲────────────────────┘
//!                                │                      │
//! ┌──────────────────────────────┼──────────────────────┼────────────────────┐
//! │   RT Thread (rt::RtThread)   ▼                      │                    │
//! │  ┌──────────────────────────────────────────────────────────────────┐    │
//! │  │                Bridge cycle (adapter::NetBridge)                 │    │
//! │  │   ┌──────────────────┐                  ┌──────────────────┐     │    │
//! │  │   │ Soft capture buf │                  │ Soft playback buf│     │    │
//! │  │   └────────┬─────────┘                  └────────▲─────────┘     │    │
//! │  │            │ write_resample(a, b)                │ read_resample │    │
//! │  └────────────┼─────────────────────────────────────┼───────────────┘    │
//! └───────────────┼─────────────────────────────────────┼────────────────────┘
//!                 ▼                                     │
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │        Resampling ring buffers, one per channel (audio::RingBank)        │
//! └───────────────┬─────────────────────────────────────▲────────────────────┘
//!                 ▼                                     │
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │              Local audio callback (audio::HostPorts)                     │
//! │          read_capture(ch)                     write_playback(ch)         │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod adapter;
pub mod audio;
pub mod config;
pub mod error;
pub mod network;
pub mod rt;

pub use adapter::NetAdapter;
pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default multicast group of the master
    pub const DEFAULT_MULTICAST_IP: &str = "225.3.19.154";

    /// Size of the multicast address field, terminator included
    pub const MULTICAST_IP_SIZE: usize = 16;

    /// Default UDP port of the master
    pub const DEFAULT_UDP_PORT: u16 = 19000;

    /// Default MTU to the master
    pub const DEFAULT_MTU: u32 = 1500;

    /// Default audio channel count in each direction
    pub const DEFAULT_AUDIO_CHANNELS: usize = 2;

    /// Size of the client name field, terminator included
    pub const CLIENT_NAME_SIZE: usize = 64;

    /// Real-time priority requested for the network thread
    pub const RT_PRIORITY: u8 = 85;

    /// Resampling ring buffer capacity (in frames)
    pub const RING_BUFFER_CAPACITY: usize = 32768;

    /// Default local sample rate
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default local period (in frames)
    pub const DEFAULT_PERIOD_SIZE: u32 = 256;
}
