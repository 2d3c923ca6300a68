//! Audio subsystem: staging buffers and resampling ring buffers

pub mod buffer;
pub mod ports;
pub mod resampler;
pub mod ring_buffer;

pub use buffer::SoftBuffer;
pub use ports::{create_port_slot, ring_bank, HostPortSlot, HostPorts, RingBank};
pub use resampler::{LinearInterpolator, Ratio};
pub use ring_buffer::{capture_ring, playback_ring, CaptureReader, CaptureWriter, PlaybackReader, PlaybackWriter};
