//! Ring buffers split between the bridge thread and the host audio callback

use parking_lot::Mutex;
use std::sync::Arc;

use crate::audio::ring_buffer::{
    capture_ring, playback_ring, CaptureReader, CaptureWriter, PlaybackReader, PlaybackWriter,
};
use crate::error::AudioError;

/// Bridge side of one session's rings: resampling capture writers and
/// playback readers.
#[derive(Default)]
pub struct RingBank {
    capture: Vec<CaptureWriter>,
    playback: Vec<PlaybackReader>,
}

/// Create one ring per channel and direction, split into the bridge's bank
/// and the host's ports.
pub fn ring_bank(capture_channels: usize, playback_channels: usize, capacity: usize) -> (RingBank, HostPorts) {
    let (capture_writers, capture_readers): (Vec<_>, Vec<_>) = (0..capture_channels)
        .map(|_| capture_ring(capacity))
        .unzip();
    let (playback_writers, playback_readers): (Vec<_>, Vec<_>) = (0..playback_channels)
        .map(|_| playback_ring(capacity))
        .unzip();

    (
        RingBank {
            capture: capture_writers,
            playback: playback_readers,
        },
        HostPorts {
            capture: capture_readers,
            playback: playback_writers,
        },
    )
}

impl RingBank {
    /// Empty every ring and return them to a 1:1 ratio.
    ///
    /// Playback rings are emptied right away. Capture rings are emptied by
    /// the host on its next read; until then they accept nothing.
    pub fn reset(&mut self) {
        for ring in self.capture.iter_mut() {
            ring.reset();
        }
        for ring in self.playback.iter_mut() {
            ring.reset();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.capture.is_empty() && self.playback.is_empty()
    }

    pub fn capture(&self) -> &[CaptureWriter] {
        &self.capture
    }

    pub fn playback(&self) -> &[PlaybackReader] {
        &self.playback
    }

    pub fn capture_mut(&mut self) -> &mut [CaptureWriter] {
        &mut self.capture
    }

    pub fn playback_mut(&mut self) -> &mut [PlaybackReader] {
        &mut self.playback
    }
}

/// Host-side ends of the bridged ports.
///
/// Meant to be moved into the local audio callback, which reads what the
/// master sent and writes what goes back to it. No call takes a lock.
pub struct HostPorts {
    capture: Vec<CaptureReader>,
    playback: Vec<PlaybackWriter>,
}

impl HostPorts {
    pub fn capture_channels(&self) -> usize {
        self.capture.len()
    }

    pub fn playback_channels(&self) -> usize {
        self.playback.len()
    }

    /// Read one channel of audio received from the master. Any shortfall
    /// is filled with silence.
    pub fn read_capture(&mut self, channel: usize, out: &mut [f32]) -> Result<usize, AudioError> {
        let ring = self
            .capture
            .get_mut(channel)
            .ok_or(AudioError::InvalidChannel(channel))?;
        Ok(ring.read(out))
    }

    /// Queue one channel of audio for the master. Returns frames accepted.
    pub fn write_playback(&mut self, channel: usize, input: &[f32]) -> Result<usize, AudioError> {
        let ring = self
            .playback
            .get_mut(channel)
            .ok_or(AudioError::InvalidChannel(channel))?;
        Ok(ring.write(input))
    }
}

/// Where the bridge leaves the host ports of the current session until the
/// host picks them up
pub type HostPortSlot = Arc<Mutex<Option<HostPorts>>>;

pub fn create_port_slot() -> HostPortSlot {
    Arc::new(Mutex::new(None))
}
