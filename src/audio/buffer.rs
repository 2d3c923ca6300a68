//! Per-cycle staging buffers
//!
//! A soft buffer is the flat view the network layer reads and writes: one
//! period of samples per channel, stored contiguously and indexed by channel.

/// Contiguous per-channel staging area
#[derive(Debug, Clone, Default)]
pub struct SoftBuffer {
    samples: Vec<f32>,
    channels: usize,
    frames: usize,
}

impl SoftBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `channels` x `frames` samples of silence, replacing any
    /// previous allocation.
    pub fn allocate(&mut self, channels: usize, frames: usize) {
        self.samples = vec![0.0; channels * frames];
        self.channels = channels;
        self.frames = frames;
    }

    /// Free the storage. Returns false if nothing was allocated.
    pub fn release(&mut self) -> bool {
        let was_allocated = self.is_allocated();
        self.samples = Vec::new();
        self.channels = 0;
        self.frames = 0;
        was_allocated
    }

    pub fn is_allocated(&self) -> bool {
        !self.samples.is_empty()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames per channel
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channel(&self, channel: usize) -> Option<&[f32]> {
        if channel >= self.channels {
            return None;
        }
        let start = channel * self.frames;
        self.samples.get(start..start + self.frames)
    }

    pub fn channel_mut(&mut self, channel: usize) -> Option<&mut [f32]> {
        if channel >= self.channels {
            return None;
        }
        let start = channel * self.frames;
        self.samples.get_mut(start..start + self.frames)
    }

    pub fn iter_channels(&self) -> std::slice::ChunksExact<'_, f32> {
        self.samples.chunks_exact(self.frames.max(1))
    }

    pub fn iter_channels_mut(&mut self) -> std::slice::ChunksExactMut<'_, f32> {
        self.samples.chunks_exact_mut(self.frames.max(1))
    }

    pub fn silence(&mut self) {
        self.samples.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_index() {
        let mut buffer = SoftBuffer::new();
        assert!(!buffer.is_allocated());
        assert_eq!(buffer.iter_channels().count(), 0);

        buffer.allocate(3, 4);
        assert_eq!(buffer.channels(), 3);
        assert_eq!(buffer.frames(), 4);
        assert_eq!(buffer.iter_channels().count(), 3);

        buffer.channel_mut(1).unwrap().fill(0.5);
        assert_eq!(buffer.channel(0).unwrap(), &[0.0; 4]);
        assert_eq!(buffer.channel(1).unwrap(), &[0.5; 4]);
        assert!(buffer.channel(3).is_none());
    }

    #[test]
    fn test_release_once() {
        let mut buffer = SoftBuffer::new();
        buffer.allocate(2, 16);
        assert!(buffer.release());
        assert!(!buffer.release());
        assert_eq!(buffer.channels(), 0);
        assert!(buffer.channel(0).is_none());
    }
}
