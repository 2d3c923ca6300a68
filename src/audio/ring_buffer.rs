//! Resampling ring buffers
//!
//! One bounded single-producer/single-consumer buffer per audio channel and
//! direction, split into its two ends. The bridge holds the resampling end
//! and converts between the network clock and the local clock on the way in
//! (capture) or out (playback). The host audio callback holds the plain end.
//! Neither end takes a lock.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::audio::resampler::{LinearInterpolator, Ratio};

/// Create a capture ring holding up to `capacity` frames (at least one).
pub fn capture_ring(capacity: usize) -> (CaptureWriter, CaptureReader) {
    let (prod, cons) = HeapRb::<f32>::new(capacity.max(1)).split();
    let reset = Arc::new(AtomicBool::new(false));
    (
        CaptureWriter {
            prod,
            interpolator: LinearInterpolator::new(),
            reset: reset.clone(),
        },
        CaptureReader { cons, reset },
    )
}

/// Create a playback ring holding up to `capacity` frames (at least one).
pub fn playback_ring(capacity: usize) -> (PlaybackWriter, PlaybackReader) {
    let (prod, cons) = HeapRb::<f32>::new(capacity.max(1)).split();
    (
        PlaybackWriter { prod },
        PlaybackReader {
            cons,
            interpolator: LinearInterpolator::new(),
        },
    )
}

/// Bridge end of a capture ring: network audio in, resampled to local rate.
pub struct CaptureWriter {
    prod: HeapProd<f32>,
    interpolator: LinearInterpolator,
    /// Set by `reset`, cleared by the reader once it has emptied the ring
    reset: Arc<AtomicBool>,
}

impl CaptureWriter {
    /// Set the ratio for the next writes: `time_b / time_a` stored frames
    /// per source frame. Zero on either side is ignored.
    pub fn set_ratio(&mut self, time_a: u64, time_b: u64) {
        if let Some(ratio) = Ratio::new(time_a, time_b) {
            self.interpolator.set_ratio(ratio);
        }
    }

    pub fn ratio(&self) -> Ratio {
        self.interpolator.ratio()
    }

    /// Resample up to `count` source frames into the ring.
    ///
    /// Returns the number of source frames consumed. Less than `count`
    /// means the ring filled up (overflow). While a reset is waiting for the
    /// reader, input is dropped and reported as consumed.
    pub fn write_resample(&mut self, samples: &[f32], count: usize) -> usize {
        let source = &samples[..count.min(samples.len())];
        if self.reset_pending() {
            return source.len();
        }
        let Self { prod, interpolator, .. } = self;

        let mut consumed = 0;
        while !prod.is_full() {
            let value = interpolator.next_sample(|| {
                let sample = source.get(consumed).copied();
                if sample.is_some() {
                    consumed += 1;
                }
                sample
            });
            match value {
                Some(value) => {
                    let _ = prod.try_push(value);
                }
                None => break,
            }
        }
        consumed
    }

    /// Return to a 1:1 ratio and ask the reader to drop everything buffered.
    pub fn reset(&mut self) {
        self.interpolator.reset();
        self.reset.store(true, Ordering::Release);
    }

    fn reset_pending(&self) -> bool {
        self.reset.load(Ordering::Acquire)
    }

    /// Frames the reader will see, zero while a reset is pending
    pub fn read_space(&self) -> usize {
        if self.reset_pending() {
            0
        } else {
            self.prod.occupied_len()
        }
    }

    pub fn write_space(&self) -> usize {
        self.prod.vacant_len()
    }

    pub fn capacity(&self) -> usize {
        self.prod.capacity().get()
    }
}

/// Host end of a capture ring
pub struct CaptureReader {
    cons: HeapCons<f32>,
    reset: Arc<AtomicBool>,
}

impl CaptureReader {
    /// Read frames into `out`. Returns frames read; the rest of `out` is
    /// silenced.
    pub fn read(&mut self, out: &mut [f32]) -> usize {
        self.apply_reset();
        let read = self.cons.pop_slice(out);
        out[read..].fill(0.0);
        read
    }

    /// Frames available for reading
    pub fn read_space(&mut self) -> usize {
        self.apply_reset();
        self.cons.occupied_len()
    }

    fn apply_reset(&mut self) {
        // The writer stays idle until the flag drops, so nothing new lands
        // between the clear and the store.
        if self.reset.load(Ordering::Acquire) {
            self.cons.clear();
            self.reset.store(false, Ordering::Release);
        }
    }
}

/// Host end of a playback ring
pub struct PlaybackWriter {
    prod: HeapProd<f32>,
}

impl PlaybackWriter {
    /// Queue frames for the master. Returns frames written.
    pub fn write(&mut self, samples: &[f32]) -> usize {
        self.prod.push_slice(samples)
    }

    pub fn write_space(&self) -> usize {
        self.prod.vacant_len()
    }
}

/// Bridge end of a playback ring: local audio out, resampled to network rate.
pub struct PlaybackReader {
    cons: HeapCons<f32>,
    interpolator: LinearInterpolator,
}

impl PlaybackReader {
    /// Set the ratio for the next reads: `time_b / time_a` output frames per
    /// stored frame. Zero on either side is ignored.
    pub fn set_ratio(&mut self, time_a: u64, time_b: u64) {
        if let Some(ratio) = Ratio::new(time_a, time_b) {
            self.interpolator.set_ratio(ratio);
        }
    }

    pub fn ratio(&self) -> Ratio {
        self.interpolator.ratio()
    }

    /// Resample buffered frames into `out[..count]`.
    ///
    /// Returns the number of frames produced. Less than `count` means the
    /// ring ran dry (underflow); the remainder of `out[..count]` is
    /// silenced.
    pub fn read_resample(&mut self, out: &mut [f32], count: usize) -> usize {
        let count = count.min(out.len());
        let Self { cons, interpolator } = self;

        let mut produced = 0;
        for slot in out[..count].iter_mut() {
            match interpolator.next_sample(|| cons.try_pop()) {
                Some(value) => {
                    *slot = value;
                    produced += 1;
                }
                None => break,
            }
        }
        out[produced..count].fill(0.0);
        produced
    }

    /// Drop buffered frames and return to a 1:1 ratio.
    pub fn reset(&mut self) {
        self.cons.clear();
        self.interpolator.reset();
    }

    pub fn read_space(&self) -> usize {
        self.cons.occupied_len()
    }

    pub fn capacity(&self) -> usize {
        self.cons.capacity().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32).collect()
    }

    #[test]
    fn test_unity_roundtrip() {
        let (mut writer, mut reader) = capture_ring(64);
        let input = ramp(16);
        assert_eq!(writer.write_resample(&input, 16), 16);
        assert_eq!(writer.read_space(), 16);

        let mut out = vec![1.0; 16];
        assert_eq!(reader.read(&mut out), 16);
        assert_eq!(out[0], 0.0);
        assert_eq!(&out[1..], &input[..15]);
    }

    #[test]
    fn test_write_overflow_reports_short() {
        let (mut writer, _reader) = capture_ring(10);
        assert_eq!(writer.write_resample(&ramp(8), 8), 8);
        let written = writer.write_resample(&ramp(8), 8);
        assert_eq!(written, 2);
        assert_eq!(writer.write_space(), 0);
    }

    #[test]
    fn test_count_limits_source() {
        let (mut writer, _reader) = capture_ring(64);
        assert_eq!(writer.write_resample(&ramp(16), 4), 4);
        assert_eq!(writer.read_space(), 4);
        assert_eq!(writer.write_resample(&ramp(3), 8), 3);
    }

    #[test]
    fn test_read_underflow_silences_rest() {
        let (mut writer, mut reader) = playback_ring(64);
        writer.write(&[0.5, 0.5, 0.5]);

        let mut out = vec![1.0; 8];
        assert_eq!(reader.read_resample(&mut out, 6), 3);
        assert_eq!(&out[..6], &[0.0, 0.5, 0.5, 0.0, 0.0, 0.0]);
        assert_eq!(&out[6..], &[1.0, 1.0]);
    }

    #[test]
    fn test_read_resample_upsamples() {
        let (mut writer, mut reader) = playback_ring(64);
        writer.write(&[0.0, 1.0, 2.0]);
        reader.set_ratio(1, 2);

        let mut out = vec![9.0; 6];
        assert_eq!(reader.read_resample(&mut out, 6), 6);
        for (a, b) in out.iter().zip([0.0, 0.0, 0.0, 0.5, 1.0, 1.5]) {
            assert_relative_eq!(*a, b);
        }
        assert_eq!(reader.read_space(), 0);
    }

    #[test]
    fn test_capture_reset_reaches_reader() {
        let (mut writer, mut reader) = capture_ring(64);
        writer.set_ratio(1000, 1003);
        writer.write_resample(&ramp(32), 32);
        assert!(writer.read_space() > 0);

        writer.reset();
        assert_eq!(writer.read_space(), 0);
        assert_eq!(writer.ratio(), Ratio::UNITY);
        // Dropped until the reader has caught up
        assert_eq!(writer.write_resample(&ramp(8), 8), 8);

        let mut out = vec![1.0; 4];
        assert_eq!(reader.read(&mut out), 0);
        assert_eq!(out, vec![0.0; 4]);
        assert_eq!(writer.write_space(), 64);

        assert_eq!(writer.write_resample(&ramp(8), 8), 8);
        assert_eq!(reader.read_space(), 8);
    }

    #[test]
    fn test_playback_reset_empties_and_restores_unity() {
        let (mut writer, mut reader) = playback_ring(64);
        writer.write(&ramp(32));
        reader.set_ratio(1003, 1000);

        reader.reset();
        assert_eq!(reader.read_space(), 0);
        assert_eq!(writer.write_space(), 64);
        assert_eq!(reader.ratio(), Ratio::UNITY);
    }

    #[test]
    fn test_zero_ratio_ignored() {
        let (mut writer, _reader) = capture_ring(8);
        writer.set_ratio(3, 4);
        writer.set_ratio(0, 4);
        assert_eq!(writer.ratio(), Ratio::new(3, 4).unwrap());
    }

    fn check_output_len(a: u64, b: u64, n: usize) -> std::result::Result<(), TestCaseError> {
        let capacity = (n as u64 * b / a) as usize + 2;
        let (mut writer, _reader) = capture_ring(capacity);
        writer.set_ratio(a, b);
        prop_assert_eq!(writer.write_resample(&vec![0.25; n], n), n);

        let expected = (n as f64 * b as f64 / a as f64).round() as i64;
        let produced = writer.read_space() as i64;
        prop_assert!(
            (produced - expected).abs() <= 1,
            "a {} b {} n {}: produced {} expected {}",
            a,
            b,
            n,
            produced,
            expected
        );
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_ratio_output_len_any_ratio(a in 1u64..=64, b in 1u64..=64, n in 1usize..=512) {
            check_output_len(a, b, n)?;
        }

        #[test]
        fn prop_ratio_output_len_near_unity(a in 1000u64..100_000, ppm in -2000i64..2000, n in 1usize..=4096) {
            let b = (a as i64 + a as i64 * ppm / 1_000_000).max(1) as u64;
            check_output_len(a, b, n)?;
        }

        #[test]
        fn prop_no_overflow_within_capacity(chunks in proptest::collection::vec(1usize..256, 1..64)) {
            let capacity = 4096;
            let (mut writer, mut reader) = capture_ring(capacity);
            let mut drained = vec![0.0; capacity];
            for chunk in chunks {
                if writer.read_space() + chunk > capacity {
                    let pending = reader.read_space();
                    reader.read(&mut drained[..pending]);
                }
                prop_assert_eq!(writer.write_resample(&vec![0.1; chunk], chunk), chunk);
            }
        }
    }
}
