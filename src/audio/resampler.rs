//! Streaming linear interpolation at a rational ratio
//!
//! The read position is kept as an integer count of `1 / time_b` steps, so
//! how many frames a given ratio produces is exact and does not wander with
//! floating point accumulation.

/// Resample ratio `time_b / time_a`: output frames per input frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    pub time_a: u64,
    pub time_b: u64,
}

impl Ratio {
    pub const UNITY: Ratio = Ratio { time_a: 1, time_b: 1 };

    /// Returns `None` if either side is zero.
    pub fn new(time_a: u64, time_b: u64) -> Option<Self> {
        if time_a == 0 || time_b == 0 {
            None
        } else {
            Some(Self { time_a, time_b })
        }
    }

    pub fn as_f64(self) -> f64 {
        self.time_b as f64 / self.time_a as f64
    }
}

impl Default for Ratio {
    fn default() -> Self {
        Self::UNITY
    }
}

/// Linear interpolator fed one input sample at a time.
///
/// Output `j` sits at input position `j * time_a / time_b - 1`, one sample
/// behind the input, with silence before the first sample. An output is only
/// produced once the input sample after its position has arrived, so `n`
/// inputs give `ceil(n * time_b / time_a)` outputs in total, however the
/// input is chunked. The interpolator pulls input lazily and can stop
/// anywhere (source exhausted, sink full) and resume on the next call.
#[derive(Debug, Clone)]
pub struct LinearInterpolator {
    ratio: Ratio,
    prev: f32,
    next: f32,
    /// Position past `prev`, in units of `1 / ratio.time_b`. `next` sits
    /// one full unit (`time_b`) past `prev`.
    phase: u64,
}

impl LinearInterpolator {
    pub fn new() -> Self {
        // `next` is the silent sample at position -1 and the first output
        // lands exactly on it.
        Self {
            ratio: Ratio::UNITY,
            prev: 0.0,
            next: 0.0,
            phase: Ratio::UNITY.time_b,
        }
    }

    pub fn ratio(&self) -> Ratio {
        self.ratio
    }

    /// Change the ratio, keeping the current fractional position.
    pub fn set_ratio(&mut self, ratio: Ratio) {
        if ratio.time_b != self.ratio.time_b {
            let scaled = self.phase as u128 * ratio.time_b as u128 / self.ratio.time_b as u128;
            self.phase = u64::try_from(scaled).unwrap_or(u64::MAX);
        }
        self.ratio = ratio;
    }

    /// Back to the initial state: unity ratio, no history.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Produce the next output sample, pulling input as needed.
    ///
    /// Returns `None` when `pull` runs dry before the output position is
    /// covered; calling again with more input continues where it stopped.
    #[inline]
    pub fn next_sample(&mut self, mut pull: impl FnMut() -> Option<f32>) -> Option<f32> {
        let den = self.ratio.time_b;
        while self.phase >= den {
            let sample = pull()?;
            self.prev = self.next;
            self.next = sample;
            self.phase -= den;
        }

        let value = if self.phase == 0 {
            self.prev
        } else {
            let frac = self.phase as f32 / den as f32;
            self.prev + (self.next - self.prev) * frac
        };
        self.phase += self.ratio.time_a;
        Some(value)
    }
}

impl Default for LinearInterpolator {
    fn default() -> Self {
        Self::new()
    }
}
