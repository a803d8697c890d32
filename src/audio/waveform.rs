//! Display buffer for captured audio and level metering
//!
//! The poller drains display blocks from the capture buffer and pushes them
//! here. The buffer keeps a bounded window of the most recent samples for
//! the plot, the peak of the last drained batch for a level bar, and RMS
//! bars for a compact meter.

use std::collections::VecDeque;

/// Full-scale magnitude of a 16-bit sample.
pub const FULL_SCALE: f32 = 32768.0;

/// EMA smoothing factor (0.3 = 30% new value, 70% previous)
const EMA_ALPHA: f32 = 0.3;

/// Bounded window of display samples
pub struct WaveformBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
    sample_rate: u32,
    /// Total samples pushed since the last clear, including those that fell
    /// out of the window.
    total_pushed: u64,
    last_peak: f32,
}

impl WaveformBuffer {
    /// A buffer holding at most `window_secs` of audio.
    pub fn new(sample_rate: u32, window_secs: u32) -> Self {
        let capacity = (sample_rate as usize * window_secs as usize).max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(1 << 20)),
            capacity,
            sample_rate,
            total_pushed: 0,
            last_peak: 0.0,
        }
    }

    /// Add one drained batch, removing the oldest samples if at capacity.
    /// The batch peak replaces the previous one, even when the batch is empty.
    pub fn push_samples(&mut self, samples: &[f32]) {
        self.last_peak = batch_peak(samples);
        self.total_pushed += samples.len() as u64;

        let len = samples.len();
        if len >= self.capacity {
            self.samples.clear();
            self.samples.extend(&samples[len - self.capacity..]);
            return;
        }

        let to_remove = (self.samples.len() + len).saturating_sub(self.capacity);
        if to_remove > 0 {
            self.samples.drain(0..to_remove);
        }
        self.samples.extend(samples);
    }

    /// Largest magnitude in the last pushed batch, 0 to 32768.
    pub fn peak(&self) -> f32 {
        self.last_peak
    }

    /// The windowed samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }

    /// Divide the window into `N` segments and compute each segment's RMS,
    /// normalized to 0.0-1.0.
    pub fn rms_bars<const N: usize>(&self) -> [f32; N] {
        let mut bars = [0.0f32; N];
        if self.samples.is_empty() || N == 0 {
            return bars;
        }

        let per_bar = (self.samples.len() / N).max(1);
        for (idx, bar) in bars.iter_mut().enumerate() {
            let start = idx * per_bar;
            if start >= self.samples.len() {
                break;
            }
            let end = ((idx + 1) * per_bar).min(self.samples.len());
            let count = end - start;
            if count == 0 {
                continue;
            }

            let sum_squares: f64 = self
                .samples
                .range(start..end)
                .map(|&s| {
                    let normalized = s as f64 / FULL_SCALE as f64;
                    normalized * normalized
                })
                .sum();
            *bar = ((sum_squares / count as f64).sqrt() as f32).clamp(0.0, 1.0);
        }
        bars
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Seconds pushed since the last clear.
    pub fn duration_secs(&self) -> f64 {
        self.total_pushed as f64 / self.sample_rate as f64
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.total_pushed = 0;
        self.last_peak = 0.0;
    }
}

fn batch_peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .fold(0.0f32, |peak, &s| peak.max(s.abs()))
        .min(FULL_SCALE)
}

/// EMA (Exponential Moving Average) smoothing for a bar meter
///
/// smoothed[i] = alpha * current[i] + (1 - alpha) * previous[i]
pub struct LevelMeter<const N: usize> {
    prev_bars: [f32; N],
    initialized: bool,
}

impl<const N: usize> LevelMeter<N> {
    pub fn new() -> Self {
        Self {
            prev_bars: [0.0f32; N],
            initialized: false,
        }
    }

    /// Smooth `bars` in place.
    pub fn apply(&mut self, bars: &mut [f32; N]) {
        if !self.initialized {
            // First frame: use raw values as initial state
            self.prev_bars = *bars;
            self.initialized = true;
            return;
        }

        for (bar, prev) in bars.iter_mut().zip(self.prev_bars.iter()) {
            *bar = EMA_ALPHA * *bar + (1.0 - EMA_ALPHA) * prev;
        }
        self.prev_bars = *bars;
    }

    pub fn reset(&mut self) {
        self.prev_bars = [0.0f32; N];
        self.initialized = false;
    }
}

impl<const N: usize> Default for LevelMeter<N> {
    fn default() -> Self {
        Self::new()
    }
}
