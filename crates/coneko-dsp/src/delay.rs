//! Multichannel pre-delay line.

use coneko_core::ProcessSpec;

/// Longest pre-delay the line can hold.
pub const MAX_PRE_DELAY_SECS: f64 = 1.0;

/// Circular delay applied to the wet signal.
///
/// Capacity is fixed at `prepare` time to one second plus one sample, so
/// changing the delay never allocates. Delays beyond capacity are clamped.
pub struct PreDelay {
    buffers: Vec<Vec<f32>>,
    write_pos: usize,
    delay_samples: usize,
    sample_rate: f64,
}

impl PreDelay {
    pub fn new(spec: &ProcessSpec) -> Self {
        let mut delay = Self {
            buffers: Vec::new(),
            write_pos: 0,
            delay_samples: 0,
            sample_rate: spec.sample_rate,
        };
        delay.prepare(spec);
        delay
    }

    /// Reallocate for `spec` and clear history. Not real-time safe.
    pub fn prepare(&mut self, spec: &ProcessSpec) {
        let capacity = (spec.sample_rate * MAX_PRE_DELAY_SECS).ceil() as usize + 1;
        self.buffers = vec![vec![0.0; capacity]; spec.channels];
        self.sample_rate = spec.sample_rate;
        self.write_pos = 0;
        self.delay_samples = self.delay_samples.min(capacity - 1);
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.buffers.first().map_or(1, Vec::len)
    }

    /// Delay in milliseconds, rounded to the nearest sample.
    #[inline]
    pub fn set_delay_ms(&mut self, ms: f32) {
        let samples = (f64::from(ms.max(0.0)) * self.sample_rate / 1000.0).round() as usize;
        self.set_delay_samples(samples);
    }

    #[inline]
    pub fn set_delay_samples(&mut self, samples: usize) {
        self.delay_samples = samples.min(self.capacity() - 1);
    }

    #[inline]
    pub fn delay_samples(&self) -> usize {
        self.delay_samples
    }

    pub fn process<C: AsMut<[f32]>>(&mut self, block: &mut [C], len: usize) {
        let capacity = self.capacity();
        let delay = self.delay_samples;
        let start = self.write_pos;

        for (buffer, channel) in self.buffers.iter_mut().zip(block.iter_mut()) {
            let mut write_pos = start;
            for sample in channel.as_mut()[..len].iter_mut() {
                buffer[write_pos] = *sample;
                *sample = buffer[(write_pos + capacity - delay) % capacity];
                write_pos = (write_pos + 1) % capacity;
            }
        }
        self.write_pos = (start + len) % capacity;
    }

    pub fn reset(&mut self) {
        for buffer in &mut self.buffers {
            buffer.fill(0.0);
        }
        self.write_pos = 0;
    }
}
