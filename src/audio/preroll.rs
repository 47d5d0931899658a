//! Pre-roll ring buffer: keeps the most recent N samples so an auto-triggered
//! recording can start with the audio that led up to the trigger.
//!
//! Not synchronised; the pipeline worker owns it alongside session state.

/// Fixed-size ring of PCM samples. Pre-allocated, never grows.
pub struct PreRollBuffer {
    buffer: Box<[i16]>,
    /// Next write position
    head: usize,
    /// Valid samples, saturating at capacity
    len: usize,
}

impl PreRollBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0i16; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append samples, overwriting the oldest once full.
    pub fn push(&mut self, samples: &[i16]) {
        let capacity = self.capacity();
        if capacity == 0 {
            return;
        }

        // Only the newest `capacity` samples can survive
        let samples = &samples[samples.len().saturating_sub(capacity)..];

        let first = samples.len().min(capacity - self.head);
        self.buffer[self.head..self.head + first].copy_from_slice(&samples[..first]);
        let rest = &samples[first..];
        self.buffer[..rest.len()].copy_from_slice(rest);

        self.head = (self.head + samples.len()) % capacity;
        self.len = (self.len + samples.len()).min(capacity);
    }

    /// Hand out the buffered samples oldest-first as one or two contiguous
    /// runs (the second is empty unless the ring has wrapped), and mark the
    /// buffer empty.
    pub fn drain_oldest_first(&mut self) -> (&[i16], &[i16]) {
        let capacity = self.capacity();
        let len = std::mem::take(&mut self.len);
        if len == 0 {
            return (&[], &[]);
        }

        let start = (self.head + capacity - len) % capacity;
        if start + len <= capacity {
            (&self.buffer[start..start + len], &[])
        } else {
            let wrapped = start + len - capacity;
            (&self.buffer[start..], &self.buffer[..wrapped])
        }
    }

    /// Drop buffered samples without reading them.
    pub fn clear(&mut self) {
        self.len = 0;
    }
}
