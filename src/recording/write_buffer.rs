/// Linear accumulator of samples waiting for a storage write.
///
/// Never exceeds its capacity: [`push`](Self::push) copies only what fits and
/// reports how much it took, leaving the rest for the caller to retry after a
/// flush.
pub struct WriteBuffer {
    buf: Box<[i16]>,
    len: usize,
}

impl WriteBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0i16; capacity.max(1)].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.len
    }

    /// Copy as many of `samples` as fit. Returns the number copied.
    pub fn push(&mut self, samples: &[i16]) -> usize {
        let n = samples.len().min(self.remaining());
        self.buf[self.len..self.len + n].copy_from_slice(&samples[..n]);
        self.len += n;
        n
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.buf[..self.len]
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}
