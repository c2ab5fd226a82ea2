/// Accumulates streamed 16-bit PCM into fixed-length f32 windows.
///
/// Each sample is scaled by `1/32768`. When the window fills, a copy is
/// emitted and the write offset returns to zero. Samples of the same chunk
/// that arrive after the window filled are discarded, so a window never
/// straddles two reads.
#[derive(Debug, Clone)]
pub struct WindowAccumulator {
    buffer: Vec<f32>,
    offset: usize,
}

impl WindowAccumulator {
    pub fn new(window_len: usize) -> Self {
        Self {
            buffer: vec![0.0; window_len],
            offset: 0,
        }
    }

    pub fn window_len(&self) -> usize {
        self.buffer.len()
    }

    /// Samples written into the current, incomplete window.
    pub fn filled(&self) -> usize {
        self.offset
    }

    /// Append one chunk, returning a completed window if this chunk filled it.
    pub fn push(&mut self, chunk: &[i16]) -> Option<Vec<f32>> {
        let room = self.buffer.len() - self.offset;
        let take = room.min(chunk.len());
        for (dst, &s) in self.buffer[self.offset..self.offset + take]
            .iter_mut()
            .zip(chunk)
        {
            *dst = s as f32 / 32_768.0;
        }
        self.offset += take;

        if self.offset >= self.buffer.len() && !self.buffer.is_empty() {
            self.offset = 0;
            return Some(self.buffer.clone());
        }
        None
    }

    /// Discard a partially filled window.
    pub fn reset(&mut self) {
        self.offset = 0;
    }
}
