/// Pre-allocated stereo render buffer, so the audio callback never allocates.
///
/// Split left/right storage matches `SynthEngine::render(&mut [f32], &mut [f32])`.
pub struct RenderBuffer {
    left_data: Vec<f32>,
    right_data: Vec<f32>,
    /// Number of sample frames.
    capacity: usize,
}

impl RenderBuffer {
    /// Create a buffer that can hold `capacity` sample frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            left_data: vec![0.0; capacity],
            right_data: vec![0.0; capacity],
            capacity,
        }
    }

    /// Number of sample frames this buffer can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Mutable views of the first `n` frames of both channels.
    pub fn channels_mut(&mut self, n: usize) -> (&mut [f32], &mut [f32]) {
        let n = n.min(self.capacity);
        (&mut self.left_data[..n], &mut self.right_data[..n])
    }

    /// Write the first `n` frames into an interleaved output buffer with
    /// `channels` samples per frame, starting at frame `offset`.
    ///
    /// Mono outputs get the left channel; extra channels beyond two are zeroed.
    pub fn interleave_into(&self, out: &mut [f32], channels: usize, offset: usize, n: usize) {
        if channels == 0 {
            return;
        }
        let n = n.min(self.capacity);
        for (i, frame) in out.chunks_exact_mut(channels).skip(offset).take(n).enumerate() {
            frame[0] = self.left_data[i];
            if channels > 1 {
                frame[1] = self.right_data[i];
                frame[2..].fill(0.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_mut_is_clamped() {
        let mut buf = RenderBuffer::new(4);
        let (left, right) = buf.channels_mut(16);
        assert_eq!(left.len(), 4);
        assert_eq!(right.len(), 4);
    }

    #[test]
    fn test_interleave_stereo() {
        let mut buf = RenderBuffer::new(4);
        {
            let (left, right) = buf.channels_mut(2);
            left.copy_from_slice(&[0.1, 0.3]);
            right.copy_from_slice(&[0.2, 0.4]);
        }
        let mut out = vec![9.0; 8];
        buf.interleave_into(&mut out, 2, 1, 2);
        assert_eq!(out, vec![9.0, 9.0, 0.1, 0.2, 0.3, 0.4, 9.0, 9.0]);
    }

    #[test]
    fn test_interleave_mono_and_surround() {
        let mut buf = RenderBuffer::new(2);
        {
            let (left, right) = buf.channels_mut(2);
            left.copy_from_slice(&[0.5, 0.6]);
            right.copy_from_slice(&[0.7, 0.8]);
        }
        let mut mono = vec![0.0; 2];
        buf.interleave_into(&mut mono, 1, 0, 2);
        assert_eq!(mono, vec![0.5, 0.6]);

        let mut quad = vec![1.0; 8];
        buf.interleave_into(&mut quad, 4, 0, 2);
        assert_eq!(quad, vec![0.5, 0.7, 0.0, 0.0, 0.6, 0.8, 0.0, 0.0]);
    }
}
