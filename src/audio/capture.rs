use std::ops::{Deref, DerefMut};

use crate::error::CaptureError;

/// One block as delivered by a capture source: interleaved frames.
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedBlock {
    pub samples: Vec<f32>,
    pub channels: usize,
}

impl CapturedBlock {
    #[allow(dead_code)]
    pub fn mono(samples: Vec<f32>) -> Self {
        Self {
            samples,
            channels: 1,
        }
    }

    #[allow(dead_code)]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }
}

/// The audio collaborator: hands out blocks on demand and owns the device.
pub trait AudioCapture {
    fn sample_rate(&self) -> u32;

    /// Next block, or `None` once a finite source is exhausted.
    fn read_block(&mut self) -> Result<Option<CapturedBlock>, CaptureError>;

    /// Tear down the underlying session. Must be safe to call more than once.
    fn release(&mut self);

    /// Blocks left, when the source knows.
    fn remaining_blocks(&self) -> Option<u64> {
        None
    }
}

impl<C: AudioCapture + ?Sized> AudioCapture for Box<C> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn read_block(&mut self) -> Result<Option<CapturedBlock>, CaptureError> {
        (**self).read_block()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn remaining_blocks(&self) -> Option<u64> {
        (**self).remaining_blocks()
    }
}

/// Releases the wrapped capture when dropped, on every exit path.
pub struct CaptureSession<C: AudioCapture> {
    capture: C,
}

impl<C: AudioCapture> CaptureSession<C> {
    pub fn new(capture: C) -> Self {
        Self { capture }
    }
}

impl<C: AudioCapture> Deref for CaptureSession<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.capture
    }
}

impl<C: AudioCapture> DerefMut for CaptureSession<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.capture
    }
}

impl<C: AudioCapture> Drop for CaptureSession<C> {
    fn drop(&mut self) {
        self.capture.release();
    }
}

/// Average interleaved channels down to mono.
pub fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Probe {
        released: Rc<Cell<u32>>,
    }

    impl AudioCapture for Probe {
        fn sample_rate(&self) -> u32 {
            44_100
        }

        fn read_block(&mut self) -> Result<Option<CapturedBlock>, CaptureError> {
            Err(CaptureError::Disconnected)
        }

        fn release(&mut self) {
            self.released.set(self.released.get() + 1);
        }
    }

    #[test]
    fn downmix_averages_frames() {
        let stereo = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(downmix(&stereo, 2), vec![0.5, 0.5, 0.0]);
        assert_eq!(downmix(&stereo, 1), stereo.to_vec());
    }

    #[test]
    fn session_releases_on_error_path() {
        let released = Rc::new(Cell::new(0));
        let result = (|| {
            let mut session = CaptureSession::new(Probe {
                released: released.clone(),
            });
            session.read_block()
        })();
        assert!(result.is_err());
        assert_eq!(released.get(), 1);
    }

    #[test]
    fn block_counts_frames() {
        let block = CapturedBlock {
            samples: vec![0.0; 8],
            channels: 2,
        };
        assert_eq!(block.frames(), 4);
    }
}
