//! Double buffer that turns capture chunks into classifier slices.
//!
//! ```text
//!   push(chunk) ──► [ active slice ]   (only mutable slice)
//!                   [ ready  slice ] ──► take_ready() / read_completed()
//! ```
//!
//! When the active slice fills up the roles swap and the write cursor resets.
//! The completed slice is handed out as a shared borrow of the buffer, so the
//! compiler rejects any `push` while the classifier still holds it.
//!
//! If nobody takes a ready slice before the next swap, that slice is
//! overwritten (drop-oldest). Capture never waits on inference.

use tracing::trace;

use crate::error::{NovaError, Result};

/// A completed slice together with the write epoch it was filled in.
#[derive(Debug, Clone, Copy)]
pub struct CompletedSlice<'a> {
    pub samples: &'a [i16],
    /// Epoch in which the writer filled this slice. Always strictly lower than
    /// [`SliceBuffer::write_epoch`] while the borrow is alive.
    pub epoch: u64,
}

pub struct SliceBuffer {
    slices: [Box<[i16]>; 2],
    active: usize,
    cursor: usize,
    ready: bool,
    /// Epoch of the slice currently being written. Bumped on every swap.
    write_epoch: u64,
    ready_epoch: u64,
    overruns: u64,
}

impl SliceBuffer {
    /// Allocate both slices up front.
    ///
    /// # Errors
    /// `InvalidConfig` for a zero length, `AllocationFailure` if either slice
    /// cannot be obtained.
    pub fn new(slice_len: usize) -> Result<Self> {
        if slice_len == 0 {
            return Err(NovaError::InvalidConfig("slice length must be > 0".into()));
        }
        Ok(Self {
            slices: [alloc_slice(slice_len)?, alloc_slice(slice_len)?],
            active: 0,
            cursor: 0,
            ready: false,
            write_epoch: 0,
            ready_epoch: 0,
            overruns: 0,
        })
    }

    /// Append samples to the active slice, swapping whenever it fills up.
    /// A chunk that straddles the boundary continues in the new active slice.
    ///
    /// Returns the number of slices completed by this call.
    pub fn push(&mut self, mut samples: &[i16]) -> usize {
        let len = self.slice_len();
        let mut completed = 0;

        while !samples.is_empty() {
            let n = (len - self.cursor).min(samples.len());
            self.slices[self.active][self.cursor..self.cursor + n].copy_from_slice(&samples[..n]);
            self.cursor += n;
            samples = &samples[n..];

            if self.cursor == len {
                self.swap();
                completed += 1;
            }
        }

        completed
    }

    fn swap(&mut self) {
        if self.ready {
            self.overruns += 1;
            trace!(
                epoch = self.ready_epoch,
                overruns = self.overruns,
                "ready slice not consumed, overwriting"
            );
        }
        self.ready = true;
        self.ready_epoch = self.write_epoch;
        self.active ^= 1;
        self.cursor = 0;
        self.write_epoch += 1;
    }

    /// Take the newest completed slice if one has not been taken yet.
    pub fn take_ready(&mut self) -> Option<CompletedSlice<'_>> {
        if !self.ready {
            return None;
        }
        self.ready = false;
        Some(self.read_completed())
    }

    /// The slice that is not being written. Before the first swap this is the
    /// zero-initialised second slice.
    pub fn read_completed(&self) -> CompletedSlice<'_> {
        CompletedSlice {
            samples: &self.slices[self.active ^ 1],
            epoch: self.ready_epoch,
        }
    }

    pub fn has_ready(&self) -> bool {
        self.ready
    }

    /// Drop any partial slice and any untaken ready slice.
    /// Used after a conversation so stale audio is never classified.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.ready = false;
    }

    pub fn slice_len(&self) -> usize {
        self.slices[0].len()
    }

    /// Samples written into the active slice so far.
    pub fn fill(&self) -> usize {
        self.cursor
    }

    pub fn write_epoch(&self) -> u64 {
        self.write_epoch
    }

    /// Ready slices overwritten before anyone took them.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}

fn alloc_slice(len: usize) -> Result<Box<[i16]>> {
    let mut v: Vec<i16> = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| NovaError::AllocationFailure {
            bytes: len * std::mem::size_of::<i16>(),
        })?;
    v.resize(len, 0);
    Ok(v.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sample value encodes its absolute position in the capture stream.
    fn counter_chunk(start: usize, len: usize) -> Vec<i16> {
        (start..start + len).map(|i| (i % 30_000) as i16).collect()
    }

    #[test]
    fn swap_happens_exactly_when_slice_fills() {
        let mut sb = SliceBuffer::new(8).unwrap();
        assert_eq!(sb.push(&counter_chunk(0, 4)), 0);
        assert!(!sb.has_ready());
        assert_eq!(sb.push(&counter_chunk(4, 4)), 1);
        assert!(sb.has_ready());
        assert_eq!(sb.fill(), 0);

        let slice = sb.take_ready().unwrap();
        assert_eq!(slice.samples, counter_chunk(0, 8).as_slice());
        assert_eq!(slice.epoch, 0);
        assert!(sb.take_ready().is_none());
    }

    #[test]
    fn straddling_chunk_carries_remainder() {
        let mut sb = SliceBuffer::new(5).unwrap();
        assert_eq!(sb.push(&counter_chunk(0, 7)), 1);
        assert_eq!(sb.fill(), 2);
        assert_eq!(sb.read_completed().samples, counter_chunk(0, 5).as_slice());
    }

    #[test]
    fn reader_never_sees_the_epoch_being_written() {
        let slice_len = 40;
        let mut sb = SliceBuffer::new(slice_len).unwrap();
        let mut pos = 0usize;
        let mut taken = 0;

        for (i, size) in [7usize, 13, 40, 1, 29, 64, 3, 17].iter().cycle().take(200).enumerate() {
            sb.push(&counter_chunk(pos, *size));
            pos += size;

            // Skip some reads so drop-oldest is exercised too.
            if i % 3 == 2 {
                continue;
            }
            let write_epoch = sb.write_epoch();
            if let Some(slice) = sb.take_ready() {
                assert!(slice.epoch < write_epoch, "read overlapped the write epoch");
                let start = slice.epoch as usize * slice_len;
                assert_eq!(slice.samples, counter_chunk(start, slice_len).as_slice());
                taken += 1;
            }
        }

        assert!(taken > 0);
        assert!(sb.overruns() > 0);
    }

    #[test]
    fn unread_slice_is_overwritten_by_newer_one() {
        let mut sb = SliceBuffer::new(4).unwrap();
        sb.push(&counter_chunk(0, 4));
        sb.push(&counter_chunk(4, 4));
        assert_eq!(sb.overruns(), 1);

        let slice = sb.take_ready().unwrap();
        assert_eq!(slice.epoch, 1);
        assert_eq!(slice.samples, counter_chunk(4, 4).as_slice());
    }

    #[test]
    fn reset_discards_partial_and_ready() {
        let mut sb = SliceBuffer::new(4).unwrap();
        sb.push(&counter_chunk(0, 6));
        sb.reset();
        assert!(!sb.has_ready());
        assert_eq!(sb.fill(), 0);
    }

    #[test]
    fn zero_length_is_rejected() {
        assert!(matches!(
            SliceBuffer::new(0),
            Err(NovaError::InvalidConfig(_))
        ));
    }
}
