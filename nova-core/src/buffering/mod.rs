//! Sample buffers.
//!
//! - [`chunk::AudioChunk`]: one capture read, reused every iteration.
//! - [`slice::SliceBuffer`]: double buffer that turns chunks into classifier slices.
//! - Lock-free SPSC rings (`ringbuf::HeapRb<f32>`) between the cpal device
//!   callbacks and the blocking driver calls. `push_slice` / `pop_slice` are
//!   wait-free and allocation-free, safe on the real-time audio thread.

pub mod chunk;
pub mod slice;

use ringbuf::{traits::Split, HeapRb};

pub use chunk::AudioChunk;
pub use ringbuf::traits::{Consumer, Observer, Producer};
pub use slice::{CompletedSlice, SliceBuffer};

/// Producer half, held by whichever side fills the ring.
pub type SampleProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by whichever side drains the ring.
pub type SampleConsumer = ringbuf::HeapCons<f32>;

/// Capture ring: 2^17 f32 samples ≈ 2.7 s at 48 kHz. The control loop reads
/// continuously, so this only has to absorb one slow classifier call.
pub const CAPTURE_RING_CAPACITY: usize = 1 << 17;

/// Output ring: 2^15 f32 samples ≈ 0.7 s at 48 kHz, the software analogue of
/// the DMA descriptor chain on the appliance.
pub const OUTPUT_RING_CAPACITY: usize = 1 << 15;

/// Create a matched producer/consumer pair backed by a heap-allocated ring buffer.
pub fn create_sample_ring(capacity: usize) -> (SampleProducer, SampleConsumer) {
    HeapRb::<f32>::new(capacity).split()
}
