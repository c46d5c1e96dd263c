//! Adapts a blocking `Read` (an HTTP response body) into a non-blocking
//! [`ByteStream`].
//!
//! A reader thread fills a bounded byte queue; the control loop polls it.
//! When the queue is full the reader thread parks on a condvar, so a slow
//! speaker pushes back on the socket instead of growing memory.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use super::ByteStream;
use crate::error::{NovaError, Result};

/// Default queue bound: four playback reads.
pub const DEFAULT_QUEUE_BYTES: usize = 64 * 1024;

const READ_CHUNK: usize = 4 * 1024;

struct State {
    buf: VecDeque<u8>,
    connected: bool,
    /// Set when the consumer is dropped; tells the reader thread to stop.
    abandoned: bool,
    received: u64,
}

struct Shared {
    state: Mutex<State>,
    space: Condvar,
}

pub struct ReaderStream {
    shared: Arc<Shared>,
}

impl ReaderStream {
    /// Start pumping `reader` on a background thread.
    ///
    /// # Errors
    /// `Io` if the thread cannot be spawned.
    pub fn spawn<R: Read + Send + 'static>(reader: R, capacity: usize) -> Result<Self> {
        let capacity = capacity.max(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                buf: VecDeque::with_capacity(capacity),
                connected: true,
                abandoned: false,
                received: 0,
            }),
            space: Condvar::new(),
        });

        let pump_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("nova-reply-reader".into())
            .spawn(move || pump(reader, &pump_shared, capacity))
            .map_err(NovaError::Io)?;

        Ok(Self { shared })
    }

    /// Total bytes received from the peer so far, read or not.
    pub fn received(&self) -> u64 {
        self.shared.state.lock().received
    }
}

fn pump<R: Read>(mut reader: R, shared: &Shared, capacity: usize) {
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let room = {
            let mut st = shared.state.lock();
            while st.buf.len() >= capacity && !st.abandoned {
                shared.space.wait(&mut st);
            }
            if st.abandoned {
                break;
            }
            capacity - st.buf.len()
        };

        let want = room.min(chunk.len());
        match reader.read(&mut chunk[..want]) {
            Ok(0) => break,
            Ok(n) => {
                let mut st = shared.state.lock();
                st.buf.extend(&chunk[..n]);
                st.received += n as u64;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("reply body read failed: {e}");
                break;
            }
        }
    }

    let mut st = shared.state.lock();
    st.connected = false;
    debug!(received = st.received, "reply reader finished");
}

impl ByteStream for ReaderStream {
    fn available(&mut self) -> usize {
        self.shared.state.lock().buf.len()
    }

    fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut st = self.shared.state.lock();
        let n = st.buf.len().min(out.len());
        for (dst, src) in out.iter_mut().zip(st.buf.drain(..n)) {
            *dst = src;
        }
        drop(st);
        if n > 0 {
            self.shared.space.notify_one();
        }
        Ok(n)
    }

    fn connected(&self) -> bool {
        self.shared.state.lock().connected
    }
}

impl Drop for ReaderStream {
    fn drop(&mut self) {
        self.shared.state.lock().abandoned = true;
        self.shared.space.notify_all();
    }
}
