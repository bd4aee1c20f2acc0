//! In-memory transport and clock for tests.
//!
//! # Why hand-written doubles?
//!
//! The engine takes ownership of its transport, so a test cannot keep a
//! `&mut` to it.  Both doubles here are cheap handles over shared state:
//! clone one, give the clone to the engine, and inspect or drive the
//! original from the test.
//!
//! ```ignore
//! let transport = RecordingTransport::new();
//! engine.connect(Box::new(transport.clone()))?;
//!
//! transport.push_inbound(&[0, 0, 1, 0, 200]);
//! engine.poll()?;
//!
//! assert_eq!(transport.sent_messages()[0].command, Command::HardwareLogin);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::protocol::{decode_message, Decoded, Message, MAX_BODY_LEN};
use crate::transport::{Clock, Transport, TransportError};

#[derive(Debug, Default)]
struct TransportState {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    close_calls: usize,
    fail_sends: bool,
    fail_receives: bool,
}

/// A transport that records every frame sent and replays scripted inbound
/// chunks, one chunk per `receive` call.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    state: Arc<Mutex<TransportState>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, TransportState> {
        // A poisoned lock only means another test thread panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queues `bytes` to be returned by a future `receive` call.
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.state().inbound.push_back(bytes.to_vec());
    }

    /// Makes every subsequent `send` fail with an I/O error.
    pub fn fail_sends(&self, fail: bool) {
        self.state().fail_sends = fail;
    }

    /// Makes every subsequent `receive` fail with [`TransportError::Closed`].
    pub fn fail_receives(&self, fail: bool) {
        self.state().fail_receives = fail;
    }

    /// Raw frames passed to `send`, in order.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state().sent.clone()
    }

    /// Frames passed to `send`, decoded.  Each `send` carries one frame.
    pub fn sent_messages(&self) -> Vec<Message> {
        self.state()
            .sent
            .iter()
            .filter_map(|frame| match decode_message(frame, MAX_BODY_LEN) {
                Ok(Decoded::Complete { message, .. }) => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Forgets all recorded frames.
    pub fn clear_sent(&self) {
        self.state().sent.clear();
    }

    pub fn close_calls(&self) -> usize {
        self.state().close_calls
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state();
        if state.fail_sends {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted send failure",
            )));
        }
        state.sent.push(bytes.to_vec());
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.state();
        if state.fail_receives {
            return Err(TransportError::Closed);
        }
        let Some(mut chunk) = state.inbound.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            // Whatever did not fit is delivered by the next call.
            state.inbound.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    fn close(&mut self) {
        self.state().close_calls += 1;
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::Relaxed);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}
