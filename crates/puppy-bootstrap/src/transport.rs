//! Transport seam: the shared half-duplex bus and its exclusion guard.
//!
//! The bus driver itself is an external collaborator; this module only
//! defines the trait the transaction engine drives and the lock that
//! keeps the post-boot polling component (or anything else) from
//! interleaving traffic mid-protocol.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use thiserror::Error;

/// Transport-level failure. Distinct from protocol-level failures, which
/// come back as statuses; see
/// [`TransactionError`](crate::protocol::TransactionError).
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Bus I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bus unavailable: {0}")]
    Unavailable(String),
}

/// A half-duplex serial bus carrying bootloader frames.
///
/// Implementations must deliver `send` atomically (one frame, no
/// interleaving) and make `recv` return 0 when `timeout` elapses with no
/// byte available.
pub trait PuppyBus: Send {
    fn send(&mut self, frame: &[u8]) -> Result<(), BusError>;

    /// Read up to `buf.len()` bytes, waiting at most `timeout` for the
    /// first of them. Returns the number of bytes read; 0 means timeout.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, BusError>;

    /// Drop any unread bytes left over from an aborted exchange.
    fn flush_input(&mut self) -> Result<(), BusError>;
}

/// Shared handle to the one bus, mutually exclusive by construction.
///
/// The bootstrap orchestrator acquires the guard once and holds it for a
/// full attempt, so bus ownership only passes on after the attempt ends.
pub struct SharedBus<B: PuppyBus> {
    inner: Arc<Mutex<B>>,
}

impl<B: PuppyBus> SharedBus<B> {
    pub fn new(bus: B) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bus)),
        }
    }

    /// Block until the bus is free, then take exclusive ownership for the
    /// lifetime of the guard.
    pub fn lock(&self) -> MutexGuard<'_, B> {
        self.inner.lock()
    }
}

impl<B: PuppyBus> Clone for SharedBus<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
