//! Fatal bootstrap errors.
//!
//! Per-transaction failures are [`TransactionError`](crate::protocol::TransactionError)
//! values and stay recoverable; everything here halts the whole boot
//! sequence and must be surfaced to the operator. The sole exception to
//! the two tiers is the best-effort crash-dump download, which reports a
//! boolean and never escalates.

use thiserror::Error;

use crate::dock::Dock;
use crate::protocol::TransactionError;

#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Protocol major version differs; talking further would be guesswork.
    #[error(
        "Puppy at {dock} speaks incompatible bootloader protocol {found:#06x}, controller wants {expected:#06x}"
    )]
    IncompatibleProtocol { dock: Dock, found: u16, expected: u16 },

    #[error("Puppy at {dock} bootloader {found:#06x} is older than required {minimum:#06x}")]
    BootloaderTooOld { dock: Dock, found: u16, minimum: u16 },

    #[error("Puppy at {dock} reports hardware type {found:#04x}, expected {expected:#04x}")]
    UnexpectedHardwareType { dock: Dock, found: u8, expected: u8 },

    /// A discovery query failed in a way that is not "empty dock".
    #[error("Discovery failed at {dock}: {source}")]
    DiscoveryFailed {
        dock: Dock,
        #[source]
        source: TransactionError,
    },

    #[error("Address assignment broadcast failed: {0}")]
    AddressAssignment(#[source] TransactionError),

    /// Someone still answers at the default address after every dock was
    /// processed: a wiring or assignment fault.
    #[error("A puppy still answers at the default address after assignment")]
    AddressCollision,

    #[error("Firmware image for {0} not found")]
    FirmwareNotFound(&'static str),

    #[error("Reading firmware image for {name} failed: {source}")]
    FirmwareRead {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Flash write to {name} failed: {source}")]
    WriteFlashFailed {
        name: &'static str,
        #[source]
        source: TransactionError,
    },

    /// The re-verify after a reflash still disagrees; flashing is not
    /// retried a second time.
    #[error("Fingerprint mismatch on {0} survived a reflash")]
    FingerprintMismatch(&'static str),

    #[error("Timed out waiting for {0} to finish fingerprint computation")]
    FingerprintTimeout(&'static str),

    #[error("Starting the application on {name} failed: {source}")]
    StartAppFailed {
        name: &'static str,
        #[source]
        source: TransactionError,
    },

    #[error("No puppy discovered on any dock")]
    NothingDiscovered,

    /// Minimal configuration unmet after all retries; names the first
    /// missing dock so the operator knows where to look.
    #[error("Required dock \"{0}\" has no responding puppy")]
    DockMissing(&'static str),
}
