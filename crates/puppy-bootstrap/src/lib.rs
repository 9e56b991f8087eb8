//! Puppy bootstrap for OpenGantry
//!
//! Before the printer can operate, the controller must find out which
//! satellite boards ("puppies") are present, verify or rewrite each one's
//! firmware, and start their applications, without ever trusting a
//! single unauthenticated claim from the far end of the bus. This crate
//! provides:
//!
//! - Transaction engine with bounded timeouts over a half-duplex bus
//! - Discovery and bus address assignment arbitrated by reset lines
//! - Salted-digest firmware verification with anti-replay chunk splitting
//! - Chunked, offset-addressed flashing with a single re-verify cycle
//! - Authenticated application start, re-checked by each puppy itself
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`protocol`]: command/response engine over the wire format
//! - [`bootstrap`]: the orchestrator running one attempt end to end
//! - [`transport`]: the bus trait and its exclusion guard
//! - [`control`]: per-dock reset-line capability
//! - [`dock`]: docks, puppy types, and the runtime dock set
//! - [`fingerprint`]: salted digests and the shared-salt chunk scheme
//! - [`firmware`]: firmware image storage
//! - [`crash_dump`]: best-effort dump retrieval
//! - [`config`]: runtime configuration
//! - [`error`]: fatal error types
//!
//! # Trust model
//!
//! The controller verifies every puppy's firmware against a locally
//! computed salted digest, but the final go/no-go is always re-decided
//! by the puppy's own bootloader from the salt and fingerprint handed to
//! it at start. A compromised controller cannot force a mismatched image
//! to run, and a puppy cannot replay a sibling's digest because each
//! shared-salt group member proves a different slice of it.

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(rust_2018_idioms)]

pub mod bootstrap;
pub mod config;
pub mod control;
pub mod crash_dump;
pub mod dock;
pub mod error;
pub mod fingerprint;
pub mod firmware;
pub mod prelude;
pub mod progress;
pub mod protocol;
pub mod result;
pub mod transport;

pub use bootstrap::{MINIMAL_BOOTLOADER_VERSION, PuppyBootstrap};
pub use config::{BootstrapConfig, MAX_TOOL_HEADS};
pub use control::DockControl;
pub use crash_dump::{CRASH_DUMP_SIZE, download_crash_dump, dump_path};
pub use dock::{DOCK_COUNT, Dock, PuppyType};
pub use error::BootstrapError;
pub use fingerprint::{
    DigestChunk, Fingerprint, FingerprintTable, calculate_fingerprint, chunk_for_group_member,
};
pub use firmware::FirmwareStore;
pub use progress::{FlashingStage, Progress, ProgressHook};
pub use protocol::{
    BootloaderProtocol, TIMEOUT_FIRST_BYTE, TIMEOUT_INTER_BYTE, TIMEOUT_REMOTE_HASH,
    TransactionError, TransactionResult,
};
pub use result::BootstrapResult;
pub use transport::{BusError, PuppyBus, SharedBus};
