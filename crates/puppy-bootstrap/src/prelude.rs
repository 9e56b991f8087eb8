//! Convenience re-exports for bootstrap consumers.

pub use crate::bootstrap::{MINIMAL_BOOTLOADER_VERSION, PuppyBootstrap};
pub use crate::config::BootstrapConfig;
pub use crate::control::DockControl;
pub use crate::crash_dump::{CRASH_DUMP_SIZE, dump_path};
pub use crate::dock::{DOCK_COUNT, Dock, PuppyType};
pub use crate::error::BootstrapError;
pub use crate::fingerprint::{DigestChunk, Fingerprint, chunk_for_group_member};
pub use crate::progress::{FlashingStage, Progress, ProgressHook};
pub use crate::protocol::{BootloaderProtocol, TransactionError, TransactionResult};
pub use crate::result::BootstrapResult;
pub use crate::transport::{BusError, PuppyBus, SharedBus};
