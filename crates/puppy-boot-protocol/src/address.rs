//! Bus address ranges for the bootstrap and application protocol phases.
//!
//! Every un-bootstrapped puppy listens on the default address. During
//! bootstrap each dock is assigned `0x0A + index`; once its application
//! starts it moves to `0x1A + index` (owned by the post-boot protocol,
//! not this crate). The ranges never overlap and must never be renumbered.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(static_mut_refs)]

/// Upper bound on physically addressable docks, bounded by the gap
/// between the bootloader and application address bases.
pub const MAX_DOCK_COUNT: usize = 16;

const BOOT_BASE: u8 = 0x0A;
const APP_BASE: u8 = 0x1A;

/// A puppy bus address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub u8);

impl Address {
    /// Address every puppy listens on straight out of reset.
    pub const DEFAULT: Address = Address(0x00);

    /// Bootstrap-phase address for a dock index.
    pub fn bootloader(dock_index: u8) -> Self {
        debug_assert!((dock_index as usize) < MAX_DOCK_COUNT);
        Address(BOOT_BASE + dock_index)
    }

    /// Application-phase address for a dock index. Assigned here, used by
    /// the post-boot polling component.
    pub fn application(dock_index: u8) -> Self {
        debug_assert!((dock_index as usize) < MAX_DOCK_COUNT);
        Address(APP_BASE + dock_index)
    }

    pub fn is_default(self) -> bool {
        self == Self::DEFAULT
    }

    /// Dock index if this is a bootstrap-phase address.
    pub fn bootloader_dock_index(self) -> Option<u8> {
        if (BOOT_BASE..APP_BASE).contains(&self.0) {
            Some(self.0 - BOOT_BASE)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}
