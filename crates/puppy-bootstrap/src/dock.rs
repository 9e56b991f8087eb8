//! Docks and the puppy types they host.
//!
//! A dock is a fixed physical mounting position on the printer frame. The
//! full set is known at build time; the *enabled* subset is built once at
//! startup from [`BootstrapConfig`](crate::config::BootstrapConfig) and
//! every iteration in the bootstrap walks that runtime set.

use opengantry_puppy_boot_protocol::Address;
use serde::{Deserialize, Serialize};

/// Number of physical docks on the frame.
pub const DOCK_COUNT: usize = 7;

/// Physical mounting position for a satellite board, in bus-scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dock {
    Bed,
    Tool1,
    Tool2,
    Tool3,
    Tool4,
    Tool5,
    Extension,
}

impl Dock {
    /// Every dock, in the fixed discovery order.
    pub const ALL: [Dock; DOCK_COUNT] = [
        Dock::Bed,
        Dock::Tool1,
        Dock::Tool2,
        Dock::Tool3,
        Dock::Tool4,
        Dock::Tool5,
        Dock::Extension,
    ];

    pub fn index(self) -> u8 {
        match self {
            Dock::Bed => 0,
            Dock::Tool1 => 1,
            Dock::Tool2 => 2,
            Dock::Tool3 => 3,
            Dock::Tool4 => 4,
            Dock::Tool5 => 5,
            Dock::Extension => 6,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn puppy_type(self) -> PuppyType {
        match self {
            Dock::Bed => PuppyType::BedController,
            Dock::Extension => PuppyType::Extension,
            _ => PuppyType::ToolHead,
        }
    }

    /// Address this dock answers on during bootstrap.
    pub fn boot_address(self) -> Address {
        Address::bootloader(self.index())
    }

    /// Address this dock's puppy moves to once its application starts.
    pub fn app_address(self) -> Address {
        Address::application(self.index())
    }

    pub fn name(self) -> &'static str {
        match self {
            Dock::Bed => "bed",
            Dock::Tool1 => "tool 1",
            Dock::Tool2 => "tool 2",
            Dock::Tool3 => "tool 3",
            Dock::Tool4 => "tool 4",
            Dock::Tool5 => "tool 5",
            Dock::Extension => "extension",
        }
    }
}

impl std::fmt::Display for Dock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Logical device category a dock is expected to host. Selects the
/// firmware image and the expected hardware-type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PuppyType {
    BedController,
    ToolHead,
    Extension,
}

impl PuppyType {
    pub fn name(self) -> &'static str {
        match self {
            PuppyType::BedController => "bed",
            PuppyType::ToolHead => "tool",
            PuppyType::Extension => "extension",
        }
    }

    /// Firmware image file name under the configured firmware directory.
    pub fn firmware_file(self) -> &'static str {
        match self {
            PuppyType::BedController => "bed_controller.bin",
            PuppyType::ToolHead => "tool_head.bin",
            PuppyType::Extension => "extension_board.bin",
        }
    }

    /// Hardware-type code this puppy must report in its hardware info.
    ///
    /// `None` means the type cannot be determined cheaply before OTP access
    /// is available; the hardware-info gate is skipped and the minimum
    /// bootloader version is assumed.
    pub fn expected_hw_type(self) -> Option<u8> {
        match self {
            PuppyType::BedController => Some(0x01),
            PuppyType::ToolHead => Some(0x02),
            PuppyType::Extension => None,
        }
    }

    /// Whether every puppy of this type runs a byte-identical firmware
    /// image. Such docks form one salt group and split the digest between
    /// them during verification.
    pub fn shares_firmware(self) -> bool {
        matches!(self, PuppyType::ToolHead)
    }
}

impl std::fmt::Display for PuppyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip() {
        for dock in Dock::ALL {
            assert_eq!(Dock::from_index(dock.index()), Some(dock));
        }
        assert_eq!(Dock::from_index(7), None);
    }

    #[test]
    fn test_scan_order_is_index_order() {
        for window in Dock::ALL.windows(2) {
            assert!(window[0].index() < window[1].index());
        }
    }

    #[test]
    fn test_addresses_track_index() {
        assert_eq!(Dock::Bed.boot_address(), Address::bootloader(0));
        assert_eq!(Dock::Tool3.boot_address(), Address::bootloader(3));
        assert_eq!(Dock::Extension.app_address(), Address::application(6));
    }

    #[test]
    fn test_only_tool_heads_share_firmware() {
        assert!(PuppyType::ToolHead.shares_firmware());
        assert!(!PuppyType::BedController.shares_firmware());
        assert!(!PuppyType::Extension.shares_firmware());
    }

    #[test]
    fn test_extension_skips_hardware_gate() {
        assert_eq!(PuppyType::Extension.expected_hw_type(), None);
        assert!(PuppyType::BedController.expected_hw_type().is_some());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Dock::Tool2).expect("serialize failed");
        assert_eq!(json, "\"tool2\"");
        let back: Dock = serde_json::from_str(&json).expect("deserialize failed");
        assert_eq!(back, Dock::Tool2);
    }
}
