//! Bootstrap configuration.
//!
//! The dock population is decided here, once, at startup; nothing in the
//! bootstrap branches on build-time features.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dock::Dock;

/// Tool-head slots physically present on the frame.
pub const MAX_TOOL_HEADS: u8 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Number of tool-head docks populated on this printer (0..=5).
    pub tool_head_count: u8,

    /// Whether the extension-board dock exists on this printer.
    pub extension_board: bool,

    /// Directory holding one firmware image per puppy type.
    pub firmware_dir: PathBuf,

    /// Where best-effort crash dumps get written.
    pub crash_dump_dir: PathBuf,

    /// Whole-attempt retry budget before the bootstrap turns fatal.
    pub max_attempts: u32,

    /// Fallback mode: accept each puppy's self-reported fingerprint as
    /// the trusted value instead of hashing a local image. Used when no
    /// local images are provisioned; trusts the remote more.
    pub remote_fingerprints: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            tool_head_count: 1,
            extension_board: false,
            firmware_dir: PathBuf::from("/internal/res/puppies"),
            crash_dump_dir: PathBuf::from("/internal/dumps"),
            max_attempts: 3,
            remote_fingerprints: false,
        }
    }
}

impl BootstrapConfig {
    /// The runtime dock set, in scan order. The bed dock always exists;
    /// tool heads and the extension follow the config.
    pub fn enabled_docks(&self) -> Vec<Dock> {
        let tools = self.tool_head_count.min(MAX_TOOL_HEADS);
        let mut docks = vec![Dock::Bed];
        docks.extend(
            [Dock::Tool1, Dock::Tool2, Dock::Tool3, Dock::Tool4, Dock::Tool5]
                .into_iter()
                .take(tools as usize),
        );
        if self.extension_board {
            docks.push(Dock::Extension);
        }
        docks
    }
}
