//! Best-effort crash-dump retrieval.
//!
//! When a puppy's previous application crashed, its bootloader keeps the
//! dump in the tail of application flash. Saving it is strictly
//! best-effort: any failure is swallowed and reported as `false`, never
//! escalated. A dump is diagnostics, not a boot requirement.

use std::path::{Path, PathBuf};

use opengantry_puppy_boot_protocol::{HwInfo, MAX_RESPONSE_DATA_LEN};
use tracing::debug;

use crate::dock::Dock;
use crate::protocol::BootloaderProtocol;

/// Dump region size: the last 32 KiB of application flash.
pub const CRASH_DUMP_SIZE: u32 = 32 * 1024;

/// Fixed per-dock output path under the dump directory.
pub fn dump_path(dir: &Path, dock: Dock) -> PathBuf {
    dir.join(format!("puppy_dump_{}.bin", dock.index()))
}

/// Try to download the dock's crash dump into its fixed path.
///
/// Returns whether a dump was saved. An all-0xFF first chunk means the
/// region is erased and there is nothing to fetch.
pub fn download_crash_dump(
    protocol: &mut BootloaderProtocol<'_>,
    hw_info: &HwInfo,
    dir: &Path,
    dock: Dock,
) -> bool {
    if hw_info.application_size <= CRASH_DUMP_SIZE {
        return false;
    }
    let region_offset = hw_info.application_size - CRASH_DUMP_SIZE;

    let mut first = [0u8; MAX_RESPONSE_DATA_LEN];
    if let Err(error) = protocol.read_flash(region_offset, &mut first) {
        debug!("Crash dump read from {dock} failed: {error}");
        return false;
    }
    if first.iter().all(|&byte| byte == 0xFF) {
        debug!("No crash dump present on {dock}");
        return false;
    }

    let mut dump = vec![0u8; CRASH_DUMP_SIZE as usize];
    dump[..first.len()].copy_from_slice(&first);
    if let Err(error) =
        protocol.read_flash(region_offset + first.len() as u32, &mut dump[first.len()..])
    {
        debug!("Crash dump read from {dock} failed: {error}");
        return false;
    }

    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let path = dump_path(dir, dock);
    match std::fs::write(&path, &dump) {
        Ok(()) => true,
        Err(error) => {
            debug!("Writing crash dump {} failed: {error}", path.display());
            false
        }
    }
}
