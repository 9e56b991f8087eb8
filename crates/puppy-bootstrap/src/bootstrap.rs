//! The bootstrap orchestrator.
//!
//! One attempt runs reset → discovery/address assignment → fingerprint
//! verification → (re)flash → application start, strictly sequentially
//! over the exclusively locked bus. Any fatal error abandons the whole
//! attempt; the only recovery is the bounded whole-attempt retry, which
//! starts again from hardware reset. There is no partial resume.

use std::io::{Read, Seek, SeekFrom};
use std::thread;
use std::time::{Duration, Instant};

use opengantry_puppy_boot_protocol::{
    Address, BOOTLOADER_PROTOCOL_VERSION, FINGERPRINT_SIZE, HwInfo, OTP_DATAMATRIX_LEN,
    parse_otp_datamatrix,
};
use tracing::{error, info, warn};

use crate::config::BootstrapConfig;
use crate::control::DockControl;
use crate::crash_dump::download_crash_dump;
use crate::dock::{DOCK_COUNT, Dock, PuppyType};
use crate::error::BootstrapError;
use crate::fingerprint::{
    DigestChunk, Fingerprint, FingerprintTable, calculate_fingerprint, chunk_for_group_member,
};
use crate::firmware::FirmwareStore;
use crate::progress::{FlashingStage, Progress, ProgressHook};
use crate::protocol::{BootloaderProtocol, TransactionError};
use crate::result::BootstrapResult;
use crate::transport::{PuppyBus, SharedBus};

/// Oldest puppy bootloader this controller still talks to.
pub const MINIMAL_BOOTLOADER_VERSION: u16 = 0x0100;

/// OTP reads were added to the bootloader protocol in this version.
const OTP_CAPABLE_PROTOCOL: u16 = 0x0302;

/// Settle time after releasing reset before a puppy can hear a frame.
const BOOT_SETTLE: Duration = Duration::from_millis(5);

/// Time for the address broadcast to fully drain off the wire before the
/// not-yet-processed docks get reset out from under it.
const BROADCAST_DRAIN: Duration = Duration::from_millis(50);

const RESET_PULSE: Duration = Duration::from_millis(1);

/// Puppies hash their flash in ~330 ms; leave generous headroom.
const FINGERPRINT_WAIT: Duration = Duration::from_millis(1000);

const FINGERPRINT_POLL: Duration = Duration::from_millis(50);

/// Discovers, verifies, flashes, and starts every puppy on the frame.
pub struct PuppyBootstrap<B: PuppyBus> {
    bus: SharedBus<B>,
    control: Box<dyn DockControl>,
    config: BootstrapConfig,
    docks: Vec<Dock>,
    store: FirmwareStore,
    progress: ProgressHook,
}

/// Per-attempt scratch state, discarded when the attempt ends.
struct AttemptState {
    hw_infos: [Option<HwInfo>; DOCK_COUNT],
}

impl<B: PuppyBus> PuppyBootstrap<B> {
    pub fn new(
        bus: SharedBus<B>,
        control: Box<dyn DockControl>,
        config: BootstrapConfig,
        progress: ProgressHook,
    ) -> Self {
        let docks = config.enabled_docks();
        let store = FirmwareStore::new(config.firmware_dir.clone());
        Self {
            bus,
            control,
            config,
            docks,
            store,
            progress,
        }
    }

    /// The runtime dock set this bootstrap walks, in scan order.
    pub fn docks(&self) -> &[Dock] {
        &self.docks
    }

    /// A sensible minimal configuration for a first boot: the bed plus
    /// the first tool head, as far as they are enabled.
    pub fn minimal_config(&self) -> BootstrapResult {
        let required: Vec<Dock> = self
            .docks
            .iter()
            .copied()
            .filter(|&dock| matches!(dock, Dock::Bed | Dock::Tool1))
            .collect();
        BootstrapResult::from_docks(&required)
    }

    /// Run the full bootstrap until `minimal_config` is satisfied or the
    /// retry budget is spent. Returns the discovered occupancy.
    pub fn run(&mut self, minimal_config: BootstrapResult) -> Result<BootstrapResult, BootstrapError> {
        self.report(Progress::new(0, FlashingStage::Start));

        // Exclusive bus ownership for the entire attempt; the post-boot
        // polling component only ever sees the bus after we return.
        let bus = self.bus.clone();
        let mut guard = bus.lock();
        let mut protocol = BootloaderProtocol::new(&mut *guard);

        let mut state = AttemptState {
            hw_infos: [None; DOCK_COUNT],
        };

        let mut attempts_left = self.config.max_attempts.max(1);
        let result = loop {
            self.reset_all_puppies();
            state.hw_infos = [None; DOCK_COUNT];

            let result = self.run_address_assignment(&mut protocol, &mut state)?;
            if result.satisfies(minimal_config) {
                break result;
            }

            attempts_left -= 1;
            if attempts_left == 0 {
                if result.discovered_num() == 0 {
                    return Err(BootstrapError::NothingDiscovered);
                }
                let missing = result
                    .first_missing(minimal_config)
                    .map(Dock::name)
                    .unwrap_or("unknown");
                return Err(BootstrapError::DockMissing(missing));
            }
            warn!("Not enough puppies discovered, will try again");
        };

        self.report(Progress::new(10, FlashingStage::CalculateFingerprint));

        let occupied: Vec<Dock> = self
            .docks
            .iter()
            .copied()
            .filter(|&dock| result.is_dock_occupied(dock))
            .collect();
        let percent_span = (80 / occupied.len().max(1)) as u8;
        let mut percent_base: u8 = 20;

        let mut table = FingerprintTable::default();
        self.assign_salts(&mut table, &occupied);

        // Kick off remote digest computation everywhere first, then hash
        // the local images while the puppies crunch in parallel.
        for &dock in &occupied {
            protocol.set_address(dock.boot_address());
            if let Err(err) = protocol.compute_fingerprint(table.salt(dock)) {
                warn!("Starting fingerprint computation on {dock} failed: {err}");
            }
        }
        let computation_start = Instant::now();

        if self.config.remote_fingerprints {
            for &dock in &occupied {
                protocol.set_address(dock.boot_address());
                self.wait_for_fingerprint(&mut protocol, computation_start, dock)?;
                let mut digest = Fingerprint::default();
                protocol
                    .get_fingerprint(digest.as_bytes_mut(), 0, FINGERPRINT_SIZE as u8)
                    .map_err(|_| BootstrapError::FingerprintMismatch(dock.puppy_type().name()))?;
                table.set_digest(dock, digest);
            }
        } else {
            self.calculate_expected_digests(&mut table, &occupied)?;
            for &dock in &occupied {
                protocol.set_address(dock.boot_address());
                self.wait_for_fingerprint(&mut protocol, computation_start, dock)?;
            }
        }

        // Shared-salt docks each prove a disjoint slice of the digest so
        // one tool's answer can't vouch for a sibling.
        let tool_group: Vec<Dock> = occupied
            .iter()
            .copied()
            .filter(|&dock| dock.puppy_type().shares_firmware())
            .collect();

        for &dock in &occupied {
            let chunk = if dock.puppy_type().shares_firmware() {
                let member = tool_group
                    .iter()
                    .position(|&d| d == dock)
                    .unwrap_or_default();
                chunk_for_group_member(member, tool_group.len())
            } else {
                DigestChunk::FULL
            };
            self.flash_firmware(
                &mut protocol,
                &mut table,
                &state,
                dock,
                chunk,
                percent_base,
                percent_span,
            )?;
            percent_base = percent_base.saturating_add(percent_span);
        }

        self.report(Progress::new(100, FlashingStage::Done));

        for &dock in &occupied {
            self.start_app(&mut protocol, &table, dock)?;
        }

        Ok(result)
    }

    fn run_address_assignment(
        &mut self,
        protocol: &mut BootloaderProtocol<'_>,
        state: &mut AttemptState,
    ) -> Result<BootstrapResult, BootstrapError> {
        let mut result = BootstrapResult::default();

        let docks = self.docks.clone();
        for &dock in &docks {
            let puppy = dock.puppy_type();
            self.report(Progress::with_puppy(0, FlashingStage::Discovery, puppy));
            info!("Discovering what sits in dock {dock}");

            // Wait for the puppy to boot, then hand the dock its address.
            // The broadcast is no-reply, so every still-unassigned puppy
            // on the bus may act on it.
            thread::sleep(BOOT_SETTLE);
            protocol
                .assign_address(Address::DEFAULT, dock.boot_address())
                .map_err(BootstrapError::AddressAssignment)?;
            thread::sleep(BROADCAST_DRAIN);

            // Reset every later dock, wiping the address any of them may
            // have mistakenly taken. The current dock keeps its.
            self.reset_docks_after(dock);

            if discover(protocol, state, dock)? {
                info!(
                    "Dock {dock}: discovered {puppy} puppy, assigned address {}",
                    dock.boot_address()
                );
                result.set_dock_occupied(dock);
            } else {
                info!("Dock {dock}: no puppy discovered");
            }
        }

        self.verify_address_assignment(protocol, result)?;
        Ok(result)
    }

    fn verify_address_assignment(
        &mut self,
        protocol: &mut BootloaderProtocol<'_>,
        result: BootstrapResult,
    ) -> Result<(), BootstrapError> {
        // Re-reset every dock found empty; harmless when nothing is
        // physically attached, cleans up stray state when something is.
        let empty: Vec<Dock> = self
            .docks
            .iter()
            .copied()
            .filter(|&dock| !result.is_dock_occupied(dock))
            .collect();
        if !empty.is_empty() {
            self.reset_docks(&empty);
        }

        // Nobody may still be listening on the default address; a
        // straggler means a wiring or assignment fault.
        protocol.set_address(Address::DEFAULT);
        match protocol.get_protocol_version() {
            Err(TransactionError::NoResponse) => Ok(()),
            _ => Err(BootstrapError::AddressCollision),
        }
    }

    fn assign_salts(&self, table: &mut FingerprintTable, occupied: &[Dock]) {
        // One salt per identical-firmware group, fresh every attempt.
        let shared_salt = rand::random::<u32>();
        for &dock in occupied {
            if dock.puppy_type().shares_firmware() {
                table.set_salt(dock, shared_salt);
            } else {
                table.set_salt(dock, rand::random::<u32>());
            }
        }
    }

    fn calculate_expected_digests(
        &self,
        table: &mut FingerprintTable,
        occupied: &[Dock],
    ) -> Result<(), BootstrapError> {
        let mut computed: Vec<(PuppyType, u32, Fingerprint)> = Vec::new();
        for &dock in occupied {
            let puppy = dock.puppy_type();
            let salt = table.salt(dock);
            if let Some((_, _, digest)) = computed
                .iter()
                .find(|(p, s, _)| *p == puppy && *s == salt)
            {
                table.set_digest(dock, *digest);
                continue;
            }
            let digest = self.expected_digest(puppy, salt)?;
            computed.push((puppy, salt, digest));
            table.set_digest(dock, digest);
        }
        Ok(())
    }

    fn expected_digest(
        &self,
        puppy: PuppyType,
        salt: u32,
    ) -> Result<Fingerprint, BootstrapError> {
        let name = puppy.name();
        match self.store.open(puppy) {
            Ok(mut image) => {
                let size = self.store.size(puppy);
                calculate_fingerprint(&mut image, size, salt)
                    .map_err(|source| BootstrapError::FirmwareRead { name, source })
            }
            Err(_) => {
                // A missing image digests to just the salt; the mismatch
                // that follows surfaces as FirmwareNotFound on the flash
                // path, where the operator learns which image it was.
                warn!("Firmware image for {puppy} missing, fingerprint cannot match");
                calculate_fingerprint(&mut std::io::Cursor::new([0u8; 0]), 0, salt)
                    .map_err(|source| BootstrapError::FirmwareRead { name, source })
            }
        }
    }

    #[allow(clippy::too_many_arguments, reason = "attempt-scoped plumbing")]
    fn flash_firmware(
        &mut self,
        protocol: &mut BootloaderProtocol<'_>,
        table: &mut FingerprintTable,
        state: &AttemptState,
        dock: Dock,
        chunk: DigestChunk,
        percent_base: u8,
        percent_span: u8,
    ) -> Result<(), BootstrapError> {
        let puppy = dock.puppy_type();
        let name = puppy.name();

        protocol.set_address(dock.boot_address());
        self.report(Progress::with_puppy(
            percent_base,
            FlashingStage::CheckFingerprint,
            puppy,
        ));

        let matched = fingerprint_match(protocol, name, table.digest(dock), chunk)?;
        info!(
            "Puppy {dock} fingerprint {}",
            if matched { "matched" } else { "didn't match" }
        );
        if matched {
            return Ok(());
        }

        // The previous application may have left a crash dump behind;
        // save it if we can, move on if we can't.
        if let Some(hw_info) = state.hw_infos[dock.index() as usize] {
            if download_crash_dump(protocol, &hw_info, &self.config.crash_dump_dir, dock) {
                info!("Saved crash dump from {dock}");
            }
        }

        let size = self.store.size(puppy);
        let mut image = self
            .store
            .open(puppy)
            .map_err(|_| BootstrapError::FirmwareNotFound(name))?;
        if size == 0 {
            return Err(BootstrapError::FirmwareNotFound(name));
        }

        let progress = &mut self.progress;
        let mut supplier_error: Option<std::io::Error> = None;
        let flashed = protocol.write_flash(size as u32, &mut |offset, out| {
            let percent = percent_base as u64 + offset as u64 * percent_span as u64 / size;
            (progress)(Progress::with_puppy(
                percent as u8,
                FlashingStage::Flashing,
                puppy,
            ));
            info!("Flashing puppy {name} offset {offset}/{size}");

            match image
                .seek(SeekFrom::Start(offset as u64))
                .and_then(|_| image.read_exact(out))
            {
                Ok(()) => true,
                Err(err) => {
                    supplier_error = Some(err);
                    false
                }
            }
        });
        match flashed {
            Ok(()) => {}
            Err(TransactionError::ReadDataError) => {
                let source = supplier_error
                    .unwrap_or_else(|| std::io::Error::other("firmware image short read"));
                return Err(BootstrapError::FirmwareRead { name, source });
            }
            Err(source) => return Err(BootstrapError::WriteFlashFailed { name, source }),
        }

        self.report(Progress::with_puppy(
            percent_base.saturating_add(percent_span),
            FlashingStage::CheckFingerprint,
            puppy,
        ));

        // Brand-new salt so the flash itself cannot be faked with a
        // digest recorded before it.
        let old_salt = table.salt(dock);
        let mut new_salt = rand::random::<u32>();
        while new_salt == old_salt {
            new_salt = rand::random::<u32>();
        }
        table.set_salt(dock, new_salt);

        protocol
            .compute_fingerprint(new_salt)
            .map_err(|source| BootstrapError::WriteFlashFailed { name, source })?;
        let computation_start = Instant::now();

        let expected = if self.config.remote_fingerprints {
            None
        } else {
            Some(self.expected_digest(puppy, new_salt)?)
        };
        self.wait_for_fingerprint(protocol, computation_start, dock)?;
        let expected = match expected {
            Some(digest) => digest,
            None => {
                let mut digest = Fingerprint::default();
                protocol
                    .get_fingerprint(digest.as_bytes_mut(), 0, FINGERPRINT_SIZE as u8)
                    .map_err(|_| BootstrapError::FingerprintMismatch(name))?;
                digest
            }
        };
        table.set_digest(dock, expected);

        // Full-digest re-verify; a second mismatch is fatal, flashing is
        // never silently retried.
        if !fingerprint_match(protocol, name, table.digest(dock), DigestChunk::FULL)? {
            return Err(BootstrapError::FingerprintMismatch(name));
        }
        Ok(())
    }

    fn wait_for_fingerprint(
        &self,
        protocol: &mut BootloaderProtocol<'_>,
        computation_start: Instant,
        dock: Dock,
    ) -> Result<(), BootstrapError> {
        loop {
            // Any response at all means the puppy is done hashing.
            if protocol.get_protocol_version().is_ok() {
                return Ok(());
            }
            if computation_start.elapsed() >= FINGERPRINT_WAIT {
                return Err(BootstrapError::FingerprintTimeout(dock.puppy_type().name()));
            }
            thread::sleep(FINGERPRINT_POLL);
        }
    }

    fn start_app(
        &mut self,
        protocol: &mut BootloaderProtocol<'_>,
        table: &FingerprintTable,
        dock: Dock,
    ) -> Result<(), BootstrapError> {
        info!("Starting puppy app on {dock}");
        protocol.set_address(dock.boot_address());
        protocol
            .run_app(table.salt(dock), table.digest(dock).as_bytes())
            .map_err(|source| BootstrapError::StartAppFailed {
                name: dock.puppy_type().name(),
                source,
            })
    }

    fn reset_all_puppies(&mut self) {
        self.reset_docks(&Dock::ALL);
    }

    fn reset_docks_after(&mut self, dock: Dock) {
        let later: Vec<Dock> = Dock::ALL
            .into_iter()
            .filter(|d| d.index() > dock.index())
            .collect();
        if !later.is_empty() {
            self.reset_docks(&later);
        }
    }

    fn reset_docks(&mut self, docks: &[Dock]) {
        for &dock in docks {
            self.control.assert_reset(dock);
        }
        thread::sleep(RESET_PULSE);
        for &dock in docks {
            self.control.release_reset(dock);
        }
    }

    fn report(&mut self, progress: Progress) {
        (self.progress)(progress);
    }
}

/// Probe one dock at its freshly assigned address. `Ok(false)` means the
/// dock is genuinely empty; anything protocol-shaped but wrong is fatal.
fn discover(
    protocol: &mut BootloaderProtocol<'_>,
    state: &mut AttemptState,
    dock: Dock,
) -> Result<bool, BootstrapError> {
    protocol.set_address(dock.boot_address());

    let version = match protocol.get_protocol_version() {
        Ok(version) => version,
        Err(TransactionError::NoResponse) => return Ok(false),
        Err(source) => return Err(BootstrapError::DiscoveryFailed { dock, source }),
    };
    // Major version gates everything else; minor mismatches are fine.
    if version & 0xFF00 != BOOTLOADER_PROTOCOL_VERSION & 0xFF00 {
        error!(
            "Puppy uses incompatible bootloader protocol {version:#06x}, controller wants {BOOTLOADER_PROTOCOL_VERSION:#06x}"
        );
        return Err(BootstrapError::IncompatibleProtocol {
            dock,
            found: version,
            expected: BOOTLOADER_PROTOCOL_VERSION,
        });
    }

    let hw_info = match protocol.get_hardware_info() {
        Ok(info) => info,
        Err(TransactionError::NoResponse) => return Ok(false),
        Err(source) => return Err(BootstrapError::DiscoveryFailed { dock, source }),
    };

    // Raw OTP is readable before flashing; log the board identity while
    // we are here. Older bootloaders predate the command.
    if version >= OTP_CAPABLE_PROTOCOL {
        let mut otp = [0u8; OTP_DATAMATRIX_LEN];
        match protocol.read_otp(0, &mut otp) {
            Ok(()) => match parse_otp_datamatrix(&otp) {
                Some(matrix) => info!(
                    "Puppy hardware id {} revision {}",
                    matrix.product_id, matrix.revision
                ),
                None => warn!("Puppy hardware id was not written properly to its OTP"),
            },
            Err(TransactionError::NoResponse) => return Ok(false),
            Err(source) => return Err(BootstrapError::DiscoveryFailed { dock, source }),
        }
    }

    let puppy = dock.puppy_type();
    if let Some(expected) = puppy.expected_hw_type() {
        if hw_info.hw_type != expected {
            return Err(BootstrapError::UnexpectedHardwareType {
                dock,
                found: hw_info.hw_type,
                expected,
            });
        }
        if hw_info.bl_version < MINIMAL_BOOTLOADER_VERSION {
            error!(
                "Puppy bootloader is too old: {:#06x}, controller wants {MINIMAL_BOOTLOADER_VERSION:#06x}",
                hw_info.bl_version
            );
            return Err(BootstrapError::BootloaderTooOld {
                dock,
                found: hw_info.bl_version,
                minimum: MINIMAL_BOOTLOADER_VERSION,
            });
        }
    }

    state.hw_infos[dock.index() as usize] = Some(hw_info);
    Ok(true)
}

/// Compare the expected digest chunk against what the puppy reports.
///
/// An out-of-range chunk is never a match and issues no remote query.
fn fingerprint_match(
    protocol: &mut BootloaderProtocol<'_>,
    name: &'static str,
    expected: &Fingerprint,
    chunk: DigestChunk,
) -> Result<bool, BootstrapError> {
    if chunk.offset as usize + chunk.size as usize > FINGERPRINT_SIZE {
        return Ok(false);
    }

    let mut observed = Fingerprint::default();
    protocol
        .get_fingerprint(observed.as_bytes_mut(), chunk.offset, chunk.size)
        .map_err(|_| BootstrapError::FingerprintMismatch(name))?;

    Ok(observed.matches_range(expected, chunk.offset as usize, chunk.size as usize))
}
