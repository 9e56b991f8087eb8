//! Scripted puppy fleet: an in-memory bus plus reset lines backed by a
//! shared model of every attached board, so the whole bootstrap can run
//! against simulated hardware.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use opengantry_puppy_boot_protocol::{
    CommandCode, MAX_PACKET_LENGTH, ResponseStatus, decode_request, encode_hw_info,
    encode_response,
};
use opengantry_puppy_bootstrap::dock::Dock;
use opengantry_puppy_bootstrap::transport::{BusError, PuppyBus};
use opengantry_puppy_bootstrap::DockControl;
use sha2::{Digest, Sha256};

/// Application flash capacity every simulated board reports.
pub const SIM_FLASH_SIZE: usize = 64 * 1024;

/// How many addressed requests a board ignores while "hashing".
const BUSY_POLLS: u32 = 2;

pub struct SimPuppy {
    pub dock: Dock,
    pub protocol_version: u16,
    pub hw_type: u8,
    pub hw_revision: u8,
    pub bl_version: u16,
    pub otp: [u8; 32],

    pub address: u8,
    pub in_reset: bool,
    pub busy_polls: u32,

    pub flash: Vec<u8>,
    pub app_len: usize,
    pub staging: Vec<u8>,

    pub salt: u32,
    pub fingerprint: [u8; 32],
    pub salts_seen: Vec<u32>,
    pub writes: Vec<(u32, usize)>,
    pub started: Option<(u32, [u8; 32])>,

    pub fail_writes: bool,
    pub fail_start: bool,
    pub corrupt_after_finalize: bool,
}

impl SimPuppy {
    pub fn new(dock: Dock, image: &[u8]) -> Self {
        let hw_type = match dock {
            Dock::Bed => 0x01,
            Dock::Extension => 0xEE,
            _ => 0x02,
        };
        let mut otp = [0xFFu8; 32];
        otp[..8].copy_from_slice(b"28122-05");

        let mut flash = vec![0xFFu8; SIM_FLASH_SIZE];
        flash[..image.len()].copy_from_slice(image);

        Self {
            dock,
            protocol_version: 0x0302,
            hw_type,
            hw_revision: 5,
            bl_version: 0x0104,
            otp,
            address: 0x00,
            in_reset: false,
            busy_polls: 0,
            flash,
            app_len: image.len(),
            staging: Vec::new(),
            salt: 0,
            fingerprint: [0u8; 32],
            salts_seen: Vec::new(),
            writes: Vec::new(),
            started: None,
            fail_writes: false,
            fail_start: false,
            corrupt_after_finalize: false,
        }
    }

    fn compute_fingerprint(&mut self, salt: u32) {
        let mut sha = Sha256::new();
        sha.update(salt.to_le_bytes());
        sha.update(&self.flash[..self.app_len]);
        self.fingerprint.copy_from_slice(&sha.finalize());
        self.salt = salt;
    }

    fn execute(&mut self, command: CommandCode, payload: &[u8]) -> (ResponseStatus, Vec<u8>) {
        match command {
            CommandCode::GetProtocolVersion => {
                (ResponseStatus::CommandOk, self.protocol_version.to_le_bytes().to_vec())
            }
            CommandCode::GetMaxPacketLength => (
                ResponseStatus::CommandOk,
                (MAX_PACKET_LENGTH as u16).to_le_bytes().to_vec(),
            ),
            CommandCode::GetHardwareInfo => {
                let info = opengantry_puppy_boot_protocol::HwInfo {
                    hw_type: self.hw_type,
                    hw_revision: self.hw_revision,
                    bl_version: self.bl_version,
                    application_size: SIM_FLASH_SIZE as u32,
                };
                (ResponseStatus::CommandOk, encode_hw_info(&info).to_vec())
            }
            CommandCode::ReadOtp => {
                let offset = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]])
                    as usize;
                let len = payload[4] as usize;
                (ResponseStatus::CommandOk, self.otp[offset..offset + len].to_vec())
            }
            CommandCode::ReadFlash => {
                let offset = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]])
                    as usize;
                let len = payload[4] as usize;
                if offset + len > self.flash.len() {
                    return (ResponseStatus::InvalidArguments, Vec::new());
                }
                (ResponseStatus::CommandOk, self.flash[offset..offset + len].to_vec())
            }
            CommandCode::ComputeFingerprint => {
                let salt = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
                self.salts_seen.push(salt);
                self.compute_fingerprint(salt);
                self.busy_polls = BUSY_POLLS;
                (ResponseStatus::CommandOk, Vec::new())
            }
            CommandCode::GetFingerprint => {
                let offset = payload[0] as usize;
                let size = payload[1] as usize;
                if offset + size > self.fingerprint.len() {
                    return (ResponseStatus::InvalidArguments, Vec::new());
                }
                (ResponseStatus::CommandOk, self.fingerprint[offset..offset + size].to_vec())
            }
            CommandCode::WriteFlash => {
                if self.fail_writes {
                    return (ResponseStatus::CommandFailed, Vec::new());
                }
                let offset = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
                let data = &payload[4..];
                let end = offset as usize + data.len();
                if self.staging.len() < end {
                    self.staging.resize(end, 0xFF);
                }
                self.staging[offset as usize..end].copy_from_slice(data);
                self.writes.push((offset, data.len()));
                (ResponseStatus::CommandOk, Vec::new())
            }
            CommandCode::FinalizeFlash => {
                let len = self.staging.len();
                self.flash[..len].copy_from_slice(&self.staging);
                self.app_len = len;
                self.staging = Vec::new();
                if self.corrupt_after_finalize {
                    self.flash[0] ^= 0xFF;
                }
                (ResponseStatus::CommandOk, Vec::new())
            }
            CommandCode::StartApplication => {
                if self.fail_start {
                    return (ResponseStatus::CommandFailed, Vec::new());
                }
                let salt = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
                let mut fingerprint = [0u8; 32];
                fingerprint.copy_from_slice(&payload[4..36]);
                self.started = Some((salt, fingerprint));
                (ResponseStatus::CommandOk, Vec::new())
            }
            CommandCode::SetAddress => unreachable!("handled at the bus level"),
        }
    }
}

#[derive(Default)]
pub struct FleetState {
    pub puppies: Vec<SimPuppy>,
    pub rx: VecDeque<u8>,
    /// Every (target address, new address) SET_ADDRESS broadcast seen.
    pub broadcasts: Vec<(u8, u8)>,
    /// Every (puppy address, offset, size) GET_FINGERPRINT request seen.
    pub fingerprint_requests: Vec<(u8, u8, u8)>,
}

impl FleetState {
    fn handle_frame(&mut self, frame: &[u8]) {
        let Ok((address, command, payload)) = decode_request(frame) else {
            return;
        };

        if command == CommandCode::SetAddress {
            self.broadcasts.push((address, payload[0]));
            for puppy in &mut self.puppies {
                if !puppy.in_reset && puppy.address == address {
                    puppy.address = payload[0];
                }
            }
            return;
        }

        if command == CommandCode::GetFingerprint {
            self.fingerprint_requests.push((address, payload[0], payload[1]));
        }

        let Some(puppy) = self
            .puppies
            .iter_mut()
            .find(|puppy| !puppy.in_reset && puppy.address == address)
        else {
            return;
        };
        if puppy.busy_polls > 0 {
            puppy.busy_polls -= 1;
            return;
        }

        let (status, data) = puppy.execute(command, payload);
        let mut buf = [0u8; MAX_PACKET_LENGTH];
        let len = encode_response(address, command, status, &data, &mut buf).unwrap_or(0);
        self.rx.extend(&buf[..len]);
    }

    pub fn puppy_at(&self, dock: Dock) -> Option<&SimPuppy> {
        self.puppies.iter().find(|puppy| puppy.dock == dock)
    }

    pub fn puppy_at_mut(&mut self, dock: Dock) -> Option<&mut SimPuppy> {
        self.puppies.iter_mut().find(|puppy| puppy.dock == dock)
    }
}

/// Shared handle used to seed the fleet and inspect it afterwards.
#[derive(Clone, Default)]
pub struct Fleet(pub Arc<Mutex<FleetState>>);

impl Fleet {
    pub fn with_puppies(puppies: Vec<SimPuppy>) -> Self {
        let fleet = Fleet::default();
        fleet.0.lock().expect("poisoned").puppies = puppies;
        fleet
    }

    pub fn bus(&self) -> SimBus {
        SimBus(self.clone())
    }

    pub fn control(&self) -> SimControl {
        SimControl(self.clone())
    }
}

pub struct SimBus(Fleet);

impl PuppyBus for SimBus {
    fn send(&mut self, frame: &[u8]) -> Result<(), BusError> {
        self.0.0.lock().expect("poisoned").handle_frame(frame);
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, BusError> {
        let mut state = self.0.0.lock().expect("poisoned");
        let mut n = 0;
        while n < buf.len() {
            let Some(byte) = state.rx.pop_front() else {
                break;
            };
            buf[n] = byte;
            n += 1;
        }
        Ok(n)
    }

    fn flush_input(&mut self) -> Result<(), BusError> {
        self.0.0.lock().expect("poisoned").rx.clear();
        Ok(())
    }
}

pub struct SimControl(Fleet);

impl DockControl for SimControl {
    fn assert_reset(&mut self, dock: Dock) {
        let mut state = self.0.0.lock().expect("poisoned");
        if let Some(puppy) = state.puppy_at_mut(dock) {
            puppy.in_reset = true;
            puppy.address = 0x00;
            puppy.busy_polls = 0;
            puppy.staging = Vec::new();
        }
    }

    fn release_reset(&mut self, dock: Dock) {
        let mut state = self.0.0.lock().expect("poisoned");
        if let Some(puppy) = state.puppy_at_mut(dock) {
            puppy.in_reset = false;
        }
    }
}

/// Salted digest exactly as the controller computes it.
pub fn salted_sha256(salt: u32, image: &[u8]) -> [u8; 32] {
    let mut sha = Sha256::new();
    sha.update(salt.to_le_bytes());
    sha.update(image);
    let mut out = [0u8; 32];
    out.copy_from_slice(&sha.finalize());
    out
}
