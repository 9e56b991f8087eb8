//! Transaction engine for the bootloader protocol.
//!
//! Stateless per call: build a request, transmit it to the one addressed
//! puppy, wait with bounded timeouts, validate and decode the response.
//! Every call returns a [`TransactionResult`]; the caller decides what is
//! recoverable (a missing response during discovery just means an empty
//! dock, the same thing mid-flash is a failed attempt).

use std::time::Duration;

use opengantry_puppy_boot_protocol::{
    Address, CommandCode, FINGERPRINT_SIZE, HW_INFO_LEN, HwInfo, MAX_FLASH_BLOCK_LEN,
    MAX_PACKET_LENGTH, MAX_REQUEST_DATA_LEN, MAX_RESPONSE_DATA_LEN, RESPONSE_HEADER_LEN,
    ResponseStatus, build_flash_read_payload, build_get_fingerprint_payload, build_run_app_payload,
    build_salt_payload, decode_response, encode_request, parse_hw_info, parse_protocol_version,
    parse_u16_le, response_remaining,
};
use thiserror::Error;

use crate::transport::PuppyBus;

/// Window for the first byte of an ordinary response.
pub const TIMEOUT_FIRST_BYTE: Duration = Duration::from_millis(100);

/// Window for each subsequent byte while draining a response.
pub const TIMEOUT_INTER_BYTE: Duration = Duration::from_millis(10);

/// First-byte window for fingerprint/finalize-class commands, where the
/// remote hashes or programs its own flash before any byte comes back.
pub const TIMEOUT_REMOTE_HASH: Duration = Duration::from_secs(3);

/// The closed set of non-OK transaction outcomes.
///
/// The first six mirror wire statuses a puppy can send; the rest are
/// synthesized locally and never appear in a frame.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Puppy reported the command failed")]
    CommandFailed,

    #[error("Puppy does not support this command")]
    CommandNotSupported,

    #[error("Puppy rejected the transfer")]
    InvalidTransfer,

    #[error("Puppy saw a CRC mismatch in the request")]
    InvalidCrc,

    #[error("Puppy rejected the command arguments")]
    InvalidArguments,

    #[error("Writing the request to the bus failed")]
    WriteError,

    #[error("No response")]
    NoResponse,

    #[error("Response stopped mid-frame")]
    IncompleteResponse,

    #[error("Malformed or mis-addressed response")]
    BadResponse,

    #[error("Data supplier failed to produce a flash block")]
    ReadDataError,
}

impl TransactionError {
    /// Map a wire status to its error, or `None` for COMMAND_OK.
    pub fn from_status(status: ResponseStatus) -> Option<Self> {
        match status {
            ResponseStatus::CommandOk => None,
            ResponseStatus::CommandFailed => Some(Self::CommandFailed),
            ResponseStatus::CommandNotSupported => Some(Self::CommandNotSupported),
            ResponseStatus::InvalidTransfer => Some(Self::InvalidTransfer),
            ResponseStatus::InvalidCrc => Some(Self::InvalidCrc),
            ResponseStatus::InvalidArguments => Some(Self::InvalidArguments),
        }
    }

    /// During discovery this is the one benign outcome: nobody home.
    pub fn is_no_response(self) -> bool {
        matches!(self, Self::NoResponse)
    }
}

pub type TransactionResult<T> = Result<T, TransactionError>;

/// Command/response engine addressing one puppy at a time.
///
/// Owns the transmit buffer for the duration of a bootstrap attempt and
/// borrows the locked bus exclusively, so no other consumer can
/// interleave traffic mid-protocol.
pub struct BootloaderProtocol<'bus> {
    bus: &'bus mut (dyn PuppyBus + 'bus),
    address: Address,
    tx_buffer: [u8; MAX_PACKET_LENGTH],
}

impl<'bus> BootloaderProtocol<'bus> {
    pub fn new(bus: &'bus mut (dyn PuppyBus + 'bus)) -> Self {
        Self {
            bus,
            address: Address::DEFAULT,
            tx_buffer: [0u8; MAX_PACKET_LENGTH],
        }
    }

    /// Select the puppy addressed by subsequent calls.
    pub fn set_address(&mut self, address: Address) {
        self.address = address;
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Encode and transmit one request frame to the addressed puppy.
    pub fn write_command(&mut self, command: CommandCode, payload: &[u8]) -> TransactionResult<()> {
        let len = encode_request(self.address.0, command, payload, &mut self.tx_buffer)
            .map_err(|_| TransactionError::WriteError)?;
        self.bus
            .flush_input()
            .map_err(|_| TransactionError::WriteError)?;
        self.bus
            .send(&self.tx_buffer[..len])
            .map_err(|_| TransactionError::WriteError)?;
        Ok(())
    }

    /// Drain and validate one response frame, copying its payload into
    /// `out`. Returns the payload length.
    pub fn read_status(
        &mut self,
        command: CommandCode,
        out: &mut [u8],
        first_byte_timeout: Duration,
    ) -> TransactionResult<usize> {
        let mut rx = [0u8; MAX_PACKET_LENGTH];

        read_exact(self.bus, &mut rx[..RESPONSE_HEADER_LEN], first_byte_timeout)?;
        let payload_len = rx[3] as usize;
        if payload_len > MAX_RESPONSE_DATA_LEN {
            return Err(TransactionError::BadResponse);
        }
        let total = RESPONSE_HEADER_LEN + response_remaining(rx[3]);
        read_exact(self.bus, &mut rx[RESPONSE_HEADER_LEN..total], TIMEOUT_INTER_BYTE)?;

        let response =
            decode_response(&rx[..total]).map_err(|_| TransactionError::BadResponse)?;
        if response.address != self.address.0 || response.command != command {
            return Err(TransactionError::BadResponse);
        }
        if let Some(error) = TransactionError::from_status(response.status) {
            return Err(error);
        }
        if response.payload.len() > out.len() {
            return Err(TransactionError::BadResponse);
        }
        out[..response.payload.len()].copy_from_slice(response.payload);
        Ok(response.payload.len())
    }

    /// Write a request and, unless the command is no-reply, read back its
    /// response payload.
    pub fn run_transaction(
        &mut self,
        command: CommandCode,
        payload: &[u8],
        out: &mut [u8],
        first_byte_timeout: Duration,
    ) -> TransactionResult<usize> {
        self.write_command(command, payload)?;
        if !command.expects_response() {
            return Ok(0);
        }
        self.read_status(command, out, first_byte_timeout)
    }

    pub fn get_protocol_version(&mut self) -> TransactionResult<u16> {
        let mut out = [0u8; 2];
        let n = self.run_transaction(
            CommandCode::GetProtocolVersion,
            &[],
            &mut out,
            TIMEOUT_FIRST_BYTE,
        )?;
        parse_protocol_version(&out[..n]).map_err(|_| TransactionError::BadResponse)
    }

    pub fn get_hardware_info(&mut self) -> TransactionResult<HwInfo> {
        let mut out = [0u8; HW_INFO_LEN];
        let n = self.run_transaction(
            CommandCode::GetHardwareInfo,
            &[],
            &mut out,
            TIMEOUT_FIRST_BYTE,
        )?;
        parse_hw_info(&out[..n]).map_err(|_| TransactionError::BadResponse)
    }

    pub fn get_max_packet_length(&mut self) -> TransactionResult<u16> {
        let mut out = [0u8; 2];
        let n = self.run_transaction(
            CommandCode::GetMaxPacketLength,
            &[],
            &mut out,
            TIMEOUT_FIRST_BYTE,
        )?;
        parse_u16_le(&out[..n]).map_err(|_| TransactionError::BadResponse)
    }

    /// Broadcast-capable, no-reply address assignment. Leaves the engine
    /// addressed at `current`; callers re-address explicitly afterwards.
    pub fn assign_address(&mut self, current: Address, new: Address) -> TransactionResult<()> {
        self.set_address(current);
        self.write_command(CommandCode::SetAddress, &[new.0])
    }

    /// Kick off salted fingerprint computation. The puppy acks
    /// immediately and then goes quiet until the digest is ready; poll
    /// [`get_protocol_version`](Self::get_protocol_version) for liveness.
    pub fn compute_fingerprint(&mut self, salt: u32) -> TransactionResult<()> {
        let payload = build_salt_payload(salt);
        let mut out = [0u8; 0];
        self.run_transaction(
            CommandCode::ComputeFingerprint,
            &payload,
            &mut out,
            TIMEOUT_FIRST_BYTE,
        )?;
        Ok(())
    }

    /// Fetch `size` digest bytes starting at `offset`, storing them at
    /// the same offset of `out`.
    pub fn get_fingerprint(
        &mut self,
        out: &mut [u8; FINGERPRINT_SIZE],
        offset: u8,
        size: u8,
    ) -> TransactionResult<()> {
        debug_assert!(offset as usize + size as usize <= FINGERPRINT_SIZE);
        let payload = build_get_fingerprint_payload(offset, size);
        let mut chunk = [0u8; FINGERPRINT_SIZE];
        let n = self.run_transaction(
            CommandCode::GetFingerprint,
            &payload,
            &mut chunk,
            TIMEOUT_REMOTE_HASH,
        )?;
        if n != size as usize {
            return Err(TransactionError::BadResponse);
        }
        out[offset as usize..offset as usize + n].copy_from_slice(&chunk[..n]);
        Ok(())
    }

    /// Stream `total_len` bytes of firmware in offset-addressed blocks
    /// pulled from `supply`, then finalize.
    ///
    /// `supply` is invoked once per block with the block's offset and the
    /// exact slice to fill; returning false aborts with READ_DATA_ERROR.
    pub fn write_flash(
        &mut self,
        total_len: u32,
        supply: &mut dyn FnMut(u32, &mut [u8]) -> bool,
    ) -> TransactionResult<()> {
        let mut payload = [0u8; MAX_REQUEST_DATA_LEN];
        let mut offset: u32 = 0;

        while offset < total_len {
            let block = ((total_len - offset) as usize).min(MAX_FLASH_BLOCK_LEN);
            payload[..4].copy_from_slice(&offset.to_le_bytes());
            if !supply(offset, &mut payload[4..4 + block]) {
                return Err(TransactionError::ReadDataError);
            }
            let mut out = [0u8; 0];
            self.run_transaction(
                CommandCode::WriteFlash,
                &payload[..4 + block],
                &mut out,
                TIMEOUT_FIRST_BYTE,
            )?;
            offset += block as u32;
        }

        let mut out = [0u8; 0];
        self.run_transaction(CommandCode::FinalizeFlash, &[], &mut out, TIMEOUT_REMOTE_HASH)?;
        Ok(())
    }

    pub fn read_flash(&mut self, offset: u32, out: &mut [u8]) -> TransactionResult<()> {
        self.read_chunked(CommandCode::ReadFlash, offset, out)
    }

    pub fn read_otp(&mut self, offset: u32, out: &mut [u8]) -> TransactionResult<()> {
        self.read_chunked(CommandCode::ReadOtp, offset, out)
    }

    fn read_chunked(
        &mut self,
        command: CommandCode,
        mut offset: u32,
        out: &mut [u8],
    ) -> TransactionResult<()> {
        for chunk in out.chunks_mut(MAX_RESPONSE_DATA_LEN) {
            let payload = build_flash_read_payload(offset, chunk.len() as u8);
            let n = self.run_transaction(command, &payload, chunk, TIMEOUT_FIRST_BYTE)?;
            if n != chunk.len() {
                return Err(TransactionError::BadResponse);
            }
            offset += chunk.len() as u32;
        }
        Ok(())
    }

    /// Hand the puppy its final trusted salt and fingerprint; its own
    /// bootloader re-verifies before jumping to the application.
    pub fn run_app(
        &mut self,
        salt: u32,
        fingerprint: &[u8; FINGERPRINT_SIZE],
    ) -> TransactionResult<()> {
        let payload = build_run_app_payload(salt, fingerprint);
        let mut out = [0u8; 0];
        self.run_transaction(
            CommandCode::StartApplication,
            &payload,
            &mut out,
            TIMEOUT_FIRST_BYTE,
        )?;
        Ok(())
    }
}

fn read_exact(
    bus: &mut (dyn PuppyBus + '_),
    buf: &mut [u8],
    mut timeout: Duration,
) -> TransactionResult<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = bus.recv(&mut buf[filled..], timeout).unwrap_or(0);
        if n == 0 {
            return Err(if filled == 0 {
                TransactionError::NoResponse
            } else {
                TransactionError::IncompleteResponse
            });
        }
        filled += n;
        timeout = TIMEOUT_INTER_BYTE;
    }
    Ok(())
}
